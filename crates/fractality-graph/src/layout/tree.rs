use super::{LayoutInput, Layouter, Positions};
use fractality_core::{GOLDEN_ANGLE, LayoutKind, NodeId, Vec3};
use std::collections::{HashMap, HashSet, VecDeque};

/// Branching tree grown upward from the focus over the visible nodes.
///
/// Graph edges between visible nodes are walked in both directions so the
/// parent and its kin hang off the focus like any other branch. Visible
/// nodes with no visible path to the focus become extra branches of the focus.
#[derive(Debug, Clone, Copy, Default)]
pub struct FractalTreeLayout;

impl FractalTreeLayout {
    fn branches<'v>(
        input: &LayoutInput<'v>,
        focus: &'v NodeId,
    ) -> HashMap<&'v NodeId, Vec<&'v NodeId>> {
        let view = input.view;
        let visible: HashSet<&NodeId> = view.ids().collect();
        let mut branches: HashMap<&NodeId, Vec<&NodeId>> = HashMap::new();
        let mut reached: HashSet<&NodeId> = HashSet::from([focus]);
        let mut queue = VecDeque::from([focus]);

        while let Some(id) = queue.pop_front() {
            let Some(node) = input.graph.get(id.as_str()) else {
                continue;
            };
            let neighbours = node.parent_id.iter().chain(node.child_ids.iter());
            for next in neighbours {
                let Some(next) = visible.get(next).copied() else {
                    continue;
                };
                if reached.insert(next) {
                    branches.entry(id).or_default().push(next);
                    queue.push_back(next);
                }
            }
        }

        for id in view.ids() {
            if reached.insert(id) {
                branches.entry(focus).or_default().push(id);
            }
        }
        branches
    }
}

impl Layouter for FractalTreeLayout {
    fn kind(&self) -> LayoutKind {
        LayoutKind::FractalTree
    }

    fn compute(&self, input: &LayoutInput<'_>) -> Positions {
        let Some(focus) = input.focus() else {
            return Positions::new();
        };
        let tree = &input.config.tree;
        let branches = Self::branches(input, focus);

        let mut positions = Positions::with_capacity(input.view.len());
        positions.insert(focus.clone(), Vec3::ZERO);

        // (node, position, growth direction, level)
        let mut stack: Vec<(&NodeId, Vec3, Vec3, u32)> = vec![(focus, Vec3::ZERO, Vec3::UP, 0)];
        while let Some((id, origin, direction, level)) = stack.pop() {
            let Some(kids) = branches.get(id) else {
                continue;
            };
            let length = tree.level_height * tree.branch_scale.powi(level as i32);
            let m = kids.len();
            for (k, kid) in kids.iter().enumerate() {
                let spread = if m == 1 {
                    0.0
                } else {
                    -tree.branch_angle + 2.0 * tree.branch_angle * k as f32 / (m - 1) as f32
                };
                let dir = direction
                    .rotate_z(spread)
                    .rotate_y((level + 1) as f32 * GOLDEN_ANGLE)
                    .normalized();
                let position = origin + dir * length;
                positions.insert((*kid).clone(), position);
                stack.push((*kid, position, dir, level + 1));
            }
        }
        positions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::family_view::compute_family_view;
    use crate::testdata::{TestDataGenerator, TestPattern};
    use fractality_core::{FamilyViewConfig, LayoutConfig};

    #[test]
    fn test_branches_shrink_by_level() {
        let graph = TestDataGenerator::default()
            .generate(TestPattern::Balanced)
            .unwrap();
        let view = compute_family_view(
            &graph,
            "node-1",
            &FamilyViewConfig {
                context_depth: 1,
                max_context: 4,
                ..Default::default()
            },
        );
        let config = LayoutConfig::default();
        let positions = FractalTreeLayout.compute(&LayoutInput {
            graph: &graph,
            view: &view,
            config: &config,
            seed: 0,
        });
        assert_eq!(positions.len(), view.len());
        assert_eq!(positions["node-1"], Vec3::ZERO);

        // children of the focus are one trunk length away
        let child = positions["node-1-0"];
        assert!((child.length() - 6.0).abs() < 1e-3);
        // grandchildren hang one shorter segment further out
        let grandchild = positions["node-1-0-0"];
        assert!((grandchild.distance(child) - 4.5).abs() < 1e-3);
        // siblings route through the parent
        let parent = positions["root"];
        let sibling = positions["node-0"];
        assert!((sibling.distance(parent) - 4.5).abs() < 1e-3);
    }
}
