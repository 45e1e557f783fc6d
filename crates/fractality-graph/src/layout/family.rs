use super::{LayoutInput, Layouter, Positions};
use fractality_core::{GOLDEN_ANGLE, Kinship, LayoutKind, NodeId, Vec3};
use std::collections::BTreeMap;
use std::f32::consts::TAU;

/// Focus at the origin, parent behind it, siblings on a frontal arc, children
/// on a Vogel sunflower spiral and context kin on outer rings.
#[derive(Debug, Clone, Copy, Default)]
pub struct FamilyLayout;

impl Layouter for FamilyLayout {
    fn kind(&self) -> LayoutKind {
        LayoutKind::Family
    }

    fn compute(&self, input: &LayoutInput<'_>) -> Positions {
        let cfg = &input.config.positions;
        let mut positions = Positions::with_capacity(input.view.len());
        let focus_depth = input
            .focus()
            .and_then(|f| input.graph.get(f.as_str()))
            .map_or(0, |n| n.depth);

        let mut siblings: Vec<&NodeId> = Vec::new();
        let mut children: Vec<&NodeId> = Vec::new();
        let mut rings: BTreeMap<u32, Vec<&NodeId>> = BTreeMap::new();
        let parent_offset = Vec3::from_array(cfg.parent_offset);

        for entry in &input.view.entries {
            match entry.role {
                Kinship::Focus => {
                    positions.insert(entry.id.clone(), Vec3::ZERO);
                }
                Kinship::Parent => {
                    positions.insert(entry.id.clone(), parent_offset);
                }
                Kinship::Grandparent => {
                    positions.insert(entry.id.clone(), parent_offset * 2.0);
                }
                Kinship::Sibling => siblings.push(&entry.id),
                Kinship::Child => children.push(&entry.id),
                Kinship::Context { hops } => rings.entry(hops).or_default().push(&entry.id),
            }
        }

        let n = siblings.len() as f32;
        for (i, id) in siblings.into_iter().enumerate() {
            let angle = cfg.sibling_arc * (i as f32 + 0.5) / n;
            positions.insert(
                id.clone(),
                Vec3::new(
                    cfg.sibling_radius * angle.cos(),
                    cfg.sibling_height,
                    cfg.sibling_radius * angle.sin(),
                ),
            );
        }

        let n = children.len() as f32;
        for (i, id) in children.into_iter().enumerate() {
            let t = i as f32 / n;
            let angle = i as f32 * GOLDEN_ANGLE;
            let radius = cfg.child_radius * t.sqrt() * cfg.child_tightness;
            positions.insert(
                id.clone(),
                Vec3::new(
                    radius * angle.cos(),
                    (t - 0.5) * cfg.child_radius * 0.5 + cfg.child_height_offset,
                    radius * angle.sin() + cfg.child_depth_offset,
                ),
            );
        }

        for (hops, ring) in rings {
            let radius =
                cfg.context_radius + cfg.context_ring_step * (hops.saturating_sub(1)) as f32;
            let m = ring.len() as f32;
            for (j, id) in ring.into_iter().enumerate() {
                let angle = TAU * j as f32 / m;
                let depth = input.graph.get(id.as_str()).map_or(focus_depth, |n| n.depth);
                let dy = (depth as f32 - focus_depth as f32) * cfg.context_height_step;
                positions.insert(
                    id.clone(),
                    Vec3::new(radius * angle.cos(), dy, radius * angle.sin()),
                );
            }
        }

        positions
    }
}
