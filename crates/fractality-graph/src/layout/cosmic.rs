use super::{LayoutInput, Layouter, Positions};
use fractality_core::{Kinship, LayoutKind, NodeId, Vec3, stable_hash};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::collections::HashMap;

/// Smallest distance used in force terms, so coincident points stay finite.
const MIN_DISTANCE: f32 = 0.01;

/// Force-directed relaxation from a seeded random scatter. The focus is pinned
/// at the origin and never displaced.
#[derive(Debug, Clone, Copy, Default)]
pub struct CosmicWebLayout;

impl CosmicWebLayout {
    fn scatter(ids: &[&NodeId], focus: usize, bounds: f32, seed: u64) -> Vec<Vec3> {
        let mut rng = StdRng::seed_from_u64(seed);
        ids.iter()
            .enumerate()
            .map(|(i, _)| {
                let p = Vec3::new(
                    rng.gen_range(-bounds..=bounds),
                    rng.gen_range(-bounds..=bounds),
                    rng.gen_range(-bounds..=bounds),
                );
                if i == focus { Vec3::ZERO } else { p }
            })
            .collect()
    }
}

impl Layouter for CosmicWebLayout {
    fn kind(&self) -> LayoutKind {
        LayoutKind::CosmicWeb
    }

    fn compute(&self, input: &LayoutInput<'_>) -> Positions {
        let web = &input.config.cosmic_web;
        let ids: Vec<&NodeId> = input.view.ids().collect();
        let Some(focus) = input
            .view
            .entries
            .iter()
            .position(|e| e.role == Kinship::Focus)
        else {
            return Positions::new();
        };

        let index: HashMap<&NodeId, usize> =
            ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        // Undirected parent-child edges between visible nodes.
        let mut neighbours: Vec<Vec<usize>> = vec![Vec::new(); ids.len()];
        for (i, id) in ids.iter().enumerate() {
            if let Some(parent) = input.graph.get(id.as_str()).and_then(|n| n.parent_id.as_ref())
                && let Some(&p) = index.get(parent)
            {
                neighbours[i].push(p);
                neighbours[p].push(i);
            }
        }

        let bounds = web.bounds.abs().max(MIN_DISTANCE);
        let seed = input.seed ^ stable_hash(ids[focus].as_str());
        let mut positions = Self::scatter(&ids, focus, bounds, seed);

        for _ in 0..web.iterations {
            let snapshot = &positions;
            let displacements: Vec<Vec3> = (0..ids.len())
                .into_par_iter()
                .map(|i| {
                    if i == focus {
                        return Vec3::ZERO;
                    }
                    let here = snapshot[i];
                    let mut force = Vec3::ZERO;

                    for &j in &neighbours[i] {
                        let delta = snapshot[j] - here;
                        let dist = delta.length().max(MIN_DISTANCE);
                        force += delta.normalized() * (web.k * web.strength / dist);
                    }

                    for (j, other) in snapshot.iter().enumerate() {
                        if j == i {
                            continue;
                        }
                        let delta = here - *other;
                        let raw = delta.length();
                        if raw >= web.node_radius {
                            continue;
                        }
                        let dist = raw.max(MIN_DISTANCE);
                        // Coincident points separate along a fixed axis.
                        let dir = if raw > 0.0 { delta / raw } else { Vec3::UP };
                        force += dir * (web.k / (dist * dist));
                    }

                    match web.max_step {
                        Some(cap) if force.length() > cap => force * (cap / force.length()),
                        _ => force,
                    }
                })
                .collect();

            for (i, d) in displacements.into_iter().enumerate() {
                if i != focus {
                    positions[i] += d;
                }
            }
        }

        ids.into_iter()
            .cloned()
            .zip(positions)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::family_view::compute_family_view;
    use crate::testdata::{TestDataGenerator, TestPattern};
    use fractality_core::{FamilyViewConfig, LayoutConfig};

    fn wide_view() -> (crate::store::Graph, crate::family_view::FamilyView) {
        let graph = TestDataGenerator::default()
            .generate(TestPattern::Wide)
            .unwrap();
        let view = compute_family_view(
            &graph,
            "root",
            &FamilyViewConfig {
                max_children: 49,
                ..Default::default()
            },
        );
        (graph, view)
    }

    #[test]
    fn test_focus_pinned_and_seeded() {
        let (graph, view) = wide_view();
        assert_eq!(view.len(), 50);
        let config = LayoutConfig::default();
        let input = LayoutInput {
            graph: &graph,
            view: &view,
            config: &config,
            seed: 42,
        };
        let a = CosmicWebLayout.compute(&input);
        let b = CosmicWebLayout.compute(&input);
        assert_eq!(a, b);
        assert_eq!(a["root"], Vec3::ZERO);
        assert!(a.iter().filter(|(id, _)| id.as_str() != "root").all(|(_, p)| *p != Vec3::ZERO));

        let other = CosmicWebLayout.compute(&LayoutInput { seed: 43, ..input });
        assert_ne!(a, other);
    }

    #[test]
    fn test_steps_are_bounded_when_capped() {
        let (graph, view) = wide_view();
        let mut config = LayoutConfig::default();
        assert_eq!(config.cosmic_web.max_step, None);
        config.cosmic_web.max_step = Some(2.0);
        config.cosmic_web.iterations = 0;
        let before = CosmicWebLayout.compute(&LayoutInput {
            graph: &graph,
            view: &view,
            config: &config,
            seed: 1,
        });
        config.cosmic_web.iterations = 1;
        let after = CosmicWebLayout.compute(&LayoutInput {
            graph: &graph,
            view: &view,
            config: &config,
            seed: 1,
        });
        for (id, p) in &before {
            assert!(p.distance(after[id]) <= 2.0 + 1e-4);
        }
    }
}
