use super::{LayoutInput, Layouter, Positions};
use fractality_core::{GOLDEN_ANGLE, Kinship, LayoutKind, Vec3};

/// Even distribution over a sphere; the focus sits at its center.
#[derive(Debug, Clone, Copy, Default)]
pub struct FibonacciSphereLayout;

impl Layouter for FibonacciSphereLayout {
    fn kind(&self) -> LayoutKind {
        LayoutKind::FibonacciSphere
    }

    fn compute(&self, input: &LayoutInput<'_>) -> Positions {
        let radius = input.config.sphere.radius;
        let n = input.view.len() as f32;
        input
            .view
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                if entry.role == Kinship::Focus {
                    return (entry.id.clone(), Vec3::ZERO);
                }
                let i = i as f32;
                let theta = (1.0 - 2.0 * (i + 0.5) / n).clamp(-1.0, 1.0).acos();
                let phi = i * GOLDEN_ANGLE;
                let p = Vec3::new(
                    theta.sin() * phi.cos(),
                    theta.sin() * phi.sin(),
                    theta.cos(),
                ) * radius;
                (entry.id.clone(), p)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::family_view::compute_family_view;
    use crate::testdata::{TestDataGenerator, TestPattern};
    use fractality_core::{FamilyViewConfig, LayoutConfig};

    #[test]
    fn test_points_lie_on_sphere_except_focus() {
        let graph = TestDataGenerator::default()
            .generate(TestPattern::Balanced)
            .unwrap();
        let view = compute_family_view(&graph, "node-2", &FamilyViewConfig::default());
        let config = LayoutConfig::default();
        let positions = FibonacciSphereLayout.compute(&LayoutInput {
            graph: &graph,
            view: &view,
            config: &config,
            seed: 0,
        });
        for (id, p) in &positions {
            if id.as_str() == "node-2" {
                assert_eq!(*p, Vec3::ZERO);
            } else {
                assert!((p.length() - 10.0).abs() < 1e-3, "{id} off sphere");
            }
        }
    }
}
