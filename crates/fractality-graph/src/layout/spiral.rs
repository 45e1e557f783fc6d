use super::{LayoutInput, Layouter, Positions};
use fractality_core::{GOLDEN_ANGLE, Kinship, LayoutKind, NodeId, Vec3};

/// Nodes along a rising golden-angle spiral, focus first then by depth.
#[derive(Debug, Clone, Copy, Default)]
pub struct GoldenSpiralLayout;

impl Layouter for GoldenSpiralLayout {
    fn kind(&self) -> LayoutKind {
        LayoutKind::GoldenSpiral
    }

    fn compute(&self, input: &LayoutInput<'_>) -> Positions {
        let spiral = &input.config.golden_spiral;
        let mut ordered: Vec<(bool, u32, &NodeId)> = input
            .view
            .entries
            .iter()
            .map(|e| {
                let depth = input.graph.get(e.id.as_str()).map_or(u32::MAX, |n| n.depth);
                (e.role != Kinship::Focus, depth, &e.id)
            })
            .collect();
        // Stable: equal depths keep view order.
        ordered.sort_by_key(|(not_focus, depth, _)| (*not_focus, *depth));

        let n = ordered.len() as f32;
        ordered
            .into_iter()
            .enumerate()
            .map(|(i, (_, _, id))| {
                let i = i as f32;
                let angle = i * GOLDEN_ANGLE;
                let radius = spiral.a + spiral.b * i.sqrt();
                let y = spiral.c * i - n * spiral.c / 2.0;
                (id.clone(), Vec3::new(radius * angle.cos(), y, radius * angle.sin()))
            })
            .collect()
    }
}
