pub mod context;
pub mod family_view;
pub mod layout;
pub mod serialize;
pub mod store;
pub mod testdata;

pub use context::{
    AccessTracker, ContextScorer, Hint, NavigationHints, NodeAnalysis, ScoringWeights,
    count_descendants, sibling_rank,
};
pub use family_view::{
    FamilyView, FamilyViewSelector, PriorityWeights, VisibleNode, compute_family_view, kinship,
};
pub use layout::{
    CosmicWebLayout, FamilyLayout, FibonacciSphereLayout, FractalTreeLayout, GoldenSpiralLayout,
    LayoutEngine, LayoutInput, Layouter, Positions, layouter_for,
};
pub use serialize::{
    SerializedGraph, SerializedNode, from_json_slice, from_json_str, from_json_value,
};
pub use store::Graph;
pub use testdata::{TestDataGenerator, TestPattern};
