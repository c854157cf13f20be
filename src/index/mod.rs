//! Similarity indexes (§4.4) and score fusion (§4.5): one in-memory index
//! per enabled vector analyzer, plus the jukebox wrapper for the timbre
//! analyzer's native similarity call, combined by a `FusionPlan`.

pub mod fusion;
pub mod jukebox;
pub mod kdtree;
pub mod neighbor;
pub mod style;

pub use fusion::{AnalyzerId, FusionPlan};
pub use jukebox::TimbreIndex;
pub use kdtree::VectorIndex;
pub use neighbor::Neighbor;
pub use style::select_style_subset;
