//! Multi-layer region fusion.
//!
//! Reconciles the outputs of up to three detector layers into one
//! canonical redaction set per frame, with track and history fallback
//! bridging short detection gaps.

pub mod dedup;
pub mod engine;
pub mod shrink;
pub mod state;

pub use dedup::merge_regions;
pub use engine::{FusionEngine, FusionOutcome, SourceBreakdown};
pub use shrink::shrink_box;
pub use state::{FallbackHistory, Track, TrackStore};
