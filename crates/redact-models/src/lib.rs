//! Shared data models for the video redaction pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Redaction regions and their class taxonomy
//! - Redaction patterns (pixelation, blur, solid fill)
//! - Pipeline configuration
//! - Batch outcome reporting

pub mod config;
pub mod pattern;
pub mod region;
pub mod summary;

// Re-export common types
pub use config::{RedactionConfig, ShrinkRatios};
pub use pattern::RedactionPattern;
pub use region::{Region, RegionClass, RegionSource};
pub use summary::{BatchSummary, VideoOutcome};
