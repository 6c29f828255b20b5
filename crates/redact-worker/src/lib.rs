//! Batch worker driving the redaction pipeline over a directory of
//! videos.

pub mod batch;
pub mod config;
pub mod error;

pub use batch::BatchRunner;
pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
