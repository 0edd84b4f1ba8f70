//! Orchestration layer: the driver that sequences the release steps

pub mod release_pipeline;

pub use release_pipeline::{ReleasePipeline, ReleaseReport};
