//! Pipeline stages
//!
//! The evidence cache stage and the plumbing shared by stages: cooperative
//! cancellation and the per-run execution log.

pub mod cache_options;
pub mod cache_service;
pub mod cancellation;
pub mod evidence_cache;
pub mod execution_log;

pub use cache_options::{EvidenceCachePipelineOptions, EvidenceCacheRequest, EvidenceCacheRetention};
pub use cache_service::{
    CacheError, EvidenceCacheArtifact, EvidenceCacheManifest, EvidenceCacheOutcome, EvidenceCacheResult,
    EvidenceCacheService, FileEvidenceCacheService,
};
pub use cancellation::CancellationToken;
pub use evidence_cache::EvidenceCacheCoordinator;
pub use execution_log::{ExecutionLog, ExecutionLogEntry};

use thiserror::Error;

/// Failures that halt a pipeline stage
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid options: {0}")]
    InvalidOptions(#[from] validator::ValidationErrors),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("Pipeline stage cancelled")]
    Cancelled,
}
