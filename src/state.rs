//! Application state management
//!
//! Contains shared state accessible across all handlers. The engine and
//! validator are stateless; only the evidence cache coordinator (and its
//! per-key locks) lives here.

use crate::config::Settings;
use crate::pipeline::{CancellationToken, EvidenceCacheCoordinator, FileEvidenceCacheService};
use std::sync::Arc;

pub struct AppState {
    pub settings: Settings,
    pub evidence_cache: EvidenceCacheCoordinator<FileEvidenceCacheService>,
    /// Cancelled once the server starts shutting down
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            evidence_cache: EvidenceCacheCoordinator::new(FileEvidenceCacheService::new()),
            shutdown: CancellationToken::new(),
        }
    }
}

/// Type alias for shared state
pub type SharedState = Arc<AppState>;
