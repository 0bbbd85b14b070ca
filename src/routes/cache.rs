//! Evidence cache route handler

use crate::error::ApiResult;
use crate::models::SuccessResponse;
use crate::pipeline::{EvidenceCachePipelineOptions, EvidenceCacheResult, ExecutionLog};
use crate::state::SharedState;
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheRequest {
    /// Absent options skip the stage
    #[serde(default)]
    pub options: Option<EvidenceCachePipelineOptions>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheResponse {
    pub result: Option<EvidenceCacheResult>,
    pub log: ExecutionLog,
}

/// Reuse or persist the evidence cache entry for the given inputs
pub async fn cache_evidence(
    State(state): State<SharedState>,
    Json(payload): Json<CacheRequest>,
) -> ApiResult<Json<SuccessResponse<CacheResponse>>> {
    let defaults = &state.settings.evidence_cache;
    let options = payload.options.map(|mut options| {
        if options.root_directory.is_none() {
            options.root_directory = defaults.root_directory.clone();
        }
        if options.retention.is_none() {
            options.retention = defaults.retention.clone();
        }
        options
    });

    let mut log = ExecutionLog::new();
    let result = state
        .evidence_cache
        .cache(options.as_ref(), &mut log, &state.shutdown)
        .await?;

    let message = match &result {
        Some(r) => format!("Evidence cache {}", r.outcome),
        None => "Evidence cache skipped".to_string(),
    };

    Ok(Json(SuccessResponse::with_data(message, CacheResponse { result, log })))
}
