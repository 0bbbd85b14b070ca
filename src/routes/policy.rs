//! Tightening route handlers

use crate::error::{ApiResult, AppError};
use crate::models::{Model, SuccessResponse};
use crate::policy::{
    DecisionLog, PolicyDecisionReport, PolicyDecisionReporter, PolicyDecisionSet, TighteningOptions,
    TighteningPolicy,
};
use crate::snapshot::ProfileSnapshot;
use crate::state::SharedState;
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::debug;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct DecideRequest {
    #[validate(nested)]
    pub model: Model,
    #[serde(default)]
    pub profile: ProfileSnapshot,
    /// Falls back to the configured defaults
    #[serde(default)]
    #[validate(nested)]
    pub options: Option<TighteningOptions>,
    #[serde(default)]
    pub include_decision_log: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecideResponse {
    pub decisions: PolicyDecisionSet,
    pub report: PolicyDecisionReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision_log: Option<serde_json::Value>,
}

/// Run the tightening policy over a model and its profile
pub async fn decide(
    State(state): State<SharedState>,
    Json(payload): Json<DecideRequest>,
) -> ApiResult<Json<SuccessResponse<DecideResponse>>> {
    payload.validate()?;

    let options = payload.options.as_ref().unwrap_or(&state.settings.tightening);
    debug!(
        "Deciding tightening for {} entities ({} profiled columns)",
        payload.model.entities.len(),
        payload.profile.columns.len()
    );

    let decisions = TighteningPolicy::decide(&payload.model, &payload.profile, options);
    let report = PolicyDecisionReporter::create(&decisions);

    let decision_log = if payload.include_decision_log {
        let log = DecisionLog::build(&decisions, &report);
        Some(serde_json::to_value(&log).map_err(|e| AppError::Internal(e.to_string()))?)
    } else {
        None
    };

    let message = format!(
        "{} decisions ({} columns tightened, {} unique indexes enforced, {} foreign keys created)",
        report.decision_count(),
        report.columns.applied,
        report.unique_indexes.applied,
        report.foreign_keys.applied
    );

    Ok(Json(SuccessResponse::with_data(
        message,
        DecideResponse {
            decisions,
            report,
            decision_log,
        },
    )))
}
