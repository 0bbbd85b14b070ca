//! Entity ordering route handlers

use crate::error::{validation_error, ApiResult};
use crate::models::{EntityIdentity, Model, NamingOverrides, SuccessResponse};
use crate::ordering::{
    CircularDependencyOptions, EntityDependencySorter, EntityOrdering, TopologicalOrderingValidator,
    TopologicalValidationResult,
};
use crate::state::SharedState;
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::debug;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SortRequest {
    #[validate(nested)]
    pub model: Model,
    #[serde(default)]
    #[validate(nested)]
    pub naming: Option<NamingOverrides>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ValidateOrderRequest {
    /// When absent, the model is sorted first and that order is validated
    #[serde(default)]
    pub ordered: Option<Vec<EntityIdentity>>,
    #[serde(default)]
    #[validate(nested)]
    pub model: Option<Model>,
    #[serde(default)]
    #[validate(nested)]
    pub naming: Option<NamingOverrides>,
    #[serde(default)]
    #[validate(nested)]
    pub circular_dependencies: Option<CircularDependencyOptions>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateOrderResponse {
    pub ordered: Vec<EntityIdentity>,
    pub validation: TopologicalValidationResult,
    pub can_proceed: bool,
}

/// Sort the model's entities parents-first
pub async fn sort(
    State(state): State<SharedState>,
    Json(payload): Json<SortRequest>,
) -> ApiResult<Json<SuccessResponse<EntityOrdering>>> {
    payload.validate()?;
    let naming = payload.naming.as_ref().unwrap_or(&state.settings.naming);

    let ordering = EntityDependencySorter::sort(&payload.model, naming);
    let message = if ordering.is_acyclic() {
        format!("Sorted {} entities", ordering.ordered.len())
    } else {
        format!(
            "Sorted {} entities; {} are in dependency cycles",
            ordering.ordered.len(),
            ordering.cyclic.len()
        )
    };

    Ok(Json(SuccessResponse::with_data(message, ordering)))
}

/// Validate an emission order against the model's constraints
pub async fn validate(
    State(state): State<SharedState>,
    Json(payload): Json<ValidateOrderRequest>,
) -> ApiResult<Json<SuccessResponse<ValidateOrderResponse>>> {
    payload.validate()?;
    let naming = payload.naming.as_ref().unwrap_or(&state.settings.naming);
    let circular = payload
        .circular_dependencies
        .as_ref()
        .unwrap_or(&state.settings.circular_dependencies);

    let ordered = match (payload.ordered, payload.model.as_ref()) {
        (Some(ordered), _) => ordered,
        (None, Some(model)) => {
            debug!("No ordering supplied; sorting the model first");
            EntityDependencySorter::sort(model, naming).ordered
        }
        (None, None) => return Err(validation_error("Supply an ordering, a model, or both")),
    };

    let validation = TopologicalOrderingValidator::validate(&ordered, payload.model.as_ref(), naming, circular);
    let message = if validation.is_valid {
        "Ordering is valid".to_string()
    } else {
        format!(
            "Ordering has {} child-before-parent violations",
            validation.child_before_parent_count()
        )
    };
    let can_proceed = validation.can_proceed();

    Ok(Json(SuccessResponse::with_data(
        message,
        ValidateOrderResponse {
            ordered,
            validation,
            can_proceed,
        },
    )))
}
