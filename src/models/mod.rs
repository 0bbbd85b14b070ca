//! Data model consumed by the tightening engine and the ordering validator
//!
//! Produced by the model ingestion collaborator; read-only here. Also holds
//! the generic API response envelope.

pub mod entity;
pub mod foreign_key;
pub mod naming;

// Re-export commonly used types
pub use entity::*;
pub use foreign_key::*;
pub use naming::{EffectiveNameResolver, NamingOverrideRule, NamingOverrides};

use serde::Serialize;

/// Generic success response
/// Body of every successful API response
#[derive(Debug, Serialize)]
pub struct SuccessResponse<T: Serialize> {
    pub success: bool,
    pub message: String,
    #[serde(flatten)]
    pub data: Option<T>,
}

impl<T: Serialize> SuccessResponse<T> {
    pub fn with_data(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }
}
