//! Append-only execution log
//!
//! Pipeline telemetry for one run, kept separate from process logging so it
//! can be returned to callers and written next to the artifacts. Stages take
//! `&mut ExecutionLog`; nothing else holds on to it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionLogEntry {
    pub id: Uuid,
    pub step: String,
    pub message: String,
    pub metadata: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionLog {
    entries: Vec<ExecutionLogEntry>,
}

impl ExecutionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, step: impl Into<String>, message: impl Into<String>) {
        self.record_with(step, message, BTreeMap::new());
    }

    pub fn record_with(
        &mut self,
        step: impl Into<String>,
        message: impl Into<String>,
        metadata: BTreeMap<String, String>,
    ) {
        let entry = ExecutionLogEntry {
            id: Uuid::new_v4(),
            step: step.into(),
            message: message.into(),
            metadata,
            timestamp: Utc::now(),
        };
        debug!(step = %entry.step, "{}", entry.message);
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[ExecutionLogEntry] {
        &self.entries
    }

    /// Entries recorded for `step`, oldest first
    pub fn find(&self, step: &str) -> impl Iterator<Item = &ExecutionLogEntry> {
        let step = step.to_string();
        self.entries.iter().filter(move |e| e.step == step)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
