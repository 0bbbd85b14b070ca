//! Evidence cache options as supplied by the pipeline caller

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use validator::Validate;

/// Eviction policy over stored manifests
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceCacheRetention {
    /// Entries older than this are evicted
    #[serde(default, alias = "max_age_seconds")]
    pub max_age_seconds: Option<u64>,
    /// Keep at most this many entries, newest first
    #[serde(default, alias = "max_entries")]
    #[validate(range(min = 1, message = "maxEntries must be at least 1"))]
    pub max_entries: Option<usize>,
}

impl EvidenceCacheRetention {
    pub fn is_unbounded(&self) -> bool {
        self.max_age_seconds.is_none() && self.max_entries.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceCachePipelineOptions {
    /// No root means caching is disabled for this run
    #[serde(default)]
    pub root_directory: Option<PathBuf>,
    #[serde(default)]
    pub refresh: bool,
    #[validate(length(min = 1, message = "command must not be empty"))]
    pub command: String,
    pub model_path: PathBuf,
    #[serde(default)]
    pub profile_path: Option<PathBuf>,
    #[serde(default)]
    pub dmm_path: Option<PathBuf>,
    #[serde(default)]
    pub config_path: Option<PathBuf>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default)]
    #[validate(nested)]
    pub retention: Option<EvidenceCacheRetention>,
}

/// Fully resolved request handed to the cache service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidenceCacheRequest {
    pub root_directory: PathBuf,
    pub command: String,
    pub model_path: PathBuf,
    pub profile_path: Option<PathBuf>,
    pub dmm_path: Option<PathBuf>,
    pub config_path: Option<PathBuf>,
    pub metadata: BTreeMap<String, String>,
    pub refresh: bool,
    pub retention: EvidenceCacheRetention,
}

impl EvidenceCacheRequest {
    /// Governing input files with their fingerprint labels, in fixed order
    pub fn inputs(&self) -> Vec<(&'static str, &PathBuf)> {
        let mut inputs = vec![("model", &self.model_path)];
        if let Some(path) = &self.profile_path {
            inputs.push(("profile", path));
        }
        if let Some(path) = &self.dmm_path {
            inputs.push(("dmm", path));
        }
        if let Some(path) = &self.config_path {
            inputs.push(("config", path));
        }
        inputs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_validation() {
        let mut options = EvidenceCachePipelineOptions {
            command: "build-ssdt".to_string(),
            model_path: PathBuf::from("model.json"),
            ..Default::default()
        };
        assert!(options.validate().is_ok());

        options.retention = Some(EvidenceCacheRetention {
            max_age_seconds: None,
            max_entries: Some(0),
        });
        assert!(options.validate().is_err());

        options.retention = None;
        options.command.clear();
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_inputs_skip_absent_paths() {
        let request = EvidenceCacheRequest {
            root_directory: PathBuf::from("cache"),
            command: "build".to_string(),
            model_path: PathBuf::from("model.json"),
            profile_path: None,
            dmm_path: None,
            config_path: Some(PathBuf::from("config.json")),
            metadata: BTreeMap::new(),
            refresh: false,
            retention: EvidenceCacheRetention::default(),
        };
        let labels: Vec<&str> = request.inputs().into_iter().map(|(label, _)| label).collect();
        assert_eq!(labels, vec!["model", "config"]);
    }
}
