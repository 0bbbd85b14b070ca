//! Evidence Cache Coordinator
//!
//! Turns pipeline options into a cache request, delegates to the cache
//! service and records what happened in the execution log. Caching is optional:
//! without options or a root directory the stage is a logged no-op.

use crate::pipeline::cache_options::{EvidenceCachePipelineOptions, EvidenceCacheRequest};
use crate::pipeline::cache_service::{CacheError, EvidenceCacheOutcome, EvidenceCacheResult, EvidenceCacheService};
use crate::pipeline::cancellation::CancellationToken;
use crate::pipeline::execution_log::ExecutionLog;
use crate::pipeline::PipelineError;
use std::collections::BTreeMap;
use tracing::{error, info};
use validator::Validate;

pub const STEP_SKIPPED: &str = "evidence.cache.skipped";
pub const STEP_REQUESTED: &str = "evidence.cache.requested";
pub const STEP_REUSED: &str = "evidence.cache.reused";
pub const STEP_PERSISTED: &str = "evidence.cache.persisted";
pub const STEP_FAILED: &str = "evidence.cache.failed";

pub struct EvidenceCacheCoordinator<S> {
    service: S,
}

impl<S: EvidenceCacheService> EvidenceCacheCoordinator<S> {
    pub fn new(service: S) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub async fn cache(
        &self,
        options: Option<&EvidenceCachePipelineOptions>,
        log: &mut ExecutionLog,
        cancel: &CancellationToken,
    ) -> Result<Option<EvidenceCacheResult>, PipelineError> {
        let Some((options, root)) = options.and_then(|o| {
            o.root_directory
                .as_ref()
                .filter(|r| !r.as_os_str().is_empty())
                .map(|r| (o, r.clone()))
        }) else {
            log.record(STEP_SKIPPED, "Evidence cache not configured");
            return Ok(None);
        };

        options.validate()?;
        if options.model_path.as_os_str().is_empty() {
            return Err(PipelineError::Configuration(
                "Evidence cache requires a model path".to_string(),
            ));
        }
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let request = EvidenceCacheRequest {
            root_directory: root,
            command: options.command.clone(),
            model_path: options.model_path.clone(),
            profile_path: options.profile_path.clone(),
            dmm_path: options.dmm_path.clone(),
            config_path: options.config_path.clone(),
            metadata: options.metadata.clone(),
            refresh: options.refresh,
            retention: options.retention.clone().unwrap_or_default(),
        };

        log.record_with(
            STEP_REQUESTED,
            "Evaluating evidence cache",
            BTreeMap::from([
                ("root".to_string(), request.root_directory.display().to_string()),
                ("command".to_string(), request.command.clone()),
                ("refresh".to_string(), request.refresh.to_string()),
            ]),
        );

        let result = match self.service.cache(&request, cancel).await {
            Ok(result) => result,
            Err(CacheError::Cancelled) => {
                log.record(STEP_FAILED, "Evidence cache cancelled");
                return Err(PipelineError::Cancelled);
            }
            Err(e) => {
                error!("Evidence cache failed: {}", e);
                log.record(STEP_FAILED, e.to_string());
                return Err(e.into());
            }
        };

        let mut metadata = BTreeMap::from([
            ("directory".to_string(), result.cache_directory.display().to_string()),
            ("artifacts".to_string(), result.manifest.artifacts.len().to_string()),
            ("key".to_string(), result.manifest.key.clone()),
            ("outcome".to_string(), result.outcome.to_string()),
        ]);
        metadata.extend(result.evaluation.iter().map(|(k, v)| (k.clone(), v.clone())));

        let (step, message) = match result.outcome {
            EvidenceCacheOutcome::Reused => (STEP_REUSED, "Reused cached evidence"),
            EvidenceCacheOutcome::Persisted => (STEP_PERSISTED, "Persisted evidence to cache"),
        };
        log.record_with(step, message, metadata);
        info!("{} at {}", message, result.cache_directory.display());

        Ok(Some(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::cache_options::EvidenceCacheRetention;
    use crate::pipeline::cache_service::{EvidenceCacheManifest, FileEvidenceCacheService};
    use chrono::Utc;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn options(dir: &tempfile::TempDir) -> EvidenceCachePipelineOptions {
        std::fs::write(dir.path().join("model.json"), "{}").unwrap();
        EvidenceCachePipelineOptions {
            root_directory: Some(dir.path().join("cache")),
            command: "build-ssdt".to_string(),
            model_path: dir.path().join("model.json"),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_no_options_is_logged_noop() {
        let coordinator = EvidenceCacheCoordinator::new(FileEvidenceCacheService::new());
        let mut log = ExecutionLog::new();

        let result = coordinator.cache(None, &mut log, &CancellationToken::new()).await.unwrap();
        assert!(result.is_none());
        assert_eq!(log.entries()[0].step, STEP_SKIPPED);

        let no_root = EvidenceCachePipelineOptions {
            command: "build".to_string(),
            model_path: PathBuf::from("model.json"),
            ..Default::default()
        };
        let result = coordinator
            .cache(Some(&no_root), &mut log, &CancellationToken::new())
            .await
            .unwrap();
        assert!(result.is_none());
        assert_eq!(log.find(STEP_SKIPPED).count(), 2);
    }

    #[tokio::test]
    async fn test_reuse_then_refresh() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = EvidenceCacheCoordinator::new(FileEvidenceCacheService::new());
        let cancel = CancellationToken::new();
        let mut log = ExecutionLog::new();
        let mut options = options(&dir);

        let first = coordinator.cache(Some(&options), &mut log, &cancel).await.unwrap().unwrap();
        let second = coordinator.cache(Some(&options), &mut log, &cancel).await.unwrap().unwrap();
        assert_eq!(first.outcome, EvidenceCacheOutcome::Persisted);
        assert_eq!(second.outcome, EvidenceCacheOutcome::Reused);
        assert_eq!(first.manifest.key, second.manifest.key);

        options.refresh = true;
        let third = coordinator.cache(Some(&options), &mut log, &cancel).await.unwrap().unwrap();
        assert_eq!(third.outcome, EvidenceCacheOutcome::Persisted);

        let reused = log.find(STEP_REUSED).next().unwrap();
        assert_eq!(reused.metadata["artifacts"], "1");
        assert_eq!(reused.metadata["key"], first.manifest.key);
        assert_eq!(log.find(STEP_PERSISTED).count(), 2);
    }

    #[tokio::test]
    async fn test_invalid_options_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = EvidenceCacheCoordinator::new(FileEvidenceCacheService::new());
        let mut log = ExecutionLog::new();

        let mut bad = options(&dir);
        bad.command.clear();
        let err = coordinator
            .cache(Some(&bad), &mut log, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidOptions(_)));

        let mut no_model = options(&dir);
        no_model.model_path = PathBuf::new();
        let err = coordinator
            .cache(Some(&no_model), &mut log, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));

        let mut bad_retention = options(&dir);
        bad_retention.retention = Some(EvidenceCacheRetention {
            max_age_seconds: None,
            max_entries: Some(0),
        });
        assert!(coordinator
            .cache(Some(&bad_retention), &mut log, &CancellationToken::new())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_io_failure_surfaces() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = EvidenceCacheCoordinator::new(FileEvidenceCacheService::new());
        let mut log = ExecutionLog::new();
        let mut options = options(&dir);
        options.model_path = dir.path().join("missing.json");

        let err = coordinator
            .cache(Some(&options), &mut log, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Cache(CacheError::Io { .. })));
        assert_eq!(log.find(STEP_FAILED).count(), 1);
    }

    struct CountingService {
        calls: AtomicUsize,
    }

    impl EvidenceCacheService for CountingService {
        async fn cache(
            &self,
            request: &EvidenceCacheRequest,
            _cancel: &CancellationToken,
        ) -> Result<EvidenceCacheResult, CacheError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(EvidenceCacheResult {
                manifest: EvidenceCacheManifest {
                    version: 1,
                    key: "k".to_string(),
                    command: request.command.clone(),
                    created_at: Utc::now(),
                    metadata: request.metadata.clone(),
                    artifacts: vec![],
                },
                outcome: EvidenceCacheOutcome::Persisted,
                cache_directory: request.root_directory.join("k"),
                evaluation: BTreeMap::new(),
            })
        }
    }

    #[tokio::test]
    async fn test_cancelled_before_delegating() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = EvidenceCacheCoordinator::new(CountingService {
            calls: AtomicUsize::new(0),
        });
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut log = ExecutionLog::new();

        let err = coordinator
            .cache(Some(&options(&dir)), &mut log, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));
        assert_eq!(coordinator.service().calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_delegates_once_per_call() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = EvidenceCacheCoordinator::new(CountingService {
            calls: AtomicUsize::new(0),
        });
        let mut log = ExecutionLog::new();
        let result = coordinator
            .cache(Some(&options(&dir)), &mut log, &CancellationToken::new())
            .await
            .unwrap();
        assert!(result.is_some());
        assert_eq!(coordinator.service().calls.load(Ordering::SeqCst), 1);
    }
}
