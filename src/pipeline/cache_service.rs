//! Evidence cache service
//!
//! A cache entry is a directory named by the fingerprint of its governing
//! inputs, holding copies of those inputs and a `manifest.json`. An entry is
//! reused only when its manifest parses, carries the same key, and every
//! listed artifact is still present with its recorded length.
//!
//! Concurrency: work on one entry directory is serialized by an in-process
//! lock, and retention on one root by another. Retention never evicts an
//! entry whose lock is held, and an entry that vanished mid-eviction counts as
//! already gone. The manifest is written to a temp file and renamed into
//! place, so concurrent processes never observe a half-written manifest (last
//! writer wins).

use crate::pipeline::cache_options::{EvidenceCacheRequest, EvidenceCacheRetention};
use crate::pipeline::cancellation::CancellationToken;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const MANIFEST_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt cache manifest at {path}: {source}")]
    CorruptManifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize cache manifest: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Evidence cache operation cancelled")]
    Cancelled,
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> CacheError + '_ {
    move |source| CacheError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceCacheArtifact {
    /// model / profile / dmm / config
    pub label: String,
    pub source_path: PathBuf,
    /// File name inside the cache directory
    pub file_name: String,
    pub sha256: String,
    pub length: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceCacheManifest {
    pub version: u32,
    pub key: String,
    pub command: String,
    pub created_at: DateTime<Utc>,
    pub metadata: BTreeMap<String, String>,
    pub artifacts: Vec<EvidenceCacheArtifact>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceCacheOutcome {
    Reused,
    Persisted,
}

impl std::fmt::Display for EvidenceCacheOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvidenceCacheOutcome::Reused => write!(f, "reused"),
            EvidenceCacheOutcome::Persisted => write!(f, "persisted"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceCacheResult {
    pub manifest: EvidenceCacheManifest,
    pub outcome: EvidenceCacheOutcome,
    pub cache_directory: PathBuf,
    /// Why the entry was reused or rebuilt, and what retention evicted
    pub evaluation: BTreeMap<String, String>,
}

/// Storage behind the evidence cache coordinator.
pub trait EvidenceCacheService: Send + Sync {
    /// Reuse the entry for the request's fingerprint or build it. Must not
    /// build one key twice concurrently.
    fn cache(
        &self,
        request: &EvidenceCacheRequest,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<EvidenceCacheResult, CacheError>> + Send;
}

/// A governing input after hashing
struct HashedInput {
    label: &'static str,
    path: PathBuf,
    sha256: String,
    length: u64,
}

impl HashedInput {
    fn file_name(&self) -> String {
        let base = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "input".to_string());
        format!("{}-{}", self.label, base)
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Fingerprint over command, each input path with its content hash, and
/// metadata in key order.
fn fingerprint(command: &str, inputs: &[HashedInput], metadata: &BTreeMap<String, String>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"command\0");
    hasher.update(command.as_bytes());
    hasher.update(b"\n");
    for input in inputs {
        hasher.update(input.label.as_bytes());
        hasher.update(b"\0");
        hasher.update(input.path.to_string_lossy().as_bytes());
        hasher.update(b"\0");
        hasher.update(input.sha256.as_bytes());
        hasher.update(b"\n");
    }
    for (key, value) in metadata {
        hasher.update(b"meta\0");
        hasher.update(key.as_bytes());
        hasher.update(b"\0");
        hasher.update(value.as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

fn check(cancel: &CancellationToken) -> Result<(), CacheError> {
    if cancel.is_cancelled() {
        return Err(CacheError::Cancelled);
    }
    Ok(())
}

type LockMap = Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>;

async fn lock_for(locks: &LockMap, path: &Path) -> Arc<Mutex<()>> {
    let mut locks = locks.lock().await;
    locks.entry(path.to_path_buf()).or_default().clone()
}

/// Drop the map entry once nobody else holds or awaits the lock
async fn release(locks: &LockMap, path: &Path, lock: Arc<Mutex<()>>) {
    let mut locks = locks.lock().await;
    // one reference in the map, one here
    if Arc::strong_count(&lock) == 2 {
        locks.remove(path);
    }
}

/// Remove an entry directory. Returns false when it was already gone.
async fn remove_entry(path: &Path) -> Result<bool, CacheError> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(io_error(path)(e)),
    }
}

/// File-system cache service
#[derive(Debug, Default)]
pub struct FileEvidenceCacheService {
    /// Keyed by entry directory
    entries: LockMap,
    /// Keyed by cache root
    roots: LockMap,
}

impl FileEvidenceCacheService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry directories some run currently holds or waits for
    async fn busy_entries(&self) -> HashSet<PathBuf> {
        let locks = self.entries.lock().await;
        locks
            .iter()
            .filter(|(_, lock)| Arc::strong_count(lock) > 1)
            .map(|(path, _)| path.clone())
            .collect()
    }

    /// Retention for `root`, serialized with other runs on the same root
    async fn evict(&self, root: &Path, retention: &EvidenceCacheRetention) -> Result<usize, CacheError> {
        if retention.is_unbounded() {
            return Ok(0);
        }
        let lock = lock_for(&self.roots, root).await;
        let evicted = {
            let _guard = lock.lock().await;
            let busy = self.busy_entries().await;
            Self::enforce_retention(root, retention, &busy).await
        };
        release(&self.roots, root, lock).await;
        evicted
    }

    async fn hash_inputs(
        request: &EvidenceCacheRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<HashedInput>, CacheError> {
        let mut hashed = Vec::new();
        for (label, path) in request.inputs() {
            check(cancel)?;
            let bytes = tokio::fs::read(path).await.map_err(io_error(path))?;
            hashed.push(HashedInput {
                label,
                path: path.clone(),
                sha256: sha256_hex(&bytes),
                length: bytes.len() as u64,
            });
        }
        Ok(hashed)
    }

    /// Manifest of an existing entry, if it can be reused as is
    async fn reusable(directory: &Path, key: &str) -> Result<Option<EvidenceCacheManifest>, CacheError> {
        let manifest_path = directory.join(MANIFEST_FILE);
        let raw = match tokio::fs::read(&manifest_path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(&manifest_path)(e)),
        };
        let manifest: EvidenceCacheManifest =
            serde_json::from_slice(&raw).map_err(|source| CacheError::CorruptManifest {
                path: manifest_path.clone(),
                source,
            })?;

        if manifest.key != key || manifest.version != MANIFEST_VERSION {
            debug!("Cache manifest at {} is for another key", manifest_path.display());
            return Ok(None);
        }
        for artifact in &manifest.artifacts {
            match tokio::fs::metadata(directory.join(&artifact.file_name)).await {
                Ok(meta) if meta.len() == artifact.length => {}
                _ => {
                    warn!("Cached artifact {} is missing or truncated", artifact.file_name);
                    return Ok(None);
                }
            }
        }
        Ok(Some(manifest))
    }

    async fn persist(
        directory: &Path,
        key: &str,
        request: &EvidenceCacheRequest,
        inputs: &[HashedInput],
        cancel: &CancellationToken,
    ) -> Result<EvidenceCacheManifest, CacheError> {
        tokio::fs::create_dir_all(directory)
            .await
            .map_err(io_error(directory))?;

        let mut artifacts = Vec::with_capacity(inputs.len());
        for input in inputs {
            check(cancel)?;
            let file_name = input.file_name();
            let target = directory.join(&file_name);
            tokio::fs::copy(&input.path, &target)
                .await
                .map_err(io_error(&input.path))?;
            artifacts.push(EvidenceCacheArtifact {
                label: input.label.to_string(),
                source_path: input.path.clone(),
                file_name,
                sha256: input.sha256.clone(),
                length: input.length,
            });
        }

        let manifest = EvidenceCacheManifest {
            version: MANIFEST_VERSION,
            key: key.to_string(),
            command: request.command.clone(),
            created_at: Utc::now(),
            metadata: request.metadata.clone(),
            artifacts,
        };

        check(cancel)?;
        let json = serde_json::to_vec_pretty(&manifest)?;
        let manifest_path = directory.join(MANIFEST_FILE);
        let temp_path = directory.join(format!("{}.{}.tmp", MANIFEST_FILE, uuid::Uuid::new_v4()));
        tokio::fs::write(&temp_path, &json)
            .await
            .map_err(io_error(&temp_path))?;
        tokio::fs::rename(&temp_path, &manifest_path)
            .await
            .map_err(io_error(&manifest_path))?;

        Ok(manifest)
    }

    /// Apply retention to every entry under `root` not in `busy`. The busy
    /// set always holds the caller's own entry, which keeps one slot.
    /// Returns the number of entries evicted.
    async fn enforce_retention(
        root: &Path,
        retention: &EvidenceCacheRetention,
        busy: &HashSet<PathBuf>,
    ) -> Result<usize, CacheError> {
        let mut entries: Vec<(DateTime<Utc>, PathBuf)> = Vec::new();
        let mut listing = tokio::fs::read_dir(root).await.map_err(io_error(root))?;
        while let Some(entry) = listing.next_entry().await.map_err(io_error(root))? {
            let path = entry.path();
            if busy.contains(&path) {
                debug!("Skipping busy evidence cache entry {}", path.display());
                continue;
            }
            // only directories holding a manifest are cache entries
            let Ok(meta) = tokio::fs::metadata(path.join(MANIFEST_FILE)).await else {
                continue;
            };
            let Ok(modified) = meta.modified() else {
                continue;
            };
            entries.push((DateTime::<Utc>::from(modified), path));
        }

        // newest first
        entries.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

        let mut evict = Vec::new();
        if let Some(max_age) = retention.max_age_seconds {
            let cutoff = Utc::now() - Duration::seconds(max_age.min(i32::MAX as u64) as i64);
            let (fresh, stale): (Vec<_>, Vec<_>) = entries.into_iter().partition(|(at, _)| *at >= cutoff);
            evict.extend(stale);
            entries = fresh;
        }
        if let Some(max_entries) = retention.max_entries {
            // the current entry occupies one slot
            let keep = max_entries.saturating_sub(1);
            if entries.len() > keep {
                evict.extend(entries.split_off(keep));
            }
        }

        let mut evicted = 0;
        for (_, path) in &evict {
            info!("Evicting evidence cache entry {}", path.display());
            if remove_entry(path).await? {
                evicted += 1;
            }
        }
        Ok(evicted)
    }

    async fn evaluate(
        &self,
        request: &EvidenceCacheRequest,
        inputs: &[HashedInput],
        key: &str,
        directory: &Path,
        cancel: &CancellationToken,
    ) -> Result<EvidenceCacheResult, CacheError> {
        let root = &request.root_directory;
        tokio::fs::create_dir_all(root).await.map_err(io_error(root))?;
        let evicted = self.evict(root, &request.retention).await?;

        let mut evaluation = BTreeMap::from([
            ("cache.key".to_string(), key.to_string()),
            ("cache.evicted".to_string(), evicted.to_string()),
        ]);

        let existing = if request.refresh {
            evaluation.insert("cache.reason".to_string(), "refresh-requested".to_string());
            None
        } else {
            Self::reusable(directory, key).await?
        };

        let (manifest, outcome) = match existing {
            Some(manifest) => {
                evaluation.insert("cache.reason".to_string(), "fingerprint-match".to_string());
                (manifest, EvidenceCacheOutcome::Reused)
            }
            None => {
                evaluation
                    .entry("cache.reason".to_string())
                    .or_insert_with(|| "entry-missing".to_string());
                let manifest = Self::persist(directory, key, request, inputs, cancel).await?;
                (manifest, EvidenceCacheOutcome::Persisted)
            }
        };

        info!(
            "Evidence cache {} for {} ({} artifacts)",
            outcome,
            request.command,
            manifest.artifacts.len()
        );

        Ok(EvidenceCacheResult {
            manifest,
            outcome,
            cache_directory: directory.to_path_buf(),
            evaluation,
        })
    }
}

impl EvidenceCacheService for FileEvidenceCacheService {
    async fn cache(
        &self,
        request: &EvidenceCacheRequest,
        cancel: &CancellationToken,
    ) -> Result<EvidenceCacheResult, CacheError> {
        check(cancel)?;
        let inputs = Self::hash_inputs(request, cancel).await?;
        let key = fingerprint(&request.command, &inputs, &request.metadata);

        let directory = request.root_directory.join(&key);

        let lock = lock_for(&self.entries, &directory).await;
        let result = {
            let _guard = lock.lock().await;
            self.evaluate(request, &inputs, &key, &directory, cancel).await
        };
        release(&self.entries, &directory, lock).await;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        dir: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            std::fs::write(dir.path().join("model.json"), r#"{"entities":[]}"#).unwrap();
            std::fs::write(dir.path().join("profile.json"), r#"{"columns":[]}"#).unwrap();
            Self { dir }
        }

        fn root(&self) -> PathBuf {
            self.dir.path().join("cache")
        }

        fn request(&self) -> EvidenceCacheRequest {
            EvidenceCacheRequest {
                root_directory: self.root(),
                command: "build-ssdt".to_string(),
                model_path: self.dir.path().join("model.json"),
                profile_path: Some(self.dir.path().join("profile.json")),
                dmm_path: None,
                config_path: None,
                metadata: BTreeMap::from([("mode".to_string(), "evidence_gated".to_string())]),
                refresh: false,
                retention: EvidenceCacheRetention::default(),
            }
        }
    }

    #[tokio::test]
    async fn test_second_call_reuses_entry() {
        let fixture = Fixture::new();
        let service = FileEvidenceCacheService::new();
        let cancel = CancellationToken::new();

        let first = service.cache(&fixture.request(), &cancel).await.unwrap();
        assert_eq!(first.outcome, EvidenceCacheOutcome::Persisted);
        assert_eq!(first.manifest.artifacts.len(), 2);
        assert!(first.cache_directory.join(MANIFEST_FILE).exists());

        let second = service.cache(&fixture.request(), &cancel).await.unwrap();
        assert_eq!(second.outcome, EvidenceCacheOutcome::Reused);
        assert_eq!(second.manifest, first.manifest);
        assert_eq!(second.evaluation["cache.reason"], "fingerprint-match");
    }

    #[tokio::test]
    async fn test_refresh_forces_persist() {
        let fixture = Fixture::new();
        let service = FileEvidenceCacheService::new();
        let cancel = CancellationToken::new();
        service.cache(&fixture.request(), &cancel).await.unwrap();

        let mut request = fixture.request();
        request.refresh = true;
        let refreshed = service.cache(&request, &cancel).await.unwrap();
        assert_eq!(refreshed.outcome, EvidenceCacheOutcome::Persisted);
        assert_eq!(refreshed.evaluation["cache.reason"], "refresh-requested");
    }

    #[tokio::test]
    async fn test_fingerprint_tracks_content_and_metadata() {
        let fixture = Fixture::new();
        let service = FileEvidenceCacheService::new();
        let cancel = CancellationToken::new();
        let base = service.cache(&fixture.request(), &cancel).await.unwrap();

        let mut request = fixture.request();
        request.metadata.insert("mode".to_string(), "aggressive".to_string());
        let other_metadata = service.cache(&request, &cancel).await.unwrap();
        assert_ne!(other_metadata.manifest.key, base.manifest.key);

        std::fs::write(fixture.dir.path().join("model.json"), r#"{"entities":[{}]}"#).unwrap();
        let other_content = service.cache(&fixture.request(), &cancel).await.unwrap();
        assert_ne!(other_content.manifest.key, base.manifest.key);
        assert_eq!(other_content.outcome, EvidenceCacheOutcome::Persisted);
    }

    #[tokio::test]
    async fn test_corrupt_manifest_is_an_error() {
        let fixture = Fixture::new();
        let service = FileEvidenceCacheService::new();
        let cancel = CancellationToken::new();
        let first = service.cache(&fixture.request(), &cancel).await.unwrap();

        std::fs::write(first.cache_directory.join(MANIFEST_FILE), "{ not json").unwrap();
        let err = service.cache(&fixture.request(), &cancel).await.unwrap_err();
        assert!(matches!(err, CacheError::CorruptManifest { .. }));
    }

    #[tokio::test]
    async fn test_missing_input_is_an_io_error() {
        let fixture = Fixture::new();
        let mut request = fixture.request();
        request.model_path = fixture.dir.path().join("absent.json");
        let err = FileEvidenceCacheService::new()
            .cache(&request, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::Io { .. }));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let fixture = Fixture::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = FileEvidenceCacheService::new()
            .cache(&fixture.request(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::Cancelled));
        assert!(!fixture.root().exists());
    }

    #[tokio::test]
    async fn test_max_entries_keeps_current_key() {
        let fixture = Fixture::new();
        let service = FileEvidenceCacheService::new();
        let cancel = CancellationToken::new();

        for mode in ["a", "b", "c"] {
            let mut request = fixture.request();
            request.metadata.insert("mode".to_string(), mode.to_string());
            service.cache(&request, &cancel).await.unwrap();
        }

        let mut request = fixture.request();
        request.retention.max_entries = Some(1);
        let result = service.cache(&request, &cancel).await.unwrap();
        assert_eq!(result.evaluation["cache.evicted"], "3");

        let remaining: Vec<_> = std::fs::read_dir(fixture.root()).unwrap().collect();
        assert_eq!(remaining.len(), 1);
        assert!(result.cache_directory.join(MANIFEST_FILE).exists());
    }

    #[tokio::test]
    async fn test_concurrent_calls_build_once() {
        let fixture = Fixture::new();
        let service = Arc::new(FileEvidenceCacheService::new());
        let cancel = CancellationToken::new();
        let request = fixture.request();

        let (a, b) = tokio::join!(service.cache(&request, &cancel), service.cache(&request, &cancel));
        let mut outcomes = vec![a.unwrap().outcome, b.unwrap().outcome];
        outcomes.sort_by_key(|o| *o == EvidenceCacheOutcome::Reused);
        assert_eq!(outcomes, vec![EvidenceCacheOutcome::Persisted, EvidenceCacheOutcome::Reused]);
    }

    #[tokio::test]
    async fn test_lock_maps_are_pruned_after_each_call() {
        let fixture = Fixture::new();
        let service = FileEvidenceCacheService::new();
        let cancel = CancellationToken::new();

        for mode in ["a", "b", "c"] {
            let mut request = fixture.request();
            request.metadata.insert("mode".to_string(), mode.to_string());
            request.retention.max_entries = Some(2);
            service.cache(&request, &cancel).await.unwrap();
        }

        assert!(service.entries.lock().await.is_empty());
        assert!(service.roots.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_retention_skips_entry_held_by_another_run() {
        let fixture = Fixture::new();
        let service = FileEvidenceCacheService::new();
        let cancel = CancellationToken::new();

        let mut other = fixture.request();
        other.metadata.insert("mode".to_string(), "other".to_string());
        let other = service.cache(&other, &cancel).await.unwrap();

        let mut request = fixture.request();
        request.retention.max_entries = Some(1);

        let lock = lock_for(&service.entries, &other.cache_directory).await;
        let guard = lock.lock().await;
        let result = service.cache(&request, &cancel).await.unwrap();
        assert_eq!(result.evaluation["cache.evicted"], "0");
        assert!(other.cache_directory.join(MANIFEST_FILE).exists());
        drop(guard);
        release(&service.entries, &other.cache_directory, lock).await;

        let result = service.cache(&request, &cancel).await.unwrap();
        assert_eq!(result.outcome, EvidenceCacheOutcome::Reused);
        assert_eq!(result.evaluation["cache.evicted"], "1");
        assert!(!other.cache_directory.exists());
    }

    #[tokio::test]
    async fn test_removing_vanished_entry_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let removed = tokio_test::assert_ok!(remove_entry(&dir.path().join("gone")).await);
        assert!(!removed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_eviction_on_shared_root() {
        let fixture = Fixture::new();
        let service = Arc::new(FileEvidenceCacheService::new());
        let cancel = CancellationToken::new();

        for round in 0..5 {
            for seed in ["s1", "s2", "s3"] {
                let mut request = fixture.request();
                request.metadata.insert("mode".to_string(), format!("{seed}-{round}"));
                service.cache(&request, &cancel).await.unwrap();
            }

            let handles: Vec<_> = ["x", "y"]
                .into_iter()
                .map(|mode| {
                    let service = Arc::clone(&service);
                    let cancel = cancel.clone();
                    let mut request = fixture.request();
                    request.metadata.insert("mode".to_string(), format!("{mode}-{round}"));
                    request.retention.max_entries = Some(1);
                    tokio::spawn(async move { service.cache(&request, &cancel).await })
                })
                .collect();

            for handle in handles {
                tokio_test::assert_ok!(handle.await.unwrap());
            }
        }

        assert!(service.entries.lock().await.is_empty());
        assert!(service.roots.lock().await.is_empty());
    }
}
