#![allow(dead_code, missing_docs, clippy::unwrap_used)]

use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;
use volcache::{CacheConfig, DecodeError, SnapshotDecoder};

/// Route `RUST_LOG`-filtered tracing output to the test harness.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A decoder that reads the raw file bytes and records every decode.
#[derive(Clone, Default)]
pub struct MockDecoder {
    decoded: Arc<Mutex<Vec<String>>>,
    fail_names: Arc<Mutex<HashSet<String>>>,
}

impl MockDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every decode of the file named `name` fail.
    pub fn fail_on(&self, name: &str) {
        self.fail_names.lock().unwrap().insert(name.to_owned());
    }

    /// How many times the file named `name` has been decoded.
    pub fn decode_count(&self, name: &str) -> usize {
        self.decoded
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.as_str() == name)
            .count()
    }

    /// Total number of decodes across all files.
    pub fn total_decodes(&self) -> usize {
        self.decoded.lock().unwrap().len()
    }
}

impl SnapshotDecoder for MockDecoder {
    type Payload = Vec<u8>;

    async fn decode(&self, path: &Path) -> Result<Vec<u8>, DecodeError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.decoded.lock().unwrap().push(name.clone());
        if self.fail_names.lock().unwrap().contains(&name) {
            return Err(DecodeError::new(path, "injected decode failure"));
        }
        tokio::fs::read(path)
            .await
            .map_err(|e| DecodeError::new(path, e))
    }
}

/// Zero-padded snapshot filename, so lexicographic order matches numeric.
pub fn snapshot_name(n: usize) -> String {
    format!("model.{n:04}.h5")
}

/// A temp directory holding snapshots `model.0000.h5 .. model.{n-1:04}.h5`,
/// each containing its own name as payload.
pub fn snapshot_dir(n: usize) -> TempDir {
    let dir = TempDir::new().unwrap();
    for i in 0..n {
        let name = snapshot_name(i);
        std::fs::write(dir.path().join(&name), name.as_bytes()).unwrap();
    }
    dir
}

/// Default config with a short backoff so test loops converge fast.
pub fn test_config(cache_limit: usize) -> CacheConfig {
    CacheConfig {
        cache_limit,
        backoff: Duration::from_millis(10),
        ..CacheConfig::default()
    }
}

/// Rewrite `path` with `content` until its modification time observably
/// differs from what it was before the call. Coarse filesystem timestamps
/// can otherwise make a rewrite invisible to mtime-based invalidation.
pub fn rewrite_with_new_mtime(path: &Path, content: &[u8]) {
    let old = std::fs::metadata(path).unwrap().modified().unwrap();
    loop {
        std::fs::write(path, content).unwrap();
        if std::fs::metadata(path).unwrap().modified().unwrap() != old {
            return;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}

/// Poll `cond` until it holds, or panic after ~5 seconds.
pub async fn wait_for<F, Fut>(what: &str, mut cond: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..500 {
        if cond().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

/// Convenience for tests that only need a path buffer.
pub fn path_of(dir: &TempDir, name: &str) -> PathBuf {
    dir.path().join(name)
}
