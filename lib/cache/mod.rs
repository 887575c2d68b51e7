//! The prefetch cache: resident snapshot payloads, the viewer-facing API,
//! and the background maintenance loop that keeps the working set centered
//! on the current position.

mod state;
mod worker;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use regex::Regex;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::decoder::{DecodeError, SnapshotDecoder};
use crate::index::{DirectoryIndex, IndexError, RefreshOutcome};

use state::CacheSet;
use worker::RunState;

/// Errors surfaced by [`PrefetchCache`] operations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Listing refresh failed (empty match set or unreadable directory).
    #[error(transparent)]
    Index(#[from] IndexError),

    /// `get` was called with a position outside the current listing.
    #[error("position {position} is out of range for a listing of {len} files")]
    IndexOutOfRange {
        /// The requested position.
        position: usize,
        /// The length of the listing at the time of the call.
        len: usize,
    },

    /// The decoder collaborator failed.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The configured filter is not a valid regular expression.
    #[error("invalid filter pattern: {0}")]
    Filter(#[from] regex::Error),

    /// Reading a file's modification time failed.
    #[error("failed to stat {}: {source}", path.display())]
    Stat {
        /// The file that could not be stat'ed.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Everything the foreground API and the maintenance loop share.
///
/// One mutex guards all listing/position/cache state; each tick and each
/// foreground call is one critical section. Decode I/O happens outside the
/// lock, with a re-check on re-acquire to keep the cache consistent.
pub(crate) struct Shared<D: SnapshotDecoder> {
    pub(crate) decoder: D,
    pub(crate) cache_limit: usize,
    pub(crate) backoff: Duration,
    pub(crate) state: Mutex<State<D::Payload>>,
    pub(crate) run_state: RunState,
}

/// The mutex-guarded shared state.
pub(crate) struct State<P> {
    pub(crate) index: DirectoryIndex,
    pub(crate) cache: CacheSet<P>,
    /// Bumped by every directory switch. A decode started under an older
    /// generation must not insert its result.
    pub(crate) generation: u64,
}

impl<P> State<P> {
    /// Refresh the listing and push every resident entry through the
    /// reconciliation remap (dropping entries whose files are gone).
    pub(crate) async fn refresh_listing(&mut self) -> Result<(), IndexError> {
        match self.index.refresh().await? {
            RefreshOutcome::Unchanged => {}
            RefreshOutcome::Changed(remap) => self.cache.apply_remap(&remap),
        }
        Ok(())
    }
}

/// A bounded in-memory cache of decoded snapshots, maintained by a
/// background task.
///
/// Construction scans the directory, anchors the current position at the
/// newest (last) file and spawns the maintenance loop. The viewer then
/// drives it with [`get`](Self::get), a periodic [`refresh`](Self::refresh)
/// poll, and [`change_directory`](Self::change_directory) /
/// [`pause`](Self::pause) / [`resume`](Self::resume) /
/// [`shutdown`](Self::shutdown).
pub struct PrefetchCache<D: SnapshotDecoder> {
    shared: Arc<Shared<D>>,
    worker: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl<D: SnapshotDecoder> PrefetchCache<D> {
    /// Scan `dir`, spawn the maintenance loop and return the cache.
    ///
    /// Fails if the filter pattern is invalid or matches nothing in `dir`.
    pub async fn spawn(
        dir: impl Into<PathBuf>,
        decoder: D,
        config: CacheConfig,
    ) -> Result<Self, CacheError> {
        let filter = Regex::new(&config.filter)?;
        let index = DirectoryIndex::open(dir, filter).await?;
        let shared = Arc::new(Shared {
            decoder,
            cache_limit: config.cache_limit,
            backoff: config.backoff,
            state: Mutex::new(State {
                index,
                cache: CacheSet::new(),
                generation: 0,
            }),
            run_state: RunState::new(),
        });
        let worker = worker::spawn_maintenance(Arc::clone(&shared));
        Ok(Self {
            shared,
            worker: std::sync::Mutex::new(Some(worker)),
        })
    }

    /// Fetch the snapshot at `position`, decoding it synchronously on a
    /// cache miss, and make `position` the current position.
    ///
    /// Never evicts: a miss may leave the cache one entry over
    /// `cache_limit` until the next maintenance tick trims it back. The
    /// returned payload is shared with the cache — treat it as read-only.
    pub async fn get(&self, position: usize) -> Result<Arc<D::Payload>, CacheError> {
        let (path, name, generation) = {
            let mut state = self.shared.state.lock().await;
            let len = state.index.len();
            if position >= len {
                return Err(CacheError::IndexOutOfRange { position, len });
            }
            state.index.set_current(position);
            if let Some(payload) = state.cache.get(position) {
                return Ok(payload);
            }
            (
                state.index.path_at(position),
                state.index.listing()[position].clone(),
                state.generation,
            )
        };

        let payload = self.shared.decoder.decode(&path).await?;
        let mtime = read_mtime(&path).await?;

        let mut state = self.shared.state.lock().await;
        if state.generation != generation {
            // Directory switched while we were decoding; the payload is
            // still what the caller asked for, but it must not enter the
            // new directory's cache.
            return Ok(Arc::new(payload));
        }
        // The maintenance loop may have refreshed the listing or prefetched
        // this very file while we were decoding. Re-resolve by filename and
        // prefer an existing entry over a duplicate insert.
        let Some(position) = resolve(&state.index, position, &name) else {
            return Ok(Arc::new(payload));
        };
        if let Some(cached) = state.cache.get(position) {
            return Ok(cached);
        }
        let payload = Arc::new(payload);
        state.cache.insert(position, Arc::clone(&payload), mtime);
        Ok(payload)
    }

    /// Switch to a different snapshot directory.
    ///
    /// Clears the cache outright (file identity does not survive a
    /// directory switch), rescans, then eagerly loads the entry at the
    /// reconciled current position so the viewer has something to display.
    /// Callers are expected to [`pause`](Self::pause) around the switch.
    pub async fn change_directory(&self, dir: impl Into<PathBuf>) -> Result<(), CacheError> {
        let mut state = self.shared.state.lock().await;
        state.generation += 1;
        state.cache.clear();
        state.index.change_directory(dir).await?;

        let position = state.index.current();
        let path = state.index.path_at(position);
        let payload = self.shared.decoder.decode(&path).await?;
        let mtime = read_mtime(&path).await?;
        state.cache.insert(position, Arc::new(payload), mtime);
        debug!(position, "directory switched");
        Ok(())
    }

    /// Rescan the listing and reconcile positions, without prefetching.
    ///
    /// The viewer calls this on its own timer (the intended cadence is one
    /// second); the cache does not own a timer for listing freshness.
    pub async fn refresh(&self) -> Result<(), CacheError> {
        let mut state = self.shared.state.lock().await;
        state.refresh_listing().await?;
        Ok(())
    }

    /// Suspend prefetching from the next tick boundary onward.
    pub fn pause(&self) {
        self.shared.run_state.pause();
    }

    /// Resume prefetching at the next tick boundary.
    pub fn resume(&self) {
        self.shared.run_state.resume();
    }

    /// Stop the maintenance loop and wait for it to exit.
    ///
    /// Terminal and idempotent; an in-flight tick runs to completion first.
    pub async fn shutdown(&self) {
        self.shared.run_state.shutdown();
        let handle = { self.worker.lock().map(|mut w| w.take()).unwrap_or(None) };
        if let Some(handle) = handle {
            if let Err(error) = handle.await {
                warn!(%error, "maintenance loop did not exit cleanly");
            }
        }
    }

    /// The sorted filenames currently matching the filter.
    pub async fn listing(&self) -> Vec<String> {
        self.shared.state.lock().await.index.listing().to_vec()
    }

    /// The position the viewer is currently at.
    pub async fn current_position(&self) -> usize {
        self.shared.state.lock().await.index.current()
    }

    /// The resident positions, sorted.
    ///
    /// Intended for testing only — lets tests observe the working set
    /// without reaching into internals.
    #[doc(hidden)]
    pub async fn cached_positions(&self) -> Vec<usize> {
        let state = self.shared.state.lock().await;
        let mut positions: Vec<usize> = state.cache.positions().collect();
        positions.sort_unstable();
        positions
    }
}

impl<D: SnapshotDecoder> Drop for PrefetchCache<D> {
    fn drop(&mut self) {
        // Without this the detached task would keep polling the directory
        // until the runtime shuts down.
        self.shared.run_state.shutdown();
    }
}

/// Re-resolve a listing position by filename after the lock was released.
///
/// Fast path: the listing did not change and the name is still at the same
/// index. Otherwise the listing is sorted, so a binary search recovers the
/// file's new position if it still exists.
fn resolve(index: &DirectoryIndex, position: usize, name: &str) -> Option<usize> {
    if index.listing().get(position).map(String::as_str) == Some(name) {
        return Some(position);
    }
    index
        .listing()
        .binary_search_by(|entry| entry.as_str().cmp(name))
        .ok()
}

/// Read a file's modification time.
pub(crate) async fn read_mtime(path: &Path) -> Result<SystemTime, CacheError> {
    let stat_err = |source| CacheError::Stat {
        path: path.to_path_buf(),
        source,
    };
    let meta = tokio::fs::metadata(path).await.map_err(stat_err)?;
    meta.modified().map_err(stat_err)
}
