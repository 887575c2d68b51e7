//! The background maintenance loop.
//!
//! One tokio task per cache, spawned at construction and running until
//! shutdown. Each tick invalidates rewritten files, refreshes the listing,
//! picks at most one prefetch candidate, evicts as needed and loads it.
//! `running`/`paused` are checked only at tick boundaries; work in flight
//! always completes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, trace};

use crate::cache::{read_mtime, CacheError, Shared, State};
use crate::decoder::SnapshotDecoder;

/// Lifecycle flags for the maintenance loop.
///
/// `running` starts true and transitions to false exactly once, at
/// shutdown. `paused` suspends prefetch work without terminating the task
/// and is freely toggled.
pub(crate) struct RunState {
    running: AtomicBool,
    paused: AtomicBool,
}

impl RunState {
    pub(crate) fn new() -> Self {
        Self {
            running: AtomicBool::new(true),
            paused: AtomicBool::new(false),
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub(crate) fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    pub(crate) fn pause(&self) {
        self.paused.store(true, Ordering::Relaxed);
    }

    pub(crate) fn resume(&self) {
        self.paused.store(false, Ordering::Relaxed);
    }

    pub(crate) fn shutdown(&self) {
        self.running.store(false, Ordering::Relaxed);
    }
}

/// What a completed tick did.
enum TickOutcome {
    /// A snapshot was prefetched into the cache at this position.
    Loaded(usize),
    /// Nothing to load this tick; sleep the backoff before the next one.
    Idle,
}

/// Spawn the maintenance loop for `shared`.
pub(crate) fn spawn_maintenance<D: SnapshotDecoder>(shared: Arc<Shared<D>>) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!("maintenance loop started");
        while shared.run_state.is_running() {
            if shared.run_state.is_paused() {
                sleep(shared.backoff).await;
                continue;
            }
            match run_tick(&shared).await {
                Ok(TickOutcome::Loaded(position)) => {
                    trace!(position, "prefetched snapshot");
                }
                Ok(TickOutcome::Idle) => sleep(shared.backoff).await,
                Err(error) => {
                    // A failed tick is "nothing to do", not a crash: the
                    // next tick retries against whatever the directory
                    // looks like then.
                    debug!(%error, "maintenance tick abandoned");
                    sleep(shared.backoff).await;
                }
            }
        }
        debug!("maintenance loop exited");
    })
}

/// One tick of maintenance work.
///
/// Steps 2–7 (invalidation, refresh, candidate selection, eviction) run
/// under the state lock; the decode runs outside it, with the insert
/// re-validated against listing and directory generation afterwards.
async fn run_tick<D: SnapshotDecoder>(shared: &Shared<D>) -> Result<TickOutcome, CacheError> {
    let (candidate, name, path, generation) = {
        let mut state = shared.state.lock().await;

        invalidate_stale(&mut state).await;
        state.refresh_listing().await?;

        if state.cache.len() >= state.index.len() {
            // Everything is resident; nothing to prefetch.
            return Ok(TickOutcome::Idle);
        }

        let current = state.index.current();
        let candidate = state
            .cache
            .select_candidate(current, state.index.len(), shared.cache_limit);

        // Trim back any overshoot from foreground `get` calls before (and
        // regardless of) loading anything new.
        state.cache.trim(shared.cache_limit, current);

        let Some(candidate) = candidate else {
            return Ok(TickOutcome::Idle);
        };
        if !state.cache.make_room(shared.cache_limit, current, candidate) {
            // At capacity and the candidate is no closer than the farthest
            // resident entry: not worth caching.
            return Ok(TickOutcome::Idle);
        }

        (
            candidate,
            state.index.listing()[candidate].clone(),
            state.index.path_at(candidate),
            state.generation,
        )
    };

    let payload = shared.decoder.decode(&path).await?;
    let mtime = read_mtime(&path).await?;

    let mut state = shared.state.lock().await;
    if state.generation != generation {
        // Directory switched mid-decode; this payload belongs to the old
        // directory and must not be inserted.
        return Ok(TickOutcome::Idle);
    }
    // A foreground refresh may have renumbered the listing while we were
    // decoding; follow the filename to its current position.
    let Some(position) = super::resolve(&state.index, candidate, &name) else {
        return Ok(TickOutcome::Idle);
    };
    if state.cache.contains(position) {
        return Ok(TickOutcome::Idle);
    }
    state.cache.insert(position, Arc::new(payload), mtime);
    Ok(TickOutcome::Loaded(position))
}

/// Drop every resident entry whose backing file was rewritten since it was
/// cached, or whose modification time can no longer be read (treated as
/// "file gone").
async fn invalidate_stale<P>(state: &mut State<P>) {
    let positions: Vec<usize> = state.cache.positions().collect();
    for position in positions {
        let Some(stored) = state.cache.mtime(position) else {
            continue;
        };
        let path = state.index.path_at(position);
        let fresh = tokio::fs::metadata(&path).await.and_then(|m| m.modified());
        match fresh {
            Ok(mtime) if mtime == stored => {}
            Ok(_) => {
                trace!(position, "dropping rewritten snapshot");
                state.cache.remove(position);
            }
            Err(_) => {
                trace!(position, "dropping snapshot with unreadable mtime");
                state.cache.remove(position);
            }
        }
    }
}
