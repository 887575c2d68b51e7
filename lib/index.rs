//! Directory listing and position reconciliation.
//!
//! [`DirectoryIndex`] maintains the sorted list of snapshot filenames
//! matching a filter pattern and the viewer's current position within it.
//! Refreshing the listing reconciles the position (and, via
//! [`ListingRemap`], any positions held by the cache) against insertions,
//! deletions and renumbering.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use regex::Regex;
use thiserror::Error;
use tracing::debug;

/// The filter pattern matched nothing in the scanned directory.
///
/// A hard error: with an empty listing the viewer has nothing to display.
#[derive(Debug, Clone, Error)]
#[error("no files matching `{filter}` in {}", dir.display())]
pub struct EmptyListingError {
    /// The directory that was scanned.
    pub dir: PathBuf,
    /// The filter pattern that matched nothing.
    pub filter: String,
}

/// Errors raised by listing refreshes.
#[derive(Debug, Error)]
pub enum IndexError {
    /// The filter matched no directory entries.
    #[error(transparent)]
    EmptyListing(#[from] EmptyListingError),

    /// The directory could not be read.
    #[error("failed to scan {}: {source}", dir.display())]
    Scan {
        /// The directory that failed to scan.
        dir: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Maps positions valid under the previous listing to positions under the
/// new one, by filename identity.
///
/// Returned by [`DirectoryIndex::refresh`] whenever the listing actually
/// changed, so that every resident cache entry can be remapped or dropped —
/// a stale numeric position under a changed listing is a correctness hazard.
#[derive(Debug)]
pub struct ListingRemap {
    previous: Vec<String>,
    new_positions: HashMap<String, usize>,
}

impl ListingRemap {
    /// Resolve a position under the previous listing to its position under
    /// the new listing, or `None` if the file is gone.
    #[must_use]
    pub fn remap(&self, old_position: usize) -> Option<usize> {
        let name = self.previous.get(old_position)?;
        self.new_positions.get(name).copied()
    }
}

/// Outcome of a listing refresh.
#[derive(Debug)]
pub enum RefreshOutcome {
    /// The listing is byte-identical to the previous one. The current
    /// position and all cached positions remain valid as-is.
    Unchanged,
    /// The listing changed. The current position has already been
    /// reconciled; cached positions must be pushed through the remap.
    Changed(ListingRemap),
}

/// The ordered list of snapshot filenames in a directory, plus the viewer's
/// current position within it.
///
/// Leaf component: no knowledge of payloads or caching. Positions are
/// 0-based indices into the listing and are meaningful only relative to one
/// listing snapshot; the listing is never empty once constructed.
#[derive(Debug)]
pub struct DirectoryIndex {
    dir: PathBuf,
    filter: Regex,
    listing: Vec<String>,
    current: usize,
}

impl DirectoryIndex {
    /// Scan `dir` and build the initial listing.
    ///
    /// The current position starts at the last index: a viewer opening a
    /// live directory wants the newest snapshot first.
    pub async fn open(dir: impl Into<PathBuf>, filter: Regex) -> Result<Self, IndexError> {
        let dir = dir.into();
        let listing = scan(&dir, &filter).await?;
        let current = listing.len() - 1;
        Ok(Self {
            dir,
            filter,
            listing,
            current,
        })
    }

    /// Rescan the directory and reconcile the current position against the
    /// new listing.
    ///
    /// Idempotent and cheap when nothing changed on disk. On change, the
    /// position follows its filename to the file's new index; if that file
    /// is gone the position collapses to the last index.
    pub async fn refresh(&mut self) -> Result<RefreshOutcome, IndexError> {
        let new_listing = scan(&self.dir, &self.filter).await?;
        if new_listing == self.listing {
            return Ok(RefreshOutcome::Unchanged);
        }

        let new_positions: HashMap<String, usize> = new_listing
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();

        let anchor = self.listing.get(self.current).cloned();
        let previous = std::mem::replace(&mut self.listing, new_listing);

        self.current = anchor
            .and_then(|name| new_positions.get(&name).copied())
            .unwrap_or(self.listing.len() - 1);
        debug!(
            len = self.listing.len(),
            current = self.current,
            "listing changed"
        );

        Ok(RefreshOutcome::Changed(ListingRemap {
            previous,
            new_positions,
        }))
    }

    /// Point the index at a different directory and rescan from scratch.
    ///
    /// Filename identity does not carry across directories, so no
    /// reconciliation is attempted: the numeric position is kept, clamped
    /// into the new listing's range.
    pub async fn change_directory(&mut self, dir: impl Into<PathBuf>) -> Result<(), IndexError> {
        let dir = dir.into();
        let listing = scan(&dir, &self.filter).await?;
        self.current = self.current.min(listing.len() - 1);
        self.dir = dir;
        self.listing = listing;
        Ok(())
    }

    /// The sorted filenames currently matching the filter.
    #[must_use]
    pub fn listing(&self) -> &[String] {
        &self.listing
    }

    /// Number of files in the listing. Always at least 1.
    #[must_use]
    pub fn len(&self) -> usize {
        self.listing.len()
    }

    /// Always `false`: an empty match set fails the scan instead.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listing.is_empty()
    }

    /// The position the viewer is currently at.
    #[must_use]
    pub fn current(&self) -> usize {
        self.current
    }

    /// Move the current position. The caller has bounds-checked `position`
    /// against the same listing snapshot.
    pub fn set_current(&mut self, position: usize) {
        debug_assert!(position < self.listing.len());
        self.current = position;
    }

    /// Full path of the file at `position`.
    #[must_use]
    pub fn path_at(&self, position: usize) -> PathBuf {
        self.dir.join(&self.listing[position])
    }

    /// The directory currently being indexed.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// List `dir`, keep names matching `filter`, sort lexicographically.
///
/// Entries whose names are not valid Unicode are skipped: the filter is a
/// text pattern and the naming convention this serves is ASCII.
async fn scan(dir: &Path, filter: &Regex) -> Result<Vec<String>, IndexError> {
    let scan_err = |source| IndexError::Scan {
        dir: dir.to_path_buf(),
        source,
    };

    let mut entries = tokio::fs::read_dir(dir).await.map_err(scan_err)?;
    let mut listing = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(scan_err)? {
        if let Ok(name) = entry.file_name().into_string() {
            if filter.is_match(&name) {
                listing.push(name);
            }
        }
    }

    if listing.is_empty() {
        return Err(EmptyListingError {
            dir: dir.to_path_buf(),
            filter: filter.as_str().to_owned(),
        }
        .into());
    }

    listing.sort_unstable();
    Ok(listing)
}
