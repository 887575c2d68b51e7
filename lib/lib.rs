//! Proximity-based prefetch cache for numbered volumetric snapshot files.
//!
//! A viewer steps through a growing, lexicographically ordered sequence of
//! snapshot files on disk. [`PrefetchCache`] keeps a bounded set of decoded
//! snapshots resident in memory, chosen by distance from the position the
//! viewer is currently at, while a background task refreshes the directory
//! listing, drops entries whose backing files were rewritten, and prefetches
//! the closest uncached neighbor.

/// The prefetch cache and its background maintenance loop.
pub mod cache;
/// Runtime configuration.
pub mod config;
/// The snapshot decoder collaborator seam.
pub mod decoder;
/// Directory listing and position reconciliation.
pub mod index;

pub use cache::{CacheError, PrefetchCache};
pub use config::CacheConfig;
pub use decoder::{DecodeError, SnapshotDecoder};
pub use index::{DirectoryIndex, EmptyListingError, IndexError, ListingRemap, RefreshOutcome};
