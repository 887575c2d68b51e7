//! The snapshot decoder collaborator seam.

use std::future::Future;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Opaque failure from a [`SnapshotDecoder`].
///
/// Propagated, never retried, by the cache: the foreground `get` surfaces it
/// to the caller, the background loop abandons the tick's load.
#[derive(Debug, Error)]
#[error("failed to decode snapshot {}: {source}", path.display())]
pub struct DecodeError {
    /// The file that failed to decode.
    pub path: PathBuf,
    /// The decoder's underlying error.
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

impl DecodeError {
    /// Wrap a decoder-specific error for the file at `path`.
    pub fn new(
        path: impl Into<PathBuf>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            path: path.into(),
            source: source.into(),
        }
    }
}

/// Turns a snapshot file into an in-memory payload.
///
/// The payload is opaque to the cache — typically a dense 3-D scalar volume,
/// but anything `Send + Sync` works. Decoding may be arbitrarily slow; the
/// cache never holds its state lock across a decode.
pub trait SnapshotDecoder: Send + Sync + 'static {
    /// The decoded in-memory representation of one snapshot.
    type Payload: Send + Sync + 'static;

    /// Decode the file at `path`.
    fn decode(&self, path: &Path) -> impl Future<Output = Result<Self::Payload, DecodeError>> + Send;
}
