//! Snapshot collaborator

use crate::domain::DepthSnapshot;
use crate::error::Result;

/// Blocking full-depth snapshot fetch
///
/// Runs on tokio's blocking pool, never under a book lock.
pub trait SnapshotSource: Send + Sync + 'static {
    fn fetch(&self, wire_symbol: &str, limit: usize) -> Result<DepthSnapshot>;
}

impl<F> SnapshotSource for F
where
    F: Fn(&str, usize) -> Result<DepthSnapshot> + Send + Sync + 'static,
{
    fn fetch(&self, wire_symbol: &str, limit: usize) -> Result<DepthSnapshot> {
        self(wire_symbol, limit)
    }
}
