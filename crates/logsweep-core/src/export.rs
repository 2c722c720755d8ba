use crate::aggregate::Collection;
use crate::error::ExportError;
use std::path::PathBuf;

/// Destination for a finished collection.
///
/// Sinks only see the aggregated output after every worker completed, so a
/// failed or aborted run never reaches them.
pub trait ExportSink {
    /// Write the collection; returns the written location, or `None` when
    /// there was nothing to write.
    fn export(&self, collection: &Collection) -> Result<Option<PathBuf>, ExportError>;
}
