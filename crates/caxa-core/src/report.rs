//! Extraction reporting and progress callbacks.

use std::path::Path;
use std::time::Duration;

/// Report of an archive extraction.
#[derive(Debug, Clone, Default)]
pub struct ExtractionReport {
    /// Number of regular files written.
    pub files_extracted: usize,

    /// Number of directory records processed.
    pub directories_created: usize,

    /// Number of symlinks created.
    pub symlinks_created: usize,

    /// Total file bytes written to disk.
    pub bytes_written: u64,

    /// Duration of the extraction.
    pub duration: Duration,

    /// Non-fatal problems, such as modification times that could not be set.
    pub warnings: Vec<String>,
}

impl ExtractionReport {
    /// Creates a new empty extraction report.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a warning message to the report.
    pub fn add_warning(&mut self, message: String) {
        self.warnings.push(message);
    }

    /// Returns total number of entries materialized.
    #[must_use]
    pub fn total_items(&self) -> usize {
        self.files_extracted + self.directories_created + self.symlinks_created
    }
}

/// Receives progress notifications while an archive is extracted.
///
/// Implementations are purely cosmetic; nothing in the extraction depends on
/// them. `on_complete` is called exactly once per started extraction, on
/// success and on failure.
///
/// # Examples
///
/// ```
/// use caxa_core::ProgressCallback;
/// use std::path::Path;
///
/// struct Dots;
///
/// impl ProgressCallback for Dots {
///     fn on_extraction_start(&mut self, message: Option<&str>) {
///         if let Some(message) = message {
///             eprint!("{message}");
///         }
///     }
///
///     fn on_entry_complete(&mut self, _path: &Path) {
///         eprint!(".");
///     }
///
///     fn on_complete(&mut self) {
///         eprintln!();
///     }
/// }
/// ```
pub trait ProgressCallback {
    /// Called once the slot is claimed and extraction is about to begin.
    fn on_extraction_start(&mut self, message: Option<&str>);

    /// Called after each archive entry has been written.
    fn on_entry_complete(&mut self, path: &Path);

    /// Called when the extraction has finished, successfully or not.
    fn on_complete(&mut self);
}

/// No-op implementation of `ProgressCallback`.
#[derive(Debug, Default)]
pub struct NoopProgress;

impl ProgressCallback for NoopProgress {
    fn on_extraction_start(&mut self, _message: Option<&str>) {}

    fn on_entry_complete(&mut self, _path: &Path) {}

    fn on_complete(&mut self) {}
}

/// Scope guard that reports completion when dropped.
///
/// Ties the progress indicator's lifetime to the extraction so it is
/// stopped on every exit path, including early returns through `?`.
pub struct ProgressScope<'a> {
    callback: &'a mut dyn ProgressCallback,
}

impl<'a> ProgressScope<'a> {
    /// Starts progress reporting.
    pub fn start(callback: &'a mut dyn ProgressCallback, message: Option<&str>) -> Self {
        callback.on_extraction_start(message);
        Self { callback }
    }

    /// Forwards an entry notification.
    pub fn entry_complete(&mut self, path: &Path) {
        self.callback.on_entry_complete(path);
    }
}

impl Drop for ProgressScope<'_> {
    fn drop(&mut self) {
        self.callback.on_complete();
    }
}
