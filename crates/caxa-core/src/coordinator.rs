//! Cross-process extraction cache.
//!
//! Every identifier owns a sequence of slots under the cache root:
//!
//! ```text
//! <root>/applications/<identifier>/<attempt>   extracted tree
//! <root>/locks/<identifier>/<attempt>          present while extraction runs
//! ```
//!
//! A slot is claimed by creating its lock directory, which the filesystem
//! either creates atomically or refuses. An application directory without a
//! lock is complete and reusable. A lock that outlives its extraction is never
//! removed by another process; later invocations move on to the next attempt.

use std::fs;
use std::io;
use std::io::ErrorKind;
use std::path::Path;
use std::path::PathBuf;

use tracing::debug;
use tracing::warn;

use crate::ProgressCallback;
use crate::Result;
use crate::StubError;
use crate::TarExtractor;
use crate::config::CacheConfig;
use crate::report::ProgressScope;

const APPLICATIONS_DIR: &str = "applications";
const LOCKS_DIR: &str = "locks";

/// Maps identifiers and attempt indices to cache paths.
#[derive(Debug, Clone, Default)]
pub struct CacheLayout {
    config: CacheConfig,
}

impl CacheLayout {
    /// Creates a layout over `config`.
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self { config }
    }

    /// Returns the underlying configuration.
    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Directory holding every identifier's extracted trees.
    #[must_use]
    pub fn applications_root(&self) -> PathBuf {
        self.config.root().join(APPLICATIONS_DIR)
    }

    /// Directory holding every identifier's lock directories.
    #[must_use]
    pub fn locks_root(&self) -> PathBuf {
        self.config.root().join(LOCKS_DIR)
    }

    /// Returns the paths of slot `attempt` for `identifier`.
    ///
    /// # Examples
    ///
    /// ```
    /// use caxa_core::CacheConfig;
    /// use caxa_core::coordinator::CacheLayout;
    /// use std::path::Path;
    ///
    /// let layout = CacheLayout::new(CacheConfig::new("/tmp/caxa"));
    /// let slot = layout.slot("abc123", 2);
    /// assert_eq!(slot.lock_path, Path::new("/tmp/caxa/locks/abc123/2"));
    /// assert_eq!(
    ///     slot.application_directory,
    ///     Path::new("/tmp/caxa/applications/abc123/2")
    /// );
    /// ```
    #[must_use]
    pub fn slot(&self, identifier: &str, attempt: u32) -> ExtractionSlot {
        let attempt_name = attempt.to_string();
        ExtractionSlot {
            attempt,
            lock_path: self.locks_root().join(identifier).join(&attempt_name),
            application_directory: self
                .applications_root()
                .join(identifier)
                .join(&attempt_name),
        }
    }
}

/// Paths of one `(identifier, attempt)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionSlot {
    /// Attempt index.
    pub attempt: u32,
    /// Lock directory; present while an extraction is running or abandoned.
    pub lock_path: PathBuf,
    /// Destination of the extraction.
    pub application_directory: PathBuf,
}

/// Exclusive right to extract into a slot.
///
/// Dropping a claim leaves the lock directory in place, so a failed
/// extraction keeps its slot out of reach of every later invocation. Only
/// [`SlotClaim::release`] removes it.
#[derive(Debug)]
#[must_use = "dropping a claim leaves its slot locked forever"]
pub struct SlotClaim {
    lock_path: PathBuf,
}

impl SlotClaim {
    /// Atomically claims `slot` by creating its lock directory.
    ///
    /// Returns `Ok(None)` if the lock already exists.
    pub fn try_claim(slot: &ExtractionSlot) -> Result<Option<Self>> {
        if let Some(parent) = slot.lock_path.parent() {
            fs::create_dir_all(parent)?;
        }
        match fs::create_dir(&slot.lock_path) {
            Ok(()) => Ok(Some(Self {
                lock_path: slot.lock_path.clone(),
            })),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Returns the lock directory this claim owns.
    #[must_use]
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Removes the lock directory, advertising the slot as complete.
    pub fn release(self) -> Result<()> {
        fs::remove_dir(&self.lock_path)?;
        Ok(())
    }
}

/// Outcome of looking up an identifier in the cache.
#[derive(Debug)]
pub enum Resolution {
    /// A completed extraction exists at this path.
    Reuse(PathBuf),
    /// The caller holds the claim on `slot` and must extract into it.
    Claimed {
        /// The claimed slot.
        slot: ExtractionSlot,
        /// Claim to release once extraction succeeds.
        claim: SlotClaim,
    },
}

/// Finds or creates the application directory for an identifier.
///
/// # Examples
///
/// ```no_run
/// use caxa_core::CacheConfig;
/// use caxa_core::ExtractionCoordinator;
/// use caxa_core::NoopProgress;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let archive = std::fs::read("app.tar.gz")?;
/// let coordinator = ExtractionCoordinator::new(CacheConfig::default());
/// let directory = coordinator.resolve("abc123", &archive, None, &mut NoopProgress)?;
/// println!("application at {}", directory.display());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct ExtractionCoordinator {
    layout: CacheLayout,
    extractor: TarExtractor,
}

impl ExtractionCoordinator {
    /// Creates a coordinator over the cache rooted at `config`.
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self {
            layout: CacheLayout::new(config),
            extractor: TarExtractor::new(),
        }
    }

    /// Returns the cache layout.
    #[must_use]
    pub fn layout(&self) -> &CacheLayout {
        &self.layout
    }

    /// Walks the slots of `identifier` until one is reusable or claimed.
    ///
    /// Never waits on a lock held by someone else: a locked slot is either
    /// being extracted by a peer or was abandoned by a crashed one, and the
    /// two cannot be told apart.
    pub fn locate(&self, identifier: &str) -> Result<Resolution> {
        for attempt in 0..=u32::MAX {
            let slot = self.layout.slot(identifier, attempt);

            if is_directory(&slot.application_directory)? {
                if is_directory(&slot.lock_path)? {
                    debug!(identifier, attempt, "slot is locked, advancing");
                    continue;
                }
                debug!(
                    identifier,
                    attempt,
                    "reusing {}",
                    slot.application_directory.display()
                );
                return Ok(Resolution::Reuse(slot.application_directory));
            }

            let Some(claim) = SlotClaim::try_claim(&slot)? else {
                debug!(identifier, attempt, "slot claimed by another process, advancing");
                continue;
            };

            // A peer may have finished and released this slot between the
            // existence check and our claim.
            if is_directory(&slot.application_directory)? {
                claim.release()?;
                debug!(identifier, attempt, "slot completed by another process");
                return Ok(Resolution::Reuse(slot.application_directory));
            }

            debug!(identifier, attempt, "claimed slot");
            return Ok(Resolution::Claimed { slot, claim });
        }

        Err(StubError::Io(io::Error::other(format!(
            "no free extraction slot left for {identifier}"
        ))))
    }

    /// Returns the application directory for `identifier`, extracting
    /// `archive` into a freshly claimed slot if no completed one exists.
    ///
    /// `progress` is notified only when an extraction actually runs. On
    /// failure the slot's lock is left in place.
    pub fn resolve(
        &self,
        identifier: &str,
        archive: &[u8],
        message: Option<&str>,
        progress: &mut dyn ProgressCallback,
    ) -> Result<PathBuf> {
        let (slot, claim) = match self.locate(identifier)? {
            Resolution::Reuse(directory) => return Ok(directory),
            Resolution::Claimed { slot, claim } => (slot, claim),
        };

        let report = {
            let mut scope = ProgressScope::start(progress, message);
            self.extractor
                .extract_with(archive, &slot.application_directory, &mut |path| {
                    scope.entry_complete(path);
                })?
        };
        debug!(
            identifier,
            attempt = slot.attempt,
            entries = report.total_items(),
            warnings = report.warnings.len(),
            "extracted application"
        );

        let lock_path = claim.lock_path().to_path_buf();
        if let Err(err) = claim.release() {
            warn!(
                "failed to remove lock {}: {err}; this slot will not be reused",
                lock_path.display()
            );
        }
        Ok(slot.application_directory)
    }
}

/// Returns whether `path` is a directory, failing if it is anything else.
fn is_directory(path: &Path) -> Result<bool> {
    match fs::metadata(path) {
        Ok(metadata) if metadata.is_dir() => Ok(true),
        Ok(_) => Err(StubError::Io(io::Error::new(
            ErrorKind::NotADirectory,
            format!("{} exists but is not a directory", path.display()),
        ))),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err.into()),
    }
}
