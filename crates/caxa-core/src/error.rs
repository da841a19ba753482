//! Error types for stub payload handling, extraction and command launch.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using `StubError`.
pub type Result<T> = std::result::Result<T, StubError>;

/// Exit code used for every fatal error that has no more specific code.
pub const EXIT_FAILURE: i32 = 1;

/// Why a child process could not produce an exit status.
#[derive(Debug)]
pub enum CommandFailure {
    /// The program could not be started.
    Spawn(std::io::Error),
    /// The program was terminated by a signal.
    Signal(i32),
    /// The program terminated without an exit code or signal.
    NoStatus,
}

impl std::fmt::Display for CommandFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Spawn(err) => write!(f, "failed to start: {err}"),
            Self::Signal(signal) => write!(f, "terminated by signal {signal}"),
            Self::NoStatus => write!(f, "terminated without an exit status"),
        }
    }
}

/// Errors that can occur while running a stub.
#[derive(Error, Debug)]
pub enum StubError {
    /// The executable does not carry the appended payload layout.
    #[error("malformed image: {reason}")]
    MalformedImage {
        /// Which part of the layout is missing.
        reason: String,
    },

    /// The trailing footer is not valid JSON of the expected shape.
    #[error("invalid footer: {reason}")]
    InvalidFooter {
        /// What is wrong with the footer.
        reason: String,
        /// Underlying JSON error, when decoding failed.
        #[source]
        source: Option<serde_json::Error>,
    },

    /// The compressed archive could not be decoded.
    #[error("corrupt archive: {source}")]
    CorruptArchive {
        /// Decompression or record decoding error.
        #[source]
        source: std::io::Error,
    },

    /// A regular file record ended before its declared size.
    #[error("truncated entry {path}: expected {expected} bytes, wrote {actual}")]
    TruncatedEntry {
        /// Entry path inside the archive.
        path: PathBuf,
        /// Size declared by the record header.
        expected: u64,
        /// Bytes actually written.
        actual: u64,
    },

    /// An entry path would resolve outside the destination directory.
    #[error("unsafe path in archive: {path}")]
    UnsafePath {
        /// The offending entry path.
        path: PathBuf,
    },

    /// The archive contains a record type the extractor does not implement.
    #[error("unsupported entry type {kind} for {path}")]
    UnsupportedEntryType {
        /// Entry path inside the archive.
        path: PathBuf,
        /// Human-readable record type.
        kind: String,
    },

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The packaged command could not be run to completion.
    #[error("command {program} {reason}")]
    CommandFailed {
        /// Program that was launched.
        program: String,
        /// What went wrong.
        reason: CommandFailure,
    },
}

impl StubError {
    /// Shorthand for a [`StubError::MalformedImage`].
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedImage {
            reason: reason.into(),
        }
    }

    /// Shorthand for an [`StubError::InvalidFooter`] without a JSON source.
    pub fn invalid_footer(reason: impl Into<String>) -> Self {
        Self::InvalidFooter {
            reason: reason.into(),
            source: None,
        }
    }

    /// Returns `true` if this error was raised by archive content trying to
    /// escape the destination directory.
    ///
    /// # Examples
    ///
    /// ```
    /// use caxa_core::StubError;
    /// use std::path::PathBuf;
    ///
    /// let err = StubError::UnsafePath {
    ///     path: PathBuf::from("../evil.txt"),
    /// };
    /// assert!(err.is_security_violation());
    ///
    /// let err = StubError::malformed("no footer");
    /// assert!(!err.is_security_violation());
    /// ```
    #[must_use]
    pub const fn is_security_violation(&self) -> bool {
        matches!(self, Self::UnsafePath { .. })
    }

    /// Returns the process exit code the stub uses for this error.
    ///
    /// Launch failures follow shell conventions (126, 127, 128 + signal);
    /// everything else exits with [`EXIT_FAILURE`].
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::CommandFailed { reason, .. } => match reason {
                CommandFailure::Spawn(err) => match err.kind() {
                    std::io::ErrorKind::NotFound => 127,
                    std::io::ErrorKind::PermissionDenied => 126,
                    _ => EXIT_FAILURE,
                },
                CommandFailure::Signal(signal) => 128 + signal,
                CommandFailure::NoStatus => EXIT_FAILURE,
            },
            _ => EXIT_FAILURE,
        }
    }
}
