//! Wire format and cache configuration.

use std::path::Path;
use std::path::PathBuf;

/// Name of the directory created under the system temporary directory.
pub const PRODUCT_PREFIX: &str = "caxa";

/// Byte layout shared by the build tool and the stub.
///
/// The archive separator is stored as a token and a repetition count and is
/// only assembled at run time, so the literal marker never appears inside
/// the compiled stub.
///
/// # Examples
///
/// ```
/// use caxa_core::WireFormat;
///
/// assert_eq!(WireFormat::CAXA.archive_separator(), b"\nCAXACAXACAXA\n");
/// assert_eq!(WireFormat::HASH_RUN.archive_separator(), b"##########");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireFormat {
    /// Token repeated to form the archive separator.
    pub archive_token: &'static str,

    /// Number of times `archive_token` is repeated.
    pub archive_token_repeat: usize,

    /// Wrap the repeated token in newlines.
    pub wrap_in_newlines: bool,

    /// Byte separating the archive from the JSON footer.
    pub footer_separator: u8,
}

impl WireFormat {
    /// `\nCAXACAXACAXA\n` between stub and archive.
    pub const CAXA: Self = Self {
        archive_token: "CAXA",
        archive_token_repeat: 3,
        wrap_in_newlines: true,
        footer_separator: b'\n',
    };

    /// A run of ten `#` between stub and archive.
    pub const HASH_RUN: Self = Self {
        archive_token: "#",
        archive_token_repeat: 10,
        wrap_in_newlines: false,
        footer_separator: b'\n',
    };

    /// Assembles the archive separator marker.
    #[must_use]
    pub fn archive_separator(&self) -> Vec<u8> {
        // Opaque count keeps the optimizer from materializing the marker.
        let repeat = std::hint::black_box(self.archive_token_repeat);
        let token = self.archive_token.repeat(repeat);
        let mut marker = Vec::with_capacity(token.len() + 2);
        if self.wrap_in_newlines {
            marker.push(b'\n');
        }
        marker.extend_from_slice(token.as_bytes());
        if self.wrap_in_newlines {
            marker.push(b'\n');
        }
        marker
    }
}

impl Default for WireFormat {
    fn default() -> Self {
        Self::CAXA
    }
}

/// Location of the shared extraction cache.
///
/// The cache root holds `applications/<identifier>/<attempt>` and
/// `locks/<identifier>/<attempt>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Root directory of the cache.
    pub root: PathBuf,
}

impl CacheConfig {
    /// Creates a cache configuration rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the cache root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Default for CacheConfig {
    /// `<system temporary directory>/caxa`.
    fn default() -> Self {
        Self::new(std::env::temp_dir().join(PRODUCT_PREFIX))
    }
}
