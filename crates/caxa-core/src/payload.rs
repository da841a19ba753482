//! The running executable's own bytes and the archive appended to them.
//!
//! Layout, leading to trailing:
//!
//! ```text
//! [stub code] [archive separator] [compressed archive] [footer separator] [JSON footer]
//! ```

use std::ops::Range;
use std::path::Path;

use crate::Result;
use crate::StubError;
use crate::config::WireFormat;
use crate::footer::ParsedFooter;
use crate::footer::parse_footer;

/// Bytes of the currently running executable, read once.
#[derive(Debug, Clone)]
pub struct SelfImage {
    bytes: Vec<u8>,
    format: WireFormat,
}

impl SelfImage {
    /// Wraps already-read image bytes.
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>, format: WireFormat) -> Self {
        Self { bytes, format }
    }

    /// Reads the image from `path`.
    pub fn read(path: &Path, format: WireFormat) -> Result<Self> {
        Ok(Self::from_bytes(std::fs::read(path)?, format))
    }

    /// Reads the image of the running executable.
    pub fn current(format: WireFormat) -> Result<Self> {
        let path = std::env::current_exe()?;
        Self::read(&path, format)
    }

    /// Returns the wire format used to interpret the image.
    #[must_use]
    pub const fn format(&self) -> &WireFormat {
        &self.format
    }

    /// Decodes the trailing footer.
    pub fn footer(&self) -> Result<ParsedFooter> {
        parse_footer(&self.bytes, &self.format)
    }

    /// Returns the compressed archive bytes bounded by `footer`.
    pub fn archive(&self, footer: &ParsedFooter) -> Result<&[u8]> {
        let region = ArchiveRegion::locate(&self.bytes, &self.format, footer.separator_offset)?;
        Ok(region.slice(&self.bytes))
    }

    /// Decodes the footer and returns it with the archive bytes.
    ///
    /// The archive separator is looked for first, so a stub run without an
    /// appended payload fails with [`StubError::MalformedImage`] instead of
    /// trying to decode its own machine code as a footer.
    pub fn payload(&self) -> Result<(ParsedFooter, &[u8])> {
        let start = archive_start(&self.bytes, &self.format)?;
        let footer = self.footer()?;
        let region = ArchiveRegion::bounded(start, footer.separator_offset, self.bytes.len())?;
        Ok((footer, region.slice(&self.bytes)))
    }
}

/// Byte range `[start, end)` of the compressed archive within a self-image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveRegion {
    /// First archive byte, just past the archive separator.
    pub start: usize,
    /// Footer separator offset.
    pub end: usize,
}

impl ArchiveRegion {
    /// Finds the first archive separator and bounds the archive by
    /// `footer_start`.
    ///
    /// # Errors
    ///
    /// Returns [`StubError::MalformedImage`] if the separator is absent,
    /// which means the stub is running without an appended payload, or if
    /// the separator ends past `footer_start`.
    ///
    /// # Examples
    ///
    /// ```
    /// use caxa_core::WireFormat;
    /// use caxa_core::payload::ArchiveRegion;
    ///
    /// let image = b"stub##########ARCHIVE\n{}";
    /// let region = ArchiveRegion::locate(image, &WireFormat::HASH_RUN, 21).unwrap();
    /// assert_eq!(region.slice(image), b"ARCHIVE");
    /// ```
    pub fn locate(image: &[u8], format: &WireFormat, footer_start: usize) -> Result<Self> {
        let start = archive_start(image, format)?;
        Self::bounded(start, footer_start, image.len())
    }

    fn bounded(start: usize, footer_start: usize, image_len: usize) -> Result<Self> {
        if start > footer_start || footer_start > image_len {
            return Err(StubError::malformed(
                "archive separator appears after the footer",
            ));
        }
        Ok(Self {
            start,
            end: footer_start,
        })
    }

    /// Returns the region as a range.
    #[must_use]
    pub const fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    /// Returns the region's bytes within `image`.
    #[must_use]
    pub fn slice<'a>(&self, image: &'a [u8]) -> &'a [u8] {
        &image[self.range()]
    }
}

/// Offset just past the first archive separator.
fn archive_start(image: &[u8], format: &WireFormat) -> Result<usize> {
    let separator = format.archive_separator();
    let position = find(image, &separator).ok_or_else(|| {
        StubError::malformed(
            "archive separator not found (was the stub run without a payload appended?)",
        )
    })?;
    Ok(position + separator.len())
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
