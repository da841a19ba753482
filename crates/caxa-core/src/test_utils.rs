//! Test utilities for building archives and complete stub images.
//!
//! # Panics
//!
//! All functions in this module may panic on I/O errors since they are
//! designed for test use only where panics are acceptable.

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::io::Write;

use flate2::Compression;
use flate2::write::GzEncoder;

use crate::config::WireFormat;

/// Modification time given to entries that do not set one explicitly.
pub const DEFAULT_MTIME: u64 = 1_600_000_000;

/// Builder for tar test archives with various entry types.
///
/// # Examples
///
/// ```
/// use caxa_core::test_utils::TarTestBuilder;
///
/// let archive = TarTestBuilder::new()
///     .add_directory("bin/")
///     .add_file_with_mode("bin/run.sh", b"echo hi", 0o755)
///     .add_symlink("current", "bin")
///     .build_gz();
/// ```
pub struct TarTestBuilder {
    builder: tar::Builder<Vec<u8>>,
}

impl TarTestBuilder {
    /// Creates a new tar test builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            builder: tar::Builder::new(Vec::new()),
        }
    }

    /// Adds a regular file with mode `0o644`.
    #[must_use]
    pub fn add_file(self, path: &str, data: &[u8]) -> Self {
        self.add_entry(path, data, 0o644, DEFAULT_MTIME)
    }

    /// Adds a regular file with custom mode.
    #[must_use]
    pub fn add_file_with_mode(self, path: &str, data: &[u8], mode: u32) -> Self {
        self.add_entry(path, data, mode, DEFAULT_MTIME)
    }

    /// Adds a regular file with custom modification time.
    #[must_use]
    pub fn add_file_with_mtime(self, path: &str, data: &[u8], mtime: u64) -> Self {
        self.add_entry(path, data, 0o644, mtime)
    }

    fn add_entry(mut self, path: &str, data: &[u8], mode: u32, mtime: u64) -> Self {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(mode);
        header.set_mtime(mtime);
        header.set_cksum();
        self.builder.append_data(&mut header, path, data).unwrap();
        self
    }

    /// Adds a directory with mode `0o755`.
    #[must_use]
    pub fn add_directory(self, path: &str) -> Self {
        self.add_directory_with_mode(path, 0o755)
    }

    /// Adds a directory with custom mode.
    #[must_use]
    pub fn add_directory_with_mode(mut self, path: &str, mode: u32) -> Self {
        let mut header = tar::Header::new_gnu();
        header.set_size(0);
        header.set_mode(mode);
        header.set_mtime(DEFAULT_MTIME);
        header.set_entry_type(tar::EntryType::Directory);
        header.set_cksum();
        self.builder
            .append_data(&mut header, path, std::io::empty())
            .unwrap();
        self
    }

    /// Adds a symlink. The target is stored verbatim.
    #[must_use]
    pub fn add_symlink(self, path: &str, target: &str) -> Self {
        self.add_link(tar::EntryType::Symlink, path, target)
    }

    /// Adds a hard link. The target is stored verbatim.
    #[must_use]
    pub fn add_hardlink(self, path: &str, target: &str) -> Self {
        self.add_link(tar::EntryType::Link, path, target)
    }

    fn add_link(mut self, kind: tar::EntryType, path: &str, target: &str) -> Self {
        let mut header = tar::Header::new_gnu();
        header.set_size(0);
        header.set_mode(0o777);
        header.set_mtime(DEFAULT_MTIME);
        header.set_entry_type(kind);
        write_field(&mut header.as_old_mut().linkname, target.as_bytes());
        header.set_cksum();
        self.builder
            .append_data(&mut header, path, std::io::empty())
            .unwrap();
        self
    }

    /// Adds a named pipe.
    #[must_use]
    pub fn add_fifo(mut self, path: &str) -> Self {
        let mut header = tar::Header::new_gnu();
        header.set_size(0);
        header.set_mode(0o644);
        header.set_entry_type(tar::EntryType::Fifo);
        header.set_cksum();
        self.builder
            .append_data(&mut header, path, std::io::empty())
            .unwrap();
        self
    }

    /// Adds a regular file whose name is written into the header verbatim,
    /// bypassing the `tar` crate's own path checks.
    #[must_use]
    pub fn add_raw_name_file(mut self, name: &str, data: &[u8]) -> Self {
        let mut header = tar::Header::new_gnu();
        write_field(&mut header.as_old_mut().name, name.as_bytes());
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(DEFAULT_MTIME);
        header.set_entry_type(tar::EntryType::Regular);
        header.set_cksum();
        self.builder.append(&header, data).unwrap();
        self
    }

    /// Finishes the archive and returns the uncompressed tar bytes.
    #[must_use]
    pub fn build(self) -> Vec<u8> {
        self.builder.into_inner().unwrap()
    }

    /// Finishes the archive and returns gzip-compressed tar bytes.
    #[must_use]
    pub fn build_gz(self) -> Vec<u8> {
        gzip(&self.build())
    }
}

impl Default for TarTestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn write_field(field: &mut [u8], value: &[u8]) {
    assert!(value.len() <= field.len(), "header field too long");
    field.fill(0);
    field[..value.len()].copy_from_slice(value);
}

/// Gzip-compresses `data`.
#[must_use]
pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Assembles a self-image the way the build tool does:
/// stub bytes, archive separator, archive, footer separator, JSON footer.
///
/// # Examples
///
/// ```
/// use caxa_core::SelfImage;
/// use caxa_core::WireFormat;
/// use caxa_core::test_utils::ImageBuilder;
/// use caxa_core::test_utils::TarTestBuilder;
///
/// let archive = TarTestBuilder::new().add_file("index.js", b"").build_gz();
/// let bytes = ImageBuilder::new(b"stub".to_vec())
///     .archive(archive)
///     .footer("abc123", &["node", "{{caxa}}/index.js"])
///     .build();
///
/// let image = SelfImage::from_bytes(bytes, WireFormat::CAXA);
/// assert_eq!(image.footer().unwrap().footer.identifier, "abc123");
/// ```
#[derive(Debug, Clone)]
pub struct ImageBuilder {
    stub: Vec<u8>,
    format: WireFormat,
    archive: Vec<u8>,
    footer: String,
}

impl ImageBuilder {
    /// Starts an image from the stub's own bytes.
    #[must_use]
    pub fn new(stub: Vec<u8>) -> Self {
        Self {
            stub,
            format: WireFormat::CAXA,
            archive: TarTestBuilder::new().build_gz(),
            footer: String::new(),
        }
    }

    /// Sets the wire format.
    #[must_use]
    pub fn format(mut self, format: WireFormat) -> Self {
        self.format = format;
        self
    }

    /// Sets the compressed archive.
    #[must_use]
    pub fn archive(mut self, archive: Vec<u8>) -> Self {
        self.archive = archive;
        self
    }

    /// Sets a flat-array footer.
    #[must_use]
    pub fn footer(self, identifier: &str, command: &[&str]) -> Self {
        self.footer_json(&serde_json::json!({
            "identifier": identifier,
            "command": command,
        }))
    }

    /// Sets an arbitrary JSON footer.
    #[must_use]
    pub fn footer_json(mut self, footer: &serde_json::Value) -> Self {
        self.footer = footer.to_string();
        self
    }

    /// Sets raw footer text, which need not be JSON.
    #[must_use]
    pub fn footer_raw(mut self, footer: &str) -> Self {
        self.footer = footer.to_string();
        self
    }

    /// Concatenates the image.
    #[must_use]
    pub fn build(self) -> Vec<u8> {
        let mut image = self.stub;
        image.extend_from_slice(&self.format.archive_separator());
        image.extend_from_slice(&self.archive);
        image.push(self.format.footer_separator);
        image.extend_from_slice(self.footer.as_bytes());
        image
    }
}
