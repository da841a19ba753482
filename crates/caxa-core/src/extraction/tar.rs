//! Streaming gzip-compressed tar extraction.

use std::fs;
use std::fs::File;
use std::io::BufWriter;
use std::io::ErrorKind;
use std::io::Read;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::time::Instant;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use filetime::FileTime;
use flate2::read::GzDecoder;
use tracing::debug;
use tracing::warn;

use crate::ExtractionReport;
use crate::Result;
use crate::StubError;
use crate::copy::CopyBuffer;
use crate::copy::copy_with_buffer;
use crate::extraction::path::ensure_no_symlink_ancestors;
use crate::extraction::path::validate_entry_path;
use crate::types::EntryType;
use crate::types::TarEntry;

/// Setuid, setgid and sticky bits are never taken from the archive.
const PERMISSION_MASK: u32 = 0o777;

/// Extracts a gzip-compressed tar archive into a directory.
///
/// Supports regular files, directories and symbolic links. Any other record
/// type, any unsafe entry path, and any decoding error aborts the
/// extraction; nothing is skipped silently.
///
/// # Examples
///
/// ```no_run
/// use caxa_core::TarExtractor;
/// use std::path::Path;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let archive = std::fs::read("app.tar.gz")?;
/// let report = TarExtractor::new().extract(&archive, Path::new("/tmp/app"))?;
/// println!("extracted {} files", report.files_extracted);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct TarExtractor;

impl TarExtractor {
    /// Creates a new extractor.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Extracts `archive` into `destination`.
    pub fn extract(&self, archive: &[u8], destination: &Path) -> Result<ExtractionReport> {
        self.extract_with(archive, destination, &mut |_| {})
    }

    /// Extracts `archive` into `destination`, calling `on_entry` with the
    /// relative path of every entry once it is on disk.
    pub fn extract_with(
        &self,
        archive: &[u8],
        destination: &Path,
        on_entry: &mut dyn FnMut(&Path),
    ) -> Result<ExtractionReport> {
        let started = Instant::now();
        fs::create_dir_all(destination)?;

        let mut session = Session::new(destination);
        let mut archive = tar::Archive::new(GzDecoder::new(archive));
        let entries = archive.entries().map_err(corrupt)?;

        for entry in entries {
            let mut entry = entry.map_err(corrupt)?;
            let Some(record) = decode_entry(&entry)? else {
                continue;
            };
            session.write(&record, &mut entry)?;
            on_entry(&record.path);
        }

        session.finish()?;
        let mut report = session.report;
        report.duration = started.elapsed();
        debug!(
            destination = %destination.display(),
            files = report.files_extracted,
            directories = report.directories_created,
            symlinks = report.symlinks_created,
            bytes = report.bytes_written,
            "extraction finished in {:?}",
            report.duration
        );
        Ok(report)
    }
}

fn corrupt(source: std::io::Error) -> StubError {
    StubError::CorruptArchive { source }
}

/// Converts a tar header into a [`TarEntry`], or `None` for records that
/// carry only archive metadata.
fn decode_entry<R: Read>(entry: &tar::Entry<'_, R>) -> Result<Option<TarEntry>> {
    let header = entry.header();
    let kind = header.entry_type();
    if kind.is_pax_global_extensions() {
        return Ok(None);
    }

    let path = validate_entry_path(&entry.path_bytes())?;
    let entry_type = match kind {
        tar::EntryType::Regular | tar::EntryType::Continuous => EntryType::File,
        tar::EntryType::Directory => EntryType::Directory,
        tar::EntryType::Symlink => {
            let target = entry
                .link_name()
                .map_err(corrupt)?
                .ok_or_else(|| {
                    corrupt(std::io::Error::new(
                        ErrorKind::InvalidData,
                        format!("symlink {} has no target", path.display()),
                    ))
                })?
                .into_owned();
            EntryType::Symlink { target }
        }
        other => {
            return Err(StubError::UnsupportedEntryType {
                path,
                kind: describe(other),
            });
        }
    };

    Ok(Some(TarEntry {
        path,
        entry_type,
        mode: header.mode().map_err(corrupt)? & PERMISSION_MASK,
        size: entry.size(),
        mtime: header.mtime().ok(),
    }))
}

fn describe(kind: tar::EntryType) -> String {
    match kind {
        tar::EntryType::Link => "hard link".into(),
        tar::EntryType::Char => "character device".into(),
        tar::EntryType::Block => "block device".into(),
        tar::EntryType::Fifo => "fifo".into(),
        tar::EntryType::GNUSparse => "sparse file".into(),
        other => format!("{other:?}"),
    }
}

/// Mutable state of one extraction.
struct Session<'a> {
    destination: &'a Path,
    /// Clamp for modification times, in seconds since the epoch.
    started_at: u64,
    copy_buffer: CopyBuffer,
    /// Directory modes, applied once every child has been written.
    directory_modes: Vec<(PathBuf, u32)>,
    mtime_warning_logged: bool,
    report: ExtractionReport,
}

impl<'a> Session<'a> {
    fn new(destination: &'a Path) -> Self {
        let started_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_secs());
        Self {
            destination,
            started_at,
            copy_buffer: CopyBuffer::new(),
            directory_modes: Vec::new(),
            mtime_warning_logged: false,
            report: ExtractionReport::new(),
        }
    }

    fn write<R: Read>(&mut self, record: &TarEntry, contents: &mut R) -> Result<()> {
        // `./` may name the destination itself, but only as a directory.
        if record.path.as_os_str().is_empty() && !record.entry_type.is_directory() {
            return Err(StubError::UnsafePath {
                path: record.path.clone(),
            });
        }
        ensure_no_symlink_ancestors(self.destination, &record.path)?;
        let target = self.destination.join(&record.path);

        match &record.entry_type {
            EntryType::Directory => {
                fs::create_dir_all(&target)?;
                self.directory_modes.push((target, record.mode));
                self.report.directories_created += 1;
            }
            EntryType::File => self.write_file(record, &target, contents)?,
            EntryType::Symlink { target: link } => {
                create_parent(&target)?;
                remove_existing(&target)?;
                create_symlink(link, &target, &record.path)?;
                self.report.symlinks_created += 1;
            }
        }
        Ok(())
    }

    fn write_file<R: Read>(
        &mut self,
        record: &TarEntry,
        target: &Path,
        contents: &mut R,
    ) -> Result<()> {
        create_parent(target)?;
        // Never write through a link left by an earlier record.
        if fs::symlink_metadata(target).is_ok_and(|metadata| metadata.file_type().is_symlink()) {
            fs::remove_file(target)?;
        }

        let file = File::create(target)?;
        let mut writer = BufWriter::with_capacity(64 * 1024, file);
        let written = copy_with_buffer(contents, &mut writer, &mut self.copy_buffer)?;
        writer.flush()?;
        drop(writer);

        if written != record.size {
            return Err(StubError::TruncatedEntry {
                path: record.path.clone(),
                expected: record.size,
                actual: written,
            });
        }

        set_mode(target, record.mode)?;
        if let Some(mtime) = record.mtime {
            self.set_mtime(target, mtime);
        }

        self.report.files_extracted += 1;
        self.report.bytes_written += written;
        Ok(())
    }

    /// Applies a clamped modification time; failures are logged once.
    fn set_mtime(&mut self, target: &Path, mtime: u64) {
        let clamped = i64::try_from(mtime.min(self.started_at)).unwrap_or(i64::MAX);
        let time = FileTime::from_unix_time(clamped, 0);
        if let Err(err) = filetime::set_file_times(target, time, time) {
            if !self.mtime_warning_logged {
                warn!(
                    "failed to set modification time of {}: {err} (further errors suppressed)",
                    target.display()
                );
                self.report
                    .add_warning(format!("modification time not set: {}", target.display()));
                self.mtime_warning_logged = true;
            }
        }
    }

    /// Applies deferred directory modes, deepest first.
    fn finish(&mut self) -> Result<()> {
        while let Some((directory, mode)) = self.directory_modes.pop() {
            // A later record may have replaced the directory with a link.
            let is_directory =
                fs::symlink_metadata(&directory).is_ok_and(|metadata| metadata.is_dir());
            if is_directory {
                set_mode(&directory, mode)?;
            }
        }
        Ok(())
    }
}

fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn remove_existing(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(metadata) if metadata.is_dir() => fs::remove_dir(path)?,
        Ok(_) => fs::remove_file(path)?,
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => return Err(err.into()),
    }
    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

#[cfg(unix)]
fn create_symlink(link: &Path, at: &Path, _entry: &Path) -> Result<()> {
    std::os::unix::fs::symlink(link, at)?;
    Ok(())
}

#[cfg(windows)]
fn create_symlink(link: &Path, at: &Path, _entry: &Path) -> Result<()> {
    std::os::windows::fs::symlink_file(link, at)?;
    Ok(())
}

#[cfg(not(any(unix, windows)))]
fn create_symlink(_link: &Path, _at: &Path, entry: &Path) -> Result<()> {
    Err(StubError::UnsupportedEntryType {
        path: entry.to_path_buf(),
        kind: "symbolic link".into(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::test_utils::TarTestBuilder;
    use tempfile::TempDir;

    fn extract(archive: &[u8]) -> (TempDir, Result<ExtractionReport>) {
        let temp = TempDir::new().expect("failed to create temp dir");
        let result = TarExtractor::new().extract(archive, &temp.path().join("app"));
        (temp, result)
    }

    #[test]
    fn test_extract_files_and_directories() {
        let archive = TarTestBuilder::new()
            .add_directory("bin/")
            .add_file_with_mode("bin/run.sh", b"echo hi", 0o755)
            .add_file("README.md", b"# app")
            .build_gz();
        let (temp, result) = extract(&archive);
        let report = result.expect("extraction should succeed");

        let app = temp.path().join("app");
        assert_eq!(fs::read(app.join("bin/run.sh")).unwrap(), b"echo hi");
        assert_eq!(fs::read(app.join("README.md")).unwrap(), b"# app");
        assert_eq!(report.files_extracted, 2);
        assert_eq!(report.directories_created, 1);
        assert_eq!(report.bytes_written, 12);
    }

    #[test]
    fn test_parent_directories_created_implicitly() {
        let archive = TarTestBuilder::new()
            .add_file("a/b/c/deep.txt", b"deep")
            .build_gz();
        let (temp, result) = extract(&archive);
        result.unwrap();
        assert!(temp.path().join("app/a/b/c/deep.txt").is_file());
    }

    #[test]
    fn test_directory_record_is_idempotent() {
        let archive = TarTestBuilder::new()
            .add_file("dir/file.txt", b"x")
            .add_directory("dir/")
            .add_directory("dir/")
            .build_gz();
        let (temp, result) = extract(&archive);
        result.unwrap();
        assert!(temp.path().join("app/dir/file.txt").is_file());
    }

    #[test]
    #[cfg(unix)]
    fn test_permissions_preserved() {
        use std::os::unix::fs::PermissionsExt;

        let archive = TarTestBuilder::new()
            .add_file_with_mode("exec.sh", b"#!/bin/sh", 0o750)
            .add_file_with_mode("readonly.txt", b"ro", 0o444)
            .add_directory_with_mode("private/", 0o700)
            .build_gz();
        let (temp, result) = extract(&archive);
        result.unwrap();

        let mode = |name: &str| {
            fs::metadata(temp.path().join("app").join(name))
                .unwrap()
                .permissions()
                .mode()
                & 0o7777
        };
        assert_eq!(mode("exec.sh"), 0o750);
        assert_eq!(mode("readonly.txt"), 0o444);
        assert_eq!(mode("private"), 0o700);
    }

    #[test]
    #[cfg(unix)]
    fn test_special_mode_bits_dropped() {
        use std::os::unix::fs::PermissionsExt;

        let archive = TarTestBuilder::new()
            .add_file_with_mode("suid", b"x", 0o4755)
            .add_file_with_mode("sgid", b"x", 0o2750)
            .add_directory_with_mode("sticky/", 0o1777)
            .build_gz();
        let (temp, result) = extract(&archive);
        result.unwrap();

        let mode = |name: &str| {
            fs::metadata(temp.path().join("app").join(name))
                .unwrap()
                .permissions()
                .mode()
                & 0o7777
        };
        assert_eq!(mode("suid"), 0o755);
        assert_eq!(mode("sgid"), 0o750);
        assert_eq!(mode("sticky"), 0o777);
    }

    #[test]
    #[cfg(unix)]
    fn test_readonly_directory_applied_after_children() {
        use std::os::unix::fs::PermissionsExt;

        let archive = TarTestBuilder::new()
            .add_directory_with_mode("locked/", 0o555)
            .add_file("locked/inside.txt", b"still written")
            .build_gz();
        let (temp, result) = extract(&archive);
        result.expect("children of a read-only directory should be written");

        let locked = temp.path().join("app/locked");
        assert_eq!(
            fs::read(locked.join("inside.txt")).unwrap(),
            b"still written"
        );
        assert_eq!(
            fs::metadata(&locked).unwrap().permissions().mode() & 0o777,
            0o555
        );
        // Let TempDir clean up.
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn test_mtime_preserved() {
        let archive = TarTestBuilder::new()
            .add_file_with_mtime("old.txt", b"old", 1_000_000_000)
            .build_gz();
        let (temp, result) = extract(&archive);
        result.unwrap();

        let metadata = fs::metadata(temp.path().join("app/old.txt")).unwrap();
        let mtime = FileTime::from_last_modification_time(&metadata);
        assert_eq!(mtime.unix_seconds(), 1_000_000_000);
    }

    #[test]
    fn test_future_mtime_clamped() {
        let before = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();
        let archive = TarTestBuilder::new()
            .add_file_with_mtime("future.txt", b"future", before + 10 * 365 * 24 * 3600)
            .build_gz();
        let (temp, result) = extract(&archive);
        result.unwrap();
        let after = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();

        let metadata = fs::metadata(temp.path().join("app/future.txt")).unwrap();
        let mtime = FileTime::from_last_modification_time(&metadata).unix_seconds();
        let mtime = u64::try_from(mtime).unwrap();
        assert!(mtime >= before && mtime <= after, "mtime {mtime} not clamped");
    }

    #[test]
    #[cfg(unix)]
    fn test_symlink_created() {
        let archive = TarTestBuilder::new()
            .add_file("payload/v1/version.txt", b"v1")
            .add_symlink("current", "payload/v1")
            .build_gz();
        let (temp, result) = extract(&archive);
        let report = result.unwrap();

        let app = temp.path().join("app");
        assert_eq!(
            fs::read_link(app.join("current")).unwrap(),
            Path::new("payload/v1")
        );
        assert_eq!(fs::read(app.join("current/version.txt")).unwrap(), b"v1");
        assert_eq!(report.symlinks_created, 1);
    }

    #[test]
    #[cfg(unix)]
    fn test_symlink_replaces_existing_entry() {
        let archive = TarTestBuilder::new()
            .add_file("link", b"placeholder")
            .add_symlink("link", "target.txt")
            .build_gz();
        let (temp, result) = extract(&archive);
        result.unwrap();
        assert_eq!(
            fs::read_link(temp.path().join("app/link")).unwrap(),
            Path::new("target.txt")
        );
    }

    #[test]
    #[cfg(unix)]
    fn test_symlink_target_not_validated() {
        let archive = TarTestBuilder::new()
            .add_symlink("system-sh", "/bin/sh")
            .add_symlink("sibling", "../shared")
            .build_gz();
        let (temp, result) = extract(&archive);
        result.expect("link targets may point anywhere");
        assert_eq!(
            fs::read_link(temp.path().join("app/system-sh")).unwrap(),
            Path::new("/bin/sh")
        );
    }

    #[test]
    #[cfg(unix)]
    fn test_write_through_symlink_rejected() {
        let outside = TempDir::new().expect("failed to create temp dir");
        let archive = TarTestBuilder::new()
            .add_symlink("escape", outside.path().to_str().unwrap())
            .add_file("escape/evil.txt", b"gotcha")
            .build_gz();
        let (_temp, result) = extract(&archive);
        assert!(matches!(result, Err(StubError::UnsafePath { .. })));
        assert!(!outside.path().join("evil.txt").exists());
    }

    #[test]
    #[cfg(unix)]
    fn test_file_replaces_symlink_instead_of_following_it() {
        let outside = TempDir::new().expect("failed to create temp dir");
        let victim = outside.path().join("victim.txt");
        fs::write(&victim, b"original").unwrap();
        let archive = TarTestBuilder::new()
            .add_symlink("file.txt", victim.to_str().unwrap())
            .add_file("file.txt", b"replaced")
            .build_gz();
        let (temp, result) = extract(&archive);
        result.unwrap();
        assert_eq!(fs::read(&victim).unwrap(), b"original");
        assert_eq!(fs::read(temp.path().join("app/file.txt")).unwrap(), b"replaced");
    }

    #[test]
    fn test_parent_traversal_rejected() {
        let archive = TarTestBuilder::new()
            .add_raw_name_file("../evil.txt", b"evil")
            .build_gz();
        let (temp, result) = extract(&archive);
        assert!(matches!(result, Err(StubError::UnsafePath { .. })));
        assert!(!temp.path().join("evil.txt").exists());
    }

    #[test]
    fn test_absolute_path_rejected() {
        let archive = TarTestBuilder::new()
            .add_raw_name_file("/tmp/evil.txt", b"evil")
            .build_gz();
        let (_temp, result) = extract(&archive);
        assert!(matches!(result, Err(StubError::UnsafePath { .. })));
    }

    #[test]
    fn test_backslash_rejected() {
        let archive = TarTestBuilder::new()
            .add_raw_name_file("dir\\file.txt", b"x")
            .build_gz();
        let (_temp, result) = extract(&archive);
        assert!(matches!(result, Err(StubError::UnsafePath { .. })));
    }

    #[test]
    fn test_hardlink_unsupported() {
        let archive = TarTestBuilder::new()
            .add_file("original.txt", b"x")
            .add_hardlink("copy.txt", "original.txt")
            .build_gz();
        let (_temp, result) = extract(&archive);
        match result {
            Err(StubError::UnsupportedEntryType { path, kind }) => {
                assert_eq!(path, Path::new("copy.txt"));
                assert_eq!(kind, "hard link");
            }
            other => panic!("expected UnsupportedEntryType, got {other:?}"),
        }
    }

    #[test]
    fn test_fifo_unsupported() {
        let archive = TarTestBuilder::new().add_fifo("pipe").build_gz();
        let (_temp, result) = extract(&archive);
        assert!(matches!(
            result,
            Err(StubError::UnsupportedEntryType { .. })
        ));
    }

    #[test]
    fn test_not_gzip_is_corrupt() {
        let (_temp, result) = extract(b"definitely not gzip");
        assert!(matches!(result, Err(StubError::CorruptArchive { .. })));
    }

    #[test]
    fn test_truncated_stream_fails() {
        let archive = TarTestBuilder::new()
            .add_file("big.bin", &noise(256 * 1024))
            .build_gz();
        let truncated = &archive[..archive.len() / 2];
        let (_temp, result) = extract(truncated);
        assert!(matches!(
            result,
            Err(StubError::CorruptArchive { .. } | StubError::TruncatedEntry { .. })
        ));
    }

    #[test]
    fn test_short_file_record_is_truncated_entry() {
        // Header plus the first 1000 of 5000 content bytes.
        let tar = TarTestBuilder::new().add_file("big", &[0x42; 5000]).build();
        let archive = crate::test_utils::gzip(&tar[..512 + 1000]);
        let (temp, result) = extract(&archive);

        match result {
            Err(StubError::TruncatedEntry {
                path,
                expected,
                actual,
            }) => {
                assert_eq!(path, PathBuf::from("big"));
                assert_eq!(expected, 5000);
                assert_eq!(actual, 1000);
            }
            other => panic!("expected TruncatedEntry, got {other:?}"),
        }
        assert_eq!(fs::metadata(temp.path().join("app/big")).unwrap().len(), 1000);
    }

    #[test]
    #[tracing_test::traced_test]
    fn test_mtime_failure_reported_once() {
        let temp = TempDir::new().unwrap();
        let mut session = Session::new(temp.path());

        session.set_mtime(&temp.path().join("missing-a"), 1);
        session.set_mtime(&temp.path().join("missing-b"), 2);

        assert_eq!(session.report.warnings.len(), 1);
        assert!(session.report.warnings[0].contains("missing-a"));
        logs_assert(|lines: &[&str]| {
            match lines
                .iter()
                .filter(|line| line.contains("failed to set modification time"))
                .count()
            {
                1 => Ok(()),
                n => Err(format!("expected one warning, found {n}")),
            }
        });
    }

    /// Incompressible bytes, so half of the gzip stream is half of the data.
    fn noise(len: usize) -> Vec<u8> {
        let mut state: u32 = 0x9E37_79B9;
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                state.to_le_bytes()[0]
            })
            .collect()
    }

    #[test]
    fn test_empty_archive() {
        let archive = TarTestBuilder::new().build_gz();
        let (temp, result) = extract(&archive);
        assert_eq!(result.unwrap().total_items(), 0);
        assert!(temp.path().join("app").is_dir());
    }

    #[test]
    fn test_on_entry_called_per_entry() {
        let archive = TarTestBuilder::new()
            .add_directory("d/")
            .add_file("d/a", b"a")
            .add_file("d/b", b"b")
            .build_gz();
        let temp = TempDir::new().unwrap();
        let mut seen = Vec::new();
        TarExtractor::new()
            .extract_with(&archive, temp.path(), &mut |path| seen.push(path.to_path_buf()))
            .unwrap();
        assert_eq!(
            seen,
            vec![
                PathBuf::from("d"),
                PathBuf::from("d/a"),
                PathBuf::from("d/b")
            ]
        );
    }
}
