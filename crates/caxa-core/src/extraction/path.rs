//! Entry path validation.
//!
//! Names are checked as raw bytes with `/` as the only separator, so the
//! same archive is accepted or rejected identically on every host.

use std::io::ErrorKind;
use std::path::Path;
use std::path::PathBuf;

use crate::Result;
use crate::StubError;

/// Validates a raw archive entry name and converts it to a relative path.
///
/// Rejected names:
/// - empty names
/// - names starting with `/` or a drive prefix such as `C:`
/// - names containing a `..` segment
/// - names containing `\` or NUL
///
/// Empty and `.` segments are dropped, so `./bin//run.sh` becomes
/// `bin/run.sh`.
///
/// # Errors
///
/// Returns [`StubError::UnsafePath`] for any rejected name.
///
/// # Examples
///
/// ```
/// use caxa_core::extraction::path::validate_entry_path;
/// use std::path::Path;
///
/// assert_eq!(
///     validate_entry_path(b"./bin/run.sh").unwrap(),
///     Path::new("bin/run.sh")
/// );
/// assert!(validate_entry_path(b"../evil.txt").is_err());
/// assert!(validate_entry_path(b"/etc/passwd").is_err());
/// assert!(validate_entry_path(b"dir\\file").is_err());
/// ```
pub fn validate_entry_path(raw: &[u8]) -> Result<PathBuf> {
    let unsafe_path = || StubError::UnsafePath {
        path: PathBuf::from(String::from_utf8_lossy(raw).into_owned()),
    };

    if raw.is_empty() || raw[0] == b'/' || raw.contains(&b'\\') || raw.contains(&0) {
        return Err(unsafe_path());
    }

    let mut path = PathBuf::new();
    for (index, segment) in raw.split(|&byte| byte == b'/').enumerate() {
        match segment {
            b"" | b"." => {}
            b".." => return Err(unsafe_path()),
            [letter, b':', ..] if index == 0 && letter.is_ascii_alphabetic() => {
                return Err(unsafe_path());
            }
            _ => path.push(segment_to_path(segment).ok_or_else(unsafe_path)?),
        }
    }
    Ok(path)
}

#[cfg(unix)]
fn segment_to_path(segment: &[u8]) -> Option<&Path> {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    Some(Path::new(OsStr::from_bytes(segment)))
}

#[cfg(not(unix))]
fn segment_to_path(segment: &[u8]) -> Option<&Path> {
    std::str::from_utf8(segment).ok().map(Path::new)
}

/// Fails if any existing ancestor of `relative` under `dest` is a symbolic
/// link, which would let a write land outside `dest`.
///
/// The final component itself is not checked; symlink records replace it.
pub fn ensure_no_symlink_ancestors(dest: &Path, relative: &Path) -> Result<()> {
    let mut current = dest.to_path_buf();
    let mut components = relative.components().peekable();
    while let Some(component) = components.next() {
        if components.peek().is_none() {
            break;
        }
        current.push(component);
        match std::fs::symlink_metadata(&current) {
            Ok(metadata) if metadata.file_type().is_symlink() => {
                return Err(StubError::UnsafePath {
                    path: relative.to_path_buf(),
                });
            }
            Ok(_) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => break,
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}
