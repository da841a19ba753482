//! Buffered entry copy with a reusable buffer.
//!
//! Read failures come from the decompressor and are reported as
//! [`StubError::CorruptArchive`]; write failures come from the destination
//! filesystem and are reported as [`StubError::Io`].

use std::io::Read;
use std::io::Write;
use std::io::{self};

use crate::StubError;

/// Buffer size for entry copies (64KB).
const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Heap buffer reused across every entry of one extraction.
#[derive(Debug)]
pub struct CopyBuffer {
    buf: Box<[u8]>,
}

impl CopyBuffer {
    /// Creates a new copy buffer.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            buf: vec![0u8; COPY_BUFFER_SIZE].into_boxed_slice(),
        }
    }
}

impl Default for CopyBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Copies everything from `reader` to `writer`, returning the byte count.
///
/// # Errors
///
/// - [`StubError::CorruptArchive`] if reading fails.
/// - [`StubError::Io`] if writing fails.
///
/// # Examples
///
/// ```
/// use caxa_core::copy::CopyBuffer;
/// use caxa_core::copy::copy_with_buffer;
///
/// let mut buffer = CopyBuffer::new();
/// let mut output = Vec::new();
/// let copied = copy_with_buffer(&mut &b"echo hi"[..], &mut output, &mut buffer).unwrap();
/// assert_eq!(copied, 7);
/// ```
#[inline]
pub fn copy_with_buffer<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    buffer: &mut CopyBuffer,
) -> Result<u64, StubError> {
    let mut total: u64 = 0;

    loop {
        let bytes_read = match reader.read(&mut buffer.buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(StubError::CorruptArchive { source: e }),
        };

        writer
            .write_all(&buffer.buf[..bytes_read])
            .map_err(StubError::Io)?;

        total += bytes_read as u64;
    }

    Ok(total)
}
