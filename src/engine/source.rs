//! Pull-based byte sources
//!
//! The engine constructs documents by repeatedly pulling bytes from a
//! source until it signals EOF or an error. Reads are synchronous; a
//! source that never reaches EOF hangs construction, which is the
//! caller's responsibility to avoid.

use std::io::Read;

/// A pull-based byte source.
///
/// `read` fills `buf` and returns the number of bytes written, `0` at
/// EOF, or a negative value on error. `close` is invoked exactly once
/// when the engine is done pulling and returns `0` on success.
pub trait ByteSource {
    fn read(&mut self, buf: &mut [u8]) -> isize;

    fn close(&mut self) -> i32 {
        0
    }
}

/// A source over a complete in-memory buffer.
pub struct BufferSource<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> BufferSource<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        BufferSource { bytes, pos: 0 }
    }
}

impl ByteSource for BufferSource<'_> {
    fn read(&mut self, buf: &mut [u8]) -> isize {
        let remaining = &self.bytes[self.pos..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.pos += n;
        n as isize
    }
}

/// Adapts any [`std::io::Read`] into a [`ByteSource`]. I/O errors map to
/// the negative return the engine treats as a failed construction.
pub struct ReadSource<R: Read> {
    reader: R,
}

impl<R: Read> ReadSource<R> {
    pub fn new(reader: R) -> Self {
        ReadSource { reader }
    }
}

impl<R: Read> ByteSource for ReadSource<R> {
    fn read(&mut self, buf: &mut [u8]) -> isize {
        match self.reader.read(buf) {
            Ok(n) => n as isize,
            Err(_) => -1,
        }
    }
}
