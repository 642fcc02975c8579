//! Bounded streaming copy with content hashing.

use std::io::{self, ErrorKind, Read, Write};

/// Intermediate buffer size for asset streaming.
pub(crate) const COPY_BUFFER_BYTES: usize = 16 * 1024;

/// `Write` adapter that feeds every written byte into a BLAKE3 hasher.
pub(crate) struct HashingWriter<'a, W: Write> {
    inner: W,
    hasher: &'a mut blake3::Hasher,
    written: u64,
}

impl<'a, W: Write> HashingWriter<'a, W> {
    pub(crate) fn new(inner: W, hasher: &'a mut blake3::Hasher) -> Self {
        Self {
            inner,
            hasher,
            written: 0,
        }
    }

    pub(crate) fn written(&self) -> u64 {
        self.written
    }
}

impl<W: Write> Write for HashingWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // Only hash what the inner writer accepted.
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Streams `reader` into `writer` through a fixed-size buffer.
///
/// Returns the number of bytes copied. `Interrupted` reads are retried.
pub(crate) fn copy_bounded<R, W>(reader: &mut R, writer: &mut W) -> io::Result<u64>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut buffer = [0u8; COPY_BUFFER_BYTES];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        writer.write_all(&buffer[..n])?;
        total += n as u64;
    }
    writer.flush()?;
    Ok(total)
}
