//! Byte streams over descriptors opened by a backend.

use std::fs::File;
use std::io::{self, BufRead, Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use crate::pool::{BufferPool, PooledBuffer};

/// Copy everything from `reader` to `writer` through a pooled buffer.
pub fn copy_stream<R: Read + ?Sized, W: Write + ?Sized>(
    pool: &Arc<BufferPool>,
    reader: &mut R,
    writer: &mut W,
) -> io::Result<u64> {
    let mut buffer = pool.borrow();
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        writer.write_all(&buffer[..n])?;
        total += n as u64;
    }
    writer.flush()?;
    Ok(total)
}

/// Buffered reader over a file descriptor.
///
/// The read buffer is borrowed from the pool and goes back (zeroed) when
/// the stream is closed or dropped.
#[derive(Debug)]
pub struct FsInputStream {
    file: File,
    buffer: PooledBuffer,
    pos: usize,
    filled: usize,
}

impl FsInputStream {
    /// Wrap an open file.
    pub fn new(file: File, pool: &Arc<BufferPool>) -> Self {
        Self {
            file,
            buffer: pool.borrow(),
            pos: 0,
            filled: 0,
        }
    }

    /// Read one byte; `None` at end of file.
    pub fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let available = self.fill_buf()?;
        let Some(&byte) = available.first() else {
            return Ok(None);
        };
        self.consume(1);
        Ok(Some(byte))
    }

    /// Skip up to `n` bytes, returning how many were skipped. Stops at end
    /// of file.
    pub fn skip(&mut self, n: u64) -> io::Result<u64> {
        let buffered = (self.filled - self.pos) as u64;
        if n <= buffered {
            self.consume(n as usize);
            return Ok(n);
        }
        self.pos = 0;
        self.filled = 0;

        let position = self.file.stream_position()?;
        let length = self.file.metadata()?.len();
        let remaining = (n - buffered).min(length.saturating_sub(position));
        self.file.seek(SeekFrom::Current(remaining as i64))?;
        Ok(buffered + remaining)
    }

    /// Close the underlying descriptor.
    pub fn close(self) -> io::Result<()> {
        drop(self);
        Ok(())
    }
}

impl Read for FsInputStream {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        // Large reads bypass the buffer entirely.
        if self.pos == self.filled && out.len() >= self.buffer.len() {
            return self.file.read(out);
        }
        let available = self.fill_buf()?;
        let n = available.len().min(out.len());
        out[..n].copy_from_slice(&available[..n]);
        self.consume(n);
        Ok(n)
    }
}

impl BufRead for FsInputStream {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        if self.pos >= self.filled {
            self.filled = self.file.read(&mut self.buffer)?;
            self.pos = 0;
        }
        Ok(&self.buffer[self.pos..self.filled])
    }

    fn consume(&mut self, amount: usize) {
        self.pos = (self.pos + amount).min(self.filled);
    }
}

/// Writer over a file descriptor.
#[derive(Debug)]
pub struct FsOutputStream {
    file: File,
}

impl FsOutputStream {
    /// Wrap an open file.
    pub fn new(file: File) -> Self {
        Self { file }
    }

    /// Flush, sync to disk and close the underlying descriptor.
    pub fn close(mut self) -> io::Result<()> {
        self.file.flush()?;
        self.file.sync_all()
    }
}

impl Write for FsOutputStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}
