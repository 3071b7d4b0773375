//! Byte sources feeding the demuxer.
//!
//! A [`ByteSource`] is a sequential reader with absolute seeks, owned
//! exclusively by the clip that plays it. Reads may block; only the decode
//! role ever calls them.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

/// Number of bytes handed to the demuxer per read. The decode loop treats a
/// read shorter than this as "no more data this tick".
pub const CHUNK_SIZE: usize = 4096;

/// A sequential, absolutely-seekable byte provider.
pub trait ByteSource: Send {
    /// Reads up to `buf.len()` bytes, returning the number read.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Repositions to an absolute byte offset.
    fn seek(&mut self, offset: u64) -> io::Result<()>;

    /// Returns the current read position.
    fn tell(&self) -> u64;

    /// Returns the total size in bytes.
    fn size(&self) -> u64;
}

/// An in-memory byte source.
pub struct MemorySource {
    data: Vec<u8>,
    pos: usize,
}

impl MemorySource {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, pos: 0 }
    }
}

impl ByteSource for MemorySource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.data.len().saturating_sub(self.pos);
        let n = remaining.min(buf.len());
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }

    fn seek(&mut self, offset: u64) -> io::Result<()> {
        if offset > self.data.len() as u64 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek past end of memory source",
            ));
        }
        self.pos = offset as usize;
        Ok(())
    }

    fn tell(&self) -> u64 {
        self.pos as u64
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// A file-backed byte source.
pub struct FileSource {
    file: File,
    pos: u64,
    len: u64,
}

impl FileSource {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        Ok(Self { file, pos: 0, len })
    }
}

impl ByteSource for FileSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.file.read(buf)?;
        self.pos += n as u64;
        Ok(n)
    }

    fn seek(&mut self, offset: u64) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.pos = offset;
        Ok(())
    }

    fn tell(&self) -> u64 {
        self.pos
    }

    fn size(&self) -> u64 {
        self.len
    }
}
