use std::{
    fs::File,
    io::{self, Read},
    path::{Path, PathBuf},
};

use bytes::Bytes;

use crate::error::{ConfigError, UploadError};

const MEGABYTE: u64 = 1024 * 1024; // 1MB
pub const DEFAULT_CHUNK_SIZE_BYTES: u64 = 5 * MEGABYTE;

/// Number of parts a file of `file_size` bytes splits into.
pub fn part_count(file_size: u64, chunk_size: u64) -> u64 {
    file_size.div_ceil(chunk_size)
}

/// Reads a file front to back in fixed-size chunks.
///
/// Every chunk but the last is exactly `chunk_size` bytes. The reader is
/// single-pass and stops for good after the first I/O error.
pub struct ChunkReader<R = File> {
    source: R,
    path: PathBuf,
    chunk_size: usize,
    done: bool,
}

impl ChunkReader<File> {
    pub fn open(path: impl AsRef<Path>, chunk_size: u64) -> Result<Self, UploadError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| UploadError::io(path, e))?;
        Self::new(file, path, chunk_size)
    }
}

/// Rejects a chunk size that could never make progress.
pub fn check_chunk_size(chunk_size: u64) -> Result<(), ConfigError> {
    if chunk_size == 0 {
        return Err(ConfigError::Invalid {
            name: "CHUNK_SIZE",
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(())
}

impl<R: Read> ChunkReader<R> {
    pub fn new(source: R, path: impl Into<PathBuf>, chunk_size: u64) -> Result<Self, UploadError> {
        check_chunk_size(chunk_size)?;
        Ok(Self {
            source,
            path: path.into(),
            chunk_size: usize::try_from(chunk_size).unwrap_or(usize::MAX),
            done: false,
        })
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size as u64
    }

    /// Fills one buffer, retrying short reads until it is full or EOF.
    fn fill(&mut self) -> io::Result<Vec<u8>> {
        let mut buffer = vec![0u8; self.chunk_size];
        let mut filled = 0;
        while filled < buffer.len() {
            match self.source.read(&mut buffer[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        buffer.truncate(filled);
        Ok(buffer)
    }
}

impl<R: Read> Iterator for ChunkReader<R> {
    type Item = Result<Bytes, UploadError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.fill() {
            Ok(buffer) if buffer.is_empty() => {
                self.done = true;
                None
            }
            Ok(buffer) => {
                if buffer.len() < self.chunk_size {
                    self.done = true;
                }
                Some(Ok(Bytes::from(buffer)))
            }
            Err(e) => {
                self.done = true;
                Some(Err(UploadError::io(&self.path, e)))
            }
        }
    }
}
