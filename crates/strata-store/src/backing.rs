use memmap2::MmapMut;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{Result, StoreError};

/// Flat byte buffer a zone lives in. Growth may move the buffer, so callers keep
/// offsets, never pointers.
pub trait Backing {
    fn bytes(&self) -> &[u8];
    fn bytes_mut(&mut self) -> &mut [u8];
    /// Extends the buffer to `new_len` bytes; new bytes read as zero.
    fn grow(&mut self, new_len: usize) -> Result<()>;
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn len(&self) -> usize {
        self.bytes().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Backing for Vec<u8> {
    fn bytes(&self) -> &[u8] {
        self
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        self
    }

    fn grow(&mut self, new_len: usize) -> Result<()> {
        self.resize(new_len, 0);
        Ok(())
    }
}

fn map(file: &File) -> io::Result<MmapMut> {
    // SAFETY: the file is opened read-write by this process and only accessed through
    // this mapping while it lives; the store's locks serialize every access.
    unsafe { MmapMut::map_mut(file) }
}

/// A file mapped read-write into memory.
pub struct MappedFile {
    path: PathBuf,
    file: File,
    map: MmapMut,
}

impl MappedFile {
    /// Opens or creates `path`. A new or empty file is sized to `initial_len`; the
    /// returned flag is true in that case.
    pub fn open(path: &Path, initial_len: usize) -> Result<(Self, bool)> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let len = file.metadata()?.len();
        let fresh = len == 0;
        if fresh {
            file.set_len(initial_len as u64)?;
        }
        let map = map(&file)?;
        Ok((
            Self {
                path: path.to_path_buf(),
                file,
                map,
            },
            fresh,
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Backing for MappedFile {
    fn bytes(&self) -> &[u8] {
        &self.map
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.map
    }

    fn grow(&mut self, new_len: usize) -> Result<()> {
        let exhausted = |e: io::Error| {
            StoreError::CapacityExhausted(format!("growing {} to {new_len}: {e}", self.path.display()))
        };
        self.map.flush().map_err(exhausted)?;
        self.file.set_len(new_len as u64).map_err(exhausted)?;
        self.map = map(&self.file).map_err(exhausted)?;
        log::info!(target: "store", "grew {} to {} bytes", self.path.display(), new_len);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.map.flush()?;
        Ok(())
    }
}

impl Drop for MappedFile {
    fn drop(&mut self) {
        if let Err(e) = self.map.flush() {
            log::warn!(target: "store", "flushing {} on close: {e}", self.path.display());
        }
    }
}
