//! Disk I/O for archive files
//!
//! [`ArchiveFile`] is the block store: fixed-size block reads and writes at
//! absolute offsets, metadata-region access, and file growth. Growing is
//! the only way the archive's total size increases.

use crate::error::{ArchiveError, Result};
use crate::header::{Superblock, BLOCK_SIZE, DATA_START, SUPERBLOCK_SIZE, TABLE_OFFSET, TABLE_SIZE};
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Disk-backed archive storage
pub struct ArchiveFile {
    file: File,
    path: PathBuf,
}

impl ArchiveFile {
    /// Create a new archive file, truncating any existing one.
    ///
    /// Writes the superblock and a zeroed entry-table region, so a freshly
    /// created archive is exactly the metadata regions with no data blocks.
    pub fn create<P: AsRef<Path>>(path: P, superblock: &Superblock) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        file.write_all(&superblock.to_bytes())?;
        file.write_all(&vec![0u8; TABLE_SIZE])?;
        file.flush()?;

        Ok(ArchiveFile {
            file,
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Open an existing archive file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(&path)?;

        Ok(ArchiveFile {
            file,
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Read and validate the superblock region
    pub fn read_superblock(&mut self) -> Result<Superblock> {
        let mut buffer = vec![0u8; SUPERBLOCK_SIZE];
        self.read_exact_at(0, &mut buffer, "superblock region")?;
        Superblock::from_bytes(&buffer)
    }

    /// Write the superblock region
    pub fn write_superblock(&mut self, superblock: &Superblock) -> Result<()> {
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&superblock.to_bytes())?;
        self.file.flush()?;
        Ok(())
    }

    /// Read the raw entry-table region
    pub fn read_table_region(&mut self) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; TABLE_SIZE];
        self.read_exact_at(TABLE_OFFSET, &mut buffer, "entry table region")?;
        Ok(buffer)
    }

    /// Write the entry-table region
    pub fn write_table_region(&mut self, region: &[u8]) -> Result<()> {
        if region.len() != TABLE_SIZE {
            return Err(invalid_len("table region", TABLE_SIZE, region.len()));
        }

        self.file.seek(SeekFrom::Start(TABLE_OFFSET))?;
        self.file.write_all(region)?;
        self.file.flush()?;
        Ok(())
    }

    /// Read one block at an absolute byte offset
    pub fn read_block(&mut self, offset: u64) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; BLOCK_SIZE];
        self.read_exact_at(offset, &mut buffer, "data block")?;
        Ok(buffer)
    }

    /// Write one block at an absolute byte offset
    pub fn write_block(&mut self, offset: u64, block: &[u8]) -> Result<()> {
        if block.len() != BLOCK_SIZE {
            return Err(invalid_len("block", BLOCK_SIZE, block.len()));
        }

        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(block)?;
        Ok(())
    }

    /// Extend the file by one block and return the new block's offset.
    ///
    /// The new block lands on the first aligned offset past the current
    /// end of file (and past the metadata regions).
    pub fn grow(&mut self) -> Result<u64> {
        let len = self.file.metadata()?.len();
        let end = len.max(DATA_START);
        let offset = end.div_ceil(BLOCK_SIZE as u64) * BLOCK_SIZE as u64;

        self.file.set_len(offset + BLOCK_SIZE as u64)?;

        Ok(offset)
    }

    /// Truncate the file to the given length
    pub fn truncate(&mut self, len: u64) -> Result<()> {
        self.file.set_len(len)?;
        Ok(())
    }

    /// Current file length in bytes
    pub fn len(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    /// Get file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sync all writes to disk
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    fn read_exact_at(&mut self, offset: u64, buffer: &mut [u8], what: &str) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buffer).map_err(|e| {
            if e.kind() == ErrorKind::UnexpectedEof {
                ArchiveError::Corrupt(format!(
                    "unexpected end of archive while reading {} at offset {}",
                    what, offset
                ))
            } else {
                ArchiveError::Io(e)
            }
        })
    }
}

fn invalid_len(what: &str, expect: usize, got: usize) -> ArchiveError {
    ArchiveError::Io(std::io::Error::new(
        ErrorKind::InvalidInput,
        format!("{} must be exactly {} bytes, got {}", what, expect, got),
    ))
}
