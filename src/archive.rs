//! Archive engine
//!
//! Orchestrates the block store, free-block allocator, and entry table to
//! implement create/list/extract/append/update/delete/defragment against
//! one archive file. Every operation loads the full metadata regions into
//! memory, mutates them, performs its data I/O, and writes the metadata
//! back; there is no partial-operation recovery if the process dies
//! mid-operation (a documented constraint of the format, not a bug).

use crate::allocator::FreeList;
use crate::error::{ArchiveError, Result};
use crate::header::{
    Superblock, BLOCKS_PER_ENTRY, BLOCK_SIZE, DATA_START, MAX_NAME_LEN, METADATA_SIZE,
};
use crate::io::ArchiveFile;
use crate::table::{EntryTable, FileEntry};
use std::collections::HashSet;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

/// One row of a listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub name: String,
    pub size: u64,
    pub blocks: usize,
}

/// Archive statistics
#[derive(Debug, Clone, Copy)]
pub struct ArchiveStats {
    pub total_blocks: usize,
    pub free_blocks: usize,
    pub live_entries: usize,
    pub tombstones: usize,
}

/// Result of a multi-name operation.
///
/// Name-level failures (missing entry, duplicate name, unreadable source)
/// are collected here while the rest of the batch proceeds; I/O and
/// corruption errors abort the whole operation instead.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub done: Vec<String>,
    pub failed: Vec<(String, ArchiveError)>,
}

impl BatchOutcome {
    pub fn all_ok(&self) -> bool {
        self.failed.is_empty()
    }
}

/// An open archive
///
/// Owns the file handle plus the in-memory superblock, entry table, and
/// free-block set for the duration of the operation; the handle is
/// released when the value drops, on every exit path.
pub struct Archive {
    file: ArchiveFile,
    superblock: Superblock,
    table: EntryTable,
    free: FreeList,
    verbose: bool,
}

impl Archive {
    /// Create a fresh, empty archive, truncating any existing file
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let superblock = Superblock::new();
        let file = ArchiveFile::create(&path, &superblock)?;

        tracing::debug!(archive = %path.as_ref().display(), "created empty archive");

        Ok(Archive {
            file,
            superblock,
            table: EntryTable::new(),
            free: FreeList::new(),
            verbose: false,
        })
    }

    /// Open an existing archive, loading and sanity-checking its metadata.
    ///
    /// Fails with [`ArchiveError::Corrupt`] before any mutation if the
    /// superblock, table, or free list is structurally bad.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = ArchiveFile::open(&path)?;
        let superblock = file.read_superblock()?;
        let region = file.read_table_region()?;
        let table = EntryTable::from_bytes(&region, superblock.entry_count as usize)?;
        let free = FreeList::from_offsets(&superblock.free_offsets)?;

        check_consistency(&table, &free)?;

        Ok(Archive {
            file,
            superblock,
            table,
            free,
            verbose: false,
        })
    }

    /// Enable info-level progress narration (no behavioral effect)
    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Pack source files into the archive (the create/append loop).
    ///
    /// A source that cannot be opened, whose name collides with a live
    /// entry, or that exceeds the per-entry block limit is skipped with a
    /// diagnostic and recorded in the outcome; the rest of the batch
    /// proceeds. A full entry table aborts the whole operation.
    pub fn append<P: AsRef<Path>>(&mut self, sources: &[P]) -> Result<BatchOutcome> {
        let mut outcome = BatchOutcome::default();

        for source in sources {
            let source = source.as_ref();
            let label = source.display().to_string();

            match self.admit_source(source) {
                Ok((name, reader, size)) => {
                    self.pack_reader(&name, reader, size)?;
                    self.narrate(format_args!("packed {} ({} bytes)", name, size));
                    outcome.done.push(name);
                }
                Err(err @ ArchiveError::TableFull(_)) => return Err(err),
                Err(err) => {
                    tracing::warn!(source = %label, error = %err, "skipping source");
                    outcome.failed.push((label, err));
                }
            }
        }

        self.flush()?;
        Ok(outcome)
    }

    /// List the live entries in table order
    pub fn list(&self) -> Vec<EntryInfo> {
        self.table
            .live()
            .map(|(_, entry)| EntryInfo {
                name: entry.name.clone(),
                size: entry.total_size,
                blocks: entry.blocks.len(),
            })
            .collect()
    }

    /// Extract entries into `dest_dir`.
    ///
    /// With `names: None` every live entry is extracted; otherwise only the
    /// requested names, with a per-name [`ArchiveError::NotFound`] recorded
    /// for the missing ones. An output file that cannot be created is
    /// likewise skipped; archive-side read failures abort the operation.
    pub fn extract<P: AsRef<Path>>(
        &mut self,
        dest_dir: P,
        names: Option<&[String]>,
    ) -> Result<BatchOutcome> {
        let dest_dir = dest_dir.as_ref();
        let mut outcome = BatchOutcome::default();

        let targets: Vec<usize> = match names {
            None => self.table.live().map(|(idx, _)| idx).collect(),
            Some(names) => {
                let mut indices = Vec::with_capacity(names.len());
                for name in names {
                    match self.table.find(name) {
                        Some(idx) => indices.push(idx),
                        None => {
                            tracing::warn!(name = %name, "entry not found, skipping");
                            outcome
                                .failed
                                .push((name.clone(), ArchiveError::NotFound(name.clone())));
                        }
                    }
                }
                indices
            }
        };

        for idx in targets {
            let entry = match self.table.get(idx) {
                Some(entry) => entry.clone(),
                None => continue,
            };

            let dest = dest_dir.join(&entry.name);
            let mut out = match File::create(&dest) {
                Ok(out) => out,
                Err(err) => {
                    tracing::warn!(dest = %dest.display(), error = %err, "cannot create output file");
                    outcome.failed.push((entry.name, err.into()));
                    continue;
                }
            };

            self.copy_out(&entry, &mut out)?;
            self.narrate(format_args!(
                "extracted {} ({} bytes)",
                entry.name, entry.total_size
            ));
            outcome.done.push(entry.name);
        }

        Ok(outcome)
    }

    /// Replace an entry's content with the current content of the source
    /// file of the same name.
    ///
    /// The new content is packed into fresh blocks before the old ones are
    /// released, so a source that fails mid-read leaves the entry and its
    /// data untouched.
    pub fn update(&mut self, name: &str) -> Result<()> {
        self.update_from(name, name)
    }

    /// Like [`Archive::update`], but with the replacement source at an
    /// explicit path instead of the entry name in the working directory
    pub fn update_from<P: AsRef<Path>>(&mut self, name: &str, source: P) -> Result<()> {
        let idx = self
            .table
            .find(name)
            .ok_or_else(|| ArchiveError::NotFound(name.to_string()))?;

        // Open the replacement before touching any state
        let mut reader = File::open(source.as_ref())?;
        let size = reader.metadata()?.len();
        if blocks_needed(size) > BLOCKS_PER_ENTRY {
            return Err(ArchiveError::FileTooLarge {
                name: name.to_string(),
                max: BLOCKS_PER_ENTRY,
            });
        }

        // Pack first so a mid-read failure cannot touch the old blocks
        let blocks = self.write_blocks(&mut reader, size)?;

        let old_blocks = match self.table.get_mut(idx) {
            Some(entry) => {
                entry.total_size = size;
                std::mem::replace(&mut entry.blocks, blocks)
            }
            None => Vec::new(),
        };
        for &offset in &old_blocks {
            self.free.free(offset)?;
        }

        self.flush()?;
        self.narrate(format_args!("updated {} ({} bytes)", name, size));
        Ok(())
    }

    /// Tombstone entries by name, freeing their blocks.
    ///
    /// Missing names are reported per-name without aborting the batch.
    /// Table slots are not reclaimed and the file does not shrink; both
    /// wait for [`Archive::defragment`].
    pub fn delete<S: AsRef<str>>(&mut self, names: &[S]) -> Result<BatchOutcome> {
        let mut outcome = BatchOutcome::default();

        for name in names {
            let name = name.as_ref();
            match self.table.find(name) {
                None => {
                    tracing::warn!(name = %name, "entry not found, skipping");
                    outcome
                        .failed
                        .push((name.to_string(), ArchiveError::NotFound(name.to_string())));
                }
                Some(idx) => {
                    if let Some(entry) = self.table.tombstone(idx) {
                        for &offset in &entry.blocks {
                            self.free.free(offset)?;
                        }
                        self.narrate(format_args!("deleted {}", entry.name));
                        outcome.done.push(entry.name);
                    }
                }
            }
        }

        self.flush()?;
        Ok(outcome)
    }

    /// Rewrite the data region contiguously and drop tombstones.
    ///
    /// Every live entry's blocks move to consecutive offsets starting at
    /// the beginning of the data region, the table is compacted, the free
    /// set is emptied, and the trailing space is truncated away. This is
    /// the only operation whose cost scales with the whole archive rather
    /// than with the requested change, and the only one that renumbers
    /// offsets.
    pub fn defragment(&mut self) -> Result<()> {
        self.narrate(format_args!(
            "defragmenting {} ({} live entries, {} tombstones)",
            self.file.path().display(),
            self.table.live_count(),
            self.table.tombstone_count()
        ));

        // Destination offsets can overlap the source blocks of entries
        // later in the table, so the whole data region is staged in memory
        // before anything is rewritten.
        let mut staged = Vec::with_capacity(self.table.live_count());
        for (_, entry) in self.table.live() {
            let mut content = Vec::with_capacity(entry.blocks.len());
            for &offset in &entry.blocks {
                content.push(self.file.read_block(offset)?);
            }
            staged.push(content);
        }

        self.table.compact();

        let mut next = DATA_START;
        let mut staged = staged.into_iter();
        // After compaction every slot is live, in the same order as staged
        for idx in 0..self.table.used_slots() {
            let content = match staged.next() {
                Some(content) => content,
                None => break,
            };

            let mut blocks = Vec::with_capacity(content.len());
            for buffer in &content {
                self.file.write_block(next, buffer)?;
                blocks.push(next);
                next += BLOCK_SIZE as u64;
            }

            if let Some(entry) = self.table.get_mut(idx) {
                entry.blocks = blocks;
            }
        }

        self.free.clear();

        let new_len = if next == DATA_START {
            METADATA_SIZE
        } else {
            next
        };
        self.file.truncate(new_len)?;

        self.flush()?;
        self.narrate(format_args!(
            "defragmentation complete, archive is {} bytes",
            new_len
        ));
        Ok(())
    }

    /// Write the superblock and entry table back to disk
    pub fn flush(&mut self) -> Result<()> {
        self.superblock.entry_count = self.table.used_slots() as u32;
        self.superblock.free_offsets = self.free.to_offsets();

        self.file.write_superblock(&self.superblock)?;
        self.file.write_table_region(&self.table.to_bytes())?;
        self.file.sync()?;
        Ok(())
    }

    /// Flush and release the archive
    pub fn close(mut self) -> Result<()> {
        self.flush()
    }

    pub fn stats(&self) -> ArchiveStats {
        let live_blocks: usize = self.table.live().map(|(_, e)| e.blocks.len()).sum();
        ArchiveStats {
            total_blocks: live_blocks + self.free.len(),
            free_blocks: self.free.len(),
            live_entries: self.table.live_count(),
            tombstones: self.table.tombstone_count(),
        }
    }

    /// Validate a source and open it: resolves the flat entry name, checks
    /// for collisions and the per-entry block limit
    fn admit_source(&self, source: &Path) -> Result<(String, File, u64)> {
        let name = source
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| ArchiveError::InvalidName(source.display().to_string()))?;

        if name.len() > MAX_NAME_LEN {
            return Err(ArchiveError::InvalidName(name));
        }

        if self.table.find(&name).is_some() {
            return Err(ArchiveError::DuplicateName(name));
        }

        if self.table.is_full() {
            return Err(ArchiveError::TableFull(crate::header::ENTRY_CAPACITY));
        }

        let reader = File::open(source)?;
        let size = reader.metadata()?.len();

        if blocks_needed(size) > BLOCKS_PER_ENTRY {
            return Err(ArchiveError::FileTooLarge {
                name,
                max: BLOCKS_PER_ENTRY,
            });
        }

        Ok((name, reader, size))
    }

    fn pack_reader(&mut self, name: &str, mut reader: File, size: u64) -> Result<()> {
        let blocks = self.write_blocks(&mut reader, size)?;

        let entry = match FileEntry::new(name, size, blocks.clone()) {
            Ok(entry) => entry,
            Err(err) => {
                self.reclaim(&blocks);
                return Err(err);
            }
        };

        if let Err(err) = self.table.insert(entry) {
            self.reclaim(&blocks);
            return Err(err);
        }

        Ok(())
    }

    /// Chunk a reader into freshly allocated blocks, zero-padding the
    /// final partial chunk. An empty source still gets one block.
    fn write_blocks(&mut self, reader: &mut File, size: u64) -> Result<Vec<u64>> {
        let nblocks = blocks_needed(size);
        let mut blocks = Vec::with_capacity(nblocks);
        let mut remaining = size;

        for _ in 0..nblocks {
            let want = remaining.min(BLOCK_SIZE as u64) as usize;
            let mut buffer = vec![0u8; BLOCK_SIZE];

            if let Err(err) = self.fill_block(reader, &mut buffer, want, &mut blocks) {
                self.reclaim(&blocks);
                return Err(err);
            }

            remaining -= want as u64;
        }

        Ok(blocks)
    }

    fn fill_block(
        &mut self,
        reader: &mut File,
        buffer: &mut [u8],
        want: usize,
        blocks: &mut Vec<u64>,
    ) -> Result<()> {
        reader.read_exact(&mut buffer[..want])?;
        let offset = self.free.allocate(&mut self.file)?;
        blocks.push(offset);
        self.file.write_block(offset, buffer)?;
        Ok(())
    }

    /// Return blocks allocated for a failed pack to the free set
    fn reclaim(&mut self, blocks: &[u64]) {
        for &offset in blocks {
            let _ = self.free.free(offset);
        }
    }

    fn copy_out(&mut self, entry: &FileEntry, out: &mut File) -> Result<()> {
        let mut remaining = entry.total_size;
        for &offset in &entry.blocks {
            let block = self.file.read_block(offset)?;
            let take = remaining.min(BLOCK_SIZE as u64) as usize;
            out.write_all(&block[..take])?;
            remaining -= take as u64;
        }
        out.flush()?;
        Ok(())
    }

    fn narrate(&self, message: std::fmt::Arguments<'_>) {
        if self.verbose {
            tracing::info!("{}", message);
        } else {
            tracing::debug!("{}", message);
        }
    }
}

/// Blocks needed for a content size; an empty file still occupies one block
pub(crate) fn blocks_needed(size: u64) -> usize {
    if size == 0 {
        1
    } else {
        size.div_ceil(BLOCK_SIZE as u64) as usize
    }
}

/// Structural sanity for freshly loaded metadata: live block references
/// must be aligned data-region offsets, unique, disjoint from the free
/// set, and each entry's block count must match its size.
fn check_consistency(table: &EntryTable, free: &FreeList) -> Result<()> {
    let mut seen = HashSet::new();

    for (idx, entry) in table.live() {
        if blocks_needed(entry.total_size) != entry.blocks.len() {
            return Err(ArchiveError::Corrupt(format!(
                "entry {} ({}) has {} blocks for {} bytes",
                idx,
                entry.name,
                entry.blocks.len(),
                entry.total_size
            )));
        }

        for &offset in &entry.blocks {
            if offset < DATA_START || offset % BLOCK_SIZE as u64 != 0 {
                return Err(ArchiveError::Corrupt(format!(
                    "entry {} ({}) references non-block offset {}",
                    idx, entry.name, offset
                )));
            }
            if free.contains(offset) {
                return Err(ArchiveError::Corrupt(format!(
                    "block {} is both free and referenced by {}",
                    offset, entry.name
                )));
            }
            if !seen.insert(offset) {
                return Err(ArchiveError::Corrupt(format!(
                    "block {} is referenced by two live entries",
                    offset
                )));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocks_needed() {
        assert_eq!(blocks_needed(0), 1);
        assert_eq!(blocks_needed(1), 1);
        assert_eq!(blocks_needed(BLOCK_SIZE as u64), 1);
        assert_eq!(blocks_needed(BLOCK_SIZE as u64 + 1), 2);
        assert_eq!(blocks_needed(2 * BLOCK_SIZE as u64), 2);
    }

    #[test]
    fn test_consistency_rejects_shared_block() {
        let mut table = EntryTable::new();
        table
            .insert(FileEntry::new("a", 5, vec![DATA_START]).unwrap())
            .unwrap();
        table
            .insert(FileEntry::new("b", 5, vec![DATA_START]).unwrap())
            .unwrap();

        let free = FreeList::new();
        assert!(matches!(
            check_consistency(&table, &free),
            Err(ArchiveError::Corrupt(_))
        ));
    }

    #[test]
    fn test_consistency_rejects_free_and_referenced() {
        let mut table = EntryTable::new();
        table
            .insert(FileEntry::new("a", 5, vec![DATA_START]).unwrap())
            .unwrap();

        let free = FreeList::from_offsets(&[DATA_START]).unwrap();
        assert!(matches!(
            check_consistency(&table, &free),
            Err(ArchiveError::Corrupt(_))
        ));
    }

    #[test]
    fn test_consistency_rejects_size_mismatch() {
        let mut table = EntryTable::new();
        table
            .insert(FileEntry::new("a", BLOCK_SIZE as u64 + 1, vec![DATA_START]).unwrap())
            .unwrap();

        let free = FreeList::new();
        assert!(matches!(
            check_consistency(&table, &free),
            Err(ArchiveError::Corrupt(_))
        ));
    }
}
