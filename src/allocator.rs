//! Free-block allocator
//!
//! Tracks the set of reusable block offsets. Allocation pops the lowest
//! free offset for determinism; when the set is empty it grows the block
//! store by one block and hands the new offset out directly, never routing
//! it through the free set first.

use crate::error::{ArchiveError, Result};
use crate::io::ArchiveFile;
use std::collections::BTreeSet;

/// Set of free block offsets (the in-memory FAT state)
#[derive(Debug, Clone, Default)]
pub struct FreeList {
    free: BTreeSet<u64>,
}

impl FreeList {
    pub fn new() -> Self {
        FreeList {
            free: BTreeSet::new(),
        }
    }

    /// Rebuild from the offsets stored in the superblock.
    ///
    /// A repeated offset means the on-disk free list is corrupt.
    pub fn from_offsets(offsets: &[u64]) -> Result<Self> {
        let mut free = BTreeSet::new();
        for &offset in offsets {
            if !free.insert(offset) {
                return Err(ArchiveError::Corrupt(format!(
                    "offset {} appears twice in the free list",
                    offset
                )));
            }
        }
        Ok(FreeList { free })
    }

    /// Hand out one block offset, growing the store when the set is empty
    pub fn allocate(&mut self, store: &mut ArchiveFile) -> Result<u64> {
        if let Some(offset) = self.free.pop_first() {
            tracing::trace!(offset, "reusing free block");
            return Ok(offset);
        }

        let offset = store.grow()?;
        tracing::trace!(offset, "grew archive by one block");
        Ok(offset)
    }

    /// Return an offset to the free set.
    ///
    /// The caller is responsible for only freeing offsets it previously
    /// allocated; freeing the same offset twice is an error.
    pub fn free(&mut self, offset: u64) -> Result<()> {
        if !self.free.insert(offset) {
            tracing::warn!(offset, "double-free detected");
            return Err(ArchiveError::DuplicateFree(offset));
        }
        Ok(())
    }

    pub fn contains(&self, offset: u64) -> bool {
        self.free.contains(&offset)
    }

    pub fn len(&self) -> usize {
        self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.free.is_empty()
    }

    /// Drop every offset (defragmentation truncates the freed space away)
    pub fn clear(&mut self) {
        self.free.clear();
    }

    /// Sorted offsets for the superblock free list
    pub fn to_offsets(&self) -> Vec<u64> {
        self.free.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{Superblock, BLOCK_SIZE, DATA_START};
    use tempfile::NamedTempFile;

    const BLOCK: u64 = BLOCK_SIZE as u64;

    #[test]
    fn test_allocate_grows_when_empty() {
        let temp = NamedTempFile::new().unwrap();
        let mut store = ArchiveFile::create(temp.path(), &Superblock::new()).unwrap();
        let mut free = FreeList::new();

        assert_eq!(free.allocate(&mut store).unwrap(), DATA_START);
        assert_eq!(free.allocate(&mut store).unwrap(), DATA_START + BLOCK);
        assert!(free.is_empty());
    }

    #[test]
    fn test_allocate_prefers_lowest_free_offset() {
        let temp = NamedTempFile::new().unwrap();
        let mut store = ArchiveFile::create(temp.path(), &Superblock::new()).unwrap();
        let mut free = FreeList::new();

        let a = free.allocate(&mut store).unwrap();
        let b = free.allocate(&mut store).unwrap();
        let c = free.allocate(&mut store).unwrap();

        free.free(c).unwrap();
        free.free(a).unwrap();

        // Lowest offset comes back first, regardless of free order
        assert_eq!(free.allocate(&mut store).unwrap(), a);
        assert_eq!(free.allocate(&mut store).unwrap(), c);

        // Set exhausted again: next allocation grows past b
        assert_eq!(free.allocate(&mut store).unwrap(), b + BLOCK);
    }

    #[test]
    fn test_double_free_rejected() {
        let mut free = FreeList::new();
        free.free(DATA_START).unwrap();
        assert!(matches!(
            free.free(DATA_START),
            Err(ArchiveError::DuplicateFree(_))
        ));
        assert_eq!(free.len(), 1);
    }

    #[test]
    fn test_from_offsets_rejects_duplicates() {
        let result = FreeList::from_offsets(&[DATA_START, DATA_START + BLOCK, DATA_START]);
        assert!(matches!(result, Err(ArchiveError::Corrupt(_))));
    }

    #[test]
    fn test_to_offsets_sorted() {
        let mut free = FreeList::new();
        free.free(DATA_START + 2 * BLOCK).unwrap();
        free.free(DATA_START).unwrap();
        free.free(DATA_START + BLOCK).unwrap();

        assert_eq!(
            free.to_offsets(),
            vec![DATA_START, DATA_START + BLOCK, DATA_START + 2 * BLOCK]
        );
    }
}
