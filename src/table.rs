//! File-entry table (metadata directory)
//!
//! A fixed-capacity array of entry records. Deleted entries stay in place
//! as [`TableSlot::Tombstone`] so the positions of the surviving entries
//! never move; only defragmentation compacts the table. On disk a
//! tombstone is a record whose name field is cleared.

use crate::error::{ArchiveError, Result};
use crate::header::{BLOCKS_PER_ENTRY, ENTRY_CAPACITY, ENTRY_SIZE, MAX_NAME_LEN, TABLE_SIZE};

const NAME_FIELD: usize = MAX_NAME_LEN + 1;
const SIZE_OFFSET: usize = NAME_FIELD;
const COUNT_OFFSET: usize = SIZE_OFFSET + 8;
const BLOCKS_OFFSET: usize = COUNT_OFFSET + 8;

/// Metadata record for one packed file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Flat filename, unique among live entries (≤255 bytes)
    pub name: String,

    /// Exact byte length of the packed content
    pub total_size: u64,

    /// Absolute offsets of the content blocks, in content order
    pub blocks: Vec<u64>,
}

impl FileEntry {
    pub fn new(name: impl Into<String>, total_size: u64, blocks: Vec<u64>) -> Result<Self> {
        let name = name.into();

        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return Err(ArchiveError::InvalidName(name));
        }

        if blocks.len() > BLOCKS_PER_ENTRY {
            return Err(ArchiveError::FileTooLarge {
                name,
                max: BLOCKS_PER_ENTRY,
            });
        }

        Ok(FileEntry {
            name,
            total_size,
            blocks,
        })
    }

    fn encode_into(&self, record: &mut [u8]) {
        record[..self.name.len()].copy_from_slice(self.name.as_bytes());
        record[SIZE_OFFSET..SIZE_OFFSET + 8].copy_from_slice(&self.total_size.to_le_bytes());
        record[COUNT_OFFSET..COUNT_OFFSET + 4]
            .copy_from_slice(&(self.blocks.len() as u32).to_le_bytes());
        for (i, &offset) in self.blocks.iter().enumerate() {
            let at = BLOCKS_OFFSET + i * 8;
            record[at..at + 8].copy_from_slice(&offset.to_le_bytes());
        }
    }
}

/// One slot of the entry table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableSlot {
    Live(FileEntry),
    Tombstone,
}

impl TableSlot {
    fn decode(record: &[u8], index: usize) -> Result<Self> {
        let name_end = record[..NAME_FIELD]
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(MAX_NAME_LEN);

        if name_end == 0 {
            return Ok(TableSlot::Tombstone);
        }

        let name = std::str::from_utf8(&record[..name_end])
            .map_err(|_| {
                ArchiveError::Corrupt(format!("entry {} name is not valid UTF-8", index))
            })?
            .to_string();

        let mut buf = [0u8; 8];
        buf.copy_from_slice(&record[SIZE_OFFSET..SIZE_OFFSET + 8]);
        let total_size = u64::from_le_bytes(buf);

        let mut count_buf = [0u8; 4];
        count_buf.copy_from_slice(&record[COUNT_OFFSET..COUNT_OFFSET + 4]);
        let block_count = u32::from_le_bytes(count_buf) as usize;

        if block_count > BLOCKS_PER_ENTRY {
            return Err(ArchiveError::Corrupt(format!(
                "entry {} ({}) claims {} blocks, limit is {}",
                index, name, block_count, BLOCKS_PER_ENTRY
            )));
        }

        let mut blocks = Vec::with_capacity(block_count);
        for i in 0..block_count {
            let at = BLOCKS_OFFSET + i * 8;
            buf.copy_from_slice(&record[at..at + 8]);
            blocks.push(u64::from_le_bytes(buf));
        }

        Ok(TableSlot::Live(FileEntry {
            name,
            total_size,
            blocks,
        }))
    }
}

/// Fixed-capacity, heap-backed entry table
#[derive(Debug, Clone, Default)]
pub struct EntryTable {
    slots: Vec<TableSlot>,
}

impl EntryTable {
    pub fn new() -> Self {
        EntryTable { slots: Vec::new() }
    }

    /// Parse the first `entry_count` records of the table region
    pub fn from_bytes(region: &[u8], entry_count: usize) -> Result<Self> {
        if entry_count > ENTRY_CAPACITY {
            return Err(ArchiveError::Corrupt(format!(
                "entry count {} exceeds table capacity {}",
                entry_count, ENTRY_CAPACITY
            )));
        }

        if region.len() < entry_count * ENTRY_SIZE {
            return Err(ArchiveError::Corrupt(format!(
                "entry table region truncated: {} of {} bytes",
                region.len(),
                entry_count * ENTRY_SIZE
            )));
        }

        let mut slots = Vec::with_capacity(entry_count);
        for i in 0..entry_count {
            let record = &region[i * ENTRY_SIZE..(i + 1) * ENTRY_SIZE];
            slots.push(TableSlot::decode(record, i)?);
        }

        Ok(EntryTable { slots })
    }

    /// Serialize to the full fixed-size table region
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut region = vec![0u8; TABLE_SIZE];
        for (i, slot) in self.slots.iter().enumerate() {
            if let TableSlot::Live(entry) = slot {
                entry.encode_into(&mut region[i * ENTRY_SIZE..(i + 1) * ENTRY_SIZE]);
            }
            // Tombstones stay as zeroed records (cleared name)
        }
        region
    }

    /// Find a live entry by exact name match
    pub fn find(&self, name: &str) -> Option<usize> {
        self.slots.iter().position(|slot| match slot {
            TableSlot::Live(entry) => entry.name == name,
            TableSlot::Tombstone => false,
        })
    }

    /// Insert an entry, reusing the first tombstoned slot if any.
    ///
    /// Positions of existing entries never move.
    pub fn insert(&mut self, entry: FileEntry) -> Result<usize> {
        if let Some(idx) = self
            .slots
            .iter()
            .position(|slot| matches!(slot, TableSlot::Tombstone))
        {
            self.slots[idx] = TableSlot::Live(entry);
            return Ok(idx);
        }

        if self.slots.len() >= ENTRY_CAPACITY {
            return Err(ArchiveError::TableFull(ENTRY_CAPACITY));
        }

        self.slots.push(TableSlot::Live(entry));
        Ok(self.slots.len() - 1)
    }

    /// Mark a slot deleted, returning the entry it held.
    ///
    /// The slot stays in place; other positions are stable.
    pub fn tombstone(&mut self, idx: usize) -> Option<FileEntry> {
        match self.slots.get_mut(idx) {
            Some(slot @ TableSlot::Live(_)) => {
                match std::mem::replace(slot, TableSlot::Tombstone) {
                    TableSlot::Live(entry) => Some(entry),
                    TableSlot::Tombstone => None,
                }
            }
            _ => None,
        }
    }

    pub fn get(&self, idx: usize) -> Option<&FileEntry> {
        match self.slots.get(idx) {
            Some(TableSlot::Live(entry)) => Some(entry),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut FileEntry> {
        match self.slots.get_mut(idx) {
            Some(TableSlot::Live(entry)) => Some(entry),
            _ => None,
        }
    }

    /// Live entries with their slot indices, in table order
    pub fn live(&self) -> impl Iterator<Item = (usize, &FileEntry)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| match slot {
            TableSlot::Live(entry) => Some((i, entry)),
            TableSlot::Tombstone => None,
        })
    }

    /// Drop tombstones, preserving the relative order of survivors
    pub fn compact(&mut self) {
        self.slots
            .retain(|slot| matches!(slot, TableSlot::Live(_)));
    }

    /// Used slots, live and tombstoned
    pub fn used_slots(&self) -> usize {
        self.slots.len()
    }

    pub fn live_count(&self) -> usize {
        self.live().count()
    }

    pub fn tombstone_count(&self) -> usize {
        self.slots.len() - self.live_count()
    }

    pub fn is_full(&self) -> bool {
        self.slots.len() >= ENTRY_CAPACITY && self.tombstone_count() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::DATA_START;

    fn entry(name: &str, size: u64, blocks: Vec<u64>) -> FileEntry {
        FileEntry::new(name, size, blocks).unwrap()
    }

    #[test]
    fn test_entry_validation() {
        assert!(matches!(
            FileEntry::new("", 0, vec![]),
            Err(ArchiveError::InvalidName(_))
        ));
        assert!(matches!(
            FileEntry::new("x".repeat(256), 0, vec![]),
            Err(ArchiveError::InvalidName(_))
        ));
        assert!(matches!(
            FileEntry::new("big", 0, vec![0; BLOCKS_PER_ENTRY + 1]),
            Err(ArchiveError::FileTooLarge { .. })
        ));
    }

    #[test]
    fn test_find_skips_tombstones() {
        let mut table = EntryTable::new();
        let a = table.insert(entry("a.txt", 1, vec![DATA_START])).unwrap();
        table.insert(entry("b.txt", 2, vec![])).unwrap();

        table.tombstone(a).unwrap();

        assert_eq!(table.find("a.txt"), None);
        assert_eq!(table.find("b.txt"), Some(1));
    }

    #[test]
    fn test_insert_reuses_tombstoned_slot() {
        let mut table = EntryTable::new();
        let a = table.insert(entry("a.txt", 1, vec![])).unwrap();
        table.insert(entry("b.txt", 2, vec![])).unwrap();

        table.tombstone(a).unwrap();
        let c = table.insert(entry("c.txt", 3, vec![])).unwrap();

        // New entry lands in the freed slot; b stays put
        assert_eq!(c, a);
        assert_eq!(table.find("b.txt"), Some(1));
        assert_eq!(table.used_slots(), 2);
    }

    #[test]
    fn test_table_full() {
        let mut table = EntryTable::new();
        for i in 0..ENTRY_CAPACITY {
            table.insert(entry(&format!("f{}", i), 0, vec![])).unwrap();
        }
        assert!(table.is_full());
        assert!(matches!(
            table.insert(entry("overflow", 0, vec![])),
            Err(ArchiveError::TableFull(_))
        ));
    }

    #[test]
    fn test_tombstone_positions_stable() {
        let mut table = EntryTable::new();
        table.insert(entry("a", 0, vec![])).unwrap();
        table.insert(entry("b", 0, vec![])).unwrap();
        table.insert(entry("c", 0, vec![])).unwrap();

        table.tombstone(1).unwrap();

        assert_eq!(table.find("a"), Some(0));
        assert_eq!(table.find("c"), Some(2));
        assert_eq!(table.used_slots(), 3);
        assert_eq!(table.live_count(), 2);
    }

    #[test]
    fn test_tombstone_twice_returns_none() {
        let mut table = EntryTable::new();
        table.insert(entry("a", 0, vec![])).unwrap();
        assert!(table.tombstone(0).is_some());
        assert!(table.tombstone(0).is_none());
    }

    #[test]
    fn test_compact_preserves_order() {
        let mut table = EntryTable::new();
        table.insert(entry("a", 0, vec![])).unwrap();
        table.insert(entry("b", 0, vec![])).unwrap();
        table.insert(entry("c", 0, vec![])).unwrap();
        table.tombstone(1).unwrap();

        table.compact();

        let names: Vec<_> = table.live().map(|(_, e)| e.name.as_str()).collect();
        assert_eq!(names, vec!["a", "c"]);
        assert_eq!(table.used_slots(), 2);
    }

    #[test]
    fn test_serialization_round_trip() {
        let mut table = EntryTable::new();
        table
            .insert(entry("hello.txt", 5, vec![DATA_START]))
            .unwrap();
        table.insert(entry("gone", 9, vec![])).unwrap();
        table
            .insert(entry(
                "big.bin",
                600_000,
                vec![
                    DATA_START,
                    DATA_START + 262_144,
                    DATA_START + 2 * 262_144,
                ],
            ))
            .unwrap();
        table.tombstone(1).unwrap();

        let region = table.to_bytes();
        assert_eq!(region.len(), TABLE_SIZE);

        let decoded = EntryTable::from_bytes(&region, 3).unwrap();
        assert_eq!(decoded.used_slots(), 3);
        assert_eq!(decoded.live_count(), 2);
        assert_eq!(decoded.find("hello.txt"), Some(0));
        assert_eq!(decoded.find("gone"), None);

        let big = decoded.get(2).unwrap();
        assert_eq!(big.total_size, 600_000);
        assert_eq!(big.blocks.len(), 3);
    }

    #[test]
    fn test_decode_rejects_bogus_block_count() {
        let mut table = EntryTable::new();
        table.insert(entry("a", 0, vec![])).unwrap();
        let mut region = table.to_bytes();

        // Clobber the block count of slot 0
        region[COUNT_OFFSET..COUNT_OFFSET + 4].copy_from_slice(&u32::MAX.to_le_bytes());

        assert!(matches!(
            EntryTable::from_bytes(&region, 1),
            Err(ArchiveError::Corrupt(_))
        ));
    }

    #[test]
    fn test_decode_rejects_excess_entry_count() {
        let region = vec![0u8; TABLE_SIZE];
        assert!(matches!(
            EntryTable::from_bytes(&region, ENTRY_CAPACITY + 1),
            Err(ArchiveError::Corrupt(_))
        ));
    }
}
