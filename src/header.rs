//! On-disk layout constants and the superblock region.
//!
//! The superblock occupies the first 64 KiB of the archive and holds the
//! format identification fields, the entry count, and the free-block
//! offset list (the FAT). All integers are little-endian.

use crate::error::{ArchiveError, Result};

pub const MAGIC: [u8; 8] = *b"STAR\x00\x01\x00\x00";
pub const VERSION_MAJOR: u16 = 1;
pub const VERSION_MINOR: u16 = 0;

/// Size of one data block (the allocator's unit of currency).
pub const BLOCK_SIZE: usize = 256 * 1024;

/// Maximum length of an entry name in bytes (NUL-padded to 256 on disk).
pub const MAX_NAME_LEN: usize = 255;

/// Maximum number of entry-table slots, live or tombstoned.
pub const ENTRY_CAPACITY: usize = 100;

/// Maximum number of block pointers per entry (caps files at 16 MiB).
pub const BLOCKS_PER_ENTRY: usize = 64;

/// Serialized size of one entry record.
pub const ENTRY_SIZE: usize = (MAX_NAME_LEN + 1) + 8 + 4 + 4 + 8 * BLOCKS_PER_ENTRY;

/// Size of the superblock region.
pub const SUPERBLOCK_SIZE: usize = 64 * 1024;

/// Size of the entry-table region.
pub const TABLE_SIZE: usize = ENTRY_CAPACITY * ENTRY_SIZE;

/// Byte offset of the entry-table region.
pub const TABLE_OFFSET: u64 = SUPERBLOCK_SIZE as u64;

/// End of the metadata regions (superblock + entry table).
pub const METADATA_SIZE: u64 = SUPERBLOCK_SIZE as u64 + TABLE_SIZE as u64;

/// First block offset. Block offsets are multiples of `BLOCK_SIZE`, so the
/// data region begins at the first aligned offset past the metadata.
pub const DATA_START: u64 = BLOCK_SIZE as u64;

/// Upper bound on the free list: a block only comes into existence when
/// the free set is empty, so the free set can never outgrow the number of
/// blocks every entry could reference at once.
pub const FREE_LIST_CAPACITY: usize = ENTRY_CAPACITY * BLOCKS_PER_ENTRY;

/// Fixed superblock prefix before the free-offset array.
const FIXED_FIELDS: usize = 8 + 2 + 2 + 4 + 4 + 4;

// The metadata regions must fit below the first data block, and the
// free-offset array must fit inside the superblock region.
const _: () = assert!(METADATA_SIZE <= DATA_START);
const _: () = assert!(FIXED_FIELDS + 8 * FREE_LIST_CAPACITY <= SUPERBLOCK_SIZE);

/// Archive superblock
///
/// Carries the format identification fields plus the allocator state: the
/// list of free block offsets. The entry table itself lives in a separate
/// region (see [`crate::table`]).
#[derive(Debug, Clone)]
pub struct Superblock {
    pub magic: [u8; 8],
    pub version_major: u16,
    pub version_minor: u16,

    /// Block size in bytes (always 262144).
    pub block_size: u32,

    /// Number of used entry-table slots, live and tombstoned.
    pub entry_count: u32,

    /// Free block offsets, each a multiple of `BLOCK_SIZE`.
    pub free_offsets: Vec<u64>,
}

impl Superblock {
    pub fn new() -> Self {
        Superblock {
            magic: MAGIC,
            version_major: VERSION_MAJOR,
            version_minor: VERSION_MINOR,
            block_size: BLOCK_SIZE as u32,
            entry_count: 0,
            free_offsets: Vec::new(),
        }
    }

    /// Validate magic, version, and structural sanity
    pub fn validate(&self) -> Result<()> {
        if self.magic != MAGIC {
            return Err(ArchiveError::InvalidMagic);
        }

        if self.version_major != VERSION_MAJOR || self.version_minor != VERSION_MINOR {
            return Err(ArchiveError::UnsupportedVersion {
                major: self.version_major,
                minor: self.version_minor,
            });
        }

        if self.block_size != BLOCK_SIZE as u32 {
            return Err(ArchiveError::InvalidBlockSize(self.block_size));
        }

        if self.entry_count as usize > ENTRY_CAPACITY {
            return Err(ArchiveError::Corrupt(format!(
                "entry count {} exceeds table capacity {}",
                self.entry_count, ENTRY_CAPACITY
            )));
        }

        if self.free_offsets.len() > FREE_LIST_CAPACITY {
            return Err(ArchiveError::Corrupt(format!(
                "free list length {} exceeds capacity {}",
                self.free_offsets.len(),
                FREE_LIST_CAPACITY
            )));
        }

        for &offset in &self.free_offsets {
            if offset < DATA_START || offset % BLOCK_SIZE as u64 != 0 {
                return Err(ArchiveError::Corrupt(format!(
                    "free offset {} is not a data-region block offset",
                    offset
                )));
            }
        }

        Ok(())
    }

    /// Serialize to the full superblock region
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(SUPERBLOCK_SIZE);

        bytes.extend_from_slice(&self.magic);
        bytes.extend_from_slice(&self.version_major.to_le_bytes());
        bytes.extend_from_slice(&self.version_minor.to_le_bytes());
        bytes.extend_from_slice(&self.block_size.to_le_bytes());
        bytes.extend_from_slice(&self.entry_count.to_le_bytes());
        bytes.extend_from_slice(&(self.free_offsets.len() as u32).to_le_bytes());
        for &offset in &self.free_offsets {
            bytes.extend_from_slice(&offset.to_le_bytes());
        }

        // Pad to SUPERBLOCK_SIZE
        bytes.resize(SUPERBLOCK_SIZE, 0);

        bytes
    }

    /// Deserialize from the superblock region
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < SUPERBLOCK_SIZE {
            return Err(ArchiveError::Corrupt(format!(
                "superblock region truncated: {} of {} bytes",
                bytes.len(),
                SUPERBLOCK_SIZE
            )));
        }

        let mut magic = [0u8; 8];
        magic.copy_from_slice(&bytes[0..8]);

        // Identify the format before trusting any of the counts
        if magic != MAGIC {
            return Err(ArchiveError::InvalidMagic);
        }

        let version_major = u16::from_le_bytes([bytes[8], bytes[9]]);
        let version_minor = u16::from_le_bytes([bytes[10], bytes[11]]);
        let block_size = read_u32(bytes, 12);
        let entry_count = read_u32(bytes, 16);
        let free_count = read_u32(bytes, 20) as usize;

        if free_count > FREE_LIST_CAPACITY {
            return Err(ArchiveError::Corrupt(format!(
                "free count {} exceeds capacity {}",
                free_count, FREE_LIST_CAPACITY
            )));
        }

        let mut free_offsets = Vec::with_capacity(free_count);
        for i in 0..free_count {
            free_offsets.push(read_u64(bytes, FIXED_FIELDS + i * 8));
        }

        let superblock = Superblock {
            magic,
            version_major,
            version_minor,
            block_size,
            entry_count,
            free_offsets,
        };

        superblock.validate()?;

        Ok(superblock)
    }
}

impl Default for Superblock {
    fn default() -> Self {
        Self::new()
    }
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(buf)
}

fn read_u64(bytes: &[u8], offset: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[offset..offset + 8]);
    u64::from_le_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_superblock_creation() {
        let sb = Superblock::new();
        assert_eq!(sb.magic, MAGIC);
        assert_eq!(sb.block_size, BLOCK_SIZE as u32);
        assert_eq!(sb.entry_count, 0);
        assert!(sb.free_offsets.is_empty());
        assert!(sb.validate().is_ok());
    }

    #[test]
    fn test_invalid_magic() {
        let mut sb = Superblock::new();
        sb.magic = *b"INVALID!";
        assert!(matches!(sb.validate(), Err(ArchiveError::InvalidMagic)));
    }

    #[test]
    fn test_invalid_version() {
        let mut sb = Superblock::new();
        sb.version_major = 99;
        assert!(matches!(
            sb.validate(),
            Err(ArchiveError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn test_invalid_block_size() {
        let mut sb = Superblock::new();
        sb.block_size = 4096;
        assert!(matches!(
            sb.validate(),
            Err(ArchiveError::InvalidBlockSize(4096))
        ));
    }

    #[test]
    fn test_entry_count_exceeds_capacity() {
        let mut sb = Superblock::new();
        sb.entry_count = ENTRY_CAPACITY as u32 + 1;
        assert!(matches!(sb.validate(), Err(ArchiveError::Corrupt(_))));
    }

    #[test]
    fn test_unaligned_free_offset_rejected() {
        let mut sb = Superblock::new();
        sb.free_offsets.push(DATA_START + 17);
        assert!(matches!(sb.validate(), Err(ArchiveError::Corrupt(_))));
    }

    #[test]
    fn test_free_offset_in_metadata_rejected() {
        let mut sb = Superblock::new();
        sb.free_offsets.push(0);
        assert!(matches!(sb.validate(), Err(ArchiveError::Corrupt(_))));
    }

    #[test]
    fn test_superblock_round_trip() {
        let mut sb = Superblock::new();
        sb.entry_count = 7;
        sb.free_offsets = vec![DATA_START, DATA_START + 3 * BLOCK_SIZE as u64];

        let bytes = sb.to_bytes();
        assert_eq!(bytes.len(), SUPERBLOCK_SIZE);

        let decoded = Superblock::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.entry_count, 7);
        assert_eq!(decoded.free_offsets, sb.free_offsets);
    }

    #[test]
    fn test_truncated_region_rejected() {
        let sb = Superblock::new();
        let bytes = sb.to_bytes();
        assert!(matches!(
            Superblock::from_bytes(&bytes[..100]),
            Err(ArchiveError::Corrupt(_))
        ));
    }

    #[test]
    fn test_layout_constants() {
        assert_eq!(ENTRY_SIZE, 784);
        assert_eq!(TABLE_SIZE, 78_400);
        assert!(METADATA_SIZE <= DATA_START);
    }
}
