//! Starpack Archive Format
//!
//! A mutable single-file archive with a FAT-style block allocator: a
//! minimal filesystem embedded in one file.
//!
//! ## Features
//!
//! - **Fixed 256 KiB blocks** addressed by absolute byte offset
//! - **Free-block allocator** that reuses the lowest free offset and grows
//!   the file one block at a time when the free set runs out
//! - **Fixed-capacity entry table** (100 entries × 64 block pointers) with
//!   tombstones that stay in place until defragmentation
//! - **Seven operations**: create, list, extract, append, update, delete,
//!   defragment
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use starpack::Archive;
//!
//! # fn main() -> starpack::Result<()> {
//! let mut archive = Archive::create("backup.star")?;
//! archive.append(&["notes.txt", "photo.jpg"])?;
//!
//! for entry in archive.list() {
//!     println!("{}  {} bytes", entry.name, entry.size);
//! }
//!
//! archive.delete(&["photo.jpg"])?;
//! archive.defragment()?;
//! archive.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Archive Layout
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │            Starpack Archive File            │
//! ├─────────────────────────────────────────────┤
//! │ Superblock (64 KiB)                         │
//! │  - Magic: "STAR\x00\x01\x00\x00"            │
//! │  - Version, block size, entry count         │
//! │  - Free-block offset list (the FAT)         │
//! ├─────────────────────────────────────────────┤
//! │ Entry table (100 × 784 bytes)               │
//! │  - Name, size, block-offset list per entry  │
//! │  - Cleared name = tombstone                 │
//! ├─────────────────────────────────────────────┤
//! │ Data region (256 KiB blocks)                │
//! │  - Starts at the first block-aligned        │
//! │    offset past the metadata                 │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Limits and caveats
//!
//! One archive holds at most 100 entries of up to 16 MiB (64 blocks) each.
//! Operations are single-threaded and not crash-atomic: a process killed
//! mid-operation can leave the archive inconsistent, and concurrent access
//! from two processes is undefined. Crash safety and locking are outside
//! this format's contract.

pub mod allocator;
pub mod archive;
pub mod error;
pub mod header;
pub mod io;
pub mod ops;
pub mod table;

// Re-export commonly used types
pub use allocator::FreeList;
pub use archive::{Archive, ArchiveStats, BatchOutcome, EntryInfo};
pub use error::{ArchiveError, Result};
pub use header::{Superblock, BLOCKS_PER_ENTRY, BLOCK_SIZE, ENTRY_CAPACITY, MAX_NAME_LEN};
pub use io::ArchiveFile;
pub use table::{EntryTable, FileEntry, TableSlot};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Archive format magic number
pub const MAGIC: &[u8; 8] = &header::MAGIC;
