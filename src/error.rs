use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Invalid magic number in superblock")]
    InvalidMagic,

    #[error("Unsupported format version: {major}.{minor}")]
    UnsupportedVersion { major: u16, minor: u16 },

    #[error("Invalid block size: {0}")]
    InvalidBlockSize(u32),

    #[error("Corrupt archive: {0}")]
    Corrupt(String),

    #[error("Entry not found: {0}")]
    NotFound(String),

    #[error("Invalid entry name: {0:?}")]
    InvalidName(String),

    #[error("Duplicate entry name: {0}")]
    DuplicateName(String),

    #[error("Entry table full (capacity {0})")]
    TableFull(usize),

    #[error("Block {0} is already in the free set")]
    DuplicateFree(u64),

    #[error("File {name} needs more than {max} blocks")]
    FileTooLarge { name: String, max: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ArchiveError>;
