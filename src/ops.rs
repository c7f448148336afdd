//! One-shot operations
//!
//! The collaborator interface a CLI front-end calls into: each function
//! opens the archive, performs a single operation, and closes it again,
//! releasing the file handle on every exit path. `verbose` only controls
//! how much progress narration is emitted through `tracing`.

use crate::archive::{Archive, BatchOutcome, EntryInfo};
use crate::error::Result;
use std::path::Path;

/// Create a fresh archive from the given source files
pub fn create<P: AsRef<Path>, S: AsRef<Path>>(
    archive: P,
    sources: &[S],
    verbose: bool,
) -> Result<BatchOutcome> {
    let archive = archive.as_ref();
    let mut ar = Archive::create(archive).map_err(|e| log_failure("create", archive, e))?;
    ar.set_verbose(verbose);
    let outcome = ar.append(sources).map_err(|e| log_failure("create", archive, e))?;
    ar.close()?;
    Ok(outcome)
}

/// List the live entries of an archive
pub fn list<P: AsRef<Path>>(archive: P, verbose: bool) -> Result<Vec<EntryInfo>> {
    let archive = archive.as_ref();
    let mut ar = Archive::open(archive).map_err(|e| log_failure("list", archive, e))?;
    ar.set_verbose(verbose);
    Ok(ar.list())
}

/// Extract all entries, or only the named ones, into `dest_dir`
pub fn extract<P: AsRef<Path>, D: AsRef<Path>>(
    archive: P,
    dest_dir: D,
    names: Option<&[String]>,
    verbose: bool,
) -> Result<BatchOutcome> {
    let archive = archive.as_ref();
    let mut ar = Archive::open(archive).map_err(|e| log_failure("extract", archive, e))?;
    ar.set_verbose(verbose);
    ar.extract(dest_dir, names)
        .map_err(|e| log_failure("extract", archive, e))
}

/// Append source files to an existing archive
pub fn append<P: AsRef<Path>, S: AsRef<Path>>(
    archive: P,
    sources: &[S],
    verbose: bool,
) -> Result<BatchOutcome> {
    let archive = archive.as_ref();
    let mut ar = Archive::open(archive).map_err(|e| log_failure("append", archive, e))?;
    ar.set_verbose(verbose);
    ar.append(sources)
        .map_err(|e| log_failure("append", archive, e))
}

/// Replace an entry's content from the source file of the same name
pub fn update<P: AsRef<Path>>(archive: P, name: &str, verbose: bool) -> Result<()> {
    let archive = archive.as_ref();
    let mut ar = Archive::open(archive).map_err(|e| log_failure("update", archive, e))?;
    ar.set_verbose(verbose);
    ar.update(name).map_err(|e| log_failure("update", archive, e))
}

/// Delete the named entries
pub fn delete<P: AsRef<Path>, S: AsRef<str>>(
    archive: P,
    names: &[S],
    verbose: bool,
) -> Result<BatchOutcome> {
    let archive = archive.as_ref();
    let mut ar = Archive::open(archive).map_err(|e| log_failure("delete", archive, e))?;
    ar.set_verbose(verbose);
    ar.delete(names)
        .map_err(|e| log_failure("delete", archive, e))
}

/// Defragment (pack) an archive in place
pub fn defragment<P: AsRef<Path>>(archive: P, verbose: bool) -> Result<()> {
    let archive = archive.as_ref();
    let mut ar = Archive::open(archive).map_err(|e| log_failure("defragment", archive, e))?;
    ar.set_verbose(verbose);
    ar.defragment()
        .map_err(|e| log_failure("defragment", archive, e))
}

fn log_failure(
    operation: &str,
    archive: &Path,
    err: crate::error::ArchiveError,
) -> crate::error::ArchiveError {
    tracing::error!(
        operation,
        archive = %archive.display(),
        error = %err,
        "operation failed"
    );
    err
}
