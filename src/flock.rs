use std::{
    fs::File,
    path::{Path, PathBuf},
};

use fs4::fs_std::FileExt;
use log::debug;
use thiserror::Error;

/// Exclusive lock on `<manifest>.lock`, held while the manifest is replaced.
pub struct FileLock {
    _file: File,
}

#[derive(Error, Debug)]
#[error("Could not lock {path}: {source}")]
pub struct Error {
    path: PathBuf,
    #[source]
    source: std::io::Error,
}

pub fn lock_path(manifest: &Path) -> PathBuf {
    let mut name = manifest.file_name().unwrap_or_default().to_os_string();
    name.push(".lock");
    manifest.with_file_name(name)
}

impl FileLock {
    pub fn for_manifest(manifest: &Path) -> Result<Self, Error> {
        Self::new(&lock_path(manifest))
    }

    /// Blocks until no other process holds the lock.
    pub fn new(path: &Path) -> Result<Self, Error> {
        let error = |source| Error {
            path: path.to_path_buf(),
            source,
        };
        let file = File::create(path).map_err(error)?;
        debug!("Acquiring a lock on {}", path.display());
        file.lock_exclusive().map_err(error)?;
        Ok(Self { _file: file })
    }
}
