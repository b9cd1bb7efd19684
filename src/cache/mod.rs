//! The per-user cache tree that extracted images live in
//!
//! ```text
//! <base>/content/            flattened payload files
//! <base>/utils/              unpacked utility archive and toolchain links
//! <base>/extraction_marker   mtime records the image version last extracted
//! <base>/.lock               advisory lock held while extracting
//! ```

mod extract;
mod writer;

pub use extract::{extract, BUFFER_SIZE};
pub use writer::PayloadWriter;

use crate::{config::Config, errors::RuntimeError};
use std::{
    fs,
    fs::{File, OpenOptions},
    io,
    os::unix::io::AsRawFd,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

pub const CONTENT_DIR: &str = "content";
pub const UTILS_DIR: &str = "utils";
pub const EXTRACTION_MARKER: &str = "extraction_marker";
pub const LOCK_FILE: &str = ".lock";

/// Timestamps are compared in steps of this many seconds
///
/// The marker keeps only what the cache filesystem can store: whole
/// seconds on ext3 or HFS+, even seconds on FAT and exFAT.
pub const MTIME_STEP_SECS: u64 = 2;

fn mtime_step(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|since| since.as_secs() / MTIME_STEP_SECS)
        .unwrap_or(0)
}

#[derive(Clone, Debug)]
pub struct CacheDir {
    path: PathBuf,
}

impl CacheDir {
    pub fn new(path: PathBuf) -> Self {
        CacheDir { path }
    }

    /// Cache tree at the configured base directory
    pub fn from_config(config: &Config) -> Result<Self, RuntimeError> {
        Ok(CacheDir::new(config.base_dir()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn content_dir(&self) -> PathBuf {
        self.path.join(CONTENT_DIR)
    }

    pub fn utils_dir(&self) -> PathBuf {
        self.path.join(UTILS_DIR)
    }

    pub fn marker_path(&self) -> PathBuf {
        self.path.join(EXTRACTION_MARKER)
    }

    /// Modification time of the extraction marker, if there is one
    pub fn marker_modified(&self) -> Option<SystemTime> {
        fs::metadata(self.marker_path())
            .and_then(|metadata| metadata.modified())
            .ok()
    }

    /// Was this cache extracted from an image at least as new as `image_modified`?
    ///
    /// A missing or unreadable marker counts as stale. File contents are
    /// never compared, the marker's mtime is the only signal. Both times are
    /// rounded down to [MTIME_STEP_SECS] first, so an image rebuilt within
    /// the same step as the extracted one is not detected.
    pub fn is_fresh(&self, image_modified: SystemTime) -> bool {
        match self.marker_modified() {
            Some(marker_modified) => mtime_step(marker_modified) >= mtime_step(image_modified),
            None => false,
        }
    }

    /// Record a finished extraction
    ///
    /// The marker's mtime is set to exactly `image_modified`, never the
    /// current time, so it can't look newer than the image it came from.
    pub fn stamp(&self, image_modified: SystemTime) -> Result<(), RuntimeError> {
        let path = self.marker_path();
        let file = File::create(&path).map_err(RuntimeError::cache(&path))?;
        file.set_modified(image_modified)
            .map_err(RuntimeError::cache(&path))?;
        log::debug!("stamped {:?} with {:?}", path, image_modified);
        Ok(())
    }

    /// Take the exclusive extraction lock, waiting for other holders
    pub fn lock(&self) -> Result<CacheLock, RuntimeError> {
        fs::create_dir_all(&self.path).map_err(RuntimeError::cache(&self.path))?;
        let path = self.path.join(LOCK_FILE);
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .open(&path)
            .map_err(RuntimeError::cache(&path))?;
        loop {
            let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
            if result == 0 {
                break;
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(RuntimeError::Cache { path, source: err });
            }
        }
        log::trace!("locked {:?}", path);
        Ok(CacheLock { file })
    }
}

/// Held while the cache is being written; unlocks when dropped
#[derive(Debug)]
pub struct CacheLock {
    file: File,
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        unsafe { libc::flock(self.file.as_raw_fd(), libc::LOCK_UN) };
    }
}
