use crate::errors::RuntimeError;
use std::{
    fs::File,
    io::{BufReader, Seek, SeekFrom},
    path::{Path, PathBuf},
    time::SystemTime,
};

/// The running executable, opened for reading its embedded region
#[derive(Debug)]
pub struct SelfImage {
    path: PathBuf,
    modified: SystemTime,
    file: File,
}

impl SelfImage {
    /// Open the executable this process was started from
    pub fn current() -> Result<Self, RuntimeError> {
        let path = std::env::current_exe().map_err(RuntimeError::SelfLocate)?;
        SelfImage::open(&path)
    }

    /// Open an image file by path
    pub fn open(path: &Path) -> Result<Self, RuntimeError> {
        let file = File::open(path).map_err(RuntimeError::SelfLocate)?;
        let modified = file
            .metadata()
            .and_then(|metadata| metadata.modified())
            .map_err(RuntimeError::SelfLocate)?;
        log::debug!("self image {:?}, modified {:?}", path, modified);
        Ok(SelfImage {
            path: path.to_path_buf(),
            modified,
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Modification time of the image, the cache freshness reference
    pub fn modified(&self) -> SystemTime {
        self.modified
    }

    /// Buffered reader starting `offset` bytes into the file
    pub fn reader_at(&self, offset: u64) -> Result<BufReader<&File>, RuntimeError> {
        let mut file = &self.file;
        file.seek(SeekFrom::Start(offset))
            .map_err(RuntimeError::SelfLocate)?;
        Ok(BufReader::new(file))
    }
}
