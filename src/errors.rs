//! Error types you might see while unpacking or launching an image

use std::{ffi::OsString, path::PathBuf, process::ExitStatus};
use thiserror::Error;

/// Errors while decoding the embedded header
#[derive(Error, Debug)]
pub enum HeaderError {
    /// io error while reading the header
    #[error("io error while reading the header: {0}")]
    Io(#[from] std::io::Error),

    /// end of file reached before the header sentinel
    #[error("corrupt header: end of file reached before the header sentinel")]
    CorruptHeader,

    /// header line is missing its `@` delimiters
    #[error("malformed header line: {0:?}")]
    Malformed(String),

    /// header line exceeds the length limit
    #[error("header line longer than {0} bytes")]
    LineTooLong(usize),

    /// size field is not a decimal byte count
    #[error("invalid size field in header: {0:?}")]
    InvalidSize(String),

    /// name field could escape the content directory
    #[error("unsafe file name in header: {0:?}")]
    UnsafeName(OsString),

    /// name field exceeds the file name limit
    #[error("file name in header longer than {0} bytes")]
    NameTooLong(usize),

    /// header lists no files at all
    #[error("header lists no embedded files")]
    NoMarkers,
}

/// Errors while copying payloads into the cache
#[derive(Error, Debug)]
pub enum ExtractError {
    /// content path exists but is not a directory
    #[error("expected a directory at {0:?}, found another node type")]
    NotADirectory(PathBuf),

    /// io error on a specific path
    #[error("io error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// fewer bytes were written than were read
    #[error("short write at {path:?}: wrote {written} of {expected} bytes")]
    ShortWrite {
        path: PathBuf,
        expected: usize,
        written: usize,
    },

    /// input ended inside a payload
    #[error("payload for {path:?} truncated: expected {expected} bytes, found {found}")]
    TruncatedPayload {
        path: PathBuf,
        expected: u64,
        found: u64,
    },
}

impl ExtractError {
    pub(crate) fn io(path: &std::path::Path) -> impl FnOnce(std::io::Error) -> ExtractError {
        let path = path.to_path_buf();
        move |source| ExtractError::Io { path, source }
    }
}

/// Errors that stop the launcher before or during the handoff
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// can't determine where to cache extracted files
    #[error(
        "can't determine where to cache extracted files, neither XDG_DATA_HOME nor HOME is set"
    )]
    NoBaseDirectory,

    /// argument count is over the limit
    #[error("too many arguments: {count} given, at most {limit} allowed")]
    TooManyArguments { count: usize, limit: usize },

    /// can't find or open the running executable
    #[error("can't open the running executable: {0}")]
    SelfLocate(std::io::Error),

    /// header error
    #[error("header error: {0}")]
    Header(#[from] HeaderError),

    /// extraction error
    #[error("extraction error: {0}")]
    Extract(#[from] ExtractError),

    /// io error in the cache directory
    #[error("cache io error at {path:?}: {source}")]
    Cache {
        path: PathBuf,
        source: std::io::Error,
    },

    /// a required payload is missing from the header
    #[error("image has no embedded {0:?}")]
    MissingPayload(&'static str),

    /// a helper process could not be started
    #[error("failed to start {program:?}: {source}")]
    Spawn {
        program: PathBuf,
        source: std::io::Error,
    },

    /// a helper process exited unsuccessfully
    #[error("{program:?} {args:?} failed, {status}")]
    SubprocessFailed {
        program: PathBuf,
        args: Vec<OsString>,
        status: ExitStatus,
    },

    /// the final exec returned
    #[error("failed to execute {target}: {source}")]
    Exec {
        target: String,
        source: std::io::Error,
    },

    /// error in memory-backed file
    #[error("error in memory-backed file: {0}")]
    Memfd(#[from] memfd::Error),

    /// argument or environment string contained internal nul byte
    #[error("argument string contained internal nul byte")]
    NulString(#[from] std::ffi::NulError),

    /// io error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RuntimeError {
    pub(crate) fn cache(path: &std::path::Path) -> impl FnOnce(std::io::Error) -> RuntimeError {
        let path = path.to_path_buf();
        move |source| RuntimeError::Cache { path, source }
    }
}

/// Errors while writing an image
#[derive(Error, Debug)]
pub enum PackError {
    /// io error on a specific path
    #[error("io error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// payload path has no file name to store it under
    #[error("payload path {0:?} has no file name")]
    NoFileName(PathBuf),

    /// payload can't be described by a header line
    #[error("header error: {0}")]
    Header(#[from] HeaderError),
}

impl PackError {
    pub(crate) fn io(path: &std::path::Path) -> impl FnOnce(std::io::Error) -> PackError {
        let path = path.to_path_buf();
        move |source| PackError::Io { path, source }
    }
}
