//! The two ways an image starts: extract-and-exec, or exec from memory
//!
//! Both end in a [Handoff]. The `run_*` functions perform it and only come
//! back with an error; the `*_handoff` functions stop right before that so
//! the prepared vectors can be inspected.

use crate::{
    cache::{extract, CacheDir},
    config::Config,
    env::{compose_search_paths, Environment},
    errors::RuntimeError,
    handoff::{check_arg_count, Handoff, Target},
    image::{Header, SelfImage, StubLayout},
    utils::{Toolchain, TOOLCHAIN_NAME, UTILS_ARCHIVE_NAME},
};
use std::{
    ffi::{CString, OsString},
    io::{self, Read, Seek, SeekFrom},
    os::unix::ffi::OsStringExt,
};

/// Payload name of the entry script
pub const ENTRY_SCRIPT_NAME: &str = "conty-start.sh";

/// `argv[0]` given to the toolchain, selecting its shell
pub const SHELL_ARG0: &str = "sh";

/// Payloads the extracting launcher can't work without
pub const REQUIRED_PAYLOADS: [&str; 3] = [TOOLCHAIN_NAME, UTILS_ARCHIVE_NAME, ENTRY_SCRIPT_NAME];

/// What [prepare_cache] did
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CacheState {
    /// Marker was at least as new as the image, nothing was written
    Fresh,
    /// Payloads were extracted and utilities installed
    Extracted,
}

/// Make sure the cache holds this image's payloads and utilities
///
/// Skips everything when the extraction marker is not older than the
/// image. Otherwise the header at `program_size` is parsed, payloads are
/// extracted, the utility archive is installed, and the marker is stamped
/// with the image's mtime. The whole sequence runs under the cache lock,
/// and freshness is checked again once the lock is held.
pub fn prepare_cache(
    config: &Config,
    image: &SelfImage,
    program_size: u64,
    cache: &CacheDir,
) -> Result<CacheState, RuntimeError> {
    if cache.is_fresh(image.modified()) {
        log::debug!("cache at {:?} is fresh", cache.path());
        return Ok(CacheState::Fresh);
    }
    let _lock = cache.lock()?;
    if cache.is_fresh(image.modified()) {
        log::debug!("cache at {:?} was extracted while waiting", cache.path());
        return Ok(CacheState::Fresh);
    }

    log::info!("extracting {:?} into {:?}", image.path(), cache.path());
    let mut reader = image.reader_at(program_size)?;
    let header = Header::read_from(&mut reader)?;
    for &name in REQUIRED_PAYLOADS.iter() {
        if header.find(name).is_none() {
            return Err(RuntimeError::MissingPayload(name));
        }
    }
    let content_dir = cache.content_dir();
    extract(header.markers(), &mut reader, &content_dir)?;

    let toolchain = Toolchain::new(content_dir.join(TOOLCHAIN_NAME));
    toolchain.install_utils(
        &content_dir.join(UTILS_ARCHIVE_NAME),
        &cache.utils_dir(),
        &Environment::from(config),
    )?;

    cache.stamp(image.modified())?;
    Ok(CacheState::Extracted)
}

/// Exec of the cached toolchain's shell running the entry script
///
/// `argv` is the launcher's own argument vector; everything after
/// `argv[0]` is passed on unchanged, after the script path and the image
/// path.
pub fn extracting_handoff(
    config: &Config,
    image: &SelfImage,
    cache: &CacheDir,
    argv: &[OsString],
) -> Result<Handoff, RuntimeError> {
    let content_dir = cache.content_dir();
    let mut env = Environment::from(config);
    compose_search_paths(&mut env, config, &cache.utils_dir());

    let mut args: Vec<OsString> = Vec::with_capacity(argv.len() + 2);
    args.push(SHELL_ARG0.into());
    args.push(content_dir.join(ENTRY_SCRIPT_NAME).into_os_string());
    args.push(image.path().as_os_str().to_os_string());
    args.extend(argv.iter().skip(1).cloned());

    Handoff::new(
        Target::Path(content_dir.join(TOOLCHAIN_NAME)),
        args,
        &env,
    )
}

/// Extracting launcher, from argument check to exec
pub fn run_extracting(config: &Config, program_size: u64, argv: &[OsString]) -> RuntimeError {
    let result = check_arg_count(argv.len()).and_then(|()| {
        let image = SelfImage::current()?;
        let cache = CacheDir::from_config(config)?;
        prepare_cache(config, &image, program_size, &cache)?;
        extracting_handoff(config, &image, &cache, argv)
    });
    match result {
        Ok(handoff) => handoff.exec(),
        Err(err) => err,
    }
}

/// Exec of the embedded toolchain straight from memory
///
/// Nothing is written to disk. The toolchain segment goes into a sealed
/// memfd, the script segment becomes the `sh -c` command text, and the
/// segment sizes are exported so the script can read the image again.
/// The command text ends at the first NUL byte of the script segment.
pub fn direct_handoff(
    config: &Config,
    image: &SelfImage,
    layout: &StubLayout,
    argv: &[OsString],
) -> Result<Handoff, RuntimeError> {
    let mut reader = image.reader_at(layout.program_size)?;

    let memfd = memfd::MemfdOptions::default()
        .close_on_exec(false)
        .allow_sealing(true)
        .create(TOOLCHAIN_NAME)?;
    {
        let mut file = memfd.as_file();
        let copied = io::copy(&mut reader.by_ref().take(layout.busybox_size), &mut file)?;
        if copied != layout.busybox_size {
            return Err(truncated("toolchain", layout.busybox_size, copied));
        }
        file.seek(SeekFrom::Start(0))?;
    }
    memfd.add_seals(
        &[
            memfd::FileSeal::SealWrite,
            memfd::FileSeal::SealShrink,
            memfd::FileSeal::SealGrow,
            memfd::FileSeal::SealSeal,
        ]
        .iter()
        .cloned()
        .collect(),
    )?;

    let mut script = Vec::with_capacity(layout.script_size as usize);
    reader
        .by_ref()
        .take(layout.script_size)
        .read_to_end(&mut script)?;
    if script.len() as u64 != layout.script_size {
        return Err(truncated("script", layout.script_size, script.len() as u64));
    }
    if let Some(end) = script.iter().position(|&byte| byte == 0) {
        log::warn!("embedded script has a NUL byte at {}, ignoring the rest", end);
        script.truncate(end);
    }
    let script = CString::new(script)?;

    let mut env = Environment::from(config);
    for (key, value) in layout.env_vars() {
        env.set(key, value);
    }

    let mut args: Vec<OsString> = Vec::with_capacity(argv.len() + 6);
    args.push(SHELL_ARG0.into());
    args.push("-c".into());
    args.push("--".into());
    args.push(OsString::from_vec(script.into_bytes()));
    args.push(argv.first().cloned().unwrap_or_else(|| SHELL_ARG0.into()));
    args.push(image.path().as_os_str().to_os_string());
    args.extend(argv.iter().skip(1).cloned());

    Handoff::new(Target::Memfd(memfd), args, &env)
}

/// Direct-exec stub, from argument check to exec
pub fn run_direct(config: &Config, layout: &StubLayout, argv: &[OsString]) -> RuntimeError {
    let result = check_arg_count(argv.len()).and_then(|()| {
        let image = SelfImage::current()?;
        direct_handoff(config, &image, layout, argv)
    });
    match result {
        Ok(handoff) => handoff.exec(),
        Err(err) => err,
    }
}

fn truncated(what: &str, expected: u64, found: u64) -> RuntimeError {
    RuntimeError::Io(io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("embedded {} truncated: expected {} bytes, found {}", what, expected, found),
    ))
}
