//! Installing the portable utility set with the bundled toolchain
//!
//! The toolchain is a multi-call binary. It is only ever run as a child
//! process here and treated as opaque: it must understand `tar -xf` and
//! `--install -s <dir>`.

use crate::{env::Environment, errors::RuntimeError};
use std::{
    ffi::{OsStr, OsString},
    fs,
    path::{Path, PathBuf},
    process::Command,
};

/// Payload name of the toolchain binary
pub const TOOLCHAIN_NAME: &str = "busybox";

/// Payload name of the compressed utility archive
pub const UTILS_ARCHIVE_NAME: &str = "utils.tar.gz";

/// An extracted toolchain binary
#[derive(Clone, Debug)]
pub struct Toolchain {
    binary: PathBuf,
}

impl Toolchain {
    pub fn new(binary: PathBuf) -> Self {
        Toolchain { binary }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Run the toolchain in the foreground and wait for a successful exit
    pub fn run<I, S>(&self, args: I, env: &Environment) -> Result<(), RuntimeError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<OsString> = args
            .into_iter()
            .map(|arg| arg.as_ref().to_os_string())
            .collect();
        log::debug!("running {:?} {:?}", self.binary, args);

        let status = Command::new(&self.binary)
            .args(&args)
            .env_clear()
            .envs(env.vars().iter().map(|(k, v)| (k, v)))
            .status()
            .map_err(|source| RuntimeError::Spawn {
                program: self.binary.clone(),
                source,
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(RuntimeError::SubprocessFailed {
                program: self.binary.clone(),
                args,
                status,
            })
        }
    }

    /// Unpack `archive` into `utils_dir`, then link every applet under
    /// `utils_dir/busybox`
    pub fn install_utils(
        &self,
        archive: &Path,
        utils_dir: &Path,
        env: &Environment,
    ) -> Result<(), RuntimeError> {
        let links_dir = utils_dir.join(TOOLCHAIN_NAME);
        fs::create_dir_all(&links_dir).map_err(RuntimeError::cache(&links_dir))?;

        log::info!("unpacking {:?} into {:?}", archive, utils_dir);
        self.run(
            vec![
                OsStr::new("tar"),
                OsStr::new("-xf"),
                archive.as_os_str(),
                OsStr::new("-C"),
                utils_dir.as_os_str(),
            ],
            env,
        )?;
        self.run(
            vec![
                OsStr::new("--install"),
                OsStr::new("-s"),
                links_dir.as_os_str(),
            ],
            env,
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::Config;

    fn env() -> Environment {
        Environment::from(&Config::from_vars(vec![("PATH", "/usr/bin:/bin")]))
    }

    #[test]
    fn successful_run() {
        Toolchain::new("/bin/sh".into())
            .run(&["-c", "exit 0"], &env())
            .unwrap();
    }

    #[test]
    fn failed_run() {
        match Toolchain::new("/bin/sh".into()).run(&["-c", "exit 3"], &env()) {
            Err(RuntimeError::SubprocessFailed { args, status, .. }) => {
                assert_eq!(args, vec![OsString::from("-c"), OsString::from("exit 3")]);
                assert_eq!(status.code(), Some(3));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn environment_is_explicit() {
        let mut env = env();
        env.set("CONTY_TEST_VALUE", "42");
        Toolchain::new("/bin/sh".into())
            .run(
                &["-c", "test \"$CONTY_TEST_VALUE\" = 42 && test -z \"$HOME\""],
                &env,
            )
            .unwrap();
    }

    #[test]
    fn missing_binary() {
        let dir = tempfile::tempdir().unwrap();
        let result = Toolchain::new(dir.path().join(TOOLCHAIN_NAME)).run(&["true"], &env());
        assert!(matches!(result, Err(RuntimeError::Spawn { .. })));
    }
}
