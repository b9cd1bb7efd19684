//! Launcher settings, read once from the process environment

use crate::errors::RuntimeError;
use std::{
    ffi::{OsStr, OsString},
    path::PathBuf,
};

/// Name of the per-user directory under the data home
pub const CACHE_DIR_NAME: &str = "conty";

/// Snapshot of the environment the launcher was started with
///
/// Built once in `main` and passed by reference; nothing below this reads
/// the process environment on its own. The full variable list is kept so
/// the exec target sees the same environment, plus whatever the launcher
/// adds.
#[derive(Clone, Debug, Default)]
pub struct Config {
    vars: Vec<(OsString, OsString)>,
}

impl Config {
    /// Capture the current process environment
    pub fn from_env() -> Self {
        Config::from_vars(std::env::vars_os())
    }

    /// Build a configuration from explicit variables
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<OsString>,
        V: Into<OsString>,
    {
        Config {
            vars: vars
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Look up one variable, the last definition wins
    pub fn var<K: AsRef<OsStr>>(&self, key: K) -> Option<&OsStr> {
        let key = key.as_ref();
        self.vars
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_os_str())
    }

    /// Look up one variable, treating an empty value like an unset one
    pub fn non_empty_var<K: AsRef<OsStr>>(&self, key: K) -> Option<&OsStr> {
        self.var(key).filter(|v| !v.is_empty())
    }

    /// All variables, in their original order
    pub fn vars(&self) -> &[(OsString, OsString)] {
        &self.vars
    }

    /// `USE_SYS_UTILS` is set to anything non-empty
    pub fn use_sys_utils(&self) -> bool {
        self.non_empty_var("USE_SYS_UTILS").is_some()
    }

    /// Root of the cache tree
    ///
    /// `$XDG_DATA_HOME/conty` if set and non-empty, otherwise
    /// `$HOME/.local/share/conty`.
    pub fn base_dir(&self) -> Result<PathBuf, RuntimeError> {
        let mut buf = match self.non_empty_var("XDG_DATA_HOME") {
            Some(dir) => PathBuf::from(dir),
            None => match self.non_empty_var("HOME") {
                Some(home) => PathBuf::from(home).join(".local").join("share"),
                None => return Err(RuntimeError::NoBaseDirectory),
            },
        };
        buf.push(CACHE_DIR_NAME);
        Ok(buf)
    }
}
