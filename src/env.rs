//! Environment handed to helper processes and to the final exec target

use crate::config::Config;
use std::{
    ffi::{OsStr, OsString},
    path::Path,
};

/// Separator between entries of a search-path variable
pub const PATH_LIST_SEPARATOR: &str = ":";

/// A mutable copy of the launcher's environment
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Environment {
    vars: Vec<(OsString, OsString)>,
}

impl From<&Config> for Environment {
    fn from(config: &Config) -> Self {
        let mut env = Environment::default();
        for (key, value) in config.vars() {
            env.set(key, value);
        }
        env
    }
}

impl Environment {
    pub fn get<K: AsRef<OsStr>>(&self, key: K) -> Option<&OsStr> {
        let key = key.as_ref();
        self.vars
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_os_str())
    }

    /// Set a variable, replacing any earlier value in place
    pub fn set<K: AsRef<OsStr>, V: AsRef<OsStr>>(&mut self, key: K, value: V) {
        let key = key.as_ref();
        let value = value.as_ref().to_os_string();
        match self.vars.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value,
            None => self.vars.push((key.to_os_string(), value)),
        }
    }

    pub fn vars(&self) -> &[(OsString, OsString)] {
        &self.vars
    }

    /// Put `dir` at the front of a search-path variable
    ///
    /// An unset or empty variable becomes just `dir`. Existing entries are
    /// kept as they are, duplicates included.
    pub fn prepend_search_path<K: AsRef<OsStr>>(&mut self, key: K, dir: &Path) {
        let key = key.as_ref();
        let value = prepend_search_path(self.get(key), dir.as_os_str());
        self.set(key, value);
    }
}

/// Join `dir` in front of an existing path list
pub fn prepend_search_path(current: Option<&OsStr>, dir: &OsStr) -> OsString {
    let mut value = dir.to_os_string();
    if let Some(current) = current.filter(|current| !current.is_empty()) {
        value.push(PATH_LIST_SEPARATOR);
        value.push(current);
    }
    value
}

/// Make the cached utilities win over the host's
///
/// `PATH` gets `<utils>/busybox` and `<utils>/bin`, `LD_LIBRARY_PATH` gets
/// `<utils>/lib`. Nothing changes when `USE_SYS_UTILS` is set.
pub fn compose_search_paths(env: &mut Environment, config: &Config, utils_dir: &Path) {
    if config.use_sys_utils() {
        log::info!("USE_SYS_UTILS is set, using utilities from the host");
        return;
    }
    env.prepend_search_path("PATH", &utils_dir.join("bin"));
    env.prepend_search_path("PATH", &utils_dir.join(crate::utils::TOOLCHAIN_NAME));
    env.prepend_search_path("LD_LIBRARY_PATH", &utils_dir.join("lib"));
}
