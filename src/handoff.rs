//! Replacing the launcher with its exec target

use crate::{env::Environment, errors::RuntimeError};
use std::{
    ffi::{CString, OsStr},
    fmt, io,
    os::{
        raw::c_char,
        unix::{ffi::OsStrExt, io::AsRawFd},
    },
    path::PathBuf,
    ptr,
};

/// Most arguments a launcher accepts, `argv[0]` included
///
/// The sandbox tools started later by the entry script can take around
/// 9000 arguments and reserve some of them for their own use.
pub const MAX_ARGS: usize = 8000;

/// Refuse argument vectors over [MAX_ARGS]
pub fn check_arg_count(count: usize) -> Result<(), RuntimeError> {
    if count > MAX_ARGS {
        Err(RuntimeError::TooManyArguments {
            count,
            limit: MAX_ARGS,
        })
    } else {
        Ok(())
    }
}

/// What gets executed
pub enum Target {
    /// A file on disk
    Path(PathBuf),
    /// An anonymous memory-backed file, executed through its descriptor
    Memfd(memfd::Memfd),
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Path(path) => write!(f, "{:?}", path),
            Target::Memfd(memfd) => write!(f, "memfd:{}", memfd.as_file().as_raw_fd()),
        }
    }
}

/// A fully prepared exec: target, argument vector, and environment
///
/// Everything is converted to C strings up front so that [Handoff::exec]
/// does nothing but the final system call.
#[derive(Debug)]
pub struct Handoff {
    target: Target,
    argv: Vec<CString>,
    envp: Vec<CString>,
}

impl Handoff {
    pub fn new<I, S>(target: Target, argv: I, env: &Environment) -> Result<Self, RuntimeError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut c_argv = Vec::new();
        for arg in argv {
            c_argv.push(CString::new(arg.as_ref().as_bytes())?);
        }
        let mut c_envp = Vec::with_capacity(env.vars().len());
        for (key, value) in env.vars() {
            let mut pair = key.as_bytes().to_vec();
            pair.push(b'=');
            pair.extend_from_slice(value.as_bytes());
            c_envp.push(CString::new(pair)?);
        }
        Ok(Handoff {
            target,
            argv: c_argv,
            envp: c_envp,
        })
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn argv(&self) -> &[CString] {
        &self.argv
    }

    /// Environment as `KEY=value` strings
    pub fn envp(&self) -> &[CString] {
        &self.envp
    }

    /// Look up one variable in the prepared environment
    pub fn env_var(&self, key: &str) -> Option<&[u8]> {
        self.envp.iter().find_map(|pair| {
            let bytes = pair.as_bytes();
            if bytes.len() > key.len()
                && bytes.starts_with(key.as_bytes())
                && bytes[key.len()] == b'='
            {
                Some(&bytes[key.len() + 1..])
            } else {
                None
            }
        })
    }

    /// Replace the current process image
    ///
    /// Only returns if the exec failed; on success this process is gone.
    pub fn exec(self) -> RuntimeError {
        log::debug!("exec {:?} argv={:?}", self.target, self.argv);
        let argv = pointer_array(&self.argv);
        let envp = pointer_array(&self.envp);
        match &self.target {
            Target::Path(path) => {
                let path = match CString::new(path.as_os_str().as_bytes()) {
                    Ok(path) => path,
                    Err(err) => return err.into(),
                };
                unsafe { libc::execve(path.as_ptr(), argv.as_ptr(), envp.as_ptr()) };
            }
            Target::Memfd(memfd) => {
                let fd = memfd.as_file().as_raw_fd();
                unsafe { libc::fexecve(fd, argv.as_ptr(), envp.as_ptr()) };
            }
        }
        RuntimeError::Exec {
            target: format!("{:?}", self.target),
            source: io::Error::last_os_error(),
        }
    }
}

/// Null-terminated array of pointers into `strings`
pub fn pointer_array(strings: &[CString]) -> Vec<*const c_char> {
    strings
        .iter()
        .map(|s| s.as_ptr())
        .chain(std::iter::once(ptr::null()))
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::Config;

    #[test]
    fn arg_limit() {
        assert!(check_arg_count(0).is_ok());
        assert!(check_arg_count(MAX_ARGS).is_ok());
        assert!(matches!(
            check_arg_count(MAX_ARGS + 1),
            Err(RuntimeError::TooManyArguments { count, limit: MAX_ARGS }) if count == MAX_ARGS + 1
        ));
    }

    #[test]
    fn vectors_are_converted() {
        let env = Environment::from(&Config::from_vars(vec![("A", "1"), ("PATH", "/x:/y")]));
        let handoff = Handoff::new(
            Target::Path("/bin/sh".into()),
            vec!["sh", "-c", "echo $0", "two words"],
            &env,
        )
        .unwrap();
        let argv: Vec<&[u8]> = handoff.argv().iter().map(|s| s.as_bytes()).collect();
        assert_eq!(argv, vec![&b"sh"[..], b"-c", b"echo $0", b"two words"]);
        let envp: Vec<&[u8]> = handoff.envp().iter().map(|s| s.as_bytes()).collect();
        assert_eq!(envp, vec![&b"A=1"[..], b"PATH=/x:/y"]);
        assert_eq!(handoff.env_var("PATH"), Some(&b"/x:/y"[..]));
        assert_eq!(handoff.env_var("PAT"), None);
    }

    #[test]
    fn nul_bytes_are_rejected() {
        let env = Environment::default();
        assert!(matches!(
            Handoff::new(Target::Path("/bin/sh".into()), vec!["a\0b"], &env),
            Err(RuntimeError::NulString(_))
        ));
    }

    #[test]
    fn pointer_array_ends_with_null() {
        let strings = vec![CString::new("a").unwrap(), CString::new("b").unwrap()];
        let array = pointer_array(&strings);
        assert_eq!(array.len(), 3);
        assert_eq!(array[0], strings[0].as_ptr());
        assert_eq!(array[1], strings[1].as_ptr());
        assert!(array[2].is_null());
    }

    #[test]
    fn failed_exec_returns() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");
        let handoff = Handoff::new(Target::Path(missing), vec!["x"], &Environment::default())
            .unwrap();
        match handoff.exec() {
            RuntimeError::Exec { source, .. } => {
                assert_eq!(source.kind(), io::ErrorKind::NotFound)
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
