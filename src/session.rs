use std::collections::HashMap;
use std::env as stdenv;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Abstraction over the process-global current working directory.
///
/// The production implementation ([`OsWorkdir`]) delegates to the OS, while
/// tests can substitute an in-memory implementation so that directory changes
/// stay local to the test.
pub trait Workdir {
    /// The current directory, as the OS (or the fake) sees it.
    fn current(&self) -> io::Result<PathBuf>;

    /// Change to `path` and return the directory actually entered.
    fn change_to(&mut self, path: &Path) -> io::Result<PathBuf>;
}

/// [`Workdir`] backed by `std::env`. Canonicalizes the target before
/// switching so that the session always holds an absolute path.
pub struct OsWorkdir;

impl Workdir for OsWorkdir {
    fn current(&self) -> io::Result<PathBuf> {
        stdenv::current_dir()
    }

    fn change_to(&mut self, path: &Path) -> io::Result<PathBuf> {
        let canonical = fs::canonicalize(path)?;
        stdenv::set_current_dir(&canonical)?;
        Ok(canonical)
    }
}

/// Process-wide interpreter state that persists across input lines.
///
/// The session holds:
/// - `vars`: environment variables passed on to executed commands.
/// - `current_dir`: the working directory, mirrored from the [`Workdir`]
///   so that the prompt and `pwd` never have to touch ambient process state.
/// - `should_exit`: set when the user asks to leave the interactive loop.
pub struct Session {
    /// Key-value store of environment variables (e.g. PATH, HOME).
    pub vars: HashMap<String, String>,
    /// The current working directory for command execution.
    pub current_dir: PathBuf,
    /// When true, the interactive loop terminates after the current line.
    pub should_exit: bool,
    workdir: Box<dyn Workdir>,
}

impl Session {
    /// Capture the current process state into a new session backed by the OS.
    pub fn new() -> Self {
        Self::with_workdir(Box::new(OsWorkdir))
    }

    /// Build a session on top of a custom [`Workdir`] implementation.
    pub fn with_workdir(workdir: Box<dyn Workdir>) -> Self {
        let mut vars = HashMap::new();
        for (k, v) in stdenv::vars() {
            vars.insert(k, v);
        }
        let current_dir = workdir.current().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            vars,
            current_dir,
            should_exit: false,
            workdir,
        }
    }

    /// Get the value of an environment variable, falling back to the process
    /// environment for keys the session has never seen.
    pub fn get_var(&self, key: &str) -> Option<String> {
        self.vars
            .get(key)
            .cloned()
            .or_else(|| stdenv::var(key).ok())
    }

    /// Set or override an environment variable.
    pub fn set_var(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.vars.insert(key.into(), val.into());
    }

    /// Change the working directory. Relative targets are resolved against
    /// the session's current directory, not the ambient process one.
    pub fn chdir(&mut self, target: &Path) -> Result<()> {
        let resolved = if target.is_absolute() {
            target.to_path_buf()
        } else {
            self.current_dir.join(target)
        };
        let entered = self
            .workdir
            .change_to(&resolved)
            .with_context(|| format!("cd: {}", resolved.display()))?;
        self.current_dir = entered;
        Ok(())
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// In-memory [`Workdir`] that never touches the real process state.
#[cfg(test)]
pub(crate) struct FakeWorkdir {
    pub dir: PathBuf,
}

#[cfg(test)]
impl Workdir for FakeWorkdir {
    fn current(&self) -> io::Result<PathBuf> {
        Ok(self.dir.clone())
    }

    fn change_to(&mut self, path: &Path) -> io::Result<PathBuf> {
        self.dir = path.to_path_buf();
        Ok(self.dir.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_session(dir: &str) -> Session {
        Session::with_workdir(Box::new(FakeWorkdir {
            dir: PathBuf::from(dir),
        }))
    }

    #[test]
    fn session_set_and_get_var() {
        let mut session = fake_session("/work");

        assert_eq!(session.get_var("SOME_RANDOM_ENV_VAR_12345"), None);

        session.set_var("KEY", "VALUE");
        assert_eq!(session.get_var("KEY"), Some("VALUE".to_string()));
    }

    #[test]
    fn session_reads_from_process_env() {
        let session = Session::new();
        assert!(session.get_var("PATH").is_some());
    }

    #[test]
    fn chdir_absolute_replaces_current_dir() {
        let mut session = fake_session("/work");
        session.chdir(Path::new("/elsewhere")).unwrap();
        assert_eq!(session.current_dir, PathBuf::from("/elsewhere"));
    }

    #[test]
    fn chdir_relative_resolves_against_session_dir() {
        let mut session = fake_session("/work");
        session.chdir(Path::new("sub")).unwrap();
        assert_eq!(session.current_dir, PathBuf::from("/work/sub"));
    }
}
