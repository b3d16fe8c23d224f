use crate::session::Session;
use anyhow::{Context, Result, anyhow};
use std::borrow::Cow;
use std::ffi::{OsStr, OsString};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;

/// An external program resolved to a concrete executable path, ready to be
/// spawned as one pipeline stage.
pub struct ExternalCommand {
    path: PathBuf,
    args: Vec<OsString>,
}

impl ExternalCommand {
    /// Resolve `name` against the session's PATH. Returns `None` when no
    /// matching executable exists, which the interpreter reports as
    /// "command not found".
    pub fn resolve(session: &Session, name: &str, args: &[String]) -> Option<Self> {
        let search_paths = session.get_var("PATH")?;
        let path = find_command_path(OsStr::new(&search_paths), Path::new(name))?.into_owned();
        Some(Self {
            path,
            args: args.iter().map(|a| a.into()).collect(),
        })
    }

    /// Spawn the process and block until it exits.
    ///
    /// `input`, when present, is fed to the child's standard input through a
    /// pipe; otherwise the child reads the interpreter's own input directly.
    /// With `capture` set (non-final pipeline stages) the child's standard
    /// output is collected and returned instead of reaching the terminal.
    /// Standard error is always inherited. A non-zero exit becomes an error
    /// so the interpreter can substitute it for the stage's output.
    pub fn run(self, session: &Session, input: Option<Vec<u8>>, capture: bool) -> Result<Option<Vec<u8>>> {
        tracing::debug!(path = %self.path.display(), capture, "spawning external command");

        let mut cmd = Command::new(&self.path);
        cmd.args(&self.args)
            .envs(session.vars.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .current_dir(&session.current_dir)
            .stdin(if input.is_some() {
                Stdio::piped()
            } else {
                Stdio::inherit()
            })
            .stdout(if capture {
                Stdio::piped()
            } else {
                Stdio::inherit()
            })
            .stderr(Stdio::inherit());

        let mut child = cmd
            .spawn()
            .with_context(|| format!("{}: failed to start", self.path.display()))?;

        // Feed stdin from its own thread: writing the whole buffer before
        // draining the child's stdout deadlocks once either side outgrows
        // the OS pipe buffer.
        let feeder = match (input, child.stdin.take()) {
            (Some(buf), Some(mut child_stdin)) => Some(thread::spawn(move || {
                // A stage that exits without draining its input is not an error.
                match child_stdin.write_all(&buf) {
                    Err(e) if e.kind() != io::ErrorKind::BrokenPipe => Err(e),
                    _ => Ok(()),
                }
            })),
            _ => None,
        };

        let result = if capture {
            let output = child.wait_with_output()?;
            exit_ok(output.status).map(|()| Some(output.stdout))
        } else {
            let status = child.wait()?;
            exit_ok(status).map(|()| None)
        };

        if let Some(handle) = feeder {
            handle
                .join()
                .map_err(|_| anyhow!("pipeline input writer panicked"))?
                .context("feeding pipeline input")?;
        }

        result
    }
}

fn exit_ok(status: ExitStatus) -> Result<()> {
    if status.success() {
        return Ok(());
    }
    let code = match status.code() {
        Some(code) => code,
        None => terminated_by_signal(status),
    };
    Err(anyhow::anyhow!("exit status {code}"))
}

#[cfg(unix)]
fn terminated_by_signal(exit_status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    if let Some(signal) = ExitStatusExt::signal(&exit_status) {
        128 + signal
    } else if ExitStatusExt::core_dumped(&exit_status) {
        255
    } else {
        -1
    }
}

#[cfg(not(unix))]
fn terminated_by_signal(_exit_status: ExitStatus) -> i32 {
    -1
}

/// Resolve a command path the way a typical shell would.
///
/// Absolute paths and multi-component relative paths (`bin/sh`) are taken as
/// given when they exist; a `./`-prefixed path resolves against the current
/// directory; a bare single component is searched for in each directory of
/// `search_paths` (PATH); an empty path never resolves.
pub fn find_command_path<'a>(search_paths: &OsStr, path: &'a Path) -> Option<Cow<'a, Path>> {
    if path.is_absolute() {
        return existing(path).map(Cow::Borrowed);
    }

    let search_in_current_dir = cfg!(not(unix)) || path.starts_with("./");
    if search_in_current_dir && path.exists() {
        return Some(Cow::Borrowed(path));
    }

    let mut components = path.components();
    let first = components.next();
    let second = components.next();
    match (first, second) {
        (None, None) => None,
        (Some(name), None) => find_in_path(search_paths, name.as_os_str()).map(Cow::Owned),
        _ => existing(path).map(Cow::Borrowed),
    }
}

fn find_in_path(search_paths: &OsStr, cmd: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(search_paths)
        .map(|dir| dir.join(cmd))
        .find(|candidate| candidate.exists())
}

fn existing(path: &Path) -> Option<&Path> {
    if path.exists() { Some(path) } else { None }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    fn osstr(s: &str) -> &OsStr {
        OsStr::new(s)
    }

    #[test]
    #[cfg(unix)]
    fn absolute_existing_path_resolves() {
        let path = Path::new("/bin/sh");
        let found = find_command_path(osstr("/bin"), path).expect("/bin/sh should resolve");
        assert_eq!(found.as_ref(), path);
    }

    #[test]
    #[cfg(unix)]
    fn absolute_missing_path_does_not_resolve() {
        assert!(find_command_path(osstr("/bin"), Path::new("/bin/nonexisting")).is_none());
    }

    #[test]
    #[cfg(unix)]
    fn single_component_is_searched_in_path() {
        let found =
            find_command_path(osstr("/bin"), Path::new("sh")).expect("'sh' should be in /bin");
        assert!(found.as_ref().ends_with("sh"));
        assert!(found.as_ref().starts_with("/bin"));
    }

    #[test]
    #[cfg(unix)]
    fn single_component_missing_from_path() {
        assert!(find_command_path(osstr("/bin"), Path::new("nonexisting")).is_none());
    }

    #[test]
    fn empty_path_never_resolves() {
        assert!(find_command_path(OsStr::new("/bin"), Path::new("")).is_none());
    }

    #[test]
    #[cfg(unix)]
    fn captured_run_collects_stdout() {
        let session = Session::new();
        let cmd = ExternalCommand::resolve(&session, "echo", &["hello".to_string()])
            .expect("echo should be on PATH");

        let out = cmd.run(&session, None, true).unwrap();
        assert_eq!(out, Some(b"hello\n".to_vec()));
    }

    #[test]
    #[cfg(unix)]
    fn piped_input_reaches_the_child() {
        let session = Session::new();
        let cmd =
            ExternalCommand::resolve(&session, "cat", &[]).expect("cat should be on PATH");

        let out = cmd
            .run(&session, Some(b"through the pipe\n".to_vec()), true)
            .unwrap();
        assert_eq!(out, Some(b"through the pipe\n".to_vec()));
    }

    #[test]
    #[cfg(unix)]
    fn large_buffers_pass_through_captured_stage() {
        let session = Session::new();
        let cmd = ExternalCommand::resolve(&session, "cat", &[]).expect("cat should be on PATH");

        // Well past the OS pipe buffer, so feeding and draining must overlap.
        let payload = vec![b'x'; 1 << 20];
        let out = cmd.run(&session, Some(payload.clone()), true).unwrap();
        assert_eq!(out, Some(payload));
    }

    #[test]
    #[cfg(unix)]
    fn nonzero_exit_is_surfaced_as_error() {
        let session = Session::new();
        let cmd = ExternalCommand::resolve(&session, "false", &[]).expect("false on PATH");

        let err = cmd.run(&session, None, true).unwrap_err();
        assert!(err.to_string().contains("exit status 1"));
    }

    #[test]
    fn unresolvable_name_returns_none() {
        let session = Session::new();
        assert!(
            ExternalCommand::resolve(&session, "definitely_not_a_command_xyz", &[]).is_none()
        );
    }
}
