use crate::session::Session;
use anyhow::Result;
use std::io::{Read, Write};

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure,
/// mirroring the convention used by POSIX shells.
pub type ExitCode = i32;

/// Object-safe trait for anything the interpreter can run as one pipeline
/// stage in-process.
///
/// Implemented for all built-in commands via a blanket impl in the builtin
/// module. `stdin` carries the previous stage's captured output (or the
/// interactive input for the first stage); whatever the command writes to
/// `stdout` becomes the stage's output.
pub trait ExecutableCommand {
    /// Executes the command, consuming it.
    fn execute(
        self: Box<Self>,
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        session: &mut Session,
    ) -> Result<ExitCode>;
}

/// Factory that tries to create a command from a name and its arguments.
///
/// Returns `None` when the factory does not recognize `name`; the interpreter
/// then falls back to launching an external process of that name.
pub trait CommandFactory {
    /// Attempt to create a command instance for the provided name and arguments.
    fn try_create(
        &self,
        session: &Session,
        name: &str,
        args: &[&str],
    ) -> Option<Box<dyn ExecutableCommand>>;
}
