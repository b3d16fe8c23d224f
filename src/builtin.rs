use crate::command::{CommandFactory, ExecutableCommand, ExitCode};
use crate::interpreter::Factory;
use crate::session::Session;
use crate::signals::{self, RelayEvent};
use anyhow::{Result, anyhow};
use argh::{EarlyExit, FromArgs};
use std::io::{self, Read, Write};
use std::net::{TcpStream, UdpSocket};
use std::path::PathBuf;
use sysinfo::System;

/// Built-in commands known to the interpreter at compile time.
///
/// Builtins are parsed with the [`argh`] crate (`FromArgs`) and executed
/// directly in-process without spawning a child. A builtin never aborts the
/// session: the blanket [`ExecutableCommand`] impl below turns any failure
/// into a one-line message written in place of the command's normal output.
pub(crate) trait BuiltinCommand: Sized + FromArgs {
    /// Canonical name of the command, e.g. "echo" or "cd".
    fn name() -> &'static str;

    /// Executes the command using the provided IO streams and session.
    ///
    /// Return value follows shell conventions: 0 for success, non-zero for error.
    fn execute(
        self,
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        session: &mut Session,
    ) -> Result<ExitCode>;
}

impl<T: BuiltinCommand> ExecutableCommand for T {
    fn execute(
        self: Box<Self>,
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        session: &mut Session,
    ) -> Result<ExitCode> {
        match T::execute(*self, stdin, stdout, session) {
            Ok(code) => Ok(code),
            Err(e) => {
                writeln!(stdout, "{e}")?;
                Ok(1)
            }
        }
    }
}

/// Stand-in command produced when argh rejects the arguments; it prints the
/// usage/error text argh generated and reports the matching exit code.
struct InvalidArgs {
    output: String,
    is_error: bool,
}

impl ExecutableCommand for InvalidArgs {
    fn execute(
        self: Box<Self>,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        _session: &mut Session,
    ) -> Result<ExitCode> {
        stdout.write_all(self.output.as_bytes())?;
        if !self.output.ends_with('\n') {
            stdout.write_all(b"\n")?;
        }
        Ok(if self.is_error { 1 } else { 0 })
    }
}

impl<T: BuiltinCommand + 'static> CommandFactory for Factory<T> {
    fn try_create(
        &self,
        _session: &Session,
        name: &str,
        args: &[&str],
    ) -> Option<Box<dyn ExecutableCommand>> {
        if name == T::name() {
            Some(match T::from_args(&[name], args) {
                Ok(cmd) => Box::new(cmd),
                Err(EarlyExit { output, status }) => Box::new(InvalidArgs {
                    output,
                    is_error: status.is_err(),
                }),
            })
        } else {
            None
        }
    }
}

#[derive(FromArgs)]
/// Print the absolute path of the current working directory.
pub struct Pwd {}

impl BuiltinCommand for Pwd {
    fn name() -> &'static str {
        "pwd"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        session: &mut Session,
    ) -> Result<ExitCode> {
        writeln!(stdout, "{}", session.current_dir.display())?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Change the current working directory.
/// With no target, changes to the directory named by the HOME variable.
pub struct Cd {
    #[argh(positional, greedy)]
    /// directory to switch to; absolute or relative to the current directory
    pub targets: Vec<String>,
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        session: &mut Session,
    ) -> Result<ExitCode> {
        if self.targets.len() > 1 {
            // The typo is long-standing; keep the exact text.
            stdout.write_all(b"cd: too mane arguments\n")?;
            return Ok(1);
        }

        let target = match self.targets.first() {
            Some(t) => PathBuf::from(t),
            None => PathBuf::from(
                session
                    .get_var("HOME")
                    .ok_or_else(|| anyhow!("cd: HOME is not set"))?,
            ),
        };

        session.chdir(&target)?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Write the arguments to standard output, concatenated without separators,
/// followed by a newline.
pub struct Echo {
    #[argh(positional, greedy)]
    /// values to print back-to-back
    pub args: Vec<String>,
}

impl BuiltinCommand for Echo {
    fn name() -> &'static str {
        "echo"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        _session: &mut Session,
    ) -> Result<ExitCode> {
        writeln!(stdout, "{}", self.args.concat())?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Send a named signal (default TERM) to a running process by PID.
pub struct Kill {
    #[argh(option, short = 's')]
    /// signal name to send: INT, TERM, QUIT, KILL or HUP (with or without
    /// the SIG prefix); anything else falls back to TERM
    pub signal: Option<String>,

    #[argh(positional)]
    /// numeric PID of the target process
    pub pid: Option<String>,
}

impl BuiltinCommand for Kill {
    fn name() -> &'static str {
        "kill"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        _session: &mut Session,
    ) -> Result<ExitCode> {
        let Some(pid_arg) = self.pid else {
            stdout.write_all(b"kill: usage: kill [-s sigspec] pid\n")?;
            return Ok(1);
        };

        if self.signal.as_deref() == Some("") {
            stdout.write_all(b"kill: invalid signal specification\n")?;
            return Ok(1);
        }

        // The PID must belong to a currently running process.
        let known = pid_arg.parse::<u32>().ok().filter(|&pid| {
            let mut system = System::new();
            system.refresh_all();
            system.process(sysinfo::Pid::from_u32(pid)).is_some()
        });
        let Some(pid) = known else {
            writeln!(stdout, "kill: no process with pid: {pid_arg}")?;
            return Ok(1);
        };

        let requested = self.signal.as_deref().unwrap_or("TERM");
        let sent = deliver_signal(pid as i32, requested)?;
        writeln!(stdout, "kill: {pid} was sent {sent}")?;
        Ok(0)
    }
}

#[cfg(unix)]
fn deliver_signal(pid: i32, name: &str) -> Result<&'static str> {
    use nix::sys::signal::{self, Signal};

    let sig = match name.strip_prefix("SIG").unwrap_or(name) {
        "INT" => Signal::SIGINT,
        "TERM" => Signal::SIGTERM,
        "QUIT" => Signal::SIGQUIT,
        "KILL" => Signal::SIGKILL,
        "HUP" => Signal::SIGHUP,
        _ => Signal::SIGTERM,
    };
    signal::kill(nix::unistd::Pid::from_raw(pid), sig).map_err(|e| anyhow!("kill: {e}"))?;
    Ok(sig.as_str())
}

#[cfg(not(unix))]
fn deliver_signal(_pid: i32, _name: &str) -> Result<&'static str> {
    Err(anyhow!("kill: signals are not supported on this platform"))
}

#[derive(FromArgs)]
/// List every currently running process, one `PID\tCMD` line each.
pub struct Ps {}

impl BuiltinCommand for Ps {
    fn name() -> &'static str {
        "ps"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        _session: &mut Session,
    ) -> Result<ExitCode> {
        let mut system = System::new();
        system.refresh_all();

        let mut entries: Vec<(u32, String)> = system
            .processes()
            .iter()
            .map(|(pid, process)| (pid.as_u32(), process.name().to_string_lossy().into_owned()))
            .filter(|(_, name)| !name.is_empty())
            .collect();
        entries.sort_unstable_by_key(|(pid, _)| *pid);

        writeln!(stdout, "PID\tCMD")?;
        for (pid, name) in entries {
            writeln!(stdout, "{pid}\t{name}")?;
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Open a raw TCP (default) or UDP connection to HOST:PORT and relay
/// interactive-input lines into it until a signal or a transfer error.
pub struct Netcat {
    #[argh(switch, short = 'u')]
    /// use UDP instead of TCP
    pub udp: bool,

    #[argh(positional, greedy)]
    /// remote host followed by remote port
    pub endpoint: Vec<String>,
}

impl BuiltinCommand for Netcat {
    fn name() -> &'static str {
        "netcat"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        _session: &mut Session,
    ) -> Result<ExitCode> {
        let [host, port, ..] = self.endpoint.as_slice() else {
            stdout.write_all(b"need to specify HOST and PORT\n")?;
            return Ok(1);
        };
        let addr = format!("{host}:{port}");

        let connected: io::Result<Box<dyn Write + Send>> = if self.udp {
            datagram_connect(&addr).map(|sock| Box::new(sock) as Box<dyn Write + Send>)
        } else {
            TcpStream::connect(&addr).map(|stream| Box::new(stream) as Box<dyn Write + Send>)
        };
        let sink = match connected {
            Ok(sink) => sink,
            Err(e) => {
                writeln!(stdout, "netcat: connection failed: {e}")?;
                return Ok(1);
            }
        };

        // Blocks until the first of: relay failure, SIGINT/SIGTERM/SIGQUIT.
        // The relay drains the interpreter's own input stream, like the
        // interactive loop it temporarily replaces.
        match signals::relay_until_interrupted(io::stdin(), sink)? {
            RelayEvent::Signal(name) => writeln!(stdout, "stopped by signal: {name}")?,
            RelayEvent::Error(e) => writeln!(stdout, "{e}")?,
        }
        Ok(0)
    }
}

/// A connected UDP socket exposed as a line sink; every write is one datagram.
struct Datagram(UdpSocket);

impl Write for Datagram {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.send(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn datagram_connect(addr: &str) -> io::Result<Datagram> {
    let sock = UdpSocket::bind(("0.0.0.0", 0))?;
    sock.connect(addr)?;
    Ok(Datagram(sock))
}
