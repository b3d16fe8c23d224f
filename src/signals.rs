//! Fan-in of OS interruption requests and relay failures.
//!
//! A blocking builtin (currently only `netcat`) wants to sit in a wait until
//! either its background line relay fails or the user asks the process to
//! stop. Both sources post into one channel and the foreground simply takes
//! the first event, giving first-arrival-wins semantics with no priority
//! between the two. Interest in the signals is registered per call and
//! dropped when the call returns; nothing is queued across calls.

use anyhow::{Context, Result};
use signal_hook::consts::signal::{SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::Signals;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc};
use std::thread;

/// The first event that ends a blocking relay.
#[derive(Debug)]
pub enum RelayEvent {
    /// An OS interruption request arrived; carries the signal's name.
    Signal(&'static str),
    /// Reading the input or writing to the sink failed.
    Error(io::Error),
}

/// Canonical name for the signals the relay registers interest in.
pub fn signal_name(signum: i32) -> &'static str {
    match signum {
        SIGINT => "SIGINT",
        SIGTERM => "SIGTERM",
        SIGQUIT => "SIGQUIT",
        _ => "unknown signal",
    }
}

/// Relay lines from `input` into `sink` until the first of: an input/transfer
/// error, or SIGINT/SIGTERM/SIGQUIT.
///
/// Each line is written without its trailing newline. The relay thread checks
/// a stop flag before every read, so once this function returns it winds down
/// after at most one more input line.
pub fn relay_until_interrupted(
    input: impl Read + Send + 'static,
    mut sink: Box<dyn Write + Send>,
) -> Result<RelayEvent> {
    let (tx, rx) = mpsc::channel();
    let stop = Arc::new(AtomicBool::new(false));

    let mut signals =
        Signals::new([SIGINT, SIGTERM, SIGQUIT]).context("registering signal handlers")?;
    let handle = signals.handle();
    let signal_tx = tx.clone();
    thread::spawn(move || {
        if let Some(signum) = signals.forever().next() {
            let _ = signal_tx.send(RelayEvent::Signal(signal_name(signum)));
        }
    });

    let relay_stop = Arc::clone(&stop);
    thread::spawn(move || {
        let mut reader = BufReader::new(input);
        loop {
            if relay_stop.load(Ordering::Relaxed) {
                return;
            }
            let mut line = String::new();
            match reader.read_line(&mut line) {
                Ok(0) => {
                    let _ = tx.send(RelayEvent::Error(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "input stream closed",
                    )));
                    return;
                }
                Ok(_) => {
                    let payload = line.strip_suffix('\n').unwrap_or(&line).to_owned();
                    if let Err(e) = sink
                        .write_all(payload.as_bytes())
                        .and_then(|()| sink.flush())
                    {
                        let _ = tx.send(RelayEvent::Error(e));
                        return;
                    }
                }
                Err(e) => {
                    let _ = tx.send(RelayEvent::Error(e));
                    return;
                }
            }
        }
    });

    let event = rx.recv().context("relay ended without an event")?;
    stop.store(true, Ordering::Relaxed);
    handle.close();
    Ok(event)
}
