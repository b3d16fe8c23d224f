//! A small interactive line-oriented command interpreter.
//!
//! The interpreter reads one line at a time, resolves it against a fixed set
//! of built-in commands (`cd`, `pwd`, `echo`, `kill`, `ps`, `netcat`) or an
//! external executable found on PATH, and supports one level of pipe chaining
//! (`stage1 | stage2 | ...`). There is deliberately no quoting, globbing,
//! variable expansion or job control; the grammar is whitespace-separated
//! words plus the literal `|` separator.
//!
//! The main entry point is [`Interpreter`], which owns the [`session::Session`]
//! state and a list of pluggable command factories. The public modules
//! [`command`], [`parser`] and [`session`] expose the traits and types needed
//! to implement additional commands or to drive the interpreter from tests.

mod builtin;
pub mod command;
mod external;
mod interpreter;
pub mod parser;
pub mod session;
mod signals;

pub use interpreter::Interpreter;
