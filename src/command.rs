//! The uniform command abstraction: one trait covering builtins and external
//! processes, so the dispatcher and the pipeline runner never branch on which
//! kind they are driving.

use crate::env::Environment;
use anyhow::Result;
use std::fs::File;
use std::io::{Read, Write};

pub type ExitCode = i32;

/// Where one standard stream of a command is attached.
#[derive(Debug)]
pub enum Wiring {
    /// Inherit the shell's own stream.
    Terminal,
    /// Attach a pipe; the opposite endpoint becomes available through the
    /// handle's endpoint accessors after [`CommandHandle::start`].
    Piped,
    /// No data flows: empty input, discarded output.
    Closed,
    /// Attach an already opened file.
    File(File),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Builtin,
    External,
}

/// One runnable command instance, wired, started, then waited on.
///
/// The protocol is the same for every implementation: set the wirings,
/// [`start`](CommandHandle::start), pull whatever pipe endpoints the wirings
/// created, then [`wait`](CommandHandle::wait) for the status.
pub trait CommandHandle {
    fn kind(&self) -> CommandKind;

    fn wire_input(&mut self, wiring: Wiring);
    fn wire_output(&mut self, wiring: Wiring);
    fn wire_error(&mut self, wiring: Wiring);

    /// Write end feeding the command's input, present after a piped start.
    fn input(&mut self) -> Option<Box<dyn Write + Send>>;
    /// Read end of the command's output, present after a piped start.
    fn output(&mut self) -> Option<Box<dyn Read + Send>>;
    /// Read end of the command's error stream, present after a piped start.
    fn error(&mut self) -> Option<Box<dyn Read + Send>>;

    fn start(&mut self) -> Result<()>;
    fn wait(&mut self) -> Result<ExitCode>;

    /// Session state as the command left it. Only builtins carry one; the
    /// dispatcher commits it back for single commands and discards it inside
    /// pipelines.
    fn take_env(&mut self) -> Option<Environment> {
        None
    }
}

/// Turns a name plus arguments into a runnable handle, or declines.
pub trait HandleFactory {
    fn try_create(
        &self,
        env: &Environment,
        name: &str,
        args: &[&str],
    ) -> Option<Box<dyn CommandHandle>>;
}
