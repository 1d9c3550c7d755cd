//! A small interactive shell built from readable pieces.
//!
//! This crate provides a raw-mode line editor with history recall and tab
//! completion, a quote-aware tokenizer, and an interpreter that drives
//! built-in commands and external programs through one uniform handle
//! abstraction, so pipelines mix both freely.
//!
//! The main entry point is [`Interpreter`], which owns the session
//! environment and a set of pluggable command factories. The public modules
//! [`command`], [`env`] and [`history`] expose the traits and types needed
//! to implement your own commands.

mod builtin;
pub mod command;
mod completion;
mod editor;
pub mod env;
mod external;
pub mod history;
mod interpreter;
mod lexer;
mod parser;
mod pipeline;

/// Just a convenient re-export of the interactive command runner.
///
/// See [`Interpreter`] for the high-level API and examples.
pub use interpreter::Interpreter;
