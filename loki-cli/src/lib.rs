//! Command-line front end for Loki
//!
//! Argument parsing, the terminal log sink and the session bootstrap used by
//! the `loki` binary.

pub mod args;
pub mod bootstrap;
pub mod console;

pub use args::{Cli, Commands, ModuleName};
pub use console::{ConsoleLog, ConsoleObserver};
