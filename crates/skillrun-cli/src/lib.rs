// skillrun command-line interface

pub mod cli;
pub mod commands;
pub mod logging;
pub mod output;

pub use cli::{Cli, Commands};
