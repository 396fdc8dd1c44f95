//! minish: a small POSIX-like shell library.
//!
//! A command line is lexed into tokens, parsed into an AST and evaluated by
//! spawning processes. It supports pipelines (`|`), sequencing (`;`),
//! background jobs (`&`), single redirections (`<`, `>`) and single or double
//! quotes. There are no variables, globbing, escapes or builtins.
//!
//! ```no_run
//! // Inherit the caller's stdio.
//! let status = minish::run("printf 'b\\na\\n' | sort", None);
//! assert_eq!(status, 0);
//!
//! // Capture output.
//! let mut io = minish::ShellIo::new();
//! minish::run("echo 'a b c'", Some(&mut io));
//! assert_eq!(io.stdout(), b"a b c\n");
//! ```
//!
//! # Architecture
//!
//! - **[`parse`]**: Lexer, token model, recursive-descent parser and AST.
//! - **[`eval`]**: Evaluation context and evaluator: pipelines, redirections, background jobs.
//! - **[`capture`]**: Feeding stdin from memory and capturing stdout/stderr.
//! - **[`config`]**: Configuration loading: embedded defaults + user overlay merge.
//! - **[`logging`]**: Logger installation for the `minish` binary.

/// Capture mode: [`ShellIo`] and the stream multiplexer.
pub mod capture;
/// Configuration types, loading, and overlay merge logic.
pub mod config;
/// Error types and the negative status codes of [`run`].
pub mod error;
/// Evaluation context and evaluator.
pub mod eval;
/// Logger installation from configuration.
pub mod logging;
/// Lexer, parser and AST.
pub mod parse;
mod shell;

pub use capture::{ShellIo, Sink};
pub use config::ShellConfig;
pub use error::{ErrorCode, ShellError};
pub use shell::Shell;

use std::fmt;

/// Run a command line with the default configuration.
///
/// Returns the exit status of the last foreground command (0 for a
/// trailing background job), or a negative [`ErrorCode`] when the command
/// line could not be run.
pub fn run(command: &str, io: Option<&mut ShellIo<'_>>) -> i32 {
    shell::default_shell().run(command, io)
}

/// [`run`] a command line built from format arguments.
/// See [`run_formatted!`].
pub fn run_fmt(io: Option<&mut ShellIo<'_>>, args: fmt::Arguments<'_>) -> i32 {
    match args.as_str() {
        Some(command) => run(command, io),
        None => run(&args.to_string(), io),
    }
}

/// Format a command line and run it.
///
/// ```no_run
/// let path = "/tmp/out.txt";
/// minish::run_formatted!(None, "echo hi > {}", path);
/// ```
#[macro_export]
macro_rules! run_formatted {
    ($io:expr, $($arg:tt)*) => {
        $crate::run_fmt($io, ::std::format_args!($($arg)*))
    };
}
