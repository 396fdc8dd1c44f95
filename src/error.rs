//! Error types for minish

use std::io;

use thiserror::Error;

use crate::parse::{LexError, ParseError};

/// Negative status codes returned by [`run`](crate::run) when no command
/// could report an exit status. Zero and positive values are always the
/// command's own exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ErrorCode {
    Generic = -1,
    Fork = -2,
    Pipe = -3,
    Exec = -4,
    Tokenize = -5,
    Eval = -6,
}

impl From<ErrorCode> for i32 {
    fn from(code: ErrorCode) -> Self {
        code as i32
    }
}

/// Error types for shell invocations
#[derive(Error, Debug)]
pub enum ShellError {
    /// Anything without a dedicated code
    #[error("{0}")]
    Generic(String),

    /// The OS refused to create a process
    #[error("cannot create process: {0}")]
    Fork(#[source] io::Error),

    /// The OS refused to create a pipe
    #[error("cannot create pipe: {0}")]
    Pipe(#[source] io::Error),

    /// The program could not be loaded (not found, not executable, ...)
    #[error("{program}: {source}")]
    Exec {
        program: String,
        #[source]
        source: io::Error,
    },

    /// Lexing failed; nothing was spawned
    #[error("syntax error: {0}")]
    Tokenize(#[from] LexError),

    /// Parsing failed; nothing was spawned
    #[error("syntax error: {0}")]
    Eval(#[from] ParseError),

    /// IO error while waiting for or talking to a child
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl ShellError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ShellError::Generic(_) | ShellError::Io(_) => ErrorCode::Generic,
            ShellError::Fork(_) => ErrorCode::Fork,
            ShellError::Pipe(_) => ErrorCode::Pipe,
            ShellError::Exec { .. } => ErrorCode::Exec,
            ShellError::Tokenize(_) => ErrorCode::Tokenize,
            ShellError::Eval(_) => ErrorCode::Eval,
        }
    }
}
