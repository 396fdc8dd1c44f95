use std::fmt;
use std::fs::File;
use std::io::{self, PipeReader, PipeWriter, Write};
use std::process::Stdio;
use std::rc::Rc;

use crate::config::ShellConfig;

/// A stream a child can be wired to instead of the invocation's default.
#[derive(Debug)]
pub(crate) enum Endpoint {
    File(File),
    Reader(PipeReader),
    Writer(PipeWriter),
}

impl Endpoint {
    /// A fresh handle for one child; this endpoint stays open.
    pub(crate) fn stdio(&self) -> io::Result<Stdio> {
        Ok(match self {
            Endpoint::File(file) => Stdio::from(file.try_clone()?),
            Endpoint::Reader(reader) => Stdio::from(reader.try_clone()?),
            Endpoint::Writer(writer) => Stdio::from(writer.try_clone()?),
        })
    }
}

/// Streams of the invocation itself. `None` means the caller's own stream.
#[derive(Debug, Default)]
struct BaseStdio {
    stdin: Option<PipeReader>,
    stdout: Option<PipeWriter>,
    stderr: Option<PipeWriter>,
}

/// Evaluation state of one invocation.
///
/// Holds the stdin/stdout overrides for the next spawned command and whether
/// it runs in the background. Overrides are saved and restored around every
/// redirection and pipeline stage, so they always reflect the node being
/// evaluated. Each invocation owns its context; nothing is shared between
/// concurrent calls.
pub struct EvalContext<'cfg> {
    pub(crate) config: &'cfg ShellConfig,
    pub(crate) stdin: Option<Rc<Endpoint>>,
    pub(crate) stdout: Option<Rc<Endpoint>>,
    pub(crate) background: bool,
    base: BaseStdio,
}

impl<'cfg> EvalContext<'cfg> {
    /// Children inherit the caller's stdin, stdout and stderr.
    pub fn inherited(config: &'cfg ShellConfig) -> Self {
        Self {
            config,
            stdin: None,
            stdout: None,
            background: false,
            base: BaseStdio::default(),
        }
    }

    /// Children default to the given pipe ends; used by capture mode.
    pub(crate) fn captured(
        config: &'cfg ShellConfig,
        stdin: PipeReader,
        stdout: PipeWriter,
        stderr: PipeWriter,
    ) -> Self {
        Self {
            config,
            stdin: None,
            stdout: None,
            background: false,
            base: BaseStdio {
                stdin: Some(stdin),
                stdout: Some(stdout),
                stderr: Some(stderr),
            },
        }
    }

    pub fn is_background(&self) -> bool {
        self.background
    }

    pub(crate) fn stdin_for_child(&self) -> io::Result<Stdio> {
        if let Some(endpoint) = &self.stdin {
            return endpoint.stdio();
        }
        if self.background && self.config.background.null_stdin {
            return Ok(Stdio::null());
        }
        match &self.base.stdin {
            Some(reader) => Ok(Stdio::from(reader.try_clone()?)),
            None => Ok(Stdio::inherit()),
        }
    }

    pub(crate) fn stdout_for_child(&self) -> io::Result<Stdio> {
        if let Some(endpoint) = &self.stdout {
            return endpoint.stdio();
        }
        match &self.base.stdout {
            Some(writer) => Ok(Stdio::from(writer.try_clone()?)),
            None => Ok(Stdio::inherit()),
        }
    }

    pub(crate) fn stderr_for_child(&self) -> io::Result<Stdio> {
        match &self.base.stderr {
            Some(writer) => Ok(Stdio::from(writer.try_clone()?)),
            None => Ok(Stdio::inherit()),
        }
    }

    /// Write a shell diagnostic to the invocation's stderr.
    /// Best-effort: a failed write is dropped.
    pub(crate) fn diagnostic(&self, message: fmt::Arguments<'_>) {
        let line = format!("{}: {message}\n", self.config.settings.diagnostic_prefix);
        let _ = match &self.base.stderr {
            Some(writer) => writer
                .try_clone()
                .and_then(|mut w| w.write_all(line.as_bytes())),
            None => io::stderr().write_all(line.as_bytes()),
        };
    }
}
