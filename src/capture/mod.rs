//! Capture mode: run a whole command line with its stdin fed from memory and
//! its stdout/stderr collected into buffers or streamed to callbacks.
//!
//! The command line is evaluated by a supervisor thread whose base stdio are
//! three OS pipes. Every process the line spawns (every pipeline stage,
//! background jobs included) inherits those pipes unless redirected, so the
//! caller only ever multiplexes three streams, however many processes run.

#[cfg(unix)]
mod poll;
#[cfg(any(not(unix), test))]
mod threads;

#[cfg(unix)]
use poll::multiplex;
#[cfg(not(unix))]
use threads::multiplex;

use std::borrow::Cow;
use std::fmt;
use std::io;
use std::thread;

use crate::config::ShellConfig;
use crate::error::ShellError;
use crate::eval::EvalContext;
use crate::parse::Node;

/// Destination of one captured output stream.
pub enum Sink<'a> {
    /// Collect everything into a buffer.
    Buffer(Vec<u8>),
    /// Hand every chunk to a callback as it arrives; nothing is buffered.
    Stream(Box<dyn FnMut(&[u8]) + 'a>),
}

impl Sink<'_> {
    /// Buffered bytes; always empty for a stream.
    pub fn buffered(&self) -> &[u8] {
        match self {
            Sink::Buffer(buf) => buf,
            Sink::Stream(_) => &[],
        }
    }

    pub(crate) fn write(&mut self, chunk: &[u8]) {
        match self {
            Sink::Buffer(buf) => buf.extend_from_slice(chunk),
            Sink::Stream(callback) => callback(chunk),
        }
    }

    fn reset(&mut self) {
        if let Sink::Buffer(buf) = self {
            buf.clear();
        }
    }
}

impl Default for Sink<'_> {
    fn default() -> Self {
        Sink::Buffer(Vec::new())
    }
}

impl fmt::Debug for Sink<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sink::Buffer(buf) => f.debug_tuple("Buffer").field(&buf.len()).finish(),
            Sink::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Capture configuration and results for one [`run`](crate::run).
///
/// ```no_run
/// let mut io = minish::ShellIo::new().with_input("b\na\n");
/// assert_eq!(minish::run("sort", Some(&mut io)), 0);
/// assert_eq!(io.stdout(), b"a\nb\n");
/// ```
///
/// Buffers are cleared at the start of every run. The closure given to
/// [`on_stdout`](ShellIo::on_stdout) or [`on_stderr`](ShellIo::on_stderr)
/// replaces that stream's buffer and is called on the caller's thread.
#[derive(Debug, Default)]
pub struct ShellIo<'a> {
    input: Cow<'a, [u8]>,
    stdout: Sink<'a>,
    stderr: Sink<'a>,
}

impl<'a> ShellIo<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes written to the command's stdin before it is closed.
    pub fn with_input<T: AsRef<[u8]> + ?Sized>(mut self, input: &'a T) -> Self {
        self.input = Cow::Borrowed(input.as_ref());
        self
    }

    pub fn with_owned_input(mut self, input: Vec<u8>) -> Self {
        self.input = Cow::Owned(input);
        self
    }

    pub fn on_stdout(mut self, callback: impl FnMut(&[u8]) + 'a) -> Self {
        self.stdout = Sink::Stream(Box::new(callback));
        self
    }

    pub fn on_stderr(mut self, callback: impl FnMut(&[u8]) + 'a) -> Self {
        self.stderr = Sink::Stream(Box::new(callback));
        self
    }

    pub fn input(&self) -> &[u8] {
        &self.input
    }

    /// Captured stdout; empty when stdout is streamed.
    pub fn stdout(&self) -> &[u8] {
        self.stdout.buffered()
    }

    /// Captured stderr; empty when stderr is streamed.
    pub fn stderr(&self) -> &[u8] {
        self.stderr.buffered()
    }

    pub fn stdout_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.stdout())
    }

    pub fn stderr_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.stderr())
    }

    /// Clear both buffers. Done at the start of every run.
    pub(crate) fn reset(&mut self) {
        self.stdout.reset();
        self.stderr.reset();
    }

    /// Move the captured stdout out, leaving an empty buffer.
    pub fn take_stdout(&mut self) -> Vec<u8> {
        match &mut self.stdout {
            Sink::Buffer(buf) => std::mem::take(buf),
            Sink::Stream(_) => Vec::new(),
        }
    }

    /// Move the captured stderr out, leaving an empty buffer.
    pub fn take_stderr(&mut self) -> Vec<u8> {
        match &mut self.stderr {
            Sink::Buffer(buf) => std::mem::take(buf),
            Sink::Stream(_) => Vec::new(),
        }
    }
}

/// Evaluate `node` on a supervisor thread wired to three pipes while this
/// thread feeds stdin and drains stdout/stderr into `io`.
///
/// Returns once both output pipes reach EOF (every process holding them
/// has exited) and the supervisor has finished. Output is appended to
/// whatever the sinks already hold; see [`ShellIo::reset`].
pub(crate) fn run_captured(
    config: &ShellConfig,
    node: &Node<'_>,
    io: &mut ShellIo<'_>,
) -> Result<i32, ShellError> {
    let (stdin_reader, stdin_writer) = io::pipe().map_err(ShellError::Pipe)?;
    let (stdout_reader, stdout_writer) = io::pipe().map_err(ShellError::Pipe)?;
    let (stderr_reader, stderr_writer) = io::pipe().map_err(ShellError::Pipe)?;

    thread::scope(|scope| {
        let supervisor = thread::Builder::new()
            .name("minish-supervisor".into())
            .spawn_scoped(scope, move || {
                let mut ctx =
                    EvalContext::captured(config, stdin_reader, stdout_writer, stderr_writer);
                ctx.evaluate(node)
            })
            .map_err(ShellError::Fork)?;

        let ShellIo {
            input,
            stdout,
            stderr,
        } = io;
        let drained = multiplex(
            input,
            stdin_writer,
            stdout_reader,
            stderr_reader,
            stdout,
            stderr,
            config.capture.chunk_size,
        );

        let status = supervisor
            .join()
            .map_err(|_| ShellError::Generic("supervisor thread panicked".into()))??;
        drained?;
        Ok(status)
    })
}
