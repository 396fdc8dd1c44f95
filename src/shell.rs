use std::sync::OnceLock;

use crate::capture::{self, ShellIo};
use crate::config::ShellConfig;
use crate::error::ShellError;
use crate::eval::EvalContext;
use crate::parse::{parse, tokenize};

/// A configured shell. Cheap to share: every invocation gets its own
/// [`EvalContext`], so concurrent calls never see each other's state.
#[derive(Debug, Clone, Default)]
pub struct Shell {
    config: ShellConfig,
}

impl Shell {
    pub fn new(config: ShellConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ShellConfig {
        &self.config
    }

    /// Run `command` and return its exit status or the typed error.
    ///
    /// With `io`, the command's stdin is fed from [`ShellIo`] and its
    /// stdout/stderr are captured; otherwise children use the caller's own
    /// stdio. Syntax errors are reported before anything is spawned.
    pub fn execute(
        &self,
        command: &str,
        mut io: Option<&mut ShellIo<'_>>,
    ) -> Result<i32, ShellError> {
        if let Some(io) = io.as_deref_mut() {
            io.reset();
        }

        let tokens = tokenize(command)?;
        let node = parse(&tokens, command.len())?;
        log::trace!("parsed: {node}");

        let status = match io {
            Some(io) => capture::run_captured(&self.config, &node, io)?,
            None => EvalContext::inherited(&self.config).evaluate(&node)?,
        };
        log::info!("{command:?}: exit {status}");
        Ok(status)
    }

    /// Integer contract: the exit status, or a negative
    /// [`ErrorCode`](crate::ErrorCode) when the command could not run.
    pub fn run(&self, command: &str, io: Option<&mut ShellIo<'_>>) -> i32 {
        match self.execute(command, io) {
            Ok(status) => status,
            Err(err) => {
                log::warn!("{command:?}: {err}");
                err.code().into()
            }
        }
    }
}

/// Shell over the embedded default configuration, built on first use.
pub(crate) fn default_shell() -> &'static Shell {
    static SHELL: OnceLock<Shell> = OnceLock::new();
    SHELL.get_or_init(|| Shell::new(ShellConfig::default_config()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn syntax_errors_are_reported_before_spawning() {
        let shell = Shell::default();
        assert_eq!(shell.run("echo 'open", None), ErrorCode::Tokenize as i32);
        assert_eq!(shell.run("", None), ErrorCode::Eval as i32);
        assert_eq!(shell.run("| cat", None), ErrorCode::Eval as i32);
    }

    #[cfg(unix)]
    #[test]
    fn syntax_error_still_resets_buffers() {
        let shell = Shell::default();
        let mut io = ShellIo::new();
        assert_eq!(shell.execute("echo stale", Some(&mut io)).unwrap(), 0);
        assert_eq!(io.stdout(), b"stale\n");
        assert!(shell.execute("'", Some(&mut io)).is_err());
        assert!(io.stdout().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn captured_run() {
        let shell = Shell::default();
        let mut io = ShellIo::new().with_input("z\ny\n");
        assert_eq!(shell.execute("sort", Some(&mut io)).unwrap(), 0);
        assert_eq!(io.stdout(), b"y\nz\n");
    }

    #[test]
    fn default_shell_is_shared() {
        assert!(std::ptr::eq(default_shell(), default_shell()));
    }
}
