//! Launching, waiting for and reaping child processes.

use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind};
use std::process::{Child, Command, ExitStatus};
use std::thread;

use super::context::EvalContext;
use crate::config::RedirectConfig;
use crate::error::{ErrorCode, ShellError};
use crate::parse::{Direction, Word};

/// Render argv for logs, quoted so it can be pasted into a shell.
pub(crate) fn render_argv(words: &[Word<'_>]) -> String {
    shlex::try_join(words.iter().map(Word::as_str)).unwrap_or_else(|_| {
        words
            .iter()
            .map(Word::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    })
}

/// Spawn one simple command with the stdio the context currently selects.
/// The child is not waited for.
pub(crate) fn spawn(ctx: &EvalContext<'_>, words: &[Word<'_>]) -> Result<Child, ShellError> {
    let Some((program, args)) = words.split_first() else {
        return Err(ShellError::Generic("empty command".into()));
    };

    let mut command = Command::new(program.as_str());
    command
        .args(args.iter().map(Word::as_str))
        .stdin(ctx.stdin_for_child()?)
        .stdout(ctx.stdout_for_child()?)
        .stderr(ctx.stderr_for_child()?);
    if ctx.is_background() {
        detach(&mut command);
    }

    log::debug!(
        "spawn{}: {}",
        if ctx.is_background() { " (background)" } else { "" },
        render_argv(words)
    );
    command.spawn().map_err(|err| {
        log::warn!("cannot start {}: {err}", program.as_str());
        ctx.diagnostic(format_args!("{}: {err}", program.as_str()));
        if is_exec_failure(&err) {
            ShellError::Exec {
                program: program.as_str().to_string(),
                source: err,
            }
        } else {
            ShellError::Fork(err)
        }
    })
}

/// Errors the loader reports for the program itself, as opposed to the
/// system failing to create a process at all.
fn is_exec_failure(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::NotFound | ErrorKind::PermissionDenied | ErrorKind::InvalidInput
    ) || is_loader_errno(err)
}

#[cfg(unix)]
fn is_loader_errno(err: &io::Error) -> bool {
    use nix::errno::Errno;
    err.raw_os_error().map(Errno::from_raw).is_some_and(|errno| {
        matches!(
            errno,
            Errno::ENOEXEC
                | Errno::E2BIG
                | Errno::ENOTDIR
                | Errno::ELOOP
                | Errno::ENAMETOOLONG
                | Errno::ETXTBSY
        )
    })
}

#[cfg(not(unix))]
fn is_loader_errno(_err: &io::Error) -> bool {
    false
}

/// Put a background child in its own process group so terminal signals
/// aimed at the caller do not reach it.
#[cfg(unix)]
fn detach(command: &mut Command) {
    use std::os::unix::process::CommandExt;
    command.process_group(0);
}

#[cfg(windows)]
fn detach(command: &mut Command) {
    use std::os::windows::process::CommandExt;
    const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
    command.creation_flags(CREATE_NEW_PROCESS_GROUP);
}

#[cfg(not(any(unix, windows)))]
fn detach(_command: &mut Command) {}

/// Exit status as a shell reports it: the exit code, or 128 + signal.
pub(crate) fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| signal_code(status))
        .unwrap_or(ErrorCode::Generic as i32)
}

#[cfg(unix)]
fn signal_code(status: ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal().map(|signal| 128 + signal)
}

#[cfg(not(unix))]
fn signal_code(_status: ExitStatus) -> Option<i32> {
    None
}

/// Wait for a background child on a detached thread so it never lingers
/// as a zombie. Nobody observes its status except the log.
pub(crate) fn reap_in_background(mut child: Child, label: String) {
    let pid = child.id();
    let reaper = thread::Builder::new()
        .name(format!("minish-reap-{pid}"))
        .spawn(move || match child.wait() {
            Ok(status) => log::debug!("background [{pid}] {label}: exit {}", exit_code(status)),
            Err(e) => log::warn!("background [{pid}] {label}: wait failed: {e}"),
        });
    if let Err(e) = reaper {
        log::warn!("cannot start reaper for background process {pid}: {e}");
    }
}

/// Open a redirection target: read-only for `<`, created or truncated for `>`.
pub(crate) fn open_target(
    direction: Direction,
    path: &str,
    config: &RedirectConfig,
) -> io::Result<File> {
    match direction {
        Direction::In => File::open(path),
        Direction::Out => {
            let mut options = OpenOptions::new();
            options.write(true).create(true).truncate(true);
            set_mode(&mut options, config.file_mode);
            options.open(path)
        }
    }
}

#[cfg(unix)]
fn set_mode(options: &mut OpenOptions, mode: u32) {
    use std::os::unix::fs::OpenOptionsExt;
    options.mode(mode);
}

#[cfg(not(unix))]
fn set_mode(_options: &mut OpenOptions, _mode: u32) {}
