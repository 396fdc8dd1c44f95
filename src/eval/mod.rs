pub mod context;
pub(crate) mod process;

pub use context::EvalContext;

use std::io;
use std::mem;
use std::process::{Child, ExitStatus};
use std::rc::Rc;

use crate::error::{ErrorCode, ShellError};
use crate::parse::{Direction, Node, Word};
use context::Endpoint;

/// Outcome of one pipeline stage.
enum Stage {
    Running { child: Child, label: String },
    Finished(i32),
}

/// Every stage launched for one pipeline, in order.
#[derive(Default)]
struct Jobs {
    stages: Vec<Stage>,
}

impl Jobs {
    fn running(&mut self, child: Child, label: String) {
        self.stages.push(Stage::Running { child, label });
    }

    fn finished(&mut self, status: i32) {
        self.stages.push(Stage::Finished(status));
    }

    /// Wait for every stage; the pipeline's status is the last stage's.
    fn wait(self) -> Result<i32, ShellError> {
        let mut status = 0;
        let mut failure = None;
        for stage in self.stages {
            status = match stage {
                Stage::Running { mut child, label } => {
                    let pid = child.id();
                    stage_status(child.wait(), &mut failure, pid, &label)
                }
                Stage::Finished(code) => code,
            };
        }
        match failure {
            Some(e) => Err(ShellError::Io(e)),
            None => Ok(status),
        }
    }

    fn detach(self) {
        for stage in self.stages {
            if let Stage::Running { child, label } = stage {
                process::reap_in_background(child, label);
            }
        }
    }

    /// Kill and reap whatever already started. Used when a later stage
    /// fails to launch.
    fn abort(self) {
        for stage in self.stages {
            if let Stage::Running { mut child, label } = stage {
                log::debug!("[{}] {label}: killed after pipeline failure", child.id());
                let _ = child.kill();
                let _ = child.wait();
            }
        }
    }
}

/// Status of one waited-for stage. A failed wait counts as a generic
/// failure for that stage; the first such error is kept in `failure`.
fn stage_status(
    waited: io::Result<ExitStatus>,
    failure: &mut Option<io::Error>,
    pid: u32,
    label: &str,
) -> i32 {
    match waited {
        Ok(exit) => {
            let code = process::exit_code(exit);
            log::debug!("[{pid}] {label}: exit {code}");
            code
        }
        Err(e) => {
            log::warn!("[{pid}] {label}: wait failed: {e}");
            failure.get_or_insert(e);
            ErrorCode::Generic as i32
        }
    }
}

impl EvalContext<'_> {
    /// Run a parsed command line to completion and return its exit status.
    ///
    /// Background jobs are started and left running. The first fatal error
    /// (pipe, fork or exec failure) stops evaluation and is returned.
    pub fn evaluate(&mut self, node: &Node<'_>) -> Result<i32, ShellError> {
        match node {
            Node::Sequence(first, rest) => {
                let status = self.evaluate(first)?;
                match rest {
                    Some(rest) => self.evaluate(rest),
                    None => Ok(status),
                }
            }
            Node::Background(job, rest) => {
                let saved = mem::replace(&mut self.background, true);
                let launched = self.evaluate(job);
                self.background = saved;
                launched?;
                match rest {
                    Some(rest) => self.evaluate(rest),
                    None => Ok(0),
                }
            }
            _ => self.run_pipeline(node),
        }
    }

    /// Launch every stage, then wait for all of them (or hand them to the
    /// reaper in the background).
    fn run_pipeline(&mut self, node: &Node<'_>) -> Result<i32, ShellError> {
        let mut jobs = Jobs::default();
        if let Err(err) = self.launch(node, &mut jobs) {
            jobs.abort();
            return Err(err);
        }
        if self.background {
            jobs.detach();
            return Ok(0);
        }
        jobs.wait()
    }

    fn launch(&mut self, node: &Node<'_>, jobs: &mut Jobs) -> Result<(), ShellError> {
        match node {
            Node::Command(words) => self.launch_command(words, jobs),
            Node::Redirect {
                direction,
                target,
                inner,
            } => self.launch_redirected(*direction, target, inner, jobs),
            Node::Pipeline(..) => {
                let outer_in = self.stdin.clone();
                let outer_out = self.stdout.clone();
                let launched = self.launch_stages(node, outer_out.clone(), jobs);
                self.stdin = outer_in;
                self.stdout = outer_out;
                launched
            }
            // Not produced by the parser inside a pipeline, but a nested
            // list simply runs to completion as one stage.
            Node::Sequence(..) | Node::Background(..) => {
                let status = self.evaluate(node)?;
                jobs.finished(status);
                Ok(())
            }
        }
    }

    fn launch_command(&mut self, words: &[Word<'_>], jobs: &mut Jobs) -> Result<(), ShellError> {
        let child = process::spawn(self, words)?;
        jobs.running(child, process::render_argv(words));
        Ok(())
    }

    /// Stages are started left to right. Our copy of each write end is
    /// dropped as soon as its writer is spawned, and each read end as soon
    /// as its reader is spawned, so only the children hold pipe ends.
    fn launch_stages(
        &mut self,
        mut node: &Node<'_>,
        last_out: Option<Rc<Endpoint>>,
        jobs: &mut Jobs,
    ) -> Result<(), ShellError> {
        log::trace!("pipeline of {} stages", node.stage_count());
        while let Node::Pipeline(stage, rest) = node {
            let (reader, writer) = io::pipe().map_err(ShellError::Pipe)?;
            log::trace!("pipe after stage {}", jobs.stages.len() + 1);
            self.stdout = Some(Rc::new(Endpoint::Writer(writer)));
            self.launch(stage, jobs)?;
            self.stdout = None;
            self.stdin = Some(Rc::new(Endpoint::Reader(reader)));
            node = rest.as_ref();
        }
        self.stdout = last_out;
        self.launch(node, jobs)
    }

    fn launch_redirected(
        &mut self,
        direction: Direction,
        target: &Word<'_>,
        inner: &Node<'_>,
        jobs: &mut Jobs,
    ) -> Result<(), ShellError> {
        let file = match process::open_target(direction, target.as_str(), &self.config.redirect) {
            Ok(file) => file,
            Err(err) => {
                log::warn!("cannot open {}: {err}", target.as_str());
                self.diagnostic(format_args!("{}: {err}", target.as_str()));
                jobs.finished(1);
                return Ok(());
            }
        };

        let endpoint = Some(Rc::new(Endpoint::File(file)));
        let saved = match direction {
            Direction::In => mem::replace(&mut self.stdin, endpoint),
            Direction::Out => mem::replace(&mut self.stdout, endpoint),
        };
        let launched = self.launch(inner, jobs);
        match direction {
            Direction::In => self.stdin = saved,
            Direction::Out => self.stdout = saved,
        }
        launched
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::ShellConfig;
    use crate::parse::parse_command;
    use std::time::{Duration, Instant};

    fn status(command: &str) -> Result<i32, ShellError> {
        let config = ShellConfig::default_config();
        let node = parse_command(command)?;
        EvalContext::inherited(&config).evaluate(&node)
    }

    #[test]
    fn failed_wait_counts_as_generic_status() {
        use std::os::unix::process::ExitStatusExt;
        let mut failure = None;
        assert_eq!(stage_status(Ok(ExitStatus::from_raw(0)), &mut failure, 1, "true"), 0);
        assert_eq!(
            stage_status(Err(io::Error::other("first")), &mut failure, 2, "cat"),
            ErrorCode::Generic as i32
        );
        assert_eq!(
            stage_status(Err(io::Error::other("second")), &mut failure, 3, "sort"),
            ErrorCode::Generic as i32
        );
        assert_eq!(failure.map(|e| e.to_string()).as_deref(), Some("first"));
    }

    #[test]
    fn exit_status_of_simple_commands() {
        assert_eq!(status("true").unwrap(), 0);
        assert_eq!(status("false").unwrap(), 1);
        assert_eq!(status("sh -c 'exit 7'").unwrap(), 7);
    }

    #[test]
    fn sequence_reports_last_status() {
        assert_eq!(status("false ; true").unwrap(), 0);
        assert_eq!(status("true ; false").unwrap(), 1);
        assert_eq!(status("false ;").unwrap(), 1);
    }

    #[test]
    fn pipeline_reports_last_stage() {
        assert_eq!(status("false | true").unwrap(), 0);
        assert_eq!(status("true | false").unwrap(), 1);
    }

    #[test]
    fn signal_status() {
        assert_eq!(status("sh -c 'kill -9 $$'").unwrap(), 137);
    }

    #[test]
    fn background_flag_is_restored() {
        let config = ShellConfig::default_config();
        let node = parse_command("true & true").unwrap();
        let mut ctx = EvalContext::inherited(&config);
        assert_eq!(ctx.evaluate(&node).unwrap(), 0);
        assert!(!ctx.is_background());
        assert!(ctx.stdin.is_none() && ctx.stdout.is_none());
    }

    #[test]
    fn background_does_not_block() {
        let started = Instant::now();
        assert_eq!(status("sleep 3 &").unwrap(), 0);
        assert_eq!(status("sleep 3 & false").unwrap(), 1);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn missing_program_is_exec_error() {
        let err = status("minish-test-no-such-program --flag").unwrap_err();
        assert!(matches!(err, ShellError::Exec { ref program, .. } if program == "minish-test-no-such-program"));
    }

    #[test]
    fn exec_error_aborts_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("marker");
        let command = format!("minish-test-no-such-program ; touch {}", marker.display());
        assert!(status(&command).is_err());
        assert!(!marker.exists());
    }

    #[test]
    fn failed_stage_kills_earlier_stages() {
        let started = Instant::now();
        let err = status("sleep 5 | minish-test-no-such-program").unwrap_err();
        assert!(matches!(err, ShellError::Exec { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn missing_redirect_source_is_status_one() {
        assert_eq!(status("cat < /nonexistent/minish/input").unwrap(), 1);
        assert_eq!(status("cat < /nonexistent/minish/input ; true").unwrap(), 0);
    }

    #[test]
    fn redirect_restores_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");
        let config = ShellConfig::default_config();
        let command = format!("echo hi > {}", out.display());
        let node = parse_command(&command).unwrap();
        let mut ctx = EvalContext::inherited(&config);
        assert_eq!(ctx.evaluate(&node).unwrap(), 0);
        assert!(ctx.stdout.is_none());
        assert_eq!(std::fs::read_to_string(out).unwrap(), "hi\n");
    }

    #[test]
    fn pipeline_into_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.txt");
        let out = dir.path().join("out.txt");
        std::fs::write(&input, "b\nc\na\n").unwrap();
        let command = format!("sort < {} | head -n 2 > {}", input.display(), out.display());
        assert_eq!(status(&command).unwrap(), 0);
        assert_eq!(std::fs::read_to_string(out).unwrap(), "a\nb\n");
    }

    #[test]
    fn large_pipeline_does_not_deadlock() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");
        let command = format!("seq 1 200000 | tail -n 1 > {}", out.display());
        assert_eq!(status(&command).unwrap(), 0);
        assert_eq!(std::fs::read_to_string(out).unwrap(), "200000\n");
    }

    #[test]
    fn write_ends_are_closed() {
        // `yes` only stops once `head` exits and the last read end closes.
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");
        let command = format!("yes | head -n 3 > {}", out.display());
        assert_eq!(status(&command).unwrap(), 0);
        assert_eq!(std::fs::read_to_string(out).unwrap(), "y\ny\ny\n");
    }
}
