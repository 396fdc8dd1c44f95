//! Single-threaded multiplexer over the three capture pipes.

use std::io::{self, ErrorKind, PipeReader, PipeWriter, Read, Write};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd};

use nix::errno::Errno;
use nix::fcntl::{FcntlArg, OFlag, fcntl};
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};

use super::Sink;

fn set_nonblocking(fd: BorrowedFd<'_>) -> io::Result<()> {
    let flags = fcntl(fd.as_raw_fd(), FcntlArg::F_GETFL)?;
    let mut flags = OFlag::from_bits_truncate(flags);
    flags.insert(OFlag::O_NONBLOCK);
    fcntl(fd.as_raw_fd(), FcntlArg::F_SETFL(flags))?;
    Ok(())
}

/// Which pipe a poll entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdin,
    Stdout,
    Stderr,
}

/// Feed `input` to the command's stdin and drain its stdout/stderr into the
/// sinks until both output pipes report EOF.
///
/// stdin is closed as soon as the input is written, or immediately when
/// there is none, so readers like `cat` see EOF.
pub(super) fn multiplex<'s>(
    input: &[u8],
    stdin: PipeWriter,
    stdout: PipeReader,
    stderr: PipeReader,
    out: &mut Sink<'s>,
    err: &mut Sink<'s>,
    chunk_size: usize,
) -> io::Result<()> {
    let mut stdin = (!input.is_empty()).then_some(stdin);
    let mut stdout = Some(stdout);
    let mut stderr = Some(stderr);

    if let Some(writer) = &stdin {
        set_nonblocking(writer.as_fd())?;
    }
    for reader in [&stdout, &stderr].into_iter().flatten() {
        set_nonblocking(reader.as_fd())?;
    }

    let mut written = 0;
    let mut buf = vec![0; chunk_size.max(1)];
    while stdout.is_some() || stderr.is_some() {
        let mut fds = Vec::with_capacity(3);
        let mut streams = Vec::with_capacity(3);
        if let Some(writer) = &stdin {
            fds.push(PollFd::new(writer.as_fd(), PollFlags::POLLOUT));
            streams.push(Stream::Stdin);
        }
        for (reader, stream) in [(&stdout, Stream::Stdout), (&stderr, Stream::Stderr)] {
            if let Some(reader) = reader {
                fds.push(PollFd::new(reader.as_fd(), PollFlags::POLLIN));
                streams.push(stream);
            }
        }

        match poll(&mut fds, PollTimeout::NONE) {
            Ok(_) => {}
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(e.into()),
        }
        let ready: Vec<Stream> = fds
            .iter()
            .zip(streams)
            .filter(|(fd, _)| fd.revents().is_some_and(|r| !r.is_empty()))
            .map(|(_, stream)| stream)
            .collect();
        drop(fds);

        for stream in ready {
            match stream {
                Stream::Stdin => {
                    if let Some(writer) = stdin.as_mut() {
                        if !feed(writer, input, &mut written) {
                            stdin = None;
                        }
                    }
                }
                Stream::Stdout => {
                    if let Some(reader) = stdout.as_mut() {
                        if !drain(reader, &mut buf, out) {
                            stdout = None;
                        }
                    }
                }
                Stream::Stderr => {
                    if let Some(reader) = stderr.as_mut() {
                        if !drain(reader, &mut buf, err) {
                            stderr = None;
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

/// Write as much pending input as the pipe accepts. Returns false once the
/// writer should be closed: all input written, or nobody reads it.
fn feed(writer: &mut PipeWriter, input: &[u8], written: &mut usize) -> bool {
    while *written < input.len() {
        match writer.write(&input[*written..]) {
            Ok(0) => return false,
            Ok(n) => *written += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == ErrorKind::WouldBlock => return true,
            Err(e) => {
                log::debug!("capture: stdin closed after {} bytes: {e}", *written);
                return false;
            }
        }
    }
    false
}

/// Read until the pipe would block. Returns false at EOF.
fn drain(reader: &mut PipeReader, buf: &mut [u8], sink: &mut Sink<'_>) -> bool {
    loop {
        match reader.read(buf) {
            Ok(0) => return false,
            Ok(n) => sink.write(&buf[..n]),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == ErrorKind::WouldBlock => return true,
            Err(e) => {
                log::warn!("capture: read failed: {e}");
                return false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn collects_both_streams() {
        let (stdin_r, stdin_w) = io::pipe().unwrap();
        let (out_r, mut out_w) = io::pipe().unwrap();
        let (err_r, mut err_w) = io::pipe().unwrap();

        let writer = thread::spawn(move || {
            let mut stdin_r = stdin_r;
            let mut echoed = Vec::new();
            stdin_r.read_to_end(&mut echoed).unwrap();
            out_w.write_all(&echoed).unwrap();
            err_w.write_all(b"warning\n").unwrap();
        });

        let mut out = Sink::default();
        let mut err = Sink::default();
        multiplex(b"payload", stdin_w, out_r, err_r, &mut out, &mut err, 3).unwrap();
        writer.join().unwrap();

        assert_eq!(out.buffered(), b"payload");
        assert_eq!(err.buffered(), b"warning\n");
    }

    #[test]
    fn large_input_and_output_interleave() {
        // Both directions exceed a pipe buffer, so a writer that blocked on
        // stdin before draining stdout would deadlock.
        let input = vec![b'x'; 1 << 20];
        let (stdin_r, stdin_w) = io::pipe().unwrap();
        let (out_r, out_w) = io::pipe().unwrap();
        let (err_r, err_w) = io::pipe().unwrap();

        let echo = thread::spawn(move || {
            let mut stdin_r = stdin_r;
            let mut out_w = out_w;
            drop(err_w);
            io::copy(&mut stdin_r, &mut out_w).unwrap();
        });

        let mut out = Sink::default();
        let mut err = Sink::default();
        multiplex(&input, stdin_w, out_r, err_r, &mut out, &mut err, 4096).unwrap();
        echo.join().unwrap();

        assert_eq!(out.buffered().len(), input.len());
        assert!(err.buffered().is_empty());
    }

    #[test]
    fn empty_input_closes_stdin() {
        let (mut stdin_r, stdin_w) = io::pipe().unwrap();
        let (out_r, out_w) = io::pipe().unwrap();
        let (err_r, err_w) = io::pipe().unwrap();
        drop((out_w, err_w));

        let mut out = Sink::default();
        let mut err = Sink::default();
        multiplex(b"", stdin_w, out_r, err_r, &mut out, &mut err, 64).unwrap();

        let mut rest = Vec::new();
        stdin_r.read_to_end(&mut rest).unwrap();
        assert!(rest.is_empty());
    }

    #[test]
    fn streams_into_borrowing_callbacks() {
        let (_stdin_r, stdin_w) = io::pipe().unwrap();
        let (out_r, mut out_w) = io::pipe().unwrap();
        let (err_r, mut err_w) = io::pipe().unwrap();
        out_w.write_all(b"out").unwrap();
        err_w.write_all(b"err").unwrap();
        drop((out_w, err_w));

        let mut seen_out = Vec::new();
        let mut seen_err = Vec::new();
        {
            let mut out = Sink::Stream(Box::new(|chunk: &[u8]| seen_out.extend_from_slice(chunk)));
            let mut err = Sink::Stream(Box::new(|chunk: &[u8]| seen_err.extend_from_slice(chunk)));
            multiplex(b"", stdin_w, out_r, err_r, &mut out, &mut err, 16).unwrap();
        }
        assert_eq!(seen_out, b"out");
        assert_eq!(seen_err, b"err");
    }
}
