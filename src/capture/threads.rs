//! Thread-per-stream multiplexer for platforms without `poll`.

use std::io::{self, ErrorKind, PipeReader, PipeWriter, Read, Write};
use std::sync::mpsc::{self, Sender};
use std::thread;

use super::Sink;

enum Chunk {
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
}

/// Feed `input` from one thread and read each output pipe on its own thread.
/// Chunks are delivered to the sinks on the calling thread, in arrival order.
pub(super) fn multiplex<'s>(
    input: &[u8],
    stdin: PipeWriter,
    stdout: PipeReader,
    stderr: PipeReader,
    out: &mut Sink<'s>,
    err: &mut Sink<'s>,
    chunk_size: usize,
) -> io::Result<()> {
    let (tx, rx) = mpsc::channel();
    let chunk_size = chunk_size.max(1);

    thread::scope(|scope| {
        thread::Builder::new()
            .name("minish-stdin".into())
            .spawn_scoped(scope, move || {
                let mut stdin = stdin;
                if let Err(e) = stdin.write_all(input) {
                    log::debug!("capture: stdin closed early: {e}");
                }
            })?;
        let tx_err = tx.clone();
        thread::Builder::new()
            .name("minish-stdout".into())
            .spawn_scoped(scope, move || pump(stdout, chunk_size, &tx, Chunk::Stdout))?;
        thread::Builder::new()
            .name("minish-stderr".into())
            .spawn_scoped(scope, move || pump(stderr, chunk_size, &tx_err, Chunk::Stderr))?;

        for chunk in rx {
            match chunk {
                Chunk::Stdout(bytes) => out.write(&bytes),
                Chunk::Stderr(bytes) => err.write(&bytes),
            }
        }
        Ok(())
    })
}

fn pump(mut reader: PipeReader, chunk_size: usize, tx: &Sender<Chunk>, wrap: fn(Vec<u8>) -> Chunk) {
    let mut buf = vec![0; chunk_size];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if tx.send(wrap(buf[..n].to_vec())).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                log::warn!("capture: read failed: {e}");
                break;
            }
        }
    }
}
