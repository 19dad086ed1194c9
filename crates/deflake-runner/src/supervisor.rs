//! Child process supervision for wrapper mode
//!
//! The wrapped command inherits stdin. Its stdout and stderr are piped, echoed
//! live to the matching parent stream and appended to one buffer in the order
//! chunks arrive. A single consumer owns the buffer, so no locking is needed.

use deflake_core::{ChildProcessOutcome, DeflakeError, Result};
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};

const READ_CHUNK: usize = 8192;

#[derive(Debug)]
enum Chunk {
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
}

/// Runs a command to completion while capturing its combined output
#[derive(Debug, Clone)]
pub struct ProcessSupervisor {
    working_dir: Option<PathBuf>,
    mirror: bool,
}

impl Default for ProcessSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessSupervisor {
    pub fn new() -> Self {
        Self {
            working_dir: None,
            mirror: true,
        }
    }

    /// Run the child in `dir` instead of the current directory
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Toggle live echo to the parent's stdout/stderr
    pub fn with_mirroring(mut self, mirror: bool) -> Self {
        self.mirror = mirror;
        self
    }

    /// Spawn `program args...` and wait for it to exit
    ///
    /// Blocks until the child exits and both pipes reach EOF. There is no
    /// timeout. Once spawned, the child's exit code is always returned, even
    /// if the parent's own stdout or stderr goes away mid-run.
    #[instrument(skip(self, args), fields(args = args.len()))]
    pub async fn run(&self, program: &str, args: &[String]) -> Result<ChildProcessOutcome> {
        let stdout = Mirror::new(tokio::io::stdout(), "stdout", self.mirror);
        let stderr = Mirror::new(tokio::io::stderr(), "stderr", self.mirror);
        self.run_mirrored(program, args, stdout, stderr).await
    }

    async fn run_mirrored<O, E>(
        &self,
        program: &str,
        args: &[String],
        stdout: Mirror<O>,
        stderr: Mirror<E>,
    ) -> Result<ChildProcessOutcome>
    where
        O: AsyncWrite + Unpin,
        E: AsyncWrite + Unpin,
    {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| DeflakeError::Spawn {
            command: display_command(program, args),
            reason: e.to_string(),
        })?;
        debug!("Spawned child pid={:?}", child.id());

        let (tx, rx) = mpsc::unbounded_channel();
        let stdout_task = child
            .stdout
            .take()
            .map(|pipe| tokio::spawn(pump(pipe, tx.clone(), Chunk::Stdout)));
        let stderr_task = child
            .stderr
            .take()
            .map(|pipe| tokio::spawn(pump(pipe, tx.clone(), Chunk::Stderr)));
        drop(tx);

        let buffer = collect(rx, stdout, stderr).await;

        for task in [stdout_task, stderr_task].into_iter().flatten() {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Failed reading child output: {}", e),
                Err(e) => warn!("Output reader task failed: {}", e),
            }
        }

        let status = child.wait().await?;
        let exit_code = exit_code(status);
        debug!("Child exited with {} ({} bytes captured)", exit_code, buffer.len());

        Ok(ChildProcessOutcome {
            exit_code,
            output: String::from_utf8_lossy(&buffer).into_owned(),
        })
    }
}

/// Live echo of one child stream
///
/// A failed write (closed pipe, full disk) disables the echo for the rest of
/// the run; capture continues regardless.
struct Mirror<W> {
    writer: Option<W>,
    stream: &'static str,
}

impl<W: AsyncWrite + Unpin> Mirror<W> {
    fn new(writer: W, stream: &'static str, enabled: bool) -> Self {
        Self {
            writer: enabled.then_some(writer),
            stream,
        }
    }

    async fn echo(&mut self, bytes: &[u8]) {
        let Some(writer) = self.writer.as_mut() else {
            return;
        };
        let written = match writer.write_all(bytes).await {
            Ok(()) => writer.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            warn!("Stopped echoing child {}: {}", self.stream, e);
            self.writer = None;
        }
    }
}

/// Drain the channel until both pipes close, echoing and buffering each chunk
async fn collect<O, E>(
    mut rx: mpsc::UnboundedReceiver<Chunk>,
    mut stdout: Mirror<O>,
    mut stderr: Mirror<E>,
) -> Vec<u8>
where
    O: AsyncWrite + Unpin,
    E: AsyncWrite + Unpin,
{
    let mut buffer = Vec::new();
    while let Some(chunk) = rx.recv().await {
        match chunk {
            Chunk::Stdout(bytes) => {
                stdout.echo(&bytes).await;
                buffer.extend_from_slice(&bytes);
            }
            Chunk::Stderr(bytes) => {
                stderr.echo(&bytes).await;
                buffer.extend_from_slice(&bytes);
            }
        }
    }
    buffer
}

async fn pump<R>(
    mut reader: R,
    tx: mpsc::UnboundedSender<Chunk>,
    wrap: fn(Vec<u8>) -> Chunk,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        if tx.send(wrap(buf[..n].to_vec())).is_err() {
            return Ok(());
        }
    }
}

/// Exit code as a shell would report it
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}

fn display_command(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}
