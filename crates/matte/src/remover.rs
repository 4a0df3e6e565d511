//! Background-removal collaborator.
//!
//! The gateway treats removal as an opaque image-to-image transform: encoded
//! raster in, PNG with the background removed out. Implementations are
//! blocking and CPU-heavy, so the gateway always calls them through
//! [`remove_background`], which moves the work onto the blocking pool.

use std::io::{Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use thiserror::Error;

/// How often a time-limited child is checked for exit.
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// The first eight bytes of every PNG file.
pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Errors raised by a removal collaborator.
#[derive(Debug, Error)]
pub enum RemovalError {
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("remover killed after running for {0:?}")]
    TimedOut(Duration),

    #[error("remover exited with {status}: {stderr}")]
    Failed { status: ExitStatus, stderr: String },

    #[error("remover returned an empty result")]
    EmptyOutput,

    #[error("remover returned data that is not a PNG image")]
    NotPng,

    #[error("removal task aborted: {0}")]
    Aborted(String),

    /// Free-form failure from a custom implementation.
    #[error("{0}")]
    Other(String),
}

/// An image-to-image background remover.
pub trait BackgroundRemover: Send + Sync + 'static {
    /// Remove the background from an encoded image, returning PNG bytes.
    fn remove(&self, image: &[u8]) -> Result<Vec<u8>, RemovalError>;
}

/// Runs an external program that reads an image on stdin and writes the
/// cut-out PNG to stdout (for example `rembg i - -`).
#[derive(Debug, Clone)]
pub struct CommandRemover {
    program: String,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl CommandRemover {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: None,
        }
    }

    /// Kill the program if it runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Split a whitespace-separated command line. Returns `None` if empty.
    pub fn from_command_line(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace().map(str::to_owned);
        let program = parts.next()?;
        Some(Self::new(program, parts.collect()))
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl CommandRemover {
    /// Wait for the child, killing it once the deadline passes.
    fn wait(&self, child: &mut Child) -> Result<ExitStatus, RemovalError> {
        let Some(timeout) = self.timeout else {
            return Ok(child.wait()?);
        };
        let deadline = Instant::now() + timeout;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) => {}
                Err(e) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(e.into());
                }
            }
            if Instant::now() >= deadline {
                // kill fails only if the child already exited; wait reaps it either way.
                let _ = child.kill();
                child.wait()?;
                return Err(RemovalError::TimedOut(timeout));
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

fn read_all(mut pipe: impl Read) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    pipe.read_to_end(&mut buf)?;
    Ok(buf)
}

fn take_pipe<T>(pipe: Option<T>, name: &str) -> Result<T, RemovalError> {
    pipe.ok_or_else(|| RemovalError::Aborted(format!("child {} unavailable", name)))
}

impl BackgroundRemover for CommandRemover {
    fn remove(&self, image: &[u8]) -> Result<Vec<u8>, RemovalError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| RemovalError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let stdin = take_pipe(child.stdin.take(), "stdin");
        let stdout = take_pipe(child.stdout.take(), "stdout");
        let stderr = take_pipe(child.stderr.take(), "stderr");
        let (mut stdin, stdout, stderr) = match (stdin, stdout, stderr) {
            (Ok(stdin), Ok(stdout), Ok(stderr)) => (stdin, stdout, stderr),
            (Err(e), ..) | (_, Err(e), _) | (.., Err(e)) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(e);
            }
        };

        // Every pipe gets its own thread so a child that writes before it has
        // read all of stdin cannot deadlock against us. Killing the child
        // closes the pipes, which unblocks all three.
        let (status, write_result, stdout, stderr) = std::thread::scope(|scope| {
            let writer = scope.spawn(move || stdin.write_all(image));
            let out_reader = scope.spawn(move || read_all(stdout));
            let err_reader = scope.spawn(move || read_all(stderr));
            let status = self.wait(&mut child);
            (
                status,
                writer.join(),
                out_reader.join(),
                err_reader.join(),
            )
        });
        let status = status?;
        let joined = |name: &str| RemovalError::Aborted(format!("{} thread panicked", name));
        let stderr = stderr.map_err(|_| joined("stderr reader"))??;

        if !status.success() {
            return Err(RemovalError::Failed {
                status,
                stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
            });
        }

        write_result.map_err(|_| joined("stdin writer"))??;
        let stdout = stdout.map_err(|_| joined("stdout reader"))??;
        Ok(stdout)
    }
}

/// Check that collaborator output is usable as a PNG result.
pub fn ensure_png(data: &[u8]) -> Result<(), RemovalError> {
    if data.is_empty() {
        return Err(RemovalError::EmptyOutput);
    }
    if !data.starts_with(&PNG_SIGNATURE) {
        return Err(RemovalError::NotPng);
    }
    Ok(())
}

/// Invoke the collaborator without blocking the async executor.
///
/// Called exactly once per image; failures are never retried.
pub async fn remove_background(
    remover: Arc<dyn BackgroundRemover>,
    image: Bytes,
) -> Result<Vec<u8>, RemovalError> {
    let output = tokio::task::spawn_blocking(move || remover.remove(&image))
        .await
        .map_err(|e| RemovalError::Aborted(e.to_string()))??;
    ensure_png(&output)?;
    Ok(output)
}
