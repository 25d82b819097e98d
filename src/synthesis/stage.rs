//! Running a single external conversion tool.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Errors that prevent a stage from running at all.
///
/// A tool that runs and fails is not an error at this level; it is reported
/// through [`ConversionResult`].
#[derive(Debug, Error)]
pub enum StageError {
    #[error("{tool} not found ({program:?}): is it installed and on PATH?")]
    ToolMissing { tool: String, program: PathBuf },

    #[error("IO error while running {tool}: {source}")]
    Io {
        tool: String,
        #[source]
        source: std::io::Error,
    },
}

/// How the external process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageExit {
    /// Process exited on its own with this status code.
    Exited(i32),
    /// Process was terminated by a signal.
    Signaled,
    /// Process exceeded its time budget and was killed.
    TimedOut(Duration),
}

/// Outcome of one stage invocation.
#[derive(Debug, Clone)]
pub struct ConversionResult {
    pub tool: String,
    pub exit: StageExit,
    pub stdout: String,
    pub stderr: String,
    /// Size of the declared output file, only checked after a zero exit status.
    pub output_size: u64,
    pub elapsed: Duration,
}

impl ConversionResult {
    pub fn exit_code(&self) -> Option<i32> {
        match self.exit {
            StageExit::Exited(code) => Some(code),
            _ => None,
        }
    }

    pub fn timed_out(&self) -> bool {
        matches!(self.exit, StageExit::TimedOut(_))
    }

    /// Zero exit status and a non-empty output file.
    pub fn is_success(&self) -> bool {
        self.exit == StageExit::Exited(0) && self.output_size > 0
    }

    /// Human readable reason for a failed run, `None` on success.
    ///
    /// Tool diagnostics come from stderr when present, otherwise from stdout,
    /// since some tools (abc2midi in particular) only report there.
    pub fn failure_detail(&self) -> Option<String> {
        if self.is_success() {
            return None;
        }

        let detail = match self.exit {
            StageExit::TimedOut(limit) => format!("timed out after {}s", limit.as_secs_f32()),
            StageExit::Exited(0) => match self.diagnostics() {
                Some(text) => format!("exited successfully but produced no output: {}", text),
                None => "exited successfully but produced no output".to_string(),
            },
            StageExit::Exited(code) => self
                .diagnostics()
                .map(str::to_string)
                .unwrap_or_else(|| format!("exited with status {}", code)),
            StageExit::Signaled => self
                .diagnostics()
                .map(str::to_string)
                .unwrap_or_else(|| "terminated by signal".to_string()),
        };
        Some(detail)
    }

    fn diagnostics(&self) -> Option<&str> {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return Some(stderr);
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return Some(stdout);
        }
        None
    }
}

/// One external tool invocation with a hard wall-clock limit.
#[derive(Debug, Clone)]
pub struct ConversionStage {
    tool: String,
    program: PathBuf,
    timeout: Duration,
}

impl ConversionStage {
    /// Create a stage. `tool` is a display name used in logs and error details.
    pub fn new(tool: impl Into<String>, program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            tool: tool.into(),
            program: program.into(),
            timeout,
        }
    }

    /// Run the tool and wait for it, at most `timeout`.
    ///
    /// The child gets no stdin, and both output streams are captured. The
    /// timeout covers the process only: once it exits, output still held open
    /// by a background descendant is drained for a short grace period and then
    /// abandoned. The process is spawned with kill-on-drop, so dropping this
    /// future (e.g. when the client goes away) kills it too.
    pub async fn run<I, S>(
        &self,
        args: I,
        output_path: &Path,
    ) -> Result<ConversionResult, StageError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let start = Instant::now();
        let mut command = Command::new(&self.program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        debug!("Running {}: {:?}", self.tool, command.as_std());

        let mut child = command.spawn().map_err(|e| self.spawn_error(e))?;
        let stdout = PipeReader::spawn(child.stdout.take());
        let stderr = PipeReader::spawn(child.stderr.take());

        // Only the process itself is timed; a leftover grandchild may keep the pipes open
        let completed = tokio::time::timeout(self.timeout, child.wait()).await;
        let (exit, stdout, stderr) = match completed {
            Ok(status) => {
                let status = status.map_err(|e| self.io_error(e))?;
                let exit = match status.code() {
                    Some(code) => StageExit::Exited(code),
                    None => StageExit::Signaled,
                };
                let (stdout, stderr) =
                    tokio::join!(collect(stdout, &self.tool), collect(stderr, &self.tool));
                (exit, stdout, stderr)
            }
            Err(_) => {
                warn!(
                    "{} timed out after {:?}, killing process",
                    self.tool, self.timeout
                );
                // kill() also reaps the child, so it is gone once this returns
                if let Err(err) = child.kill().await {
                    warn!("Failed to kill {}: {}", self.tool, err);
                }
                (StageExit::TimedOut(self.timeout), String::new(), String::new())
            }
        };

        let output_size = if exit == StageExit::Exited(0) {
            tokio::fs::metadata(output_path)
                .await
                .map(|m| m.len())
                .unwrap_or(0)
        } else {
            0
        };

        let result = ConversionResult {
            tool: self.tool.clone(),
            exit,
            stdout,
            stderr,
            output_size,
            elapsed: start.elapsed(),
        };
        debug!(
            "{} finished in {}ms with {:?} ({} output bytes)",
            self.tool,
            result.elapsed.as_millis(),
            result.exit,
            result.output_size
        );
        Ok(result)
    }

    fn spawn_error(&self, err: std::io::Error) -> StageError {
        if err.kind() == std::io::ErrorKind::NotFound {
            StageError::ToolMissing {
                tool: self.tool.clone(),
                program: self.program.clone(),
            }
        } else {
            self.io_error(err)
        }
    }

    fn io_error(&self, source: std::io::Error) -> StageError {
        StageError::Io {
            tool: self.tool.clone(),
            source,
        }
    }
}

/// How long captured output may keep flowing once the process has exited.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Background reader for one output pipe, aborted when dropped.
struct PipeReader(JoinHandle<std::io::Result<String>>);

impl PipeReader {
    fn spawn<R>(stream: Option<R>) -> Option<Self>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        stream.map(|stream| Self(tokio::spawn(read_stream(stream))))
    }
}

impl Drop for PipeReader {
    fn drop(&mut self) {
        self.0.abort();
    }
}

async fn collect(reader: Option<PipeReader>, tool: &str) -> String {
    let Some(mut reader) = reader else {
        return String::new();
    };
    match tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, &mut reader.0).await {
        Ok(Ok(Ok(text))) => text,
        Ok(Ok(Err(err))) => {
            warn!("Failed to read {} output: {}", tool, err);
            String::new()
        }
        Ok(Err(err)) => {
            warn!("{} output reader failed: {}", tool, err);
            String::new()
        }
        Err(_) => {
            debug!("{} exited but its output pipe is still open", tool);
            String::new()
        }
    }
}

async fn read_stream<R: AsyncRead + Unpin>(mut stream: R) -> std::io::Result<String> {
    let mut buffer = Vec::new();
    stream.read_to_end(&mut buffer).await?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
