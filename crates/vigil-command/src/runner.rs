//! Spawning and supervising external commands.
//!
//! Two entry points: [`run`] for commands that are expected to finish
//! (hooks, one-shot role commands in tests), and [`start`] for the
//! long-lived validator process a role transition launches. Both honour
//! dry-run by logging the intent and touching nothing.
//!
//! Streamed output is read by one task per stream, so a child producing
//! large output on both streams cannot deadlock against a full pipe.
//! Lines are emitted in per-stream order; interleaving between the two
//! streams is not preserved.

use std::collections::BTreeMap;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::CommandError;

/// Everything needed to execute one external command.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// Label used in log records, e.g. `"pre-hook guard"` or
    /// `"active role command"`.
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    /// Merged onto the parent environment; child wins on collisions.
    /// Empty leaves the parent environment untouched.
    pub env: BTreeMap<String, String>,
    pub dry_run: bool,
    pub stream_output: bool,
}

impl CommandSpec {
    fn build(&self) -> Command {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args);
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        cmd
    }

    fn status_result(&self, status: std::process::ExitStatus) -> Result<(), CommandError> {
        match status.code() {
            Some(0) => Ok(()),
            Some(code) => Err(CommandError::ExitNonZero {
                name: self.name.clone(),
                code,
            }),
            None => Err(CommandError::Terminated {
                name: self.name.clone(),
            }),
        }
    }
}

/// Runs a command to completion.
///
/// With `stream_output` unset, stdout and stderr are captured and logged
/// in bulk once the command exits. With it set, each line is logged as
/// it arrives, tagged with its stream.
pub async fn run(spec: &CommandSpec) -> Result<(), CommandError> {
    if spec.dry_run {
        info!(
            name = %spec.name,
            command = %spec.command,
            args = ?spec.args,
            "dry run, not spawning"
        );
        return Ok(());
    }

    debug!(name = %spec.name, command = %spec.command, args = ?spec.args, "running command");

    if spec.stream_output {
        let mut running = start(spec)?;
        return running.wait().await;
    }

    let output = spec
        .build()
        .output()
        .await
        .map_err(|source| CommandError::Spawn {
            name: spec.name.clone(),
            source,
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    if !stdout.trim().is_empty() {
        info!(name = %spec.name, stream = "stdout", "{}", stdout.trim_end());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        info!(name = %spec.name, stream = "stderr", "{}", stderr.trim_end());
    }

    spec.status_result(output.status)
}

/// Launches a command asynchronously with streamed output and returns a
/// supervision handle.
///
/// The caller must not pass a dry-run spec; dry-run short-circuits in
/// the layers above before a handle is ever needed.
pub fn start(spec: &CommandSpec) -> Result<RunningCommand, CommandError> {
    let mut cmd = spec.build();
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    let mut child = cmd.spawn().map_err(|source| CommandError::Spawn {
        name: spec.name.clone(),
        source,
    })?;

    let mut readers = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        readers.push(spawn_line_logger(stdout, spec.name.clone(), "stdout"));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(spawn_line_logger(stderr, spec.name.clone(), "stderr"));
    }

    info!(name = %spec.name, pid = ?child.id(), "command started");

    Ok(RunningCommand {
        name: spec.name.clone(),
        spec: spec.clone(),
        child,
        readers,
    })
}

/// A spawned command with its output readers.
pub struct RunningCommand {
    name: String,
    spec: CommandSpec,
    child: Child,
    readers: Vec<JoinHandle<()>>,
}

impl RunningCommand {
    /// OS process id, while the child is still running.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Waits for the command to exit and drains the output readers.
    pub async fn wait(&mut self) -> Result<(), CommandError> {
        let status = self
            .child
            .wait()
            .await
            .map_err(|source| CommandError::Wait {
                name: self.name.clone(),
                source,
            })?;

        for reader in self.readers.drain(..) {
            let _ = reader.await;
        }

        self.spec.status_result(status)
    }

    /// Stops the command: termination signal first, then a hard kill if
    /// it has not exited within `timeout`.
    ///
    /// `cancel` shortens the graceful wait: when it fires mid-wait the
    /// child is hard-killed immediately instead of running out the
    /// timeout. A child that has already exited is reaped cleanly even
    /// if the token is already cancelled.
    pub async fn stop(
        mut self,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), CommandError> {
        info!(name = %self.name, pid = ?self.child.id(), "stopping command");
        terminate(&mut self.child);

        tokio::select! {
            biased;

            result = tokio::time::timeout(timeout, self.child.wait()) => match result {
                Ok(Ok(status)) => {
                    debug!(name = %self.name, ?status, "command stopped");
                }
                Ok(Err(source)) => {
                    return Err(CommandError::Wait {
                        name: self.name.clone(),
                        source,
                    });
                }
                Err(_) => {
                    warn!(
                        name = %self.name,
                        ?timeout,
                        "command did not stop within timeout, hard killing"
                    );
                    let _ = self.child.start_kill();
                    let _ = self.child.wait().await;
                }
            },

            _ = cancel.cancelled() => {
                warn!(name = %self.name, "cancelled while waiting for command to stop, hard killing");
                let _ = self.child.start_kill();
                let _ = self.child.wait().await;
            }
        }

        for reader in self.readers.drain(..) {
            let _ = reader.await;
        }
        Ok(())
    }
}

#[cfg(unix)]
fn terminate(child: &mut Child) {
    match child.id() {
        // SIGTERM so the validator gets a chance to exit cleanly;
        // start_kill would be SIGKILL straight away
        Some(pid) => unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        },
        None => {}
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) {
    let _ = child.start_kill();
}

fn spawn_line_logger<R>(reader: R, name: String, stream: &'static str) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        read_lines(reader, |line| {
            info!(name = %name, stream, "{line}");
        })
        .await;
    })
}

/// Reads `reader` line by line, invoking `on_line` for each in order.
async fn read_lines<R>(reader: R, mut on_line: impl FnMut(&str))
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => on_line(&line),
            Ok(None) => break,
            Err(e) => {
                warn!("error reading command output: {e}");
                break;
            }
        }
    }
}
