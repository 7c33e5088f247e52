//! Child process pipeline lifecycle.
//!
//! A pipeline is one primary generator process, optionally fed by a chained
//! predecessor whose stdout is wired straight into the primary's stdin. Each
//! child runs in its own process group so that [`PipelineHandle::kill`] can
//! take down anything it forked.

use std::process::Stdio;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::command::{CommandSpec, PredecessorSpec, StdinSource};
use crate::error::ExecError;

struct RunningChild {
    child: Child,
    program: String,
}

/// Exclusive owner of the children and pipes of one execution.
pub struct PipelineHandle {
    request_id: String,
    primary: RunningChild,
    predecessor: Option<RunningChild>,
    stdin_writer: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for PipelineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineHandle")
            .field("request_id", &self.request_id)
            .field("primary", &self.primary.program)
            .field("primary_pid", &self.primary.child.id())
            .field(
                "predecessor",
                &self.predecessor.as_ref().map(|p| p.program.as_str()),
            )
            .finish_non_exhaustive()
    }
}

fn configure(cmd: &mut Command) {
    cmd.kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);
}

fn spawn_predecessor(pre: &PredecessorSpec) -> Result<RunningChild, ExecError> {
    let program = pre.program.display().to_string();
    let mut cmd = Command::new(&pre.program);
    cmd.args(&pre.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null());
    configure(&mut cmd);

    let child = cmd.spawn().map_err(|e| ExecError::ProcessStartFailed {
        program: program.clone(),
        reason: e.to_string(),
    })?;
    debug!(program, pid = ?child.id(), args = ?pre.args, "Started predecessor");
    Ok(RunningChild { child, program })
}

impl PipelineHandle {
    /// Start the pipeline described by `spec`.
    ///
    /// The predecessor (if any) starts first so the primary never waits on a
    /// writer that does not exist yet. Any failure tears down what was
    /// already started before returning.
    pub async fn start(spec: CommandSpec, request_id: &str) -> Result<Self, ExecError> {
        let program = spec.program.display().to_string();
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        configure(&mut cmd);

        let mut predecessor = None;
        let mut literal = None;
        match spec.stdin {
            StdinSource::Empty => {
                cmd.stdin(Stdio::null());
            }
            StdinSource::Literal(text) => {
                cmd.stdin(Stdio::piped());
                literal = Some(text);
            }
            StdinSource::Chained(pre) => {
                let mut running = spawn_predecessor(&pre)?;
                let piped: Result<Stdio, String> = match running.child.stdout.take() {
                    Some(out) => out.try_into().map_err(|e: std::io::Error| e.to_string()),
                    None => Err("predecessor stdout was not captured".to_string()),
                };
                match piped {
                    Ok(stdio) => {
                        cmd.stdin(stdio);
                    }
                    Err(reason) => {
                        terminate(&mut running, request_id).await;
                        return Err(ExecError::ProcessPipeFailed {
                            stream: "predecessor stdout",
                            reason,
                        });
                    }
                }
                predecessor = Some(running);
            }
        }

        info!(
            request_id,
            program,
            args = ?spec.args,
            chained = predecessor.is_some(),
            "Executing command"
        );
        let spawned = cmd.spawn();
        // Release our copy of the predecessor's read end so it sees EPIPE
        // once the primary stops reading.
        drop(cmd);

        let mut primary = match spawned {
            Ok(child) => RunningChild { child, program },
            Err(e) => {
                if let Some(mut pre) = predecessor {
                    terminate(&mut pre, request_id).await;
                }
                return Err(ExecError::ProcessStartFailed {
                    program,
                    reason: e.to_string(),
                });
            }
        };

        let stdin_writer = match literal {
            None => None,
            Some(text) => {
                let Some(mut stdin) = primary.child.stdin.take() else {
                    terminate(&mut primary, request_id).await;
                    if let Some(mut pre) = predecessor {
                        terminate(&mut pre, request_id).await;
                    }
                    return Err(ExecError::ProcessPipeFailed {
                        stream: "stdin",
                        reason: "stdin was not captured".to_string(),
                    });
                };
                let rid = request_id.to_string();
                Some(tokio::spawn(async move {
                    // A child that exits without reading its input yields EPIPE here.
                    if let Err(e) = stdin.write_all(text.as_bytes()).await {
                        debug!(request_id = %rid, error = %e, "stdin write stopped early");
                    }
                    drop(stdin);
                }))
            }
        };

        Ok(Self {
            request_id: request_id.to_string(),
            primary,
            predecessor,
            stdin_writer,
        })
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn take_stdout(&mut self) -> Result<ChildStdout, ExecError> {
        self.primary
            .child
            .stdout
            .take()
            .ok_or_else(|| ExecError::ProcessPipeFailed {
                stream: "stdout",
                reason: "stdout already taken".to_string(),
            })
    }

    pub fn take_stderr(&mut self) -> Result<ChildStderr, ExecError> {
        self.primary
            .child
            .stderr
            .take()
            .ok_or_else(|| ExecError::ProcessPipeFailed {
                stream: "stderr",
                reason: "stderr already taken".to_string(),
            })
    }

    /// Wait for the primary, then the predecessor.
    ///
    /// Both exit statuses are assessed; a primary failure is reported in
    /// preference to a predecessor failure.
    pub async fn wait(&mut self) -> Result<(), ExecError> {
        let primary = exit_result(&mut self.primary, &self.request_id).await;
        let predecessor = match self.predecessor.as_mut() {
            Some(pre) => exit_result(pre, &self.request_id).await,
            None => Ok(()),
        };
        primary.and(predecessor)
    }

    /// Run to completion, capturing stdout and stderr merged in arrival order.
    ///
    /// A process failure carries the captured output in
    /// [`ExecError::ProcessExitNonZero`].
    pub async fn combined_output(&mut self) -> Result<String, ExecError> {
        let stdout = self.take_stdout()?;
        let stderr = match self.take_stderr() {
            Ok(stderr) => stderr,
            Err(e) => {
                self.kill().await;
                return Err(e);
            }
        };

        let captured = read_merged(stdout, stderr).await;
        let exit = self.wait().await;

        let output = match captured {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                exit?;
                return Err(ExecError::StreamReadError {
                    reason: e.to_string(),
                });
            }
        };

        match exit {
            Ok(()) => Ok(output),
            Err(ExecError::ProcessExitNonZero {
                program, status, ..
            }) => Err(ExecError::ProcessExitNonZero {
                program,
                status,
                output: Some(output),
            }),
            Err(e) => Err(e),
        }
    }

    /// Forcibly terminate and reap both children.
    pub async fn kill(&mut self) {
        if let Some(writer) = self.stdin_writer.take() {
            writer.abort();
        }
        terminate(&mut self.primary, &self.request_id).await;
        if let Some(pre) = self.predecessor.as_mut() {
            terminate(pre, &self.request_id).await;
        }
    }
}

async fn exit_result(running: &mut RunningChild, request_id: &str) -> Result<(), ExecError> {
    match running.child.wait().await {
        Ok(status) if status.success() => {
            debug!(request_id, program = %running.program, "Process exited successfully");
            Ok(())
        }
        Ok(status) => {
            warn!(request_id, program = %running.program, %status, "Process failed");
            Err(ExecError::ProcessExitNonZero {
                program: running.program.clone(),
                status: status.to_string(),
                output: None,
            })
        }
        Err(e) => {
            warn!(request_id, program = %running.program, error = %e, "Error waiting for process");
            Err(ExecError::ProcessExitNonZero {
                program: running.program.clone(),
                status: format!("unknown exit status ({e})"),
                output: None,
            })
        }
    }
}

/// Kill the child's whole process group, then the child itself, and reap it.
async fn terminate(running: &mut RunningChild, request_id: &str) {
    #[cfg(unix)]
    if let Some(pid) = running.child.id().and_then(|p| i32::try_from(p).ok()) {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;
        if let Err(e) = killpg(Pid::from_raw(pid), Signal::SIGKILL) {
            debug!(request_id, pid, error = %e, "killpg failed");
        }
    }
    match running.child.kill().await {
        Ok(()) => debug!(request_id, program = %running.program, "Process killed"),
        Err(e) => debug!(request_id, program = %running.program, error = %e, "Kill skipped"),
    }
}

/// Read both pipes to EOF, appending chunks to one buffer as they arrive.
async fn read_merged(mut stdout: ChildStdout, mut stderr: ChildStderr) -> std::io::Result<Vec<u8>> {
    let mut merged = Vec::new();
    let mut out_buf = [0u8; 8192];
    let mut err_buf = [0u8; 8192];
    let mut out_open = true;
    let mut err_open = true;

    while out_open || err_open {
        tokio::select! {
            read = stdout.read(&mut out_buf), if out_open => match read? {
                0 => out_open = false,
                n => merged.extend_from_slice(&out_buf[..n]),
            },
            read = stderr.read(&mut err_buf), if err_open => match read? {
                0 => err_open = false,
                n => merged.extend_from_slice(&err_buf[..n]),
            },
        }
    }
    Ok(merged)
}
