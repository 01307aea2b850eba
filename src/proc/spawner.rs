// src/proc/spawner.rs

//! Real slot process backend.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::Stdio;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, Command};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::proc::backend::{SlotBackend, SlotProcess, SpawnRequest};
use crate::supervisor::RuntimeEvent;

/// Production backend: spawns the plan's boot command once per slot and
/// wires its stdin/stdout up as the control channel.
pub struct RealSlotBackend {
    command: String,
    events_tx: mpsc::Sender<RuntimeEvent>,
}

impl RealSlotBackend {
    pub fn new(command: String, events_tx: mpsc::Sender<RuntimeEvent>) -> Self {
        Self { command, events_tx }
    }
}

impl SlotBackend for RealSlotBackend {
    fn spawn_slot(
        &mut self,
        req: SpawnRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn SlotProcess>>> + Send + '_>> {
        let command = self.command.clone();
        let events_tx = self.events_tx.clone();
        Box::pin(async move {
            let process = spawn_slot_process(&command, req, events_tx).await?;
            Ok(process)
        })
    }
}

/// Handle for one spawned process.
///
/// Dropping the stdin half is the graceful exit request; the kill channel
/// reaches the wait task, which owns the `Child`.
struct RealSlotProcess {
    stdin: Option<ChildStdin>,
    kill_tx: Option<oneshot::Sender<()>>,
}

impl SlotProcess for RealSlotProcess {
    fn request_exit(&mut self) {
        // Closing the control channel tells the process to exit.
        self.stdin.take();
    }

    fn kill(&mut self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        let kill_tx = self.kill_tx.take();
        Box::pin(async move {
            if let Some(tx) = kill_tx {
                // The wait task may already have observed the exit.
                let _ = tx.send(());
            }
        })
    }
}

async fn spawn_slot_process(
    command: &str,
    req: SpawnRequest,
    events_tx: mpsc::Sender<RuntimeEvent>,
) -> Result<Box<dyn SlotProcess>> {
    info!(
        slot = %req.slot,
        generation = req.generation,
        cmd = %command,
        "spawning slot process"
    );

    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(command)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning process for slot '{}'", req.slot))?;

    let mut stdin = child
        .stdin
        .take()
        .context("child stdin not piped")?;
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    // First control line: which plan step this process boots.
    stdin
        .write_all(format!("{}\n", req.slot).as_bytes())
        .await
        .with_context(|| format!("writing slot name to '{}'", req.slot))?;
    stdin
        .flush()
        .await
        .with_context(|| format!("flushing control channel of '{}'", req.slot))?;

    // Control channel reader: `ready` / `dep <path>` / `serve <path>`.
    if let Some(stdout) = stdout {
        let slot = req.slot.clone();
        let generation = req.generation;
        let tx = events_tx.clone();
        tokio::spawn(async move {
            let reader = BufReader::new(stdout);
            let mut lines = reader.lines();

            while let Ok(Some(line)) = lines.next_line().await {
                if let Some(event) = parse_control_line(&slot, generation, &line) {
                    if tx.send(event).await.is_err() {
                        // Runtime is gone; stop reading.
                        return;
                    }
                }
            }
            debug!(slot = %slot, generation, "control channel closed");
        });
    }

    // Always consume stderr so buffers don't fill; log at debug.
    if let Some(stderr) = stderr {
        let slot = req.slot.clone();
        let generation = req.generation;
        tokio::spawn(async move {
            let reader = BufReader::new(stderr);
            let mut lines = reader.lines();

            while let Ok(Some(line)) = lines.next_line().await {
                debug!(slot = %slot, generation, "stderr: {}", line);
            }
        });
    }

    // Either the process exits on its own, or a kill request arrives.
    let (kill_tx, mut kill_rx) = oneshot::channel::<()>();
    {
        let slot = req.slot.clone();
        let generation = req.generation;
        tokio::spawn(async move {
            let code = tokio::select! {
                status = child.wait() => match status {
                    Ok(status) => {
                        info!(
                            slot = %slot,
                            generation,
                            exit_code = ?status.code(),
                            "slot process exited"
                        );
                        status.code()
                    }
                    Err(err) => {
                        warn!(slot = %slot, generation, error = %err, "waiting for slot process failed");
                        None
                    }
                },
                _ = &mut kill_rx => {
                    info!(slot = %slot, generation, "force-killing slot process");
                    if let Err(err) = child.kill().await {
                        warn!(slot = %slot, generation, error = %err, "failed to kill slot process");
                    }
                    None
                }
            };

            let _ = events_tx
                .send(RuntimeEvent::SlotExited {
                    slot,
                    generation,
                    code,
                })
                .await;
        });
    }

    Ok(Box::new(RealSlotProcess {
        stdin: Some(stdin),
        kill_tx: Some(kill_tx),
    }))
}

/// Parse one control line from a slot process.
///
/// Unrecognized lines are process chatter, logged at debug and dropped.
fn parse_control_line(slot: &str, generation: u64, line: &str) -> Option<RuntimeEvent> {
    let line = line.trim_end();
    if line == "ready" {
        return Some(RuntimeEvent::SlotReady {
            slot: slot.to_string(),
            generation,
        });
    }
    if let Some(path) = line.strip_prefix("dep ") {
        let path = path.trim();
        if path.is_empty() {
            warn!(slot = %slot, "dep control line without a path; ignoring");
            return None;
        }
        return Some(RuntimeEvent::SlotFiles {
            slot: slot.to_string(),
            generation,
            paths: vec![PathBuf::from(path)],
        });
    }
    if let Some(path) = line.strip_prefix("serve ") {
        let path = path.trim();
        if path.is_empty() {
            warn!(slot = %slot, "serve control line without a path; ignoring");
            return None;
        }
        return Some(RuntimeEvent::SlotServing {
            slot: slot.to_string(),
            generation,
            endpoint: PathBuf::from(path),
        });
    }

    debug!(slot = %slot, generation, line = %line, "unrecognized control line");
    None
}
