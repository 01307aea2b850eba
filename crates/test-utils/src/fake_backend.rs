//! A controllable slot-process backend.
//!
//! Instead of spawning real processes, each "process" is a tokio task that
//! follows a scripted [`SlotBehavior`]: report dependencies, optionally
//! serve a fixed response on a real unix socket (captured from a file at
//! spawn time, like warm state), signal readiness, and exit on request.
//!
//! Every backend action is recorded with a timestamp so tests can assert
//! spawn/teardown ordering and process identity (generations).

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::io::AsyncWriteExt;
use tokio::net::UnixListener;
use tokio::sync::mpsc;

use preheat::errors::Result;
use preheat::proc::{SlotBackend, SlotProcess, SpawnRequest};
use preheat::supervisor::RuntimeEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Spawned,
    ExitRequested,
    Killed,
}

/// One recorded backend interaction.
#[derive(Debug, Clone)]
pub struct BackendAction {
    pub slot: String,
    pub generation: u64,
    pub kind: ActionKind,
    pub at: Instant,
}

/// Scripted behavior for one slot's fake processes.
#[derive(Debug, Clone)]
pub struct SlotBehavior {
    /// Signal readiness once booted. Disable to exercise boot timeouts.
    pub ready: bool,
    /// Paths reported as loaded dependencies.
    pub deps: Vec<PathBuf>,
    /// Read this file at spawn time and serve its trimmed contents to
    /// every session (leaves only).
    pub serve_from: Option<PathBuf>,
    /// Exit with this code right away instead of booting.
    pub exit_with: Option<i32>,
    /// Ignore graceful exit requests, forcing the grace timer to fire.
    pub ignore_exit_request: bool,
    /// Simulated boot work before deps/serve/ready are reported.
    pub boot_delay: Option<Duration>,
}

impl Default for SlotBehavior {
    fn default() -> Self {
        Self {
            ready: true,
            deps: Vec::new(),
            serve_from: None,
            exit_with: None,
            ignore_exit_request: false,
            boot_delay: None,
        }
    }
}

enum ExitMode {
    Graceful,
    Killed,
}

/// Fake backend that scripts slot processes and records every action.
pub struct FakeBackend {
    events_tx: mpsc::Sender<RuntimeEvent>,
    socket_dir: PathBuf,
    actions: Arc<Mutex<Vec<BackendAction>>>,
    behaviors: Arc<Mutex<HashMap<String, SlotBehavior>>>,
}

impl FakeBackend {
    /// `socket_dir` is where fake leaves bind their session sockets.
    pub fn new(events_tx: mpsc::Sender<RuntimeEvent>, socket_dir: impl Into<PathBuf>) -> Self {
        Self {
            events_tx,
            socket_dir: socket_dir.into(),
            actions: Arc::new(Mutex::new(Vec::new())),
            behaviors: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn set_behavior(&self, slot: &str, behavior: SlotBehavior) {
        self.behaviors
            .lock()
            .unwrap()
            .insert(slot.to_string(), behavior);
    }

    pub fn actions(&self) -> Vec<BackendAction> {
        self.actions.lock().unwrap().clone()
    }

    /// Handle for asserting on actions after the backend has been moved
    /// into the runtime.
    pub fn actions_handle(&self) -> Arc<Mutex<Vec<BackendAction>>> {
        Arc::clone(&self.actions)
    }

    /// Generations spawned for a slot, in order.
    pub fn spawned_generations(actions: &[BackendAction], slot: &str) -> Vec<u64> {
        actions
            .iter()
            .filter(|a| a.kind == ActionKind::Spawned && a.slot == slot)
            .map(|a| a.generation)
            .collect()
    }
}

impl SlotBackend for FakeBackend {
    fn spawn_slot(
        &mut self,
        req: SpawnRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn SlotProcess>>> + Send + '_>> {
        let behavior = self
            .behaviors
            .lock()
            .unwrap()
            .get(&req.slot)
            .cloned()
            .unwrap_or_default();
        let events_tx = self.events_tx.clone();
        let actions = Arc::clone(&self.actions);
        let socket_dir = self.socket_dir.clone();

        Box::pin(async move {
            actions.lock().unwrap().push(BackendAction {
                slot: req.slot.clone(),
                generation: req.generation,
                kind: ActionKind::Spawned,
                at: Instant::now(),
            });

            let (exit_tx, exit_rx) = mpsc::unbounded_channel::<ExitMode>();
            tokio::spawn(run_fake_process(
                req.clone(),
                behavior,
                socket_dir,
                events_tx,
                exit_rx,
            ));

            let process: Box<dyn SlotProcess> = Box::new(FakeProcess {
                slot: req.slot,
                generation: req.generation,
                exit_tx,
                actions,
            });
            Ok(process)
        })
    }
}

struct FakeProcess {
    slot: String,
    generation: u64,
    exit_tx: mpsc::UnboundedSender<ExitMode>,
    actions: Arc<Mutex<Vec<BackendAction>>>,
}

impl FakeProcess {
    fn record(&self, kind: ActionKind) {
        self.actions.lock().unwrap().push(BackendAction {
            slot: self.slot.clone(),
            generation: self.generation,
            kind,
            at: Instant::now(),
        });
    }
}

impl SlotProcess for FakeProcess {
    fn request_exit(&mut self) {
        self.record(ActionKind::ExitRequested);
        let _ = self.exit_tx.send(ExitMode::Graceful);
    }

    fn kill(&mut self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        self.record(ActionKind::Killed);
        let _ = self.exit_tx.send(ExitMode::Killed);
        Box::pin(async {})
    }
}

/// The scripted process body.
async fn run_fake_process(
    req: SpawnRequest,
    behavior: SlotBehavior,
    socket_dir: PathBuf,
    events_tx: mpsc::Sender<RuntimeEvent>,
    mut exit_rx: mpsc::UnboundedReceiver<ExitMode>,
) {
    if let Some(code) = behavior.exit_with {
        let _ = events_tx
            .send(RuntimeEvent::SlotExited {
                slot: req.slot,
                generation: req.generation,
                code: Some(code),
            })
            .await;
        return;
    }

    if let Some(delay) = behavior.boot_delay {
        tokio::time::sleep(delay).await;
    }

    for path in &behavior.deps {
        let _ = events_tx
            .send(RuntimeEvent::SlotFiles {
                slot: req.slot.clone(),
                generation: req.generation,
                paths: vec![path.clone()],
            })
            .await;
    }

    // Capture warm state at boot: the served response is whatever the
    // backing file contained when this generation spawned.
    let mut server = None;
    let mut sock_path = None;
    if let Some(source) = &behavior.serve_from {
        let response = tokio::fs::read_to_string(source)
            .await
            .map(|s| s.trim().to_string())
            .unwrap_or_default();

        let path = socket_dir.join(format!("{}-{}.sock", req.slot, req.generation));
        match UnixListener::bind(&path) {
            Ok(listener) => {
                server = Some(tokio::spawn(serve_sessions(listener, response)));
                let _ = events_tx
                    .send(RuntimeEvent::SlotServing {
                        slot: req.slot.clone(),
                        generation: req.generation,
                        endpoint: path.clone(),
                    })
                    .await;
                sock_path = Some(path);
            }
            Err(err) => {
                tracing::warn!(slot = %req.slot, error = %err, "fake leaf failed to bind session socket");
            }
        }
    }

    if behavior.ready {
        let _ = events_tx
            .send(RuntimeEvent::SlotReady {
                slot: req.slot.clone(),
                generation: req.generation,
            })
            .await;
    }

    let code = loop {
        match exit_rx.recv().await {
            Some(ExitMode::Graceful) if behavior.ignore_exit_request => continue,
            Some(ExitMode::Graceful) => break Some(0),
            Some(ExitMode::Killed) | None => break None,
        }
    };

    if let Some(server) = server {
        server.abort();
    }
    if let Some(path) = sock_path {
        let _ = tokio::fs::remove_file(path).await;
    }

    let _ = events_tx
        .send(RuntimeEvent::SlotExited {
            slot: req.slot,
            generation: req.generation,
            code,
        })
        .await;
}

/// Serve the captured response to every session, then close the stream so
/// the relayed session sees EOF as its end-of-output.
async fn serve_sessions(listener: UnixListener, response: String) {
    loop {
        match listener.accept().await {
            Ok((mut stream, _addr)) => {
                let response = response.clone();
                tokio::spawn(async move {
                    let _ = stream.write_all(response.as_bytes()).await;
                    let _ = stream.shutdown().await;
                });
            }
            Err(_) => break,
        }
    }
}
