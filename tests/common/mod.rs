#![allow(dead_code)]

pub use preheat_test_utils::init_tracing;

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use preheat::errors::Result;
use preheat::monitor::{spawn_debouncer, FileMonitor, FileWatcher};
use preheat::plan::PlanFile;
use preheat::supervisor::{RetryPolicy, Runtime, RuntimeEvent, SupervisorCore};
use preheat::tree::{ProcessTree, SlotStatus};
use preheat::types::RoutingTable;
use preheat_test_utils::fake_backend::{BackendAction, FakeBackend, SlotBehavior};

/// A full runtime wired to a [`FakeBackend`], plus the handles tests need
/// to drive and observe it.
pub struct Harness {
    pub events_tx: mpsc::Sender<RuntimeEvent>,
    pub routes: watch::Receiver<RoutingTable>,
    pub actions: Arc<Mutex<Vec<BackendAction>>>,
    pub runtime: JoinHandle<Result<i32>>,
}

/// Build and start a runtime for `plan`, with scripted slot behaviors and
/// fake session sockets under `socket_dir`.
pub async fn start_runtime(
    plan: &PlanFile,
    socket_dir: &Path,
    behaviors: Vec<(&str, SlotBehavior)>,
) -> Harness {
    let tree = ProcessTree::build(&plan.root).expect("tree builds");
    let core = SupervisorCore::new(
        tree,
        RetryPolicy {
            budget: plan.master.retry_budget,
            window: plan.master.retry_window(),
        },
    );

    let (events_tx, events_rx) = mpsc::channel::<RuntimeEvent>(64);
    let (routes_tx, routes) = watch::channel(RoutingTable::new());

    let (raw_tx, raw_rx) = mpsc::unbounded_channel();
    let watcher = FileWatcher::new(raw_tx).expect("watcher builds");
    let _debouncer = spawn_debouncer(raw_rx, events_tx.clone(), plan.master.debounce());
    let monitor = FileMonitor::new(watcher);

    let backend = FakeBackend::new(events_tx.clone(), socket_dir);
    for (slot, behavior) in behaviors {
        backend.set_behavior(slot, behavior);
    }
    let actions = backend.actions_handle();

    let runtime = Runtime::new(
        core,
        events_rx,
        events_tx.clone(),
        backend,
        monitor,
        routes_tx,
        &plan.master,
    );
    let runtime = tokio::spawn(runtime.run());

    events_tx
        .send(RuntimeEvent::StartTree)
        .await
        .expect("runtime accepts StartTree");

    Harness {
        events_tx,
        routes,
        actions,
        runtime,
    }
}

/// Wait (bounded) until the routing table satisfies `pred`.
pub async fn wait_for_routes<F>(routes: &mut watch::Receiver<RoutingTable>, pred: F)
where
    F: FnMut(&RoutingTable) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), routes.wait_for(pred))
        .await
        .expect("routing table did not reach the expected state in time")
        .expect("routing table publisher dropped");
}

pub async fn wait_for_status(
    routes: &mut watch::Receiver<RoutingTable>,
    slot: &str,
    status: SlotStatus,
) {
    wait_for_routes(routes, |table| {
        table.get(slot).is_some_and(|entry| entry.status == status)
    })
    .await;
}

pub async fn wait_for_generation(
    routes: &mut watch::Receiver<RoutingTable>,
    slot: &str,
    generation: u64,
) {
    wait_for_routes(routes, |table| {
        table
            .get(slot)
            .is_some_and(|entry| entry.generation == generation && entry.status == SlotStatus::Ready)
    })
    .await;
}

pub fn generation_of(routes: &watch::Receiver<RoutingTable>, slot: &str) -> u64 {
    routes
        .borrow()
        .get(slot)
        .map(|entry| entry.generation)
        .expect("slot in routing table")
}

/// One client request against the public socket: send a command name, read
/// everything until the master closes the session.
pub async fn request(socket: &Path, command: &str) -> std::io::Result<String> {
    let mut stream = UnixStream::connect(socket).await?;
    stream
        .write_all(format!("{command}\n").as_bytes())
        .await?;
    let mut response = String::new();
    stream.read_to_string(&mut response).await?;
    Ok(response)
}
