// src/lib.rs

pub mod cli;
pub mod errors;
pub mod logging;
pub mod monitor;
pub mod plan;
pub mod proc;
pub mod router;
pub mod supervisor;
pub mod tree;
pub mod types;

use std::path::PathBuf;

use anyhow::Result;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::cli::CliArgs;
use crate::monitor::{spawn_debouncer, FileMonitor, FileWatcher};
use crate::plan::{load_and_validate, PlanFile, PlanNode};
use crate::proc::RealSlotBackend;
use crate::supervisor::{RetryPolicy, Runtime, RuntimeEvent, SupervisorCore};
use crate::tree::ProcessTree;
use crate::types::RoutingTable;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - plan loading
/// - the slot tree / supervision core / runtime
/// - the process backend
/// - the file watcher and debouncer
/// - the public command socket
/// - SIGINT/SIGTERM handling
///
/// Returns the process exit code: 0 only if the whole tree was torn down
/// cleanly within its grace periods.
pub async fn run(args: CliArgs) -> Result<i32> {
    let plan_path = PathBuf::from(&args.config);
    let mut plan = load_and_validate(&plan_path)?;

    if let Some(socket) = args.socket {
        plan.master.socket = socket;
    }

    if args.dry_run {
        print_dry_run(&plan);
        return Ok(0);
    }

    let tree = ProcessTree::build(&plan.root)?;
    let core = SupervisorCore::new(
        tree,
        RetryPolicy {
            budget: plan.master.retry_budget,
            window: plan.master.retry_window(),
        },
    );

    // Runtime event channel: control readers, timers, watcher, signals.
    let (events_tx, events_rx) = mpsc::channel::<RuntimeEvent>(64);

    // Routing table published by the runtime, read by sessions.
    let (routes_tx, routes_rx) = watch::channel(RoutingTable::new());

    // Raw fs events → debouncer → runtime.
    let (raw_tx, raw_rx) = mpsc::unbounded_channel();
    let watcher = FileWatcher::new(raw_tx)?;
    let _debouncer = spawn_debouncer(raw_rx, events_tx.clone(), plan.master.debounce());
    let monitor = FileMonitor::new(watcher);

    // Process backend (real implementation in production).
    let backend = RealSlotBackend::new(plan.master.command.clone(), events_tx.clone());

    // Public command socket.
    let listener = router::bind_public_socket(&plan.master.socket)?;
    let _router = router::spawn_router(listener, routes_rx, plan.master.session_wait());

    // SIGINT/SIGTERM → graceful shutdown.
    spawn_signal_task(events_tx.clone());

    events_tx.send(RuntimeEvent::StartTree).await?;

    let runtime = Runtime::new(
        core,
        events_rx,
        events_tx,
        backend,
        monitor,
        routes_tx,
        &plan.master,
    );
    let code = runtime.run().await?;

    if let Err(err) = std::fs::remove_file(&plan.master.socket) {
        warn!(error = %err, "failed to remove command socket");
    }

    Ok(code)
}

/// Forward termination signals into the runtime event channel.
fn spawn_signal_task(events_tx: mpsc::Sender<RuntimeEvent>) {
    tokio::spawn(async move {
        let interrupted = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                std::future::pending::<()>().await;
            }
        };

        let mut terminate =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(sig) => sig,
                Err(e) => {
                    eprintln!("failed to listen for SIGTERM: {e}");
                    let _ = interrupted.await;
                    let _ = events_tx.send(RuntimeEvent::ShutdownRequested).await;
                    return;
                }
            };

        tokio::select! {
            _ = interrupted => info!("interrupt received"),
            _ = terminate.recv() => info!("termination signal received"),
        }
        let _ = events_tx.send(RuntimeEvent::ShutdownRequested).await;
    });
}

/// Simple dry-run output: print the tree and the effective policy values.
fn print_dry_run(plan: &PlanFile) {
    println!("preheat dry-run");
    println!("  master.command = {}", plan.master.command);
    println!("  master.socket = {}", plan.master.socket.display());
    println!("  master.debounce_ms = {}", plan.master.debounce_ms);
    println!("  master.boot_timeout_ms = {}", plan.master.boot_timeout_ms);
    println!("  master.grace_ms = {}", plan.master.grace_ms);
    println!(
        "  master.retry_budget = {} (window {} ms)",
        plan.master.retry_budget, plan.master.retry_window_ms
    );
    println!();

    println!("plan ({} slots):", plan.root.names().len());
    print_node(&plan.root, 1);
}

fn print_node(node: &PlanNode, depth: usize) {
    let marker = if node.is_leaf() { " (command)" } else { "" };
    println!("{}- {}{}", "  ".repeat(depth), node.name, marker);
    for child in &node.children {
        print_node(child, depth + 1);
    }
}
