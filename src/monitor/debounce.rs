// src/monitor/debounce.rs

//! Coalescing of raw filesystem events.
//!
//! Editors commonly produce bursts: a temp-file write, a rename over the
//! original, metadata updates. The debouncer opens a window on the first
//! event and emits everything seen within it as one `FilesChanged` batch,
//! so a burst feeding the same subtree produces one restart rather than
//! several.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use notify::Event;
use tokio::sync::mpsc;
use tracing::debug;

use crate::supervisor::RuntimeEvent;

/// Spawn the coalescing task between the raw watcher channel and the
/// runtime event channel.
pub fn spawn_debouncer(
    mut raw_rx: mpsc::UnboundedReceiver<Event>,
    events_tx: mpsc::Sender<RuntimeEvent>,
    window: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        'outer: loop {
            let first = match raw_rx.recv().await {
                Some(event) => event,
                None => break,
            };

            let mut paths: BTreeSet<PathBuf> = first.paths.into_iter().collect();

            let deadline = tokio::time::sleep(window);
            tokio::pin!(deadline);
            loop {
                tokio::select! {
                    _ = &mut deadline => break,
                    event = raw_rx.recv() => match event {
                        Some(event) => paths.extend(event.paths),
                        None => {
                            if paths.is_empty() {
                                break 'outer;
                            }
                            break;
                        }
                    },
                }
            }

            if paths.is_empty() {
                continue;
            }

            let paths: Vec<PathBuf> = paths.into_iter().collect();
            debug!(count = paths.len(), "coalesced filesystem events");
            if events_tx
                .send(RuntimeEvent::FilesChanged { paths })
                .await
                .is_err()
            {
                break;
            }
        }
        debug!("debouncer finished");
    })
}
