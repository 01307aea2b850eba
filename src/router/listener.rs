// src/router/listener.rs

use std::path::Path;
use std::time::Duration;

use tokio::net::UnixListener;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::router::session::handle_session;
use crate::types::RoutingTable;

/// Bind the public command socket, removing a stale socket file first.
pub fn bind_public_socket(path: &Path) -> Result<UnixListener> {
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    let listener = UnixListener::bind(path)?;
    info!(path = ?path, "command socket bound");
    Ok(listener)
}

/// Spawn the accept loop. Each connection gets its own task and its own
/// clone of the routing-table receiver.
pub fn spawn_router(
    listener: UnixListener,
    routes: watch::Receiver<RoutingTable>,
    session_wait: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let routes = routes.clone();
                    tokio::spawn(async move {
                        handle_session(stream, routes, session_wait).await;
                    });
                }
                Err(err) => {
                    warn!(error = %err, "accept failed");
                }
            }
        }
    })
}
