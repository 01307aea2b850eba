// src/router/session.rs

//! One client session: resolve a command name, wait for the slot, relay.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use tokio::io::{copy_bidirectional, AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::sync::watch;
use tokio::time::{timeout, Instant};
use tracing::{debug, warn};

use crate::tree::SlotStatus;
use crate::types::RoutingTable;

const MAX_COMMAND_LEN: usize = 256;

/// What the routing table says about a requested command right now.
enum Resolution {
    /// Attach to this endpoint; the generation pins the session to the
    /// process it was attached to.
    Attach(PathBuf, u64),
    /// Permanent refusal: reply the error line and close.
    Reject(String),
    /// The slot may become ready shortly; wait for a table change.
    Wait,
}

fn resolve(table: &RoutingTable, name: &str) -> Resolution {
    match table.get(name) {
        None => Resolution::Reject(format!("unknown-command: no slot named '{name}'")),
        Some(entry) if !entry.is_leaf => Resolution::Reject(format!(
            "invalid-command: '{name}' does not accept commands"
        )),
        Some(entry) => match entry.status {
            SlotStatus::Dead => {
                Resolution::Reject(format!("unavailable: slot '{name}' is not running"))
            }
            SlotStatus::Ready => match &entry.endpoint {
                Some(endpoint) => Resolution::Attach(endpoint.clone(), entry.generation),
                // Ready but the endpoint announcement hasn't landed yet.
                None => Resolution::Wait,
            },
            SlotStatus::Pending | SlotStatus::Booting | SlotStatus::Restarting => Resolution::Wait,
        },
    }
}

pub(crate) async fn handle_session(
    stream: UnixStream,
    routes: watch::Receiver<RoutingTable>,
    session_wait: Duration,
) {
    if let Err(err) = session_inner(stream, routes, session_wait).await {
        debug!(error = %err, "session ended with error");
    }
}

async fn session_inner(
    mut stream: UnixStream,
    mut routes: watch::Receiver<RoutingTable>,
    session_wait: Duration,
) -> io::Result<()> {
    let name = match timeout(session_wait, read_command_line(&mut stream)).await {
        Ok(name) => name?,
        Err(_) => {
            debug!("client sent no command name in time; dropping session");
            return Ok(());
        }
    };

    debug!(command = %name, "session requested command");

    let deadline = Instant::now() + session_wait;
    let (endpoint, generation) = loop {
        // Scope the borrow: it must not be held across an await.
        let resolution = resolve(&routes.borrow_and_update(), &name);

        match resolution {
            Resolution::Attach(endpoint, generation) => break (endpoint, generation),
            Resolution::Reject(reason) => {
                warn!(command = %name, reason = %reason, "rejecting session");
                return reply_err(&mut stream, &reason).await;
            }
            Resolution::Wait => {
                let now = Instant::now();
                if now >= deadline {
                    let reason =
                        format!("busy: slot '{name}' did not become ready in time");
                    return reply_err(&mut stream, &reason).await;
                }
                match timeout(deadline - now, routes.changed()).await {
                    Ok(Ok(())) => continue,
                    // Supervisor gone: nothing will ever become ready.
                    Ok(Err(_)) => {
                        let reason = format!("unavailable: slot '{name}' is not running");
                        return reply_err(&mut stream, &reason).await;
                    }
                    Err(_) => {
                        let reason =
                            format!("busy: slot '{name}' did not become ready in time");
                        return reply_err(&mut stream, &reason).await;
                    }
                }
            }
        }
    };

    let mut upstream = match UnixStream::connect(&endpoint).await {
        Ok(upstream) => upstream,
        Err(err) => {
            // The process was ready a moment ago; treat as a transient.
            warn!(command = %name, endpoint = ?endpoint, error = %err, "failed to reach slot endpoint");
            let reason = format!("busy: slot '{name}' is not answering");
            return reply_err(&mut stream, &reason).await;
        }
    };

    stream.write_all(b"ok\n").await?;

    // Relay until the slot side finishes, unless the slot is torn down
    // underneath the session first.
    let replaced = async {
        routes
            .wait_for(|table| match table.get(&name) {
                Some(entry) => entry.generation != generation || entry.status != SlotStatus::Ready,
                None => true,
            })
            .await
            .map(|_| ())
    };

    tokio::select! {
        res = copy_bidirectional(&mut stream, &mut upstream) => {
            match res {
                Ok((to_slot, to_client)) => {
                    debug!(command = %name, to_slot, to_client, "session finished");
                }
                Err(err) => {
                    debug!(command = %name, error = %err, "session relay error");
                }
            }
        }
        _ = replaced => {
            debug!(command = %name, "slot restarted mid-session; signalling client");
            let _ = stream.write_all(b"restarting\n").await;
        }
    }

    Ok(())
}

/// Read the command name line without buffering past the newline; any bytes
/// after it belong to the relayed stream.
async fn read_command_line(stream: &mut UnixStream) -> io::Result<String> {
    let mut name = Vec::with_capacity(32);
    let mut byte = [0u8; 1];
    loop {
        let n = stream.read(&mut byte).await?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed before command name",
            ));
        }
        if byte[0] == b'\n' {
            break;
        }
        if name.len() >= MAX_COMMAND_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "command name too long",
            ));
        }
        name.push(byte[0]);
    }

    let name = String::from_utf8_lossy(&name).trim().to_string();
    Ok(name)
}

async fn reply_err(stream: &mut UnixStream, reason: &str) -> io::Result<()> {
    stream.write_all(format!("err {reason}\n").as_bytes()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RouteEntry;

    fn entry(status: SlotStatus, is_leaf: bool, endpoint: Option<&str>) -> RouteEntry {
        RouteEntry {
            status,
            is_leaf,
            generation: 1,
            endpoint: endpoint.map(PathBuf::from),
        }
    }

    #[test]
    fn resolution_matches_the_error_taxonomy() {
        let mut table = RoutingTable::new();
        table.insert("boot".into(), entry(SlotStatus::Ready, false, None));
        table.insert("dead_srv".into(), entry(SlotStatus::Dead, true, None));
        table.insert("slow_srv".into(), entry(SlotStatus::Restarting, true, None));
        table.insert(
            "code_srv".into(),
            entry(SlotStatus::Ready, true, Some("/tmp/code.sock")),
        );
        table.insert("warm_srv".into(), entry(SlotStatus::Ready, true, None));

        assert!(matches!(
            resolve(&table, "nope"),
            Resolution::Reject(r) if r.starts_with("unknown-command")
        ));
        assert!(matches!(
            resolve(&table, "boot"),
            Resolution::Reject(r) if r.starts_with("invalid-command")
        ));
        assert!(matches!(
            resolve(&table, "dead_srv"),
            Resolution::Reject(r) if r.starts_with("unavailable")
        ));
        assert!(matches!(resolve(&table, "slow_srv"), Resolution::Wait));
        assert!(matches!(resolve(&table, "warm_srv"), Resolution::Wait));
        assert!(matches!(
            resolve(&table, "code_srv"),
            Resolution::Attach(p, 1) if p == PathBuf::from("/tmp/code.sock")
        ));
    }
}
