// src/router/mod.rs

//! The command router: public unix socket sessions bridged to leaf slots.
//!
//! Session protocol on the public socket:
//! - the client sends one line: the command (leaf slot) name;
//! - the router replies `ok` and from then on relays bytes in both
//!   directions between the client and the slot's session socket, until
//!   the slot side closes (any final status frame the slot process emits
//!   is relayed verbatim);
//! - or the router replies a single `err <kind>: <detail>` line and closes:
//!   - `err unknown-command` — no slot with that name;
//!   - `err invalid-command` — the slot exists but is not a leaf;
//!   - `err unavailable` — the slot is permanently dead;
//!   - `err busy` — the slot did not become ready within the session wait;
//! - a slot torn down mid-session terminates the relay with a single
//!   `restarting` line instead of silently dropping the connection.
//!
//! Sessions only ever read the published routing table; they never touch
//! the slot tree.

pub mod listener;
pub mod session;

pub use listener::{bind_public_socket, spawn_router};
