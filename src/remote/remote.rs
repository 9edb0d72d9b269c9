use std::{
    fmt::Display,
    sync::atomic::{AtomicU64, Ordering},
};

use anyhow::Result;

use crate::{connection::Connection, core::close::CloseReason, core::uri::AppUri, message::Message};

static NEXT_REMOTE_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies a [`Remote`] by construction order, standing in for the pointer identity the
/// original uses for `remove_weak`/`is_weak` (`spec.md` §4.1). A `HashMap`/`Vec`-owned value has
/// no stable address to compare, so this crate hands out a monotonic ID instead; see `DESIGN.md`
/// for why this is the one deliberate representation change from `spec.md` §9.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RemoteId(u64);

impl RemoteId {
    fn next() -> Self {
        Self(NEXT_REMOTE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl Display for RemoteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "remote#{}", self.0)
    }
}

/// The lifecycle state of a [`Remote`] created by the outbound (dial) path (`spec.md` §4.4).
///
/// This is tracked on the `Remote` itself for logging/introspection; which table a `Remote`
/// actually sits in (or that it sits in none) is what the rest of the crate uses to decide
/// behavior, per invariant 2 in `spec.md` §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteState {
    Dialing,
    Weak,
    Strong,
    Closing,
    Closed,
}

/// The engine's handle to one peer app (`spec.md` §3).
///
/// Exclusively owned by whichever table it sits in ([`crate::remote::table::RemoteTable`]); once
/// removed from every table it is dropped, which drops its [`Connection`] and the `Arc` reference
/// count it held on the underlying [`crate::protocol::Protocol`].
pub struct Remote {
    id: RemoteId,
    uri: AppUri,
    connection: Connection,
    on_server_connected_cmd: Option<Message>,
    state: RemoteState,
}

impl Remote {
    /// Wraps a freshly-created connection as a dialing remote, not yet in any table.
    pub fn new(connection: Connection) -> Self {
        let uri = connection.uri().clone();
        Self {
            id: RemoteId::next(),
            uri,
            connection,
            on_server_connected_cmd: None,
            state: RemoteState::Dialing,
        }
    }

    pub fn id(&self) -> RemoteId {
        self.id
    }

    pub fn uri(&self) -> &AppUri {
        &self.uri
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn state(&self) -> RemoteState {
        self.state
    }

    pub fn set_state(&mut self, state: RemoteState) {
        self.state = state;
    }

    /// Stores the command to send once this remote transitions from `Weak` to `Strong`
    /// (typically the per-hop `start_graph`, `spec.md` §4.4).
    pub fn set_on_server_connected_cmd(&mut self, cmd: Message) {
        self.on_server_connected_cmd = Some(cmd);
    }

    pub fn take_on_server_connected_cmd(&mut self) -> Option<Message> {
        self.on_server_connected_cmd.take()
    }

    pub fn has_on_server_connected_cmd(&self) -> bool {
        self.on_server_connected_cmd.is_some()
    }

    pub async fn send(&self, msg: Message) -> Result<()> {
        self.connection.send(msg).await
    }

    pub async fn close(&self, reason: CloseReason) {
        self.connection.close(reason).await;
    }
}
