use std::sync::Arc;

use anyhow::Result;
use uuid::Uuid;

use crate::{
    core::{close::CloseReason, uri::AppUri},
    message::Message,
    protocol::{ClosedCallback, Protocol},
};

/// Migration state of a connection, carried over from the host engine's wider connection
/// lifecycle (`spec.md` §3). Every connection this core creates is built directly against an
/// already-attached engine, so it is always [`MigrationState::Done`]; the enum exists so the
/// invariant is visible rather than implicit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationState {
    Done,
}

/// Thin wrapper owning exactly one [`Protocol`].
///
/// Exposes `send`, `set_on_closed`, and `close` as the only operations the rest of this crate
/// needs; it never exposes the protocol itself, so a `Connection`'s one `Arc<dyn Protocol>` is the
/// engine's "one reference count" from `spec.md` §3.
pub struct Connection {
    uuid: Uuid,
    uri: AppUri,
    protocol: Arc<dyn Protocol>,
    migration_state: MigrationState,
}

impl Connection {
    /// Wraps a freshly-created protocol as a connection in the outbound (dial) path.
    pub fn new(protocol: Arc<dyn Protocol>) -> Self {
        let uri = protocol.uri().clone();
        Self {
            uuid: Uuid::new_v4(),
            uri,
            protocol,
            migration_state: MigrationState::Done,
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn uri(&self) -> &AppUri {
        &self.uri
    }

    pub fn migration_state(&self) -> MigrationState {
        self.migration_state
    }

    /// Completes the dial. See [`Protocol::connect`].
    pub async fn connect(&self) -> Result<()> {
        self.protocol.connect().await
    }

    pub async fn send(&self, msg: Message) -> Result<()> {
        self.protocol.send_msg(msg).await
    }

    pub fn set_on_closed(&self, cb: ClosedCallback) {
        self.protocol.set_on_closed(cb);
    }

    pub async fn close(&self, reason: CloseReason) {
        self.protocol.close(reason).await;
    }

    /// Clones the owned protocol handle, e.g. so it can be closed from a spawned task without
    /// holding a lock on the table that owns this connection's [`crate::remote::remote::Remote`].
    pub fn protocol(&self) -> Arc<dyn Protocol> {
        self.protocol.clone()
    }
}
