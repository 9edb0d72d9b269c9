use async_trait::async_trait;

use crate::message::Message;

/// The engine's local dispatch sink (`spec.md` §6, "Host engine API": `dispatch_msg`).
///
/// Graph parsing, extension loading, and extension-thread scheduling are all out of scope for
/// this crate (`spec.md` §1); this trait is the seam a host application plugs into to actually
/// deliver a locally-destined message (typically a synthesized `cmd_result`) to its extensions.
#[async_trait]
pub trait LocalDispatcher: Send + Sync {
    async fn dispatch(&self, msg: Message);
}

/// A [`LocalDispatcher`] that drops everything. Useful for callers that only care about routing
/// to remotes and don't need local delivery (e.g. a router-only process).
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDispatcher;

#[async_trait]
impl LocalDispatcher for NullDispatcher {
    async fn dispatch(&self, _msg: Message) {}
}
