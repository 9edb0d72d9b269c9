use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::{core::close::CloseReason, core::uri::AppUri, message::Message};

/// A callback invoked exactly once, when a [`Protocol`] has finished closing.
///
/// Boxed `FnOnce` stands in for the original's heap-allocated, manually-freed continuation
/// context (`ten_engine_on_protocol_created_ctx_t` and friends) — the idiomatic Rust equivalent.
pub type ClosedCallback = Box<dyn FnOnce() + Send>;

/// An opaque, reference-counted I/O capability: dial, send, close.
///
/// This is the boundary the core never looks past (`spec.md` §1: "the core consumes an opaque
/// `Protocol` capability"). Implementations own the real wire framing and socket; this crate only
/// ever holds `Arc<dyn Protocol>`, so the "engine holds exactly one reference count" invariant in
/// `spec.md` §3 is realized directly by `Arc`'s strong count rather than manual refcounting.
#[async_trait]
pub trait Protocol: Send + Sync {
    /// The peer URI this protocol was created for.
    fn uri(&self) -> &AppUri;

    /// Completes the dial, i.e. whatever handshake turns a freshly-created protocol object into
    /// one that is actually ready to carry traffic. Distinct from creation: the addon can hand
    /// back a `Protocol` instance before the peer has accepted the connection, and this is the
    /// step that can fail independently (`spec.md` §4.4, `Weak | on_connect_error | Closed`).
    async fn connect(&self) -> Result<()>;

    /// Sends a message over the wire. Errors are reported back to the caller, never retried here
    /// (`spec.md` non-goals: no reliable delivery/retry in this core).
    async fn send_msg(&self, msg: Message) -> Result<()>;

    /// Registers the callback to invoke once this protocol has fully closed.
    ///
    /// Implementations must guarantee the callback fires eventually after [`Protocol::close`] is
    /// called, even if closing is itself asynchronous.
    fn set_on_closed(&self, cb: ClosedCallback);

    /// Requests that the protocol close for the given reason. Does not block on the closed
    /// callback firing.
    async fn close(&self, reason: CloseReason);
}

/// The addon registry: creates a new outbound [`Protocol`] for a peer URI.
///
/// Stands in for `ten_addon_create_protocol_with_uri` in `spec.md` §4.2/§6. Modeled as an async
/// trait (rather than a callback-taking function) because that is the idiomatic Rust shape for
/// "kick off an operation that completes later" — the same shape the teacher crate uses for
/// `Connector`/`Acceptor`.
#[async_trait]
pub trait ProtocolFactory: Send + Sync {
    /// Creates a protocol with the *outbound-default* role for `uri`.
    async fn create_protocol_with_uri(&self, uri: &AppUri) -> Result<Arc<dyn Protocol>>;
}
