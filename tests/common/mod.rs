//! Shared in-memory `Protocol`/`ProtocolFactory` mocks for exercising [`engine_remote_core`]
//! without real I/O, in the style of the teacher crate's `DirectConnection`/`DirectMessageStream`
//! test pattern (`SPEC_FULL.md` §8).

use std::sync::{Arc, Mutex, Once};

use anyhow::Result;
use async_trait::async_trait;
use engine_remote_core::{
    core::{close::CloseReason, hash::HashMap, uri::AppUri},
    message::Message,
    protocol::{ClosedCallback, Protocol, ProtocolFactory},
};

static LOG_INIT: Once = Once::new();

/// Installs a `log` logger once per process, in the style of the teacher crate's
/// `test-utils::setup::setup_test_environment` (itself `Once`-gated). The teacher pairs that
/// helper with `tracing-subscriber` because its own production code logs through `tracing`; this
/// crate's production code logs through the plain `log` facade (`spec.md`'s ambient logging, see
/// `DESIGN.md`), so `env_logger` is the direct match — it renders whatever `RUST_LOG` asks for
/// and is a no-op otherwise.
pub fn setup_test_environment() {
    LOG_INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

#[derive(Clone)]
enum ConnectBehavior {
    Succeed,
    Fail(String),
}

/// Builds a [`MockProtocol`] directly, bypassing [`MockProtocolFactory`] — for wiring up an
/// "inbound" connection a test wants to hand to `link_orphan_connection_to_remote` without it
/// being clobbered by (or clobbering) whatever the engine's own outbound dials create for the
/// same URI in the factory's registry.
pub fn standalone_protocol(uri: &str) -> Arc<MockProtocol> {
    Arc::new(MockProtocol {
        uri: AppUri::from(uri),
        connect_behavior: ConnectBehavior::Succeed,
        inner: Mutex::new(MockProtocolInner {
            sent: Vec::new(),
            on_closed: None,
            closed: false,
        }),
    })
}

struct MockProtocolInner {
    sent: Vec<Message>,
    on_closed: Option<ClosedCallback>,
    closed: bool,
}

/// A `Protocol` that never touches a socket: `connect`/`send_msg`/`close` all resolve immediately
/// against in-memory state a test can inspect via [`MockProtocolFactory::protocol_for`].
pub struct MockProtocol {
    uri: AppUri,
    connect_behavior: ConnectBehavior,
    inner: Mutex<MockProtocolInner>,
}

impl MockProtocol {
    pub fn uri(&self) -> &AppUri {
        &self.uri
    }

    /// Messages handed to `send_msg` so far, in order.
    pub fn sent(&self) -> Vec<Message> {
        self.inner.lock().unwrap().sent.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().closed
    }

    /// Simulates the peer (or the transport) tearing the connection down out from under the
    /// engine, firing the registered closed-callback exactly as a real close would.
    pub async fn simulate_peer_close(&self) {
        self.close(CloseReason::Normal).await;
    }
}

#[async_trait]
impl Protocol for MockProtocol {
    fn uri(&self) -> &AppUri {
        &self.uri
    }

    async fn connect(&self) -> Result<()> {
        match &self.connect_behavior {
            ConnectBehavior::Succeed => Ok(()),
            ConnectBehavior::Fail(detail) => Err(anyhow::anyhow!(detail.clone())),
        }
    }

    async fn send_msg(&self, msg: Message) -> Result<()> {
        self.inner.lock().unwrap().sent.push(msg);
        Ok(())
    }

    fn set_on_closed(&self, cb: ClosedCallback) {
        self.inner.lock().unwrap().on_closed = Some(cb);
    }

    async fn close(&self, _reason: CloseReason) {
        let cb = {
            let mut inner = self.inner.lock().unwrap();
            if inner.closed {
                return;
            }
            inner.closed = true;
            inner.on_closed.take()
        };
        if let Some(cb) = cb {
            cb();
        }
    }
}

enum CreateBehavior {
    Succeed,
    Fail,
}

struct FactoryState {
    create_behavior: HashMap<String, CreateBehavior>,
    connect_behavior: HashMap<String, ConnectBehavior>,
    create_delay: HashMap<String, std::time::Duration>,
    created: HashMap<String, Arc<MockProtocol>>,
}

/// An addon registry standing in for the real one: creates [`MockProtocol`]s, with per-URI
/// overrides for create/connect failure so tests can drive the error paths in `spec.md` §7.
#[derive(Default)]
pub struct MockProtocolFactory {
    state: Mutex<FactoryState>,
}

impl Default for FactoryState {
    fn default() -> Self {
        Self {
            create_behavior: HashMap::default(),
            connect_behavior: HashMap::default(),
            create_delay: HashMap::default(),
            created: HashMap::default(),
        }
    }
}

impl MockProtocolFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(FactoryState::default()),
        })
    }

    /// The next `create_protocol_with_uri(uri)` call will fail.
    pub fn fail_create(&self, uri: &str) {
        self.state
            .lock()
            .unwrap()
            .create_behavior
            .insert(uri.to_owned(), CreateBehavior::Fail);
    }

    /// Protocols created for `uri` will fail to `connect`.
    pub fn fail_connect(&self, uri: &str, detail: impl Into<String>) {
        self.state
            .lock()
            .unwrap()
            .connect_behavior
            .insert(uri.to_owned(), ConnectBehavior::Fail(detail.into()));
    }

    /// The most recently created protocol for `uri`, if any.
    pub fn protocol_for(&self, uri: &str) -> Option<Arc<MockProtocol>> {
        self.state.lock().unwrap().created.get(uri).cloned()
    }

    /// Makes the next `create_protocol_with_uri(uri)` call take `dur` before resolving, so a
    /// test can race it against `Engine::close_async` (Testable Property 7).
    pub fn delay_create(&self, uri: &str, dur: std::time::Duration) {
        self.state
            .lock()
            .unwrap()
            .create_delay
            .insert(uri.to_owned(), dur);
    }
}

#[async_trait]
impl ProtocolFactory for MockProtocolFactory {
    async fn create_protocol_with_uri(&self, uri: &AppUri) -> Result<Arc<dyn Protocol>> {
        let (connect_behavior, delay) = {
            let mut state = self.state.lock().unwrap();
            if matches!(state.create_behavior.get(uri.as_str()), Some(CreateBehavior::Fail)) {
                anyhow::bail!("mock: refusing to create a protocol for {uri}");
            }
            let connect_behavior = state
                .connect_behavior
                .get(uri.as_str())
                .cloned()
                .unwrap_or(ConnectBehavior::Succeed);
            let delay = state.create_delay.get(uri.as_str()).copied();
            (connect_behavior, delay)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let protocol = Arc::new(MockProtocol {
            uri: uri.clone(),
            connect_behavior,
            inner: Mutex::new(MockProtocolInner {
                sent: Vec::new(),
                on_closed: None,
                closed: false,
            }),
        });
        self.state
            .lock()
            .unwrap()
            .created
            .insert(uri.as_str().to_owned(), protocol.clone());
        Ok(protocol as Arc<dyn Protocol>)
    }
}

/// A [`engine_remote_core::LocalDispatcher`] that records every message it receives, for
/// assertions against what the engine delivered locally (synthetic `cmd_result`s, the final
/// `start_graph` answer).
#[derive(Default)]
pub struct RecordingDispatcher {
    received: Mutex<Vec<Message>>,
}

impl RecordingDispatcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn received(&self) -> Vec<Message> {
        self.received.lock().unwrap().clone()
    }
}

#[async_trait]
impl engine_remote_core::LocalDispatcher for RecordingDispatcher {
    async fn dispatch(&self, msg: Message) {
        self.received.lock().unwrap().push(msg);
    }
}
