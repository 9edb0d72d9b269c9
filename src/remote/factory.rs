use std::sync::Arc;

use log::{debug, warn};

use crate::{
    connection::Connection,
    core::close::CloseReason,
    core::uri::AppUri,
    engine::engine::Engine,
    metrics::MetricsSink,
    protocol::ProtocolFactory,
    remote::remote::Remote,
};

/// Asynchronous creation of `Protocol` + `Connection` + `Remote` tuples via the addon registry
/// (`spec.md` §4.2).
///
/// The original's `PendingCreateCtx` — a heap-allocated `{callback, user_data}` freed on
/// delivery — is realized here as nothing at all: an `async fn` and its local variables already
/// are the continuation, and they're freed by normal Rust scoping when [`Self::create_remote`]
/// returns. See `DESIGN.md` for why this is simpler than translating the callback literally.
pub struct RemoteFactory {
    protocol_factory: Arc<dyn ProtocolFactory>,
    metrics: Arc<dyn MetricsSink>,
}

impl RemoteFactory {
    pub fn new(protocol_factory: Arc<dyn ProtocolFactory>, metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            protocol_factory,
            metrics,
        }
    }

    /// Asks the addon registry for a protocol to `uri`, bumping `engine`'s
    /// `has_uncompleted_async_task` counter for the duration of the attempt.
    ///
    /// Returns `None` if the addon failed to produce a protocol at all (`RemoteError::CreateFailed`
    /// territory) or if `engine` started closing while the protocol was being created — in the
    /// latter case the freshly-created protocol is itself closed (and the counter stays bumped
    /// until that completes) before this returns, so no `Remote` is ever materialized for a
    /// protocol the engine would immediately have to tear down. See Testable Property 7.
    pub async fn create_remote(&self, engine: &Engine, uri: AppUri) -> Option<Remote> {
        // Held across both the creation and, if the engine started closing in the meantime, the
        // immediate close-on-race below — never dropped to zero in between, or a concurrent
        // `wait_closed` could observe a falsely-drained engine while a protocol is still about to
        // be torn down (`spec.md` §3 invariant 4).
        engine.begin_async_task().await;
        let started = std::time::Instant::now();
        let result = self.protocol_factory.create_protocol_with_uri(&uri).await;
        self.metrics
            .record_duration("remote.create", uri.as_str(), started.elapsed());

        let protocol = match result {
            Ok(protocol) => protocol,
            Err(err) => {
                engine.end_async_task().await;
                warn!("engine {}: failed to create protocol for {uri}: {err:#}", engine.uri());
                return None;
            }
        };

        if engine.is_closing().await {
            debug!(
                "engine {}: protocol for {uri} created after engine started closing, discarding it",
                engine.uri()
            );
            protocol.close(CloseReason::SystemShutdown).await;
            engine.end_async_task().await;
            return None;
        }

        engine.end_async_task().await;

        let connection = Connection::new(protocol);
        let mut remote = Remote::new(connection);
        let remote_id = remote.id();
        let engine_for_close = engine.clone();
        remote
            .connection()
            .set_on_closed(Box::new(move || {
                tokio::spawn(async move {
                    engine_for_close.on_remote_closed(remote_id).await;
                });
            }));
        remote.set_state(crate::remote::remote::RemoteState::Dialing);
        Some(remote)
    }

    /// Completes the dial for a remote already placed in the weak table, looked up by id so the
    /// caller doesn't have to hold the table lock across the `.await` (`spec.md` §5's "no locking
    /// held across a suspension point"). Records how long the connect phase took, mirroring the
    /// service-hub-style duration metric from `SPEC_FULL.md` §4.
    pub async fn connect_weak(&self, engine: &Engine, remote_id: crate::remote::remote::RemoteId) -> anyhow::Result<()> {
        let protocol = {
            let state = engine.0.state.lock().await;
            state
                .table
                .find_weak_by_id(remote_id)
                .map(|r| r.connection().protocol())
        };
        let protocol = match protocol {
            Some(protocol) => protocol,
            None => anyhow::bail!("remote {remote_id} is no longer weak"),
        };

        let started = std::time::Instant::now();
        let result = protocol.connect().await;
        self.metrics
            .record_duration("remote.connect", protocol.uri().as_str(), started.elapsed());
        result
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::{
        engine::config::EngineConfig,
        metrics::test_support::RecordingMetricsSink,
        protocol::{ClosedCallback, Protocol, ProtocolFactory},
    };

    struct ImmediateProtocol(AppUri);

    #[async_trait]
    impl Protocol for ImmediateProtocol {
        fn uri(&self) -> &AppUri {
            &self.0
        }
        async fn connect(&self) -> anyhow::Result<()> {
            Ok(())
        }
        async fn send_msg(&self, _msg: crate::message::Message) -> anyhow::Result<()> {
            Ok(())
        }
        fn set_on_closed(&self, _cb: ClosedCallback) {}
        async fn close(&self, _reason: CloseReason) {}
    }

    struct ImmediateFactory;

    #[async_trait]
    impl ProtocolFactory for ImmediateFactory {
        async fn create_protocol_with_uri(&self, uri: &AppUri) -> anyhow::Result<Arc<dyn Protocol>> {
            Ok(Arc::new(ImmediateProtocol(uri.clone())))
        }
    }

    #[tokio::test]
    async fn create_and_connect_record_durations() {
        let metrics = Arc::new(RecordingMetricsSink::default());
        let protocol_factory: Arc<dyn ProtocolFactory> = Arc::new(ImmediateFactory);
        let mut config = EngineConfig::new(AppUri::from("A"), "graph-1", protocol_factory);
        config.metrics = metrics.clone() as Arc<dyn crate::metrics::MetricsSink>;
        let engine = Engine::new(config);

        let remote = engine
            .remote_factory()
            .create_remote(&engine, AppUri::from("B"))
            .await
            .expect("the immediate factory always succeeds");
        let remote_id = remote.id();
        {
            let mut state = engine.0.state.lock().await;
            state.table.add_weak(remote);
        }
        engine
            .remote_factory()
            .connect_weak(&engine, remote_id)
            .await
            .expect("the immediate protocol always connects");

        let records = metrics.records.lock().unwrap();
        let phases: Vec<&str> = records.iter().map(|(phase, _, _)| phase.as_str()).collect();
        assert_eq!(phases, vec!["remote.create", "remote.connect"]);
    }
}
