use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::{Mutex, Notify};

use crate::{
    connection::Connection,
    core::close::CloseReason,
    core::error::{EngineCloseError, RemoteError, RemoteTableError},
    core::uri::AppUri,
    engine::{config::EngineConfig, start_graph::StartGraphAggregate},
    message::{Message, Payload, StatusCode},
    protocol::Protocol,
    remote::{
        factory::RemoteFactory,
        remote::{Remote, RemoteId, RemoteState},
        table::RemoteTable,
    },
};

/// Everything about an [`Engine`] that requires synchronized access. Guarded by a single
/// `tokio::sync::Mutex` rather than the raw "no locking, single-threaded core" model of
/// `spec.md` §5: the engine's asynchronous continuations (protocol-created, connected,
/// connect-error, closed) are posted back as independent tokio tasks rather than onto one
/// literal OS thread, so something has to serialize access to `table`/`is_closing`. Because
/// every mutation is funneled through the methods on this struct and none of them spawn nested
/// work that re-enters the lock, there is exactly one logical owner at a time — see `DESIGN.md`.
pub(crate) struct EngineState {
    pub(crate) table: RemoteTable,
    pub(crate) is_closing: bool,
    /// Promoted from the gate (`bool`) described in `spec.md` §9 to a counter: `start_graph`
    /// fans out to multiple peers concurrently, so a single boolean would be cleared by
    /// whichever dial's protocol-create finishes first while siblings are still pending,
    /// violating invariant 4 in `spec.md` §3. See `DESIGN.md`'s resolved Open Question.
    pub(crate) uncompleted_async_tasks: u32,
    /// The one externally-received `start_graph` whose result must eventually be returned
    /// (`spec.md` §3). Set at orchestration start, cleared when answered.
    pub(crate) original_start_graph_cmd: Option<Message>,
    pub(crate) start_graph_aggregate: Option<StartGraphAggregate>,
}

impl EngineState {
    fn new() -> Self {
        Self {
            table: RemoteTable::default(),
            is_closing: false,
            uncompleted_async_tasks: 0,
            original_start_graph_cmd: None,
            start_graph_aggregate: None,
        }
    }

    /// `spec.md` §4.7: final shutdown is allowed only when both tables are empty and there is no
    /// uncompleted async task.
    fn fully_drained(&self) -> bool {
        self.table.is_empty() && self.uncompleted_async_tasks == 0
    }
}

pub(crate) struct EngineInner {
    pub(crate) config: EngineConfig,
    pub(crate) remote_factory: RemoteFactory,
    pub(crate) state: Mutex<EngineState>,
    pub(crate) closed_notify: Notify,
}

/// A per-graph message router: the engine core described in `spec.md` §1.
///
/// Cheaply `Clone`-able (an `Arc` handle) so that asynchronous continuations spawned for one
/// dial, create, or close can carry their own owned reference back to the engine rather than
/// borrowing it, matching the non-owning back-reference design in `spec.md` §9.
#[derive(Clone)]
pub struct Engine(pub(crate) Arc<EngineInner>);

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let remote_factory = RemoteFactory::new(config.protocol_factory.clone(), config.metrics.clone());
        Self(Arc::new(EngineInner {
            config,
            remote_factory,
            state: Mutex::new(EngineState::new()),
            closed_notify: Notify::new(),
        }))
    }

    pub fn uri(&self) -> &AppUri {
        &self.0.config.uri
    }

    pub fn graph_id(&self) -> &str {
        &self.0.config.graph_id
    }

    pub fn long_running_mode(&self) -> bool {
        self.0.config.long_running_mode
    }

    pub(crate) fn remote_factory(&self) -> &RemoteFactory {
        &self.0.remote_factory
    }

    pub async fn is_closing(&self) -> bool {
        self.0.state.lock().await.is_closing
    }

    /// Whether the engine has finished shutting down: both tables empty and no async task in
    /// flight, after a close was requested. Exposed for tests to assert Testable Property 6
    /// without racing a background task.
    pub async fn is_finalized(&self) -> bool {
        let state = self.0.state.lock().await;
        state.is_closing && state.fully_drained()
    }

    /// Waits until the engine has fully finalized shutdown. No-op (returns immediately) if
    /// [`Self::close_async`] was never called.
    pub async fn wait_closed(&self) {
        loop {
            if self.is_finalized().await {
                return;
            }
            self.0.closed_notify.notified().await;
        }
    }

    pub(crate) async fn begin_async_task(&self) {
        let mut state = self.0.state.lock().await;
        state.uncompleted_async_tasks += 1;
    }

    pub(crate) async fn end_async_task(&self) {
        let mut state = self.0.state.lock().await;
        state.uncompleted_async_tasks = state.uncompleted_async_tasks.saturating_sub(1);
        self.try_finalize(&mut state);
    }

    fn try_finalize(&self, state: &mut EngineState) {
        if state.is_closing && state.fully_drained() {
            debug!("engine {}: fully drained, shutdown finalized", self.uri());
        }
        self.0.closed_notify.notify_waiters();
    }

    /// `spec.md` §6: `check_remote_is_existed`.
    pub async fn check_remote_is_existed(&self, uri: &AppUri) -> Option<RemoteId> {
        self.0.state.lock().await.table.find_any(uri).map(|r| r.id())
    }

    /// `spec.md` §6: `check_remote_is_duplicated`. Pure existence-plus-tiebreak check, with no
    /// exclusion — callers use this before their own candidate remote is in any table.
    pub async fn check_remote_is_duplicated(&self, uri: &AppUri) -> bool {
        let local = self.uri().clone();
        let state = self.0.state.lock().await;
        state.table.find_any(uri).is_some() && crate::remote::dedup::is_duplicate(&local, uri)
    }

    /// `spec.md` §6: `check_remote_is_weak`.
    pub async fn check_remote_is_weak(&self, remote_id: RemoteId) -> bool {
        self.0.state.lock().await.table.is_weak(remote_id)
    }

    /// Promotes an accepted inbound connection straight to a strong remote (`spec.md` §3,
    /// "Lifecycles"). Precondition: no existing strong remote for `uri`; violating it is a
    /// caller bug reported as [`RemoteTableError::StrongRemoteAlreadyExists`] rather than a
    /// panic, since — unlike the outbound dial path this crate otherwise drives — an inbound
    /// accept is triggered by a remote peer the caller doesn't fully control the timing of.
    pub async fn link_orphan_connection_to_remote(
        &self,
        connection: Connection,
        uri: AppUri,
    ) -> Result<RemoteId, RemoteTableError> {
        let mut state = self.0.state.lock().await;
        if state.table.find_strong(&uri).is_some() {
            return Err(RemoteTableError::StrongRemoteAlreadyExists(uri));
        }

        let mut remote = Remote::new(connection);
        remote.set_state(RemoteState::Strong);
        let remote_id = remote.id();
        let engine = self.clone();
        remote
            .connection()
            .set_on_closed(Box::new(move || {
                tokio::spawn(async move {
                    engine.on_remote_closed(remote_id).await;
                });
            }));
        info!("engine {}: linked inbound connection to {uri} as a strong remote", self.uri());
        state.table.add_strong(remote);
        Ok(remote_id)
    }

    /// `spec.md` §6: `upgrade_weak_remote_to_normal_remote`, i.e. the `Weak → Strong` promotion
    /// described in `spec.md` §4.4. Returns `true` if the remote was promoted, `false` if it was
    /// found to be a duplicate and destroyed instead.
    ///
    /// All table mutation happens with the lock held; every `.await` on a `Remote`/`Protocol`
    /// method happens after the lock is released (`SPEC_FULL.md` §5), so the outcome of the
    /// mutation is captured into `Outcome` first and acted on afterwards.
    pub async fn upgrade_weak_remote_to_normal_remote(&self, remote_id: RemoteId) -> bool {
        enum Outcome {
            Unknown,
            Duplicate {
                pending_cmd: Option<Message>,
                to_close: Remote,
            },
            Promoted {
                pending_cmd: Option<Message>,
                protocol: Option<Arc<dyn Protocol>>,
                evicted: Option<Remote>,
            },
        }

        let outcome = {
            let mut state = self.0.state.lock().await;
            let uri = match state.table.find_weak_by_id(remote_id) {
                Some(r) => r.uri().clone(),
                None => {
                    warn!(
                        "engine {}: asked to promote unknown weak remote {remote_id}",
                        self.uri()
                    );
                    return false;
                }
            };

            let local = self.uri().clone();
            let duplicate = state.table.find_any_except(&uri, remote_id).is_some()
                && crate::remote::dedup::is_duplicate(&local, &uri);

            if duplicate {
                match state.table.remove_weak(remote_id) {
                    Some(mut remote) => {
                        let pending_cmd = remote.take_on_server_connected_cmd();
                        Outcome::Duplicate {
                            pending_cmd,
                            to_close: remote,
                        }
                    }
                    None => Outcome::Unknown,
                }
            } else {
                let evicted = state.table.take_any_except(&uri, remote_id);
                state.table.promote(remote_id);
                let (pending_cmd, protocol) = match state.table.find_strong_mut(&uri) {
                    Some(remote) => {
                        remote.set_state(RemoteState::Strong);
                        let cmd = remote.take_on_server_connected_cmd();
                        (cmd, Some(remote.connection().protocol()))
                    }
                    None => (None, None),
                };
                Outcome::Promoted {
                    pending_cmd,
                    protocol,
                    evicted,
                }
            }
        };

        match outcome {
            Outcome::Unknown => false,
            Outcome::Duplicate { pending_cmd, to_close } => {
                info!(
                    "engine {}: remote {} is a duplicate of an existing channel, dropping it",
                    self.uri(),
                    to_close.uri()
                );
                to_close.close(CloseReason::Duplicate).await;
                if let Some(cmd) = pending_cmd {
                    let result = cmd.result(StatusCode::Ok, None);
                    self.dispatch_local(result).await;
                }
                false
            }
            Outcome::Promoted {
                pending_cmd,
                protocol,
                evicted,
            } => {
                if let Some(evicted) = evicted {
                    info!(
                        "engine {}: newly-connected remote wins the tiebreak, evicting the existing channel to {}",
                        self.uri(),
                        evicted.uri()
                    );
                    evicted.close(CloseReason::Duplicate).await;
                }
                if let (Some(cmd), Some(protocol)) = (pending_cmd, protocol) {
                    if let Err(err) = protocol.send_msg(cmd.clone()).await {
                        warn!(
                            "engine {}: failed to send pending command to {} after promotion: {err:#}",
                            self.uri(),
                            protocol.uri()
                        );
                        let result = cmd.result(
                            StatusCode::Error,
                            Some(RemoteError::SendFailed(err.to_string()).detail()),
                        );
                        self.dispatch_local(result).await;
                    }
                }
                true
            }
        }
    }

    /// `spec.md` §4.4: `Weak | on_connect_error | Closed`.
    pub async fn remote_connect_error(&self, remote_id: RemoteId, detail: impl Into<String>) {
        let detail = detail.into();
        let (cmd, protocol) = {
            let mut state = self.0.state.lock().await;
            match state.table.find_weak_by_id_mut(remote_id) {
                Some(remote) => {
                    let cmd = remote.take_on_server_connected_cmd();
                    let protocol = remote.connection().protocol();
                    (cmd, Some(protocol))
                }
                None => (None, None),
            }
        };

        if let Some(cmd) = cmd {
            let result = cmd.result(StatusCode::Error, Some(detail));
            self.dispatch_local(result).await;
        }

        if let Some(protocol) = protocol {
            protocol.close(CloseReason::ConnectError).await;
        }
    }

    /// `spec.md` §4.4: the connection-closed callback, re-entered whenever a `Remote`'s
    /// underlying protocol finishes closing — whether that close was initiated by the peer, by
    /// [`Self::upgrade_weak_remote_to_normal_remote`] evicting a loser, or by
    /// [`Self::close_async`] draining the engine.
    pub(crate) async fn on_remote_closed(&self, remote_id: RemoteId) {
        let mut state = self.0.state.lock().await;

        let was_weak = if state.table.remove_weak(remote_id).is_some() {
            true
        } else if state.table.remove_strong_by_id(remote_id).is_some() {
            false
        } else {
            // Neither table has it: either it was already evicted (the replaced loser of a
            // tiebreak) or this is a duplicate delivery of the closed callback. Destroy-and-return
            // per `spec.md` §4.4, collapsing the "mismatched same-URI remote" branch into this
            // one — see `DESIGN.md` for why that's equivalent under this crate's ownership model.
            debug!(
                "engine {}: remote {remote_id} closed after already being detached from the tables",
                self.uri()
            );
            self.try_finalize(&mut state);
            return;
        };

        debug!(
            "engine {}: remote {remote_id} closed ({})",
            self.uri(),
            if was_weak { "weak" } else { "strong" }
        );

        if state.is_closing {
            self.try_finalize(&mut state);
            return;
        }

        if !was_weak && !self.0.config.long_running_mode {
            drop(state);
            info!(
                "engine {}: last strong remote closed outside long-running mode, closing engine",
                self.uri()
            );
            let _ = self.close_async().await;
        }
    }

    /// `spec.md` §4.7: marks the engine closing and asks every owned remote to close. Idempotent:
    /// a second call after the first returns [`EngineCloseError::AlreadyClosing`] without
    /// re-walking the tables.
    pub async fn close_async(&self) -> Result<(), EngineCloseError> {
        let protocols = {
            let mut state = self.0.state.lock().await;
            if state.is_closing {
                return Err(EngineCloseError::AlreadyClosing);
            }
            state.is_closing = true;
            let protocols = state.table.all_protocols();
            self.try_finalize(&mut state);
            protocols
        };

        info!(
            "engine {}: closing, draining {} remote(s)",
            self.uri(),
            protocols.len()
        );
        for protocol in protocols {
            tokio::spawn(async move {
                protocol.close(CloseReason::SystemShutdown).await;
            });
        }
        Ok(())
    }

    /// Delivers a locally-destined message to the host's [`crate::engine::dispatch::LocalDispatcher`].
    ///
    /// Before forwarding, this checks whether `msg` is the `cmd_result` answering one of the
    /// outstanding per-hop `start_graph` commands started by [`Self::start_graph`]. If it is, the
    /// result is absorbed into the aggregate instead of being forwarded — the caller only ever
    /// sees the one aggregate answer to the original `start_graph`, once every hop has reported
    /// (`spec.md` §4.6, "the orchestrator answers the original `start_graph` exactly once").
    pub async fn dispatch_local(&self, msg: Message) {
        if let Payload::CmdResult { status, detail } = &msg.payload {
            let cmd_id = msg.cmd_id;
            let status = *status;
            let detail = detail.clone();

            let finished = {
                let mut state = self.0.state.lock().await;
                match state.start_graph_aggregate.as_mut() {
                    Some(aggregate) => match aggregate.record(cmd_id, status, detail) {
                        Some(true) => {
                            let aggregate = state.start_graph_aggregate.take().unwrap();
                            let original = state.original_start_graph_cmd.take();
                            Some((aggregate, original))
                        }
                        Some(false) => return,
                        None => None,
                    },
                    None => None,
                }
            };

            if let Some((aggregate, original)) = finished {
                let (final_status, final_detail) = aggregate.finish();
                if let Some(original) = original {
                    info!(
                        "engine {}: all start_graph hops reported, answering the original request",
                        self.uri()
                    );
                    let answer = original.result(final_status, final_detail);
                    self.0.config.local_dispatcher.dispatch(answer).await;
                }
                return;
            }
        }

        self.0.config.local_dispatcher.dispatch(msg).await;
    }
}
