use log::{info, warn};
use uuid::Uuid;

use crate::{
    core::close::CloseReason,
    core::error::RemoteError,
    core::hash::HashSet,
    core::uri::AppUri,
    engine::engine::Engine,
    message::{Message, StatusCode},
    remote::remote::RemoteState,
};

/// Tracks the per-hop outcomes of one in-flight `start_graph` fan-out (`spec.md` §4.6).
///
/// The original leaves "once all per-hop results are in" to an unspecified existing aggregator
/// external to this core; the closest-fit concrete realization, grounded in the
/// `ten_engine_return_ok_for_cmd_start_graph`/`ten_engine_return_error_for_cmd_start_graph` call
/// sites named in `spec.md` §6, is a join-all-then-answer-once counter keyed by each per-hop
/// command's `cmd_id` — the only identifier a `cmd_result` flowing back through
/// [`Engine::dispatch_local`] carries.
pub(crate) struct StartGraphAggregate {
    outstanding: HashSet<Uuid>,
    any_error: Option<String>,
}

impl StartGraphAggregate {
    pub(crate) fn new(hop_cmd_ids: impl IntoIterator<Item = Uuid>) -> Self {
        Self {
            outstanding: hop_cmd_ids.into_iter().collect(),
            any_error: None,
        }
    }

    /// Records one hop's outcome. Returns `None` if `cmd_id` doesn't belong to this aggregate (so
    /// the caller should treat the message as an ordinary local-dispatch message instead),
    /// `Some(false)` if hops remain outstanding, `Some(true)` once this was the last one.
    pub(crate) fn record(&mut self, cmd_id: Uuid, status: StatusCode, detail: Option<String>) -> Option<bool> {
        if !self.outstanding.remove(&cmd_id) {
            return None;
        }
        if status == StatusCode::Error && self.any_error.is_none() {
            self.any_error = Some(detail.unwrap_or_default());
        }
        Some(self.outstanding.is_empty())
    }

    /// Consumes the aggregate, producing the status/detail to answer the original `start_graph`
    /// with: OK only if every hop succeeded, else the first error any hop reported.
    pub(crate) fn finish(self) -> (StatusCode, Option<String>) {
        match self.any_error {
            Some(detail) => (StatusCode::Error, Some(detail)),
            None => (StatusCode::Ok, None),
        }
    }
}

impl Engine {
    /// `spec.md` §4.6: orchestrates the whole multi-hop `start_graph` fan-out for `peer_uris` —
    /// the peers named in the top-level graph's connections — then answers `original_cmd` exactly
    /// once every hop has resolved, via the interception in [`Self::dispatch_local`].
    ///
    /// Per `spec.md` §3 invariant 5, `original_start_graph_cmd` is recorded before any per-hop
    /// dial begins.
    pub async fn start_graph(&self, original_cmd: Message, peer_uris: Vec<AppUri>) {
        assert!(
            original_cmd.is_start_graph(),
            "Engine::start_graph must be called with a CMD_START_GRAPH message"
        );

        if peer_uris.is_empty() {
            info!(
                "engine {}: start_graph names no peer connections, answering immediately",
                self.uri()
            );
            let answer = original_cmd.result(StatusCode::Ok, None);
            self.dispatch_local(answer).await;
            return;
        }

        let hops: Vec<(AppUri, Message)> = peer_uris
            .into_iter()
            .map(|uri| {
                let hop_cmd = original_cmd.clone_for_dest(uri.clone());
                (uri, hop_cmd)
            })
            .collect();

        {
            let mut state = self.0.state.lock().await;
            state.original_start_graph_cmd = Some(original_cmd);
            state.start_graph_aggregate =
                Some(StartGraphAggregate::new(hops.iter().map(|(_, cmd)| cmd.cmd_id)));
        }

        for (uri, hop_cmd) in hops {
            let engine = self.clone();
            tokio::spawn(async move {
                engine.connect_to_graph_remote(uri, hop_cmd).await;
            });
        }
    }

    /// `spec.md` §6/§4.6: `connect_to_graph_remote`, the orchestrator's per-hop entry point.
    ///
    /// Dials `uri` fresh via [`crate::remote::factory::RemoteFactory`], routes around a peer
    /// already covered by an existing channel, and otherwise leaves the hop outstanding — to be
    /// answered later by the real `cmd_result` the peer eventually sends back, which flows through
    /// [`Self::dispatch_local`] once the per-hop command is actually on the wire.
    ///
    /// Returns `true` if the hop is proceeding normally or was already covered (dedup-OK), `false`
    /// if it failed outright (create or connect failure). The return value exists mainly for
    /// tests and direct callers (`spec.md` §6 lists this as a collaborator-facing operation in its
    /// own right, not only as something `start_graph` drives internally).
    pub async fn connect_to_graph_remote(&self, uri: AppUri, start_graph_cmd: Message) -> bool {
        let remote = match self.0.remote_factory.create_remote(self, uri.clone()).await {
            Some(remote) => remote,
            None => {
                warn!(
                    "engine {}: failed to create remote for {uri}, failing this start_graph hop",
                    self.uri()
                );
                let result =
                    start_graph_cmd.result(StatusCode::Error, Some(RemoteError::CreateFailed(uri).detail()));
                self.dispatch_local(result).await;
                return false;
            }
        };

        if self.check_remote_is_duplicated(&uri).await {
            info!(
                "engine {}: {uri} is already covered by an existing channel, dropping the just-created remote",
                self.uri()
            );
            remote.close(CloseReason::Duplicate).await;
            let result = start_graph_cmd.result(StatusCode::Ok, None);
            self.dispatch_local(result).await;
            return true;
        }

        let remote_id = remote.id();
        let mut remote = remote;
        remote.set_state(RemoteState::Weak);
        remote.set_on_server_connected_cmd(start_graph_cmd);
        {
            let mut state = self.0.state.lock().await;
            state.table.add_weak(remote);
        }

        match self.0.remote_factory.connect_weak(self, remote_id).await {
            Ok(()) => self.upgrade_weak_remote_to_normal_remote(remote_id).await,
            Err(err) => {
                warn!("engine {}: dial to {uri} failed: {err:#}", self.uri());
                self.remote_connect_error(remote_id, RemoteError::ConnectFailed(uri).detail())
                    .await;
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_cmd_id_is_not_tracked() {
        let mut aggregate = StartGraphAggregate::new([Uuid::new_v4()]);
        assert_eq!(aggregate.record(Uuid::new_v4(), StatusCode::Ok, None), None);
    }

    #[test]
    fn completes_only_after_every_hop_reports() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut aggregate = StartGraphAggregate::new([a, b]);
        assert_eq!(aggregate.record(a, StatusCode::Ok, None), Some(false));
        assert_eq!(aggregate.record(b, StatusCode::Ok, None), Some(true));
    }

    #[test]
    fn first_error_wins_the_final_detail() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut aggregate = StartGraphAggregate::new([a, b]);
        aggregate.record(a, StatusCode::Error, Some("first".to_owned()));
        aggregate.record(b, StatusCode::Error, Some("second".to_owned()));
        let (status, detail) = aggregate.finish();
        assert_eq!(status, StatusCode::Error);
        assert_eq!(detail.as_deref(), Some("first"));
    }

    #[test]
    fn all_ok_finishes_ok() {
        let a = Uuid::new_v4();
        let mut aggregate = StartGraphAggregate::new([a]);
        aggregate.record(a, StatusCode::Ok, None);
        let (status, detail) = aggregate.finish();
        assert_eq!(status, StatusCode::Ok);
        assert_eq!(detail, None);
    }
}
