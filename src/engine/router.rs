use log::warn;

use crate::{
    core::error::RemoteError,
    engine::engine::Engine,
    message::{Message, StatusCode},
    remote::remote::RemoteId,
};

impl Engine {
    /// `spec.md` §4.5: `route_msg_to_remote`. Only ever consults the strong map — weak remotes
    /// deliberately never carry user traffic (invariant 3, `spec.md` §3).
    pub async fn route_msg_to_remote(&self, msg: Message) {
        let dest_uri = match msg.get_first_dest_uri() {
            Some(uri) => uri.clone(),
            None => {
                warn!("engine {}: message has no destination, dropping it", self.uri());
                return;
            }
        };

        let protocol = {
            let state = self.0.state.lock().await;
            state.table.find_strong(&dest_uri).map(|remote| remote.connection().protocol())
        };

        let error = match protocol {
            Some(protocol) => match protocol.send_msg(msg.clone()).await {
                Ok(()) => return,
                Err(err) => RemoteError::SendFailed(err.to_string()),
            },
            None => RemoteError::NotFound(dest_uri),
        };

        if msg.is_cmd() {
            let result = msg.result(StatusCode::Error, Some(error.detail()));
            self.dispatch_local(result).await;
        } else {
            warn!("engine {}: {error}, dropping data message", self.uri());
        }
    }

    /// `spec.md` §4.5/§6: `receive_msg_from_remote`. Stamps the source/destination graph fields
    /// before branching: a `start_graph` received after the graph is already built is always an
    /// error answered back to the remote it arrived on (not dispatched locally, since the
    /// sender — not this engine's extensions — is who needs to hear about it); everything else
    /// goes to local dispatch.
    pub async fn receive_msg_from_remote(&self, remote_id: RemoteId, mut msg: Message) {
        msg.set_src_graph_id_if_empty(self.graph_id());
        msg.set_dest_graph_if_empty_or_predefined_graph_name(
            self.graph_id(),
            &self.0.config.predefined_graphs,
        );

        if msg.is_start_graph() {
            let result = msg.result(StatusCode::Error, Some(RemoteError::PostBuildStartGraph.detail()));
            let protocol = {
                let state = self.0.state.lock().await;
                state.table.find_by_id(remote_id).map(|remote| remote.connection().protocol())
            };
            if let Some(protocol) = protocol {
                if let Err(err) = protocol.send_msg(result).await {
                    warn!(
                        "engine {}: failed to answer post-build start_graph to remote {remote_id}: {err:#}",
                        self.uri()
                    );
                }
            }
            return;
        }

        self.dispatch_local(msg).await;
    }
}
