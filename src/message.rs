use uuid::Uuid;

use crate::core::uri::AppUri;

/// The well-known name of the `start_graph` command.
pub const CMD_START_GRAPH: &str = "start_graph";

/// One addressed endpoint of a message.
///
/// Real TEN-style messages can travel through several graphs, hence the separate `graph_id`. This
/// crate only needs enough of that model to exercise routing and the `start_graph` fan-out;
/// the actual value/JSON payload format is out of scope (`spec.md` §1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub app_uri: AppUri,
    pub graph_id: Option<String>,
}

impl Destination {
    pub fn new(app_uri: impl Into<AppUri>) -> Self {
        Self {
            app_uri: app_uri.into(),
            graph_id: None,
        }
    }
}

/// The status carried by a `cmd_result`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok,
    Error,
}

/// The payload of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// A command, identified by name (e.g. [`CMD_START_GRAPH`]).
    Cmd { name: String },
    /// The result of a previously-issued command.
    CmdResult {
        status: StatusCode,
        detail: Option<String>,
    },
    /// An opaque data message. The core never inspects the bytes.
    Data(Vec<u8>),
}

/// A message routed by [`crate::engine::Engine`].
///
/// `cmd_id` correlates a `cmd_result` back to the `Cmd` it answers; it is set once when a command
/// is created and copied onto any `cmd_result` produced for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub payload: Payload,
    pub dest: Vec<Destination>,
    pub src_graph_id: Option<String>,
    pub cmd_id: Uuid,
}

impl Message {
    /// Creates a new command message addressed to a single destination.
    pub fn cmd(name: impl Into<String>, dest: impl Into<AppUri>) -> Self {
        Self {
            payload: Payload::Cmd { name: name.into() },
            dest: vec![Destination::new(dest)],
            src_graph_id: None,
            cmd_id: Uuid::new_v4(),
        }
    }

    /// Creates a new `start_graph` command addressed to a single peer.
    pub fn start_graph(dest: impl Into<AppUri>) -> Self {
        Self::cmd(CMD_START_GRAPH, dest)
    }

    /// Creates a new data message addressed to a single destination.
    pub fn data(bytes: impl Into<Vec<u8>>, dest: impl Into<AppUri>) -> Self {
        Self {
            payload: Payload::Data(bytes.into()),
            dest: vec![Destination::new(dest)],
            src_graph_id: None,
            cmd_id: Uuid::new_v4(),
        }
    }

    /// Clones this command for a different destination peer, keeping the same `cmd_id` lineage
    /// semantics (a fresh id, since each per-hop command is answered independently).
    ///
    /// Used by the `start_graph` orchestrator to fan a single `start_graph` out to each peer
    /// named in the graph's connections.
    pub fn clone_for_dest(&self, dest: impl Into<AppUri>) -> Self {
        Self {
            payload: self.payload.clone(),
            dest: vec![Destination::new(dest)],
            src_graph_id: self.src_graph_id.clone(),
            cmd_id: Uuid::new_v4(),
        }
    }

    /// Builds the `cmd_result` that answers this message, per `spec.md` §4.5/§4.6/§4.7.
    ///
    /// Panics if called on a non-`Cmd` message; only commands are answered with results.
    pub fn result(&self, status: StatusCode, detail: impl Into<Option<String>>) -> Message {
        assert!(self.is_cmd(), "only commands can be answered with a cmd_result");
        Message {
            payload: Payload::CmdResult {
                status,
                detail: detail.into(),
            },
            dest: Vec::new(),
            src_graph_id: self.src_graph_id.clone(),
            cmd_id: self.cmd_id,
        }
    }

    pub fn is_cmd(&self) -> bool {
        matches!(self.payload, Payload::Cmd { .. })
    }

    pub fn is_cmd_result(&self) -> bool {
        matches!(self.payload, Payload::CmdResult { .. })
    }

    pub fn is_start_graph(&self) -> bool {
        matches!(&self.payload, Payload::Cmd { name } if name == CMD_START_GRAPH)
    }

    /// A human-readable name for logging, mirroring the teacher's `Message::message_name`.
    pub fn message_name(&self) -> &str {
        match &self.payload {
            Payload::Cmd { name } => name.as_str(),
            Payload::CmdResult { .. } => "cmd_result",
            Payload::Data(_) => "data",
        }
    }

    pub fn get_first_dest_uri(&self) -> Option<&AppUri> {
        self.dest.first().map(|d| &d.app_uri)
    }

    /// Sets the source graph id if it hasn't already been set, so a reply can find its way home.
    pub fn set_src_graph_id_if_empty(&mut self, graph_id: &str) {
        if self.src_graph_id.is_none() {
            self.src_graph_id = Some(graph_id.to_owned());
        }
    }

    /// Sets the first destination's graph id if it's empty, or if it names one of the
    /// predefined graphs known to this app (in which case the literal name is replaced with the
    /// concrete graph id it resolves to).
    pub fn set_dest_graph_if_empty_or_predefined_graph_name(
        &mut self,
        default_graph_id: &str,
        predefined_graphs: &crate::core::hash::HashSet<String>,
    ) {
        if let Some(dest) = self.dest.first_mut() {
            let is_predefined_name = dest
                .graph_id
                .as_deref()
                .map(|g| predefined_graphs.contains(g))
                .unwrap_or(false);
            if dest.graph_id.is_none() || is_predefined_name {
                dest.graph_id = Some(default_graph_id.to_owned());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_carries_cmd_id_for_correlation() {
        let cmd = Message::start_graph("app://b");
        let result = cmd.result(StatusCode::Error, Some("boom".to_owned()));
        assert_eq!(result.cmd_id, cmd.cmd_id);
        assert!(result.is_cmd_result());
    }

    #[test]
    fn clone_for_dest_changes_destination_only() {
        let cmd = Message::start_graph("app://original");
        let hop = cmd.clone_for_dest("app://b");
        assert_eq!(hop.get_first_dest_uri().unwrap().as_str(), "app://b");
        assert!(hop.is_start_graph());
        assert_ne!(hop.cmd_id, cmd.cmd_id);
    }
}
