use std::sync::Arc;

use crate::{
    core::{hash::HashSet, uri::AppUri},
    engine::dispatch::{LocalDispatcher, NullDispatcher},
    metrics::{MetricsSink, NoopMetricsSink},
    protocol::ProtocolFactory,
};

/// Configuration for one [`crate::engine::engine::Engine`], in the style of the teacher crate's
/// `RouterConfig`/`RealmConfig` (`SPEC_FULL.md` §1, "ambient stack").
pub struct EngineConfig {
    /// The local app URI, used as the tiebreak anchor (`spec.md` §3).
    pub uri: AppUri,
    /// Identifier of this engine instance within the app.
    pub graph_id: String,
    /// Disables the "close when the last strong remote closes" policy (`spec.md` §4.4).
    pub long_running_mode: bool,
    /// Graph names that resolve to this engine's own `graph_id` when stamped onto outgoing
    /// messages (`spec.md` §6, `set_dest_graph_if_empty_or_predefined_graph_name`).
    pub predefined_graphs: HashSet<String>,
    /// The addon registry used to create outbound protocols.
    pub protocol_factory: Arc<dyn ProtocolFactory>,
    /// Where locally-destined messages (synthesized `cmd_result`s, the final `start_graph`
    /// answer) are delivered.
    pub local_dispatcher: Arc<dyn LocalDispatcher>,
    /// Optional duration-gauge sink, standing in for the service-hub facade.
    pub metrics: Arc<dyn MetricsSink>,
}

impl EngineConfig {
    /// Builds a config with sane defaults (single-shot mode, no predefined graphs, a discarding
    /// dispatcher, no metrics) for a given URI/graph/protocol factory — the three things every
    /// caller must actually supply.
    pub fn new(
        uri: impl Into<AppUri>,
        graph_id: impl Into<String>,
        protocol_factory: Arc<dyn ProtocolFactory>,
    ) -> Self {
        Self {
            uri: uri.into(),
            graph_id: graph_id.into(),
            long_running_mode: false,
            predefined_graphs: HashSet::default(),
            protocol_factory,
            local_dispatcher: Arc::new(NullDispatcher),
            metrics: Arc::new(NoopMetricsSink),
        }
    }
}
