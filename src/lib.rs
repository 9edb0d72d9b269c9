pub mod connection;
pub mod core;
pub mod engine;
pub mod message;
pub mod metrics;
pub mod protocol;
pub mod remote;

pub use connection::Connection;
pub use core::{
    close::CloseReason,
    error::{EngineCloseError, RemoteError, RemoteTableError},
    uri::AppUri,
};
pub use engine::{Engine, EngineConfig, LocalDispatcher, NullDispatcher};
pub use message::{Destination, Message, Payload, StatusCode};
pub use metrics::{MetricsSink, NoopMetricsSink};
pub use protocol::{ClosedCallback, Protocol, ProtocolFactory};
pub use remote::{
    remote::{Remote, RemoteId, RemoteState},
    table::RemoteTable,
};
