//! Client side of the Venom neural link.
//!
//! - endpoint resolution from the hosting origin
//! - a self-healing system-state stream with subscriber fan-out
//! - a command channel that works regardless of stream health

pub mod client;
pub mod command;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod history;
pub mod machine;
pub mod state;
pub mod subscription;
pub mod transport;

pub use client::{StateStreamClient, StreamConfig};
pub use command::{
    CommandAck, CommandChannel, CommandChannelConfig, CommandError, CommandOutcome, HealthReport,
};
pub use config::{ConfigError, LinkConfig};
pub use endpoint::{Endpoints, PageOrigin, PortRule, ResolveError, resolve};
pub use error::{ClientError, Result};
pub use history::HistoryLog;
pub use machine::ConnectionState;
pub use state::{SystemState, SystemStatus, Vitals, decode_frame};
pub use subscription::{StateCallback, SubscriberRegistry, SubscriptionHandle};
pub use transport::{Connector, FrameStream, TransportFrame, WebSocketConnector};
