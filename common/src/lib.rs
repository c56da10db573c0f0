pub mod board;
pub mod config;
pub mod debounce;
pub mod error;
pub mod event_loop;
pub mod render;
pub mod responder;
pub mod sampler;
pub mod socket_stack;
pub mod stack;
pub mod store;

#[cfg(test)]
mod testing;

pub use board::Board;
pub use config::{CalibrationConfig, MonitorConfig, NetworkConfig, RuntimeConfig};
pub use debounce::{ButtonEdge, ButtonMonitor, Debouncer};
pub use error::NetError;
pub use event_loop::{EventLoop, Tick};
pub use render::{PageTemplate, ResponseBuffer};
pub use responder::{Phase, Responder, SendProgress};
pub use sampler::TemperatureSampler;
pub use socket_stack::SocketStack;
pub use stack::{AcceptVerdict, ConnId, TcpHandler, TcpStack};
pub use store::{MonitorState, SharedStore};
