use thiserror::Error;

use crate::stack::ConnId;

#[derive(Debug, Error)]
pub enum NetError {
    #[error("failed to bind listener on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },
    #[error("listener is not bound")]
    NotListening,
    #[error("unknown connection {0}")]
    UnknownConnection(ConnId),
    #[error("write of {requested} bytes exceeds send window of {available}")]
    WindowExceeded { requested: usize, available: usize },
    #[error("connection reset by peer")]
    Reset,
    #[error("socket i/o failed: {0}")]
    Io(#[from] std::io::Error),
}
