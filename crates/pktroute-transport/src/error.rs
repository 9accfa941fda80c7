//! Errors raised by the transport adapter.
//!
//! Every variant is reported back to the lifecycle caller as a failed
//! outcome. Nothing here terminates the process.

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Invalid adapter parameters, detected by the initialization check.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// A socket system call failed while opening or closing.
    #[error("{op} failed: {source}")]
    Connection {
        op: &'static str,
        #[source]
        source: io::Error,
    },
}

impl TransportError {
    pub(crate) fn connection(op: &'static str, source: io::Error) -> Self {
        Self::Connection { op, source }
    }
}
