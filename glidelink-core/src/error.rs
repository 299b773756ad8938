use std::time::Duration;

use thiserror::Error;

use crate::drivers::Operation;

/// Failures raised by drivers and port links.
///
/// These never escape the dispatch layer: every public slot operation logs the
/// error and reports a plain `false` to its caller.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("port {0} is not open")]
    NotOpen(String),

    #[error("no reply containing {expected:?} within {timeout:?}")]
    Timeout { expected: String, timeout: Duration },

    #[error("device refused command: {0}")]
    Nack(String),

    #[error("request rejected by driver: {0}")]
    Rejected(&'static str),

    #[error("{0} is not implemented by this driver")]
    Unsupported(Operation),

    #[error("port I/O failed: {0}")]
    Io(#[from] std::io::Error),
}
