use thiserror::Error;

use crate::capture::CaptureError;
use crate::client::DeliveryError;
use crate::retry::RetryError;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("failed to start agent: collector address is empty")]
    EmptyCollectorAddr,

    #[error("failed to start agent: invalid collector address {addr:?}: {reason}")]
    InvalidCollectorAddr { addr: String, reason: url::ParseError },

    #[error("no profile type is enabled")]
    NoProfilesEnabled,

    #[error("agent is already started")]
    AlreadyStarted,

    #[error("agent is not running")]
    NotRunning,

    #[error("profiling task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Collect(#[from] CollectError),
}

/// Failure of one capture-then-send iteration.
#[derive(Error, Debug)]
pub enum CollectError {
    #[error("unable to collect profile: {0}")]
    Capture(#[from] CaptureError),

    #[error("unable to send profile: {0}")]
    Delivery(#[from] RetryError<DeliveryError>),
}
