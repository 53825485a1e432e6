use thiserror::Error;

use super::RunResult;

/// The external process could not be started or attached to.
#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("failed to spawn iperf3: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("iperf3 stdout could not be captured")]
    MissingStdout,
    #[error("process already started")]
    AlreadyStarted,
}

#[derive(Error, Debug)]
pub enum Iperf3Error {
    #[error(transparent)]
    Launch(#[from] LaunchError),
    /// The process ended abnormally after its output was fully parsed.
    #[error("iperf3 exited abnormally: {reason}")]
    ProcessFailed {
        reason: String,
        result: Box<RunResult>,
    },
}

impl Iperf3Error {
    /// Samples collected before the process failed, if parsing ran at all.
    pub fn partial_result(&self) -> Option<&RunResult> {
        match self {
            Iperf3Error::Launch(_) => None,
            Iperf3Error::ProcessFailed { result, .. } => Some(result),
        }
    }
}

/// A push to the live channel failed.
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("failed to serialize live message: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("live channel transport error: {0}")]
    Transport(String),
    #[error("live channel is closed")]
    Closed,
}
