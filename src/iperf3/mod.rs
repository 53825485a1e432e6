//! Parsing and relaying of iperf3 client output.
//!
//! The [`classifier`] turns single lines into [`Sample`]s, the [`orchestrator`]
//! owns the process lifecycle and the read loop, and [`live`] pushes samples to
//! an optional subscriber while the measurement is still running.
use serde::{Deserialize, Serialize};

pub mod classifier;
pub mod error;
pub mod live;
pub mod orchestrator;
pub mod params;
pub mod process;

pub use classifier::{classify, LineClass, LineClassifier, ParseState, StreamMode};
pub use error::{DeliveryError, Iperf3Error, LaunchError};
pub use live::{ChannelSink, LiveMessage, LiveSink, WebSocketSink};
pub use orchestrator::{analyze_output, launch_and_run, run_measurement};
pub use params::{Iperf3Params, Protocol, RawIperf3Params};
pub use process::{Iperf3Process, MeasurementProcess, ProcessExit};

/// Whether a sample is a periodic progress row or the final sender total.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SampleKind {
    #[serde(rename = "interval")]
    Interval,
    #[default]
    #[serde(rename = "total")]
    Summary,
}

/// One measurement row.
///
/// Field names on the wire follow the format the panel front end already
/// consumes, so they are renamed explicitly rather than derived.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Sample {
    #[serde(rename = "Type")]
    pub kind: SampleKind,
    /// Opaque time window such as `0.00-1.00`.
    #[serde(rename = "Interval")]
    pub interval_label: String,
    #[serde(rename = "Transfer")]
    pub transferred_bytes: u64,
    #[serde(rename = "Bitrate")]
    pub bitrate_bits_per_second: u64,
    #[serde(rename = "Retr")]
    pub retransmits: u64,
}

/// Aggregate of one measurement invocation.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct RunResult {
    #[serde(rename = "Success")]
    pub succeeded: bool,
    #[serde(rename = "Stats")]
    pub interval_samples: Vec<Sample>,
    #[serde(rename = "Total")]
    pub summary_sample: Sample,
}
