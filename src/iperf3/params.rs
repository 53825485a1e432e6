//! Measurement parameters and the iperf3 command line derived from them.
use serde::{Deserialize, Serialize};

use super::classifier::StreamMode;

pub const DEFAULT_PORT: u16 = 5201;
pub const DEFAULT_DURATION_SECONDS: u32 = 10;
pub const DEFAULT_PARALLEL_STREAMS: u32 = 1;
/// Applied to both `--connect-timeout` and `--rcv-timeout`, in milliseconds.
pub const IPERF3_TIMEOUT_MS: u32 = 5000;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
}

impl Protocol {
    /// Only the exact value `udp` selects datagram mode.
    pub fn from_form_value(value: &str) -> Self {
        if value == "udp" {
            Protocol::Udp
        } else {
            Protocol::Tcp
        }
    }
}

/// Parameters exactly as submitted by a form or query string.
#[derive(Deserialize, Debug, Default, Clone)]
pub struct RawIperf3Params {
    pub host: Option<String>,
    pub port: Option<String>,
    pub reverse: Option<String>,
    pub time: Option<String>,
    pub parallel: Option<String>,
    pub protocol: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Iperf3Params {
    pub host: String,
    pub port: u16,
    pub reverse: bool,
    pub duration_seconds: u32,
    pub parallel_streams: u32,
    pub protocol: Protocol,
}

impl Iperf3Params {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            reverse: false,
            duration_seconds: DEFAULT_DURATION_SECONDS,
            parallel_streams: DEFAULT_PARALLEL_STREAMS,
            protocol: Protocol::Tcp,
        }
    }

    /// Normalizes raw input: absent, unparsable or zero numbers fall back to defaults.
    pub fn from_raw(raw: RawIperf3Params) -> Self {
        Self {
            host: raw.host.unwrap_or_default(),
            port: positive_or(raw.port.as_deref(), DEFAULT_PORT),
            reverse: raw.reverse.is_some_and(|r| !r.is_empty()),
            duration_seconds: positive_or(raw.time.as_deref(), DEFAULT_DURATION_SECONDS),
            parallel_streams: positive_or(raw.parallel.as_deref(), DEFAULT_PARALLEL_STREAMS),
            protocol: raw
                .protocol
                .as_deref()
                .map(Protocol::from_form_value)
                .unwrap_or_default(),
        }
    }

    /// Replaces zero numbers with the defaults, as [`Self::from_raw`] does for
    /// form input. Callers that build params from typed values go through this.
    pub fn with_defaults(mut self) -> Self {
        if self.port == 0 {
            self.port = DEFAULT_PORT;
        }
        if self.duration_seconds == 0 {
            self.duration_seconds = DEFAULT_DURATION_SECONDS;
        }
        if self.parallel_streams == 0 {
            self.parallel_streams = DEFAULT_PARALLEL_STREAMS;
        }
        self
    }

    pub fn stream_mode(&self) -> StreamMode {
        StreamMode::from_parallel(self.parallel_streams)
    }

    /// The iperf3 client command line. The classifier depends on the output
    /// layout this exact flag set produces.
    pub fn to_args(&self) -> Vec<String> {
        let timeout = IPERF3_TIMEOUT_MS.to_string();
        let mut args = vec![
            "-c".to_string(),
            self.host.clone(),
            "-p".to_string(),
            self.port.to_string(),
            "-P".to_string(),
            self.parallel_streams.to_string(),
            "-t".to_string(),
            self.duration_seconds.to_string(),
            "--connect-timeout".to_string(),
            timeout.clone(),
            "--rcv-timeout".to_string(),
            timeout,
            "--forceflush".to_string(),
            "-f".to_string(),
            "mbps".to_string(),
        ];
        if self.reverse {
            args.push("-R".to_string());
        }
        if self.protocol == Protocol::Udp {
            args.push("-u".to_string());
        }
        args
    }
}

fn positive_or<T>(value: Option<&str>, default: T) -> T
where
    T: std::str::FromStr + Default + PartialEq,
{
    match value.and_then(|v| v.trim().parse::<T>().ok()) {
        Some(v) if v != T::default() => v,
        _ => default,
    }
}
