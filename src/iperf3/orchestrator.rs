//! Drives one iperf3 run: reads its output, classifies every line, relays
//! interval samples live and assembles the final [`RunResult`].
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::classifier::{LineClass, LineClassifier, StreamMode};
use super::error::Iperf3Error;
use super::live::LiveSink;
use super::params::Iperf3Params;
use super::process::{Iperf3Process, MeasurementProcess};
use super::{RunResult, Sample};

const READ_CHUNK_SIZE: usize = 2048;

/// Wraps the optional live sink. After the first failed push the sink is
/// detached: parsing goes on, nothing more is pushed, but it is still closed.
struct LiveRelay {
    sink: Option<Box<dyn LiveSink>>,
    detached: bool,
}

impl LiveRelay {
    fn new(sink: Option<Box<dyn LiveSink>>) -> Self {
        Self {
            sink,
            detached: false,
        }
    }

    async fn push_sample(&mut self, sample: &Sample) {
        if self.detached {
            return;
        }
        let Some(sink) = self.sink.as_mut() else {
            return;
        };
        if let Err(e) = sink.push_sample(sample).await {
            warn!(error = %e, "Failed to push sample to live channel. Detaching it.");
            self.detached = true;
        }
    }

    async fn finish(mut self, result: &RunResult) {
        let Some(mut sink) = self.sink.take() else {
            return;
        };
        if !self.detached {
            if let Err(e) = sink.push_result(result).await {
                warn!(error = %e, "Failed to push final result to live channel.");
            }
        }
        if let Err(e) = sink.close().await {
            debug!(error = %e, "Live channel close reported an error.");
        }
    }
}

struct OutputParser {
    classifier: LineClassifier,
    result: RunResult,
    relay: LiveRelay,
}

impl OutputParser {
    async fn handle_line(&mut self, raw: &[u8]) {
        let text = String::from_utf8_lossy(raw);
        let line = text.trim();
        if line.is_empty() {
            return;
        }

        match self.classifier.feed(line) {
            LineClass::HeaderFound => debug!("Found iperf3 column header."),
            LineClass::Interval(sample) => {
                self.relay.push_sample(&sample).await;
                self.result.interval_samples.push(sample);
            }
            LineClass::Summary(sample) => self.result.summary_sample = sample,
            LineClass::Ignore => {}
        }
    }
}

/// Parses iperf3 output until the stream ends.
///
/// Lines are framed by a buffered reader, so a line split across reads is
/// reassembled and an unterminated last line is still handled at end of
/// stream. A read error ends the loop like EOF does, and the run is still
/// reported as succeeded.
/// If a live sink is given it receives every interval sample as it is parsed,
/// then the final result, then a single close.
pub async fn analyze_output<R>(
    output: R,
    mode: StreamMode,
    live: Option<Box<dyn LiveSink>>,
) -> RunResult
where
    R: AsyncRead + Unpin,
{
    let mut parser = OutputParser {
        classifier: LineClassifier::new(mode),
        result: RunResult::default(),
        relay: LiveRelay::new(live),
    };
    let mut reader = BufReader::with_capacity(READ_CHUNK_SIZE, output);
    let mut buffer = Vec::new();

    loop {
        match reader.read_until(b'\n', &mut buffer).await {
            Ok(0) => break,
            Ok(_) => {
                parser.handle_line(&buffer).await;
                buffer.clear();
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                // TODO: report this as a degraded completion instead of success once
                // the panel can render a distinct state for it.
                error!(error = %e, "Error reading iperf3 output.");
                break;
            }
        }
    }
    // A read error can leave a fragment that never saw its newline.
    if !buffer.is_empty() {
        parser.handle_line(&buffer).await;
    }

    let OutputParser {
        mut result, relay, ..
    } = parser;
    result.succeeded = true;
    info!(
        intervals = result.interval_samples.len(),
        total_bytes = result.summary_sample.transferred_bytes,
        "Finished parsing iperf3 output."
    );
    relay.finish(&result).await;
    result
}

/// Runs `process` to completion, parsing its output while it executes.
///
/// Launch failures return before any parsing. An abnormal exit detected after
/// parsing is returned as [`Iperf3Error::ProcessFailed`] carrying the result
/// collected so far.
pub async fn run_measurement<P>(
    process: &mut P,
    mode: StreamMode,
    live: Option<Box<dyn LiveSink>>,
) -> Result<RunResult, Iperf3Error>
where
    P: MeasurementProcess,
{
    let stdout = match process.start() {
        Ok(stdout) => stdout,
        Err(e) => {
            error!(error = %e, "Error starting iperf3 command.");
            if let Some(mut sink) = live {
                if let Err(close_err) = sink.close().await {
                    debug!(error = %close_err, "Live channel close reported an error.");
                }
            }
            return Err(e.into());
        }
    };

    let result = analyze_output(stdout, mode, live).await;

    match process.wait().await {
        Ok(exit) if exit.success => {
            info!(%exit, "iperf3 finished.");
            Ok(result)
        }
        Ok(exit) => {
            error!(%exit, "iperf3 exited with an error status.");
            Err(Iperf3Error::ProcessFailed {
                reason: exit.to_string(),
                result: Box::new(result),
            })
        }
        Err(e) => {
            error!(error = %e, "Error waiting for iperf3 command to finish.");
            Err(Iperf3Error::ProcessFailed {
                reason: format!("failed to wait for iperf3: {e}"),
                result: Box::new(result),
            })
        }
    }
}

/// Launches the iperf3 client at `iperf3_path` for `params` and runs it.
pub async fn launch_and_run(
    params: &Iperf3Params,
    iperf3_path: &Path,
    live: Option<Box<dyn LiveSink>>,
) -> Result<RunResult, Iperf3Error> {
    let run_id = Uuid::new_v4();
    let span = info_span!("iperf3_run", %run_id, host = %params.host, port = params.port);
    async {
        info!(
            reverse = params.reverse,
            duration_seconds = params.duration_seconds,
            parallel_streams = params.parallel_streams,
            protocol = ?params.protocol,
            live = live.is_some(),
            "Starting iperf3 measurement."
        );
        let mut process = Iperf3Process::new(iperf3_path, params);
        run_measurement(&mut process, params.stream_mode(), live).await
    }
    .instrument(span)
    .await
}
