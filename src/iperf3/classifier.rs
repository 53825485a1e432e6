//! Line classification for iperf3 text output.
use tracing::trace;

use super::{Sample, SampleKind};

/// Column header row that precedes every sample row.
const HEADER_MARKER: &str = "[ ID]";
/// Rows printed in the `-f m` format end with the bitrate unit.
const INTERVAL_SUFFIX: &str = "Mbits/sec";
/// Sender-side summary row.
const SUMMARY_SUFFIX: &str = "sender";
/// Width of the leading stream tag, e.g. `[  5]` or `[SUM]`.
const TAG_WIDTH: usize = 5;
/// Rows with more fields than this carry a retransmit column.
const RETR_FIELD_THRESHOLD: usize = 7;
const RETR_FIELD_INDEX: usize = 6;

const KIB: f64 = 1024.0;

/// Which rows represent the aggregate throughput.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamMode {
    /// One stream: every numbered row is the aggregate.
    Single,
    /// Several parallel streams: only `[SUM]` rows are accepted.
    Multi,
}

impl StreamMode {
    pub fn from_parallel(parallel_streams: u32) -> Self {
        if parallel_streams > 1 {
            StreamMode::Multi
        } else {
            StreamMode::Single
        }
    }
}

/// Position of a run relative to the `[ ID]` header row.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ParseState {
    #[default]
    AwaitingHeader,
    Streaming,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LineClass {
    Ignore,
    HeaderFound,
    Interval(Sample),
    Summary(Sample),
}

/// Classifies one trimmed line. Pure; the caller threads `state` between lines.
pub fn classify(line: &str, mode: StreamMode, state: ParseState) -> LineClass {
    if state == ParseState::AwaitingHeader {
        return if line.starts_with(HEADER_MARKER) {
            LineClass::HeaderFound
        } else {
            LineClass::Ignore
        };
    }

    let bytes = line.as_bytes();
    if bytes.first() != Some(&b'[') {
        return LineClass::Ignore;
    }
    if mode == StreamMode::Multi && bytes.get(1) != Some(&b'S') {
        return LineClass::Ignore;
    }

    if line.ends_with(INTERVAL_SUFFIX) {
        LineClass::Interval(to_sample(line, SampleKind::Interval))
    } else if line.ends_with(SUMMARY_SUFFIX) {
        LineClass::Summary(to_sample(line, SampleKind::Summary))
    } else {
        LineClass::Ignore
    }
}

/// Carries the header state across the lines of a single run.
#[derive(Debug)]
pub struct LineClassifier {
    mode: StreamMode,
    state: ParseState,
}

impl LineClassifier {
    pub fn new(mode: StreamMode) -> Self {
        Self {
            mode,
            state: ParseState::AwaitingHeader,
        }
    }

    pub fn state(&self) -> ParseState {
        self.state
    }

    pub fn feed(&mut self, line: &str) -> LineClass {
        let class = classify(line, self.mode, self.state);
        if class == LineClass::HeaderFound {
            self.state = ParseState::Streaming;
        }
        class
    }
}

/// Extracts the positional fields of a sample row. Malformed numbers become zero.
fn to_sample(line: &str, kind: SampleKind) -> Sample {
    let body = line.get(TAG_WIDTH..).unwrap_or_default();
    let fields: Vec<&str> = body.split_whitespace().collect();
    trace!(line, ?fields, "Parsing sample row.");

    let field = |idx: usize| fields.get(idx).copied().unwrap_or_default();

    let retransmits = if fields.len() > RETR_FIELD_THRESHOLD {
        field(RETR_FIELD_INDEX).parse::<u64>().unwrap_or(0)
    } else {
        0
    };

    Sample {
        kind,
        interval_label: field(0).to_string(),
        transferred_bytes: transfer_bytes(field(2), field(3)),
        bitrate_bits_per_second: parse_rounded(field(4)).unwrap_or(0),
        retransmits,
    }
}

fn unit_multiplier(unit: &str) -> Option<f64> {
    match unit {
        "TBytes" => Some(KIB * KIB * KIB * KIB),
        "GBytes" => Some(KIB * KIB * KIB),
        "MBytes" => Some(KIB * KIB),
        "KBytes" => Some(KIB),
        "Bytes" => Some(1.0),
        _ => None,
    }
}

fn transfer_bytes(value: &str, unit: &str) -> u64 {
    let Some(multiplier) = unit_multiplier(unit) else {
        return 0;
    };
    match value.parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => (v * multiplier).round() as u64,
        _ => 0,
    }
}

fn parse_rounded(value: &str) -> Option<u64> {
    let v = value.parse::<f64>().ok()?;
    (v.is_finite() && v >= 0.0).then(|| v.round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn streaming(line: &str, mode: StreamMode) -> LineClass {
        classify(line, mode, ParseState::Streaming)
    }

    fn expect_interval(class: LineClass) -> Sample {
        match class {
            LineClass::Interval(sample) => sample,
            other => panic!("expected interval, got {other:?}"),
        }
    }

    #[test]
    fn test_header_gates_everything_before_it() {
        let line = "[  5]   0.00-1.00   sec   100 MBytes   838 Mbits/sec";
        assert_eq!(
            classify(line, StreamMode::Single, ParseState::AwaitingHeader),
            LineClass::Ignore
        );
        assert_eq!(
            classify(
                "[ ID] Interval           Transfer     Bitrate",
                StreamMode::Single,
                ParseState::AwaitingHeader
            ),
            LineClass::HeaderFound
        );
    }

    #[test]
    fn test_line_classifier_flips_state_on_header() {
        let mut classifier = LineClassifier::new(StreamMode::Single);
        assert_eq!(
            classifier.feed("Connecting to host 10.0.0.1, port 5201"),
            LineClass::Ignore
        );
        assert_eq!(classifier.state(), ParseState::AwaitingHeader);
        assert_eq!(
            classifier.feed("[ ID] Interval           Transfer     Bitrate"),
            LineClass::HeaderFound
        );
        assert_eq!(classifier.state(), ParseState::Streaming);
        let sample = expect_interval(
            classifier.feed("[  5]   0.00-1.00   sec   100 MBytes   838 Mbits/sec"),
        );
        assert_eq!(sample.transferred_bytes, 100 * 1024 * 1024);
    }

    #[test]
    fn test_fractional_gigabytes_convert_exactly() {
        let sample = expect_interval(streaming(
            "[  5]   0.00-1.00   sec  1.25 GBytes  10500 Mbits/sec",
            StreamMode::Single,
        ));
        assert_eq!(sample.kind, SampleKind::Interval);
        assert_eq!(sample.interval_label, "0.00-1.00");
        assert_eq!(sample.transferred_bytes, 1_342_177_280);
        assert_eq!(sample.bitrate_bits_per_second, 10500);
        assert_eq!(sample.retransmits, 0);
    }

    #[test]
    fn test_unit_table() {
        let cases = [
            ("2 TBytes", 2 * 1024u64.pow(4)),
            ("3 GBytes", 3 * 1024u64.pow(3)),
            ("512 KBytes", 512 * 1024),
            ("900 Bytes", 900),
            ("7 PBytes", 0),
        ];
        for (transfer, expected) in cases {
            let line = format!("[  5]   0.00-1.00   sec   {transfer}   10 Mbits/sec");
            let sample = expect_interval(streaming(&line, StreamMode::Single));
            assert_eq!(sample.transferred_bytes, expected, "{transfer}");
        }
    }

    #[test]
    fn test_multi_stream_accepts_only_sum_rows() {
        let per_stream = "[  4]   0.00-1.00   sec  50.0 MBytes   419 Mbits/sec";
        let sum = "[SUM]   0.00-1.00   sec   100 MBytes   838 Mbits/sec";

        assert_eq!(streaming(per_stream, StreamMode::Multi), LineClass::Ignore);
        let sample = expect_interval(streaming(sum, StreamMode::Multi));
        assert_eq!(sample.bitrate_bits_per_second, 838);

        assert!(matches!(
            streaming(per_stream, StreamMode::Single),
            LineClass::Interval(_)
        ));
        assert!(matches!(
            streaming(sum, StreamMode::Single),
            LineClass::Interval(_)
        ));
    }

    #[test]
    fn test_rows_without_bracket_are_ignored() {
        assert_eq!(
            streaming("- - - - - - - - - - - - - - - - - - - - - - - - -", StreamMode::Single),
            LineClass::Ignore
        );
        assert_eq!(streaming("iperf Done.", StreamMode::Single), LineClass::Ignore);
        assert_eq!(streaming("[", StreamMode::Multi), LineClass::Ignore);
    }

    #[test]
    fn test_sender_summary_with_retransmits() {
        let line = "[  5]   0.00-10.00  sec  1.10 GBytes   941 Mbits/sec   17             sender";
        match streaming(line, StreamMode::Single) {
            LineClass::Summary(sample) => {
                assert_eq!(sample.kind, SampleKind::Summary);
                assert_eq!(sample.interval_label, "0.00-10.00");
                assert_eq!(sample.transferred_bytes, 1_181_116_006);
                assert_eq!(sample.bitrate_bits_per_second, 941);
                assert_eq!(sample.retransmits, 17);
            }
            other => panic!("expected summary, got {other:?}"),
        }
    }

    #[test]
    fn test_receiver_summary_is_ignored() {
        let line = "[  5]   0.00-10.04  sec  1.10 GBytes   938 Mbits/sec                  receiver";
        assert_eq!(streaming(line, StreamMode::Single), LineClass::Ignore);
    }

    #[test]
    fn test_seven_fields_means_no_retransmits() {
        let line = "[  5]   0.00-10.00 sec 1 GBytes 838 Mbits/sec sender";
        match streaming(line, StreamMode::Single) {
            LineClass::Summary(sample) => {
                assert_eq!(sample.transferred_bytes, 1024 * 1024 * 1024);
                assert_eq!(sample.retransmits, 0);
            }
            other => panic!("expected summary, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_numbers_degrade_to_zero() {
        let sample = expect_interval(streaming(
            "[  5]   0.00-1.00   sec   lots MBytes   fast Mbits/sec",
            StreamMode::Single,
        ));
        assert_eq!(sample.interval_label, "0.00-1.00");
        assert_eq!(sample.transferred_bytes, 0);
        assert_eq!(sample.bitrate_bits_per_second, 0);
    }

    #[test]
    fn test_short_rows_do_not_panic() {
        let sample = expect_interval(streaming("[SUM]Mbits/sec", StreamMode::Multi));
        assert_eq!(
            sample,
            Sample {
                kind: SampleKind::Interval,
                interval_label: "Mbits/sec".to_string(),
                ..Sample::default()
            }
        );
        let sample = expect_interval(streaming("[Mbits/sec", StreamMode::Single));
        assert_eq!(sample.interval_label, "s/sec");
    }

    #[test]
    fn test_fractional_bitrate_rounds() {
        let sample = expect_interval(streaming(
            "[  5]   0.00-1.00   sec  11.2 MBytes  94.1 Mbits/sec",
            StreamMode::Single,
        ));
        assert_eq!(sample.bitrate_bits_per_second, 94);
        assert_eq!(sample.transferred_bytes, 11_744_051);
    }
}
