//! Rebuilds ping replies and statistics from raw output frames.
//!
//! The parser does not reassemble lines across frames. It relies on `ping`
//! writing one reply per frame: the data line is always line 0 of a frame
//! (line 1 of the first frame, after the header), and a frame with more than
//! three lines is assumed to end with the two summary lines. Output that is
//! cut differently loses records rather than failing.

use std::sync::LazyLock;

use log::{debug, trace, warn};
use regex::Regex;

use super::types::{PingConfig, PingFrame, PingResult, PingRtt};
use crate::process::{Frame, ProcessError, ProcessResult};

static IPV4_ADDRESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s\(([0-9.]+)\)").expect("valid IPv4 address pattern"));
static IPV6_ADDRESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s\(([0-9A-Fa-f:]+)\)").expect("valid IPv6 address pattern"));

// 64 bytes from 127.0.0.1: icmp_seq=1 ttl=64 time=0.035 ms
static SEQ: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"icmp_seq=(\d+)").expect("valid pattern"));
static TTL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"ttl=(\d+)").expect("valid pattern"));
static TIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"time=([0-9.]+) ?([a-z]*)").expect("valid pattern"));

// 5 packets transmitted, 5 received, 0% packet loss, time 70ms
static TRANSMITTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+) packets transmitted").expect("valid pattern"));
static RECEIVED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+) (?:packets )?received").expect("valid pattern"));
static PACKET_LOSS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([0-9.]+)% packet loss").expect("valid pattern"));
static TOTAL_TIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"time ([0-9.]+[a-z]*)").expect("valid pattern"));

// rtt min/avg/max/mdev = 0.040/0.060/0.076/0.012 ms
static RTT_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]+(?:\.[0-9]+)?").expect("valid pattern"));

/// What happened to the data line of a frame
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    /// The reply was stored in the slot for this sequence number
    Stored(usize),
    /// The reply parsed but its sequence number has no slot
    OutOfRange(usize),
    /// The line held no usable reply
    Discarded,
}

/// Result of feeding one frame to the parser
#[derive(Debug, Clone, PartialEq)]
pub struct FrameOutcome {
    pub record: RecordOutcome,
    /// Whether the statistics line was read from this frame
    pub summary: bool,
}

/// Statistics line of the summary
#[derive(Debug)]
struct Statistics {
    transmitted: u32,
    received: u32,
    loss: f64,
    total_time: String,
}

/// Per-run parser state
#[derive(Debug)]
pub struct PingParser {
    count: usize,
    use_ipv6: bool,
    result: PingResult,
}

impl PingParser {
    /// Create a parser with one empty slot per expected reply
    pub fn new(config: &PingConfig) -> Self {
        let count = config.count.max(1);
        Self {
            count,
            use_ipv6: config.use_ipv6,
            result: PingResult::with_slots(count),
        }
    }

    /// Result accumulated so far
    pub fn result(&self) -> &PingResult {
        &self.result
    }

    /// Consume the parser and return the result
    pub fn into_result(self) -> PingResult {
        self.result
    }

    /// Frame callback: feed data frames, never request a stop
    pub fn on_frame(&mut self, frame: &Frame<'_>) -> bool {
        match frame.bytes() {
            Some(bytes) => {
                let outcome = self.feed(frame.times(), bytes);
                trace!("ping frame {}: {:?}", frame.times(), outcome);
            }
            None => {
                if let Some(e) = frame.error() {
                    warn!("Skipping unreadable ping frame {}: {}", frame.times(), e);
                }
            }
        }
        false
    }

    /// Parse one frame; `times` is its 1-based index on the stream
    pub fn feed(&mut self, times: usize, bytes: &[u8]) -> FrameOutcome {
        let text = String::from_utf8_lossy(bytes);
        let lines: Vec<&str> = text.split('\n').collect();

        let data_line = if times == 1 {
            self.capture_address(lines[0]);
            lines.get(1).copied()
        } else {
            Some(lines[0])
        };

        let record = match data_line.map(parse_reply) {
            Some(Ok(frame)) => self.store(frame),
            Some(Err(e)) => {
                trace!("Discarding line of frame {}: {}", times, e);
                RecordOutcome::Discarded
            }
            None => RecordOutcome::Discarded,
        };

        let summary = lines.len() > 3 && self.read_summary(&lines);

        FrameOutcome { record, summary }
    }

    fn capture_address(&mut self, header: &str) {
        if !self.result.ip.is_empty() {
            return;
        }
        let pattern = if self.use_ipv6 { &*IPV6_ADDRESS } else { &*IPV4_ADDRESS };
        match pattern.captures(header) {
            Some(caps) => {
                self.result.ip = caps[1].to_string();
                debug!("ping target resolved to {}", self.result.ip);
            }
            None => debug!("No address in ping header: {:?}", header),
        }
    }

    fn store(&mut self, frame: PingFrame) -> RecordOutcome {
        let seq = frame.seq;
        if seq < 1 || seq > self.count {
            debug!("Dropping reply with icmp_seq={} outside 1..={}", seq, self.count);
            return RecordOutcome::OutOfRange(seq);
        }
        self.result.frames[seq - 1] = frame;
        RecordOutcome::Stored(seq)
    }

    /// Read the statistics from the third-to-last line and the RTT from the
    /// second-to-last; the RTT is only set when both lines parse.
    fn read_summary(&mut self, lines: &[&str]) -> bool {
        let stats = match parse_statistics(lines[lines.len() - 3]) {
            Ok(stats) => stats,
            Err(e) => {
                trace!("No statistics in frame: {}", e);
                return false;
            }
        };

        self.result.transmitted_packets = stats.transmitted;
        self.result.received_packets = stats.received;
        self.result.packet_loss = stats.loss;
        self.result.total_time = stats.total_time;

        match parse_rtt(lines[lines.len() - 2]) {
            Ok(rtt) => self.result.rtt = Some(rtt),
            Err(e) => trace!("No RTT summary in frame: {}", e),
        }
        true
    }
}

fn capture<'a>(pattern: &Regex, line: &'a str, what: &str) -> ProcessResult<&'a str> {
    pattern
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| ProcessError::ParseError(format!("no {} in {:?}", what, line)))
}

fn number<T: std::str::FromStr>(text: &str, what: &str) -> ProcessResult<T> {
    text.parse()
        .map_err(|_| ProcessError::ParseError(format!("invalid {}: {:?}", what, text)))
}

/// Parse one reply line; the sequence number is required, TTL and time are
/// left empty when missing
fn parse_reply(line: &str) -> ProcessResult<PingFrame> {
    let seq: usize = number(capture(&SEQ, line, "icmp_seq")?, "icmp_seq")?;
    let ttl: u32 = capture(&TTL, line, "ttl")
        .and_then(|ttl| number(ttl, "ttl"))
        .unwrap_or_default();

    let (time, unit) = match TIME.captures(line) {
        Some(caps) => (caps[1].to_string(), caps[2].to_string()),
        None => (String::new(), String::new()),
    };

    Ok(PingFrame { seq, ttl, time, unit })
}

fn parse_statistics(line: &str) -> ProcessResult<Statistics> {
    Ok(Statistics {
        transmitted: number(capture(&TRANSMITTED, line, "transmitted count")?, "transmitted count")?,
        received: number(capture(&RECEIVED, line, "received count")?, "received count")?,
        loss: number(capture(&PACKET_LOSS, line, "packet loss")?, "packet loss")?,
        total_time: capture(&TOTAL_TIME, line, "total time")
            .map(str::to_string)
            .unwrap_or_default(),
    })
}

fn parse_rtt(line: &str) -> ProcessResult<PingRtt> {
    let values = line.split_once('=').map_or(line, |(_, values)| values);
    let numbers = RTT_VALUE
        .find_iter(values)
        .take(4)
        .map(|m| number::<f64>(m.as_str(), "rtt value"))
        .collect::<ProcessResult<Vec<f64>>>()?;

    let &[min, avg, max, mdev] = numbers.as_slice() else {
        return Err(ProcessError::ParseError(format!("expected 4 rtt values in {:?}", line)));
    };

    let unit = line.split(' ').next_back().unwrap_or_default().trim().to_string();

    Ok(PingRtt { min, avg, max, mdev, unit })
}
