use std::fmt;

use serde::{Deserialize, Serialize};

/// Host pinged when none is configured
pub const DEFAULT_TARGET: &str = "localhost";

/// Packets sent when no count is configured
pub const DEFAULT_COUNT: usize = 1;

/// ICMP payload size used when none is configured
pub const DEFAULT_PACKET_SIZE: usize = 56;

/// IPv4 + ICMP header bytes added to the payload on the wire
const IP_ICMP_HEADER_SIZE: usize = 28;

/// ICMP header bytes included in an echo reply
const ICMP_HEADER_SIZE: usize = 8;

/// What to ping and how
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PingConfig {
    /// Host name or address to ping
    pub target: String,

    /// Number of echo requests to send
    pub count: usize,

    /// ICMP payload size in bytes
    pub packet_size: usize,

    /// Force IPv6
    pub use_ipv6: bool,
}

impl Default for PingConfig {
    fn default() -> Self {
        Self {
            target: DEFAULT_TARGET.to_string(),
            count: DEFAULT_COUNT,
            packet_size: DEFAULT_PACKET_SIZE,
            use_ipv6: false,
        }
    }
}

impl PingConfig {
    /// Create a configuration for `target` with default settings
    pub fn new<S: Into<String>>(target: S) -> Self {
        Self {
            target: target.into(),
            ..Default::default()
        }
    }

    /// Set the number of echo requests
    pub fn count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    /// Set the payload size
    pub fn packet_size(mut self, size: usize) -> Self {
        self.packet_size = size;
        self
    }

    /// Force IPv6
    pub fn ipv6(mut self, use_ipv6: bool) -> Self {
        self.use_ipv6 = use_ipv6;
        self
    }

    /// Replace empty or zero settings with their defaults
    pub fn normalized(mut self) -> Self {
        if self.target.is_empty() {
            self.target = DEFAULT_TARGET.to_string();
        }
        if self.count < 1 {
            self.count = DEFAULT_COUNT;
        }
        self.packet_size = self.effective_packet_size();
        self
    }

    /// Payload size with the default applied to an unset (zero) size
    pub fn effective_packet_size(&self) -> usize {
        if self.packet_size < 1 { DEFAULT_PACKET_SIZE } else { self.packet_size }
    }

    /// Size of one request on the wire, including IP and ICMP headers
    pub fn packet_size_with_header(&self) -> usize {
        self.effective_packet_size() + IP_ICMP_HEADER_SIZE
    }

    /// Size reported for each echo reply (payload plus ICMP header)
    pub fn backend_packet_size(&self) -> usize {
        self.effective_packet_size() + ICMP_HEADER_SIZE
    }

    /// Arguments passed to `ping`, followed by `extra`
    pub fn args(&self, extra: &[String]) -> Vec<String> {
        let mut args = Vec::with_capacity(6 + extra.len());
        args.push(self.target.clone());
        args.push("-c".to_string());
        args.push(self.count.to_string());
        args.push("-s".to_string());
        args.push(self.effective_packet_size().to_string());
        args.push(if self.use_ipv6 { "-6" } else { "-4" }.to_string());
        args.extend(extra.iter().cloned());
        args
    }
}

/// One echo reply
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PingFrame {
    /// ICMP sequence number; 0 marks a slot with no reply
    pub seq: usize,

    /// Time-to-live of the reply
    pub ttl: u32,

    /// Round-trip time as printed, without the unit
    pub time: String,

    /// Unit of `time`, usually `ms`
    pub unit: String,
}

impl PingFrame {
    /// Whether a reply was recorded in this slot
    pub fn is_empty(&self) -> bool {
        self.seq == 0
    }
}

impl fmt::Display for PingFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "no reply");
        }
        write!(f, "icmp_seq={} ttl={} time={} {}", self.seq, self.ttl, self.time, self.unit)
    }
}

/// Round-trip time statistics from the summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PingRtt {
    pub min: f64,
    pub avg: f64,
    pub max: f64,
    pub mdev: f64,
    pub unit: String,
}

/// Everything reconstructed from one `ping` run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PingResult {
    /// Address the target resolved to
    pub ip: String,

    /// One slot per requested packet, indexed by sequence number - 1
    pub frames: Vec<PingFrame>,

    pub transmitted_packets: u32,
    pub received_packets: u32,

    /// Packet loss in percent
    pub packet_loss: f64,

    /// Total time as printed, e.g. `4005ms`
    pub total_time: String,

    /// Present only when the summary lines were found
    pub rtt: Option<PingRtt>,
}

impl PingResult {
    /// Empty result with `count` reply slots
    pub fn with_slots(count: usize) -> Self {
        Self {
            frames: vec![PingFrame::default(); count],
            ..Default::default()
        }
    }

    /// Replies that were actually recorded
    pub fn replies(&self) -> impl Iterator<Item = &PingFrame> {
        self.frames.iter().filter(|frame| !frame.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_applied_before_derived_sizes() {
        let config = PingConfig {
            target: String::new(),
            count: 0,
            packet_size: 0,
            use_ipv6: false,
        }
        .normalized();

        assert_eq!(config.target, "localhost");
        assert_eq!(config.count, 1);
        assert_eq!(config.packet_size, 56);
        assert_eq!(config.packet_size_with_header(), 84);
        assert_eq!(config.backend_packet_size(), 64);
    }

    #[test]
    fn test_derived_sizes_without_normalizing() {
        let config = PingConfig::new("x").packet_size(0);
        assert_eq!(config.effective_packet_size(), 56);
        assert_eq!(config.packet_size_with_header(), 84);
        assert_eq!(config.backend_packet_size(), 64);
    }

    #[test]
    fn test_explicit_settings_are_kept() {
        let config = PingConfig::new("example.org").count(5).packet_size(100).normalized();
        assert_eq!(config.target, "example.org");
        assert_eq!(config.count, 5);
        assert_eq!(config.packet_size_with_header(), 128);
        assert_eq!(config.backend_packet_size(), 108);
    }

    #[test]
    fn test_args() {
        let config = PingConfig::new("::1").count(3).ipv6(true);
        let args = config.args(&["-W".to_string(), "1".to_string()]);
        assert_eq!(args, vec!["::1", "-c", "3", "-s", "56", "-6", "-W", "1"]);

        let args = PingConfig::new("127.0.0.1").args(&[]);
        assert_eq!(args, vec!["127.0.0.1", "-c", "1", "-s", "56", "-4"]);
    }

    #[test]
    fn test_result_slots() {
        let result = PingResult::with_slots(4);
        assert_eq!(result.frames.len(), 4);
        assert_eq!(result.replies().count(), 0);
        assert!(result.rtt.is_none());
    }
}
