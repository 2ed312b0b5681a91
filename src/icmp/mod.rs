//! Streaming `ping` runner
//!
//! Runs the system `ping` under the frame watcher and rebuilds replies and
//! statistics from its output as it arrives. Any output on standard error is
//! treated as the failure of the whole run.

mod parser;
mod types;

pub use parser::{FrameOutcome, PingParser, RecordOutcome};
pub use types::{DEFAULT_COUNT, DEFAULT_PACKET_SIZE, DEFAULT_TARGET, PingConfig, PingFrame, PingResult, PingRtt};

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use log::{debug, warn};

use crate::process::{Command, Frame, MIN_FRAME_SIZE, ProcessError, ProcessResult, WatchConfig};

/// How long to wait for `ping` to exit once its output has ended
const EXIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Runs `ping` and parses its output
#[derive(Debug, Clone)]
pub struct Pinger {
    /// Executable to run
    program: String,

    /// Arguments placed before the ping arguments, e.g. `["ping"]` for `sudo`
    wrapper_args: Vec<String>,

    /// Bytes per read
    frame_size: usize,
}

impl Default for Pinger {
    fn default() -> Self {
        Self {
            program: "ping".to_string(),
            wrapper_args: Vec::new(),
            frame_size: MIN_FRAME_SIZE,
        }
    }
}

impl Pinger {
    /// Create a runner for the system `ping`
    pub fn new() -> Self {
        Self::default()
    }

    /// Run a different executable
    pub fn program<S: Into<String>>(mut self, program: S) -> Self {
        self.program = program.into();
        self
    }

    /// Arguments placed before the ping arguments
    pub fn wrapper_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.wrapper_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set the frame size; values below [`MIN_FRAME_SIZE`] are raised
    pub fn frame_size(mut self, size: usize) -> Self {
        self.frame_size = size;
        self
    }

    /// The command that would be run for `config`
    pub fn command(&self, config: &PingConfig, extra: &[String]) -> Command {
        Command::new(&self.program)
            .args(self.wrapper_args.iter().cloned())
            .args(config.args(extra))
    }

    /// Ping as configured and return the parsed result.
    ///
    /// Fails if the process cannot be started or writes anything to standard
    /// error; in the latter case the process is killed.
    pub async fn run(&self, config: PingConfig, extra: &[String]) -> ProcessResult<PingResult> {
        let config = config.normalized();
        let parser = Arc::new(Mutex::new(PingParser::new(&config)));
        let failure: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));

        let watch_config = WatchConfig::new({
            let parser = Arc::clone(&parser);
            move |frame| match parser.lock() {
                Ok(mut parser) => parser.on_frame(frame),
                Err(_) => true,
            }
        })
        .on_stderr({
            let failure = Arc::clone(&failure);
            move |frame| {
                let message = error_message(frame);
                if let Ok(mut failure) = failure.lock() {
                    failure.get_or_insert(message);
                }
                true
            }
        })
        .on_kill_error(|e, process| warn!("Could not kill {} ({:?}): {}", process.program(), process.id(), e))
        .frame_size(self.frame_size);

        let watch = self.command(&config, extra).watch(watch_config)?;
        watch.wait().await;

        if let Some(process) = watch.process() {
            match process.wait_with_timeout(EXIT_TIMEOUT).await {
                Ok(status) => debug!("ping {} finished with {}", config.target, status),
                Err(e) => warn!("ping {} did not exit: {}", config.target, e),
            }
        }

        if let Some(message) = failure.lock().map_err(poisoned)?.take() {
            return Err(ProcessError::ErrorOutput(message));
        }

        let result = parser.lock().map_err(poisoned)?.result().clone();
        Ok(result)
    }
}

fn poisoned<T>(_: PoisonError<T>) -> ProcessError {
    ProcessError::Other("Lock poisoned".to_string())
}

fn error_message(frame: &Frame<'_>) -> String {
    match (frame.text(), frame.error()) {
        (Some(text), _) => text.trim_end().to_string(),
        (None, Some(e)) => e.to_string(),
        (None, None) => String::new(),
    }
}

/// Ping with the system `ping`; `extra` is appended to the generated arguments
pub async fn ping(config: PingConfig, extra: &[String]) -> ProcessResult<PingResult> {
    Pinger::default().run(config, extra).await
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPLIES: &str = r#"
printf 'PING %s (127.0.0.1) 56(84) bytes of data.\n64 bytes from 127.0.0.1: icmp_seq=1 ttl=64 time=0.035 ms\n' "$1"
sleep 0.2
printf '64 bytes from 127.0.0.1: icmp_seq=2 ttl=64 time=0.041 ms\n'
sleep 0.2
printf '64 bytes from 127.0.0.1: icmp_seq=3 ttl=64 time=0.050 ms\n'
sleep 0.2
printf '\n--- %s ping statistics ---\n3 packets transmitted, 3 received, 0%% packet loss, time 2003ms\nrtt min/avg/max/mdev = 0.035/0.042/0.050/0.006 ms\n' "$1"
"#;

    fn fake_ping(script: &str) -> Pinger {
        Pinger::new().program("sh").wrapper_args(["-c", script, "ping"])
    }

    #[test]
    fn test_command_arguments() {
        let pinger = Pinger::new().program("sudo").wrapper_args(["ping"]);
        let command = pinger.command(&PingConfig::new("example.org").count(2), &["-q".to_string()]);
        assert_eq!(command.program(), "sudo");
        assert_eq!(command.get_args(), ["ping", "example.org", "-c", "2", "-s", "56", "-4", "-q"]);
    }

    #[tokio::test]
    async fn test_streamed_replies_and_summary() {
        let result = tokio::time::timeout(
            Duration::from_secs(10),
            fake_ping(REPLIES).run(PingConfig::new("localhost").count(3), &[]),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(result.ip, "127.0.0.1");
        assert_eq!(result.frames.len(), 3);
        let seqs: Vec<usize> = result.frames.iter().map(|f| f.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert_eq!(result.frames[1].time, "0.041");
        assert_eq!(result.transmitted_packets, 3);
        assert_eq!(result.received_packets, 3);
        assert_eq!(result.total_time, "2003ms");
        let rtt = result.rtt.unwrap();
        assert_eq!(rtt.max, 0.050);
        assert_eq!(rtt.unit, "ms");
    }

    #[tokio::test]
    async fn test_count_limits_slots() {
        // The fake prints three replies but only one was requested.
        let result = fake_ping(REPLIES)
            .run(PingConfig::new("localhost").count(1), &[])
            .await
            .unwrap();
        assert_eq!(result.frames.len(), 1);
        assert_eq!(result.frames[0].seq, 1);
    }

    #[tokio::test]
    async fn test_stderr_fails_the_run() {
        let err = fake_ping("echo \"ping: $1: Name or service not known\" >&2; exit 2")
            .run(PingConfig::new("nowhere.invalid"), &[])
            .await
            .unwrap_err();
        match err {
            ProcessError::ErrorOutput(message) => {
                assert_eq!(message, "ping: nowhere.invalid: Name or service not known")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_stderr_kills_long_running_ping() {
        let script = "printf 'PING x (127.0.0.1) 56(84) bytes of data.\\n'; sleep 0.2; echo oops >&2; exec sleep 30";
        let err = tokio::time::timeout(
            Duration::from_secs(10),
            fake_ping(script).run(PingConfig::new("x").count(5), &[]),
        )
        .await
        .unwrap()
        .unwrap_err();
        assert!(matches!(err, ProcessError::ErrorOutput(message) if message == "oops"));
    }

    #[tokio::test]
    async fn test_arguments_reach_the_process() {
        let err = fake_ping("echo \"$@\" >&2")
            .run(PingConfig::new("::1").count(2).ipv6(true), &["-W".to_string(), "1".to_string()])
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Process reported an error: ::1 -c 2 -s 56 -6 -W 1");
    }

    #[tokio::test]
    async fn test_missing_program() {
        let err = Pinger::new()
            .program("procwatch-no-such-ping")
            .run(PingConfig::default(), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::SpawnError(_)));
    }

    #[tokio::test]
    #[ignore = "needs a system ping with ICMP permissions"]
    async fn test_system_ping_localhost() {
        let result = ping(PingConfig::new("127.0.0.1").count(3), &[]).await.unwrap();
        assert_eq!(result.ip, "127.0.0.1");
        assert_eq!(result.frames.len(), 3);
    }
}
