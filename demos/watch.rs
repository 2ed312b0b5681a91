// Example of watching an arbitrary command frame by frame

use anyhow::Result;
use clap::Parser;
use log::{info, warn};
use procwatch::config::{LogLevel, WatchSettings};
use procwatch::process::{Command, Frame};
use procwatch::util::logging;

/// Command line arguments for the watch example
#[derive(Parser, Debug)]
#[command(name = "watch", about = "Print a command's output as it is read")]
struct Args {
    /// Bytes per read (raised to at least 1024)
    #[arg(long, default_value = "1024")]
    frame_size: usize,

    /// Delay before each read in milliseconds
    #[arg(long)]
    delay_ms: Option<u64>,

    /// Kill the command after this many stdout frames
    #[arg(long)]
    stop_after: Option<usize>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Program and arguments to run
    #[arg(required = true, trailing_var_arg = true)]
    command: Vec<String>,
}

fn print_frame(frame: &Frame<'_>) {
    match (frame.text(), frame.error()) {
        (Some(text), _) => println!("[{} #{} {}B] {:?}", frame.stream(), frame.times(), frame.size(), text),
        (None, Some(e)) => println!("[{} #{}] read error: {}", frame.stream(), frame.times(), e),
        (None, None) => {}
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(if args.verbose { &LogLevel::Debug } else { &LogLevel::Info });

    let settings = WatchSettings {
        frame_size: args.frame_size,
        delay_ms: args.delay_ms,
    };

    let stop_after = args.stop_after;
    let config = settings
        .to_watch_config()
        .on_stdout(move |frame| {
            print_frame(frame);
            stop_after.is_some_and(|limit| frame.times() >= limit)
        })
        .on_stderr(|frame| {
            print_frame(frame);
            false
        })
        .on_kill_error(|e, process| warn!("Failed to kill {}: {}", process.program(), e));

    let (program, rest) = args
        .command
        .split_first()
        .ok_or_else(|| anyhow::anyhow!("no command given"))?;

    info!("Watching {} with {}-byte frames", program, settings.effective_frame_size());
    let watch = Command::new(program.as_str()).args(rest.iter().cloned()).watch(config)?;
    watch.wait().await;

    if let Some(process) = watch.process() {
        let status = process.wait().await?;
        info!("{} exited with {}{}", program, status, if watch.is_stopped() { " (stopped)" } else { "" });
    }

    Ok(())
}
