// Example of streaming `ping` output through procwatch

use anyhow::Result;
use clap::Parser;
use log::{error, info};
use procwatch::config::{AppConfig, LogLevel, load_config};
use procwatch::icmp::{PingConfig, Pinger};
use procwatch::util::logging;
use std::path::PathBuf;

/// Command line arguments for the ping example
#[derive(Parser, Debug)]
#[command(name = "ping", about = "Procwatch streaming ping example")]
struct Args {
    /// Host to ping (overrides the configuration file)
    target: Option<String>,

    /// Number of echo requests
    #[arg(short, long)]
    count: Option<usize>,

    /// Payload size in bytes
    #[arg(short, long)]
    size: Option<usize>,

    /// Use IPv6
    #[arg(short = '6', long)]
    ipv6: bool,

    /// Path to a configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,

    /// Extra arguments passed to ping after `--`
    #[arg(last = true)]
    extra: Vec<String>,
}

fn ping_config(args: &Args, base: PingConfig) -> PingConfig {
    let mut config = base;
    if let Some(target) = &args.target {
        config.target = target.clone();
    }
    if let Some(count) = args.count {
        config.count = count;
    }
    if let Some(size) = args.size {
        config.packet_size = size;
    }
    if args.ipv6 {
        config.use_ipv6 = true;
    }
    config.normalized()
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let app_config = match &args.config {
        Some(path) => match load_config(path) {
            Ok(config) => {
                logging::init(&config.log_level);
                info!("Configuration loaded from {}", path.display());
                config
            }
            Err(e) => {
                logging::init(&LogLevel::Error);
                error!("Failed to load configuration: {}", e);
                return Err(e);
            }
        },
        None => {
            let config = AppConfig::default();
            logging::init(&config.log_level);
            config
        }
    };

    let config = ping_config(&args, app_config.ping.clone());
    info!(
        "Pinging {} with {} packets of {} bytes ({} on the wire)",
        config.target,
        config.count,
        config.packet_size,
        config.packet_size_with_header()
    );

    let pinger = Pinger::new().frame_size(app_config.watch.frame_size);
    let result = match pinger.run(config, &args.extra).await {
        Ok(result) => result,
        Err(e) => {
            error!("ping failed: {}", e);
            return Err(e.into());
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!("address: {}", result.ip);
    for (slot, frame) in result.frames.iter().enumerate() {
        println!("  #{:<3} {}", slot + 1, frame);
    }
    println!(
        "{} transmitted, {} received, {}% loss, time {}",
        result.transmitted_packets, result.received_packets, result.packet_loss, result.total_time
    );
    match &result.rtt {
        Some(rtt) => println!(
            "rtt min/avg/max/mdev = {}/{}/{}/{} {}",
            rtt.min, rtt.avg, rtt.max, rtt.mdev, rtt.unit
        ),
        None => println!("no rtt summary"),
    }

    Ok(())
}
