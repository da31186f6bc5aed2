use volley::*;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address of the server under test
    #[arg(default_value = "127.0.0.1:8888")]
    addr: String,

    /// Number of concurrent workers, one connection each
    #[arg(short, long, default_value_t = 200, value_parser = clap::value_parser!(u32).range(1..))]
    workers: u32,

    /// Messages each worker exchanges before closing its connection
    #[arg(short, long, default_value_t = 100, value_parser = clap::value_parser!(u32).range(1..))]
    messages: u32,

    /// Per-rank ramp-up delay in milliseconds
    #[arg(long, default_value_t = 0)]
    spawn_delay_ms: u64,

    /// Connect timeout in seconds
    #[arg(long, default_value_t = 5)]
    connect_timeout: u64,

    /// Per-exchange timeout in seconds
    #[arg(short, long, default_value_t = 10)]
    timeout: u64,

    /// Wire format spoken with the server
    #[arg(long, value_enum, default_value = "checksum")]
    codec: model::CodecKind,

    /// Fail an exchange when the response payload differs from the request
    #[arg(long)]
    verify_echo: bool,

    /// Write the summary as JSON to this path ('-' for stdout)
    #[arg(long)]
    json: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt::init();

    let addr: SocketAddr = tokio::net::lookup_host(&args.addr)
        .await
        .with_context(|| format!("resolving {}", args.addr))?
        .next()
        .with_context(|| format!("no address found for {}", args.addr))?;

    let config = model::Config {
        addr,
        workers: args.workers as usize,
        messages: args.messages as usize,
        spawn_delay: Duration::from_millis(args.spawn_delay_ms),
        connect_timeout: Duration::from_secs(args.connect_timeout),
        exchange_timeout: Duration::from_secs(args.timeout),
        codec: args.codec,
        verify_echo: args.verify_echo,
    };

    let total = config.workers * config.messages;
    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::with_template("{spinner} {elapsed_precise} [{bar:40}] {pos}/{len} {msg}")
            .unwrap(),
    );

    let summary = driver::run(config, pb).await?;
    summary.print();

    if let Some(path) = args.json {
        if path == PathBuf::from("-") {
            summary.write_json(std::io::stdout())?;
        } else {
            let file =
                File::create(&path).with_context(|| format!("creating {}", path.display()))?;
            summary.write_json(file)?;
        }
    }

    Ok(())
}
