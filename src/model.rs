use std::net::SocketAddr;
use std::time::Duration;

use clap::ValueEnum;

/// Wire format spoken with the server under test.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum CodecKind {
    /// magic + length + payload + checksum frames
    Checksum,
    /// newline-delimited payloads
    Lines,
}

#[derive(Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub workers: usize,
    pub messages: usize,
    pub spawn_delay: Duration,
    pub connect_timeout: Duration,
    pub exchange_timeout: Duration,
    pub codec: CodecKind,
    pub verify_echo: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    Failed,
}

#[derive(Debug)]
pub struct ExchangeRecord {
    pub rank: usize,
    pub seq: usize,
    pub begin: chrono::DateTime<chrono::Utc>,
    pub end: chrono::DateTime<chrono::Utc>,
    pub outcome: Outcome,
}
