use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use framecast_receiver::DecodeErrorPolicy;

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod listen;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Accept senders one at a time and display their frames.
    Listen(ListenArgs),
    /// Send image files as frames to a listening receiver.
    Send(SendArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Listen(args) => listen::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum OnDecodeError {
    /// Log the bad frame and keep reading.
    Skip,
    /// Log the bad frame and drop the connection.
    Disconnect,
}

impl From<OnDecodeError> for DecodeErrorPolicy {
    fn from(value: OnDecodeError) -> Self {
        match value {
            OnDecodeError::Skip => DecodeErrorPolicy::Skip,
            OnDecodeError::Disconnect => DecodeErrorPolicy::Disconnect,
        }
    }
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Interface to bind.
    #[arg(long, env = "FRAMECAST_BIND", default_value = "0.0.0.0")]
    pub bind: String,
    /// TCP port to listen on.
    #[arg(long, short = 'p', env = "FRAMECAST_PORT", default_value_t = 8889)]
    pub port: u16,
    /// Largest accepted frame payload, in bytes.
    #[arg(long, value_name = "BYTES", default_value_t = 16 * 1024 * 1024)]
    pub max_payload: usize,
    /// Decode frames to single-channel luma instead of RGB.
    #[arg(long)]
    pub grayscale: bool,
    /// What to do when a payload is not a decodable image.
    #[arg(long, value_enum, default_value = "skip")]
    pub on_decode_error: OnDecodeError,
    /// Keep the latest frame in this image file (format from extension).
    #[arg(long, value_name = "PATH")]
    pub snapshot: Option<PathBuf>,
    /// Exit after displaying N frames.
    #[arg(long)]
    pub count: Option<u64>,
    /// Exit after serving N connections.
    #[arg(long)]
    pub connections: Option<usize>,
    /// How often blocked accepts/reads re-check for shutdown (e.g. 100ms, 1s).
    #[arg(long, default_value = "100ms")]
    pub poll_interval: String,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Receiver address (host:port).
    pub addr: String,
    /// Image files; each file becomes one frame.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
    /// Send the whole file list this many times.
    #[arg(long, default_value_t = 1)]
    pub repeat: u32,
    /// Pause between frames (e.g. 33ms).
    #[arg(long)]
    pub interval: Option<String>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `150ms`, `2s` or a bare number of seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
