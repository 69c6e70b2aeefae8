use std::io::{IsTerminal, Write};
use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use framecast_receiver::{DecodedFrame, FrameSink, ServeSummary, SinkError};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    /// One JSON object per line.
    Json,
    Table,
    Pretty,
    /// Decoded pixel bytes, back to back, for piping into a player.
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct FrameOutput<'a> {
    kind: &'static str,
    seq: u64,
    peer: &'a str,
    width: u32,
    height: u32,
    channels: u8,
    encoded_len: usize,
    timestamp: String,
}

#[derive(Serialize)]
struct SummaryOutput<'a> {
    kind: &'static str,
    #[serde(flatten)]
    summary: &'a ServeSummary,
}

/// Display that reports each frame on stdout, optionally forwarding to
/// another sink (e.g. a snapshot file).
pub struct OutputSink {
    format: OutputFormat,
    peer: String,
    seq: u64,
    inner: Option<Box<dyn FrameSink>>,
}

impl OutputSink {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            peer: String::new(),
            seq: 0,
            inner: None,
        }
    }

    pub fn with_inner(mut self, inner: Box<dyn FrameSink>) -> Self {
        self.inner = Some(inner);
        self
    }
}

impl FrameSink for OutputSink {
    fn begin(&mut self, peer: SocketAddr) {
        self.peer = peer.to_string();
        if let Some(inner) = self.inner.as_mut() {
            inner.begin(peer);
        }
    }

    fn render(&mut self, frame: &DecodedFrame) -> Result<(), SinkError> {
        self.seq += 1;
        print_frame(frame, self.seq, &self.peer, self.format)?;
        if let Some(inner) = self.inner.as_mut() {
            inner.render(frame)?;
        }
        Ok(())
    }

    fn poll_cancel(&mut self) -> bool {
        self.inner.as_mut().is_some_and(|inner| inner.poll_cancel())
    }

    fn release(&mut self) {
        if let Some(inner) = self.inner.as_mut() {
            inner.release();
        }
    }
}

pub fn print_frame(
    frame: &DecodedFrame,
    seq: u64,
    peer: &str,
    format: OutputFormat,
) -> std::io::Result<()> {
    match format {
        OutputFormat::Json => {
            let out = FrameOutput {
                kind: "frame",
                seq,
                peer,
                width: frame.width,
                height: frame.height,
                channels: frame.channels,
                encoded_len: frame.encoded_len,
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["SEQ", "PEER", "SIZE", "CHANNELS", "ENCODED"])
                .add_row(vec![
                    seq.to_string(),
                    peer.to_string(),
                    format!("{}x{}", frame.width, frame.height),
                    frame.channels.to_string(),
                    frame.encoded_len.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "frame #{seq} from {peer}: {}x{}x{} ({} bytes encoded)",
                frame.width, frame.height, frame.channels, frame.encoded_len
            );
        }
        OutputFormat::Raw => {
            let mut out = std::io::stdout().lock();
            out.write_all(&frame.pixels)?;
            out.flush()?;
        }
    }
    Ok(())
}

pub fn print_summary(summary: &ServeSummary, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = SummaryOutput {
                kind: "summary",
                summary,
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["CONNECTIONS", "FRAMES", "DECODE FAILURES", "BYTES"])
                .add_row(vec![
                    summary.connections.to_string(),
                    summary.frames.to_string(),
                    summary.decode_failures.to_string(),
                    summary.bytes.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "{} connection(s), {} frame(s), {} decode failure(s), {} bytes",
                summary.connections, summary.frames, summary.decode_failures, summary.bytes
            );
        }
        // Stdout carries pixels only.
        OutputFormat::Raw => {}
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
