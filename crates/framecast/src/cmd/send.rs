use std::fs;
use std::thread;

use framecast_frame::{FrameConfig, FrameWriter};
use framecast_transport::TcpEndpoint;
use serde::Serialize;
use tracing::debug;

use crate::cmd::{parse_duration, SendArgs};
use crate::exit::{frame_error, io_error, transport_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::OutputFormat;

#[derive(Serialize)]
struct SendOutput<'a> {
    kind: &'static str,
    addr: &'a str,
    frames: u64,
    bytes: u64,
}

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    if args.repeat == 0 {
        return Err(CliError::new(USAGE, "--repeat must be greater than zero"));
    }
    let interval = args.interval.as_deref().map(parse_duration).transpose()?;

    let payloads = args
        .files
        .iter()
        .map(|path| {
            fs::read(path)
                .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))
        })
        .collect::<CliResult<Vec<_>>>()?;

    let conn = TcpEndpoint::connect(args.addr.as_str())
        .map_err(|err| transport_error("connect failed", err))?;
    let mut writer = FrameWriter::with_config_conn(conn, FrameConfig::default())
        .map_err(|err| frame_error("connect failed", err))?;

    let mut frames = 0u64;
    let mut bytes = 0u64;
    for round in 0..args.repeat {
        for (path, payload) in args.files.iter().zip(&payloads) {
            if frames > 0 {
                if let Some(pause) = interval {
                    thread::sleep(pause);
                }
            }
            writer
                .send(payload)
                .map_err(|err| frame_error("send failed", err))?;
            debug!(round, file = %path.display(), len = payload.len(), "frame sent");
            frames += 1;
            bytes += payload.len() as u64;
        }
    }
    writer
        .flush()
        .map_err(|err| frame_error("send failed", err))?;
    let mut conn = writer.into_inner();
    conn.close()
        .map_err(|err| transport_error("close failed", err))?;

    print_sent(&args.addr, frames, bytes, format);
    Ok(SUCCESS)
}

fn print_sent(addr: &str, frames: u64, bytes: u64, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = SendOutput {
                kind: "sent",
                addr,
                frames,
                bytes,
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("sent {frames} frame(s), {bytes} bytes to {addr}");
        }
        OutputFormat::Raw => {}
    }
}
