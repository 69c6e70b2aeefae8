use framecast_receiver::{
    CancelFlag, ColorMode, CountingSink, FrameSink, Receiver, ReceiverConfig, SnapshotSink,
};

use crate::cmd::{parse_duration, ListenArgs};
use crate::exit::{receiver_error, sink_error, CliError, CliResult, INTERNAL, SUCCESS, USAGE};
use crate::output::{print_summary, OutputFormat, OutputSink};

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let config = receiver_config(&args)?;
    let receiver = Receiver::bind(config).map_err(|err| receiver_error("bind failed", err))?;

    let cancel = CancelFlag::new();
    install_ctrlc_handler(cancel.clone())?;

    let mut sink = build_sink(&args, format, &cancel)?;

    let summary = receiver
        .serve(&mut sink, &cancel)
        .map_err(|err| receiver_error("receive failed", err))?;

    print_summary(&summary, format);
    Ok(SUCCESS)
}

fn receiver_config(args: &ListenArgs) -> CliResult<ReceiverConfig> {
    let poll_interval = parse_duration(&args.poll_interval)?;
    if args.count == Some(0) {
        return Err(CliError::new(USAGE, "--count must be greater than zero"));
    }

    Ok(ReceiverConfig {
        bind_addr: args.bind.clone(),
        port: args.port,
        max_payload_size: args.max_payload,
        poll_interval,
        decode_error_policy: args.on_decode_error.into(),
        color_mode: if args.grayscale {
            ColorMode::Grayscale
        } else {
            ColorMode::Color
        },
        max_connections: args.connections,
    })
}

fn build_sink(
    args: &ListenArgs,
    format: OutputFormat,
    cancel: &CancelFlag,
) -> CliResult<Box<dyn FrameSink>> {
    let mut output = OutputSink::new(format);
    if let Some(path) = &args.snapshot {
        let snapshot =
            SnapshotSink::new(path).map_err(|err| sink_error("snapshot setup failed", err))?;
        output = output.with_inner(Box::new(snapshot));
    }

    Ok(match args.count {
        Some(limit) => Box::new(CountingSink::new(output, limit).cancel_on_limit(cancel.clone())),
        None => Box::new(output),
    })
}

fn install_ctrlc_handler(cancel: CancelFlag) -> CliResult<()> {
    ctrlc::set_handler(move || {
        cancel.cancel();
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use framecast_receiver::DecodeErrorPolicy;

    use super::*;
    use crate::cmd::OnDecodeError;

    fn args() -> ListenArgs {
        ListenArgs {
            bind: "127.0.0.1".to_string(),
            port: 0,
            max_payload: 1024,
            grayscale: true,
            on_decode_error: OnDecodeError::Disconnect,
            snapshot: None,
            count: None,
            connections: Some(2),
            poll_interval: "25ms".to_string(),
        }
    }

    #[test]
    fn config_follows_arguments() {
        let config = receiver_config(&args()).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1");
        assert_eq!(config.max_payload_size, 1024);
        assert_eq!(config.poll_interval, Duration::from_millis(25));
        assert_eq!(config.decode_error_policy, DecodeErrorPolicy::Disconnect);
        assert_eq!(config.color_mode, ColorMode::Grayscale);
        assert_eq!(config.max_connections, Some(2));
    }

    #[test]
    fn zero_count_is_rejected() {
        let mut args = args();
        args.count = Some(0);
        assert_eq!(receiver_config(&args).unwrap_err().code, USAGE);
    }

    #[test]
    fn bad_poll_interval_is_rejected() {
        let mut args = args();
        args.poll_interval = "soon".to_string();
        assert_eq!(receiver_config(&args).unwrap_err().code, USAGE);
    }
}
