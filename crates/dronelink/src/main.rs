mod cmd;
mod exit;
#[cfg(unix)]
mod keyboard;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::{Command, Globals};
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(
    name = "dronelink",
    version,
    about = "Shared-memory video link and keyboard teleoperation"
)]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(
        long,
        value_name = "FORMAT",
        default_value = "text",
        env = "DRONELINK_LOG_FORMAT",
        global = true
    )]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(
        long,
        value_name = "LEVEL",
        default_value = "info",
        env = "DRONELINK_LOG_LEVEL",
        global = true
    )]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let globals = Globals {
        format: cli.format.unwrap_or_else(OutputFormat::default_for_stdout),
        log_format: cli.log_format,
        log_level: cli.log_level,
    };
    let result = cmd::run(cli.command, &globals);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use dronelink_video::CaptureSpec;

    use super::*;

    #[test]
    fn parses_produce_subcommand() {
        let cli = Cli::try_parse_from([
            "dronelink",
            "produce",
            "--region",
            "cam0",
            "--source",
            "pattern:320x240",
            "--snapshot-every",
            "10",
        ])
        .expect("produce args should parse");

        let Command::Produce(args) = cli.command else {
            panic!("expected produce");
        };
        assert_eq!(args.region, "cam0");
        assert_eq!(
            args.producer.source,
            CaptureSpec::Pattern {
                width: 320,
                height: 240
            }
        );
        assert_eq!(args.producer.snapshot_every, 10);
        assert_eq!(args.producer.snapshot, PathBuf::from("frame.jpg"));
    }

    #[test]
    fn rejects_unknown_capture_source() {
        let err = Cli::try_parse_from(["dronelink", "produce", "--source", "webcam"])
            .expect_err("unknown source should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn parses_pilot_subcommand() {
        let cli = Cli::try_parse_from([
            "dronelink",
            "--log-level",
            "warn",
            "pilot",
            "--no-spawn",
            "--keys",
            "1w5",
            "--preview",
            "/tmp/preview.png",
            "--tick",
            "10ms",
        ])
        .expect("pilot args should parse");

        let Command::Pilot(args) = cli.command else {
            panic!("expected pilot");
        };
        assert!(args.no_spawn);
        assert_eq!(args.keys.as_deref(), Some("1w5"));
        assert_eq!(args.tick, "10ms");
        assert!(matches!(cli.log_level, LogLevel::Warn));
    }

    #[test]
    fn rejects_conflicting_snapshot_args() {
        let err = Cli::try_parse_from([
            "dronelink",
            "produce",
            "--snapshot",
            "a.jpg",
            "--no-snapshot",
        ])
        .expect_err("conflicting args should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn rejects_zero_frame_limits() {
        let err = Cli::try_parse_from(["dronelink", "produce", "--max-width", "0"])
            .expect_err("zero width should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn parses_probe_subcommand() {
        let cli = Cli::try_parse_from(["dronelink", "--format", "json", "probe"])
            .expect("probe args should parse");
        assert!(matches!(cli.command, Command::Probe(_)));
        assert!(matches!(cli.format, Some(OutputFormat::Json)));
    }
}
