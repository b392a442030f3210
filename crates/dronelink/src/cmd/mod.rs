use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Subcommand};
use dronelink_frame::{FrameConfig, DEFAULT_MAX_HEIGHT, DEFAULT_MAX_WIDTH};
use dronelink_video::{CaptureSpec, ProducerConfig, DEFAULT_FONT_PX};

use crate::exit::{frame_error, CliError, CliResult, INTERNAL, USAGE};
use crate::logging::{LogFormat, LogLevel};
use crate::output::OutputFormat;

pub mod pilot;
pub mod probe;
pub mod produce;
pub mod version;

/// Region name used when none is given.
pub const DEFAULT_REGION: &str = "pioneer_frame";

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Capture frames and publish them into the shared region.
    Produce(ProduceArgs),
    /// Fly: show frames, read keys, drive the flight link.
    Pilot(PilotArgs),
    /// Attach once and report what the region currently holds.
    Probe(ProbeArgs),
    /// Show version information.
    Version(VersionArgs),
}

/// Options every subcommand can see.
#[derive(Debug, Clone, Copy)]
pub struct Globals {
    pub format: OutputFormat,
    pub log_format: LogFormat,
    pub log_level: LogLevel,
}

pub fn run(command: Command, globals: &Globals) -> CliResult<i32> {
    match command {
        Command::Produce(args) => produce::run(args),
        Command::Pilot(args) => pilot::run(args, globals),
        Command::Probe(args) => probe::run(args, globals.format),
        Command::Version(args) => version::run(args),
    }
}

/// Producer settings shared by `produce` and the producer `pilot` spawns.
#[derive(Args, Debug, Clone)]
pub struct ProducerOpts {
    /// Capture source: `pattern`, `pattern:WxH` or `dir:PATH`.
    #[arg(long, env = "DRONELINK_SOURCE", default_value = "pattern")]
    pub source: CaptureSpec,
    /// Target time between captures (e.g. 33ms).
    #[arg(long, default_value = "33ms")]
    pub interval: String,
    /// Snapshot file, overwritten every --snapshot-every frames.
    #[arg(long, default_value = "frame.jpg", conflicts_with = "no_snapshot")]
    pub snapshot: PathBuf,
    /// Disable snapshots.
    #[arg(long)]
    pub no_snapshot: bool,
    /// Save a snapshot every N published frames.
    #[arg(long, default_value_t = 50)]
    pub snapshot_every: u32,
    /// Widest frame the region must hold.
    #[arg(long, default_value_t = DEFAULT_MAX_WIDTH, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_width: u32,
    /// Tallest frame the region must hold.
    #[arg(long, default_value_t = DEFAULT_MAX_HEIGHT, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_height: u32,
}

impl ProducerOpts {
    /// Region sizing, rejected up front if it cannot be allocated.
    pub fn frame_config(&self) -> CliResult<FrameConfig> {
        let config = FrameConfig {
            max_width: self.max_width,
            max_height: self.max_height,
        };
        config
            .capacity()
            .map_err(|err| frame_error("invalid frame limits", err))?;
        Ok(config)
    }

    pub fn producer_config(&self) -> CliResult<ProducerConfig> {
        Ok(ProducerConfig {
            interval: parse_duration(&self.interval)?,
            snapshot_every: self.snapshot_every,
            snapshot_path: (!self.no_snapshot).then(|| self.snapshot.clone()),
        })
    }

    /// The same settings as command-line arguments, for a spawned producer.
    pub fn to_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "--source".into(),
            self.source.to_string().into(),
            "--interval".into(),
            self.interval.clone().into(),
            "--snapshot-every".into(),
            self.snapshot_every.to_string().into(),
            "--max-width".into(),
            self.max_width.to_string().into(),
            "--max-height".into(),
            self.max_height.to_string().into(),
        ];
        if self.no_snapshot {
            args.push("--no-snapshot".into());
        } else {
            args.push("--snapshot".into());
            args.push(self.snapshot.clone().into());
        }
        args
    }
}

#[derive(Args, Debug)]
pub struct ProduceArgs {
    /// Shared-memory region name.
    #[arg(long, env = "DRONELINK_REGION", default_value = DEFAULT_REGION)]
    pub region: String,
    #[command(flatten)]
    pub producer: ProducerOpts,
}

#[derive(Args, Debug)]
pub struct PilotArgs {
    /// Shared-memory region name.
    #[arg(long, env = "DRONELINK_REGION", default_value = DEFAULT_REGION)]
    pub region: String,
    /// Attach to an already running producer instead of starting one.
    #[arg(long)]
    pub no_spawn: bool,
    #[command(flatten)]
    pub producer: ProducerOpts,
    /// Attach attempts while waiting for the producer's region.
    #[arg(long, default_value_t = 50)]
    pub attach_attempts: u32,
    /// Pause between attach attempts (e.g. 100ms).
    #[arg(long, default_value = "100ms")]
    pub attach_interval: String,
    /// Control loop period.
    #[arg(long, env = "DRONELINK_TICK", default_value = "20ms")]
    pub tick: String,
    /// Battery telemetry refresh interval.
    #[arg(long, default_value = "10s")]
    pub telemetry_interval: String,
    /// Pause between the shutdown land command and closing the link.
    #[arg(long, default_value = "1s")]
    pub land_wait: String,
    /// Write annotated frames to this image file (format from extension).
    #[arg(long, env = "DRONELINK_PREVIEW", value_name = "FILE")]
    pub preview: Option<PathBuf>,
    /// Minimum time between preview writes.
    #[arg(long, default_value = "200ms")]
    pub preview_interval: String,
    /// TrueType/OpenType font for the battery label (built-in bitmap font
    /// otherwise).
    #[arg(long, env = "DRONELINK_OVERLAY_FONT", value_name = "FILE")]
    pub overlay_font: Option<PathBuf>,
    /// Label height in pixels when --overlay-font is set.
    #[arg(long, default_value_t = DEFAULT_FONT_PX, requires = "overlay_font")]
    pub overlay_font_px: f32,
    /// Replay these keys (one per tick, `.` idles) instead of reading the
    /// terminal; the session exits when they run out.
    #[arg(long, value_name = "KEYS")]
    pub keys: Option<String>,
    /// Starting battery level of the simulated flight link.
    #[arg(long, default_value_t = 100, value_parser = clap::value_parser!(u8).range(0..=100))]
    pub battery: u8,
}

#[derive(Args, Debug)]
pub struct ProbeArgs {
    /// Shared-memory region name.
    #[arg(long, env = "DRONELINK_REGION", default_value = DEFAULT_REGION)]
    pub region: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build and protocol details.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `500ms`, `2s` or a bare number of seconds.
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
        .trim()
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

/// Clear `running` on SIGINT/SIGTERM; the loops notice on their next iteration.
pub fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("33ms").unwrap(), Duration::from_millis(33));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0ms").is_err());
        assert!(parse_duration("").is_err());
        assert!(parse_duration("fast").is_err());
        assert_eq!(parse_duration("-5s").unwrap_err().code, USAGE);
    }

    fn opts() -> ProducerOpts {
        ProducerOpts {
            source: CaptureSpec::Pattern {
                width: 64,
                height: 48,
            },
            interval: "10ms".to_string(),
            snapshot: PathBuf::from("snap.png"),
            no_snapshot: false,
            snapshot_every: 5,
            max_width: 640,
            max_height: 480,
        }
    }

    #[test]
    fn producer_opts_forward_as_args() {
        let args: Vec<String> = opts()
            .to_args()
            .into_iter()
            .map(|a| a.into_string().unwrap())
            .collect();
        assert_eq!(
            args,
            [
                "--source",
                "pattern:64x48",
                "--interval",
                "10ms",
                "--snapshot-every",
                "5",
                "--max-width",
                "640",
                "--max-height",
                "480",
                "--snapshot",
                "snap.png",
            ]
        );
    }

    #[test]
    fn oversized_frame_limits_are_usage_errors() {
        let big = ProducerOpts {
            max_width: u32::MAX,
            max_height: u32::MAX,
            ..opts()
        };
        assert_eq!(big.frame_config().unwrap_err().code, USAGE);
        assert_eq!(opts().frame_config().unwrap().max_width, 640);
    }

    #[test]
    fn no_snapshot_disables_snapshot_path() {
        let opts = ProducerOpts {
            no_snapshot: true,
            ..opts()
        };
        let config = opts.producer_config().unwrap();
        assert_eq!(config.snapshot_path, None);
        assert_eq!(config.interval, Duration::from_millis(10));
        assert!(opts.to_args().contains(&OsString::from("--no-snapshot")));
    }
}
