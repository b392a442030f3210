use std::process::Command;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use dronelink_control::{
    attach_with_retry, run_session, AttachRetry, ChildProducer, ControlConfig, ControlError,
    ControlLoop, ExternalProducer, FlightLink, InputSource, PilotStats, ProducerHandle,
    ScriptedInput, SessionContext, SessionEnd, ShutdownReport, SimulatedLink, StopReason,
    DEFAULT_TERMINATE_GRACE, KEY_ESCAPE,
};
use dronelink_video::{FrameSink, NullSink, Overlay, PreviewFileSink};
use serde::Serialize;
use tracing::{info, warn};

use crate::cmd::{install_ctrlc_handler, parse_duration, Globals, PilotArgs};
use crate::exit::{
    control_error, io_error, video_error, CliError, CliResult, FAILURE, INTERNAL, SUCCESS,
};
use crate::logging::forward_args;
use crate::output::{print_fields, print_json, print_pretty, OutputFormat};

#[derive(Serialize)]
struct StepOutput {
    step: String,
    error: Option<String>,
}

#[derive(Serialize)]
struct PilotOutput {
    region: String,
    stop_reason: &'static str,
    ticks: u64,
    frames_rendered: u64,
    frames_skipped: u64,
    commands_sent: u64,
    battery: Option<u8>,
    shutdown: Vec<StepOutput>,
}

pub fn run(args: PilotArgs, globals: &Globals) -> CliResult<i32> {
    // Validated here so a bad limit fails before a producer is spawned.
    args.producer.frame_config()?;
    let config = ControlConfig {
        tick_period: parse_duration(&args.tick)?,
        telemetry_interval: parse_duration(&args.telemetry_interval)?,
        shutdown_land_wait: parse_duration(&args.land_wait)?,
        ..ControlConfig::default()
    };
    let retry = AttachRetry {
        attempts: args.attach_attempts,
        interval: parse_duration(&args.attach_interval)?,
    };

    let mut sink: Box<dyn FrameSink> = match &args.preview {
        Some(path) => Box::new(
            PreviewFileSink::new(path, parse_duration(&args.preview_interval)?)
                .map_err(|err| video_error("preview sink failed", err))?,
        ),
        None => Box::new(NullSink::new()),
    };
    let overlay = match &args.overlay_font {
        Some(path) => Overlay::from_font_file(path, args.overlay_font_px)
            .map_err(|err| video_error("overlay font failed", err))?,
        None => Overlay::new(),
    };

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut producer = start_producer(&args, globals)?;
    let reader = match attach_with_retry(&args.region, retry, producer.as_mut()) {
        Ok(reader) => reader,
        Err(err) => {
            if let Err(stop_err) = producer.terminate() {
                warn!(error = %stop_err, "failed to stop producer after attach failure");
            }
            return Err(control_error("attach failed", err));
        }
    };

    let mut link = SimulatedLink::new().with_battery(args.battery);
    if let Err(err) = link.connect() {
        if let Err(stop_err) = producer.terminate() {
            warn!(error = %stop_err, "failed to stop producer after connect failure");
        }
        return Err(control_error("flight link connect failed", err.into()));
    }

    let session = SessionContext::new(reader, Box::new(link), producer)
        .with_land_wait(config.shutdown_land_wait);
    let mut control = ControlLoop::new(config);

    // Opened last so a failure above never leaves the terminal in raw mode.
    let input = match open_input(args.keys.as_deref()) {
        Ok(input) => input,
        Err(err) => {
            let report = session.shutdown();
            log_report(&report);
            return Err(err);
        }
    };

    let (end, report) = run_session(
        session,
        &mut control,
        input,
        sink.as_mut(),
        &overlay,
        &running,
    );
    log_report(&report);

    let (stop_reason, pilot_stats, failure) = match end {
        SessionEnd::Stopped(reason, stats) => (stop_reason_name(reason), stats, None),
        SessionEnd::Failed(err) => (
            "error",
            PilotStats::default(),
            Some(control_error("pilot loop failed", err)),
        ),
        SessionEnd::Panicked(message) => (
            "panic",
            PilotStats::default(),
            Some(CliError::new(
                INTERNAL,
                format!("pilot loop panicked: {message}"),
            )),
        ),
    };

    let out = PilotOutput {
        region: args.region.clone(),
        stop_reason,
        ticks: control.stats().ticks,
        frames_rendered: pilot_stats.frames_rendered,
        frames_skipped: pilot_stats.frames_skipped,
        commands_sent: control.stats().commands_sent,
        battery: control.battery_level(),
        shutdown: report
            .steps
            .iter()
            .map(|s| StepOutput {
                step: s.step.to_string(),
                error: s.error.clone(),
            })
            .collect(),
    };
    print_summary(&out, globals.format);

    if let Some(err) = failure {
        return Err(err);
    }
    Ok(if report.is_clean() { SUCCESS } else { FAILURE })
}

fn start_producer(args: &PilotArgs, globals: &Globals) -> CliResult<Box<dyn ProducerHandle>> {
    if args.no_spawn {
        info!(region = %args.region, "using externally managed producer");
        return Ok(Box::new(ExternalProducer));
    }

    let exe = std::env::current_exe().map_err(|err| io_error("locate executable failed", err))?;
    let mut command = Command::new(exe);
    command
        .args(forward_args(globals.log_format, globals.log_level))
        .arg("produce")
        .arg("--region")
        .arg(&args.region)
        .args(args.producer.to_args());

    let producer = ChildProducer::spawn(command, DEFAULT_TERMINATE_GRACE)
        .map_err(|err| control_error("start producer failed", err))?;
    Ok(Box::new(producer))
}

fn open_input(keys: Option<&str>) -> CliResult<Box<dyn InputSource>> {
    if let Some(keys) = keys {
        let mut input = ScriptedInput::from_keys(keys);
        input.push(Some(KEY_ESCAPE));
        return Ok(Box::new(input));
    }

    #[cfg(unix)]
    {
        let terminal = crate::keyboard::TerminalInput::open()
            .map_err(|err| control_error("keyboard unavailable", ControlError::Input(err)))?;
        Ok(Box::new(terminal))
    }
    #[cfg(not(unix))]
    {
        Err(CliError::new(
            crate::exit::USAGE,
            "keyboard input requires a unix terminal (use --keys)",
        ))
    }
}

fn stop_reason_name(reason: StopReason) -> &'static str {
    match reason {
        StopReason::ExitKey => "exit_key",
        StopReason::Interrupted => "interrupted",
    }
}

fn log_report(report: &ShutdownReport) {
    if report.is_clean() {
        info!(steps = report.steps.len(), "shutdown complete");
    } else {
        for failed in report.failures() {
            warn!(step = %failed.step, error = ?failed.error, "shutdown step did not complete");
        }
    }
}

fn print_summary(out: &PilotOutput, format: OutputFormat) {
    let steps = out
        .shutdown
        .iter()
        .map(|s| match &s.error {
            Some(err) => format!("{} (failed: {err})", s.step),
            None => s.step.clone(),
        })
        .collect::<Vec<_>>()
        .join(", ");
    let rows = [
        ("region", out.region.clone()),
        ("stop_reason", out.stop_reason.to_string()),
        ("ticks", out.ticks.to_string()),
        ("frames_rendered", out.frames_rendered.to_string()),
        ("frames_skipped", out.frames_skipped.to_string()),
        ("commands_sent", out.commands_sent.to_string()),
        (
            "battery",
            out.battery
                .map_or_else(|| "N/A".to_string(), |level| format!("{level}%")),
        ),
        ("shutdown", steps),
    ];

    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table => print_fields(&rows),
        OutputFormat::Pretty => print_pretty(&rows),
    }
}
