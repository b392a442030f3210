use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use dronelink_frame::FrameRead;
use dronelink_video::{battery_label, FrameSink, Overlay};
use tracing::{debug, error, info, warn};

use crate::control_loop::ControlLoop;
use crate::error::{ControlError, Result};
use crate::input::InputSource;
use crate::session::{SessionContext, ShutdownReport};

/// Why the pilot loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The operator pressed the exit key.
    ExitKey,
    /// The cancellation flag was cleared (Ctrl-C, SIGTERM).
    Interrupted,
}

/// Counters for one pilot session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PilotStats {
    pub ticks: u64,
    pub frames_rendered: u64,
    pub frames_skipped: u64,
    pub render_failures: u64,
}

/// How a session ended, before its shutdown ran.
#[derive(Debug)]
pub enum SessionEnd {
    /// The loop returned normally.
    Stopped(StopReason, PilotStats),
    /// The loop returned an error.
    Failed(ControlError),
    /// The loop panicked; carries the panic message.
    Panicked(String),
}

/// Run [`run_pilot`], then the ordered shutdown, whatever the loop did.
///
/// `input` is dropped before the shutdown starts so a raw terminal is
/// restored before anything else is logged.
pub fn run_session(
    mut session: SessionContext,
    control: &mut ControlLoop,
    mut input: Box<dyn InputSource>,
    sink: &mut dyn FrameSink,
    overlay: &Overlay,
    running: &AtomicBool,
) -> (SessionEnd, ShutdownReport) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        run_pilot(
            &mut session,
            control,
            input.as_mut(),
            sink,
            overlay,
            running,
        )
    }));
    drop(input);

    let end = match outcome {
        Ok(Ok((reason, stats))) => SessionEnd::Stopped(reason, stats),
        Ok(Err(err)) => {
            warn!(error = %err, "pilot loop failed");
            SessionEnd::Failed(err)
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(%message, "pilot loop panicked");
            SessionEnd::Panicked(message)
        }
    };
    (end, session.shutdown())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Run the single-threaded consumer/control loop until exit or cancellation.
///
/// Each iteration: check `running`, read and render the latest frame,
/// poll one key, run one control tick, sleep out the rest of the period.
/// The caller is expected to call [`SessionContext::shutdown`] afterwards,
/// whatever this returns; [`run_session`] does both.
pub fn run_pilot(
    session: &mut SessionContext,
    control: &mut ControlLoop,
    input: &mut dyn InputSource,
    sink: &mut dyn FrameSink,
    overlay: &Overlay,
    running: &AtomicBool,
) -> Result<(StopReason, PilotStats)> {
    let period = control.config().tick_period;
    let mut stats = PilotStats::default();
    info!(period_ms = period.as_millis() as u64, "pilot loop started");

    loop {
        if !running.load(Ordering::SeqCst) {
            info!(ticks = stats.ticks, "pilot loop interrupted");
            return Ok((StopReason::Interrupted, stats));
        }
        let started = Instant::now();
        stats.ticks += 1;

        match session.frames().read() {
            FrameRead::Frame(frame) => match overlay.annotate(&frame, control.battery_level()) {
                Some(image) => {
                    let label = battery_label(control.battery_level());
                    match sink.render(&image, &label) {
                        Ok(()) => stats.frames_rendered += 1,
                        Err(err) => {
                            stats.render_failures += 1;
                            warn!(error = %err, "render failed");
                        }
                    }
                }
                None => stats.frames_skipped += 1,
            },
            FrameRead::Empty | FrameRead::Invalid(_) => stats.frames_skipped += 1,
        }

        let key = input.poll_key().map_err(ControlError::Input)?;
        let outcome = control.tick(started, key, session.link());
        if outcome.exit_requested {
            info!(ticks = stats.ticks, "pilot loop finished by operator");
            return Ok((StopReason::ExitKey, stats));
        }

        let elapsed = started.elapsed();
        if elapsed > period {
            debug!(elapsed_ms = elapsed.as_millis() as u64, "control tick overran");
        }
        std::thread::sleep(period.saturating_sub(elapsed));
    }
}
