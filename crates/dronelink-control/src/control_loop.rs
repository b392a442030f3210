//! Fixed-period teleoperation state machine.
//!
//! Each tick turns at most one key press into either a one-shot flight
//! command or a single-tick stick deflection, applies the hover override,
//! refreshes telemetry at a coarse interval and sends the full channel
//! vector. Takeoff and land are timed sub-states advanced by later ticks, so
//! a tick never blocks on a sequence.

use std::time::{Duration, Instant};

use tracing::{debug, info, trace, warn};

use crate::channels::{ChannelLimits, ChannelVector};
use crate::error::LinkError;
use crate::input::Action;
use crate::link::{land_with_retry, FlightLink};
use crate::telemetry::{BatteryMonitor, DEFAULT_TELEMETRY_INTERVAL};

/// Default control period (50 Hz).
pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_millis(20);

/// Informational mirror of the controller's flight state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlightPhase {
    Disarmed,
    Armed,
    Flying,
    Landing,
}

/// Delays inside the takeoff and land sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceTimings {
    /// Takeoff: pause before arming. Default: 2 s.
    pub takeoff_lead: Duration,
    /// Takeoff: pause between arm and takeoff. Default: 1 s.
    pub takeoff_arm_settle: Duration,
    /// Takeoff: time given to climb before input is accepted again. Default: 2 s.
    pub takeoff_climb: Duration,
    /// Land: pause before the land command. Default: 2 s.
    pub land_lead: Duration,
    /// Land: time given to touch down. Default: 2 s.
    pub land_settle: Duration,
}

impl SequenceTimings {
    /// All delays zero: a sequence completes within the tick that starts it.
    pub const IMMEDIATE: Self = Self {
        takeoff_lead: Duration::ZERO,
        takeoff_arm_settle: Duration::ZERO,
        takeoff_climb: Duration::ZERO,
        land_lead: Duration::ZERO,
        land_settle: Duration::ZERO,
    };
}

impl Default for SequenceTimings {
    fn default() -> Self {
        Self {
            takeoff_lead: Duration::from_secs(2),
            takeoff_arm_settle: Duration::from_secs(1),
            takeoff_climb: Duration::from_secs(2),
            land_lead: Duration::from_secs(2),
            land_settle: Duration::from_secs(2),
        }
    }
}

/// Where a running sequence is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceStage {
    /// Waiting to arm.
    TakeoffLead,
    /// Armed, waiting to issue takeoff.
    TakeoffArmed,
    /// Takeoff issued, climbing.
    TakeoffClimb,
    /// Waiting to issue land.
    LandLead,
    /// Land issued, touching down.
    LandSettle,
}

#[derive(Debug, Clone, Copy)]
struct Sequence {
    stage: SequenceStage,
    until: Instant,
}

/// Control loop settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlConfig {
    /// Time between ticks. Default: 20 ms.
    pub tick_period: Duration,
    /// Stick bounds and aux value.
    pub limits: ChannelLimits,
    /// Battery query interval. Default: 10 s.
    pub telemetry_interval: Duration,
    pub timings: SequenceTimings,
    /// Pause between the shutdown land and closing the link. Default: 1 s.
    pub shutdown_land_wait: Duration,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            tick_period: DEFAULT_TICK_PERIOD,
            limits: ChannelLimits::default(),
            telemetry_interval: DEFAULT_TELEMETRY_INTERVAL,
            timings: SequenceTimings::default(),
            shutdown_land_wait: Duration::from_secs(1),
        }
    }
}

/// Result of one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickOutcome {
    /// The vector built this tick (sent unless `exit_requested`).
    pub channels: ChannelVector,
    /// The action decoded from this tick's key, if any.
    pub action: Option<Action>,
    /// The exit key was pressed; nothing was sent.
    pub exit_requested: bool,
    /// The channel vector reached the link.
    pub sent: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlStats {
    pub ticks: u64,
    pub commands_sent: u64,
    pub send_failures: u64,
    pub action_failures: u64,
    pub ignored_inputs: u64,
}

pub struct ControlLoop {
    config: ControlConfig,
    phase: FlightPhase,
    hover: bool,
    sequence: Option<Sequence>,
    battery: BatteryMonitor,
    stats: ControlStats,
}

impl ControlLoop {
    pub fn new(config: ControlConfig) -> Self {
        Self {
            battery: BatteryMonitor::new(config.telemetry_interval),
            config,
            phase: FlightPhase::Disarmed,
            hover: false,
            sequence: None,
            stats: ControlStats::default(),
        }
    }

    /// Run one control tick at time `now` with at most one pending key.
    pub fn tick(
        &mut self,
        now: Instant,
        key: Option<u8>,
        link: &mut dyn FlightLink,
    ) -> TickOutcome {
        self.stats.ticks += 1;
        let mut channels = ChannelVector::neutral(self.config.limits.aux);

        let action = key.and_then(Action::from_key);
        if let (Some(key), None) = (key, action) {
            trace!(key, "unmapped key");
        }

        if action == Some(Action::Exit) {
            info!("exit requested");
            return TickOutcome {
                channels,
                action,
                exit_requested: true,
                sent: false,
            };
        }

        if self.sequence.is_some() {
            if let Some(action) = action {
                self.stats.ignored_inputs += 1;
                debug!(?action, "input ignored while a sequence runs");
            }
            self.advance_sequence(now, link);
        } else if let Some(action) = action {
            self.apply(action, now, link, &mut channels);
        }

        if self.hover {
            channels.neutralize_movement();
        }
        // Custom limits may sit outside the controller's accepted range.
        let channels = channels.clamped();

        self.battery.refresh(now, link);

        let sent = match link.send_channels(&channels) {
            Ok(()) => {
                self.stats.commands_sent += 1;
                true
            }
            Err(err) => {
                self.stats.send_failures += 1;
                warn!(error = %err, %channels, "failed to send channels");
                false
            }
        };

        TickOutcome {
            channels,
            action,
            exit_requested: false,
            sent,
        }
    }

    fn apply(
        &mut self,
        action: Action,
        now: Instant,
        link: &mut dyn FlightLink,
        channels: &mut ChannelVector,
    ) {
        match action {
            Action::Arm => {
                info!("arming");
                match link.arm() {
                    Ok(()) if self.phase == FlightPhase::Disarmed => {
                        self.phase = FlightPhase::Armed;
                    }
                    Ok(()) => {}
                    Err(err) => self.action_failed("arm", &err),
                }
            }
            Action::Disarm => {
                info!("disarming");
                match link.disarm() {
                    Ok(()) => self.phase = FlightPhase::Disarmed,
                    Err(err) => self.action_failed("disarm", &err),
                }
            }
            Action::Takeoff => {
                info!("takeoff sequence started");
                let delay = self.config.timings.takeoff_lead;
                self.start_sequence(SequenceStage::TakeoffLead, delay, now, link);
            }
            Action::Land => {
                info!("land sequence started");
                let delay = self.config.timings.land_lead;
                self.start_sequence(SequenceStage::LandLead, delay, now, link);
            }
            Action::ToggleHover => {
                self.hover = !self.hover;
                info!(hover = self.hover, "hover mode toggled");
            }
            Action::Move(movement) => {
                channels.apply(movement, &self.config.limits);
                debug!(?movement, "stick deflected");
            }
            // Handled before dispatch.
            Action::Exit => {}
        }
    }

    fn start_sequence(
        &mut self,
        stage: SequenceStage,
        delay: Duration,
        now: Instant,
        link: &mut dyn FlightLink,
    ) {
        self.sequence = Some(Sequence {
            stage,
            until: now + delay,
        });
        self.advance_sequence(now, link);
    }

    fn advance_sequence(&mut self, now: Instant, link: &mut dyn FlightLink) {
        while let Some(sequence) = self.sequence {
            if now < sequence.until {
                break;
            }
            self.sequence = self.finish_stage(sequence.stage, now, link);
        }
    }

    fn finish_stage(
        &mut self,
        stage: SequenceStage,
        now: Instant,
        link: &mut dyn FlightLink,
    ) -> Option<Sequence> {
        let timings = self.config.timings;
        let next = |stage: SequenceStage, delay: Duration| {
            Some(Sequence {
                stage,
                until: now + delay,
            })
        };

        match stage {
            SequenceStage::TakeoffLead => match link.arm() {
                Ok(()) => {
                    self.phase = FlightPhase::Armed;
                    next(SequenceStage::TakeoffArmed, timings.takeoff_arm_settle)
                }
                Err(err) => {
                    self.action_failed("arm", &err);
                    None
                }
            },
            SequenceStage::TakeoffArmed => match link.takeoff() {
                Ok(()) => {
                    self.phase = FlightPhase::Flying;
                    next(SequenceStage::TakeoffClimb, timings.takeoff_climb)
                }
                Err(err) => {
                    self.action_failed("takeoff", &err);
                    None
                }
            },
            SequenceStage::TakeoffClimb => {
                info!("takeoff sequence complete");
                None
            }
            SequenceStage::LandLead => match land_with_retry(link) {
                Ok(()) => {
                    self.phase = FlightPhase::Landing;
                    next(SequenceStage::LandSettle, timings.land_settle)
                }
                Err(err) => {
                    self.action_failed("land", &err);
                    None
                }
            },
            SequenceStage::LandSettle => {
                self.phase = FlightPhase::Disarmed;
                info!("land sequence complete");
                None
            }
        }
    }

    fn action_failed(&mut self, command: &'static str, err: &LinkError) {
        self.stats.action_failures += 1;
        warn!(command, error = %err, "flight command failed");
    }

    pub fn phase(&self) -> FlightPhase {
        self.phase
    }

    pub fn hover_enabled(&self) -> bool {
        self.hover
    }

    /// Stage of the running takeoff/land sequence, if any.
    pub fn sequence_stage(&self) -> Option<SequenceStage> {
        self.sequence.map(|s| s.stage)
    }

    /// Last known battery level, for display.
    pub fn battery_level(&self) -> Option<u8> {
        self.battery.level()
    }

    pub fn config(&self) -> &ControlConfig {
        &self.config
    }

    pub fn stats(&self) -> ControlStats {
        self.stats
    }
}
