use std::fmt;
use std::time::Duration;

use dronelink_frame::FrameReader;
use tracing::{info, warn};

use crate::link::{land_with_retry, FlightLink};
use crate::lifecycle::ProducerHandle;

/// Everything a pilot session holds that must be released in order.
///
/// Built once the region is attached and the link is connected. The only way
/// to release it is [`SessionContext::shutdown`], which consumes it.
pub struct SessionContext {
    frames: FrameReader,
    link: Box<dyn FlightLink>,
    producer: Box<dyn ProducerHandle>,
    land_wait: Duration,
}

impl SessionContext {
    pub fn new(
        frames: FrameReader,
        link: Box<dyn FlightLink>,
        producer: Box<dyn ProducerHandle>,
    ) -> Self {
        Self {
            frames,
            link,
            producer,
            land_wait: Duration::from_secs(1),
        }
    }

    /// Pause between the shutdown land command and closing the link.
    pub fn with_land_wait(mut self, wait: Duration) -> Self {
        self.land_wait = wait;
        self
    }

    pub fn frames(&mut self) -> &mut FrameReader {
        &mut self.frames
    }

    pub fn link(&mut self) -> &mut dyn FlightLink {
        self.link.as_mut()
    }

    pub fn producer_id(&self) -> Option<u32> {
        self.producer.id()
    }

    /// Land, wait, close the link, stop the producer, release the region.
    ///
    /// Every step runs even if an earlier one failed; failures are collected
    /// in the report rather than returned.
    pub fn shutdown(self) -> ShutdownReport {
        let Self {
            frames,
            mut link,
            mut producer,
            land_wait,
        } = self;
        let mut report = ShutdownReport::default();

        info!("shutdown: landing");
        report.record(ShutdownStep::Land, land_with_retry(link.as_mut()));
        std::thread::sleep(land_wait);

        report.record(ShutdownStep::CloseLink, link.close());
        drop(link);

        report.record(ShutdownStep::TerminateProducer, producer.terminate());
        drop(producer);

        let region = frames.name().unwrap_or_default().to_string();
        drop(frames);
        info!(%region, "shutdown: released frame region");
        report.steps.push(StepResult {
            step: ShutdownStep::ReleaseRegion,
            error: None,
        });

        report
    }
}

/// Steps of the shutdown sequence, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownStep {
    Land,
    CloseLink,
    TerminateProducer,
    ReleaseRegion,
}

impl fmt::Display for ShutdownStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Land => "land",
            Self::CloseLink => "close flight link",
            Self::TerminateProducer => "terminate producer",
            Self::ReleaseRegion => "release frame region",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepResult {
    pub step: ShutdownStep,
    pub error: Option<String>,
}

/// What happened during shutdown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub steps: Vec<StepResult>,
}

impl ShutdownReport {
    fn record<E: fmt::Display>(&mut self, step: ShutdownStep, result: Result<(), E>) {
        let error = match result {
            Ok(()) => None,
            Err(err) => {
                warn!(%step, error = %err, "shutdown step failed");
                Some(err.to_string())
            }
        };
        self.steps.push(StepResult { step, error });
    }

    /// Steps in the order they ran.
    pub fn order(&self) -> Vec<ShutdownStep> {
        self.steps.iter().map(|s| s.step).collect()
    }

    pub fn failures(&self) -> impl Iterator<Item = &StepResult> {
        self.steps.iter().filter(|s| s.error.is_some())
    }

    pub fn is_clean(&self) -> bool {
        self.failures().next().is_none()
    }
}
