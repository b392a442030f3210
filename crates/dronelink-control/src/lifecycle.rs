use std::io;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use dronelink_frame::{FrameError, FrameReader};
use tracing::{debug, info, warn};

use crate::error::{ControlError, Result};

/// Default time a producer gets to exit after SIGTERM before it is killed.
pub const DEFAULT_TERMINATE_GRACE: Duration = Duration::from_secs(3);

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// The process that owns the frame region.
pub trait ProducerHandle {
    /// OS process id, if this handle manages a process.
    fn id(&self) -> Option<u32>;

    /// If the producer has already exited, a description of how.
    fn exit_status(&mut self) -> Option<String>;

    /// Stop the producer. Calling this more than once is harmless.
    fn terminate(&mut self) -> Result<()>;
}

impl<P: ProducerHandle + ?Sized> ProducerHandle for Box<P> {
    fn id(&self) -> Option<u32> {
        (**self).id()
    }

    fn exit_status(&mut self) -> Option<String> {
        (**self).exit_status()
    }

    fn terminate(&mut self) -> Result<()> {
        (**self).terminate()
    }
}

/// A producer started as a child process of this one.
#[derive(Debug)]
pub struct ChildProducer {
    child: Child,
    grace: Duration,
    terminated: bool,
}

impl ChildProducer {
    /// Spawn `command` with stdin detached so it cannot steal operator keys.
    ///
    /// On Unix the child gets its own process group: a Ctrl-C at the
    /// terminal reaches only this process, which then stops the producer as
    /// part of its own shutdown.
    pub fn spawn(mut command: Command, grace: Duration) -> Result<Self> {
        command.stdin(Stdio::null());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }
        let child = command.spawn().map_err(ControlError::Producer)?;
        info!(pid = child.id(), "producer started");
        Ok(Self {
            child,
            grace,
            terminated: false,
        })
    }

    fn reaped(&mut self) -> Result<Option<String>> {
        let status = self.child.try_wait().map_err(ControlError::Producer)?;
        Ok(status.map(|status| {
            self.terminated = true;
            status.to_string()
        }))
    }
}

impl ProducerHandle for ChildProducer {
    fn id(&self) -> Option<u32> {
        Some(self.child.id())
    }

    fn exit_status(&mut self) -> Option<String> {
        self.reaped().ok().flatten()
    }

    fn terminate(&mut self) -> Result<()> {
        if self.terminated {
            return Ok(());
        }
        if let Some(status) = self.reaped()? {
            info!(%status, "producer had already exited");
            return Ok(());
        }

        let pid = self.child.id();
        request_stop(&mut self.child).map_err(ControlError::Producer)?;
        let deadline = Instant::now() + self.grace;
        while Instant::now() < deadline {
            if let Some(status) = self.reaped()? {
                info!(pid, %status, "producer stopped");
                return Ok(());
            }
            std::thread::sleep(EXIT_POLL_INTERVAL);
        }

        warn!(pid, grace = ?self.grace, "producer did not stop in time, killing");
        self.child.kill().map_err(ControlError::Producer)?;
        let status = self.child.wait().map_err(ControlError::Producer)?;
        self.terminated = true;
        info!(pid, %status, "producer killed");
        Ok(())
    }
}

impl Drop for ChildProducer {
    fn drop(&mut self) {
        if !self.terminated {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

#[cfg(unix)]
fn request_stop(child: &mut Child) -> io::Result<()> {
    let pid = libc::pid_t::try_from(child.id())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
    // SAFETY: kill(2) only delivers a signal to our own, not yet reaped, child.
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn request_stop(child: &mut Child) -> io::Result<()> {
    child.kill()
}

/// A producer started and supervised by someone else.
///
/// Terminating it is a no-op; the region stays owned by that process.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExternalProducer;

impl ProducerHandle for ExternalProducer {
    fn id(&self) -> Option<u32> {
        None
    }

    fn exit_status(&mut self) -> Option<String> {
        None
    }

    fn terminate(&mut self) -> Result<()> {
        debug!("producer is managed externally, leaving it running");
        Ok(())
    }
}

/// How long to wait for the producer to create the region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachRetry {
    /// Total attach attempts (at least one is always made). Default: 50.
    pub attempts: u32,
    /// Pause between attempts. Default: 100 ms.
    pub interval: Duration,
}

impl AttachRetry {
    /// Try exactly once.
    pub const ONCE: Self = Self {
        attempts: 1,
        interval: Duration::ZERO,
    };
}

impl Default for AttachRetry {
    fn default() -> Self {
        Self {
            attempts: 50,
            interval: Duration::from_millis(100),
        }
    }
}

/// Attach to the frame region, waiting for the producer to create it.
///
/// Only "not there yet" conditions are retried. If the producer exits while
/// we wait, fails with [`ControlError::ProducerExited`]; once attempts run
/// out the last attach error (normally `NotFound`) is returned.
pub fn attach_with_retry(
    name: &str,
    retry: AttachRetry,
    producer: &mut dyn ProducerHandle,
) -> Result<FrameReader> {
    let attempts = retry.attempts.max(1);
    let mut attempt = 1;
    loop {
        match FrameReader::attach(name) {
            Ok(reader) => {
                info!(
                    region = name,
                    attempt,
                    capacity = reader.capacity(),
                    "attached to frame region"
                );
                return Ok(reader);
            }
            Err(FrameError::Shm(err)) if err.is_not_ready() && attempt < attempts => {
                debug!(region = name, attempt, error = %err, "region not ready yet");
            }
            Err(err) => return Err(err.into()),
        }

        if let Some(status) = producer.exit_status() {
            return Err(ControlError::ProducerExited { status });
        }
        attempt += 1;
        std::thread::sleep(retry.interval);
    }
}
