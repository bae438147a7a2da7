//! The transfer session: one start-to-stop run of the blocking write loop
//!
//! A session alternates between waiting for the device to accept another
//! period and writing one period pulled from the source. The wait is
//! bounded by a short quantum so pending control commands are dispatched
//! between device polls; a command therefore takes effect within one
//! quantum even while the device has no space.
//!
//! The `needs_wait` flag tracks whether the next iteration must wait
//! before writing. It is false at session start and after fault recovery
//! (the device buffer is empty, so a write cannot block) and true after
//! any successful write while the device is running.

use crate::driver::{DriverState, OutputDriver, StreamParams, WaitStatus};
use crate::error::{Error, Result};
use crate::playback::command::{Command, CommandReceiver};
use crate::playback::pause::{pause_stream, resume_stream};
use crate::playback::recovery::recover;
use crate::playback::rendezvous::Rendezvous;
use crate::playback::save_device_state;
use crate::source::AudioSource;
use crate::state::{DeviceState, SharedDeviceState};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Upper bound on one device wait before commands are re-polled
const WAIT_QUANTUM: Duration = Duration::from_millis(10);

/// How a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// A Stop command arrived; buffered audio should be dropped
    Stopped,
    /// A Destroy command arrived mid-session; the thread must exit
    Destroyed,
    /// The source ran dry; buffered audio should be drained
    EndOfStream,
}

/// Result of one wait/dispatch pass
enum LoopControl {
    /// The device accepted the wait; proceed to write
    Ready,
    /// A Stop command ended the session
    Stop,
    /// A Destroy command ended the session
    Destroy,
}

/// One run of the transfer loop, borrowing the playback thread's resources.
pub struct TransferSession<'a> {
    driver: &'a mut dyn OutputDriver,
    source: &'a mut dyn AudioSource,
    commands: &'a CommandReceiver,
    state: &'a SharedDeviceState,
    rendezvous: &'a Rendezvous,
    params: StreamParams,
    scratch: Vec<i16>,
    needs_wait: bool,
}

impl<'a> TransferSession<'a> {
    pub fn new(
        driver: &'a mut dyn OutputDriver,
        source: &'a mut dyn AudioSource,
        commands: &'a CommandReceiver,
        state: &'a SharedDeviceState,
        rendezvous: &'a Rendezvous,
        params: StreamParams,
    ) -> Self {
        let scratch = vec![0i16; params.period_samples()];
        Self {
            driver,
            source,
            commands,
            state,
            rendezvous,
            params,
            scratch,
            needs_wait: false,
        }
    }

    /// Run the transfer loop until a terminating command or end of stream.
    pub fn run(&mut self) -> Result<SessionOutcome> {
        loop {
            if self.needs_wait {
                match self.wait_and_dispatch()? {
                    LoopControl::Ready => {}
                    LoopControl::Stop => return Ok(SessionOutcome::Stopped),
                    LoopControl::Destroy => return Ok(SessionOutcome::Destroyed),
                }
            }

            let pulled = self.source.pull(&mut self.scratch);
            // A trailing partial frame can never be written; drop it
            let samples = pulled - pulled % self.params.channels as usize;
            if samples == 0 {
                debug!("Source exhausted");
                return Ok(SessionOutcome::EndOfStream);
            }

            if let Some(outcome) = self.write_period(samples)? {
                return Ok(outcome);
            }
        }
    }

    /// Write one period, looping over partial writes.
    ///
    /// Returns `Some` when a terminating command arrived during an
    /// intra-period wait. On a recoverable fault the remainder of the
    /// period is dropped; the gap is inaudible next to the fault itself.
    fn write_period(&mut self, samples: usize) -> Result<Option<SessionOutcome>> {
        let channels = self.params.channels as usize;
        let mut offset = 0;

        while offset < samples {
            match self.driver.write(&self.scratch[offset..samples]) {
                Ok(frames) => {
                    if self.driver.state() == DriverState::Running {
                        self.needs_wait = true;
                    }
                    offset += frames * channels;
                    if offset < samples {
                        // Device full mid-period; wait for space to open up
                        match self.wait_and_dispatch()? {
                            LoopControl::Ready => {}
                            LoopControl::Stop => return Ok(Some(SessionOutcome::Stopped)),
                            LoopControl::Destroy => {
                                return Ok(Some(SessionOutcome::Destroyed))
                            }
                        }
                    }
                }
                Err(fault) if fault.is_recoverable() => {
                    warn!("Write fault: {}", fault);
                    recover(&mut *self.driver, &fault)?;
                    self.needs_wait = false;
                    break;
                }
                Err(fault) => return Err(Error::Driver(fault)),
            }
        }

        Ok(None)
    }

    /// Dispatch pending commands, then wait one quantum for writability.
    ///
    /// Loops until the device is writable or a terminating command
    /// arrives. Faults surfaced by the wait are recovered in place.
    fn wait_and_dispatch(&mut self) -> Result<LoopControl> {
        loop {
            while let Some(command) = self.commands.poll()? {
                match command {
                    Command::Stop => return Ok(LoopControl::Stop),
                    Command::Destroy => return Ok(LoopControl::Destroy),
                    Command::Pause => match self.run_paused()? {
                        LoopControl::Ready => {}
                        control => return Ok(control),
                    },
                    Command::Start => debug!("Ignoring Start, session already running"),
                }
            }

            match self.driver.wait_writable(WAIT_QUANTUM) {
                Ok(WaitStatus::Writable) => return Ok(LoopControl::Ready),
                Ok(WaitStatus::TimedOut) => {}
                Err(fault) if fault.is_recoverable() => {
                    warn!("Wait fault: {}", fault);
                    recover(&mut *self.driver, &fault)?;
                    self.needs_wait = false;
                    // Buffer is empty after recovery; write without waiting
                    return Ok(LoopControl::Ready);
                }
                Err(fault) => return Err(Error::Driver(fault)),
            }
        }
    }

    /// Paused sub-loop: only commands are serviced until Start or a
    /// terminating command.
    fn run_paused(&mut self) -> Result<LoopControl> {
        pause_stream(&mut *self.driver, self.params.supports_hardware_pause)
            .map_err(Error::Driver)?;
        save_device_state(self.state, self.rendezvous, DeviceState::Paused);
        info!("Playback paused");

        loop {
            match self.commands.recv()? {
                Command::Start => {
                    // The pause may have degraded to the drop fallback even
                    // on pause-capable hardware
                    let hardware_engaged = self.params.supports_hardware_pause
                        && self.driver.state() == DriverState::Paused;
                    resume_stream(&mut *self.driver, hardware_engaged)
                        .map_err(Error::Driver)?;
                    if !hardware_engaged {
                        // The device was re-prepared; its buffer is empty
                        self.needs_wait = false;
                    }
                    save_device_state(self.state, self.rendezvous, DeviceState::Started);
                    info!("Playback resumed");
                    return Ok(LoopControl::Ready);
                }
                Command::Stop => return Ok(LoopControl::Stop),
                Command::Destroy => return Ok(LoopControl::Destroy),
                Command::Pause => debug!("Ignoring Pause, already paused"),
            }
        }
    }
}
