//! Public device handle
//!
//! [`Device`] owns the playback thread and exposes the control surface:
//! start, pause, stop, destroy. Start and stop come in blocking flavors
//! that rendezvous with the playback thread, plus fire-and-forget
//! `_async` variants. Pause is always asynchronous; it takes effect
//! within one wait quantum of the transfer loop.

use crate::config::DeviceConfig;
use crate::driver::{CpalDriver, OutputDriver, StreamParams};
use crate::error::{Error, Result};
use crate::playback::{command_channel, worker, Command, CommandSender, Rendezvous};
use crate::source::AudioSource;
use crate::state::{DeviceState, SharedDeviceState};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{info, warn};

/// Handle to an open audio output device.
///
/// Dropping a `Device` shuts the playback thread down; call
/// [`destroy`](Device::destroy) to do it explicitly and observe errors.
pub struct Device {
    state: SharedDeviceState,
    rendezvous: Arc<Rendezvous>,
    commands: CommandSender,
    params: StreamParams,
    thread: Option<JoinHandle<()>>,
}

impl Device {
    /// Open a device with a caller-supplied driver.
    ///
    /// The factory runs on the playback thread, which then owns the driver
    /// for its whole life. `open` blocks until negotiation finishes and
    /// returns its error if the device cannot be configured.
    pub fn open<D, F>(
        config: DeviceConfig,
        driver_factory: F,
        source: Box<dyn AudioSource>,
    ) -> Result<Self>
    where
        D: OutputDriver,
        F: FnOnce() -> Result<D> + Send + 'static,
    {
        let (commands, command_rx) = command_channel();
        let state = SharedDeviceState::new();
        let rendezvous = Arc::new(Rendezvous::new());
        let (params_tx, params_rx) = mpsc::sync_channel(1);

        let thread_state = state.clone();
        let thread_rendezvous = Arc::clone(&rendezvous);
        let thread = thread::Builder::new()
            .name("playback".to_string())
            .spawn(move || {
                worker::playback_thread_main(
                    driver_factory,
                    config,
                    source,
                    command_rx,
                    thread_state,
                    thread_rendezvous,
                    params_tx,
                )
            })
            .map_err(|e| Error::Internal(format!("Failed to spawn playback thread: {}", e)))?;

        let params = match params_rx.recv() {
            Ok(Ok(params)) => params,
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(Error::Internal(
                    "Playback thread exited before negotiation".to_string(),
                ));
            }
        };

        info!(
            "Device open: {} Hz, {} channels, period {} frames",
            params.sample_rate, params.channels, params.period_frames
        );

        Ok(Self {
            state,
            rendezvous,
            commands,
            params,
            thread: Some(thread),
        })
    }

    /// Open the system's default output path (or the device named in the
    /// configuration) through the platform driver.
    pub fn open_default(config: DeviceConfig, source: Box<dyn AudioSource>) -> Result<Self> {
        let device_name = config.device_name.clone();
        Self::open(
            config,
            move || CpalDriver::new(device_name.as_deref()).map_err(Error::Driver),
            source,
        )
    }

    /// The stream parameters in effect, as negotiated with the hardware.
    pub fn params(&self) -> &StreamParams {
        &self.params
    }

    /// Current device state.
    pub fn state(&self) -> DeviceState {
        self.state.get()
    }

    /// Start playback (or resume from pause) and wait until the playback
    /// thread confirms the device is running.
    ///
    /// The counter snapshot precedes the command: a source that runs dry
    /// within one period can take the device through started and back to
    /// stopped before this thread reaches the wait, and the snapshot lets
    /// the wait recognize that completed round trip.
    pub fn start(&self) -> Result<()> {
        let observed = self.rendezvous.starts();
        self.start_async()?;
        self.rendezvous.wait_for_start(observed);
        Ok(())
    }

    /// Start playback without waiting for confirmation.
    ///
    /// # Errors
    /// [`Error::InvalidState`] if the device is already started.
    pub fn start_async(&self) -> Result<()> {
        let current = self.state.get();
        if current == DeviceState::Started {
            return Err(Error::InvalidState("Device already started".to_string()));
        }
        self.commands.send(Command::Start)?;
        if current == DeviceState::Paused {
            // Resume: converge with the playback thread's own write, unless
            // the session ended in the meantime
            self.state.set_if(DeviceState::Paused, DeviceState::Started);
        }
        Ok(())
    }

    /// Pause playback.
    ///
    /// Returns as soon as the command is queued; the transfer loop picks it
    /// up within one wait quantum. The reported state flips to `Paused`
    /// immediately so back-to-back control calls see a consistent view.
    ///
    /// # Errors
    /// [`Error::InvalidState`] unless the device is started.
    pub fn pause(&self) -> Result<()> {
        let current = self.state.get();
        if current != DeviceState::Started {
            return Err(Error::InvalidState(format!(
                "Cannot pause from state {}",
                current
            )));
        }
        self.commands.send(Command::Pause)?;
        // The playback thread writes the same value when it pauses; if the
        // session already ended, its Stopped write stands
        self.state.set_if(DeviceState::Started, DeviceState::Paused);
        Ok(())
    }

    /// Stop playback, dropping buffered audio, and wait until the playback
    /// thread confirms the device is stopped.
    pub fn stop(&self) -> Result<()> {
        let observed = self.rendezvous.stops();
        self.stop_async()?;
        self.rendezvous.wait_for_stop(observed);
        Ok(())
    }

    /// Stop playback without waiting for confirmation.
    ///
    /// # Errors
    /// [`Error::InvalidState`] if the device is already stopped.
    pub fn stop_async(&self) -> Result<()> {
        if self.state.get() == DeviceState::Stopped {
            return Err(Error::InvalidState("Device already stopped".to_string()));
        }
        self.commands.send(Command::Stop)
    }

    /// Tear the device down: stop playback if needed, terminate the
    /// playback thread, and join it.
    pub fn destroy(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        if self.thread.is_none() {
            return Ok(());
        }

        if self.state.get() != DeviceState::Stopped {
            let _ = self.commands.send(Command::Stop);
        }

        if let Err(e) = self.commands.send(Command::Destroy) {
            // The thread is stuck or gone; joining could hang forever
            warn!("Could not deliver shutdown command, detaching playback thread");
            self.thread.take();
            return Err(e);
        }

        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                return Err(Error::Internal(
                    "Playback thread panicked during shutdown".to_string(),
                ));
            }
        }

        Ok(())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        if self.thread.is_some() {
            if let Err(e) = self.shutdown() {
                warn!("Device shutdown during drop failed: {}", e);
            }
        }
    }
}
