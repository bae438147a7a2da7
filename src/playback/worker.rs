//! Playback thread entry point
//!
//! The thread builds its own driver (audio streams are not generally
//! movable between threads), negotiates stream parameters, reports them
//! back over a one-shot channel, then settles into an idle loop waiting
//! for commands. A Start command hands control to a
//! [`TransferSession`](super::TransferSession) until the session ends.

use crate::config::DeviceConfig;
use crate::driver::{OutputDriver, StreamParams};
use crate::error::{Error, Result};
use crate::playback::command::{Command, CommandReceiver};
use crate::playback::rendezvous::Rendezvous;
use crate::playback::save_device_state;
use crate::playback::session::{SessionOutcome, TransferSession};
use crate::source::AudioSource;
use crate::state::{DeviceState, SharedDeviceState};
use std::sync::mpsc::SyncSender;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Body of the playback thread.
///
/// `factory` runs here so the driver never crosses a thread boundary.
/// Negotiated parameters (or the failure that prevented them) go back to
/// the opener through `params_tx`; after that the thread is on its own and
/// reports only through the shared state.
pub(crate) fn playback_thread_main<D, F>(
    factory: F,
    config: DeviceConfig,
    mut source: Box<dyn AudioSource>,
    commands: CommandReceiver,
    state: SharedDeviceState,
    rendezvous: Arc<Rendezvous>,
    params_tx: SyncSender<Result<StreamParams>>,
) where
    D: OutputDriver,
    F: FnOnce() -> Result<D>,
{
    let mut driver = match factory() {
        Ok(driver) => driver,
        Err(e) => {
            let _ = params_tx.send(Err(e));
            return;
        }
    };

    let params = match driver.negotiate(&config) {
        Ok(params) => params,
        Err(e) => {
            let _ = params_tx.send(Err(Error::Driver(e)));
            return;
        }
    };

    info!(
        "Playback thread ready: {} Hz, {} channels, period {} frames, buffer {} frames",
        params.sample_rate, params.channels, params.period_frames, params.buffer_frames
    );

    if params_tx.send(Ok(params.clone())).is_err() {
        // Opener gave up; nothing to serve
        return;
    }

    loop {
        let command = match commands.recv() {
            Ok(command) => command,
            Err(_) => {
                debug!("Command channel closed, shutting down");
                break;
            }
        };

        match command {
            Command::Start => {
                save_device_state(&state, &rendezvous, DeviceState::Started);
                info!("Transfer session starting");

                let outcome = TransferSession::new(
                    &mut driver,
                    source.as_mut(),
                    &commands,
                    &state,
                    &rendezvous,
                    params.clone(),
                )
                .run();

                match outcome {
                    Ok(SessionOutcome::Stopped) => {
                        if let Err(e) = stop_cleanup(&mut driver) {
                            warn!("Post-stop device cleanup failed: {}", e);
                        }
                        save_device_state(&state, &rendezvous, DeviceState::Stopped);
                        info!("Transfer session stopped");
                    }
                    Ok(SessionOutcome::EndOfStream) => {
                        if let Err(e) = drain_cleanup(&mut driver) {
                            warn!("Post-drain device cleanup failed: {}", e);
                        }
                        save_device_state(&state, &rendezvous, DeviceState::Stopped);
                        source.end_of_stream();
                        info!("Source exhausted, transfer session complete");
                    }
                    Ok(SessionOutcome::Destroyed) => {
                        let _ = driver.drop_pending();
                        save_device_state(&state, &rendezvous, DeviceState::Stopped);
                        debug!("Destroy received mid-session");
                        break;
                    }
                    Err(e) => {
                        error!("Transfer session failed: {}", e);
                        let _ = stop_cleanup(&mut driver);
                        save_device_state(&state, &rendezvous, DeviceState::Stopped);
                    }
                }
            }
            Command::Stop => {
                // Already stopped; re-assert so a racing stop() unblocks
                save_device_state(&state, &rendezvous, DeviceState::Stopped);
                debug!("Ignoring Stop, no session running");
            }
            Command::Pause => {
                // A racing pause() may have written Paused just after the
                // session ended; the stopped state is authoritative
                save_device_state(&state, &rendezvous, DeviceState::Stopped);
                debug!("Ignoring Pause, no session running");
            }
            Command::Destroy => break,
        }
    }

    debug!("Playback thread exiting");
}

/// Drop whatever is still buffered and re-arm for a future start.
fn stop_cleanup(driver: &mut dyn OutputDriver) -> std::result::Result<(), crate::driver::DriverError> {
    driver.drop_pending()?;
    driver.prepare()
}

/// Let buffered audio play out, then re-arm.
fn drain_cleanup(driver: &mut dyn OutputDriver) -> std::result::Result<(), crate::driver::DriverError> {
    driver.drain()?;
    driver.prepare()
}
