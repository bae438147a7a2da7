//! Output driver abstraction
//!
//! [`OutputDriver`] is the seam between the playback engine and the platform
//! audio API. The engine performs all driver calls from the playback thread;
//! drivers are therefore constructed on that thread (see
//! [`Device::open`](crate::Device::open)) and never need to be `Send`.
//!
//! The contract mirrors a classic blocking PCM interface: negotiate stream
//! parameters once, then write interleaved frames, waiting for the device to
//! report space for another period between writes. Transient faults
//! (underrun, suspend) are reported as distinct error classes so the engine
//! can recover in place.

pub mod cpal;

pub use self::cpal::CpalDriver;

use crate::config::DeviceConfig;
use std::time::Duration;
use thiserror::Error;

/// Error classes reported by an output driver.
///
/// `Underrun` and `Suspended` are transient and recoverable; everything else
/// ends the playback session.
#[derive(Error, Debug)]
pub enum DriverError {
    /// Device buffer emptied before new data arrived
    #[error("buffer underrun")]
    Underrun,

    /// Device temporarily unavailable (e.g. power management)
    #[error("device suspended")]
    Suspended,

    /// Operation cannot complete yet; retry after a short delay.
    /// Returned by `resume` while the device is still waking up.
    #[error("device busy, try again")]
    Busy,

    /// Anything else; not recoverable
    #[error("{0}")]
    Failed(String),
}

/// Coarse device state as reported by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    /// Armed and ready, not yet running
    Prepared,
    /// Actively consuming frames
    Running,
    /// Underrun occurred; needs re-preparation
    XRun,
    /// Suspended by the system; needs resume
    Suspended,
    /// Paused via the hardware pause primitive
    Paused,
}

/// Outcome of a bounded wait for write readiness
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    /// The device can accept more frames
    Writable,
    /// The timeout elapsed first
    TimedOut,
}

/// Negotiated stream parameters, fixed for the lifetime of the device
#[derive(Debug, Clone)]
pub struct StreamParams {
    /// Frames per transfer period
    pub period_frames: usize,

    /// Total device buffer length in frames
    pub buffer_frames: usize,

    /// Channel count
    pub channels: u16,

    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Whether the device supports a native pause primitive.
    ///
    /// When false, pausing falls back to dropping buffered audio and
    /// re-preparing the device, losing up to one buffer of audio.
    pub supports_hardware_pause: bool,
}

impl StreamParams {
    /// Samples per period (frames times channels)
    pub fn period_samples(&self) -> usize {
        self.period_frames * self.channels as usize
    }
}

/// Connection to an audio output device.
///
/// All methods are called from the playback thread only.
pub trait OutputDriver {
    /// Negotiate stream parameters with the device.
    ///
    /// Called exactly once, before any other operation. The driver adjusts
    /// the requested configuration to what the hardware supports and returns
    /// the values actually in effect.
    fn negotiate(&mut self, config: &DeviceConfig) -> Result<StreamParams, DriverError>;

    /// Write interleaved frames to the device.
    ///
    /// # Returns
    /// Frames accepted, which may be fewer than offered when the device
    /// buffer is nearly full. Zero is valid and means "no space right now".
    fn write(&mut self, frames: &[i16]) -> Result<usize, DriverError>;

    /// Query the coarse device state.
    fn state(&self) -> DriverState;

    /// Block until the device can accept another period, a fault is
    /// detected, or `timeout` elapses.
    fn wait_writable(&mut self, timeout: Duration) -> Result<WaitStatus, DriverError>;

    /// Engage (`true`) or release (`false`) the hardware pause primitive.
    ///
    /// Only called when negotiation reported `supports_hardware_pause`.
    fn pause(&mut self, enable: bool) -> Result<(), DriverError>;

    /// Attempt to resume a suspended device.
    ///
    /// Returns [`DriverError::Busy`] while the device is still waking up;
    /// the caller retries after a bounded sleep.
    fn resume(&mut self) -> Result<(), DriverError>;

    /// Discard buffered audio immediately.
    ///
    /// A no-op on a device with nothing buffered.
    fn drop_pending(&mut self) -> Result<(), DriverError>;

    /// Play out all buffered audio before stopping.
    fn drain(&mut self) -> Result<(), DriverError>;

    /// Re-arm the device so it is ready for a future start.
    ///
    /// Also releases an engaged hardware pause: a stopped device must be
    /// able to play as soon as the next session writes to it.
    fn prepare(&mut self) -> Result<(), DriverError>;
}

impl DriverError {
    /// Whether fault recovery should be attempted for this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, DriverError::Underrun | DriverError::Suspended)
    }
}
