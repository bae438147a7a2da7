//! Device configuration
//!
//! Requested stream parameters handed to the output driver at negotiation
//! time. The driver is free to adjust them to what the hardware supports;
//! the negotiated result comes back as [`StreamParams`](crate::driver::StreamParams).

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default sample rate in Hz
pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;

/// Default channel count (stereo)
pub const DEFAULT_CHANNELS: u16 = 2;

/// Default device ring buffer length in microseconds (one second)
pub const DEFAULT_BUFFER_TIME_US: u32 = 1_000_000;

/// Default period length in microseconds. 200 ms keeps latency low at the
/// cost of more frequent wakeups.
pub const DEFAULT_PERIOD_TIME_US: u32 = 200_000;

/// Output device configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Output device name (None = system default device)
    pub device_name: Option<String>,

    /// Requested sample rate in Hz
    pub sample_rate: u32,

    /// Requested channel count
    pub channels: u16,

    /// Requested device buffer length in microseconds
    pub buffer_time_us: u32,

    /// Requested period length in microseconds. The period is the block of
    /// frames transferred per wake cycle and determines wake-up granularity.
    pub period_time_us: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            device_name: None,
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS,
            buffer_time_us: DEFAULT_BUFFER_TIME_US,
            period_time_us: DEFAULT_PERIOD_TIME_US,
        }
    }
}

impl DeviceConfig {
    /// Load configuration from a TOML file.
    ///
    /// Missing fields fall back to defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;

        toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
    }

    /// Requested period size in frames at the requested sample rate.
    ///
    /// The driver may negotiate a different value; use the
    /// `StreamParams` returned from negotiation for the authoritative size.
    pub fn requested_period_frames(&self) -> usize {
        ((self.sample_rate as u64 * self.period_time_us as u64) / 1_000_000) as usize
    }

    /// Requested device buffer size in frames at the requested sample rate.
    pub fn requested_buffer_frames(&self) -> usize {
        ((self.sample_rate as u64 * self.buffer_time_us as u64) / 1_000_000) as usize
    }
}
