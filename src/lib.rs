//! framepump - low-latency audio output engine
//!
//! A dedicated playback thread pumps interleaved PCM frames from an
//! [`AudioSource`] into an output device through a blocking transfer loop,
//! while callers steer it with start/pause/stop/destroy controls. The loop
//! multiplexes device readiness with control commands, recovers in place
//! from underrun and suspend faults, and keeps a shared state cell plus a
//! start/stop rendezvous so blocking control calls return only once the
//! transition has actually happened.
//!
//! ```no_run
//! use framepump::{BufferSource, Device, DeviceConfig};
//!
//! # fn main() -> framepump::Result<()> {
//! let config = DeviceConfig::default();
//! let samples = vec![0i16; 48_000 * 2];
//! let device = Device::open_default(config, Box::new(BufferSource::new(samples, 2)))?;
//! device.start()?;
//! // ... audio plays ...
//! device.stop()?;
//! device.destroy()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod device;
pub mod driver;
pub mod error;
pub mod playback;
pub mod source;
pub mod state;

pub use config::DeviceConfig;
pub use device::Device;
pub use driver::{CpalDriver, DriverError, DriverState, OutputDriver, StreamParams, WaitStatus};
pub use error::{Error, Result};
pub use source::{AudioSource, BufferSource};
pub use state::DeviceState;
