//! Device state management
//!
//! The device state is a mutex-guarded cell readable from any thread.
//! Steady-state transitions are driven by the playback thread; controller
//! calls additionally write the target state for quick visibility, and the
//! two converge (the playback thread's write is authoritative).

use std::fmt;
use std::sync::{Arc, Mutex};

/// Playback device state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    /// Not playing. Initial state, and the resting state between sessions.
    Stopped,
    /// Playback suspended by a pause command. Only reachable from Started.
    Paused,
    /// Actively writing frames to the device.
    Started,
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceState::Stopped => write!(f, "stopped"),
            DeviceState::Paused => write!(f, "paused"),
            DeviceState::Started => write!(f, "started"),
        }
    }
}

/// Shared device state cell
///
/// Guarded by its own mutex, independent from the start/stop rendezvous, so
/// a state read never contends with a blocked `start` or `stop` call.
#[derive(Debug, Clone)]
pub struct SharedDeviceState {
    inner: Arc<Mutex<DeviceState>>,
}

impl SharedDeviceState {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(DeviceState::Stopped)),
        }
    }

    /// Read the current state.
    pub fn get(&self) -> DeviceState {
        *self.inner.lock().expect("device state mutex poisoned")
    }

    /// Write the state.
    pub fn set(&self, state: DeviceState) {
        *self.inner.lock().expect("device state mutex poisoned") = state;
    }

    /// Write the state only if it still reads `expected`.
    ///
    /// Used for the caller-side convergent updates: if the playback thread
    /// moved on in the meantime (for example the source ran dry), its write
    /// wins and the caller's is skipped. Returns whether the write happened.
    pub fn set_if(&self, expected: DeviceState, state: DeviceState) -> bool {
        let mut guard = self.inner.lock().expect("device state mutex poisoned");
        if *guard == expected {
            *guard = state;
            true
        } else {
            false
        }
    }
}

impl Default for SharedDeviceState {
    fn default() -> Self {
        Self::new()
    }
}
