//! Playback thread and its control protocol
//!
//! The playback thread owns the output driver exclusively; the rest of the
//! crate talks to it through a bounded command channel and observes it
//! through the shared device state and the start/stop rendezvous.

pub mod command;
pub mod pause;
pub mod recovery;
pub mod rendezvous;
pub mod session;
pub mod worker;

pub use command::{command_channel, Command, CommandReceiver, CommandSender};
pub use rendezvous::Rendezvous;
pub use session::{SessionOutcome, TransferSession};

use crate::state::{DeviceState, SharedDeviceState};

/// Record a device state transition and wake rendezvous waiters.
///
/// The state write and the rendezvous flag must move together so a blocked
/// `start` or `stop` never observes a half-applied transition.
pub(crate) fn save_device_state(
    state: &SharedDeviceState,
    rendezvous: &Rendezvous,
    new_state: DeviceState,
) {
    state.set(new_state);
    rendezvous.transition(new_state == DeviceState::Stopped);
}
