//! Control commands for the playback thread
//!
//! A small, closed command alphabet sent over a bounded channel. One pending
//! command is the normal case; the channel is sized for a short burst and a
//! full channel is treated as a caller error rather than a reason to block.

use crate::error::{Error, Result};
use std::sync::mpsc::{self, Receiver, SyncSender, TryRecvError};

/// Channel depth. Commands are consumed promptly, so a handful of slots is
/// plenty; a full channel indicates a stuck playback thread.
const COMMAND_CHANNEL_DEPTH: usize = 8;

/// Commands understood by the playback thread.
///
/// Ordering is FIFO. Commands that do not apply to the receiving sub-loop
/// are ignored with a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Begin a transfer session, or resume a paused one
    Start,
    /// Suspend the transfer loop until Start or Stop
    Pause,
    /// End the transfer session, dropping buffered audio
    Stop,
    /// Terminate the playback thread
    Destroy,
}

/// Controller-side send endpoint
#[derive(Clone)]
pub struct CommandSender {
    tx: SyncSender<Command>,
}

impl CommandSender {
    /// Send one command without blocking.
    ///
    /// # Errors
    /// A full or disconnected channel is surfaced to the caller; device
    /// state is not affected.
    pub fn send(&self, command: Command) -> Result<()> {
        self.tx.try_send(command).map_err(|e| {
            Error::CommandChannel(format!("Failed to send {:?}: {}", command, e))
        })
    }
}

/// Playback-thread-side receive endpoint
pub struct CommandReceiver {
    rx: Receiver<Command>,
}

impl CommandReceiver {
    /// Return the next pending command, if any.
    ///
    /// # Errors
    /// Disconnection (all senders dropped) is an error; the playback thread
    /// treats it as a shutdown request.
    pub fn poll(&self) -> Result<Option<Command>> {
        match self.rx.try_recv() {
            Ok(command) => Ok(Some(command)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(Error::CommandChannel(
                "Command channel disconnected".to_string(),
            )),
        }
    }

    /// Block until a command arrives.
    pub fn recv(&self) -> Result<Command> {
        self.rx
            .recv()
            .map_err(|_| Error::CommandChannel("Command channel disconnected".to_string()))
    }
}

/// Create a connected command channel pair.
pub fn command_channel() -> (CommandSender, CommandReceiver) {
    let (tx, rx) = mpsc::sync_channel(COMMAND_CHANNEL_DEPTH);
    (CommandSender { tx }, CommandReceiver { rx })
}
