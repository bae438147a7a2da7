//! Audio source callbacks
//!
//! The playback thread pulls interleaved samples from an [`AudioSource`] one
//! period at a time. Returning zero samples signals end of stream, which is a
//! normal termination: the device drains whatever is buffered, re-arms, and
//! [`AudioSource::end_of_stream`] is invoked so the caller can decide whether
//! to seek back and start again.

/// Supplier of interleaved audio samples for a playback device.
///
/// Both callbacks run on the playback thread.
///
/// # Re-entrancy
///
/// Implementations must not call back into the [`Device`](crate::Device)
/// that is driving them (for example `stop` from inside `pull`, or `start`
/// from inside `end_of_stream`). The playback thread is busy servicing the
/// callback at that point and cannot acknowledge the command; the call would
/// deadlock or leave the device in an inconsistent state. Signal another
/// thread instead.
pub trait AudioSource: Send {
    /// Fill `buf` with interleaved samples.
    ///
    /// `buf` holds exactly one period (`period_frames * channels` samples).
    ///
    /// # Returns
    /// Number of samples written. May be less than a full period. Returning 0
    /// signals end of stream.
    fn pull(&mut self, buf: &mut [i16]) -> usize;

    /// Called once after end of stream, when buffered audio has finished
    /// playing and the device has been re-armed for a future start.
    fn end_of_stream(&mut self) {}
}

/// Plays a vector of interleaved samples once, then signals end of stream.
pub struct BufferSource {
    samples: Vec<i16>,
    position: usize,
    channels: usize,
}

impl BufferSource {
    /// Create a source over interleaved samples.
    ///
    /// # Arguments
    /// * `samples` - Interleaved sample data
    /// * `channels` - Channel count the samples are interleaved for
    pub fn new(samples: Vec<i16>, channels: u16) -> Self {
        Self {
            samples,
            position: 0,
            channels: channels as usize,
        }
    }

    /// Frames remaining to be pulled.
    pub fn remaining_frames(&self) -> usize {
        (self.samples.len() - self.position) / self.channels
    }
}

impl AudioSource for BufferSource {
    fn pull(&mut self, buf: &mut [i16]) -> usize {
        let available = self.samples.len() - self.position;
        let count = buf.len().min(available);
        buf[..count].copy_from_slice(&self.samples[self.position..self.position + count]);
        self.position += count;
        count
    }
}
