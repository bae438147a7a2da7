//! Pause/resume strategy
//!
//! Two paths, selected by the capability flag cached at negotiation:
//!
//! - Hardware pause: the device freezes and resumes sample-accurately with
//!   no data loss.
//! - Fallback: buffered audio is dropped and the device re-prepared. Loses
//!   up to one buffer of audio and leaves an audible gap; resuming is a
//!   no-op because the next transfer iteration re-arms the device.
//!
//! The capability flag is advisory: some backends report pause support but
//! still fail the call at runtime, so a failed hardware pause degrades to
//! the fallback rather than ending the session. Resumption therefore keys
//! on whether the hardware pause actually engaged (the driver reports
//! `Paused`), not on the flag alone.
//!
//! There is deliberately no busy-wait emulation of pause on unsupported
//! hardware: holding the transfer loop without feeding the device starves
//! it and triggers underrun storms.

use crate::driver::{DriverError, OutputDriver};
use tracing::{debug, warn};

/// Pause the stream using the capability-appropriate path.
pub fn pause_stream(
    driver: &mut dyn OutputDriver,
    supports_hardware_pause: bool,
) -> Result<(), DriverError> {
    if supports_hardware_pause {
        match driver.pause(true) {
            Ok(()) => {
                debug!("Paused via hardware pause primitive");
                return Ok(());
            }
            Err(e) => {
                warn!("Hardware pause failed ({}), dropping buffered audio instead", e);
            }
        }
    } else {
        debug!("Device lacks hardware pause, dropping buffered audio");
    }
    driver.drop_pending()?;
    driver.prepare()
}

/// Undo a previous [`pause_stream`].
///
/// `hardware_pause_engaged` reflects what actually happened at pause time,
/// checked against the driver's reported state.
pub fn resume_stream(
    driver: &mut dyn OutputDriver,
    hardware_pause_engaged: bool,
) -> Result<(), DriverError> {
    if hardware_pause_engaged {
        debug!("Resuming via hardware pause primitive");
        driver.pause(false)
    } else {
        // Nothing to undo; the transfer loop re-arms the device on its next
        // write.
        Ok(())
    }
}
