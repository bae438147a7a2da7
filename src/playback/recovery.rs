//! Fault recovery for transient device errors
//!
//! Underrun: re-prepare the device for a fresh start. Suspend: retry resume
//! with a bounded sleep between attempts, then re-prepare if the device
//! still needs it. Failure of the recovery step itself, or any other error
//! class, is unrecoverable and ends the session.

use crate::driver::{DriverError, OutputDriver};
use crate::error::{Error, Result};
use std::time::Duration;
use tracing::{debug, error, warn};

/// Sleep between resume attempts while the device reports busy
const RESUME_RETRY_DELAY: Duration = Duration::from_millis(200);

/// Upper bound on resume attempts (about five seconds of retrying)
const MAX_RESUME_ATTEMPTS: u32 = 25;

/// Attempt in-place recovery from a transient fault.
///
/// # Returns
/// `Ok(())` when the device has been brought back to a writable state.
/// Errors are already promoted: any `Err` is unrecoverable.
pub fn recover(driver: &mut dyn OutputDriver, fault: &DriverError) -> Result<()> {
    match fault {
        DriverError::Underrun => {
            debug!("Underrun occurred, re-preparing device");
            driver.prepare().map_err(|e| {
                error!("Cannot recover from underrun, prepare failed: {}", e);
                Error::Driver(e)
            })
        }
        DriverError::Suspended => recover_from_suspend(driver),
        other => Err(Error::Internal(format!(
            "No recovery path for driver fault: {}",
            other
        ))),
    }
}

fn recover_from_suspend(driver: &mut dyn OutputDriver) -> Result<()> {
    debug!("Device suspended, attempting resume");

    let mut attempts = 0;
    loop {
        match driver.resume() {
            Ok(()) => return Ok(()),
            Err(DriverError::Busy) => {
                attempts += 1;
                if attempts >= MAX_RESUME_ATTEMPTS {
                    error!("Device still busy after {} resume attempts", attempts);
                    return Err(Error::Driver(DriverError::Suspended));
                }
                std::thread::sleep(RESUME_RETRY_DELAY);
            }
            Err(resume_err) => {
                // Resume not possible; a fresh prepare may still bring the
                // device back
                warn!("Resume failed ({}), trying prepare", resume_err);
                return driver.prepare().map_err(|e| {
                    error!("Cannot recover from suspend, prepare failed: {}", e);
                    Error::Driver(e)
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceConfig;
    use crate::driver::{DriverState, StreamParams, WaitStatus};
    use std::result::Result;

    /// Minimal scripted driver for recovery paths
    struct FakeDriver {
        prepare_results: Vec<Result<(), DriverError>>,
        resume_results: Vec<Result<(), DriverError>>,
        prepares: usize,
        resumes: usize,
    }

    impl FakeDriver {
        fn new() -> Self {
            Self {
                prepare_results: Vec::new(),
                resume_results: Vec::new(),
                prepares: 0,
                resumes: 0,
            }
        }
    }

    impl OutputDriver for FakeDriver {
        fn negotiate(&mut self, _: &DeviceConfig) -> Result<StreamParams, DriverError> {
            unreachable!()
        }
        fn write(&mut self, _: &[i16]) -> Result<usize, DriverError> {
            unreachable!()
        }
        fn state(&self) -> DriverState {
            DriverState::Prepared
        }
        fn wait_writable(&mut self, _: Duration) -> Result<WaitStatus, DriverError> {
            unreachable!()
        }
        fn pause(&mut self, _: bool) -> Result<(), DriverError> {
            unreachable!()
        }
        fn resume(&mut self) -> Result<(), DriverError> {
            self.resumes += 1;
            if self.resume_results.is_empty() {
                Ok(())
            } else {
                self.resume_results.remove(0)
            }
        }
        fn drop_pending(&mut self) -> Result<(), DriverError> {
            Ok(())
        }
        fn drain(&mut self) -> Result<(), DriverError> {
            Ok(())
        }
        fn prepare(&mut self) -> Result<(), DriverError> {
            self.prepares += 1;
            if self.prepare_results.is_empty() {
                Ok(())
            } else {
                self.prepare_results.remove(0)
            }
        }
    }

    #[test]
    fn test_underrun_recovers_via_prepare() {
        let mut driver = FakeDriver::new();
        assert!(recover(&mut driver, &DriverError::Underrun).is_ok());
        assert_eq!(driver.prepares, 1);
    }

    #[test]
    fn test_underrun_prepare_failure_is_unrecoverable() {
        let mut driver = FakeDriver::new();
        driver
            .prepare_results
            .push(Err(DriverError::Failed("dead".into())));
        assert!(recover(&mut driver, &DriverError::Underrun).is_err());
    }

    #[test]
    fn test_suspend_retries_while_busy() {
        let mut driver = FakeDriver::new();
        driver.resume_results.push(Err(DriverError::Busy));
        driver.resume_results.push(Err(DriverError::Busy));
        driver.resume_results.push(Ok(()));
        assert!(recover(&mut driver, &DriverError::Suspended).is_ok());
        assert_eq!(driver.resumes, 3);
    }

    #[test]
    fn test_suspend_falls_back_to_prepare() {
        let mut driver = FakeDriver::new();
        driver
            .resume_results
            .push(Err(DriverError::Failed("no resume".into())));
        assert!(recover(&mut driver, &DriverError::Suspended).is_ok());
        assert_eq!(driver.prepares, 1);
    }

    #[test]
    fn test_other_faults_are_not_recovered() {
        let mut driver = FakeDriver::new();
        let result = recover(&mut driver, &DriverError::Failed("io".into()));
        assert!(result.is_err());
        assert_eq!(driver.prepares, 0);
        assert_eq!(driver.resumes, 0);
    }
}
