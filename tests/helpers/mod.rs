//! Shared test fixtures: a scriptable mock driver and a few sources

use framepump::driver::{DriverError, DriverState, OutputDriver, StreamParams, WaitStatus};
use framepump::{AudioSource, Device, DeviceConfig, DeviceState, Error, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// State shared between a [`MockDriver`] living on the playback thread and
/// the test asserting on it.
#[derive(Default)]
pub struct MockShared {
    /// Every driver operation, in call order
    pub ops: Mutex<Vec<String>>,
    /// All samples accepted by `write`
    pub written: Mutex<Vec<i16>>,
    /// Faults returned by upcoming `write` calls, one per call
    pub write_faults: Mutex<VecDeque<DriverError>>,
    /// Faults returned by upcoming `wait_writable` calls, one per call
    pub wait_faults: Mutex<VecDeque<DriverError>>,
    /// How many times `resume` reports Busy before succeeding
    pub resume_busy: Mutex<u32>,
}

impl MockShared {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn ops(&self) -> Vec<String> {
        self.ops.lock().unwrap().clone()
    }

    pub fn written_len(&self) -> usize {
        self.written.lock().unwrap().len()
    }

    fn log(&self, op: impl Into<String>) {
        self.ops.lock().unwrap().push(op.into());
    }
}

/// In-memory driver that accepts everything it is offered unless a fault
/// has been queued. `wait_writable` sleeps briefly so transfer loops do
/// not spin flat out during tests.
pub struct MockDriver {
    shared: Arc<MockShared>,
    state: DriverState,
    supports_hardware_pause: bool,
    paused: bool,
}

impl MockDriver {
    pub fn new(shared: Arc<MockShared>, supports_hardware_pause: bool) -> Self {
        Self {
            shared,
            state: DriverState::Prepared,
            supports_hardware_pause,
            paused: false,
        }
    }

    /// A factory suitable for [`Device::open`].
    pub fn factory(
        shared: Arc<MockShared>,
        supports_hardware_pause: bool,
    ) -> impl FnOnce() -> Result<MockDriver> + Send + 'static {
        move || Ok(MockDriver::new(shared, supports_hardware_pause))
    }

    fn apply_fault(&mut self, fault: &DriverError) {
        self.state = match fault {
            DriverError::Underrun => DriverState::XRun,
            DriverError::Suspended => DriverState::Suspended,
            _ => self.state,
        };
    }
}

impl OutputDriver for MockDriver {
    fn negotiate(&mut self, config: &DeviceConfig) -> std::result::Result<StreamParams, DriverError> {
        self.shared.log("negotiate");
        Ok(StreamParams {
            period_frames: config.requested_period_frames(),
            buffer_frames: config.requested_buffer_frames(),
            channels: config.channels,
            sample_rate: config.sample_rate,
            supports_hardware_pause: self.supports_hardware_pause,
        })
    }

    fn write(&mut self, frames: &[i16]) -> std::result::Result<usize, DriverError> {
        let fault = self.shared.write_faults.lock().unwrap().pop_front();
        if let Some(fault) = fault {
            self.apply_fault(&fault);
            self.shared.log(format!("write_fault:{}", fault));
            return Err(fault);
        }
        if self.paused {
            // A paused device accepts nothing
            return Ok(0);
        }
        self.shared.written.lock().unwrap().extend_from_slice(frames);
        self.state = DriverState::Running;
        Ok(frames.len() / 2)
    }

    fn state(&self) -> DriverState {
        self.state
    }

    fn wait_writable(
        &mut self,
        _timeout: Duration,
    ) -> std::result::Result<WaitStatus, DriverError> {
        let fault = self.shared.wait_faults.lock().unwrap().pop_front();
        if let Some(fault) = fault {
            self.apply_fault(&fault);
            self.shared.log(format!("wait_fault:{}", fault));
            return Err(fault);
        }
        std::thread::sleep(Duration::from_millis(1));
        if self.paused {
            // No space opens up while the device is frozen
            return Ok(WaitStatus::TimedOut);
        }
        Ok(WaitStatus::Writable)
    }

    fn pause(&mut self, enable: bool) -> std::result::Result<(), DriverError> {
        self.shared.log(format!("pause:{}", enable));
        self.paused = enable;
        self.state = if enable {
            DriverState::Paused
        } else {
            DriverState::Running
        };
        Ok(())
    }

    fn resume(&mut self) -> std::result::Result<(), DriverError> {
        let mut busy = self.shared.resume_busy.lock().unwrap();
        if *busy > 0 {
            *busy -= 1;
            self.shared.log("resume:busy");
            return Err(DriverError::Busy);
        }
        self.shared.log("resume");
        self.state = DriverState::Running;
        Ok(())
    }

    fn drop_pending(&mut self) -> std::result::Result<(), DriverError> {
        self.shared.log("drop_pending");
        Ok(())
    }

    fn drain(&mut self) -> std::result::Result<(), DriverError> {
        self.shared.log("drain");
        Ok(())
    }

    fn prepare(&mut self) -> std::result::Result<(), DriverError> {
        self.shared.log("prepare");
        self.paused = false;
        self.state = DriverState::Prepared;
        Ok(())
    }
}

/// Yields silence forever
pub struct InfiniteSource;

impl AudioSource for InfiniteSource {
    fn pull(&mut self, buf: &mut [i16]) -> usize {
        buf.fill(0);
        buf.len()
    }
}

/// Finite source that records when the engine reports end of stream
pub struct NotifyingSource {
    samples: Vec<i16>,
    position: usize,
    ended: Arc<AtomicBool>,
}

impl NotifyingSource {
    pub fn new(samples: Vec<i16>) -> (Self, Arc<AtomicBool>) {
        let ended = Arc::new(AtomicBool::new(false));
        (
            Self {
                samples,
                position: 0,
                ended: Arc::clone(&ended),
            },
            ended,
        )
    }
}

impl AudioSource for NotifyingSource {
    fn pull(&mut self, buf: &mut [i16]) -> usize {
        let available = self.samples.len() - self.position;
        let count = available.min(buf.len());
        buf[..count].copy_from_slice(&self.samples[self.position..self.position + count]);
        self.position += count;
        count
    }

    fn end_of_stream(&mut self) {
        self.ended.store(true, Ordering::SeqCst);
    }
}

/// Small-period configuration so tests cycle quickly
pub fn test_config() -> DeviceConfig {
    DeviceConfig {
        device_name: None,
        sample_rate: 48_000,
        channels: 2,
        // 1 ms periods, 4 ms buffer
        buffer_time_us: 4_000,
        period_time_us: 1_000,
    }
}

/// Install a tracing subscriber once per test binary. Honors `RUST_LOG`;
/// silent by default.
fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Open a device over a fresh mock driver.
pub fn open_mock(
    config: DeviceConfig,
    source: Box<dyn AudioSource>,
    supports_hardware_pause: bool,
) -> (Device, Arc<MockShared>) {
    init_tracing();
    let shared = MockShared::new();
    let device = Device::open(
        config,
        MockDriver::factory(Arc::clone(&shared), supports_hardware_pause),
        source,
    )
    .expect("mock device should open");
    (device, shared)
}

/// Poll until the device reaches `target` or the timeout expires.
pub fn wait_for_state(device: &Device, target: DeviceState, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    while device.state() != target {
        assert!(
            Instant::now() < deadline,
            "device did not reach {} within {:?} (currently {})",
            target,
            timeout,
            device.state()
        );
        std::thread::sleep(Duration::from_millis(2));
    }
}

/// Poll until `predicate` holds or the timeout expires.
pub fn wait_until(predicate: impl Fn() -> bool, timeout: Duration, what: &str) {
    let deadline = Instant::now() + timeout;
    while !predicate() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        std::thread::sleep(Duration::from_millis(2));
    }
}

/// A factory whose driver never materializes, for open-failure paths.
pub fn failing_factory() -> impl FnOnce() -> Result<MockDriver> + Send + 'static {
    || Err(Error::Driver(DriverError::Failed("no such device".into())))
}
