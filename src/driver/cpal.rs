//! Audio output driver using cpal
//!
//! Implements [`OutputDriver`] on top of a cpal output stream fed from a
//! lock-free ring buffer. The playback thread pushes interleaved frames into
//! the ring; the cpal callback drains it. Write readiness means the ring has
//! room for another period.
//!
//! Underrun is detected in the callback (ring empty while the stream is
//! running); suspend is flagged by the stream error callback and recovered
//! by rebuilding the stream.

use crate::config::DeviceConfig;
use crate::driver::{DriverError, DriverState, OutputDriver, StreamParams, WaitStatus};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use ringbuf::{traits::*, HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// State shared between the playback thread and the cpal audio callback
struct StreamShared {
    /// Read end of the sample ring. Locked by the audio callback with
    /// `try_lock` so the audio thread never blocks; contended callbacks
    /// output silence for that cycle.
    consumer: Mutex<Option<HeapCons<i16>>>,

    /// Pairs with `space` to signal the producer after the callback drains
    /// the ring
    space_mutex: Mutex<()>,
    space: Condvar,

    /// Set once frames are flowing; cleared by prepare/drop
    running: AtomicBool,

    /// Ring emptied while running
    underrun: AtomicBool,

    /// Stream error reported by cpal; cleared by resume
    suspended: AtomicBool,

    /// Hardware pause engaged
    paused: AtomicBool,
}

impl StreamShared {
    fn new() -> Self {
        Self {
            consumer: Mutex::new(None),
            space_mutex: Mutex::new(()),
            space: Condvar::new(),
            running: AtomicBool::new(false),
            underrun: AtomicBool::new(false),
            suspended: AtomicBool::new(false),
            paused: AtomicBool::new(false),
        }
    }
}

/// cpal-backed output driver
pub struct CpalDriver {
    device: Device,
    config: StreamConfig,
    sample_format: SampleFormat,
    stream: Option<Stream>,
    shared: Arc<StreamShared>,
    /// Write end of the sample ring, created at negotiation
    producer: Option<HeapProd<i16>>,
    params: Option<StreamParams>,
}

impl CpalDriver {
    /// Open an output device.
    ///
    /// If the requested device is not found, falls back to the system
    /// default device rather than failing.
    pub fn new(device_name: Option<&str>) -> Result<Self, DriverError> {
        let host = cpal::default_host();

        let device = if let Some(name) = device_name {
            let mut devices = host
                .output_devices()
                .map_err(|e| DriverError::Failed(format!("Failed to enumerate devices: {}", e)))?;

            match devices.find(|d| d.name().ok().as_deref() == Some(name)) {
                Some(dev) => {
                    info!("Found requested audio device: {}", name);
                    dev
                }
                None => {
                    warn!("Requested device '{}' not found, falling back to default", name);
                    host.default_output_device().ok_or_else(|| {
                        DriverError::Failed(format!(
                            "Device '{}' not found and no default device available",
                            name
                        ))
                    })?
                }
            }
        } else {
            host.default_output_device()
                .ok_or_else(|| DriverError::Failed("No default output device found".to_string()))?
        };

        debug!(
            "Opened audio device: {}",
            device.name().unwrap_or_else(|_| "Unknown".to_string())
        );

        Ok(Self {
            device,
            config: StreamConfig {
                channels: 2,
                sample_rate: cpal::SampleRate(48_000),
                buffer_size: cpal::BufferSize::Default,
            },
            sample_format: SampleFormat::I16,
            stream: None,
            shared: Arc::new(StreamShared::new()),
            producer: None,
            params: None,
        })
    }

    /// Pick the closest supported stream configuration.
    ///
    /// Prefers the requested rate and channel count with i16 samples, then
    /// f32, then whatever the device reports as its default.
    fn select_config(
        device: &Device,
        config: &DeviceConfig,
    ) -> Result<(StreamConfig, SampleFormat), DriverError> {
        let ranges: Vec<_> = device
            .supported_output_configs()
            .map_err(|e| DriverError::Failed(format!("Failed to get device configs: {}", e)))?
            .collect();

        for format in [SampleFormat::I16, SampleFormat::F32] {
            let matched = ranges.iter().find(|r| {
                r.channels() == config.channels
                    && r.min_sample_rate().0 <= config.sample_rate
                    && r.max_sample_rate().0 >= config.sample_rate
                    && r.sample_format() == format
            });
            if let Some(range) = matched {
                let stream_config = range
                    .clone()
                    .with_sample_rate(cpal::SampleRate(config.sample_rate))
                    .config();
                return Ok((stream_config, format));
            }
        }

        // Fallback: device default
        let default = device
            .default_output_config()
            .map_err(|e| DriverError::Failed(format!("Failed to get default config: {}", e)))?;
        let format = default.sample_format();
        if format != SampleFormat::I16 && format != SampleFormat::F32 {
            return Err(DriverError::Failed(format!(
                "Unsupported sample format: {:?}",
                format
            )));
        }
        Ok((default.config(), format))
    }

    fn build_stream(&mut self) -> Result<(), DriverError> {
        let stream = match self.sample_format {
            SampleFormat::I16 => self.build_stream_i16()?,
            SampleFormat::F32 => self.build_stream_f32()?,
            other => {
                return Err(DriverError::Failed(format!(
                    "Unsupported sample format: {:?}",
                    other
                )));
            }
        };

        stream
            .play()
            .map_err(|e| DriverError::Failed(format!("Failed to start stream: {}", e)))?;
        self.stream = Some(stream);
        Ok(())
    }

    fn build_stream_i16(&self) -> Result<Stream, DriverError> {
        let shared = Arc::clone(&self.shared);
        let err_shared = Arc::clone(&self.shared);

        self.device
            .build_output_stream(
                &self.config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    let popped = if let Ok(mut guard) = shared.consumer.try_lock() {
                        match guard.as_mut() {
                            Some(cons) => cons.pop_slice(data),
                            None => 0,
                        }
                    } else {
                        0
                    };
                    Self::finish_cycle(&shared, data.len(), popped);
                    data[popped..].fill(0);
                },
                move |err| Self::on_stream_error(&err_shared, err),
                None,
            )
            .map_err(|e| DriverError::Failed(format!("Failed to build stream: {}", e)))
    }

    fn build_stream_f32(&self) -> Result<Stream, DriverError> {
        let shared = Arc::clone(&self.shared);
        let err_shared = Arc::clone(&self.shared);

        self.device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut staging = [0i16; 512];
                    let mut written = 0usize;
                    if let Ok(mut guard) = shared.consumer.try_lock() {
                        if let Some(cons) = guard.as_mut() {
                            while written < data.len() {
                                let want = staging.len().min(data.len() - written);
                                let got = cons.pop_slice(&mut staging[..want]);
                                for (dst, src) in
                                    data[written..written + got].iter_mut().zip(&staging[..got])
                                {
                                    *dst = *src as f32 / 32_768.0;
                                }
                                written += got;
                                if got < want {
                                    break;
                                }
                            }
                        }
                    }
                    Self::finish_cycle(&shared, data.len(), written);
                    data[written..].fill(0.0);
                },
                move |err| Self::on_stream_error(&err_shared, err),
                None,
            )
            .map_err(|e| DriverError::Failed(format!("Failed to build stream: {}", e)))
    }

    /// Common callback epilogue: underrun detection and space signalling
    fn finish_cycle(shared: &StreamShared, wanted: usize, got: usize) {
        if got < wanted
            && shared.running.load(Ordering::Acquire)
            && !shared.paused.load(Ordering::Acquire)
        {
            shared.underrun.store(true, Ordering::Release);
        }
        if got > 0 {
            let _guard = shared.space_mutex.lock().expect("space mutex poisoned");
            shared.space.notify_all();
        }
    }

    fn on_stream_error(shared: &StreamShared, err: cpal::StreamError) {
        error!("Audio stream error: {} - marking device suspended", err);
        shared.suspended.store(true, Ordering::Release);
        let _guard = shared.space_mutex.lock().expect("space mutex poisoned");
        shared.space.notify_all();
    }

    fn producer(&mut self) -> Result<&mut HeapProd<i16>, DriverError> {
        self.producer
            .as_mut()
            .ok_or_else(|| DriverError::Failed("Stream parameters not negotiated".to_string()))
    }

    fn fault_flags(&self) -> Result<(), DriverError> {
        if self.shared.suspended.load(Ordering::Acquire) {
            return Err(DriverError::Suspended);
        }
        if self.shared.underrun.load(Ordering::Acquire) {
            return Err(DriverError::Underrun);
        }
        Ok(())
    }

    fn period_duration(&self) -> Duration {
        match &self.params {
            Some(p) => Duration::from_micros(
                p.period_frames as u64 * 1_000_000 / p.sample_rate.max(1) as u64,
            ),
            None => Duration::from_millis(10),
        }
    }
}

impl OutputDriver for CpalDriver {
    fn negotiate(&mut self, config: &DeviceConfig) -> Result<StreamParams, DriverError> {
        let (stream_config, sample_format) = Self::select_config(&self.device, config)?;
        self.config = stream_config;
        self.sample_format = sample_format;

        let sample_rate = self.config.sample_rate.0;
        let channels = self.config.channels;
        let period_frames =
            ((sample_rate as u64 * config.period_time_us as u64) / 1_000_000).max(1) as usize;
        let buffer_frames = (((sample_rate as u64 * config.buffer_time_us as u64) / 1_000_000)
            as usize)
            .max(period_frames * 2);

        debug!(
            "Negotiated stream: rate={}, channels={}, format={:?}, period={} frames, buffer={} frames",
            sample_rate, channels, sample_format, period_frames, buffer_frames
        );

        let ring = HeapRb::<i16>::new(buffer_frames * channels as usize);
        let (producer, consumer) = ring.split();
        self.producer = Some(producer);
        *self.shared.consumer.lock().expect("consumer mutex poisoned") = Some(consumer);

        self.build_stream()?;

        let params = StreamParams {
            period_frames,
            buffer_frames,
            channels,
            sample_rate,
            // Advisory: hosts generally pause streams natively, and a
            // pause that still fails at runtime degrades to the drop
            // fallback at the call site
            supports_hardware_pause: true,
        };
        self.params = Some(params.clone());
        Ok(params)
    }

    fn write(&mut self, frames: &[i16]) -> Result<usize, DriverError> {
        self.fault_flags()?;
        let channels = self.config.channels as usize;
        let producer = self.producer()?;
        let pushed = producer.push_slice(frames);
        let accepted = pushed / channels;
        if accepted > 0 {
            self.shared.running.store(true, Ordering::Release);
        }
        Ok(accepted)
    }

    fn state(&self) -> DriverState {
        if self.shared.suspended.load(Ordering::Acquire) {
            DriverState::Suspended
        } else if self.shared.underrun.load(Ordering::Acquire) {
            DriverState::XRun
        } else if self.shared.paused.load(Ordering::Acquire) {
            DriverState::Paused
        } else if self.shared.running.load(Ordering::Acquire) {
            DriverState::Running
        } else {
            DriverState::Prepared
        }
    }

    fn wait_writable(&mut self, timeout: Duration) -> Result<WaitStatus, DriverError> {
        let needed = self
            .params
            .as_ref()
            .map(|p| p.period_samples())
            .unwrap_or(1);
        let deadline = Instant::now() + timeout;

        loop {
            self.fault_flags()?;
            if self.producer()?.vacant_len() >= needed {
                return Ok(WaitStatus::Writable);
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(WaitStatus::TimedOut);
            }
            let guard = self
                .shared
                .space_mutex
                .lock()
                .expect("space mutex poisoned");
            let (_guard, _timed_out) = self
                .shared
                .space
                .wait_timeout(guard, deadline - now)
                .expect("space condvar poisoned");
        }
    }

    fn pause(&mut self, enable: bool) -> Result<(), DriverError> {
        let stream = self
            .stream
            .as_ref()
            .ok_or_else(|| DriverError::Failed("No active stream".to_string()))?;
        if enable {
            stream
                .pause()
                .map_err(|e| DriverError::Failed(format!("Failed to pause stream: {}", e)))?;
        } else {
            stream
                .play()
                .map_err(|e| DriverError::Failed(format!("Failed to resume stream: {}", e)))?;
        }
        self.shared.paused.store(enable, Ordering::Release);
        Ok(())
    }

    fn resume(&mut self) -> Result<(), DriverError> {
        // Recovery from suspension rebuilds the stream on the same device
        info!("Rebuilding audio stream after suspension");
        self.stream = None;
        self.build_stream()?;
        self.shared.suspended.store(false, Ordering::Release);
        self.shared.paused.store(false, Ordering::Release);
        Ok(())
    }

    fn drop_pending(&mut self) -> Result<(), DriverError> {
        let discarded = match self
            .shared
            .consumer
            .lock()
            .expect("consumer mutex poisoned")
            .as_mut()
        {
            Some(cons) => cons.clear(),
            None => 0,
        };
        if discarded > 0 {
            debug!("Dropped {} buffered samples", discarded);
        }
        self.shared.running.store(false, Ordering::Release);
        Ok(())
    }

    fn drain(&mut self) -> Result<(), DriverError> {
        if self.shared.paused.load(Ordering::Acquire) {
            // A paused stream never drains; discard instead
            return self.drop_pending();
        }

        let deadline = Instant::now() + Duration::from_secs(4);
        loop {
            let occupied = self.producer()?.occupied_len();
            if occupied == 0 {
                break;
            }
            if Instant::now() >= deadline {
                warn!("Drain timed out with {} samples buffered", occupied);
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        // Allow the final period to leave the device FIFO
        std::thread::sleep(self.period_duration());
        self.shared.running.store(false, Ordering::Release);
        // An empty ring at end of stream is expected, not an underrun
        self.shared.underrun.store(false, Ordering::Release);
        Ok(())
    }

    fn prepare(&mut self) -> Result<(), DriverError> {
        self.shared.underrun.store(false, Ordering::Release);
        self.shared.running.store(false, Ordering::Release);
        if self.shared.paused.load(Ordering::Acquire) {
            // A stop while hardware-paused lands here; the stream must run
            // again or the callback never drains the next session's ring
            if let Some(stream) = &self.stream {
                stream
                    .play()
                    .map_err(|e| DriverError::Failed(format!("Failed to unpause stream: {}", e)))?;
            }
            self.shared.paused.store(false, Ordering::Release);
        }
        if self.stream.is_none() {
            self.build_stream()?;
        }
        Ok(())
    }
}
