//! Synthetic tone capture backend.
//!
//! Produces a continuous sine tone in the configured format, paced in
//! real time. Stands in for a platform loopback backend on hosts where
//! none is available, and is the backend the integration tests run against.

use std::f32::consts::TAU;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::backend::{AudioSink, CaptureBackend};
use crate::error::CaptureError;
use crate::format::{AudioFormat, CaptureConfig, EndpointInfo, SampleEncoding};
use crate::{CaptureResult, BUFFER_INTERVAL_MS};

/// Frequency of the generated tone in Hz.
const TONE_FREQUENCY: f32 = 440.0;

/// Amplitude of the generated tone (full scale = 1.0).
const TONE_AMPLITUDE: f32 = 0.2;

/// The synthetic endpoint id this backend exposes.
const TONE_ENDPOINT_ID: &str = "tone";

/// Synthetic sine-tone capture backend.
pub struct ToneCapture {
    capture_thread: Option<JoinHandle<()>>,
    should_stop: Arc<AtomicBool>,
}

impl ToneCapture {
    /// Create an idle tone backend.
    pub fn new() -> Self {
        Self {
            capture_thread: None,
            should_stop: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Default for ToneCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureBackend for ToneCapture {
    fn start(&mut self, config: &CaptureConfig, sink: AudioSink) -> CaptureResult<AudioFormat> {
        if self.capture_thread.is_some() {
            return Err(CaptureError::AlreadyStarted);
        }

        if let Some(ref id) = config.endpoint_id {
            if id != TONE_ENDPOINT_ID {
                return Err(CaptureError::EndpointNotFound(id.clone()));
            }
        }
        if config.channels == 0 || config.sample_rate == 0 {
            return Err(CaptureError::FormatNotSupported(format!(
                "channels={} sample_rate={}",
                config.channels, config.sample_rate
            )));
        }

        let format = AudioFormat {
            encoding: config.encoding,
            channels: config.channels,
            sample_rate: config.sample_rate,
        };

        info!(?format, "Starting tone capture");

        let should_stop = Arc::clone(&self.should_stop);
        should_stop.store(false, Ordering::SeqCst);

        // Confirm the worker reached its loop before reporting success.
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<()>(1);

        let handle = thread::spawn(move || {
            let _ = ready_tx.send(());
            capture_thread(format, sink, should_stop);
        });

        if ready_rx.recv_timeout(Duration::from_secs(1)).is_err() {
            warn!("Tone capture worker did not start");
            self.should_stop.store(true, Ordering::SeqCst);
            let _ = handle.join();
            return Err(CaptureError::Backend("worker failed to start".into()));
        }

        self.capture_thread = Some(handle);
        Ok(format)
    }

    fn stop(&mut self) {
        self.should_stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.capture_thread.take() {
            let _ = handle.join();
            info!("Tone capture stopped");
        }
    }

    fn list_endpoints(&self) -> CaptureResult<Vec<EndpointInfo>> {
        Ok(vec![EndpointInfo {
            id: TONE_ENDPOINT_ID.to_string(),
            name: "Synthetic tone generator".to_string(),
            is_default: true,
        }])
    }

    fn default_endpoint_id(&self) -> CaptureResult<String> {
        Ok(TONE_ENDPOINT_ID.to_string())
    }
}

impl Drop for ToneCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

fn capture_thread(format: AudioFormat, mut sink: AudioSink, should_stop: Arc<AtomicBool>) {
    let frames_per_buffer = (format.sample_rate as u64 * BUFFER_INTERVAL_MS / 1000) as usize;
    let block_align = format.block_align();
    let interval = Duration::from_millis(BUFFER_INTERVAL_MS);

    debug!(
        frames_per_buffer,
        block_align, "Tone capture thread entering loop"
    );

    let mut phase: f32 = 0.0;
    let phase_step = TAU * TONE_FREQUENCY / format.sample_rate as f32;
    let mut next_deadline = Instant::now() + interval;

    while !should_stop.load(Ordering::SeqCst) {
        let mut buf = Vec::with_capacity(frames_per_buffer * block_align as usize);
        for _ in 0..frames_per_buffer {
            let value = TONE_AMPLITUDE * phase.sin();
            phase = (phase + phase_step) % TAU;
            for _ in 0..format.channels {
                write_sample(&mut buf, value, format.encoding);
            }
        }

        sink(Bytes::from(buf), block_align);

        // Pace delivery against wall time so long sink calls don't drift.
        let now = Instant::now();
        if next_deadline > now {
            thread::sleep(next_deadline - now);
        }
        next_deadline += interval;
    }

    debug!("Tone capture thread exiting");
}

fn write_sample(buf: &mut Vec<u8>, value: f32, encoding: SampleEncoding) {
    match encoding {
        SampleEncoding::F32 => buf.extend_from_slice(&value.to_le_bytes()),
        SampleEncoding::U8 => {
            let scaled = ((value + 1.0) * 127.5).clamp(0.0, 255.0);
            buf.push(scaled as u8);
        }
        SampleEncoding::S16 => {
            let scaled = (value * i16::MAX as f32).clamp(i16::MIN as f32, i16::MAX as f32);
            buf.extend_from_slice(&(scaled as i16).to_le_bytes());
        }
        SampleEncoding::S24 => {
            const MAX_24: f32 = 8_388_607.0;
            let scaled = (value * MAX_24).clamp(-MAX_24 - 1.0, MAX_24) as i32;
            buf.extend_from_slice(&scaled.to_le_bytes()[..3]);
        }
        SampleEncoding::S32 => {
            let scaled = (value as f64 * i32::MAX as f64).clamp(i32::MIN as f64, i32::MAX as f64);
            buf.extend_from_slice(&(scaled as i32).to_le_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_start_delivers_aligned_buffers() {
        let received: Arc<Mutex<Vec<(usize, u16)>>> = Arc::new(Mutex::new(Vec::new()));
        let sink_log = Arc::clone(&received);

        let mut backend = ToneCapture::new();
        let config = CaptureConfig {
            encoding: SampleEncoding::S16,
            channels: 2,
            sample_rate: 8000,
            ..Default::default()
        };
        let format = backend
            .start(
                &config,
                Box::new(move |data, block_align| {
                    sink_log.lock().unwrap().push((data.len(), block_align));
                }),
            )
            .unwrap();
        assert_eq!(format.block_align(), 4);

        thread::sleep(Duration::from_millis(60));
        backend.stop();

        let log = received.lock().unwrap();
        assert!(!log.is_empty());
        for (len, block_align) in log.iter() {
            assert_eq!(*block_align, 4);
            assert_eq!(len % 4, 0);
            // 10ms at 8kHz stereo s16.
            assert_eq!(*len, 80 * 4);
        }
    }

    #[test]
    fn test_double_start_rejected() {
        let mut backend = ToneCapture::new();
        backend
            .start(&CaptureConfig::default(), Box::new(|_, _| {}))
            .unwrap();
        let err = backend.start(&CaptureConfig::default(), Box::new(|_, _| {}));
        assert!(matches!(err, Err(CaptureError::AlreadyStarted)));
        backend.stop();
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut backend = ToneCapture::new();
        backend
            .start(&CaptureConfig::default(), Box::new(|_, _| {}))
            .unwrap();
        backend.stop();
        backend.stop();
    }

    #[test]
    fn test_unknown_endpoint_rejected() {
        let mut backend = ToneCapture::new();
        let config = CaptureConfig {
            endpoint_id: Some("mystery".into()),
            ..Default::default()
        };
        let err = backend.start(&config, Box::new(|_, _| {}));
        assert!(matches!(err, Err(CaptureError::EndpointNotFound(_))));
    }

    #[test]
    fn test_endpoint_listing() {
        let backend = ToneCapture::new();
        let endpoints = backend.list_endpoints().unwrap();
        assert_eq!(endpoints.len(), 1);
        assert!(endpoints[0].is_default);
        assert_eq!(backend.default_endpoint_id().unwrap(), endpoints[0].id);
    }
}
