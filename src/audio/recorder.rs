//! Microphone capture using CPAL
//!
//! `MicrophoneDevice` is the production [`CaptureDevice`]. Every `open`
//! re-resolves the default input device, so hardware that appears after an
//! earlier failure is picked up on the next start request. Captured chunks
//! are converted to i16 and handed to the session through a bounded channel;
//! the audio callback never blocks.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Sample, SampleFormat, Stream, StreamConfig};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};

use super::device::{AudioError, CaptureDevice, CaptureSession};

const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Factory for microphone capture sessions on the default input device.
pub struct MicrophoneDevice {
    queue_capacity: usize,
}

impl MicrophoneDevice {
    /// Device with the default callback-to-worker queue capacity.
    pub fn new() -> Self {
        Self::with_queue_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    /// Device with an explicit queue capacity (in chunks, not samples).
    pub fn with_queue_capacity(queue_capacity: usize) -> Self {
        Self {
            queue_capacity: queue_capacity.max(1),
        }
    }
}

impl Default for MicrophoneDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureDevice for MicrophoneDevice {
    fn open(&self) -> Result<Box<dyn CaptureSession>, AudioError> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or(AudioError::NoInputDevice)?;

        log::info!("Using audio input device: {:?}", device.name());

        let supported_config = device
            .default_input_config()
            .map_err(|_| AudioError::NoSupportedConfig)?;

        log::info!(
            "Audio config: {} Hz, {} channels, {:?}",
            supported_config.sample_rate().0,
            supported_config.channels(),
            supported_config.sample_format()
        );

        let sample_format = supported_config.sample_format();
        let config: StreamConfig = supported_config.into();

        let (tx, rx) = bounded(self.queue_capacity);
        let failure = Arc::new(Mutex::new(None));
        let shed = Arc::new(AtomicU64::new(0));

        let stream = build_stream(
            &device,
            &config,
            sample_format,
            tx,
            Arc::clone(&failure),
            Arc::clone(&shed),
        )?;

        stream.play().map_err(|e| {
            AudioError::StreamCreationFailed(format!("Failed to start stream: {}", e))
        })?;

        Ok(Box::new(MicrophoneSession {
            _stream: stream,
            rx,
            failure,
            shed,
            sample_rate: config.sample_rate.0,
            channels: config.channels,
        }))
    }
}

/// An open microphone stream. Dropping it stops the stream.
struct MicrophoneSession {
    _stream: Stream,
    rx: Receiver<Vec<i16>>,
    /// First stream-callback error; once set, every pull fails.
    failure: Arc<Mutex<Option<String>>>,
    shed: Arc<AtomicU64>,
    sample_rate: u32,
    channels: u16,
}

impl CaptureSession for MicrophoneSession {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn pull_frame(&mut self, timeout: Duration) -> Result<Option<Vec<i16>>, AudioError> {
        if let Ok(slot) = self.failure.lock() {
            if let Some(reason) = slot.clone() {
                return Err(AudioError::StreamError(reason));
            }
        }

        match self.rx.recv_timeout(timeout) {
            Ok(chunk) => Ok(Some(chunk)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(AudioError::StreamError(
                "audio callback channel closed".to_string(),
            )),
        }
    }
}

impl Drop for MicrophoneSession {
    fn drop(&mut self) {
        let dropped = self.shed.load(Ordering::Relaxed);
        if dropped > 0 {
            log::warn!("Capture session dropped {} chunks in total", dropped);
        }
    }
}

fn build_stream(
    device: &Device,
    config: &StreamConfig,
    sample_format: SampleFormat,
    tx: Sender<Vec<i16>>,
    failure: Arc<Mutex<Option<String>>>,
    shed: Arc<AtomicU64>,
) -> Result<Stream, AudioError> {
    match sample_format {
        SampleFormat::I16 => build_stream_typed::<i16>(device, config, tx, failure, shed),
        SampleFormat::U16 => build_stream_typed::<u16>(device, config, tx, failure, shed),
        SampleFormat::F32 => build_stream_typed::<f32>(device, config, tx, failure, shed),
        _ => Err(AudioError::NoSupportedConfig),
    }
}

fn build_stream_typed<T>(
    device: &Device,
    config: &StreamConfig,
    tx: Sender<Vec<i16>>,
    failure: Arc<Mutex<Option<String>>>,
    shed: Arc<AtomicU64>,
) -> Result<Stream, AudioError>
where
    T: cpal::SizedSample + Send + 'static,
    f32: cpal::FromSample<T>,
{
    let stream = device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let chunk: Vec<i16> = data.iter().map(|&sample| sample_to_i16(sample)).collect();
                match tx.try_send(chunk) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        // The worker is not draining fast enough; dropping
                        // keeps the audio callback non-blocking.
                        let dropped = shed.fetch_add(1, Ordering::Relaxed) + 1;
                        if dropped == 1 || dropped % 100 == 0 {
                            log::warn!("Capture queue full, {} chunks dropped", dropped);
                        }
                    }
                    Err(TrySendError::Disconnected(_)) => {}
                }
            },
            move |err| {
                log::error!("Audio stream error: {}", err);
                if let Ok(mut slot) = failure.lock() {
                    if slot.is_none() {
                        *slot = Some(err.to_string());
                    }
                }
            },
            None,
        )
        .map_err(|e| AudioError::StreamCreationFailed(e.to_string()))?;

    Ok(stream)
}

/// Convert any supported sample type to i16, clamping out-of-range floats.
fn sample_to_i16<T>(sample: T) -> i16
where
    T: cpal::Sample,
    f32: cpal::FromSample<T>,
{
    let f32_sample: f32 = f32::from_sample(sample);
    let clamped = f32_sample.clamp(-1.0, 1.0);
    (clamped * i16::MAX as f32) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_to_i16() {
        assert_eq!(sample_to_i16(0.0f32), 0);
        assert_eq!(sample_to_i16(1.0f32), i16::MAX);
        assert_eq!(sample_to_i16(-1.0f32), -i16::MAX);

        // Out-of-range floats are clamped.
        assert_eq!(sample_to_i16(2.0f32), i16::MAX);
        assert_eq!(sample_to_i16(-2.0f32), -i16::MAX);
    }

    #[test]
    fn test_sample_to_i16_from_integer_formats() {
        assert_eq!(sample_to_i16(0i16), 0);
        // u16 midpoint is silence.
        assert_eq!(sample_to_i16(0x8000u16), 0);
        // Full scale converts through f32 with at most a couple of counts
        // of quantization loss.
        let max = sample_to_i16(i16::MAX);
        assert!(max >= i16::MAX - 2, "near-full-scale expected, got {}", max);
    }
}
