//! Frame sinks
//!
//! The worker hands every captured [`AudioFrame`] to a [`FrameSink`].
//! Sinks own their failure handling; the worker never blocks on a slow or
//! broken consumer.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use hound::{WavSpec, WavWriter};

use super::device::AudioError;
use super::frame::AudioFrame;

/// Consumer of captured frames (network send loop, file writer, test
/// collector). Called from the worker thread only, but shared handles may
/// be held elsewhere, hence `Send + Sync`.
pub trait FrameSink: Send + Sync {
    /// Accept one frame. Must not block; drop and account instead.
    fn accept(&self, frame: AudioFrame);
}

/// Receiving end of [`frame_channel`].
pub type FrameReceiver = Receiver<AudioFrame>;

/// Create a bounded frame channel: the sink half goes to the controller,
/// the receiver half to the consumer (e.g. the network send loop).
pub fn frame_channel(capacity: usize) -> (ChannelSink, FrameReceiver) {
    let (tx, rx) = bounded(capacity);
    (
        ChannelSink {
            tx,
            dropped: AtomicU64::new(0),
        },
        rx,
    )
}

/// Channel-backed sink. When the consumer lags and the queue fills, frames
/// are dropped and counted; the capture worker never blocks and the queue
/// never grows unboundedly.
pub struct ChannelSink {
    tx: Sender<AudioFrame>,
    dropped: AtomicU64,
}

impl ChannelSink {
    /// Number of frames dropped because the consumer was not keeping up.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl FrameSink for ChannelSink {
    fn accept(&self, frame: AudioFrame) {
        match self.tx.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(frame)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                log::debug!(
                    "Frame sink: consumer lagging, dropping frame seq={} ({} dropped so far)",
                    frame.sequence,
                    dropped
                );
            }
            Err(TrySendError::Disconnected(frame)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                log::debug!(
                    "Frame sink: receiver gone, dropping frame seq={}",
                    frame.sequence
                );
            }
        }
    }
}

/// Diagnostic sink that writes every frame to a WAV file.
///
/// The writer is discarded on the first write failure; later frames are
/// silently dropped rather than logged per-frame.
pub struct WavFileSink {
    writer: Mutex<Option<WavWriter<BufWriter<File>>>>,
    path: PathBuf,
}

impl WavFileSink {
    /// Create a sink writing 16-bit PCM at the given format.
    pub fn create(path: PathBuf, sample_rate: u32, channels: u16) -> Result<Self, AudioError> {
        let spec = WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let writer = WavWriter::create(&path, spec)
            .map_err(|e| AudioError::FileCreationFailed(e.to_string()))?;

        log::info!("WAV sink: writing to {:?}", path);
        Ok(Self {
            writer: Mutex::new(Some(writer)),
            path,
        })
    }

    /// Finalize the WAV header and return the path to the finished file.
    pub fn finalize(self) -> Result<PathBuf, AudioError> {
        let mut guard = self.writer.lock().unwrap();
        if let Some(writer) = guard.take() {
            writer
                .finalize()
                .map_err(|e| AudioError::WriteFailed(e.to_string()))?;
        }
        drop(guard);
        Ok(self.path.clone())
    }
}

impl FrameSink for WavFileSink {
    fn accept(&self, frame: AudioFrame) {
        let mut guard = self.writer.lock().unwrap();
        let Some(writer) = guard.as_mut() else {
            return;
        };
        for &sample in &frame.samples {
            if let Err(e) = writer.write_sample(sample) {
                log::error!("WAV sink: write failed, discarding writer: {}", e);
                *guard = None;
                return;
            }
        }
    }
}

impl Drop for WavFileSink {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.lock().unwrap().take() {
            if let Err(e) = writer.finalize() {
                log::warn!("WAV sink: finalize on drop failed: {}", e);
            }
        }
    }
}
