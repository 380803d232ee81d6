//! Capture device seam
//!
//! The controller only ever talks to the microphone through these traits,
//! so tests can substitute a scripted device and the worker loop stays
//! independent of CPAL details.

use std::time::Duration;

/// Errors that can occur while opening or running a capture session.
#[derive(Debug, Clone)]
pub enum AudioError {
    NoInputDevice,
    NoSupportedConfig,
    StreamCreationFailed(String),
    StreamError(String),
    FileCreationFailed(String),
    WriteFailed(String),
    WorkerSpawnFailed(String),
}

impl std::fmt::Display for AudioError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioError::NoInputDevice => write!(f, "No audio input device found"),
            AudioError::NoSupportedConfig => write!(f, "No supported audio configuration"),
            AudioError::StreamCreationFailed(e) => {
                write!(f, "Failed to create audio stream: {}", e)
            }
            AudioError::StreamError(e) => write!(f, "Audio stream error: {}", e),
            AudioError::FileCreationFailed(e) => write!(f, "Failed to create audio file: {}", e),
            AudioError::WriteFailed(e) => write!(f, "Failed to write audio data: {}", e),
            AudioError::WorkerSpawnFailed(e) => {
                write!(f, "Failed to spawn capture worker thread: {}", e)
            }
        }
    }
}

impl std::error::Error for AudioError {}

/// Factory for capture sessions. The sole source of truth for hardware
/// availability: every `open` re-resolves the device, so a microphone that
/// appears after an earlier failure can still be picked up.
///
/// Shared with the worker thread, hence `Send + Sync`.
pub trait CaptureDevice: Send + Sync {
    /// Open an active capture session, or report why the device is
    /// unavailable.
    fn open(&self) -> Result<Box<dyn CaptureSession>, AudioError>;
}

/// An open, active capture session.
///
/// Owned exclusively by the worker thread for its entire lifetime; it is
/// created and dropped on that thread and never crosses a thread boundary,
/// so the trait does not require `Send` (the CPAL stream is not). Closing
/// the session is dropping it.
pub trait CaptureSession {
    /// Sample rate of the frames this session produces.
    fn sample_rate(&self) -> u32;

    /// Interleaved channel count of the frames this session produces.
    fn channels(&self) -> u16;

    /// Pull the next chunk of captured samples, waiting at most `timeout`.
    ///
    /// Returns `Ok(None)` when nothing arrived within the bounded wait and
    /// `Err` when the underlying stream has failed; a failed session must
    /// keep returning `Err` until dropped.
    fn pull_frame(&mut self, timeout: Duration) -> Result<Option<Vec<i16>>, AudioError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_is_human_readable() {
        let e = AudioError::StreamCreationFailed("backend says no".to_string());
        assert!(e.to_string().contains("backend says no"));
        assert_eq!(AudioError::NoInputDevice.to_string(), "No audio input device found");
    }
}
