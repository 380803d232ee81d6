//! Captured audio frame payload
//!
//! Frames carry raw i16 PCM plus the metadata a downstream consumer needs
//! to order and align them (session id, sequence number, capture time).
//! The controller never interprets the samples.

use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// One chunk of captured audio handed to the frame sink.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Capture session this frame belongs to.
    pub session: Uuid,
    /// Monotonic per-session sequence number, starting at 0.
    pub sequence: u64,
    /// Wall-clock capture time in milliseconds since the unix epoch.
    pub captured_at_ms: u64,
    /// Sample rate of `samples`.
    pub sample_rate: u32,
    /// Interleaved channel count of `samples`.
    pub channels: u16,
    /// Raw PCM payload.
    pub samples: Vec<i16>,
}

impl AudioFrame {
    /// Duration of this frame in milliseconds, derived from the payload.
    pub fn duration_ms(&self) -> u64 {
        let per_channel = self.samples.len() as u64 / u64::from(self.channels.max(1));
        per_channel * 1000 / u64::from(self.sample_rate.max(1))
    }
}

/// Milliseconds since the unix epoch. Used to stamp frames; uniqueness and
/// monotonicity come from the sequence number, not this value.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(samples: usize, sample_rate: u32, channels: u16) -> AudioFrame {
        AudioFrame {
            session: Uuid::new_v4(),
            sequence: 0,
            captured_at_ms: unix_millis(),
            sample_rate,
            channels,
            samples: vec![0i16; samples],
        }
    }

    #[test]
    fn duration_accounts_for_channel_count() {
        // 480 mono samples at 48kHz = 10ms
        assert_eq!(frame(480, 48_000, 1).duration_ms(), 10);
        // same payload interleaved stereo = 5ms
        assert_eq!(frame(480, 48_000, 2).duration_ms(), 5);
    }

    #[test]
    fn duration_survives_degenerate_metadata() {
        // Zero channels/sample-rate must not divide by zero.
        assert_eq!(frame(480, 0, 0).duration_ms(), 480 * 1000);
    }
}
