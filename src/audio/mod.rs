//! Audio capture module
//!
//! This module holds the capture-device seam, the CPAL microphone
//! implementation, the frame payload, and the sinks frames are forwarded to.

pub mod device;
pub mod frame;
mod paths;
pub mod recorder;
pub mod sink;

pub use device::{AudioError, CaptureDevice, CaptureSession};
pub use frame::AudioFrame;
pub use paths::{cleanup_old_recordings, create_temp_audio_dir, generate_wav_path};
pub use recorder::MicrophoneDevice;
pub use sink::{frame_channel, ChannelSink, FrameReceiver, FrameSink, WavFileSink};
