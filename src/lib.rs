//! Microphone capture worker with a race-free start/stop surface.
//!
//! One dedicated worker thread owns the capture device. Caller threads
//! control it through [`VoiceCaptureController::start_recording`],
//! [`VoiceCaptureController::stop_recording`] and
//! [`VoiceCaptureController::is_recording`]: atomic flag flips, never
//! blocking, safe from any thread. Captured frames are forwarded to a
//! [`FrameSink`] chosen by the host (network send loop, WAV dump, channel).

pub mod audio;
pub mod controller;
pub mod metrics;
pub mod settings;

pub use audio::{
    AudioError, AudioFrame, CaptureDevice, CaptureSession, FrameSink, MicrophoneDevice,
};
pub use controller::VoiceCaptureController;
pub use settings::CaptureSettings;

use once_cell::sync::Lazy;
use std::sync::{Arc, Mutex};

/// The single process-wide controller instance.
///
/// The mutex only guards creation and teardown; the recording control
/// surface itself stays lock-free inside the controller.
static INSTANCE: Lazy<Mutex<Option<VoiceCaptureController>>> = Lazy::new(|| Mutex::new(None));

/// Create the process-wide controller and spawn its worker thread.
///
/// One instance per process: a second call warns and keeps the existing
/// instance. A sink must be supplied (frames need a destination), so there
/// is no implicit lazy construction on first `start_recording`.
pub fn initialize(
    device: Arc<dyn CaptureDevice>,
    sink: Arc<dyn FrameSink>,
    settings: CaptureSettings,
) -> Result<(), AudioError> {
    let mut guard = INSTANCE.lock().unwrap();
    if guard.is_some() {
        log::warn!("Voice capture already initialized; keeping the existing instance");
        return Ok(());
    }
    *guard = Some(VoiceCaptureController::spawn(device, sink, settings)?);
    log::info!("Voice capture initialized");
    Ok(())
}

/// Tear down the process-wide controller.
///
/// Signals the worker's stop token and joins it; an open session is closed
/// before the thread exits. A no-op when not initialized.
pub fn shutdown() {
    let controller = INSTANCE.lock().unwrap().take();
    if let Some(controller) = controller {
        controller.shutdown();
        log::info!("Voice capture shut down");
    }
}

/// Queue a start request on the process-wide controller.
pub fn start_recording() {
    match INSTANCE.lock().unwrap().as_ref() {
        Some(controller) => controller.start_recording(),
        None => log::warn!("start_recording called before initialize; ignoring"),
    }
}

/// Queue a stop request on the process-wide controller.
pub fn stop_recording() {
    match INSTANCE.lock().unwrap().as_ref() {
        Some(controller) => controller.stop_recording(),
        None => log::warn!("stop_recording called before initialize; ignoring"),
    }
}

/// Whether the process-wide controller currently has an open session.
/// Returns false when not initialized.
pub fn is_recording() -> bool {
    INSTANCE
        .lock()
        .unwrap()
        .as_ref()
        .map(|controller| controller.is_recording())
        .unwrap_or(false)
}
