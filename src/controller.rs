//! Voice capture controller
//!
//! Serializes start/stop intent from arbitrary caller threads into a single
//! active-or-inactive capture session owned by one dedicated worker thread.
//! Callers only flip atomic flags and never block; the worker polls the
//! flags, owns the device session, and forwards captured frames to the sink.
//!
//! The queued flags are edge-triggered: set by any caller, cleared only by
//! the worker after acting on them. `recording` is written exclusively by
//! the worker. When both a start and a stop are pending in the same poll
//! cycle, the stop wins, so a racing pair can never leak an open device.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use uuid::Uuid;

use crate::audio::device::{AudioError, CaptureDevice, CaptureSession};
use crate::audio::frame::{unix_millis, AudioFrame};
use crate::audio::sink::FrameSink;
use crate::metrics::MetricsCollector;
use crate::settings::CaptureSettings;

/// Cross-thread signaling flags.
#[derive(Default)]
struct ControllerState {
    queued_start: AtomicBool,
    queued_stop: AtomicBool,
    recording: AtomicBool,
}

/// State shared between the controller handle and its worker thread.
#[derive(Default)]
struct Shared {
    state: ControllerState,
    /// Cooperative termination signal, distinct from `queued_stop`: it ends
    /// the worker thread itself, not just the current session.
    stop_token: AtomicBool,
}

/// Owns the worker thread and the signaling state.
///
/// One instance per capture pipeline; the process-wide surface in the crate
/// root holds exactly one. Dropping the controller signals the stop token
/// and joins the worker, so no session handle outlives its owning thread.
pub struct VoiceCaptureController {
    shared: Arc<Shared>,
    metrics: Arc<Mutex<MetricsCollector>>,
    worker: Option<JoinHandle<()>>,
}

impl VoiceCaptureController {
    /// Spawn the worker thread.
    ///
    /// Thread-spawn failure is the subsystem's only fatal error; everything
    /// after construction degrades to logged, recoverable failures.
    pub fn spawn(
        device: Arc<dyn CaptureDevice>,
        sink: Arc<dyn FrameSink>,
        settings: CaptureSettings,
    ) -> Result<Self, AudioError> {
        let shared = Arc::new(Shared::default());
        let metrics = Arc::new(Mutex::new(MetricsCollector::new()));

        let worker_shared = Arc::clone(&shared);
        let worker_metrics = Arc::clone(&metrics);
        let worker = thread::Builder::new()
            .name("voice-capture".to_string())
            .spawn(move || worker_loop(worker_shared, device, sink, settings, worker_metrics))
            .map_err(|e| AudioError::WorkerSpawnFailed(e.to_string()))?;

        Ok(Self {
            shared,
            metrics,
            worker: Some(worker),
        })
    }

    /// Queue a start request.
    ///
    /// Safe from any thread, any number of times; a start while a session is
    /// already active is a no-op. Does not open the device itself.
    pub fn start_recording(&self) {
        self.shared
            .state
            .queued_start
            .store(true, Ordering::Release);
    }

    /// Queue a stop request. Wins over a simultaneously queued start.
    pub fn stop_recording(&self) {
        self.shared.state.queued_stop.store(true, Ordering::Release);
    }

    /// Whether the worker currently has an open capture session.
    ///
    /// Eventually consistent: briefly stale (up to one poll cycle) around
    /// start/stop transitions.
    pub fn is_recording(&self) -> bool {
        self.shared.state.recording.load(Ordering::Acquire)
    }

    /// Shared metrics handle: session history and the error records that
    /// serve as the worker's notification channel.
    pub fn metrics(&self) -> Arc<Mutex<MetricsCollector>> {
        Arc::clone(&self.metrics)
    }

    /// Signal the stop token and join the worker. Any open session is
    /// closed before the thread exits.
    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        self.shared.stop_token.store(true, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("Voice capture worker panicked during shutdown");
            }
        }
    }
}

impl Drop for VoiceCaptureController {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

/// Worker-local handle to the open session plus its frame bookkeeping.
struct ActiveSession {
    session: Box<dyn CaptureSession>,
    id: Uuid,
    sequence: u64,
    sample_rate: u32,
    channels: u16,
}

fn worker_loop(
    shared: Arc<Shared>,
    device: Arc<dyn CaptureDevice>,
    sink: Arc<dyn FrameSink>,
    settings: CaptureSettings,
    metrics: Arc<Mutex<MetricsCollector>>,
) {
    let poll_interval = Duration::from_millis(settings.poll_interval_ms.max(1));
    let frame_timeout = Duration::from_millis(settings.frame_timeout_ms.max(1));
    let state = &shared.state;
    let mut active: Option<ActiveSession> = None;

    log::info!("Voice capture worker started");

    loop {
        // Termination is the only terminal transition and is checked every
        // iteration, so shutdown latency is bounded by one iteration plus
        // the frame-pull timeout.
        if shared.stop_token.load(Ordering::Acquire) {
            if let Some(act) = active.take() {
                close_session(act, &metrics);
                state.recording.store(false, Ordering::Release);
            }
            break;
        }

        if state.queued_stop.swap(false, Ordering::AcqRel) {
            // Stop wins over a simultaneously queued start.
            state.queued_start.store(false, Ordering::Release);
            if let Some(act) = active.take() {
                close_session(act, &metrics);
                state.recording.store(false, Ordering::Release);
            }
            continue;
        }

        // Always swap the flag to false: a start observed while a session is
        // already open collapses to a no-op instead of wedging the flag.
        if state.queued_start.swap(false, Ordering::AcqRel) && active.is_none() {
            match device.open() {
                Ok(session) => {
                    let id = Uuid::new_v4();
                    log::info!(
                        "Capture session {} opened ({} Hz, {} ch)",
                        id,
                        session.sample_rate(),
                        session.channels()
                    );
                    if let Ok(mut m) = metrics.lock() {
                        m.session_started(id);
                    }
                    active = Some(ActiveSession {
                        sample_rate: session.sample_rate(),
                        channels: session.channels(),
                        session,
                        id,
                        sequence: 0,
                    });
                    state.recording.store(true, Ordering::Release);
                }
                Err(e) => {
                    // Not retried; a fresh start request is required.
                    log::warn!("Failed to open capture session: {}", e);
                    if let Ok(mut m) = metrics.lock() {
                        m.open_failed(e.to_string());
                    }
                }
            }
            // Re-check the stop token and the stop flag before pulling the
            // first frame.
            continue;
        }

        let mut stream_failed: Option<AudioError> = None;
        match active.as_mut() {
            Some(act) => match act.session.pull_frame(frame_timeout) {
                Ok(Some(samples)) => {
                    let frame = AudioFrame {
                        session: act.id,
                        sequence: act.sequence,
                        captured_at_ms: unix_millis(),
                        sample_rate: act.sample_rate,
                        channels: act.channels,
                        samples,
                    };
                    act.sequence += 1;
                    if let Ok(mut m) = metrics.lock() {
                        m.frame_forwarded(frame.samples.len());
                    }
                    sink.accept(frame);
                }
                Ok(None) => {}
                Err(e) => {
                    log::warn!("Capture session {} stream error: {}", act.id, e);
                    stream_failed = Some(e);
                }
            },
            None => thread::sleep(poll_interval),
        }

        if let Some(e) = stream_failed {
            // Implicit stop: back to idle, worker stays alive.
            if let Ok(mut m) = metrics.lock() {
                m.session_failed(e.to_string());
            }
            active = None;
            state.recording.store(false, Ordering::Release);
        }
    }

    log::info!("Voice capture worker stopped");
}

fn close_session(act: ActiveSession, metrics: &Arc<Mutex<MetricsCollector>>) {
    log::info!(
        "Capture session {} closed after {} frames",
        act.id,
        act.sequence
    );
    if let Ok(mut m) = metrics.lock() {
        m.session_closed();
    }
    // Dropping the session releases the device.
    drop(act);
}
