//! Metrics collection for capture sessions
//!
//! Tracks session timing, forwarded frame counts, and error history.
//! Together with the log output this is the crate's notification channel:
//! worker-side failures never cross the thread boundary as errors, they land
//! here and in the log.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Maximum number of completed sessions to retain in history
const MAX_SESSION_HISTORY: usize = 50;

/// Maximum number of errors to retain in history
const MAX_ERROR_HISTORY: usize = 20;

/// Metrics for a completed capture session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetrics {
    /// Unique identifier for this session
    pub session_id: String,
    /// Unix timestamp when the session opened (seconds)
    pub started_at: u64,
    /// Session duration in milliseconds
    pub duration_ms: u64,
    /// Frames forwarded to the sink
    pub frames_forwarded: u64,
    /// Samples forwarded to the sink
    pub samples_forwarded: u64,
    /// Whether the session closed cleanly (stop request or shutdown)
    pub success: bool,
    /// Error message if the session ended on a stream failure
    pub error_message: Option<String>,
}

/// Summary statistics across all recorded sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSummary {
    /// Total number of sessions opened
    pub total_sessions: u64,
    /// Number of sessions that closed cleanly
    pub successful_sessions: u64,
    /// Number of sessions that ended on a failure
    pub failed_sessions: u64,
    /// Average session duration (ms) across clean sessions
    pub avg_duration_ms: u64,
    /// Average frames forwarded across clean sessions
    pub avg_frames_forwarded: u64,
    /// Most recent error, if any
    pub last_error: Option<ErrorRecord>,
}

/// Record of an error that occurred during operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Unix timestamp when error occurred (seconds)
    pub timestamp: u64,
    /// Category of error (e.g., "device_open", "stream")
    pub error_type: String,
    /// Human-readable error message
    pub message: String,
    /// Associated session ID, if applicable
    pub session_id: Option<String>,
}

/// Internal state for the currently open session
struct SessionInProgress {
    session_id: Uuid,
    started_at: Instant,
    started_at_unix: u64,
    frames_forwarded: u64,
    samples_forwarded: u64,
}

impl SessionInProgress {
    fn new(session_id: Uuid) -> Self {
        Self {
            session_id,
            started_at: Instant::now(),
            started_at_unix: unix_secs(),
            frames_forwarded: 0,
            samples_forwarded: 0,
        }
    }

    fn to_metrics(&self, success: bool, error_message: Option<String>) -> SessionMetrics {
        SessionMetrics {
            session_id: self.session_id.to_string(),
            started_at: self.started_at_unix,
            duration_ms: self.started_at.elapsed().as_millis() as u64,
            frames_forwarded: self.frames_forwarded,
            samples_forwarded: self.samples_forwarded,
            success,
            error_message,
        }
    }
}

fn unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Collects and stores metrics for capture sessions.
///
/// Mutated only from the worker thread (behind the controller's mutex);
/// readers take snapshots via the accessor methods.
pub struct MetricsCollector {
    /// History of completed sessions (newest first)
    history: VecDeque<SessionMetrics>,
    /// History of errors (newest first)
    errors: VecDeque<ErrorRecord>,
    /// Currently open session, if any
    current_session: Option<SessionInProgress>,
    /// Total sessions ever opened
    total_sessions: u64,
    /// Total sessions that closed cleanly
    successful_sessions: u64,
}

impl MetricsCollector {
    /// Create a new empty metrics collector
    pub fn new() -> Self {
        Self {
            history: VecDeque::with_capacity(MAX_SESSION_HISTORY),
            errors: VecDeque::with_capacity(MAX_ERROR_HISTORY),
            current_session: None,
            total_sessions: 0,
            successful_sessions: 0,
        }
    }

    /// Start tracking a freshly opened session.
    ///
    /// If a session is somehow still in progress it is flushed as failed
    /// first (this indicates a worker-loop bug).
    pub fn session_started(&mut self, session_id: Uuid) {
        if let Some(old) = self.current_session.take() {
            log::warn!(
                "Metrics: discarding in-progress session {} to start session {}",
                old.session_id,
                session_id
            );
            let metrics = old.to_metrics(false, Some("Discarded: new session opened".to_string()));
            self.add_to_history(metrics);
        }

        log::debug!("Metrics: session {} opened", session_id);
        self.current_session = Some(SessionInProgress::new(session_id));
        self.total_sessions += 1;
    }

    /// Count one frame forwarded to the sink.
    pub fn frame_forwarded(&mut self, samples: usize) {
        if let Some(ref mut session) = self.current_session {
            session.frames_forwarded += 1;
            session.samples_forwarded += samples as u64;
        }
    }

    /// Close the current session cleanly (stop request or shutdown).
    pub fn session_closed(&mut self) {
        if let Some(session) = self.current_session.take() {
            let metrics = session.to_metrics(true, None);
            log::info!(
                "Metrics: session {} closed - {}ms, {} frames forwarded",
                metrics.session_id,
                metrics.duration_ms,
                metrics.frames_forwarded
            );
            self.add_to_history(metrics);
            self.successful_sessions += 1;
        }
    }

    /// Close the current session because its stream failed.
    pub fn session_failed(&mut self, error: String) {
        let session_id = self
            .current_session
            .as_ref()
            .map(|s| s.session_id.to_string());

        if let Some(session) = self.current_session.take() {
            let metrics = session.to_metrics(false, Some(error.clone()));
            log::warn!(
                "Metrics: session {} failed after {}ms - {}",
                metrics.session_id,
                metrics.duration_ms,
                error
            );
            self.add_to_history(metrics);
        }

        self.record_error("stream".to_string(), error, session_id);
    }

    /// Record a failed device open (no session was created).
    pub fn open_failed(&mut self, error: String) {
        self.record_error("device_open".to_string(), error, None);
    }

    /// Record an error (not necessarily tied to a session)
    pub fn record_error(&mut self, error_type: String, message: String, session_id: Option<String>) {
        let error = ErrorRecord {
            timestamp: unix_secs(),
            error_type,
            message,
            session_id,
        };

        log::debug!("Metrics: recording error - {:?}", error);

        // Add to front (newest first)
        self.errors.push_front(error);

        while self.errors.len() > MAX_ERROR_HISTORY {
            self.errors.pop_back();
        }
    }

    /// Get summary statistics
    pub fn summary(&self) -> MetricsSummary {
        let clean: Vec<_> = self.history.iter().filter(|s| s.success).collect();
        let count = clean.len() as u64;

        let (avg_duration, avg_frames) = if count > 0 {
            let sum_duration: u64 = clean.iter().map(|s| s.duration_ms).sum();
            let sum_frames: u64 = clean.iter().map(|s| s.frames_forwarded).sum();
            (sum_duration / count, sum_frames / count)
        } else {
            (0, 0)
        };

        MetricsSummary {
            total_sessions: self.total_sessions,
            successful_sessions: self.successful_sessions,
            failed_sessions: self.total_sessions.saturating_sub(self.successful_sessions),
            avg_duration_ms: avg_duration,
            avg_frames_forwarded: avg_frames,
            last_error: self.errors.front().cloned(),
        }
    }

    /// Get the session history (newest first)
    pub fn history(&self) -> Vec<SessionMetrics> {
        self.history.iter().cloned().collect()
    }

    /// Get the error history (newest first)
    pub fn errors(&self) -> Vec<ErrorRecord> {
        self.errors.iter().cloned().collect()
    }

    fn add_to_history(&mut self, metrics: SessionMetrics) {
        // Add to front (newest first)
        self.history.push_front(metrics);

        while self.history.len() > MAX_SESSION_HISTORY {
            self.history.pop_back();
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
