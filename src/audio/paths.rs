//! XDG path helpers for the WAV debug sink
//!
//! Capture dumps are stored in: ~/.local/share/voice-capture/temp/audio/

use std::fs;
use std::path::PathBuf;
use uuid::Uuid;

const MAX_RECORDINGS: usize = 5;

/// Get the temp audio directory path.
/// Returns: ~/.local/share/voice-capture/temp/audio/
fn temp_audio_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("voice-capture")
        .join("temp")
        .join("audio")
}

/// Create the temp audio directory if it doesn't exist.
pub fn create_temp_audio_dir() -> std::io::Result<PathBuf> {
    let dir = temp_audio_dir();
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Generate a unique WAV file path for a capture session.
/// Format: <unix-secs>_<session-uuid>.wav
pub fn generate_wav_path(session_id: Uuid) -> std::io::Result<PathBuf> {
    let dir = create_temp_audio_dir()?;
    let timestamp = unix_secs_timestamp();
    let filename = format!("{}_{}.wav", timestamp, session_id);
    Ok(dir.join(filename))
}

/// Seconds since the unix epoch; enough for unique, sortable filenames.
fn unix_secs_timestamp() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    format!("{}", duration.as_secs())
}

/// Clean up old capture dumps, keeping only the most recent N files.
pub fn cleanup_old_recordings() -> std::io::Result<usize> {
    let dir = temp_audio_dir();
    if !dir.exists() {
        return Ok(0);
    }

    let mut entries: Vec<_> = fs::read_dir(&dir)?
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path()
                .extension()
                .map(|ext| ext == "wav")
                .unwrap_or(false)
        })
        .collect();

    if entries.len() <= MAX_RECORDINGS {
        return Ok(0);
    }

    // Sort by modified time (oldest first)
    entries.sort_by(|a, b| {
        let time_a = a.metadata().and_then(|m| m.modified()).ok();
        let time_b = b.metadata().and_then(|m| m.modified()).ok();
        time_a.cmp(&time_b)
    });

    let to_delete = entries.len() - MAX_RECORDINGS;
    let mut deleted = 0;

    for entry in entries.into_iter().take(to_delete) {
        if fs::remove_file(entry.path()).is_ok() {
            log::debug!("Cleaned up old capture dump: {:?}", entry.path());
            deleted += 1;
        }
    }

    Ok(deleted)
}
