//! Capture tunables
//!
//! Poll interval and frame-pull timeout trade shutdown latency against CPU
//! usage; they are tunables, not contracts. Settings load leniently (missing
//! or corrupt files fall back to defaults with a warning) and save
//! atomically.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const SETTINGS_FILE_NAME: &str = "settings.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// How long the worker sleeps between polls while idle (no open session,
    /// nothing queued).
    pub poll_interval_ms: u64,

    /// Bounded wait for the next chunk while a session is open. Also bounds
    /// shutdown latency: one loop iteration plus this wait.
    pub frame_timeout_ms: u64,

    /// Capacity (in chunks) of the audio-callback-to-worker queue. When the
    /// queue is full the callback drops chunks instead of blocking.
    pub queue_capacity: usize,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 10,
            frame_timeout_ms: 20,
            queue_capacity: 64,
        }
    }
}

/// Default settings location: <config dir>/voice-capture/settings.json
pub fn default_settings_path() -> Result<PathBuf, String> {
    let dir = dirs::config_dir()
        .ok_or_else(|| "Could not determine config directory".to_string())?;
    Ok(dir.join("voice-capture").join(SETTINGS_FILE_NAME))
}

pub fn load_settings(path: &Path) -> CaptureSettings {
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str::<CaptureSettings>(&contents) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("Settings: failed to parse {:?}: {}", path, e);
                CaptureSettings::default()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => CaptureSettings::default(),
        Err(e) => {
            log::warn!("Settings: failed to read {:?}: {}", path, e);
            CaptureSettings::default()
        }
    }
}

pub fn save_settings(path: &Path, settings: &CaptureSettings) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory {:?}: {}", parent, e))?;
    }

    let contents =
        serde_json::to_string_pretty(settings).map_err(|e| format!("Serialize settings: {}", e))?;

    // Write atomically: write to a temp file in the same directory, then rename.
    // This prevents partial/corrupt settings.json if the process dies mid-write.
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, &contents)
        .map_err(|e| format!("Write temp settings {:?}: {}", tmp_path, e))?;

    // On Unix, rename will atomically replace the destination. On Windows, rename
    // fails if the destination exists, so we remove it first (ignoring NotFound).
    if cfg!(windows) && path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(format!("Remove existing settings file {:?}: {}", path, e));
            }
        }
    }

    std::fs::rename(&tmp_path, path)
        .map_err(|e| format!("Rename temp settings {:?} to {:?}: {}", tmp_path, path, e))?;
    Ok(())
}
