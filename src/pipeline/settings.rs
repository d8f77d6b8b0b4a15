// to be called on main startup and quit; keeps the user's setup between runs
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

const APP_DIR: &str = ".pitchsampler";
const SETTINGS_FILE: &str = "settings.json";
const LOG_FILE: &str = "pitchsampler.log";
// ten minutes of stereo at 48 kHz is already ~230 MB of recorder
pub const MAX_RECORD_SECONDS: f32 = 600.0;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub max_record_seconds: f32, // recorder capacity
    pub duration_presets: Vec<f32>, // the 10s / 30s / 60s buttons
    pub input_channels: u16, // 1 = mono, 2 = stereo
    pub monitor_input: bool, // hear the input while recording/trimming
    pub velocity: f32, // keyboard note velocity, 0.0 to 1.0
    pub release_on_key_up: bool, // fade out on note-off instead of cutting
    pub base_note: u8, // pitch of the leftmost key
    pub input_wav: Option<String>, // loop this file as the input instead of the mic
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_record_seconds: 60.0,
            duration_presets: vec![10.0, 30.0, 60.0],
            input_channels: 2,
            monitor_input: false,
            velocity: 0.8,
            release_on_key_up: true,
            base_note: 48,
            input_wav: None,
        }
    }
}

impl Settings {
    // Out of range values fall back to something playable
    pub fn sanitized(mut self) -> Self {
        let defaults = Settings::default();
        if !(self.max_record_seconds > 0.0) || !self.max_record_seconds.is_finite() {
            self.max_record_seconds = defaults.max_record_seconds;
        }
        self.max_record_seconds = self.max_record_seconds.min(MAX_RECORD_SECONDS);
        self.duration_presets.retain(|d| d.is_finite() && *d > 0.0);
        if self.duration_presets.is_empty() {
            self.duration_presets = defaults.duration_presets;
        }
        self.input_channels = self.input_channels.clamp(1, 2);
        self.velocity = if self.velocity.is_finite() {
            self.velocity.clamp(0.0, 1.0)
        } else {
            defaults.velocity
        };
        self.base_note = self.base_note.min(127 - 15);
        self
    }
}

// <project_dir>/.pitchsampler/<file>
fn app_file_path(project_dir: &Path, file: &str) -> PathBuf {
    project_dir.join(APP_DIR).join(file)
}

pub fn log_file_path(project_dir: &Path) -> PathBuf {
    app_file_path(project_dir, LOG_FILE)
}

pub fn load_settings(project_dir: &Path) -> Settings {
    let path = app_file_path(project_dir, SETTINGS_FILE);
    let data = match std::fs::read_to_string(&path) {
        Ok(data) => data,
        Err(_) => return Settings::default(), // first run
    };
    match serde_json::from_str::<Settings>(&data) {
        Ok(settings) => settings.sanitized(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring unreadable settings");
            Settings::default()
        }
    }
}

// Save the settings to disk, making the files if they don't exist already
pub fn save_settings(project_dir: &Path, settings: &Settings) -> anyhow::Result<()> {
    let path = app_file_path(project_dir, SETTINGS_FILE);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?; // create .pitchsampler/ if needed
    }
    let json = serde_json::to_string_pretty(settings)?;
    std::fs::write(&path, json)?;
    Ok(())
}
