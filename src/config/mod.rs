//! Persisted user settings: profile details, notification toggles, and
//! audio preferences.
//!
//! Each record lives in its own JSON file in the data directory and is
//! written back atomically (temp file + rename) whenever it changes.
//! Missing or malformed files fall back to defaults.

pub mod paths;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::voice::tts::VoiceGender;
use paths::get_data_dir;

const PROFILE_SETTINGS_FILE: &str = "profile_settings.json";
const NOTIFICATION_SETTINGS_FILE: &str = "notification_settings.json";
const AUDIO_SETTINGS_FILE: &str = "audio_settings.json";

/// Account details shown on the settings page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSettings {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
}

/// Notification preference toggles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSettings {
    #[serde(default)]
    pub email_notifications: bool,
    #[serde(default = "default_true")]
    pub session_reminders: bool,
    #[serde(default)]
    pub progress_updates: bool,
}

fn default_true() -> bool {
    true
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            email_notifications: false,
            session_reminders: true,
            progress_updates: false,
        }
    }
}

/// Audio preferences applied to speech playback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioSettings {
    #[serde(default)]
    pub voice: VoiceGender,
    /// Volume percentage, 0-100.
    #[serde(default = "default_volume")]
    pub volume: u8,
    /// Playback rate, 0.5-2.0.
    #[serde(default = "default_speed")]
    pub playback_speed: f32,
}

fn default_volume() -> u8 {
    50
}

fn default_speed() -> f32 {
    1.0
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            voice: VoiceGender::Female,
            volume: default_volume(),
            playback_speed: default_speed(),
        }
    }
}

impl AudioSettings {
    /// Clamp fields into their valid ranges.
    pub fn clamped(mut self) -> Self {
        self.volume = self.volume.min(100);
        self.playback_speed = self.playback_speed.clamp(0.5, 2.0);
        self
    }

    /// Volume as a 0.0-1.0 gain factor.
    pub fn volume_factor(&self) -> f32 {
        f32::from(self.volume.min(100)) / 100.0
    }
}

/// All three settings records together, as sent to the frontend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSettings {
    #[serde(default)]
    pub profile: ProfileSettings,
    #[serde(default)]
    pub notifications: NotificationSettings,
    #[serde(default)]
    pub audio: AudioSettings,
}

/// Loads and persists the settings records in a data directory.
pub struct SettingsStore {
    dir: PathBuf,
}

impl SettingsStore {
    /// Store rooted at the platform data directory.
    pub fn new() -> Self {
        Self {
            dir: get_data_dir(),
        }
    }

    /// Store rooted at an explicit directory (tests).
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Load every record, falling back to defaults for anything missing.
    pub fn load(&self) -> AppSettings {
        AppSettings {
            profile: read_json_file(&self.dir.join(PROFILE_SETTINGS_FILE)).unwrap_or_default(),
            notifications: read_json_file(&self.dir.join(NOTIFICATION_SETTINGS_FILE))
                .unwrap_or_default(),
            audio: read_json_file::<AudioSettings>(&self.dir.join(AUDIO_SETTINGS_FILE))
                .unwrap_or_default()
                .clamped(),
        }
    }

    pub fn save_profile(&self, settings: &ProfileSettings) -> std::io::Result<()> {
        self.write_record(PROFILE_SETTINGS_FILE, settings)
    }

    pub fn save_notifications(&self, settings: &NotificationSettings) -> std::io::Result<()> {
        self.write_record(NOTIFICATION_SETTINGS_FILE, settings)
    }

    pub fn save_audio(&self, settings: &AudioSettings) -> std::io::Result<()> {
        self.write_record(AUDIO_SETTINGS_FILE, settings)
    }

    /// Serialize one record and write it atomically: write to a temp file
    /// in the same directory, then rename over the target.
    fn write_record<T: Serialize>(&self, file: &str, value: &T) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let target = self.dir.join(file);
        let tmp = self.dir.join(format!("{}.tmp", file));
        let json = serde_json::to_string_pretty(value)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &target)?;
        info!(path = %target.display(), "Settings saved");
        Ok(())
    }
}

impl Default for SettingsStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Generic helper: read a JSON file and deserialize it.
fn read_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Option<T> {
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(val) => Some(val),
            Err(e) => {
                warn!("Failed to parse {}: {}", path.display(), e);
                None
            }
        },
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to read {}: {}", path.display(), e);
            }
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("empathy-settings-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_missing_files_yield_defaults() {
        let store = SettingsStore::with_dir(temp_dir("defaults"));
        let settings = store.load();
        assert_eq!(settings.audio.voice, VoiceGender::Female);
        assert_eq!(settings.audio.volume, 50);
        assert_eq!(settings.audio.playback_speed, 1.0);
        assert!(settings.notifications.session_reminders);
        assert!(!settings.notifications.email_notifications);
        assert_eq!(settings.profile.name, "");
    }

    #[test]
    fn test_save_and_reload_audio() {
        let dir = temp_dir("audio");
        let store = SettingsStore::with_dir(&dir);
        let audio = AudioSettings {
            voice: VoiceGender::Male,
            volume: 80,
            playback_speed: 1.5,
        };
        store.save_audio(&audio).unwrap();
        let loaded = store.load();
        assert_eq!(loaded.audio, audio);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_out_of_range_values_clamped_on_load() {
        let dir = temp_dir("clamp");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join(AUDIO_SETTINGS_FILE),
            r#"{"voice":"female","volume":250,"playbackSpeed":9.0}"#,
        )
        .unwrap();
        let loaded = SettingsStore::with_dir(&dir).load();
        assert_eq!(loaded.audio.volume, 100);
        assert_eq!(loaded.audio.playback_speed, 2.0);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_malformed_file_falls_back_to_defaults() {
        let dir = temp_dir("malformed");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(NOTIFICATION_SETTINGS_FILE), "not json").unwrap();
        let loaded = SettingsStore::with_dir(&dir).load();
        assert!(loaded.notifications.session_reminders);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_partial_record_merges_defaults() {
        let dir = temp_dir("partial");
        std::fs::create_dir_all(&dir).unwrap();
        // Old files may predate the playbackSpeed field.
        std::fs::write(
            dir.join(AUDIO_SETTINGS_FILE),
            r#"{"voice":"male","volume":30}"#,
        )
        .unwrap();
        let loaded = SettingsStore::with_dir(&dir).load();
        assert_eq!(loaded.audio.voice, VoiceGender::Male);
        assert_eq!(loaded.audio.volume, 30);
        assert_eq!(loaded.audio.playback_speed, 1.0);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
