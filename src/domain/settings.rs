use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_true")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_true")]
    pub show_file_line: bool,
    #[serde(default = "default_false")]
    pub show_thread_ids: bool,
    #[serde(default = "default_true")]
    pub show_target: bool,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String, // "daily", "hourly", "minutely", "never"
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_logging_enabled: default_true(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_file_line: default_true(),
            show_thread_ids: default_false(),
            show_target: default_true(),
            ansi_colors: default_true(),
            rotation: default_rotation(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "daydream_controller".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}

/// Which transport adapter feeds the supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Platform BLE stack (WinRT on Windows, unsupported elsewhere)
    Ble,
    /// Frames replayed from a capture file
    Replay,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    // Logging Settings
    #[serde(default)]
    pub log_settings: LogSettings,

    // Transport Selection
    #[serde(default = "default_transport")]
    pub transport: TransportKind,
    #[serde(default)]
    pub replay_capture_path: Option<String>,
    #[serde(default = "default_replay_interval_ms")]
    pub replay_frame_interval_ms: u64,

    // Advanced BLE Settings
    #[serde(default = "default_service_uuid")]
    pub ble_service_uuid: String,
    #[serde(default = "default_data_uuid")]
    pub ble_data_char_uuid: String,
    #[serde(default = "default_client_config_uuid")]
    pub ble_client_config_uuid: String,

    // Device Selection
    #[serde(default = "default_debounce_ms")]
    pub selection_debounce_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Empty means any controller is accepted
    #[serde(default)]
    pub device_allow_list: Vec<String>,

    // Input Settings
    #[serde(default = "default_swipe_threshold")]
    pub swipe_threshold: i32,

    // Debug Settings
    #[serde(default = "default_false")]
    pub debug_raw_data_logging: bool,
    #[serde(default = "default_false")]
    pub emit_json_states: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_settings: LogSettings::default(),

            transport: default_transport(),
            replay_capture_path: None,
            replay_frame_interval_ms: default_replay_interval_ms(),

            ble_service_uuid: default_service_uuid(),
            ble_data_char_uuid: default_data_uuid(),
            ble_client_config_uuid: default_client_config_uuid(),

            selection_debounce_ms: default_debounce_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            device_allow_list: Vec::new(),

            swipe_threshold: default_swipe_threshold(),

            debug_raw_data_logging: false,
            emit_json_states: false,
        }
    }
}

fn default_transport() -> TransportKind {
    TransportKind::Ble
}
fn default_replay_interval_ms() -> u64 {
    10
}
fn default_service_uuid() -> String {
    crate::infrastructure::bluetooth::protocol::SERVICE_UUID.to_string()
}
fn default_data_uuid() -> String {
    crate::infrastructure::bluetooth::protocol::DATA_CHAR_UUID.to_string()
}
fn default_client_config_uuid() -> String {
    crate::infrastructure::bluetooth::protocol::CLIENT_CONFIG_UUID.to_string()
}
fn default_debounce_ms() -> u64 {
    2000
}
fn default_connect_timeout_ms() -> u64 {
    10_000
}
fn default_swipe_threshold() -> i32 {
    crate::domain::gestures::DEFAULT_SWIPE_THRESHOLD
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    /// Load from the platform config directory, falling back to defaults
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        Ok(Self::open(settings_path))
    }

    /// Load from an explicit path, falling back to defaults when the file is
    /// missing or unreadable
    pub fn open(settings_path: PathBuf) -> Self {
        let settings = match Self::load_from_file(&settings_path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::debug!(
                    "Using default settings ({}): {}",
                    settings_path.display(),
                    e
                );
                Settings::default()
            }
        };

        Self {
            settings,
            settings_path,
        }
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("DaydreamController");
        fs::create_dir_all(&path)?;
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn path(&self) -> &Path {
        &self.settings_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.selection_debounce_ms, 2000);
        assert_eq!(settings.swipe_threshold, 50);
        assert_eq!(settings.transport, TransportKind::Ble);
        assert!(settings.device_allow_list.is_empty());
        assert_eq!(
            settings.ble_data_char_uuid,
            "00000001-1000-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn test_partial_json_uses_field_defaults() {
        let json = r#"{ "transport": "replay", "replay_capture_path": "capture.txt" }"#;
        let settings: Settings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.transport, TransportKind::Replay);
        assert_eq!(settings.replay_capture_path.as_deref(), Some("capture.txt"));
        assert_eq!(settings.connect_timeout_ms, 10_000);
        assert_eq!(settings.log_settings.rotation, "daily");
    }

    #[test]
    fn test_save_and_reopen() {
        let path = std::env::temp_dir().join(format!(
            "daydream_settings_{}.json",
            std::process::id()
        ));

        let mut service = SettingsService::open(path.clone());
        service.get_mut().device_allow_list = vec!["E4:5F:01:AB:CD:EF".to_string()];
        service.get_mut().selection_debounce_ms = 500;
        service.save().unwrap();

        let reopened = SettingsService::open(path.clone());
        assert_eq!(reopened.get().selection_debounce_ms, 500);
        assert_eq!(reopened.get().device_allow_list.len(), 1);

        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let service = SettingsService::open(PathBuf::from("/nonexistent/dir/settings.json"));
        assert_eq!(service.get().selection_debounce_ms, 2000);
    }

    #[test]
    fn test_default_uuids_parse() {
        use crate::infrastructure::bluetooth::protocol::parse_uuid;

        let settings = Settings::default();
        assert_eq!(
            parse_uuid(&settings.ble_client_config_uuid).unwrap() >> 96,
            0x2902
        );
        assert_eq!(parse_uuid(&settings.ble_service_uuid).unwrap() >> 96, 0xFE55);
        assert!(parse_uuid(&settings.ble_data_char_uuid).is_ok());
    }
}
