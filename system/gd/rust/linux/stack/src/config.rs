//! Audio Gateway configuration, stored as JSON.

use log::{warn, LevelFilter};
use serde_json::{json, Map, Value};
use std::path::Path;
use std::time::Duration;

/// Default location of the configuration file.
pub const HFP_AG_CONF: &str = "/var/lib/bluetooth/hfp_ag.json";

const DEFAULT_MAX_CONNECTIONS: usize = 5;
/// Upper bound accepted for `max_connections`.
pub const MAX_CONNECTIONS_LIMIT: usize = 16;
const DEFAULT_DIALING_OUT_TIMEOUT_MS: u64 = 10000;
const DEFAULT_VOICE_RECOGNITION_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, Clone, PartialEq)]
pub struct HfpConfig {
    /// Service level connections allowed at the same time, from 1 to `MAX_CONNECTIONS_LIMIT`.
    pub max_connections: usize,
    pub inband_ringing_supported: bool,
    pub dialing_out_timeout_ms: u64,
    pub voice_recognition_timeout_ms: u64,
    /// Make a newly connected device active unless its policy forbids it.
    pub activate_on_connect: bool,
    pub force_sco_audio: bool,
    pub log_level: Option<LevelFilter>,
}

impl Default for HfpConfig {
    fn default() -> Self {
        HfpConfig {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            inband_ringing_supported: true,
            dialing_out_timeout_ms: DEFAULT_DIALING_OUT_TIMEOUT_MS,
            voice_recognition_timeout_ms: DEFAULT_VOICE_RECOGNITION_TIMEOUT_MS,
            activate_on_connect: true,
            force_sco_audio: false,
            log_level: None,
        }
    }
}

fn read_bool(json: &Map<String, Value>, key: &str, default: bool) -> bool {
    match json.get(key) {
        None => default,
        Some(v) => v.as_bool().unwrap_or_else(|| {
            warn!("Config: ignoring invalid {} {}", key, v);
            default
        }),
    }
}

fn read_u64(json: &Map<String, Value>, key: &str, default: u64) -> u64 {
    match json.get(key) {
        None => default,
        Some(v) => v.as_u64().unwrap_or_else(|| {
            warn!("Config: ignoring invalid {} {}", key, v);
            default
        }),
    }
}

impl HfpConfig {
    /// Builds the configuration from a parsed JSON object.
    ///
    /// Missing keys take their default. Values of the wrong type are ignored with a warning.
    pub fn from_json(json: &Value) -> HfpConfig {
        let mut config = HfpConfig::default();
        let obj = match json.as_object() {
            Some(obj) => obj,
            None => {
                warn!("Config: expected a JSON object, using defaults");
                return config;
            }
        };

        let max_connections = read_u64(obj, "max_connections", DEFAULT_MAX_CONNECTIONS as u64);
        match usize::try_from(max_connections) {
            Ok(max) if (1..=MAX_CONNECTIONS_LIMIT).contains(&max) => config.max_connections = max,
            _ => warn!(
                "Config: ignoring max_connections {}, must be 1 to {}",
                max_connections, MAX_CONNECTIONS_LIMIT
            ),
        }
        config.inband_ringing_supported =
            read_bool(obj, "inband_ringing_supported", config.inband_ringing_supported);
        config.dialing_out_timeout_ms =
            read_u64(obj, "dialing_out_timeout_ms", config.dialing_out_timeout_ms);
        config.voice_recognition_timeout_ms =
            read_u64(obj, "voice_recognition_timeout_ms", config.voice_recognition_timeout_ms);
        config.activate_on_connect =
            read_bool(obj, "activate_on_connect", config.activate_on_connect);
        config.force_sco_audio = read_bool(obj, "force_sco_audio", config.force_sco_audio);
        config.log_level = obj.get("log_level").and_then(|v| {
            let level = v.as_str().and_then(|s| s.parse::<LevelFilter>().ok());
            if level.is_none() {
                warn!("Config: ignoring invalid log_level {}", v);
            }
            level
        });

        config
    }

    /// Parses the configuration from a JSON string. A malformed document yields the defaults.
    pub fn from_json_str(contents: &str) -> HfpConfig {
        match serde_json::from_str::<Value>(contents) {
            Ok(json) => HfpConfig::from_json(&json),
            Err(e) => {
                warn!("Config: malformed JSON ({}), using defaults", e);
                HfpConfig::default()
            }
        }
    }

    /// Reads the configuration file at `path`.
    pub fn load<P: AsRef<Path>>(path: P) -> std::io::Result<HfpConfig> {
        let contents = std::fs::read_to_string(path)?;
        Ok(HfpConfig::from_json_str(&contents))
    }

    pub fn to_json(&self) -> Value {
        let mut json = json!({
            "max_connections": self.max_connections,
            "inband_ringing_supported": self.inband_ringing_supported,
            "dialing_out_timeout_ms": self.dialing_out_timeout_ms,
            "voice_recognition_timeout_ms": self.voice_recognition_timeout_ms,
            "activate_on_connect": self.activate_on_connect,
            "force_sco_audio": self.force_sco_audio
        });
        if let Some(level) = self.log_level {
            json["log_level"] = Value::String(level.to_string());
        }
        json
    }

    pub fn to_json_string(&self) -> String {
        serde_json::to_string_pretty(&self.to_json()).unwrap_or_default()
    }

    /// Writes the configuration to `path`.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        std::fs::write(path, self.to_json_string())
    }

    pub fn dialing_out_timeout(&self) -> Duration {
        Duration::from_millis(self.dialing_out_timeout_ms)
    }

    pub fn voice_recognition_timeout(&self) -> Duration {
        Duration::from_millis(self.voice_recognition_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_keys_take_defaults() {
        assert_eq!(HfpConfig::from_json(&json!({})), HfpConfig::default());
        assert_eq!(HfpConfig::from_json(&json!([1, 2])), HfpConfig::default());
        assert_eq!(HfpConfig::from_json_str("{ not json"), HfpConfig::default());
    }

    #[test]
    fn parses_every_key() {
        let config = HfpConfig::from_json(&json!({
            "max_connections": 2,
            "inband_ringing_supported": false,
            "dialing_out_timeout_ms": 3000,
            "voice_recognition_timeout_ms": 1500,
            "activate_on_connect": false,
            "force_sco_audio": true,
            "log_level": "debug"
        }));
        assert_eq!(config.max_connections, 2);
        assert!(!config.inband_ringing_supported);
        assert_eq!(config.dialing_out_timeout(), Duration::from_secs(3));
        assert_eq!(config.voice_recognition_timeout(), Duration::from_millis(1500));
        assert!(!config.activate_on_connect);
        assert!(config.force_sco_audio);
        assert_eq!(config.log_level, Some(LevelFilter::Debug));
    }

    #[test]
    fn invalid_values_are_ignored() {
        let config = HfpConfig::from_json(&json!({
            "max_connections": 0,
            "inband_ringing_supported": "yes",
            "dialing_out_timeout_ms": -5,
            "log_level": "loud"
        }));
        assert_eq!(config, HfpConfig::default());

        let config = HfpConfig::from_json(&json!({ "max_connections": u64::MAX }));
        assert_eq!(config.max_connections, DEFAULT_MAX_CONNECTIONS);
        let config = HfpConfig::from_json_str(r#"{"max_connections": 17}"#);
        assert_eq!(config.max_connections, DEFAULT_MAX_CONNECTIONS);
        let config = HfpConfig::from_json_str(r#"{"max_connections": 16}"#);
        assert_eq!(config.max_connections, MAX_CONNECTIONS_LIMIT);
    }

    #[test]
    fn save_then_load() {
        let config = HfpConfig {
            max_connections: 1,
            force_sco_audio: true,
            log_level: Some(LevelFilter::Warn),
            ..Default::default()
        };
        let file = tempfile::NamedTempFile::new().unwrap();
        config.save(file.path()).unwrap();
        assert_eq!(HfpConfig::load(file.path()).unwrap(), config);
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(HfpConfig::load(dir.path().join("absent.json")).is_err());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"garbage").unwrap();
        assert_eq!(HfpConfig::load(file.path()).unwrap(), HfpConfig::default());
    }
}
