//! Relay configuration
//!
//! Configuration is read once at startup from an optional JSON file and can be
//! re-read on demand through [`RelayConfig::reload_from`]. A reload may adjust
//! per-session limits, but the room topology (room count, room capacity,
//! history capacity) is fixed for the lifetime of the registry and a reload
//! that tries to change it is rejected.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{RelayError, Result};

/// Relay server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// TCP port to listen on
    pub port: u16,
    /// Number of chat rooms, addressed as 0..room_count
    pub room_count: usize,
    /// Maximum members per room
    pub room_capacity: usize,
    /// Maximum retained messages per room
    pub history_capacity: usize,
    /// Maximum accepted line length in bytes, excluding the newline
    pub max_line_len: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            room_count: 4,
            room_capacity: 5,
            history_capacity: 10,
            max_line_len: 1024,
        }
    }
}

impl RelayConfig {
    /// Load configuration from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|e| {
            RelayError::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config: RelayConfig = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values the server cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.room_count == 0 {
            return Err(RelayError::config("room_count must be at least 1"));
        }
        if self.room_capacity == 0 {
            return Err(RelayError::config("room_capacity must be at least 1"));
        }
        if self.history_capacity == 0 {
            return Err(RelayError::config("history_capacity must be at least 1"));
        }
        if self.max_line_len == 0 {
            return Err(RelayError::config("max_line_len must be at least 1"));
        }
        Ok(())
    }

    /// Re-read the configuration file and merge it into the running config.
    ///
    /// Only limits that can change without rebuilding the registry are
    /// applied; a file that alters the room topology or the listening port is
    /// rejected as a whole and the running config stays untouched.
    pub fn reload_from(&self, path: impl AsRef<Path>) -> Result<Self> {
        let fresh = Self::load(path)?;
        if fresh.room_count != self.room_count
            || fresh.room_capacity != self.room_capacity
            || fresh.history_capacity != self.history_capacity
        {
            return Err(RelayError::config(
                "room topology cannot change on reload; restart the server",
            ));
        }
        if fresh.port != self.port {
            return Err(RelayError::config(
                "listening port cannot change on reload; restart the server",
            ));
        }
        Ok(fresh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp_config(contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("relais-test-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_default_config() {
        let config = RelayConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.room_count, 4);
        assert_eq!(config.room_capacity, 5);
        assert_eq!(config.history_capacity, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let path = write_temp_config(r#"{"port": 9000, "max_line_len": 512}"#);
        let config = RelayConfig::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.max_line_len, 512);
        assert_eq!(config.room_count, RelayConfig::default().room_count);
    }

    #[test]
    fn test_load_rejects_zero_capacity() {
        let path = write_temp_config(r#"{"room_capacity": 0}"#);
        let result = RelayConfig::load(&path);
        std::fs::remove_file(&path).unwrap();

        assert!(matches!(result, Err(RelayError::Config(_))));
    }

    #[test]
    fn test_load_missing_file() {
        let result = RelayConfig::load("/nonexistent/relais.json");
        assert!(matches!(result, Err(RelayError::Config(_))));
    }

    #[test]
    fn test_reload_applies_line_limit() {
        let running = RelayConfig::default();
        let path = write_temp_config(r#"{"max_line_len": 256}"#);
        let reloaded = running.reload_from(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(reloaded.max_line_len, 256);
        assert_eq!(reloaded.room_count, running.room_count);
    }

    #[test]
    fn test_reload_rejects_topology_change() {
        let running = RelayConfig::default();
        let path = write_temp_config(r#"{"room_count": 8}"#);
        let result = running.reload_from(&path);
        std::fs::remove_file(&path).unwrap();

        assert!(matches!(result, Err(RelayError::Config(_))));
    }

    #[test]
    fn test_reload_rejects_port_change() {
        let running = RelayConfig::default();
        let path = write_temp_config(r#"{"port": 9999}"#);
        let result = running.reload_from(&path);
        std::fs::remove_file(&path).unwrap();

        assert!(matches!(result, Err(RelayError::Config(_))));
    }
}
