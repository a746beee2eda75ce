//! Agenda configuration, loadable from TOML.

use crate::error::{TychoError, TychoResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn default_tick_ms() -> u64 {
    500
}

fn default_purge_store() -> usize {
    3
}

/// Configuration of an [`crate::agenda::Agenda`] instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgendaConfig {
    /// Path of the reservation store file
    pub reservations_store: PathBuf,

    /// Path whose existence signals the scheduling loop to stop
    pub stop_file: PathBuf,

    /// Number of store backups to retain; 0 disables backups
    #[serde(default = "default_purge_store")]
    pub purge_store: usize,

    /// Scheduling loop tick in milliseconds
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

impl AgendaConfig {
    pub fn new(reservations_store: impl Into<PathBuf>, stop_file: impl Into<PathBuf>) -> Self {
        AgendaConfig {
            reservations_store: reservations_store.into(),
            stop_file: stop_file.into(),
            purge_store: default_purge_store(),
            tick_ms: default_tick_ms(),
        }
    }

    /// Load the configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> TychoResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            TychoError::config(format!(
                "Cannot read agenda configuration '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: AgendaConfig = toml::from_str(&text).map_err(|e| {
            TychoError::config(format!(
                "Cannot parse agenda configuration '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> TychoResult<()> {
        if self.reservations_store.as_os_str().is_empty() {
            return Err(TychoError::config("Empty reservation store path"));
        }
        if self.stop_file.as_os_str().is_empty() {
            return Err(TychoError::config("Empty stop file path"));
        }
        if self.tick_ms == 0 {
            return Err(TychoError::config("Scheduling tick must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_applied() {
        let config: AgendaConfig = toml::from_str(
            r#"
            reservations_store = "/var/lib/tycho/reservations.store"
            stop_file = "/var/lib/tycho/agenda.stop"
            "#,
        )
        .unwrap();
        assert_eq!(config.purge_store, 3);
        assert_eq!(config.tick_ms, 500);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agenda.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "reservations_store = \"/tmp/reservations.store\"").unwrap();
        writeln!(file, "stop_file = \"/tmp/agenda.stop\"").unwrap();
        writeln!(file, "purge_store = 0").unwrap();
        writeln!(file, "tick_ms = 50").unwrap();

        let config = AgendaConfig::from_toml_file(&path).unwrap();
        assert_eq!(config.purge_store, 0);
        assert_eq!(config.tick_ms, 50);
        assert!(AgendaConfig::from_toml_file(dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_zero_tick_rejected() {
        let mut config = AgendaConfig::new("/tmp/r.store", "/tmp/a.stop");
        config.tick_ms = 0;
        assert!(config.validate().is_err());
    }
}
