use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::DbError;

/// Client and CLI settings. Precedence: explicit overrides > env > config files > defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    pub default_database: Option<String>,
    /// Upper bound for one compiled find, in milliseconds.
    pub deadline_ms: Option<u64>,
    pub log_dir: Option<PathBuf>,
    pub log_level: Option<String>,
    pub log_retention: Option<usize>,
}

impl ClientConfig {
    /// Fills every unset field from `other`.
    pub fn merge_missing(&mut self, other: Self) {
        if self.default_database.is_none() {
            self.default_database = other.default_database;
        }
        if self.deadline_ms.is_none() {
            self.deadline_ms = other.deadline_ms;
        }
        if self.log_dir.is_none() {
            self.log_dir = other.log_dir;
        }
        if self.log_level.is_none() {
            self.log_level = other.log_level;
        }
        if self.log_retention.is_none() {
            self.log_retention = other.log_retention;
        }
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.filter(|ms| *ms > 0).map(Duration::from_millis)
    }

    /// Reads one TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or has unknown or mistyped keys.
    pub fn from_file(path: &Path) -> Result<Self, DbError> {
        let s = std::fs::read_to_string(path)?;
        toml::from_str(&s).map_err(|e| DbError::Config(format!("{}: {e}", path.display())))
    }

    /// Settings taken from `DOCBRIDGE_*` variables, through a lookup so tests need not touch the
    /// process environment.
    pub fn from_env_with(get: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            default_database: get("DOCBRIDGE_DATABASE"),
            deadline_ms: get("DOCBRIDGE_DEADLINE_MS").and_then(|s| s.parse().ok()),
            log_dir: get("DOCBRIDGE_LOG_DIR").map(PathBuf::from),
            log_level: get("DOCBRIDGE_LOG_LEVEL"),
            log_retention: get("DOCBRIDGE_LOG_RETENTION").and_then(|s| s.parse().ok()),
        }
    }

    /// Candidate config files, highest priority first.
    #[must_use]
    pub fn candidate_paths(explicit: Option<&Path>) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Some(p) = explicit {
            paths.push(p.to_path_buf());
        }
        if let Ok(p) = std::env::var("DOCBRIDGE_CONFIG") {
            paths.push(PathBuf::from(p));
        }
        if let Ok(home) = std::env::var("USERPROFILE").or_else(|_| std::env::var("HOME")) {
            paths.push(PathBuf::from(home).join(".config").join("docbridge.toml"));
        }
        if let Ok(cur) = std::env::current_dir() {
            paths.push(cur.join("docbridge.toml"));
        }
        paths
    }

    /// Resolves the effective config: `overrides`, then env, then existing files in order.
    ///
    /// An explicitly named file that is missing or invalid is an error; discovered files that
    /// fail to parse are skipped with a warning.
    ///
    /// # Errors
    /// Returns an error if the explicit config file cannot be loaded.
    pub fn load(overrides: Self, explicit: Option<&Path>) -> Result<Self, DbError> {
        let mut cfg = overrides;
        cfg.merge_missing(Self::from_env_with(|k| std::env::var(k).ok()));
        if let Some(p) = explicit {
            cfg.merge_missing(Self::from_file(p)?);
        }
        for p in Self::candidate_paths(None) {
            if !p.exists() {
                continue;
            }
            match Self::from_file(&p) {
                Ok(file_cfg) => cfg.merge_missing(file_cfg),
                Err(e) => log::warn!("ignoring config file: {e}"),
            }
        }
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn file_values_fill_gaps_only() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "default_database = \"perf\"\ndeadline_ms = 250\nlog_level = \"debug\"").unwrap();
        let mut cfg = ClientConfig { log_level: Some("warn".into()), ..Default::default() };
        cfg.merge_missing(ClientConfig::from_file(f.path()).unwrap());
        assert_eq!(cfg.default_database.as_deref(), Some("perf"));
        assert_eq!(cfg.log_level.as_deref(), Some("warn"));
        assert_eq!(cfg.deadline(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "deadline = 5").unwrap();
        assert!(matches!(ClientConfig::from_file(f.path()), Err(DbError::Config(_))));
    }

    #[test]
    fn env_lookup() {
        let cfg = ClientConfig::from_env_with(|k| match k {
            "DOCBRIDGE_DATABASE" => Some("k6".into()),
            "DOCBRIDGE_DEADLINE_MS" => Some("nope".into()),
            "DOCBRIDGE_LOG_RETENTION" => Some("3".into()),
            _ => None,
        });
        assert_eq!(cfg.default_database.as_deref(), Some("k6"));
        assert_eq!(cfg.deadline_ms, None);
        assert_eq!(cfg.log_retention, Some(3));
    }

    #[test]
    fn zero_deadline_means_none() {
        let cfg = ClientConfig { deadline_ms: Some(0), ..Default::default() };
        assert_eq!(cfg.deadline(), None);
    }
}
