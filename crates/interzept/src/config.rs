use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cli::Cli;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub authz: AuthzConfig,
    #[serde(default)]
    pub acctz: AcctzConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthzConfig {
    #[serde(default = "default_policy_file")]
    pub policy_file: PathBuf,
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
}

impl Default for AuthzConfig {
    fn default() -> Self {
        Self {
            policy_file: default_policy_file(),
            refresh_interval_secs: default_refresh_interval(),
        }
    }
}

impl AuthzConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AcctzConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_export_path")]
    pub export_path: PathBuf,
    #[serde(default = "default_buffer")]
    pub buffer: usize,
}

impl Default for AcctzConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            export_path: default_export_path(),
            buffer: default_buffer(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_policy_file() -> PathBuf {
    PathBuf::from("/security/authz/policy.json")
}

fn default_refresh_interval() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

fn default_export_path() -> PathBuf {
    PathBuf::from("acct.jsonl")
}

fn default_buffer() -> usize {
    acctz::BUFFERED_RECORDS
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Apply command-line overrides on top of the file settings.
    pub fn merge_cli(&mut self, cli: &Cli) {
        if let Some(ref policy) = cli.policy {
            self.authz.policy_file = policy.clone();
        }
        if let Some(secs) = cli.refresh_secs {
            self.authz.refresh_interval_secs = secs;
        }
        if let Some(ref records) = cli.records {
            self.acctz.export_path = records.clone();
        }
    }
}

/// Load configuration from a YAML file.
///
/// A missing file is not an error: `None` is returned and the caller falls
/// back to defaults once it can report that.
pub fn load(path: &Path) -> anyhow::Result<Option<Config>> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

    let config: Config = serde_yml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("failed to parse config file {}: {e}", path.display()))?;

    Ok(Some(config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(&dir.path().join("absent.yaml")).unwrap().is_none());
        let cfg = Config::default();
        assert_eq!(cfg.authz.policy_file, PathBuf::from("/security/authz/policy.json"));
        assert_eq!(cfg.authz.refresh_interval(), Duration::from_secs(60));
        assert!(cfg.acctz.enabled);
        assert_eq!(cfg.acctz.buffer, 100);
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("interzept.yaml");
        std::fs::write(
            &path,
            "authz:\n  refresh_interval_secs: 5\nacctz:\n  enabled: false\n",
        )
        .unwrap();

        let cfg = load(&path).unwrap().unwrap();
        assert_eq!(cfg.authz.refresh_interval_secs, 5);
        assert_eq!(cfg.authz.policy_file, default_policy_file());
        assert!(!cfg.acctz.enabled);
        assert_eq!(cfg.acctz.export_path, default_export_path());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("interzept.yaml");
        std::fs::write(&path, "authz:\n  policy: /tmp/p.json\n").unwrap();

        let err = load(&path).unwrap_err();
        assert!(err.to_string().contains("failed to parse config file"), "{err}");
    }

    #[test]
    fn cli_overrides_file_settings() {
        let mut cfg = Config::default();
        let cli = Cli::parse_from([
            "interzept",
            "--policy",
            "/tmp/p.json",
            "--refresh-secs",
            "1",
            "--records",
            "/tmp/a.jsonl",
        ]);
        cfg.merge_cli(&cli);
        assert_eq!(cfg.authz.policy_file, PathBuf::from("/tmp/p.json"));
        assert_eq!(cfg.authz.refresh_interval_secs, 1);
        assert_eq!(cfg.acctz.export_path, PathBuf::from("/tmp/a.jsonl"));
    }
}
