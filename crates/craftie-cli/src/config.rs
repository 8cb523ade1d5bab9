//! Configuration loading and management.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, bail};
use craftie_core::RetryPolicy;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to the session store.
    pub database_path: PathBuf,
    /// Seconds between live syncs of a running session.
    pub sync_interval_secs: u64,
    pub csv: CsvConfig,
    pub google_sheets: SheetsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvConfig {
    pub enabled: bool,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetsConfig {
    pub enabled: bool,
    pub spreadsheet_id: String,
    pub sheet_name: String,
    /// Executable that prints the service-account JSON. Keyring is used when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials_helper: Option<PathBuf>,
    pub retry_attempts: u32,
    pub retry_delay_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            database_path: data_dir.join("craftie.db"),
            sync_interval_secs: 30,
            csv: CsvConfig {
                enabled: false,
                path: data_dir.join("sessions.csv"),
            },
            google_sheets: SheetsConfig::default(),
        }
    }
}

impl Default for CsvConfig {
    fn default() -> Self {
        Config::default().csv
    }
}

impl Default for SheetsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            spreadsheet_id: String::new(),
            sheet_name: "CraftTime".to_string(),
            credentials_helper: None,
            retry_attempts: 3,
            retry_delay_secs: 5,
        }
    }
}

impl SheetsConfig {
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.retry_attempts,
            delay: Duration::from_secs(self.retry_delay_secs),
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    ///
    /// Later layers win: defaults, the user config file, `config_path`, then
    /// `CRAFTIE_*` environment variables (`__` separates nested keys).
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed("CRAFTIE_").split("__"));

        let mut config: Self = figment.extract()?;
        config.expand_paths();
        Ok(config)
    }

    fn expand_paths(&mut self) {
        self.database_path = expand_home(&self.database_path);
        self.csv.path = expand_home(&self.csv.path);
        if let Some(helper) = &self.google_sheets.credentials_helper {
            self.google_sheets.credentials_helper = Some(expand_home(helper));
        }
    }

    /// Rejects settings the live loop cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.sync_interval_secs == 0 {
            bail!("sync_interval_secs must be greater than zero");
        }
        if self.csv.enabled && self.csv.path.as_os_str().is_empty() {
            bail!("csv.path must be set when CSV sync is enabled");
        }
        let sheets = &self.google_sheets;
        if sheets.enabled {
            if sheets.spreadsheet_id.trim().is_empty() {
                bail!("google_sheets.spreadsheet_id must be set when Google Sheets sync is enabled");
            }
            if sheets.sheet_name.trim().is_empty() {
                bail!("google_sheets.sheet_name must not be empty");
            }
            if sheets.retry_attempts == 0 {
                bail!("google_sheets.retry_attempts must be at least 1");
            }
        }
        Ok(())
    }

    pub const fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }
}

/// Expands a leading `~/` against the home directory.
fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

/// Returns the platform-specific config directory for craftie.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("craftie"))
}

/// Returns the platform-specific data directory for craftie.
///
/// On Linux: `~/.local/share/craftie`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("craftie"))
}

#[cfg(test)]
mod tests {
    use super::*;

    use figment::Jail;

    #[test]
    fn test_dirs_data_path_ends_with_craftie() {
        let path = dirs_data_path().unwrap();
        assert_eq!(path.file_name().unwrap(), "craftie");
    }

    #[test]
    fn test_default_config_values() {
        let config = Config::default();
        assert_eq!(config.sync_interval_secs, 30);
        assert!(!config.csv.enabled);
        assert!(!config.google_sheets.enabled);
        assert_eq!(config.google_sheets.sheet_name, "CraftTime");
        assert_eq!(config.google_sheets.retry_policy(), RetryPolicy::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file_and_env() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "craftie.toml",
                r#"
                sync_interval_secs = 10

                [csv]
                enabled = true
                path = "/data/sessions.csv"

                [google_sheets]
                spreadsheet_id = "abc123"
                "#,
            )?;
            jail.set_env("XDG_CONFIG_HOME", jail.directory().join("xdg").display());
            jail.set_env("CRAFTIE_GOOGLE_SHEETS__ENABLED", "true");
            jail.set_env("CRAFTIE_GOOGLE_SHEETS__RETRY_ATTEMPTS", "5");

            let config = Config::load_from(Some(Path::new("craftie.toml")))?;
            assert_eq!(config.sync_interval_secs, 10);
            assert!(config.csv.enabled);
            assert_eq!(config.csv.path, PathBuf::from("/data/sessions.csv"));
            assert!(config.google_sheets.enabled);
            assert_eq!(config.google_sheets.spreadsheet_id, "abc123");
            assert_eq!(config.google_sheets.sheet_name, "CraftTime");
            assert_eq!(config.google_sheets.retry_attempts, 5);
            assert!(config.google_sheets.credentials_helper.is_none());
            Ok(())
        });
    }

    #[test]
    fn test_tilde_paths_are_expanded() {
        let home = dirs::home_dir().unwrap();
        assert_eq!(expand_home(Path::new("~/x/y.csv")), home.join("x/y.csv"));
        assert_eq!(expand_home(Path::new("/abs/y.csv")), PathBuf::from("/abs/y.csv"));
        assert_eq!(expand_home(Path::new("rel/~/y")), PathBuf::from("rel/~/y"));
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let config = Config {
            sync_interval_secs: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_requires_spreadsheet_id_when_enabled() {
        let mut config = Config::default();
        config.google_sheets.enabled = true;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("spreadsheet_id"), "{err}");

        config.google_sheets.spreadsheet_id = "abc".to_string();
        assert!(config.validate().is_ok());

        config.google_sheets.retry_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_requires_csv_path_when_enabled() {
        let mut config = Config::default();
        config.csv.enabled = true;
        config.csv.path = PathBuf::new();
        assert!(config.validate().is_err());
    }
}
