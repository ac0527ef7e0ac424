//! Global famcal configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono_tz::Tz;
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

use crate::error::{CoreError, CoreResult};
use crate::schedule::Schedule;
use crate::sync::SyncSettings;
use crate::sync::window::{DEFAULT_MONTHS_BACK, DEFAULT_MONTHS_FORWARD};

static DEFAULT_DATA_DIR: &str = "~/.local/share/famcal";
static ENV_PREFIX: &str = "FAMCAL";

fn default_data_dir() -> PathBuf {
    PathBuf::from(DEFAULT_DATA_DIR)
}

fn default_home_timezone() -> String {
    "UTC".to_string()
}

fn default_months_back() -> u32 {
    DEFAULT_MONTHS_BACK
}

fn default_months_forward() -> u32 {
    DEFAULT_MONTHS_FORWARD
}

fn default_schedule_times() -> Vec<String> {
    vec!["06:00".into(), "12:00".into(), "18:00".into()]
}

fn default_invocation_timeout() -> String {
    "9m".to_string()
}

fn default_fetch_timeout() -> String {
    "30s".to_string()
}

/// Configuration at ~/.config/famcal/config.toml, overridable with
/// `FAMCAL_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct FamcalConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_home_timezone")]
    pub home_timezone: String,

    /// User that receives admin alerts
    pub admin_user_id: Option<String>,

    #[serde(default = "default_months_back")]
    pub months_back: u32,

    #[serde(default = "default_months_forward")]
    pub months_forward: u32,

    #[serde(default = "default_schedule_times")]
    pub schedule_times: Vec<String>,

    /// Defaults to `home_timezone`
    pub schedule_timezone: Option<String>,

    #[serde(default = "default_invocation_timeout")]
    pub invocation_timeout: String,

    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout: String,

    /// Push gateway for admin alerts; alerts are only logged without one
    pub push_endpoint: Option<String>,
}

impl FamcalConfig {
    pub fn config_path() -> CoreResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| CoreError::Config("Could not determine config directory".into()))?
            .join("famcal");

        Ok(config_dir.join("config.toml"))
    }

    /// Load the global config, writing a commented default file first if none exists.
    pub fn load() -> CoreResult<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            Self::create_default_config(&config_path)?;
        }

        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> CoreResult<Self> {
        Self::build(
            Config::builder()
                .add_source(File::from(path).format(FileFormat::Toml).required(false))
                .add_source(env_source()),
        )
    }

    /// Parse config from a TOML string, still honoring environment overrides.
    pub fn from_toml(content: &str) -> CoreResult<Self> {
        Self::build(
            Config::builder()
                .add_source(File::from_str(content, FileFormat::Toml))
                .add_source(env_source()),
        )
    }

    fn build(builder: config::ConfigBuilder<config::builder::DefaultState>) -> CoreResult<Self> {
        builder
            .build()
            .map_err(|e| CoreError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| CoreError::Config(e.to_string()))
    }

    /// Create a default config file with all options commented out.
    pub fn create_default_config(path: &Path) -> CoreResult<()> {
        let contents = format!(
            "\
# famcal configuration

# Where calendars and month buckets are stored:
# data_dir = \"{}\"

# Timezone that floating feed times are read in:
# home_timezone = \"Europe/Stockholm\"

# User that receives sync failure alerts:
# admin_user_id = \"admin\"

# Default sync window, in months around the current month:
# months_back = {}
# months_forward = {}

# When `famcal daemon` syncs, and in which timezone:
# schedule_times = [\"06:00\", \"12:00\", \"18:00\"]
# schedule_timezone = \"Europe/Stockholm\"

# Upper bound for one scheduled run, and for one feed download:
# invocation_timeout = \"9m\"
# fetch_timeout = \"30s\"

# HTTP endpoint that admin alerts are POSTed to:
# push_endpoint = \"https://push.example.com/notify\"
",
            DEFAULT_DATA_DIR, DEFAULT_MONTHS_BACK, DEFAULT_MONTHS_FORWARD
        );

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CoreError::Config(format!("Could not create config directory: {e}"))
            })?;
        }

        std::fs::write(path, contents)
            .map_err(|e| CoreError::Config(format!("Could not write config file: {e}")))?;

        Ok(())
    }

    pub fn data_path(&self) -> PathBuf {
        let full_path_str = shellexpand::tilde(&self.data_dir.to_string_lossy()).into_owned();
        PathBuf::from(full_path_str)
    }

    pub fn home_tz(&self) -> CoreResult<Tz> {
        parse_tz(&self.home_timezone)
    }

    pub fn schedule(&self) -> CoreResult<Schedule> {
        let tz = match &self.schedule_timezone {
            Some(name) => parse_tz(name)?,
            None => self.home_tz()?,
        };
        Schedule::parse(&self.schedule_times, tz)
    }

    pub fn invocation_timeout(&self) -> CoreResult<Duration> {
        parse_duration("invocation_timeout", &self.invocation_timeout)
    }

    pub fn fetch_timeout(&self) -> CoreResult<Duration> {
        parse_duration("fetch_timeout", &self.fetch_timeout)
    }

    pub fn sync_settings(&self) -> CoreResult<SyncSettings> {
        Ok(SyncSettings {
            home_tz: self.home_tz()?,
            months_back: self.months_back,
            months_forward: self.months_forward,
            invocation_timeout: self.invocation_timeout()?,
        })
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("schedule_times")
}

fn parse_tz(name: &str) -> CoreResult<Tz> {
    name.parse::<Tz>()
        .map_err(|_| CoreError::Config(format!("Unknown timezone '{}'", name)))
}

fn parse_duration(field: &str, value: &str) -> CoreResult<Duration> {
    humantime::parse_duration(value)
        .map_err(|e| CoreError::Config(format!("Invalid {} '{}': {}", field, value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = FamcalConfig::from_toml("").unwrap();
        assert_eq!(config.months_back, 1);
        assert_eq!(config.months_forward, 3);
        assert_eq!(config.home_tz().unwrap(), Tz::UTC);
        assert_eq!(config.invocation_timeout().unwrap(), Duration::from_secs(540));
        assert_eq!(config.fetch_timeout().unwrap(), Duration::from_secs(30));
        assert_eq!(config.schedule().unwrap().times().len(), 3);
        assert!(config.push_endpoint.is_none());
    }

    #[test]
    fn test_schedule_timezone_falls_back_to_home() {
        let config = FamcalConfig::from_toml(
            r#"
home_timezone = "Europe/Stockholm"
schedule_times = ["07:30"]
"#,
        )
        .unwrap();
        let schedule = config.schedule().unwrap();
        assert_eq!(schedule.timezone(), chrono_tz::Europe::Stockholm);
        assert_eq!(schedule.times().len(), 1);
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        let config = FamcalConfig::from_toml(
            r#"
home_timezone = "Mars/Olympus"
invocation_timeout = "soon"
schedule_times = ["7pm"]
"#,
        )
        .unwrap();
        assert!(matches!(config.home_tz(), Err(CoreError::Config(_))));
        assert!(matches!(config.invocation_timeout(), Err(CoreError::Config(_))));
        assert!(matches!(config.schedule(), Err(CoreError::Config(_))));
    }

    #[test]
    fn test_default_file_parses_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("famcal/config.toml");
        FamcalConfig::create_default_config(&path).unwrap();

        let config = FamcalConfig::load_from(&path).unwrap();
        assert_eq!(config.data_dir, PathBuf::from(DEFAULT_DATA_DIR));
        assert!(config.admin_user_id.is_none());
    }

    #[test]
    fn test_data_path_expands_tilde() {
        let config = FamcalConfig::from_toml("").unwrap();
        assert!(!config.data_path().to_string_lossy().starts_with('~'));
    }
}
