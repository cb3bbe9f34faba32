//! Configuration management with layered loading
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. Global config: `$XDG_CONFIG_HOME/domprune/domprune.toml`
//! 3. Local config: `<dir>/.domprune.toml`
//! 4. Environment variables: `DOMPRUNE_*` prefix

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, ConfigError, Environment};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::application::services::autorun::DEFAULT_PASSIVE_PREFIXES;
use crate::application::services::selectors::SELECTORS_KEY;
use crate::application::services::Schedule;
use crate::application::ApplicationError;

/// Selector used by the passive path when the store has no entry.
pub const DEFAULT_SELECTOR: &str = ".sc-gzOgki.ksYuOU";

const ENV_PREFIX: &str = "DOMPRUNE";

/// Scheduler timing, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScheduleConfig {
    pub retry_delays_ms: Vec<u64>,
    pub throttle_ms: u64,
    pub main_window_ms: u64,
    pub nested_window_ms: u64,
    pub blank_poll_ms: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self::from(&Schedule::default())
    }
}

impl From<&Schedule> for ScheduleConfig {
    fn from(schedule: &Schedule) -> Self {
        let ms = |d: Duration| d.as_millis() as u64;
        Self {
            retry_delays_ms: schedule.retry_delays.iter().copied().map(ms).collect(),
            throttle_ms: ms(schedule.throttle),
            main_window_ms: ms(schedule.main_window),
            nested_window_ms: ms(schedule.nested_window),
            blank_poll_ms: ms(schedule.blank_poll),
        }
    }
}

impl From<&ScheduleConfig> for Schedule {
    fn from(config: &ScheduleConfig) -> Self {
        Self {
            retry_delays: config
                .retry_delays_ms
                .iter()
                .copied()
                .map(Duration::from_millis)
                .collect(),
            throttle: Duration::from_millis(config.throttle_ms),
            main_window: Duration::from_millis(config.main_window_ms),
            nested_window: Duration::from_millis(config.nested_window_ms),
            blank_poll: Duration::from_millis(config.blank_poll_ms),
        }
    }
}

/// Raw schedule config for intermediate parsing (`None` → not specified).
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawScheduleConfig {
    pub retry_delays_ms: Option<Vec<u64>>,
    pub throttle_ms: Option<u64>,
    pub main_window_ms: Option<u64>,
    pub nested_window_ms: Option<u64>,
    pub blank_poll_ms: Option<u64>,
}

impl ScheduleConfig {
    /// Overlay wins where specified; arrays replace.
    pub fn merge(&self, overlay: &RawScheduleConfig) -> Self {
        Self {
            retry_delays_ms: overlay
                .retry_delays_ms
                .clone()
                .unwrap_or_else(|| self.retry_delays_ms.clone()),
            throttle_ms: overlay.throttle_ms.unwrap_or(self.throttle_ms),
            main_window_ms: overlay.main_window_ms.unwrap_or(self.main_window_ms),
            nested_window_ms: overlay.nested_window_ms.unwrap_or(self.nested_window_ms),
            blank_poll_ms: overlay.blank_poll_ms.unwrap_or(self.blank_poll_ms),
        }
    }
}

/// Raw settings for intermediate parsing.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawSettings {
    pub store_path: Option<PathBuf>,
    pub store_key: Option<String>,
    pub default_selector: Option<String>,
    pub passive_prefixes: Option<Vec<String>>,
    #[serde(default)]
    pub schedule: RawScheduleConfig,
}

/// Unified configuration for domprune.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// JSON file holding the selector list
    pub store_path: PathBuf,
    /// Key of the selector list inside the store
    pub store_key: String,
    /// Passive-path selector when the store has no entry
    pub default_selector: String,
    /// Locations that prune themselves on the passive path
    pub passive_prefixes: Vec<String>,
    pub schedule: ScheduleConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            store_key: SELECTORS_KEY.to_string(),
            default_selector: DEFAULT_SELECTOR.to_string(),
            passive_prefixes: DEFAULT_PASSIVE_PREFIXES.iter().map(|p| p.to_string()).collect(),
            schedule: ScheduleConfig::default(),
        }
    }
}

fn default_store_path() -> PathBuf {
    global_config_dir()
        .map(|dir| dir.join("selectors.json"))
        .unwrap_or_else(|| PathBuf::from("~/.config/domprune/selectors.json"))
}

/// Get the XDG config directory for domprune.
pub fn global_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "domprune").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the global config file.
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("domprune.toml"))
}

/// Get the path to the local config file in `dir`.
pub fn local_config_path(dir: &Path) -> PathBuf {
    dir.join(".domprune.toml")
}

/// Load a TOML file into RawSettings for manual merging.
fn load_raw_settings(path: &Path) -> Result<RawSettings, ApplicationError> {
    let content = std::fs::read_to_string(path).map_err(|e| ApplicationError::Config {
        message: format!("read {}: {}", path.display(), e),
    })?;
    toml::from_str(&content).map_err(|e| ApplicationError::Config {
        message: format!("parse {}: {}", path.display(), e),
    })
}

fn expand(raw: &str) -> String {
    shellexpand::full(raw)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

impl Settings {
    /// The schedule the scheduler runs with.
    pub fn schedule(&self) -> Schedule {
        Schedule::from(&self.schedule)
    }

    /// Expand `~`, `$VAR` and `${VAR}` in path-like fields.
    fn expand_paths(&mut self) {
        let expanded = expand(self.store_path.to_string_lossy().as_ref());
        self.store_path = PathBuf::from(expanded);
    }

    /// Overlay wins where specified; arrays replace.
    fn merge_with(&self, overlay: &RawSettings) -> Self {
        Self {
            store_path: overlay
                .store_path
                .clone()
                .unwrap_or_else(|| self.store_path.clone()),
            store_key: overlay
                .store_key
                .clone()
                .unwrap_or_else(|| self.store_key.clone()),
            default_selector: overlay
                .default_selector
                .clone()
                .unwrap_or_else(|| self.default_selector.clone()),
            passive_prefixes: overlay
                .passive_prefixes
                .clone()
                .unwrap_or_else(|| self.passive_prefixes.clone()),
            schedule: self.schedule.merge(&overlay.schedule),
        }
    }

    /// Load settings with layered precedence.
    ///
    /// # Arguments
    /// * `local_dir` - Optional directory holding a `.domprune.toml`
    ///
    /// # Precedence (lowest to highest)
    /// 1. Compiled defaults
    /// 2. Global config: `$XDG_CONFIG_HOME/domprune/domprune.toml`
    /// 3. Local config: `<local_dir>/.domprune.toml`
    /// 4. Environment variables: `DOMPRUNE_*` prefix
    ///
    /// Arrays replace at every layer.
    pub fn load(local_dir: Option<&Path>) -> Result<Self, ApplicationError> {
        Self::load_layers(global_config_path().as_deref(), local_dir, ENV_PREFIX)
    }

    fn load_layers(
        global: Option<&Path>,
        local_dir: Option<&Path>,
        env_prefix: &str,
    ) -> Result<Self, ApplicationError> {
        let mut current = Self::default();

        if let Some(global_path) = global {
            if global_path.exists() {
                current = current.merge_with(&load_raw_settings(global_path)?);
            }
        }

        if let Some(dir) = local_dir {
            let local_path = local_config_path(dir);
            if local_path.exists() {
                current = current.merge_with(&load_raw_settings(&local_path)?);
            }
        }

        current = Self::apply_env_overrides(current, env_prefix)?;
        current.expand_paths();
        current.validate()?;

        Ok(current)
    }

    /// Intervals that drive timers must be positive.
    fn validate(&self) -> Result<(), ApplicationError> {
        let intervals = [
            ("schedule.throttle_ms", self.schedule.throttle_ms),
            ("schedule.blank_poll_ms", self.schedule.blank_poll_ms),
        ];
        match intervals.iter().find(|(_, ms)| *ms == 0) {
            Some((key, _)) => Err(ApplicationError::Config {
                message: format!("{key} must be greater than 0"),
            }),
            None => Ok(()),
        }
    }

    /// Apply `<prefix>_*` environment variables as explicit overrides.
    fn apply_env_overrides(mut settings: Self, prefix: &str) -> Result<Self, ApplicationError> {
        let builder = Config::builder().add_source(
            Environment::with_prefix(prefix)
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("passive_prefixes")
                .with_list_parse_key("schedule.retry_delays_ms")
                .try_parsing(true),
        );

        let config = builder.build().map_err(config_err)?;

        if let Ok(val) = config.get_string("store_path") {
            settings.store_path = PathBuf::from(val);
        }
        if let Ok(val) = config.get_string("store_key") {
            settings.store_key = val;
        }
        if let Ok(val) = config.get_string("default_selector") {
            settings.default_selector = val;
        }
        if let Ok(val) = config.get::<Vec<String>>("passive_prefixes") {
            settings.passive_prefixes = val;
        }
        if let Ok(val) = config.get::<Vec<u64>>("schedule.retry_delays_ms") {
            settings.schedule.retry_delays_ms = val;
        }
        if let Ok(val) = config.get::<u64>("schedule.throttle_ms") {
            settings.schedule.throttle_ms = val;
        }
        if let Ok(val) = config.get::<u64>("schedule.main_window_ms") {
            settings.schedule.main_window_ms = val;
        }
        if let Ok(val) = config.get::<u64>("schedule.nested_window_ms") {
            settings.schedule.nested_window_ms = val;
        }
        if let Ok(val) = config.get::<u64>("schedule.blank_poll_ms") {
            settings.schedule.blank_poll_ms = val;
        }

        Ok(settings)
    }

    /// Show the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ApplicationError> {
        toml::to_string_pretty(self).map_err(|e| ApplicationError::Config {
            message: format!("serialize config: {e}"),
        })
    }

    /// Generate a template config file.
    pub fn template() -> String {
        r#"# domprune configuration
#
# Locations (by precedence, lowest to highest):
#   Global: ~/.config/domprune/domprune.toml
#   Local:  <dir>/.domprune.toml
#   Env:    DOMPRUNE_* environment variables (e.g. DOMPRUNE_SCHEDULE__THROTTLE_MS)
#
# Arrays given in a higher layer replace the lower layer's array.

# JSON file holding {"selectors": [...]}
# store_path = "~/.config/domprune/selectors.json"
# store_key = "selectors"

# Passive path: selector used when the store has no entry
# default_selector = ".sc-gzOgki.ksYuOU"
# passive_prefixes = ["chrome-extension://"]

[schedule]
# Full passes re-issued this long after session start
# retry_delays_ms = [500, 1000, 2000, 3000, 5000, 7000, 10000]

# Minimum spacing of mutation-driven re-runs per document
# throttle_ms = 500

# Observation windows for documents reached from the main document / a frame
# main_window_ms = 30000
# nested_window_ms = 10000

# Poll interval for about:blank documents
# blank_poll_ms = 2000
"#
        .to_string()
    }
}

fn config_err(e: ConfigError) -> ApplicationError {
    ApplicationError::Config {
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const NO_ENV: &str = "DOMPRUNE_UNIT_TEST_UNSET";

    #[test]
    fn given_no_config_when_loading_then_uses_defaults() {
        let settings = Settings::load_layers(None, None, NO_ENV).expect("load defaults");

        assert_eq!(settings.store_key, "selectors");
        assert_eq!(settings.default_selector, DEFAULT_SELECTOR);
        assert_eq!(settings.passive_prefixes, vec!["chrome-extension://".to_string()]);
        assert_eq!(settings.schedule(), Schedule::default());
    }

    #[test]
    fn given_global_and_local_when_loading_then_local_wins_and_arrays_replace() {
        let global_dir = TempDir::new().unwrap();
        let global = global_dir.path().join("domprune.toml");
        std::fs::write(
            &global,
            "store_key = \"global\"\n[schedule]\nthrottle_ms = 250\nretry_delays_ms = [100, 200]\n",
        )
        .unwrap();
        let local_dir = TempDir::new().unwrap();
        std::fs::write(
            local_config_path(local_dir.path()),
            "[schedule]\nretry_delays_ms = [50]\n",
        )
        .unwrap();

        let settings =
            Settings::load_layers(Some(&global), Some(local_dir.path()), NO_ENV).unwrap();

        assert_eq!(settings.store_key, "global");
        assert_eq!(settings.schedule.throttle_ms, 250);
        assert_eq!(settings.schedule.retry_delays_ms, vec![50]);
        assert_eq!(settings.schedule.main_window_ms, 30_000);
    }

    #[test]
    fn given_env_override_when_loading_then_env_wins() {
        let prefix = "DOMPRUNE_UNIT_TEST_ENV";
        std::env::set_var(format!("{prefix}_STORE_KEY"), "from-env");
        std::env::set_var(format!("{prefix}_SCHEDULE__BLANK_POLL_MS"), "750");

        let settings = Settings::load_layers(None, None, prefix).unwrap();

        assert_eq!(settings.store_key, "from-env");
        assert_eq!(settings.schedule.blank_poll_ms, 750);
    }

    #[test]
    fn given_zero_poll_interval_from_env_when_loading_then_returns_config_error() {
        let prefix = "DOMPRUNE_UNIT_TEST_ZERO";
        std::env::set_var(format!("{prefix}_SCHEDULE__BLANK_POLL_MS"), "0");

        let result = Settings::load_layers(None, None, prefix);

        assert!(matches!(
            result,
            Err(ApplicationError::Config { message }) if message.contains("blank_poll_ms")
        ));
    }

    #[test]
    fn given_tilde_in_store_path_when_expand_paths_then_expands_to_home() {
        let mut settings = Settings {
            store_path: PathBuf::from("~/selectors.json"),
            ..Default::default()
        };

        settings.expand_paths();

        let home = std::env::var("HOME").expect("HOME should be set");
        assert!(settings.store_path.to_string_lossy().starts_with(&home));
    }

    #[test]
    fn given_malformed_local_config_when_loading_then_returns_config_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(local_config_path(dir.path()), "store_key = [").unwrap();

        let result = Settings::load_layers(None, Some(dir.path()), NO_ENV);

        assert!(matches!(result, Err(ApplicationError::Config { .. })));
    }

    #[test]
    fn given_settings_when_rendered_then_template_and_toml_parse() {
        let rendered = Settings::default().to_toml().unwrap();
        let back: Settings = toml::from_str(&rendered).unwrap();
        assert_eq!(back, Settings::default());

        let template: RawSettings = toml::from_str(&Settings::template()).unwrap();
        assert!(template.store_key.is_none());
    }
}
