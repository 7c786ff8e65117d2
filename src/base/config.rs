//! Load configuration via `config` crate with env-override support.

use std::{ops::Deref, sync::Arc, time::Duration};

use serde::Deserialize;

use super::types::Res;

/// Default database endpoint (in-memory).
fn default_db_endpoint() -> String {
    "mem://".to_string()
}

/// Default database namespace.
fn default_db_namespace() -> String {
    "highlight".to_string()
}

/// Default database name.
fn default_db_database() -> String {
    "bot".to_string()
}

/// Default number of seconds a user stays "recently spoken" in a channel.
fn default_last_spoken_cutoff_secs() -> u64 {
    10
}

/// Default number of seconds to wait for follow-up messages before notifying.
fn default_settle_window_secs() -> u64 {
    9
}

/// Default number of context messages before the triggering message.
fn default_context_before() -> usize {
    4
}

/// Default number of context messages after the triggering message.
fn default_context_after() -> usize {
    3
}

/// Default per-user, per-workspace highlight quota.
fn default_max_highlights() -> usize {
    10
}

/// Default maximum highlight length, in characters.
fn default_max_highlight_length() -> usize {
    100
}

/// Configuration for the highlight-bot application.
#[derive(Debug, Clone)]
pub struct Config {
    pub inner: Arc<ConfigInner>,
}

impl Deref for Config {
    type Target = ConfigInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl From<ConfigInner> for Config {
    fn from(inner: ConfigInner) -> Self {
        Self { inner: Arc::new(inner) }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConfigInner {
    /// Slack app token (`SLACK_APP_TOKEN`).
    #[serde(default)]
    pub slack_app_token: String,
    /// Slack bot token (`SLACK_BOT_TOKEN`).
    #[serde(default)]
    pub slack_bot_token: String,
    /// Database endpoint URL (`DB_ENDPOINT`), e.g. `mem://` or `ws://localhost:8000`.
    #[serde(default = "default_db_endpoint")]
    pub db_endpoint: String,
    /// Database username (`DB_USERNAME`).
    #[serde(default)]
    pub db_username: String,
    /// Database password (`DB_PASSWORD`).
    #[serde(default)]
    pub db_password: String,
    /// Database namespace (`DB_NAMESPACE`).
    #[serde(default = "default_db_namespace")]
    pub db_namespace: String,
    /// Database name (`DB_DATABASE`).
    #[serde(default = "default_db_database")]
    pub db_database: String,
    /// Seconds after speaking during which a user is not highlighted in that channel (`LAST_SPOKEN_CUTOFF_SECS`).
    #[serde(default = "default_last_spoken_cutoff_secs")]
    pub last_spoken_cutoff_secs: u64,
    /// Seconds after a triggering message before the notification is sent (`SETTLE_WINDOW_SECS`).
    #[serde(default = "default_settle_window_secs")]
    pub settle_window_secs: u64,
    /// Context messages shown before the triggering message (`CONTEXT_BEFORE`).
    #[serde(default = "default_context_before")]
    pub context_before: usize,
    /// Context messages shown after the triggering message (`CONTEXT_AFTER`).
    #[serde(default = "default_context_after")]
    pub context_after: usize,
    /// Highlights a user may register per workspace (`MAX_HIGHLIGHTS`).
    #[serde(default = "default_max_highlights")]
    pub max_highlights: usize,
    /// Maximum length of a single highlight (`MAX_HIGHLIGHT_LENGTH`).
    #[serde(default = "default_max_highlight_length")]
    pub max_highlight_length: usize,
}

impl Default for ConfigInner {
    fn default() -> Self {
        Self {
            slack_app_token: String::new(),
            slack_bot_token: String::new(),
            db_endpoint: default_db_endpoint(),
            db_username: String::new(),
            db_password: String::new(),
            db_namespace: default_db_namespace(),
            db_database: default_db_database(),
            last_spoken_cutoff_secs: default_last_spoken_cutoff_secs(),
            settle_window_secs: default_settle_window_secs(),
            context_before: default_context_before(),
            context_after: default_context_after(),
            max_highlights: default_max_highlights(),
            max_highlight_length: default_max_highlight_length(),
        }
    }
}

impl ConfigInner {
    /// The "recently spoken" window.
    pub fn last_spoken_cutoff(&self) -> Duration {
        Duration::from_secs(self.last_spoken_cutoff_secs)
    }

    /// The notification settle window.
    pub fn settle_window(&self) -> Duration {
        Duration::from_secs(self.settle_window_secs)
    }

    /// Check the tunables for sane ranges.
    pub fn validate(&self) -> Res<()> {
        if !(1..=300).contains(&self.last_spoken_cutoff_secs) {
            return Err(anyhow::anyhow!("Last spoken cutoff must be between 1 and 300 seconds."));
        }

        if !(1..=300).contains(&self.settle_window_secs) {
            return Err(anyhow::anyhow!("Settle window must be between 1 and 300 seconds."));
        }

        if self.context_before > 50 || self.context_after > 50 {
            return Err(anyhow::anyhow!("Context window must be at most 50 messages on either side."));
        }

        if self.max_highlights < 1 {
            return Err(anyhow::anyhow!("Max highlights must be at least 1."));
        }

        if self.max_highlight_length < 1 {
            return Err(anyhow::anyhow!("Max highlight length must be at least 1."));
        }

        Ok(())
    }
}

impl Config {
    pub fn load(explicit_path: Option<&std::path::Path>) -> Res<Self> {
        let mut cfg = config::Config::builder();

        if let Some(p) = explicit_path {
            cfg = cfg.add_source(config::File::from(p.to_path_buf()));
        } else if std::path::Path::new(".hidden/config.toml").exists() {
            cfg = cfg.add_source(config::File::with_name(".hidden/config.toml"));
        }

        // Later sources win, so the environment overrides the file.
        cfg = cfg.add_source(config::Environment::default().prefix("HIGHLIGHT_BOT"));

        let result = Config {
            inner: Arc::new(cfg.build()?.try_deserialize()?),
        };

        result.validate()?;

        if result.slack_app_token.is_empty() || result.slack_bot_token.is_empty() {
            return Err(anyhow::anyhow!("Slack app and bot tokens must be set."));
        }

        Ok(result)
    }
}

// Tests.

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ConfigInner::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.last_spoken_cutoff(), Duration::from_secs(10));
        assert_eq!(config.settle_window(), Duration::from_secs(9));
        assert_eq!(config.context_before + config.context_after + 1, 8);
    }

    #[test]
    fn test_validate_rejects_zero_windows() {
        let config = ConfigInner {
            settle_window_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ConfigInner {
            last_spoken_cutoff_secs: 301,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_large_context() {
        let config = ConfigInner {
            context_after: 51,
            ..Default::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("highlight-bot-config-{}.toml", std::process::id()));
        std::fs::write(&path, "slack_app_token = \"xapp-1\"\nslack_bot_token = \"xoxb-1\"\nsettle_window_secs = 5\n").unwrap();

        let config = Config::load(Some(&path));
        std::fs::remove_file(&path).unwrap();
        let config = config.unwrap();

        assert_eq!(config.slack_bot_token, "xoxb-1");
        assert_eq!(config.settle_window(), Duration::from_secs(5));
        assert_eq!(config.last_spoken_cutoff(), Duration::from_secs(10));
    }
}
