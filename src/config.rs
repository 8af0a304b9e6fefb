#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

use crate::error::{Result, SessionError};
use crate::orchestrator_service::TurnSettings;
use crate::session::SessionSettings;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::warn;
use url::Url;

pub const DEFAULT_CONFIG_PATH: &str = ".ideaforge/config.toml";
pub const DEFAULT_DATABASE_URL: &str = "sqlite://.ideaforge/sessions.db";
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8787";
pub const DEFAULT_MODEL_NAME: &str = "ideaforge-default";

/// Values exactly as written in the config file, after `${VAR}` expansion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawConfig {
    pub database_url: Option<String>,
    pub bind_addr: Option<String>,
    pub model_endpoint: Option<String>,
    pub model_name: Option<String>,
    pub identity_endpoint: Option<String>,
    pub max_steps: Option<String>,
    pub command_queue_depth: Option<String>,
    pub event_buffer: Option<String>,
    pub unknown_keys: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub model_endpoint: Option<Url>,
    pub model_name: String,
    pub identity_endpoint: Option<Url>,
    pub max_steps: usize,
    pub command_queue_depth: usize,
    pub event_buffer: usize,
}

/// Loads the runtime configuration. A missing default config file yields the
/// defaults; a missing file named explicitly is an error.
///
/// # Errors
/// Returns a configuration error for unreadable files or invalid values.
pub async fn load_config(path: Option<PathBuf>) -> Result<RuntimeConfig> {
    let explicit = path.is_some();
    let config_path = path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    let raw = if config_path.exists() {
        let content = tokio::fs::read_to_string(&config_path)
            .await
            .map_err(|e| SessionError::ConfigError(format!("Failed to read config: {e}")))?;
        parse_config_content(&content)
    } else if explicit {
        return Err(SessionError::ConfigError(format!(
            "Config file not found: {}",
            config_path.display()
        )));
    } else {
        RawConfig::default()
    };

    for key in &raw.unknown_keys {
        warn!(key = %key, path = %config_path.display(), "Ignoring unknown config key");
    }

    RuntimeConfig::from_raw(raw, database_url_from_env())
}

/// Parses `key = "value"` lines; blank lines and `#` comments are skipped.
#[must_use]
pub fn parse_config_content(content: &str) -> RawConfig {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('['))
        .filter_map(|line| line.split_once('='))
        .fold(RawConfig::default(), |mut raw, (key, value)| {
            let key = key.trim();
            let value = expand_env_vars(value.trim().trim_matches('"'));
            let slot = match key {
                "database_url" => &mut raw.database_url,
                "bind_addr" => &mut raw.bind_addr,
                "model_endpoint" => &mut raw.model_endpoint,
                "model_name" => &mut raw.model_name,
                "identity_endpoint" => &mut raw.identity_endpoint,
                "max_steps" => &mut raw.max_steps,
                "command_queue_depth" => &mut raw.command_queue_depth,
                "event_buffer" => &mut raw.event_buffer,
                other => {
                    raw.unknown_keys.push(other.to_string());
                    return raw;
                }
            };
            *slot = Some(value);
            raw
        })
}

/// Replaces `${VAR}` and `${VAR:-default}` with the environment value.
#[must_use]
pub fn expand_env_vars(input: &str) -> String {
    let mut result = input.to_string();
    let mut cursor = 0;
    while let Some(offset) = result[cursor..].find("${") {
        let start = cursor + offset;
        let Some(end) = result[start..].find('}').map(|end| start + end) else {
            break;
        };
        let var_part = &result[start + 2..end];
        let (var_name, default) = var_part.split_once(":-").unwrap_or((var_part, ""));
        let value = non_empty_env_var(var_name).unwrap_or_else(|| default.to_string());
        result.replace_range(start..=end, &value);
        cursor = start + value.len();
    }
    result
}

fn non_empty_env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn database_url_from_env() -> Option<String> {
    non_empty_env_var("IDEAFORGE_DATABASE_URL").or_else(|| non_empty_env_var("DATABASE_URL"))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

fn parse_endpoint(key: &str, value: Option<String>) -> Result<Option<Url>> {
    non_blank(value)
        .map(|value| {
            Url::parse(&value)
                .map_err(|e| SessionError::ConfigError(format!("{key} `{value}` is not a URL: {e}")))
        })
        .transpose()
}

fn parse_count(key: &str, value: Option<String>, default: usize) -> Result<usize> {
    match non_blank(value) {
        None => Ok(default),
        Some(value) => match value.trim().parse::<usize>() {
            Ok(0) => Err(SessionError::ConfigError(format!("{key} must be at least 1"))),
            Ok(count) => Ok(count),
            Err(e) => Err(SessionError::ConfigError(format!(
                "{key} `{value}` is not a number: {e}"
            ))),
        },
    }
}

impl RuntimeConfig {
    /// Validates raw values. `env_database_url` wins over the file.
    ///
    /// # Errors
    /// Returns a configuration error naming the first invalid key.
    pub fn from_raw(raw: RawConfig, env_database_url: Option<String>) -> Result<Self> {
        let database_url = env_database_url
            .or_else(|| non_blank(raw.database_url))
            .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        let bind_text = non_blank(raw.bind_addr).unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_text.trim().parse::<SocketAddr>().map_err(|e| {
            SessionError::ConfigError(format!("bind_addr `{bind_text}` is invalid: {e}"))
        })?;

        let defaults = SessionSettings::default();
        Ok(Self {
            database_url,
            bind_addr,
            model_endpoint: parse_endpoint("model_endpoint", raw.model_endpoint)?,
            model_name: non_blank(raw.model_name).unwrap_or_else(|| DEFAULT_MODEL_NAME.to_string()),
            identity_endpoint: parse_endpoint("identity_endpoint", raw.identity_endpoint)?,
            max_steps: parse_count("max_steps", raw.max_steps, defaults.turn.max_steps)?,
            command_queue_depth: parse_count(
                "command_queue_depth",
                raw.command_queue_depth,
                defaults.command_queue_depth,
            )?,
            event_buffer: parse_count("event_buffer", raw.event_buffer, defaults.event_buffer)?,
        })
    }

    #[must_use]
    pub const fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            turn: TurnSettings {
                max_steps: self.max_steps,
            },
            command_queue_depth: self.command_queue_depth,
            event_buffer: self.event_buffer,
        }
    }

    /// Filesystem path of a `sqlite://` database, if it has one.
    #[must_use]
    pub fn sqlite_path(&self) -> Option<&Path> {
        self.database_url
            .strip_prefix("sqlite://")
            .map(|rest| rest.split('?').next().unwrap_or(rest))
            .filter(|path| !path.is_empty() && *path != ":memory:")
            .map(Path::new)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::{
        expand_env_vars, load_config, parse_config_content, RawConfig, RuntimeConfig,
        DEFAULT_DATABASE_URL,
    };
    use crate::error::SessionError;
    use std::io::Write;

    #[test]
    fn given_full_file_when_parsing_then_every_key_is_read() {
        let content = r#"# runtime
database_url = "sqlite://data/s.db"
bind_addr = "0.0.0.0:9000"
model_endpoint = "http://model.local/v1/stream"
model_name = "assessor"
identity_endpoint = "http://id.local/me"
max_steps = "4"
command_queue_depth = "8"
event_buffer = "32"
colour = "blue""#;
        let raw = parse_config_content(content);
        assert_eq!(raw.unknown_keys, vec!["colour".to_string()]);

        let config = RuntimeConfig::from_raw(raw, None).unwrap();
        assert_eq!(config.database_url, "sqlite://data/s.db");
        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.model_name, "assessor");
        assert_eq!(config.max_steps, 4);
        assert_eq!(config.session_settings().command_queue_depth, 8);
        assert_eq!(config.session_settings().turn.max_steps, 4);
        assert_eq!(config.event_buffer, 32);
        assert!(config.identity_endpoint.is_some());
    }

    #[test]
    fn given_env_database_url_when_resolving_then_env_wins_over_file() {
        let raw = parse_config_content("database_url = \"sqlite://file.db\"");
        let config =
            RuntimeConfig::from_raw(raw, Some("sqlite://env.db".to_string())).unwrap();
        assert_eq!(config.database_url, "sqlite://env.db");
    }

    #[test]
    fn given_nothing_when_resolving_then_defaults_apply() {
        let config = RuntimeConfig::from_raw(RawConfig::default(), None).unwrap();
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.max_steps, 8);
        assert!(config.model_endpoint.is_none());
        assert_eq!(
            config.sqlite_path().unwrap().to_str(),
            Some(".ideaforge/sessions.db")
        );
    }

    #[test]
    fn given_bad_number_when_resolving_then_config_error() {
        let raw = parse_config_content("max_steps = \"lots\"");
        let error = RuntimeConfig::from_raw(raw, None).unwrap_err();
        assert!(matches!(error, SessionError::ConfigError(ref msg) if msg.contains("max_steps")));

        let zero = parse_config_content("event_buffer = \"0\"");
        assert!(RuntimeConfig::from_raw(zero, None).is_err());
    }

    #[test]
    fn given_bad_endpoint_when_resolving_then_config_error() {
        let raw = parse_config_content("model_endpoint = \"not a url\"");
        assert!(matches!(
            RuntimeConfig::from_raw(raw, None),
            Err(SessionError::ConfigError(_))
        ));
    }

    #[test]
    fn given_unset_variable_when_expanding_then_default_is_used() {
        assert_eq!(
            expand_env_vars("sqlite://${IDEAFORGE_TEST_UNSET_DIR:-tmp}/s.db"),
            "sqlite://tmp/s.db"
        );
        assert_eq!(expand_env_vars("plain"), "plain");
        assert_eq!(expand_env_vars("${IDEAFORGE_TEST_UNSET_DIR}"), "");
        assert_eq!(expand_env_vars("broken ${open"), "broken ${open");
    }

    #[tokio::test]
    async fn given_config_file_when_loading_then_values_are_applied() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "bind_addr = \"127.0.0.1:7001\"").unwrap();
        writeln!(file, "max_steps = \"3\"").unwrap();
        let config = load_config(Some(file.path().to_path_buf())).await.unwrap();
        assert_eq!(config.bind_addr.port(), 7001);
        assert_eq!(config.max_steps, 3);
    }

    #[tokio::test]
    async fn given_missing_explicit_file_when_loading_then_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_config(Some(dir.path().join("absent.toml"))).await;
        assert!(matches!(result, Err(SessionError::ConfigError(_))));
    }
}
