use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

const MIN_POLL_PERIOD: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub api_base_url: String,
    #[serde(default)]
    pub listen: Option<String>,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_top_processes_limit")]
    pub top_processes_limit: u32,
    #[serde(default)]
    pub polling: PollingConfig,
}

/// Периоды опроса в формате humantime ("2s", "500ms", "1m").
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PollingConfig {
    #[serde(default = "default_quick")]
    pub quick: String,
    #[serde(default = "default_standard")]
    pub standard: String,
    #[serde(default = "default_slow")]
    pub slow: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPeriods {
    pub quick: Duration,
    pub standard: Duration,
    pub slow: Duration,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            quick: default_quick(),
            standard: default_standard(),
            slow: default_slow(),
        }
    }
}

impl Default for PollPeriods {
    fn default() -> Self {
        Self {
            quick: Duration::from_secs(2),
            standard: Duration::from_secs(5),
            slow: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("не удалось прочитать файл конфигурации {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("не удалось разобрать YAML в {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("ошибка валидации конфигурации: {0}")]
    Validation(String),
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let path_display = path_ref.display().to_string();
        let text = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_display.clone(),
            source,
        })?;

        let cfg: Config = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path_display,
            source,
        })?;

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let base = self.api_base_url.trim();
        if base.is_empty() {
            return Err(ConfigError::Validation(
                "поле api_base_url обязательно".to_string(),
            ));
        }
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(ConfigError::Validation(
                "api_base_url должен начинаться с http:// или https://".to_string(),
            ));
        }
        if let Some(listen) = &self.listen {
            if SocketAddr::from_str(listen).is_err() {
                return Err(ConfigError::Validation(
                    "поле listen должно быть корректным адресом host:port".to_string(),
                ));
            }
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "request_timeout_ms должен быть > 0".to_string(),
            ));
        }
        if !(1..=100).contains(&self.top_processes_limit) {
            return Err(ConfigError::Validation(
                "top_processes_limit должно быть в диапазоне 1..100".to_string(),
            ));
        }

        self.poll_periods()?;
        Ok(())
    }

    pub fn poll_periods(&self) -> Result<PollPeriods, ConfigError> {
        Ok(PollPeriods {
            quick: parse_period("polling.quick", &self.polling.quick)?,
            standard: parse_period("polling.standard", &self.polling.standard)?,
            slow: parse_period("polling.slow", &self.polling.slow)?,
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn example_yaml() -> &'static str {
        include_str!("../config.yaml.example")
    }
}

fn parse_period(field: &str, raw: &str) -> Result<Duration, ConfigError> {
    let period = humantime::parse_duration(raw.trim()).map_err(|err| {
        ConfigError::Validation(format!("{field}: некорректная длительность '{raw}': {err}"))
    })?;
    if period < MIN_POLL_PERIOD {
        return Err(ConfigError::Validation(format!(
            "{field} должно быть >= 100ms"
        )));
    }
    Ok(period)
}

const fn default_request_timeout_ms() -> u64 {
    5000
}

const fn default_top_processes_limit() -> u32 {
    10
}

fn default_quick() -> String {
    "2s".to_string()
}

fn default_standard() -> String {
    "5s".to_string()
}

fn default_slow() -> String {
    "10s".to_string()
}
