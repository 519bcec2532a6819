use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use marathon_engine::DEFAULT_FREEZE_WINDOW_HOURS;
use marathon_types::RotationHour;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}={value:?} is invalid: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(var: &'static str, value: &str, reason: impl fmt::Display) -> Self {
        Self::Invalid {
            var,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Process configuration, read once at startup.
#[derive(Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    /// Chat bot credential. Held for the presentation layer only.
    pub telegram_token: Option<String>,
    pub freeze_window: chrono::Duration,
    pub default_rotation_hour: RotationHour,
    pub retry_attempts: usize,
    pub op_timeout: Duration,
    pub trigger_token: Option<String>,
    pub notify_webhook: Option<String>,
    pub scheduler: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build the configuration from `lookup`. Unset or blank variables take
    /// their defaults; malformed ones are errors.
    pub fn from_lookup<L>(lookup: L) -> Result<Self, ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let freeze_hours: i64 = parse(&get, "FREEZE_HOURS", DEFAULT_FREEZE_WINDOW_HOURS)?;
        if freeze_hours <= 0 {
            return Err(ConfigError::invalid(
                "FREEZE_HOURS",
                &freeze_hours.to_string(),
                "must be greater than zero",
            ));
        }

        let hour: u8 = parse(&get, "DEFAULT_ROTATION_HOUR", 0)?;
        let default_rotation_hour = RotationHour::new(hour)
            .map_err(|e| ConfigError::invalid("DEFAULT_ROTATION_HOUR", &hour.to_string(), e))?;

        let retry_attempts: usize = parse(&get, "MARATHON_RETRY_ATTEMPTS", 5)?;
        if retry_attempts == 0 {
            return Err(ConfigError::invalid(
                "MARATHON_RETRY_ATTEMPTS",
                "0",
                "at least one attempt is required",
            ));
        }

        let timeout_secs: u64 = parse(&get, "MARATHON_OP_TIMEOUT_SECS", 10)?;
        if timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "MARATHON_OP_TIMEOUT_SECS",
                "0",
                "must be greater than zero",
            ));
        }

        let scheduler = match get("MARATHON_SCHEDULER") {
            None => true,
            Some(v) => parse_bool(&v)
                .ok_or_else(|| ConfigError::invalid("MARATHON_SCHEDULER", &v, "expected a boolean"))?,
        };

        Ok(Self {
            db_path: get("MARATHON_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("marathon.db")),
            host: get("MARATHON_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse(&get, "MARATHON_PORT", 3000)?,
            telegram_token: get("TELEGRAM_TOKEN"),
            freeze_window: chrono::Duration::hours(freeze_hours),
            default_rotation_hour,
            retry_attempts,
            op_timeout: Duration::from_secs(timeout_secs),
            trigger_token: get("MARATHON_TRIGGER_TOKEN"),
            notify_webhook: get("MARATHON_NOTIFY_WEBHOOK"),
            scheduler,
        })
    }
}

fn parse<T, G>(get: &G, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(var) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| ConfigError::invalid(var, &raw, e)),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn redacted(secret: &Option<String>) -> &'static str {
    if secret.is_some() { "<redacted>" } else { "<unset>" }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("db_path", &self.db_path)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("telegram_token", &redacted(&self.telegram_token))
            .field("freeze_window_hours", &self.freeze_window.num_hours())
            .field("default_rotation_hour", &self.default_rotation_hour.get())
            .field("retry_attempts", &self.retry_attempts)
            .field("op_timeout", &self.op_timeout)
            .field("trigger_token", &redacted(&self.trigger_token))
            .field("notify_webhook", &self.notify_webhook)
            .field("scheduler", &self.scheduler)
            .finish()
    }
}
