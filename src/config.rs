use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::portal::retry::RetryPolicy;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing configuration: {0}")]
    MissingConfig(&'static str),
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

pub const DEFAULT_PROJUDI_BASE_URL: &str = "https://projudi.tjpr.jus.br";
pub const DEFAULT_EPROC_RS_BASE_URL: &str = "https://eproc1g.tjrs.jus.br/eproc";
pub const DEFAULT_EPROC_SC_BASE_URL: &str = "https://eproc1g.tjsc.jus.br/eproc";
pub const DEFAULT_CASE_COLUMN: &str = "PROCESSO";
pub const DEFAULT_TAG_COLUMN: &str = "BRADESCO";

/// Login and 2FA secret for one portal account.
#[derive(Clone)]
pub struct PortalCredentials {
    pub username: String,
    pub password: String,
    /// Base32 TOTP seed
    pub totp_secret: String,
}

impl std::fmt::Debug for PortalCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortalCredentials")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct PortalConfig {
    pub base_url: String,
    pub credentials: PortalCredentials,
}

/// Accounts and endpoints of every portal plus the captcha service key.
#[derive(Debug, Clone)]
pub struct PortalsConfig {
    pub projudi: PortalConfig,
    pub eproc_rs: PortalConfig,
    pub eproc_sc: PortalConfig,
    pub twocaptcha_api_key: String,
    pub login_retry: RetryPolicy,
}

/// Knobs of a batch run. Every value has a default.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchSettings {
    pub request_timeout: Duration,
    pub save_interval: usize,
    pub memory_check_interval: usize,
    pub memory_threshold_percent: f64,
    pub output_dir: PathBuf,
    pub case_column: String,
    pub tag_column: String,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(300),
            save_interval: 10,
            memory_check_interval: 10,
            memory_threshold_percent: 80.0,
            output_dir: PathBuf::from("."),
            case_column: DEFAULT_CASE_COLUMN.to_string(),
            tag_column: DEFAULT_TAG_COLUMN.to_string(),
        }
    }
}

impl BatchSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let timeout_secs = parsed(&lookup, "REQUEST_TIMEOUT_SECS", defaults.request_timeout.as_secs())?;
        let save_interval = parsed(&lookup, "SAVE_INTERVAL", defaults.save_interval)?;
        let memory_check_interval =
            parsed(&lookup, "MEMORY_CHECK_INTERVAL", defaults.memory_check_interval)?;
        let memory_threshold_percent = parsed(
            &lookup,
            "MEMORY_THRESHOLD_PERCENT",
            defaults.memory_threshold_percent,
        )?;

        if timeout_secs == 0 {
            return Err(invalid("REQUEST_TIMEOUT_SECS", timeout_secs));
        }
        if save_interval == 0 {
            return Err(invalid("SAVE_INTERVAL", save_interval));
        }
        if memory_check_interval == 0 {
            return Err(invalid("MEMORY_CHECK_INTERVAL", memory_check_interval));
        }
        if !(0.0..=100.0).contains(&memory_threshold_percent) {
            return Err(invalid("MEMORY_THRESHOLD_PERCENT", memory_threshold_percent));
        }

        Ok(Self {
            request_timeout: Duration::from_secs(timeout_secs),
            save_interval,
            memory_check_interval,
            memory_threshold_percent,
            output_dir: lookup("OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            ..defaults
        })
    }
}

impl PortalsConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let credentials = |user: &'static str, pass: &'static str, token: &'static str| {
            Ok::<_, ConfigError>(PortalCredentials {
                username: required(&lookup, user)?,
                password: required(&lookup, pass)?,
                totp_secret: required(&lookup, token)?,
            })
        };

        let projudi = PortalConfig {
            base_url: optional(&lookup, "PROJUDI_BASE_URL", DEFAULT_PROJUDI_BASE_URL),
            credentials: credentials("PROJUDI_USUARIO", "PROJUDI_SENHA", "PROJUDI_TOKEN_2FA")?,
        };
        let eproc_rs = PortalConfig {
            base_url: optional(&lookup, "EPROC_RS_BASE_URL", DEFAULT_EPROC_RS_BASE_URL),
            credentials: credentials("EPROC_RS_USUARIO", "EPROC_RS_SENHA", "EPROC_RS_TOKEN")?,
        };
        let eproc_sc = PortalConfig {
            base_url: optional(&lookup, "EPROC_SC_BASE_URL", DEFAULT_EPROC_SC_BASE_URL),
            credentials: credentials("EPROC_SC_USUARIO", "EPROC_SC_SENHA", "EPROC_SC_TOKEN")?,
        };

        let defaults = RetryPolicy::default();
        let login_retry = RetryPolicy::new(
            parsed(&lookup, "LOGIN_MAX_ATTEMPTS", defaults.max_attempts)?,
            Duration::from_secs(parsed(
                &lookup,
                "LOGIN_RETRY_DELAY_SECS",
                defaults.delay.as_secs(),
            )?),
        );

        Ok(Self {
            projudi,
            eproc_rs,
            eproc_sc,
            twocaptcha_api_key: required(&lookup, "TWOCAPTCHA_API_KEY")?,
            login_retry,
        })
    }
}

fn required<F>(lookup: &F, key: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::MissingConfig(key))
}

fn optional<F>(lookup: &F, key: &str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parsed<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key).map(|v| v.trim().to_string()) {
        None => Ok(default),
        Some(v) if v.is_empty() => Ok(default),
        Some(v) => v.parse().map_err(|_| ConfigError::InvalidValue { key, value: v }),
    }
}

fn invalid(key: &'static str, value: impl ToString) -> ConfigError {
    ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const PORTAL_VARS: [(&str, &str); 10] = [
        ("PROJUDI_USUARIO", "adv"),
        ("PROJUDI_SENHA", "s3nha"),
        ("PROJUDI_TOKEN_2FA", "GEZDGNBV"),
        ("EPROC_RS_USUARIO", "rs_user"),
        ("EPROC_RS_SENHA", "rs_pass"),
        ("EPROC_RS_TOKEN", "GEZDGNBV"),
        ("EPROC_SC_USUARIO", "sc_user"),
        ("EPROC_SC_SENHA", "sc_pass"),
        ("EPROC_SC_TOKEN", "GEZDGNBV"),
        ("TWOCAPTCHA_API_KEY", "key"),
    ];

    #[test]
    fn test_batch_defaults() {
        let settings = BatchSettings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(settings, BatchSettings::default());
        assert_eq!(settings.request_timeout, Duration::from_secs(300));
        assert_eq!(settings.save_interval, 10);
    }

    #[test]
    fn test_batch_overrides() {
        let settings = BatchSettings::from_lookup(lookup(&[
            ("REQUEST_TIMEOUT_SECS", "60"),
            ("SAVE_INTERVAL", "25"),
            ("MEMORY_THRESHOLD_PERCENT", "72.5"),
            ("OUTPUT_DIR", "/tmp/saida"),
        ]))
        .unwrap();
        assert_eq!(settings.request_timeout, Duration::from_secs(60));
        assert_eq!(settings.save_interval, 25);
        assert_eq!(settings.memory_threshold_percent, 72.5);
        assert_eq!(settings.output_dir, PathBuf::from("/tmp/saida"));
    }

    #[test]
    fn test_batch_rejects_bad_values() {
        let err = BatchSettings::from_lookup(lookup(&[("SAVE_INTERVAL", "dez")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidValue {
                key: "SAVE_INTERVAL",
                value: "dez".to_string()
            }
        );
        assert!(BatchSettings::from_lookup(lookup(&[("SAVE_INTERVAL", "0")])).is_err());
        assert!(BatchSettings::from_lookup(lookup(&[("MEMORY_THRESHOLD_PERCENT", "150")])).is_err());
    }

    #[test]
    fn test_portals_from_lookup() {
        let config = PortalsConfig::from_lookup(lookup(&PORTAL_VARS)).unwrap();
        assert_eq!(config.projudi.base_url, DEFAULT_PROJUDI_BASE_URL);
        assert_eq!(config.eproc_rs.credentials.username, "rs_user");
        assert_eq!(config.eproc_sc.base_url, DEFAULT_EPROC_SC_BASE_URL);
        assert_eq!(config.login_retry.max_attempts, 5);
        assert_eq!(config.login_retry.delay, Duration::from_secs(30));
    }

    #[test]
    fn test_missing_credential_is_reported() {
        let vars: Vec<(&str, &str)> = PORTAL_VARS
            .iter()
            .copied()
            .filter(|(k, _)| *k != "EPROC_SC_SENHA")
            .collect();
        let err = PortalsConfig::from_lookup(lookup(&vars)).unwrap_err();
        assert_eq!(err, ConfigError::MissingConfig("EPROC_SC_SENHA"));
    }

    #[test]
    fn test_debug_hides_secrets() {
        let config = PortalsConfig::from_lookup(lookup(&PORTAL_VARS)).unwrap();
        let rendered = format!("{:?}", config.projudi.credentials);
        assert!(rendered.contains("adv"));
        assert!(!rendered.contains("s3nha"));
    }
}
