//! Configuration file loading and validation.
//!
//! Target options mirror the agent options the poller grew out of, so they
//! are stringly typed on disk (`limit = "10"`, `debug = "false"`).  Plain
//! TOML integers and booleans are accepted as well and normalized to
//! strings before validation.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};

use crate::bsky::{Secret, DEFAULT_REQUEST_TIMEOUT, DEFAULT_SERVICE_URL};

pub const DEFAULT_CONFIG_PATH: &str = "bsky-authorfeed.toml";

/// Fallback for targets that leave `app_password` out of the file.
pub const APP_PASSWORD_ENV: &str = "BSKY_APP_PASSWORD";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_service_url")]
    pub service_url: String,
    /// Directory holding one stored snapshot per target.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    /// Upper bound on each upstream request.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default, rename = "target")]
    pub targets: Vec<TargetConfig>,
}

/// One `[[target]]` table, as written.
#[derive(Debug, Deserialize, Clone)]
pub struct TargetConfig {
    /// Handle whose author feed is polled.
    #[serde(default, deserialize_with = "scalar")]
    pub user: String,
    /// Operator's own handle, used to log in.
    #[serde(default, deserialize_with = "scalar")]
    pub handle: String,
    #[serde(default)]
    pub app_password: Option<Secret>,
    #[serde(default = "default_limit", deserialize_with = "scalar")]
    pub limit: String,
    #[serde(default = "default_debug", deserialize_with = "scalar")]
    pub debug: String,
    #[serde(default = "default_period", deserialize_with = "scalar")]
    pub expected_receive_period_in_days: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

fn default_service_url() -> String { DEFAULT_SERVICE_URL.to_string() }
fn default_state_dir() -> PathBuf { PathBuf::from("state") }
fn default_request_timeout() -> u64 { DEFAULT_REQUEST_TIMEOUT.as_secs() }
fn default_limit() -> String { "10".to_string() }
fn default_debug() -> String { "false".to_string() }
fn default_period() -> String { "2".to_string() }
fn default_poll_interval() -> u64 { 3600 }

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Str(String),
    Int(i64),
    Bool(bool),
}

fn scalar<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Scalar::deserialize(deserializer)? {
        Scalar::Str(s) => s,
        Scalar::Int(i) => i.to_string(),
        Scalar::Bool(b) => b.to_string(),
    })
}

/// A validated target, ready to poll.
#[derive(Debug, Clone)]
pub struct Target {
    pub user: String,
    pub handle: String,
    pub app_password: Secret,
    pub limit: u32,
    pub debug: bool,
    pub expected_receive_period_in_days: u32,
    pub poll_interval: Duration,
}

impl Target {
    /// Key under which this target's snapshot is stored.
    pub fn key(&self) -> &str {
        &self.user
    }
}

fn parse_positive(value: &str) -> Option<u32> {
    value.trim().parse::<u32>().ok().filter(|n| *n > 0)
}

/// Only the exact strings `true` and `false` are accepted.
fn parse_bool(value: &str) -> Option<bool> {
    match value.trim() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config TOML")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Validate every target, falling back to `$BSKY_APP_PASSWORD` for
    /// missing passwords.
    pub fn resolve_targets(&self) -> Result<Vec<Target>> {
        let env_password = std::env::var(APP_PASSWORD_ENV).ok().map(Secret::new);
        self.resolve_targets_with(env_password)
    }

    /// Like [`Config::resolve_targets`] but with the password fallback passed in.
    ///
    /// All problems are collected and reported together.
    pub fn resolve_targets_with(&self, fallback_password: Option<Secret>) -> Result<Vec<Target>> {
        let mut errors: Vec<String> = Vec::new();
        let mut targets = Vec::new();
        let mut seen_users = HashSet::new();

        if self.targets.is_empty() {
            errors.push("at least one [[target]] is required".to_string());
        }
        if self.request_timeout_secs == 0 {
            errors.push("request_timeout_secs must be greater than zero".to_string());
        }

        for (i, raw) in self.targets.iter().enumerate() {
            let label = if raw.user.trim().is_empty() {
                format!("target #{}", i + 1)
            } else {
                format!("target {:?}", raw.user.trim())
            };
            let before = errors.len();

            if raw.user.trim().is_empty() {
                errors.push(format!("{label}: user is a required field"));
            } else if !seen_users.insert(raw.user.trim().to_string()) {
                errors.push(format!("{label}: user is configured more than once"));
            }

            let password = raw
                .app_password
                .clone()
                .filter(|p| !p.is_empty())
                .or_else(|| fallback_password.clone().filter(|p| !p.is_empty()));
            if password.is_none() {
                errors.push(format!("{label}: app_password is a required field"));
            }

            if raw.handle.trim().is_empty() {
                errors.push(format!("{label}: handle is a required field"));
            }

            let limit = if raw.limit.trim().is_empty() {
                errors.push(format!("{label}: limit is a required field"));
                None
            } else {
                let parsed = parse_positive(&raw.limit);
                if parsed.is_none() {
                    errors.push(format!("{label}: limit must be a positive integer"));
                }
                parsed
            };

            let debug = parse_bool(&raw.debug);
            if debug.is_none() {
                errors.push(format!("{label}: if provided, debug must be true or false"));
            }

            let period = parse_positive(&raw.expected_receive_period_in_days);
            if period.is_none() {
                errors.push(format!(
                    "{label}: please provide 'expected_receive_period_in_days' to indicate how many \
                     days can pass before this target is considered to be not working"
                ));
            }

            if raw.poll_interval_secs == 0 {
                errors.push(format!("{label}: poll_interval_secs must be greater than zero"));
            }

            if errors.len() != before {
                continue;
            }
            if let (Some(app_password), Some(limit), Some(debug), Some(period)) =
                (password, limit, debug, period)
            {
                targets.push(Target {
                    user: raw.user.trim().to_string(),
                    handle: raw.handle.trim().to_string(),
                    app_password,
                    limit,
                    debug,
                    expected_receive_period_in_days: period,
                    poll_interval: Duration::from_secs(raw.poll_interval_secs),
                });
            }
        }

        if !errors.is_empty() {
            anyhow::bail!("invalid configuration:\n  - {}", errors.join("\n  - "));
        }
        Ok(targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [[target]]
        user = "alice.bsky.social"
        handle = "me.bsky.social"
        app_password = "aaaa-bbbb-cccc-dddd"
    "#;

    #[test]
    fn minimal_target_gets_defaults() {
        let config = Config::from_toml(MINIMAL).unwrap();
        assert_eq!(config.service_url, "https://bsky.social");
        assert_eq!(config.state_dir, PathBuf::from("state"));
        assert_eq!(config.request_timeout(), Duration::from_secs(30));

        let targets = config.resolve_targets_with(None).unwrap();
        assert_eq!(targets.len(), 1);
        let t = &targets[0];
        assert_eq!(t.key(), "alice.bsky.social");
        assert_eq!(t.limit, 10);
        assert!(!t.debug);
        assert_eq!(t.expected_receive_period_in_days, 2);
        assert_eq!(t.poll_interval, Duration::from_secs(3600));
    }

    #[test]
    fn scalars_accept_strings_numbers_and_booleans() {
        let config = Config::from_toml(
            r#"
            service_url = "http://localhost:2583"
            [[target]]
            user = "alice.bsky.social"
            handle = "me.bsky.social"
            app_password = "pw"
            limit = 25
            debug = true
            expected_receive_period_in_days = "7"
            poll_interval_secs = 60
            "#,
        )
        .unwrap();

        let t = &config.resolve_targets_with(None).unwrap()[0];
        assert_eq!(t.limit, 25);
        assert!(t.debug);
        assert_eq!(t.expected_receive_period_in_days, 7);
        assert_eq!(t.poll_interval, Duration::from_secs(60));
    }

    #[test]
    fn password_falls_back_to_environment_value() {
        let config = Config::from_toml(
            r#"
            [[target]]
            user = "alice.bsky.social"
            handle = "me.bsky.social"
            "#,
        )
        .unwrap();

        assert!(config.resolve_targets_with(None).is_err());
        let t = &config.resolve_targets_with(Some(Secret::new("from-env"))).unwrap()[0];
        assert_eq!(t.app_password.expose(), "from-env");
    }

    #[test]
    fn validation_reports_every_problem() {
        let config = Config::from_toml(
            r#"
            [[target]]
            limit = "0"
            debug = "maybe"
            expected_receive_period_in_days = "-1"
            "#,
        )
        .unwrap();

        let msg = config.resolve_targets_with(None).unwrap_err().to_string();
        assert!(msg.contains("user is a required field"), "{msg}");
        assert!(msg.contains("handle is a required field"), "{msg}");
        assert!(msg.contains("app_password is a required field"), "{msg}");
        assert!(msg.contains("limit must be a positive integer"), "{msg}");
        assert!(msg.contains("debug must be true or false"), "{msg}");
        assert!(msg.contains("expected_receive_period_in_days"), "{msg}");
    }

    #[test]
    fn empty_limit_is_required_error() {
        let config = Config::from_toml(&format!("{MINIMAL}\nlimit = \"\"\n")).unwrap();
        let msg = config.resolve_targets_with(None).unwrap_err().to_string();
        assert!(msg.contains("limit is a required field"), "{msg}");
    }

    #[test]
    fn debug_must_be_exactly_true_or_false() {
        for value in ["TRUE", "True", "yes", "1"] {
            let config =
                Config::from_toml(&format!("{MINIMAL}\ndebug = \"{value}\"\n")).unwrap();
            let msg = config.resolve_targets_with(None).unwrap_err().to_string();
            assert!(msg.contains("debug must be true or false"), "{value}: {msg}");
        }
        let config = Config::from_toml(&format!("{MINIMAL}\ndebug = \"true\"\n")).unwrap();
        assert!(config.resolve_targets_with(None).unwrap()[0].debug);
    }

    #[test]
    fn zero_request_timeout_is_rejected() {
        let config =
            Config::from_toml(&format!("request_timeout_secs = 0\n{MINIMAL}")).unwrap();
        let msg = config.resolve_targets_with(None).unwrap_err().to_string();
        assert!(msg.contains("request_timeout_secs"), "{msg}");
    }

    #[test]
    fn duplicate_users_are_rejected() {
        let config = Config::from_toml(&format!("{MINIMAL}\n{MINIMAL}")).unwrap();
        let msg = config.resolve_targets_with(None).unwrap_err().to_string();
        assert!(msg.contains("configured more than once"), "{msg}");
    }

    #[test]
    fn no_targets_is_an_error() {
        let config = Config::from_toml("state_dir = \"/tmp/x\"").unwrap();
        assert!(config.resolve_targets_with(None).is_err());
    }

    #[test]
    fn password_is_not_printed_by_debug() {
        let config = Config::from_toml(MINIMAL).unwrap();
        assert!(!format!("{config:?}").contains("aaaa-bbbb"));
    }
}
