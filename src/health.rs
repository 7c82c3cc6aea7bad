//! Liveness tracking for one poll target.
//!
//! A target is "working" when it produced an event within the configured
//! number of days and no error has been logged since shortly before that
//! event.
//!
//! The timestamps are kept under `<state_dir>/health/` so a restart does
//! not forget when a quiet feed last produced something.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::Target;
use crate::store::{file_stem, io_err, write_atomic, StoreError};

/// Errors this close before the last event still count as recent.
const ERROR_GRACE_SECS: i64 = 120;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Health {
    pub last_event_at: Option<DateTime<Utc>>,
    pub last_error_at: Option<DateTime<Utc>>,
}

impl Health {
    pub fn record_event(&mut self, at: DateTime<Utc>) {
        self.last_event_at = Some(at);
    }

    pub fn record_error(&mut self, at: DateTime<Utc>) {
        self.last_error_at = Some(at);
    }

    pub fn event_within(&self, now: DateTime<Utc>, days: u32) -> bool {
        self.last_event_at
            .is_some_and(|at| at > now - Duration::days(i64::from(days)))
    }

    pub fn recent_errors(&self) -> bool {
        match (self.last_event_at, self.last_error_at) {
            (Some(event), Some(error)) => error > event - Duration::seconds(ERROR_GRACE_SECS),
            _ => false,
        }
    }

    pub fn is_working(&self, now: DateTime<Utc>, period_days: u32) -> bool {
        self.event_within(now, period_days) && !self.recent_errors()
    }
}

/// Health of every configured target.
///
/// Without a directory (dry runs) nothing is read or written.
pub struct HealthBook {
    dir: Option<PathBuf>,
    periods: HashMap<String, u32>,
    entries: HashMap<String, Health>,
}

impl HealthBook {
    /// Load the saved health of each target.  Unreadable files are logged
    /// and start from scratch.
    pub fn open(state_dir: Option<&Path>, targets: &[Target]) -> Self {
        let mut book = Self {
            dir: state_dir.map(|d| d.join("health")),
            periods: HashMap::new(),
            entries: HashMap::new(),
        };
        for target in targets {
            let user = target.key().to_string();
            let health = match book.load(&user) {
                Ok(h) => h,
                Err(e) => {
                    tracing::warn!(user = %user, error = %e, "ignoring saved health");
                    Health::default()
                }
            };
            book.periods.insert(user.clone(), target.expected_receive_period_in_days);
            book.entries.insert(user, health);
        }
        book
    }

    fn path_for(&self, user: &str) -> Option<PathBuf> {
        let dir = self.dir.as_ref()?;
        Some(dir.join(format!("{}.json", file_stem(user))))
    }

    fn load(&self, user: &str) -> Result<Health, StoreError> {
        let Some(path) = self.path_for(user) else {
            return Ok(Health::default());
        };
        match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content)
                .map_err(|source| StoreError::Corrupt { path, source }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Health::default()),
            Err(e) => Err(io_err(&path)(e)),
        }
    }

    fn save(&self, user: &str) -> Result<(), StoreError> {
        let (Some(path), Some(health)) = (self.path_for(user), self.entries.get(user)) else {
            return Ok(());
        };
        write_atomic(&path, &serde_json::to_vec_pretty(health)?)
    }

    pub fn get(&self, user: &str) -> Option<&Health> {
        self.entries.get(user)
    }

    /// In memory only; saved when the cycle finishes.
    pub fn record_event(&mut self, user: &str, at: DateTime<Utc>) {
        self.entries.entry(user.to_string()).or_default().record_event(at);
    }

    pub fn record_error(&mut self, user: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.entries.entry(user.to_string()).or_default().record_error(at);
        self.save(user)
    }

    /// Save `user`'s health and report whether it is working at `now`.
    pub fn finish_cycle(&mut self, user: &str, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let period = self.periods.get(user).copied().unwrap_or(2);
        let working = self
            .entries
            .entry(user.to_string())
            .or_default()
            .is_working(now, period);
        self.save(user)?;
        Ok(working)
    }
}
