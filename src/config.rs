use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::limits::*;
use crate::model::SpaceTypeConfig;

pub const DEFAULT_CAPACITIES: &str =
    "coworking=4,private-office=3,domiciliation=1,meeting-room=1";

// ── Space catalog ────────────────────────────────────────────────

/// Capacity table keyed by space type. Loaded once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpaceCatalog {
    spaces: BTreeMap<String, SpaceTypeConfig>,
}

impl Default for SpaceCatalog {
    fn default() -> Self {
        // The literal is well-formed; see `default_catalog_parses`.
        Self::parse(DEFAULT_CAPACITIES).unwrap_or_else(|_| Self { spaces: BTreeMap::new() })
    }
}

impl SpaceCatalog {
    pub fn new(entries: impl IntoIterator<Item = SpaceTypeConfig>) -> Result<Self, ConfigError> {
        let mut spaces = BTreeMap::new();
        for entry in entries {
            if entry.key.is_empty() || entry.key.len() > MAX_SPACE_TYPE_LEN {
                return Err(ConfigError::InvalidSpaceType(entry.key));
            }
            if entry.max_capacity == 0 {
                return Err(ConfigError::ZeroCapacity(entry.key));
            }
            if spaces.contains_key(&entry.key) {
                return Err(ConfigError::DuplicateSpaceType(entry.key));
            }
            spaces.insert(entry.key.clone(), entry);
        }
        if spaces.is_empty() {
            return Err(ConfigError::EmptyCatalog);
        }
        if spaces.len() > MAX_SPACE_TYPES {
            return Err(ConfigError::TooManySpaceTypes(spaces.len()));
        }
        Ok(Self { spaces })
    }

    /// Parse `key=capacity` pairs separated by commas.
    pub fn parse(spec: &str) -> Result<Self, ConfigError> {
        let mut entries = Vec::new();
        for pair in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, cap) = pair
                .split_once('=')
                .ok_or_else(|| ConfigError::InvalidCapacityEntry(pair.to_string()))?;
            let max_capacity = cap
                .trim()
                .parse::<u32>()
                .map_err(|_| ConfigError::InvalidCapacityEntry(pair.to_string()))?;
            entries.push(SpaceTypeConfig {
                key: key.trim().to_string(),
                max_capacity,
            });
        }
        Self::new(entries)
    }

    pub fn get(&self, key: &str) -> Option<&SpaceTypeConfig> {
        self.spaces.get(key)
    }

    pub fn capacity(&self, key: &str) -> Option<u32> {
        self.spaces.get(key).map(|s| s.max_capacity)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SpaceTypeConfig> {
        self.spaces.values()
    }
}

// ── Scheduler config ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub interval_minutes: u32,
    pub creation_timeout_days: u32,
    pub expiration_window_hours: u32,
    pub completion_window_hours: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_minutes: 60,
            creation_timeout_days: 4,
            expiration_window_hours: 12,
            completion_window_hours: 12,
        }
    }
}

impl SchedulerConfig {
    /// Clamp out-of-range fields. Every adjustment is returned so the caller can surface it.
    pub fn clamped(mut self) -> (Self, Vec<ConfigOutOfRange>) {
        let mut notices = Vec::new();
        let mut clamp = |field: &'static str, value: &mut u32, min: u32, max: u32| {
            let applied = (*value).clamp(min, max);
            if applied != *value {
                notices.push(ConfigOutOfRange {
                    field,
                    requested: *value as u64,
                    applied: applied as u64,
                });
                *value = applied;
            }
        };
        clamp("interval_minutes", &mut self.interval_minutes, MIN_INTERVAL_MINUTES, MAX_INTERVAL_MINUTES);
        clamp("creation_timeout_days", &mut self.creation_timeout_days, 0, MAX_CREATION_TIMEOUT_DAYS);
        clamp("expiration_window_hours", &mut self.expiration_window_hours, 0, MAX_WINDOW_HOURS);
        clamp("completion_window_hours", &mut self.completion_window_hours, 0, MAX_WINDOW_HOURS);
        (self, notices)
    }

    pub fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.interval_minutes as u64 * 60)
    }

    pub fn creation_timeout(&self) -> chrono::Duration {
        chrono::Duration::days(self.creation_timeout_days as i64)
    }

    pub fn expiration_window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.expiration_window_hours as i64)
    }

    pub fn completion_window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.completion_window_hours as i64)
    }
}

/// A configuration value that was moved into its legal range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigOutOfRange {
    pub field: &'static str,
    pub requested: u64,
    pub applied: u64,
}

impl fmt::Display for ConfigOutOfRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} out of range: requested {}, clamped to {}",
            self.field, self.requested, self.applied
        )
    }
}

// ── Service config ───────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub max_connections: usize,
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
    pub catalog: SpaceCatalog,
    pub scheduler: SchedulerConfig,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; `from_env` passes the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let parsed = |key: &'static str| -> Result<Option<u64>, ConfigError> {
            match lookup(key) {
                None => Ok(None),
                Some(v) => v
                    .trim()
                    .parse::<u64>()
                    .map(Some)
                    .map_err(|_| ConfigError::InvalidNumber { key, value: v }),
            }
        };
        let narrow = |key: &'static str, v: u64, max: u64| -> Result<u64, ConfigError> {
            if v > max {
                Err(ConfigError::InvalidNumber { key, value: v.to_string() })
            } else {
                Ok(v)
            }
        };

        let port = match parsed("SPACEBOOK_PORT")? {
            Some(p) => narrow("SPACEBOOK_PORT", p, u16::MAX as u64)? as u16,
            None => 7878,
        };
        let metrics_port = match parsed("SPACEBOOK_METRICS_PORT")? {
            Some(p) => Some(narrow("SPACEBOOK_METRICS_PORT", p, u16::MAX as u64)? as u16),
            None => None,
        };
        let catalog = match lookup("SPACEBOOK_CAPACITIES") {
            Some(spec) => SpaceCatalog::parse(&spec)?,
            None => SpaceCatalog::parse(DEFAULT_CAPACITIES)?,
        };

        let defaults = SchedulerConfig::default();
        let enabled = match lookup("SPACEBOOK_SCHEDULER_ENABLED") {
            None => defaults.enabled,
            Some(v) => match v.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(ConfigError::InvalidBool {
                        key: "SPACEBOOK_SCHEDULER_ENABLED",
                        value: v,
                    });
                }
            },
        };
        let u32_or = |key: &'static str, default: u32| -> Result<u32, ConfigError> {
            match parsed(key)? {
                Some(v) => Ok(narrow(key, v, u32::MAX as u64)? as u32),
                None => Ok(default),
            }
        };
        let scheduler = SchedulerConfig {
            enabled,
            interval_minutes: u32_or("SPACEBOOK_SCHEDULER_INTERVAL_MINUTES", defaults.interval_minutes)?,
            creation_timeout_days: u32_or("SPACEBOOK_CREATION_TIMEOUT_DAYS", defaults.creation_timeout_days)?,
            expiration_window_hours: u32_or(
                "SPACEBOOK_EXPIRATION_WINDOW_HOURS",
                defaults.expiration_window_hours,
            )?,
            completion_window_hours: u32_or(
                "SPACEBOOK_COMPLETION_WINDOW_HOURS",
                defaults.completion_window_hours,
            )?,
        };

        Ok(Self {
            bind: lookup("SPACEBOOK_BIND").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            data_dir: PathBuf::from(lookup("SPACEBOOK_DATA_DIR").unwrap_or_else(|| "./data".into())),
            max_connections: parsed("SPACEBOOK_MAX_CONNECTIONS")?.map_or(256, |v| v as usize),
            compact_threshold: parsed("SPACEBOOK_COMPACT_THRESHOLD")?.unwrap_or(1000),
            metrics_port,
            catalog,
            scheduler,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidNumber { key: &'static str, value: String },
    InvalidBool { key: &'static str, value: String },
    InvalidCapacityEntry(String),
    InvalidSpaceType(String),
    DuplicateSpaceType(String),
    ZeroCapacity(String),
    TooManySpaceTypes(usize),
    EmptyCatalog,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidNumber { key, value } => {
                write!(f, "{key} must be a non-negative integer in range, got '{value}'")
            }
            ConfigError::InvalidBool { key, value } => {
                write!(f, "{key} must be true or false, got '{value}'")
            }
            ConfigError::InvalidCapacityEntry(entry) => {
                write!(f, "capacity entry '{entry}' must look like key=capacity")
            }
            ConfigError::InvalidSpaceType(key) => write!(f, "invalid space type key '{key}'"),
            ConfigError::DuplicateSpaceType(key) => write!(f, "space type '{key}' listed twice"),
            ConfigError::ZeroCapacity(key) => {
                write!(f, "space type '{key}' must have a positive capacity")
            }
            ConfigError::TooManySpaceTypes(n) => write!(f, "too many space types: {n}"),
            ConfigError::EmptyCatalog => write!(f, "no space types configured"),
        }
    }
}

impl std::error::Error for ConfigError {}
