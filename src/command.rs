use chrono::NaiveDate;
use serde::Deserialize;
use ulid::Ulid;

use crate::config::SchedulerConfig;
use crate::model::DateRange;
use crate::store::ReservationFilter;

/// One control request: a JSON object tagged by `op`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    CheckAvailability {
        space_type: String,
        start_date: NaiveDate,
        end_date: NaiveDate,
    },
    DailyOccupancy {
        space_type: String,
        start_date: NaiveDate,
        end_date: NaiveDate,
    },
    CreateReservation {
        space_type: String,
        start_date: NaiveDate,
        end_date: NaiveDate,
        /// Booked as Confirmed (e.g. paid on site) instead of Pending.
        #[serde(default)]
        confirmed: bool,
    },
    Confirm {
        id: Ulid,
    },
    Cancel {
        id: Ulid,
    },
    GetReservation {
        id: Ulid,
    },
    ListReservations {
        space_type: Option<String>,
        status: Option<String>,
        #[serde(default)]
        active_only: bool,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    },
    SchedulerStatus,
    SchedulerConfig,
    /// Fields left out keep their current value.
    ConfigureScheduler {
        enabled: Option<bool>,
        interval_minutes: Option<u32>,
        creation_timeout_days: Option<u32>,
        expiration_window_hours: Option<u32>,
        completion_window_hours: Option<u32>,
    },
    RunNow,
    StartScheduler,
    StopScheduler,
    /// Stream status events for one space type, or all of them.
    Listen {
        space_type: Option<String>,
    },
    Unlisten,
}

const STATUS_LABELS: [&str; 4] = ["pending", "confirmed", "cancelled", "completed"];

pub fn parse_command(line: &str) -> Result<Command, CommandError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Err(CommandError::Empty);
    }
    serde_json::from_str(trimmed).map_err(|e| CommandError::Parse(e.to_string()))
}

/// Build the store filter for `list_reservations`. A window needs both dates.
pub fn list_filter(
    space_type: Option<String>,
    status: Option<String>,
    active_only: bool,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
) -> Result<ReservationFilter, CommandError> {
    if let Some(label) = &status
        && !STATUS_LABELS.contains(&label.as_str())
    {
        return Err(CommandError::InvalidArgument(format!("unknown status: {label}")));
    }
    let window = match (start_date, end_date) {
        (None, None) => None,
        (Some(start), Some(end)) if start <= end => Some(DateRange::new(start, end)),
        (Some(start), Some(end)) => {
            return Err(CommandError::InvalidArgument(format!(
                "start_date {start} is after end_date {end}"
            )));
        }
        _ => {
            return Err(CommandError::InvalidArgument(
                "start_date and end_date must be given together".into(),
            ));
        }
    };
    Ok(ReservationFilter {
        space_type,
        active_only,
        status,
        window,
    })
}

/// Overlay the fields present in a `configure_scheduler` request onto `current`.
pub fn merge_scheduler_config(
    current: SchedulerConfig,
    enabled: Option<bool>,
    interval_minutes: Option<u32>,
    creation_timeout_days: Option<u32>,
    expiration_window_hours: Option<u32>,
    completion_window_hours: Option<u32>,
) -> SchedulerConfig {
    SchedulerConfig {
        enabled: enabled.unwrap_or(current.enabled),
        interval_minutes: interval_minutes.unwrap_or(current.interval_minutes),
        creation_timeout_days: creation_timeout_days.unwrap_or(current.creation_timeout_days),
        expiration_window_hours: expiration_window_hours.unwrap_or(current.expiration_window_hours),
        completion_window_hours: completion_window_hours.unwrap_or(current.completion_window_hours),
    }
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    Empty,
    Parse(String),
    InvalidArgument(String),
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandError::Empty => write!(f, "empty command"),
            CommandError::Parse(s) => write!(f, "parse error: {s}"),
            CommandError::InvalidArgument(s) => write!(f, "invalid argument: {s}"),
        }
    }
}

impl std::error::Error for CommandError {}
