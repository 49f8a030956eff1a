use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Inclusive calendar-date range `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        debug_assert!(start <= end, "DateRange start must not be after end");
        Self { start, end }
    }

    /// Number of calendar days covered, counting both ends.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    pub fn covers(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }

    pub fn intersects(&self, other: &DateRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Same-length range moved `days` forward. `None` past the calendar's end.
    pub fn shifted(&self, days: u64) -> Option<DateRange> {
        Some(DateRange {
            start: self.start.checked_add_days(Days::new(days))?,
            end: self.end.checked_add_days(Days::new(days))?,
        })
    }

    pub fn iter_days(&self) -> impl Iterator<Item = NaiveDate> + use<> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }
}

/// Immutable capacity entry for one bookable category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceTypeConfig {
    pub key: String,
    pub max_capacity: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    CreationTimeout,
    PendingExpiration,
    /// Client or operator action.
    Manual,
}

impl CancelReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CancelReason::CreationTimeout => "creation_timeout",
            CancelReason::PendingExpiration => "pending_expiration",
            CancelReason::Manual => "manual",
        }
    }
}

/// Reservation lifecycle. `Cancelled` and `Completed` are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Cancelled(CancelReason),
    Completed,
}

impl ReservationStatus {
    /// Pending and Confirmed reservations consume capacity.
    pub fn is_active(&self) -> bool {
        matches!(self, ReservationStatus::Pending | ReservationStatus::Confirmed)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    pub fn label(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Confirmed => "confirmed",
            ReservationStatus::Cancelled(_) => "cancelled",
            ReservationStatus::Completed => "completed",
        }
    }

    pub fn cancel_reason(&self) -> Option<CancelReason> {
        match self {
            ReservationStatus::Cancelled(reason) => Some(*reason),
            _ => None,
        }
    }
}

/// Why the lifecycle scan moved a reservation. Each reason fixes its target status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionReason {
    CreationTimeout,
    PendingExpiration,
    ConfirmedCompletion,
}

impl TransitionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionReason::CreationTimeout => "creation_timeout",
            TransitionReason::PendingExpiration => "pending_expiration",
            TransitionReason::ConfirmedCompletion => "confirmed_completion",
        }
    }

    /// The automatic reason a status implies, if it can only be reached by the scan.
    pub fn for_status(status: &ReservationStatus) -> Option<Self> {
        match status {
            ReservationStatus::Cancelled(CancelReason::CreationTimeout) => {
                Some(TransitionReason::CreationTimeout)
            }
            ReservationStatus::Cancelled(CancelReason::PendingExpiration) => {
                Some(TransitionReason::PendingExpiration)
            }
            ReservationStatus::Completed => Some(TransitionReason::ConfirmedCompletion),
            _ => None,
        }
    }

    pub fn target(&self) -> ReservationStatus {
        match self {
            TransitionReason::CreationTimeout => {
                ReservationStatus::Cancelled(CancelReason::CreationTimeout)
            }
            TransitionReason::PendingExpiration => {
                ReservationStatus::Cancelled(CancelReason::PendingExpiration)
            }
            TransitionReason::ConfirmedCompletion => ReservationStatus::Completed,
        }
    }
}

/// The persisted reservation fields this service reads and writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub space_type: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
}

impl Reservation {
    pub fn range(&self) -> DateRange {
        DateRange::new(self.start_date, self.end_date)
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// End date anchored at 00:00 UTC, the instant the lifecycle windows compare against.
    pub fn end_instant(&self) -> DateTime<Utc> {
        self.end_date.and_time(chrono::NaiveTime::MIN).and_utc()
    }
}

/// WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// A new reservation, or the full current state of one after compaction.
    Recorded(Reservation),
    StatusChanged {
        id: Ulid,
        space_type: String,
        status: ReservationStatus,
    },
}

/// Published on every status change, automatic or external.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusEvent {
    pub reservation_id: Ulid,
    pub space_type: String,
    pub from: ReservationStatus,
    pub to: ReservationStatus,
    /// `None` for explicit client/operator actions.
    pub reason: Option<TransitionReason>,
    pub at: DateTime<Utc>,
}

// ── Query result types ───────────────────────────────────────────

/// Engine-level availability answer for one space type and range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityReport {
    pub is_available: bool,
    pub max_capacity: u32,
    pub peak_occupancy: u32,
    pub available_slots: u32,
    /// Active reservations intersecting the range.
    pub conflicting: Vec<Reservation>,
}

/// The availability record returned to booking callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailabilityAnswer {
    pub is_available: bool,
    pub max_capacity: u32,
    pub current_occupancy: u32,
    pub available_slots: u32,
    pub conflicting_reservations: usize,
    pub suggested_dates: Vec<DateRange>,
}

impl From<&AvailabilityReport> for AvailabilityAnswer {
    /// Suggestions are left empty; the booking layer fills them in.
    fn from(report: &AvailabilityReport) -> Self {
        Self {
            is_available: report.is_available,
            max_capacity: report.max_capacity,
            current_occupancy: report.peak_occupancy,
            available_slots: report.available_slots,
            conflicting_reservations: report.conflicting.len(),
            suggested_dates: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DayOccupancy {
    pub date: NaiveDate,
    pub occupancy: u32,
    pub available: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReservationInfo {
    pub id: String,
    pub space_type: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: &'static str,
    pub cancel_reason: Option<&'static str>,
    pub created_at: DateTime<Utc>,
}

impl From<&Reservation> for ReservationInfo {
    fn from(r: &Reservation) -> Self {
        Self {
            id: r.id.to_string(),
            space_type: r.space_type.clone(),
            start_date: r.start_date,
            end_date: r.end_date,
            status: r.status.label(),
            cancel_reason: r.status.cancel_reason().map(|c| c.as_str()),
            created_at: r.created_at,
        }
    }
}
