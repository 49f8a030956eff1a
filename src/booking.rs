use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::{debug, info};
use ulid::Ulid;

use crate::engine::{AvailabilityEngine, EngineError};
use crate::limits::*;
use crate::model::*;
use crate::store::{InsertError, ReservationBook, ReservationFilter, ReservationStore, StatusPatch, StoreError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingError {
    Engine(EngineError),
    Store(StoreError),
    /// No capacity for the requested range; carries the availability answer with alternatives.
    Unavailable(AvailabilityAnswer),
}

impl std::fmt::Display for BookingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BookingError::Engine(e) => write!(f, "{e}"),
            BookingError::Store(e) => write!(f, "{e}"),
            BookingError::Unavailable(answer) => write!(
                f,
                "no capacity: {} of {} slots taken at peak",
                answer.current_occupancy, answer.max_capacity
            ),
        }
    }
}

impl std::error::Error for BookingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BookingError::Engine(e) => Some(e),
            BookingError::Store(e) => Some(e),
            BookingError::Unavailable(_) => None,
        }
    }
}

impl From<EngineError> for BookingError {
    fn from(value: EngineError) -> Self {
        Self::Engine(value)
    }
}

impl From<StoreError> for BookingError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<InsertError> for BookingError {
    /// Suggestions stay empty; `create_reservation` fills them in.
    fn from(value: InsertError) -> Self {
        match value {
            InsertError::Rejected(e) => Self::Engine(e),
            InsertError::Unavailable(report) => Self::Unavailable(AvailabilityAnswer::from(&report)),
            InsertError::Store(e) => Self::Store(e),
        }
    }
}

/// A booking request. The initial status is the booking flow's decision
/// (e.g. Confirmed for on-site payment, Pending for a transfer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReservation {
    pub space_type: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub confirmed: bool,
}

/// Booking flow: availability answers with alternatives, safe inserts, and
/// the explicit confirm/cancel actions.
pub struct BookingService {
    book: Arc<ReservationBook>,
    engine: AvailabilityEngine,
    horizon_days: u32,
    max_suggestions: usize,
}

impl BookingService {
    pub fn new(book: Arc<ReservationBook>, engine: AvailabilityEngine) -> Self {
        Self {
            book,
            engine,
            horizon_days: DEFAULT_HORIZON_DAYS,
            max_suggestions: DEFAULT_MAX_SUGGESTIONS,
        }
    }

    pub fn with_suggestions(mut self, horizon_days: u32, max_suggestions: usize) -> Self {
        self.horizon_days = horizon_days.min(MAX_HORIZON_DAYS);
        self.max_suggestions = max_suggestions.min(MAX_SUGGESTIONS);
        self
    }

    pub fn engine(&self) -> &AvailabilityEngine {
        &self.engine
    }

    pub fn book(&self) -> &Arc<ReservationBook> {
        &self.book
    }

    /// Snapshot of the active reservations that can matter for `range` and its alternatives.
    async fn snapshot(&self, space_type: &str, range: DateRange) -> Result<Vec<Reservation>, BookingError> {
        let reach = range
            .shifted(self.horizon_days as u64)
            .map_or(NaiveDate::MAX, |r| r.end);
        let window = DateRange::new(range.start, reach);
        Ok(self.book.list(&ReservationFilter::active_in(space_type, window)).await?)
    }

    /// Alternatives are only searched when the request itself does not fit.
    fn answer(
        &self,
        snapshot: &[Reservation],
        space_type: &str,
        range: DateRange,
    ) -> Result<AvailabilityAnswer, EngineError> {
        let report = self
            .engine
            .check_availability(snapshot, space_type, range.start, range.end)?;
        let mut answer = AvailabilityAnswer::from(&report);
        if !report.is_available {
            answer.suggested_dates = self
                .engine
                .suggest_alternatives(
                    snapshot,
                    space_type,
                    range.start,
                    range.end,
                    self.horizon_days,
                    self.max_suggestions,
                )?
                .collect();
        }
        Ok(answer)
    }

    pub async fn check_availability(
        &self,
        space_type: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<AvailabilityAnswer, BookingError> {
        self.engine.capacity(space_type)?;
        let range = self.engine.validate_range(start, end)?;
        let snapshot = self.snapshot(space_type, range).await?;
        let answer = self.answer(&snapshot, space_type, range)?;

        let outcome = if answer.is_available { "available" } else { "unavailable" };
        metrics::counter!(crate::observability::AVAILABILITY_CHECKS_TOTAL, "result" => outcome)
            .increment(1);
        Ok(answer)
    }

    pub async fn daily_occupancy(
        &self,
        space_type: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DayOccupancy>, BookingError> {
        self.engine.capacity(space_type)?;
        let range = self.engine.validate_range(start, end)?;
        let snapshot = self
            .book
            .list(&ReservationFilter::active_in(space_type, range))
            .await?;
        Ok(self.engine.daily_occupancy(&snapshot, space_type, start, end)?)
    }

    /// Insert a reservation, re-validating capacity atomically with the write.
    pub async fn create_reservation(&self, request: NewReservation) -> Result<Reservation, BookingError> {
        let reservation = Reservation {
            id: Ulid::new(),
            space_type: request.space_type,
            start_date: request.start_date,
            end_date: request.end_date,
            status: if request.confirmed {
                ReservationStatus::Confirmed
            } else {
                ReservationStatus::Pending
            },
            created_at: Utc::now(),
        };
        let space_type = reservation.space_type.clone();
        let range = DateRange {
            start: reservation.start_date,
            end: reservation.end_date,
        };

        match self.book.insert_if_available(reservation, &self.engine).await {
            Ok(r) => {
                info!(
                    "reservation {} created: {} {}..{} ({})",
                    r.id,
                    r.space_type,
                    r.start_date,
                    r.end_date,
                    r.status.label()
                );
                Ok(r)
            }
            Err(InsertError::Unavailable(report)) => {
                let mut answer = AvailabilityAnswer::from(&report);
                metrics::counter!(crate::observability::BOOKINGS_REJECTED_TOTAL).increment(1);
                debug!("booking rejected: {space_type} {}..{} is full", range.start, range.end);
                let snapshot = self.snapshot(&space_type, range).await?;
                answer.suggested_dates = self
                    .engine
                    .suggest_alternatives(
                        &snapshot,
                        &space_type,
                        range.start,
                        range.end,
                        self.horizon_days,
                        self.max_suggestions,
                    )?
                    .collect();
                Err(BookingError::Unavailable(answer))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Pending → Confirmed, e.g. once a transfer has been received.
    pub async fn confirm(&self, id: Ulid) -> Result<Reservation, BookingError> {
        let r = self
            .book
            .update(id, StatusPatch::to(ReservationStatus::Confirmed))
            .await?;
        info!("reservation {id} confirmed");
        Ok(r)
    }

    pub async fn cancel(&self, id: Ulid) -> Result<Reservation, BookingError> {
        let r = self
            .book
            .update(id, StatusPatch::to(ReservationStatus::Cancelled(CancelReason::Manual)))
            .await?;
        info!("reservation {id} cancelled by request");
        Ok(r)
    }

    pub async fn get(&self, id: Ulid) -> Result<Reservation, BookingError> {
        self.book
            .get(id)
            .await
            .ok_or(BookingError::Store(StoreError::NotFound(id)))
    }

    /// At most `MAX_LIST_RESULTS` records, ordered by start date.
    pub async fn list(&self, filter: &ReservationFilter) -> Result<Vec<Reservation>, BookingError> {
        let mut out = self.book.list(filter).await?;
        out.truncate(MAX_LIST_RESULTS);
        Ok(out)
    }
}
