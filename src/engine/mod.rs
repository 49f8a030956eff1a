mod availability;
mod error;
mod suggest;
#[cfg(test)]
mod tests;

pub use availability::{active_overlapping, daily_counts, occupancy_on, peak};
pub use error::EngineError;
pub use suggest::Alternatives;

use std::sync::Arc;

use chrono::NaiveDate;

use crate::config::SpaceCatalog;
use crate::limits::*;
use crate::model::*;

/// Stateless capacity arithmetic over a caller-supplied reservation snapshot.
///
/// Every method is a pure function of `(catalog, snapshot, arguments)`, so the
/// engine can be shared freely. It does not serialize bookings: two callers can
/// both see a free slot. Inserts must re-check under the store's lock
/// (`ReservationBook::insert_if_available`).
#[derive(Debug, Clone)]
pub struct AvailabilityEngine {
    catalog: Arc<SpaceCatalog>,
}

impl AvailabilityEngine {
    pub fn new(catalog: Arc<SpaceCatalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &SpaceCatalog {
        &self.catalog
    }

    pub fn capacity(&self, space_type: &str) -> Result<u32, EngineError> {
        self.catalog
            .capacity(space_type)
            .ok_or_else(|| EngineError::UnknownSpaceType(space_type.to_string()))
    }

    pub fn validate_range(&self, start: NaiveDate, end: NaiveDate) -> Result<DateRange, EngineError> {
        if start > end {
            return Err(EngineError::InvalidRange { start, end });
        }
        let range = DateRange::new(start, end);
        if range.days() > MAX_RANGE_DAYS {
            return Err(EngineError::LimitExceeded("date range too long"));
        }
        Ok(range)
    }

    /// Active reservations of `space_type` covering `day`.
    pub fn occupancy(
        &self,
        reservations: &[Reservation],
        space_type: &str,
        day: NaiveDate,
    ) -> Result<u32, EngineError> {
        self.capacity(space_type)?;
        Ok(occupancy_on(reservations, space_type, day))
    }

    pub fn daily_occupancy(
        &self,
        reservations: &[Reservation],
        space_type: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DayOccupancy>, EngineError> {
        let capacity = self.capacity(space_type)?;
        let range = self.validate_range(start, end)?;
        let counts = daily_counts(reservations, space_type, &range);
        Ok(range
            .iter_days()
            .zip(counts)
            .map(|(date, occupancy)| DayOccupancy {
                date,
                occupancy,
                available: capacity.saturating_sub(occupancy),
            })
            .collect())
    }

    /// Peak per-day occupancy over `[start, end]` against the space type's capacity.
    pub fn check_availability(
        &self,
        reservations: &[Reservation],
        space_type: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<AvailabilityReport, EngineError> {
        let max_capacity = self.capacity(space_type)?;
        let range = self.validate_range(start, end)?;

        let peak_occupancy = peak(&daily_counts(reservations, space_type, &range));
        let conflicting = active_overlapping(reservations, space_type, &range)
            .cloned()
            .collect();

        Ok(AvailabilityReport {
            is_available: peak_occupancy < max_capacity,
            max_capacity,
            peak_occupancy,
            available_slots: max_capacity.saturating_sub(peak_occupancy),
            conflicting,
        })
    }

    /// Same-length ranges from `start` onward that have spare capacity.
    pub fn suggest_alternatives(
        &self,
        reservations: &[Reservation],
        space_type: &str,
        start: NaiveDate,
        end: NaiveDate,
        horizon_days: u32,
        max_suggestions: usize,
    ) -> Result<Alternatives, EngineError> {
        let capacity = self.capacity(space_type)?;
        let range = self.validate_range(start, end)?;
        if horizon_days > MAX_HORIZON_DAYS {
            return Err(EngineError::LimitExceeded("suggestion horizon too long"));
        }
        if max_suggestions > MAX_SUGGESTIONS {
            return Err(EngineError::LimitExceeded("too many suggestions requested"));
        }
        Ok(Alternatives::new(
            reservations,
            space_type,
            capacity,
            range,
            horizon_days,
            max_suggestions,
        ))
    }
}
