use crate::model::*;

use super::availability::{daily_counts, peak};

/// Lazy, finite search for same-length ranges with spare capacity.
///
/// Candidates start at the requested range and move forward one day at a time,
/// for at most `horizon` shifts. Occupancy for the whole horizon window is
/// computed once at construction; each step only takes a window maximum.
/// Cloning yields an independent iterator from the same position, so the search
/// can be replayed without touching the reservation snapshot again.
#[derive(Debug, Clone)]
pub struct Alternatives {
    request: DateRange,
    capacity: u32,
    /// Occupancy per day from `request.start` to the last day any candidate may cover.
    counts: Vec<u32>,
    /// Next shift to try.
    offset: u32,
    /// Number of shifts that fit on the calendar and inside the horizon.
    shifts: u32,
    remaining: usize,
}

impl Alternatives {
    pub(super) fn new(
        reservations: &[Reservation],
        space_type: &str,
        capacity: u32,
        request: DateRange,
        horizon_days: u32,
        max_suggestions: usize,
    ) -> Self {
        // Shrink the horizon if the last candidate would run off the calendar.
        let mut shifts = horizon_days;
        while shifts > 0 && request.shifted(shifts as u64 - 1).is_none() {
            shifts -= 1;
        }

        let counts = match shifts {
            0 => Vec::new(),
            n => match request.shifted(n as u64 - 1) {
                Some(last) => {
                    daily_counts(reservations, space_type, &DateRange::new(request.start, last.end))
                }
                None => Vec::new(),
            },
        };

        Self {
            request,
            capacity,
            counts,
            offset: 0,
            shifts,
            remaining: max_suggestions,
        }
    }

    fn fits(&self, offset: u32) -> bool {
        let len = self.request.days() as usize;
        let from = offset as usize;
        match self.counts.get(from..from + len) {
            Some(window) => peak(window) < self.capacity,
            None => false,
        }
    }
}

impl Iterator for Alternatives {
    type Item = DateRange;

    fn next(&mut self) -> Option<DateRange> {
        while self.remaining > 0 && self.offset < self.shifts {
            let offset = self.offset;
            self.offset += 1;
            if self.fits(offset) {
                self.remaining -= 1;
                return self.request.shifted(offset as u64);
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.shifts - self.offset) as usize;
        (0, Some(left.min(self.remaining)))
    }
}
