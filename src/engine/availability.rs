use chrono::NaiveDate;

use crate::model::*;

// ── Per-day occupancy ─────────────────────────────────────────────

/// Active reservations of `space_type` whose inclusive range intersects `window`.
pub fn active_overlapping<'a>(
    reservations: &'a [Reservation],
    space_type: &'a str,
    window: &'a DateRange,
) -> impl Iterator<Item = &'a Reservation> + 'a {
    reservations.iter().filter(move |r| {
        r.is_active() && r.space_type == space_type && r.range().intersects(window)
    })
}

/// Count of active reservations of `space_type` covering `day`.
pub fn occupancy_on(reservations: &[Reservation], space_type: &str, day: NaiveDate) -> u32 {
    let window = DateRange::new(day, day);
    active_overlapping(reservations, space_type, &window).count() as u32
}

/// One occupancy count per day of `window`, in order.
///
/// Difference-array sweep: +1 on the first covered day, -1 on the day after the
/// last covered day, then a running sum. Each reservation is clamped to the
/// window first, so a stay touching only part of the window only counts on the
/// days it actually covers.
pub fn daily_counts(reservations: &[Reservation], space_type: &str, window: &DateRange) -> Vec<u32> {
    let len = window.days() as usize;
    let mut deltas: Vec<i64> = vec![0; len + 1];

    for r in active_overlapping(reservations, space_type, window) {
        let first = r.start_date.max(window.start);
        let last = r.end_date.min(window.end);
        let from = (first - window.start).num_days() as usize;
        let to = (last - window.start).num_days() as usize;
        deltas[from] += 1;
        deltas[to + 1] -= 1;
    }

    let mut counts = Vec::with_capacity(len);
    let mut running: i64 = 0;
    for delta in &deltas[..len] {
        running += delta;
        counts.push(running.max(0) as u32);
    }
    counts
}

/// Highest single-day count, 0 for an empty slice.
pub fn peak(counts: &[u32]) -> u32 {
    counts.iter().copied().max().unwrap_or(0)
}
