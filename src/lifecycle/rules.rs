use chrono::{DateTime, TimeDelta, Utc};

use crate::config::SchedulerConfig;
use crate::model::*;

/// One time-based transition: the reason it reports and when it applies.
pub struct Rule {
    pub reason: TransitionReason,
    applies: fn(&Reservation, DateTime<Utc>, &SchedulerConfig) -> bool,
}

impl Rule {
    pub fn applies(&self, r: &Reservation, now: DateTime<Utc>, config: &SchedulerConfig) -> bool {
        (self.applies)(r, now, config)
    }
}

/// Evaluated top to bottom; the first rule that applies wins.
pub const RULES: &[Rule] = &[
    Rule {
        reason: TransitionReason::CreationTimeout,
        applies: |r, now, config| {
            r.status == ReservationStatus::Pending
                && now
                    .checked_sub_signed(config.creation_timeout())
                    .is_some_and(|cutoff| r.created_at < cutoff)
        },
    },
    Rule {
        reason: TransitionReason::PendingExpiration,
        applies: |r, now, config| {
            r.status == ReservationStatus::Pending && ends_within(r, now, config.expiration_window())
        },
    },
    // Fires up to `completion_window` before the stay actually ends.
    Rule {
        reason: TransitionReason::ConfirmedCompletion,
        applies: |r, now, config| {
            r.status == ReservationStatus::Confirmed && ends_within(r, now, config.completion_window())
        },
    },
];

/// A window reaching past the end of representable time covers every end date.
fn ends_within(r: &Reservation, now: DateTime<Utc>, window: TimeDelta) -> bool {
    now.checked_add_signed(window)
        .is_none_or(|limit| r.end_instant() <= limit)
}

/// The transition the scan should apply to `r` at `now`, if any.
pub fn evaluate(r: &Reservation, now: DateTime<Utc>, config: &SchedulerConfig) -> Option<TransitionReason> {
    RULES
        .iter()
        .find(|rule| rule.applies(r, now, config))
        .map(|rule| rule.reason)
}
