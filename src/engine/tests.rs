use super::*;
use chrono::Utc;
use ulid::Ulid;

fn d(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

fn engine() -> AvailabilityEngine {
    AvailabilityEngine::new(Arc::new(SpaceCatalog::default()))
}

fn reservation(space: &str, start: &str, end: &str, status: ReservationStatus) -> Reservation {
    Reservation {
        id: Ulid::new(),
        space_type: space.into(),
        start_date: d(start),
        end_date: d(end),
        status,
        created_at: Utc::now(),
    }
}

fn confirmed(space: &str, start: &str, end: &str) -> Reservation {
    reservation(space, start, end, ReservationStatus::Confirmed)
}

fn pending(space: &str, start: &str, end: &str) -> Reservation {
    reservation(space, start, end, ReservationStatus::Pending)
}

// ── check_availability ───────────────────────────────────

#[test]
fn full_coworking_day_is_unavailable() {
    let rs: Vec<_> = (0..4)
        .map(|_| confirmed("coworking", "2024-01-10", "2024-01-12"))
        .collect();
    let report = engine()
        .check_availability(&rs, "coworking", d("2024-01-11"), d("2024-01-11"))
        .unwrap();
    assert!(!report.is_available);
    assert_eq!(report.max_capacity, 4);
    assert_eq!(report.peak_occupancy, 4);
    assert_eq!(report.available_slots, 0);
    assert_eq!(report.conflicting.len(), 4);
}

#[test]
fn one_slot_left_is_available() {
    let rs: Vec<_> = (0..3)
        .map(|_| pending("coworking", "2024-01-10", "2024-01-12"))
        .collect();
    let report = engine()
        .check_availability(&rs, "coworking", d("2024-01-10"), d("2024-01-12"))
        .unwrap();
    assert!(report.is_available);
    assert_eq!(report.available_slots, 1);
}

#[test]
fn partial_overlaps_reduce_by_day_not_by_range() {
    // Four stays each touch the requested week, but at most two share any day.
    let rs = vec![
        confirmed("coworking", "2024-01-01", "2024-01-02"),
        confirmed("coworking", "2024-01-02", "2024-01-03"),
        confirmed("coworking", "2024-01-05", "2024-01-06"),
        confirmed("coworking", "2024-01-06", "2024-01-09"),
    ];
    let report = engine()
        .check_availability(&rs, "coworking", d("2024-01-01"), d("2024-01-07"))
        .unwrap();
    assert_eq!(report.conflicting.len(), 4);
    assert_eq!(report.peak_occupancy, 2);
    assert!(report.is_available);
    assert_eq!(report.available_slots, 2);
}

#[test]
fn terminal_reservations_free_capacity() {
    let rs = vec![
        reservation("meeting-room", "2024-05-01", "2024-05-01", ReservationStatus::Completed),
        reservation(
            "meeting-room",
            "2024-05-01",
            "2024-05-01",
            ReservationStatus::Cancelled(CancelReason::CreationTimeout),
        ),
    ];
    let report = engine()
        .check_availability(&rs, "meeting-room", d("2024-05-01"), d("2024-05-01"))
        .unwrap();
    assert!(report.is_available);
    assert_eq!(report.peak_occupancy, 0);
    assert!(report.conflicting.is_empty());
}

#[test]
fn single_capacity_space_blocked_by_one() {
    let rs = vec![pending("domiciliation", "2024-01-01", "2024-12-31")];
    let report = engine()
        .check_availability(&rs, "domiciliation", d("2024-06-01"), d("2024-06-30"))
        .unwrap();
    assert!(!report.is_available);
    assert_eq!(report.available_slots, 0);
}

#[test]
fn other_space_types_do_not_count() {
    let rs: Vec<_> = (0..3)
        .map(|_| confirmed("private-office", "2024-01-10", "2024-01-12"))
        .collect();
    let report = engine()
        .check_availability(&rs, "coworking", d("2024-01-10"), d("2024-01-12"))
        .unwrap();
    assert_eq!(report.peak_occupancy, 0);
    assert!(report.conflicting.is_empty());
}

#[test]
fn inverted_range_rejected() {
    let err = engine()
        .check_availability(&[], "coworking", d("2024-01-12"), d("2024-01-10"))
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::InvalidRange {
            start: d("2024-01-12"),
            end: d("2024-01-10")
        }
    );
}

#[test]
fn unknown_space_type_rejected() {
    let err = engine()
        .check_availability(&[], "rooftop", d("2024-01-10"), d("2024-01-10"))
        .unwrap_err();
    assert_eq!(err, EngineError::UnknownSpaceType("rooftop".into()));
    assert!(matches!(
        engine().occupancy(&[], "rooftop", d("2024-01-10")),
        Err(EngineError::UnknownSpaceType(_))
    ));
}

#[test]
fn unknown_space_type_checked_before_range() {
    let err = engine()
        .check_availability(&[], "rooftop", d("2024-01-12"), d("2024-01-10"))
        .unwrap_err();
    assert!(matches!(err, EngineError::UnknownSpaceType(_)));
}

#[test]
fn overlong_range_rejected() {
    let err = engine()
        .check_availability(&[], "coworking", d("2024-01-01"), d("2026-01-01"))
        .unwrap_err();
    assert!(matches!(err, EngineError::LimitExceeded(_)));
}

// ── occupancy / daily_occupancy ──────────────────────────

#[test]
fn occupancy_matches_active_count() {
    let rs = vec![
        confirmed("coworking", "2024-01-10", "2024-01-12"),
        pending("coworking", "2024-01-11", "2024-01-11"),
        reservation("coworking", "2024-01-11", "2024-01-11", ReservationStatus::Completed),
    ];
    let e = engine();
    assert_eq!(e.occupancy(&rs, "coworking", d("2024-01-10")).unwrap(), 1);
    assert_eq!(e.occupancy(&rs, "coworking", d("2024-01-11")).unwrap(), 2);
    assert_eq!(e.occupancy(&rs, "coworking", d("2024-01-13")).unwrap(), 0);
}

#[test]
fn daily_occupancy_calendar() {
    let rs = vec![
        confirmed("private-office", "2024-01-10", "2024-01-12"),
        confirmed("private-office", "2024-01-11", "2024-01-11"),
    ];
    let days = engine()
        .daily_occupancy(&rs, "private-office", d("2024-01-09"), d("2024-01-12"))
        .unwrap();
    let summary: Vec<_> = days.iter().map(|x| (x.occupancy, x.available)).collect();
    assert_eq!(summary, vec![(0, 3), (1, 2), (2, 1), (1, 2)]);
    assert_eq!(days[0].date, d("2024-01-09"));
}

// ── suggest_alternatives ─────────────────────────────────

#[test]
fn suggestions_start_at_request_when_free() {
    let got: Vec<_> = engine()
        .suggest_alternatives(&[], "meeting-room", d("2024-01-10"), d("2024-01-11"), 60, 3)
        .unwrap()
        .collect();
    assert_eq!(
        got,
        vec![
            DateRange::new(d("2024-01-10"), d("2024-01-11")),
            DateRange::new(d("2024-01-11"), d("2024-01-12")),
            DateRange::new(d("2024-01-12"), d("2024-01-13")),
        ]
    );
}

#[test]
fn suggestions_skip_saturated_days() {
    let rs = vec![confirmed("meeting-room", "2024-01-10", "2024-01-14")];
    let got: Vec<_> = engine()
        .suggest_alternatives(&rs, "meeting-room", d("2024-01-10"), d("2024-01-11"), 60, 2)
        .unwrap()
        .collect();
    assert_eq!(
        got,
        vec![
            DateRange::new(d("2024-01-15"), d("2024-01-16")),
            DateRange::new(d("2024-01-16"), d("2024-01-17")),
        ]
    );
}

#[test]
fn suggestions_keep_duration_and_order() {
    let rs = vec![
        confirmed("meeting-room", "2024-02-03", "2024-02-03"),
        confirmed("meeting-room", "2024-02-09", "2024-02-10"),
    ];
    let request = DateRange::new(d("2024-02-01"), d("2024-02-03"));
    let got: Vec<_> = engine()
        .suggest_alternatives(&rs, "meeting-room", request.start, request.end, 30, 10)
        .unwrap()
        .collect();
    assert!(!got.is_empty());
    assert!(got.iter().all(|r| r.days() == request.days()));
    assert!(got.windows(2).all(|w| w[0].start <= w[1].start));
    for r in &got {
        let report = engine()
            .check_availability(&rs, "meeting-room", r.start, r.end)
            .unwrap();
        assert!(report.is_available, "suggested {r:?} is not available");
    }
}

#[test]
fn suggestions_empty_when_horizon_fully_booked() {
    let rs = vec![confirmed("domiciliation", "2024-01-01", "2024-12-31")];
    let got: Vec<_> = engine()
        .suggest_alternatives(&rs, "domiciliation", d("2024-01-10"), d("2024-01-12"), 60, 3)
        .unwrap()
        .collect();
    assert!(got.is_empty());
}

#[test]
fn suggestions_respect_horizon() {
    // Free again from 2024-03-01; a 10-day horizon from 2024-02-01 never reaches it.
    let rs = vec![confirmed("meeting-room", "2024-01-01", "2024-02-29")];
    let mut alts = engine()
        .suggest_alternatives(&rs, "meeting-room", d("2024-02-01"), d("2024-02-01"), 10, 3)
        .unwrap();
    assert_eq!(alts.next(), None);

    let got: Vec<_> = engine()
        .suggest_alternatives(&rs, "meeting-room", d("2024-02-01"), d("2024-02-01"), 60, 1)
        .unwrap()
        .collect();
    assert_eq!(got, vec![DateRange::new(d("2024-03-01"), d("2024-03-01"))]);
}

#[test]
fn zero_horizon_or_zero_max_is_empty() {
    let e = engine();
    assert_eq!(
        e.suggest_alternatives(&[], "coworking", d("2024-01-01"), d("2024-01-02"), 0, 3)
            .unwrap()
            .count(),
        0
    );
    assert_eq!(
        e.suggest_alternatives(&[], "coworking", d("2024-01-01"), d("2024-01-02"), 60, 0)
            .unwrap()
            .count(),
        0
    );
}

#[test]
fn suggestions_are_restartable() {
    let rs = vec![confirmed("meeting-room", "2024-01-11", "2024-01-11")];
    let alts = engine()
        .suggest_alternatives(&rs, "meeting-room", d("2024-01-10"), d("2024-01-10"), 60, 3)
        .unwrap();
    let first: Vec<_> = alts.clone().collect();
    let second: Vec<_> = alts.collect();
    assert_eq!(first, second);
    assert_eq!(first[0], DateRange::new(d("2024-01-10"), d("2024-01-10")));
    assert_eq!(first[1], DateRange::new(d("2024-01-12"), d("2024-01-12")));
}

#[test]
fn suggestions_near_calendar_end_terminate() {
    let last = NaiveDate::MAX;
    let got: Vec<_> = engine()
        .suggest_alternatives(&[], "coworking", last, last, 60, 3)
        .unwrap()
        .collect();
    assert_eq!(got, vec![DateRange::new(last, last)]);
}

#[test]
fn suggestion_limits_enforced() {
    let e = engine();
    assert!(matches!(
        e.suggest_alternatives(&[], "coworking", d("2024-01-01"), d("2024-01-01"), 10_000, 3),
        Err(EngineError::LimitExceeded(_))
    ));
    assert!(matches!(
        e.suggest_alternatives(&[], "coworking", d("2024-01-01"), d("2024-01-01"), 60, 1_000),
        Err(EngineError::LimitExceeded(_))
    ));
    assert!(matches!(
        e.suggest_alternatives(&[], "coworking", d("2024-01-02"), d("2024-01-01"), 60, 3),
        Err(EngineError::InvalidRange { .. })
    ));
}
