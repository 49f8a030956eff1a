use ulid::Ulid;

use crate::model::*;

/// All reservations of one space type, sorted by `start_date`.
#[derive(Debug, Clone, Default)]
pub struct SpaceLedger {
    pub reservations: Vec<Reservation>,
}

impl SpaceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.reservations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reservations.is_empty()
    }

    /// Insert keeping start-date order; equal starts keep insertion order.
    pub fn insert(&mut self, reservation: Reservation) {
        let pos = self
            .reservations
            .partition_point(|r| r.start_date <= reservation.start_date);
        self.reservations.insert(pos, reservation);
    }

    /// Insert, or overwrite a record with the same id.
    pub fn upsert(&mut self, reservation: Reservation) {
        match self.get_mut(&reservation.id) {
            Some(existing) if existing.start_date == reservation.start_date => *existing = reservation,
            Some(_) => {
                self.remove(&reservation.id);
                self.insert(reservation);
            }
            None => self.insert(reservation),
        }
    }

    pub fn remove(&mut self, id: &Ulid) -> Option<Reservation> {
        let pos = self.reservations.iter().position(|r| r.id == *id)?;
        Some(self.reservations.remove(pos))
    }

    pub fn get(&self, id: &Ulid) -> Option<&Reservation> {
        self.reservations.iter().find(|r| r.id == *id)
    }

    pub fn get_mut(&mut self, id: &Ulid) -> Option<&mut Reservation> {
        self.reservations.iter_mut().find(|r| r.id == *id)
    }

    /// Records intersecting `window`. Binary search skips everything starting after it.
    pub fn overlapping(&self, window: &DateRange) -> impl Iterator<Item = &Reservation> {
        let right_bound = self
            .reservations
            .partition_point(|r| r.start_date <= window.end);
        let start = window.start;
        self.reservations[..right_bound]
            .iter()
            .filter(move |r| r.end_date >= start)
    }
}
