use std::cmp::Reverse;
use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;
use ulid::Ulid;

use crate::model::*;

use super::availability::{calendar, validate_window};
use super::{Engine, EngineError};

/// Point-in-time counts over the whole store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub equipment: usize,
    pub available_equipment: usize,
    pub reservations: usize,
    pub by_status: BTreeMap<&'static str, usize>,
    pub wal_appends_since_compact: u64,
}

/// Newest first; ids break ties so paging is stable.
fn sort_newest_first(reservations: &mut [Reservation]) {
    reservations.sort_by_key(|r| Reverse((r.created_at, r.id)));
}

/// Lookups accept past ranges; only the ordering is checked.
fn query_range(start: Timestamp, end: Timestamp) -> Result<DateRange, EngineError> {
    if end <= start {
        return Err(EngineError::Validation("end_date must be after start_date".into()));
    }
    Ok(DateRange::new(start, end))
}

impl Engine {
    /// Visible to the renter and to the equipment owner.
    pub async fn get_reservation(&self, id: Ulid, caller_id: Ulid) -> Result<Reservation, EngineError> {
        let equipment_id = self
            .store
            .equipment_for_reservation(&id)
            .ok_or(EngineError::reservation_not_found(id))?;
        let state = self
            .store
            .get_equipment(&equipment_id)
            .ok_or(EngineError::reservation_not_found(id))?;
        let guard = state.read().await;
        let reservation = guard
            .reservation(&id)
            .ok_or(EngineError::reservation_not_found(id))?;
        if caller_id != reservation.renter_id && caller_id != guard.equipment.owner_id {
            return Err(EngineError::Unauthorized(
                "only the renter or the equipment owner may view this reservation",
            ));
        }
        Ok(reservation.clone())
    }

    pub async fn list_reservations_for_renter(&self, renter_id: Ulid, page: Page) -> (Vec<Reservation>, usize) {
        let mut by_equipment: BTreeMap<Ulid, Vec<Ulid>> = BTreeMap::new();
        for id in self.store.reservations_of_renter(&renter_id) {
            if let Some(equipment_id) = self.store.equipment_for_reservation(&id) {
                by_equipment.entry(equipment_id).or_default().push(id);
            }
        }

        let mut out = Vec::new();
        for (equipment_id, ids) in by_equipment {
            let Some(state) = self.store.get_equipment(&equipment_id) else {
                continue;
            };
            let guard = state.read().await;
            out.extend(ids.iter().filter_map(|id| guard.reservation(id)).cloned());
        }
        sort_newest_first(&mut out);
        let total = out.len();
        (page.apply(out), total)
    }

    /// Reservations on every piece of equipment `owner_id` has registered.
    pub async fn list_reservations_for_owner(&self, owner_id: Ulid, page: Page) -> (Vec<Reservation>, usize) {
        let mut out = Vec::new();
        for equipment_id in self.store.equipment_of_owner(&owner_id) {
            let Some(state) = self.store.get_equipment(&equipment_id) else {
                continue;
            };
            out.extend(state.read().await.reservations.iter().cloned());
        }
        sort_newest_first(&mut out);
        let total = out.len();
        (page.apply(out), total)
    }

    /// Day-by-day availability of one item over `[from, to]`.
    pub async fn get_availability(
        &self,
        equipment_id: Ulid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DayAvailability>, EngineError> {
        validate_window(from, to)?;
        let state = self
            .store
            .get_equipment(&equipment_id)
            .ok_or(EngineError::equipment_not_found(equipment_id))?;
        let guard = state.read().await;
        Ok(calendar(&guard, from, to))
    }

    /// Whether a new booking of `[start, end]` would be accepted right now.
    pub async fn check_availability(
        &self,
        equipment_id: Ulid,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<bool, EngineError> {
        let range = query_range(start, end)?;
        let state = self
            .store
            .get_equipment(&equipment_id)
            .ok_or(EngineError::equipment_not_found(equipment_id))?;
        let guard = state.read().await;
        Ok(guard.equipment.available && guard.blocking_overlapping(&range).next().is_none())
    }

    /// Pending and approved reservations touching `[start, end]`, by start date.
    pub async fn blocking_reservations_overlapping(
        &self,
        equipment_id: Ulid,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<Vec<Reservation>, EngineError> {
        let range = query_range(start, end)?;
        let state = self
            .store
            .get_equipment(&equipment_id)
            .ok_or(EngineError::equipment_not_found(equipment_id))?;
        let guard = state.read().await;
        Ok(guard.blocking_overlapping(&range).cloned().collect())
    }

    pub async fn summary(&self) -> Summary {
        let mut summary = Summary {
            wal_appends_since_compact: self.wal.appends_since_compact().await,
            ..Default::default()
        };
        for id in self.store.equipment_ids() {
            let Some(state) = self.store.get_equipment(&id) else {
                continue;
            };
            let guard = state.read().await;
            summary.equipment += 1;
            if guard.equipment.available {
                summary.available_equipment += 1;
            }
            summary.reservations += guard.reservations.len();
            for r in &guard.reservations {
                *summary.by_status.entry(r.status.as_str()).or_default() += 1;
            }
        }
        summary
    }
}
