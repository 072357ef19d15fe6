use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::model::*;

use super::SharedEquipmentState;

/// In-memory projection of the rental log.
pub struct Store {
    equipment: DashMap<Ulid, SharedEquipmentState>,
    /// Reverse lookup: reservation id → equipment id.
    reservation_to_equipment: DashMap<Ulid, Ulid>,
    /// Renter → reservation ids, in creation order.
    by_renter: DashMap<Ulid, Vec<Ulid>>,
    /// Owner → equipment ids.
    by_owner: DashMap<Ulid, Vec<Ulid>>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        Self {
            equipment: DashMap::new(),
            reservation_to_equipment: DashMap::new(),
            by_renter: DashMap::new(),
            by_owner: DashMap::new(),
        }
    }

    /// Build a store from replayed log records. Records for unknown equipment are skipped.
    pub fn from_events(events: Vec<Event>) -> Self {
        let store = Self::new();
        let mut states: HashMap<Ulid, EquipmentState> = HashMap::new();
        for event in events {
            match event {
                Event::EquipmentRegistered { equipment } => {
                    store.index_owner(equipment.owner_id, equipment.id);
                    states.insert(equipment.id, EquipmentState::new(equipment));
                }
                other => {
                    if let Some(state) = states.get_mut(&other.equipment_id()) {
                        store.apply_event(state, &other);
                    }
                }
            }
        }
        for (id, state) in states {
            store.equipment.insert(id, Arc::new(RwLock::new(state)));
        }
        store
    }

    // ── Equipment ────────────────────────────────────────────

    pub fn equipment_count(&self) -> usize {
        self.equipment.len()
    }

    pub fn get_equipment(&self, id: &Ulid) -> Option<SharedEquipmentState> {
        self.equipment.get(id).map(|e| e.value().clone())
    }

    pub fn insert_equipment(&self, equipment: Equipment) {
        self.index_owner(equipment.owner_id, equipment.id);
        self.equipment
            .insert(equipment.id, Arc::new(RwLock::new(EquipmentState::new(equipment))));
    }

    pub fn equipment_ids(&self) -> Vec<Ulid> {
        self.equipment.iter().map(|e| *e.key()).collect()
    }

    fn index_owner(&self, owner_id: Ulid, equipment_id: Ulid) {
        self.by_owner.entry(owner_id).or_default().push(equipment_id);
    }

    pub fn equipment_of_owner(&self, owner_id: &Ulid) -> Vec<Ulid> {
        self.by_owner
            .get(owner_id)
            .map(|e| e.value().clone())
            .unwrap_or_default()
    }

    // ── Reservation index ────────────────────────────────────

    pub fn equipment_for_reservation(&self, reservation_id: &Ulid) -> Option<Ulid> {
        self.reservation_to_equipment
            .get(reservation_id)
            .map(|e| *e.value())
    }

    pub fn reservations_of_renter(&self, renter_id: &Ulid) -> Vec<Ulid> {
        self.by_renter
            .get(renter_id)
            .map(|e| e.value().clone())
            .unwrap_or_default()
    }

    // ── Event application ────────────────────────────────────

    /// Apply a record to one equipment's state. Caller holds its write lock.
    pub fn apply_event(&self, state: &mut EquipmentState, event: &Event) {
        match event {
            Event::EquipmentUpdated { equipment } => {
                state.equipment = equipment.clone();
            }
            Event::ReservationCreated { reservation } => {
                self.reservation_to_equipment
                    .insert(reservation.id, reservation.equipment_id);
                self.by_renter
                    .entry(reservation.renter_id)
                    .or_default()
                    .push(reservation.id);
                state.insert_reservation(reservation.clone());
            }
            Event::ReservationStatusChanged {
                id,
                status,
                reason,
                at,
                ..
            } => {
                if let Some(r) = state.reservation_mut(id) {
                    r.status = *status;
                    if matches!(status, ReservationStatus::Rejected | ReservationStatus::Cancelled) {
                        r.cancellation_reason = reason.clone();
                    }
                    r.updated_at = *at;
                }
            }
            // Registration is handled at the map level, not here
            Event::EquipmentRegistered { .. } => {}
        }
    }
}
