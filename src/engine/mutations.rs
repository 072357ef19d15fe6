use std::time::Instant;

use ulid::Ulid;

use crate::model::*;
use crate::observability::{CONFLICTS_TOTAL, record_operation};
use crate::pricing;

use super::conflict::{check_no_conflict, now, validate_range};
use super::lifecycle::{Notice, Transition};
use super::{Engine, EngineError};

impl Engine {
    /// Book `[start_date, end_date]` on a piece of equipment for `renter_id`.
    ///
    /// The conflict check and the insert run under the equipment's write lock,
    /// so of several overlapping concurrent requests exactly one can win.
    pub async fn create_reservation(
        &self,
        renter_id: Ulid,
        equipment_id: Ulid,
        start_date: Timestamp,
        end_date: Timestamp,
    ) -> Result<Reservation, EngineError> {
        let started = Instant::now();
        let result = self
            .create_reservation_inner(renter_id, equipment_id, start_date, end_date)
            .await;
        if matches!(result, Err(EngineError::Conflict { .. })) {
            metrics::counter!(CONFLICTS_TOTAL).increment(1);
        }
        record_operation("create_reservation", started, &result);
        result
    }

    async fn create_reservation_inner(
        &self,
        renter_id: Ulid,
        equipment_id: Ulid,
        start_date: Timestamp,
        end_date: Timestamp,
    ) -> Result<Reservation, EngineError> {
        let now = now();
        let range = validate_range(start_date, end_date, now)?;

        let (reservation, notices) = {
            let _gate = self.commit_gate.read().await;
            let state = self
                .store
                .get_equipment(&equipment_id)
                .ok_or(EngineError::equipment_not_found(equipment_id))?;
            let mut guard = state.write().await;

            if !guard.equipment.available {
                return Err(EngineError::Conflict {
                    equipment_id,
                    blocking: None,
                });
            }
            check_no_conflict(&guard, &range)?;

            let equipment = &guard.equipment;
            let status = if equipment.auto_approve {
                ReservationStatus::Approved
            } else {
                ReservationStatus::Pending
            };
            let reservation = Reservation {
                id: Ulid::new(),
                equipment_id,
                renter_id,
                start_date,
                end_date,
                status,
                total_price: pricing::price(&equipment.prices, start_date, end_date),
                cancellation_reason: None,
                created_at: now,
                updated_at: now,
            };

            let mut notices = vec![Notice::new_request(equipment.owner_id, &equipment.name)];
            if status == ReservationStatus::Approved {
                notices.push(Notice::auto_approved(renter_id, &equipment.name));
            }

            let event = Event::ReservationCreated {
                reservation: reservation.clone(),
            };
            self.persist_and_apply(&mut guard, &event).await?;
            (reservation, notices)
        };

        tracing::info!(
            reservation_id = %reservation.id,
            %equipment_id,
            %renter_id,
            status = %reservation.status,
            total_price = reservation.total_price,
            "reservation created"
        );
        for notice in notices {
            self.emit(notice, reservation.id).await;
        }
        Ok(reservation)
    }

    pub async fn approve_reservation(&self, id: Ulid, owner_id: Ulid) -> Result<Reservation, EngineError> {
        self.transition(id, owner_id, Transition::Approve).await
    }

    pub async fn reject_reservation(
        &self,
        id: Ulid,
        owner_id: Ulid,
        reason: Option<String>,
    ) -> Result<Reservation, EngineError> {
        self.transition(id, owner_id, Transition::Reject { reason }).await
    }

    /// Either party may cancel; approved bookings only until 24 hours before start.
    pub async fn cancel_reservation(
        &self,
        id: Ulid,
        caller_id: Ulid,
        reason: Option<String>,
    ) -> Result<Reservation, EngineError> {
        self.transition(id, caller_id, Transition::Cancel { reason }).await
    }

    pub async fn complete_reservation(&self, id: Ulid, owner_id: Ulid) -> Result<Reservation, EngineError> {
        self.transition(id, owner_id, Transition::Complete).await
    }

    /// Apply one status change. The expected prior status is checked under the
    /// equipment write lock and the change is committed before it is released,
    /// so racing transitions on one reservation cannot both succeed.
    async fn transition(
        &self,
        id: Ulid,
        actor: Ulid,
        transition: Transition,
    ) -> Result<Reservation, EngineError> {
        let started = Instant::now();
        let label = transition.label();
        let result = match transition.validated() {
            Ok(transition) => self.transition_inner(id, actor, &transition).await,
            Err(e) => Err(e),
        };
        if let Err(e) = &result {
            tracing::debug!(reservation_id = %id, %actor, op = label, "transition refused: {e}");
        }
        record_operation(label, started, &result);
        result
    }

    async fn transition_inner(
        &self,
        id: Ulid,
        actor: Ulid,
        transition: &Transition,
    ) -> Result<Reservation, EngineError> {
        let now = now();
        let (updated, notice) = {
            let _gate = self.commit_gate.read().await;
            let mut guard = self.resolve_reservation_write(&id).await?;
            let owner_id = guard.equipment.owner_id;
            let current = guard
                .reservation(&id)
                .ok_or(EngineError::reservation_not_found(id))?;

            transition.authorize(actor, current, owner_id)?;
            transition.check(current, now)?;
            let notice = transition.notice(actor, current, owner_id, &guard.equipment.name);

            let event = Event::ReservationStatusChanged {
                id,
                equipment_id: guard.equipment.id,
                status: transition.target(),
                reason: transition.reason().map(str::to_string),
                at: now,
            };
            self.persist_and_apply(&mut guard, &event).await?;
            let updated = guard
                .reservation(&id)
                .cloned()
                .ok_or(EngineError::reservation_not_found(id))?;
            (updated, notice)
        };

        tracing::info!(
            reservation_id = %id,
            %actor,
            op = transition.label(),
            status = %updated.status,
            "reservation updated"
        );
        self.emit(notice, id).await;
        Ok(updated)
    }

    /// Rewrite the rental log with only the records needed to rebuild current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _gate = self.commit_gate.write().await;
        let mut events = Vec::new();
        for id in self.store.equipment_ids() {
            let Some(state) = self.store.get_equipment(&id) else {
                continue;
            };
            let guard = state.read().await;
            events.push(Event::EquipmentRegistered {
                equipment: guard.equipment.clone(),
            });
            events.extend(guard.reservations.iter().cloned().map(|reservation| {
                Event::ReservationCreated { reservation }
            }));
        }
        let count = events.len();
        self.wal.compact(events).await?;
        tracing::info!(records = count, "rental log compacted");
        Ok(())
    }
}
