use std::collections::BTreeSet;
use std::time::Instant;

use ulid::Ulid;

use crate::model::*;
use crate::observability::{EQUIPMENT_ACTIVE, record_operation};

use super::conflict::{now, validate_category, validate_name, validate_prices};
use super::{Engine, EngineError};

impl Engine {
    pub async fn register_equipment(&self, owner_id: Ulid, new: NewEquipment) -> Result<Equipment, EngineError> {
        let started = Instant::now();
        let result = self.register_equipment_inner(owner_id, new).await;
        record_operation("register_equipment", started, &result);
        result
    }

    async fn register_equipment_inner(&self, owner_id: Ulid, new: NewEquipment) -> Result<Equipment, EngineError> {
        validate_name(&new.name)?;
        validate_category(new.category.as_deref())?;
        validate_prices(&new.prices)?;

        let now = now();
        let equipment = Equipment {
            id: Ulid::new(),
            owner_id,
            name: new.name,
            category: new.category,
            prices: new.prices,
            available: true,
            auto_approve: new.auto_approve,
            created_at: now,
            updated_at: now,
        };

        let _gate = self.commit_gate.read().await;
        let event = Event::EquipmentRegistered {
            equipment: equipment.clone(),
        };
        self.wal.append(&event).await?;
        self.store.insert_equipment(equipment.clone());
        metrics::gauge!(EQUIPMENT_ACTIVE).set(self.store.equipment_count() as f64);
        tracing::info!(equipment_id = %equipment.id, %owner_id, "equipment registered");
        Ok(equipment)
    }

    /// Owner-only partial update. Existing reservations keep their price.
    pub async fn update_equipment(
        &self,
        id: Ulid,
        owner_id: Ulid,
        update: EquipmentUpdate,
    ) -> Result<Equipment, EngineError> {
        let started = Instant::now();
        let result = self.update_equipment_inner(id, owner_id, update).await;
        record_operation("update_equipment", started, &result);
        result
    }

    async fn update_equipment_inner(
        &self,
        id: Ulid,
        owner_id: Ulid,
        update: EquipmentUpdate,
    ) -> Result<Equipment, EngineError> {
        if let Some(name) = &update.name {
            validate_name(name)?;
        }
        validate_category(update.category.as_deref())?;

        let _gate = self.commit_gate.read().await;
        let state = self
            .store
            .get_equipment(&id)
            .ok_or(EngineError::equipment_not_found(id))?;
        let mut guard = state.write().await;
        if guard.equipment.owner_id != owner_id {
            return Err(EngineError::Unauthorized("not the owner of this equipment"));
        }

        let mut equipment = guard.equipment.clone();
        if let Some(name) = update.name {
            equipment.name = name;
        }
        if let Some(category) = update.category {
            equipment.category = Some(category);
        }
        if let Some(p) = update.per_hour {
            equipment.prices.per_hour = Some(p);
        }
        if let Some(p) = update.per_day {
            equipment.prices.per_day = Some(p);
        }
        if let Some(p) = update.per_week {
            equipment.prices.per_week = Some(p);
        }
        if let Some(available) = update.available {
            equipment.available = available;
        }
        if let Some(auto_approve) = update.auto_approve {
            equipment.auto_approve = auto_approve;
        }
        validate_prices(&equipment.prices)?;
        equipment.updated_at = now();

        let event = Event::EquipmentUpdated {
            equipment: equipment.clone(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        tracing::info!(equipment_id = %id, "equipment updated");
        Ok(equipment)
    }

    pub async fn get_equipment(&self, id: Ulid) -> Result<Equipment, EngineError> {
        let state = self
            .store
            .get_equipment(&id)
            .ok_or(EngineError::equipment_not_found(id))?;
        let guard = state.read().await;
        Ok(guard.equipment.clone())
    }

    /// Oldest registration first.
    pub async fn list_equipment_for_owner(&self, owner_id: Ulid) -> Vec<Equipment> {
        let mut out = Vec::new();
        for id in self.store.equipment_of_owner(&owner_id) {
            if let Some(state) = self.store.get_equipment(&id) {
                out.push(state.read().await.equipment.clone());
            }
        }
        out.sort_by_key(|e| (e.created_at, e.id));
        out
    }

    /// Distinct categories across the catalog, sorted.
    pub async fn list_categories(&self) -> Vec<String> {
        let mut categories = BTreeSet::new();
        for id in self.store.equipment_ids() {
            let Some(state) = self.store.get_equipment(&id) else {
                continue;
            };
            if let Some(category) = state.read().await.equipment.category.clone() {
                categories.insert(category);
            }
        }
        categories.into_iter().collect()
    }
}
