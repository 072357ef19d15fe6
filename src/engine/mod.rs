mod availability;
mod catalog;
mod conflict;
mod error;
mod lifecycle;
mod mutations;
mod queries;
mod store;
#[cfg(test)]
mod tests;

pub use availability::{blocked_days, calendar};
pub use error::{EngineError, Entity, ErrorKind};
pub use queries::Summary;

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::RwLock;
use ulid::Ulid;

use crate::model::*;
use crate::notify::NotificationSink;
use crate::observability::{EQUIPMENT_ACTIVE, NOTIFICATION_FAILURES_TOTAL};
use crate::wal::{Wal, WalHandle};

use lifecycle::Notice;
use store::Store;

pub type SharedEquipmentState = Arc<RwLock<EquipmentState>>;

/// The reservation engine. Each equipment's state sits behind its own lock;
/// every availability check and the write that depends on it happen under
/// that lock, so concurrent requests for one item are serialized while
/// different items proceed in parallel.
pub struct Engine {
    pub(super) store: Store,
    pub(super) wal: WalHandle<Event>,
    pub(super) notifier: Arc<dyn NotificationSink>,
    /// Held shared by every mutation and exclusively by compaction.
    pub(super) commit_gate: RwLock<()>,
}

impl Engine {
    /// Replay the log at `wal_path` and start its writer. Must run inside a tokio runtime.
    pub fn new(wal_path: PathBuf, notifier: Arc<dyn NotificationSink>) -> Result<Self, EngineError> {
        Self::replay(wal_path, notifier).map(|(engine, _)| engine)
    }

    /// `new`, then compact when the replayed log has reached `compact_threshold` records.
    pub async fn open(
        wal_path: PathBuf,
        notifier: Arc<dyn NotificationSink>,
        compact_threshold: u64,
    ) -> Result<Self, EngineError> {
        let (engine, replayed) = Self::replay(wal_path, notifier)?;
        if compact_threshold > 0 && replayed as u64 >= compact_threshold {
            engine.compact_wal().await?;
            tracing::info!(replayed, "compacted rental log on open");
        }
        Ok(engine)
    }

    fn replay(wal_path: PathBuf, notifier: Arc<dyn NotificationSink>) -> Result<(Self, usize), EngineError> {
        let events: Vec<Event> = Wal::replay(&wal_path)?;
        let replayed = events.len();
        let wal = Wal::open(&wal_path)?;
        let store = Store::from_events(events);
        metrics::gauge!(EQUIPMENT_ACTIVE).set(store.equipment_count() as f64);
        let engine = Self {
            store,
            wal: WalHandle::spawn(wal),
            notifier,
            commit_gate: RwLock::new(()),
        };
        Ok((engine, replayed))
    }

    /// WAL-append + apply in one call. Caller holds the equipment write lock.
    pub(super) async fn persist_and_apply(
        &self,
        state: &mut EquipmentState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal.append(event).await?;
        self.store.apply_event(state, event);
        Ok(())
    }

    /// Lookup reservation → equipment, acquire that equipment's write lock.
    pub(super) async fn resolve_reservation_write(
        &self,
        reservation_id: &Ulid,
    ) -> Result<tokio::sync::OwnedRwLockWriteGuard<EquipmentState>, EngineError> {
        let equipment_id = self
            .store
            .equipment_for_reservation(reservation_id)
            .ok_or(EngineError::reservation_not_found(*reservation_id))?;
        let state = self
            .store
            .get_equipment(&equipment_id)
            .ok_or(EngineError::reservation_not_found(*reservation_id))?;
        Ok(state.write_owned().await)
    }

    /// Record a notification. Failures are logged and counted, never returned.
    pub(super) async fn emit(&self, notice: Notice, reservation_id: Ulid) {
        let recipient = notice.recipient;
        let kind = notice.kind;
        if let Err(e) = self.notifier.record(notice.into_draft(reservation_id)).await {
            metrics::counter!(NOTIFICATION_FAILURES_TOTAL, "kind" => format!("{kind:?}"))
                .increment(1);
            tracing::warn!(
                %reservation_id,
                %recipient,
                ?kind,
                "failed to record notification: {e}"
            );
        }
    }
}
