use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::model::{Notification, NotificationDraft, NotificationEvent, Page};
use crate::wal::{Wal, WalHandle};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification not found: {0}")]
    NotFound(Ulid),
    #[error("notification {0} belongs to another user")]
    NotRecipient(Ulid),
    #[error("notification storage error: {0}")]
    Storage(String),
}

impl From<std::io::Error> for NotifyError {
    fn from(e: std::io::Error) -> Self {
        NotifyError::Storage(e.to_string())
    }
}

/// Durable destination for reservation notifications.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn record(&self, draft: NotificationDraft) -> Result<Notification, NotifyError>;
}

/// One user's notifications, oldest first.
type SharedInbox = Arc<RwLock<Vec<Notification>>>;

/// WAL-backed per-user inbox. Implements `NotificationSink` and the read/unread
/// bookkeeping on top of it.
pub struct NotificationStore {
    inboxes: DashMap<Ulid, SharedInbox>,
    /// Reverse lookup: notification id → recipient.
    recipients: DashMap<Ulid, Ulid>,
    wal: WalHandle<NotificationEvent>,
    /// Held shared by every mutation and exclusively by compaction.
    commit_gate: RwLock<()>,
}

impl NotificationStore {
    /// Replay the inbox log at `path` and start its writer.
    pub fn new(path: PathBuf) -> std::io::Result<Self> {
        Self::replay(path).map(|(store, _)| store)
    }

    /// `new`, then compact when the replayed log has reached `compact_threshold` records.
    pub async fn open(path: PathBuf, compact_threshold: u64) -> Result<Self, NotifyError> {
        let (store, replayed) = Self::replay(path)?;
        if compact_threshold > 0 && replayed as u64 >= compact_threshold {
            store.compact().await?;
            tracing::info!(replayed, "compacted notification log on open");
        }
        Ok(store)
    }

    fn replay(path: PathBuf) -> std::io::Result<(Self, usize)> {
        let events: Vec<NotificationEvent> = Wal::replay(&path)?;
        let replayed = events.len();
        let wal = Wal::open(&path)?;

        let mut inboxes: std::collections::HashMap<Ulid, Vec<Notification>> = Default::default();
        let recipients = DashMap::new();
        for event in events {
            apply_to_inbox(&mut inboxes, &recipients, event);
        }

        let store = Self {
            inboxes: DashMap::new(),
            recipients,
            wal: WalHandle::spawn(wal),
            commit_gate: RwLock::new(()),
        };
        for (user_id, inbox) in inboxes {
            store.inboxes.insert(user_id, Arc::new(RwLock::new(inbox)));
        }
        Ok((store, replayed))
    }

    fn inbox(&self, user_id: Ulid) -> SharedInbox {
        self.inboxes
            .entry(user_id)
            .or_insert_with(|| Arc::new(RwLock::new(Vec::new())))
            .value()
            .clone()
    }

    fn existing_inbox(&self, user_id: &Ulid) -> Option<SharedInbox> {
        self.inboxes.get(user_id).map(|e| e.value().clone())
    }

    /// Resolve the inbox holding `id` and check `user_id` owns it.
    fn owned_inbox(&self, id: Ulid, user_id: Ulid) -> Result<SharedInbox, NotifyError> {
        let recipient = self
            .recipients
            .get(&id)
            .map(|e| *e.value())
            .ok_or(NotifyError::NotFound(id))?;
        if recipient != user_id {
            return Err(NotifyError::NotRecipient(id));
        }
        self.existing_inbox(&recipient).ok_or(NotifyError::NotFound(id))
    }

    /// Newest first, with the unpaged total.
    pub async fn list(&self, user_id: Ulid, page: Page) -> (Vec<Notification>, usize) {
        let Some(inbox) = self.existing_inbox(&user_id) else {
            return (Vec::new(), 0);
        };
        let guard = inbox.read().await;
        let total = guard.len();
        let newest_first: Vec<Notification> = guard.iter().rev().cloned().collect();
        (page.apply(newest_first), total)
    }

    pub async fn unread_count(&self, user_id: Ulid) -> usize {
        match self.existing_inbox(&user_id) {
            Some(inbox) => inbox.read().await.iter().filter(|n| !n.read).count(),
            None => 0,
        }
    }

    pub async fn mark_read(&self, id: Ulid, user_id: Ulid) -> Result<(), NotifyError> {
        let _gate = self.commit_gate.read().await;
        let inbox = self.owned_inbox(id, user_id)?;
        let mut guard = inbox.write().await;
        let notification = guard
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or(NotifyError::NotFound(id))?;
        if notification.read {
            return Ok(());
        }
        self.wal.append(&NotificationEvent::Read { id, user_id }).await?;
        notification.read = true;
        Ok(())
    }

    /// Returns how many notifications flipped to read.
    pub async fn mark_all_read(&self, user_id: Ulid) -> Result<usize, NotifyError> {
        let _gate = self.commit_gate.read().await;
        let Some(inbox) = self.existing_inbox(&user_id) else {
            return Ok(0);
        };
        let mut guard = inbox.write().await;
        let unread = guard.iter().filter(|n| !n.read).count();
        if unread == 0 {
            return Ok(0);
        }
        self.wal.append(&NotificationEvent::AllRead { user_id }).await?;
        guard.iter_mut().for_each(|n| n.read = true);
        Ok(unread)
    }

    pub async fn delete(&self, id: Ulid, user_id: Ulid) -> Result<(), NotifyError> {
        let _gate = self.commit_gate.read().await;
        let inbox = self.owned_inbox(id, user_id)?;
        let mut guard = inbox.write().await;
        let pos = guard
            .iter()
            .position(|n| n.id == id)
            .ok_or(NotifyError::NotFound(id))?;
        self.wal.append(&NotificationEvent::Deleted { id, user_id }).await?;
        guard.remove(pos);
        self.recipients.remove(&id);
        Ok(())
    }

    /// Rewrite the inbox log as one `Recorded` per surviving notification.
    pub async fn compact(&self) -> Result<(), NotifyError> {
        let _gate = self.commit_gate.write().await;
        let inboxes: Vec<SharedInbox> = self.inboxes.iter().map(|e| e.value().clone()).collect();
        let mut records = Vec::new();
        for inbox in inboxes {
            let guard = inbox.read().await;
            records.extend(guard.iter().cloned().map(|notification| {
                NotificationEvent::Recorded { notification }
            }));
        }
        self.wal.compact(records).await?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.recipients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipients.is_empty()
    }
}

#[async_trait]
impl NotificationSink for NotificationStore {
    async fn record(&self, draft: NotificationDraft) -> Result<Notification, NotifyError> {
        let notification = Notification {
            id: Ulid::new(),
            user_id: draft.user_id,
            kind: draft.kind,
            title: draft.title,
            message: draft.message,
            read: false,
            reference: draft.reference,
            created_at: Utc::now(),
        };

        let _gate = self.commit_gate.read().await;
        let inbox = self.inbox(notification.user_id);
        let mut guard = inbox.write().await;
        self.wal
            .append(&NotificationEvent::Recorded {
                notification: notification.clone(),
            })
            .await?;
        guard.push(notification.clone());
        self.recipients.insert(notification.id, notification.user_id);
        Ok(notification)
    }
}

fn apply_to_inbox(
    inboxes: &mut std::collections::HashMap<Ulid, Vec<Notification>>,
    recipients: &DashMap<Ulid, Ulid>,
    event: NotificationEvent,
) {
    match event {
        NotificationEvent::Recorded { notification } => {
            recipients.insert(notification.id, notification.user_id);
            inboxes
                .entry(notification.user_id)
                .or_default()
                .push(notification);
        }
        NotificationEvent::Read { id, user_id } => {
            if let Some(n) = inboxes
                .get_mut(&user_id)
                .and_then(|inbox| inbox.iter_mut().find(|n| n.id == id))
            {
                n.read = true;
            }
        }
        NotificationEvent::AllRead { user_id } => {
            if let Some(inbox) = inboxes.get_mut(&user_id) {
                inbox.iter_mut().for_each(|n| n.read = true);
            }
        }
        NotificationEvent::Deleted { id, user_id } => {
            if let Some(inbox) = inboxes.get_mut(&user_id) {
                inbox.retain(|n| n.id != id);
            }
            recipients.remove(&id);
        }
    }
}
