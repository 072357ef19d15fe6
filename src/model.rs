use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::limits::{DEFAULT_PER_PAGE, MAX_PER_PAGE};

/// UTC instant. The only time type stored on reservations.
pub type Timestamp = DateTime<Utc>;

/// Closed interval `[start, end]`. Two ranges sharing a boundary instant overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl DateRange {
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        debug_assert!(start < end, "DateRange start must be before end");
        Self { start, end }
    }

    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

/// Up to three rental price tiers. Equipment must carry at least one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceTiers {
    pub per_hour: Option<f64>,
    pub per_day: Option<f64>,
    pub per_week: Option<f64>,
}

impl PriceTiers {
    pub fn is_empty(&self) -> bool {
        self.per_hour.is_none() && self.per_day.is_none() && self.per_week.is_none()
    }

    pub fn iter(&self) -> impl Iterator<Item = f64> {
        [self.per_hour, self.per_day, self.per_week].into_iter().flatten()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Equipment {
    pub id: Ulid,
    pub owner_id: Ulid,
    pub name: String,
    pub category: Option<String>,
    pub prices: PriceTiers,
    /// Owner-controlled visibility. Unavailable equipment accepts no new reservations.
    pub available: bool,
    /// New reservations skip the pending review step.
    pub auto_approve: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Input for registering a piece of equipment.
#[derive(Debug, Clone, Default)]
pub struct NewEquipment {
    pub name: String,
    pub category: Option<String>,
    pub prices: PriceTiers,
    pub auto_approve: bool,
}

/// Partial update; `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct EquipmentUpdate {
    pub name: Option<String>,
    pub category: Option<String>,
    pub per_hour: Option<f64>,
    pub per_day: Option<f64>,
    pub per_week: Option<f64>,
    pub available: Option<bool>,
    pub auto_approve: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
    Completed,
}

impl ReservationStatus {
    /// Pending and approved reservations hold their dates.
    pub fn is_blocking(self) -> bool {
        matches!(self, ReservationStatus::Pending | ReservationStatus::Approved)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Approved => "approved",
            ReservationStatus::Rejected => "rejected",
            ReservationStatus::Cancelled => "cancelled",
            ReservationStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub equipment_id: Ulid,
    pub renter_id: Ulid,
    pub start_date: Timestamp,
    pub end_date: Timestamp,
    pub status: ReservationStatus,
    /// Fixed at creation.
    pub total_price: f64,
    /// Only set on rejected or cancelled reservations.
    pub cancellation_reason: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Reservation {
    pub fn is_blocking(&self) -> bool {
        self.status.is_blocking()
    }
}

/// One equipment record plus every reservation ever made against it.
#[derive(Debug, Clone)]
pub struct EquipmentState {
    pub equipment: Equipment,
    /// Sorted by `start_date`.
    pub reservations: Vec<Reservation>,
}

impl EquipmentState {
    pub fn new(equipment: Equipment) -> Self {
        Self {
            equipment,
            reservations: Vec::new(),
        }
    }

    /// Insert maintaining sort order by `start_date`.
    pub fn insert_reservation(&mut self, reservation: Reservation) {
        let pos = self
            .reservations
            .binary_search_by_key(&reservation.start_date, |r| r.start_date)
            .unwrap_or_else(|e| e);
        self.reservations.insert(pos, reservation);
    }

    pub fn reservation(&self, id: &Ulid) -> Option<&Reservation> {
        self.reservations.iter().find(|r| r.id == *id)
    }

    pub fn reservation_mut(&mut self, id: &Ulid) -> Option<&mut Reservation> {
        self.reservations.iter_mut().find(|r| r.id == *id)
    }

    /// Reservations (any status) whose range overlaps `query`, inclusively.
    /// Binary search skips everything starting after `query.end`.
    pub fn overlapping(&self, query: &DateRange) -> impl Iterator<Item = &Reservation> {
        let right_bound = self
            .reservations
            .partition_point(|r| r.start_date <= query.end);
        self.reservations[..right_bound]
            .iter()
            .filter(move |r| r.end_date >= query.start)
    }

    pub fn blocking_overlapping(&self, query: &DateRange) -> impl Iterator<Item = &Reservation> {
        self.overlapping(query).filter(|r| r.is_blocking())
    }
}

/// Rental log record. Flat, no nesting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    EquipmentRegistered {
        equipment: Equipment,
    },
    EquipmentUpdated {
        equipment: Equipment,
    },
    ReservationCreated {
        reservation: Reservation,
    },
    ReservationStatusChanged {
        id: Ulid,
        equipment_id: Ulid,
        status: ReservationStatus,
        reason: Option<String>,
        at: Timestamp,
    },
}

impl Event {
    pub fn equipment_id(&self) -> Ulid {
        match self {
            Event::EquipmentRegistered { equipment } | Event::EquipmentUpdated { equipment } => {
                equipment.id
            }
            Event::ReservationCreated { reservation } => reservation.equipment_id,
            Event::ReservationStatusChanged { equipment_id, .. } => *equipment_id,
        }
    }
}

// ── Notifications ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    ReservationCreated,
    ReservationApproved,
    ReservationRejected,
    ReservationCancelled,
    ReservationCompleted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub id: Ulid,
    pub kind: String,
}

impl Reference {
    pub fn reservation(id: Ulid) -> Self {
        Self {
            id,
            kind: "reservation".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Ulid,
    pub user_id: Ulid,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub read: bool,
    pub reference: Option<Reference>,
    pub created_at: Timestamp,
}

/// What a caller hands to a notification sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationDraft {
    pub user_id: Ulid,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub reference: Option<Reference>,
}

/// Inbox log record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationEvent {
    Recorded { notification: Notification },
    Read { id: Ulid, user_id: Ulid },
    AllRead { user_id: Ulid },
    Deleted { id: Ulid, user_id: Ulid },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DayAvailability {
    pub date: NaiveDate,
    pub available: bool,
}

/// 1-based page request, clamped on construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: usize,
    pub per_page: usize,
}

impl Page {
    pub fn new(page: i64, per_page: i64) -> Self {
        let page = if page < 1 { 1 } else { page as usize };
        let per_page = if per_page < 1 {
            DEFAULT_PER_PAGE
        } else {
            (per_page as usize).min(MAX_PER_PAGE)
        };
        Self { page, per_page }
    }

    pub fn offset(&self) -> usize {
        (self.page - 1).saturating_mul(self.per_page)
    }

    /// Slice one page out of an already ordered list.
    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        items
            .into_iter()
            .skip(self.offset())
            .take(self.per_page)
            .collect()
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(1, DEFAULT_PER_PAGE as i64)
    }
}
