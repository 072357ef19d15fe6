use chrono::{NaiveTime, Utc};

use crate::limits::*;
use crate::model::*;

use super::EngineError;

pub(crate) fn now() -> Timestamp {
    Utc::now()
}

/// Start of the current UTC day. Reservations may start anywhere in today.
fn today_start(now: Timestamp) -> Timestamp {
    now.date_naive().and_time(NaiveTime::MIN).and_utc()
}

pub(crate) fn validate_range(start: Timestamp, end: Timestamp, now: Timestamp) -> Result<DateRange, EngineError> {
    if end <= start {
        return Err(EngineError::Validation("end_date must be after start_date".into()));
    }
    if start < today_start(now) {
        return Err(EngineError::Validation("start_date must be in the future".into()));
    }
    Ok(DateRange::new(start, end))
}

/// Blank reasons are stored as no reason.
pub(crate) fn validate_reason(reason: Option<String>) -> Result<Option<String>, EngineError> {
    match reason {
        Some(r) if r.len() > MAX_REASON_LEN => {
            Err(EngineError::Validation("reason too long".into()))
        }
        Some(r) if r.trim().is_empty() => Ok(None),
        other => Ok(other),
    }
}

pub(crate) fn validate_name(name: &str) -> Result<(), EngineError> {
    if name.trim().is_empty() {
        return Err(EngineError::Validation("name is required".into()));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(EngineError::Validation("name too long".into()));
    }
    Ok(())
}

pub(crate) fn validate_category(category: Option<&str>) -> Result<(), EngineError> {
    if category.is_some_and(|c| c.len() > MAX_CATEGORY_LEN) {
        return Err(EngineError::Validation("category too long".into()));
    }
    Ok(())
}

pub(crate) fn validate_prices(prices: &PriceTiers) -> Result<(), EngineError> {
    if prices.is_empty() {
        return Err(EngineError::Validation("at least one price must be set".into()));
    }
    if prices.iter().any(|p| !p.is_finite() || p < 0.0) {
        return Err(EngineError::Validation("prices must be non-negative numbers".into()));
    }
    Ok(())
}

/// Caller must hold the equipment's write lock across this check and the insert.
pub(crate) fn check_no_conflict(state: &EquipmentState, range: &DateRange) -> Result<(), EngineError> {
    match state.blocking_overlapping(range).next() {
        Some(existing) => Err(EngineError::Conflict {
            equipment_id: state.equipment.id,
            blocking: Some(existing.id),
        }),
        None => Ok(()),
    }
}
