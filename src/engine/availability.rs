use std::collections::BTreeSet;

use chrono::NaiveDate;

use crate::limits::MAX_CALENDAR_DAYS;
use crate::model::*;

use super::EngineError;

// ── Availability calendar ─────────────────────────────────────────

pub(crate) fn validate_window(from: NaiveDate, to: NaiveDate) -> Result<(), EngineError> {
    if to < from {
        return Err(EngineError::Validation("end date must not be before start date".into()));
    }
    if (to - from).num_days() + 1 > MAX_CALENDAR_DAYS {
        return Err(EngineError::Validation("calendar window too wide".into()));
    }
    Ok(())
}

/// Calendar days inside `[from, to]` touched by a blocking reservation.
///
/// A reservation blocks every UTC date from its start date through its end
/// date, including a partially used last day.
pub fn blocked_days<'a>(
    reservations: impl IntoIterator<Item = &'a Reservation>,
    from: NaiveDate,
    to: NaiveDate,
) -> BTreeSet<NaiveDate> {
    let mut blocked = BTreeSet::new();
    for r in reservations {
        if !r.is_blocking() {
            continue;
        }
        let first = r.start_date.date_naive().max(from);
        let last = r.end_date.date_naive().min(to);
        blocked.extend(first.iter_days().take_while(|d| *d <= last));
    }
    blocked
}

/// One entry per day of `[from, to]`, ascending.
pub fn calendar(state: &EquipmentState, from: NaiveDate, to: NaiveDate) -> Vec<DayAvailability> {
    let touching = state.reservations.iter().filter(|r| {
        r.start_date.date_naive() <= to && r.end_date.date_naive() >= from
    });
    let blocked = blocked_days(touching, from, to);

    from.iter_days()
        .take_while(|d| *d <= to)
        .map(|date| DayAvailability {
            date,
            available: !blocked.contains(&date),
        })
        .collect()
}
