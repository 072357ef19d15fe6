use crate::model::{PriceTiers, Timestamp};

const MS_PER_HOUR: f64 = 3_600_000.0;

/// Total rental price for `[start, end]`.
///
/// Days are `ceil(hours / 24)`. The weekly tier wins from seven days on, with
/// leftover days charged at the daily rate; when no daily rate exists the
/// leftover days are not charged. Otherwise daily, then hourly (`ceil(hours)`).
/// No currency rounding happens here.
pub fn price(tiers: &PriceTiers, start: Timestamp, end: Timestamp) -> f64 {
    let hours = (end - start).num_milliseconds() as f64 / MS_PER_HOUR;
    let days = (hours / 24.0).ceil() as i64;

    if let Some(weekly) = tiers.per_week
        && days >= 7
    {
        let weeks = days / 7;
        let remaining_days = days % 7;
        let week_price = weeks as f64 * weekly;
        return match tiers.per_day {
            Some(daily) if remaining_days > 0 => week_price + remaining_days as f64 * daily,
            _ => week_price,
        };
    }

    if let Some(daily) = tiers.per_day {
        return days as f64 * daily;
    }

    if let Some(hourly) = tiers.per_hour {
        return hours.ceil() * hourly;
    }

    0.0
}
