//! UTC date-range filtering for bar series.

use chrono::NaiveDate;

use crate::domain::Bar;

const DAY_SECONDS: i64 = 86_400;

fn midnight(date: NaiveDate) -> Option<i64> {
    date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc().timestamp())
}

/// Keep bars whose open time falls within `[start 00:00, end 23:59:59]` UTC.
pub fn filter_by_date(bars: Vec<Bar>, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Vec<Bar> {
    let lo = start.and_then(midnight);
    let hi = end.and_then(midnight).map(|ts| ts + DAY_SECONDS - 1);
    if lo.is_none() && hi.is_none() {
        return bars;
    }
    bars.into_iter()
        .filter(|b| lo.map_or(true, |lo| b.timestamp >= lo) && hi.map_or(true, |hi| b.timestamp <= hi))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar_at(ts: i64) -> Bar {
        Bar {
            timestamp: ts,
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
            volume: 0.0,
        }
    }

    #[test]
    fn end_day_is_inclusive() {
        // 2024-01-01 00:00, 2024-01-01 23:00, 2024-01-02 00:00
        let bars = vec![
            bar_at(1_704_067_200),
            bar_at(1_704_067_200 + 23 * 3600),
            bar_at(1_704_067_200 + DAY_SECONDS),
        ];
        let day = NaiveDate::from_ymd_opt(2024, 1, 1);
        let kept = filter_by_date(bars, day, day);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn no_bounds_is_identity() {
        let bars = vec![bar_at(1), bar_at(2)];
        assert_eq!(filter_by_date(bars.clone(), None, None), bars);
    }
}
