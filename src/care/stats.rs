use std::collections::BTreeMap;

use serde::Serialize;

use super::model::{Breast, FeedingDetail, FeedingEvent};

/// Breast-milk feeding summary. Durations are minutes; days are UTC dates.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreastFeedingStats {
    pub total_duration: u64,
    pub average_duration: f64,
    pub max_duration: u32,
    pub left_breast_count: u32,
    pub right_breast_count: u32,
    pub total_count: u32,
    pub daily_stats: BTreeMap<String, u64>,
}

/// Summarize the breast-milk events among `feedings`; other kinds are ignored.
pub fn breast_feeding_stats<'a, I>(feedings: I) -> BreastFeedingStats
where
    I: IntoIterator<Item = &'a FeedingEvent>,
{
    let mut stats = BreastFeedingStats::default();
    for ev in feedings {
        let FeedingDetail::BreastMilk { duration_minutes, breast } = &ev.detail else { continue };
        stats.total_count += 1;
        stats.total_duration += u64::from(*duration_minutes);
        stats.max_duration = stats.max_duration.max(*duration_minutes);
        match breast {
            Breast::Left => stats.left_breast_count += 1,
            Breast::Right => stats.right_breast_count += 1,
        }
        let day = ev.start_time.date_naive().format("%Y-%m-%d").to_string();
        *stats.daily_stats.entry(day).or_insert(0) += u64::from(*duration_minutes);
    }
    if stats.total_count > 0 {
        stats.average_duration = stats.total_duration as f64 / f64::from(stats.total_count);
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn breast(id: &str, ts: (u32, u32), minutes: u32, side: Breast) -> FeedingEvent {
        FeedingEvent {
            id: id.into(),
            start_time: Utc.with_ymd_and_hms(2025, 3, ts.0, ts.1, 0, 0).unwrap(),
            notes: None,
            detail: FeedingDetail::BreastMilk { duration_minutes: minutes, breast: side },
        }
    }

    #[test]
    fn empty_input_gives_zeroes() {
        let s = breast_feeding_stats(&Vec::<FeedingEvent>::new());
        assert_eq!(s, BreastFeedingStats::default());
        assert_eq!(s.average_duration, 0.0);
    }

    #[test]
    fn totals_sides_and_days() {
        let events = vec![
            breast("a", (1, 6), 10, Breast::Left),
            breast("b", (1, 23), 20, Breast::Right),
            breast("c", (2, 1), 15, Breast::Left),
            FeedingEvent {
                id: "w".into(),
                start_time: Utc.with_ymd_and_hms(2025, 3, 2, 9, 0, 0).unwrap(),
                notes: None,
                detail: FeedingDetail::Water { amount_ml: 40.0 },
            },
        ];
        let s = breast_feeding_stats(&events);
        assert_eq!(s.total_count, 3);
        assert_eq!(s.total_duration, 45);
        assert_eq!(s.max_duration, 20);
        assert_eq!(s.average_duration, 15.0);
        assert_eq!(s.left_breast_count, 2);
        assert_eq!(s.right_breast_count, 1);
        assert_eq!(s.daily_stats.get("2025-03-01"), Some(&30));
        assert_eq!(s.daily_stats.get("2025-03-02"), Some(&15));
    }
}
