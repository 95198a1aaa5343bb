//! Simulation-tick to calendar-date mapping.
//!
//! The simulated office advances a discrete tick counter during business
//! hours only; a simulated business day spans
//! `ticks_per_hour * (work_end_hour - work_start_hour)` ticks. Mapping a
//! tick to a real date walks forward from an anchor date counting business
//! days, so weekends never appear in day-bucketed reports.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::types::Communication;

/// Tick geometry plus the real-world anchor for simulated day 0.
/// Defaults mirror the simulation engine's settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarConfig {
    pub ticks_per_hour: i64,
    pub work_start_hour: i64,
    pub work_end_hour: i64,
    pub anchor_date: NaiveDate,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            ticks_per_hour: 480,
            work_start_hour: 9,
            work_end_hour: 18,
            anchor_date: NaiveDate::from_ymd_opt(2025, 10, 14).expect("valid anchor"),
        }
    }
}

impl CalendarConfig {
    /// Ticks in one simulated business day.
    pub fn ticks_per_day(&self) -> i64 {
        self.ticks_per_hour * (self.work_end_hour - self.work_start_hour)
    }
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Converts tick counters into business-day-aware calendar dates and
/// groups communication batches by day.
#[derive(Debug, Clone)]
pub struct VirtualCalendarMapper {
    config: CalendarConfig,
    /// Anchor rolled forward to a weekday so day 0 is a business day.
    anchor: NaiveDate,
}

impl VirtualCalendarMapper {
    pub fn new(config: CalendarConfig) -> Self {
        let mut anchor = config.anchor_date;
        while is_weekend(anchor) {
            anchor = anchor.succ_opt().expect("date range");
        }
        Self { config, anchor }
    }

    pub fn config(&self) -> &CalendarConfig {
        &self.config
    }

    /// Map a tick to its calendar date: `tick / ticks_per_day` business
    /// days after the anchor, weekends skipped.
    pub fn tick_to_date(&self, tick: i64) -> NaiveDate {
        let day_index = tick.max(0) / self.config.ticks_per_day();
        let mut date = self.anchor;
        let mut remaining = day_index;
        while remaining > 0 {
            date = date.succ_opt().expect("date range");
            if !is_weekend(date) {
                remaining -= 1;
            }
        }
        date
    }

    /// Hour of the simulated day a tick falls in.
    pub fn tick_to_hour(&self, tick: i64) -> i64 {
        let within_day = tick.max(0) % self.config.ticks_per_day();
        self.config.work_start_hour + within_day / self.config.ticks_per_hour
    }

    /// Map a tick to a date, clamping to the last business day of a known
    /// tick range instead of extrapolating past it. The range usually comes
    /// from the simulation's own tick log, which can end before stray
    /// message ticks do.
    pub fn tick_to_date_clamped(&self, tick: i64, max_tick: i64) -> NaiveDate {
        if tick > max_tick {
            log::warn!(
                "Tick {} is beyond the known range (max {}), clamping to last known day",
                tick,
                max_tick
            );
        }
        self.tick_to_date(tick.min(max_tick))
    }

    /// Build the day index for a batch with no externally known tick range:
    /// the range is taken from the batch itself.
    pub fn group_by_day(&self, communications: &[Communication]) -> VirtualDayIndex {
        self.group_by_day_with_range(communications, None)
    }

    /// Build the immutable day index for a batch.
    ///
    /// `known_max_tick` is the end of the simulation's tick range when the
    /// caller has one (e.g. from the engine's tick log); message ticks
    /// beyond it clamp to that last business day instead of extrapolating.
    /// Without it the observed batch maximum is used.
    ///
    /// Communications with a negative tick are data-quality failures: they
    /// are logged and excluded rather than corrupting the index.
    /// Communications without a tick get a synthetic one, evenly
    /// distributed (ordered by `sent_at`) across the tick range.
    pub fn group_by_day_with_range(
        &self,
        communications: &[Communication],
        known_max_tick: Option<i64>,
    ) -> VirtualDayIndex {
        let mut ticked: Vec<(i64, Communication)> = Vec::new();
        let mut untracked: Vec<Communication> = Vec::new();
        let mut excluded = 0usize;

        for comm in communications {
            match comm.virtual_tick {
                Some(tick) if tick < 0 => {
                    log::warn!(
                        "Communication {} has negative tick {}, excluding from day index",
                        comm.id,
                        tick
                    );
                    excluded += 1;
                }
                Some(tick) => ticked.push((tick, comm.clone())),
                None => untracked.push(comm.clone()),
            }
        }

        // Known range wins over the observed one; a batch with no tick data
        // at all collapses onto the anchor day.
        let max_tick = known_max_tick.unwrap_or_else(|| {
            ticked
                .iter()
                .map(|(t, _)| *t)
                .max()
                .unwrap_or(self.config.ticks_per_day() - 1)
        });

        // Synthetic backfill for legacy data: spread across [0, max_tick]
        // by sent_at order, preserving relative ordering.
        untracked.sort_by(|a, b| a.sent_at.cmp(&b.sent_at));
        let n = untracked.len();
        for (i, comm) in untracked.into_iter().enumerate() {
            let tick = if n <= 1 {
                0
            } else {
                (i as i64).saturating_mul(max_tick) / (n as i64 - 1)
            };
            ticked.push((tick, comm));
        }

        // Stable sort keeps input order within equal ticks, which in turn
        // keeps day buckets stable.
        ticked.sort_by_key(|(tick, _)| *tick);

        let mut days: BTreeMap<NaiveDate, Vec<Communication>> = BTreeMap::new();
        for (tick, comm) in ticked {
            let date = self.tick_to_date_clamped(tick, max_tick);
            days.entry(date).or_default().push(comm);
        }

        VirtualDayIndex {
            days,
            excluded,
            max_tick,
        }
    }
}

/// Snapshot mapping calendar dates to their communications, ascending by
/// date. Immutable for the duration of a run; iteration is restartable.
#[derive(Debug, Clone)]
pub struct VirtualDayIndex {
    days: BTreeMap<NaiveDate, Vec<Communication>>,
    excluded: usize,
    max_tick: i64,
}

impl VirtualDayIndex {
    /// (date, communications) pairs in ascending date order.
    pub fn iter(&self) -> impl Iterator<Item = (&NaiveDate, &[Communication])> {
        self.days.iter().map(|(date, comms)| (date, comms.as_slice()))
    }

    pub fn day_count(&self) -> usize {
        self.days.len()
    }

    /// Communications dropped for negative ticks.
    pub fn excluded(&self) -> usize {
        self.excluded
    }

    /// End of the tick range the index was built against: the known range
    /// when one was supplied, otherwise the batch maximum.
    pub fn max_tick(&self) -> i64 {
        self.max_tick
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Channel;

    fn comm(id: &str, tick: Option<i64>, sent_at: &str) -> Communication {
        Communication {
            id: id.to_string(),
            channel: Channel::Email,
            sender: "a@office.example".to_string(),
            recipients: vec!["b@office.example".to_string()],
            subject: Some("subject".to_string()),
            body: "body".to_string(),
            sent_at: sent_at.to_string(),
            virtual_tick: tick,
        }
    }

    fn mapper() -> VirtualCalendarMapper {
        VirtualCalendarMapper::new(CalendarConfig::default())
    }

    #[test]
    fn test_tick_zero_maps_to_anchor_at_work_start() {
        // Anchor 2025-10-14 is a Tuesday; 480 ticks/hour, work 9-18.
        let m = mapper();
        assert_eq!(
            m.tick_to_date(0),
            NaiveDate::from_ymd_opt(2025, 10, 14).unwrap()
        );
        assert_eq!(m.tick_to_hour(0), 9);
    }

    #[test]
    fn test_hour_offset_within_day() {
        let m = mapper();
        // 3 hours into day 0
        assert_eq!(m.tick_to_hour(480 * 3), 12);
        // last hour of the day
        assert_eq!(m.tick_to_hour(4320 - 1), 17);
    }

    #[test]
    fn test_business_day_advance_skips_weekend() {
        let m = mapper();
        let ticks_per_day = m.config().ticks_per_day();
        // Day 3 from Tuesday = Friday; day 4 skips the weekend to Monday.
        assert_eq!(
            m.tick_to_date(3 * ticks_per_day),
            NaiveDate::from_ymd_opt(2025, 10, 17).unwrap()
        );
        assert_eq!(
            m.tick_to_date(4 * ticks_per_day),
            NaiveDate::from_ymd_opt(2025, 10, 20).unwrap()
        );
    }

    #[test]
    fn test_monotonic_and_never_weekend() {
        let m = mapper();
        let mut prev = m.tick_to_date(0);
        for tick in (0..4320 * 30).step_by(997) {
            let date = m.tick_to_date(tick);
            assert!(date >= prev, "dates must be non-decreasing in tick");
            assert!(!is_weekend(date), "{date} is a weekend");
            prev = date;
        }
    }

    #[test]
    fn test_weekend_anchor_rolls_forward() {
        let config = CalendarConfig {
            anchor_date: NaiveDate::from_ymd_opt(2025, 10, 18).unwrap(), // Saturday
            ..CalendarConfig::default()
        };
        let m = VirtualCalendarMapper::new(config);
        assert_eq!(
            m.tick_to_date(0),
            NaiveDate::from_ymd_opt(2025, 10, 20).unwrap() // Monday
        );
    }

    #[test]
    fn test_group_by_day_buckets_and_order() {
        let m = mapper();
        let ticks_per_day = m.config().ticks_per_day();
        let comms = vec![
            comm("c1", Some(ticks_per_day + 10), "2025-10-14T10:00:00+00:00"),
            comm("c2", Some(5), "2025-10-14T09:00:00+00:00"),
            comm("c3", Some(20), "2025-10-14T09:30:00+00:00"),
        ];
        let index = m.group_by_day(&comms);
        assert_eq!(index.day_count(), 2);

        let days: Vec<_> = index.iter().collect();
        assert_eq!(*days[0].0, NaiveDate::from_ymd_opt(2025, 10, 14).unwrap());
        let day0_ids: Vec<&str> = days[0].1.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(day0_ids, ["c2", "c3"]);
        assert_eq!(*days[1].0, NaiveDate::from_ymd_opt(2025, 10, 15).unwrap());

        // Restartable: a second pass sees the same thing
        assert_eq!(index.iter().count(), 2);
    }

    #[test]
    fn test_negative_tick_excluded_with_count() {
        let m = mapper();
        let comms = vec![
            comm("good", Some(0), "2025-10-14T09:00:00+00:00"),
            comm("bad", Some(-7), "2025-10-14T09:00:00+00:00"),
        ];
        let index = m.group_by_day(&comms);
        assert_eq!(index.excluded(), 1);
        let total: usize = index.iter().map(|(_, comms)| comms.len()).sum();
        assert_eq!(total, 1);
    }

    #[test]
    fn test_synthetic_backfill_preserves_sent_order() {
        let m = mapper();
        let ticks_per_day = m.config().ticks_per_day();
        // One ticked message establishes a two-day range; three legacy
        // messages spread across it by sent_at.
        let comms = vec![
            comm("anchor", Some(2 * ticks_per_day - 1), "2025-10-14T09:00:00+00:00"),
            comm("late", None, "2025-10-14T17:00:00+00:00"),
            comm("early", None, "2025-10-14T09:05:00+00:00"),
            comm("mid", None, "2025-10-14T12:00:00+00:00"),
        ];
        let index = m.group_by_day(&comms);

        let ordered: Vec<&str> = index
            .iter()
            .flat_map(|(_, comms)| comms.iter().map(|c| c.id.as_str()))
            .collect();
        let early_pos = ordered.iter().position(|id| *id == "early").unwrap();
        let mid_pos = ordered.iter().position(|id| *id == "mid").unwrap();
        let late_pos = ordered.iter().position(|id| *id == "late").unwrap();
        assert!(early_pos < mid_pos && mid_pos < late_pos);

        // The last synthetic tick lands on the last observed day, not past it
        assert_eq!(index.day_count(), 2);
    }

    #[test]
    fn test_tick_beyond_known_range_clamps_to_last_day() {
        let m = mapper();
        let ticks_per_day = m.config().ticks_per_day();
        // Known range ends mid-day 1 (Wednesday); one message carries a
        // stray tick far beyond it.
        let known_max = ticks_per_day + ticks_per_day / 2;
        let last_known_day = m.tick_to_date(known_max);
        assert_eq!(last_known_day, NaiveDate::from_ymd_opt(2025, 10, 15).unwrap());

        assert_eq!(m.tick_to_date_clamped(100 * known_max, known_max), last_known_day);
        assert_eq!(m.tick_to_date_clamped(known_max - 1, known_max),
            m.tick_to_date(known_max - 1));

        let comms = vec![
            comm("ok", Some(10), "2025-10-14T09:00:00+00:00"),
            comm("stray", Some(100 * known_max), "2025-10-14T10:00:00+00:00"),
        ];
        let index = m.group_by_day_with_range(&comms, Some(known_max));
        assert_eq!(index.max_tick(), known_max);
        let days: Vec<_> = index.iter().collect();
        assert_eq!(days.len(), 2);
        assert_eq!(*days[1].0, last_known_day, "stray tick lands on the last known day");
        assert_eq!(days[1].1[0].id, "stray");
    }

    #[test]
    fn test_batch_without_ticks_lands_on_anchor_day() {
        let m = mapper();
        let comms = vec![
            comm("c1", None, "2025-10-14T09:00:00+00:00"),
            comm("c2", None, "2025-10-14T10:00:00+00:00"),
        ];
        let index = m.group_by_day(&comms);
        assert_eq!(index.day_count(), 1);
        let days: Vec<_> = index.iter().collect();
        assert_eq!(*days[0].0, NaiveDate::from_ymd_opt(2025, 10, 14).unwrap());
    }
}
