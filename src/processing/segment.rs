use chrono::{DateTime, Days, NaiveDate, TimeZone, Utc};
use ndarray::{s, Array2, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::processing::channel::{sample_index_at_or_after, sample_offset, seconds_between};
use crate::processing::{AlignedBlock, ChannelKind, ChannelMeta};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Completeness {
    Full,
    Partial,
}

/// One UTC calendar day (or the covered part of it) of an aligned block.
#[derive(Clone, Debug, PartialEq)]
pub struct DayBlock {
    station_id: String,
    day: NaiveDate,
    start: DateTime<Utc>,
    sample_rate_hz: f64,
    channels: Vec<ChannelMeta>,
    data: Array2<f64>,
    completeness: Completeness,
}

impl DayBlock {
    pub fn station_id(&self) -> &str {
        &self.station_id
    }

    pub fn day(&self) -> NaiveDate {
        self.day
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn sample_rate_hz(&self) -> f64 {
        self.sample_rate_hz
    }

    pub fn sample_count(&self) -> usize {
        self.data.ncols()
    }

    pub fn channels(&self) -> &[ChannelMeta] {
        &self.channels
    }

    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    pub fn completeness(&self) -> Completeness {
        self.completeness
    }

    pub fn is_full(&self) -> bool {
        self.completeness == Completeness::Full
    }

    pub fn samples(&self, kind: ChannelKind) -> Option<ArrayView1<'_, f64>> {
        self.channels
            .iter()
            .position(|c| c.kind == kind)
            .map(|idx| self.data.row(idx))
    }

    /// Instant just after the last sample.
    pub fn end(&self) -> DateTime<Utc> {
        self.start + sample_offset(self.sample_count(), self.sample_rate_hz)
    }

    pub fn duration_seconds(&self) -> f64 {
        self.sample_count() as f64 / self.sample_rate_hz
    }
}

/// How much of a day at the survey edges is still worth a dayfile.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialDayPolicy {
    /// Partial days shorter than this are skipped. Zero keeps every partial day.
    #[serde(default)]
    pub min_partial_seconds: f64,
}

/// Lazy iterator over the UTC days of an aligned block.
///
/// Cloning restarts from the current position; calling [`segment`] again
/// restarts from the first day.
#[derive(Clone, Debug)]
pub struct DaySegments<'a> {
    block: &'a AlignedBlock,
    policy: PartialDayPolicy,
    first_day: NaiveDate,
    next_day: Option<NaiveDate>,
    last_day: NaiveDate,
}

/// Splits `block` at UTC midnight. Only the first and last day can be partial.
pub fn segment(block: &AlignedBlock, policy: PartialDayPolicy) -> DaySegments<'_> {
    let first_day = block.start().date_naive();
    let (next_day, last_day) = match block.sample_count().checked_sub(1) {
        Some(last) => (Some(first_day), block.time_at(last).date_naive()),
        None => (None, first_day),
    };
    DaySegments {
        block,
        policy,
        first_day,
        next_day,
        last_day,
    }
}

/// Day blocks of consecutive aligned blocks, in time order, produced lazily.
pub fn day_blocks(
    blocks: &[AlignedBlock],
    policy: PartialDayPolicy,
) -> impl Iterator<Item = DayBlock> + '_ {
    blocks.iter().flat_map(move |block| segment(block, policy))
}

fn midnight(day: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&day.and_hms_opt(0, 0, 0).unwrap_or_default())
}

impl<'a> Iterator for DaySegments<'a> {
    type Item = DayBlock;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let day = self.next_day.filter(|d| *d <= self.last_day)?;
            self.next_day = day.checked_add_days(Days::new(1));

            let block = self.block;
            let day_start = midnight(day);
            let day_end = day
                .checked_add_days(Days::new(1))
                .map(midnight)
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
            let count = block.sample_count();
            let first = sample_index_at_or_after(block.start(), block.sample_rate_hz(), day_start)
                .min(count);
            let last = sample_index_at_or_after(block.start(), block.sample_rate_hz(), day_end)
                .min(count);
            if last <= first {
                continue;
            }

            let completeness = if block.start() <= day_start && block.end() >= day_end {
                Completeness::Full
            } else {
                Completeness::Partial
            };
            debug_assert!(
                completeness == Completeness::Full || day == self.first_day || day == self.last_day,
                "interior day {day} must be complete"
            );

            let start = block.time_at(first);
            if completeness == Completeness::Partial {
                let covered = seconds_between(start, block.time_at(last));
                if covered < self.policy.min_partial_seconds {
                    log::info!(
                        "{}: skipping partial day {day} ({covered:.0} s < {} s)",
                        block.station_id(),
                        self.policy.min_partial_seconds
                    );
                    continue;
                }
            }

            return Some(DayBlock {
                station_id: block.station_id().to_string(),
                day,
                start,
                sample_rate_hz: block.sample_rate_hz(),
                channels: block.channels().to_vec(),
                data: block.data().slice(s![.., first..last]).to_owned(),
                completeness,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::{align, AlignOptions, Channel};
    use chrono::Duration;

    fn block(start: DateTime<Utc>, hours: usize, rate: f64) -> AlignedBlock {
        block_of(start, (hours as f64 * 3600.0 * rate) as usize, rate)
    }

    fn block_of(start: DateTime<Utc>, n: usize, rate: f64) -> AlignedBlock {
        let samples: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let hx = Channel::new(ChannelKind::Hx, "C", rate, start, 0.0, samples.clone()).unwrap();
        let hy = Channel::new(ChannelKind::Hy, "C", rate, start, 90.0, samples).unwrap();
        align("S1", &[hx, hy], &AlignOptions::default()).unwrap()
    }

    #[test]
    fn three_full_days() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let aligned = block(start, 72, 0.1);
        let days: Vec<DayBlock> = segment(&aligned, PartialDayPolicy::default()).collect();
        assert_eq!(days.len(), 3);
        assert!(days.iter().all(DayBlock::is_full));
        assert!(days.iter().all(|d| d.sample_count() == 8640));
        assert_eq!(days[2].day(), NaiveDate::from_ymd_opt(2024, 3, 3).unwrap());
        assert_eq!(days[1].samples(ChannelKind::Hx).unwrap()[0], 8640.0);
    }

    #[test]
    fn noon_start_gives_partial_full_partial() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        // Samples cover both ends of the 36 hours, so the closing instant
        // lands on the third day.
        let aligned = block_of(start, 36 * 360 + 1, 0.1);
        let days: Vec<DayBlock> = segment(&aligned, PartialDayPolicy::default()).collect();
        let flags: Vec<Completeness> = days.iter().map(DayBlock::completeness).collect();
        assert_eq!(
            flags,
            vec![Completeness::Partial, Completeness::Full, Completeness::Partial]
        );
        assert_eq!(days[0].sample_count(), 4320);
        assert_eq!(days[2].start(), start + Duration::hours(36));
        assert_eq!(days[2].sample_count(), 1);
    }

    #[test]
    fn short_partial_days_follow_policy() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 22, 0, 0).unwrap();
        let aligned = block(start, 30, 0.1);
        let policy = PartialDayPolicy {
            min_partial_seconds: 3.0 * 3600.0,
        };
        let days: Vec<DayBlock> = segment(&aligned, policy).collect();
        assert_eq!(days.len(), 2);
        assert!(days[0].is_full());
        assert_eq!(days[1].completeness(), Completeness::Partial);
    }

    #[test]
    fn iteration_restarts() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 6, 0, 0).unwrap();
        let aligned = block(start, 30, 0.1);
        let days = segment(&aligned, PartialDayPolicy::default());
        assert_eq!(days.clone().count(), 2);
        assert_eq!(days.count(), 2);
    }
}
