//! Joining of contiguous segments and discovery of the spans every channel covers.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::processing::channel::seconds_between;
use crate::processing::{Channel, ChannelKind};

/// Time span `[start, end)`.
pub type Window = (DateTime<Utc>, DateTime<Utc>);

fn continues(previous: &Channel, next: &Channel) -> bool {
    if previous.sample_rate_hz() != next.sample_rate_hz()
        || previous.meta() != next.meta()
        || previous.dipole_length_m() != next.dipole_length_m()
    {
        return false;
    }
    let gap = seconds_between(previous.end(), next.start());
    gap.abs() <= 0.5 / previous.sample_rate_hz()
}

/// Concatenates segments of the same channel whose start lies within half a sample
/// of the previous segment's end. Output is grouped by kind, sorted by start time.
pub fn degap(segments: Vec<Channel>) -> Vec<Channel> {
    let mut by_kind: BTreeMap<ChannelKind, Vec<Channel>> = BTreeMap::new();
    for segment in segments {
        by_kind.entry(segment.kind()).or_default().push(segment);
    }
    let mut merged = Vec::new();
    for (kind, mut group) in by_kind {
        group.sort_by_key(|c| c.start());
        let before = group.len();
        let mut iter = group.into_iter();
        let Some(mut current) = iter.next() else {
            continue;
        };
        let mut out = Vec::new();
        for next in iter {
            if continues(&current, &next) {
                current.extend_with(&next);
            } else {
                if next.start() < current.end() {
                    log::warn!(
                        "channel {kind}: segment at {} overlaps previous segment ending {}",
                        next.start(),
                        current.end()
                    );
                }
                out.push(std::mem::replace(&mut current, next));
            }
        }
        out.push(current);
        if out.len() < before {
            log::debug!("channel {kind}: joined {before} segments into {}", out.len());
        }
        merged.extend(out);
    }
    merged
}

fn intersect(a: &[Window], b: &[Window]) -> Vec<Window> {
    let mut out = Vec::new();
    for &(a_start, a_end) in a {
        for &(b_start, b_end) in b {
            let start = a_start.max(b_start);
            let end = a_end.min(b_end);
            if start < end {
                out.push((start, end));
            }
        }
    }
    out.sort();
    out
}

/// Spans in which every channel kind present in `segments` has data.
pub fn coverage_windows(segments: &[Channel]) -> Vec<Window> {
    let mut by_kind: BTreeMap<ChannelKind, Vec<Window>> = BTreeMap::new();
    for segment in segments.iter().filter(|s| !s.is_empty()) {
        by_kind
            .entry(segment.kind())
            .or_default()
            .push((segment.start(), segment.end()));
    }
    let mut kinds = by_kind.into_values();
    let Some(first) = kinds.next() else {
        return Vec::new();
    };
    kinds.fold(first, |acc, next| intersect(&acc, &next))
}

/// One clipped channel per kind covering `window`.
pub fn channels_in_window(segments: &[Channel], window: Window) -> Vec<Channel> {
    let mut picked: BTreeMap<ChannelKind, Channel> = BTreeMap::new();
    for segment in segments {
        if segment.start() >= window.1 || segment.end() <= window.0 {
            continue;
        }
        if let Some(clipped) = segment.window(window.0, window.1) {
            let replace = picked
                .get(&segment.kind())
                .map_or(true, |existing| clipped.len() > existing.len());
            if replace {
                picked.insert(segment.kind(), clipped);
            }
        }
    }
    picked.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
    }

    fn seg(kind: ChannelKind, offset_s: i64, n: usize) -> Channel {
        Channel::new(kind, "I1", 1.0, t0() + Duration::seconds(offset_s), 0.0, vec![1.0; n]).unwrap()
    }

    #[test]
    fn joins_contiguous_and_keeps_real_gaps() {
        let merged = degap(vec![
            seg(ChannelKind::Hx, 10, 5),
            seg(ChannelKind::Hx, 0, 10),
            seg(ChannelKind::Hx, 30, 5),
        ]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].len(), 15);
        assert_eq!(merged[1].start(), t0() + Duration::seconds(30));
    }

    #[test]
    fn coverage_is_intersection_across_kinds() {
        let segments = vec![
            seg(ChannelKind::Hx, 0, 100),
            seg(ChannelKind::Hy, 10, 30),
            seg(ChannelKind::Hy, 60, 100),
        ];
        let windows = coverage_windows(&segments);
        assert_eq!(
            windows,
            vec![
                (t0() + Duration::seconds(10), t0() + Duration::seconds(40)),
                (t0() + Duration::seconds(60), t0() + Duration::seconds(100)),
            ]
        );
        let chopped = channels_in_window(&segments, windows[1]);
        assert_eq!(chopped.len(), 2);
        assert!(chopped.iter().all(|c| c.len() == 40));
    }
}
