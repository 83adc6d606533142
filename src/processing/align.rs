use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use ndarray::{Array2, ArrayView1};

use crate::processing::channel::{sample_offset, seconds_between};
use crate::processing::filter::AntiAliasFilter;
use crate::processing::{Channel, ChannelKind, ChannelMeta, ProcessingError};

/// Channels of one station on a shared, uniformly sampled time axis.
#[derive(Clone, Debug, PartialEq)]
pub struct AlignedBlock {
    station_id: String,
    start: DateTime<Utc>,
    sample_rate_hz: f64,
    channels: Vec<ChannelMeta>,
    data: Array2<f64>, // channels x samples
}

impl AlignedBlock {
    pub(crate) fn from_parts(
        station_id: String,
        start: DateTime<Utc>,
        sample_rate_hz: f64,
        channels: Vec<ChannelMeta>,
        data: Array2<f64>,
    ) -> Self {
        debug_assert_eq!(channels.len(), data.nrows());
        Self {
            station_id,
            start,
            sample_rate_hz,
            channels,
            data,
        }
    }

    pub fn station_id(&self) -> &str {
        &self.station_id
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.time_at(self.sample_count())
    }

    pub fn time_at(&self, index: usize) -> DateTime<Utc> {
        self.start + sample_offset(index, self.sample_rate_hz)
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

    pub fn index_of(&self, kind: ChannelKind) -> Option<usize> {
        self.channels.iter().position(|c| c.kind == kind)
    }

    pub fn samples(&self, kind: ChannelKind) -> Option<ArrayView1<'_, f64>> {
        self.index_of(kind).map(|idx| self.data.row(idx))
    }
}

#[derive(Clone, Copy, Debug)]
pub struct AlignOptions {
    /// Largest allowed distance between a channel's samples and the common
    /// grid, as a fraction of one output sample period.
    pub clock_tolerance: f64,
}

impl Default for AlignOptions {
    fn default() -> Self {
        Self {
            clock_tolerance: 0.25,
        }
    }
}

struct Plan<'a> {
    channel: &'a Channel,
    factor: usize,
    first: usize,
}

/// Puts `channels` on one grid at the lowest input rate, over the intersection
/// of their spans.
///
/// Higher-rate channels are decimated by their integer rate ratio after a
/// zero-phase anti-alias low-pass (see [`AntiAliasFilter`]). Non-integer
/// ratios are rejected, never interpolated.
pub fn align(
    station_id: &str,
    channels: &[Channel],
    options: &AlignOptions,
) -> Result<AlignedBlock, ProcessingError> {
    let mismatch = |reason: String| ProcessingError::ChannelMismatch {
        station: station_id.to_string(),
        reason,
    };
    if channels.is_empty() {
        return Err(mismatch("no channels to align".into()));
    }
    let mut seen = BTreeSet::new();
    for channel in channels {
        if !seen.insert(channel.kind()) {
            return Err(mismatch(format!("channel {} given more than once", channel.kind())));
        }
    }

    let target_hz = channels
        .iter()
        .map(Channel::sample_rate_hz)
        .fold(f64::INFINITY, f64::min);

    let window_start = channels.iter().map(Channel::start).max();
    let window_end = channels.iter().map(Channel::end).min();
    let (Some(window_start), Some(window_end)) = (window_start, window_end) else {
        return Err(mismatch("no channels to align".into()));
    };
    if window_end <= window_start || channels.iter().any(Channel::is_empty) {
        return Err(ProcessingError::NoOverlap {
            station: station_id.to_string(),
        });
    }

    let mut plans = Vec::with_capacity(channels.len());
    for channel in channels {
        let ratio = channel.sample_rate_hz() / target_hz;
        let factor = ratio.round();
        if (ratio - factor).abs() > 1.0e-9 * ratio {
            return Err(ProcessingError::UnsupportedRate {
                station: station_id.to_string(),
                channel: channel.kind(),
                rate_hz: channel.sample_rate_hz(),
                target_hz,
            });
        }
        let factor = factor as usize;
        let offset = seconds_between(channel.start(), window_start) * channel.sample_rate_hz();
        let first = offset.round();
        let deviation = (offset - first).abs() / factor as f64;
        if deviation > options.clock_tolerance {
            return Err(ProcessingError::ClockOffset {
                station: station_id.to_string(),
                channel: channel.kind(),
                offset_samples: deviation,
            });
        }
        plans.push(Plan {
            channel,
            factor,
            first: first as usize,
        });
    }
    plans.sort_by_key(|p| p.channel.kind());

    let sample_count = plans
        .iter()
        .map(|p| match p.channel.len().checked_sub(p.first) {
            Some(remaining) if remaining > 0 => (remaining - 1) / p.factor + 1,
            _ => 0,
        })
        .min()
        .unwrap_or(0);
    if sample_count == 0 {
        return Err(ProcessingError::NoOverlap {
            station: station_id.to_string(),
        });
    }

    let mut data = Array2::<f64>::zeros((plans.len(), sample_count));
    for (row, plan) in data.rows_mut().into_iter().zip(&plans) {
        let source = if plan.factor > 1 {
            log::debug!(
                "{station_id}: decimating {} by {} to {target_hz} Hz",
                plan.channel.kind(),
                plan.factor
            );
            AntiAliasFilter::for_decimation(plan.channel.sample_rate_hz(), plan.factor)
                .filtfilt(plan.channel.samples())
        } else {
            plan.channel.samples().to_vec()
        };
        for (i, value) in row.into_iter().enumerate() {
            *value = source[plan.first + i * plan.factor];
        }
    }

    // The block starts on the grid of a channel that is not decimated.
    let start = plans
        .iter()
        .find(|p| p.factor == 1)
        .map_or(window_start, |p| p.channel.time_at(p.first));
    let metas = plans.iter().map(|p| p.channel.meta().clone()).collect();
    log::info!(
        "{station_id}: aligned {} channels, {sample_count} samples at {target_hz} Hz from {start}",
        plans.len()
    );
    Ok(AlignedBlock::from_parts(
        station_id.to_string(),
        start,
        target_hz,
        metas,
        data,
    ))
}
