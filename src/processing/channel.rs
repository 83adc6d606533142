use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::processing::ProcessingError;

/// Field component recorded by one logger channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Ex,
    Ey,
    Hx,
    Hy,
    Hz,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 5] = [
        ChannelKind::Ex,
        ChannelKind::Ey,
        ChannelKind::Hx,
        ChannelKind::Hy,
        ChannelKind::Hz,
    ];

    pub fn is_electric(self) -> bool {
        matches!(self, ChannelKind::Ex | ChannelKind::Ey)
    }

    pub fn is_magnetic(self) -> bool {
        !self.is_electric()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChannelKind::Ex => "ex",
            ChannelKind::Ey => "ey",
            ChannelKind::Hx => "hx",
            ChannelKind::Hy => "hy",
            ChannelKind::Hz => "hz",
        }
    }

    /// Unit a calibrated channel of this kind is expressed in.
    pub fn physical_unit(self) -> PhysicalUnit {
        if self.is_electric() {
            PhysicalUnit::MilliVoltPerKm
        } else {
            PhysicalUnit::NanoTesla
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ex" => Ok(ChannelKind::Ex),
            "ey" => Ok(ChannelKind::Ey),
            "hx" | "bx" => Ok(ChannelKind::Hx),
            "hy" | "by" => Ok(ChannelKind::Hy),
            "hz" | "bz" => Ok(ChannelKind::Hz),
            other => Err(format!("unknown channel `{other}`")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhysicalUnit {
    Counts,
    NanoTesla,
    MilliVoltPerKm,
}

impl PhysicalUnit {
    pub fn as_str(self) -> &'static str {
        match self {
            PhysicalUnit::Counts => "counts",
            PhysicalUnit::NanoTesla => "nT",
            PhysicalUnit::MilliVoltPerKm => "mV/km",
        }
    }
}

impl fmt::Display for PhysicalUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PhysicalUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "counts" => Ok(PhysicalUnit::Counts),
            "nT" => Ok(PhysicalUnit::NanoTesla),
            "mV/km" => Ok(PhysicalUnit::MilliVoltPerKm),
            other => Err(format!("unknown unit `{other}`")),
        }
    }
}

/// Metadata of one channel, without samples.
#[derive(Clone, Debug, PartialEq)]
pub struct ChannelMeta {
    pub kind: ChannelKind,
    pub unit: PhysicalUnit,
    pub azimuth_deg: f64,
    pub instrument_id: String,
}

/// Contiguous, gap-free run of samples from one logger channel.
///
/// Instances are immutable; every transform produces a new `Channel`.
#[derive(Clone, Debug, PartialEq)]
pub struct Channel {
    meta: ChannelMeta,
    sample_rate_hz: f64,
    start: DateTime<Utc>,
    dipole_length_m: Option<f64>,
    samples: Vec<f64>,
}

impl Channel {
    pub fn new(
        kind: ChannelKind,
        instrument_id: impl Into<String>,
        sample_rate_hz: f64,
        start: DateTime<Utc>,
        azimuth_deg: f64,
        samples: Vec<f64>,
    ) -> Result<Self, ProcessingError> {
        if !(sample_rate_hz > 0.0 && sample_rate_hz.is_finite()) {
            return Err(ProcessingError::InvalidSampleRate { channel: kind });
        }
        if !azimuth_deg.is_finite() {
            return Err(ProcessingError::InvalidChannel {
                channel: kind,
                reason: "azimuth is not finite".into(),
            });
        }
        if let Some(idx) = samples.iter().position(|v| !v.is_finite()) {
            return Err(ProcessingError::InvalidChannel {
                channel: kind,
                reason: format!("non-finite sample at index {idx}; split gaps into separate segments"),
            });
        }
        Ok(Self {
            meta: ChannelMeta {
                kind,
                unit: PhysicalUnit::Counts,
                azimuth_deg,
                instrument_id: instrument_id.into(),
            },
            sample_rate_hz,
            start,
            dipole_length_m: None,
            samples,
        })
    }

    pub fn with_dipole_length(mut self, dipole_length_m: f64) -> Self {
        self.dipole_length_m = Some(dipole_length_m);
        self
    }

    pub fn with_unit(mut self, unit: PhysicalUnit) -> Self {
        self.meta.unit = unit;
        self
    }

    pub fn kind(&self) -> ChannelKind {
        self.meta.kind
    }

    pub fn meta(&self) -> &ChannelMeta {
        &self.meta
    }

    pub fn unit(&self) -> PhysicalUnit {
        self.meta.unit
    }

    pub fn azimuth_deg(&self) -> f64 {
        self.meta.azimuth_deg
    }

    pub fn instrument_id(&self) -> &str {
        &self.meta.instrument_id
    }

    pub fn dipole_length_m(&self) -> Option<f64> {
        self.dipole_length_m
    }

    pub fn sample_rate_hz(&self) -> f64 {
        self.sample_rate_hz
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Timestamp of sample `index`.
    pub fn time_at(&self, index: usize) -> DateTime<Utc> {
        self.start + sample_offset(index, self.sample_rate_hz)
    }

    /// Exclusive end of the span: one sample period past the last sample.
    pub fn end(&self) -> DateTime<Utc> {
        self.time_at(self.samples.len())
    }

    pub fn duration_seconds(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate_hz
    }

    /// Same metadata, new sample values. Callers guarantee finite samples.
    pub(crate) fn derive(&self, samples: Vec<f64>) -> Channel {
        Channel {
            meta: self.meta.clone(),
            sample_rate_hz: self.sample_rate_hz,
            start: self.start,
            dipole_length_m: self.dipole_length_m,
            samples,
        }
    }

    /// Samples whose timestamps fall in `[from, to)`, or `None` if there are none.
    pub fn window(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Option<Channel> {
        let first = sample_index_at_or_after(self.start, self.sample_rate_hz, from)
            .min(self.samples.len());
        let last = sample_index_at_or_after(self.start, self.sample_rate_hz, to)
            .min(self.samples.len());
        if last <= first {
            return None;
        }
        Some(Channel {
            meta: self.meta.clone(),
            sample_rate_hz: self.sample_rate_hz,
            start: self.time_at(first),
            dipole_length_m: self.dipole_length_m,
            samples: self.samples[first..last].to_vec(),
        })
    }

    /// Appends a directly following segment; used by degapping.
    pub(crate) fn extend_with(&mut self, next: &Channel) {
        self.samples.extend_from_slice(&next.samples);
    }
}

/// Coordinates and survey metadata of one recording site.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StationInfo {
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub elevation_m: f64,
    #[serde(default)]
    pub declination_deg: f64,
}

impl StationInfo {
    pub fn new(id: &str, latitude: f64, longitude: f64, elevation_m: f64) -> Self {
        Self {
            id: id.trim().to_uppercase(),
            latitude,
            longitude,
            elevation_m,
            declination_deg: 0.0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Station {
    pub info: StationInfo,
    pub channels: Vec<Channel>,
}

impl Station {
    pub fn new(info: StationInfo, channels: Vec<Channel>) -> Self {
        Self { info, channels }
    }

    pub fn id(&self) -> &str {
        &self.info.id
    }
}

pub(crate) fn sample_offset(index: usize, sample_rate_hz: f64) -> Duration {
    Duration::nanoseconds((index as f64 * 1.0e9 / sample_rate_hz).round() as i64)
}

pub(crate) fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    let delta = to - from;
    delta.num_seconds() as f64 + f64::from(delta.subsec_nanos()) * 1.0e-9
}

/// Index of the first sample at or after `at` for a stream starting at `start`.
/// Times before `start` map to index 0.
pub(crate) fn sample_index_at_or_after(
    start: DateTime<Utc>,
    sample_rate_hz: f64,
    at: DateTime<Utc>,
) -> usize {
    let position = seconds_between(start, at) * sample_rate_hz;
    if position <= 0.0 {
        0
    } else {
        (position - 1.0e-6).ceil() as usize
    }
}
