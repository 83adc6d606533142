use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use rustfft::num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::processing::{ChannelKind, ProcessingError, StationInfo};
use crate::transfer::{ImpedanceTensor, Tipper};

const IMPEDANCE_COLUMNS: usize = 13;
const TIPPER_COLUMNS: usize = 6;
/// Relative distance below which two frequencies are the same estimate.
const FREQUENCY_TOLERANCE: f64 = 1.0e-6;

/// Station metadata carried at the top of every transfer-function file.
#[derive(Clone, Debug, PartialEq)]
pub struct TfHeader {
    pub station_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub elevation_m: f64,
    pub declination_deg: f64,
    /// Reference azimuth of the x axis of every tensor.
    pub azimuth_deg: f64,
    pub processing_start: DateTime<Utc>,
    pub processing_end: DateTime<Utc>,
    pub channels: Vec<ChannelKind>,
}

impl TfHeader {
    pub fn for_station(
        info: &StationInfo,
        azimuth_deg: f64,
        processing_start: DateTime<Utc>,
        processing_end: DateTime<Utc>,
        channels: Vec<ChannelKind>,
    ) -> Self {
        Self {
            station_id: info.id.clone(),
            latitude: info.latitude,
            longitude: info.longitude,
            elevation_m: info.elevation_m,
            declination_deg: info.declination_deg,
            azimuth_deg,
            processing_start,
            processing_end,
            channels,
        }
    }

    pub fn has_tipper(&self) -> bool {
        self.channels.contains(&ChannelKind::Hz)
    }

    /// Number of numeric columns per estimate row, frequency included.
    pub fn row_width(&self) -> usize {
        if self.has_tipper() {
            IMPEDANCE_COLUMNS + TIPPER_COLUMNS
        } else {
            IMPEDANCE_COLUMNS
        }
    }

    fn validate(&self) -> Result<(), String> {
        if self.station_id.is_empty() || self.station_id.chars().any(char::is_whitespace) {
            return Err(format!("station id `{}` is not usable", self.station_id));
        }
        let coords = [
            self.latitude,
            self.longitude,
            self.elevation_m,
            self.declination_deg,
            self.azimuth_deg,
        ];
        if coords.iter().any(|v| !v.is_finite()) {
            return Err("non-finite station coordinate".into());
        }
        if self.processing_end < self.processing_start {
            return Err("processing range ends before it starts".into());
        }
        for required in [
            ChannelKind::Ex,
            ChannelKind::Ey,
            ChannelKind::Hx,
            ChannelKind::Hy,
        ] {
            if !self.channels.contains(&required) {
                return Err(format!("channel {required} missing from header"));
            }
        }
        let mut sorted = self.channels.clone();
        sorted.sort();
        sorted.dedup();
        if sorted.len() != self.channels.len() {
            return Err("duplicate channel in header".into());
        }
        Ok(())
    }
}

/// One numeric row as returned by the estimator, frequency first:
/// `f, Zxx re/im, Zxy re/im, Zyx re/im, Zyy re/im, 4 errors[, Tx re/im, Ty re/im, 2 errors]`.
#[derive(Clone, Debug, PartialEq)]
pub struct RawEstimate {
    pub values: Vec<f64>,
}

impl RawEstimate {
    pub fn frequency_hz(&self) -> f64 {
        self.values.first().copied().unwrap_or(f64::NAN)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverlapPolicy {
    PreferFirst,
    PreferLast,
    Average,
}

impl std::str::FromStr for OverlapPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "prefer-first" => Ok(OverlapPolicy::PreferFirst),
            "prefer-last" => Ok(OverlapPolicy::PreferLast),
            "average" => Ok(OverlapPolicy::Average),
            other => Err(format!("unknown overlap policy `{other}`")),
        }
    }
}

/// Validated, frequency-ascending transfer functions of one station.
#[derive(Clone, Debug, PartialEq)]
pub struct TransferFunctionFile {
    header: TfHeader,
    entries: Vec<ImpedanceTensor>,
}

impl TransferFunctionFile {
    pub fn new(header: TfHeader, entries: Vec<ImpedanceTensor>) -> Result<Self, ProcessingError> {
        let file = Self { header, entries };
        file.validate()?;
        Ok(file)
    }

    pub fn header(&self) -> &TfHeader {
        &self.header
    }

    pub fn entries(&self) -> &[ImpedanceTensor] {
        &self.entries
    }

    pub fn frequencies(&self) -> impl Iterator<Item = f64> + '_ {
        self.entries.iter().map(|e| e.frequency_hz)
    }

    pub fn invalid_count(&self) -> usize {
        self.entries.iter().filter(|e| !e.valid).count()
    }

    /// Re-checks header, per-frequency and ordering invariants.
    pub fn validate(&self) -> Result<(), ProcessingError> {
        let station = &self.header.station_id;
        self.header
            .validate()
            .map_err(|reason| ProcessingError::InvalidTransferFunction {
                station: station.clone(),
                reason,
            })?;
        let tipper = self.header.has_tipper();
        for entry in &self.entries {
            entry
                .validate()
                .map_err(|reason| ProcessingError::MalformedEstimate {
                    station: station.clone(),
                    frequency_hz: entry.frequency_hz,
                    reason,
                })?;
            if entry.tipper.is_some() != tipper {
                return Err(ProcessingError::MalformedEstimate {
                    station: station.clone(),
                    frequency_hz: entry.frequency_hz,
                    reason: "vertical-field coefficients do not match the header channels".into(),
                });
            }
        }
        for pair in self.entries.windows(2) {
            if pair[1].frequency_hz <= pair[0].frequency_hz {
                return Err(ProcessingError::InvalidTransferFunction {
                    station: station.clone(),
                    reason: format!(
                        "frequencies not strictly increasing at {} Hz",
                        pair[1].frequency_hz
                    ),
                });
            }
        }
        Ok(())
    }

    /// Builds a file from raw estimator rows, keeping whatever is usable.
    ///
    /// Rows that cannot be placed on the frequency axis are dropped: a wrong
    /// column count, a non-positive frequency, or a frequency outside the
    /// longest strictly monotonic run of the remaining rows (either
    /// direction). Rows with negative or non-finite values are kept but
    /// flagged invalid. Every problem is returned alongside the file as a
    /// [`ProcessingError::MalformedEstimate`].
    pub fn from_estimator_output(
        header: TfHeader,
        rows: &[RawEstimate],
    ) -> Result<(Self, Vec<ProcessingError>), ProcessingError> {
        let station = header.station_id.clone();
        let malformed = |frequency_hz: f64, reason: String| ProcessingError::MalformedEstimate {
            station: station.clone(),
            frequency_hz,
            reason,
        };
        let width = header.row_width();
        let placeable = |row: &RawEstimate| {
            let frequency = row.frequency_hz();
            row.values.len() == width && frequency.is_finite() && frequency > 0.0
        };

        let usable: Vec<usize> = (0..rows.len()).filter(|&i| placeable(&rows[i])).collect();
        let frequencies: Vec<f64> = usable.iter().map(|&i| rows[i].frequency_hz()).collect();
        let ascending = longest_monotonic(&frequencies, Ordering::Greater);
        let descending = longest_monotonic(&frequencies, Ordering::Less);
        let (run, reversed) = if descending.len() > ascending.len() {
            (descending, true)
        } else {
            (ascending, false)
        };
        let mut on_axis = vec![false; rows.len()];
        for k in run {
            on_axis[usable[k]] = true;
        }

        let mut problems = Vec::new();
        let mut entries: Vec<ImpedanceTensor> = Vec::with_capacity(rows.len());
        for (row, keep) in rows.iter().zip(on_axis) {
            let frequency = row.frequency_hz();
            if row.values.len() != width {
                problems.push(malformed(
                    frequency,
                    format!("expected {width} columns, found {}", row.values.len()),
                ));
                continue;
            }
            if !(frequency.is_finite() && frequency > 0.0) {
                problems.push(malformed(frequency, "frequency is not positive".into()));
                continue;
            }
            if !keep {
                problems.push(malformed(
                    frequency,
                    "frequency breaks the monotonic order of its neighbours".into(),
                ));
                continue;
            }

            let (tensor, reason) = tensor_from_row(&row.values);
            if let Some(reason) = reason {
                log::warn!("{station}: flagging estimate at {frequency} Hz invalid: {reason}");
                problems.push(malformed(frequency, reason));
            }
            entries.push(tensor);
        }

        if reversed {
            entries.reverse();
        }
        if !problems.is_empty() {
            log::warn!(
                "{station}: {} of {} estimator rows were malformed",
                problems.len(),
                rows.len()
            );
        }
        let file = Self::new(header, entries)?;
        Ok((file, problems))
    }

    /// Combines files of one station into a single frequency axis.
    ///
    /// Frequencies equal within a relative 1e-6 collide. Without a policy a
    /// collision is an error; with one, the earlier file, the later file or
    /// the mean wins.
    pub fn merge(
        files: &[TransferFunctionFile],
        policy: Option<OverlapPolicy>,
    ) -> Result<TransferFunctionFile, ProcessingError> {
        let Some(first) = files.first() else {
            return Err(ProcessingError::Config("nothing to merge".into()));
        };
        let mut header = first.header.clone();
        let channels = sorted_channels(&header);
        for other in &files[1..] {
            let theirs = &other.header;
            if theirs.station_id != header.station_id {
                return Err(ProcessingError::StationMismatch {
                    expected: header.station_id.clone(),
                    actual: theirs.station_id.clone(),
                });
            }
            let differs = if theirs.azimuth_deg != header.azimuth_deg {
                Some("reference azimuth")
            } else if (theirs.latitude, theirs.longitude, theirs.elevation_m)
                != (header.latitude, header.longitude, header.elevation_m)
            {
                Some("station coordinates")
            } else if sorted_channels(theirs) != channels {
                Some("channel set")
            } else {
                None
            };
            if let Some(field) = differs {
                return Err(ProcessingError::InvalidTransferFunction {
                    station: header.station_id.clone(),
                    reason: format!("cannot merge files with a different {field}"),
                });
            }
            header.processing_start = header.processing_start.min(theirs.processing_start);
            header.processing_end = header.processing_end.max(theirs.processing_end);
        }

        let mut tagged: Vec<(usize, ImpedanceTensor)> = files
            .iter()
            .enumerate()
            .flat_map(|(idx, f)| f.entries.iter().map(move |e| (idx, *e)))
            .collect();
        tagged.sort_by(|a, b| a.1.frequency_hz.total_cmp(&b.1.frequency_hz));

        let mut merged = Vec::with_capacity(tagged.len());
        let mut i = 0;
        while i < tagged.len() {
            let base = tagged[i].1.frequency_hz;
            let mut j = i + 1;
            // Close neighbours within one file are distinct estimates.
            while j < tagged.len()
                && same_frequency(base, tagged[j].1.frequency_hz)
                && tagged[i..j].iter().all(|(file, _)| *file != tagged[j].0)
            {
                j += 1;
            }
            let group = &tagged[i..j];
            let chosen = match (group.len(), policy) {
                (1, _) => group[0].1,
                (_, None) => {
                    return Err(ProcessingError::FrequencyCollision {
                        station: header.station_id.clone(),
                        frequency_hz: base,
                    })
                }
                (_, Some(OverlapPolicy::PreferFirst)) => pick(group, |a, b| a < b),
                (_, Some(OverlapPolicy::PreferLast)) => pick(group, |a, b| a > b),
                (_, Some(OverlapPolicy::Average)) => average(group.iter().map(|(_, e)| e)),
            };
            if group.len() > 1 {
                log::info!(
                    "{}: resolved {} estimates at {base} Hz with {:?}",
                    header.station_id,
                    group.len(),
                    policy
                );
            }
            merged.push(chosen);
            i = j;
        }
        TransferFunctionFile::new(header, merged)
    }
}

fn sorted_channels(header: &TfHeader) -> Vec<ChannelKind> {
    let mut channels = header.channels.clone();
    channels.sort();
    channels
}

/// Indices of the longest subsequence whose successive elements compare as
/// `step` to their predecessor. Ties go to the earliest ending subsequence.
fn longest_monotonic(values: &[f64], step: Ordering) -> Vec<usize> {
    let mut length = vec![1usize; values.len()];
    let mut previous: Vec<Option<usize>> = vec![None; values.len()];
    for i in 0..values.len() {
        for j in 0..i {
            if values[i].total_cmp(&values[j]) == step && length[j] + 1 > length[i] {
                length[i] = length[j] + 1;
                previous[i] = Some(j);
            }
        }
    }
    let mut end = None;
    for (i, len) in length.iter().enumerate() {
        if end.map_or(true, |e: usize| *len > length[e]) {
            end = Some(i);
        }
    }
    let mut run = Vec::new();
    while let Some(i) = end {
        run.push(i);
        end = previous[i];
    }
    run.reverse();
    run
}

fn same_frequency(a: f64, b: f64) -> bool {
    (a - b).abs() <= FREQUENCY_TOLERANCE * a.abs().max(b.abs())
}

fn pick(group: &[(usize, ImpedanceTensor)], better: impl Fn(usize, usize) -> bool) -> ImpedanceTensor {
    let mut best = group[0];
    for candidate in &group[1..] {
        if better(candidate.0, best.0) {
            best = *candidate;
        }
    }
    best.1
}

/// Mean of the estimates; errors combine as for a mean of independent values.
fn average<'a>(entries: impl Iterator<Item = &'a ImpedanceTensor>) -> ImpedanceTensor {
    let entries: Vec<&ImpedanceTensor> = entries.collect();
    let n = entries.len() as f64;
    let mean = |f: &dyn Fn(&ImpedanceTensor) -> Complex64| {
        entries.iter().map(|e| f(e)).sum::<Complex64>() / n
    };
    let pooled = |f: &dyn Fn(&ImpedanceTensor) -> f64| {
        entries.iter().map(|e| f(e).powi(2)).sum::<f64>().sqrt() / n
    };

    let mut out = *entries[0];
    out.frequency_hz = entries.iter().map(|e| e.frequency_hz).sum::<f64>() / n;
    for i in 0..2 {
        for j in 0..2 {
            out.z[i][j] = mean(&|e| e.z[i][j]);
            out.z_err[i][j] = pooled(&|e| e.z_err[i][j]);
        }
    }
    if entries.iter().all(|e| e.tipper.is_some()) {
        let tip = |e: &ImpedanceTensor| e.tipper.unwrap_or(ZERO_TIPPER);
        out.tipper = Some(Tipper {
            tx: mean(&|e| tip(e).tx),
            ty: mean(&|e| tip(e).ty),
            tx_err: pooled(&|e| tip(e).tx_err),
            ty_err: pooled(&|e| tip(e).ty_err),
        });
    }
    out.valid = entries.iter().all(|e| e.valid);
    out
}

const ZERO_TIPPER: Tipper = Tipper {
    tx: Complex64::new(0.0, 0.0),
    ty: Complex64::new(0.0, 0.0),
    tx_err: 0.0,
    ty_err: 0.0,
};

/// Builds a tensor from a row of the right width. Negative errors become NaN
/// and, like non-finite values, flag the tensor invalid.
fn tensor_from_row(values: &[f64]) -> (ImpedanceTensor, Option<String>) {
    let mut problems = Vec::new();
    let c = |at: usize| Complex64::new(values[at], values[at + 1]);
    let mut error = |at: usize, label: &str| {
        let e = values[at];
        if e < 0.0 {
            problems.push(format!("negative error {e} for {label}"));
            f64::NAN
        } else {
            e
        }
    };
    let z_err = [
        [error(9, "Zxx"), error(10, "Zxy")],
        [error(11, "Zyx"), error(12, "Zyy")],
    ];
    let tipper = if values.len() > IMPEDANCE_COLUMNS {
        Some(Tipper {
            tx: c(13),
            ty: c(15),
            tx_err: error(17, "Tx"),
            ty_err: error(18, "Ty"),
        })
    } else {
        None
    };
    if values[1..].iter().any(|v| !v.is_finite()) {
        problems.push("non-finite value".into());
    }
    let tensor = ImpedanceTensor {
        frequency_hz: values[0],
        z: [[c(1), c(3)], [c(5), c(7)]],
        z_err,
        tipper,
        valid: problems.is_empty(),
    };
    let reason = (!problems.is_empty()).then(|| problems.join("; "));
    (tensor, reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn header(channels: &[ChannelKind]) -> TfHeader {
        TfHeader {
            station_id: "MT01".into(),
            latitude: -31.25,
            longitude: 138.6,
            elevation_m: 412.0,
            declination_deg: 7.8,
            azimuth_deg: 0.0,
            processing_start: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
            processing_end: Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap(),
            channels: channels.to_vec(),
        }
    }

    fn four() -> TfHeader {
        header(&[
            ChannelKind::Ex,
            ChannelKind::Ey,
            ChannelKind::Hx,
            ChannelKind::Hy,
        ])
    }

    fn row(frequency: f64, scale: f64) -> RawEstimate {
        let mut values = vec![frequency];
        values.extend((1..=8).map(|k| k as f64 * scale));
        values.extend([0.1, 0.2, 0.3, 0.4]);
        RawEstimate { values }
    }

    fn file(frequencies: &[f64], scale: f64) -> TransferFunctionFile {
        let rows: Vec<RawEstimate> = frequencies.iter().map(|f| row(*f, scale)).collect();
        let (file, problems) = TransferFunctionFile::from_estimator_output(four(), &rows).unwrap();
        assert!(problems.is_empty());
        file
    }

    #[test]
    fn negative_error_is_reported_and_flagged() {
        let mut bad = row(0.5, 1.0);
        bad.values[10] = -0.2;
        let rows = vec![row(1.0, 1.0), bad, row(0.25, 1.0)];
        let (file, problems) = TransferFunctionFile::from_estimator_output(four(), &rows).unwrap();
        assert_eq!(problems.len(), 1);
        match &problems[0] {
            ProcessingError::MalformedEstimate { frequency_hz, .. } => assert_eq!(*frequency_hz, 0.5),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(file.entries().len(), 3);
        assert_eq!(file.frequencies().collect::<Vec<_>>(), vec![0.25, 0.5, 1.0]);
        assert!(!file.entries()[1].valid);
        assert!(file.entries()[1].z_err[0][1].is_nan());
        assert_eq!(file.invalid_count(), 1);
        assert!(file.validate().is_ok());
    }

    #[test]
    fn out_of_order_and_short_rows_are_dropped() {
        let short = RawEstimate {
            values: vec![3.0, 1.0, 2.0],
        };
        let rows = vec![row(1.0, 1.0), row(2.0, 1.0), row(1.5, 1.0), short, row(4.0, 1.0)];
        let (file, problems) = TransferFunctionFile::from_estimator_output(four(), &rows).unwrap();
        assert_eq!(problems.len(), 2);
        assert_eq!(file.frequencies().collect::<Vec<_>>(), vec![1.0, 2.0, 4.0]);
    }

    #[test]
    fn single_outlier_does_not_hide_later_rows() {
        let rising: Vec<RawEstimate> = [0.1, 0.2, 100.0, 0.3, 0.4, 0.5, 0.6]
            .iter()
            .map(|f| row(*f, 1.0))
            .collect();
        let (file, problems) = TransferFunctionFile::from_estimator_output(four(), &rising).unwrap();
        assert_eq!(file.frequencies().collect::<Vec<_>>(), vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6]);
        assert_eq!(problems.len(), 1);
        assert!(matches!(
            problems[0],
            ProcessingError::MalformedEstimate { frequency_hz, .. } if frequency_hz == 100.0
        ));

        let falling: Vec<RawEstimate> = [10.0, 5.0, 0.001, 2.0, 1.0]
            .iter()
            .map(|f| row(*f, 1.0))
            .collect();
        let (file, problems) = TransferFunctionFile::from_estimator_output(four(), &falling).unwrap();
        assert_eq!(file.frequencies().collect::<Vec<_>>(), vec![1.0, 2.0, 5.0, 10.0]);
        assert_eq!(problems.len(), 1);
    }

    #[test]
    fn tipper_columns_follow_header() {
        let with_hz = header(&[
            ChannelKind::Ex,
            ChannelKind::Ey,
            ChannelKind::Hx,
            ChannelKind::Hy,
            ChannelKind::Hz,
        ]);
        let mut r = row(1.0, 1.0);
        r.values.extend([0.1, 0.0, 0.0, 0.1, 0.01, 0.01]);
        let (file, problems) =
            TransferFunctionFile::from_estimator_output(with_hz.clone(), &[r, row(2.0, 1.0)]).unwrap();
        assert_eq!(problems.len(), 1);
        assert_eq!(file.entries().len(), 1);
        assert_eq!(file.entries()[0].tipper.unwrap().ty, Complex64::new(0.0, 0.1));
    }

    #[test]
    fn header_without_magnetics_is_rejected() {
        let bad = header(&[ChannelKind::Ex, ChannelKind::Ey, ChannelKind::Hx]);
        assert!(matches!(
            TransferFunctionFile::new(bad, Vec::new()),
            Err(ProcessingError::InvalidTransferFunction { .. })
        ));
    }

    #[test]
    fn disjoint_merge_is_sorted_union() {
        let long = file(&[0.001, 0.01], 1.0);
        let short = file(&[10.0, 1.0, 0.1], 2.0);
        let merged = TransferFunctionFile::merge(&[short, long], None).unwrap();
        assert_eq!(
            merged.frequencies().collect::<Vec<_>>(),
            vec![0.001, 0.01, 0.1, 1.0, 10.0]
        );
    }

    #[test]
    fn overlap_needs_a_policy() {
        let a = file(&[0.1, 1.0], 1.0);
        let b = file(&[1.0, 10.0], 3.0);
        let files = [a, b];
        assert!(matches!(
            TransferFunctionFile::merge(&files, None),
            Err(ProcessingError::FrequencyCollision { frequency_hz, .. }) if frequency_hz == 1.0
        ));
        let first = TransferFunctionFile::merge(&files, Some(OverlapPolicy::PreferFirst)).unwrap();
        assert_eq!(first.entries()[1].z[0][0], Complex64::new(1.0, 2.0));
        let last = TransferFunctionFile::merge(&files, Some(OverlapPolicy::PreferLast)).unwrap();
        assert_eq!(last.entries()[1].z[0][0], Complex64::new(3.0, 6.0));
        let mean = TransferFunctionFile::merge(&files, Some(OverlapPolicy::Average)).unwrap();
        assert_eq!(mean.entries()[1].z[0][0], Complex64::new(2.0, 4.0));
        let expected = (2.0f64 * 0.1 * 0.1).sqrt() / 2.0;
        assert!((mean.entries()[1].z_err[0][0] - expected).abs() < 1e-15);
        assert_eq!(mean.entries().len(), 3);
    }

    #[test]
    fn merge_rejects_other_station() {
        let a = file(&[1.0], 1.0);
        let mut other = four();
        other.station_id = "MT02".into();
        let b = TransferFunctionFile::new(other, a.entries().to_vec()).unwrap();
        assert!(matches!(
            TransferFunctionFile::merge(&[a, b], None),
            Err(ProcessingError::StationMismatch { .. })
        ));
    }

    #[test]
    fn merge_rejects_other_reference_frame() {
        let a = file(&[1.0], 1.0);
        let mut rotated = four();
        rotated.azimuth_deg = 45.0;
        let b = TransferFunctionFile::new(rotated, file(&[10.0], 1.0).entries().to_vec()).unwrap();
        assert!(matches!(
            TransferFunctionFile::merge(&[a.clone(), b], None),
            Err(ProcessingError::InvalidTransferFunction { .. })
        ));

        let mut moved = four();
        moved.latitude = -31.5;
        let c = TransferFunctionFile::new(moved, file(&[10.0], 1.0).entries().to_vec()).unwrap();
        assert!(matches!(
            TransferFunctionFile::merge(&[a, c], None),
            Err(ProcessingError::InvalidTransferFunction { .. })
        ));
    }

    #[test]
    fn close_frequencies_within_one_file_do_not_collide() {
        let single = file(&[1.0, 1.000_000_5], 1.0);
        let merged = TransferFunctionFile::merge(&[single], None).unwrap();
        assert_eq!(merged.entries().len(), 2);

        let other = file(&[1.000_000_2], 2.0);
        let files = [file(&[1.0, 1.000_000_5], 1.0), other];
        let first = TransferFunctionFile::merge(&files, Some(OverlapPolicy::PreferFirst)).unwrap();
        assert_eq!(first.frequencies().collect::<Vec<_>>(), vec![1.0, 1.000_000_5]);
    }

    #[test]
    fn policy_names_parse() {
        assert_eq!("prefer-last".parse::<OverlapPolicy>(), Ok(OverlapPolicy::PreferLast));
        assert!("newest".parse::<OverlapPolicy>().is_err());
    }
}
