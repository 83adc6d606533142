use std::collections::BTreeMap;

use crate::processing::{AlignedBlock, ChannelKind, ProcessingError};

/// Per-channel multipliers applied after rotation. Missing entries mean 1.0.
pub type ScaleFactors = BTreeMap<ChannelKind, f64>;

const HORIZONTAL_PAIRS: [(ChannelKind, ChannelKind); 2] = [
    (ChannelKind::Ex, ChannelKind::Ey),
    (ChannelKind::Hx, ChannelKind::Hy),
];

#[derive(Clone, Copy, Debug)]
pub struct OrientOptions {
    /// Allowed deviation of the pair angle from 90 degrees.
    pub orthogonality_tolerance_deg: f64,
}

impl Default for OrientOptions {
    fn default() -> Self {
        Self {
            orthogonality_tolerance_deg: 1.0,
        }
    }
}

/// Wraps an angle into `[0, 360)`.
pub fn normalize_azimuth(deg: f64) -> f64 {
    let wrapped = deg.rem_euclid(360.0);
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Signed difference `to - from` wrapped into `(-180, 180]`.
fn angle_between(from: f64, to: f64) -> f64 {
    let d = (to - from).rem_euclid(360.0);
    if d > 180.0 {
        d - 360.0
    } else {
        d
    }
}

/// Rotates the horizontal pairs of `block` so the x channel points at
/// `target_azimuth_deg` and the y channel 90 degrees clockwise from it, then
/// applies `scale` per channel. Vertical channels are only scaled.
///
/// Each channel's own recorded azimuth enters the rotation, so a pair that is
/// slightly off orthogonal (within tolerance) is still projected exactly.
pub fn reorient(
    block: &AlignedBlock,
    target_azimuth_deg: f64,
    scale: &ScaleFactors,
    options: &OrientOptions,
) -> Result<AlignedBlock, ProcessingError> {
    let fail = |reason: String| ProcessingError::Orientation {
        station: block.station_id().to_string(),
        reason,
    };
    if !target_azimuth_deg.is_finite() {
        return Err(fail(format!("target azimuth {target_azimuth_deg} is not finite")));
    }
    for (kind, factor) in scale {
        if !factor.is_finite() || *factor == 0.0 {
            return Err(fail(format!("scale factor {factor} for {kind} is unusable")));
        }
    }

    let mut data = block.data().clone();
    let mut metas = block.channels().to_vec();
    let theta = target_azimuth_deg.to_radians();
    let (sin_t, cos_t) = theta.sin_cos();

    for (x_kind, y_kind) in HORIZONTAL_PAIRS {
        let (ix, iy) = match (block.index_of(x_kind), block.index_of(y_kind)) {
            (Some(ix), Some(iy)) => (ix, iy),
            (None, None) => continue,
            (Some(_), None) | (None, Some(_)) => {
                return Err(fail(format!("{x_kind}/{y_kind} pair is incomplete")));
            }
        };
        let ax = metas[ix].azimuth_deg;
        let ay = metas[iy].azimuth_deg;
        let spread = angle_between(ax, ay);
        if (spread - 90.0).abs() > options.orthogonality_tolerance_deg {
            return Err(fail(format!(
                "{x_kind} at {ax} deg and {y_kind} at {ay} deg are {spread:.3} deg apart, not 90 +/- {}",
                options.orthogonality_tolerance_deg
            )));
        }

        let (sin_x, cos_x) = ax.to_radians().sin_cos();
        let (sin_y, cos_y) = ay.to_radians().sin_cos();
        let det = spread.to_radians().sin();
        for i in 0..data.ncols() {
            let x = data[[ix, i]];
            let y = data[[iy, i]];
            let north = (sin_y * x - sin_x * y) / det;
            let east = (cos_x * y - cos_y * x) / det;
            data[[ix, i]] = north * cos_t + east * sin_t;
            data[[iy, i]] = east * cos_t - north * sin_t;
        }
        metas[ix].azimuth_deg = normalize_azimuth(target_azimuth_deg);
        metas[iy].azimuth_deg = normalize_azimuth(target_azimuth_deg + 90.0);
        log::debug!(
            "{}: rotated {x_kind}/{y_kind} from {ax}/{ay} deg to {target_azimuth_deg} deg",
            block.station_id()
        );
    }

    for (idx, meta) in metas.iter().enumerate() {
        if let Some(&factor) = scale.get(&meta.kind) {
            if factor != 1.0 {
                data.row_mut(idx).mapv_inplace(|v| v * factor);
            }
        }
    }

    Ok(AlignedBlock::from_parts(
        block.station_id().to_string(),
        block.start(),
        block.sample_rate_hz(),
        metas,
        data,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::{align, AlignOptions, Channel};
    use chrono::{DateTime, TimeZone, Utc};
    use std::f64::consts::PI;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
    }

    fn sine(kind: ChannelKind, azimuth: f64, phase: f64) -> Channel {
        let samples = (0..1000)
            .map(|i| (2.0 * PI * 0.05 * i as f64 + phase).sin())
            .collect();
        Channel::new(kind, "E", 1.0, t0(), azimuth, samples).unwrap()
    }

    fn rms(values: impl Iterator<Item = f64>) -> f64 {
        let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v * v, n + 1));
        (sum / n as f64).sqrt()
    }

    fn electric_block(ax: f64, ay: f64) -> AlignedBlock {
        align(
            "S1",
            &[sine(ChannelKind::Ex, ax, 0.0), sine(ChannelKind::Ey, ay, 1.0)],
            &AlignOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn five_and_ninety_five_to_north_preserves_amplitude() {
        let block = electric_block(5.0, 95.0);
        let rotated = reorient(&block, 0.0, &ScaleFactors::new(), &OrientOptions::default()).unwrap();
        assert_eq!(rotated.channels()[0].azimuth_deg, 0.0);
        assert_eq!(rotated.channels()[1].azimuth_deg, 90.0);
        let total_before: f64 = rms(block.data().iter().copied());
        let total_after: f64 = rms(rotated.data().iter().copied());
        assert!((total_after - total_before).abs() / total_before < 1e-3);
    }

    #[test]
    fn rotation_round_trips() {
        let block = electric_block(0.0, 90.0);
        let options = OrientOptions::default();
        let there = reorient(&block, 30.0, &ScaleFactors::new(), &options).unwrap();
        let back = reorient(&there, 0.0, &ScaleFactors::new(), &options).unwrap();
        for (a, b) in block.data().iter().zip(back.data().iter()) {
            assert!((a - b).abs() < 1e-12);
        }
        assert_eq!(back.channels(), block.channels());
    }

    #[test]
    fn rejects_non_orthogonal_pair() {
        let block = electric_block(0.0, 92.5);
        assert!(matches!(
            reorient(&block, 0.0, &ScaleFactors::new(), &OrientOptions::default()),
            Err(ProcessingError::Orientation { .. })
        ));
    }

    #[test]
    fn scales_after_rotation() {
        let block = electric_block(0.0, 90.0);
        let mut scale = ScaleFactors::new();
        scale.insert(ChannelKind::Ey, 2.0);
        let out = reorient(&block, 0.0, &scale, &OrientOptions::default()).unwrap();
        let ey_in = block.samples(ChannelKind::Ey).unwrap();
        let ey_out = out.samples(ChannelKind::Ey).unwrap();
        assert!((ey_out[10] - 2.0 * ey_in[10]).abs() < 1e-12);
        let ex_in = block.samples(ChannelKind::Ex).unwrap();
        assert!((out.samples(ChannelKind::Ex).unwrap()[10] - ex_in[10]).abs() < 1e-12);
    }

    #[test]
    fn azimuth_wraps_into_range() {
        assert_eq!(normalize_azimuth(-90.0), 270.0);
        assert_eq!(normalize_azimuth(450.0), 90.0);
        assert_eq!(angle_between(350.0, 80.0), 90.0);
    }
}
