use rustfft::num_complex::Complex64;
use rustfft::FftPlanner;
use serde::{Deserialize, Serialize};

/// Frequency-dependent sensor response: amplitude ratio and phase (degrees)
/// at tabulated frequencies, ascending.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResponseTable {
    pub frequencies_hz: Vec<f64>,
    pub amplitude: Vec<f64>,
    pub phase_deg: Vec<f64>,
}

impl ResponseTable {
    pub fn validate(&self) -> Result<(), String> {
        let n = self.frequencies_hz.len();
        if n == 0 {
            return Err("response table is empty".into());
        }
        if self.amplitude.len() != n || self.phase_deg.len() != n {
            return Err("response columns differ in length".into());
        }
        if self.frequencies_hz.iter().any(|f| !(*f > 0.0)) {
            return Err("response frequencies must be positive".into());
        }
        if self.frequencies_hz.windows(2).any(|w| w[1] <= w[0]) {
            return Err("response frequencies must be strictly ascending".into());
        }
        if self.amplitude.iter().any(|a| !(*a > 0.0) || !a.is_finite()) {
            return Err("response amplitudes must be positive".into());
        }
        Ok(())
    }

    /// Complex response at `freq_hz`, interpolated linearly in log-frequency.
    /// Frequencies outside the table take the nearest end value. The table
    /// must have passed [`ResponseTable::validate`].
    pub(crate) fn at(&self, freq_hz: f64) -> Complex64 {
        let Some(last) = self.frequencies_hz.len().checked_sub(1) else {
            return Complex64::new(1.0, 0.0);
        };
        let (amp, phase) = if freq_hz <= self.frequencies_hz[0] {
            (self.amplitude[0], self.phase_deg[0])
        } else if freq_hz >= self.frequencies_hz[last] {
            (self.amplitude[last], self.phase_deg[last])
        } else {
            let upper = self
                .frequencies_hz
                .partition_point(|f| *f <= freq_hz)
                .min(last);
            let lower = upper - 1;
            let (f0, f1) = (self.frequencies_hz[lower].ln(), self.frequencies_hz[upper].ln());
            let w = (freq_hz.ln() - f0) / (f1 - f0);
            (
                self.amplitude[lower] + w * (self.amplitude[upper] - self.amplitude[lower]),
                self.phase_deg[lower] + w * (self.phase_deg[upper] - self.phase_deg[lower]),
            )
        };
        Complex64::from_polar(amp, phase.to_radians())
    }
}

/// Divides the spectrum of `samples` by the sensor response. The DC bin is
/// left untouched. Fails if `table` does not validate.
pub fn correct_response(
    samples: &[f64],
    sample_rate_hz: f64,
    table: &ResponseTable,
) -> Result<Vec<f64>, String> {
    table.validate()?;
    let n = samples.len();
    if n < 2 {
        return Ok(samples.to_vec());
    }
    let mut planner = FftPlanner::<f64>::new();
    let forward = planner.plan_fft_forward(n);
    let inverse = planner.plan_fft_inverse(n);

    let mut buffer: Vec<Complex64> = samples.iter().map(|&v| Complex64::new(v, 0.0)).collect();
    forward.process(&mut buffer);
    for (k, bin) in buffer.iter_mut().enumerate().skip(1) {
        let (index, mirrored) = if k <= n / 2 { (k, false) } else { (n - k, true) };
        let freq = index as f64 * sample_rate_hz / n as f64;
        let response = table.at(freq);
        let response = if mirrored { response.conj() } else { response };
        *bin /= response;
    }
    inverse.process(&mut buffer);
    let scale = 1.0 / n as f64;
    Ok(buffer.iter().map(|c| c.re * scale).collect())
}
