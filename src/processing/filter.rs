use std::f64::consts::PI;

#[derive(Clone, Copy, Debug)]
struct BiquadCoeffs {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

#[derive(Clone, Copy, Debug, Default)]
struct BiquadState {
    z1: f64,
    z2: f64,
}

#[derive(Clone, Copy, Debug)]
struct BiquadFilter {
    coeffs: BiquadCoeffs,
    state: BiquadState,
}

impl BiquadFilter {
    fn new(coeffs: BiquadCoeffs) -> Self {
        Self {
            coeffs,
            state: BiquadState::default(),
        }
    }

    /// Starts from the steady state for a constant input `level`, so a step
    /// at the edge of the record does not ring.
    fn prime(&mut self, level: f64) {
        let c = self.coeffs;
        let gain = (c.b0 + c.b1 + c.b2) / (1.0 + c.a1 + c.a2);
        let y = gain * level;
        self.state.z2 = c.b2 * level - c.a2 * y;
        self.state.z1 = y - c.b0 * level;
    }

    fn process(&mut self, input: f64) -> f64 {
        // Transposed direct form II
        let y = self.coeffs.b0 * input + self.state.z1;
        self.state.z1 = self.coeffs.b1 * input - self.coeffs.a1 * y + self.state.z2;
        self.state.z2 = self.coeffs.b2 * input - self.coeffs.a2 * y;
        y
    }
}

/// Fourth-order Butterworth low-pass run forward and backward (zero phase).
///
/// Used before integer decimation. Zero phase keeps decimated samples on the
/// same time grid as the undecimated channels they are aligned with.
#[derive(Clone, Debug)]
pub struct AntiAliasFilter {
    sections: Vec<BiquadFilter>,
}

impl AntiAliasFilter {
    /// Cutoff at 0.4 x the output rate, i.e. 80% of the output Nyquist frequency.
    pub fn for_decimation(sample_rate_hz: f64, factor: usize) -> Self {
        let target_rate = sample_rate_hz / factor as f64;
        let cutoff = nyquist_clamp(0.4 * target_rate, sample_rate_hz * 0.5);
        // Butterworth 4th order = two sections with these Q values.
        let qs = [0.541_196_100_146_197, 1.306_562_964_876_376_6];
        let sections = qs
            .iter()
            .map(|&q| BiquadFilter::new(lowpass(cutoff, sample_rate_hz, q)))
            .collect();
        Self { sections }
    }

    fn run(&self, data: &mut [f64]) {
        let Some(&first) = data.first() else {
            return;
        };
        let mut sections = self.sections.clone();
        for section in &mut sections {
            section.prime(first);
        }
        for value in data.iter_mut() {
            let mut v = *value;
            for section in &mut sections {
                v = section.process(v);
            }
            *value = v;
        }
    }

    pub fn filtfilt(&self, samples: &[f64]) -> Vec<f64> {
        let mut data = samples.to_vec();
        self.run(&mut data);
        data.reverse();
        self.run(&mut data);
        data.reverse();
        data
    }
}

fn nyquist_clamp(freq_hz: f64, nyquist: f64) -> f64 {
    freq_hz.clamp(nyquist * 1.0e-4, nyquist * 0.999)
}

fn lowpass(freq_hz: f64, sample_rate_hz: f64, q: f64) -> BiquadCoeffs {
    let w0 = 2.0 * PI * freq_hz / sample_rate_hz;
    let alpha = w0.sin() / (2.0 * q);
    let cos_w0 = w0.cos();
    let b0 = (1.0 - cos_w0) * 0.5;
    let b1 = 1.0 - cos_w0;
    let b2 = b0;
    let a0 = 1.0 + alpha;
    let a1 = -2.0 * cos_w0;
    let a2 = 1.0 - alpha;
    normalize(b0, b1, b2, a0, a1, a2)
}

fn normalize(b0: f64, b1: f64, b2: f64, a0: f64, a1: f64, a2: f64) -> BiquadCoeffs {
    let a0_inv = 1.0 / a0;
    BiquadCoeffs {
        b0: b0 * a0_inv,
        b1: b1 * a0_inv,
        b2: b2 * a0_inv,
        a1: a1 * a0_inv,
        a2: a2 * a0_inv,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rms(data: &[f64]) -> f64 {
        (data.iter().map(|v| v * v).sum::<f64>() / data.len() as f64).sqrt()
    }

    #[test]
    fn passes_dc_and_slow_signals() {
        let filter = AntiAliasFilter::for_decimation(100.0, 4);
        let out = filter.filtfilt(&vec![3.0; 500]);
        assert!(out.iter().all(|v| (v - 3.0).abs() < 1e-9));
        // 0.5 Hz is far below the 10 Hz cutoff.
        let slow: Vec<f64> = (0..2000).map(|i| (2.0 * PI * 0.5 * i as f64 / 100.0).sin()).collect();
        let out = filter.filtfilt(&slow);
        let middle = 500..1500;
        assert!((rms(&out[middle.clone()]) - rms(&slow[middle])).abs() < 0.01);
    }

    #[test]
    fn suppresses_content_above_new_nyquist() {
        let filter = AntiAliasFilter::for_decimation(100.0, 4);
        // 20 Hz would alias at 25 Hz output rate.
        let fast: Vec<f64> = (0..2000).map(|i| (2.0 * PI * 20.0 * i as f64 / 100.0).sin()).collect();
        let out = filter.filtfilt(&fast);
        assert!(rms(&out[500..1500]) < 0.05);
    }

    #[test]
    fn zero_phase_keeps_peaks_in_place() {
        let filter = AntiAliasFilter::for_decimation(100.0, 2);
        let mut pulse = vec![0.0; 401];
        pulse[200] = 1.0;
        let out = filter.filtfilt(&pulse);
        let peak = out
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak, 200);
    }
}
