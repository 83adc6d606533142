use std::f64::consts::PI;

use rustfft::num_complex::Complex64;

/// Vertical-field transfer coefficients and their standard errors.
#[derive(Clone, Copy, Debug)]
pub struct Tipper {
    pub tx: Complex64,
    pub ty: Complex64,
    pub tx_err: f64,
    pub ty_err: f64,
}

/// Impedance tensor at one frequency.
///
/// `z[i][j]` is indexed `[x, y]` on both axes, so `z[0][1]` is Zxy. Units are
/// mV/km per nT. A tensor flagged invalid may carry NaN entries and NaN
/// errors; a valid one never does.
#[derive(Clone, Copy, Debug)]
pub struct ImpedanceTensor {
    pub frequency_hz: f64,
    pub z: [[Complex64; 2]; 2],
    pub z_err: [[f64; 2]; 2],
    pub tipper: Option<Tipper>,
    pub valid: bool,
}

fn same(a: f64, b: f64) -> bool {
    a == b || (a.is_nan() && b.is_nan())
}

fn same_complex(a: Complex64, b: Complex64) -> bool {
    same(a.re, b.re) && same(a.im, b.im)
}

impl PartialEq for Tipper {
    fn eq(&self, other: &Self) -> bool {
        same_complex(self.tx, other.tx)
            && same_complex(self.ty, other.ty)
            && same(self.tx_err, other.tx_err)
            && same(self.ty_err, other.ty_err)
    }
}

// NaN compares equal to NaN so invalid rows survive a reload unchanged.
impl PartialEq for ImpedanceTensor {
    fn eq(&self, other: &Self) -> bool {
        same(self.frequency_hz, other.frequency_hz)
            && self.valid == other.valid
            && self.tipper == other.tipper
            && (0..2).all(|i| {
                (0..2).all(|j| {
                    same_complex(self.z[i][j], other.z[i][j])
                        && same(self.z_err[i][j], other.z_err[i][j])
                })
            })
    }
}

impl ImpedanceTensor {
    pub fn period_s(&self) -> f64 {
        1.0 / self.frequency_hz
    }

    fn complex_values(&self) -> impl Iterator<Item = Complex64> + '_ {
        let tipper = self.tipper.iter().flat_map(|t| [t.tx, t.ty]);
        self.z.iter().flatten().copied().chain(tipper)
    }

    fn errors(&self) -> impl Iterator<Item = f64> + '_ {
        let tipper = self.tipper.iter().flat_map(|t| [t.tx_err, t.ty_err]);
        self.z_err.iter().flatten().copied().chain(tipper)
    }

    /// Checks the per-frequency invariants.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.frequency_hz.is_finite() && self.frequency_hz > 0.0) {
            return Err(format!("frequency {} is not positive", self.frequency_hz));
        }
        if let Some(err) = self.errors().find(|e| *e < 0.0) {
            return Err(format!("negative error {err}"));
        }
        if self.valid {
            if self.complex_values().any(|c| !c.re.is_finite() || !c.im.is_finite()) {
                return Err("non-finite tensor entry in a row not flagged invalid".into());
            }
            if self.errors().any(|e| !e.is_finite()) {
                return Err("non-finite error in a row not flagged invalid".into());
            }
        }
        Ok(())
    }

    /// Cagniard apparent resistivity in ohm m for component `(i, j)`.
    pub fn apparent_resistivity(&self, i: usize, j: usize) -> f64 {
        0.2 * self.period_s() * self.z[i][j].norm_sqr()
    }

    pub fn phase_deg(&self, i: usize, j: usize) -> f64 {
        self.z[i][j].arg() * 180.0 / PI
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tensor(frequency_hz: f64) -> ImpedanceTensor {
        ImpedanceTensor {
            frequency_hz,
            z: [
                [Complex64::new(0.1, -0.1), Complex64::new(10.0, 10.0)],
                [Complex64::new(-10.0, -10.0), Complex64::new(-0.2, 0.05)],
            ],
            z_err: [[0.01, 0.5], [0.5, 0.01]],
            tipper: None,
            valid: true,
        }
    }

    #[test]
    fn apparent_resistivity_and_phase() {
        let t = tensor(1.0);
        // |Zxy|^2 = 200, T = 1 s
        assert!((t.apparent_resistivity(0, 1) - 40.0).abs() < 1e-12);
        assert!((t.phase_deg(0, 1) - 45.0).abs() < 1e-12);
        assert!((t.phase_deg(1, 0) + 135.0).abs() < 1e-12);
    }

    #[test]
    fn nan_only_in_invalid_rows() {
        let mut t = tensor(2.0);
        t.z[1][1] = Complex64::new(f64::NAN, 0.0);
        assert!(t.validate().is_err());
        t.valid = false;
        assert!(t.validate().is_ok());
        assert_eq!(t, t);
    }

    #[test]
    fn rejects_bad_frequency_and_errors() {
        assert!(tensor(0.0).validate().is_err());
        let mut t = tensor(1.0);
        t.z_err[0][0] = -0.1;
        assert!(t.validate().is_err());
        let mut t = tensor(1.0);
        t.tipper = Some(Tipper {
            tx: Complex64::new(0.1, 0.0),
            ty: Complex64::new(0.0, 0.1),
            tx_err: 0.01,
            ty_err: -0.01,
        });
        assert!(t.validate().is_err());
    }
}
