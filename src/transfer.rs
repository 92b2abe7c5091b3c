use ndarray::ArrayViewMutD;
use num_complex::Complex64;
use serde::Deserialize;

use crate::error::{Error, Result};

/// Largest moment whose factorial is finite in `f64`.
pub const MAX_MOMENT: u32 = 170;

pub fn factorial(n: u32) -> f64 {
    (1..=n).map(f64::from).product()
}

/// Sign of `i^n` taking the real part, or the imaginary part when the
/// real part vanishes.
pub fn phase_sign(n: u32) -> f64 {
    match n % 4 {
        0 | 1 => 1.0,
        _ => -1.0,
    }
}

/// Normalization kernels for radial velocity moments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MomentKernel {
    Auto { ell: u32 },
    Cross { ell: u32, ell_prime: u32 },
}

impl MomentKernel {
    pub fn auto(ell: u32) -> Result<MomentKernel> {
        MomentKernel::Auto { ell }.validated()
    }

    pub fn cross(ell: u32, ell_prime: u32) -> Result<MomentKernel> {
        MomentKernel::Cross { ell, ell_prime }.validated()
    }

    pub fn from_yaml(text: &str) -> Result<MomentKernel> {
        let k: MomentKernel = serde_yaml::from_str(text)?;
        k.validated()
    }

    fn validated(self) -> Result<MomentKernel> {
        let too_big = match self {
            MomentKernel::Auto { ell } => ell > MAX_MOMENT,
            MomentKernel::Cross { ell, ell_prime } => ell > MAX_MOMENT || ell_prime > MAX_MOMENT,
        };
        if too_big {
            return Err(Error::validation(format!(
                "moments above {} overflow the normalization",
                MAX_MOMENT
            )));
        }
        Ok(self)
    }

    pub fn factor(&self) -> f64 {
        match *self {
            MomentKernel::Auto { ell } => 1.0 / factorial(ell),
            MomentKernel::Cross { ell, ell_prime } => {
                let norm = factorial(ell) * factorial(ell_prime);
                if ell == ell_prime {
                    1.0 / norm
                } else {
                    let parity = if ell_prime % 2 == 0 { 1.0 } else { -1.0 };
                    parity * phase_sign(ell + ell_prime) * 2.0 / norm
                }
            }
        }
    }

    /// Scale every mode of a Fourier-space field in place.
    pub fn apply(&self, field: &mut ArrayViewMutD<Complex64>) {
        let kern = self.factor();
        field.mapv_inplace(|c| c * kern);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, ArrayD, IxDyn};

    #[test]
    fn test_auto() {
        assert!((MomentKernel::auto(0).unwrap().factor() - 1.0).abs() < 1e-15);
        assert!((MomentKernel::auto(3).unwrap().factor() - 1.0 / 6.0).abs() < 1e-15);
        assert!(MomentKernel::auto(171).is_err());
    }

    #[test]
    fn test_cross_signs() {
        // equal moments
        let k = MomentKernel::cross(2, 2).unwrap();
        assert!((k.factor() - 0.25).abs() < 1e-15);
        // ell+ell' = 1: i -> +1, (-1)^1 = -1
        let k = MomentKernel::cross(0, 1).unwrap();
        assert!((k.factor() + 2.0).abs() < 1e-15);
        // ell+ell' = 3: -i -> -1, (-1)^2 = +1
        let k = MomentKernel::cross(1, 2).unwrap();
        assert!((k.factor() + 1.0).abs() < 1e-15);
        // ell+ell' = 2: -1, (-1)^0 = +1
        let k = MomentKernel::cross(2, 0).unwrap();
        assert!((k.factor() + 1.0).abs() < 1e-15);
        // ell+ell' = 4: +1, (-1)^3 = -1
        let k = MomentKernel::cross(1, 3).unwrap();
        assert!((k.factor() + 2.0 / 6.0).abs() < 1e-15);
    }

    #[test]
    fn test_phase_matches_complex_power() {
        let i = Complex64::new(0.0, 1.0);
        for n in 0..12 {
            let z = i.powi(n as i32);
            let s = if z.re.abs() > 1e-12 { z.re.signum() } else { z.im.signum() };
            assert_eq!(phase_sign(n), s);
        }
    }

    #[test]
    fn test_apply() {
        let mut field: ArrayD<Complex64> = Array2::from_elem((2, 3), Complex64::new(6.0, -12.0)).into_dyn();
        MomentKernel::auto(3).unwrap().apply(&mut field.view_mut());
        for c in field.iter() {
            assert!((c.re - 1.0).abs() < 1e-12 && (c.im + 2.0).abs() < 1e-12);
        }
        assert_eq!(field.raw_dim(), IxDyn(&[2, 3]));
    }

    #[test]
    fn test_from_yaml() {
        let k = MomentKernel::from_yaml("kind: cross\nell: 2\nell_prime: 1\n").unwrap();
        assert_eq!(k, MomentKernel::Cross { ell: 2, ell_prime: 1 });
        assert!(MomentKernel::from_yaml("kind: auto\nell: 500\n").is_err());
        assert!(MomentKernel::from_yaml("kind: quadrupole\nell: 2\n").is_err());
    }
}
