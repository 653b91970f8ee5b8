//! Symmetry-constrained Raman tensor construction.
//!
//! A mode's tensor is a 3×3 real symmetric matrix. The crystal class decides
//! which elements are free; everything else is zero or tied to the free set.
//! We use the totally-symmetric-mode forms:
//!
//! | class                        | free elements            | count |
//! |------------------------------|--------------------------|-------|
//! | cubic                        | a (isotropic diagonal)   | 1     |
//! | hexagonal/trigonal/tetragonal| a (=xx=yy), c (=zz)      | 2     |
//! | orthorhombic                 | a, b, c (diagonal)       | 3     |
//! | monoclinic                   | a, b, c, d (=xz)         | 4     |
//! | triclinic                    | full symmetric           | 6     |

use nalgebra::Matrix3;

use crate::domain::CrystalSymmetry;
use crate::error::AppError;

/// A symmetry-constrained Raman tensor for a single mode.
#[derive(Debug, Clone, PartialEq)]
pub struct RamanTensor {
    matrix: Matrix3<f64>,
}

impl RamanTensor {
    /// Build a tensor from exactly `symmetry.free_param_count()` free values.
    ///
    /// Triclinic element order is `[xx, yy, zz, xy, xz, yz]`.
    pub fn from_free_params(
        symmetry: CrystalSymmetry,
        params: &[f64],
    ) -> Result<Self, AppError> {
        let expected = symmetry.free_param_count();
        if params.len() != expected {
            return Err(AppError::invalid_input(format!(
                "{} symmetry requires {expected} tensor element(s), got {}.",
                symmetry.display_name(),
                params.len()
            )));
        }
        if params.iter().any(|p| !p.is_finite()) {
            return Err(AppError::invalid_input(
                "Tensor elements must be finite.",
            ));
        }

        let m = match symmetry {
            CrystalSymmetry::Cubic => {
                let a = params[0];
                Matrix3::new(a, 0.0, 0.0, 0.0, a, 0.0, 0.0, 0.0, a)
            }
            CrystalSymmetry::Hexagonal
            | CrystalSymmetry::Trigonal
            | CrystalSymmetry::Tetragonal => {
                let (a, c) = (params[0], params[1]);
                Matrix3::new(a, 0.0, 0.0, 0.0, a, 0.0, 0.0, 0.0, c)
            }
            CrystalSymmetry::Orthorhombic => {
                let (a, b, c) = (params[0], params[1], params[2]);
                Matrix3::new(a, 0.0, 0.0, 0.0, b, 0.0, 0.0, 0.0, c)
            }
            CrystalSymmetry::Monoclinic => {
                let (a, b, c, d) = (params[0], params[1], params[2], params[3]);
                Matrix3::new(a, 0.0, d, 0.0, b, 0.0, d, 0.0, c)
            }
            CrystalSymmetry::Triclinic => {
                let (xx, yy, zz) = (params[0], params[1], params[2]);
                let (xy, xz, yz) = (params[3], params[4], params[5]);
                Matrix3::new(xx, xy, xz, xy, yy, yz, xz, yz, zz)
            }
        };

        Ok(Self { matrix: m })
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.matrix
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrong_param_count_is_rejected() {
        let err =
            RamanTensor::from_free_params(CrystalSymmetry::Cubic, &[1.0, 2.0]).unwrap_err();
        assert_eq!(err.exit_code(), 2);

        let err = RamanTensor::from_free_params(CrystalSymmetry::Triclinic, &[1.0]).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn non_finite_elements_are_rejected() {
        let err = RamanTensor::from_free_params(CrystalSymmetry::Cubic, &[f64::NAN]).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn built_tensors_are_symmetric() {
        let cases: Vec<(CrystalSymmetry, Vec<f64>)> = vec![
            (CrystalSymmetry::Cubic, vec![2.0]),
            (CrystalSymmetry::Tetragonal, vec![1.0, 3.0]),
            (CrystalSymmetry::Orthorhombic, vec![1.0, 2.0, 3.0]),
            (CrystalSymmetry::Monoclinic, vec![1.0, 2.0, 3.0, 0.5]),
            (
                CrystalSymmetry::Triclinic,
                vec![1.0, 2.0, 3.0, 0.1, 0.2, 0.3],
            ),
        ];
        for (sym, params) in cases {
            let t = RamanTensor::from_free_params(sym, &params).unwrap();
            let m = t.matrix();
            assert_eq!(m.transpose(), *m, "{}", sym.display_name());
        }
    }

    #[test]
    fn triclinic_element_order_is_documented() {
        let t = RamanTensor::from_free_params(
            CrystalSymmetry::Triclinic,
            &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
        )
        .unwrap();
        let m = t.matrix();
        assert_eq!(m[(0, 0)], 1.0);
        assert_eq!(m[(1, 1)], 2.0);
        assert_eq!(m[(2, 2)], 3.0);
        assert_eq!(m[(0, 1)], 4.0);
        assert_eq!(m[(0, 2)], 5.0);
        assert_eq!(m[(1, 2)], 6.0);
    }
}
