//! Multi-component transforms.
//!
//! The two fixed 3-component transforms of ISO/IEC 15444-1 Annex G, the
//! reversible RCT used with the 5/3 filter and the irreversible ICT used
//! with the 9/7 filter, plus the generalized N×N matrix transform of
//! Part 2. RCT round-trips bit-exactly on integers; ICT and the matrix form
//! operate in double precision.

use crate::error::{CodecError, ParameterReason};

fn check_equal_lengths(a: usize, b: usize, c: usize) -> Result<(), CodecError> {
    if a != b || b != c {
        return Err(CodecError::parameter(
            ParameterReason::ComponentLengthMismatch,
        ));
    }
    Ok(())
}

/// Forward reversible color transform, in place over (R, G, B).
///
/// `Y = ⌊(R + 2G + B)/4⌋`, `U = B − G`, `V = R − G`.
pub fn forward_rct(c0: &mut [i32], c1: &mut [i32], c2: &mut [i32]) -> Result<(), CodecError> {
    check_equal_lengths(c0.len(), c1.len(), c2.len())?;
    for i in 0..c0.len() {
        let r = c0[i];
        let g = c1[i];
        let b = c2[i];
        c0[i] = (r + 2 * g + b) >> 2;
        c1[i] = b - g;
        c2[i] = r - g;
    }
    Ok(())
}

/// Inverse reversible color transform, in place over (Y, U, V).
pub fn inverse_rct(c0: &mut [i32], c1: &mut [i32], c2: &mut [i32]) -> Result<(), CodecError> {
    check_equal_lengths(c0.len(), c1.len(), c2.len())?;
    for i in 0..c0.len() {
        let y = c0[i];
        let u = c1[i];
        let v = c2[i];
        let g = y - ((u + v) >> 2);
        c0[i] = v + g;
        c1[i] = g;
        c2[i] = u + g;
    }
    Ok(())
}

/// Forward irreversible color transform, in place over (R, G, B).
pub fn forward_ict(c0: &mut [f64], c1: &mut [f64], c2: &mut [f64]) -> Result<(), CodecError> {
    check_equal_lengths(c0.len(), c1.len(), c2.len())?;
    for i in 0..c0.len() {
        let r = c0[i];
        let g = c1[i];
        let b = c2[i];
        c0[i] = 0.299 * r + 0.587 * g + 0.114 * b;
        c1[i] = -0.168736 * r - 0.331264 * g + 0.5 * b;
        c2[i] = 0.5 * r - 0.418688 * g - 0.081312 * b;
    }
    Ok(())
}

/// Inverse irreversible color transform, in place over (Y, Cb, Cr).
pub fn inverse_ict(c0: &mut [f64], c1: &mut [f64], c2: &mut [f64]) -> Result<(), CodecError> {
    check_equal_lengths(c0.len(), c1.len(), c2.len())?;
    for i in 0..c0.len() {
        let y = c0[i];
        let cb = c1[i];
        let cr = c2[i];
        c0[i] = y + 1.402 * cr;
        c1[i] = y - 0.344136 * cb - 0.714136 * cr;
        c2[i] = y + 1.772 * cb;
    }
    Ok(())
}

/// A generalized N×N component transform (Part 2), row-major coefficients.
#[derive(Debug, Clone, PartialEq)]
pub struct MctMatrix {
    size: usize,
    coefficients: Vec<f64>,
    is_reversible: bool,
}

impl MctMatrix {
    pub fn new(
        size: usize,
        coefficients: Vec<f64>,
        is_reversible: bool,
    ) -> Result<Self, CodecError> {
        if size == 0 || coefficients.len() != size * size {
            return Err(CodecError::parameter(ParameterReason::MatrixSizeMismatch));
        }
        if is_reversible && coefficients.iter().any(|c| c.fract() != 0.0) {
            return Err(CodecError::parameter(ParameterReason::MatrixNotIntegral));
        }
        Ok(Self {
            size,
            coefficients,
            is_reversible,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_reversible(&self) -> bool {
        self.is_reversible
    }

    fn at(&self, row: usize, col: usize) -> f64 {
        self.coefficients[row * self.size + col]
    }

    /// output[i][k] = Σⱼ M[i][j] · input[j][k]
    pub fn apply(&self, components: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, CodecError> {
        if components.len() != self.size {
            return Err(CodecError::parameter(ParameterReason::MatrixSizeMismatch));
        }
        let len = components[0].len();
        if components.iter().any(|c| c.len() != len) {
            return Err(CodecError::parameter(
                ParameterReason::ComponentLengthMismatch,
            ));
        }
        let mut out = vec![vec![0.0f64; len]; self.size];
        for (i, row_out) in out.iter_mut().enumerate() {
            for j in 0..self.size {
                let m = self.at(i, j);
                if m == 0.0 {
                    continue;
                }
                for (k, v) in row_out.iter_mut().enumerate() {
                    *v += m * components[j][k];
                }
            }
        }
        Ok(out)
    }

    /// The matrix inverse, for decoding with the forward-declared matrix.
    /// Gauss-Jordan elimination with partial pivoting; the inverse of a
    /// reversible matrix is not integral in general, so the result is
    /// always a floating matrix.
    pub fn inverted(&self) -> Result<MctMatrix, CodecError> {
        let n = self.size;
        let mut a = self.coefficients.clone();
        let mut inv = vec![0.0f64; n * n];
        for i in 0..n {
            inv[i * n + i] = 1.0;
        }
        for col in 0..n {
            let pivot_row = (col..n)
                .max_by(|&r1, &r2| {
                    a[r1 * n + col]
                        .abs()
                        .partial_cmp(&a[r2 * n + col].abs())
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .unwrap_or(col);
            if a[pivot_row * n + col].abs() < 1e-12 {
                return Err(CodecError::parameter(ParameterReason::MatrixSingular));
            }
            if pivot_row != col {
                for k in 0..n {
                    a.swap(col * n + k, pivot_row * n + k);
                    inv.swap(col * n + k, pivot_row * n + k);
                }
            }
            let pivot = a[col * n + col];
            for k in 0..n {
                a[col * n + k] /= pivot;
                inv[col * n + k] /= pivot;
            }
            for row in 0..n {
                if row == col {
                    continue;
                }
                let factor = a[row * n + col];
                if factor == 0.0 {
                    continue;
                }
                for k in 0..n {
                    a[row * n + k] -= factor * a[col * n + k];
                    inv[row * n + k] -= factor * inv[col * n + k];
                }
            }
        }
        MctMatrix::new(n, inv, false)
    }
}

/// Apply an N×N matrix to N integer components, rounding the output.
/// Requires a matrix flagged reversible (integer coefficients).
pub fn forward_matrix_i32(
    matrix: &MctMatrix,
    components: &[Vec<i32>],
) -> Result<Vec<Vec<i32>>, CodecError> {
    if !matrix.is_reversible {
        return Err(CodecError::parameter(ParameterReason::MatrixNotIntegral));
    }
    let as_f64: Vec<Vec<f64>> = components
        .iter()
        .map(|c| c.iter().map(|&v| v as f64).collect())
        .collect();
    let out = matrix.apply(&as_f64)?;
    Ok(out
        .into_iter()
        .map(|c| c.into_iter().map(|v| v.round() as i32).collect())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rct_roundtrip_is_bit_exact() {
        let cases = [
            (255, 0, 0),
            (0, 255, 0),
            (0, 0, 255),
            (255, 255, 255),
            (0, 0, 0),
            (-128, 127, -1),
            (17, -93, 64),
        ];
        for &(r, g, b) in &cases {
            let mut c0 = vec![r];
            let mut c1 = vec![g];
            let mut c2 = vec![b];
            forward_rct(&mut c0, &mut c1, &mut c2).unwrap();
            inverse_rct(&mut c0, &mut c1, &mut c2).unwrap();
            assert_eq!((c0[0], c1[0], c2[0]), (r, g, b));
        }
    }

    #[test]
    fn rct_pure_red() {
        let mut c0 = vec![255];
        let mut c1 = vec![0];
        let mut c2 = vec![0];
        forward_rct(&mut c0, &mut c1, &mut c2).unwrap();
        assert_eq!(c0[0], 63); // floor(255/4)
        assert_eq!(c1[0], 0);
        assert_eq!(c2[0], 255);
        inverse_rct(&mut c0, &mut c1, &mut c2).unwrap();
        assert_eq!((c0[0], c1[0], c2[0]), (255, 0, 0));
    }

    #[test]
    fn rct_rejects_mismatched_lengths() {
        let mut c0 = vec![0; 3];
        let mut c1 = vec![0; 3];
        let mut c2 = vec![0; 2];
        assert!(forward_rct(&mut c0, &mut c1, &mut c2).is_err());
    }

    #[test]
    fn ict_roundtrip_within_rounding() {
        let r = [255.0, 10.0, 0.0, 200.0];
        let g = [0.0, 250.0, 13.0, 200.0];
        let b = [0.0, 3.0, 255.0, 200.0];
        let mut c0 = r.to_vec();
        let mut c1 = g.to_vec();
        let mut c2 = b.to_vec();
        forward_ict(&mut c0, &mut c1, &mut c2).unwrap();
        inverse_ict(&mut c0, &mut c1, &mut c2).unwrap();
        for i in 0..r.len() {
            assert!((c0[i] - r[i]).abs() < 1e-3);
            assert!((c1[i] - g[i]).abs() < 1e-3);
            assert!((c2[i] - b[i]).abs() < 1e-3);
        }
    }

    #[test]
    fn ict_grey_has_zero_chroma() {
        let mut c0 = vec![128.0];
        let mut c1 = vec![128.0];
        let mut c2 = vec![128.0];
        forward_ict(&mut c0, &mut c1, &mut c2).unwrap();
        assert!((c0[0] - 128.0).abs() < 1e-9);
        assert!(c1[0].abs() < 1e-9);
        assert!(c2[0].abs() < 1e-9);
    }

    #[test]
    fn matrix_identity_passes_through() {
        let m = MctMatrix::new(3, vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0], false)
            .unwrap();
        let comps = vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]];
        let out = m.apply(&comps).unwrap();
        assert_eq!(out, comps);
    }

    #[test]
    fn matrix_apply_then_inverse_recovers_input() {
        let m = MctMatrix::new(2, vec![2.0, 1.0, 1.0, 1.0], false).unwrap();
        let comps = vec![vec![3.0, -1.5, 7.0], vec![0.5, 2.0, -4.0]];
        let transformed = m.apply(&comps).unwrap();
        let back = m.inverted().unwrap().apply(&transformed).unwrap();
        for (orig, rec) in comps.iter().zip(back.iter()) {
            for (a, b) in orig.iter().zip(rec.iter()) {
                assert!((a - b).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn matrix_validation() {
        assert!(MctMatrix::new(2, vec![1.0; 3], false).is_err());
        assert!(MctMatrix::new(2, vec![0.5, 0.0, 0.0, 1.0], true).is_err());
        let singular = MctMatrix::new(2, vec![1.0, 2.0, 2.0, 4.0], false).unwrap();
        assert!(singular.inverted().is_err());

        let m = MctMatrix::new(3, vec![1.0; 9], false).unwrap();
        let two_components = vec![vec![0.0], vec![0.0]];
        assert!(m.apply(&two_components).is_err());
        let uneven = vec![vec![0.0], vec![0.0, 1.0], vec![0.0]];
        assert!(m.apply(&uneven).is_err());
    }

    #[test]
    fn integer_matrix_path_rounds() {
        let m = MctMatrix::new(2, vec![1.0, 1.0, 0.0, 1.0], true).unwrap();
        let comps = vec![vec![3, -2], vec![10, 5]];
        let out = forward_matrix_i32(&m, &comps).unwrap();
        assert_eq!(out, vec![vec![13, 3], vec![10, 5]]);
    }
}
