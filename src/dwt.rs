//! One-dimensional discrete wavelet transforms via lifting.
//!
//! Two filter banks are built in: the reversible 5/3 integer transform and
//! the irreversible 9/7 floating transform, both factored into predict and
//! update lifting steps per ISO/IEC 15444-1 Annex F. A general biorthogonal
//! filter bank in convolution form is available through
//! [`ArbitraryFilter`] for callers that bring their own taps.
//!
//! Every transform splits a signal of length `n` into a lowpass band of
//! `⌈n/2⌉` samples and a highpass band of `⌊n/2⌋` samples. Out-of-range taps
//! are resolved by the caller's [`BoundaryExtension`]; lifting reads extended
//! values from the deinterleaved even/odd arrays, so forward and inverse see
//! identical boundary samples and invert exactly for every extension mode.

use crate::error::{CodecError, ParameterReason};
use crate::extension::BoundaryExtension;

/// Wavelet filter selection.
#[derive(Debug, Clone, PartialEq)]
pub enum WaveletFilter {
    /// 5/3 reversible integer filter (lossless).
    Reversible53,
    /// 9/7 irreversible floating filter (lossy).
    Irreversible97,
    /// Caller-supplied biorthogonal filter bank in convolution form.
    Arbitrary(ArbitraryFilter),
}

impl WaveletFilter {
    pub fn is_reversible(&self) -> bool {
        matches!(self, Self::Reversible53)
    }
}

fn check_len(n: usize) -> Result<(), CodecError> {
    if n < 2 {
        return Err(CodecError::parameter(ParameterReason::SignalTooShort(n)));
    }
    Ok(())
}

fn check_band_lens(low: usize, high: usize) -> Result<(), CodecError> {
    check_len(low + high)?;
    // The lowpass band holds ⌈n/2⌉ samples, so it is the highpass length
    // or one more.
    if low < high || low > high + 1 {
        return Err(CodecError::parameter(
            ParameterReason::ComponentLengthMismatch,
        ));
    }
    Ok(())
}

fn deinterleave<T: Copy>(signal: &[T]) -> (Vec<T>, Vec<T>) {
    let even = signal.iter().copied().step_by(2).collect();
    let odd = signal.iter().copied().skip(1).step_by(2).collect();
    (even, odd)
}

fn interleave<T: Copy + Default>(even: &[T], odd: &[T]) -> Vec<T> {
    let mut out = vec![T::default(); even.len() + odd.len()];
    for (k, &v) in even.iter().enumerate() {
        out[2 * k] = v;
    }
    for (k, &v) in odd.iter().enumerate() {
        out[2 * k + 1] = v;
    }
    out
}

/// Reversible 5/3 transform (ISO/IEC 15444-1 Annex F, lifting form).
///
/// Integer arithmetic with floor division throughout; forward followed by
/// inverse is a bit-exact identity for every boundary mode.
pub struct Dwt53;

impl Dwt53 {
    /// Split `signal` into (lowpass, highpass).
    pub fn forward(
        signal: &[i32],
        boundary: BoundaryExtension,
    ) -> Result<(Vec<i32>, Vec<i32>), CodecError> {
        check_len(signal.len())?;
        let (mut even, mut odd) = deinterleave(signal);

        // Predict: H[k] = x[2k+1] - floor((x[2k] + x[2k+2]) / 2)
        for k in 0..odd.len() {
            let right = boundary.extend(&even, k as isize + 1);
            odd[k] -= (even[k] + right) >> 1;
        }
        // Update: L[k] = x[2k] + floor((H[k-1] + H[k] + 2) / 4)
        for k in 0..even.len() {
            let left = boundary.extend(&odd, k as isize - 1);
            let here = boundary.extend(&odd, k as isize);
            even[k] += (left + here + 2) >> 2;
        }
        Ok((even, odd))
    }

    /// Reconstruct the signal from its (lowpass, highpass) bands.
    pub fn inverse(
        low: &[i32],
        high: &[i32],
        boundary: BoundaryExtension,
    ) -> Result<Vec<i32>, CodecError> {
        check_band_lens(low.len(), high.len())?;
        let mut even = low.to_vec();
        let mut odd = high.to_vec();

        // Undo update, then undo predict.
        for k in 0..even.len() {
            let left = boundary.extend(&odd, k as isize - 1);
            let here = boundary.extend(&odd, k as isize);
            even[k] -= (left + here + 2) >> 2;
        }
        for k in 0..odd.len() {
            let right = boundary.extend(&even, k as isize + 1);
            odd[k] += (even[k] + right) >> 1;
        }
        Ok(interleave(&even, &odd))
    }
}

/// Irreversible 9/7 transform (ISO/IEC 15444-1 Annex F, lifting form).
pub struct Dwt97;

impl Dwt97 {
    pub const ALPHA: f64 = -1.586134342;
    pub const BETA: f64 = -0.052980118;
    pub const GAMMA: f64 = 0.882911076;
    pub const DELTA: f64 = 0.443506852;
    pub const K: f64 = 1.149604398;

    fn predict(even: &[f64], odd: &mut [f64], coef: f64, boundary: BoundaryExtension) {
        for k in 0..odd.len() {
            let right = boundary.extend(even, k as isize + 1);
            odd[k] += coef * (even[k] + right);
        }
    }

    fn update(even: &mut [f64], odd: &[f64], coef: f64, boundary: BoundaryExtension) {
        for k in 0..even.len() {
            let left = boundary.extend(odd, k as isize - 1);
            let here = boundary.extend(odd, k as isize);
            even[k] += coef * (left + here);
        }
    }

    /// Split `signal` into (lowpass, highpass).
    pub fn forward(
        signal: &[f64],
        boundary: BoundaryExtension,
    ) -> Result<(Vec<f64>, Vec<f64>), CodecError> {
        check_len(signal.len())?;
        let (mut even, mut odd) = deinterleave(signal);

        Self::predict(&even, &mut odd, Self::ALPHA, boundary);
        Self::update(&mut even, &odd, Self::BETA, boundary);
        Self::predict(&even, &mut odd, Self::GAMMA, boundary);
        Self::update(&mut even, &odd, Self::DELTA, boundary);

        for l in even.iter_mut() {
            *l *= Self::K;
        }
        for h in odd.iter_mut() {
            *h /= Self::K;
        }
        Ok((even, odd))
    }

    /// Reconstruct the signal from its (lowpass, highpass) bands.
    pub fn inverse(
        low: &[f64],
        high: &[f64],
        boundary: BoundaryExtension,
    ) -> Result<Vec<f64>, CodecError> {
        check_band_lens(low.len(), high.len())?;
        let mut even: Vec<f64> = low.iter().map(|&l| l / Self::K).collect();
        let mut odd: Vec<f64> = high.iter().map(|&h| h * Self::K).collect();

        Self::update(&mut even, &odd, -Self::DELTA, boundary);
        Self::predict(&even, &mut odd, -Self::GAMMA, boundary);
        Self::update(&mut even, &odd, -Self::BETA, boundary);
        Self::predict(&even, &mut odd, -Self::ALPHA, boundary);

        Ok(interleave(&even, &odd))
    }
}

/// A biorthogonal filter bank in convolution form.
///
/// Analysis taps are centered: the low filter on even sample positions, the
/// high filter on odd positions. Perfect reconstruction is a property of the
/// supplied taps, not of this type; the built-in
/// [`ArbitraryFilter::cdf_5_3`] taps reconstruct exactly up to floating
/// rounding.
#[derive(Debug, Clone, PartialEq)]
pub struct ArbitraryFilter {
    pub analysis_low: Vec<f64>,
    pub analysis_high: Vec<f64>,
    pub synthesis_low: Vec<f64>,
    pub synthesis_high: Vec<f64>,
    pub scale_low: f64,
    pub scale_high: f64,
}

impl ArbitraryFilter {
    /// The 5/3 filter bank in convolution form (floating, no rounding).
    pub fn cdf_5_3() -> Self {
        Self {
            analysis_low: vec![-0.125, 0.25, 0.75, 0.25, -0.125],
            analysis_high: vec![-0.5, 1.0, -0.5],
            synthesis_low: vec![0.5, 1.0, 0.5],
            synthesis_high: vec![-0.125, -0.25, 0.75, -0.25, -0.125],
            scale_low: 1.0,
            scale_high: 1.0,
        }
    }

    /// Split `signal` into (lowpass, highpass) by downsampled convolution
    /// over the boundary-extended signal.
    pub fn forward(
        &self,
        signal: &[f64],
        boundary: BoundaryExtension,
    ) -> Result<(Vec<f64>, Vec<f64>), CodecError> {
        check_len(signal.len())?;
        let c_lo = (self.analysis_low.len() / 2) as isize;
        let c_hi = (self.analysis_high.len() / 2) as isize;

        let low: Vec<f64> = (0..crate::numeric::low_len(signal.len()))
            .map(|k| {
                let acc: f64 = self
                    .analysis_low
                    .iter()
                    .enumerate()
                    .map(|(j, &tap)| tap * boundary.extend(signal, 2 * k as isize + j as isize - c_lo))
                    .sum();
                acc * self.scale_low
            })
            .collect();
        let high: Vec<f64> = (0..crate::numeric::high_len(signal.len()))
            .map(|k| {
                let acc: f64 = self
                    .analysis_high
                    .iter()
                    .enumerate()
                    .map(|(j, &tap)| {
                        tap * boundary.extend(signal, 2 * k as isize + 1 + j as isize - c_hi)
                    })
                    .sum();
                acc * self.scale_high
            })
            .collect();
        Ok((low, high))
    }

    /// Reconstruct the signal by upsampled convolution with the synthesis
    /// taps, extending each band on its own index space.
    pub fn inverse(
        &self,
        low: &[f64],
        high: &[f64],
        boundary: BoundaryExtension,
    ) -> Result<Vec<f64>, CodecError> {
        check_band_lens(low.len(), high.len())?;
        let n = low.len() + high.len();
        let unscaled_low: Vec<f64> = low.iter().map(|&v| v / self.scale_low).collect();
        let unscaled_high: Vec<f64> = high.iter().map(|&v| v / self.scale_high).collect();
        let c_lo = (self.synthesis_low.len() / 2) as isize;
        let c_hi = (self.synthesis_high.len() / 2) as isize;

        let mut out = vec![0.0f64; n];
        for (x, sample) in out.iter_mut().enumerate() {
            let mut acc = 0.0;
            for (j, &tap) in self.synthesis_low.iter().enumerate() {
                // Contribution of L[k] placed at even position 2k.
                let rel = x as isize - (j as isize - c_lo);
                if rel.rem_euclid(2) == 0 {
                    acc += tap * boundary.extend(&unscaled_low, rel.div_euclid(2));
                }
            }
            for (j, &tap) in self.synthesis_high.iter().enumerate() {
                // Contribution of H[k] placed at odd position 2k+1.
                let rel = x as isize - (j as isize - c_hi) - 1;
                if rel.rem_euclid(2) == 0 {
                    acc += tap * boundary.extend(&unscaled_high, rel.div_euclid(2));
                }
            }
            *sample = acc;
        }
        Ok(out)
    }
}
