//! Quantization: per-subband step derivation, dead-zone scalar
//! quantization, and trellis-coded quantization.
//!
//! Step sizes are derived, never stored per coefficient. The reversible
//! (5/3) path is integer-preserving with an implicit step of 1; the
//! irreversible path derives `Δ(S, ℓ) = base · 2^(gain(S) − ℓ)` with ℓ = 0
//! the finest decomposition level and gains 0/1/1/2 for LL/LH/HL/HH.
//!
//! For signalling, a step size is packed into the 16-bit exponent/mantissa
//! form of ISO/IEC 15444-1 E.1, `Δ = 2^(R−ε) · (1 + μ/2^11)`; encoders
//! quantize with the decoded (representable) value so both ends agree.

use crate::dwt2d::SubbandKind;
use crate::error::{CodecError, ParameterReason};

/// log2 gain of a subband, from the analysis filter magnitudes.
pub fn band_gain(kind: SubbandKind) -> u8 {
    match kind {
        SubbandKind::Ll => 0,
        SubbandKind::Lh | SubbandKind::Hl => 1,
        SubbandKind::Hh => 2,
    }
}

/// Derivation context for subband step sizes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantizationParams {
    pub base_step: f64,
    pub total_levels: u8,
    pub reversible: bool,
}

impl QuantizationParams {
    pub fn new(base_step: f64, total_levels: u8, reversible: bool) -> Result<Self, CodecError> {
        if !reversible && !(base_step > 0.0) {
            return Err(CodecError::parameter(ParameterReason::StepSizeNotPositive));
        }
        Ok(Self {
            base_step,
            total_levels,
            reversible,
        })
    }

    /// Step size for a subband at decomposition level ℓ (0 = finest).
    pub fn step_size(&self, kind: SubbandKind, level: u8) -> f64 {
        if self.reversible {
            return 1.0;
        }
        self.base_step * 2.0f64.powi(band_gain(kind) as i32 - level as i32)
    }
}

/// Pack a step size into the (ε, μ) form relative to dynamic range `R`.
pub fn encode_step_size(step: f64, dynamic_range: u8) -> u16 {
    debug_assert!(step > 0.0);
    let exponent = (dynamic_range as i32 - step.log2().floor() as i32).clamp(0, 31);
    let mantissa = ((step / 2.0f64.powi(dynamic_range as i32 - exponent) - 1.0) * 2048.0)
        .round()
        .clamp(0.0, 2047.0) as u16;
    ((exponent as u16) << 11) | mantissa
}

/// Unpack an (ε, μ) step size relative to dynamic range `R`.
pub fn decode_step_size(raw: u16, dynamic_range: u8) -> f64 {
    let exponent = (raw >> 11) & 0x1F;
    let mantissa = raw & 0x7FF;
    2.0f64.powi(dynamic_range as i32 - exponent as i32) * (1.0 + mantissa as f64 / 2048.0)
}

/// Exponent signalled for a subband on the reversible (no-quantization)
/// path: ε_b = R + gain_b.
pub fn reversible_exponent(dynamic_range: u8, kind: SubbandKind) -> u8 {
    dynamic_range + band_gain(kind)
}

/// Dead-zone scalar quantization: `q = sign(c) · ⌊|c| / Δ⌋`, giving a
/// symmetric zero bin of width 2Δ.
pub fn quantize_dead_zone(coeffs: &[f64], step: f64) -> Result<Vec<i32>, CodecError> {
    if !(step > 0.0) {
        return Err(CodecError::parameter(ParameterReason::StepSizeNotPositive));
    }
    Ok(coeffs
        .iter()
        .map(|&c| {
            let magnitude = (c.abs() / step).floor() as i32;
            if c < 0.0 {
                -magnitude
            } else {
                magnitude
            }
        })
        .collect())
}

/// Mid-point reconstruction: `ĉ = (|q| + 0.5) · Δ · sign(q)`, zero for the
/// zero bin.
pub fn dequantize_dead_zone(quantized: &[i32], step: f64) -> Vec<f64> {
    quantized
        .iter()
        .map(|&q| {
            if q == 0 {
                0.0
            } else {
                (q.unsigned_abs() as f64 + 0.5) * step * f64::from(q.signum())
            }
        })
        .collect()
}

/// Sequences shorter than this skip the trellis search; the dynamic
/// program cannot recoup its overhead on a handful of samples.
pub const TRELLIS_MIN_SAMPLES: usize = 16;

#[derive(Debug, Clone, PartialEq)]
pub struct TrellisConfig {
    pub step_size: f64,
    pub lambda: f64,
    pub num_states: usize,
    /// Paths costing more than `best · threshold` after a stage are dropped.
    pub pruning_threshold: Option<f64>,
}

impl TrellisConfig {
    pub fn validate(&self) -> Result<(), CodecError> {
        if !(self.step_size > 0.0) {
            return Err(CodecError::parameter(ParameterReason::StepSizeNotPositive));
        }
        if self.lambda < 0.0 {
            return Err(CodecError::parameter(ParameterReason::LambdaNegative));
        }
        if self.num_states < 2 {
            return Err(CodecError::parameter(ParameterReason::TooFewTrellisStates(
                self.num_states,
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrellisResult {
    pub quantized: Vec<i32>,
    pub state_sequence: Vec<usize>,
    pub total_distortion: f64,
    pub estimated_rate: f64,
    pub rd_cost: f64,
}

/// Heuristic proxy for the entropy-coded length of one quantizer index:
/// a significance bit, the magnitude in bits, and a sign bit.
fn rate_estimate(q: i32) -> f64 {
    if q == 0 {
        1.0
    } else {
        1.0 + ((q.unsigned_abs() + 1) as f64).log2() + 1.0
    }
}

fn reconstruction_metrics(coeffs: &[f64], quantized: &[i32], step: f64) -> (f64, f64) {
    let mut distortion = 0.0;
    let mut rate = 0.0;
    for (&c, &q) in coeffs.iter().zip(quantized.iter()) {
        let recon = q as f64 * step;
        distortion += (c - recon) * (c - recon);
        rate += rate_estimate(q);
    }
    (distortion, rate)
}

/// Viterbi search over a `num_states`-state trellis, trading distortion
/// against the rate proxy at weight `lambda`. Each state chooses the
/// quantizer level `sign(c) · (⌊|c|/Δ⌋ + state mod 2)`; the best path is
/// back-tracked and its distortion and rate re-accumulated exactly.
pub fn quantize_trellis(
    coeffs: &[f64],
    config: &TrellisConfig,
) -> Result<TrellisResult, CodecError> {
    config.validate()?;
    let step = config.step_size;

    if coeffs.len() < TRELLIS_MIN_SAMPLES {
        let quantized = quantize_dead_zone(coeffs, step)?;
        let state_sequence = vec![0; quantized.len()];
        let (total_distortion, estimated_rate) =
            reconstruction_metrics(coeffs, &quantized, step);
        let rd_cost = total_distortion + config.lambda * estimated_rate;
        return Ok(TrellisResult {
            quantized,
            state_sequence,
            total_distortion,
            estimated_rate,
            rd_cost,
        });
    }

    let states = config.num_states;
    let mut cost = vec![0.0f64; states];
    let mut back_pointers: Vec<Vec<usize>> = Vec::with_capacity(coeffs.len());
    let mut stage_levels: Vec<Vec<i32>> = Vec::with_capacity(coeffs.len());

    for &c in coeffs {
        let magnitude = (c.abs() / step).floor() as i64;
        let negative = c < 0.0;

        let (best_from, best_prev) = cost
            .iter()
            .copied()
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .unwrap_or((0, 0.0));

        let mut next = vec![f64::INFINITY; states];
        let mut from = vec![0usize; states];
        let mut levels = vec![0i32; states];
        for (to, slot) in next.iter_mut().enumerate() {
            let level = magnitude + (to % 2) as i64;
            let q = (if negative { -level } else { level }) as i32;
            let recon = q as f64 * step;
            let distortion = (c - recon) * (c - recon);
            let stage_cost = distortion + config.lambda * rate_estimate(q);
            *slot = best_prev + stage_cost;
            from[to] = best_from;
            levels[to] = q;
        }
        if let Some(threshold) = config.pruning_threshold {
            let best = next.iter().copied().fold(f64::INFINITY, f64::min);
            for slot in next.iter_mut() {
                if *slot > best * threshold {
                    *slot = f64::INFINITY;
                }
            }
        }
        cost = next;
        back_pointers.push(from);
        stage_levels.push(levels);
    }

    let final_state = cost
        .iter()
        .copied()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(s, _)| s)
        .unwrap_or(0);

    let mut state_sequence = vec![0usize; coeffs.len()];
    let mut quantized = vec![0i32; coeffs.len()];
    let mut state = final_state;
    for n in (0..coeffs.len()).rev() {
        state_sequence[n] = state;
        quantized[n] = stage_levels[n][state];
        state = back_pointers[n][state];
    }

    let (total_distortion, estimated_rate) = reconstruction_metrics(coeffs, &quantized, step);
    let rd_cost = total_distortion + config.lambda * estimated_rate;
    log::debug!(
        "trellis: {} samples, distortion {:.3}, rate {:.1}, rd {:.3}",
        coeffs.len(),
        total_distortion,
        estimated_rate,
        rd_cost
    );
    Ok(TrellisResult {
        quantized,
        state_sequence,
        total_distortion,
        estimated_rate,
        rd_cost,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_derivation_follows_gains() {
        let params = QuantizationParams::new(0.5, 3, false).unwrap();
        assert_eq!(params.step_size(SubbandKind::Ll, 0), 0.5);
        assert_eq!(params.step_size(SubbandKind::Lh, 0), 1.0);
        assert_eq!(params.step_size(SubbandKind::Hl, 0), 1.0);
        assert_eq!(params.step_size(SubbandKind::Hh, 0), 2.0);
        assert_eq!(params.step_size(SubbandKind::Hh, 2), 0.5);

        let reversible = QuantizationParams::new(0.0, 3, true).unwrap();
        assert_eq!(reversible.step_size(SubbandKind::Hh, 0), 1.0);
    }

    #[test]
    fn irreversible_params_need_positive_step() {
        assert!(QuantizationParams::new(0.0, 1, false).is_err());
        assert!(QuantizationParams::new(-1.0, 1, false).is_err());
    }

    #[test]
    fn step_size_codec_roundtrips_within_mantissa_precision() {
        for &step in &[1.0, 0.5, 0.001953125, 3.7, 127.0, 0.030517578125] {
            let raw = encode_step_size(step, 8);
            let decoded = decode_step_size(raw, 8);
            let relative = (decoded - step).abs() / step;
            assert!(relative <= 1.0 / 2048.0 + 1e-12, "step {step}: {decoded}");
        }
        // Unit step at R=8 packs as ε=8, μ=0.
        assert_eq!(encode_step_size(1.0, 8), 8 << 11);
        assert_eq!(decode_step_size(8 << 11, 8), 1.0);
    }

    #[test]
    fn reversible_exponents() {
        assert_eq!(reversible_exponent(8, SubbandKind::Ll), 8);
        assert_eq!(reversible_exponent(8, SubbandKind::Lh), 9);
        assert_eq!(reversible_exponent(8, SubbandKind::Hh), 10);
    }

    #[test]
    fn dead_zone_known_values() {
        let q = quantize_dead_zone(&[3.7, -3.7, 0.4, -0.4, 0.0, 10.0], 1.0).unwrap();
        assert_eq!(q, vec![3, -3, 0, 0, 0, 10]);
        let recon = dequantize_dead_zone(&q, 1.0);
        assert_eq!(recon, vec![3.5, -3.5, 0.0, 0.0, 0.0, 10.5]);
    }

    #[test]
    fn dead_zone_is_monotone() {
        let grid: Vec<f64> = (-40..=40).map(|i| i as f64 * 0.25).collect();
        let q = quantize_dead_zone(&grid, 1.5).unwrap();
        for pair in q.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
    }

    #[test]
    fn dead_zone_rejects_bad_step() {
        assert!(quantize_dead_zone(&[1.0], 0.0).is_err());
        assert!(quantize_dead_zone(&[1.0], -2.0).is_err());
    }

    #[test]
    fn trellis_config_validation() {
        let good = TrellisConfig {
            step_size: 1.0,
            lambda: 0.1,
            num_states: 4,
            pruning_threshold: None,
        };
        assert!(good.validate().is_ok());
        assert!(TrellisConfig { step_size: 0.0, ..good.clone() }.validate().is_err());
        assert!(TrellisConfig { lambda: -0.5, ..good.clone() }.validate().is_err());
        assert!(TrellisConfig { num_states: 1, ..good }.validate().is_err());
    }

    #[test]
    fn short_sequences_fall_back_to_dead_zone() {
        let coeffs = [5.7, -2.3, 0.1, 8.9];
        let config = TrellisConfig {
            step_size: 1.0,
            lambda: 0.25,
            num_states: 4,
            pruning_threshold: None,
        };
        let result = quantize_trellis(&coeffs, &config).unwrap();
        assert_eq!(result.quantized, quantize_dead_zone(&coeffs, 1.0).unwrap());
        assert_eq!(result.state_sequence, vec![0; 4]);
        let expected_rd = result.total_distortion + 0.25 * result.estimated_rate;
        assert!((result.rd_cost - expected_rd).abs() < 1e-12);
    }

    fn test_signal() -> Vec<f64> {
        (0..32)
            .map(|i| ((i * 37 % 101) as f64 - 50.0) * 0.31)
            .collect()
    }

    #[test]
    fn trellis_zero_lambda_beats_plain_floor_on_distortion() {
        let coeffs = test_signal();
        let config = TrellisConfig {
            step_size: 1.0,
            lambda: 0.0,
            num_states: 4,
            pruning_threshold: None,
        };
        let result = quantize_trellis(&coeffs, &config).unwrap();
        let floor_q = quantize_dead_zone(&coeffs, 1.0).unwrap();
        let (floor_distortion, _) = reconstruction_metrics(&coeffs, &floor_q, 1.0);
        assert!(result.total_distortion <= floor_distortion + 1e-9);
        // With λ = 0 the rd cost is pure distortion.
        assert!((result.rd_cost - result.total_distortion).abs() < 1e-12);
        assert_eq!(result.quantized.len(), coeffs.len());
        assert_eq!(result.state_sequence.len(), coeffs.len());
    }

    #[test]
    fn trellis_lambda_suppresses_small_coefficients() {
        // A heavy rate weight should push near-zero coefficients into the
        // dead zone rather than spend bits on them.
        let coeffs: Vec<f64> = (0..32).map(|i| if i % 2 == 0 { 0.99 } else { 20.0 }).collect();
        let cheap = quantize_trellis(
            &coeffs,
            &TrellisConfig {
                step_size: 1.0,
                lambda: 0.0,
                num_states: 4,
                pruning_threshold: None,
            },
        )
        .unwrap();
        let expensive = quantize_trellis(
            &coeffs,
            &TrellisConfig {
                step_size: 1.0,
                lambda: 10.0,
                num_states: 4,
                pruning_threshold: None,
            },
        )
        .unwrap();
        assert!(expensive.estimated_rate < cheap.estimated_rate);
    }

    #[test]
    fn pruning_keeps_the_optimal_path() {
        let coeffs = test_signal();
        let base = TrellisConfig {
            step_size: 0.75,
            lambda: 0.4,
            num_states: 8,
            pruning_threshold: None,
        };
        let unpruned = quantize_trellis(&coeffs, &base).unwrap();
        let pruned = quantize_trellis(
            &coeffs,
            &TrellisConfig {
                pruning_threshold: Some(1.5),
                ..base
            },
        )
        .unwrap();
        assert_eq!(unpruned.quantized, pruned.quantized);
        assert!((unpruned.rd_cost - pruned.rd_cost).abs() < 1e-9);
    }
}
