//! Tile pipeline orchestration.
//!
//! Forward direction: DC level shift, optional point transform, optional
//! color transform, N-level 2D DWT, per-subband quantization, marker
//! emission plus coefficient serialization. The inverse direction applies
//! the stage inverses in reverse order, re-adding the DC shift last.
//!
//! Tier-1/tier-2 entropy coding is outside this core: the tile bitstream
//! region carries the quantized coefficients as big-endian `i32` words,
//! subband-ordered (the deepest LL first, then LH/HL/HH from the deepest
//! level outward, per component). An entropy coder slots in behind the
//! same hand-off (quantized subbands plus their step sizes) without
//! touching any other stage.
//!
//! The pipeline always extends symmetrically at tile edges, the Part 1
//! default; [`crate::config::CodecConfig::boundary`] parameterizes the
//! standalone transform entry points only. Cancellation is observed at
//! stage boundaries: a cancelled operation returns [`CodecError::Cancelled`]
//! and no partial output.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::codestream::{
    Codestream, CodestreamEmitter, CodestreamParser, CodestreamReader, CodestreamWriter,
    ComponentSignature, MainHeader, NltSegment, QcdSegment, SizSegment, SotSegment,
};
use crate::codestream::syntax::{
    CapSegment, CodSegment, CpfSegment, QuantizationStyle, NLT_ALL_COMPONENTS, PCAP_HTJ2K_BIT,
    PCPF_HT_PROFILE_BIT, RSIZ_HTJ2K_BIT, TRANSFORM_IRREVERSIBLE_9_7, TRANSFORM_REVERSIBLE_5_3,
};
use crate::config::{CodecConfig, QuantizerKind};
use crate::dwt2d::{level_sizes, DecompositionLevel, Dwt2d, SubbandKind};
use crate::error::{CodecError, FeatureReason, ParameterReason, PrecisionReason, ViolationKind};
use crate::extension::BoundaryExtension;
use crate::mct;
use crate::nlt::sample_range;
use crate::quantization::{
    decode_step_size, dequantize_dead_zone, encode_step_size, quantize_dead_zone,
    quantize_trellis, reversible_exponent, QuantizationParams, TrellisConfig,
};

/// Cooperative cancellation flag, shared between the caller and the
/// pipeline. Checked at stage boundaries only.
#[derive(Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    fn checkpoint(&self) -> Result<(), CodecError> {
        if self.is_cancelled() {
            return Err(CodecError::Cancelled);
        }
        Ok(())
    }
}

/// A decoded tile: planar components plus the precision they declare.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedTile {
    pub width: usize,
    pub height: usize,
    pub bit_depth: u8,
    pub signed: bool,
    pub components: Vec<Vec<i32>>,
}

/// Pipeline boundary mode mandated by Part 1 for the tile transform.
const TILE_BOUNDARY: BoundaryExtension = BoundaryExtension::Symmetric;

/// Encode one tile with the given configuration.
pub fn encode_tile(components: &[Vec<i32>], config: &CodecConfig) -> Result<Vec<u8>, CodecError> {
    TileEncoder::new(config.clone())?.encode(components)
}

/// Decode one tile from a codestream.
pub fn decode_tile(codestream: &[u8]) -> Result<DecodedTile, CodecError> {
    TileDecoder::new().decode(codestream)
}

pub struct TileEncoder {
    config: CodecConfig,
    cancel: CancelToken,
}

impl TileEncoder {
    /// Validates the configuration up front; the encoder itself is
    /// immutable afterwards.
    pub fn new(config: CodecConfig) -> Result<Self, CodecError> {
        config.validate()?;
        Ok(Self {
            config,
            cancel: CancelToken::new(),
        })
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn encode(&self, components: &[Vec<i32>]) -> Result<Vec<u8>, CodecError> {
        let config = &self.config;
        if components.len() != config.component_count {
            return Err(CodecError::parameter(
                ParameterReason::ComponentCountMismatch(components.len()),
            ));
        }
        let samples = config.width * config.height;
        if components.iter().any(|c| c.len() != samples) {
            return Err(CodecError::parameter(ParameterReason::SampleCountMismatch));
        }
        self.cancel.checkpoint()?;

        // Stage 1: DC level shift centers unsigned data around zero.
        let mut planes: Vec<Vec<i32>> = components.to_vec();
        if !config.signed {
            let shift = 1i32 << (config.bit_depth - 1);
            for plane in planes.iter_mut() {
                for sample in plane.iter_mut() {
                    *sample -= shift;
                }
            }
        }
        log::debug!(
            "encode {}x{}x{}: dc shift done",
            config.width,
            config.height,
            planes.len()
        );
        self.cancel.checkpoint()?;

        // Stage 2: point transform, over the DC-shifted (signed) range.
        if let Some(nlt) = &config.nlt {
            for plane in planes.iter_mut() {
                nlt.apply_forward(plane, config.bit_depth, true)?;
            }
            self.cancel.checkpoint()?;
        }

        let reversible = config.filter.is_reversible();
        let use_mct = config.use_mct && planes.len() >= 3;
        let levels = config.decomposition_levels;

        // Stages 3-5 run on the integer path for the reversible filter and
        // on the floating path otherwise.
        let (band_data, qcd) = if reversible {
            if use_mct {
                let (first, rest) = planes.split_at_mut(1);
                let (second, third) = rest.split_at_mut(1);
                mct::forward_rct(&mut first[0], &mut second[0], &mut third[0])?;
                self.cancel.checkpoint()?;
            }
            self.encode_reversible(&planes)?
        } else {
            let mut float_planes: Vec<Vec<f64>> = planes
                .iter()
                .map(|plane| plane.iter().map(|&s| s as f64).collect())
                .collect();
            if use_mct {
                let (first, rest) = float_planes.split_at_mut(1);
                let (second, third) = rest.split_at_mut(1);
                mct::forward_ict(&mut first[0], &mut second[0], &mut third[0])?;
                self.cancel.checkpoint()?;
            }
            self.encode_irreversible(&float_planes)?
        };
        self.cancel.checkpoint()?;

        // Stage 6: marker emission and coefficient serialization.
        let mut emitter = CodestreamEmitter::new();
        emitter.write_soc();
        emitter.write_siz(&self.siz_segment());
        if config.declare_htj2k {
            emitter.write_cap(&CapSegment {
                pcap: PCAP_HTJ2K_BIT,
                ccap: vec![0],
            });
            emitter.write_cpf(&CpfSegment {
                pcpf: PCPF_HT_PROFILE_BIT,
            });
        }
        emitter.write_cod(&CodSegment {
            coding_style: 0,
            progression_order: 0,
            layer_count: 1,
            mct: u8::from(use_mct),
            decomposition_levels: levels,
            codeblock_width_exp: 4,
            codeblock_height_exp: 4,
            codeblock_style: 0,
            transformation: if reversible {
                TRANSFORM_REVERSIBLE_5_3
            } else {
                TRANSFORM_IRREVERSIBLE_9_7
            },
            precinct_sizes: Vec::new(),
        });
        emitter.write_qcd(&qcd);
        if let Some(nlt) = &config.nlt {
            emitter.write_nlt(&NltSegment {
                component: NLT_ALL_COMPONENTS,
                definition: nlt.clone(),
            });
        }
        if let Some(comment) = &config.comment {
            emitter.write_comment(comment);
        }

        let sot_offset = emitter.write_sot(&SotSegment {
            tile_index: 0,
            tile_part_length: 0,
            tile_part_index: 0,
            tile_part_count: 1,
        });
        emitter.write_sod();
        emitter.write_tile_data(&band_data);
        let tile_length = (emitter.len() - sot_offset) as u32;
        emitter.patch_tile_part_length(sot_offset, tile_length);
        emitter.write_eoc();
        log::debug!("encode: {} codestream bytes", emitter.len());
        Ok(emitter.finish())
    }

    fn siz_segment(&self) -> SizSegment {
        let config = &self.config;
        SizSegment {
            rsiz: if config.declare_htj2k {
                RSIZ_HTJ2K_BIT
            } else {
                0
            },
            width: config.width as u32,
            height: config.height as u32,
            x_origin: 0,
            y_origin: 0,
            tile_width: config.width as u32,
            tile_height: config.height as u32,
            tile_x_origin: 0,
            tile_y_origin: 0,
            components: vec![
                ComponentSignature {
                    bit_depth: config.bit_depth,
                    signed: config.signed,
                    sub_x: 1,
                    sub_y: 1,
                };
                config.component_count
            ],
        }
    }

    /// Reversible path: the 5/3 transform preserves integers and the
    /// quantizer is the identity (unit step).
    fn encode_reversible(&self, planes: &[Vec<i32>]) -> Result<(Vec<u8>, QcdSegment), CodecError> {
        let config = &self.config;
        let mut writer = CodestreamWriter::new();
        for plane in planes {
            let pyramid = Dwt2d::forward_53(
                plane,
                config.width,
                config.height,
                config.decomposition_levels,
                TILE_BOUNDARY,
            )?;
            self.cancel.checkpoint()?;
            if pyramid.is_empty() {
                write_coefficients(&mut writer, plane);
            } else {
                serialize_pyramid_i32(&mut writer, &pyramid);
            }
        }
        let qcd = QcdSegment {
            guard_bits: 2,
            style: QuantizationStyle::NoQuantization,
            step_sizes: band_order(config.decomposition_levels)
                .map(|(kind, _)| (reversible_exponent(config.bit_depth, kind) << 3) as u16)
                .collect(),
        };
        Ok((writer.into_bytes(), qcd))
    }

    /// Irreversible path: 9/7 transform, then dead-zone or trellis
    /// quantization with steps derived per subband. Each step is packed to
    /// its (ε, μ) wire form and the decoded value is what quantizes, so
    /// encoder and decoder agree bit-for-bit on the step.
    fn encode_irreversible(
        &self,
        planes: &[Vec<f64>],
    ) -> Result<(Vec<u8>, QcdSegment), CodecError> {
        let config = &self.config;
        let levels = config.decomposition_levels;
        let steps = self.derived_steps()?;
        let mut writer = CodestreamWriter::new();
        for plane in planes {
            let pyramid = Dwt2d::forward_97(
                plane,
                config.width,
                config.height,
                levels,
                TILE_BOUNDARY,
            )?;
            self.cancel.checkpoint()?;
            if pyramid.is_empty() {
                let quantized = self.quantize_band(plane, steps[0].1)?;
                write_coefficients(&mut writer, &quantized);
                continue;
            }
            // Bands in serialization order; lengths match `band_order` by
            // construction.
            let mut bands: Vec<&[f64]> = Vec::with_capacity(steps.len());
            if let Some(ll) = pyramid.last().and_then(|level| level.ll.as_deref()) {
                bands.push(ll);
            }
            for level in pyramid.iter().rev() {
                bands.push(&level.lh);
                bands.push(&level.hl);
                bands.push(&level.hh);
            }
            for (band, &(_, step)) in bands.iter().zip(steps.iter()) {
                let quantized = self.quantize_band(band, step)?;
                write_coefficients(&mut writer, &quantized);
            }
            self.cancel.checkpoint()?;
        }
        let qcd = QcdSegment {
            guard_bits: 2,
            style: QuantizationStyle::ScalarExpounded,
            step_sizes: steps
                .iter()
                .map(|&(_, step)| encode_step_size(step, config.bit_depth))
                .collect(),
        };
        Ok((writer.into_bytes(), qcd))
    }

    /// Representable (wire-form) step per subband, in serialization order.
    fn derived_steps(&self) -> Result<Vec<(SubbandKind, f64)>, CodecError> {
        let config = &self.config;
        let levels = config.decomposition_levels;
        let raw_step = |kind: SubbandKind, level: u8| -> Result<f64, CodecError> {
            match &config.quantizer {
                QuantizerKind::None => Ok(1.0),
                QuantizerKind::DeadZone { base_step } => {
                    let params = QuantizationParams::new(*base_step, levels, false)?;
                    Ok(params.step_size(kind, level))
                }
                QuantizerKind::Trellis(trellis) => Ok(trellis.step_size),
            }
        };
        band_order(levels)
            .map(|(kind, level)| {
                let step = raw_step(kind, level)?;
                let representable =
                    decode_step_size(encode_step_size(step, config.bit_depth), config.bit_depth);
                Ok((kind, representable))
            })
            .collect()
    }

    fn quantize_band(&self, coefficients: &[f64], step: f64) -> Result<Vec<i32>, CodecError> {
        match &self.config.quantizer {
            QuantizerKind::Trellis(trellis) => {
                let tuned = TrellisConfig {
                    step_size: step,
                    ..trellis.clone()
                };
                Ok(quantize_trellis(coefficients, &tuned)?.quantized)
            }
            _ => quantize_dead_zone(coefficients, step),
        }
    }
}

/// Subband serialization order: the deepest LL, then LH/HL/HH per level
/// from the deepest level outward. Yields `(kind, level)` with the level
/// expressed as the 0-based depth used by step derivation (0 = finest).
fn band_order(levels: u8) -> impl Iterator<Item = (SubbandKind, u8)> {
    let deepest = levels.saturating_sub(1);
    std::iter::once((SubbandKind::Ll, deepest)).chain((0..levels).rev().flat_map(|level| {
        SubbandKind::DETAIL
            .into_iter()
            .map(move |kind| (kind, level))
    }))
}

fn write_coefficients(writer: &mut CodestreamWriter, coefficients: &[i32]) {
    for &value in coefficients {
        writer.write_u32(value as u32);
    }
}

fn serialize_pyramid_i32(writer: &mut CodestreamWriter, pyramid: &[DecompositionLevel<i32>]) {
    if let Some(Some(ll)) = pyramid.last().map(|level| level.ll.as_ref()) {
        write_coefficients(writer, ll);
    }
    for level in pyramid.iter().rev() {
        write_coefficients(writer, &level.lh);
        write_coefficients(writer, &level.hl);
        write_coefficients(writer, &level.hh);
    }
}

pub struct TileDecoder {
    cancel: CancelToken,
    allow_nlt: bool,
}

impl Default for TileDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl TileDecoder {
    pub fn new() -> Self {
        Self {
            cancel: CancelToken::new(),
            allow_nlt: true,
        }
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Disable Part 2 NLT handling; a codestream carrying an NLT segment
    /// then fails with [`FeatureReason::NltDisabled`].
    pub fn with_nlt_support(mut self, allow: bool) -> Self {
        self.allow_nlt = allow;
        self
    }

    pub fn decode(&self, codestream: &[u8]) -> Result<DecodedTile, CodecError> {
        let parsed = CodestreamParser::new(codestream).parse()?;
        self.cancel.checkpoint()?;
        let header = &parsed.header;
        let siz = &header.siz;

        if siz.tile_width < siz.width || siz.tile_height < siz.height {
            return Err(CodecError::unsupported(FeatureReason::MultipleTiles));
        }
        let signature = siz.components[0];
        if siz
            .components
            .iter()
            .any(|c| c.sub_x != 1 || c.sub_y != 1)
        {
            return Err(CodecError::unsupported(FeatureReason::Subsampling));
        }
        if siz.components.iter().any(|c| {
            c.bit_depth != signature.bit_depth || c.signed != signature.signed
        }) {
            return Err(CodecError::unsupported(FeatureReason::MixedPrecision));
        }
        if !self.allow_nlt && !header.nlt.is_empty() {
            return Err(CodecError::unsupported(FeatureReason::NltDisabled));
        }

        let width = siz.width as usize;
        let height = siz.height as usize;
        let levels = header.cod.decomposition_levels;
        let component_count = siz.components.len();
        let reversible = match header.cod.transformation {
            TRANSFORM_REVERSIBLE_5_3 => true,
            TRANSFORM_IRREVERSIBLE_9_7 => false,
            other => {
                return Err(CodecError::unsupported(FeatureReason::Transformation(other)))
            }
        };

        let payload = concatenate_payloads(codestream, &parsed);
        let mut reader = CodestreamReader::new(&payload);
        let steps = decoded_steps(header, signature.bit_depth, levels, reversible)?;
        self.cancel.checkpoint()?;

        let mut planes: Vec<Vec<i32>> = Vec::with_capacity(component_count);
        for _ in 0..component_count {
            let plane = if reversible {
                self.decode_reversible_plane(&mut reader, width, height, levels)?
            } else {
                self.decode_irreversible_plane(&mut reader, width, height, levels, &steps)?
            };
            planes.push(plane);
            self.cancel.checkpoint()?;
        }

        // Inverse color transform.
        if header.cod.mct != 0 && planes.len() >= 3 {
            if reversible {
                let (first, rest) = planes.split_at_mut(1);
                let (second, third) = rest.split_at_mut(1);
                mct::inverse_rct(&mut first[0], &mut second[0], &mut third[0])?;
            } else {
                let mut floats: Vec<Vec<f64>> = planes[..3]
                    .iter()
                    .map(|p| p.iter().map(|&v| v as f64).collect())
                    .collect();
                let (first, rest) = floats.split_at_mut(1);
                let (second, third) = rest.split_at_mut(1);
                mct::inverse_ict(&mut first[0], &mut second[0], &mut third[0])?;
                for (plane, float) in planes.iter_mut().zip(floats) {
                    *plane = float.iter().map(|&v| v.round() as i32).collect();
                }
            }
            self.cancel.checkpoint()?;
        }

        // Inverse point transform.
        for segment in &header.nlt {
            for (index, plane) in planes.iter_mut().enumerate() {
                if segment.component == NLT_ALL_COMPONENTS
                    || segment.component as usize == index
                {
                    segment
                        .definition
                        .apply_inverse(plane, signature.bit_depth, true)?;
                }
            }
        }
        self.cancel.checkpoint()?;

        // DC level shift re-added last; a reversible stream with no point
        // transform must land exactly inside the declared range.
        let (min, max) = sample_range(signature.bit_depth, signature.signed);
        let shift = if signature.signed {
            0
        } else {
            1i32 << (signature.bit_depth - 1)
        };
        let exact = reversible && header.nlt.is_empty();
        for plane in planes.iter_mut() {
            for (index, sample) in plane.iter_mut().enumerate() {
                let restored = *sample + shift;
                if restored < min || restored > max {
                    if exact {
                        return Err(CodecError::PrecisionViolation {
                            reason: PrecisionReason::RangeOverflow(index),
                        });
                    }
                    *sample = restored.clamp(min, max);
                } else {
                    *sample = restored;
                }
            }
        }

        Ok(DecodedTile {
            width,
            height,
            bit_depth: signature.bit_depth,
            signed: signature.signed,
            components: planes,
        })
    }

    fn decode_reversible_plane(
        &self,
        reader: &mut CodestreamReader,
        width: usize,
        height: usize,
        levels: u8,
    ) -> Result<Vec<i32>, CodecError> {
        if levels == 0 {
            return read_coefficients(reader, width * height);
        }
        let pyramid = read_pyramid(reader, width, height, levels, |raw| Ok(raw))?;
        Dwt2d::inverse_53(&pyramid, TILE_BOUNDARY)
    }

    fn decode_irreversible_plane(
        &self,
        reader: &mut CodestreamReader,
        width: usize,
        height: usize,
        levels: u8,
        steps: &[f64],
    ) -> Result<Vec<i32>, CodecError> {
        if levels == 0 {
            let quantized = read_coefficients(reader, width * height)?;
            let restored = dequantize_dead_zone(&quantized, steps[0]);
            return Ok(restored.iter().map(|&v| v.round() as i32).collect());
        }
        let mut band_index = 0usize;
        let pyramid = read_pyramid(reader, width, height, levels, |raw| {
            let step = steps
                .get(band_index)
                .copied()
                .ok_or(CodecError::parameter(ParameterReason::ComponentLengthMismatch))?;
            band_index += 1;
            Ok(dequantize_dead_zone(&raw, step))
        })?;
        let restored = Dwt2d::inverse_97(&pyramid, TILE_BOUNDARY)?;
        Ok(restored.iter().map(|&v| v.round() as i32).collect())
    }
}

fn concatenate_payloads(codestream: &[u8], parsed: &Codestream) -> Vec<u8> {
    let mut payload = Vec::new();
    for tile_part in &parsed.tile_parts {
        payload.extend_from_slice(&codestream[tile_part.payload.clone()]);
    }
    payload
}

fn read_coefficients(
    reader: &mut CodestreamReader,
    count: usize,
) -> Result<Vec<i32>, CodecError> {
    let mut coefficients = Vec::with_capacity(count);
    for _ in 0..count {
        coefficients.push(reader.read_u32()? as i32);
    }
    Ok(coefficients)
}

/// Rebuild a decomposition pyramid from serialized bands. `restore` maps
/// each raw coefficient band to its working type (identity for the
/// reversible path, dequantization for the irreversible one), invoked in
/// serialization order: deepest LL first, then each level's details from
/// the deepest outward.
fn read_pyramid<T, F>(
    reader: &mut CodestreamReader,
    width: usize,
    height: usize,
    levels: u8,
    mut restore: F,
) -> Result<Vec<DecompositionLevel<T>>, CodecError>
where
    T: Copy + Default,
    F: FnMut(Vec<i32>) -> Result<Vec<T>, CodecError>,
{
    let sizes = level_sizes(width, height, levels)?;
    let mut pyramid: Vec<DecompositionLevel<T>> = sizes
        .iter()
        .enumerate()
        .map(|(index, &(w, h))| DecompositionLevel {
            level: index as u8 + 1,
            width: w,
            height: h,
            ll_width: crate::numeric::low_len(w),
            ll_height: crate::numeric::low_len(h),
            ll: None,
            lh: Vec::new(),
            hl: Vec::new(),
            hh: Vec::new(),
        })
        .collect();

    let band_len = |level: &DecompositionLevel<T>, kind: SubbandKind| {
        let (w, h) = level.band_dims(kind);
        w * h
    };

    let deepest_index = pyramid.len() - 1;
    let ll_count = band_len(&pyramid[deepest_index], SubbandKind::Ll);
    let ll = restore(read_coefficients(reader, ll_count)?)?;
    pyramid[deepest_index].ll = Some(ll);

    for index in (0..pyramid.len()).rev() {
        for kind in SubbandKind::DETAIL {
            let count = band_len(&pyramid[index], kind);
            let band = restore(read_coefficients(reader, count)?)?;
            match kind {
                SubbandKind::Lh => pyramid[index].lh = band,
                SubbandKind::Hl => pyramid[index].hl = band,
                SubbandKind::Hh => pyramid[index].hh = band,
                SubbandKind::Ll => unreachable!("DETAIL holds no LL"),
            }
        }
    }
    Ok(pyramid)
}

/// Per-band step sizes in serialization order, from the QCD segment.
fn decoded_steps(
    header: &MainHeader,
    bit_depth: u8,
    levels: u8,
    reversible: bool,
) -> Result<Vec<f64>, CodecError> {
    let expected = 1 + 3 * levels as usize;
    match header.qcd.style {
        QuantizationStyle::NoQuantization => {
            if !reversible {
                return Err(CodecError::unsupported(FeatureReason::QuantizationStyle(
                    header.qcd.sqcd_byte(),
                )));
            }
            Ok(vec![1.0; expected])
        }
        QuantizationStyle::ScalarExpounded => {
            if header.qcd.step_sizes.len() < expected {
                return Err(CodecError::codestream(
                    0,
                    ViolationKind::MalformedSegmentLength,
                ));
            }
            Ok(header
                .qcd
                .step_sizes
                .iter()
                .map(|&raw| decode_step_size(raw, bit_depth))
                .collect())
        }
        QuantizationStyle::ScalarDerived => Err(CodecError::unsupported(
            FeatureReason::QuantizationStyle(header.qcd.sqcd_byte()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dwt::WaveletFilter;
    use crate::nlt::{LogBase, NltDefinition};

    fn gradient(width: usize, height: usize, bit_depth: u8) -> Vec<i32> {
        let max = (1 << bit_depth) - 1;
        (0..width * height).map(|i| (i * 3) as i32 % max).collect()
    }

    #[test]
    fn uniform_tile_roundtrips_losslessly() {
        let mut config = CodecConfig::new(8, 8, 8, 1);
        config.decomposition_levels = 1;
        let image = vec![128i32; 64];
        let bytes = encode_tile(&[image.clone()], &config).unwrap();

        assert_eq!(&bytes[..2], &[0xFF, 0x4F]);
        assert_eq!(&bytes[bytes.len() - 2..], &[0xFF, 0xD9]);
        for marker in [[0xFF, 0x51], [0xFF, 0x52], [0xFF, 0x5C], [0xFF, 0x90], [0xFF, 0x93]] {
            assert!(bytes.windows(2).any(|w| w == marker), "missing {marker:02X?}");
        }

        let decoded = decode_tile(&bytes).unwrap();
        assert_eq!(decoded.width, 8);
        assert_eq!(decoded.height, 8);
        assert_eq!(decoded.bit_depth, 8);
        assert_eq!(decoded.components, vec![image]);
    }

    #[test]
    fn grayscale_lossless_roundtrip_multi_level() {
        let mut config = CodecConfig::new(16, 12, 8, 1);
        config.decomposition_levels = 3;
        let image = gradient(16, 12, 8);
        let bytes = encode_tile(&[image.clone()], &config).unwrap();
        let decoded = decode_tile(&bytes).unwrap();
        assert_eq!(decoded.components, vec![image]);
    }

    #[test]
    fn rgb_lossless_roundtrip_with_rct() {
        let mut config = CodecConfig::new(8, 8, 8, 3);
        config.decomposition_levels = 2;
        config.use_mct = true;
        let r = gradient(8, 8, 8);
        let g: Vec<i32> = r.iter().map(|&v| 255 - v).collect();
        let b = vec![7i32; 64];
        let components = [r, g, b];
        let bytes = encode_tile(&components, &config).unwrap();
        let decoded = decode_tile(&bytes).unwrap();
        assert_eq!(decoded.components, components.to_vec());
    }

    #[test]
    fn signed_samples_roundtrip_without_shift() {
        let mut config = CodecConfig::new(8, 8, 8, 1);
        config.signed = true;
        config.decomposition_levels = 1;
        let image: Vec<i32> = (0..64).map(|i| i - 32).collect();
        let bytes = encode_tile(&[image.clone()], &config).unwrap();
        let decoded = decode_tile(&bytes).unwrap();
        assert!(decoded.signed);
        assert_eq!(decoded.components, vec![image]);
    }

    #[test]
    fn zero_levels_skips_the_transform() {
        let mut config = CodecConfig::new(8, 8, 8, 1);
        config.decomposition_levels = 0;
        let image = gradient(8, 8, 8);
        let bytes = encode_tile(&[image.clone()], &config).unwrap();
        let decoded = decode_tile(&bytes).unwrap();
        assert_eq!(decoded.components, vec![image]);
    }

    #[test]
    fn lossy_roundtrip_stays_within_step_error() {
        let mut config = CodecConfig::new(16, 16, 8, 1);
        config.filter = WaveletFilter::Irreversible97;
        config.decomposition_levels = 2;
        config.quantizer = QuantizerKind::DeadZone { base_step: 0.5 };
        let image = gradient(16, 16, 8);
        let bytes = encode_tile(&[image.clone()], &config).unwrap();
        let decoded = decode_tile(&bytes).unwrap();
        let max_err = image
            .iter()
            .zip(decoded.components[0].iter())
            .map(|(&a, &b)| (a - b).abs())
            .max()
            .unwrap();
        // Coarse bound: reconstruction error stays within a few steps
        // after the synthesis filter smears quantization noise.
        assert!(max_err <= 16, "max error {max_err}");
    }

    #[test]
    fn trellis_quantizer_produces_a_decodable_stream() {
        let mut config = CodecConfig::new(16, 16, 8, 1);
        config.filter = WaveletFilter::Irreversible97;
        config.decomposition_levels = 1;
        config.quantizer = QuantizerKind::Trellis(TrellisConfig {
            step_size: 1.0,
            lambda: 0.1,
            num_states: 4,
            pruning_threshold: None,
        });
        let image = gradient(16, 16, 8);
        let bytes = encode_tile(&[image.clone()], &config).unwrap();
        let decoded = decode_tile(&bytes).unwrap();
        assert_eq!(decoded.components[0].len(), image.len());
    }

    #[test]
    fn nlt_is_signalled_and_inverted() {
        let mut config = CodecConfig::new(8, 8, 8, 1);
        config.decomposition_levels = 1;
        config.nlt = Some(NltDefinition::Logarithmic {
            base: LogBase::Natural,
        });
        let image = gradient(8, 8, 8);
        let bytes = encode_tile(&[image.clone()], &config).unwrap();
        let decoded = decode_tile(&bytes).unwrap();
        for (&a, &b) in image.iter().zip(decoded.components[0].iter()) {
            assert!((a - b).abs() <= 1, "{a} vs {b}");
        }

        let err = TileDecoder::new()
            .with_nlt_support(false)
            .decode(&bytes)
            .unwrap_err();
        assert_eq!(
            err,
            CodecError::UnsupportedFeature {
                reason: FeatureReason::NltDisabled
            }
        );
    }

    #[test]
    fn htj2k_declaration_emits_cap_and_cpf() {
        let mut config = CodecConfig::new(8, 8, 8, 1);
        config.decomposition_levels = 1;
        config.declare_htj2k = true;
        let bytes = encode_tile(&[vec![1i32; 64]], &config).unwrap();
        let parsed = CodestreamParser::new(&bytes).parse().unwrap();
        assert!(parsed.header.siz.declares_htj2k());
        assert!(parsed.header.cap.unwrap().signals_htj2k());
        assert!(parsed.header.cpf.unwrap().signals_ht_profile());
        // And it still decodes.
        assert!(decode_tile(&bytes).is_ok());
    }

    #[test]
    fn comments_travel_in_the_header() {
        let mut config = CodecConfig::new(8, 8, 8, 1);
        config.decomposition_levels = 1;
        config.comment = Some("acme scanner v3".to_string());
        let bytes = encode_tile(&[vec![0i32; 64]], &config).unwrap();
        let parsed = CodestreamParser::new(&bytes).parse().unwrap();
        assert_eq!(parsed.header.comments, vec![b"acme scanner v3".to_vec()]);
    }

    #[test]
    fn mismatched_inputs_are_rejected() {
        let mut config = CodecConfig::new(8, 8, 8, 2);
        config.decomposition_levels = 1;
        let one_component = [vec![0i32; 64]];
        assert!(matches!(
            encode_tile(&one_component, &config).unwrap_err(),
            CodecError::InvalidParameter {
                reason: ParameterReason::ComponentCountMismatch(1)
            }
        ));

        let wrong_size = [vec![0i32; 64], vec![0i32; 63]];
        assert!(matches!(
            encode_tile(&wrong_size, &config).unwrap_err(),
            CodecError::InvalidParameter {
                reason: ParameterReason::SampleCountMismatch
            }
        ));
    }

    #[test]
    fn cancellation_stops_the_encode() {
        let mut config = CodecConfig::new(8, 8, 8, 1);
        config.decomposition_levels = 1;
        let token = CancelToken::new();
        token.cancel();
        let encoder = TileEncoder::new(config).unwrap().with_cancel_token(token);
        assert_eq!(
            encoder.encode(&[vec![0i32; 64]]).unwrap_err(),
            CodecError::Cancelled
        );
    }

    #[test]
    fn truncated_payload_is_detected() {
        let mut config = CodecConfig::new(8, 8, 8, 1);
        config.decomposition_levels = 1;
        let bytes = encode_tile(&[gradient(8, 8, 8)], &config).unwrap();
        // Chop out half the tile payload but keep SOT/EOC intact.
        let sod = bytes.windows(2).position(|w| w == [0xFF, 0x93]).unwrap() + 2;
        let mut truncated = bytes[..sod + 16].to_vec();
        truncated.extend_from_slice(&[0xFF, 0xD9]);
        assert!(decode_tile(&truncated).is_err());
    }
}
