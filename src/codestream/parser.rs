//! Strict codestream parser.
//!
//! Transforms raw marker segments into structured metadata, enforcing the
//! Part 1 ordering contract as it goes: SOC at byte 0, SIZ immediately
//! after, SIZ/COD/QCD unique and complete before the first SOT, EOC as the
//! final two bytes. Unknown segments are skipped by their declared length.
//! Every error carries the byte offset where the violation was detected.

use std::convert::TryFrom;
use std::ops::Range;

use super::reader::CodestreamReader;
use super::syntax::{
    CapSegment, CocSegment, CodSegment, ComponentSignature, CpfSegment, MainHeader, NltSegment,
    QcdSegment, QuantizationStyle, SizSegment, SotSegment, MAX_PROGRESSION_ORDER,
};
use crate::error::{CodecError, FeatureReason, ParameterReason, ViolationKind};
use crate::marker::{MarkerCode, MARKER_PREFIX};
use crate::nlt::{LogBase, LutMode, NltDefinition};

// Tnlt type bytes for the NLT segment payload.
const NLT_TYPE_GAMMA: u8 = 1;
const NLT_TYPE_LOG_NATURAL: u8 = 2;
const NLT_TYPE_LOG_BASE10: u8 = 3;
const NLT_TYPE_LUT_NEAREST: u8 = 4;
const NLT_TYPE_LUT_LINEAR: u8 = 5;
const NLT_TYPE_PQ: u8 = 6;
const NLT_TYPE_HLG: u8 = 7;

pub(crate) fn nlt_type_byte(definition: &NltDefinition) -> u8 {
    match definition {
        NltDefinition::Gamma { .. } => NLT_TYPE_GAMMA,
        NltDefinition::Logarithmic {
            base: LogBase::Natural,
        } => NLT_TYPE_LOG_NATURAL,
        NltDefinition::Logarithmic {
            base: LogBase::Base10,
        } => NLT_TYPE_LOG_BASE10,
        NltDefinition::Lut {
            mode: LutMode::Nearest,
            ..
        } => NLT_TYPE_LUT_NEAREST,
        NltDefinition::Lut {
            mode: LutMode::Linear,
            ..
        } => NLT_TYPE_LUT_LINEAR,
        NltDefinition::Pq => NLT_TYPE_PQ,
        NltDefinition::Hlg => NLT_TYPE_HLG,
    }
}

/// One tile-part: its SOT parameters and the byte extent of its bitstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TilePart {
    pub sot: SotSegment,
    pub payload: Range<usize>,
}

/// A fully parsed codestream.
#[derive(Debug, Clone, PartialEq)]
pub struct Codestream {
    pub header: MainHeader,
    pub tile_parts: Vec<TilePart>,
}

pub struct CodestreamParser<'a> {
    reader: CodestreamReader<'a>,
}

impl<'a> CodestreamParser<'a> {
    pub fn new(source: &'a [u8]) -> Self {
        Self {
            reader: CodestreamReader::new(source),
        }
    }

    /// Parse the complete codestream: main header, every tile-part, EOC.
    pub fn parse(mut self) -> Result<Codestream, CodecError> {
        let total = self.reader.source_len();
        if self.reader.peek_u16() != Some(MarkerCode::StartOfCodestream.code()) {
            return Err(CodecError::codestream(0, ViolationKind::SocMissing));
        }
        if total < 4 || !self.ends_with_eoc() {
            return Err(CodecError::codestream(
                total.saturating_sub(2),
                ViolationKind::EocMissing,
            ));
        }

        let header = self.parse_main_header()?;
        let mut tile_parts = Vec::new();
        let mut sot_position = self.reader.position() - 2;
        loop {
            let tile_part = self.parse_tile_part(sot_position)?;
            let payload_end = tile_part.payload.end;
            log::debug!(
                "tile-part {}: payload {} bytes",
                tile_part.sot.tile_index,
                tile_part.payload.len()
            );
            tile_parts.push(tile_part);

            self.reader.seek(payload_end)?;
            let marker_position = self.reader.position();
            let prefix = self.reader.read_u8()?;
            if prefix != MARKER_PREFIX {
                return Err(CodecError::codestream(
                    marker_position,
                    ViolationKind::MarkerPrefixMissing,
                ));
            }
            let code = self.reader.read_u8()?;
            match MarkerCode::try_from(code) {
                Ok(MarkerCode::StartOfTile) => {
                    sot_position = marker_position;
                }
                Ok(MarkerCode::EndOfCodestream) => {
                    if self.reader.position() != total {
                        return Err(CodecError::codestream(
                            self.reader.position(),
                            ViolationKind::EocMissing,
                        ));
                    }
                    break;
                }
                _ => {
                    return Err(CodecError::codestream(
                        marker_position,
                        ViolationKind::UnexpectedMarker(0xFF00 | code as u16),
                    ));
                }
            }
        }
        Ok(Codestream { header, tile_parts })
    }

    fn ends_with_eoc(&self) -> bool {
        self.reader.tail_u16() == Some(MarkerCode::EndOfCodestream.code())
    }

    /// Parse through the main header, consuming the first SOT marker.
    pub fn parse_main_header(&mut self) -> Result<MainHeader, CodecError> {
        if self.reader.peek_u16() != Some(MarkerCode::StartOfCodestream.code()) {
            return Err(CodecError::codestream(0, ViolationKind::SocMissing));
        }
        self.reader.advance(2)?;

        let siz_position = self.reader.position();
        if self.reader.peek_u16() != Some(MarkerCode::ImageAndTileSize.code()) {
            return Err(CodecError::codestream(
                siz_position,
                ViolationKind::SizMissing,
            ));
        }
        self.reader.advance(2)?;
        let siz = self.parse_siz()?;

        let mut cod: Option<CodSegment> = None;
        let mut qcd: Option<QcdSegment> = None;
        let mut cap: Option<CapSegment> = None;
        let mut cpf: Option<CpfSegment> = None;
        let mut coc: Vec<CocSegment> = Vec::new();
        let mut nlt: Vec<NltSegment> = Vec::new();
        let mut comments: Vec<Vec<u8>> = Vec::new();

        let sot_position = loop {
            let marker_position = self.reader.position();
            let prefix = self.reader.read_u8()?;
            if prefix != MARKER_PREFIX {
                return Err(CodecError::codestream(
                    marker_position,
                    ViolationKind::MarkerPrefixMissing,
                ));
            }
            let code_byte = self.reader.read_u8()?;
            let code = 0xFF00 | code_byte as u16;
            let duplicate = CodecError::codestream(marker_position, ViolationKind::DuplicateMarker(code));
            match MarkerCode::try_from(code_byte) {
                Ok(MarkerCode::StartOfTile) => break marker_position,
                Ok(MarkerCode::ImageAndTileSize) => return Err(duplicate),
                Ok(MarkerCode::CodingStyleDefault) => {
                    if cod.is_some() {
                        return Err(duplicate);
                    }
                    cod = Some(self.parse_cod()?);
                }
                Ok(MarkerCode::QuantizationDefault) => {
                    if qcd.is_some() {
                        return Err(duplicate);
                    }
                    qcd = Some(self.parse_qcd()?);
                }
                Ok(MarkerCode::Capability) => {
                    if cap.is_some() {
                        return Err(duplicate);
                    }
                    cap = Some(self.parse_cap()?);
                }
                Ok(MarkerCode::CorrespondingProfile) => {
                    if cpf.is_some() {
                        return Err(duplicate);
                    }
                    cpf = Some(self.parse_cpf()?);
                }
                Ok(MarkerCode::CodingStyleComponent) => {
                    coc.push(self.parse_coc(siz.components.len())?);
                }
                Ok(MarkerCode::NonLinearity) => nlt.push(self.parse_nlt()?),
                Ok(MarkerCode::Comment) => comments.push(self.parse_com()?),
                Ok(MarkerCode::StartOfCodestream)
                | Ok(MarkerCode::StartOfData)
                | Ok(MarkerCode::EndOfCodestream) => {
                    return Err(CodecError::codestream(
                        marker_position,
                        ViolationKind::UnexpectedMarker(code),
                    ));
                }
                Ok(_) | Err(_) => self.skip_segment(code, marker_position)?,
            }
        };

        let cod = cod.ok_or(CodecError::codestream(
            sot_position,
            ViolationKind::RequiredMarkerMissing(MarkerCode::CodingStyleDefault.code()),
        ))?;
        let qcd = qcd.ok_or(CodecError::codestream(
            sot_position,
            ViolationKind::RequiredMarkerMissing(MarkerCode::QuantizationDefault.code()),
        ))?;

        if siz.declares_htj2k() {
            match &cap {
                None => {
                    return Err(CodecError::codestream(sot_position, ViolationKind::CapMissing))
                }
                Some(cap) if !cap.signals_htj2k() => {
                    return Err(CodecError::codestream(
                        sot_position,
                        ViolationKind::CapHtBitClear,
                    ))
                }
                Some(_) => {}
            }
            if let Some(cpf) = &cpf {
                if !cpf.signals_ht_profile() {
                    return Err(CodecError::codestream(
                        sot_position,
                        ViolationKind::CpfProfileBitClear,
                    ));
                }
            }
        }

        Ok(MainHeader {
            siz,
            cod,
            qcd,
            cap,
            cpf,
            coc,
            nlt,
            comments,
        })
    }

    fn skip_segment(&mut self, code: u16, marker_position: usize) -> Result<(), CodecError> {
        let length_position = self.reader.position();
        let length = self.reader.read_u16()?;
        if length < 2 {
            return Err(CodecError::codestream(
                length_position,
                ViolationKind::MalformedSegmentLength,
            ));
        }
        self.reader.advance(length as usize - 2)?;
        log::trace!("skipped segment {code:#06x} ({length} bytes) at {marker_position}");
        Ok(())
    }

    fn parse_siz(&mut self) -> Result<SizSegment, CodecError> {
        let length_position = self.reader.position();
        let length = self.reader.read_u16()?;
        if length < 41 {
            return Err(CodecError::codestream(
                length_position,
                ViolationKind::MalformedSegmentLength,
            ));
        }
        let rsiz = self.reader.read_u16()?;
        let width = self.reader.read_u32()?;
        let height = self.reader.read_u32()?;
        let x_origin = self.reader.read_u32()?;
        let y_origin = self.reader.read_u32()?;
        let tile_width = self.reader.read_u32()?;
        let tile_height = self.reader.read_u32()?;
        let tile_x_origin = self.reader.read_u32()?;
        let tile_y_origin = self.reader.read_u32()?;
        if width == 0 || height == 0 || tile_width == 0 || tile_height == 0 {
            return Err(CodecError::parameter(ParameterReason::ZeroDimension));
        }
        let component_count_position = self.reader.position();
        let component_count = self.reader.read_u16()?;
        if component_count == 0 {
            return Err(CodecError::codestream(
                component_count_position,
                ViolationKind::NoComponents,
            ));
        }
        if length != 38 + 3 * component_count {
            return Err(CodecError::codestream(
                length_position,
                ViolationKind::MalformedSegmentLength,
            ));
        }
        let mut components = Vec::with_capacity(component_count as usize);
        for _ in 0..component_count {
            let ssiz = self.reader.read_u8()?;
            let sub_x = self.reader.read_u8()?;
            let sub_y = self.reader.read_u8()?;
            let signature = ComponentSignature::from_ssiz(ssiz, sub_x, sub_y);
            if signature.bit_depth > 16 {
                return Err(CodecError::parameter(ParameterReason::BitDepthOutOfRange(
                    signature.bit_depth,
                )));
            }
            components.push(signature);
        }
        Ok(SizSegment {
            rsiz,
            width,
            height,
            x_origin,
            y_origin,
            tile_width,
            tile_height,
            tile_x_origin,
            tile_y_origin,
            components,
        })
    }

    fn parse_cod(&mut self) -> Result<CodSegment, CodecError> {
        let length_position = self.reader.position();
        let length = self.reader.read_u16()?;
        if length < 12 {
            return Err(CodecError::codestream(
                length_position,
                ViolationKind::MalformedSegmentLength,
            ));
        }
        let coding_style = self.reader.read_u8()?;
        let progression_order = self.reader.read_u8()?;
        if progression_order > MAX_PROGRESSION_ORDER {
            return Err(CodecError::parameter(
                ParameterReason::ProgressionOrderOutOfRange(progression_order),
            ));
        }
        let layer_count = self.reader.read_u16()?;
        let mct = self.reader.read_u8()?;
        let decomposition_levels = self.reader.read_u8()?;
        let codeblock_width_exp = self.reader.read_u8()?;
        let codeblock_height_exp = self.reader.read_u8()?;
        let codeblock_style = self.reader.read_u8()?;
        let transformation = self.reader.read_u8()?;

        let mut precinct_sizes = Vec::new();
        if coding_style & 0x01 != 0 {
            for _ in 0..=decomposition_levels {
                precinct_sizes.push(self.reader.read_u8()?);
            }
        }
        let consumed = 12 + precinct_sizes.len();
        if (length as usize) < consumed {
            return Err(CodecError::codestream(
                length_position,
                ViolationKind::MalformedSegmentLength,
            ));
        }
        self.reader.advance(length as usize - consumed)?;
        Ok(CodSegment {
            coding_style,
            progression_order,
            layer_count,
            mct,
            decomposition_levels,
            codeblock_width_exp,
            codeblock_height_exp,
            codeblock_style,
            transformation,
            precinct_sizes,
        })
    }

    fn parse_qcd(&mut self) -> Result<QcdSegment, CodecError> {
        let length_position = self.reader.position();
        let length = self.reader.read_u16()?;
        if length < 4 {
            return Err(CodecError::codestream(
                length_position,
                ViolationKind::MalformedSegmentLength,
            ));
        }
        let sqcd = self.reader.read_u8()?;
        let guard_bits = sqcd >> 5;
        let style = QuantizationStyle::from_style_bits(sqcd & 0x1F)
            .ok_or(CodecError::unsupported(FeatureReason::QuantizationStyle(sqcd)))?;
        let payload = length as usize - 3;
        let entry = style.entry_size();
        if payload % entry != 0 {
            return Err(CodecError::codestream(
                length_position,
                ViolationKind::MalformedSegmentLength,
            ));
        }
        let mut step_sizes = Vec::with_capacity(payload / entry);
        for _ in 0..payload / entry {
            let value = match style {
                QuantizationStyle::NoQuantization => self.reader.read_u8()? as u16,
                _ => self.reader.read_u16()?,
            };
            step_sizes.push(value);
        }
        Ok(QcdSegment {
            guard_bits,
            style,
            step_sizes,
        })
    }

    fn parse_cap(&mut self) -> Result<CapSegment, CodecError> {
        let length_position = self.reader.position();
        let length = self.reader.read_u16()?;
        if length < 8 || (length - 6) % 2 != 0 {
            return Err(CodecError::codestream(
                length_position,
                ViolationKind::MalformedSegmentLength,
            ));
        }
        let pcap = self.reader.read_u32()?;
        let mut ccap = Vec::with_capacity((length as usize - 6) / 2);
        for _ in 0..(length - 6) / 2 {
            ccap.push(self.reader.read_u16()?);
        }
        Ok(CapSegment { pcap, ccap })
    }

    fn parse_cpf(&mut self) -> Result<CpfSegment, CodecError> {
        let length_position = self.reader.position();
        let length = self.reader.read_u16()?;
        if length < 4 {
            return Err(CodecError::codestream(
                length_position,
                ViolationKind::MalformedSegmentLength,
            ));
        }
        let pcpf = self.reader.read_u16()?;
        self.reader.advance(length as usize - 4)?;
        Ok(CpfSegment { pcpf })
    }

    fn parse_coc(&mut self, component_count: usize) -> Result<CocSegment, CodecError> {
        let length_position = self.reader.position();
        let length = self.reader.read_u16()?;
        if length < 9 {
            return Err(CodecError::codestream(
                length_position,
                ViolationKind::MalformedSegmentLength,
            ));
        }
        // Ccoc is one byte for up to 256 components, two beyond.
        let (component, component_bytes) = if component_count < 257 {
            (self.reader.read_u8()? as u16, 1)
        } else {
            (self.reader.read_u16()?, 2)
        };
        let coding_style = self.reader.read_u8()?;
        let decomposition_levels = self.reader.read_u8()?;
        let codeblock_width_exp = self.reader.read_u8()?;
        let codeblock_height_exp = self.reader.read_u8()?;
        let codeblock_style = self.reader.read_u8()?;
        let transformation = self.reader.read_u8()?;
        let mut precinct_sizes = Vec::new();
        if coding_style & 0x01 != 0 {
            for _ in 0..=decomposition_levels {
                precinct_sizes.push(self.reader.read_u8()?);
            }
        }
        let consumed = 2 + component_bytes + 7 + precinct_sizes.len();
        if (length as usize) < consumed {
            return Err(CodecError::codestream(
                length_position,
                ViolationKind::MalformedSegmentLength,
            ));
        }
        self.reader.advance(length as usize - consumed)?;
        Ok(CocSegment {
            component,
            coding_style,
            decomposition_levels,
            codeblock_width_exp,
            codeblock_height_exp,
            codeblock_style,
            transformation,
            precinct_sizes,
        })
    }

    fn parse_com(&mut self) -> Result<Vec<u8>, CodecError> {
        let length_position = self.reader.position();
        let length = self.reader.read_u16()?;
        if length < 4 {
            return Err(CodecError::codestream(
                length_position,
                ViolationKind::MalformedSegmentLength,
            ));
        }
        let _registration = self.reader.read_u16()?;
        Ok(self.reader.read_bytes(length as usize - 4)?.to_vec())
    }

    fn parse_nlt(&mut self) -> Result<NltSegment, CodecError> {
        let length_position = self.reader.position();
        let length = self.reader.read_u16()?;
        if length < 5 {
            return Err(CodecError::codestream(
                length_position,
                ViolationKind::MalformedSegmentLength,
            ));
        }
        let component = self.reader.read_u16()?;
        let nlt_type = self.reader.read_u8()?;
        let definition = match nlt_type {
            NLT_TYPE_GAMMA => {
                let gamma = self.reader.read_f64()?;
                if !(gamma > 0.0) {
                    return Err(CodecError::parameter(ParameterReason::GammaNotPositive));
                }
                NltDefinition::Gamma { gamma }
            }
            NLT_TYPE_LOG_NATURAL => NltDefinition::Logarithmic {
                base: LogBase::Natural,
            },
            NLT_TYPE_LOG_BASE10 => NltDefinition::Logarithmic {
                base: LogBase::Base10,
            },
            NLT_TYPE_LUT_NEAREST | NLT_TYPE_LUT_LINEAR => {
                let entry_count = self.reader.read_u16()? as usize;
                if length as usize != 7 + 8 * entry_count {
                    return Err(CodecError::codestream(
                        length_position,
                        ViolationKind::MalformedSegmentLength,
                    ));
                }
                let mut table = Vec::with_capacity(entry_count);
                for _ in 0..entry_count {
                    table.push(self.reader.read_f64()?);
                }
                let mode = if nlt_type == NLT_TYPE_LUT_NEAREST {
                    LutMode::Nearest
                } else {
                    LutMode::Linear
                };
                let definition = NltDefinition::Lut { table, mode };
                definition.validate()?;
                definition
            }
            NLT_TYPE_PQ => NltDefinition::Pq,
            NLT_TYPE_HLG => NltDefinition::Hlg,
            other => {
                return Err(CodecError::unsupported(FeatureReason::UnknownNltType(other)))
            }
        };
        Ok(NltSegment {
            component,
            definition,
        })
    }

    /// Parse one tile-part after its SOT marker code has been consumed.
    /// `sot_position` is the offset of the 0xFF90 marker, the origin of the
    /// Psot length.
    fn parse_tile_part(&mut self, sot_position: usize) -> Result<TilePart, CodecError> {
        let length_position = self.reader.position();
        let lsot = self.reader.read_u16()?;
        if lsot != 10 {
            return Err(CodecError::codestream(
                length_position,
                ViolationKind::MalformedSegmentLength,
            ));
        }
        let tile_index = self.reader.read_u16()?;
        let tile_part_length = self.reader.read_u32()?;
        let tile_part_index = self.reader.read_u8()?;
        let tile_part_count = self.reader.read_u8()?;

        // Tile-part header segments, up to SOD. Overrides are skipped, not
        // applied; the core encodes everything in the main header.
        loop {
            let marker_position = self.reader.position();
            let prefix = self.reader.read_u8()?;
            if prefix != MARKER_PREFIX {
                return Err(CodecError::codestream(
                    marker_position,
                    ViolationKind::MarkerPrefixMissing,
                ));
            }
            let code_byte = self.reader.read_u8()?;
            if code_byte == u8::from(MarkerCode::StartOfData) {
                break;
            }
            self.skip_segment(0xFF00 | code_byte as u16, marker_position)?;
        }

        let data_start = self.reader.position();
        let data_end = if tile_part_length == 0 {
            // Open-ended tile-part: runs to the EOC at the end of the stream.
            self.reader.source_len() - 2
        } else {
            sot_position + tile_part_length as usize
        };
        if data_end < data_start || data_end > self.reader.source_len() {
            return Err(CodecError::codestream(
                sot_position,
                ViolationKind::SegmentTruncated,
            ));
        }
        Ok(TilePart {
            sot: SotSegment {
                tile_index,
                tile_part_length,
                tile_part_index,
                tile_part_count,
            },
            payload: data_start..data_end,
        })
    }
}
