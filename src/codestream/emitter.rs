//! Marker segment emitter.
//!
//! Writes the main header, tile-part framing, and the HTJ2K capability
//! segments. Psot is not known until the tile bitstream has been written,
//! so [`CodestreamEmitter::write_sot`] returns the marker offset and the
//! length is backpatched afterwards.

use super::parser::nlt_type_byte;
use super::syntax::{
    CapSegment, CocSegment, CodSegment, CpfSegment, NltSegment, QcdSegment, QuantizationStyle,
    SizSegment, SotSegment,
};
use super::writer::CodestreamWriter;
use crate::marker::MarkerCode;
use crate::nlt::NltDefinition;

#[derive(Default)]
pub struct CodestreamEmitter {
    writer: CodestreamWriter,
}

impl CodestreamEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.writer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writer.is_empty()
    }

    pub fn write_soc(&mut self) {
        self.writer.write_marker(MarkerCode::StartOfCodestream);
    }

    pub fn write_eoc(&mut self) {
        self.writer.write_marker(MarkerCode::EndOfCodestream);
    }

    pub fn write_siz(&mut self, siz: &SizSegment) {
        self.writer.write_marker(MarkerCode::ImageAndTileSize);
        self.writer.write_u16(siz.segment_length());
        self.writer.write_u16(siz.rsiz);
        self.writer.write_u32(siz.width);
        self.writer.write_u32(siz.height);
        self.writer.write_u32(siz.x_origin);
        self.writer.write_u32(siz.y_origin);
        self.writer.write_u32(siz.tile_width);
        self.writer.write_u32(siz.tile_height);
        self.writer.write_u32(siz.tile_x_origin);
        self.writer.write_u32(siz.tile_y_origin);
        self.writer.write_u16(siz.components.len() as u16);
        for component in &siz.components {
            self.writer.write_u8(component.ssiz_byte());
            self.writer.write_u8(component.sub_x);
            self.writer.write_u8(component.sub_y);
        }
    }

    pub fn write_cod(&mut self, cod: &CodSegment) {
        self.writer.write_marker(MarkerCode::CodingStyleDefault);
        self.writer.write_u16(12 + cod.precinct_sizes.len() as u16);
        self.writer.write_u8(cod.coding_style);
        self.writer.write_u8(cod.progression_order);
        self.writer.write_u16(cod.layer_count);
        self.writer.write_u8(cod.mct);
        self.writer.write_u8(cod.decomposition_levels);
        self.writer.write_u8(cod.codeblock_width_exp);
        self.writer.write_u8(cod.codeblock_height_exp);
        self.writer.write_u8(cod.codeblock_style);
        self.writer.write_u8(cod.transformation);
        for &precinct in &cod.precinct_sizes {
            self.writer.write_u8(precinct);
        }
    }

    pub fn write_coc(&mut self, coc: &CocSegment, component_count: usize) {
        self.writer.write_marker(MarkerCode::CodingStyleComponent);
        let component_bytes: u16 = if component_count < 257 { 1 } else { 2 };
        self.writer
            .write_u16(9 + component_bytes + coc.precinct_sizes.len() as u16);
        if component_bytes == 1 {
            self.writer.write_u8(coc.component as u8);
        } else {
            self.writer.write_u16(coc.component);
        }
        self.writer.write_u8(coc.coding_style);
        self.writer.write_u8(coc.decomposition_levels);
        self.writer.write_u8(coc.codeblock_width_exp);
        self.writer.write_u8(coc.codeblock_height_exp);
        self.writer.write_u8(coc.codeblock_style);
        self.writer.write_u8(coc.transformation);
        for &precinct in &coc.precinct_sizes {
            self.writer.write_u8(precinct);
        }
    }

    pub fn write_qcd(&mut self, qcd: &QcdSegment) {
        self.writer.write_marker(MarkerCode::QuantizationDefault);
        let entry = qcd.style.entry_size();
        self.writer
            .write_u16((3 + entry * qcd.step_sizes.len()) as u16);
        self.writer.write_u8(qcd.sqcd_byte());
        for &step in &qcd.step_sizes {
            match qcd.style {
                QuantizationStyle::NoQuantization => self.writer.write_u8(step as u8),
                _ => self.writer.write_u16(step),
            }
        }
    }

    pub fn write_cap(&mut self, cap: &CapSegment) {
        self.writer.write_marker(MarkerCode::Capability);
        self.writer.write_u16((6 + 2 * cap.ccap.len()) as u16);
        self.writer.write_u32(cap.pcap);
        for &word in &cap.ccap {
            self.writer.write_u16(word);
        }
    }

    pub fn write_cpf(&mut self, cpf: &CpfSegment) {
        self.writer.write_marker(MarkerCode::CorrespondingProfile);
        self.writer.write_u16(4);
        self.writer.write_u16(cpf.pcpf);
    }

    pub fn write_comment(&mut self, text: &str) {
        self.writer.write_marker(MarkerCode::Comment);
        self.writer.write_u16((4 + text.len()) as u16);
        // Rcom 1: ISO 8859-15 text.
        self.writer.write_u16(1);
        self.writer.write_bytes(text.as_bytes());
    }

    pub fn write_nlt(&mut self, nlt: &NltSegment) {
        self.writer.write_marker(MarkerCode::NonLinearity);
        let params = match &nlt.definition {
            NltDefinition::Gamma { .. } => 8,
            NltDefinition::Lut { table, .. } => 2 + 8 * table.len(),
            NltDefinition::Logarithmic { .. } | NltDefinition::Pq | NltDefinition::Hlg => 0,
        };
        self.writer.write_u16((5 + params) as u16);
        self.writer.write_u16(nlt.component);
        self.writer.write_u8(nlt_type_byte(&nlt.definition));
        match &nlt.definition {
            NltDefinition::Gamma { gamma } => self.writer.write_f64(*gamma),
            NltDefinition::Lut { table, .. } => {
                self.writer.write_u16(table.len() as u16);
                for &entry in table {
                    self.writer.write_f64(entry);
                }
            }
            NltDefinition::Logarithmic { .. } | NltDefinition::Pq | NltDefinition::Hlg => {}
        }
    }

    /// Write the SOT segment and return the marker offset, the origin for
    /// the Psot backpatch.
    pub fn write_sot(&mut self, sot: &SotSegment) -> usize {
        let offset = self.writer.len();
        self.writer.write_marker(MarkerCode::StartOfTile);
        self.writer.write_u16(10);
        self.writer.write_u16(sot.tile_index);
        self.writer.write_u32(sot.tile_part_length);
        self.writer.write_u8(sot.tile_part_index);
        self.writer.write_u8(sot.tile_part_count);
        offset
    }

    pub fn write_sod(&mut self) {
        self.writer.write_marker(MarkerCode::StartOfData);
    }

    pub fn write_tile_data(&mut self, data: &[u8]) {
        self.writer.write_bytes(data);
    }

    /// Backpatch Psot once the tile-part length is known. `sot_offset` is
    /// the value returned by [`Self::write_sot`]; the length runs from the
    /// SOT marker through the end of the tile bitstream.
    pub fn patch_tile_part_length(&mut self, sot_offset: usize, length: u32) {
        self.writer.patch_u32(sot_offset + 6, length);
    }

    pub fn finish(self) -> Vec<u8> {
        self.writer.into_bytes()
    }
}
