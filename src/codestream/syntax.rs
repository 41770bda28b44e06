//! Marker segment structures.
//!
//! These carry the parsed or to-be-emitted parameters of each segment; the
//! byte layouts live in the parser and emitter.

use crate::nlt::NltDefinition;

/// Pcap bit 17: the codestream uses Part 15 (HTJ2K) coding.
pub const PCAP_HTJ2K_BIT: u32 = 0x0002_0000;
/// Pcpf bit 15: HT profile.
pub const PCPF_HT_PROFILE_BIT: u16 = 0x8000;
/// Rsiz capability bit declaring Part 15 extensions.
pub const RSIZ_HTJ2K_BIT: u16 = 0x4000;

/// COD transformation byte for the irreversible 9/7 filter.
pub const TRANSFORM_IRREVERSIBLE_9_7: u8 = 0;
/// COD transformation byte for the reversible 5/3 filter.
pub const TRANSFORM_REVERSIBLE_5_3: u8 = 1;

/// Highest valid progression order (LRCP..CPRL = 0..4).
pub const MAX_PROGRESSION_ORDER: u8 = 4;

/// Per-component precision and subsampling, from SIZ.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentSignature {
    pub bit_depth: u8,
    pub signed: bool,
    pub sub_x: u8,
    pub sub_y: u8,
}

impl ComponentSignature {
    /// The Ssiz byte: precision minus one in the low bits, sign in bit 7.
    pub fn ssiz_byte(&self) -> u8 {
        let precision = self.bit_depth - 1;
        if self.signed {
            precision | 0x80
        } else {
            precision
        }
    }

    pub fn from_ssiz(ssiz: u8, sub_x: u8, sub_y: u8) -> Self {
        Self {
            bit_depth: (ssiz & 0x7F) + 1,
            signed: ssiz & 0x80 != 0,
            sub_x,
            sub_y,
        }
    }
}

/// Image and tile size (SIZ).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizSegment {
    pub rsiz: u16,
    pub width: u32,
    pub height: u32,
    pub x_origin: u32,
    pub y_origin: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub tile_x_origin: u32,
    pub tile_y_origin: u32,
    pub components: Vec<ComponentSignature>,
}

impl SizSegment {
    /// Lsiz: 38 fixed bytes plus three per component.
    pub fn segment_length(&self) -> u16 {
        38 + 3 * self.components.len() as u16
    }

    pub fn declares_htj2k(&self) -> bool {
        self.rsiz & RSIZ_HTJ2K_BIT != 0
    }
}

/// Coding style default (COD).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodSegment {
    pub coding_style: u8,
    pub progression_order: u8,
    pub layer_count: u16,
    pub mct: u8,
    pub decomposition_levels: u8,
    pub codeblock_width_exp: u8,
    pub codeblock_height_exp: u8,
    pub codeblock_style: u8,
    pub transformation: u8,
    pub precinct_sizes: Vec<u8>,
}

/// Coding style component override (COC).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CocSegment {
    pub component: u16,
    pub coding_style: u8,
    pub decomposition_levels: u8,
    pub codeblock_width_exp: u8,
    pub codeblock_height_exp: u8,
    pub codeblock_style: u8,
    pub transformation: u8,
    pub precinct_sizes: Vec<u8>,
}

/// Quantization style from the low five bits of Sqcd.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantizationStyle {
    /// Reversible path; per-subband exponents only.
    NoQuantization,
    /// One step size, derived for the other subbands.
    ScalarDerived,
    /// One (ε, μ) step size per subband.
    ScalarExpounded,
}

impl QuantizationStyle {
    pub fn style_bits(self) -> u8 {
        match self {
            Self::NoQuantization => 0,
            Self::ScalarDerived => 1,
            Self::ScalarExpounded => 2,
        }
    }

    pub fn from_style_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(Self::NoQuantization),
            1 => Some(Self::ScalarDerived),
            2 => Some(Self::ScalarExpounded),
            _ => None,
        }
    }

    /// Bytes per SPqcd entry.
    pub fn entry_size(self) -> usize {
        match self {
            Self::NoQuantization => 1,
            Self::ScalarDerived | Self::ScalarExpounded => 2,
        }
    }
}

/// Quantization default (QCD).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QcdSegment {
    pub guard_bits: u8,
    pub style: QuantizationStyle,
    /// Per-subband values: exponent bytes (`ε << 3`) widened to 16 bits for
    /// the reversible style, or packed (ε, μ) words otherwise.
    pub step_sizes: Vec<u16>,
}

impl QcdSegment {
    pub fn sqcd_byte(&self) -> u8 {
        (self.guard_bits << 5) | self.style.style_bits()
    }
}

/// Extended capability (CAP).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapSegment {
    pub pcap: u32,
    pub ccap: Vec<u16>,
}

impl CapSegment {
    pub fn signals_htj2k(&self) -> bool {
        self.pcap & PCAP_HTJ2K_BIT != 0
    }
}

/// Corresponding profile (CPF).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpfSegment {
    pub pcpf: u16,
}

impl CpfSegment {
    pub fn signals_ht_profile(&self) -> bool {
        self.pcpf & PCPF_HT_PROFILE_BIT != 0
    }
}

/// Start of tile-part (SOT).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SotSegment {
    pub tile_index: u16,
    /// Psot: total tile-part length from the first byte of the SOT marker;
    /// zero means "extends to the next SOT or EOC".
    pub tile_part_length: u32,
    pub tile_part_index: u8,
    pub tile_part_count: u8,
}

/// Non-linearity point transform (Part 2 NLT).
#[derive(Debug, Clone, PartialEq)]
pub struct NltSegment {
    /// Component the transform applies to; 0xFFFF means all components.
    pub component: u16,
    pub definition: NltDefinition,
}

pub const NLT_ALL_COMPONENTS: u16 = 0xFFFF;

/// Everything the main header declares before the first tile-part.
#[derive(Debug, Clone, PartialEq)]
pub struct MainHeader {
    pub siz: SizSegment,
    pub cod: CodSegment,
    pub qcd: QcdSegment,
    pub cap: Option<CapSegment>,
    pub cpf: Option<CpfSegment>,
    pub coc: Vec<CocSegment>,
    pub nlt: Vec<NltSegment>,
    pub comments: Vec<Vec<u8>>,
}
