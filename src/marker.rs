//! JPEG 2000 codestream marker codes.
//!
//! A marker is the byte `0xFF` followed by one code byte. Delimiting markers
//! (SOC, SOD, EOC) stand alone; every other marker introduces a segment whose
//! next two bytes give the segment length, inclusive of the length field
//! itself.

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Every marker starts with this prefix byte.
pub const MARKER_PREFIX: u8 = 0xFF;

/// Codestream marker codes defined by ISO/IEC 15444-1 (Part 1) and
/// ISO/IEC 15444-15 (HTJ2K), plus the Part 2 NLT extension segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum MarkerCode {
    /// SOC: start of codestream.
    StartOfCodestream = 0x4F,
    /// CAP: extended capability (Part 15 signalling lives in Pcap).
    Capability = 0x50,
    /// SIZ: image and tile size.
    ImageAndTileSize = 0x51,
    /// COD: coding style default.
    CodingStyleDefault = 0x52,
    /// COC: coding style component override.
    CodingStyleComponent = 0x53,
    /// CPF: corresponding profile (Part 15).
    CorrespondingProfile = 0x59,
    /// QCD: quantization default.
    QuantizationDefault = 0x5C,
    /// QCC: quantization component override.
    QuantizationComponent = 0x5D,
    /// RGN: region of interest.
    RegionOfInterest = 0x5E,
    /// COM: comment.
    Comment = 0x64,
    /// NLT: non-linearity point transformation (Part 2).
    NonLinearity = 0x76,
    /// SOT: start of tile-part.
    StartOfTile = 0x90,
    /// SOD: start of data, introduces the tile bitstream.
    StartOfData = 0x93,
    /// EOC: end of codestream.
    EndOfCodestream = 0xD9,
}

impl MarkerCode {
    /// Delimiting markers carry no length field or payload.
    pub fn is_standalone(self) -> bool {
        matches!(
            self,
            Self::StartOfCodestream | Self::StartOfData | Self::EndOfCodestream
        )
    }

    /// The full two-byte code as written to the stream.
    pub fn code(self) -> u16 {
        0xFF00 | u8::from(self) as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::TryFrom;

    #[test]
    fn codes_match_the_standard() {
        assert_eq!(MarkerCode::StartOfCodestream.code(), 0xFF4F);
        assert_eq!(MarkerCode::ImageAndTileSize.code(), 0xFF51);
        assert_eq!(MarkerCode::CodingStyleDefault.code(), 0xFF52);
        assert_eq!(MarkerCode::QuantizationDefault.code(), 0xFF5C);
        assert_eq!(MarkerCode::Capability.code(), 0xFF50);
        assert_eq!(MarkerCode::CorrespondingProfile.code(), 0xFF59);
        assert_eq!(MarkerCode::StartOfTile.code(), 0xFF90);
        assert_eq!(MarkerCode::StartOfData.code(), 0xFF93);
        assert_eq!(MarkerCode::EndOfCodestream.code(), 0xFFD9);
    }

    #[test]
    fn standalone_classification() {
        assert!(MarkerCode::StartOfCodestream.is_standalone());
        assert!(MarkerCode::StartOfData.is_standalone());
        assert!(MarkerCode::EndOfCodestream.is_standalone());
        assert!(!MarkerCode::ImageAndTileSize.is_standalone());
        assert!(!MarkerCode::StartOfTile.is_standalone());
    }

    #[test]
    fn unknown_code_is_rejected() {
        assert!(MarkerCode::try_from(0x00u8).is_err());
        assert_eq!(
            MarkerCode::try_from(0x51u8),
            Ok(MarkerCode::ImageAndTileSize)
        );
    }
}
