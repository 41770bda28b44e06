/*!
# j2kcore-rs

`j2kcore-rs` is the numerical core of a JPEG 2000 codec in pure Rust: the
signal-processing and codestream pipeline of ISO/IEC 15444-1 (Part 1) with
the capability signalling of ISO/IEC 15444-15 (HTJ2K), from raw samples to
a marker-segmented codestream and back.

## Components

- **Boundary extension** (`extension`): symmetric, periodic, and
  zero-padding extension of finite signals at filter edges.
- **DWT** (`dwt`, `dwt2d`): 5/3 reversible and 9/7 irreversible lifting,
  separable 2D driver, N-level decomposition into LL/LH/HL/HH subbands.
- **MCT** (`mct`): reversible and irreversible color transforms plus the
  generalized N×N matrix transform of Part 2.
- **NLT** (`nlt`): gamma, logarithmic, LUT, PQ (SMPTE ST 2084), and HLG
  (ITU-R BT.2100) point transforms.
- **Quantization** (`quantization`): per-subband step derivation,
  dead-zone scalar quantization, trellis-coded quantization.
- **Codestream syntax** (`marker`, `codestream`): SOC/SIZ/COD/COC/QCD/
  SOT/SOD/EOC plus the HTJ2K CAP/CPF segments; strict parser and emitter.
- **Pipeline** (`pipeline`): `encode_tile` / `decode_tile` orchestration
  with cooperative cancellation.
- **Conformance** (`validator`): accumulating marker validation, lossless
  exactness, PSNR, bit-depth range.

Tier-1/tier-2 entropy coding, file containers (JP2 boxes), and transport
are outside this core; the pipeline hands quantized subbands and step
sizes across that boundary.

## Safety

Pure safe Rust; no filesystem or environment access. All inputs and
outputs are byte buffers owned by the caller.
*/

pub mod codestream;
pub mod config;
pub mod dwt;
pub mod dwt2d;
pub mod error;
pub mod extension;
pub mod marker;
pub mod mct;
pub mod nlt;
pub mod numeric;
pub mod pipeline;
pub mod quantization;
pub mod validator;

pub use config::{CodecConfig, QuantizerKind};
pub use dwt::{ArbitraryFilter, Dwt53, Dwt97, WaveletFilter};
pub use dwt2d::{DecompositionLevel, Dwt2d, SubbandKind};
pub use error::CodecError;
pub use extension::BoundaryExtension;
pub use nlt::NltDefinition;
pub use pipeline::{decode_tile, encode_tile, CancelToken, DecodedTile, TileDecoder, TileEncoder};
pub use validator::{validate, ValidationReport};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_validate_decode_smoke() {
        let mut config = CodecConfig::new(8, 8, 8, 1);
        config.decomposition_levels = 1;
        let image: Vec<i32> = (0..64).map(|i| i * 4).collect();

        let bytes = encode_tile(&[image.clone()], &config).unwrap();
        assert!(validate(&bytes).is_compliant);

        let decoded = decode_tile(&bytes).unwrap();
        assert_eq!(decoded.components, vec![image]);
    }
}
