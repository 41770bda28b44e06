//! Codec configuration.
//!
//! One immutable value describes an encode; it is validated once, up
//! front, and never mutated by the pipeline. Defaults follow the Part 1
//! baseline: 5/3 reversible filter, five decomposition levels, symmetric
//! boundary extension, no quantization, no component or point transforms.

use crate::dwt::WaveletFilter;
use crate::dwt2d::level_sizes;
use crate::error::{CodecError, ParameterReason};
use crate::extension::BoundaryExtension;
use crate::nlt::NltDefinition;
use crate::quantization::TrellisConfig;

/// Quantizer selection for the irreversible path.
#[derive(Debug, Clone, PartialEq)]
pub enum QuantizerKind {
    /// No explicit quantization; irreversible coefficients are rounded at
    /// unit step.
    None,
    /// Dead-zone scalar quantization with this base step.
    DeadZone { base_step: f64 },
    /// Trellis-coded quantization.
    Trellis(TrellisConfig),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CodecConfig {
    pub width: usize,
    pub height: usize,
    pub bit_depth: u8,
    pub signed: bool,
    pub component_count: usize,
    pub filter: WaveletFilter,
    pub decomposition_levels: u8,
    /// Apply the fixed color transform (RCT with 5/3, ICT with 9/7) to the
    /// first three components. Ignored for fewer than three components.
    pub use_mct: bool,
    pub quantizer: QuantizerKind,
    /// Extension mode for the standalone transform entry points. The tile
    /// pipeline itself always extends symmetrically, the Part 1 default,
    /// since the mode is not signalled in the codestream.
    pub boundary: BoundaryExtension,
    /// Optional point transform applied between the color transform and
    /// the wavelet stage, signalled in the codestream.
    pub nlt: Option<NltDefinition>,
    /// Declare Part 15 capability (emits CAP and CPF).
    pub declare_htj2k: bool,
    /// Optional comment embedded as a COM segment.
    pub comment: Option<String>,
}

impl CodecConfig {
    pub fn new(width: usize, height: usize, bit_depth: u8, component_count: usize) -> Self {
        Self {
            width,
            height,
            bit_depth,
            signed: false,
            component_count,
            filter: WaveletFilter::Reversible53,
            decomposition_levels: 5,
            use_mct: false,
            quantizer: QuantizerKind::None,
            boundary: BoundaryExtension::Symmetric,
            nlt: None,
            declare_htj2k: false,
            comment: None,
        }
    }

    pub fn validate(&self) -> Result<(), CodecError> {
        if self.width == 0 || self.height == 0 {
            return Err(CodecError::parameter(ParameterReason::ZeroDimension));
        }
        if self.bit_depth == 0 || self.bit_depth > 16 {
            return Err(CodecError::parameter(ParameterReason::BitDepthOutOfRange(
                self.bit_depth,
            )));
        }
        if self.component_count == 0 {
            return Err(CodecError::parameter(
                ParameterReason::ComponentCountMismatch(0),
            ));
        }
        if matches!(self.filter, WaveletFilter::Arbitrary(_)) {
            return Err(CodecError::parameter(ParameterReason::FilterNotSignallable));
        }
        if self.decomposition_levels > 0 {
            level_sizes(self.width, self.height, self.decomposition_levels)?;
        }
        match &self.quantizer {
            QuantizerKind::None => {}
            QuantizerKind::DeadZone { base_step } => {
                if !(*base_step > 0.0) {
                    return Err(CodecError::parameter(ParameterReason::StepSizeNotPositive));
                }
            }
            QuantizerKind::Trellis(trellis) => trellis.validate()?,
        }
        if let Some(nlt) = &self.nlt {
            // The decoder must undo the transform, so require invertibility.
            nlt.validate_invertible()?;
        }
        Ok(())
    }
}
