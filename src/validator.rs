//! Conformance validation.
//!
//! Three families of checks: marker-level structure, numerical precision
//! (lossless exactness and lossy PSNR), and bit-depth range. Unlike the
//! decode path, the marker walk never early-returns: every violation it can
//! still reach is accumulated into the report, each with the byte offset
//! where it was detected.

use crate::error::{CodecError, ParameterReason, PrecisionReason, ViolationKind};
use crate::numeric::{mean_squared_error, psnr};

/// One structural violation, positioned in the byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationError {
    pub position: usize,
    pub reason: ViolationKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub is_compliant: bool,
    pub errors: Vec<ValidationError>,
}

impl ValidationReport {
    fn from_errors(errors: Vec<ValidationError>) -> Self {
        Self {
            is_compliant: errors.is_empty(),
            errors,
        }
    }
}

fn be16(bytes: &[u8], at: usize) -> Option<u16> {
    Some(u16::from_be_bytes([
        *bytes.get(at)?,
        *bytes.get(at + 1)?,
    ]))
}

fn be32(bytes: &[u8], at: usize) -> Option<u32> {
    Some(u32::from_be_bytes([
        *bytes.get(at)?,
        *bytes.get(at + 1)?,
        *bytes.get(at + 2)?,
        *bytes.get(at + 3)?,
    ]))
}

/// Walk the marker structure of a codestream and accumulate every
/// violation found.
pub fn validate(codestream: &[u8]) -> ValidationReport {
    let mut errors = Vec::new();
    let total = codestream.len();

    let soc_ok = be16(codestream, 0) == Some(0xFF4F);
    if !soc_ok {
        errors.push(ValidationError {
            position: 0,
            reason: ViolationKind::SocMissing,
        });
    }
    let eoc_ok = total >= 4 && be16(codestream, total - 2) == Some(0xFFD9);
    if !eoc_ok {
        errors.push(ValidationError {
            position: total.saturating_sub(2),
            reason: ViolationKind::EocMissing,
        });
    }

    let mut position = if soc_ok { 2 } else { 0 };
    let mut first_marker = true;
    let mut seen_siz = false;
    let mut seen_cod = false;
    let mut seen_qcd = false;
    let mut seen_sot = false;
    let mut declares_ht = false;
    let mut pcap: Option<u32> = None;
    let mut pcpf: Option<u16> = None;
    let mut ht_checked = false;

    let check_ht = |errors: &mut Vec<ValidationError>,
                        at: usize,
                        declares: bool,
                        pcap: Option<u32>,
                        pcpf: Option<u16>| {
        if !declares {
            return;
        }
        match pcap {
            None => errors.push(ValidationError {
                position: at,
                reason: ViolationKind::CapMissing,
            }),
            Some(bits) if bits & 0x0002_0000 == 0 => errors.push(ValidationError {
                position: at,
                reason: ViolationKind::CapHtBitClear,
            }),
            Some(_) => {}
        }
        if let Some(profile) = pcpf {
            if profile & 0x8000 == 0 {
                errors.push(ValidationError {
                    position: at,
                    reason: ViolationKind::CpfProfileBitClear,
                });
            }
        }
    };

    while position + 1 < total {
        if codestream[position] != 0xFF {
            errors.push(ValidationError {
                position,
                reason: ViolationKind::MarkerPrefixMissing,
            });
            break;
        }
        let marker = 0xFF00 | codestream[position + 1] as u16;

        if marker == 0xFFD9 {
            if position != total - 2 {
                errors.push(ValidationError {
                    position,
                    reason: ViolationKind::UnexpectedMarker(marker),
                });
            }
            break;
        }
        if first_marker && marker != 0xFF51 {
            errors.push(ValidationError {
                position,
                reason: ViolationKind::SizMissing,
            });
        }
        first_marker = false;

        if marker == 0xFF90 {
            seen_sot = true;
            if !ht_checked {
                if !seen_cod {
                    errors.push(ValidationError {
                        position,
                        reason: ViolationKind::RequiredMarkerMissing(0xFF52),
                    });
                }
                if !seen_qcd {
                    errors.push(ValidationError {
                        position,
                        reason: ViolationKind::RequiredMarkerMissing(0xFF5C),
                    });
                }
                check_ht(&mut errors, position, declares_ht, pcap, pcpf);
                ht_checked = true;
            }
            let Some(lsot) = be16(codestream, position + 2) else {
                errors.push(ValidationError {
                    position: position + 2,
                    reason: ViolationKind::SegmentTruncated,
                });
                break;
            };
            if lsot != 10 {
                errors.push(ValidationError {
                    position: position + 2,
                    reason: ViolationKind::MalformedSegmentLength,
                });
                break;
            }
            let Some(psot) = be32(codestream, position + 6) else {
                errors.push(ValidationError {
                    position: position + 6,
                    reason: ViolationKind::SegmentTruncated,
                });
                break;
            };
            let next = if psot == 0 {
                total.saturating_sub(2)
            } else {
                position + psot as usize
            };
            if next <= position || next > total {
                errors.push(ValidationError {
                    position,
                    reason: ViolationKind::SegmentTruncated,
                });
                break;
            }
            position = next;
            continue;
        }

        // Everything else is a length-prefixed segment.
        let Some(length) = be16(codestream, position + 2) else {
            errors.push(ValidationError {
                position: position + 2,
                reason: ViolationKind::SegmentTruncated,
            });
            break;
        };
        if length < 2 {
            errors.push(ValidationError {
                position: position + 2,
                reason: ViolationKind::MalformedSegmentLength,
            });
            break;
        }
        let segment_end = position + 2 + length as usize;
        if segment_end > total {
            errors.push(ValidationError {
                position: position + 2,
                reason: ViolationKind::SegmentTruncated,
            });
            break;
        }

        match marker {
            0xFF51 => {
                if seen_siz {
                    errors.push(ValidationError {
                        position,
                        reason: ViolationKind::DuplicateMarker(marker),
                    });
                } else {
                    seen_siz = true;
                    if length < 41 {
                        errors.push(ValidationError {
                            position: position + 2,
                            reason: ViolationKind::MalformedSegmentLength,
                        });
                    } else {
                        if let Some(rsiz) = be16(codestream, position + 4) {
                            declares_ht = rsiz & 0x4000 != 0;
                        }
                        if let Some(component_count) = be16(codestream, position + 38) {
                            if component_count == 0 {
                                errors.push(ValidationError {
                                    position: position + 38,
                                    reason: ViolationKind::NoComponents,
                                });
                            }
                            for component in 0..component_count as usize {
                                let at = position + 40 + 3 * component;
                                let Some(&ssiz) = codestream.get(at) else {
                                    break;
                                };
                                let bit_depth = (ssiz & 0x7F) + 1;
                                if bit_depth > 16 {
                                    errors.push(ValidationError {
                                        position: at,
                                        reason: ViolationKind::BitDepthOutOfRange(bit_depth),
                                    });
                                }
                            }
                        }
                    }
                }
            }
            0xFF52 => {
                if seen_cod {
                    errors.push(ValidationError {
                        position,
                        reason: ViolationKind::DuplicateMarker(marker),
                    });
                } else {
                    seen_cod = true;
                    if let Some(&progression) = codestream.get(position + 5) {
                        if progression > 4 {
                            errors.push(ValidationError {
                                position: position + 5,
                                reason: ViolationKind::ProgressionOrderOutOfRange(progression),
                            });
                        }
                    }
                }
            }
            0xFF5C => {
                if seen_qcd {
                    errors.push(ValidationError {
                        position,
                        reason: ViolationKind::DuplicateMarker(marker),
                    });
                } else {
                    seen_qcd = true;
                }
            }
            0xFF50 => pcap = be32(codestream, position + 4),
            0xFF59 => pcpf = be16(codestream, position + 4),
            _ => {}
        }
        position = segment_end;
    }

    if !ht_checked {
        check_ht(
            &mut errors,
            total.saturating_sub(2),
            declares_ht,
            pcap,
            pcpf,
        );
    }
    if !seen_sot {
        errors.push(ValidationError {
            position: total.saturating_sub(2),
            reason: ViolationKind::RequiredMarkerMissing(0xFF90),
        });
    }
    ValidationReport::from_errors(errors)
}

/// Result of a lossless round-trip comparison.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrecisionReport {
    pub max_absolute_error: f64,
    pub mean_squared_error: f64,
    pub is_exact: bool,
    pub passes_conformance: bool,
}

/// Element-wise comparison of a lossless round-trip; conformance requires
/// exact equality.
pub fn check_lossless(
    original: &[i32],
    reconstructed: &[i32],
) -> Result<PrecisionReport, CodecError> {
    if original.len() != reconstructed.len() {
        return Err(CodecError::parameter(
            ParameterReason::ComponentLengthMismatch,
        ));
    }
    let a: Vec<f64> = original.iter().map(|&v| v as f64).collect();
    let b: Vec<f64> = reconstructed.iter().map(|&v| v as f64).collect();
    let max_absolute_error = a
        .iter()
        .zip(b.iter())
        .map(|(&x, &y)| (x - y).abs())
        .fold(0.0f64, f64::max);
    let mse = mean_squared_error(&a, &b);
    let is_exact = max_absolute_error == 0.0;
    Ok(PrecisionReport {
        max_absolute_error,
        mean_squared_error: mse,
        is_exact,
        passes_conformance: is_exact,
    })
}

/// Assert a lossless round-trip, treating any divergence as the fatal
/// implementation-defect class of error.
pub fn require_lossless(original: &[i32], reconstructed: &[i32]) -> Result<(), CodecError> {
    let report = check_lossless(original, reconstructed)?;
    if !report.is_exact {
        let index = original
            .iter()
            .zip(reconstructed.iter())
            .position(|(a, b)| a != b)
            .unwrap_or(0);
        return Err(CodecError::PrecisionViolation {
            reason: PrecisionReason::RoundTripMismatch(index),
        });
    }
    Ok(())
}

/// Result of a lossy PSNR check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PsnrReport {
    pub psnr: f64,
    pub mean_squared_error: f64,
    pub passes_conformance: bool,
}

/// PSNR against the `(2^B − 1)²` peak; passes at or above `minimum_psnr`.
pub fn check_psnr(
    original: &[i32],
    reconstructed: &[i32],
    bit_depth: u8,
    minimum_psnr: f64,
) -> Result<PsnrReport, CodecError> {
    if original.len() != reconstructed.len() {
        return Err(CodecError::parameter(
            ParameterReason::ComponentLengthMismatch,
        ));
    }
    if bit_depth == 0 || bit_depth > 16 {
        return Err(CodecError::parameter(ParameterReason::BitDepthOutOfRange(
            bit_depth,
        )));
    }
    let a: Vec<f64> = original.iter().map(|&v| v as f64).collect();
    let b: Vec<f64> = reconstructed.iter().map(|&v| v as f64).collect();
    let mse = mean_squared_error(&a, &b);
    let db = psnr(mse, bit_depth);
    Ok(PsnrReport {
        psnr: db,
        mean_squared_error: mse,
        passes_conformance: db >= minimum_psnr,
    })
}

/// Verify every sample lies inside the declared bit-depth range,
/// accumulating one violation per escaping sample.
pub fn check_sample_range(samples: &[i32], bit_depth: u8, signed: bool) -> ValidationReport {
    let (min, max) = crate::nlt::sample_range(bit_depth, signed);
    let errors = samples
        .iter()
        .enumerate()
        .filter(|(_, &sample)| sample < min || sample > max)
        .map(|(index, _)| ValidationError {
            position: index,
            reason: ViolationKind::SampleOutOfRange(index),
        })
        .collect();
    ValidationReport::from_errors(errors)
}
