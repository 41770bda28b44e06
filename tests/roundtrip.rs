//! End-to-end scenarios: transforms, codestream round-trips, validation.

use j2kcore_rs::pipeline::{decode_tile, encode_tile};
use j2kcore_rs::validator::{check_psnr, validate};
use j2kcore_rs::{
    BoundaryExtension, CodecConfig, Dwt53, Dwt97, QuantizerKind, WaveletFilter,
};

#[test]
fn forward_53_splits_and_reconstructs_exactly() {
    let signal = [1, 2, 3, 4, 5, 6, 7, 8];
    let (low, high) = Dwt53::forward(&signal, BoundaryExtension::Symmetric).unwrap();
    assert_eq!(low.len(), 4);
    assert_eq!(high.len(), 4);
    let restored = Dwt53::inverse(&low, &high, BoundaryExtension::Symmetric).unwrap();
    assert_eq!(restored, signal);
}

#[test]
fn forward_97_reconstructs_within_tolerance() {
    let signal: Vec<f64> = (1..=8).map(|v| v as f64).collect();
    let (low, high) = Dwt97::forward(&signal, BoundaryExtension::Symmetric).unwrap();
    let restored = Dwt97::inverse(&low, &high, BoundaryExtension::Symmetric).unwrap();
    for (a, b) in signal.iter().zip(restored.iter()) {
        assert!((a - b).abs() <= 1e-9 * 8.0, "{a} vs {b}");
    }
}

#[test]
fn uniform_tile_produces_a_conformant_lossless_codestream() {
    let mut config = CodecConfig::new(8, 8, 8, 1);
    config.decomposition_levels = 1;
    config.quantizer = QuantizerKind::DeadZone { base_step: 1.0 };
    let image = vec![128i32; 64];

    let bytes = encode_tile(&[image.clone()], &config).unwrap();

    assert_eq!(&bytes[..2], &[0xFF, 0x4F], "codestream must begin with SOC");
    assert_eq!(&bytes[bytes.len() - 2..], &[0xFF, 0xD9], "and end with EOC");
    for (name, marker) in [
        ("SIZ", [0xFF, 0x51]),
        ("COD", [0xFF, 0x52]),
        ("QCD", [0xFF, 0x5C]),
        ("SOT", [0xFF, 0x90]),
        ("SOD", [0xFF, 0x93]),
    ] {
        assert!(
            bytes.windows(2).any(|w| w == marker),
            "codestream lacks {name}"
        );
    }
    assert!(validate(&bytes).is_compliant);

    let decoded = decode_tile(&bytes).unwrap();
    assert_eq!(decoded.components, vec![image]);
}

#[test]
fn rct_roundtrip_on_pure_red() {
    let mut r = vec![255i32];
    let mut g = vec![0i32];
    let mut b = vec![0i32];
    j2kcore_rs::mct::forward_rct(&mut r, &mut g, &mut b).unwrap();
    j2kcore_rs::mct::inverse_rct(&mut r, &mut g, &mut b).unwrap();
    assert_eq!((r[0], g[0], b[0]), (255, 0, 0));
}

#[test]
fn missing_soc_is_reported_at_offset_zero() {
    let data = [0x00, 0x00, 0xFF, 0x51, 0x00, 0x29, 0x00, 0x00];
    let report = validate(&data);
    assert!(!report.is_compliant);
    let first = &report.errors[0];
    assert_eq!(first.position, 0);
    assert_eq!(first.reason.to_string(), "SOC missing at offset 0");
}

#[test]
fn progression_order_out_of_range_is_reported() {
    let mut config = CodecConfig::new(8, 8, 8, 1);
    config.decomposition_levels = 1;
    let mut bytes = encode_tile(&[vec![0i32; 64]], &config).unwrap();
    let cod = bytes.windows(2).position(|w| w == [0xFF, 0x52]).unwrap();
    bytes[cod + 5] = 0x0A;

    let report = validate(&bytes);
    assert!(!report.is_compliant);
    assert!(report
        .errors
        .iter()
        .any(|e| e.reason.to_string() == "progression order 10 out of range"));

    // The strict decode path refuses the stream outright.
    assert!(decode_tile(&bytes).is_err());
}

#[test]
fn psnr_of_a_near_identical_reconstruction() {
    let original = vec![128i32; 1024];
    let mut reconstructed = original.clone();
    reconstructed[0] = 129;
    let report = check_psnr(&original, &reconstructed, 8, 30.0).unwrap();
    assert!(report.psnr > 50.0, "psnr was {}", report.psnr);
    assert!(report.passes_conformance);
}

#[test]
fn rgb_tile_with_color_transform_survives_the_full_pipeline() {
    let width = 16;
    let height = 8;
    let mut config = CodecConfig::new(width, height, 8, 3);
    config.decomposition_levels = 2;
    config.use_mct = true;
    let r: Vec<i32> = (0..width * height).map(|i| (i * 5 % 256) as i32).collect();
    let g: Vec<i32> = (0..width * height).map(|i| (i * 11 % 256) as i32).collect();
    let b: Vec<i32> = (0..width * height).map(|i| (255 - i % 256) as i32).collect();
    let components = [r, g, b];

    let bytes = encode_tile(&components, &config).unwrap();
    assert!(validate(&bytes).is_compliant);
    let decoded = decode_tile(&bytes).unwrap();
    assert_eq!(decoded.components, components.to_vec());
}

#[test]
fn lossy_pipeline_clears_a_psnr_floor() {
    let width = 32;
    let height = 32;
    let mut config = CodecConfig::new(width, height, 8, 1);
    config.filter = WaveletFilter::Irreversible97;
    config.decomposition_levels = 3;
    config.quantizer = QuantizerKind::DeadZone { base_step: 0.25 };
    // Smooth horizontal gradient with a soft vertical modulation.
    let image: Vec<i32> = (0..width * height)
        .map(|i| {
            let x = (i % width) as f64 / width as f64;
            let y = (i / width) as f64 / height as f64;
            (x * 200.0 + y * 40.0) as i32
        })
        .collect();

    let bytes = encode_tile(&[image.clone()], &config).unwrap();
    assert!(validate(&bytes).is_compliant);
    let decoded = decode_tile(&bytes).unwrap();
    let report = check_psnr(&image, &decoded.components[0], 8, 30.0).unwrap();
    assert!(
        report.passes_conformance,
        "psnr {} below floor",
        report.psnr
    );
}

#[test]
fn sixteen_bit_samples_roundtrip_losslessly() {
    let mut config = CodecConfig::new(8, 8, 16, 1);
    config.decomposition_levels = 2;
    let image: Vec<i32> = (0..64).map(|i| i * 1000).collect();
    let bytes = encode_tile(&[image.clone()], &config).unwrap();
    let decoded = decode_tile(&bytes).unwrap();
    assert_eq!(decoded.bit_depth, 16);
    assert_eq!(decoded.components, vec![image]);
}
