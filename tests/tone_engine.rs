//! Integration tests for the tone/dither engine.
//!
//! These tests pin the engine's observable behaviour:
//! - Threshold oracle and bit packing layout
//! - Determinism of every dither algorithm
//! - Tone LUT boundaries across the gamma range
//! - Histogram equalization monotonicity
//! - The mid-gray ordered-dither regression pattern

use retrocam::tone::*;

const ORACLE: [u8; 16] = [0, 32, 64, 96, 128, 160, 192, 224, 255, 128, 128, 128, 0, 255, 0, 255];

const ALL_ALGORITHMS: [DitherAlgorithm; 6] = [
    DitherAlgorithm::Threshold,
    DitherAlgorithm::Bayer8,
    DitherAlgorithm::Bayer4,
    DitherAlgorithm::FloydSteinberg,
    DitherAlgorithm::Atkinson,
    DitherAlgorithm::NightThreshold,
];

/// Deterministic pseudo-random test image.
fn noise(width: usize, height: usize, seed: u32) -> Vec<u8> {
    let mut state = seed;
    (0..width * height)
        .map(|_| {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            (state >> 16) as u8
        })
        .collect()
}

fn lit(bitmap: &[u8]) -> u32 {
    bitmap.iter().map(|b| b.count_ones()).sum()
}

// ==================== Threshold Oracle ====================

#[test]
fn test_threshold_oracle_first_byte() {
    let mut bitmap = [0u8; 2];
    threshold_dither(&ORACLE, 4, 4, 128, &mut bitmap).unwrap();
    assert_eq!(bitmap[0], 0x0F);
}

#[test]
fn test_threshold_oracle_second_byte() {
    // 255 128 128 128 | 0 255 0 255
    let mut bitmap = [0u8; 2];
    threshold_dither(&ORACLE, 4, 4, 128, &mut bitmap).unwrap();
    assert_eq!(bitmap[1], 0xF5);
}

#[test]
fn test_threshold_through_dispatch_matches_direct_call() {
    let tables = ToneTables::default();
    let mut direct = [0u8; 2];
    let mut dispatched = [0xAAu8; 2];
    threshold_dither(&ORACLE, 4, 4, 128, &mut direct).unwrap();
    dither(DitherAlgorithm::Threshold, &ORACLE, 4, 4, &tables, 96, &mut dispatched).unwrap();
    assert_eq!(direct, dispatched);
}

#[test]
fn test_night_threshold_uses_lower_cutoff() {
    let tables = ToneTables::default();
    let mut bitmap = [0u8; 2];
    dither(DitherAlgorithm::NightThreshold, &ORACLE, 4, 4, &tables, 96, &mut bitmap).unwrap();
    // 96 now counts as light
    assert_eq!(bitmap[0], 0x1F);
}

#[test]
fn test_short_output_is_rejected() {
    let mut bitmap = [0u8; 1];
    let err = threshold_dither(&ORACLE, 4, 4, 128, &mut bitmap).unwrap_err();
    assert_eq!(
        err,
        ToneError::OutputTooSmall {
            expected: 2,
            actual: 1
        }
    );
}

#[test]
fn test_short_input_is_rejected() {
    let mut bitmap = [0u8; 2];
    let err = threshold_dither(&ORACLE[..10], 4, 4, 128, &mut bitmap).unwrap_err();
    assert!(matches!(err, ToneError::InputTooSmall { expected: 16, .. }));
}

// ==================== Packing ====================

#[test]
fn test_packing_is_continuous_across_rows() {
    // 3x3 image: 9 bits span two bytes without row padding
    let gray = [255, 0, 255, 0, 255, 0, 255, 0, 255];
    let mut bitmap = [0u8; 2];
    threshold_dither(&gray, 3, 3, 128, &mut bitmap).unwrap();
    assert_eq!(bitmap, [0b1010_1010, 0b1000_0000]);
    assert_eq!(packed_len(3, 3), 2);
}

#[test]
fn test_expand_restores_threshold_decisions() {
    let mut bitmap = [0u8; 2];
    threshold_dither(&ORACLE, 4, 4, 128, &mut bitmap).unwrap();
    let mut expanded = [0u8; 16];
    expand_bitmap(&bitmap, 4, 4, &mut expanded).unwrap();
    for (src, out) in ORACLE.iter().zip(expanded.iter()) {
        assert_eq!(*out == 255, *src >= 128);
    }
}

// ==================== Determinism ====================

#[test]
fn test_every_algorithm_is_deterministic() {
    let tables = ToneTables::default();
    let (w, h) = (37, 23);
    let gray = noise(w, h, 7);
    for algorithm in ALL_ALGORITHMS {
        let mut first = vec![0u8; packed_len(w, h)];
        let mut second = vec![0xFFu8; packed_len(w, h)];
        dither(algorithm, &gray, w, h, &tables, 96, &mut first).unwrap();
        dither(algorithm, &gray, w, h, &tables, 96, &mut second).unwrap();
        assert_eq!(first, second, "{} is not deterministic", algorithm.name());
    }
}

#[test]
fn test_extremes_stay_black_and_white() {
    let tables = ToneTables::default();
    let (w, h) = (16, 16);
    for algorithm in ALL_ALGORITHMS {
        let mut bitmap = vec![0u8; packed_len(w, h)];
        dither(algorithm, &vec![0u8; w * h], w, h, &tables, 96, &mut bitmap).unwrap();
        assert_eq!(lit(&bitmap), 0, "{} lit a black pixel", algorithm.name());

        dither(algorithm, &vec![255u8; w * h], w, h, &tables, 96, &mut bitmap).unwrap();
        assert_eq!(lit(&bitmap), (w * h) as u32, "{} dropped a white pixel", algorithm.name());
    }
}

// ==================== Tone LUT ====================

#[test]
fn test_tone_lut_boundaries_across_gamma_range() {
    let palette = Palette::default();
    let mut gamma = MIN_TONE_GAMMA;
    while gamma <= MAX_TONE_GAMMA {
        let lut = ToneLut::new(gamma, &palette);
        assert_eq!(lut.level(0), 0, "gamma {}", gamma);
        assert_eq!(lut.level(255), 3, "gamma {}", gamma);
        gamma += 0.1;
    }
}

#[test]
fn test_tone_lut_levels_are_monotonic() {
    let lut = ToneLut::new(0.9, &Palette::default());
    for v in 1..=255u8 {
        assert!(lut.level(v - 1) <= lut.level(v));
    }
}

#[test]
fn test_two_tone_palette_has_two_levels() {
    let palette = Palette::builtin("mono").unwrap();
    let lut = ToneLut::new(1.0, &palette);
    assert_eq!(lut.level(255), 1);
    assert_eq!(lut.value(255), 255);
    assert_eq!(lut.value(0), 0);
}

// ==================== Equalization ====================

#[test]
fn test_equalization_is_monotonic_on_noise() {
    let (w, h) = (64, 48);
    let original = noise(w, h, 99).iter().map(|v| v / 3 + 40).collect::<Vec<u8>>();
    let mut equalized = original.clone();
    histogram_equalize(&mut equalized, w, h).unwrap();

    let mut mapping = [None::<u8>; 256];
    for (&src, &dst) in original.iter().zip(equalized.iter()) {
        match mapping[src as usize] {
            Some(prev) => assert_eq!(prev, dst, "same input mapped twice differently"),
            None => mapping[src as usize] = Some(dst),
        }
    }
    let seen: Vec<u8> = mapping.iter().flatten().copied().collect();
    assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(seen.last().copied(), Some(255));
}

// ==================== Night Vision ====================

#[test]
fn test_night_vision_brightens_shadows() {
    let mut gray = vec![40u8; 4];
    night_vision(&mut gray, 2, 2, 0.5, 1.6).unwrap();
    assert!(gray.iter().all(|&v| v > 40));
}

#[test]
fn test_night_lut_matches_direct_curve() {
    let tables = ToneTables::default();
    let mut direct: Vec<u8> = (0..=255).collect();
    let mut cached = direct.clone();
    night_vision(&mut direct, 16, 16, 0.5, 1.6).unwrap();
    night_vision_with(&mut cached, 16, 16, &tables.night).unwrap();
    assert_eq!(direct, cached);
}

// ==================== Mid-Gray Scenario ====================

#[test]
fn test_mid_gray_bayer_pattern_is_pinned() {
    let tables = ToneTables::default();
    let (w, h) = (160, 120);
    let gray = vec![128u8; w * h];
    let mut bitmap = vec![0u8; packed_len(w, h)];
    ordered_dither_8x8(&gray, w, h, &tables, &mut bitmap).unwrap();

    assert_eq!(lit(&bitmap), 12_600);
    // Not trivial: neither all-dark nor all-light bytes everywhere
    assert!(bitmap.iter().any(|&b| b != 0x00 && b != 0xFF));
}

#[test]
fn test_mid_gray_pattern_tiles_every_eight_rows() {
    let tables = ToneTables::default();
    let (w, h) = (64, 16);
    let gray = vec![128u8; w * h];
    let mut bitmap = vec![0u8; packed_len(w, h)];
    ordered_dither_8x8(&gray, w, h, &tables, &mut bitmap).unwrap();

    let row_bytes = w / 8;
    assert_eq!(&bitmap[..8 * row_bytes], &bitmap[8 * row_bytes..]);
}

// ==================== Grayscale & Downsample ====================

#[test]
fn test_grayscale_white_and_black() {
    let gray = to_grayscale(&[255, 255, 255, 0, 0, 0], 2, 1).unwrap();
    assert_eq!(gray, vec![255, 0]);
}

#[test]
fn test_downsample_averages_blocks() {
    let gray = [0, 100, 200, 255, 0, 100, 200, 255];
    let out = downsample(&gray, 4, 2, 2, 1).unwrap();
    assert_eq!(out, vec![50, 227]);
}
