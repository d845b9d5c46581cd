//! Night-vision enhancement.

use super::lut::NightLut;
use super::{check_input, ToneError};

/// Apply a gamma lift then a contrast boost in place.
///
/// `out = clamp((gamma(in) - 128) * contrast + 128, 0, 255)` where
/// `gamma(in) = (in/255)^gamma * 255`. Builds the curve on every call; hot
/// paths should prefer [`night_vision_with`] and a [`NightLut`] built once.
pub fn night_vision(
    gray: &mut [u8],
    width: usize,
    height: usize,
    gamma: f32,
    contrast: f32,
) -> Result<(), ToneError> {
    night_vision_with(gray, width, height, &NightLut::new(gamma, contrast))
}

/// Apply a precomputed night curve in place.
pub fn night_vision_with(
    gray: &mut [u8],
    width: usize,
    height: usize,
    lut: &NightLut,
) -> Result<(), ToneError> {
    let pixels = width * height;
    check_input(gray, pixels)?;
    for v in &mut gray[..pixels] {
        *v = lut.apply(*v);
    }
    Ok(())
}
