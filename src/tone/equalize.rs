//! Histogram equalization.

use super::{check_input, ToneError};

/// Equalize a grayscale image in place.
///
/// Builds a 256-bin histogram, accumulates it into a CDF and remaps each
/// pixel to `round(cdf[v] / N * 255)`. Two passes over the image, no
/// allocation. The mapping is monotonic: darker inputs never come out
/// brighter than lighter ones.
pub fn histogram_equalize(gray: &mut [u8], width: usize, height: usize) -> Result<(), ToneError> {
    let pixels = width * height;
    check_input(gray, pixels)?;
    if pixels == 0 {
        return Ok(());
    }

    let mut histogram = [0u32; 256];
    for &v in &gray[..pixels] {
        histogram[v as usize] += 1;
    }

    let n = pixels as u64;
    let mut map = [0u8; 256];
    let mut cdf = 0u64;
    for (v, &count) in histogram.iter().enumerate() {
        cdf += count as u64;
        map[v] = ((cdf * 255 + n / 2) / n) as u8;
    }

    for v in &mut gray[..pixels] {
        *v = map[*v as usize];
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_levels_spread() {
        let mut gray = [100, 100, 110, 110];
        histogram_equalize(&mut gray, 2, 2).unwrap();
        // cdf(100) = 2/4 -> 128, cdf(110) = 4/4 -> 255
        assert_eq!(gray, [128, 128, 255, 255]);
    }

    #[test]
    fn test_uniform_image_goes_white() {
        let mut gray = [42u8; 9];
        histogram_equalize(&mut gray, 3, 3).unwrap();
        assert!(gray.iter().all(|&v| v == 255));
    }

    #[test]
    fn test_monotonic() {
        let mut gray: Vec<u8> = (0..1000).map(|i| ((i * 37) % 200) as u8 + 20).collect();
        let original = gray.clone();
        histogram_equalize(&mut gray, 100, 10).unwrap();
        for i in 0..gray.len() {
            for j in 0..gray.len() {
                if original[i] < original[j] {
                    assert!(gray[i] <= gray[j]);
                }
            }
        }
    }

    #[test]
    fn test_deterministic() {
        let src: Vec<u8> = (0..256).map(|i| (i as u8).wrapping_mul(13)).collect();
        let mut a = src.clone();
        let mut b = src;
        histogram_equalize(&mut a, 16, 16).unwrap();
        histogram_equalize(&mut b, 16, 16).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_image() {
        let mut gray: [u8; 0] = [];
        histogram_equalize(&mut gray, 0, 0).unwrap();
    }
}
