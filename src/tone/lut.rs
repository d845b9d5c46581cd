//! Precomputed lookup tables shared by the capture and preview paths.

use super::palette::Palette;

/// Lowest tone-curve exponent accepted by [`ToneLut`].
pub const MIN_TONE_GAMMA: f32 = 0.5;
/// Highest tone-curve exponent accepted by [`ToneLut`].
pub const MAX_TONE_GAMMA: f32 = 2.0;

/// Bayer 8x8 ordered dithering matrix (values 0-63).
#[rustfmt::skip]
pub const BAYER8: [[u8; 8]; 8] = [
    [ 0, 32,  8, 40,  2, 34, 10, 42],
    [48, 16, 56, 24, 50, 18, 58, 26],
    [12, 44,  4, 36, 14, 46,  6, 38],
    [60, 28, 52, 20, 62, 30, 54, 22],
    [ 3, 35, 11, 43,  1, 33,  9, 41],
    [51, 19, 59, 27, 49, 17, 57, 25],
    [15, 47,  7, 39, 13, 45,  5, 37],
    [63, 31, 55, 23, 61, 29, 53, 21],
];

/// Bayer 4x4 ordered dithering matrix (values 0-15).
#[rustfmt::skip]
pub const BAYER4: [[u8; 4]; 4] = [
    [ 0,  8,  2, 10],
    [12,  4, 14,  6],
    [ 3, 11,  1,  9],
    [15,  7, 13,  5],
];

/// Gamma curve: `out = round((in/255)^gamma * 255)`.
#[derive(Clone)]
pub struct GammaLut {
    gamma: f32,
    table: [u8; 256],
}

impl GammaLut {
    pub fn new(gamma: f32) -> Self {
        let gamma = gamma.clamp(0.05, 10.0);
        let mut table = [0u8; 256];
        for (i, slot) in table.iter_mut().enumerate() {
            let v = (i as f32 / 255.0).powf(gamma) * 255.0;
            *slot = v.round().clamp(0.0, 255.0) as u8;
        }
        Self { gamma, table }
    }

    pub fn gamma(&self) -> f32 {
        self.gamma
    }

    #[inline]
    pub fn apply(&self, v: u8) -> u8 {
        self.table[v as usize]
    }
}

impl std::fmt::Debug for GammaLut {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GammaLut")
            .field("gamma", &self.gamma)
            .finish_non_exhaustive()
    }
}

/// Night-vision curve: gamma lift followed by a contrast boost around 128.
#[derive(Clone)]
pub struct NightLut {
    gamma: f32,
    contrast: f32,
    table: [u8; 256],
}

impl NightLut {
    pub fn new(gamma: f32, contrast: f32) -> Self {
        let lift = GammaLut::new(gamma);
        let mut table = [0u8; 256];
        for (i, slot) in table.iter_mut().enumerate() {
            let g = lift.apply(i as u8) as f32;
            let boosted = (g - 128.0) * contrast + 128.0;
            *slot = boosted.round().clamp(0.0, 255.0) as u8;
        }
        Self {
            gamma: lift.gamma(),
            contrast,
            table,
        }
    }

    pub fn gamma(&self) -> f32 {
        self.gamma
    }

    pub fn contrast(&self) -> f32 {
        self.contrast
    }

    #[inline]
    pub fn apply(&self, v: u8) -> u8 {
        self.table[v as usize]
    }
}

impl std::fmt::Debug for NightLut {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NightLut")
            .field("gamma", &self.gamma)
            .field("contrast", &self.contrast)
            .finish_non_exhaustive()
    }
}

/// Tone remap used by the stylized mode.
///
/// Each gray value is reduced to one of the palette's levels with
/// `level = round((v/255)^gamma * (levels-1))` and then replaced by that
/// palette tone. With the classic four-tone palette this is `255*level/3`.
#[derive(Clone)]
pub struct ToneLut {
    gamma: f32,
    levels: [u8; 256],
    values: [u8; 256],
}

impl ToneLut {
    pub fn new(gamma: f32, palette: &Palette) -> Self {
        let gamma = gamma.clamp(MIN_TONE_GAMMA, MAX_TONE_GAMMA);
        let tones = palette.tones();
        let top = (tones.len() - 1) as f32;

        let mut levels = [0u8; 256];
        let mut values = [0u8; 256];
        for i in 0..256 {
            let level = ((i as f32 / 255.0).powf(gamma) * top).round() as usize;
            let level = level.min(tones.len() - 1);
            levels[i] = level as u8;
            values[i] = tones[level];
        }
        Self {
            gamma,
            levels,
            values,
        }
    }

    pub fn gamma(&self) -> f32 {
        self.gamma
    }

    /// Tone level (0 = darkest) for a gray value.
    #[inline]
    pub fn level(&self, v: u8) -> u8 {
        self.levels[v as usize]
    }

    /// Palette tone for a gray value.
    #[inline]
    pub fn value(&self, v: u8) -> u8 {
        self.values[v as usize]
    }
}

impl std::fmt::Debug for ToneLut {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToneLut")
            .field("gamma", &self.gamma)
            .finish_non_exhaustive()
    }
}

/// All lookup tables the engine needs, built once at init.
#[derive(Debug, Clone)]
pub struct ToneTables {
    pub tone: ToneLut,
    pub night: NightLut,
    /// Bayer 8x8 cell thresholds scaled to 0-255 (`4b + 2`).
    pub bayer8: [[u8; 8]; 8],
    /// Bayer 4x4 cell thresholds scaled to 0-255 (`16b + 8`).
    pub bayer4: [[u8; 4]; 4],
}

impl ToneTables {
    pub fn new(tone_gamma: f32, palette: &Palette, night_gamma: f32, night_contrast: f32) -> Self {
        let mut bayer8 = [[0u8; 8]; 8];
        for (y, row) in BAYER8.iter().enumerate() {
            for (x, &b) in row.iter().enumerate() {
                bayer8[y][x] = b * 4 + 2;
            }
        }
        let mut bayer4 = [[0u8; 4]; 4];
        for (y, row) in BAYER4.iter().enumerate() {
            for (x, &b) in row.iter().enumerate() {
                bayer4[y][x] = b * 16 + 8;
            }
        }

        Self {
            tone: ToneLut::new(tone_gamma, palette),
            night: NightLut::new(night_gamma, night_contrast),
            bayer8,
            bayer4,
        }
    }
}

impl Default for ToneTables {
    fn default() -> Self {
        Self::new(0.9, &Palette::default(), 0.5, 1.6)
    }
}
