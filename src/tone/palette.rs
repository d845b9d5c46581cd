//! Tone palettes: 2-4 display values ordered from darkest to brightest.

use std::fmt;
use std::str::FromStr;

/// Built-in palettes as `(name, tones)`.
pub const BUILTIN_PALETTES: &[(&str, &[u8])] = &[
    ("classic", &[0, 85, 170, 255]),
    ("pocket", &[8, 72, 160, 232]),
    ("soft", &[32, 96, 160, 224]),
    ("mono", &[0, 255]),
];

/// Name reserved for the persisted custom slot.
pub const CUSTOM_PALETTE_NAME: &str = "custom";

/// A reduced set of gray tones used by the stylized mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    name: String,
    tones: Vec<u8>,
    custom: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PaletteError {
    #[error("palette needs 2 to 4 tones, got {0}")]
    ToneCount(usize),
    #[error("unknown palette '{0}'")]
    Unknown(String),
    #[error("invalid palette tone '{0}'")]
    InvalidTone(String),
}

impl Palette {
    /// Look up a built-in palette by name.
    pub fn builtin(name: &str) -> Option<Palette> {
        BUILTIN_PALETTES
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(n, tones)| Palette {
                name: (*n).to_string(),
                tones: tones.to_vec(),
                custom: false,
            })
    }

    /// Build a user-defined palette.
    pub fn custom(tones: Vec<u8>) -> Result<Palette, PaletteError> {
        if !(2..=4).contains(&tones.len()) {
            return Err(PaletteError::ToneCount(tones.len()));
        }
        Ok(Palette {
            name: CUSTOM_PALETTE_NAME.to_string(),
            tones,
            custom: true,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tones(&self) -> &[u8] {
        &self.tones
    }

    pub fn is_custom(&self) -> bool {
        self.custom
    }

    /// Serialize the tones for the settings store (`"0,85,170,255"`).
    pub fn to_setting(&self) -> String {
        self.tones
            .iter()
            .map(|t| t.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl Default for Palette {
    fn default() -> Self {
        Palette {
            name: "classic".to_string(),
            tones: vec![0, 85, 170, 255],
            custom: false,
        }
    }
}

impl fmt::Display for Palette {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.name, self.to_setting())
    }
}

/// Parses the settings-store form written by [`Palette::to_setting`].
impl FromStr for Palette {
    type Err = PaletteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tones = s
            .split(',')
            .map(|t| {
                t.trim()
                    .parse::<u8>()
                    .map_err(|_| PaletteError::InvalidTone(t.trim().to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Palette::custom(tones)
    }
}
