//! Small persistent key-value store for user settings.
//!
//! Two keys are used by the camera: the custom palette slot and the next
//! capture number, so file names keep counting up across restarts.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::tone::palette::{Palette, PaletteError, CUSTOM_PALETTE_NAME};

/// Custom palette tones, e.g. `"0,85,170,255"`.
pub const KEY_CUSTOM_PALETTE: &str = "palette.custom";
/// Number used for the next capture file.
pub const KEY_NEXT_INDEX: &str = "capture.next_index";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to read settings '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse settings '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("failed to write settings '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Palette(#[from] PaletteError),
}

pub trait SettingsStore {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&mut self, key: &str, value: &str) -> Result<(), SettingsError>;
}

/// Volatile store, used when no settings file is available.
#[derive(Debug, Clone, Default)]
pub struct MemorySettings {
    values: BTreeMap<String, String>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettings {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), SettingsError> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Store persisted as a flat TOML table; every `set` rewrites the file.
#[derive(Debug, Clone)]
pub struct TomlSettings {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl TomlSettings {
    /// Open `path`, starting empty if the file does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SettingsError> {
        let path = path.into();
        let values = if path.exists() {
            let content = fs::read_to_string(&path).map_err(|e| SettingsError::Read {
                path: path.clone(),
                source: e,
            })?;
            toml::from_str(&content).map_err(|e| SettingsError::Parse {
                path: path.clone(),
                source: e,
            })?
        } else {
            BTreeMap::new()
        };
        Ok(Self { path, values })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> Result<(), SettingsError> {
        let content = toml::to_string(&self.values)?;
        let write_err = |e| SettingsError::Write {
            path: self.path.clone(),
            source: e,
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        fs::write(&self.path, content).map_err(write_err)
    }
}

impl SettingsStore for TomlSettings {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), SettingsError> {
        self.values.insert(key.to_string(), value.to_string());
        self.persist()
    }
}

/// Resolve the active palette.
///
/// `custom` selects the persisted custom slot, falling back to the default
/// palette when the slot is empty or corrupt. Unknown names also fall back.
pub fn load_palette(store: &dyn SettingsStore, name: &str) -> Palette {
    if name.eq_ignore_ascii_case(CUSTOM_PALETTE_NAME) {
        return match store.get(KEY_CUSTOM_PALETTE).map(|s| s.parse::<Palette>()) {
            Some(Ok(palette)) => palette,
            Some(Err(e)) => {
                log::warn!("Ignoring stored custom palette: {}", e);
                Palette::default()
            }
            None => {
                log::warn!("No custom palette stored, using default");
                Palette::default()
            }
        };
    }
    Palette::builtin(name).unwrap_or_else(|| {
        log::warn!("Unknown palette '{}', using default", name);
        Palette::default()
    })
}

/// Save `tones` into the custom palette slot.
pub fn store_custom_palette(
    store: &mut dyn SettingsStore,
    tones: Vec<u8>,
) -> Result<Palette, SettingsError> {
    let palette = Palette::custom(tones)?;
    store.set(KEY_CUSTOM_PALETTE, &palette.to_setting())?;
    Ok(palette)
}

/// Next capture number (starts at 1).
pub fn next_capture_index(store: &dyn SettingsStore) -> u32 {
    store
        .get(KEY_NEXT_INDEX)
        .and_then(|v| v.parse::<u32>().ok())
        .filter(|&n| n > 0)
        .unwrap_or(1)
}

pub fn set_next_capture_index(
    store: &mut dyn SettingsStore,
    index: u32,
) -> Result<(), SettingsError> {
    store.set(KEY_NEXT_INDEX, &index.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_toml_settings_persist() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state/settings.toml");
        {
            let mut store = TomlSettings::open(&path).unwrap();
            set_next_capture_index(&mut store, 7).unwrap();
            store_custom_palette(&mut store, vec![10, 120, 250]).unwrap();
        }
        let store = TomlSettings::open(&path).unwrap();
        assert_eq!(next_capture_index(&store), 7);
        let palette = load_palette(&store, "custom");
        assert!(palette.is_custom());
        assert_eq!(palette.tones(), &[10, 120, 250]);
    }

    #[test]
    fn test_corrupt_settings_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(&path, "not = [valid").unwrap();
        assert!(matches!(
            TomlSettings::open(&path),
            Err(SettingsError::Parse { .. })
        ));
    }

    #[test]
    fn test_capture_index_defaults() {
        let mut store = MemorySettings::new();
        assert_eq!(next_capture_index(&store), 1);
        store.set(KEY_NEXT_INDEX, "garbage").unwrap();
        assert_eq!(next_capture_index(&store), 1);
        store.set(KEY_NEXT_INDEX, "0").unwrap();
        assert_eq!(next_capture_index(&store), 1);
    }

    #[test]
    fn test_palette_fallbacks() {
        let mut store = MemorySettings::new();
        assert_eq!(load_palette(&store, "custom"), Palette::default());
        assert_eq!(load_palette(&store, "nope"), Palette::default());
        assert_eq!(load_palette(&store, "pocket").name(), "pocket");
        store.set(KEY_CUSTOM_PALETTE, "1,2,3,4,5").unwrap();
        assert_eq!(load_palette(&store, "custom"), Palette::default());
    }

    #[test]
    fn test_custom_palette_validation() {
        let mut store = MemorySettings::new();
        assert!(matches!(
            store_custom_palette(&mut store, vec![1]),
            Err(SettingsError::Palette(PaletteError::ToneCount(1)))
        ));
        assert!(store.get(KEY_CUSTOM_PALETTE).is_none());
    }
}
