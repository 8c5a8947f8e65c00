use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

pub const SETTINGS_FONT_SIZE_MIN: u8 = 8;
pub const SETTINGS_FONT_SIZE_MAX: u8 = 48;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentKind {
    /// Fixed-layout pages rendered to bitmaps (PDF).
    Raster,
    /// Marked-up text that reflows with the font size (EPUB).
    Reflowable,
}

impl DocumentKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "pdf" => Some(Self::Raster),
            "epub" => Some(Self::Reflowable),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Raster => "pdf",
            Self::Reflowable => "epub",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayoutMode {
    #[default]
    Single,
    Continuous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub fn to_rgba(self) -> [u8; 4] {
        [self.0, self.1, self.2, 255]
    }
}

/// CSS hex notation, e.g. `#202020`.
impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.0, self.1, self.2)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub background: Rgb,
    pub text: Rgb,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
        }
    }

    /// Colours of the reading surface.
    pub fn palette(self) -> Palette {
        match self {
            Self::Light => Palette {
                background: Rgb(0xff, 0xff, 0xff),
                text: Rgb(0x00, 0x00, 0x00),
            },
            Self::Dark => Palette {
                background: Rgb(0x20, 0x20, 0x20),
                text: Rgb(0xf0, 0xf0, 0xf0),
            },
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Theme {
    type Err = UnknownValue;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "light" => Ok(Self::Light),
            "dark" => Ok(Self::Dark),
            _ => Err(UnknownValue(value.to_owned())),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Th,
}

impl Language {
    pub const ALL: [Language; 2] = [Language::En, Language::Th];

    pub fn code(self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Th => "th",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = UnknownValue;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        let primary = normalized.split(['-', '_']).next().unwrap_or_default();
        match primary {
            "en" => Ok(Self::En),
            "th" => Ok(Self::Th),
            _ => Err(UnknownValue(value.to_owned())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown value `{0}`")]
pub struct UnknownValue(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub theme: Theme,
    pub font_family: String,
    pub font_size: u8,
    pub language: Language,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            theme: Theme::Light,
            font_family: "Segoe UI".to_owned(),
            font_size: 12,
            language: Language::En,
        }
    }
}

impl Settings {
    pub fn clamp_font_size(size: i64) -> u8 {
        size.clamp(i64::from(SETTINGS_FONT_SIZE_MIN), i64::from(SETTINGS_FONT_SIZE_MAX)) as u8
    }

    pub fn normalized(mut self) -> Self {
        self.font_size = Self::clamp_font_size(i64::from(self.font_size));
        if self.font_family.trim().is_empty() {
            self.font_family = Settings::default().font_family;
        }
        self
    }
}
