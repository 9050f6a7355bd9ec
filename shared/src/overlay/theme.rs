use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Straight (non-premultiplied) RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Scales the alpha channel by `factor` (clamped to [0,1]).
    pub fn faded(self, factor: f32) -> Self {
        let f = factor.clamp(0.0, 1.0);
        Self { a: (self.a as f32 * f).round() as u8, ..self }
    }

    /// Parses `#RRGGBB` or `RRGGBB`.
    pub fn from_hex(s: &str) -> Option<Self> {
        let hex = s.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        Some(Self::rgb(byte(0)?, byte(2)?, byte(4)?))
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Colors used to paint one message bubble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub background: Color,
    pub text: Color,
    pub border: Color,
    pub glow: Color,
    pub shadow: Color,
}

const SLIPPI_GREEN: Color = Color::rgb(33, 186, 69);

/// Named overlay theme.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Theme {
    #[default]
    Dark,
    Light,
    Slippi,
    /// Dark background with a caller-chosen accent.
    Custom(Color),
}

impl Theme {
    pub fn palette(&self) -> Palette {
        match self {
            Theme::Dark => Palette {
                background: Color::rgba(20, 22, 28, 220),
                text: Color::rgb(240, 240, 240),
                border: Color::rgb(90, 96, 110),
                glow: Color::rgba(90, 96, 110, 90),
                shadow: Color::rgba(0, 0, 0, 160),
            },
            Theme::Light => Palette {
                background: Color::rgba(245, 245, 245, 230),
                text: Color::rgb(25, 25, 25),
                border: Color::rgb(170, 170, 170),
                glow: Color::rgba(255, 255, 255, 90),
                shadow: Color::rgba(255, 255, 255, 120),
            },
            Theme::Slippi => Palette {
                background: Color::rgba(16, 24, 18, 225),
                text: Color::rgb(235, 255, 238),
                border: SLIPPI_GREEN,
                glow: SLIPPI_GREEN.faded(0.4),
                shadow: Color::rgba(0, 0, 0, 170),
            },
            Theme::Custom(accent) => Palette {
                border: *accent,
                glow: accent.faded(0.4),
                ..Theme::Dark.palette()
            },
        }
    }
}

impl FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        match lower.as_str() {
            "dark" => Ok(Theme::Dark),
            "light" => Ok(Theme::Light),
            "slippi" => Ok(Theme::Slippi),
            _ => lower
                .strip_prefix("custom:")
                .and_then(Color::from_hex)
                .map(Theme::Custom)
                .ok_or_else(|| format!("unknown theme `{s}`")),
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Theme::Dark => f.write_str("dark"),
            Theme::Light => f.write_str("light"),
            Theme::Slippi => f.write_str("slippi"),
            Theme::Custom(c) => write!(f, "custom:{c}"),
        }
    }
}

impl TryFrom<String> for Theme {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Theme> for String {
    fn from(theme: Theme) -> Self {
        theme.to_string()
    }
}
