use anyhow::{Context, Result};
use directories::ProjectDirs;
use pomelo_ipc::Phase;
use ratatui::style::Color;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::cycle::{Settings, DEFAULT_LABEL};

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub timer: TimerDefaults,
    pub theme: Theme,
    pub icons: Icons,
    pub notifications: NotificationConfig,
}

/// Starting values for the settings form, in minutes.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TimerDefaults {
    pub work_minutes: u64,
    pub short_break_minutes: u64,
    pub long_break_minutes: u64,
    pub sessions_until_long_break: u32,
    pub label: String,
}

impl TimerDefaults {
    pub fn settings(&self) -> Settings {
        Settings::from_minutes(
            self.work_minutes,
            self.short_break_minutes,
            self.long_break_minutes,
            self.sessions_until_long_break,
        )
    }
}

impl Default for TimerDefaults {
    fn default() -> Self {
        Self {
            work_minutes: 25,
            short_break_minutes: 5,
            long_break_minutes: 15,
            sessions_until_long_break: 4,
            label: DEFAULT_LABEL.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NotificationConfig {
    pub enabled: bool,
    pub bell: bool,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bell: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ThemePreset {
    #[default]
    Default,
    Ocean,
    Forest,
    Sunset,
    Midnight,
    Cherry,
}

/// Phase colors: a gradient pair for work, one for breaks, and an accent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub primary: Color,
    pub secondary: Color,
    pub break_primary: Color,
    pub break_secondary: Color,
    pub accent: Color,
}

impl ThemePreset {
    pub fn palette(self) -> Palette {
        let (primary, secondary, break_primary, break_secondary, accent) = match self {
            ThemePreset::Default => (
                Color::Rgb(139, 92, 246),
                Color::Rgb(168, 85, 247),
                Color::Rgb(192, 132, 252),
                Color::Rgb(217, 70, 239),
                Color::Rgb(168, 85, 247),
            ),
            ThemePreset::Ocean => (
                Color::Rgb(102, 126, 234),
                Color::Rgb(33, 147, 176),
                Color::Rgb(102, 126, 234),
                Color::Rgb(33, 147, 176),
                Color::Rgb(0, 188, 212),
            ),
            ThemePreset::Forest => (
                Color::Rgb(19, 78, 94),
                Color::Rgb(113, 178, 128),
                Color::Rgb(113, 178, 128),
                Color::Rgb(19, 78, 94),
                Color::Rgb(76, 175, 80),
            ),
            ThemePreset::Sunset => (
                Color::Rgb(255, 154, 158),
                Color::Rgb(254, 207, 239),
                Color::Rgb(254, 207, 239),
                Color::Rgb(255, 154, 158),
                Color::Rgb(255, 87, 34),
            ),
            ThemePreset::Midnight => (
                Color::Rgb(44, 62, 80),
                Color::Rgb(74, 103, 65),
                Color::Rgb(74, 103, 65),
                Color::Rgb(44, 62, 80),
                Color::Rgb(39, 174, 96),
            ),
            ThemePreset::Cherry => (
                Color::Rgb(235, 51, 73),
                Color::Rgb(244, 92, 67),
                Color::Rgb(244, 92, 67),
                Color::Rgb(235, 51, 73),
                Color::Rgb(233, 30, 99),
            ),
        };
        Palette {
            primary,
            secondary,
            break_primary,
            break_secondary,
            accent,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Theme {
    pub preset: ThemePreset,
    #[serde(deserialize_with = "hex_to_color")]
    pub background: Color,
    #[serde(deserialize_with = "hex_to_color")]
    pub foreground: Color,
    #[serde(deserialize_with = "hex_to_color")]
    pub black: Color,
    #[serde(deserialize_with = "hex_to_color")]
    pub gray: Color,
    #[serde(deserialize_with = "hex_to_color")]
    pub yellow: Color,
    #[serde(deserialize_with = "optional_hex_to_color")]
    pub primary: Option<Color>,
    #[serde(deserialize_with = "optional_hex_to_color")]
    pub secondary: Option<Color>,
    #[serde(deserialize_with = "optional_hex_to_color")]
    pub break_primary: Option<Color>,
    #[serde(deserialize_with = "optional_hex_to_color")]
    pub break_secondary: Option<Color>,
    #[serde(deserialize_with = "optional_hex_to_color")]
    pub accent: Option<Color>,
}

impl Theme {
    /// The preset palette with any configured overrides applied.
    pub fn palette(&self) -> Palette {
        let base = self.preset.palette();
        Palette {
            primary: self.primary.unwrap_or(base.primary),
            secondary: self.secondary.unwrap_or(base.secondary),
            break_primary: self.break_primary.unwrap_or(base.break_primary),
            break_secondary: self.break_secondary.unwrap_or(base.break_secondary),
            accent: self.accent.unwrap_or(base.accent),
        }
    }

    /// (main, secondary) colors for a phase.
    pub fn phase_colors(&self, phase: Phase) -> (Color, Color) {
        let palette = self.palette();
        if phase.is_break() {
            (palette.break_primary, palette.break_secondary)
        } else {
            (palette.primary, palette.secondary)
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Icons {
    pub work: String,
    pub short_break: String,
    pub long_break: String,
    pub play: String,
    pub pause: String,
    pub stop: String,
    pub select: String,
    pub progress_filled: String,
    pub progress_empty: String,
    pub input_cursor: String,
    pub separator: String,
    pub header_left: String,
    pub header_right: String,
}

impl Icons {
    pub fn phase(&self, phase: Phase) -> &str {
        match phase {
            Phase::Work => &self.work,
            Phase::ShortBreak => &self.short_break,
            Phase::LongBreak => &self.long_break,
        }
    }
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            preset: ThemePreset::Default,
            background: Color::Rgb(9, 14, 19),
            foreground: Color::Rgb(197, 201, 199),
            black: Color::Rgb(13, 12, 12),
            gray: Color::Rgb(164, 167, 164),
            yellow: Color::Rgb(196, 178, 138),
            primary: None,
            secondary: None,
            break_primary: None,
            break_secondary: None,
            accent: None,
        }
    }
}

impl Default for Icons {
    fn default() -> Self {
        Self {
            work: "●".to_string(),
            short_break: "◐".to_string(),
            long_break: "○".to_string(),
            play: "▶".to_string(),
            pause: "⏸".to_string(),
            stop: "■".to_string(),
            select: "▸".to_string(),
            progress_filled: "█".to_string(),
            progress_empty: "░".to_string(),
            input_cursor: "▊".to_string(),
            separator: "│".to_string(),
            header_left: "⟪ ".to_string(),
            header_right: " ⟫".to_string(),
        }
    }
}

fn parse_hex(s: &str) -> Result<Color, String> {
    if !s.starts_with('#') || s.len() != 7 {
        return Err(format!("invalid hex color format: {s}"));
    }
    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&s[range], 16).map_err(|e| e.to_string());
    Ok(Color::Rgb(channel(1..3)?, channel(3..5)?, channel(5..7)?))
}

fn hex_to_color<'de, D>(deserializer: D) -> Result<Color, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = serde::Deserialize::deserialize(deserializer)?;
    parse_hex(&s).map_err(serde::de::Error::custom)
}

fn optional_hex_to_color<'de, D>(deserializer: D) -> Result<Option<Color>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = serde::Deserialize::deserialize(deserializer)?;
    parse_hex(&s).map(Some).map_err(serde::de::Error::custom)
}

pub fn load_config() -> Result<Config> {
    match ProjectDirs::from("com", "pabloagn", "Pomelo") {
        Some(proj_dirs) => load_config_from(&proj_dirs.config_dir().join("pomelo.toml")),
        None => Ok(Config::default()),
    }
}

pub fn load_config_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let config_str = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {:?}", path))?;
    toml::from_str(&config_str)
        .with_context(|| format!("Failed to parse config file at {:?}", path))
}
