//! Named session presets: a label plus the four timer settings.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cycle::Settings;

/// Durations in minutes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPreset {
    pub name: String,
    pub work_duration: u64,
    pub short_break: u64,
    pub long_break: u64,
    pub sessions_until_long_break: u32,
}

impl SessionPreset {
    pub fn from_settings(name: &str, settings: &Settings) -> Self {
        Self {
            name: name.trim().to_string(),
            work_duration: settings.work_duration / 60,
            short_break: settings.short_break / 60,
            long_break: settings.long_break / 60,
            sessions_until_long_break: settings.sessions_until_long_break,
        }
    }

    pub fn settings(&self) -> Settings {
        Settings::from_minutes(
            self.work_duration,
            self.short_break,
            self.long_break,
            self.sessions_until_long_break,
        )
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PresetError {
    #[error("Please enter a session name")]
    EmptyName,

    #[error("No saved session named '{0}'")]
    NotFound(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Presets {
    entries: BTreeMap<String, SessionPreset>,
}

impl Presets {
    /// Saving under an existing name replaces it.
    pub fn save(&mut self, mut preset: SessionPreset) -> Result<(), PresetError> {
        preset.name = preset.name.trim().to_string();
        if preset.name.is_empty() {
            return Err(PresetError::EmptyName);
        }
        self.entries.insert(preset.name.clone(), preset);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&SessionPreset> {
        self.entries.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Result<SessionPreset, PresetError> {
        self.entries
            .remove(name)
            .ok_or_else(|| PresetError::NotFound(name.to_string()))
    }

    /// Sorted by name.
    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    /// The name after `current` in sorted order, wrapping around.
    pub fn next_name(&self, current: Option<&str>) -> Option<&str> {
        let names = self.names();
        let next = match current.and_then(|c| names.iter().position(|n| *n == c)) {
            Some(i) => (i + 1) % names.len(),
            None => 0,
        };
        names.get(next).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
