use crate::history::History;
use crate::presets::Presets;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

const HISTORY_FILE: &str = "history.json";
const PRESETS_FILE: &str = "presets.json";

#[derive(Debug, Clone)]
pub struct Persistence {
    data_dir: PathBuf,
}

impl Persistence {
    pub fn open_default() -> Result<Self> {
        let proj_dirs = ProjectDirs::from("com", "pabloagn", "Pomelo")
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
        Self::at(proj_dirs.data_dir())
    }

    pub fn at(dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory {:?}", data_dir))?;
        Ok(Self { data_dir })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn load_history(&self) -> Result<History> {
        let stored: History = self.load(HISTORY_FILE)?;
        Ok(History::from_records(stored.iter().cloned()))
    }

    pub fn save_history(&self, history: &History) -> Result<()> {
        self.save(HISTORY_FILE, history)
    }

    pub fn load_presets(&self) -> Result<Presets> {
        self.load(PRESETS_FILE)
    }

    pub fn save_presets(&self, presets: &Presets) -> Result<()> {
        self.save(PRESETS_FILE, presets)
    }

    fn load<T: DeserializeOwned + Default>(&self, name: &str) -> Result<T> {
        let path = self.data_dir.join(name);
        if !path.exists() {
            return Ok(T::default());
        }
        let json = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {:?}", path))?;
        serde_json::from_str(&json).with_context(|| format!("Failed to parse {:?}", path))
    }

    fn save<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        let path = self.data_dir.join(name);
        let json = serde_json::to_string_pretty(value)?;
        fs::write(&path, json).with_context(|| format!("Failed to write {:?}", path))?;
        Ok(())
    }
}
