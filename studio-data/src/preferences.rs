//! User preferences, persisted as JSON in the platform config directory.
//!
//! `~/.config/inference-studio/preferences.json` on Linux; the equivalent
//! per-platform location elsewhere. A missing or unreadable file falls back
//! to defaults so the app always starts.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::backend_client::DEFAULT_BACKEND_URL;

pub const APP_DIR_NAME: &str = "inference-studio";
const PREFERENCES_FILENAME: &str = "preferences.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    /// Base URL of the inference backend
    #[serde(default = "default_backend_url")]
    pub backend_url: String,

    /// Model selected when the app was last closed
    #[serde(default)]
    pub last_model_id: Option<String>,

    /// Extra directories searched for synthesized audio, after the built-in ones
    #[serde(default)]
    pub extra_audio_roots: Vec<PathBuf>,

    #[serde(skip)]
    path: Option<PathBuf>,
}

fn default_backend_url() -> String {
    DEFAULT_BACKEND_URL.to_string()
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            backend_url: default_backend_url(),
            last_model_id: None,
            extra_audio_roots: Vec::new(),
            path: None,
        }
    }
}

impl Preferences {
    /// Load from the default location, falling back to defaults.
    pub fn load() -> Self {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => {
                log::warn!("Preferences: cannot determine config directory, using defaults");
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Self {
        let mut prefs = match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<Preferences>(&contents) {
                Ok(prefs) => {
                    log::info!("Preferences: loaded from {:?}", path);
                    prefs
                }
                Err(e) => {
                    log::warn!("Preferences: failed to parse {:?}: {}", path, e);
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        };
        prefs.path = Some(path.to_path_buf());
        prefs
    }

    pub fn save(&self) -> Result<(), String> {
        let path = match &self.path {
            Some(path) => path.clone(),
            None => Self::default_path().ok_or_else(|| "cannot determine config directory".to_string())?,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| format!("create dir: {}", e))?;
        }

        let json = serde_json::to_string_pretty(self).map_err(|e| format!("serialize: {}", e))?;
        std::fs::write(&path, json).map_err(|e| format!("write: {}", e))?;
        Ok(())
    }

    pub fn set_backend_url(&mut self, url: impl Into<String>) {
        self.backend_url = url.into();
        self.persist();
    }

    pub fn set_last_model_id(&mut self, model_id: Option<String>) {
        if self.last_model_id != model_id {
            self.last_model_id = model_id;
            self.persist();
        }
    }

    fn persist(&self) {
        if let Err(e) = self.save() {
            log::warn!("Preferences: failed to save: {}", e);
        }
    }

    /// `<config dir>/inference-studio/preferences.json`
    fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(APP_DIR_NAME).join(PREFERENCES_FILENAME))
    }
}
