//! Finds synthesized audio on the local filesystem.
//!
//! The backend answers text-to-speech requests with a path relative to its
//! own output directory. Where that lands locally depends on the platform,
//! so the locator tries an ordered list of roots and takes the first hit.

use std::path::{Path, PathBuf};

use studio_data::APP_DIR_NAME;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudioLocator {
    roots: Vec<PathBuf>,
}

impl AudioLocator {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }

    /// App data, cache, platform local data, then the executable's directory.
    pub fn platform_default() -> Self {
        let mut roots = Vec::new();
        if let Some(dir) = dirs::data_dir() {
            roots.push(dir.join(APP_DIR_NAME));
        }
        if let Some(dir) = dirs::cache_dir() {
            roots.push(dir.join(APP_DIR_NAME));
        }
        if let Some(dir) = dirs::data_local_dir() {
            roots.push(dir.join(APP_DIR_NAME));
        }
        if let Some(dir) = std::env::current_exe().ok().and_then(|exe| exe.parent().map(Path::to_path_buf)) {
            roots.push(dir);
        }
        Self { roots }
    }

    /// Appends roots searched after the built-in ones.
    pub fn with_extra_roots(mut self, extra: impl IntoIterator<Item = PathBuf>) -> Self {
        self.roots.extend(extra);
        self
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Every location probed for `audio_path`, in order.
    pub fn candidates(&self, audio_path: &str) -> Vec<PathBuf> {
        let relative = audio_path.trim_start_matches(['/', '\\']);
        self.roots.iter().map(|root| root.join(relative)).collect()
    }

    pub fn resolve(&self, audio_path: &str) -> Option<PathBuf> {
        let found = self.candidates(audio_path).into_iter().find(|c| c.is_file());
        match &found {
            Some(path) => log::debug!("audio {} resolved to {:?}", audio_path, path),
            None => log::debug!("audio {} not found under {} roots", audio_path, self.roots.len()),
        }
        found
    }
}
