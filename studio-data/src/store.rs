use serde_json::{Map, Value};

use crate::backend_client::BackendClient;
use crate::error::{InferenceError, InferenceResult};
use crate::model::Model;
use crate::preferences::Preferences;

/// Actions that can be dispatched to modify the Store
#[derive(Clone, Debug, Default, PartialEq)]
pub enum StoreAction {
    /// Replace the model list with a fresh library listing
    SetModels(Vec<Model>),
    /// Select the model the inference view works on (or clear it)
    SelectModel(Option<String>),
    /// The backend confirmed the model is loaded
    ModelLoaded(String),
    /// The backend confirmed the model is unloaded
    ModelUnloaded(String),
    /// The backend accepted a new configuration for the model
    ModelConfigured { model_id: String, config: Map<String, Value> },
    /// Point the client at another backend
    SetBackendUrl(String),
    /// No action
    #[default]
    None,
}

/// Central state container for the application
///
/// The Store owns the model list fetched from the backend library and the
/// persisted preferences. Views borrow models from it for the duration of a
/// session; mutations go through [`StoreAction`].
pub struct Store {
    /// User preferences (persisted to disk)
    pub preferences: Preferences,

    /// Client for the backend the preferences point at
    pub backend: BackendClient,

    /// Last library listing, with local load/unload/config updates applied
    pub models: Vec<Model>,

    /// The model_id currently selected for inference
    pub active_model: Option<String>,
}

impl Default for Store {
    fn default() -> Self {
        let preferences = Preferences::default();
        let backend = BackendClient::new(preferences.backend_url.clone());
        Self {
            preferences,
            backend,
            models: Vec::new(),
            active_model: None,
        }
    }
}

impl Store {
    /// Create a new Store by loading preferences from disk
    pub fn load() -> Self {
        Self::with_preferences(Preferences::load())
    }

    pub fn with_preferences(preferences: Preferences) -> Self {
        let backend = BackendClient::new(preferences.backend_url.clone());
        let active_model = preferences.last_model_id.clone();
        Self {
            preferences,
            backend,
            models: Vec::new(),
            active_model,
        }
    }

    pub fn get_model(&self, model_id: &str) -> Option<&Model> {
        self.models.iter().find(|m| m.model_id == model_id)
    }

    fn get_model_mut(&mut self, model_id: &str) -> Option<&mut Model> {
        self.models.iter_mut().find(|m| m.model_id == model_id)
    }

    pub fn active_model(&self) -> Option<&Model> {
        self.active_model.as_deref().and_then(|id| self.get_model(id))
    }

    // ── Backend round trips (blocking) ───────────────────────────────────────

    /// Fetch the library listing and replace the local model list.
    pub fn refresh_models(&mut self) -> InferenceResult<()> {
        let models = self.backend.list_models()?;
        log::info!("Store: {} models in library", models.len());
        self.handle_action(&StoreAction::SetModels(models));
        Ok(())
    }

    pub fn load_model(&mut self, model_id: &str) -> InferenceResult<()> {
        self.require_model(model_id)?;
        self.backend.load_model(model_id)?;
        self.handle_action(&StoreAction::ModelLoaded(model_id.to_string()));
        Ok(())
    }

    pub fn unload_model(&mut self, model_id: &str) -> InferenceResult<()> {
        self.require_model(model_id)?;
        self.backend.unload_model(model_id)?;
        self.handle_action(&StoreAction::ModelUnloaded(model_id.to_string()));
        Ok(())
    }

    pub fn configure_model(&mut self, model_id: &str, config: Map<String, Value>) -> InferenceResult<()> {
        self.require_model(model_id)?;
        self.backend.configure_model(model_id, &config)?;
        self.handle_action(&StoreAction::ModelConfigured {
            model_id: model_id.to_string(),
            config,
        });
        Ok(())
    }

    fn require_model(&self, model_id: &str) -> InferenceResult<()> {
        if self.get_model(model_id).is_none() {
            return Err(InferenceError::validation(format!("Unknown model '{}'", model_id)));
        }
        Ok(())
    }

    /// Handle a StoreAction and update state accordingly
    pub fn handle_action(&mut self, action: &StoreAction) {
        match action {
            StoreAction::SetModels(models) => {
                self.models = models.clone();
            }
            StoreAction::SelectModel(model_id) => {
                self.active_model = model_id.clone();
                self.preferences.set_last_model_id(model_id.clone());
            }
            StoreAction::ModelLoaded(model_id) => {
                if let Some(model) = self.get_model_mut(model_id) {
                    model.is_online = true;
                }
            }
            StoreAction::ModelUnloaded(model_id) => {
                if let Some(model) = self.get_model_mut(model_id) {
                    model.is_online = false;
                }
            }
            StoreAction::ModelConfigured { model_id, config } => {
                if let Some(model) = self.get_model_mut(model_id) {
                    model.config = config.clone();
                }
            }
            StoreAction::SetBackendUrl(url) => {
                self.preferences.set_backend_url(url.clone());
                self.backend = BackendClient::new(url.clone());
            }
            StoreAction::None => {}
        }
    }
}
