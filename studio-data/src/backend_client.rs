//! Blocking client for the inference backend REST endpoints.
//!
//! All requests go to the backend base URL (default `http://127.0.0.1:8000`):
//!
//!   POST /model/inference      → `{message, data}` for one inference call
//!   POST /model/process-image  → annotated image for vision results
//!   GET  /model/library        → every model the backend knows about
//!   POST /model/load           → load a model into memory
//!   POST /model/unload         → free the model
//!   POST /model/config         → replace a model's configuration
//!
//! Calls block the calling thread. Run them inside `std::thread::spawn`.

use serde::Deserialize;
use serde_json::{json, Map, Value};
use url::Url;

use crate::error::{InferenceError, InferenceResult};
use crate::live_channel::{FrameChannel, LiveChannel};
use crate::model::Model;

pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:8000";

const INFERENCE_TIMEOUT_SECS: u64 = 300;
const LIBRARY_TIMEOUT_SECS: u64 = 30;

/// The remote side of an inference invocation.
///
/// Implemented by [`BackendClient`]; tests substitute their own.
pub trait InferenceBackend: Send + Sync {
    /// `POST /model/inference` and return the `data` field of the reply.
    fn infer(&self, model_id: &str, data: &Value) -> InferenceResult<Value>;

    /// `POST /model/process-image` for a finished vision result.
    fn process_image(&self, image_path: &str, output: &Value, task: &str) -> InferenceResult<Value>;

    /// Open the per-frame live prediction channel for a model.
    fn open_live(&self, model_id: &str) -> InferenceResult<Box<dyn FrameChannel>>;
}

// ─── Deserialisation helpers ──────────────────────────────────────────────────

#[derive(Deserialize)]
struct InferenceReply {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Value,
}

// ─── Client ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct BackendClient {
    base_url: String,
}

impl BackendClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut url = base_url.into();
        while url.ends_with('/') {
            url.pop();
        }
        Self { base_url: url }
    }

    pub fn localhost() -> Self {
        Self::new(DEFAULT_BACKEND_URL)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `ws://<host>/ws/predict-live/{model_id}` derived from the base URL.
    pub fn live_url(&self, model_id: &str) -> InferenceResult<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| InferenceError::network(format!("invalid backend URL: {}", e)))?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|_| InferenceError::network("cannot derive WebSocket URL"))?;
        url.set_path(&format!("ws/predict-live/{}", model_id));
        Ok(url)
    }

    // ── Library ──────────────────────────────────────────────────────────────

    /// `GET /model/library`
    pub fn list_models(&self) -> InferenceResult<Vec<Model>> {
        let client = self.client(LIBRARY_TIMEOUT_SECS)?;
        let url = format!("{}/model/library", self.base_url);
        let resp = client.get(&url).send()?;

        if !resp.status().is_success() {
            return Err(InferenceError::network(format!("GET /model/library HTTP {}", resp.status())));
        }

        let value: Value = resp
            .json()
            .map_err(|e| InferenceError::format(format!("library reply is not JSON: {}", e)))?;
        parse_model_list(value)
    }

    /// `POST /model/load`
    pub fn load_model(&self, model_id: &str) -> InferenceResult<()> {
        self.post_expect_ok("/model/load", &json!({ "model_id": model_id }))
    }

    /// `POST /model/unload`
    pub fn unload_model(&self, model_id: &str) -> InferenceResult<()> {
        self.post_expect_ok("/model/unload", &json!({ "model_id": model_id }))
    }

    /// `POST /model/config`
    pub fn configure_model(&self, model_id: &str, config: &Map<String, Value>) -> InferenceResult<()> {
        self.post_expect_ok("/model/config", &json!({ "model_id": model_id, "config": config }))
    }

    // ── Internal ─────────────────────────────────────────────────────────────

    fn post_expect_ok(&self, path: &str, body: &Value) -> InferenceResult<()> {
        let client = self.client(LIBRARY_TIMEOUT_SECS)?;
        let url = format!("{}{}", self.base_url, path);
        let resp = client.post(&url).json(body).send()?;

        if resp.status().is_success() {
            Ok(())
        } else {
            let status = resp.status();
            let text = resp.text().unwrap_or_default();
            Err(InferenceError::network(format!("POST {} HTTP {}: {}", path, status, text.trim())))
        }
    }

    fn client(&self, timeout_secs: u64) -> InferenceResult<reqwest::blocking::Client> {
        reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(InferenceError::from)
    }
}

impl InferenceBackend for BackendClient {
    fn infer(&self, model_id: &str, data: &Value) -> InferenceResult<Value> {
        let client = self.client(INFERENCE_TIMEOUT_SECS)?;
        let url = format!("{}/model/inference", self.base_url);
        let body = json!({ "model_id": model_id, "data": data });
        let resp = client.post(&url).json(&body).send()?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().unwrap_or_default();
            return Err(InferenceError::network(format!("Inference failed (HTTP {}): {}", status, text.trim())));
        }

        let reply: InferenceReply = resp
            .json()
            .map_err(|e| InferenceError::format(format!("inference reply is not JSON: {}", e)))?;
        if let Some(message) = &reply.message {
            log::debug!("inference reply for {}: {}", model_id, message);
        }
        Ok(reply.data)
    }

    fn process_image(&self, image_path: &str, output: &Value, task: &str) -> InferenceResult<Value> {
        let client = self.client(INFERENCE_TIMEOUT_SECS)?;
        let url = format!("{}/model/process-image", self.base_url);
        let body = json!({ "image_path": image_path, "output": output, "task": task });
        let resp = client.post(&url).json(&body).send()?;

        if !resp.status().is_success() {
            return Err(InferenceError::network(format!("POST /model/process-image HTTP {}", resp.status())));
        }
        resp.json()
            .map_err(|e| InferenceError::format(format!("process-image reply is not JSON: {}", e)))
    }

    fn open_live(&self, model_id: &str) -> InferenceResult<Box<dyn FrameChannel>> {
        let url = self.live_url(model_id)?;
        Ok(Box::new(LiveChannel::connect(url)?))
    }
}

/// Accepts `{"data": [...]}`, `{"models": [...]}` and a bare `[...]`.
fn parse_model_list(value: Value) -> InferenceResult<Vec<Model>> {
    let entries = match value {
        Value::Array(arr) => arr,
        Value::Object(mut obj) => match obj.remove("data").or_else(|| obj.remove("models")) {
            Some(Value::Array(arr)) => arr,
            _ => return Err(InferenceError::format("library response has no model list")),
        },
        _ => return Err(InferenceError::format("library response is not a list")),
    };

    let mut models = Vec::with_capacity(entries.len());
    for entry in entries {
        match serde_json::from_value::<Model>(entry) {
            Ok(model) => models.push(model),
            Err(e) => log::warn!("skipping malformed library entry: {}", e),
        }
    }
    Ok(models)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PipelineTag;

    #[test]
    fn test_trailing_slashes_are_trimmed() {
        let client = BackendClient::new("http://localhost:8000//");
        assert_eq!(client.base_url(), "http://localhost:8000");
    }

    #[test]
    fn test_live_url() {
        let client = BackendClient::localhost();
        let url = client.live_url("detr").unwrap();
        assert_eq!(url.as_str(), "ws://127.0.0.1:8000/ws/predict-live/detr");

        let secure = BackendClient::new("https://models.example.org");
        assert_eq!(secure.live_url("yolo").unwrap().scheme(), "wss");
    }

    #[test]
    fn test_parse_model_list_shapes() {
        let entry = json!({ "model_id": "t5-small", "pipeline_tag": "translation", "is_online": true });

        let bare = parse_model_list(json!([entry.clone()])).unwrap();
        let wrapped = parse_model_list(json!({ "models": [entry.clone()] })).unwrap();
        let data = parse_model_list(json!({ "data": [entry] })).unwrap();

        for models in [bare, wrapped, data] {
            assert_eq!(models.len(), 1);
            assert_eq!(models[0].pipeline_tag, PipelineTag::Translation);
            assert!(models[0].is_online);
        }
    }

    #[test]
    fn test_parse_model_list_skips_malformed_entries() {
        let models = parse_model_list(json!([{ "pipeline_tag": "translation" }, { "model_id": "ok" }])).unwrap();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].model_id, "ok");
    }

    #[test]
    fn test_parse_model_list_keeps_models_with_null_tag() {
        let models = parse_model_list(json!([{ "model_id": "m", "pipeline_tag": null }])).unwrap();
        assert_eq!(models.len(), 1);
        assert!(!models[0].pipeline_tag.is_supported());
    }

    #[test]
    fn test_parse_model_list_rejects_scalars() {
        let err = parse_model_list(json!("nope")).unwrap_err();
        assert_eq!(err.kind(), "format");
    }
}
