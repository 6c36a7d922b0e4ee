pub mod backend_client;
pub mod error;
pub mod live_channel;
pub mod model;
pub mod preferences;
pub mod store;

pub use backend_client::{BackendClient, InferenceBackend, DEFAULT_BACKEND_URL};
pub use error::{InferenceError, InferenceResult};
pub use live_channel::{FrameChannel, LiveChannel};
pub use model::{Model, PipelineTag};
pub use preferences::{Preferences, APP_DIR_NAME};
pub use store::{Store, StoreAction};
