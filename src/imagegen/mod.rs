pub mod config;
pub mod gemini;
pub mod interface;
pub mod qwen;

pub use config::{BackendConfig, BackendSystemConfig};
pub use gemini::GeminiBackend;
pub use interface::{
    Artifact, BackendError, Concurrency, DispatchProfile, GenerationRequest, ImageBackend,
};
pub use qwen::QwenBackend;
