mod config;
mod dryrun;
mod gemini;
mod provider;
mod server;
mod storage;
mod tools;
mod util;

pub use config::{EngineConfig, TransportOptions, DEFAULT_GEMINI_API_BASE, DEFAULT_OUTPUT_DIR};
pub use dryrun::DryrunProvider;
pub use gemini::{normalize_aspect_ratio, GeminiProvider, SUPPORTED_ASPECT_RATIOS};
pub use provider::{
    default_provider_registry, ImageBytes, ImageProvider, ImageProviderRegistry, InlineImage,
    ProviderRequest, ProviderResponse,
};
pub use server::Server;
pub use storage::{clean_image_path, extension_for_mime, mime_for_path, ImageStore, PathTraversal};
pub use tools::{ImageTools, ToolError, ToolOutcome, EDIT_IMAGE, GENERATE_IMAGE};
