use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use banana_contracts::mcp::{CallToolResult, Content, InputSchema, ToolDescriptor};
use banana_contracts::models::{ModelSelector, ModelSpec, CAPABILITY_GENERATE};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::provider::{
    default_provider_registry, ImageBytes, ImageProvider, ImageProviderRegistry, InlineImage,
    ProviderRequest,
};
use crate::storage::{clean_image_path, mime_for_path, ImageStore, PathTraversal};
use crate::util::error_chain_text;

pub const GENERATE_IMAGE: &str = "generate_image";
pub const EDIT_IMAGE: &str = "edit_image";

const ERROR_TEXT_MAX_CHARS: usize = 1024;

/// Failures surfaced to the MCP client as `isError` tool results.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{0} is required")]
    MissingArgument(&'static str),
    #[error(transparent)]
    Traversal(#[from] PathTraversal),
    #[error("failed to read image: {0}")]
    ReadImage(#[source] std::io::Error),
    #[error("API request failed: {0}")]
    Api(String),
    #[error("failed to save image: {0}")]
    Save(String),
}

/// A finished tool call plus the artifact it wrote, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    pub result: CallToolResult,
    pub saved_path: Option<PathBuf>,
}

impl ToolOutcome {
    fn text_only(text: String) -> Self {
        Self {
            result: CallToolResult::text(text),
            saved_path: None,
        }
    }
}

/// The two image tools, bound to one model and one output directory.
pub struct ImageTools {
    providers: ImageProviderRegistry,
    model: ModelSpec,
    store: ImageStore,
}

impl ImageTools {
    pub fn new(providers: ImageProviderRegistry, model: ModelSpec, store: ImageStore) -> Self {
        Self {
            providers,
            model,
            store,
        }
    }

    /// Selects the model, builds the provider registry and verifies the chosen
    /// provider can serve requests.
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let selection = ModelSelector::new(None)
            .select(config.model.as_deref(), CAPABILITY_GENERATE)
            .map_err(|err| anyhow!(err))?;
        if let Some(reason) = selection.fallback_reason.as_deref() {
            if selection.requested.is_some() {
                warn!(model = %selection.model.name, "{reason}");
            } else {
                info!(model = %selection.model.name, "{reason}");
            }
        }

        let tools = Self::new(
            default_provider_registry(config),
            selection.model,
            ImageStore::new(&config.output_dir),
        );
        tools.provider()?.check_ready().with_context(|| {
            format!("{} provider is not ready", tools.model.provider)
        })?;
        Ok(tools)
    }

    pub fn model(&self) -> &ModelSpec {
        &self.model
    }

    pub fn store(&self) -> &ImageStore {
        &self.store
    }

    pub fn catalog() -> Vec<ToolDescriptor> {
        let aspect_ratio = "Optional aspect ratio such as 1:1, 16:9, portrait or 1024x768";
        vec![
            ToolDescriptor {
                name: GENERATE_IMAGE.to_string(),
                description: "Generate a new image from a text prompt using Google Gemini"
                    .to_string(),
                input_schema: InputSchema::object()
                    .string_property(
                        "prompt",
                        "Text description of the image to generate",
                        true,
                    )
                    .string_property("aspect_ratio", aspect_ratio, false),
            },
            ToolDescriptor {
                name: EDIT_IMAGE.to_string(),
                description: "Edit an existing image using a text prompt".to_string(),
                input_schema: InputSchema::object()
                    .string_property("image_path", "Path to the image file to edit", true)
                    .string_property("prompt", "Text description of the edits to make", true)
                    .string_property("aspect_ratio", aspect_ratio, false),
            },
        ]
    }

    pub fn generate_image(&self, args: &Map<String, Value>) -> Result<ToolOutcome, ToolError> {
        let prompt = required_string(args, "prompt")?;
        let mut request = ProviderRequest::text(&self.model.name, prompt);
        request.aspect_ratio = optional_string(args, "aspect_ratio");

        let (text, image) = self.call_provider(&request)?;
        let Some(image) = image else {
            return Ok(ToolOutcome::text_only(no_image_message(
                "No image was generated.",
                &text,
            )));
        };
        self.finish(image, "generated", |path| {
            format!(
                "Image generated and saved to: {}\n\nPrompt: {prompt}",
                path.display()
            )
        })
    }

    pub fn edit_image(&self, args: &Map<String, Value>) -> Result<ToolOutcome, ToolError> {
        let image_path = required_string(args, "image_path")?;
        let prompt = required_string(args, "prompt")?;
        let clean_path = clean_image_path(image_path)?;
        let bytes = fs::read(&clean_path).map_err(ToolError::ReadImage)?;

        let mut request = ProviderRequest::text(&self.model.name, prompt);
        request.images.push(InlineImage {
            mime_type: mime_for_path(&clean_path).to_string(),
            bytes,
        });
        request.aspect_ratio = optional_string(args, "aspect_ratio");

        let (text, image) = self.call_provider(&request)?;
        let Some(image) = image else {
            return Ok(ToolOutcome::text_only(no_image_message(
                "No edited image was generated.",
                &text,
            )));
        };
        self.finish(image, "edited", |path| {
            format!(
                "Image edited and saved to: {}\n\nOriginal: {image_path}\nPrompt: {prompt}",
                path.display()
            )
        })
    }

    fn provider(&self) -> Result<&dyn ImageProvider> {
        self.providers
            .get(&self.model.provider)
            .ok_or_else(|| anyhow!("no image provider registered for '{}'", self.model.provider))
    }

    /// Runs the single outbound call. The last image in the response wins.
    fn call_provider(
        &self,
        request: &ProviderRequest,
    ) -> Result<(String, Option<ImageBytes>), ToolError> {
        let api_error =
            |err: anyhow::Error| ToolError::Api(error_chain_text(&err, ERROR_TEXT_MAX_CHARS));
        let provider = self.provider().map_err(api_error)?;
        let mut response = provider.generate(request).map_err(api_error)?;
        for warning in &response.warnings {
            warn!(provider = provider.name(), "{warning}");
        }
        let image = response.images.pop();
        Ok((response.text, image))
    }

    fn finish(
        &self,
        image: ImageBytes,
        prefix: &str,
        describe: impl FnOnce(&Path) -> String,
    ) -> Result<ToolOutcome, ToolError> {
        let mime_type = image
            .mime_type
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| "image/png".to_string());
        let path = self
            .store
            .save(&image.bytes, prefix, &mime_type)
            .map_err(|err| ToolError::Save(error_chain_text(&err, ERROR_TEXT_MAX_CHARS)))?;
        info!(path = %path.display(), bytes = image.bytes.len(), "saved image");

        let result = CallToolResult::new(vec![
            Content::text(describe(&path)),
            Content::image(BASE64.encode(&image.bytes), mime_type),
        ]);
        Ok(ToolOutcome {
            result,
            saved_path: Some(path),
        })
    }
}

fn no_image_message(base: &str, model_text: &str) -> String {
    if model_text.is_empty() {
        return base.to_string();
    }
    format!("{base}\n\nModel response: {model_text}")
}

fn required_string<'a>(
    args: &'a Map<String, Value>,
    key: &'static str,
) -> Result<&'a str, ToolError> {
    args.get(key)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
        .ok_or(ToolError::MissingArgument(key))
}

fn optional_string(args: &Map<String, Value>, key: &str) -> Option<String> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
