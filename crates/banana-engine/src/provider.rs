use std::collections::BTreeMap;

use anyhow::Result;

use crate::config::EngineConfig;
use crate::dryrun::DryrunProvider;
use crate::gemini::GeminiProvider;

/// Image bytes sent to the provider alongside the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderRequest {
    pub model: String,
    pub prompt: String,
    pub images: Vec<InlineImage>,
    pub aspect_ratio: Option<String>,
}

impl ProviderRequest {
    pub fn text(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            images: Vec::new(),
            aspect_ratio: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBytes {
    pub bytes: Vec<u8>,
    pub mime_type: Option<String>,
}

/// Everything the model sent back: concatenated text plus decoded images in
/// response order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderResponse {
    pub text: String,
    pub images: Vec<ImageBytes>,
    pub warnings: Vec<String>,
}

pub trait ImageProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Fails when the provider cannot serve requests at all, e.g. a missing key.
    fn check_ready(&self) -> Result<()> {
        Ok(())
    }

    fn generate(&self, request: &ProviderRequest) -> Result<ProviderResponse>;
}

#[derive(Default)]
pub struct ImageProviderRegistry {
    providers: BTreeMap<String, Box<dyn ImageProvider>>,
}

impl ImageProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<P: ImageProvider + 'static>(&mut self, provider: P) {
        self.providers
            .insert(provider.name().to_string(), Box::new(provider));
    }

    pub fn get(&self, name: &str) -> Option<&dyn ImageProvider> {
        self.providers.get(name).map(|provider| provider.as_ref())
    }

    pub fn names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }
}

pub fn default_provider_registry(config: &EngineConfig) -> ImageProviderRegistry {
    let mut providers = ImageProviderRegistry::new();
    providers.register(GeminiProvider::new(
        &config.gemini_api_base,
        config.transport,
    ));
    providers.register(DryrunProvider);
    providers
}
