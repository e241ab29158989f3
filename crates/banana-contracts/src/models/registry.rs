use indexmap::IndexMap;

pub const CAPABILITY_GENERATE: &str = "image";
pub const CAPABILITY_EDIT: &str = "edit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: String,
    pub provider: String,
    pub capabilities: Vec<String>,
}

impl ModelSpec {
    pub fn new(name: &str, provider: &str, capabilities: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            provider: provider.to_string(),
            capabilities: capabilities
                .iter()
                .map(|item| (*item).to_string())
                .collect(),
        }
    }

    pub fn supports(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|item| item == capability)
    }
}

/// Image models known to the server, in preference order.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: IndexMap<String, ModelSpec>,
}

impl ModelRegistry {
    pub fn new(models: Option<IndexMap<String, ModelSpec>>) -> Self {
        Self {
            models: models.unwrap_or_else(default_models),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.models.get(name)
    }

    pub fn list(&self) -> impl Iterator<Item = &ModelSpec> {
        self.models.values()
    }

    pub fn by_capability(&self, capability: &str) -> Vec<ModelSpec> {
        self.models
            .values()
            .filter(|model| model.supports(capability))
            .cloned()
            .collect()
    }

    pub fn ensure(&self, name: &str, capability: &str) -> Option<ModelSpec> {
        let model = self.get(name)?;
        if model.supports(capability) {
            return Some(model.clone());
        }
        None
    }
}

fn default_models() -> IndexMap<String, ModelSpec> {
    let both = [CAPABILITY_GENERATE, CAPABILITY_EDIT];
    [
        ModelSpec::new("gemini-2.5-flash-image", "gemini", &both),
        ModelSpec::new("gemini-3-pro-image-preview", "gemini", &both),
        ModelSpec::new("dryrun-image-1", "dryrun", &both),
    ]
    .into_iter()
    .map(|spec| (spec.name.clone(), spec))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::{ModelRegistry, CAPABILITY_EDIT, CAPABILITY_GENERATE};

    #[test]
    fn default_registry_prefers_flash_image() {
        let registry = ModelRegistry::new(None);
        let first = registry.list().next().map(|model| model.name.clone());
        assert_eq!(first.as_deref(), Some("gemini-2.5-flash-image"));
    }

    #[test]
    fn every_default_model_can_generate_and_edit() {
        let registry = ModelRegistry::new(None);
        for model in registry.list() {
            assert!(model.supports(CAPABILITY_GENERATE), "{}", model.name);
            assert!(model.supports(CAPABILITY_EDIT), "{}", model.name);
        }
        assert_eq!(
            registry
                .get("dryrun-image-1")
                .map(|model| model.provider.as_str()),
            Some("dryrun")
        );
    }

    #[test]
    fn ensure_rejects_missing_capability() {
        let registry = ModelRegistry::new(None);
        assert!(registry
            .ensure("gemini-2.5-flash-image", "video")
            .is_none());
        assert!(registry.ensure("unknown", CAPABILITY_GENERATE).is_none());
    }
}
