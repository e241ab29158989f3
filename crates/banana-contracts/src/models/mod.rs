mod registry;
mod selectors;

pub use registry::{ModelRegistry, ModelSpec, CAPABILITY_EDIT, CAPABILITY_GENERATE};
pub use selectors::{ModelSelection, ModelSelector};
