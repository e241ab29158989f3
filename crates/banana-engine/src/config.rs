use std::env;
use std::path::PathBuf;

use crate::util::non_empty_env;

pub const DEFAULT_OUTPUT_DIR: &str = "generated";
pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Per-request HTTP behaviour for the outbound image call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransportOptions {
    pub request_timeout_s: f64,
    pub retries: usize,
    pub retry_backoff_s: f64,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            request_timeout_s: 90.0,
            retries: 0,
            retry_backoff_s: 1.2,
        }
    }
}

impl TransportOptions {
    pub fn clamped(self) -> Self {
        let request_timeout_s = if self.request_timeout_s.is_finite() {
            self.request_timeout_s.clamp(15.0, 300.0)
        } else {
            Self::default().request_timeout_s
        };
        let retry_backoff_s = if self.retry_backoff_s.is_finite() {
            self.retry_backoff_s.clamp(0.1, 10.0)
        } else {
            Self::default().retry_backoff_s
        };
        Self {
            request_timeout_s,
            retries: self.retries.min(4),
            retry_backoff_s,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub output_dir: PathBuf,
    pub model: Option<String>,
    pub gemini_api_base: String,
    pub transport: TransportOptions,
}

impl EngineConfig {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            model: None,
            gemini_api_base: gemini_api_base_from_env(),
            transport: TransportOptions::default(),
        }
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        self
    }

    pub fn with_transport(mut self, transport: TransportOptions) -> Self {
        self.transport = transport.clamped();
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new(DEFAULT_OUTPUT_DIR)
    }
}

fn gemini_api_base_from_env() -> String {
    env::var("GEMINI_API_BASE")
        .ok()
        .map(|value| value.trim().trim_end_matches('/').to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_GEMINI_API_BASE.to_string())
}

pub(crate) fn gemini_api_key_from_env() -> Option<String> {
    non_empty_env("GEMINI_API_KEY").or_else(|| non_empty_env("GOOGLE_API_KEY"))
}

#[cfg(test)]
mod tests {
    use super::{EngineConfig, TransportOptions};

    #[test]
    fn transport_options_clamp_to_supported_ranges() {
        let clamped = TransportOptions {
            request_timeout_s: 1.0,
            retries: 12,
            retry_backoff_s: 99.0,
        }
        .clamped();
        assert_eq!(clamped.request_timeout_s, 15.0);
        assert_eq!(clamped.retries, 4);
        assert_eq!(clamped.retry_backoff_s, 10.0);

        let nan = TransportOptions {
            request_timeout_s: f64::NAN,
            retries: 0,
            retry_backoff_s: f64::INFINITY,
        }
        .clamped();
        assert_eq!(nan, TransportOptions::default());
    }

    #[test]
    fn blank_model_is_treated_as_unset() {
        let config = EngineConfig::new("out").with_model(Some("   ".to_string()));
        assert_eq!(config.model, None);
        let config = EngineConfig::new("out").with_model(Some(" dryrun-image-1 ".to_string()));
        assert_eq!(config.model.as_deref(), Some("dryrun-image-1"));
    }
}
