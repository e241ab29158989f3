use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::config::{gemini_api_key_from_env, TransportOptions};
use crate::provider::{ImageBytes, ImageProvider, ProviderRequest, ProviderResponse};
use crate::util::{push_unique_warning, truncate_text};

pub const SUPPORTED_ASPECT_RATIOS: [(&str, f64); 10] = [
    ("1:1", 1.0),
    ("2:3", 2.0 / 3.0),
    ("3:2", 3.0 / 2.0),
    ("3:4", 3.0 / 4.0),
    ("4:3", 4.0 / 3.0),
    ("4:5", 4.0 / 5.0),
    ("5:4", 5.0 / 4.0),
    ("9:16", 9.0 / 16.0),
    ("16:9", 16.0 / 9.0),
    ("21:9", 21.0 / 9.0),
];

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Google Generative Language `generateContent` transport.
pub struct GeminiProvider {
    api_base: String,
    api_key: Option<String>,
    transport: TransportOptions,
    http: HttpClient,
}

impl GeminiProvider {
    pub fn new(api_base: &str, transport: TransportOptions) -> Self {
        Self {
            api_base: api_base.trim().trim_end_matches('/').to_string(),
            api_key: gemini_api_key_from_env(),
            transport: transport.clamped(),
            http: HttpClient::new(),
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        self
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    fn build_payload(request: &ProviderRequest, warnings: &mut Vec<String>) -> Value {
        let mut parts = request
            .images
            .iter()
            .map(|image| {
                json!({
                    "inlineData": {
                        "mimeType": image.mime_type,
                        "data": BASE64.encode(&image.bytes),
                    }
                })
            })
            .collect::<Vec<Value>>();
        parts.push(json!({ "text": request.prompt }));

        let mut generation_config = Map::new();
        generation_config.insert(
            "responseModalities".to_string(),
            json!(["TEXT", "IMAGE"]),
        );
        if let Some(aspect_ratio) = request
            .aspect_ratio
            .as_deref()
            .and_then(|raw| normalize_aspect_ratio(raw, warnings))
        {
            generation_config.insert(
                "imageConfig".to_string(),
                json!({ "aspectRatio": aspect_ratio }),
            );
        }

        json!({
            "contents": [{
                "role": "user",
                "parts": parts,
            }],
            "generationConfig": generation_config,
        })
    }

    fn post_with_transport_retries(
        &self,
        endpoint: &str,
        api_key: &str,
        payload: &Value,
        warnings: &mut Vec<String>,
    ) -> Result<HttpResponse> {
        let max_retries = self.transport.retries;
        let mut attempt = 0;
        loop {
            let response = self
                .http
                .post(endpoint)
                .header(API_KEY_HEADER, api_key)
                .timeout(Duration::from_secs_f64(self.transport.request_timeout_s))
                .json(payload)
                .send();

            match response {
                Ok(ok) => return Ok(ok),
                Err(raw) => {
                    let err = anyhow::Error::new(raw.without_url())
                        .context(format!("Gemini request failed ({endpoint})"));
                    if !is_retryable_transport_error(&err) || attempt >= max_retries {
                        return Err(err);
                    }
                    attempt += 1;
                    warn!(
                        attempt = attempt,
                        max_retries = max_retries,
                        "retrying Gemini request after transport failure"
                    );
                    push_unique_warning(
                        warnings,
                        format!(
                            "Gemini transport retry {attempt}/{max_retries} after transient request failure."
                        ),
                    );
                    let delay_s = self.transport.retry_backoff_s * attempt as f64;
                    thread::sleep(Duration::from_secs_f64(delay_s));
                }
            }
        }
    }

    fn parse_response(response_payload: &Value) -> Result<ProviderResponse> {
        let candidates = response_payload
            .get("candidates")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let mut out = ProviderResponse::default();

        for candidate in candidates {
            let parts = candidate
                .get("content")
                .and_then(Value::as_object)
                .and_then(|content| content.get("parts"))
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            for part in parts {
                if let Some(text) = part
                    .get("text")
                    .and_then(Value::as_str)
                    .filter(|text| !text.is_empty())
                {
                    out.text.push_str(text);
                    continue;
                }
                let Some(inline) = part
                    .get("inlineData")
                    .or_else(|| part.get("inline_data"))
                    .and_then(Value::as_object)
                else {
                    continue;
                };
                let data = inline
                    .get("data")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                if data.is_empty() {
                    continue;
                }
                let bytes = BASE64
                    .decode(data.as_bytes())
                    .context("Gemini image base64 decode failed")?;
                let mime_type = inline
                    .get("mimeType")
                    .or_else(|| inline.get("mime_type"))
                    .and_then(Value::as_str)
                    .map(str::to_string);
                out.images.push(ImageBytes { bytes, mime_type });
            }
        }

        Ok(out)
    }
}

impl ImageProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn check_ready(&self) -> Result<()> {
        if self.api_key.is_none() {
            bail!("GEMINI_API_KEY or GOOGLE_API_KEY not set");
        }
        Ok(())
    }

    fn generate(&self, request: &ProviderRequest) -> Result<ProviderResponse> {
        let Some(api_key) = self.api_key.as_deref() else {
            bail!("GEMINI_API_KEY or GOOGLE_API_KEY not set");
        };
        let endpoint = self.endpoint_for_model(&request.model);
        let mut warnings = Vec::new();
        let payload = Self::build_payload(request, &mut warnings);
        debug!(
            model = %request.model,
            images = request.images.len(),
            "sending Gemini generateContent request"
        );

        let response =
            self.post_with_transport_retries(&endpoint, api_key, &payload, &mut warnings)?;
        let response_payload = response_json_or_error("Gemini", response)?;
        let mut parsed = Self::parse_response(&response_payload)?;
        if let Some(reason) = response_payload
            .get("promptFeedback")
            .and_then(|feedback| feedback.get("blockReason"))
            .and_then(Value::as_str)
        {
            push_unique_warning(&mut warnings, format!("Gemini blocked the prompt ({reason})."));
        }
        warnings.append(&mut parsed.warnings);
        parsed.warnings = warnings;
        Ok(parsed)
    }
}

/// Maps a caller-supplied ratio onto one Gemini accepts. Keywords and exact
/// ratios pass through; `WxH` and other `a:b` values snap to the closest
/// supported ratio. Unparseable input yields `None`.
pub fn normalize_aspect_ratio(raw: &str, warnings: &mut Vec<String>) -> Option<String> {
    let normalized = raw.trim().to_ascii_lowercase();
    if normalized.is_empty() {
        return None;
    }
    match normalized.as_str() {
        "square" => return Some("1:1".to_string()),
        "portrait" | "tall" => return Some("9:16".to_string()),
        "landscape" | "wide" => return Some("16:9".to_string()),
        _ => {}
    }

    let target_ratio = if let Some((left, right)) = parse_ratio(&normalized) {
        let direct = format!("{left}:{right}");
        if SUPPORTED_ASPECT_RATIOS
            .iter()
            .any(|(candidate, _)| *candidate == direct)
        {
            return Some(direct);
        }
        left as f64 / right as f64
    } else if let Some((width, height)) = parse_dims(&normalized) {
        width as f64 / height as f64
    } else {
        push_unique_warning(
            warnings,
            format!("Ignoring unrecognised aspect ratio '{}'.", raw.trim()),
        );
        return None;
    };

    let mut best_key = "1:1";
    let mut best_delta = f64::MAX;
    for (key, ratio) in SUPPORTED_ASPECT_RATIOS {
        let delta = (ratio - target_ratio).abs();
        if delta < best_delta {
            best_key = key;
            best_delta = delta;
        }
    }
    push_unique_warning(
        warnings,
        format!("Gemini aspect ratio snapped to {best_key}."),
    );
    Some(best_key.to_string())
}

fn parse_dims(raw: &str) -> Option<(u32, u32)> {
    let (left, right) = raw.split_once('x')?;
    let width = left.trim().parse::<u32>().ok()?;
    let height = right.trim().parse::<u32>().ok()?;
    if width == 0 || height == 0 {
        return None;
    }
    Some((width, height))
}

fn parse_ratio(raw: &str) -> Option<(u32, u32)> {
    let (left, right) = raw.split_once(':')?;
    let left = left.trim().parse::<u32>().ok()?;
    let right = right.trim().parse::<u32>().ok()?;
    if left == 0 || right == 0 {
        return None;
    }
    Some((left, right))
}

fn response_json_or_error(provider: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .with_context(|| format!("{provider} response body read failed"))?;
    if !status.is_success() {
        bail!(
            "{provider} request failed ({code}): {}",
            truncate_text(&body, 512)
        );
    }
    let parsed: Value = serde_json::from_str(&body)
        .with_context(|| format!("{provider} returned invalid JSON payload"))?;
    Ok(parsed)
}

fn is_retryable_transport_error(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<reqwest::Error>()
            .map(|reqwest_err| reqwest_err.is_timeout() || reqwest_err.is_connect())
            .unwrap_or(false)
    })
}
