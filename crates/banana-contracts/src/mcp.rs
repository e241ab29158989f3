//! MCP payloads carried inside JSON-RPC `result` objects.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "nano-banana-mcp";
pub const SERVER_VERSION: &str = "2.0.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub protocol_version: String,
    pub capabilities: Capabilities,
    pub server_info: ServerInfo,
}

impl InitializeResult {
    pub fn current() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: Capabilities {
                tools: Some(ToolsCapability {}),
            },
            server_info: ServerInfo {
                name: SERVER_NAME.to_string(),
                version: SERVER_VERSION.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsCapability>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolsCapability {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: InputSchema,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSchema {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, SchemaProperty>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
}

impl InputSchema {
    pub fn object() -> Self {
        Self {
            kind: "object".to_string(),
            properties: BTreeMap::new(),
            required: Vec::new(),
        }
    }

    pub fn string_property(mut self, name: &str, description: &str, required: bool) -> Self {
        self.properties.insert(
            name.to_string(),
            SchemaProperty {
                kind: "string".to_string(),
                description: description.to_string(),
            },
        );
        if required {
            self.required.push(name.to_string());
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaProperty {
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListToolsResult {
    pub tools: Vec<ToolDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CallToolParams {
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_empty_map")]
    pub arguments: Map<String, Value>,
}

fn null_as_empty_map<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallToolResult {
    pub content: Vec<Content>,
    #[serde(
        rename = "isError",
        default,
        skip_serializing_if = "std::ops::Not::not"
    )]
    pub is_error: bool,
}

impl CallToolResult {
    pub fn new(content: Vec<Content>) -> Self {
        Self {
            content,
            is_error: false,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(vec![Content::text(text)])
    }

    /// Tool-level failure: reported inside a successful JSON-RPC reply.
    pub fn error(message: impl std::fmt::Display) -> Self {
        Self {
            content: vec![Content::text(format!("Error: {message}"))],
            is_error: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Content {
    Text {
        text: String,
    },
    Image {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
}

impl Content {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn image(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self::Image {
            data: data.into(),
            mime_type: mime_type.into(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text.as_str()),
            Self::Image { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn initialize_result_uses_mcp_field_names() -> anyhow::Result<()> {
        let encoded = serde_json::to_value(InitializeResult::current())?;
        assert_eq!(
            encoded,
            json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {"tools": {}},
                "serverInfo": {"name": "nano-banana-mcp", "version": "2.0.0"},
            })
        );
        Ok(())
    }

    #[test]
    fn schema_builder_tracks_required_fields() -> anyhow::Result<()> {
        let schema = InputSchema::object()
            .string_property("prompt", "Text", true)
            .string_property("aspect_ratio", "Ratio", false);
        let encoded = serde_json::to_value(&schema)?;
        assert_eq!(encoded["type"], json!("object"));
        assert_eq!(encoded["required"], json!(["prompt"]));
        assert_eq!(encoded["properties"]["prompt"]["type"], json!("string"));
        assert_eq!(
            encoded["properties"]["aspect_ratio"]["description"],
            json!("Ratio")
        );
        Ok(())
    }

    #[test]
    fn call_params_accept_null_or_missing_arguments() -> anyhow::Result<()> {
        let missing: CallToolParams = serde_json::from_value(json!({"name": "generate_image"}))?;
        assert!(missing.arguments.is_empty());
        let null: CallToolParams =
            serde_json::from_value(json!({"name": "generate_image", "arguments": null}))?;
        assert!(null.arguments.is_empty());
        assert!(serde_json::from_value::<CallToolParams>(json!("nope")).is_err());
        Ok(())
    }

    #[test]
    fn call_result_omits_is_error_when_false() -> anyhow::Result<()> {
        let ok = serde_json::to_value(CallToolResult::new(vec![
            Content::text("hello"),
            Content::image("AAAA", "image/png"),
        ]))?;
        assert_eq!(
            ok,
            json!({
                "content": [
                    {"type": "text", "text": "hello"},
                    {"type": "image", "data": "AAAA", "mimeType": "image/png"},
                ]
            })
        );

        let failed = serde_json::to_value(CallToolResult::error("prompt is required"))?;
        assert_eq!(failed["isError"], json!(true));
        assert_eq!(
            failed["content"][0]["text"],
            json!("Error: prompt is required")
        );
        Ok(())
    }
}
