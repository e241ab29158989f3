use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

pub mod error_codes {
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default)]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl JsonRpcRequest {
    /// Notifications never get a reply, whatever their id says.
    pub fn is_notification(&self) -> bool {
        self.method.starts_with("notifications/")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id: id.filter(|value| !value.is_null()),
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id: id.filter(|value| !value.is_null()),
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::{error_codes, JsonRpcRequest, JsonRpcResponse};

    #[test]
    fn request_defaults_missing_params_and_id() -> anyhow::Result<()> {
        let request: JsonRpcRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"tools/list"}"#)?;
        assert_eq!(request.id, None);
        assert_eq!(request.params, Value::Null);
        assert!(!request.is_notification());
        Ok(())
    }

    #[test]
    fn missing_method_parses_as_empty() -> anyhow::Result<()> {
        let request: JsonRpcRequest = serde_json::from_str(r#"{"jsonrpc":"2.0","id":7}"#)?;
        assert_eq!(request.method, "");
        assert_eq!(request.id, Some(Value::from(7)));
        assert!(!request.is_notification());
        Ok(())
    }

    #[test]
    fn notifications_namespace_is_detected() -> anyhow::Result<()> {
        let request: JsonRpcRequest = serde_json::from_str(
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
        )?;
        assert!(request.is_notification());
        Ok(())
    }

    #[test]
    fn success_omits_error_and_keeps_string_ids() -> anyhow::Result<()> {
        let response = JsonRpcResponse::success(Some(json!("abc")), json!({"ok": true}));
        let encoded = serde_json::to_value(&response)?;
        assert_eq!(
            encoded,
            json!({"jsonrpc": "2.0", "id": "abc", "result": {"ok": true}})
        );
        Ok(())
    }

    #[test]
    fn failure_without_id_omits_id_field() -> anyhow::Result<()> {
        let response =
            JsonRpcResponse::failure(None, error_codes::METHOD_NOT_FOUND, "Method not found");
        let encoded = serde_json::to_string(&response)?;
        assert_eq!(
            encoded,
            r#"{"jsonrpc":"2.0","error":{"code":-32601,"message":"Method not found"}}"#
        );
        Ok(())
    }

    #[test]
    fn explicit_null_id_is_treated_as_absent() -> anyhow::Result<()> {
        let response = JsonRpcResponse::success(Some(Value::Null), json!({}));
        let encoded = serde_json::to_value(&response)?;
        assert!(encoded.get("id").is_none());
        Ok(())
    }
}
