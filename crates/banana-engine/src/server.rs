use std::io::{BufRead, Write};
use std::time::Instant;

use anyhow::{Context, Result};
use banana_contracts::events::{EventWriter, SessionEvent};
use banana_contracts::jsonrpc::{error_codes, JsonRpcRequest, JsonRpcResponse};
use banana_contracts::mcp::{CallToolParams, CallToolResult, InitializeResult, ListToolsResult};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::tools::{ImageTools, ToolError, ToolOutcome, EDIT_IMAGE, GENERATE_IMAGE};

type ToolFn = fn(&ImageTools, &Map<String, Value>) -> Result<ToolOutcome, ToolError>;

/// Line-delimited JSON-RPC front end for [`ImageTools`].
///
/// Requests are handled strictly one at a time; every reply is written and
/// flushed before the next line is read.
pub struct Server {
    tools: ImageTools,
    events: Option<EventWriter>,
}

impl Server {
    pub fn new(tools: ImageTools) -> Self {
        Self {
            tools,
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventWriter) -> Self {
        self.events = Some(events);
        self
    }

    pub fn tools(&self) -> &ImageTools {
        &self.tools
    }

    pub fn serve<R: BufRead, W: Write>(&self, mut reader: R, mut writer: W) -> Result<()> {
        self.record(SessionEvent::SessionStarted {
            model: self.tools.model().name.clone(),
            output_dir: self.tools.store().output_dir().display().to_string(),
        });
        info!(model = %self.tools.model().name, "serving MCP requests on stdio");

        let mut handled = 0u64;
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let read = reader
                .read_until(b'\n', &mut buf)
                .context("failed reading request line")?;
            if read == 0 {
                break;
            }
            let Ok(line) = std::str::from_utf8(&buf) else {
                warn!(bytes = read, "skipping request line that is not valid UTF-8");
                continue;
            };
            let Some(response) = self.handle_line(line) else {
                continue;
            };
            let encoded = match serde_json::to_string(&response) {
                Ok(encoded) => encoded,
                Err(err) => {
                    warn!(error = %err, "dropping reply that failed to serialize");
                    continue;
                }
            };
            writer
                .write_all(encoded.as_bytes())
                .and_then(|()| writer.write_all(b"\n"))
                .and_then(|()| writer.flush())
                .context("failed writing reply")?;
            handled += 1;
        }

        info!(replies = handled, "stdin closed; shutting down");
        self.record(SessionEvent::SessionFinished { replies: handled });
        Ok(())
    }

    /// Parses one input line. Blank lines and lines that are not JSON-RPC
    /// requests produce no reply.
    pub fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }
        let request = match serde_json::from_str::<JsonRpcRequest>(trimmed) {
            Ok(request) => request,
            Err(err) => {
                warn!(error = %err, "skipping malformed request line");
                return None;
            }
        };
        self.handle_request(&request)
    }

    pub fn handle_request(&self, request: &JsonRpcRequest) -> Option<JsonRpcResponse> {
        debug!(method = %request.method, "request received");
        if request.is_notification() {
            return None;
        }
        let id = request.id.clone();
        let response = match request.method.as_str() {
            "initialize" => success(id, &InitializeResult::current()),
            "ping" => JsonRpcResponse::success(id, json!({})),
            "tools/list" => success(
                id,
                &ListToolsResult {
                    tools: ImageTools::catalog(),
                },
            ),
            "tools/call" => self.handle_call_tool(id, &request.params),
            _ => JsonRpcResponse::failure(id, error_codes::METHOD_NOT_FOUND, "Method not found"),
        };
        Some(response)
    }

    fn handle_call_tool(&self, id: Option<Value>, params: &Value) -> JsonRpcResponse {
        let Ok(params) = serde_json::from_value::<CallToolParams>(params.clone()) else {
            return JsonRpcResponse::failure(id, error_codes::INVALID_PARAMS, "Invalid params");
        };
        let run: ToolFn = match params.name.as_str() {
            GENERATE_IMAGE => ImageTools::generate_image,
            EDIT_IMAGE => ImageTools::edit_image,
            other => {
                return JsonRpcResponse::failure(
                    id,
                    error_codes::METHOD_NOT_FOUND,
                    format!("Unknown tool: {other}"),
                )
            }
        };

        info!(tool = %params.name, "tool call started");
        self.record(SessionEvent::ToolCallStarted {
            tool: params.name.clone(),
        });
        let started = Instant::now();
        let result = match run(&self.tools, &params.arguments) {
            Ok(outcome) => {
                if let Some(path) = &outcome.saved_path {
                    self.record(SessionEvent::ArtifactCreated {
                        tool: params.name.clone(),
                        path: path.display().to_string(),
                    });
                }
                outcome.result
            }
            Err(err) => {
                warn!(tool = %params.name, error = %err, "tool call failed");
                CallToolResult::error(&err)
            }
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(tool = %params.name, is_error = result.is_error, elapsed_ms, "tool call finished");
        self.record(SessionEvent::ToolCallFinished {
            tool: params.name,
            is_error: result.is_error,
            elapsed_ms,
        });

        success(id, &result)
    }

    fn record(&self, event: SessionEvent) {
        let Some(events) = &self.events else {
            return;
        };
        if let Err(err) = events.record(&event) {
            warn!(event = event.name(), error = %err, "failed to append event");
        }
    }
}

fn success<T: Serialize>(id: Option<Value>, result: &T) -> JsonRpcResponse {
    match serde_json::to_value(result) {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(err) => JsonRpcResponse::failure(
            id,
            error_codes::INTERNAL_ERROR,
            format!("failed to encode result: {err}"),
        ),
    }
}
