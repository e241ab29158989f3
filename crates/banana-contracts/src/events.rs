//! Optional JSONL audit trail of one server session.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;

/// Everything the server records about a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    SessionStarted {
        model: String,
        output_dir: String,
    },
    ToolCallStarted {
        tool: String,
    },
    ArtifactCreated {
        tool: String,
        path: String,
    },
    ToolCallFinished {
        tool: String,
        is_error: bool,
        elapsed_ms: u64,
    },
    SessionFinished {
        replies: u64,
    },
}

impl SessionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SessionStarted { .. } => "session_started",
            Self::ToolCallStarted { .. } => "tool_call_started",
            Self::ArtifactCreated { .. } => "artifact_created",
            Self::ToolCallFinished { .. } => "tool_call_finished",
            Self::SessionFinished { .. } => "session_finished",
        }
    }
}

/// Appends [`SessionEvent`]s to a file, one compact JSON object per line,
/// each stamped with `session_id` and a UTC `ts`.
#[derive(Debug)]
pub struct EventWriter {
    path: PathBuf,
    session_id: String,
    file: Mutex<File>,
}

impl EventWriter {
    /// Opens `path` for appending, creating missing parent directories.
    pub fn open(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open event log {}", path.display()))?;
        Ok(Self {
            path,
            session_id: session_id.into(),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Writes one event and returns the row as written.
    pub fn record(&self, event: &SessionEvent) -> Result<Value> {
        let Value::Object(mut row) = serde_json::to_value(event)? else {
            bail!("{} did not encode as a JSON object", event.name());
        };
        row.insert("session_id".to_string(), json_string(&self.session_id));
        row.insert(
            "ts".to_string(),
            json_string(&Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)),
        );

        let mut line = serde_json::to_string(&row)?;
        line.push('\n');
        let mut file = self
            .file
            .lock()
            .map_err(|_| anyhow!("event log lock poisoned"))?;
        file.write_all(line.as_bytes())?;
        file.flush()?;
        Ok(Value::Object(row))
    }
}

fn json_string(value: &str) -> Value {
    Value::String(value.to_string())
}
