use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use chrono::Utc;
use serde_json::{Value, json};
use tracing::warn;

use crate::diff::diff_json;
use crate::protocol::{MessageType, Request, Response};

/// How responses are written to the message log. Requests and commands are
/// always logged in full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageLogMode {
    Full,
    /// First response of each message type in full, later ones as a list of
    /// changed fields.
    Diffed,
}

/// Appends one JSON object per line for every frame exchanged with the
/// controller.
pub(crate) struct MessageLogger {
    mode: MessageLogMode,
    file: File,
    previous: HashMap<MessageType, Value>,
}

impl MessageLogger {
    pub fn new(mode: MessageLogMode, path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            mode,
            file,
            previous: HashMap::new(),
        })
    }

    pub fn log_request(&mut self, request: &Request) {
        let entry = json!({
            "ts": Utc::now().to_rfc3339(),
            "dir": "req",
            "id": request.message_id(),
            "type": request.message_type().as_str(),
            "hex": request.to_hex(),
        });
        self.write_line(&entry);
    }

    pub fn log_command(&mut self, action: &str, target: Option<u8>, request: &Request) {
        let entry = json!({
            "ts": Utc::now().to_rfc3339(),
            "dir": "cmd",
            "action": action,
            "target": target,
            "id": request.message_id(),
            "hex": request.to_hex(),
        });
        self.write_line(&entry);
    }

    pub fn log_response(&mut self, response: &Response) {
        let body = match serde_json::to_value(&response.payload) {
            Ok(body) => body,
            Err(e) => {
                warn!("failed to serialize response payload: {e}");
                return;
            }
        };
        let ts = Utc::now().to_rfc3339();
        let kind = response.message_type.as_str();

        let entry = match (self.mode, self.previous.get(&response.message_type)) {
            (MessageLogMode::Diffed, Some(prev)) => {
                let mut changes = Vec::new();
                diff_json(prev, &body, "", &mut changes);
                let changes: Vec<Value> = changes
                    .into_iter()
                    .map(|(path, old, new)| json!({ "path": path, "old": old, "new": new }))
                    .collect();
                json!({
                    "ts": ts,
                    "dir": "resp",
                    "id": response.message_id,
                    "type": kind,
                    "changes": changes,
                })
            }
            (MessageLogMode::Diffed, None) => json!({
                "ts": ts,
                "dir": "resp",
                "id": response.message_id,
                "type": kind,
                "full": true,
                "body": body,
            }),
            (MessageLogMode::Full, _) => json!({
                "ts": ts,
                "dir": "resp",
                "id": response.message_id,
                "type": kind,
                "body": body,
            }),
        };
        self.write_line(&entry);

        if self.mode == MessageLogMode::Diffed {
            self.previous.insert(response.message_type, body);
        }
    }

    fn write_line(&mut self, entry: &Value) {
        if let Ok(line) = serde_json::to_string(entry)
            && let Err(e) = writeln!(self.file, "{line}")
        {
            warn!("failed to write log entry: {e}");
        }
    }
}
