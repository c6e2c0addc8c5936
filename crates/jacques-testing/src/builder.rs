//! Programmatic transcript log construction for tests.

use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use std::path::Path;

/// Builds a newline-delimited JSON transcript, one record per call, with
/// monotonically increasing timestamps.
pub struct TranscriptBuilder {
    session_id: String,
    lines: Vec<String>,
    clock: DateTime<Utc>,
    counter: usize,
}

impl TranscriptBuilder {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            lines: Vec::new(),
            clock: "2025-05-01T10:00:00Z".parse().expect("base timestamp"),
            counter: 0,
        }
    }

    fn next_ts(&mut self) -> String {
        self.clock += Duration::seconds(10);
        self.clock.to_rfc3339()
    }

    fn next_uuid(&mut self, prefix: &str) -> String {
        self.counter += 1;
        format!("{prefix}-{:04}", self.counter)
    }

    fn push(&mut self, value: Value) -> &mut Self {
        self.lines
            .push(serde_json::to_string(&value).expect("record json"));
        self
    }

    pub fn user(&mut self, text: &str) -> &mut Self {
        let uuid = self.next_uuid("user");
        let ts = self.next_ts();
        let session_id = self.session_id.clone();
        self.push(json!({
            "type": "user",
            "uuid": uuid,
            "sessionId": session_id,
            "timestamp": ts,
            "message": {"role": "user", "content": text},
        }))
    }

    pub fn assistant(&mut self, text: &str) -> &mut Self {
        self.assistant_with_usage(text, 100, 5, 0, 0)
    }

    pub fn assistant_with_usage(
        &mut self,
        text: &str,
        input: u64,
        output: u64,
        cache_creation: u64,
        cache_read: u64,
    ) -> &mut Self {
        let uuid = self.next_uuid("asst");
        let ts = self.next_ts();
        let session_id = self.session_id.clone();
        self.push(json!({
            "type": "assistant",
            "uuid": uuid,
            "sessionId": session_id,
            "timestamp": ts,
            "message": {
                "model": "test-model",
                "content": [{"type": "text", "text": text}],
                "usage": {
                    "input_tokens": input,
                    "output_tokens": output,
                    "cache_creation_input_tokens": cache_creation,
                    "cache_read_input_tokens": cache_read,
                },
            },
        }))
    }

    pub fn tool_call(&mut self, name: &str, input: Value) -> &mut Self {
        let uuid = self.next_uuid("tool");
        let ts = self.next_ts();
        let session_id = self.session_id.clone();
        self.push(json!({
            "type": "assistant",
            "uuid": uuid.clone(),
            "sessionId": session_id,
            "timestamp": ts,
            "message": {
                "model": "test-model",
                "content": [{"type": "tool_use", "id": uuid, "name": name, "input": input}],
                "usage": {"input_tokens": 50, "output_tokens": 3},
            },
        }))
    }

    pub fn agent_progress(&mut self, agent_id: &str, agent_type: &str, prompt: &str) -> &mut Self {
        let uuid = self.next_uuid("prog");
        let ts = self.next_ts();
        let session_id = self.session_id.clone();
        self.push(json!({
            "type": "progress",
            "uuid": uuid,
            "sessionId": session_id,
            "timestamp": ts,
            "data": {
                "subtype": "agent_progress",
                "agentId": agent_id,
                "agentType": agent_type,
                "prompt": prompt,
            },
        }))
    }

    pub fn summary(&mut self, summary: &str) -> &mut Self {
        let session_id = self.session_id.clone();
        self.push(json!({
            "type": "summary",
            "sessionId": session_id,
            "summary": summary,
        }))
    }

    pub fn turn_duration(&mut self, millis: u64) -> &mut Self {
        let uuid = self.next_uuid("sys");
        let ts = self.next_ts();
        let session_id = self.session_id.clone();
        self.push(json!({
            "type": "system",
            "uuid": uuid,
            "sessionId": session_id,
            "timestamp": ts,
            "subtype": "turn_duration",
            "durationMs": millis,
        }))
    }

    /// Append a raw line verbatim (for malformed-input tests).
    pub fn raw_line(&mut self, line: &str) -> &mut Self {
        self.lines.push(line.to_string());
        self
    }

    pub fn to_jsonl(&self) -> String {
        let mut out = self.lines.join("\n");
        out.push('\n');
        out
    }

    pub fn write_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_jsonl())?;
        Ok(())
    }
}
