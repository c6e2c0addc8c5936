use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Normalized transcript entry kind.
///
/// `Skip` exists only inside the reader; `parse` filters it out before
/// entries reach any downstream component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntryKind {
    UserMessage,
    AssistantMessage,
    ToolCall,
    ToolResult,
    AgentProgress,
    WebSearch,
    SystemEvent,
    Summary,
    Skip,
}

/// Token usage attached to an assistant turn
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageTokens {
    pub input_tokens: u64,
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_creation_tokens: u64,
    #[serde(default)]
    pub cache_read_tokens: u64,
}

/// Bag of optional fields carried by a normalized entry. Which fields are
/// set depends on the entry kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_input: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_result_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_result_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageTokens>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_usd: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// One normalized record from a transcript log
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptEntry {
    pub kind: EntryKind,
    pub uuid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub content: EntryContent,
    /// User text carrying a local-command prefix; kept but excluded from
    /// "real" user-message counts downstream.
    #[serde(default)]
    pub internal: bool,
}

impl TranscriptEntry {
    pub fn new(kind: EntryKind, uuid: impl Into<String>) -> Self {
        Self {
            kind,
            uuid: uuid.into(),
            parent_uuid: None,
            timestamp: None,
            session_id: None,
            content: EntryContent::default(),
            internal: false,
        }
    }

    /// A user message that counts as a real question (not tool plumbing).
    pub fn is_real_user_message(&self) -> bool {
        self.kind == EntryKind::UserMessage && !self.internal
    }
}

/// Prefixes that mark a user message as tool plumbing rather than a person
/// typing. The union of the sets observed across the AI tools.
pub const INTERNAL_USER_PREFIXES: [&str; 5] = [
    "<local-command-caveat>",
    "<command-name>",
    "<command-message>",
    "<command-args>",
    "<local-command-stdout>",
];

/// Whether a user-message text is internal plumbing.
pub fn is_internal_user_text(text: &str) -> bool {
    let trimmed = text.trim_start();
    INTERNAL_USER_PREFIXES
        .iter()
        .any(|prefix| trimmed.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_prefix_detection() {
        assert!(is_internal_user_text("<command-name>/commit</command-name>"));
        assert!(is_internal_user_text(
            "  <local-command-stdout>done</local-command-stdout>"
        ));
        assert!(!is_internal_user_text("please fix the login bug"));
        assert!(!is_internal_user_text(
            "the tag <command-name> appears mid-sentence"
        ));
    }

    #[test]
    fn test_real_user_message() {
        let mut entry = TranscriptEntry::new(EntryKind::UserMessage, "u1");
        assert!(entry.is_real_user_message());
        entry.internal = true;
        assert!(!entry.is_real_user_message());

        let tool = TranscriptEntry::new(EntryKind::ToolCall, "t1");
        assert!(!tool.is_real_user_message());
    }

    #[test]
    fn test_entry_kind_serializes_kebab_case() {
        let json = serde_json::to_string(&EntryKind::UserMessage).unwrap();
        assert_eq!(json, "\"user-message\"");
        let json = serde_json::to_string(&EntryKind::ToolCall).unwrap();
        assert_eq!(json, "\"tool-call\"");
    }
}
