use jacques_types::{EntryKind, TranscriptEntry};
use once_cell::sync::Lazy;
use tiktoken_rs::CoreBPE;

/// Statistics bundle for one parsed transcript.
#[derive(Debug, Clone, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptStats {
    pub message_count: usize,
    pub user_message_count: usize,
    pub assistant_message_count: usize,
    pub tool_call_count: usize,
    /// Legacy sum of per-turn input tokens; overcounts the real context.
    pub total_input_tokens: u64,
    /// Raw reported output tokens; known to be wildly inaccurate.
    pub total_output_tokens: u64,
    /// Tokenizer-derived estimate of real output volume.
    pub total_output_tokens_estimated: u64,
    pub total_cache_creation_tokens: u64,
    pub total_cache_read_tokens: u64,
    /// Input tokens of the last assistant turn.
    pub last_input_tokens: u64,
    /// Cache-read tokens of the last assistant turn.
    pub last_cache_read: u64,
    /// Cache-creation tokens of the last assistant turn.
    pub last_cache_creation: u64,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub ended_at: Option<chrono::DateTime<chrono::Utc>>,
    pub models: Vec<String>,
    pub had_auto_compact: bool,
}

impl TranscriptStats {
    /// True size of the session context right now: the last turn's input
    /// plus its cache reads. Cache creation is a subset of input, never
    /// additive, and summing across turns overcounts.
    pub fn context_window_tokens(&self) -> u64 {
        self.last_input_tokens + self.last_cache_read
    }
}

static BPE: Lazy<Option<CoreBPE>> = Lazy::new(|| tiktoken_rs::cl100k_base().ok());

/// Count tokens in a text with the cl100k BPE, falling back to the
/// chars/4 heuristic when the tokenizer data is unavailable.
pub fn count_tokens(text: &str) -> u64 {
    match BPE.as_ref() {
        Some(bpe) => bpe.encode_with_special_tokens(text).len() as u64,
        None => (text.chars().count() as u64).div_ceil(4),
    }
}

/// Estimate total output tokens for a session.
///
/// The raw `output_tokens` field often reports 1-9 tokens regardless of
/// content, so the estimate tokenizes what the model actually produced:
/// message text, thinking blocks, and serialized tool inputs.
pub fn estimate_output_tokens(entries: &[TranscriptEntry]) -> u64 {
    let mut total = 0u64;
    for entry in entries {
        match entry.kind {
            EntryKind::AssistantMessage => {
                if let Some(text) = &entry.content.text {
                    total += count_tokens(text);
                }
                if let Some(thinking) = &entry.content.thinking {
                    total += count_tokens(thinking);
                }
            }
            EntryKind::ToolCall => {
                if let Some(input) = &entry.content.tool_input {
                    total += count_tokens(&input.to_string());
                }
            }
            _ => {}
        }
    }
    total
}

/// Compute the statistics bundle over already-parsed entries.
pub fn statistics(entries: &[TranscriptEntry]) -> TranscriptStats {
    let mut stats = TranscriptStats::default();

    for entry in entries {
        match entry.kind {
            EntryKind::UserMessage => {
                stats.message_count += 1;
                if !entry.internal {
                    stats.user_message_count += 1;
                }
            }
            EntryKind::AssistantMessage => {
                stats.message_count += 1;
                stats.assistant_message_count += 1;
            }
            EntryKind::ToolCall => {
                stats.tool_call_count += 1;
            }
            EntryKind::SystemEvent => {
                if entry.content.event_type.as_deref() == Some("compact_boundary") {
                    stats.had_auto_compact = true;
                }
            }
            _ => {}
        }

        if let Some(usage) = &entry.content.usage {
            stats.total_input_tokens += usage.input_tokens;
            stats.total_output_tokens += usage.output_tokens;
            stats.total_cache_creation_tokens += usage.cache_creation_tokens;
            stats.total_cache_read_tokens += usage.cache_read_tokens;
            stats.last_input_tokens = usage.input_tokens;
            stats.last_cache_read = usage.cache_read_tokens;
            stats.last_cache_creation = usage.cache_creation_tokens;
        }

        if let Some(model) = &entry.content.model {
            if !stats.models.iter().any(|m| m == model) {
                stats.models.push(model.clone());
            }
        }

        if let Some(ts) = entry.timestamp {
            if stats.started_at.is_none_or(|s| ts < s) {
                stats.started_at = Some(ts);
            }
            if stats.ended_at.is_none_or(|e| ts > e) {
                stats.ended_at = Some(ts);
            }
        }
    }

    stats.total_output_tokens_estimated = estimate_output_tokens(entries);
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use jacques_types::{EntryContent, UsageTokens};

    fn entry(kind: EntryKind, content: EntryContent) -> TranscriptEntry {
        let mut e = TranscriptEntry::new(kind, "id");
        e.content = content;
        e
    }

    fn usage(input: u64, output: u64, creation: u64, read: u64) -> UsageTokens {
        UsageTokens {
            input_tokens: input,
            output_tokens: output,
            cache_creation_tokens: creation,
            cache_read_tokens: read,
        }
    }

    #[test]
    fn test_count_tokens_nonzero() {
        assert!(count_tokens("hello world, this is a test") > 0);
        assert_eq!(count_tokens(""), 0);
    }

    #[test]
    fn test_last_turn_context_window_rule() {
        let entries = vec![
            entry(
                EntryKind::AssistantMessage,
                EntryContent {
                    text: Some("first".into()),
                    usage: Some(usage(1000, 5, 200, 0)),
                    ..Default::default()
                },
            ),
            entry(
                EntryKind::AssistantMessage,
                EntryContent {
                    text: Some("second".into()),
                    usage: Some(usage(300, 5, 0, 40_000)),
                    ..Default::default()
                },
            ),
        ];

        let stats = statistics(&entries);
        // Legacy sum overcounts; the last-turn rule gives the live figure.
        assert_eq!(stats.total_input_tokens, 1300);
        assert_eq!(stats.last_input_tokens, 300);
        assert_eq!(stats.last_cache_read, 40_000);
        assert_eq!(stats.context_window_tokens(), 40_300);
        // Context window dominates every per-turn input total.
        assert!(stats.context_window_tokens() >= 1000);
        assert!(stats.context_window_tokens() >= 300);
    }

    #[test]
    fn test_internal_messages_excluded_from_user_count() {
        let mut internal = entry(
            EntryKind::UserMessage,
            EntryContent {
                text: Some("<command-name>/clear</command-name>".into()),
                ..Default::default()
            },
        );
        internal.internal = true;
        let real = entry(
            EntryKind::UserMessage,
            EntryContent {
                text: Some("real question".into()),
                ..Default::default()
            },
        );

        let stats = statistics(&[internal, real]);
        assert_eq!(stats.message_count, 2);
        assert_eq!(stats.user_message_count, 1);
    }

    #[test]
    fn test_output_estimate_covers_text_thinking_and_tool_inputs() {
        let entries = vec![
            entry(
                EntryKind::AssistantMessage,
                EntryContent {
                    text: Some("the quick brown fox".into()),
                    thinking: Some("jumps over the lazy dog".into()),
                    usage: Some(usage(10, 2, 0, 0)),
                    ..Default::default()
                },
            ),
            entry(
                EntryKind::ToolCall,
                EntryContent {
                    tool_name: Some("Write".into()),
                    tool_input: Some(serde_json::json!({"file_path": "a.md", "content": "body"})),
                    ..Default::default()
                },
            ),
        ];

        let stats = statistics(&entries);
        // Raw output says 2; the estimate must be well above it.
        assert_eq!(stats.total_output_tokens, 2);
        assert!(stats.total_output_tokens_estimated > stats.total_output_tokens);
    }

    #[test]
    fn test_compact_boundary_sets_flag() {
        let compacted = entry(
            EntryKind::SystemEvent,
            EntryContent {
                event_type: Some("compact_boundary".into()),
                ..Default::default()
            },
        );
        assert!(statistics(&[compacted]).had_auto_compact);
        assert!(!statistics(&[]).had_auto_compact);
    }

    #[test]
    fn test_models_deduplicated() {
        let a = entry(
            EntryKind::AssistantMessage,
            EntryContent {
                model: Some("claude-x".into()),
                ..Default::default()
            },
        );
        let b = entry(
            EntryKind::AssistantMessage,
            EntryContent {
                model: Some("claude-x".into()),
                ..Default::default()
            },
        );
        let stats = statistics(&[a, b]);
        assert_eq!(stats.models, vec!["claude-x".to_string()]);
    }
}
