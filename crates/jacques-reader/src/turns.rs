//! Per-turn aggregation: one turn per real user message, holding
//! everything the assistant did until the next one.

use chrono::{DateTime, Utc};
use jacques_types::{EntryKind, TranscriptEntry, UsageTokens};

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnSummary {
    /// 0-based ordinal of the turn within the session.
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_text: Option<String>,
    pub assistant_messages: usize,
    pub tool_calls: usize,
    pub tokens: UsageTokens,
    /// Reported turn duration when the log carries one, otherwise the
    /// first-to-last entry span.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

struct TurnBuilder {
    index: usize,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    user_text: Option<String>,
    assistant_messages: usize,
    tool_calls: usize,
    tokens: UsageTokens,
    reported_duration_ms: Option<u64>,
}

impl TurnBuilder {
    fn new(index: usize, entry: &TranscriptEntry) -> Self {
        Self {
            index,
            started_at: entry.timestamp,
            ended_at: entry.timestamp,
            user_text: entry.content.text.clone(),
            assistant_messages: 0,
            tool_calls: 0,
            tokens: UsageTokens::default(),
            reported_duration_ms: None,
        }
    }

    fn add_entry(&mut self, entry: &TranscriptEntry) {
        if let Some(ts) = entry.timestamp {
            if self.started_at.is_none_or(|s| ts < s) {
                self.started_at = Some(ts);
            }
            if self.ended_at.is_none_or(|e| ts > e) {
                self.ended_at = Some(ts);
            }
        }

        match entry.kind {
            EntryKind::AssistantMessage => self.assistant_messages += 1,
            EntryKind::ToolCall => self.tool_calls += 1,
            EntryKind::SystemEvent => {
                if entry.content.event_type.as_deref() == Some("turn_duration") {
                    self.reported_duration_ms = entry.content.duration_ms;
                }
            }
            _ => {}
        }

        if let Some(usage) = &entry.content.usage {
            self.tokens.input_tokens += usage.input_tokens;
            self.tokens.output_tokens += usage.output_tokens;
            self.tokens.cache_creation_tokens += usage.cache_creation_tokens;
            self.tokens.cache_read_tokens += usage.cache_read_tokens;
        }
    }

    fn build(self) -> TurnSummary {
        let span_ms = match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) if end > start => {
                Some((end - start).num_milliseconds() as u64)
            }
            _ => None,
        };
        TurnSummary {
            index: self.index,
            started_at: self.started_at,
            ended_at: self.ended_at,
            user_text: self.user_text,
            assistant_messages: self.assistant_messages,
            tool_calls: self.tool_calls,
            tokens: self.tokens,
            duration_ms: self.reported_duration_ms.or(span_ms),
        }
    }
}

/// Group a session's entries into turns. Entries before the first real
/// user message belong to no turn and are not counted.
pub fn turns(entries: &[TranscriptEntry]) -> Vec<TurnSummary> {
    let mut finished = Vec::new();
    let mut current: Option<TurnBuilder> = None;

    for entry in entries {
        if entry.is_real_user_message() {
            if let Some(done) = current.take() {
                finished.push(done.build());
            }
            current = Some(TurnBuilder::new(finished.len(), entry));
            continue;
        }
        if let Some(turn) = current.as_mut() {
            turn.add_entry(entry);
        }
    }

    if let Some(done) = current.take() {
        finished.push(done.build());
    }
    finished
}

#[cfg(test)]
mod tests {
    use super::*;
    use jacques_types::EntryContent;

    fn at(seconds: i64) -> Option<DateTime<Utc>> {
        Some(DateTime::from_timestamp(1_746_000_000 + seconds, 0).unwrap())
    }

    fn user(text: &str, ts: i64) -> TranscriptEntry {
        let mut e = TranscriptEntry::new(EntryKind::UserMessage, "u");
        e.content.text = Some(text.to_string());
        e.timestamp = at(ts);
        e
    }

    fn assistant(ts: i64, output: u64) -> TranscriptEntry {
        let mut e = TranscriptEntry::new(EntryKind::AssistantMessage, "a");
        e.content = EntryContent {
            text: Some("reply".into()),
            usage: Some(UsageTokens {
                input_tokens: 100,
                output_tokens: output,
                cache_creation_tokens: 0,
                cache_read_tokens: 0,
            }),
            ..Default::default()
        };
        e.timestamp = at(ts);
        e
    }

    fn tool_call(ts: i64) -> TranscriptEntry {
        let mut e = TranscriptEntry::new(EntryKind::ToolCall, "t");
        e.content.tool_name = Some("Bash".into());
        e.timestamp = at(ts);
        e
    }

    #[test]
    fn test_each_user_message_opens_a_turn() {
        let entries = vec![
            user("first", 0),
            assistant(5, 10),
            tool_call(8),
            user("second", 20),
            assistant(25, 20),
        ];
        let turns = turns(&entries);
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].user_text.as_deref(), Some("first"));
        assert_eq!(turns[0].assistant_messages, 1);
        assert_eq!(turns[0].tool_calls, 1);
        assert_eq!(turns[1].index, 1);
        assert_eq!(turns[1].tokens.output_tokens, 20);
    }

    #[test]
    fn test_internal_user_messages_do_not_open_turns() {
        let mut internal = user("<command-name>/clear</command-name>", 0);
        internal.internal = true;
        let entries = vec![internal, user("real", 5), assistant(10, 5)];
        let turns = turns(&entries);
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].user_text.as_deref(), Some("real"));
    }

    #[test]
    fn test_reported_duration_beats_span() {
        let mut duration = TranscriptEntry::new(EntryKind::SystemEvent, "s");
        duration.content.event_type = Some("turn_duration".into());
        duration.content.duration_ms = Some(1234);
        duration.timestamp = at(9);

        let entries = vec![user("q", 0), assistant(5, 10), duration];
        let turns = turns(&entries);
        assert_eq!(turns[0].duration_ms, Some(1234));
    }

    #[test]
    fn test_span_duration_fallback() {
        let entries = vec![user("q", 0), assistant(5, 10)];
        let turns = turns(&entries);
        assert_eq!(turns[0].duration_ms, Some(5000));
    }

    #[test]
    fn test_entries_before_first_turn_are_orphaned() {
        let entries = vec![assistant(0, 10), user("q", 5), assistant(8, 5)];
        let turns = turns(&entries);
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].tokens.output_tokens, 5);
    }
}
