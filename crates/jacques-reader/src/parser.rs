use chrono::{DateTime, Utc};
use jacques_types::{
    is_internal_user_text, EntryKind, Error, Result, TranscriptEntry, UsageTokens,
};
use std::path::Path;

use crate::schema::*;

/// Result of parsing one transcript log file.
#[derive(Debug, Default)]
pub struct ParseOutcome {
    /// Normalized entries in file order, skip records already removed.
    pub entries: Vec<TranscriptEntry>,
    /// Lines that were not valid JSON or not a known structure.
    pub parse_errors: usize,
}

/// Parse a whole transcript log file.
///
/// Reads the file once and does not follow the tail. A malformed line never
/// fails the parse; it increments `parse_errors`.
pub fn parse(path: &Path) -> Result<ParseOutcome> {
    let text = std::fs::read_to_string(path).map_err(Error::Io)?;
    Ok(parse_str(&text))
}

/// Parse transcript log content already in memory.
pub fn parse_str(text: &str) -> ParseOutcome {
    let mut outcome = ParseOutcome::default();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<RawRecord>(line) {
            Ok(record) => {
                let entry = categorize(record);
                if entry.kind != EntryKind::Skip {
                    outcome.entries.push(entry);
                }
            }
            Err(_) => {
                outcome.parse_errors += 1;
            }
        }
    }

    if outcome.parse_errors > 0 {
        tracing::debug!(parse_errors = outcome.parse_errors, "skipped malformed lines");
    }
    outcome
}

fn skip() -> TranscriptEntry {
    TranscriptEntry::new(EntryKind::Skip, "")
}

/// Normalize one raw record. Records the reader has no use for come back as
/// `Skip` and are filtered by `parse`.
pub(crate) fn categorize(record: RawRecord) -> TranscriptEntry {
    match record {
        RawRecord::User(user) | RawRecord::QueueOperation(user) => categorize_user(user),
        RawRecord::Assistant(asst) => categorize_assistant(asst),
        RawRecord::Progress(progress) => categorize_progress(progress),
        RawRecord::System(system) => categorize_system(system),
        RawRecord::Summary(summary) => {
            let mut entry = TranscriptEntry::new(EntryKind::Summary, "summary");
            if let Some(leaf) = &summary.leaf_uuid {
                entry.uuid = leaf.clone();
            }
            entry.session_id = summary.session_id;
            entry.timestamp = parse_timestamp(summary.timestamp.as_deref());
            entry.content.summary = Some(summary.summary);
            entry
        }
        RawRecord::FileHistorySnapshot | RawRecord::Unknown => skip(),
    }
}

fn categorize_user(user: UserRecord) -> TranscriptEntry {
    let Some(message) = user.message else {
        return skip();
    };

    let texts: Vec<&str> = message
        .content
        .iter()
        .filter_map(|c| match c {
            UserContent::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect();

    if !texts.is_empty() {
        let text = texts.join("\n");
        let internal = is_internal_user_text(&text);
        let mut entry = base_entry(
            EntryKind::UserMessage,
            user.uuid,
            user.parent_uuid,
            user.session_id,
            user.timestamp,
        );
        entry.content.text = Some(text);
        entry.internal = internal;
        return entry;
    }

    // No text blocks: a tool-result carrier, or nothing useful at all.
    for content in message.content {
        if let UserContent::ToolResult {
            content: result, ..
        } = content
        {
            let mut entry = base_entry(
                EntryKind::ToolResult,
                user.uuid,
                user.parent_uuid,
                user.session_id,
                user.timestamp,
            );
            entry.content.tool_result_content = result.map(|v| match v {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            });
            return entry;
        }
    }

    skip()
}

fn categorize_assistant(asst: AssistantRecord) -> TranscriptEntry {
    let tool_use = asst.message.content.iter().find_map(|c| match c {
        AssistantContent::ToolUse { name, input, .. } => Some((name.clone(), input.clone())),
        _ => None,
    });

    let kind = if tool_use.is_some() {
        EntryKind::ToolCall
    } else {
        EntryKind::AssistantMessage
    };

    let mut entry = base_entry(
        kind,
        asst.uuid,
        asst.parent_uuid,
        asst.session_id,
        asst.timestamp,
    );

    if let Some((name, input)) = tool_use {
        entry.content.tool_name = Some(name);
        entry.content.tool_input = Some(input);
    } else {
        let text = join_blocks(&asst.message.content, |c| match c {
            AssistantContent::Text { text } => Some(text.as_str()),
            _ => None,
        });
        let thinking = join_blocks(&asst.message.content, |c| match c {
            AssistantContent::Thinking { thinking } => Some(thinking.as_str()),
            _ => None,
        });
        entry.content.text = text;
        entry.content.thinking = thinking;
    }

    entry.content.model = asst.message.model;
    entry.content.cost_usd = asst.cost_usd;
    entry.content.duration_ms = asst.duration_ms;
    entry.content.usage = asst.message.usage.map(|u| UsageTokens {
        input_tokens: u.input_tokens,
        output_tokens: u.output_tokens,
        cache_creation_tokens: u.cache_creation_input_tokens,
        cache_read_tokens: u.cache_read_input_tokens,
    });
    entry
}

fn categorize_progress(progress: ProgressRecord) -> TranscriptEntry {
    let Some(data) = progress.data else {
        return skip();
    };

    let make = |kind| {
        base_entry(
            kind,
            progress.uuid.clone(),
            progress.parent_uuid.clone(),
            progress.session_id.clone(),
            progress.timestamp.clone(),
        )
    };

    match data {
        // Hook progress is routed on the live event path, never archived.
        ProgressData::HookProgress => skip(),
        ProgressData::AgentProgress {
            agent_id,
            agent_type,
            prompt,
            ..
        } => {
            let mut entry = make(EntryKind::AgentProgress);
            entry.content.agent_id = agent_id;
            entry.content.agent_type = agent_type;
            entry.content.agent_description = prompt;
            entry
        }
        ProgressData::BashProgress { output } => {
            let mut entry = make(EntryKind::AgentProgress);
            entry.content.text = output;
            entry
        }
        ProgressData::McpProgress { server } => {
            let mut entry = make(EntryKind::WebSearch);
            entry.content.event_data = server.map(serde_json::Value::String);
            entry
        }
        ProgressData::QueryUpdate { query } => {
            let mut entry = make(EntryKind::WebSearch);
            entry.content.search_query = query;
            entry
        }
        ProgressData::SearchResultsReceived {
            query,
            result_count,
        } => {
            let mut entry = make(EntryKind::WebSearch);
            entry.content.search_query = query;
            entry.content.search_result_count = result_count;
            entry
        }
        ProgressData::Unknown => make(EntryKind::SystemEvent),
    }
}

fn categorize_system(system: SystemRecord) -> TranscriptEntry {
    match system.subtype.as_deref() {
        Some("turn_duration") => {
            let mut entry = base_entry(
                EntryKind::SystemEvent,
                system.uuid,
                system.parent_uuid,
                system.session_id,
                system.timestamp,
            );
            entry.content.event_type = Some("turn_duration".to_string());
            entry.content.duration_ms = system.duration_ms;
            entry
        }
        Some("compact_boundary") => {
            let mut entry = base_entry(
                EntryKind::SystemEvent,
                system.uuid,
                system.parent_uuid,
                system.session_id,
                system.timestamp,
            );
            entry.content.event_type = Some("compact_boundary".to_string());
            entry.content.event_data = system.content;
            entry
        }
        _ => skip(),
    }
}

fn base_entry(
    kind: EntryKind,
    uuid: Option<String>,
    parent_uuid: Option<String>,
    session_id: Option<String>,
    timestamp: Option<String>,
) -> TranscriptEntry {
    let uuid = uuid.unwrap_or_else(|| {
        generate_record_uuid(session_id.as_deref().unwrap_or(""), timestamp.as_deref())
    });
    let mut entry = TranscriptEntry::new(kind, uuid);
    entry.parent_uuid = parent_uuid;
    entry.session_id = session_id;
    entry.timestamp = parse_timestamp(timestamp.as_deref());
    entry
}

/// Deterministic id for records without an explicit uuid field.
fn generate_record_uuid(session_id: &str, timestamp: Option<&str>) -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    session_id.hash(&mut hasher);
    timestamp.unwrap_or("").hash(&mut hasher);
    format!("gen-{:016x}", hasher.finish())
}

fn parse_timestamp(ts: Option<&str>) -> Option<DateTime<Utc>> {
    ts.and_then(|s| {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    })
}

fn join_blocks<'a, T>(blocks: &'a [T], pick: impl Fn(&'a T) -> Option<&'a str>) -> Option<String> {
    let parts: Vec<&str> = blocks.iter().filter_map(pick).collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn categorize_line(line: &str) -> TranscriptEntry {
        categorize(serde_json::from_str::<RawRecord>(line).unwrap())
    }

    #[test]
    fn test_user_message_from_string_content() {
        let entry = categorize_line(
            r#"{"type":"user","uuid":"u1","sessionId":"s1","timestamp":"2025-05-01T10:00:00Z","message":{"role":"user","content":"fix the bug"}}"#,
        );
        assert_eq!(entry.kind, EntryKind::UserMessage);
        assert_eq!(entry.content.text.as_deref(), Some("fix the bug"));
        assert!(!entry.internal);
    }

    #[test]
    fn test_user_message_concatenates_text_blocks() {
        let entry = categorize_line(
            r#"{"type":"user","uuid":"u1","message":{"role":"user","content":[{"type":"text","text":"a"},{"type":"text","text":"b"}]}}"#,
        );
        assert_eq!(entry.content.text.as_deref(), Some("a\nb"));
    }

    #[test]
    fn test_user_without_message_is_skipped() {
        let entry = categorize_line(r#"{"type":"user","uuid":"u1"}"#);
        assert_eq!(entry.kind, EntryKind::Skip);
    }

    #[test]
    fn test_internal_user_message_is_flagged() {
        let entry = categorize_line(
            r#"{"type":"user","uuid":"u1","message":{"role":"user","content":"<command-name>/clear</command-name>"}}"#,
        );
        assert_eq!(entry.kind, EntryKind::UserMessage);
        assert!(entry.internal);
    }

    #[test]
    fn test_tool_result_carrier() {
        let entry = categorize_line(
            r#"{"type":"user","uuid":"u1","message":{"role":"user","content":[{"type":"tool_result","tool_use_id":"t1","content":"ok"}]}}"#,
        );
        assert_eq!(entry.kind, EntryKind::ToolResult);
        assert_eq!(entry.content.tool_result_content.as_deref(), Some("ok"));
    }

    #[test]
    fn test_assistant_first_tool_use_wins() {
        let entry = categorize_line(
            r#"{"type":"assistant","uuid":"a1","message":{"model":"m","content":[{"type":"text","text":"running"},{"type":"tool_use","id":"t1","name":"Write","input":{"file_path":"a.md"}},{"type":"tool_use","id":"t2","name":"Bash","input":{}}],"usage":{"input_tokens":10,"output_tokens":3}}}"#,
        );
        assert_eq!(entry.kind, EntryKind::ToolCall);
        assert_eq!(entry.content.tool_name.as_deref(), Some("Write"));
        assert_eq!(entry.content.usage.unwrap().input_tokens, 10);
    }

    #[test]
    fn test_assistant_message_extracts_text_and_thinking() {
        let entry = categorize_line(
            r#"{"type":"assistant","uuid":"a1","message":{"model":"m","content":[{"type":"thinking","thinking":"hmm"},{"type":"text","text":"answer"}]}}"#,
        );
        assert_eq!(entry.kind, EntryKind::AssistantMessage);
        assert_eq!(entry.content.text.as_deref(), Some("answer"));
        assert_eq!(entry.content.thinking.as_deref(), Some("hmm"));
    }

    #[test]
    fn test_progress_routing() {
        let agent = categorize_line(
            r#"{"type":"progress","uuid":"p1","data":{"subtype":"agent_progress","agentId":"ag1","agentType":"Plan"}}"#,
        );
        assert_eq!(agent.kind, EntryKind::AgentProgress);
        assert_eq!(agent.content.agent_type.as_deref(), Some("Plan"));

        let bash = categorize_line(
            r#"{"type":"progress","uuid":"p2","data":{"subtype":"bash_progress","output":"..."}}"#,
        );
        assert_eq!(bash.kind, EntryKind::AgentProgress);

        let search = categorize_line(
            r#"{"type":"progress","uuid":"p3","data":{"subtype":"search_results_received","query":"rust","result_count":7}}"#,
        );
        assert_eq!(search.kind, EntryKind::WebSearch);
        assert_eq!(search.content.search_result_count, Some(7));

        let mcp = categorize_line(
            r#"{"type":"progress","uuid":"p4","data":{"subtype":"mcp_progress","server":"db"}}"#,
        );
        assert_eq!(mcp.kind, EntryKind::WebSearch);

        let hook = categorize_line(
            r#"{"type":"progress","uuid":"p5","data":{"subtype":"hook_progress","hook_name":"pre"}}"#,
        );
        assert_eq!(hook.kind, EntryKind::Skip);
    }

    #[test]
    fn test_system_turn_duration() {
        let entry = categorize_line(
            r#"{"type":"system","uuid":"sys1","subtype":"turn_duration","durationMs":4200}"#,
        );
        assert_eq!(entry.kind, EntryKind::SystemEvent);
        assert_eq!(entry.content.duration_ms, Some(4200));
    }

    #[test]
    fn test_summary_and_snapshot() {
        let summary =
            categorize_line(r#"{"type":"summary","summary":"Auth refactor","leafUuid":"l1"}"#);
        assert_eq!(summary.kind, EntryKind::Summary);
        assert_eq!(summary.content.summary.as_deref(), Some("Auth refactor"));

        let snapshot =
            categorize_line(r#"{"type":"file-history-snapshot","messageId":"m1"}"#);
        assert_eq!(snapshot.kind, EntryKind::Skip);
    }

    #[test]
    fn test_unknown_record_type_is_skipped() {
        let entry = categorize_line(r#"{"type":"totally-new-thing","uuid":"x"}"#);
        assert_eq!(entry.kind, EntryKind::Skip);
    }

    #[test]
    fn test_parse_str_tolerates_malformed_lines() {
        let content = concat!(
            r#"{"type":"user","uuid":"u1","message":{"role":"user","content":"hello"}}"#,
            "\n",
            "not json at all\n",
            r#"{"type":"assistant","uuid":"a1","message":{"content":[{"type":"text","text":"hi"}]}}"#,
            "\n",
        );
        let outcome = parse_str(content);
        assert_eq!(outcome.entries.len(), 2);
        assert_eq!(outcome.parse_errors, 1);
        assert!(outcome.entries.iter().all(|e| e.kind != EntryKind::Skip));
    }

    #[test]
    fn test_parse_missing_file_is_io_error() {
        let err = parse(std::path::Path::new("/nonexistent/t.jsonl")).unwrap_err();
        assert_eq!(err.kind(), jacques_types::ErrorKind::Io);
    }
}
