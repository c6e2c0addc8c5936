//! Plan detection over a session's normalized entries.
//!
//! Three sources produce raw references: trigger phrases in user messages
//! (embedded), Plan-type subagents (agent), and markdown Write calls
//! (write). Within-session deduplication happens in `dedup`.

use jacques_types::{EntryKind, PlanReference, PlanSource, TranscriptEntry};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

use crate::text::{extract_title, TITLE_MAX_CHARS};

/// Minimum content length after a trigger phrase for a plan to count.
pub const MIN_PLAN_CONTENT_CHARS: usize = 100;

/// Trigger phrases that mark an embedded plan, matched case-insensitively.
pub const PLAN_TRIGGERS: [&str; 3] = [
    "implement the following plan:",
    "here is the plan:",
    "follow this plan:",
];

/// A plan reference plus the content needed for cataloging.
#[derive(Debug, Clone)]
pub struct DetectedPlan {
    pub title: String,
    pub source: PlanSource,
    pub message_index: usize,
    pub file_path: Option<String>,
    pub agent_id: Option<String>,
    /// Inline content; `None` for agent plans until the subagent
    /// transcript is read.
    pub content: Option<String>,
    pub sources: BTreeSet<PlanSource>,
}

impl DetectedPlan {
    fn new(title: String, source: PlanSource, message_index: usize) -> Self {
        let mut sources = BTreeSet::new();
        sources.insert(source);
        Self {
            title,
            source,
            message_index,
            file_path: None,
            agent_id: None,
            content: None,
            sources,
        }
    }

    pub fn to_reference(&self) -> PlanReference {
        PlanReference {
            title: self.title.clone(),
            source: self.source,
            message_index: self.message_index,
            file_path: self.file_path.clone(),
            agent_id: self.agent_id.clone(),
            catalog_id: None,
            sources: self.sources.clone(),
        }
    }
}

/// Scan a session's entries for plan references, in entry order.
pub fn detect_plans(entries: &[TranscriptEntry]) -> Vec<DetectedPlan> {
    let mut plans = Vec::new();
    let mut seen_agents: BTreeSet<String> = BTreeSet::new();

    for (index, entry) in entries.iter().enumerate() {
        match entry.kind {
            EntryKind::UserMessage if !entry.internal => {
                if let Some(text) = &entry.content.text {
                    plans.extend(detect_embedded(text, index));
                }
            }
            EntryKind::AgentProgress => {
                if entry.content.agent_type.as_deref() == Some("Plan")
                    && let Some(agent_id) = &entry.content.agent_id
                    && seen_agents.insert(agent_id.clone())
                {
                    let title = entry
                        .content
                        .agent_description
                        .as_deref()
                        .map(|d| crate::text::truncate_chars(d.lines().next().unwrap_or(d), TITLE_MAX_CHARS))
                        .unwrap_or_else(|| format!("Plan agent {agent_id}"));
                    let mut plan = DetectedPlan::new(title, PlanSource::Agent, index);
                    plan.agent_id = Some(agent_id.clone());
                    plans.push(plan);
                }
            }
            EntryKind::ToolCall => {
                if entry.content.tool_name.as_deref() == Some("Write")
                    && let Some(input) = &entry.content.tool_input
                    && let Some(plan) = detect_written(input, index)
                {
                    plans.push(plan);
                }
            }
            _ => {}
        }
    }

    plans
}

static TOP_HEADING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^#\s").expect("top heading regex"));

/// Embedded plans: text after a trigger phrase, split at top-level headings.
fn detect_embedded(text: &str, index: usize) -> Vec<DetectedPlan> {
    let lower = text.to_lowercase();
    let Some((trigger_pos, trigger)) = PLAN_TRIGGERS
        .iter()
        .filter_map(|t| lower.find(t).map(|pos| (pos, t)))
        .min_by_key(|(pos, _)| *pos)
    else {
        return Vec::new();
    };

    let content = text[trigger_pos + trigger.len()..].trim();
    if content.chars().count() < MIN_PLAN_CONTENT_CHARS || !content.contains('#') {
        return Vec::new();
    }

    split_at_top_headings(content)
        .into_iter()
        .map(|piece| {
            let mut plan = DetectedPlan::new(extract_title(&piece), PlanSource::Embedded, index);
            plan.content = Some(piece);
            plan
        })
        .collect()
}

/// Split content at `^# ` boundaries; each piece keeps its leading heading.
/// Content before the first heading stays attached to the first piece.
fn split_at_top_headings(content: &str) -> Vec<String> {
    let starts: Vec<usize> = TOP_HEADING_RE.find_iter(content).map(|m| m.start()).collect();
    if starts.len() <= 1 {
        return vec![content.to_string()];
    }

    let mut pieces = Vec::new();
    // Preamble before the first heading belongs to the first plan.
    let mut cursor = 0;
    for (i, &start) in starts.iter().enumerate() {
        if i == 0 {
            continue;
        }
        pieces.push(content[cursor..start].trim().to_string());
        cursor = start;
    }
    pieces.push(content[cursor..].trim().to_string());
    pieces.retain(|p| !p.is_empty());
    pieces
}

/// Extensions that can never be a plan, whatever the path looks like.
const CODE_EXTENSIONS: [&str; 12] = [
    ".ts", ".tsx", ".js", ".jsx", ".py", ".go", ".rs", ".java", ".rb", ".c", ".cpp", ".sh",
];

const CODE_LEADING_TOKENS: [&str; 7] = [
    "import", "export", "const", "function", "class", "interface", "type",
];

/// Written plans: a `Write` tool call whose path and content both look like
/// a markdown plan.
fn detect_written(input: &serde_json::Value, index: usize) -> Option<DetectedPlan> {
    let path = input.get("file_path").and_then(|v| v.as_str())?;
    let content = input.get("content").and_then(|v| v.as_str())?;

    let lower_path = path.to_lowercase();
    if CODE_EXTENSIONS.iter().any(|ext| lower_path.ends_with(ext)) {
        return None;
    }

    let path_matches = lower_path.ends_with(".md")
        || lower_path.contains("plan")
        || lower_path.contains(".jacques/plans/");
    if !path_matches || !looks_like_plan_markdown(content) {
        return None;
    }

    let mut plan = DetectedPlan::new(extract_title(content), PlanSource::Write, index);
    plan.file_path = Some(path.to_string());
    plan.content = Some(content.to_string());
    Some(plan)
}

static LIST_ITEM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*(?:[-*]|\d+\.)\s+\S").expect("list item regex"));

fn looks_like_plan_markdown(content: &str) -> bool {
    let trimmed = content.trim_start();
    let first_token = trimmed
        .split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .next()
        .unwrap_or("");
    if CODE_LEADING_TOKENS.contains(&first_token) {
        return false;
    }

    let has_heading = TOP_HEADING_RE.is_match(content) || trimmed.starts_with('#');
    if !has_heading {
        return false;
    }

    LIST_ITEM_RE.is_match(content) || content.contains("\n\n")
}
