use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Where a plan reference was detected
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum PlanSource {
    Embedded,
    Write,
    Agent,
}

impl PlanSource {
    /// Canonical-selection priority for within-session deduplication.
    /// Lower wins: write > embedded > agent.
    pub fn priority(self) -> u8 {
        match self {
            PlanSource::Write => 0,
            PlanSource::Embedded => 1,
            PlanSource::Agent => 2,
        }
    }
}

/// A plan detected in one session, after within-session deduplication
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanReference {
    pub title: String,
    pub source: PlanSource,
    /// 0-based ordinal of the entry the plan was detected in
    pub message_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    /// Link to the per-project catalog entry, filled during extraction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_id: Option<String>,
    /// All detection sources that collapsed into this reference
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub sources: BTreeSet<PlanSource>,
}

/// Per-project catalog entry for a deduplicated plan
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub id: String,
    pub title: String,
    pub filename: String,
    /// Relative path under the project's catalog directory
    pub path: String,
    /// SHA-256 over whitespace-normalized, case-folded content
    pub content_hash: String,
    /// SHA-256 over the body only (first heading line removed)
    pub body_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Session ids that referenced this plan (set semantics)
    pub sessions: BTreeSet<String>,
}

/// Token totals for a whole session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenTotals {
    pub input: u64,
    pub output: u64,
    pub cache_creation: u64,
    pub cache_read: u64,
}

/// How the session was driven
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    Planning,
    Execution,
}

/// Per-session metadata artifact stored by the catalog extractor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionManifest {
    pub session_id: String,
    pub project_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    /// Transcript mtime at extraction time; drives incremental skips
    pub jsonl_modified_at: DateTime<Utc>,
    pub message_count: usize,
    pub tool_call_count: usize,
    pub has_subagents: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subagent_ids: Vec<String>,
    #[serde(default)]
    pub had_auto_compact: bool,
    pub tokens: TokenTotals,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<SessionMode>,
    pub plan_count: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plan_refs: Vec<PlanReference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub technologies: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user_questions: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files_modified: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools_used: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context_snippets: Vec<String>,
}

/// Externally imported context file tracked in the project index
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextFile {
    pub filename: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imported_at: Option<DateTime<Utc>>,
}

/// Pointer from the project index into a session manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionIndexEntry {
    pub session_id: String,
    /// Relative path, e.g. `sessions/<id>.json`
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

/// Subagent artifact tracked in the project index
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubagentIndexEntry {
    pub agent_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_type: Option<String>,
    /// Relative path, e.g. `subagents/<agentId>.md`
    pub path: String,
    pub session_id: String,
}

/// Per-project catalog index (one file at `.jacques/index.json`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectIndex {
    #[serde(default)]
    pub context: Vec<ContextFile>,
    #[serde(default)]
    pub sessions: Vec<SessionIndexEntry>,
    #[serde(default)]
    pub plans: Vec<Plan>,
    #[serde(default)]
    pub subagents: Vec<SubagentIndexEntry>,
}

impl ProjectIndex {
    pub fn plan_by_id(&self, id: &str) -> Option<&Plan> {
        self.plans.iter().find(|p| p.id == id)
    }

    /// Replace or insert the session entry for `entry.session_id`.
    pub fn upsert_session(&mut self, entry: SessionIndexEntry) {
        if let Some(existing) = self
            .sessions
            .iter_mut()
            .find(|s| s.session_id == entry.session_id)
        {
            *existing = entry;
        } else {
            self.sessions.push(entry);
        }
    }

    pub fn upsert_subagent(&mut self, entry: SubagentIndexEntry) {
        if let Some(existing) = self
            .subagents
            .iter_mut()
            .find(|s| s.agent_id == entry.agent_id)
        {
            *existing = entry;
        } else {
            self.subagents.push(entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_source_priority() {
        assert!(PlanSource::Write.priority() < PlanSource::Embedded.priority());
        assert!(PlanSource::Embedded.priority() < PlanSource::Agent.priority());
    }

    #[test]
    fn test_project_index_upsert_session_replaces() {
        let mut index = ProjectIndex::default();
        index.upsert_session(SessionIndexEntry {
            session_id: "s1".into(),
            path: "sessions/s1.json".into(),
            title: None,
            ended_at: None,
        });
        index.upsert_session(SessionIndexEntry {
            session_id: "s1".into(),
            path: "sessions/s1.json".into(),
            title: Some("later".into()),
            ended_at: None,
        });
        assert_eq!(index.sessions.len(), 1);
        assert_eq!(index.sessions[0].title.as_deref(), Some("later"));
    }

    #[test]
    fn test_manifest_round_trips_camel_case() {
        let manifest = SessionManifest {
            session_id: "s1".into(),
            project_path: "/work/proj".into(),
            title: Some("t".into()),
            started_at: None,
            ended_at: None,
            jsonl_modified_at: Utc::now(),
            message_count: 2,
            tool_call_count: 1,
            has_subagents: false,
            subagent_ids: vec![],
            had_auto_compact: false,
            tokens: TokenTotals::default(),
            mode: Some(SessionMode::Planning),
            plan_count: 0,
            plan_refs: vec![],
            technologies: vec![],
            user_questions: vec![],
            files_modified: vec![],
            tools_used: vec![],
            context_snippets: vec![],
        };
        let json = serde_json::to_value(&manifest).unwrap();
        assert!(json.get("jsonlModifiedAt").is_some());
        assert_eq!(json.get("mode").unwrap(), "planning");

        let back: SessionManifest = serde_json::from_value(json).unwrap();
        assert_eq!(back.session_id, "s1");
    }
}
