//! Field extraction: which keywords a manifest contributes, from which
//! field, at which weight.

use jacques_types::SessionManifest;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::tokenize::{is_stop_word, tokenize, MAX_TOKEN_CHARS, MIN_TOKEN_CHARS};

/// Which manifest field a keyword came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldTag {
    Title,
    Question,
    Tool,
    File,
    Tech,
    Subagent,
    Snippet,
}

impl FieldTag {
    pub fn weight(self) -> f64 {
        match self {
            FieldTag::Title => 2.0,
            FieldTag::Question => 1.5,
            FieldTag::Tool => 1.2,
            FieldTag::File => 1.0,
            FieldTag::Tech => 1.0,
            FieldTag::Subagent => 0.8,
            FieldTag::Snippet => 0.5,
        }
    }
}

/// Highest field weight; no keyword score may exceed it.
pub const MAX_FIELD_WEIGHT: f64 = 2.0;

/// Extract the keyword set of a manifest with field tags and weights. A
/// keyword contributed by several fields keeps only its highest-weight
/// occurrence.
pub fn extract_keywords(manifest: &SessionManifest) -> Vec<(String, FieldTag, f64)> {
    let mut best: HashMap<String, FieldTag> = HashMap::new();

    let mut add = |keyword: String, field: FieldTag| {
        if keyword.is_empty() {
            return;
        }
        match best.get(&keyword) {
            Some(existing) if existing.weight() >= field.weight() => {}
            _ => {
                best.insert(keyword, field);
            }
        }
    };

    if let Some(title) = &manifest.title {
        for token in tokenize(title) {
            add(token, FieldTag::Title);
        }
    }

    for question in &manifest.user_questions {
        for token in tokenize(question) {
            add(token, FieldTag::Question);
        }
    }

    for tool in &manifest.tools_used {
        add(tool.to_lowercase(), FieldTag::Tool);
        for token in tokenize(tool) {
            add(token, FieldTag::Tool);
        }
    }

    for file in &manifest.files_modified {
        for token in path_tokens(file) {
            add(token, FieldTag::File);
        }
    }
    for plan in &manifest.plan_refs {
        for token in path_tokens(&plan.title) {
            add(token, FieldTag::File);
        }
    }

    for tech in &manifest.technologies {
        add(tech.to_lowercase(), FieldTag::Tech);
    }

    if manifest.has_subagents {
        add("subagent".to_string(), FieldTag::Subagent);
        add("agent".to_string(), FieldTag::Subagent);
    }

    for snippet in &manifest.context_snippets {
        for token in tokenize(snippet) {
            add(token, FieldTag::Snippet);
        }
    }

    let mut keywords: Vec<(String, FieldTag, f64)> = best
        .into_iter()
        .map(|(keyword, field)| (keyword, field, field.weight()))
        .collect();
    keywords.sort_by(|a, b| a.0.cmp(&b.0));
    keywords
}

/// Path-style tokenization: split on separators, then apply the standard
/// token filters.
fn path_tokens(path: &str) -> Vec<String> {
    path.to_lowercase()
        .split(['/', '\\', '_', '-', '.', ' '])
        .filter(|t| !t.is_empty())
        .filter(|t| {
            let len = t.chars().count();
            len >= MIN_TOKEN_CHARS && len <= MAX_TOKEN_CHARS
        })
        .filter(|t| !t.chars().all(|c| c.is_ascii_digit()))
        .filter(|t| !is_stop_word(t))
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use jacques_types::TokenTotals;

    fn manifest() -> SessionManifest {
        SessionManifest {
            session_id: "m1".into(),
            project_path: "/work/webapp".into(),
            title: Some("JWT auth flow".into()),
            started_at: None,
            ended_at: None,
            jsonl_modified_at: chrono::Utc::now(),
            message_count: 0,
            tool_call_count: 0,
            has_subagents: false,
            subagent_ids: vec![],
            had_auto_compact: false,
            tokens: TokenTotals::default(),
            mode: None,
            plan_count: 0,
            plan_refs: vec![],
            technologies: vec!["typescript".into(), "react".into()],
            user_questions: vec![],
            files_modified: vec!["src/auth/jwt.ts".into()],
            tools_used: vec![],
            context_snippets: vec![],
        }
    }

    fn score_of(keywords: &[(String, FieldTag, f64)], keyword: &str) -> Option<f64> {
        keywords
            .iter()
            .find(|(k, _, _)| k == keyword)
            .map(|(_, _, s)| *s)
    }

    #[test]
    fn test_title_beats_file_for_shared_keyword() {
        // "jwt" appears in both the title (2.0) and a file path (1.0).
        let keywords = extract_keywords(&manifest());
        assert_eq!(score_of(&keywords, "jwt"), Some(2.0));
        assert_eq!(score_of(&keywords, "auth"), Some(2.0));
        assert_eq!(score_of(&keywords, "src"), Some(1.0));
        assert_eq!(score_of(&keywords, "react"), Some(1.0));
    }

    #[test]
    fn test_subagent_literals() {
        let mut m = manifest();
        m.has_subagents = true;
        let keywords = extract_keywords(&m);
        assert_eq!(score_of(&keywords, "subagent"), Some(0.8));
        assert_eq!(score_of(&keywords, "agent"), Some(0.8));
    }

    #[test]
    fn test_tool_keeps_literal_and_tokenized_forms() {
        let mut m = manifest();
        m.tools_used = vec!["EnterPlanMode".into()];
        let keywords = extract_keywords(&m);
        assert_eq!(score_of(&keywords, "enterplanmode"), Some(1.2));
    }

    #[test]
    fn test_no_score_exceeds_max_weight() {
        let keywords = extract_keywords(&manifest());
        assert!(keywords.iter().all(|(_, _, s)| *s <= MAX_FIELD_WEIGHT));
    }

    #[test]
    fn test_path_tokens_split_on_separators() {
        assert_eq!(
            path_tokens("src/session_registry/focus-rules.v2.rs"),
            vec!["src", "session", "registry", "focus", "rules", "v2", "rs"]
        );
    }
}
