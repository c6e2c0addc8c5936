//! Subagent result artifacts.
//!
//! Each subagent transcript is boiled down to one markdown file: Explore
//! and Plan agents keep their final substantial output, web-search agents
//! get a structured query/result listing.

use jacques_types::{EntryKind, TranscriptEntry};

use crate::catalog::last_substantial_assistant;

/// Render the archived markdown for one subagent transcript.
pub fn render_subagent_artifact(
    agent_id: &str,
    agent_type: Option<&str>,
    entries: &[TranscriptEntry],
) -> String {
    let type_label = agent_type.unwrap_or("unknown");
    let mut out = format!("# Subagent {agent_id} ({type_label})\n\n");

    let searches: Vec<&TranscriptEntry> = entries
        .iter()
        .filter(|e| e.kind == EntryKind::WebSearch)
        .collect();

    let is_result_agent = matches!(agent_type, Some("Explore") | Some("Plan"));
    if !searches.is_empty() && !is_result_agent {
        out.push_str("## Searches\n\n");
        for search in searches {
            let query = search
                .content
                .search_query
                .as_deref()
                .unwrap_or("(unknown query)");
            match search.content.search_result_count {
                Some(count) => out.push_str(&format!("- `{query}` — {count} results\n")),
                None => out.push_str(&format!("- `{query}`\n")),
            }
        }
        if let Some(text) = last_assistant_text(entries) {
            out.push_str("\n## Findings\n\n");
            out.push_str(&text);
            out.push('\n');
        }
        return out;
    }

    match last_substantial_assistant(entries).or_else(|| last_assistant_text(entries)) {
        Some(text) => {
            out.push_str(&text);
            out.push('\n');
        }
        None => out.push_str("(no output)\n"),
    }
    out
}

fn last_assistant_text(entries: &[TranscriptEntry]) -> Option<String> {
    entries
        .iter()
        .rev()
        .filter(|e| e.kind == EntryKind::AssistantMessage)
        .find_map(|e| e.content.text.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assistant(text: &str) -> TranscriptEntry {
        let mut e = TranscriptEntry::new(EntryKind::AssistantMessage, "a");
        e.content.text = Some(text.to_string());
        e
    }

    fn search(query: &str, count: u32) -> TranscriptEntry {
        let mut e = TranscriptEntry::new(EntryKind::WebSearch, "w");
        e.content.search_query = Some(query.to_string());
        e.content.search_result_count = Some(count);
        e
    }

    #[test]
    fn test_plan_agent_keeps_final_output() {
        let plan_text = format!("# Cache Plan\n\n{}", "layered invalidation ".repeat(10));
        let artifact =
            render_subagent_artifact("ab12", Some("Plan"), &[assistant(&plan_text)]);
        assert!(artifact.starts_with("# Subagent ab12 (Plan)"));
        assert!(artifact.contains("# Cache Plan"));
    }

    #[test]
    fn test_search_agent_lists_queries() {
        let entries = vec![
            search("tokio graceful shutdown", 9),
            assistant("Use a watch channel."),
        ];
        let artifact = render_subagent_artifact("cd34", Some("web-search"), &entries);
        assert!(artifact.contains("## Searches"));
        assert!(artifact.contains("`tokio graceful shutdown` — 9 results"));
        assert!(artifact.contains("## Findings"));
    }

    #[test]
    fn test_empty_transcript_renders_placeholder() {
        let artifact = render_subagent_artifact("ef56", None, &[]);
        assert!(artifact.contains("(no output)"));
    }
}
