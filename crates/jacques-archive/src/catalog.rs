//! Cross-session plan cataloging.
//!
//! Cataloging a plan under a project either merges it into an existing
//! catalog entry (three dedup tiers: content hash, body hash, similarity)
//! or writes a new plan file and index entry. The operation is
//! all-or-nothing per plan: on error no in-memory state changes.

use chrono::{DateTime, Utc};
use jacques_types::{EntryKind, Error, Plan, ProjectIndex, ProjectPaths, Result, TranscriptEntry};
use std::path::Path;

use crate::text::{
    body_hash, content_hash, jaccard_similarity, length_bucket, normalize_content, slugify,
};

/// Plans at or above this similarity are the same plan.
pub const SIMILARITY_THRESHOLD: f64 = 0.75;

/// Minimum length of a "substantial" assistant message when pulling plan
/// content out of a subagent transcript.
const SUBSTANTIAL_CHARS: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogOutcome {
    pub plan_id: String,
    /// False when a new plan file was created.
    pub merged: bool,
}

/// Catalog one plan's content under a project.
pub fn catalog_plan(
    project: &ProjectPaths,
    index: &mut ProjectIndex,
    title: &str,
    content: &str,
    session_id: &str,
    now: DateTime<Utc>,
) -> Result<CatalogOutcome> {
    let normalized = normalize_content(content);
    let c_hash = content_hash(content);
    let b_hash = body_hash(content);
    let bucket = length_bucket(&normalized);

    if let Some(existing) = find_duplicate(index, &c_hash, &b_hash, bucket, &normalized, project) {
        let plan = index
            .plans
            .iter_mut()
            .find(|p| p.id == existing)
            .ok_or_else(|| Error::invariant(format!("catalog entry vanished: {existing}")))?;
        let changed = plan.sessions.insert(session_id.to_string());
        if changed {
            plan.updated_at = now;
        }
        return Ok(CatalogOutcome {
            plan_id: plan.id.clone(),
            merged: true,
        });
    }

    // New plan: pick a collision-safe dated filename, write the file first,
    // then record the entry, so a failed write leaves the index untouched.
    let filename = unique_filename(project, index, title, now);
    let plans_dir = project.plans_dir();
    std::fs::create_dir_all(&plans_dir)?;
    std::fs::write(plans_dir.join(&filename), content)?;

    let id = filename
        .strip_suffix(".md")
        .unwrap_or(&filename)
        .to_string();
    let mut sessions = std::collections::BTreeSet::new();
    sessions.insert(session_id.to_string());
    index.plans.push(Plan {
        id: id.clone(),
        title: title.to_string(),
        filename: filename.clone(),
        path: format!("plans/{filename}"),
        content_hash: c_hash,
        body_hash: b_hash,
        created_at: now,
        updated_at: now,
        sessions,
    });

    Ok(CatalogOutcome {
        plan_id: id,
        merged: false,
    })
}

fn find_duplicate(
    index: &ProjectIndex,
    c_hash: &str,
    b_hash: &str,
    bucket: crate::text::LengthBucket,
    normalized: &str,
    project: &ProjectPaths,
) -> Option<String> {
    // Tier 1: identical content.
    if let Some(plan) = index.plans.iter().find(|p| p.content_hash == c_hash) {
        return Some(plan.id.clone());
    }
    // Tier 2: identical body under a different title.
    if let Some(plan) = index.plans.iter().find(|p| p.body_hash == b_hash) {
        return Some(plan.id.clone());
    }
    // Tier 3: near-identical wording within the same length bucket.
    for plan in &index.plans {
        let Ok(existing) = std::fs::read_to_string(project.root().join(&plan.path)) else {
            continue;
        };
        let existing_normalized = normalize_content(&existing);
        if length_bucket(&existing_normalized) != bucket {
            continue;
        }
        if jaccard_similarity(normalized, &existing_normalized) >= SIMILARITY_THRESHOLD {
            return Some(plan.id.clone());
        }
    }
    None
}

/// `YYYY-MM-DD_slug.md`, versioned `-v2`, `-v3`, ... while the name is
/// taken either on disk or in the index.
fn unique_filename(
    project: &ProjectPaths,
    index: &ProjectIndex,
    title: &str,
    now: DateTime<Utc>,
) -> String {
    let base = format!("{}_{}", now.format("%Y-%m-%d"), slugify(title));
    let mut candidate = format!("{base}.md");
    let mut version = 1;
    while index.plans.iter().any(|p| p.filename == candidate)
        || project.plans_dir().join(&candidate).exists()
    {
        version += 1;
        candidate = format!("{base}-v{version}.md");
    }
    candidate
}

/// Pull the plan text a Plan subagent produced: the last substantial
/// assistant message in its own transcript.
pub fn subagent_plan_content(transcript: &Path) -> Result<Option<String>> {
    let outcome = jacques_reader::parse(transcript)?;
    Ok(last_substantial_assistant(&outcome.entries))
}

/// Last assistant message that is long enough and contains a heading.
pub fn last_substantial_assistant(entries: &[TranscriptEntry]) -> Option<String> {
    entries
        .iter()
        .rev()
        .filter(|e| e.kind == EntryKind::AssistantMessage)
        .filter_map(|e| e.content.text.as_ref())
        .find(|text| text.chars().count() > SUBSTANTIAL_CHARS && text.contains('#'))
        .cloned()
}
