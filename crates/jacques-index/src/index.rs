//! The global inverted index file: one JSON artifact mapping keywords to
//! scored manifest references.
//!
//! The index is a pure function of the manifests on disk; a corrupted file
//! is recovered by rebuilding, never repaired in place.

use chrono::{DateTime, Utc};
use jacques_types::{write_atomic, Result, SessionManifest};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::fields::{extract_keywords, FieldTag};
use crate::tokenize::tokenize;

pub const SEARCH_LIMIT_CAP: usize = 50;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KeywordRef {
    pub manifest_id: String,
    pub field: FieldTag,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectStats {
    pub path: String,
    pub count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_activity: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IndexMetadata {
    pub total_conversations: usize,
    pub total_keywords: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchIndex {
    #[serde(default)]
    pub keywords: BTreeMap<String, Vec<KeywordRef>>,
    #[serde(default)]
    pub projects: BTreeMap<String, ProjectStats>,
    #[serde(default)]
    pub metadata: IndexMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub manifest_id: String,
    pub score: f64,
}

/// Post-ranking filters and pagination.
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub project_id: Option<String>,
    pub ended_after: Option<DateTime<Utc>>,
    pub ended_before: Option<DateTime<Utc>>,
    pub technologies: Vec<String>,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl SearchIndex {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let mut bytes = serde_json::to_vec_pretty(self)?;
        bytes.push(b'\n');
        write_atomic(path, &bytes)
    }

    /// Index one manifest. Re-adding an already indexed manifest first
    /// removes its old references, so the call is idempotent.
    pub fn add(&mut self, manifest_id: &str, project_id: &str, manifest: &SessionManifest) {
        self.remove(manifest_id, project_id);

        for (keyword, field, score) in extract_keywords(manifest) {
            let bucket = self.keywords.entry(keyword).or_default();
            match bucket.iter_mut().find(|r| r.manifest_id == manifest_id) {
                Some(existing) if existing.score >= score => {}
                Some(existing) => {
                    existing.field = field;
                    existing.score = score;
                }
                None => bucket.push(KeywordRef {
                    manifest_id: manifest_id.to_string(),
                    field,
                    score,
                }),
            }
        }

        let stats = self
            .projects
            .entry(project_id.to_string())
            .or_insert_with(|| ProjectStats {
                path: manifest.project_path.clone(),
                count: 0,
                last_activity: None,
            });
        stats.count += 1;
        if let Some(ended) = manifest.ended_at
            && stats.last_activity.is_none_or(|last| ended > last)
        {
            stats.last_activity = Some(ended);
        }

        self.metadata.total_conversations += 1;
        self.metadata.total_keywords = self.keywords.len();
        self.last_updated = Some(Utc::now());
    }

    /// Remove a manifest from every bucket, dropping buckets that empty
    /// out. A no-op when the manifest is not indexed.
    pub fn remove(&mut self, manifest_id: &str, project_id: &str) {
        let mut removed_any = false;
        self.keywords.retain(|_, bucket| {
            let before = bucket.len();
            bucket.retain(|r| r.manifest_id != manifest_id);
            removed_any |= bucket.len() != before;
            !bucket.is_empty()
        });

        if !removed_any {
            return;
        }

        if let Some(stats) = self.projects.get_mut(project_id) {
            stats.count = stats.count.saturating_sub(1);
            if stats.count == 0 {
                self.projects.remove(project_id);
            }
        }
        self.metadata.total_conversations = self.metadata.total_conversations.saturating_sub(1);
        self.metadata.total_keywords = self.keywords.len();
        self.last_updated = Some(Utc::now());
    }

    /// Rank manifests for a query: per-token bucket lookup, scores summed
    /// per manifest, ordered by score descending with stable id ties.
    pub fn search(&self, query: &str) -> Vec<SearchHit> {
        let tokens = tokenize(query);
        if tokens.is_empty() {
            return Vec::new();
        }

        let mut scores: HashMap<&str, f64> = HashMap::new();
        for token in &tokens {
            if let Some(bucket) = self.keywords.get(token) {
                for reference in bucket {
                    *scores.entry(reference.manifest_id.as_str()).or_default() +=
                        reference.score;
                }
            }
        }

        let mut hits: Vec<SearchHit> = scores
            .into_iter()
            .map(|(id, score)| SearchHit {
                manifest_id: id.to_string(),
                score,
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.manifest_id.cmp(&b.manifest_id))
        });
        hits
    }
}

/// Apply post-ranking filters and pagination; `load` resolves a manifest
/// id to its manifest (filters needing manifest data drop unresolvable
/// hits).
pub fn filter_hits(
    hits: Vec<SearchHit>,
    filters: &SearchFilters,
    load: impl Fn(&str) -> Option<SessionManifest>,
) -> Vec<SearchHit> {
    let needs_manifest = filters.project_id.is_some()
        || filters.ended_after.is_some()
        || filters.ended_before.is_some()
        || !filters.technologies.is_empty();

    let filtered: Vec<SearchHit> = hits
        .into_iter()
        .filter(|hit| {
            if !needs_manifest {
                return true;
            }
            let Some(manifest) = load(&hit.manifest_id) else {
                return false;
            };
            if let Some(project) = &filters.project_id
                && &manifest.project_path != project
            {
                return false;
            }
            if let Some(after) = filters.ended_after
                && manifest.ended_at.is_none_or(|ended| ended < after)
            {
                return false;
            }
            if let Some(before) = filters.ended_before
                && manifest.ended_at.is_none_or(|ended| ended > before)
            {
                return false;
            }
            if !filters.technologies.is_empty() {
                let wanted: Vec<String> =
                    filters.technologies.iter().map(|t| t.to_lowercase()).collect();
                if !manifest
                    .technologies
                    .iter()
                    .any(|t| wanted.contains(&t.to_lowercase()))
                {
                    return false;
                }
            }
            true
        })
        .collect();

    let limit = filters.limit.unwrap_or(SEARCH_LIMIT_CAP).min(SEARCH_LIMIT_CAP);
    filtered.into_iter().skip(filters.offset).take(limit).collect()
}

/// Rebuild the whole index from the manifests in a directory. The result
/// depends only on the manifest files.
pub fn rebuild_from_manifests(manifest_dir: &Path) -> Result<SearchIndex> {
    let mut index = SearchIndex::default();
    if !manifest_dir.is_dir() {
        return Ok(index);
    }

    let mut files: Vec<_> = std::fs::read_dir(manifest_dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();

    for file in files {
        let content = std::fs::read_to_string(&file)?;
        let manifest: SessionManifest = match serde_json::from_str(&content) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(file = %file.display(), error = %e, "skipping unreadable manifest");
                continue;
            }
        };
        let manifest_id = manifest.session_id.clone();
        let project_id = manifest.project_path.clone();
        index.add(&manifest_id, &project_id, &manifest);
    }
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jacques_types::TokenTotals;

    fn manifest(id: &str, project: &str, title: &str) -> SessionManifest {
        SessionManifest {
            session_id: id.into(),
            project_path: project.into(),
            title: Some(title.into()),
            started_at: None,
            ended_at: Some("2025-05-02T08:00:00Z".parse().unwrap()),
            jsonl_modified_at: "2025-05-02T08:00:00Z".parse().unwrap(),
            message_count: 1,
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

    #[test]
    fn test_search_scores_by_field_weight() {
        let mut index = SearchIndex::default();
        let m = manifest("m1", "/work/webapp", "JWT auth flow");
        index.add("m1", "/work/webapp", &m);

        // "jwt" comes from both title (2.0) and a file path token (1.0);
        // one ref per keyword per manifest keeps the highest weight.
        let hits = index.search("jwt");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].manifest_id, "m1");
        assert_eq!(hits[0].score, 2.0);

        let hits = index.search("react");
        assert_eq!(hits[0].score, 1.0);
    }

    #[test]
    fn test_multi_token_query_sums_scores() {
        let mut index = SearchIndex::default();
        index.add("m1", "/p", &manifest("m1", "/p", "JWT auth flow"));

        let hits = index.search("jwt auth");
        assert_eq!(hits[0].score, 4.0);
    }

    #[test]
    fn test_empty_query_returns_nothing() {
        let mut index = SearchIndex::default();
        index.add("m1", "/p", &manifest("m1", "/p", "JWT auth flow"));
        assert!(index.search("").is_empty());
        assert!(index.search("the of and").is_empty());
    }

    #[test]
    fn test_ranking_orders_by_score_then_id() {
        let mut index = SearchIndex::default();
        index.add("m2", "/p", &manifest("m2", "/p", "jwt everywhere"));
        let mut weaker = manifest("m1", "/p", "unrelated title");
        weaker.context_snippets = vec!["mentions jwt once".into()];
        index.add("m1", "/p", &weaker);

        let hits = index.search("jwt");
        assert_eq!(hits[0].manifest_id, "m2");
        assert_eq!(hits[1].manifest_id, "m1");
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn test_add_then_remove_restores_state() {
        let mut index = SearchIndex::default();
        index.add("m1", "/p", &manifest("m1", "/p", "base"));
        let mut snapshot = index.clone();
        snapshot.last_updated = None;
        let before = serde_json::to_string(&snapshot).unwrap();

        index.add("m2", "/p", &manifest("m2", "/p", "transient entry"));
        index.remove("m2", "/p");

        index.last_updated = None;
        let after = serde_json::to_string(&index).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_readd_is_idempotent() {
        let mut index = SearchIndex::default();
        let m = manifest("m1", "/p", "JWT auth flow");
        index.add("m1", "/p", &m);
        index.add("m1", "/p", &m);

        assert_eq!(index.metadata.total_conversations, 1);
        assert_eq!(index.projects.get("/p").unwrap().count, 1);
        for bucket in index.keywords.values() {
            assert_eq!(
                bucket.iter().filter(|r| r.manifest_id == "m1").count(),
                1
            );
        }
    }

    #[test]
    fn test_remove_unknown_manifest_is_noop() {
        let mut index = SearchIndex::default();
        index.add("m1", "/p", &manifest("m1", "/p", "base"));
        let conversations = index.metadata.total_conversations;
        index.remove("ghost", "/p");
        assert_eq!(index.metadata.total_conversations, conversations);
    }

    #[test]
    fn test_filters_by_project_and_technology() {
        let mut index = SearchIndex::default();
        let m1 = manifest("m1", "/p1", "jwt in project one");
        let mut m2 = manifest("m2", "/p2", "jwt in project two");
        m2.technologies = vec!["rust".into()];
        index.add("m1", "/p1", &m1);
        index.add("m2", "/p2", &m2);

        let loader = move |id: &str| -> Option<SessionManifest> {
            match id {
                "m1" => Some(m1.clone()),
                "m2" => Some(m2.clone()),
                _ => None,
            }
        };

        let hits = index.search("jwt");
        assert_eq!(hits.len(), 2);

        let project_filtered = filter_hits(
            hits.clone(),
            &SearchFilters {
                project_id: Some("/p1".into()),
                ..Default::default()
            },
            loader,
        );
        assert_eq!(project_filtered.len(), 1);
        assert_eq!(project_filtered[0].manifest_id, "m1");

        let loader2 = |id: &str| -> Option<SessionManifest> {
            match id {
                "m1" => Some(manifest("m1", "/p1", "jwt in project one")),
                "m2" => {
                    let mut m = manifest("m2", "/p2", "jwt in project two");
                    m.technologies = vec!["rust".into()];
                    Some(m)
                }
                _ => None,
            }
        };
        let tech_filtered = filter_hits(
            index.search("jwt"),
            &SearchFilters {
                technologies: vec!["rust".into()],
                ..Default::default()
            },
            loader2,
        );
        assert_eq!(tech_filtered.len(), 1);
        assert_eq!(tech_filtered[0].manifest_id, "m2");
    }

    #[test]
    fn test_pagination_caps_at_fifty() {
        let mut index = SearchIndex::default();
        for i in 0..60 {
            let id = format!("m{i:02}");
            index.add(&id, "/p", &manifest(&id, "/p", "jwt heavy session"));
        }
        let hits = index.search("jwt");
        assert_eq!(hits.len(), 60);

        let page = filter_hits(hits.clone(), &SearchFilters::default(), |_| None);
        assert_eq!(page.len(), SEARCH_LIMIT_CAP);

        let second_page = filter_hits(
            hits,
            &SearchFilters {
                offset: 55,
                limit: Some(100),
                ..Default::default()
            },
            |_| None,
        );
        assert_eq!(second_page.len(), 5);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");

        let mut index = SearchIndex::default();
        index.add("m1", "/p", &manifest("m1", "/p", "JWT auth flow"));
        index.save(&path).unwrap();

        let loaded = SearchIndex::load(&path).unwrap();
        assert_eq!(loaded.metadata.total_conversations, 1);
        assert_eq!(loaded.search("jwt")[0].manifest_id, "m1");
    }

    #[test]
    fn test_rebuild_from_manifest_dir() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..3 {
            let m = manifest(&format!("m{i}"), "/p", "jwt sessions everywhere");
            std::fs::write(
                dir.path().join(format!("m{i}.json")),
                serde_json::to_vec_pretty(&m).unwrap(),
            )
            .unwrap();
        }
        std::fs::write(dir.path().join("broken.json"), b"{not json").unwrap();

        let index = rebuild_from_manifests(dir.path()).unwrap();
        assert_eq!(index.metadata.total_conversations, 3);
        assert_eq!(index.search("jwt").len(), 3);
    }
}
