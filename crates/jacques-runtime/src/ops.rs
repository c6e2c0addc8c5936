//! Long-running archive operations with streamed progress.
//!
//! These run on blocking threads (the server wraps them in
//! `spawn_blocking`) and report `{phase, total, completed, current}`
//! snapshots through a callback, ending in a summary or an error.

use jacques_archive::{ExtractOptions, Extractor};
use jacques_index::SearchIndex;
use jacques_types::{
    Error as CoreError, JacquesPaths, ProjectPaths, SessionManifest, SessionsIndexCache,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::Result;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub phase: String,
    pub total: usize,
    pub completed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveSummary {
    pub projects: usize,
    pub manifests: usize,
    pub keywords: usize,
    pub extraction_errors: usize,
}

/// Extract every project, mirror the manifests into the global archive,
/// and rebuild the keyword index over them.
pub fn initialize_archive(
    paths: &JacquesPaths,
    report: &mut dyn FnMut(Progress),
    cancel: &AtomicBool,
) -> Result<ArchiveSummary> {
    report(Progress {
        phase: "extract".into(),
        total: 0,
        completed: 0,
        current: None,
    });

    let extractor = Extractor::new(paths);
    let extraction = extractor.extract_all(&ExtractOptions::default(), cancel)?;
    if extraction.cancelled || cancel.load(Ordering::Relaxed) {
        return Err(CoreError::Cancelled.into());
    }

    let cache = SessionsIndexCache::load(&paths.sessions_index_file())?;
    let manifest_files = collect_manifest_files(&cache);

    let mut index = SearchIndex::default();
    let manifest_dir = paths.manifest_archive_dir();
    std::fs::create_dir_all(&manifest_dir)?;

    let total = manifest_files.len();
    let mut completed = 0;
    for file in manifest_files {
        if cancel.load(Ordering::Relaxed) {
            return Err(CoreError::Cancelled.into());
        }
        let content = std::fs::read_to_string(&file)?;
        let manifest: SessionManifest = match serde_json::from_str(&content) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(file = %file.display(), error = %e, "skipping unreadable manifest");
                continue;
            }
        };

        let archived = paths.archived_manifest_file(&manifest.session_id);
        jacques_types::write_atomic(&archived, content.as_bytes())?;
        index.add(&manifest.session_id, &manifest.project_path, &manifest);

        completed += 1;
        report(Progress {
            phase: "index".into(),
            total,
            completed,
            current: Some(manifest.session_id.clone()),
        });
    }

    index.save(&paths.search_index_file())?;

    mirror_catalog_artifacts(paths, &cache, report)?;

    Ok(ArchiveSummary {
        projects: cache.projects.len(),
        manifests: completed,
        keywords: index.metadata.total_keywords,
        extraction_errors: extraction.errors.len(),
    })
}

/// Copy plan files and subagent artifacts from each project catalog into
/// the global archive tree.
fn mirror_catalog_artifacts(
    paths: &JacquesPaths,
    cache: &SessionsIndexCache,
    report: &mut dyn FnMut(Progress),
) -> Result<()> {
    let projects: Vec<&String> = cache.projects.values().collect();
    let total = projects.len();

    for (i, project_path) in projects.into_iter().enumerate() {
        let project_path = std::path::Path::new(project_path);
        let project = ProjectPaths::new(project_path);
        let slug = jacques_types::project_slug(project_path);

        if let Ok(entries) = std::fs::read_dir(project.plans_dir()) {
            let archive_plans = paths.archive_plans_dir(&slug);
            std::fs::create_dir_all(&archive_plans)?;
            for entry in entries.filter_map(|e| e.ok()) {
                let source = entry.path();
                if source.extension().is_some_and(|ext| ext == "md")
                    && let Some(name) = source.file_name()
                {
                    std::fs::copy(&source, archive_plans.join(name))?;
                }
            }
        }

        if let Ok(content) = std::fs::read_to_string(project.index_file())
            && let Ok(catalog) = serde_json::from_str::<jacques_types::ProjectIndex>(&content)
        {
            for subagent in &catalog.subagents {
                let markdown = std::fs::read_to_string(
                    project.root().join(&subagent.path),
                )
                .unwrap_or_default();
                let artifact = serde_json::json!({
                    "agentId": subagent.agent_id,
                    "agentType": subagent.agent_type,
                    "sessionId": subagent.session_id,
                    "content": markdown,
                });
                jacques_types::write_atomic(
                    &paths.archive_subagent_file(&subagent.agent_id),
                    &serde_json::to_vec_pretty(&artifact)?,
                )?;
            }
        }

        report(Progress {
            phase: "mirror".into(),
            total,
            completed: i + 1,
            current: Some(slug),
        });
    }
    Ok(())
}

/// Drop and rebuild the keyword index from the archived manifests alone.
pub fn rebuild_index(
    paths: &JacquesPaths,
    report: &mut dyn FnMut(Progress),
) -> Result<ArchiveSummary> {
    report(Progress {
        phase: "rebuild".into(),
        total: 0,
        completed: 0,
        current: None,
    });

    let index = jacques_index::rebuild_from_manifests(&paths.manifest_archive_dir())?;
    index.save(&paths.search_index_file())?;

    Ok(ArchiveSummary {
        projects: index.projects.len(),
        manifests: index.metadata.total_conversations,
        keywords: index.metadata.total_keywords,
        extraction_errors: 0,
    })
}

fn collect_manifest_files(cache: &SessionsIndexCache) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for project_path in cache.projects.values() {
        let sessions_dir = ProjectPaths::new(std::path::Path::new(project_path)).sessions_dir();
        let Ok(entries) = std::fs::read_dir(&sessions_dir) else {
            continue;
        };
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
    }
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use jacques_testing::{TestWorld, TranscriptBuilder};

    #[test]
    fn test_initialize_archive_end_to_end() {
        let world = TestWorld::new();
        let project = world.create_project("webapp");

        let mut builder = TranscriptBuilder::new("s-one");
        builder
            .user(concat!(
                "Implement the following plan:\n\n# JWT Auth\n\n",
                "Add JWT with refresh tokens covering generation, validation, ",
                "secure storage, and middleware wiring for protected routes."
            ))
            .assistant("JWT auth wired with refresh tokens.");
        world.write_transcript(&project, "s-one", &builder);

        let mut progress = Vec::new();
        let summary = initialize_archive(
            world.paths(),
            &mut |p| progress.push(p),
            &AtomicBool::new(false),
        )
        .unwrap();

        assert_eq!(summary.manifests, 1);
        assert!(summary.keywords > 0);
        assert!(progress.iter().any(|p| p.phase == "extract"));
        assert!(progress.iter().any(|p| p.phase == "index"));

        // Archived manifest exists and the index finds it.
        assert!(world.paths().archived_manifest_file("s-one").exists());
        let index = SearchIndex::load(&world.paths().search_index_file()).unwrap();
        let hits = index.search("jwt");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].manifest_id, "s-one");

        // The plan file was mirrored into the global archive.
        let mirrored: Vec<_> = std::fs::read_dir(world.paths().archive_plans_dir("webapp"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(mirrored.len(), 1);
        assert!(mirrored[0].ends_with("_jwt-auth.md"));
    }

    #[test]
    fn test_rebuild_matches_initialize() {
        let world = TestWorld::new();
        let project = world.create_project("webapp");

        let mut builder = TranscriptBuilder::new("s-one");
        builder.user("postgres migration work").assistant("Done.");
        world.write_transcript(&project, "s-one", &builder);

        initialize_archive(world.paths(), &mut |_| {}, &AtomicBool::new(false)).unwrap();
        let initial = SearchIndex::load(&world.paths().search_index_file()).unwrap();

        let summary = rebuild_index(world.paths(), &mut |_| {}).unwrap();
        let rebuilt = SearchIndex::load(&world.paths().search_index_file()).unwrap();

        assert_eq!(summary.manifests, 1);
        assert_eq!(
            initial.metadata.total_keywords,
            rebuilt.metadata.total_keywords
        );
        assert_eq!(
            serde_json::to_value(&initial.keywords).unwrap(),
            serde_json::to_value(&rebuilt.keywords).unwrap()
        );
    }

    #[test]
    fn test_cancelled_initialize_reports_cancelled() {
        let world = TestWorld::new();
        let err =
            initialize_archive(world.paths(), &mut |_| {}, &AtomicBool::new(true)).unwrap_err();
        assert_eq!(err.kind(), jacques_types::ErrorKind::Cancelled);
    }
}
