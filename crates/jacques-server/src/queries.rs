//! Read-side lookups the REST handlers delegate to. Pure filesystem reads
//! against the catalog and archive layouts.

use jacques_types::{
    Error, JacquesPaths, Plan, ProjectIndex, ProjectPaths, Result, SessionManifest,
};
use std::path::Path;

/// Load a project's catalog index; absent file is an empty catalog.
pub fn load_project_index(project_path: &Path) -> Result<ProjectIndex> {
    let path = ProjectPaths::new(project_path).index_file();
    if !path.exists() {
        return Ok(ProjectIndex::default());
    }
    let content = std::fs::read_to_string(&path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Load one session manifest from a project catalog.
pub fn load_manifest(project_path: &Path, session_id: &str) -> Result<SessionManifest> {
    let path = ProjectPaths::new(project_path).manifest_file(session_id);
    if !path.exists() {
        return Err(Error::not_found(format!("manifest for session {session_id}")));
    }
    let content = std::fs::read_to_string(&path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Load an archived manifest by id.
pub fn load_archived_manifest(paths: &JacquesPaths, manifest_id: &str) -> Result<SessionManifest> {
    let path = paths.archived_manifest_file(manifest_id);
    if !path.exists() {
        return Err(Error::not_found(format!("archived manifest {manifest_id}")));
    }
    let content = std::fs::read_to_string(&path)?;
    Ok(serde_json::from_str(&content)?)
}

/// All archived manifests, optionally restricted to one project path.
pub fn list_archived_manifests(
    paths: &JacquesPaths,
    project_filter: Option<&str>,
) -> Result<Vec<SessionManifest>> {
    let dir = paths.manifest_archive_dir();
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut manifests = Vec::new();
    for entry in std::fs::read_dir(&dir)? {
        let path = entry?.path();
        if path.extension().is_none_or(|ext| ext != "json") {
            continue;
        }
        let content = std::fs::read_to_string(&path)?;
        let manifest: SessionManifest = match serde_json::from_str(&content) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "skipping unreadable manifest");
                continue;
            }
        };
        if let Some(filter) = project_filter
            && manifest.project_path != filter
        {
            continue;
        }
        manifests.push(manifest);
    }

    manifests.sort_by(|a, b| b.ended_at.cmp(&a.ended_at));
    Ok(manifests)
}

/// Plan catalog entry plus its markdown content, by catalog id.
pub fn plan_content_by_id(project_path: &Path, catalog_id: &str) -> Result<(Plan, String)> {
    let index = load_project_index(project_path)?;
    let plan = index
        .plan_by_id(catalog_id)
        .ok_or_else(|| Error::not_found(format!("plan {catalog_id}")))?
        .clone();
    let file = ProjectPaths::new(project_path).root().join(&plan.path);
    let content = std::fs::read_to_string(&file)?;
    Ok((plan, content))
}

/// Plan content addressed by session and message index: follow the
/// manifest's plan reference to the catalog.
pub fn plan_content_by_session(
    project_path: &Path,
    session_id: &str,
    message_index: usize,
) -> Result<(Plan, String)> {
    let manifest = load_manifest(project_path, session_id)?;
    let reference = manifest
        .plan_refs
        .iter()
        .find(|r| r.message_index == message_index)
        .ok_or_else(|| {
            Error::not_found(format!(
                "no plan at message index {message_index} in session {session_id}"
            ))
        })?;
    let catalog_id = reference.catalog_id.as_deref().ok_or_else(|| {
        Error::invariant(format!(
            "plan reference at index {message_index} has no catalog id"
        ))
    })?;
    plan_content_by_id(project_path, catalog_id)
}

/// Subagent artifact markdown.
pub fn subagent_content(project_path: &Path, agent_id: &str) -> Result<String> {
    let path = ProjectPaths::new(project_path).subagent_file(agent_id);
    if !path.exists() {
        return Err(Error::not_found(format!("subagent {agent_id}")));
    }
    Ok(std::fs::read_to_string(&path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jacques_archive::{ExtractOptions, Extractor};
    use jacques_testing::{TestWorld, TranscriptBuilder};
    use std::sync::atomic::AtomicBool;

    const PLAN_TEXT: &str = "Implement the following plan:\n\n# Search Rework\n\nReplace the ad-hoc scanning with an inverted index, scoring by field weight and caching hot queries.";

    fn extracted_world() -> (TestWorld, std::path::PathBuf) {
        let world = TestWorld::new();
        let project = world.create_project("webapp");
        let mut builder = TranscriptBuilder::new("s-q");
        builder.user(PLAN_TEXT).assistant("On it.");
        world.write_transcript(&project, "s-q", &builder);
        Extractor::new(world.paths())
            .extract_project(&project, &ExtractOptions::default(), &AtomicBool::new(false))
            .unwrap();
        (world, project)
    }

    #[test]
    fn test_plan_lookup_by_id_and_by_session() {
        let (_world, project) = extracted_world();
        let manifest = load_manifest(&project, "s-q").unwrap();
        let reference = &manifest.plan_refs[0];
        let catalog_id = reference.catalog_id.as_deref().unwrap();

        let (plan, content) = plan_content_by_id(&project, catalog_id).unwrap();
        assert_eq!(plan.title, "Search Rework");
        assert!(content.contains("inverted index"));

        let (plan2, content2) =
            plan_content_by_session(&project, "s-q", reference.message_index).unwrap();
        assert_eq!(plan2.id, plan.id);
        assert_eq!(content2, content);
    }

    #[test]
    fn test_missing_manifest_is_not_found() {
        let world = TestWorld::new();
        let project = world.create_project("empty");
        let err = load_manifest(&project, "ghost").unwrap_err();
        assert_eq!(err.kind(), jacques_types::ErrorKind::NotFound);
    }

    #[test]
    fn test_missing_plan_is_not_found() {
        let (_world, project) = extracted_world();
        let err = plan_content_by_id(&project, "nope").unwrap_err();
        assert_eq!(err.kind(), jacques_types::ErrorKind::NotFound);
    }
}
