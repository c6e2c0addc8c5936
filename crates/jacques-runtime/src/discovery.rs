//! Startup process discovery.
//!
//! Scans the OS process table for live AI-tool processes and registers a
//! session for the freshest transcript in each process's project. These
//! placeholder registrations carry `DISCOVERED:` terminal keys until the
//! real hook event arrives.

use jacques_types::{JacquesPaths, SessionSource};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use sysinfo::System;

use crate::registry::RegisterRequest;

/// Process names treated as AI coding tools.
const TOOL_PROCESS_NAMES: [(&str, SessionSource); 2] = [
    ("claude", SessionSource::PrimaryAi),
    ("cursor", SessionSource::SecondaryAi),
];

/// Transcripts modified within this window count as belonging to a live
/// session.
const FRESH_WINDOW: Duration = Duration::from_secs(60);

/// Scan running processes and derive register requests for their live
/// sessions.
pub fn discover_sessions(paths: &JacquesPaths) -> Vec<RegisterRequest> {
    let system = System::new_all();
    let mut requests = Vec::new();

    for process in system.processes().values() {
        let name = process.name().to_string_lossy().to_lowercase();
        let Some((_, source)) = TOOL_PROCESS_NAMES
            .iter()
            .find(|(tool, _)| name.contains(tool))
        else {
            continue;
        };
        let Some(cwd) = process.cwd() else {
            continue;
        };

        for (session_id, transcript) in fresh_transcripts(paths, cwd) {
            let mut request = RegisterRequest::new(session_id, cwd.to_path_buf());
            request.source = *source;
            request.transcript_path = Some(transcript);
            request.terminal = None;
            request.discovered = true;
            requests.push(request);
        }
    }

    requests.sort_by(|a, b| a.session_id.cmp(&b.session_id));
    requests.dedup_by(|a, b| a.session_id == b.session_id);
    requests
}

/// Transcript files for a project directory: everything modified within
/// the fresh window, or the single most recent file when nothing is fresh.
pub fn fresh_transcripts(paths: &JacquesPaths, project: &Path) -> Vec<(String, PathBuf)> {
    let dir = paths.project_transcript_dir(project);
    let Ok(entries) = std::fs::read_dir(&dir) else {
        return Vec::new();
    };

    let now = SystemTime::now();
    let mut candidates: Vec<(String, PathBuf, SystemTime)> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "jsonl"))
        .filter_map(|p| {
            let session_id = p.file_stem()?.to_string_lossy().to_string();
            // Session transcripts are named by UUID; anything else in the
            // directory is not a session.
            uuid::Uuid::parse_str(&session_id).ok()?;
            let modified = p.metadata().ok()?.modified().ok()?;
            Some((session_id, p, modified))
        })
        .collect();

    if candidates.is_empty() {
        return Vec::new();
    }

    candidates.sort_by(|a, b| b.2.cmp(&a.2));

    let fresh: Vec<(String, PathBuf)> = candidates
        .iter()
        .filter(|(_, _, modified)| {
            now.duration_since(*modified)
                .map(|age| age < FRESH_WINDOW)
                .unwrap_or(false)
        })
        .map(|(id, path, _)| (id.clone(), path.clone()))
        .collect();

    if fresh.is_empty() {
        let (id, path, _) = &candidates[0];
        vec![(id.clone(), path.clone())]
    } else {
        fresh
    }
}
