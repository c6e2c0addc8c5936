//! Catalog extraction: project transcript logs -> per-project catalog.
//!
//! Idempotent and incremental; a transcript whose mtime has not advanced
//! past its manifest is skipped. One broken session never aborts the
//! project, and a cancellation flag is honored between sessions.

use chrono::{DateTime, Utc};
use jacques_types::{
    write_atomic, EntryKind, Error, JacquesPaths, ProjectIndex, ProjectPaths, Result,
    SessionIndexEntry, SessionManifest, SessionMode, SessionsIndexCache, SubagentIndexEntry,
    TokenTotals, TranscriptEntry,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::catalog::{catalog_plan, subagent_plan_content};
use crate::dedup::dedupe_within_session;
use crate::detect::{detect_plans, DetectedPlan, PLAN_TRIGGERS};
use crate::technologies::detect_technologies;
use crate::text::truncate_chars;

const QUESTION_MAX_CHARS: usize = 200;
const SNIPPET_MAX_CHARS: usize = 300;
const MAX_SNIPPETS: usize = 20;

#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    /// Re-extract sessions even when the manifest is current.
    pub force: bool,
}

#[derive(Debug, Clone)]
pub struct SessionError {
    pub session_id: String,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct ExtractionReport {
    pub extracted: Vec<String>,
    pub skipped: Vec<String>,
    pub errors: Vec<SessionError>,
    pub cancelled: bool,
}

impl ExtractionReport {
    fn absorb(&mut self, other: ExtractionReport) {
        self.extracted.extend(other.extracted);
        self.skipped.extend(other.skipped);
        self.errors.extend(other.errors);
        self.cancelled |= other.cancelled;
    }
}

/// Advisory lock on a project catalog directory; released on drop.
struct CatalogLock {
    path: PathBuf,
}

impl CatalogLock {
    fn acquire(project: &ProjectPaths) -> Result<Self> {
        std::fs::create_dir_all(project.root())?;
        let path = project.lock_file();
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(_) => Ok(Self { path }),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Err(Error::conflict(
                format!("catalog locked by another extractor: {}", path.display()),
            )),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for CatalogLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

pub struct Extractor<'a> {
    paths: &'a JacquesPaths,
}

impl<'a> Extractor<'a> {
    pub fn new(paths: &'a JacquesPaths) -> Self {
        Self { paths }
    }

    /// Extract every session of one project into its catalog directory.
    pub fn extract_project(
        &self,
        project_path: &Path,
        opts: &ExtractOptions,
        cancel: &AtomicBool,
    ) -> Result<ExtractionReport> {
        let mut report = ExtractionReport::default();
        let transcript_dir = self.paths.project_transcript_dir(project_path);
        if !transcript_dir.is_dir() {
            return Ok(report);
        }

        let project = ProjectPaths::new(project_path);
        let _lock = CatalogLock::acquire(&project)?;
        let mut index = load_project_index(&project)?;

        let mut transcripts: Vec<PathBuf> = std::fs::read_dir(&transcript_dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "jsonl"))
            .collect();
        transcripts.sort();

        for transcript in transcripts {
            if cancel.load(Ordering::Relaxed) {
                report.cancelled = true;
                break;
            }
            let session_id = match transcript.file_stem() {
                Some(stem) => stem.to_string_lossy().to_string(),
                None => continue,
            };

            match self.extract_session(&project, project_path, &mut index, &session_id, &transcript, opts)
            {
                Ok(true) => report.extracted.push(session_id),
                Ok(false) => report.skipped.push(session_id),
                Err(e) => {
                    tracing::warn!(session_id = %session_id, error = %e, "session extraction failed");
                    report.errors.push(SessionError {
                        session_id,
                        message: e.to_string(),
                    });
                }
            }
        }

        save_project_index(&project, &index)?;
        self.record_project(project_path)?;
        Ok(report)
    }

    /// Bulk extraction over every project directory under the transcript
    /// root.
    pub fn extract_all(
        &self,
        opts: &ExtractOptions,
        cancel: &AtomicBool,
    ) -> Result<ExtractionReport> {
        let mut report = ExtractionReport::default();
        let projects_dir = self.paths.projects_dir();
        if !projects_dir.is_dir() {
            return Ok(report);
        }

        let cache = SessionsIndexCache::load(&self.paths.sessions_index_file())?;
        let mut encoded_dirs: Vec<String> = std::fs::read_dir(&projects_dir)?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        encoded_dirs.sort();

        for encoded in encoded_dirs {
            if cancel.load(Ordering::Relaxed) {
                report.cancelled = true;
                break;
            }
            let project_path = jacques_types::decode_project_dir(&encoded, Some(&cache));
            if !project_path.is_dir() {
                tracing::debug!(encoded = %encoded, "decoded project path not on disk, skipping");
                continue;
            }
            match self.extract_project(&project_path, opts, cancel) {
                Ok(project_report) => report.absorb(project_report),
                Err(e) => report.errors.push(SessionError {
                    session_id: encoded,
                    message: e.to_string(),
                }),
            }
        }
        Ok(report)
    }

    /// Run one session through the per-session pipeline. Returns false when
    /// the manifest was already current.
    fn extract_session(
        &self,
        project: &ProjectPaths,
        project_path: &Path,
        index: &mut ProjectIndex,
        session_id: &str,
        transcript: &Path,
        opts: &ExtractOptions,
    ) -> Result<bool> {
        let modified_at = file_mtime(transcript)?;
        let manifest_path = project.manifest_file(session_id);

        if !opts.force
            && let Ok(existing) = std::fs::read_to_string(&manifest_path)
            && let Ok(manifest) = serde_json::from_str::<SessionManifest>(&existing)
            && manifest.jsonl_modified_at >= modified_at
        {
            return Ok(false);
        }

        let outcome = jacques_reader::parse(transcript)?;
        let entries = &outcome.entries;
        let stats = jacques_reader::statistics(entries);

        let mut plans = dedupe_within_session(detect_plans(entries));
        let subagents =
            self.write_subagent_artifacts(project, project_path, index, session_id, entries)?;
        self.resolve_agent_plan_content(project_path, session_id, &mut plans);

        let files_modified = collect_files_modified(entries);
        let tools_used = collect_tools_used(entries);
        let corpus = text_corpus(entries);
        let technologies = detect_technologies(&corpus, &files_modified);
        let user_questions = collect_user_questions(entries);
        let context_snippets = collect_context_snippets(entries);
        let mode = derive_mode(entries);
        let title = derive_title(entries, &user_questions);

        let now = Utc::now();
        let mut plan_refs = Vec::with_capacity(plans.len());
        for plan in &plans {
            let mut reference = plan.to_reference();
            if let Some(content) = &plan.content {
                let cataloged =
                    catalog_plan(project, index, &plan.title, content, session_id, now)?;
                reference.catalog_id = Some(cataloged.plan_id);
            }
            plan_refs.push(reference);
        }

        let manifest = SessionManifest {
            session_id: session_id.to_string(),
            project_path: project_path.to_string_lossy().to_string(),
            title: title.clone(),
            started_at: stats.started_at,
            ended_at: stats.ended_at,
            jsonl_modified_at: modified_at,
            message_count: stats.message_count,
            tool_call_count: stats.tool_call_count,
            has_subagents: !subagents.is_empty(),
            subagent_ids: subagents,
            had_auto_compact: stats.had_auto_compact,
            tokens: TokenTotals {
                input: stats.total_input_tokens,
                output: stats.total_output_tokens_estimated,
                cache_creation: stats.total_cache_creation_tokens,
                cache_read: stats.total_cache_read_tokens,
            },
            mode,
            plan_count: plan_refs.len(),
            plan_refs,
            technologies,
            user_questions,
            files_modified,
            tools_used,
            context_snippets,
        };

        let mut bytes = serde_json::to_vec_pretty(&manifest)?;
        bytes.push(b'\n');
        write_atomic(&manifest_path, &bytes)?;

        index.upsert_session(SessionIndexEntry {
            session_id: session_id.to_string(),
            path: format!("sessions/{session_id}.json"),
            title,
            ended_at: stats.ended_at,
        });
        Ok(true)
    }

    /// Write one artifact per subagent transcript; returns the agent ids.
    fn write_subagent_artifacts(
        &self,
        project: &ProjectPaths,
        project_path: &Path,
        index: &mut ProjectIndex,
        session_id: &str,
        entries: &[TranscriptEntry],
    ) -> Result<Vec<String>> {
        let dir = self.paths.subagents_transcript_dir(project_path, session_id);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut agent_ids = Vec::new();
        let mut files: Vec<PathBuf> = std::fs::read_dir(&dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.extension().is_some_and(|ext| ext == "jsonl")
                    && p.file_stem()
                        .is_some_and(|s| s.to_string_lossy().starts_with("agent-"))
            })
            .collect();
        files.sort();

        for file in files {
            let agent_id = file
                .file_stem()
                .map(|s| s.to_string_lossy().trim_start_matches("agent-").to_string())
                .unwrap_or_default();
            if agent_id.is_empty() {
                continue;
            }

            let agent_type = entries
                .iter()
                .filter(|e| e.kind == EntryKind::AgentProgress)
                .find(|e| e.content.agent_id.as_deref() == Some(agent_id.as_str()))
                .and_then(|e| e.content.agent_type.clone());

            let sub_outcome = jacques_reader::parse(&file)?;
            let markdown = crate::subagents::render_subagent_artifact(
                &agent_id,
                agent_type.as_deref(),
                &sub_outcome.entries,
            );
            write_atomic(&project.subagent_file(&agent_id), markdown.as_bytes())?;

            index.upsert_subagent(SubagentIndexEntry {
                agent_id: agent_id.clone(),
                agent_type,
                path: format!("subagents/{agent_id}.md"),
                session_id: session_id.to_string(),
            });
            agent_ids.push(agent_id);
        }
        Ok(agent_ids)
    }

    /// Agent-sourced plans carry no inline content; read it from the
    /// subagent's own transcript.
    fn resolve_agent_plan_content(
        &self,
        project_path: &Path,
        session_id: &str,
        plans: &mut [DetectedPlan],
    ) {
        for plan in plans.iter_mut() {
            if plan.content.is_some() {
                continue;
            }
            let Some(agent_id) = &plan.agent_id else {
                continue;
            };
            let transcript = self
                .paths
                .subagents_transcript_dir(project_path, session_id)
                .join(format!("agent-{agent_id}.jsonl"));
            match subagent_plan_content(&transcript) {
                Ok(Some(content)) => {
                    plan.title = crate::text::extract_title(&content);
                    plan.content = Some(content);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!(agent_id = %agent_id, error = %e, "no subagent plan content");
                }
            }
        }
    }

    fn record_project(&self, project_path: &Path) -> Result<()> {
        let cache_path = self.paths.sessions_index_file();
        let mut cache = SessionsIndexCache::load(&cache_path)?;
        cache.record(project_path);
        cache.save(&cache_path)
    }
}

fn load_project_index(project: &ProjectPaths) -> Result<ProjectIndex> {
    let path = project.index_file();
    if !path.exists() {
        return Ok(ProjectIndex::default());
    }
    let content = std::fs::read_to_string(&path)?;
    Ok(serde_json::from_str(&content)?)
}

fn save_project_index(project: &ProjectPaths, index: &ProjectIndex) -> Result<()> {
    let mut bytes = serde_json::to_vec_pretty(index)?;
    bytes.push(b'\n');
    write_atomic(&project.index_file(), &bytes)
}

fn file_mtime(path: &Path) -> Result<DateTime<Utc>> {
    let modified = std::fs::metadata(path)?.modified()?;
    Ok(DateTime::<Utc>::from(modified))
}

fn collect_files_modified(entries: &[TranscriptEntry]) -> Vec<String> {
    let mut files: Vec<String> = Vec::new();
    for entry in entries {
        if entry.kind != EntryKind::ToolCall {
            continue;
        }
        if !matches!(entry.content.tool_name.as_deref(), Some("Write") | Some("Edit")) {
            continue;
        }
        if let Some(path) = entry
            .content
            .tool_input
            .as_ref()
            .and_then(|i| i.get("file_path"))
            .and_then(|v| v.as_str())
            && !files.iter().any(|f| f.as_str() == path)
        {
            files.push(path.to_string());
        }
    }
    files
}

fn collect_tools_used(entries: &[TranscriptEntry]) -> Vec<String> {
    let mut tools = Vec::new();
    for entry in entries {
        if entry.kind == EntryKind::ToolCall
            && let Some(name) = &entry.content.tool_name
            && !tools.iter().any(|t| t == name)
        {
            tools.push(name.clone());
        }
    }
    tools
}

fn text_corpus(entries: &[TranscriptEntry]) -> String {
    let mut corpus = String::new();
    for entry in entries {
        if let Some(text) = &entry.content.text {
            corpus.push_str(text);
            corpus.push('\n');
        }
    }
    corpus
}

fn collect_user_questions(entries: &[TranscriptEntry]) -> Vec<String> {
    entries
        .iter()
        .filter(|e| e.is_real_user_message())
        .filter_map(|e| e.content.text.as_deref())
        .map(|t| truncate_chars(t.trim(), QUESTION_MAX_CHARS))
        .collect()
}

fn collect_context_snippets(entries: &[TranscriptEntry]) -> Vec<String> {
    entries
        .iter()
        .filter(|e| e.kind == EntryKind::AssistantMessage)
        .filter_map(|e| e.content.text.as_deref())
        .take(MAX_SNIPPETS)
        .map(|t| truncate_chars(t.trim(), SNIPPET_MAX_CHARS))
        .collect()
}

/// Planning wins over execution; execution means the session opened with a
/// plan trigger.
fn derive_mode(entries: &[TranscriptEntry]) -> Option<SessionMode> {
    let planning = entries.iter().any(|e| {
        e.kind == EntryKind::ToolCall && e.content.tool_name.as_deref() == Some("EnterPlanMode")
    });
    if planning {
        return Some(SessionMode::Planning);
    }

    let first_user = entries
        .iter()
        .find(|e| e.is_real_user_message())
        .and_then(|e| e.content.text.as_deref())?;
    let lower = first_user.to_lowercase();
    if PLAN_TRIGGERS.iter().any(|t| lower.contains(t)) {
        return Some(SessionMode::Execution);
    }
    None
}

fn derive_title(entries: &[TranscriptEntry], user_questions: &[String]) -> Option<String> {
    entries
        .iter()
        .find(|e| e.kind == EntryKind::Summary)
        .and_then(|e| e.content.summary.clone())
        .or_else(|| {
            user_questions
                .first()
                .map(|q| truncate_chars(q, crate::text::TITLE_MAX_CHARS))
        })
}
