//! Isolated test environments: a temp jacques home, a temp transcript
//! root, and project directories, wired together through `JacquesPaths`.

use jacques_types::JacquesPaths;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::builder::TranscriptBuilder;

pub struct TestWorld {
    _root: TempDir,
    paths: JacquesPaths,
    projects_root: PathBuf,
}

impl Default for TestWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl TestWorld {
    pub fn new() -> Self {
        let root = TempDir::new().expect("temp root");
        let home = root.path().join("home/.jacques");
        let transcript_root = root.path().join("home/.claude");
        let projects_root = root.path().join("work");
        std::fs::create_dir_all(&home).expect("home dir");
        std::fs::create_dir_all(transcript_root.join("projects")).expect("transcript root");
        std::fs::create_dir_all(&projects_root).expect("projects root");

        Self {
            paths: JacquesPaths::with_roots(home, transcript_root),
            _root: root,
            projects_root,
        }
    }

    pub fn paths(&self) -> &JacquesPaths {
        &self.paths
    }

    /// Create a project working directory under the temp root.
    pub fn create_project(&self, name: &str) -> PathBuf {
        let dir = self.projects_root.join(name);
        std::fs::create_dir_all(&dir).expect("project dir");
        dir
    }

    /// Write a session transcript into the project's encoded transcript
    /// directory and return its path.
    pub fn write_transcript(
        &self,
        project_path: &Path,
        session_id: &str,
        builder: &TranscriptBuilder,
    ) -> PathBuf {
        let path = self.paths.transcript_file(project_path, session_id);
        builder.write_to(&path).expect("write transcript");
        path
    }

    /// Write a subagent transcript for a session.
    pub fn write_subagent_transcript(
        &self,
        project_path: &Path,
        session_id: &str,
        agent_id: &str,
        builder: &TranscriptBuilder,
    ) -> PathBuf {
        let path = self
            .paths
            .subagents_transcript_dir(project_path, session_id)
            .join(format!("agent-{agent_id}.jsonl"));
        builder.write_to(&path).expect("write subagent transcript");
        path
    }

    /// Drop a handoff file into the project's catalog directory.
    pub fn write_handoff(&self, project_path: &Path, name: &str, content: &str) -> PathBuf {
        let dir = project_path.join(".jacques/handoffs");
        std::fs::create_dir_all(&dir).expect("handoffs dir");
        let path = dir.join(name);
        std::fs::write(&path, content).expect("handoff file");
        path
    }

    /// Write the AI tool settings file the registry reads at session start.
    pub fn write_ai_tool_settings(&self, autocompact: bool) {
        let path = self.paths.ai_tool_settings_file();
        std::fs::create_dir_all(path.parent().unwrap()).expect("settings dir");
        std::fs::write(
            &path,
            serde_json::json!({"autoCompact": autocompact}).to_string(),
        )
        .expect("settings file");
    }
}
