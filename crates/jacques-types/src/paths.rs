use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Encode an absolute project path into the transcript directory name the
/// AI tool uses: `/` becomes `-`, keeping the leading dash (`/a/b` -> `-a-b`).
pub fn encode_project_path(path: &Path) -> String {
    path.to_string_lossy().replace('/', "-")
}

/// Decode an encoded project directory name back to an absolute path.
///
/// Plain inversion replaces every `-` with `/`, which is wrong for paths
/// containing literal dashes; a sessions-index lookup resolves those. The
/// lookup table being absent is tolerated (falls back to plain inversion).
pub fn decode_project_dir(encoded: &str, lookup: Option<&SessionsIndexCache>) -> PathBuf {
    if let Some(cache) = lookup
        && let Some(real) = cache.projects.get(encoded)
    {
        return PathBuf::from(real);
    }
    PathBuf::from(encoded.replace('-', "/"))
}

/// Derived cache mapping encoded transcript directory names to the real
/// project paths, used to disambiguate dashes during decoding.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionsIndexCache {
    #[serde(default)]
    pub projects: BTreeMap<String, String>,
}

impl SessionsIndexCache {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn record(&mut self, project_path: &Path) {
        self.projects.insert(
            encode_project_path(project_path),
            project_path.to_string_lossy().to_string(),
        );
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        write_atomic(path, &serde_json::to_vec_pretty(self)?)
    }
}

/// Write a file via temp-file + rename so readers never observe a partial
/// artifact.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| Error::invariant(format!("no parent directory: {}", path.display())))?;
    std::fs::create_dir_all(parent)?;
    let tmp = parent.join(format!(
        ".{}.tmp",
        path.file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "artifact".to_string())
    ));
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Resolver for every fixed filesystem location jacques touches.
///
/// `JACQUES_HOME` and `JACQUES_TRANSCRIPT_ROOT` override the defaults so
/// tests run against a temp directory.
#[derive(Debug, Clone)]
pub struct JacquesPaths {
    home: PathBuf,
    transcript_root: PathBuf,
}

impl JacquesPaths {
    pub fn resolve() -> Result<Self> {
        let home = if let Ok(dir) = std::env::var("JACQUES_HOME") {
            PathBuf::from(dir)
        } else {
            dirs::home_dir()
                .ok_or_else(|| Error::invariant("no home directory"))?
                .join(".jacques")
        };
        let transcript_root = if let Ok(dir) = std::env::var("JACQUES_TRANSCRIPT_ROOT") {
            PathBuf::from(dir)
        } else {
            dirs::home_dir()
                .ok_or_else(|| Error::invariant("no home directory"))?
                .join(".claude")
        };
        Ok(Self {
            home,
            transcript_root,
        })
    }

    pub fn with_roots(home: PathBuf, transcript_root: PathBuf) -> Self {
        Self {
            home,
            transcript_root,
        }
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn transcript_root(&self) -> &Path {
        &self.transcript_root
    }

    /// Directory holding one transcript directory per encoded project path.
    pub fn projects_dir(&self) -> PathBuf {
        self.transcript_root.join("projects")
    }

    pub fn project_transcript_dir(&self, project_path: &Path) -> PathBuf {
        self.projects_dir().join(encode_project_path(project_path))
    }

    pub fn transcript_file(&self, project_path: &Path, session_id: &str) -> PathBuf {
        self.project_transcript_dir(project_path)
            .join(format!("{session_id}.jsonl"))
    }

    pub fn subagents_transcript_dir(&self, project_path: &Path, session_id: &str) -> PathBuf {
        self.project_transcript_dir(project_path)
            .join(session_id)
            .join("subagents")
    }

    /// Settings file the AI tool writes; read-only to us.
    pub fn ai_tool_settings_file(&self) -> PathBuf {
        self.transcript_root.join("settings.json")
    }

    pub fn config_file(&self) -> PathBuf {
        self.home.join("config.json")
    }

    pub fn pid_file(&self) -> PathBuf {
        self.home.join("server.pid")
    }

    pub fn socket_path(&self) -> PathBuf {
        if let Ok(path) = std::env::var("JACQUES_SOCKET") {
            return PathBuf::from(path);
        }
        PathBuf::from("/tmp/jacques.sock")
    }

    pub fn sessions_index_file(&self) -> PathBuf {
        self.home.join("cache").join("sessions-index.json")
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.home.join("archive")
    }

    pub fn search_index_file(&self) -> PathBuf {
        self.archive_dir().join("index.json")
    }

    pub fn manifest_archive_dir(&self) -> PathBuf {
        self.archive_dir().join("manifests")
    }

    pub fn archived_manifest_file(&self, manifest_id: &str) -> PathBuf {
        self.manifest_archive_dir().join(format!("{manifest_id}.json"))
    }

    pub fn archive_conversations_dir(&self, project_slug: &str) -> PathBuf {
        self.archive_dir().join("conversations").join(project_slug)
    }

    pub fn archive_plans_dir(&self, project_slug: &str) -> PathBuf {
        self.archive_dir().join("plans").join(project_slug)
    }

    pub fn archive_subagent_file(&self, agent_id: &str) -> PathBuf {
        self.archive_dir()
            .join("subagents")
            .join(format!("{agent_id}.json"))
    }
}

/// Per-project catalog locations under `<project>/.jacques/`.
#[derive(Debug, Clone)]
pub struct ProjectPaths {
    root: PathBuf,
}

impl ProjectPaths {
    pub fn new(project_path: &Path) -> Self {
        Self {
            root: project_path.join(".jacques"),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn index_file(&self) -> PathBuf {
        self.root.join("index.json")
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.root.join("sessions")
    }

    pub fn manifest_file(&self, session_id: &str) -> PathBuf {
        self.sessions_dir().join(format!("{session_id}.json"))
    }

    pub fn plans_dir(&self) -> PathBuf {
        self.root.join("plans")
    }

    pub fn subagents_dir(&self) -> PathBuf {
        self.root.join("subagents")
    }

    pub fn subagent_file(&self, agent_id: &str) -> PathBuf {
        self.subagents_dir().join(format!("{agent_id}.md"))
    }

    pub fn handoffs_dir(&self) -> PathBuf {
        self.root.join("handoffs")
    }

    /// Advisory lock file taken while an extractor owns the catalog.
    pub fn lock_file(&self) -> PathBuf {
        self.root.join(".extract.lock")
    }
}

/// Human-readable project identifier: the basename of the project path.
pub fn project_slug(project_path: &Path) -> String {
    project_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "root".to_string())
}
