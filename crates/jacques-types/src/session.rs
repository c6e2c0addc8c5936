use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which AI tool produced the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionSource {
    PrimaryAi,
    SecondaryAi,
}

/// Live session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Working,
    Idle,
}

/// Terminal identity as observed from hook events or process discovery.
///
/// Any subset of fields may be present; consumers that only need a stable
/// key use [`terminal_key`] instead of inspecting fields directly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalIdentity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tty: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub term_session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub term_program: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_id: Option<String>,
}

impl TerminalIdentity {
    pub fn is_empty(&self) -> bool {
        self.tty.is_none()
            && self.term_session_id.is_none()
            && self.term_program.is_none()
            && self.pid.is_none()
            && self.window_id.is_none()
    }
}

/// Derive the terminal key for a session. First rule that matches wins:
/// emulator session id, then TTY device, then terminal pid, then a prefix
/// of the session id.
pub fn terminal_key(identity: Option<&TerminalIdentity>, session_id: &str) -> String {
    if let Some(term) = identity {
        if let Some(id) = &term.term_session_id {
            return format!("EMULATOR:{}", id);
        }
        if let Some(tty) = &term.tty {
            return format!("TTY:{}", tty);
        }
        if let Some(pid) = term.pid {
            return format!("PID:{}", pid);
        }
    }
    format!("UNKNOWN:{}", session_id_prefix(session_id))
}

/// Short session-id prefix used in terminal keys and collision suffixes.
pub fn session_id_prefix(session_id: &str) -> &str {
    let end = session_id.len().min(8);
    &session_id[..end]
}

/// Context-window metrics reported by the AI tool
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextMetrics {
    pub used_pct: f64,
    pub remaining_pct: f64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub window_size: u64,
    #[serde(default)]
    pub is_estimate: bool,
}

/// A currently observed session. Lives in the registry for the duration of
/// the AI-tool process; archived state lives in manifests, not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: String,
    pub source: SessionSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript_path: Option<PathBuf>,
    pub project_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal: Option<TerminalIdentity>,
    pub terminal_key: String,
    pub status: SessionStatus,
    pub last_activity_at: DateTime<Utc>,
    pub registered_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_metrics: Option<ContextMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub autocompact_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autocompact_threshold: Option<u32>,
    pub autocompact_bug_threshold: u32,
}

/// The AI tool is known to force compaction near 78% regardless of the
/// autocompact setting.
pub const AUTOCOMPACT_BUG_THRESHOLD_PCT: u32 = 78;

impl Session {
    /// Minimal session with derived terminal key; callers fill in the rest.
    pub fn new(session_id: impl Into<String>, project_path: PathBuf, now: DateTime<Utc>) -> Self {
        let session_id = session_id.into();
        let key = terminal_key(None, &session_id);
        Self {
            session_id,
            source: SessionSource::PrimaryAi,
            transcript_path: None,
            project_path,
            terminal: None,
            terminal_key: key,
            status: SessionStatus::Active,
            last_activity_at: now,
            registered_at: now,
            context_metrics: None,
            model: None,
            workspace: None,
            title: None,
            autocompact_enabled: true,
            autocompact_threshold: None,
            autocompact_bug_threshold: AUTOCOMPACT_BUG_THRESHOLD_PCT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_key_priority() {
        let full = TerminalIdentity {
            tty: Some("/dev/ttys003".into()),
            term_session_id: Some("w0t1p0".into()),
            term_program: Some("iTerm.app".into()),
            pid: Some(4242),
            window_id: None,
        };
        assert_eq!(terminal_key(Some(&full), "abcd1234-x"), "EMULATOR:w0t1p0");

        let tty_only = TerminalIdentity {
            tty: Some("/dev/ttys003".into()),
            ..Default::default()
        };
        assert_eq!(
            terminal_key(Some(&tty_only), "abcd1234-x"),
            "TTY:/dev/ttys003"
        );

        let pid_only = TerminalIdentity {
            pid: Some(4242),
            ..Default::default()
        };
        assert_eq!(terminal_key(Some(&pid_only), "abcd1234-x"), "PID:4242");

        assert_eq!(terminal_key(None, "abcd1234-5678"), "UNKNOWN:abcd1234");
    }

    #[test]
    fn test_session_id_prefix_short_id() {
        assert_eq!(session_id_prefix("abc"), "abc");
    }

    #[test]
    fn test_session_serialization_is_camel_case() {
        let session = Session::new("s1", PathBuf::from("/work/proj"), Utc::now());
        let json = serde_json::to_value(&session).unwrap();
        assert!(json.get("sessionId").is_some());
        assert!(json.get("terminalKey").is_some());
        assert!(json.get("autocompactEnabled").is_some());
        assert!(json.get("session_id").is_none());
    }
}
