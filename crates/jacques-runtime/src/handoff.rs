//! Per-session handoff watchers.
//!
//! Each registered session watches its project's `.jacques/handoffs`
//! directory; file creation or modification there surfaces as a
//! `handoff-ready` event. The OS-native watcher backend is used so
//! rename-then-write editor saves are seen.

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

use crate::Result;

#[derive(Debug, Clone)]
pub struct HandoffEvent {
    pub session_id: String,
    pub path: PathBuf,
}

pub struct HandoffWatcher {
    _watcher: RecommendedWatcher,
}

impl HandoffWatcher {
    /// Watch a session's handoff directory. Events flow into `tx` from the
    /// watcher's callback thread.
    pub fn start(
        session_id: String,
        project_path: &Path,
        tx: mpsc::UnboundedSender<HandoffEvent>,
    ) -> Result<Self> {
        let handoffs_dir = project_path.join(".jacques").join("handoffs");
        std::fs::create_dir_all(&handoffs_dir)?;

        let dir_filter = handoffs_dir.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let Ok(event) = res else { return };
            if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                return;
            }
            for path in event.paths {
                if path.starts_with(&dir_filter)
                    && path.extension().is_some_and(|ext| ext == "md")
                {
                    let _ = tx.send(HandoffEvent {
                        session_id: session_id.clone(),
                        path,
                    });
                }
            }
        })?;

        watcher.watch(&handoffs_dir, RecursiveMode::Recursive)?;
        Ok(Self { _watcher: watcher })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_handoff_file_creation_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _watcher = HandoffWatcher::start("s1".into(), dir.path(), tx).unwrap();

        // Give the watcher a moment to arm before writing.
        tokio::time::sleep(Duration::from_millis(200)).await;
        let handoff = dir.path().join(".jacques/handoffs/2025-05-01-handoff.md");
        std::fs::write(&handoff, "# Handoff\ncontext").unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("watcher timed out")
            .expect("channel closed");
        assert_eq!(event.session_id, "s1");
        assert!(event.path.ends_with("2025-05-01-handoff.md"));
    }

    #[tokio::test]
    async fn test_non_markdown_files_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _watcher = HandoffWatcher::start("s1".into(), dir.path(), tx).unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        std::fs::write(dir.path().join(".jacques/handoffs/notes.txt"), "x").unwrap();

        let result = tokio::time::timeout(Duration::from_millis(500), rx.recv()).await;
        assert!(result.is_err(), "expected no event for non-markdown file");
    }
}
