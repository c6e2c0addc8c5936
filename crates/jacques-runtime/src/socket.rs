//! Unix-domain socket listener for hook events.
//!
//! Newline-delimited JSON, one event per line, one-way. Multiple hook
//! adapters connect concurrently; each connection gets its own reader
//! task and per-connection lines are processed in arrival order.

use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;

use crate::pipeline::EventPipeline;
use crate::{Error, Result};

/// Remove a leftover socket file, but refuse to steal one a live process
/// is still listening on.
pub fn prepare_socket_path(path: &Path) -> Result<()> {
    if !path.exists() {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        return Ok(());
    }

    match std::os::unix::net::UnixStream::connect(path) {
        Ok(_) => Err(Error::SocketBusy(format!(
            "another process is listening on {}",
            path.display()
        ))),
        Err(_) => {
            tracing::info!(path = %path.display(), "removing stale socket");
            std::fs::remove_file(path)?;
            Ok(())
        }
    }
}

/// Accept loop; runs until `shutdown` flips. The socket file is removed on
/// the way out.
pub async fn run_socket_listener(
    socket_path: std::path::PathBuf,
    pipeline: Arc<EventPipeline>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    prepare_socket_path(&socket_path)?;
    let listener = UnixListener::bind(&socket_path)?;
    tracing::info!(path = %socket_path.display(), "hook socket listening");

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _addr)) => {
                        let pipeline = pipeline.clone();
                        tokio::spawn(async move {
                            handle_connection(stream, pipeline).await;
                        });
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                    }
                }
            }
        }
    }

    let _ = std::fs::remove_file(&socket_path);
    Ok(())
}

async fn handle_connection(stream: UnixStream, pipeline: Arc<EventPipeline>) {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => pipeline.handle_line(&line),
            Err(e) => {
                tracing::debug!(error = %e, "hook connection read error");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fanout::FanoutHub;
    use crate::notifications::NotificationEngine;
    use crate::pipeline::NoopActivator;
    use crate::registry::SessionRegistry;
    use jacques_types::{JacquesPaths, NotificationSettings};
    use tokio::io::AsyncWriteExt;

    fn pipeline(dir: &Path) -> Arc<EventPipeline> {
        let paths = JacquesPaths::with_roots(dir.join(".jacques"), dir.join(".claude"));
        let (pipeline, _handoff_rx) = EventPipeline::new(
            paths,
            Arc::new(SessionRegistry::new()),
            Arc::new(FanoutHub::new()),
            NotificationEngine::new(NotificationSettings::default()),
            Box::new(NoopActivator),
        );
        pipeline
    }

    #[tokio::test]
    async fn test_events_over_socket_reach_registry() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("jacques.sock");
        let pipeline = pipeline(dir.path());

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let listener = tokio::spawn(run_socket_listener(
            socket_path.clone(),
            pipeline.clone(),
            shutdown_rx,
        ));

        // Wait for the socket to appear.
        for _ in 0..50 {
            if socket_path.exists() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }

        let mut stream = UnixStream::connect(&socket_path).await.unwrap();
        stream
            .write_all(b"{\"event\":\"session_start\",\"session_id\":\"s1\"}\n")
            .await
            .unwrap();
        // Partial line first, completed by a second write.
        stream
            .write_all(b"{\"event\":\"activity\",")
            .await
            .unwrap();
        stream
            .write_all(b"\"session_id\":\"s1\"}\n")
            .await
            .unwrap();
        stream.flush().await.unwrap();

        for _ in 0..50 {
            if pipeline
                .registry()
                .get("s1")
                .is_some_and(|s| s.status == jacques_types::SessionStatus::Working)
            {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        let session = pipeline.registry().get("s1").expect("session registered");
        assert_eq!(session.status, jacques_types::SessionStatus::Working);

        shutdown_tx.send(true).unwrap();
        listener.await.unwrap().unwrap();
        assert!(!socket_path.exists());
    }

    #[tokio::test]
    async fn test_stale_socket_is_cleaned() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("jacques.sock");
        // A plain file at the socket path: nothing is listening.
        std::fs::write(&socket_path, b"").unwrap();

        prepare_socket_path(&socket_path).unwrap();
        assert!(!socket_path.exists());
    }

    #[tokio::test]
    async fn test_live_socket_is_a_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("jacques.sock");
        let _listener = UnixListener::bind(&socket_path).unwrap();

        let err = prepare_socket_path(&socket_path).unwrap_err();
        assert_eq!(err.kind(), jacques_types::ErrorKind::Conflict);
    }
}
