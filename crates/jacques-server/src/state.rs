use jacques_runtime::EventPipeline;
use jacques_types::JacquesPaths;
use std::sync::Arc;

/// Shared state behind every handler.
#[derive(Clone)]
pub struct AppState {
    pub paths: Arc<JacquesPaths>,
    pub pipeline: Arc<EventPipeline>,
    /// Serializes archive-wide operations (initialize, rebuild): one
    /// index writer per process.
    pub archive_op: Arc<tokio::sync::Mutex<()>>,
}

impl AppState {
    pub fn new(paths: JacquesPaths, pipeline: Arc<EventPipeline>) -> Self {
        Self {
            paths: Arc::new(paths),
            pipeline,
            archive_op: Arc::new(tokio::sync::Mutex::new(())),
        }
    }
}
