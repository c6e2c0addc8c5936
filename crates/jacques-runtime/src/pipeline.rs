//! Event routing: socket lines in, registry mutations and fan-out
//! messages out.

use jacques_types::{JacquesPaths, Session, SessionsIndexCache, SessionSource};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use crate::events::{DomainMessage, HookEvent, RegistrySignal, SubscriberRequest};
use crate::fanout::{FanoutHub, SubscriberId};
use crate::handoff::{HandoffEvent, HandoffWatcher};
use crate::notifications::{Notification, NotificationEngine};
use crate::registry::{RegisterRequest, SessionRegistry};
use crate::settings;

/// OS-specific collaborator that raises a session's terminal window.
pub trait TerminalActivator: Send + Sync {
    fn focus_terminal(&self, session: &Session) -> std::result::Result<(), String>;
}

/// Default activator for headless runs.
pub struct NoopActivator;

impl TerminalActivator for NoopActivator {
    fn focus_terminal(&self, _session: &Session) -> std::result::Result<(), String> {
        Err("no terminal activator configured".to_string())
    }
}

pub struct EventPipeline {
    paths: JacquesPaths,
    registry: Arc<SessionRegistry>,
    hub: Arc<FanoutHub>,
    engine: Mutex<NotificationEngine>,
    watchers: Mutex<HashMap<String, HandoffWatcher>>,
    handoff_tx: mpsc::UnboundedSender<HandoffEvent>,
    activator: Box<dyn TerminalActivator>,
    invalid_lines: AtomicU64,
    unknown_events: AtomicU64,
}

impl EventPipeline {
    pub fn new(
        paths: JacquesPaths,
        registry: Arc<SessionRegistry>,
        hub: Arc<FanoutHub>,
        engine: NotificationEngine,
        activator: Box<dyn TerminalActivator>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<HandoffEvent>) {
        let (handoff_tx, handoff_rx) = mpsc::unbounded_channel();
        let pipeline = Arc::new(Self {
            paths,
            registry,
            hub,
            engine: Mutex::new(engine),
            watchers: Mutex::new(HashMap::new()),
            handoff_tx,
            activator,
            invalid_lines: AtomicU64::new(0),
            unknown_events: AtomicU64::new(0),
        });
        (pipeline, handoff_rx)
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn hub(&self) -> &Arc<FanoutHub> {
        &self.hub
    }

    pub fn invalid_lines(&self) -> u64 {
        self.invalid_lines.load(Ordering::Relaxed)
    }

    pub fn unknown_events(&self) -> u64 {
        self.unknown_events.load(Ordering::Relaxed)
    }

    /// Current notification settings (as loaded or last updated).
    pub fn notification_settings(&self) -> jacques_types::NotificationSettings {
        self.engine.lock().expect("engine lock").settings().clone()
    }

    /// Apply and persist new notification settings.
    pub fn update_notification_settings(
        &self,
        settings: jacques_types::NotificationSettings,
    ) -> crate::Result<()> {
        let config_path = self.paths.config_file();
        let mut config = jacques_types::Config::load_from(&config_path)?;
        config.notifications = settings.clone();
        config.save_to(&config_path)?;
        self.engine
            .lock()
            .expect("engine lock")
            .update_settings(settings);
        Ok(())
    }

    /// Snapshot sent to every subscriber on connect.
    pub fn initial_state(&self) -> DomainMessage {
        DomainMessage::InitialState {
            sessions: self.registry.list(),
            focused: self.registry.focused(),
            notifications: self.engine.lock().expect("engine lock").history(),
        }
    }

    /// Validate and route one socket line.
    pub fn handle_line(&self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }

        let value: serde_json::Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(_) => {
                self.invalid_lines.fetch_add(1, Ordering::Relaxed);
                self.registry.note_dropped_event();
                tracing::warn!("dropping non-JSON socket line");
                return;
            }
        };

        let has_required = value.get("event").and_then(|v| v.as_str()).is_some()
            && value.get("session_id").and_then(|v| v.as_str()).is_some();
        if !has_required {
            self.invalid_lines.fetch_add(1, Ordering::Relaxed);
            self.registry.note_dropped_event();
            tracing::warn!("dropping event without event/session_id");
            return;
        }

        match serde_json::from_value::<HookEvent>(value) {
            Ok(event) => self.handle_event(event),
            Err(_) => {
                self.unknown_events.fetch_add(1, Ordering::Relaxed);
                self.registry.note_dropped_event();
                tracing::warn!("dropping unknown event name");
            }
        }
    }

    pub fn handle_event(&self, event: HookEvent) {
        match event {
            HookEvent::SessionStart(start) => {
                let project_path = start
                    .project_path
                    .as_deref()
                    .map(PathBuf::from)
                    .unwrap_or_default();
                let autocompact = settings::read_autocompact(&self.paths);

                let mut request =
                    RegisterRequest::new(start.session_id.clone(), project_path.clone());
                request.transcript_path = start.transcript_path.map(PathBuf::from);
                request.source = start.source.unwrap_or(SessionSource::PrimaryAi);
                request.terminal = if start.terminal.is_empty() {
                    None
                } else {
                    Some(start.terminal)
                };
                request.model = start.model;
                request.workspace = start.workspace;
                request.title = start.title;
                request.autocompact_enabled = autocompact.enabled;
                request.autocompact_threshold = autocompact.threshold;
                self.registry.register(request);

                if project_path.as_os_str().is_empty() {
                    return;
                }
                self.remember_project(&project_path);
                self.start_handoff_watcher(&start.session_id, &project_path);
            }
            HookEvent::Activity(e) => {
                self.registry.update_activity(&e.session_id);
            }
            HookEvent::ContextUpdate(e) => {
                let session = self.registry.update_context(&e.session_id, e.metrics());
                let fired = self
                    .engine
                    .lock()
                    .expect("engine lock")
                    .on_context_update(&session, e.used_pct);
                self.broadcast_notifications(fired);
            }
            HookEvent::Idle(e) => {
                self.registry.set_idle(&e.session_id);
            }
            HookEvent::SessionEnd(e) => {
                self.watchers
                    .lock()
                    .expect("watcher lock")
                    .remove(&e.session_id);
                self.registry.unregister(&e.session_id);
                self.engine
                    .lock()
                    .expect("engine lock")
                    .forget_session(&e.session_id);
            }
            HookEvent::OperationComplete(e) => {
                let fired = self.engine.lock().expect("engine lock").on_operation_complete(
                    &e.session_id,
                    e.total_tokens,
                    e.description.as_deref(),
                );
                self.broadcast_notifications(fired.into_iter().collect());
            }
        }
    }

    /// Handoff file appeared or changed in a watched project.
    pub fn handle_handoff(&self, event: HandoffEvent) {
        let path = event.path.to_string_lossy().to_string();
        self.hub.broadcast(&DomainMessage::HandoffReady {
            session_id: event.session_id.clone(),
            path: path.clone(),
        });
        let fired = self
            .engine
            .lock()
            .expect("engine lock")
            .on_handoff(&event.session_id, &path);
        self.broadcast_notifications(fired.into_iter().collect());
    }

    /// Request from one subscriber; errors go only back to the requester.
    pub fn handle_request(&self, subscriber: SubscriberId, request: SubscriberRequest) {
        match request {
            SubscriberRequest::SelectSession { session_id } => {
                let ok = self.registry.focus_session(&session_id);
                self.hub.send_to(
                    subscriber,
                    DomainMessage::Ack {
                        request: "select_session".into(),
                        ok,
                        error: (!ok).then(|| format!("unknown session: {session_id}")),
                    },
                );
            }
            SubscriberRequest::ToggleAutocompact => {
                let current = settings::read_autocompact(&self.paths);
                let result = self.registry.record_autocompact_toggle(
                    &self.paths,
                    !current.enabled,
                    current.threshold,
                );
                self.hub.send_to(
                    subscriber,
                    DomainMessage::Ack {
                        request: "toggle_autocompact".into(),
                        ok: result.is_ok(),
                        error: result.err().map(|e| e.to_string()),
                    },
                );
            }
            SubscriberRequest::FocusTerminal { session_id } => {
                let outcome = match self.registry.get(&session_id) {
                    Some(session) => self.activator.focus_terminal(&session),
                    None => Err(format!("unknown session: {session_id}")),
                };
                self.hub.send_to(
                    subscriber,
                    DomainMessage::Ack {
                        request: "focus_terminal".into(),
                        ok: outcome.is_ok(),
                        error: outcome.err(),
                    },
                );
            }
        }
    }

    /// Register everything startup discovery found.
    pub fn register_discovered(&self) {
        for request in crate::discovery::discover_sessions(&self.paths) {
            let project_path = request.project_path.clone();
            let session_id = request.session_id.clone();
            self.registry.register(request);
            if !project_path.as_os_str().is_empty() {
                self.start_handoff_watcher(&session_id, &project_path);
            }
        }
    }

    fn start_handoff_watcher(&self, session_id: &str, project_path: &std::path::Path) {
        let mut watchers = self.watchers.lock().expect("watcher lock");
        if watchers.contains_key(session_id) {
            return;
        }
        match HandoffWatcher::start(
            session_id.to_string(),
            project_path,
            self.handoff_tx.clone(),
        ) {
            Ok(watcher) => {
                watchers.insert(session_id.to_string(), watcher);
            }
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "handoff watcher failed to start");
            }
        }
    }

    /// Record the project path so encoded transcript directories decode
    /// unambiguously later.
    fn remember_project(&self, project_path: &std::path::Path) {
        let cache_path = self.paths.sessions_index_file();
        let result = SessionsIndexCache::load(&cache_path).and_then(|mut cache| {
            cache.record(project_path);
            cache.save(&cache_path)
        });
        if let Err(e) = result {
            tracing::warn!(error = %e, "could not update sessions index cache");
        }
    }

    fn broadcast_notifications(&self, fired: Vec<Notification>) {
        for notification in fired {
            self.hub
                .broadcast(&DomainMessage::NotificationFired { notification });
        }
    }
}

/// Forward registry signals into the fan-out hub. Runs until the registry
/// is dropped.
pub fn spawn_signal_pump(
    registry: Arc<SessionRegistry>,
    hub: Arc<FanoutHub>,
) -> tokio::task::JoinHandle<()> {
    let mut rx = registry.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(RegistrySignal::SessionUpdated(session)) => {
                    hub.broadcast(&DomainMessage::SessionUpdate { session });
                }
                Ok(RegistrySignal::SessionRemoved { session_id }) => {
                    hub.broadcast(&DomainMessage::SessionRemoved { session_id });
                }
                Ok(RegistrySignal::FocusChanged { session_id }) => {
                    hub.broadcast(&DomainMessage::FocusChanged { session_id });
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "signal pump lagged behind registry");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// Drain handoff watcher events into the pipeline.
pub fn spawn_handoff_pump(
    pipeline: Arc<EventPipeline>,
    mut rx: mpsc::UnboundedReceiver<HandoffEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            pipeline.handle_handoff(event);
        }
    })
}
