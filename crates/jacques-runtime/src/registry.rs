//! The session registry: authoritative in-memory model of currently
//! observed sessions.
//!
//! All mutation goes through `&self` methods that take the single write
//! lock; signal emission happens under the same lock so every subscriber
//! sees session list and focus move together.

use chrono::Utc;
use jacques_types::{
    session_id_prefix, terminal_key, JacquesPaths, Session, SessionSource, SessionStatus,
    TerminalIdentity,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use tokio::sync::broadcast;

use crate::events::RegistrySignal;
use crate::settings;
use crate::Result;

const SIGNAL_CHANNEL_CAPACITY: usize = 256;

/// Everything a `session_start` (or discovery) knows about a session.
#[derive(Debug, Clone)]
pub struct RegisterRequest {
    pub session_id: String,
    pub project_path: PathBuf,
    pub transcript_path: Option<PathBuf>,
    pub source: SessionSource,
    pub terminal: Option<TerminalIdentity>,
    pub model: Option<String>,
    pub workspace: Option<String>,
    pub title: Option<String>,
    pub autocompact_enabled: bool,
    pub autocompact_threshold: Option<u32>,
    /// True for sessions found by startup process discovery; they get a
    /// `DISCOVERED:` terminal key until the real hook event arrives.
    pub discovered: bool,
}

impl RegisterRequest {
    pub fn new(session_id: impl Into<String>, project_path: PathBuf) -> Self {
        Self {
            session_id: session_id.into(),
            project_path,
            transcript_path: None,
            source: SessionSource::PrimaryAi,
            terminal: None,
            model: None,
            workspace: None,
            title: None,
            autocompact_enabled: true,
            autocompact_threshold: None,
            discovered: false,
        }
    }
}

struct SessionSlot {
    session: Session,
    /// Monotonic activity ordinal; the focus fallback picks the highest.
    seq: u64,
}

#[derive(Default)]
struct RegistryState {
    sessions: HashMap<String, SessionSlot>,
    focused: Option<String>,
    next_seq: u64,
}

impl RegistryState {
    fn bump(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }
}

pub struct SessionRegistry {
    state: RwLock<RegistryState>,
    signals: broadcast::Sender<RegistrySignal>,
    /// Invalid or unroutable events observed by the pipeline.
    dropped_events: AtomicU64,
    /// Registered transcript paths that were missing on disk.
    stale_transcripts: AtomicU64,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        let (signals, _) = broadcast::channel(SIGNAL_CHANNEL_CAPACITY);
        Self {
            state: RwLock::new(RegistryState::default()),
            signals,
            dropped_events: AtomicU64::new(0),
            stale_transcripts: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistrySignal> {
        self.signals.subscribe()
    }

    fn emit(&self, signal: RegistrySignal) {
        // No receivers is fine; fan-out may not be up yet.
        let _ = self.signals.send(signal);
    }

    /// Create or replace a session. Replacing preserves `registeredAt` and
    /// any context metrics a racing `context_update` already delivered.
    pub fn register(&self, req: RegisterRequest) -> Session {
        let now = Utc::now();
        let mut state = self.state.write().expect("registry lock");

        let (registered_at, kept_metrics) = match state.sessions.get(&req.session_id) {
            Some(slot) => (slot.session.registered_at, slot.session.context_metrics),
            None => (now, None),
        };

        if let Some(path) = &req.transcript_path
            && !path.exists()
        {
            self.stale_transcripts.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(path = %path.display(), "registered transcript path missing on disk");
        }

        let base_key = if req.discovered {
            format!("DISCOVERED:{}", session_id_prefix(&req.session_id))
        } else {
            terminal_key(req.terminal.as_ref(), &req.session_id)
        };
        let key_taken = state
            .sessions
            .values()
            .any(|s| s.session.session_id != req.session_id && s.session.terminal_key == base_key);
        let final_key = if key_taken {
            format!("{base_key}:{}", session_id_prefix(&req.session_id))
        } else {
            base_key
        };

        let session = Session {
            session_id: req.session_id.clone(),
            source: req.source,
            transcript_path: req.transcript_path,
            project_path: req.project_path,
            terminal: req.terminal,
            terminal_key: final_key,
            status: SessionStatus::Active,
            last_activity_at: now,
            registered_at,
            context_metrics: kept_metrics,
            model: req.model,
            workspace: req.workspace,
            title: req.title,
            autocompact_enabled: req.autocompact_enabled,
            autocompact_threshold: req.autocompact_threshold,
            autocompact_bug_threshold: jacques_types::AUTOCOMPACT_BUG_THRESHOLD_PCT,
        };

        let seq = state.bump();
        state.sessions.insert(
            req.session_id.clone(),
            SessionSlot {
                session: session.clone(),
                seq,
            },
        );

        // A new session takes focus when nothing is focused or the focused
        // session has gone idle.
        let should_focus = match &state.focused {
            None => true,
            Some(id) => state
                .sessions
                .get(id)
                .is_none_or(|s| s.session.status == SessionStatus::Idle),
        };
        self.emit(RegistrySignal::SessionUpdated(Box::new(session.clone())));
        if should_focus && state.focused.as_deref() != Some(req.session_id.as_str()) {
            state.focused = Some(req.session_id.clone());
            self.emit(RegistrySignal::FocusChanged {
                session_id: state.focused.clone(),
            });
        }

        session
    }

    fn synthesize_locked<'a>(state: &'a mut RegistryState, session_id: &str) -> &'a mut SessionSlot {
        if !state.sessions.contains_key(session_id) {
            let session = Session::new(session_id, PathBuf::new(), Utc::now());
            let seq = state.bump();
            state
                .sessions
                .insert(session_id.to_string(), SessionSlot { session, seq });
        }
        state.sessions.get_mut(session_id).expect("just inserted")
    }

    /// Tool-use activity: transitions active/idle to working and refreshes
    /// the activity clock. Working sessions take focus.
    pub fn update_activity(&self, session_id: &str) -> Session {
        let mut state = self.state.write().expect("registry lock");
        let seq = state.bump();
        let slot = Self::synthesize_locked(&mut state, session_id);
        slot.session.status = SessionStatus::Working;
        slot.session.last_activity_at = Utc::now();
        slot.seq = seq;
        let session = slot.session.clone();

        self.emit(RegistrySignal::SessionUpdated(Box::new(session.clone())));
        self.focus_if_working(&mut state, session_id);
        session
    }

    /// Refresh context metrics without a state transition. Synthesizes a
    /// minimal session when the update arrives before `session_start`.
    pub fn update_context(&self, session_id: &str, metrics: jacques_types::ContextMetrics) -> Session {
        let mut state = self.state.write().expect("registry lock");
        let slot = Self::synthesize_locked(&mut state, session_id);
        slot.session.context_metrics = Some(metrics);
        let session = slot.session.clone();

        self.emit(RegistrySignal::SessionUpdated(Box::new(session.clone())));
        self.focus_if_working(&mut state, session_id);
        session
    }

    fn focus_if_working(&self, state: &mut RegistryState, session_id: &str) {
        let is_working = state
            .sessions
            .get(session_id)
            .is_some_and(|s| s.session.status == SessionStatus::Working);
        if is_working && state.focused.as_deref() != Some(session_id) {
            state.focused = Some(session_id.to_string());
            self.emit(RegistrySignal::FocusChanged {
                session_id: state.focused.clone(),
            });
        }
    }

    /// Explicit stop signal; focus is not reassigned.
    pub fn set_idle(&self, session_id: &str) -> Option<Session> {
        let mut state = self.state.write().expect("registry lock");
        let slot = state.sessions.get_mut(session_id)?;
        slot.session.status = SessionStatus::Idle;
        let session = slot.session.clone();
        self.emit(RegistrySignal::SessionUpdated(Box::new(session.clone())));
        Some(session)
    }

    /// Idempotent removal. When the focused session goes away, the most
    /// recently active remaining session inherits focus.
    pub fn unregister(&self, session_id: &str) {
        let mut state = self.state.write().expect("registry lock");
        if state.sessions.remove(session_id).is_none() {
            return;
        }
        self.emit(RegistrySignal::SessionRemoved {
            session_id: session_id.to_string(),
        });

        if state.focused.as_deref() == Some(session_id) {
            state.focused = state
                .sessions
                .values()
                .max_by_key(|s| s.seq)
                .map(|s| s.session.session_id.clone());
            self.emit(RegistrySignal::FocusChanged {
                session_id: state.focused.clone(),
            });
        }
    }

    pub fn get(&self, session_id: &str) -> Option<Session> {
        let state = self.state.read().expect("registry lock");
        state.sessions.get(session_id).map(|s| s.session.clone())
    }

    /// All live sessions, oldest registration first.
    pub fn list(&self) -> Vec<Session> {
        let state = self.state.read().expect("registry lock");
        let mut sessions: Vec<Session> =
            state.sessions.values().map(|s| s.session.clone()).collect();
        sessions.sort_by(|a, b| {
            a.registered_at
                .cmp(&b.registered_at)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        sessions
    }

    pub fn focused(&self) -> Option<String> {
        self.state.read().expect("registry lock").focused.clone()
    }

    /// Explicit focus request from a subscriber. Returns false when the
    /// session does not exist.
    pub fn focus_session(&self, session_id: &str) -> bool {
        let mut state = self.state.write().expect("registry lock");
        if !state.sessions.contains_key(session_id) {
            return false;
        }
        if state.focused.as_deref() != Some(session_id) {
            state.focused = Some(session_id.to_string());
            self.emit(RegistrySignal::FocusChanged {
                session_id: state.focused.clone(),
            });
        }
        true
    }

    /// Flip the AI tool's autocompact setting on disk and reflect it on
    /// every live session.
    pub fn record_autocompact_toggle(
        &self,
        paths: &JacquesPaths,
        enabled: bool,
        threshold: Option<u32>,
    ) -> Result<()> {
        settings::write_autocompact(paths, enabled, threshold)?;

        let mut state = self.state.write().expect("registry lock");
        let updated: Vec<Session> = state
            .sessions
            .values_mut()
            .map(|slot| {
                slot.session.autocompact_enabled = enabled;
                slot.session.autocompact_threshold = threshold;
                slot.session.clone()
            })
            .collect();
        for session in updated {
            self.emit(RegistrySignal::SessionUpdated(Box::new(session)));
        }
        Ok(())
    }

    pub fn note_dropped_event(&self) {
        self.dropped_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    pub fn stale_transcripts(&self) -> u64 {
        self.stale_transcripts.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register(registry: &SessionRegistry, id: &str) -> Session {
        registry.register(RegisterRequest::new(id, PathBuf::from("/work/app")))
    }

    #[test]
    fn test_register_starts_active_and_focused() {
        let registry = SessionRegistry::new();
        let session = register(&registry, "s1");
        assert_eq!(session.status, SessionStatus::Active);
        assert_eq!(registry.focused().as_deref(), Some("s1"));
    }

    #[test]
    fn test_second_active_session_does_not_steal_focus() {
        let registry = SessionRegistry::new();
        register(&registry, "s1");
        register(&registry, "s2");
        assert_eq!(registry.focused().as_deref(), Some("s1"));
    }

    #[test]
    fn test_register_over_idle_focus_takes_over() {
        let registry = SessionRegistry::new();
        register(&registry, "s1");
        registry.set_idle("s1");
        register(&registry, "s2");
        assert_eq!(registry.focused().as_deref(), Some("s2"));
    }

    #[test]
    fn test_activity_transitions_and_focuses() {
        let registry = SessionRegistry::new();
        register(&registry, "s1");
        register(&registry, "s2");

        let s2 = registry.update_activity("s2");
        assert_eq!(s2.status, SessionStatus::Working);
        assert_eq!(registry.focused().as_deref(), Some("s2"));

        // Idle then reactivate through activity.
        registry.set_idle("s2");
        assert_eq!(registry.get("s2").unwrap().status, SessionStatus::Idle);
        let s2 = registry.update_activity("s2");
        assert_eq!(s2.status, SessionStatus::Working);
    }

    #[test]
    fn test_focus_transition_scenario() {
        // Register S1, register S2, work S2, idle S1, remove S2 -> S1 focused.
        let registry = SessionRegistry::new();
        register(&registry, "s1");
        register(&registry, "s2");
        assert_eq!(registry.focused().as_deref(), Some("s1"));

        registry.update_activity("s2");
        assert_eq!(registry.focused().as_deref(), Some("s2"));

        registry.set_idle("s1");
        registry.unregister("s2");
        assert_eq!(registry.focused().as_deref(), Some("s1"));
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let registry = SessionRegistry::new();
        register(&registry, "s1");
        registry.unregister("s1");
        registry.unregister("s1");
        assert!(registry.get("s1").is_none());
        assert_eq!(registry.focused(), None);
    }

    #[test]
    fn test_context_update_before_start_synthesizes() {
        let registry = SessionRegistry::new();
        let metrics = jacques_types::ContextMetrics {
            used_pct: 40.0,
            remaining_pct: 60.0,
            input_tokens: 1000,
            output_tokens: 200,
            window_size: 200_000,
            is_estimate: false,
        };
        let synthesized = registry.update_context("sx", metrics);
        let registered_at = synthesized.registered_at;

        let mut req = RegisterRequest::new("sx", PathBuf::from("/work/app"));
        req.title = Some("t".into());
        let replaced = registry.register(req);

        assert_eq!(replaced.title.as_deref(), Some("t"));
        assert_eq!(replaced.registered_at, registered_at);
        assert_eq!(replaced.context_metrics.unwrap().used_pct, 40.0);
        assert_eq!(registry.list().len(), 1);
    }

    #[test]
    fn test_context_update_does_not_change_status() {
        let registry = SessionRegistry::new();
        register(&registry, "s1");
        registry.set_idle("s1");
        let metrics = jacques_types::ContextMetrics {
            used_pct: 10.0,
            remaining_pct: 90.0,
            input_tokens: 0,
            output_tokens: 0,
            window_size: 0,
            is_estimate: true,
        };
        let session = registry.update_context("s1", metrics);
        assert_eq!(session.status, SessionStatus::Idle);
    }

    #[test]
    fn test_terminal_key_collision_gets_suffix() {
        let registry = SessionRegistry::new();
        let terminal = TerminalIdentity {
            tty: Some("/dev/ttys007".into()),
            ..Default::default()
        };
        let mut first = RegisterRequest::new("aaaa1111-x", PathBuf::from("/p"));
        first.terminal = Some(terminal.clone());
        let mut second = RegisterRequest::new("bbbb2222-y", PathBuf::from("/p"));
        second.terminal = Some(terminal);

        let s1 = registry.register(first);
        let s2 = registry.register(second);
        assert_eq!(s1.terminal_key, "TTY:/dev/ttys007");
        assert_eq!(s2.terminal_key, "TTY:/dev/ttys007:bbbb2222");
    }

    #[test]
    fn test_discovered_key_replaced_by_real_registration() {
        let registry = SessionRegistry::new();
        let mut discovered = RegisterRequest::new("dddd4444-z", PathBuf::from("/p"));
        discovered.discovered = true;
        let session = registry.register(discovered);
        assert_eq!(session.terminal_key, "DISCOVERED:dddd4444");

        let mut real = RegisterRequest::new("dddd4444-z", PathBuf::from("/p"));
        real.terminal = Some(TerminalIdentity {
            term_session_id: Some("w1t2".into()),
            ..Default::default()
        });
        let session = registry.register(real);
        assert_eq!(session.terminal_key, "EMULATOR:w1t2");
        assert_eq!(registry.list().len(), 1);
    }

    #[test]
    fn test_signals_emitted_in_causal_order() {
        let registry = SessionRegistry::new();
        let mut rx = registry.subscribe();
        register(&registry, "s1");

        match rx.try_recv().unwrap() {
            RegistrySignal::SessionUpdated(session) => assert_eq!(session.session_id, "s1"),
            other => panic!("expected SessionUpdated, got {other:?}"),
        }
        match rx.try_recv().unwrap() {
            RegistrySignal::FocusChanged { session_id } => {
                assert_eq!(session_id.as_deref(), Some("s1"))
            }
            other => panic!("expected FocusChanged, got {other:?}"),
        }
    }

    #[test]
    fn test_status_is_always_exactly_one_of_three() {
        let registry = SessionRegistry::new();
        register(&registry, "s1");
        registry.update_activity("s1");
        registry.set_idle("s1");
        for session in registry.list() {
            assert!(matches!(
                session.status,
                SessionStatus::Active | SessionStatus::Working | SessionStatus::Idle
            ));
        }
    }
}
