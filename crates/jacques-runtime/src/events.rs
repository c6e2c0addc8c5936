//! Wire formats: inbound hook events (Unix socket, snake_case) and
//! outbound domain messages to subscribers.

use jacques_types::{ContextMetrics, Session, SessionSource, TerminalIdentity};
use serde::{Deserialize, Serialize};

use crate::notifications::Notification;

/// One line on the hook socket. Every event carries `event` and
/// `session_id`; anything else is event-specific.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event")]
#[serde(rename_all = "snake_case")]
pub enum HookEvent {
    SessionStart(SessionStartEvent),
    Activity(BasicEvent),
    ContextUpdate(ContextUpdateEvent),
    Idle(BasicEvent),
    SessionEnd(BasicEvent),
    OperationComplete(OperationCompleteEvent),
}

impl HookEvent {
    pub fn session_id(&self) -> &str {
        match self {
            HookEvent::SessionStart(e) => &e.session_id,
            HookEvent::Activity(e) => &e.session_id,
            HookEvent::ContextUpdate(e) => &e.session_id,
            HookEvent::Idle(e) => &e.session_id,
            HookEvent::SessionEnd(e) => &e.session_id,
            HookEvent::OperationComplete(e) => &e.session_id,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BasicEvent {
    pub session_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionStartEvent {
    pub session_id: String,
    #[serde(default)]
    pub project_path: Option<String>,
    #[serde(default)]
    pub transcript_path: Option<String>,
    #[serde(default)]
    pub source: Option<SessionSource>,
    #[serde(flatten)]
    pub terminal: TerminalIdentity,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub workspace: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContextUpdateEvent {
    pub session_id: String,
    pub used_pct: f64,
    #[serde(default)]
    pub remaining_pct: Option<f64>,
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub window_size: u64,
    #[serde(default)]
    pub is_estimate: bool,
    #[serde(default)]
    pub model: Option<String>,
}

impl ContextUpdateEvent {
    pub fn metrics(&self) -> ContextMetrics {
        ContextMetrics {
            used_pct: self.used_pct,
            remaining_pct: self.remaining_pct.unwrap_or(100.0 - self.used_pct),
            input_tokens: self.input_tokens,
            output_tokens: self.output_tokens,
            window_size: self.window_size,
            is_estimate: self.is_estimate,
        }
    }
}

/// Completion signal for a large operation, reported by an external
/// observer over the same socket.
#[derive(Debug, Clone, Deserialize)]
pub struct OperationCompleteEvent {
    pub session_id: String,
    pub total_tokens: u64,
    #[serde(default)]
    pub description: Option<String>,
}

/// Registry change signals, broadcast to the fan-out layer.
#[derive(Debug, Clone)]
pub enum RegistrySignal {
    SessionUpdated(Box<Session>),
    SessionRemoved { session_id: String },
    FocusChanged { session_id: Option<String> },
}

/// Messages delivered to each subscriber, in a per-subscriber total order.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum DomainMessage {
    InitialState {
        sessions: Vec<Session>,
        focused: Option<String>,
        notifications: Vec<Notification>,
    },
    SessionUpdate {
        session: Box<Session>,
    },
    SessionRemoved {
        session_id: String,
    },
    FocusChanged {
        session_id: Option<String>,
    },
    NotificationFired {
        notification: Notification,
    },
    HandoffReady {
        session_id: String,
        path: String,
    },
    Ack {
        request: String,
        ok: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

/// Requests a subscriber may send back to the core.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum SubscriberRequest {
    SelectSession { session_id: String },
    ToggleAutocompact,
    FocusTerminal { session_id: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_start_round_trip() {
        let line = r#"{"event":"session_start","session_id":"s1","project_path":"/work/app","tty":"/dev/ttys001","model":"claude-x"}"#;
        let event: HookEvent = serde_json::from_str(line).unwrap();
        match event {
            HookEvent::SessionStart(e) => {
                assert_eq!(e.session_id, "s1");
                assert_eq!(e.project_path.as_deref(), Some("/work/app"));
                assert_eq!(e.terminal.tty.as_deref(), Some("/dev/ttys001"));
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn test_unknown_event_name_fails_parse() {
        let line = r#"{"event":"mystery","session_id":"s1"}"#;
        assert!(serde_json::from_str::<HookEvent>(line).is_err());
    }

    #[test]
    fn test_context_update_metrics_defaults_remaining() {
        let line = r#"{"event":"context_update","session_id":"s1","used_pct":72.5}"#;
        let event: HookEvent = serde_json::from_str(line).unwrap();
        match event {
            HookEvent::ContextUpdate(e) => {
                let metrics = e.metrics();
                assert_eq!(metrics.used_pct, 72.5);
                assert_eq!(metrics.remaining_pct, 27.5);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn test_domain_message_serializes_tagged() {
        let msg = DomainMessage::FocusChanged {
            session_id: Some("s1".into()),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "focus_changed");
        assert_eq!(json["session_id"], "s1");
    }
}
