//! Notification rules over observed events.
//!
//! Each rule fires into the fan-out layer; the engine owns threshold
//! crossing state, per-category cooldowns, and a bounded history that is
//! replayed to subscribers on connect.

use chrono::{DateTime, Utc};
use jacques_types::{NotificationCategory, NotificationSettings, Session};
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

pub const NOTIFICATION_HISTORY_LIMIT: usize = 50;

/// Token total at which a completed operation is worth a high-priority
/// notification.
pub const LARGE_OPERATION_HIGH_PRIORITY: u64 = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPriority {
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub category: NotificationCategory,
    pub priority: NotificationPriority,
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub fired_at: DateTime<Utc>,
}

/// Per-category minimum intervals between notifications with the same key.
#[derive(Debug, Clone)]
pub struct Cooldowns {
    pub context: Duration,
    pub operation: Duration,
    pub plan: Duration,
    pub auto_compact: Duration,
    pub handoff: Duration,
}

impl Default for Cooldowns {
    fn default() -> Self {
        Self {
            context: Duration::from_secs(60),
            operation: Duration::from_secs(10),
            plan: Duration::from_secs(30),
            auto_compact: Duration::from_secs(60),
            handoff: Duration::from_secs(10),
        }
    }
}

impl Cooldowns {
    fn for_category(&self, category: NotificationCategory) -> Duration {
        match category {
            NotificationCategory::Context => self.context,
            NotificationCategory::Operation => self.operation,
            NotificationCategory::Plan => self.plan,
            NotificationCategory::AutoCompact => self.auto_compact,
            NotificationCategory::Handoff => self.handoff,
        }
    }
}

pub struct NotificationEngine {
    settings: NotificationSettings,
    cooldowns: Cooldowns,
    /// (session, threshold) pairs that already fired.
    crossed: HashSet<(String, u32)>,
    /// Sessions already warned about the autocompact bug.
    bug_warned: HashSet<String>,
    /// Last observed usedPct per session.
    last_pct: HashMap<String, f64>,
    last_fired: HashMap<(NotificationCategory, String), Instant>,
    history: VecDeque<Notification>,
}

impl NotificationEngine {
    pub fn new(settings: NotificationSettings) -> Self {
        Self {
            settings,
            cooldowns: Cooldowns::default(),
            crossed: HashSet::new(),
            bug_warned: HashSet::new(),
            last_pct: HashMap::new(),
            last_fired: HashMap::new(),
            history: VecDeque::new(),
        }
    }

    #[cfg(test)]
    pub fn with_cooldowns(settings: NotificationSettings, cooldowns: Cooldowns) -> Self {
        let mut engine = Self::new(settings);
        engine.cooldowns = cooldowns;
        engine
    }

    pub fn settings(&self) -> &NotificationSettings {
        &self.settings
    }

    pub fn update_settings(&mut self, settings: NotificationSettings) {
        self.settings = settings;
    }

    /// Recent notifications, oldest first.
    pub fn history(&self) -> Vec<Notification> {
        self.history.iter().cloned().collect()
    }

    /// Forget a session's crossing state (on unregister).
    pub fn forget_session(&mut self, session_id: &str) {
        self.crossed.retain(|(id, _)| id != session_id);
        self.bug_warned.remove(session_id);
        self.last_pct.remove(session_id);
    }

    /// Context-usage rules: one notification per session per crossed
    /// threshold, plus the autocompact-bug warning at 78% when the
    /// setting is off.
    pub fn on_context_update(&mut self, session: &Session, used_pct: f64) -> Vec<Notification> {
        let previous = self
            .last_pct
            .insert(session.session_id.clone(), used_pct)
            .unwrap_or(0.0);

        let mut fired = Vec::new();

        let mut thresholds = self.settings.context_thresholds.clone();
        thresholds.sort_unstable();
        for threshold in thresholds {
            let crossing = previous < threshold as f64 && used_pct >= threshold as f64;
            if !crossing {
                continue;
            }
            let key = (session.session_id.clone(), threshold);
            if !self.crossed.insert(key) {
                continue;
            }
            let priority = if threshold >= 90 {
                NotificationPriority::Critical
            } else if threshold >= 70 {
                NotificationPriority::High
            } else {
                NotificationPriority::Medium
            };
            if let Some(n) = self.fire(
                NotificationCategory::Context,
                priority,
                format!("Context at {used_pct:.0}%"),
                format!("Session crossed the {threshold}% context threshold"),
                Some(session.session_id.clone()),
                // Distinct thresholds crossed in one jump each get to fire.
                format!("{}:{threshold}", session.session_id),
            ) {
                fired.push(n);
            }
        }

        let bug_line = session.autocompact_bug_threshold as f64;
        if used_pct >= bug_line
            && !session.autocompact_enabled
            && self.bug_warned.insert(session.session_id.clone())
            && let Some(n) = self.fire(
                NotificationCategory::AutoCompact,
                NotificationPriority::High,
                "Forced compaction imminent".to_string(),
                format!(
                    "Context is at {used_pct:.0}% with autocompact off; the tool is known to compact around {bug_line:.0}% anyway"
                ),
                Some(session.session_id.clone()),
                session.session_id.clone(),
            )
        {
            fired.push(n);
        }

        fired
    }

    /// Large-operation completion rule.
    pub fn on_operation_complete(
        &mut self,
        session_id: &str,
        total_tokens: u64,
        description: Option<&str>,
    ) -> Option<Notification> {
        if total_tokens < self.settings.large_operation_threshold {
            return None;
        }
        let priority = if total_tokens >= LARGE_OPERATION_HIGH_PRIORITY {
            NotificationPriority::High
        } else {
            NotificationPriority::Medium
        };
        self.fire(
            NotificationCategory::Operation,
            priority,
            format!("Large operation finished ({total_tokens} tokens)"),
            description.unwrap_or("A long-running operation completed").to_string(),
            Some(session_id.to_string()),
            session_id.to_string(),
        )
    }

    /// Handoff artifact detected.
    pub fn on_handoff(&mut self, session_id: &str, path: &str) -> Option<Notification> {
        self.fire(
            NotificationCategory::Handoff,
            NotificationPriority::Medium,
            "Handoff ready".to_string(),
            path.to_string(),
            Some(session_id.to_string()),
            session_id.to_string(),
        )
    }

    fn fire(
        &mut self,
        category: NotificationCategory,
        priority: NotificationPriority,
        title: String,
        body: String,
        session_id: Option<String>,
        cooldown_key: String,
    ) -> Option<Notification> {
        if !self.settings.enabled || !self.settings.categories.enabled(category) {
            return None;
        }

        let now = Instant::now();
        let key = (category, cooldown_key);
        if let Some(last) = self.last_fired.get(&key)
            && now.duration_since(*last) < self.cooldowns.for_category(category)
        {
            return None;
        }
        self.last_fired.insert(key, now);

        let notification = Notification {
            category,
            priority,
            title,
            body,
            session_id,
            fired_at: Utc::now(),
        };
        self.history.push_back(notification.clone());
        while self.history.len() > NOTIFICATION_HISTORY_LIMIT {
            self.history.pop_front();
        }
        Some(notification)
    }
}
