use crate::error::Result;
use crate::paths::write_atomic;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const CONFIG_VERSION: &str = "1.0.0";
pub const DEFAULT_CONTEXT_THRESHOLDS: [u32; 3] = [50, 70, 90];
pub const DEFAULT_LARGE_OPERATION_THRESHOLD: u64 = 50_000;

/// Notification category, used both in config and on fired notifications
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationCategory {
    Context,
    Operation,
    Plan,
    AutoCompact,
    Handoff,
}

/// Per-category enable flags; all on by default
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CategoryFlags {
    pub context: bool,
    pub operation: bool,
    pub plan: bool,
    pub auto_compact: bool,
    pub handoff: bool,
}

impl Default for CategoryFlags {
    fn default() -> Self {
        Self {
            context: true,
            operation: true,
            plan: true,
            auto_compact: true,
            handoff: true,
        }
    }
}

impl CategoryFlags {
    pub fn enabled(&self, category: NotificationCategory) -> bool {
        match category {
            NotificationCategory::Context => self.context,
            NotificationCategory::Operation => self.operation,
            NotificationCategory::Plan => self.plan,
            NotificationCategory::AutoCompact => self.auto_compact,
            NotificationCategory::Handoff => self.handoff,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSettings {
    pub enabled: bool,
    #[serde(default)]
    pub categories: CategoryFlags,
    #[serde(default = "default_large_operation_threshold")]
    pub large_operation_threshold: u64,
    #[serde(default = "default_context_thresholds")]
    pub context_thresholds: Vec<u32>,
}

fn default_large_operation_threshold() -> u64 {
    DEFAULT_LARGE_OPERATION_THRESHOLD
}

fn default_context_thresholds() -> Vec<u32> {
    DEFAULT_CONTEXT_THRESHOLDS.to_vec()
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            categories: CategoryFlags::default(),
            large_operation_threshold: DEFAULT_LARGE_OPERATION_THRESHOLD,
            context_thresholds: DEFAULT_CONTEXT_THRESHOLDS.to_vec(),
        }
    }
}

/// Persisted settings at `<home>/.jacques/config.json`.
///
/// The `sources` subtree belongs to external importers and is carried
/// through untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub version: String,
    #[serde(default)]
    pub notifications: NotificationSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<serde_json::Value>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION.to_string(),
            notifications: NotificationSettings::default(),
            sources: None,
        }
    }
}

impl Config {
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let mut bytes = serde_json::to_vec_pretty(self)?;
        bytes.push(b'\n');
        write_atomic(path, &bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.version, CONFIG_VERSION);
        assert!(config.notifications.enabled);
        assert_eq!(config.notifications.context_thresholds, vec![50, 70, 90]);
        assert_eq!(config.notifications.large_operation_threshold, 50_000);
        assert!(config.notifications.categories.auto_compact);
    }

    #[test]
    fn test_load_missing_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config.version, CONFIG_VERSION);
    }

    #[test]
    fn test_save_and_load_preserves_sources() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = Config::default();
        config.sources = Some(serde_json::json!({"gdrive": {"folder": "abc"}}));
        config.notifications.context_thresholds = vec![60, 80];
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.notifications.context_thresholds, vec![60, 80]);
        assert_eq!(
            loaded.sources.unwrap()["gdrive"]["folder"],
            serde_json::json!("abc")
        );
    }

    #[test]
    fn test_categories_serialize_kebab_case() {
        let json = serde_json::to_value(CategoryFlags::default()).unwrap();
        assert!(json.get("auto-compact").is_some());
    }
}
