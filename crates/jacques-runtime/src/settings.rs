//! The AI tool's own settings file (`<transcript-root>/settings.json`).
//!
//! Read at session start to populate the session's autocompact fields;
//! written only by the explicit toggle request, preserving every field we
//! do not understand.

use jacques_types::{write_atomic, JacquesPaths};
use serde_json::Value;

use crate::Result;

/// Environment variable the AI tool honors as a compaction-threshold
/// override.
pub const AUTOCOMPACT_THRESHOLD_ENV: &str = "CLAUDE_AUTOCOMPACT_THRESHOLD";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutocompactSettings {
    pub enabled: bool,
    pub threshold: Option<u32>,
}

impl Default for AutocompactSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: None,
        }
    }
}

/// Read the observed autocompact settings; missing file means defaults.
pub fn read_autocompact(paths: &JacquesPaths) -> AutocompactSettings {
    let threshold = std::env::var(AUTOCOMPACT_THRESHOLD_ENV)
        .ok()
        .and_then(|v| v.parse::<u32>().ok());

    let enabled = std::fs::read_to_string(paths.ai_tool_settings_file())
        .ok()
        .and_then(|content| serde_json::from_str::<Value>(&content).ok())
        .and_then(|v| v.get("autoCompact").and_then(Value::as_bool))
        .unwrap_or(true);

    AutocompactSettings { enabled, threshold }
}

/// Flip `autoCompact` in the settings file via read-modify-write, keeping
/// unknown fields intact.
pub fn write_autocompact(
    paths: &JacquesPaths,
    enabled: bool,
    threshold: Option<u32>,
) -> Result<()> {
    let path = paths.ai_tool_settings_file();
    let mut settings: Value = std::fs::read_to_string(&path)
        .ok()
        .and_then(|content| serde_json::from_str(&content).ok())
        .unwrap_or_else(|| Value::Object(Default::default()));

    if let Value::Object(map) = &mut settings {
        map.insert("autoCompact".to_string(), Value::Bool(enabled));
        match threshold {
            Some(pct) => {
                map.insert("autoCompactThreshold".to_string(), Value::from(pct));
            }
            None => {
                map.remove("autoCompactThreshold");
            }
        }
    }

    let mut bytes = serde_json::to_vec_pretty(&settings).map_err(jacques_types::Error::Json)?;
    bytes.push(b'\n');
    write_atomic(&path, &bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use jacques_types::JacquesPaths;

    fn temp_paths() -> (tempfile::TempDir, JacquesPaths) {
        let dir = tempfile::tempdir().unwrap();
        let paths = JacquesPaths::with_roots(
            dir.path().join(".jacques"),
            dir.path().join(".claude"),
        );
        std::fs::create_dir_all(paths.transcript_root()).unwrap();
        (dir, paths)
    }

    #[test]
    fn test_missing_settings_defaults_enabled() {
        let (_dir, paths) = temp_paths();
        let settings = read_autocompact(&paths);
        assert!(settings.enabled);
    }

    #[test]
    fn test_toggle_round_trip_preserves_unknown_fields() {
        let (_dir, paths) = temp_paths();
        std::fs::write(
            paths.ai_tool_settings_file(),
            r#"{"autoCompact": true, "theme": "dark"}"#,
        )
        .unwrap();

        write_autocompact(&paths, false, Some(70)).unwrap();

        let raw: Value =
            serde_json::from_str(&std::fs::read_to_string(paths.ai_tool_settings_file()).unwrap())
                .unwrap();
        assert_eq!(raw["autoCompact"], Value::Bool(false));
        assert_eq!(raw["autoCompactThreshold"], Value::from(70));
        assert_eq!(raw["theme"], Value::from("dark"));

        let settings = read_autocompact(&paths);
        assert!(!settings.enabled);
    }
}
