//! Engine configuration
//!
//! Loaded from `trellis.config.json` in the project directory. Every field
//! has a default so a missing file (or a partial one) is fine.

use crate::EditorError;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_CONFIG_NAME: &str = "trellis.config.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Attribute holding each node's stable identifier
    #[serde(default = "default_id_attribute")]
    pub id_attribute: String,

    /// Prefix for synthesized unique class selectors
    #[serde(default = "default_selector_prefix")]
    pub selector_prefix: String,

    /// Maximum number of undo levels (0 = unlimited)
    #[serde(default = "default_max_history_levels")]
    pub max_history_levels: usize,

    /// Responsive breakpoints, widest first
    #[serde(default = "default_breakpoints")]
    pub breakpoints: Vec<BreakpointConfig>,

    #[serde(default)]
    pub validation: ValidationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakpointConfig {
    pub name: String,

    /// Media query text, e.g. `(max-width: 991px)`
    pub media: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationConfig {
    /// Upper bound for one validation pass
    #[serde(default = "default_validation_timeout_ms")]
    pub timeout_ms: u64,

    /// Hosts external resources may be loaded from
    #[serde(default)]
    pub allowed_hosts: Vec<String>,

    /// Substitute for image sources that do not resolve
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder_image: Option<String>,
}

fn default_id_attribute() -> String {
    "data-tr-id".to_string()
}

fn default_selector_prefix() -> String {
    "tr".to_string()
}

fn default_max_history_levels() -> usize {
    100
}

fn default_validation_timeout_ms() -> u64 {
    750
}

fn default_breakpoints() -> Vec<BreakpointConfig> {
    vec![
        BreakpointConfig {
            name: "tablet".to_string(),
            media: "(max-width: 991px)".to_string(),
        },
        BreakpointConfig {
            name: "mobile".to_string(),
            media: "(max-width: 767px)".to_string(),
        },
    ]
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_validation_timeout_ms(),
            allowed_hosts: Vec::new(),
            placeholder_image: None,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            id_attribute: default_id_attribute(),
            selector_prefix: default_selector_prefix(),
            max_history_levels: default_max_history_levels(),
            breakpoints: default_breakpoints(),
            validation: ValidationConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load config from a directory, falling back to defaults
    pub fn load(dir: &Path) -> Result<Self, EditorError> {
        let config_path = dir.join(DEFAULT_CONFIG_NAME);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            Self::from_json(&content)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_json(json: &str) -> Result<Self, EditorError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), EditorError> {
        if self.id_attribute.is_empty() {
            return Err(EditorError::Config("idAttribute must not be empty".to_string()));
        }

        let prefix_ok = self
            .selector_prefix
            .chars()
            .next()
            .map(|c| c.is_ascii_alphabetic())
            .unwrap_or(false)
            && self
                .selector_prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !prefix_ok {
            return Err(EditorError::Config(format!(
                "selectorPrefix is not a valid class name: {:?}",
                self.selector_prefix
            )));
        }

        for (i, bp) in self.breakpoints.iter().enumerate() {
            if bp.name == crate::css::BASE_BREAKPOINT {
                return Err(EditorError::Config("\"base\" is a reserved breakpoint name".to_string()));
            }
            if self.breakpoints[..i].iter().any(|other| other.name == bp.name) {
                return Err(EditorError::Config(format!("duplicate breakpoint: {}", bp.name)));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let json = r#"{
            "idAttribute": "data-node",
            "maxHistoryLevels": 20,
            "breakpoints": [
                { "name": "phone", "media": "(max-width: 600px)" }
            ],
            "validation": { "allowedHosts": ["cdn.example.com"] }
        }"#;

        let config = EngineConfig::from_json(json).unwrap();
        assert_eq!(config.id_attribute, "data-node");
        assert_eq!(config.selector_prefix, "tr");
        assert_eq!(config.max_history_levels, 20);
        assert_eq!(config.breakpoints.len(), 1);
        assert_eq!(config.validation.allowed_hosts, vec!["cdn.example.com"]);
        assert_eq!(config.validation.timeout_ms, 750);
    }

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.id_attribute, "data-tr-id");
        assert_eq!(config.breakpoints.len(), 2);
        assert_eq!(config.breakpoints[0].name, "tablet");
    }

    #[test]
    fn test_rejects_reserved_breakpoint_name() {
        let json = r#"{ "breakpoints": [{ "name": "base", "media": "(max-width: 1px)" }] }"#;
        assert!(matches!(EngineConfig::from_json(json), Err(EditorError::Config(_))));
    }

    #[test]
    fn test_rejects_bad_selector_prefix() {
        let json = r#"{ "selectorPrefix": "9 bad" }"#;
        assert!(EngineConfig::from_json(json).is_err());
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::load(dir.path()).unwrap();
        assert_eq!(config, EngineConfig::default());
    }
}
