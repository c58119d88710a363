//! Editor configuration, as read from `vlatex.config.json`.

use serde::{Deserialize, Serialize};
use vlatex_parser::ParseOptions;
use vlatex_projector::LayoutRules;

use crate::errors::EditorError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EditorConfig {
    /// Merge consecutive typing into one text run into a single undo step
    pub coalesce_edits: bool,

    /// Longest pause, in milliseconds, between two coalesced edits
    pub coalesce_window_ms: u64,

    /// Maximum number of undo levels (0 = unlimited)
    pub max_undo_levels: usize,

    /// Extra environments laid out as lists
    pub list_environments: Vec<String>,

    /// Extra environments whose body is math
    pub math_environments: Vec<String>,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            coalesce_edits: true,
            coalesce_window_ms: 1000,
            max_undo_levels: 100,
            list_environments: Vec::new(),
            math_environments: Vec::new(),
        }
    }
}

impl EditorConfig {
    pub fn from_json(json: &str) -> Result<Self, EditorError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            math_environments: self.math_environments.iter().cloned().collect(),
        }
    }

    pub fn layout_rules(&self) -> LayoutRules {
        LayoutRules::new(
            self.list_environments.iter().cloned(),
            self.math_environments.iter().cloned(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config = EditorConfig::from_json(r#"{ "coalesceEdits": false, "mathEnvironments": ["dmath"] }"#)
            .unwrap();
        assert!(!config.coalesce_edits);
        assert_eq!(config.coalesce_window_ms, 1000);
        assert_eq!(config.max_undo_levels, 100);
        assert!(config.parse_options().is_math_environment("dmath"));
        assert!(config.layout_rules().math_environments.contains("dmath"));
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        assert!(matches!(
            EditorConfig::from_json("{ \"maxUndoLevels\": -1 }"),
            Err(EditorError::Config(_))
        ));
    }
}
