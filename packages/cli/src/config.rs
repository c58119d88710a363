use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use vlatex_editor::EditorConfig;

pub const DEFAULT_CONFIG_NAME: &str = "vlatex.config.json";

/// vlatex configuration file format
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// File extensions picked up when a directory is given
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Editor and layout settings
    #[serde(flatten)]
    pub editor: EditorConfig,
}

fn default_extensions() -> Vec<String> {
    vec!["tex".to_string()]
}

impl Config {
    /// Load `path` if given, otherwise `vlatex.config.json` in `cwd`.
    /// A missing default file yields the default configuration.
    pub fn load(cwd: &Path, path: Option<&Path>) -> anyhow::Result<Self> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(cwd).join(DEFAULT_CONFIG_NAME);
                if !default.exists() {
                    return Ok(Config::default());
                }
                default
            }
        };

        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| anyhow::anyhow!("Cannot read {}: {}", config_path.display(), e))?;
        let config: Config = serde_json::from_str(&content)?;
        tracing::debug!(path = %config_path.display(), "Loaded configuration");
        Ok(config)
    }

    pub fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map_or(false, |ext| self.extensions.iter().any(|known| known == ext))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            editor: EditorConfig::default(),
        }
    }
}
