use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Editor-wide tunables. Every field has a default so a config file only
/// needs to name what it overrides; `load` with no file is valid too.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct EditorConfig {
    /// Lower zoom clamp.
    pub min_scale: f64,
    /// Upper zoom clamp.
    pub max_scale: f64,
    /// Smallest width a node can be resized to.
    pub min_node_width: f64,
    /// Smallest height a node can be resized to.
    pub min_node_height: f64,
    /// Width of a freshly added node.
    pub default_node_width: f64,
    /// Distance from the node's top edge to the first socket row.
    pub socket_offset: f64,
    /// Vertical distance between consecutive socket rows.
    pub socket_pitch: f64,
    /// Per-request timeout in milliseconds.
    pub request_timeout_ms: u64,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            min_scale: 0.2,
            max_scale: 2.0,
            min_node_width: 300.0,
            min_node_height: 200.0,
            default_node_width: 450.0,
            socket_offset: 200.0,
            socket_pitch: 28.0,
            request_timeout_ms: 5_000,
        }
    }
}

impl EditorConfig {
    /// Read a JSON config file, falling back to defaults when `path` is None.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        config.validate()?;
        info!(path = %path.display(), "loaded editor config");
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !(self.min_scale > 0.0 && self.min_scale < self.max_scale) {
            anyhow::bail!(
                "zoom range must satisfy 0 < min_scale < max_scale (got {} .. {})",
                self.min_scale,
                self.max_scale
            );
        }
        if self.min_node_width <= 0.0 || self.min_node_height <= 0.0 {
            anyhow::bail!("minimum node dimensions must be positive");
        }
        if self.request_timeout_ms == 0 {
            anyhow::bail!("request_timeout_ms must be positive");
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_missing_path_yields_defaults() {
        let config = EditorConfig::load(None).unwrap();
        assert_eq!(config.default_node_width, 450.0);
        assert_eq!(config.request_timeout(), Duration::from_millis(5_000));
    }

    #[test]
    fn test_partial_file_overrides_only_named_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("editor.json");
        fs::write(&path, r#"{"max_scale": 4.0, "request_timeout_ms": 250}"#).unwrap();

        let config = EditorConfig::load(Some(&path)).unwrap();
        assert_eq!(config.max_scale, 4.0);
        assert_eq!(config.request_timeout_ms, 250);
        assert_eq!(config.min_scale, 0.2);
    }

    #[test]
    fn test_inverted_zoom_range_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("editor.json");
        fs::write(&path, r#"{"min_scale": 3.0, "max_scale": 1.0}"#).unwrap();
        assert!(EditorConfig::load(Some(&path)).is_err());
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("editor.json");
        fs::write(&path, r#"{"zoom": 2.0}"#).unwrap();
        assert!(EditorConfig::load(Some(&path)).is_err());
    }
}
