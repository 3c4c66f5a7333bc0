use std::path::Path;

use serde::{
    Deserialize,
    Serialize,
};
use tracing::debug;

use super::catalog::Catalog;
use super::consts::{
    DEFAULT_BUILTIN_THEMES,
    DEFAULT_MOUNT_SEGMENT,
    THEME_FILE_NAME,
};
use super::paths::ResourceLayout;
use crate::util::error::UtilError;
use crate::util::read_json_file;

/// Static configuration for a [super::engine::ThemeEngine].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Path segment that marks the application root when present in the document path.
    pub mount_segment: String,
    /// Themes that are always available, in order.
    pub builtin_themes: Vec<String>,
    /// Stylesheet file name inside a theme directory.
    pub theme_file: String,
    /// Optional per-mode file name for rendering mode resources.
    pub overlay_file: Option<String>,
    /// Rendering mode applied from the start of the session.
    pub rendering_mode: Option<String>,
    /// Theme to start with, taking priority over the stored setting.
    pub initial_theme: Option<String>,
}

impl EngineConfig {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, UtilError> {
        let path = path.as_ref();
        let config: Self = read_json_file(path).await?;
        debug!(?path, ?config, "loaded engine config");
        Ok(config)
    }

    pub fn catalog(&self) -> Catalog {
        Catalog::new(self.builtin_themes.iter().cloned())
    }

    pub fn layout(&self) -> ResourceLayout {
        ResourceLayout::from_config(self)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mount_segment: DEFAULT_MOUNT_SEGMENT.to_string(),
            builtin_themes: DEFAULT_BUILTIN_THEMES.iter().map(|s| s.to_string()).collect(),
            theme_file: THEME_FILE_NAME.to_string(),
            overlay_file: None,
            rendering_mode: None,
            initial_theme: None,
        }
    }
}
