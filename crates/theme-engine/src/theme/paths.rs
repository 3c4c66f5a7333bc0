//! Resource url construction.

use std::sync::LazyLock;

use regex::Regex;
use tracing::trace;

use super::catalog::{
    SourceKind,
    ThemeDescriptor,
};
use super::config::EngineConfig;
use super::consts::{
    CACHE_BUST_PARAM,
    DEFAULT_MOUNT_SEGMENT,
    RENDER_MODES_DIR,
    THEME_FILE_NAME,
    THEMES_DIR,
};

static CACHE_BUST_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!("{CACHE_BUST_PARAM}=[0-9]+")).expect("cache bust regex is valid"));

/// Naming conventions used to locate theme and rendering mode resources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceLayout {
    /// If the document path contains this segment, it is the application root.
    pub mount_segment: String,
    /// Stylesheet file name inside a theme directory.
    pub theme_file: String,
    /// Overrides `<mode>.css` with `<mode>/<file>` for rendering mode resources.
    pub overlay_file: Option<String>,
}

impl ResourceLayout {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            mount_segment: config.mount_segment.clone(),
            theme_file: config.theme_file.clone(),
            overlay_file: config.overlay_file.clone(),
        }
    }

    /// Detects the application root from the current document path. Always starts and ends with
    /// `/`.
    pub fn app_root(&self, path: &str) -> String {
        let normalized = path.strip_suffix('/').unwrap_or(path);
        let mount = self.mount_segment.trim_end_matches('/');

        if !mount.is_empty() && normalized.contains(mount) {
            return match mount.starts_with('/') {
                true => format!("{mount}/"),
                false => format!("/{mount}/"),
            };
        }

        match normalized.split('/').nth(1) {
            Some(first) if !first.is_empty() => format!("/{first}/"),
            _ => "/".to_string(),
        }
    }

    /// Url of the stylesheet for `descriptor`, or [None] if a url-bearing descriptor has no url.
    ///
    /// Built-in themes follow the `styles/themes/<name>/` convention under the application root,
    /// legacy themes get the theme file appended to their directory url, and the custom theme is
    /// loaded from its literal url.
    pub fn theme_url(&self, descriptor: &ThemeDescriptor, path: &str) -> Option<String> {
        let url = match descriptor.source_kind {
            SourceKind::Builtin => format!(
                "{}{THEMES_DIR}/{}/{}",
                self.app_root(path),
                descriptor.name.to_lowercase(),
                self.theme_file
            ),
            SourceKind::LegacyUrl => append_resource_file(descriptor.url.as_deref()?, &self.theme_file),
            SourceKind::Custom => descriptor.url.clone()?,
        };
        trace!(?descriptor, url, "resolved theme url");
        Some(url)
    }

    pub fn rendering_mode_url(&self, mode: &str, path: &str) -> String {
        let root = self.app_root(path);
        match &self.overlay_file {
            Some(file) => format!("{root}{RENDER_MODES_DIR}/{mode}/{file}"),
            None => format!("{root}{RENDER_MODES_DIR}/{mode}.css"),
        }
    }
}

impl Default for ResourceLayout {
    fn default() -> Self {
        Self {
            mount_segment: DEFAULT_MOUNT_SEGMENT.to_string(),
            theme_file: THEME_FILE_NAME.to_string(),
            overlay_file: None,
        }
    }
}

/// Appends `file` to a directory url, keeping any query string after it.
pub fn append_resource_file(url: &str, file: &str) -> String {
    let (base, query) = match url.split_once('?') {
        Some((base, query)) => (base, Some(query)),
        None => (url, None),
    };
    let mut out = base.to_string();
    if !out.ends_with('/') {
        out.push('/');
    }
    out.push_str(file);
    if let Some(query) = query.filter(|q| !q.is_empty()) {
        out.push('?');
        out.push_str(query);
    }
    out
}

/// Whether `url` already points directly at `file` (optionally followed by a query string).
pub fn points_at_file(url: &str, file: &str) -> bool {
    let path = url.split_once('?').map_or(url, |(path, _)| path);
    path.strip_suffix(file).is_some_and(|dir| dir.ends_with('/'))
}

/// Replaces the cache busting token in `url`, or appends one.
pub fn cache_bust(url: &str, token: i64) -> String {
    let param = format!("{CACHE_BUST_PARAM}={token}");
    if CACHE_BUST_REGEX.is_match(url) {
        CACHE_BUST_REGEX.replace(url, param.as_str()).into_owned()
    } else if url.contains('?') {
        format!("{url}&{param}")
    } else {
        format!("{url}?{param}")
    }
}
