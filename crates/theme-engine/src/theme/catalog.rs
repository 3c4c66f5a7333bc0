//! Registered theme descriptors and case-insensitive lookup.
//!
//! The theme list lives in the settings store under [THEMES_PATH] in either the legacy shape
//! (`{ "name": "Dark", "url": "static/themes/dark" }`) or the modern one
//! (`{ "name": "Default", "isNewStyle": true }`). [Catalog] normalizes both into
//! [ThemeDescriptor] and guarantees the built-in themes are always listed.

use serde::{
    Deserialize,
    Serialize,
};
use serde_json::{
    Value,
    json,
};
use tracing::{
    debug,
    trace,
    warn,
};

use super::consts::{
    CUSTOM_THEME_NAME,
    DEFAULT_BUILTIN_THEMES,
};
use super::settings::{
    SettingsBridge,
    THEMES_PATH,
};

/// Where a theme's resource comes from.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum SourceKind {
    /// Shipped with the application, located by naming convention.
    Builtin,
    /// Located by an explicit directory url.
    LegacyUrl,
    /// The user supplied `custom` theme, loaded from its literal url.
    Custom,
}

/// Named reference to a presentation resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThemeDescriptor {
    pub name: String,
    pub source_kind: SourceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl ThemeDescriptor {
    pub fn builtin(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source_kind: SourceKind::Builtin,
            url: None,
        }
    }

    pub fn legacy(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source_kind: SourceKind::LegacyUrl,
            url: Some(url.into()),
        }
    }

    pub fn custom(url: impl Into<String>) -> Self {
        Self {
            name: CUSTOM_THEME_NAME.to_string(),
            source_kind: SourceKind::Custom,
            url: Some(url.into()),
        }
    }

    /// Case-insensitive name comparison.
    pub fn is_named(&self, name: &str) -> bool {
        self.name.to_lowercase() == name.to_lowercase()
    }

    pub fn is_builtin(&self) -> bool {
        self.source_kind == SourceKind::Builtin
    }

    /// Whether the descriptor carries everything needed to build its resource url.
    pub fn is_loadable(&self) -> bool {
        self.is_builtin() || self.url.as_deref().is_some_and(|u| !u.is_empty())
    }

    /// Shape written back into the settings store's theme list.
    fn to_settings_value(&self) -> Value {
        match self.source_kind {
            SourceKind::Builtin => json!({ "name": self.name, "isNewStyle": true }),
            kind => json!({ "name": self.name, "url": self.url, "sourceKind": kind }),
        }
    }
}

/// A theme list entry as found in the settings store.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawThemeEntry {
    name: Option<String>,
    url: Option<String>,
    is_new_style: Option<bool>,
    source_kind: Option<SourceKind>,
}

impl RawThemeEntry {
    fn normalize(self) -> Option<ThemeDescriptor> {
        let name = self.name.filter(|n| !n.is_empty())?;
        let source_kind = match (self.source_kind, self.is_new_style) {
            (Some(kind), _) => kind,
            (None, Some(true)) => SourceKind::Builtin,
            (None, _) if name.eq_ignore_ascii_case(CUSTOM_THEME_NAME) => SourceKind::Custom,
            (None, _) => SourceKind::LegacyUrl,
        };
        let url = match source_kind {
            SourceKind::Builtin => None,
            _ => self.url,
        };
        Some(ThemeDescriptor { name, source_kind, url })
    }
}

/// Known themes. Holds only the fixed built-in set; the registered themes are read from the
/// settings store on every call.
#[derive(Debug, Clone)]
pub struct Catalog {
    builtins: Vec<ThemeDescriptor>,
}

impl Catalog {
    pub fn new<I, S>(builtin_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            builtins: builtin_names.into_iter().map(ThemeDescriptor::builtin).collect(),
        }
    }

    pub fn builtins(&self) -> &[ThemeDescriptor] {
        &self.builtins
    }

    /// The registered themes in settings order, followed by any built-in that was missing.
    ///
    /// A registered theme sharing a built-in's name is upgraded to the built-in kind where it
    /// stands. A name registered twice keeps its first position and its last fields.
    pub fn available_themes(&self, settings: &dyn SettingsBridge) -> Vec<ThemeDescriptor> {
        let mut themes: Vec<ThemeDescriptor> = Vec::new();

        let entries = match settings.get_setting(THEMES_PATH) {
            Some(Value::Array(entries)) => entries,
            Some(other) => {
                warn!(?other, "theme list is not an array, ignoring");
                Vec::new()
            },
            None => Vec::new(),
        };

        for entry in entries {
            let descriptor = match serde_json::from_value::<RawThemeEntry>(entry.clone()) {
                Ok(raw) => raw.normalize(),
                Err(err) => {
                    warn!(?err, ?entry, "skipping malformed theme entry");
                    continue;
                },
            };
            let Some(descriptor) = descriptor else {
                warn!(?entry, "skipping theme entry without a name");
                continue;
            };
            match themes.iter_mut().find(|t| t.is_named(&descriptor.name)) {
                Some(existing) => *existing = descriptor,
                None => themes.push(descriptor),
            }
        }

        for builtin in &self.builtins {
            match themes.iter_mut().find(|t| t.is_named(&builtin.name)) {
                Some(existing) if !existing.is_builtin() => {
                    trace!(name = existing.name, "upgrading registered theme to built-in");
                    existing.source_kind = SourceKind::Builtin;
                    existing.url = None;
                },
                Some(_) => (),
                None => themes.push(builtin.clone()),
            }
        }

        debug!(count = themes.len(), "available themes");
        themes
    }

    /// Case-insensitive exact match over [Self::available_themes].
    pub fn find_theme(&self, settings: &dyn SettingsBridge, name: Option<&str>) -> Option<ThemeDescriptor> {
        let name = name?;
        let found = self
            .available_themes(settings)
            .into_iter()
            .find(|t| t.is_named(name));
        debug!(name, ?found, "theme lookup");
        found
    }

    /// Writes `descriptor` into the store's theme list, replacing an entry with the same name in
    /// place or appending it.
    pub fn register(&self, settings: &dyn SettingsBridge, descriptor: &ThemeDescriptor) {
        let mut entries = match settings.get_setting(THEMES_PATH) {
            Some(Value::Array(entries)) => entries,
            _ => Vec::new(),
        };
        let existing = entries.iter().position(|entry| {
            entry
                .get("name")
                .and_then(Value::as_str)
                .is_some_and(|n| descriptor.is_named(n))
        });
        match existing {
            Some(idx) => entries[idx] = descriptor.to_settings_value(),
            None => entries.push(descriptor.to_settings_value()),
        }
        debug!(?descriptor, "registered theme");
        settings.set_setting("themes", Value::Array(entries));
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new(DEFAULT_BUILTIN_THEMES.iter().copied())
    }
}
