use serde::{
    Deserialize,
    Serialize,
};

use super::state::LoadId;
use crate::theme::catalog::ThemeDescriptor;

/// Notification published through the settings bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "content")]
#[serde(rename_all = "camelCase")]
pub enum ThemeEvent {
    /// A theme was committed.
    Change {
        next: ThemeDescriptor,
        previous: ThemeDescriptor,
    },
    /// A theme failed to load. `active` is the theme that remains applied.
    Failed {
        attempted: ThemeDescriptor,
        active: Option<ThemeDescriptor>,
    },
}

impl ThemeEvent {
    /// Event name as seen by settings store listeners.
    pub fn name(&self) -> &'static str {
        match self {
            ThemeEvent::Change { .. } => "theme.change",
            ThemeEvent::Failed { .. } => "theme.failed",
        }
    }
}

/// What to switch to: a catalog name or a full descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThemeRef {
    Name(String),
    Descriptor(ThemeDescriptor),
}

impl From<&str> for ThemeRef {
    fn from(value: &str) -> Self {
        Self::Name(value.to_string())
    }
}

impl From<String> for ThemeRef {
    fn from(value: String) -> Self {
        Self::Name(value)
    }
}

impl From<ThemeDescriptor> for ThemeRef {
    fn from(value: ThemeDescriptor) -> Self {
        Self::Descriptor(value)
    }
}

/// Why a theme reference could not be used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum InvalidReference {
    #[error("no theme named '{}'", .0)]
    UnknownTheme(String),
    #[error("theme '{}' has no url", .0)]
    MissingUrl(String),
}

/// Immediate result of a set theme or reload request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SetThemeOutcome {
    /// A load was started. Its terminal outcome arrives as a [ThemeEvent].
    Loading { id: LoadId },
    /// The theme is already active.
    Unchanged,
    /// The reference was invalid; nothing changed.
    Rejected(InvalidReference),
}

/// Copy of the engine's swap state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapSnapshot {
    pub active: Option<ThemeDescriptor>,
    pub previous: Option<ThemeDescriptor>,
    pub pending: Option<ThemeDescriptor>,
    pub rendering_mode: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum ThemeEngineError {
    #[error("The channel has closed")]
    Channel,
    #[error("{}", .0)]
    Custom(String),
}

#[derive(Debug, Clone)]
pub enum ThemeEngineRequest {
    SetTheme(ThemeRef),
    Reload,
    SetRenderingMode(Option<String>),
    CurrentTheme,
    AvailableThemes,
    FindTheme(String),
    Snapshot,
    /// Answered once no load or overlay application is outstanding.
    Settled,
}

#[derive(Debug, Clone)]
pub enum ThemeEngineResponse {
    SetTheme(SetThemeOutcome),
    /// Whether the stored rendering mode changed.
    RenderingMode(bool),
    Theme(ThemeDescriptor),
    Themes(Vec<ThemeDescriptor>),
    FoundTheme(Option<ThemeDescriptor>),
    Snapshot(SwapSnapshot),
    Settled,
}
