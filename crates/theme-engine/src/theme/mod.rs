//! Asynchronous theme swapping.
//!
//! A [ThemeEngine] owns the active theme and swaps it for another only once the replacement's
//! stylesheet has loaded. Callers talk to a running engine through a [ThemeEngineHandle] and
//! observe outcomes as [ThemeEvent]s published on the [SettingsBridge].

pub mod catalog;
pub mod config;
pub mod consts;
pub mod engine;
pub mod overlay;
pub mod paths;
pub mod platform;
pub mod settings;

pub use catalog::{
    Catalog,
    SourceKind,
    ThemeDescriptor,
};
pub use config::EngineConfig;
pub use engine::protocol::{
    SetThemeOutcome,
    SwapSnapshot,
    ThemeEngineError,
    ThemeEvent,
    ThemeRef,
};
pub use engine::{
    ThemeEngine,
    ThemeEngineHandle,
};
pub use platform::{
    Document,
    HttpPlatform,
    Platform,
};
pub use settings::{
    SettingsBridge,
    SettingsStore,
};
