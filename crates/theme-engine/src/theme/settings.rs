//! Adapter over the external key/value settings store.
//!
//! The engine reads the desired theme name and the theme list from the store, writes the
//! committed theme name back, and emits its notifications through it. [SettingsStore] is an
//! in-memory, JSON-backed implementation that also fans events out to subscribers.

use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{
    Map,
    Value,
};
use tokio::sync::broadcast;
use tracing::{
    debug,
    trace,
};

use super::engine::protocol::ThemeEvent;
use crate::util::error::UtilError;
use crate::util::{
    read_json_file,
    write_json_file,
};

/// Key holding the name of the selected theme.
pub const THEME_KEY: &str = "theme";

/// Object under which [SettingsBridge::setting] keys live.
pub const SETTINGS_ROOT: &str = "settings";

/// Nested path of the registered theme list.
pub const THEMES_PATH: &str = "settings.themes";

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// The narrow interface the engine consumes from the settings store.
pub trait SettingsBridge: std::fmt::Debug + Send + Sync + 'static {
    /// Reads a top level setting.
    fn setting(&self, key: &str) -> Option<Value>;

    /// Writes a top level setting.
    fn set_setting(&self, key: &str, value: Value);

    /// Reads a nested value by dotted path, eg `settings.themes`.
    fn get_setting(&self, path: &str) -> Option<Value>;

    /// Publishes an engine notification.
    fn emit(&self, event: ThemeEvent);

    /// The stored theme name, if set to a string.
    fn theme_name(&self) -> Option<String> {
        self.setting(THEME_KEY).and_then(|v| v.as_str().map(String::from))
    }
}

/// In-memory settings store backed by a JSON document.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    inner: Arc<RwLock<Value>>,
    event_tx: broadcast::Sender<ThemeEvent>,
}

impl SettingsStore {
    pub fn new(value: Value) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let value = match value {
            Value::Object(_) => value,
            other => {
                debug!(?other, "settings root is not an object, starting empty");
                Value::Object(Map::new())
            },
        };
        Self {
            inner: Arc::new(RwLock::new(value)),
            event_tx,
        }
    }

    pub fn empty() -> Self {
        Self::new(Value::Object(Map::new()))
    }

    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, UtilError> {
        let value: Value = read_json_file(path).await?;
        Ok(Self::new(value))
    }

    /// Writes the current document to `path`.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), UtilError> {
        let value = self.to_value();
        write_json_file(path, &value).await
    }

    /// Returns a copy of the whole document.
    pub fn to_value(&self) -> Value {
        self.inner.read().clone()
    }

    /// Subscribes to events emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<ThemeEvent> {
        self.event_tx.subscribe()
    }

    /// Writes `value` at a dotted path, creating intermediate objects. Non-object intermediates
    /// are replaced.
    pub fn set_path(&self, path: &str, value: Value) {
        trace!(path, ?value, "writing setting");
        let mut root = self.inner.write();
        let mut segments = path.split('.').peekable();
        let mut node = &mut *root;
        while let Some(segment) = segments.next() {
            if !node.is_object() {
                *node = Value::Object(Map::new());
            }
            let map = match node {
                Value::Object(map) => map,
                _ => return,
            };
            if segments.peek().is_none() {
                map.insert(segment.to_string(), value);
                return;
            }
            node = map.entry(segment.to_string()).or_insert_with(|| Value::Object(Map::new()));
        }
    }
}

impl Default for SettingsStore {
    fn default() -> Self {
        Self::empty()
    }
}

impl SettingsBridge for SettingsStore {
    fn setting(&self, key: &str) -> Option<Value> {
        self.get_setting(&format!("{SETTINGS_ROOT}.{key}"))
    }

    fn set_setting(&self, key: &str, value: Value) {
        self.set_path(&format!("{SETTINGS_ROOT}.{key}"), value);
    }

    fn get_setting(&self, path: &str) -> Option<Value> {
        let root = self.inner.read();
        let mut node = &*root;
        for segment in path.split('.') {
            node = node.get(segment)?;
        }
        Some(node.clone())
    }

    fn emit(&self, event: ThemeEvent) {
        debug!(name = event.name(), "emitting theme event");
        // No subscribers is not an error.
        let _ = self.event_tx.send(event);
    }
}
