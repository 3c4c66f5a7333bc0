#![allow(dead_code)]

use std::borrow::Cow;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use theme_engine::theme::consts::{
    OVERLAY_ELEMENT_KEY,
    THEME_ELEMENT_KEY,
};
use theme_engine::theme::platform::StyleElement;
use theme_engine::theme::{
    EngineConfig,
    Platform,
    SetThemeOutcome,
    SettingsBridge,
    SettingsStore,
    SwapSnapshot,
    ThemeEngine,
    ThemeEngineHandle,
    ThemeEvent,
    ThemeRef,
};
use theme_engine::util::test::{
    FakePlatform,
    drain_events,
};
use tokio::sync::broadcast;

pub const DEFAULT_HREF: &str = "/styles/themes/default/theme.css";
pub const RELAYOS_HREF: &str = "/styles/themes/relayos/theme.css";

const SETTLE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Default)]
pub struct TestCaseBuilder {
    test_name: Option<String>,
    config: Option<EngineConfig>,
    settings: Option<Value>,
    path: Option<String>,
    resources: Vec<(String, String)>,
    failures: Vec<(String, u16)>,
    held: Vec<String>,
}

impl TestCaseBuilder {
    pub fn test_name<'a>(mut self, name: impl Into<Cow<'a, str>>) -> Self {
        self.test_name = Some(name.into().to_string());
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_settings(mut self, settings: Value) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Current document path. Defaults to `/`.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_resource(mut self, href: impl Into<String>, css: impl Into<String>) -> Self {
        self.resources.push((href.into(), css.into()));
        self
    }

    pub fn with_failure(mut self, href: impl Into<String>, status: u16) -> Self {
        self.failures.push((href.into(), status));
        self
    }

    pub fn with_held(mut self, href: impl Into<String>) -> Self {
        self.held.push(href.into());
        self
    }

    /// Spawns the engine. The initial theme load may still be in flight.
    pub fn build(self) -> TestCase {
        let mut platform = FakePlatform::new(self.path.unwrap_or_else(|| "/".to_string()));
        for (href, css) in self.resources {
            platform = platform.with_resource(href, css);
        }
        for (href, status) in self.failures {
            platform = platform.with_failure(href, status);
        }
        for href in self.held {
            platform = platform.with_held(href);
        }

        let settings = SettingsStore::new(self.settings.unwrap_or_else(|| Value::Object(Default::default())));
        let events_rx = settings.subscribe();
        let engine = ThemeEngine::new(
            &self.config.unwrap_or_default(),
            Arc::new(settings.clone()),
            Arc::new(platform.clone()),
        )
        .spawn();

        TestCase {
            test_name: self.test_name.unwrap_or_else(|| "theme_engine_test".to_string()),
            engine,
            platform,
            settings,
            events_rx,
            events: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub struct TestCase {
    test_name: String,
    engine: ThemeEngineHandle,
    platform: FakePlatform,
    settings: SettingsStore,
    events_rx: broadcast::Receiver<ThemeEvent>,
    /// Every event received so far
    events: Vec<ThemeEvent>,
}

impl TestCase {
    pub fn builder() -> TestCaseBuilder {
        TestCaseBuilder::default()
    }

    pub fn engine(&self) -> &ThemeEngineHandle {
        &self.engine
    }

    pub fn platform(&self) -> &FakePlatform {
        &self.platform
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    pub async fn set_theme(&self, theme: impl Into<ThemeRef>) -> SetThemeOutcome {
        self.engine.set_theme(theme).await.expect("engine should respond")
    }

    pub async fn snapshot(&self) -> SwapSnapshot {
        self.engine.snapshot().await.expect("engine should respond")
    }

    pub async fn settled(&self) {
        tokio::time::timeout(SETTLE_TIMEOUT, self.engine.settled())
            .await
            .expect("timed out waiting for the engine to settle")
            .expect("engine should respond");
    }

    /// Events received since the last call.
    pub fn take_events(&mut self) -> Vec<ThemeEvent> {
        let new = drain_events(&mut self.events_rx);
        self.events.extend(new.iter().cloned());
        new
    }

    pub fn stored_theme(&self) -> Option<String> {
        self.settings.theme_name()
    }

    pub fn active_name(snapshot: &SwapSnapshot) -> Option<&str> {
        snapshot.active.as_ref().map(|t| t.name.as_str())
    }

    pub fn theme_elements(&self) -> Vec<StyleElement> {
        self.keyed_elements(THEME_ELEMENT_KEY)
    }

    pub fn overlay_elements(&self) -> Vec<StyleElement> {
        self.keyed_elements(OVERLAY_ELEMENT_KEY)
    }

    fn keyed_elements(&self, key: &str) -> Vec<StyleElement> {
        self.platform
            .document()
            .elements()
            .into_iter()
            .filter(|e| e.key.as_deref() == Some(key))
            .collect()
    }

    fn create_test_output(&self) -> TestOutput {
        TestOutput {
            events: self.events.clone(),
            loads: self.platform.loads(),
            fetches: self.platform.fetches(),
            document: self.platform.document().elements(),
            settings: self.settings.to_value(),
        }
    }
}

impl Drop for TestCase {
    fn drop(&mut self) {
        if std::thread::panicking() {
            let Ok(test_output) = serde_json::to_string_pretty(&self.create_test_output()) else {
                eprintln!("failed to create test output for test: {}", self.test_name);
                return;
            };
            let test_name = self.test_name.replace(" ", "_");
            let file_name = PathBuf::from(format!("{}_debug_output.json", test_name));
            let _ = std::fs::write(&file_name, test_output);
            println!("Test debug output written to: '{}'", file_name.to_string_lossy());
        }
    }
}

#[derive(Debug, Serialize)]
struct TestOutput {
    events: Vec<ThemeEvent>,
    loads: Vec<String>,
    fetches: Vec<String>,
    document: Vec<StyleElement>,
    settings: Value,
}
