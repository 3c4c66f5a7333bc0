pub mod protocol;
pub mod state;

use std::sync::Arc;

use protocol::{
    InvalidReference,
    SetThemeOutcome,
    SwapSnapshot,
    ThemeEngineError,
    ThemeEngineRequest,
    ThemeEngineResponse,
    ThemeRef,
};
use serde_json::json;
use state::{
    Effect,
    LoadId,
    LoadOutcome,
    LoadPurpose,
    Phase,
    SwapState,
};
use tokio::sync::mpsc;
use tracing::{
    debug,
    error,
    info,
    trace,
    warn,
};

use super::catalog::{
    Catalog,
    ThemeDescriptor,
};
use super::config::EngineConfig;
use super::consts::THEME_ELEMENT_KEY;
use super::overlay::{
    self,
    OverlayApplication,
    OverlayGenerations,
    OverlayRequest,
};
use super::paths::{
    ResourceLayout,
    cache_bust,
};
use super::platform::{
    ElementId,
    Platform,
    ResourceError,
    Stylesheet,
};
use super::settings::{
    SettingsBridge,
    THEME_KEY,
};
use crate::util::request_channel::{
    Request,
    RequestReceiver,
    RequestSender,
    new_request_channel,
    respond,
};

/// Capacity of the channel carrying load and overlay results back to the engine task.
const MESSAGE_CHANNEL_CAPACITY: usize = 32;

type EngineRequest = Request<ThemeEngineRequest, ThemeEngineResponse, ThemeEngineError>;

/// Cloneable handle to a running [ThemeEngine].
#[derive(Debug, Clone)]
pub struct ThemeEngineHandle {
    sender: RequestSender<ThemeEngineRequest, ThemeEngineResponse, ThemeEngineError>,
}

impl ThemeEngineHandle {
    async fn send(&self, request: ThemeEngineRequest) -> Result<ThemeEngineResponse, ThemeEngineError> {
        self.sender
            .send_recv(request)
            .await
            .unwrap_or(Err(ThemeEngineError::Channel))
    }

    /// Switches to another theme. The terminal outcome of a started load arrives as an event on
    /// the settings bridge.
    pub async fn set_theme(&self, theme: impl Into<ThemeRef>) -> Result<SetThemeOutcome, ThemeEngineError> {
        match self.send(ThemeEngineRequest::SetTheme(theme.into())).await? {
            ThemeEngineResponse::SetTheme(outcome) => Ok(outcome),
            other => Err(unexpected_response(&other)),
        }
    }

    /// Loads the active theme's resource again, bypassing the cache.
    pub async fn reload(&self) -> Result<SetThemeOutcome, ThemeEngineError> {
        match self.send(ThemeEngineRequest::Reload).await? {
            ThemeEngineResponse::SetTheme(outcome) => Ok(outcome),
            other => Err(unexpected_response(&other)),
        }
    }

    /// Returns whether the stored mode changed.
    pub async fn set_rendering_mode(&self, mode: Option<String>) -> Result<bool, ThemeEngineError> {
        match self.send(ThemeEngineRequest::SetRenderingMode(mode)).await? {
            ThemeEngineResponse::RenderingMode(changed) => Ok(changed),
            other => Err(unexpected_response(&other)),
        }
    }

    pub async fn current_theme(&self) -> Result<ThemeDescriptor, ThemeEngineError> {
        match self.send(ThemeEngineRequest::CurrentTheme).await? {
            ThemeEngineResponse::Theme(theme) => Ok(theme),
            other => Err(unexpected_response(&other)),
        }
    }

    pub async fn available_themes(&self) -> Result<Vec<ThemeDescriptor>, ThemeEngineError> {
        match self.send(ThemeEngineRequest::AvailableThemes).await? {
            ThemeEngineResponse::Themes(themes) => Ok(themes),
            other => Err(unexpected_response(&other)),
        }
    }

    pub async fn find_theme(&self, name: impl Into<String>) -> Result<Option<ThemeDescriptor>, ThemeEngineError> {
        match self.send(ThemeEngineRequest::FindTheme(name.into())).await? {
            ThemeEngineResponse::FoundTheme(theme) => Ok(theme),
            other => Err(unexpected_response(&other)),
        }
    }

    pub async fn snapshot(&self) -> Result<SwapSnapshot, ThemeEngineError> {
        match self.send(ThemeEngineRequest::Snapshot).await? {
            ThemeEngineResponse::Snapshot(snapshot) => Ok(snapshot),
            other => Err(unexpected_response(&other)),
        }
    }

    /// Waits until no theme load or overlay build is outstanding.
    ///
    /// Loads have no timeout, so callers that talk to real resources should bound this.
    pub async fn settled(&self) -> Result<(), ThemeEngineError> {
        match self.send(ThemeEngineRequest::Settled).await? {
            ThemeEngineResponse::Settled => Ok(()),
            other => Err(unexpected_response(&other)),
        }
    }
}

fn unexpected_response(response: &ThemeEngineResponse) -> ThemeEngineError {
    ThemeEngineError::Custom(format!("unexpected response: {:?}", response))
}

/// Results sent back to the engine task by the tasks it spawns.
#[derive(Debug)]
enum EngineMessage {
    Load {
        id: LoadId,
        outcome: LoadOutcome,
    },
    Overlay {
        generation: u64,
        result: Result<OverlayApplication, ResourceError>,
    },
}

/// Owns the swap state and serializes every change to it.
///
/// Construct with [ThemeEngine::new] and start with [ThemeEngine::spawn].
#[derive(Debug)]
pub struct ThemeEngine {
    catalog: Catalog,
    layout: ResourceLayout,
    settings: Arc<dyn SettingsBridge>,
    platform: Arc<dyn Platform>,

    state: SwapState,
    phase: Phase,
    initial_theme: Option<String>,

    /// Theme element currently attached to the document.
    theme_element: Option<ElementId>,
    overlay_generations: OverlayGenerations,
    last_load_id: LoadId,

    /// Number of spawned load and overlay tasks that have not reported back.
    outstanding: usize,
    settle_waiters: Vec<EngineRequest>,

    message_tx: mpsc::Sender<EngineMessage>,
    message_rx: mpsc::Receiver<EngineMessage>,
}

impl ThemeEngine {
    pub fn new(config: &EngineConfig, settings: Arc<dyn SettingsBridge>, platform: Arc<dyn Platform>) -> Self {
        let (message_tx, message_rx) = mpsc::channel(MESSAGE_CHANNEL_CAPACITY);
        Self {
            catalog: config.catalog(),
            layout: config.layout(),
            settings,
            platform,
            state: SwapState {
                rendering_mode: config.rendering_mode.clone(),
                ..Default::default()
            },
            phase: Phase::Bootstrap,
            initial_theme: config.initial_theme.clone(),
            theme_element: None,
            overlay_generations: OverlayGenerations::default(),
            last_load_id: LoadId::default(),
            outstanding: 0,
            settle_waiters: Vec::new(),
            message_tx,
            message_rx,
        }
    }

    /// Theme tried first when the engine starts, ahead of the stored setting.
    pub fn with_initial_theme(mut self, name: impl Into<String>) -> Self {
        self.initial_theme = Some(name.into());
        self
    }

    /// Starts the engine task and applies the initial theme.
    pub fn spawn(mut self) -> ThemeEngineHandle {
        let (sender, request_rx) = new_request_channel();
        tokio::spawn(async move {
            self.apply_initial_theme();
            self.main_loop(request_rx).await;
        });
        ThemeEngineHandle { sender }
    }

    fn apply_initial_theme(&mut self) {
        let settings = self.settings.as_ref();
        let initial = [self.initial_theme.clone(), settings.theme_name()]
            .into_iter()
            .find_map(|name| {
                self.catalog
                    .find_theme(settings, name.as_deref())
                    .filter(ThemeDescriptor::is_loadable)
            })
            .or_else(|| {
                self.catalog
                    .available_themes(settings)
                    .into_iter()
                    .find(ThemeDescriptor::is_loadable)
            });

        match initial {
            Some(theme) => {
                info!(name = theme.name, "applying initial theme");
                self.set_theme(ThemeRef::Descriptor(theme));
            },
            None => warn!("no theme available to apply"),
        }
    }

    async fn main_loop(mut self, mut request_rx: RequestReceiver<ThemeEngineRequest, ThemeEngineResponse, ThemeEngineError>) {
        loop {
            tokio::select! {
                req = request_rx.recv() => {
                    let Some(req) = req else {
                        debug!("request channel closed, theme engine exiting");
                        break;
                    };
                    self.handle_request(req);
                },
                msg = self.message_rx.recv() => {
                    // The engine holds a sender, so the channel never closes while it runs.
                    let Some(msg) = msg else {
                        break;
                    };
                    self.handle_message(msg);
                },
            }

            if self.outstanding == 0 && !self.settle_waiters.is_empty() {
                trace!(count = self.settle_waiters.len(), "engine settled");
                for waiter in self.settle_waiters.drain(..) {
                    waiter.respond(Ok(ThemeEngineResponse::Settled));
                }
            }
        }
    }

    fn handle_request(&mut self, req: EngineRequest) {
        trace!(?req.payload, "theme engine received request");
        if matches!(req.payload, ThemeEngineRequest::Settled) && self.outstanding > 0 {
            self.settle_waiters.push(req);
            return;
        }

        let res = match req.payload {
            ThemeEngineRequest::SetTheme(theme) => ThemeEngineResponse::SetTheme(self.set_theme(theme)),
            ThemeEngineRequest::Reload => ThemeEngineResponse::SetTheme(self.reload()),
            ThemeEngineRequest::SetRenderingMode(mode) => ThemeEngineResponse::RenderingMode(self.set_rendering_mode(mode)),
            ThemeEngineRequest::CurrentTheme => match self.current_theme() {
                Some(theme) => ThemeEngineResponse::Theme(theme),
                None => {
                    respond!(req, Err(ThemeEngineError::Custom("no themes available".to_string())));
                    return;
                },
            },
            ThemeEngineRequest::AvailableThemes => {
                ThemeEngineResponse::Themes(self.catalog.available_themes(self.settings.as_ref()))
            },
            ThemeEngineRequest::FindTheme(name) => {
                ThemeEngineResponse::FoundTheme(self.catalog.find_theme(self.settings.as_ref(), Some(&name)))
            },
            ThemeEngineRequest::Snapshot => ThemeEngineResponse::Snapshot(self.state.snapshot()),
            ThemeEngineRequest::Settled => ThemeEngineResponse::Settled,
        };
        respond!(req, Ok(res));
    }

    fn current_theme(&self) -> Option<ThemeDescriptor> {
        self.state
            .active
            .clone()
            .or_else(|| self.catalog.available_themes(self.settings.as_ref()).into_iter().next())
    }

    fn set_theme(&mut self, theme: ThemeRef) -> SetThemeOutcome {
        let descriptor = match theme {
            ThemeRef::Name(name) => match self.catalog.find_theme(self.settings.as_ref(), Some(&name)) {
                Some(descriptor) => descriptor,
                None => return self.reject(InvalidReference::UnknownTheme(name)),
            },
            ThemeRef::Descriptor(descriptor) => descriptor,
        };
        let Some(href) = self.href_for(&descriptor) else {
            return self.reject(InvalidReference::MissingUrl(descriptor.name));
        };

        self.state.discard_pending();
        if self.state.is_active(&descriptor) {
            debug!(name = descriptor.name, "theme is already active");
            return SetThemeOutcome::Unchanged;
        }

        let purpose = match self.phase {
            Phase::Bootstrap => {
                self.phase = Phase::Steady;
                LoadPurpose::Bootstrap
            },
            Phase::Steady => LoadPurpose::Switch,
        };
        let id = self.start_load(descriptor, href, purpose);
        SetThemeOutcome::Loading { id }
    }

    fn reload(&mut self) -> SetThemeOutcome {
        let Some(mut descriptor) = self.state.active.clone() else {
            debug!("no active theme to reload");
            return SetThemeOutcome::Unchanged;
        };
        if let Some(url) = descriptor.url.as_deref() {
            descriptor.url = Some(cache_bust(url, chrono::Utc::now().timestamp_millis()));
        }
        let Some(href) = self.href_for(&descriptor) else {
            return self.reject(InvalidReference::MissingUrl(descriptor.name));
        };

        self.state.discard_pending();
        let id = self.start_load(descriptor, href, LoadPurpose::Reload);
        SetThemeOutcome::Loading { id }
    }

    fn set_rendering_mode(&mut self, mode: Option<String>) -> bool {
        if self.state.rendering_mode == mode {
            return false;
        }
        debug!(?mode, "rendering mode changed");
        self.state.rendering_mode = mode;
        match self.state.rendering_mode.clone() {
            Some(mode) => self.apply_overlay(&mode),
            None => {
                // Invalidates any build still in flight.
                self.overlay_generations.advance();
                overlay::detach(&self.platform.document());
            },
        }
        true
    }

    fn href_for(&self, descriptor: &ThemeDescriptor) -> Option<String> {
        if !descriptor.is_loadable() {
            return None;
        }
        self.layout.theme_url(descriptor, &self.platform.current_path())
    }

    /// Logs the invalid reference and puts the stored theme setting back to the active theme.
    fn reject(&self, reason: InvalidReference) -> SetThemeOutcome {
        error!(%reason, "invalid theme reference");
        if let Some(active) = &self.state.active {
            if self.settings.theme_name().as_deref() != Some(active.name.as_str()) {
                self.settings.set_setting(THEME_KEY, json!(active.name));
            }
        }
        SetThemeOutcome::Rejected(reason)
    }

    fn start_load(&mut self, descriptor: ThemeDescriptor, href: String, purpose: LoadPurpose) -> LoadId {
        self.last_load_id = self.last_load_id.next();
        let id = self.last_load_id;
        debug!(%id, name = descriptor.name, href, ?purpose, "starting theme load");
        self.state.begin_load(id, descriptor, href.clone(), purpose);

        let platform = Arc::clone(&self.platform);
        let message_tx = self.message_tx.clone();
        self.outstanding += 1;
        tokio::spawn(async move {
            let outcome = match platform.load_stylesheet(&href).await {
                Ok(sheet) => LoadOutcome::Loaded(sheet),
                Err(err) => LoadOutcome::Failed(err),
            };
            if message_tx.send(EngineMessage::Load { id, outcome }).await.is_err() {
                trace!(%id, "theme engine exited before load finished");
            }
        });
        id
    }

    fn apply_overlay(&mut self, mode: &str) {
        let Some(active) = &self.state.active else {
            debug!(mode, "no active theme, skipping rendering mode overlay");
            return;
        };
        let Some(theme_href) = self.href_for(active) else {
            debug!(name = active.name, "active theme has no url, skipping rendering mode overlay");
            return;
        };
        let path = self.platform.current_path();
        let request = OverlayRequest {
            generation: self.overlay_generations.advance(),
            mode: mode.to_string(),
            mode_href: self.layout.rendering_mode_url(mode, &path),
            theme_href,
        };
        debug!(?request, "building rendering mode overlay");

        let platform = Arc::clone(&self.platform);
        let message_tx = self.message_tx.clone();
        self.outstanding += 1;
        tokio::spawn(async move {
            let result = overlay::build(platform.as_ref(), &request).await;
            let msg = EngineMessage::Overlay {
                generation: request.generation,
                result,
            };
            if message_tx.send(msg).await.is_err() {
                trace!("theme engine exited before overlay finished");
            }
        });
    }

    fn handle_message(&mut self, msg: EngineMessage) {
        self.outstanding = self.outstanding.saturating_sub(1);
        match msg {
            EngineMessage::Load { id, outcome } => {
                let effects = self.state.resolve(id, outcome, &self.layout.theme_file);
                for effect in effects {
                    self.apply_effect(effect);
                }
            },
            EngineMessage::Overlay { generation, result } => {
                if !self.overlay_generations.is_current(generation) {
                    trace!(generation, "ignoring stale rendering mode overlay");
                    return;
                }
                match result {
                    Ok(application) => {
                        overlay::attach(&self.platform.document(), application);
                    },
                    Err(err) => error!(?err, "failed to apply rendering mode overlay"),
                }
            },
        }
    }

    fn apply_effect(&mut self, effect: Effect) {
        trace!(?effect, "applying effect");
        match effect {
            Effect::Attach(sheet) => self.attach_theme(sheet),
            Effect::SyncSetting(name) => {
                if self.settings.theme_name().as_deref() != Some(name.as_str()) {
                    self.settings.set_setting(THEME_KEY, json!(name));
                }
            },
            Effect::Emit(event) => {
                info!(event = event.name(), ?event, "theme event");
                self.settings.emit(event);
            },
            Effect::Retry { descriptor, purpose } => match self.href_for(&descriptor) {
                Some(href) => {
                    info!(href, "retrying custom theme with the theme file appended");
                    self.start_load(descriptor, href, purpose);
                },
                None => warn!(?descriptor, "cannot retry theme without a url"),
            },
            Effect::ReapplyOverlay(mode) => self.apply_overlay(&mode),
        }
    }

    /// Inserts the new theme element before tearing down the old one.
    fn attach_theme(&mut self, sheet: Stylesheet) {
        let document = self.platform.document();
        let id = document.insert(Some(THEME_ELEMENT_KEY), sheet.into());
        if let Some(old) = self.theme_element.replace(id) {
            document.remove(old);
        }
    }
}
