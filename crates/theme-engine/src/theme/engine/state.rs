//! The swap state machine.
//!
//! Everything here is synchronous and free of I/O: the engine feeds load results in and
//! carries out the returned [Effect]s.

use serde::{
    Deserialize,
    Serialize,
};
use tracing::{
    debug,
    trace,
    warn,
};

use super::protocol::{
    SwapSnapshot,
    ThemeEvent,
};
use crate::theme::catalog::ThemeDescriptor;
use crate::theme::consts::CUSTOM_THEME_NAME;
use crate::theme::paths::{
    append_resource_file,
    points_at_file,
};
use crate::theme::platform::{
    ResourceError,
    Stylesheet,
};

/// Identifies one theme load. Issued in increasing order by the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LoadId(u64);

impl LoadId {
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl std::fmt::Display for LoadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether the engine has made its first theme assignment yet.
///
/// The first assignment is optimistic: the theme becomes active before its resource has
/// loaded. Every later switch waits for the load to succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Bootstrap,
    Steady,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadPurpose {
    /// The first theme of the session, already assigned as active.
    Bootstrap,
    /// A switch to another theme.
    Switch,
    /// A fresh fetch of the active theme.
    Reload,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingLoad {
    pub id: LoadId,
    pub descriptor: ThemeDescriptor,
    pub href: String,
    pub purpose: LoadPurpose,
}

/// Terminal result of a theme load.
#[derive(Debug, Clone)]
pub enum LoadOutcome {
    Loaded(Stylesheet),
    Failed(ResourceError),
}

/// Side effect requested by a state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Attach the loaded stylesheet, then tear down the previously attached theme element.
    Attach(Stylesheet),
    /// Make the stored theme setting equal to this name.
    SyncSetting(String),
    Emit(ThemeEvent),
    /// Load the descriptor again as a continuation of the same request.
    Retry {
        descriptor: ThemeDescriptor,
        purpose: LoadPurpose,
    },
    /// Re-apply the rendering mode overlay for the given mode.
    ReapplyOverlay(String),
}

#[derive(Debug, Clone, Default)]
pub struct SwapState {
    /// Applied theme. [None] only before the first assignment.
    pub active: Option<ThemeDescriptor>,
    /// Theme active immediately before `active`. Never used for rollback.
    pub previous: Option<ThemeDescriptor>,
    /// The single load whose outcome will be acted on.
    pub pending: Option<PendingLoad>,
    /// The first load. Kept apart from `pending` so later calls cannot supersede it.
    pub bootstrap: Option<PendingLoad>,
    pub rendering_mode: Option<String>,
}

impl SwapState {
    pub fn snapshot(&self) -> SwapSnapshot {
        SwapSnapshot {
            active: self.active.clone(),
            previous: self.previous.clone(),
            pending: self.pending.as_ref().or(self.bootstrap.as_ref()).map(|p| p.descriptor.clone()),
            rendering_mode: self.rendering_mode.clone(),
        }
    }

    /// Whether `descriptor` names the active theme.
    pub fn is_active(&self, descriptor: &ThemeDescriptor) -> bool {
        self.active.as_ref().is_some_and(|a| a.is_named(&descriptor.name))
    }

    /// Forgets the pending load. Its result will be ignored when it arrives.
    pub fn discard_pending(&mut self) -> Option<PendingLoad> {
        let discarded = self.pending.take();
        if let Some(p) = &discarded {
            debug!(id = %p.id, name = p.descriptor.name, "discarding pending theme load");
        }
        discarded
    }

    /// Records a new pending load, replacing any existing one.
    ///
    /// The bootstrap load goes to its own slot and assigns `active` and `previous` right away.
    pub fn begin_load(&mut self, id: LoadId, descriptor: ThemeDescriptor, href: String, purpose: LoadPurpose) {
        let load = PendingLoad {
            id,
            descriptor,
            href,
            purpose,
        };
        match purpose {
            LoadPurpose::Bootstrap => {
                self.active = Some(load.descriptor.clone());
                self.previous = Some(load.descriptor.clone());
                self.bootstrap = Some(load);
            },
            LoadPurpose::Switch | LoadPurpose::Reload => self.pending = Some(load),
        }
    }

    /// Applies the terminal outcome of load `id`.
    ///
    /// Results for anything other than the current pending load or the outstanding bootstrap load
    /// are stale and change nothing. A failed load never changes `active` or `previous`.
    pub fn resolve(&mut self, id: LoadId, outcome: LoadOutcome, theme_file: &str) -> Vec<Effect> {
        let Some(pending) = self
            .pending
            .take_if(|p| p.id == id)
            .or_else(|| self.bootstrap.take_if(|b| b.id == id))
        else {
            trace!(%id, "ignoring stale theme load result");
            return Vec::new();
        };
        let PendingLoad {
            descriptor, purpose, ..
        } = pending;

        let mut effects = Vec::new();
        match (purpose, outcome) {
            (LoadPurpose::Bootstrap, LoadOutcome::Loaded(sheet)) => {
                effects.push(Effect::Attach(sheet));
                effects.push(Effect::SyncSetting(descriptor.name));
            },
            (LoadPurpose::Bootstrap, LoadOutcome::Failed(err)) => {
                warn!(?err, name = descriptor.name, "initial theme failed to load");
                return effects;
            },
            (LoadPurpose::Switch, LoadOutcome::Loaded(sheet)) => {
                // A newer element is attached, the first load must not replace it.
                self.bootstrap = None;
                let previous = self.active.replace(descriptor.clone()).unwrap_or_else(|| descriptor.clone());
                self.previous = Some(previous.clone());
                effects.push(Effect::Attach(sheet));
                effects.push(Effect::SyncSetting(descriptor.name.clone()));
                effects.push(Effect::Emit(ThemeEvent::Change {
                    next: descriptor,
                    previous,
                }));
            },
            (LoadPurpose::Reload, LoadOutcome::Loaded(sheet)) => {
                self.bootstrap = None;
                self.active = Some(descriptor.clone());
                let previous = self.previous.clone().unwrap_or_else(|| descriptor.clone());
                effects.push(Effect::Attach(sheet));
                effects.push(Effect::SyncSetting(descriptor.name.clone()));
                effects.push(Effect::Emit(ThemeEvent::Change {
                    next: descriptor,
                    previous,
                }));
            },
            (purpose, LoadOutcome::Failed(err)) => {
                match completed_custom_url(&descriptor, theme_file) {
                    Some(url) => {
                        debug!(?err, url, "custom theme failed to load, retrying with completed url");
                        effects.push(Effect::Retry {
                            descriptor: ThemeDescriptor {
                                url: Some(url),
                                ..descriptor
                            },
                            purpose,
                        });
                    },
                    None => {
                        warn!(?err, name = descriptor.name, "theme failed to load");
                        effects.push(Effect::Emit(ThemeEvent::Failed {
                            attempted: descriptor,
                            active: self.active.clone(),
                        }));
                    },
                }
                return effects;
            },
        }

        if let Some(mode) = &self.rendering_mode {
            effects.push(Effect::ReapplyOverlay(mode.clone()));
        }
        effects
    }
}

/// For the custom theme whose url does not point at the theme file yet, the url with the file
/// appended.
fn completed_custom_url(descriptor: &ThemeDescriptor, theme_file: &str) -> Option<String> {
    if descriptor.is_builtin() || !descriptor.is_named(CUSTOM_THEME_NAME) {
        return None;
    }
    let url = descriptor.url.as_deref()?;
    if points_at_file(url, theme_file) {
        return None;
    }
    Some(append_resource_file(url, theme_file))
}
