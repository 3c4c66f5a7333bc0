//! Rendering mode overlay.
//!
//! A rendering mode (eg, `widget`, `fullscreen`) ships its own stylesheet that must sit
//! underneath the active theme: wherever both define a rule, the theme wins. The preferred
//! strategy inlines both texts into one element with the mode first. If either text cannot be
//! fetched, the mode stylesheet is linked on its own instead.

use tracing::{
    debug,
    trace,
    warn,
};

use super::consts::OVERLAY_ELEMENT_KEY;
use super::platform::{
    Document,
    ElementId,
    Platform,
    ResourceError,
    StyleSource,
    Stylesheet,
};

/// How the overlay ended up being built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverlayApplication {
    /// Mode and theme text combined into a single inline element.
    Inline { css: String },
    /// The mode stylesheet alone, linked.
    Linked(Stylesheet),
}

impl From<OverlayApplication> for StyleSource {
    fn from(value: OverlayApplication) -> Self {
        match value {
            OverlayApplication::Inline { css } => StyleSource::Inline { css },
            OverlayApplication::Linked(sheet) => sheet.into(),
        }
    }
}

/// Everything needed to build one overlay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayRequest {
    pub generation: u64,
    pub mode: String,
    pub mode_href: String,
    pub theme_href: String,
}

/// Hands out overlay generations and tells whether a finished build is still wanted.
#[derive(Debug, Default)]
pub struct OverlayGenerations {
    latest: u64,
}

impl OverlayGenerations {
    /// Starts a new generation, invalidating every earlier one.
    pub fn advance(&mut self) -> u64 {
        self.latest += 1;
        self.latest
    }

    pub fn is_current(&self, generation: u64) -> bool {
        generation == self.latest
    }
}

/// Mode rules first so that the theme's rules override them.
pub fn combine(mode_css: &str, theme_css: &str) -> String {
    format!("{mode_css}\n{theme_css}")
}

/// Builds the overlay, falling back to linking the mode stylesheet if the combined text cannot be
/// assembled.
pub async fn build(platform: &dyn Platform, request: &OverlayRequest) -> Result<OverlayApplication, ResourceError> {
    let (mode_text, theme_text) = tokio::join!(
        platform.fetch_text(&request.mode_href),
        platform.fetch_text(&request.theme_href)
    );

    match (mode_text, theme_text) {
        (Ok(mode_css), Ok(theme_css)) => {
            trace!(mode = request.mode, "combining rendering mode with theme text");
            Ok(OverlayApplication::Inline {
                css: combine(&mode_css, &theme_css),
            })
        },
        (mode_res, theme_res) => {
            warn!(
                mode = request.mode,
                mode_err = ?mode_res.err(),
                theme_err = ?theme_res.err(),
                "failed to fetch overlay text, linking the rendering mode stylesheet instead"
            );
            let sheet = platform.load_stylesheet(&request.mode_href).await?;
            Ok(OverlayApplication::Linked(sheet))
        },
    }
}

/// Attaches `application` as the overlay element, replacing any earlier one.
pub fn attach(document: &Document, application: OverlayApplication) -> ElementId {
    let id = document.replace_keyed(OVERLAY_ELEMENT_KEY, application.into());
    debug!(?id, "attached rendering mode overlay");
    id
}

/// Removes the overlay element, if any.
pub fn detach(document: &Document) -> bool {
    document.remove_keyed(OVERLAY_ELEMENT_KEY)
}
