/// Built-in themes that are always listed, in order.
pub const DEFAULT_BUILTIN_THEMES: &[&str] = &["Default", "RelayOS"];

/// The only theme name eligible for the url completion retry.
pub const CUSTOM_THEME_NAME: &str = "custom";

/// Path segment identifying a fixed application mount point.
pub const DEFAULT_MOUNT_SEGMENT: &str = "/relayos-kiwiirc";

/// File name of a theme's stylesheet inside its directory.
pub const THEME_FILE_NAME: &str = "theme.css";

/// Directory of built-in themes, relative to the application root.
pub const THEMES_DIR: &str = "styles/themes";

/// Directory of rendering mode stylesheets, relative to the application root.
pub const RENDER_MODES_DIR: &str = "styles/render-modes";

/// Document key of the rendering mode overlay element.
pub const OVERLAY_ELEMENT_KEY: &str = "rendering-mode-stylesheet";

/// Document key of the active theme element.
pub const THEME_ELEMENT_KEY: &str = "theme-stylesheet";

/// Query parameter used to defeat caches on reload.
pub const CACHE_BUST_PARAM: &str = "cb";
