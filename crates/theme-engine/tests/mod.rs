mod common;

use common::*;
use serde_json::json;
use theme_engine::theme::engine::protocol::InvalidReference;
use theme_engine::theme::platform::StyleSource;
use theme_engine::theme::{
    EngineConfig,
    SetThemeOutcome,
    ThemeDescriptor,
    ThemeEvent,
};

const MODE_HREF: &str = "/styles/render-modes/widget.css";

fn config_with_builtins(names: &[&str]) -> EngineConfig {
    EngineConfig {
        builtin_themes: names.iter().map(|n| n.to_string()).collect(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_default_to_relayos() {
    let _ = tracing_subscriber::fmt::try_init();

    let mut test = TestCase::builder()
        .test_name("default to relayos")
        .with_resource(DEFAULT_HREF, ".default{}")
        .with_resource(RELAYOS_HREF, ".relayos{}")
        .build();
    test.settled().await;

    let snapshot = test.snapshot().await;
    assert_eq!(TestCase::active_name(&snapshot), Some("Default"));
    assert_eq!(test.stored_theme().as_deref(), Some("Default"));
    assert!(test.take_events().is_empty(), "the initial theme emits nothing");

    let outcome = test.set_theme("relayos").await;
    assert!(matches!(outcome, SetThemeOutcome::Loading { .. }));
    test.settled().await;

    assert_eq!(test.take_events(), vec![ThemeEvent::Change {
        next: ThemeDescriptor::builtin("RelayOS"),
        previous: ThemeDescriptor::builtin("Default"),
    }]);
    let snapshot = test.snapshot().await;
    assert_eq!(TestCase::active_name(&snapshot), Some("RelayOS"));
    assert_eq!(snapshot.previous.map(|t| t.name), Some("Default".to_string()));
    assert_eq!(snapshot.pending, None);
    assert_eq!(test.stored_theme().as_deref(), Some("RelayOS"));

    let themes = test.theme_elements();
    assert_eq!(themes.len(), 1);
    assert_eq!(themes[0].source, StyleSource::Linked {
        href: RELAYOS_HREF.to_string(),
        css: ".relayos{}".to_string(),
    });
}

#[tokio::test]
async fn test_initial_theme_is_active_even_if_its_load_fails() {
    let mut test = TestCase::builder()
        .test_name("initial theme load failure")
        .with_failure(DEFAULT_HREF, 500)
        .build();
    test.settled().await;

    let snapshot = test.snapshot().await;
    assert_eq!(TestCase::active_name(&snapshot), Some("Default"));
    assert_eq!(snapshot.previous.map(|t| t.name), Some("Default".to_string()));
    assert!(test.take_events().is_empty());
    assert!(test.theme_elements().is_empty());
    assert_eq!(test.platform().loads(), vec![DEFAULT_HREF.to_string()]);
}

#[tokio::test]
async fn test_initial_theme_priority() {
    // An explicit initial theme beats the stored setting.
    let test = TestCase::builder()
        .test_name("explicit initial theme")
        .with_config(EngineConfig {
            initial_theme: Some("relayos".to_string()),
            ..Default::default()
        })
        .with_settings(json!({ "settings": { "theme": "Default" } }))
        .with_resource(DEFAULT_HREF, ".default{}")
        .with_resource(RELAYOS_HREF, ".relayos{}")
        .build();
    test.settled().await;
    assert_eq!(TestCase::active_name(&test.snapshot().await), Some("RelayOS"));

    // An unknown stored theme falls through to the first catalog entry.
    let test = TestCase::builder()
        .test_name("unknown stored theme")
        .with_settings(json!({ "settings": { "theme": "Gone" } }))
        .with_resource(DEFAULT_HREF, ".default{}")
        .build();
    test.settled().await;
    assert_eq!(TestCase::active_name(&test.snapshot().await), Some("Default"));
    assert_eq!(test.stored_theme().as_deref(), Some("Default"));
}

#[tokio::test]
async fn test_setting_the_active_theme_is_a_no_op() {
    let mut test = TestCase::builder()
        .test_name("idempotent set")
        .with_resource(DEFAULT_HREF, ".default{}")
        .build();
    test.settled().await;
    let loads = test.platform().loads();

    assert_eq!(test.set_theme("Default").await, SetThemeOutcome::Unchanged);
    assert_eq!(test.set_theme("DEFAULT").await, SetThemeOutcome::Unchanged);
    test.settled().await;

    assert!(test.take_events().is_empty());
    assert_eq!(test.platform().loads(), loads);
}

#[tokio::test]
async fn test_failed_switch_leaves_state_untouched() {
    let mut test = TestCase::builder()
        .test_name("failed switch")
        .with_settings(json!({
            "settings": {
                "theme": "Default",
                "themes": [{ "name": "Dark", "url": "https://cdn.example/themes/dark" }]
            }
        }))
        .with_resource(DEFAULT_HREF, ".default{}")
        .with_failure("https://cdn.example/themes/dark/theme.css", 404)
        .build();
    test.settled().await;
    let before = test.snapshot().await;

    assert!(matches!(test.set_theme("dark").await, SetThemeOutcome::Loading { .. }));
    test.settled().await;

    assert_eq!(test.take_events(), vec![ThemeEvent::Failed {
        attempted: ThemeDescriptor::legacy("Dark", "https://cdn.example/themes/dark"),
        active: Some(ThemeDescriptor::builtin("Default")),
    }]);
    assert_eq!(test.snapshot().await, before);
    assert_eq!(test.stored_theme().as_deref(), Some("Default"));
    let themes = test.theme_elements();
    assert_eq!(themes.len(), 1);
    assert_eq!(themes[0].source.css(), ".default{}");
}

#[tokio::test]
async fn test_latest_request_wins() {
    const ALPHA_HREF: &str = "/styles/themes/alpha/theme.css";
    const BETA_HREF: &str = "/styles/themes/beta/theme.css";

    let mut test = TestCase::builder()
        .test_name("latest request wins")
        .with_config(config_with_builtins(&["Default", "Alpha", "Beta"]))
        .with_resource(DEFAULT_HREF, ".default{}")
        .with_resource(ALPHA_HREF, ".alpha{}")
        .with_resource(BETA_HREF, ".beta{}")
        .with_held(ALPHA_HREF)
        .build();
    test.settled().await;

    assert!(matches!(test.set_theme("Alpha").await, SetThemeOutcome::Loading { .. }));
    assert!(matches!(test.set_theme("Beta").await, SetThemeOutcome::Loading { .. }));
    test.platform().release(ALPHA_HREF);
    test.settled().await;

    assert_eq!(test.take_events(), vec![ThemeEvent::Change {
        next: ThemeDescriptor::builtin("Beta"),
        previous: ThemeDescriptor::builtin("Default"),
    }]);
    let snapshot = test.snapshot().await;
    assert_eq!(TestCase::active_name(&snapshot), Some("Beta"));
    assert_eq!(snapshot.previous.map(|t| t.name), Some("Default".to_string()));
    assert_eq!(test.stored_theme().as_deref(), Some("Beta"));

    let themes = test.theme_elements();
    assert_eq!(themes.len(), 1);
    assert_eq!(themes[0].source.css(), ".beta{}");
}

#[tokio::test]
async fn test_returning_to_the_active_theme_discards_the_pending_load() {
    let mut test = TestCase::builder()
        .test_name("supersede then no-op")
        .with_resource(DEFAULT_HREF, ".default{}")
        .with_resource(RELAYOS_HREF, ".relayos{}")
        .with_held(RELAYOS_HREF)
        .build();
    test.settled().await;

    assert!(matches!(test.set_theme("RelayOS").await, SetThemeOutcome::Loading { .. }));
    assert_eq!(test.snapshot().await.pending, Some(ThemeDescriptor::builtin("RelayOS")));
    assert_eq!(test.set_theme("Default").await, SetThemeOutcome::Unchanged);
    assert_eq!(test.snapshot().await.pending, None);

    test.platform().release(RELAYOS_HREF);
    test.settled().await;

    assert!(test.take_events().is_empty());
    assert_eq!(TestCase::active_name(&test.snapshot().await), Some("Default"));
    assert_eq!(test.theme_elements()[0].source.css(), ".default{}");
}

#[tokio::test]
async fn test_reselecting_the_initial_theme_while_it_loads() {
    let mut test = TestCase::builder()
        .test_name("reselect initial theme while loading")
        .with_resource(DEFAULT_HREF, ".default{}")
        .with_held(DEFAULT_HREF)
        .build();

    assert_eq!(test.set_theme("Default").await, SetThemeOutcome::Unchanged);
    assert_eq!(test.snapshot().await.pending, Some(ThemeDescriptor::builtin("Default")));

    test.platform().release(DEFAULT_HREF);
    test.settled().await;

    assert!(test.take_events().is_empty());
    assert_eq!(test.stored_theme().as_deref(), Some("Default"));
    let themes = test.theme_elements();
    assert_eq!(themes.len(), 1);
    assert_eq!(themes[0].source.css(), ".default{}");
}

#[tokio::test]
async fn test_failed_switch_while_initial_theme_loads() {
    let mut test = TestCase::builder()
        .test_name("failed switch while initial theme loads")
        .with_resource(DEFAULT_HREF, ".default{}")
        .with_failure(RELAYOS_HREF, 404)
        .with_held(DEFAULT_HREF)
        .build();

    assert!(matches!(test.set_theme("RelayOS").await, SetThemeOutcome::Loading { .. }));
    test.platform().release(DEFAULT_HREF);
    test.settled().await;

    assert_eq!(test.take_events(), vec![ThemeEvent::Failed {
        attempted: ThemeDescriptor::builtin("RelayOS"),
        active: Some(ThemeDescriptor::builtin("Default")),
    }]);
    let snapshot = test.snapshot().await;
    assert_eq!(TestCase::active_name(&snapshot), Some("Default"));
    assert_eq!(snapshot.pending, None);
    assert_eq!(test.stored_theme().as_deref(), Some("Default"));
    let themes = test.theme_elements();
    assert_eq!(themes.len(), 1);
    assert_eq!(themes[0].source.css(), ".default{}");
}

#[tokio::test]
async fn test_reload_while_initial_theme_loads() {
    let mut test = TestCase::builder()
        .test_name("reload while initial theme loads")
        .with_resource(DEFAULT_HREF, ".default{}")
        .with_held(DEFAULT_HREF)
        .build();

    assert!(matches!(test.engine().reload().await, Ok(SetThemeOutcome::Loading { .. })));
    test.platform().release(DEFAULT_HREF);
    test.settled().await;

    assert_eq!(test.take_events(), vec![ThemeEvent::Change {
        next: ThemeDescriptor::builtin("Default"),
        previous: ThemeDescriptor::builtin("Default"),
    }]);
    assert_eq!(test.platform().loads(), vec![DEFAULT_HREF.to_string(), DEFAULT_HREF.to_string()]);
    let themes = test.theme_elements();
    assert_eq!(themes.len(), 1);
    assert_eq!(themes[0].source.css(), ".default{}");
}

#[tokio::test]
async fn test_initial_theme_skips_unloadable_entries() {
    let test = TestCase::builder()
        .test_name("unloadable stored theme")
        .with_settings(json!({
            "settings": {
                "theme": "Broken",
                "themes": [{ "name": "Broken", "url": "" }]
            }
        }))
        .with_resource(DEFAULT_HREF, ".default{}")
        .build();
    test.settled().await;

    assert_eq!(TestCase::active_name(&test.snapshot().await), Some("Default"));
    assert_eq!(test.stored_theme().as_deref(), Some("Default"));
    assert_eq!(test.platform().loads(), vec![DEFAULT_HREF.to_string()]);
}

#[tokio::test]
async fn test_custom_theme_retries_once_with_theme_file() {
    let mut test = TestCase::builder()
        .test_name("custom theme retry failure")
        .with_settings(json!({
            "settings": {
                "theme": "Default",
                "themes": [{ "name": "custom", "url": "https://cdn.example/mytheme?v=3" }]
            }
        }))
        .with_resource(DEFAULT_HREF, ".default{}")
        .build();
    test.settled().await;

    assert!(matches!(test.set_theme("Custom").await, SetThemeOutcome::Loading { .. }));
    test.settled().await;

    assert_eq!(test.platform().loads(), vec![
        DEFAULT_HREF.to_string(),
        "https://cdn.example/mytheme?v=3".to_string(),
        "https://cdn.example/mytheme/theme.css?v=3".to_string(),
    ]);
    assert_eq!(test.take_events(), vec![ThemeEvent::Failed {
        attempted: ThemeDescriptor::custom("https://cdn.example/mytheme/theme.css?v=3"),
        active: Some(ThemeDescriptor::builtin("Default")),
    }]);
    assert_eq!(TestCase::active_name(&test.snapshot().await), Some("Default"));
}

#[tokio::test]
async fn test_custom_theme_retry_success_keeps_catalog_url() {
    let mut test = TestCase::builder()
        .test_name("custom theme retry success")
        .with_settings(json!({
            "settings": {
                "theme": "Default",
                "themes": [{ "name": "custom", "url": "https://cdn.example/mytheme" }]
            }
        }))
        .with_resource(DEFAULT_HREF, ".default{}")
        .with_resource("https://cdn.example/mytheme/theme.css", ".mine{}")
        .build();
    test.settled().await;

    test.set_theme("custom").await;
    test.settled().await;

    assert_eq!(test.take_events(), vec![ThemeEvent::Change {
        next: ThemeDescriptor::custom("https://cdn.example/mytheme/theme.css"),
        previous: ThemeDescriptor::builtin("Default"),
    }]);
    assert_eq!(test.stored_theme().as_deref(), Some("custom"));
    let found = test.engine().find_theme("custom").await.unwrap();
    assert_eq!(found, Some(ThemeDescriptor::custom("https://cdn.example/mytheme")));
}

#[tokio::test]
async fn test_rejected_references() {
    let mut test = TestCase::builder()
        .test_name("rejected references")
        .with_resource(DEFAULT_HREF, ".default{}")
        .build();
    test.settled().await;
    let before = test.snapshot().await;

    assert_eq!(
        test.set_theme("Nope").await,
        SetThemeOutcome::Rejected(InvalidReference::UnknownTheme("Nope".to_string()))
    );
    let no_url = ThemeDescriptor {
        url: None,
        ..ThemeDescriptor::legacy("Broken", "")
    };
    assert_eq!(
        test.set_theme(no_url).await,
        SetThemeOutcome::Rejected(InvalidReference::MissingUrl("Broken".to_string()))
    );

    assert_eq!(test.snapshot().await, before);
    assert!(test.take_events().is_empty());
}

#[tokio::test]
async fn test_reload() {
    let mut test = TestCase::builder()
        .test_name("reload")
        .with_resource(DEFAULT_HREF, ".default{}")
        .build();
    test.settled().await;

    // Built-in themes are reloaded from the same url.
    assert!(matches!(
        test.engine().reload().await.unwrap(),
        SetThemeOutcome::Loading { .. }
    ));
    test.settled().await;
    assert_eq!(test.take_events(), vec![ThemeEvent::Change {
        next: ThemeDescriptor::builtin("Default"),
        previous: ThemeDescriptor::builtin("Default"),
    }]);
    assert_eq!(test.theme_elements().len(), 1);
    assert_eq!(test.platform().loads().last().map(String::as_str), Some(DEFAULT_HREF));
}

#[tokio::test]
async fn test_reload_busts_cache_for_url_themes() {
    let mut test = TestCase::builder()
        .test_name("reload cache bust")
        .with_settings(json!({
            "settings": {
                "theme": "Dark",
                "themes": [{ "name": "Dark", "url": "https://cdn.example/dark" }]
            }
        }))
        .with_resource("https://cdn.example/dark/theme.css", ".dark{}")
        .build();
    test.settled().await;

    test.engine().reload().await.unwrap();
    test.settled().await;

    let last = test.platform().loads().last().cloned().unwrap();
    let re = regex::Regex::new(r"^https://cdn\.example/dark/theme\.css\?cb=[0-9]+$").unwrap();
    assert!(re.is_match(&last), "unexpected reload url: {}", last);

    // The fake only serves the original url, so the reload fails and the theme stays.
    let events = test.take_events();
    assert!(matches!(events.as_slice(), [ThemeEvent::Failed { .. }]));
    assert_eq!(test.theme_elements()[0].source.css(), ".dark{}");
}

#[tokio::test]
async fn test_overlay_precedence() {
    let test = TestCase::builder()
        .test_name("overlay precedence")
        .with_config(EngineConfig {
            rendering_mode: Some("widget".to_string()),
            ..Default::default()
        })
        .with_resource(DEFAULT_HREF, ".x{color:red}")
        .with_resource(MODE_HREF, ".x{color:blue}")
        .build();
    test.settled().await;

    let overlays = test.overlay_elements();
    assert_eq!(overlays.len(), 1);
    assert_eq!(overlays[0].source, StyleSource::Inline {
        css: ".x{color:blue}\n.x{color:red}".to_string()
    });
}

#[tokio::test]
async fn test_overlay_follows_theme_switch() {
    let test = TestCase::builder()
        .test_name("overlay follows switch")
        .with_resource(DEFAULT_HREF, ".default{}")
        .with_resource(RELAYOS_HREF, ".relayos{}")
        .with_resource(MODE_HREF, ".widget{}")
        .build();
    test.settled().await;
    assert!(test.overlay_elements().is_empty());

    assert!(test.engine().set_rendering_mode(Some("widget".to_string())).await.unwrap());
    test.settled().await;
    assert_eq!(test.overlay_elements()[0].source.css(), ".widget{}\n.default{}");

    test.set_theme("RelayOS").await;
    test.settled().await;
    let overlays = test.overlay_elements();
    assert_eq!(overlays.len(), 1);
    assert_eq!(overlays[0].source.css(), ".widget{}\n.relayos{}");
}

#[tokio::test]
async fn test_overlay_falls_back_to_linked_mode() {
    let test = TestCase::builder()
        .test_name("overlay fallback")
        .with_failure(DEFAULT_HREF, 503)
        .with_resource(MODE_HREF, ".widget{}")
        .build();
    test.settled().await;

    test.engine().set_rendering_mode(Some("widget".to_string())).await.unwrap();
    test.settled().await;

    let overlays = test.overlay_elements();
    assert_eq!(overlays.len(), 1);
    assert_eq!(overlays[0].source, StyleSource::Linked {
        href: MODE_HREF.to_string(),
        css: ".widget{}".to_string(),
    });
}

#[tokio::test]
async fn test_overlay_failure_keeps_previous_overlay() {
    let test = TestCase::builder()
        .test_name("overlay failure")
        .with_resource(DEFAULT_HREF, ".default{}")
        .with_resource(MODE_HREF, ".widget{}")
        .build();
    test.settled().await;

    test.engine().set_rendering_mode(Some("widget".to_string())).await.unwrap();
    test.settled().await;
    test.engine().set_rendering_mode(Some("missing".to_string())).await.unwrap();
    test.settled().await;

    let overlays = test.overlay_elements();
    assert_eq!(overlays.len(), 1);
    assert_eq!(overlays[0].source.css(), ".widget{}\n.default{}");
    assert_eq!(
        test.snapshot().await.rendering_mode.as_deref(),
        Some("missing"),
        "the mode is stored even when its overlay cannot be built"
    );
}

#[tokio::test]
async fn test_mounted_app_root() {
    const MOUNTED_HREF: &str = "/relayos-kiwiirc/styles/themes/default/theme.css";

    let test = TestCase::builder()
        .test_name("mounted app root")
        .with_path("/relayos-kiwiirc/client/")
        .with_resource(MOUNTED_HREF, ".default{}")
        .build();
    test.settled().await;

    assert_eq!(test.platform().loads(), vec![MOUNTED_HREF.to_string()]);
    assert_eq!(test.theme_elements().len(), 1);
}
