use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use eyre::{
    Context,
    Result,
    bail,
};
use serde::Serialize;
use theme_engine::theme::catalog::SourceKind;
use theme_engine::theme::consts::CUSTOM_THEME_NAME;
use theme_engine::theme::{
    HttpPlatform,
    Platform,
    SetThemeOutcome,
    SettingsBridge,
    ThemeDescriptor,
    ThemeEngine,
    ThemeEngineHandle,
    ThemeEvent,
};
use tokio::sync::broadcast;
use tracing::{
    debug,
    info,
    warn,
};

use super::RunContext;

#[derive(Debug, Clone, Args)]
pub struct ListArgs {
    /// The output format
    #[arg(long)]
    format: Option<OutputFormat>,
}

impl ListArgs {
    pub async fn execute(self, ctx: RunContext) -> Result<ExitCode> {
        let catalog = ctx.config.catalog();
        let themes = catalog.available_themes(&ctx.settings);
        let stored = ctx.settings.theme_name();

        match self.format.unwrap_or_default() {
            OutputFormat::Plain => {
                for theme in &themes {
                    let marker = match stored.as_deref().is_some_and(|s| theme.is_named(s)) {
                        true => "*",
                        false => " ",
                    };
                    match &theme.url {
                        Some(url) => println!("{marker} {} ({}, {url})", theme.name, theme.source_kind),
                        None => println!("{marker} {} ({})", theme.name, theme.source_kind),
                    }
                }
            },
            OutputFormat::Json => println!("{}", serde_json::to_string(&themes)?),
        }

        Ok(ExitCode::SUCCESS)
    }
}

/// Options shared by the subcommands that run the engine.
#[derive(Debug, Clone, Args)]
pub struct EngineRunArgs {
    /// Write the resulting document stylesheet text to this file
    #[arg(long, short)]
    output: Option<PathBuf>,
    /// Seconds to wait for outstanding loads
    #[arg(long, default_value_t = 30)]
    timeout: u64,
    /// Write the settings back to the --settings file afterwards
    #[arg(long)]
    save: bool,
    /// The output format
    #[arg(long)]
    format: Option<OutputFormat>,
}

#[derive(Debug, Clone, Args)]
pub struct SetArgs {
    /// Name of the theme to switch to
    name: String,
    /// Register the theme with this url before switching. With the name `custom` the url is
    /// loaded as is, otherwise it is a theme directory.
    #[arg(long)]
    url: Option<String>,
    /// Rendering mode to apply
    #[arg(long)]
    mode: Option<String>,
    #[command(flatten)]
    run: EngineRunArgs,
}

impl SetArgs {
    pub async fn execute(self, ctx: RunContext) -> Result<ExitCode> {
        if let Some(url) = &self.url {
            let descriptor = match self.name.eq_ignore_ascii_case(CUSTOM_THEME_NAME) {
                true => ThemeDescriptor::custom(url.clone()),
                false => ThemeDescriptor::legacy(self.name.clone(), url.clone()),
            };
            ctx.config.catalog().register(&ctx.settings, &descriptor);
        }

        let session = EngineSession::start(&ctx, &self.run).await?;
        if let Some(mode) = &self.mode {
            session.engine.set_rendering_mode(Some(mode.clone())).await?;
        }

        match session.engine.set_theme(self.name.as_str()).await? {
            SetThemeOutcome::Rejected(reason) => bail!("cannot switch theme: {}", reason),
            SetThemeOutcome::Unchanged => info!(name = self.name, "theme is already active"),
            SetThemeOutcome::Loading { id } => debug!(%id, "theme load started"),
        }

        session.finish(&ctx, &self.run).await
    }
}

#[derive(Debug, Clone, Args)]
pub struct ReloadArgs {
    #[command(flatten)]
    run: EngineRunArgs,
}

impl ReloadArgs {
    pub async fn execute(self, ctx: RunContext) -> Result<ExitCode> {
        let session = EngineSession::start(&ctx, &self.run).await?;

        match session.engine.reload().await? {
            SetThemeOutcome::Rejected(reason) => bail!("cannot reload theme: {}", reason),
            SetThemeOutcome::Unchanged => warn!("no active theme to reload"),
            SetThemeOutcome::Loading { id } => debug!(%id, "theme reload started"),
        }

        session.finish(&ctx, &self.run).await
    }
}

/// A running engine against the HTTP origin, with the initial theme applied.
struct EngineSession {
    engine: ThemeEngineHandle,
    platform: Arc<HttpPlatform>,
    events: broadcast::Receiver<ThemeEvent>,
}

impl EngineSession {
    async fn start(ctx: &RunContext, args: &EngineRunArgs) -> Result<Self> {
        let platform = Arc::new(HttpPlatform::new(ctx.base_url.clone())?);
        let events = ctx.settings.subscribe();
        let engine = ThemeEngine::new(&ctx.config, Arc::new(ctx.settings.clone()), platform.clone()).spawn();

        let mut session = Self {
            engine,
            platform,
            events,
        };
        session.wait_settled(args.timeout).await?;
        // Nothing is emitted for the initial theme, so anything queued here is noise.
        while session.events.try_recv().is_ok() {}
        Ok(session)
    }

    async fn wait_settled(&self, timeout: u64) -> Result<()> {
        match tokio::time::timeout(Duration::from_secs(timeout), self.engine.settled()).await {
            Ok(res) => Ok(res?),
            Err(_) => bail!("timed out after {}s waiting for theme resources", timeout),
        }
    }

    async fn finish(mut self, ctx: &RunContext, args: &EngineRunArgs) -> Result<ExitCode> {
        self.wait_settled(args.timeout).await?;

        let format = args.format.unwrap_or_default();
        let mut exit_code = ExitCode::SUCCESS;
        while let Ok(event) = self.events.try_recv() {
            if matches!(event, ThemeEvent::Failed { .. }) {
                exit_code = ExitCode::FAILURE;
            }
            print_event(&event, format)?;
        }

        if format == OutputFormat::Json {
            let snapshot = self.engine.snapshot().await?;
            println!("{}", serde_json::to_string(&snapshot)?);
        }

        if let Some(path) = &args.output {
            let css = self.platform.document().stylesheet_text();
            tokio::fs::write(path, css)
                .await
                .with_context(|| format!("failed to write {}", path.display()))?;
        }

        if args.save {
            match &ctx.settings_path {
                Some(path) => ctx.settings.save(path).await?,
                None => warn!("--save given without --settings, nothing written"),
            }
        }

        Ok(exit_code)
    }
}

fn print_event(event: &ThemeEvent, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Plain => match event {
            ThemeEvent::Change { next, previous } => {
                println!("{}: {} -> {}", event.name(), previous.name, describe(next));
            },
            ThemeEvent::Failed { attempted, active } => {
                let active = active.as_ref().map_or("none", |t| t.name.as_str());
                println!("{}: {} (still active: {active})", event.name(), describe(attempted));
            },
        },
        OutputFormat::Json => {
            let output = JsonEvent {
                event: event.name(),
                detail: event,
            };
            println!("{}", serde_json::to_string(&output)?);
        },
    }
    Ok(())
}

fn describe(theme: &ThemeDescriptor) -> String {
    match (&theme.source_kind, &theme.url) {
        (SourceKind::Builtin, _) | (_, None) => theme.name.clone(),
        (_, Some(url)) => format!("{} <{url}>", theme.name),
    }
}

#[derive(Debug, Clone, Serialize)]
struct JsonEvent<'a> {
    event: &'static str,
    detail: &'a ThemeEvent,
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, strum::EnumString, strum::Display)]
#[strum(serialize_all = "kebab-case")]
enum OutputFormat {
    #[default]
    Plain,
    Json,
}
