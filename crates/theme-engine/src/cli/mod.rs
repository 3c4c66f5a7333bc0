mod run;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{
    ArgAction,
    Parser,
    Subcommand,
};
use eyre::{
    Context,
    Result,
};
use run::{
    ListArgs,
    ReloadArgs,
    SetArgs,
};
use theme_engine::theme::{
    EngineConfig,
    SettingsStore,
};
use theme_engine::util::consts::LOG_FILE_NAME;
use theme_engine::util::consts::env_var::{
    THEME_ENGINE_CONFIG,
    THEME_ENGINE_LOG_DIR,
};
use tracing::debug;
use tracing_appender::non_blocking::{
    NonBlocking,
    WorkerGuard,
};
use tracing_appender::rolling::{
    RollingFileAppender,
    Rotation,
};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{
    EnvFilter,
    Registry,
};
use url::Url;

#[derive(Debug, Clone, Parser)]
#[command(version, about = "Switch and inspect stylesheet themes served from a web origin")]
pub struct CliArgs {
    #[command(subcommand)]
    pub subcommand: RootSubcommand,
    /// Engine config file. Falls back to $THEME_ENGINE_CONFIG.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// JSON settings file holding the stored theme and registered themes
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,
    /// Origin the theme resources are served from. Its path is the current document path.
    #[arg(long, global = true, default_value = "http://localhost:8080/")]
    pub base_url: Url,
    /// Increase logging verbosity
    #[arg(long, short = 'v', action = ArgAction::Count, global = true)]
    pub verbose: u8,
}

impl CliArgs {
    pub async fn execute(self) -> Result<ExitCode> {
        let _guard = self.setup_logging().context("failed to initialize logging")?;

        let config = match self
            .config
            .clone()
            .or_else(|| std::env::var_os(THEME_ENGINE_CONFIG).map(PathBuf::from))
        {
            Some(path) => EngineConfig::load(&path)
                .await
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => EngineConfig::default(),
        };

        let settings = match &self.settings {
            Some(path) if path.exists() => SettingsStore::from_file(path)
                .await
                .with_context(|| format!("failed to load settings from {}", path.display()))?,
            _ => SettingsStore::empty(),
        };

        let ctx = RunContext {
            config,
            settings,
            settings_path: self.settings,
            base_url: self.base_url,
        };
        debug!(?ctx, "starting");

        self.subcommand.execute(ctx).await
    }

    fn setup_logging(&self) -> Result<WorkerGuard> {
        let level = match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

        let log_dir = std::env::var(THEME_ENGINE_LOG_DIR).unwrap_or_else(|_| ".".to_string());
        let (non_blocking, file_guard) =
            NonBlocking::new(RollingFileAppender::new(Rotation::NEVER, log_dir, LOG_FILE_NAME));
        let file_layer = tracing_subscriber::fmt::layer().with_writer(non_blocking).with_ansi(false);
        let stderr_layer = (self.verbose > 0).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

        Registry::default()
            .with(env_filter)
            .with(file_layer)
            .with(stderr_layer)
            .init();

        Ok(file_guard)
    }
}

/// Everything the subcommands share.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub config: EngineConfig,
    pub settings: SettingsStore,
    pub settings_path: Option<PathBuf>,
    pub base_url: Url,
}

#[derive(Debug, Clone, Subcommand)]
pub enum RootSubcommand {
    /// List the available themes
    List(ListArgs),
    /// Switch to a theme
    Set(SetArgs),
    /// Load the stored theme again, bypassing caches
    Reload(ReloadArgs),
}

impl RootSubcommand {
    pub async fn execute(self, ctx: RunContext) -> Result<ExitCode> {
        match self {
            RootSubcommand::List(args) => args.execute(ctx).await,
            RootSubcommand::Set(args) => args.execute(ctx).await,
            RootSubcommand::Reload(args) => args.execute(ctx).await,
        }
    }
}
