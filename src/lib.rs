use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use ytgrab_core::core::events::EventBus;
use ytgrab_core::core::orchestrator::Orchestrator;
use ytgrab_core::models::settings::AppSettings;

pub mod cli;
pub mod commands;
pub mod core;
pub mod serve;
pub mod storage;

pub struct AppState {
    pub orchestrator: Orchestrator,
    pub settings: Arc<tokio::sync::Mutex<AppSettings>>,
    pub settings_path: PathBuf,
}

impl AppState {
    /// Builds the orchestrator from `settings` and wires its events to `out`.
    pub fn new(settings: AppSettings, settings_path: PathBuf, out: core::events::JsonLines) -> Self {
        let events = EventBus::new();
        events.subscribe("stdout", Arc::new(core::events::JsonLinesEmitter::new(out)));
        let orchestrator = Orchestrator::from_settings(&settings, events);
        Self {
            orchestrator,
            settings: Arc::new(tokio::sync::Mutex::new(settings)),
            settings_path,
        }
    }
}

/// Logs go to stderr; stdout carries JSON lines only.
fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

pub fn run() -> ExitCode {
    init_logging();
    let cli = cli::Cli::parse();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("cannot start async runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(cli::dispatch(cli)) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("Fatal error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
