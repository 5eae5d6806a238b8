use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use ytgrab_core::models::job::DownloadRequest;
use ytgrab_core::models::settings::{AppSettings, ToolArgStyle};

use crate::commands::downloads;
use crate::core::events::{FailureCounter, JsonLines};
use crate::storage::config;
use crate::AppState;

#[derive(Debug, Parser)]
#[command(name = "ytgrab")]
#[command(about = "Fetches YouTube qualities and runs downloads through the extraction tool")]
pub struct Cli {
    /// Settings file to use instead of the per-user one
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Extraction tool executable, or a download.py-style script run with python
    #[arg(long, global = true)]
    pub tool: Option<PathBuf>,

    /// Maximum number of tool processes running at once
    #[arg(long, global = true)]
    pub max_concurrent: Option<u32>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List the formats available for a video
    Qualities {
        url: String,
    },
    /// Download one or more videos
    Download {
        #[arg(required = true)]
        urls: Vec<String>,
        /// Audio only
        #[arg(long)]
        audio: bool,
        /// Format id from `qualities`
        #[arg(long)]
        format: Option<String>,
        /// Do not merge an audio track into the chosen video format
        #[arg(long)]
        no_audio: bool,
        /// Target directory, relative paths resolve against the default output directory
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Read JSON requests on stdin and stream events on stdout
    Serve,
}

impl Cli {
    pub fn apply_overrides(&self, settings: &mut AppSettings) {
        if let Some(tool) = &self.tool {
            let is_script = tool.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("py"));
            if is_script {
                let python = if cfg!(windows) { "python" } else { "python3" };
                settings.tool.program = PathBuf::from(python);
                settings.tool.prefix_args = vec![tool.to_string_lossy().into_owned()];
                settings.tool.arg_style = ToolArgStyle::Script;
            } else {
                settings.tool.program = tool.clone();
                settings.tool.prefix_args.clear();
                settings.tool.arg_style = ToolArgStyle::Subcommand;
            }
        }
        if let Some(n) = self.max_concurrent {
            settings.advanced.max_concurrent_downloads = n;
        }
    }
}

pub async fn dispatch(cli: Cli) -> anyhow::Result<ExitCode> {
    let settings_path = cli.config.clone().unwrap_or_else(config::default_settings_path);
    let mut settings = config::load_settings(&settings_path);
    cli.apply_overrides(&mut settings);
    tracing::info!(
        "tool {} (max {} concurrent), settings at {}",
        settings.tool.program.display(),
        settings.advanced.concurrency_ceiling(),
        settings_path.display()
    );

    let out = JsonLines::stdout();
    let state = AppState::new(settings, settings_path, out.clone());
    let failures = FailureCounter::default();
    state
        .orchestrator
        .events()
        .subscribe("exit-status", std::sync::Arc::new(failures.clone()));

    let mut refused = 0usize;
    match cli.command {
        Commands::Serve => {
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            crate::serve::serve(&state, stdin, out).await?;
            return Ok(ExitCode::SUCCESS);
        }
        Commands::Qualities { url } => {
            if let Err(e) = downloads::fetch_qualities(&state, url).await {
                tracing::error!("{}", e);
                refused += 1;
            }
        }
        Commands::Download {
            urls,
            audio,
            format,
            no_audio,
            output,
        } => {
            for url in urls {
                let request = DownloadRequest {
                    url,
                    is_audio: audio,
                    quality: format.clone(),
                    with_audio: no_audio.then_some(false),
                    save_path: output.clone(),
                };
                if let Err(e) = downloads::start_download(&state, request).await {
                    tracing::error!("{}", e);
                    refused += 1;
                }
            }
        }
    }

    state.orchestrator.wait_idle().await;
    if refused + failures.count() > 0 {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}
