use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;

use futures::future::BoxFuture;
use tokio::io::AsyncRead;

use crate::core::error::SessionError;
use crate::models::job::{JobKind, JobSpec};
use crate::models::settings::{ToolArgStyle, ToolSettings};

pub type ByteStream = Box<dyn AsyncRead + Send + Unpin>;

/// A started extraction-tool invocation. Dropping `exit` before it resolves
/// kills the process.
pub struct ToolProcess {
    pub pid: Option<u32>,
    pub stdout: ByteStream,
    pub stderr: ByteStream,
    pub exit: BoxFuture<'static, std::io::Result<i32>>,
}

/// Starts the external tool for a job. Spawning must not wait for the process.
pub trait Launcher: Send + Sync + 'static {
    fn launch(&self, job: &JobSpec) -> Result<ToolProcess, SessionError>;
}

/// Tool command line, in fixed positional order:
///
/// ```text
/// Subcommand:  fetch <url>
///              download <url> <target_dir> <audio_only> <format_id | ""> <with_audio>
/// Script:      <url> --get-qualities
///              <url> <target_dir> <audio_only> <format_id | ""> <with_audio>
/// ```
pub fn build_args(job: &JobSpec, style: ToolArgStyle) -> Vec<String> {
    let mut args = match style {
        ToolArgStyle::Subcommand => vec![job.kind.subcommand().to_string(), job.source_url.clone()],
        ToolArgStyle::Script => vec![job.source_url.clone()],
    };
    if job.kind == JobKind::FetchQualities && style == ToolArgStyle::Script {
        args.push("--get-qualities".to_string());
    }
    if job.kind == JobKind::Download {
        args.push(job.target_dir.to_string_lossy().to_string());
        args.push(job.is_audio_only().to_string());
        args.push(job.format_selector.clone().unwrap_or_default());
        args.push(job.with_audio.to_string());
    }
    args
}

#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
    prefix_args: Vec<String>,
    arg_style: ToolArgStyle,
    env: BTreeMap<String, String>,
}

impl ProcessLauncher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            prefix_args: Vec::new(),
            arg_style: ToolArgStyle::Subcommand,
            env: BTreeMap::new(),
        }
    }

    pub fn from_settings(tool: &ToolSettings) -> Self {
        Self {
            program: tool.program.clone(),
            prefix_args: tool.prefix_args.clone(),
            arg_style: tool.arg_style,
            env: tool.env.clone(),
        }
    }

    pub fn with_prefix_args(mut self, args: Vec<String>) -> Self {
        self.prefix_args = args;
        self
    }

    pub fn with_arg_style(mut self, style: ToolArgStyle) -> Self {
        self.arg_style = style;
        self
    }

    fn command(&self, job: &JobSpec) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.program);
        #[cfg(target_os = "windows")]
        cmd.creation_flags(0x08000000);
        cmd.args(&self.prefix_args)
            .args(build_args(job, self.arg_style))
            .env("PYTHONIOENCODING", "utf-8")
            .env("PYTHONUTF8", "1")
            .env("PYTHONUNBUFFERED", "1")
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

impl Launcher for ProcessLauncher {
    fn launch(&self, job: &JobSpec) -> Result<ToolProcess, SessionError> {
        if job.kind == JobKind::Download {
            std::fs::create_dir_all(&job.target_dir).map_err(|e| {
                SessionError::LaunchFailure(format!(
                    "cannot create {}: {}",
                    job.target_dir.display(),
                    e
                ))
            })?;
        }

        tracing::debug!(
            "spawning {} {:?} {:?}",
            self.program.display(),
            self.prefix_args,
            build_args(job, self.arg_style)
        );

        let mut child = self.command(job).spawn().map_err(|e| {
            SessionError::LaunchFailure(format!("{}: {}", self.program.display(), e))
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SessionError::LaunchFailure("stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| SessionError::LaunchFailure("stderr not captured".to_string()))?;
        let pid = child.id();

        let exit: BoxFuture<'static, std::io::Result<i32>> = Box::pin(async move {
            let status = child.wait().await?;
            Ok::<i32, std::io::Error>(status.code().unwrap_or(-1))
        });

        Ok(ToolProcess {
            pid,
            stdout: Box::new(stdout),
            stderr: Box::new(stderr),
            exit,
        })
    }
}
