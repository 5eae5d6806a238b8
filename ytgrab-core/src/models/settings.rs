use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::fs_paths::{AppPaths, DesktopPaths};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    pub schema_version: u32,
    #[serde(default)]
    pub download: DownloadSettings,
    #[serde(default)]
    pub tool: ToolSettings,
    #[serde(default)]
    pub advanced: AdvancedSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadSettings {
    #[serde(default = "default_output_dir")]
    pub default_output_dir: PathBuf,
    #[serde(default = "default_true")]
    pub with_audio: bool,
}

/// Argument layout the extraction tool understands.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ToolArgStyle {
    /// `fetch <url>` / `download <url> <dir> <audio_only> <format> <with_audio>`
    #[default]
    Subcommand,
    /// `<url> --get-qualities` / `<url> <dir> <audio_only> <format> <with_audio>`,
    /// as taken by the `download.py` script.
    Script,
}

/// How the extraction tool is started. `prefix_args` go before the tool
/// arguments, so `program = "python3"`, `prefix_args = ["download.py"]` and
/// `arg_style = "script"` drive the Python script.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSettings {
    #[serde(default = "default_tool_program")]
    pub program: PathBuf,
    #[serde(default)]
    pub prefix_args: Vec<String>,
    #[serde(default)]
    pub arg_style: ToolArgStyle,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvancedSettings {
    #[serde(default = "default_max_concurrent_downloads")]
    pub max_concurrent_downloads: u32,
}

fn default_output_dir() -> PathBuf {
    DesktopPaths.downloads_dir().join("ytgrab")
}

fn default_tool_program() -> PathBuf {
    let bin_name = if cfg!(target_os = "windows") {
        "yt_downloader.exe"
    } else {
        "yt_downloader"
    };
    PathBuf::from(bin_name)
}

fn default_max_concurrent_downloads() -> u32 {
    3
}

fn default_true() -> bool {
    true
}

impl AdvancedSettings {
    /// Concurrency ceiling; never below one.
    pub fn concurrency_ceiling(&self) -> usize {
        self.max_concurrent_downloads.max(1) as usize
    }
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            default_output_dir: default_output_dir(),
            with_audio: true,
        }
    }
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            program: default_tool_program(),
            prefix_args: Vec::new(),
            arg_style: ToolArgStyle::default(),
            env: BTreeMap::new(),
        }
    }
}

impl Default for AdvancedSettings {
    fn default() -> Self {
        Self {
            max_concurrent_downloads: default_max_concurrent_downloads(),
        }
    }
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            schema_version: 1,
            download: DownloadSettings::default(),
            tool: ToolSettings::default(),
            advanced: AdvancedSettings::default(),
        }
    }
}
