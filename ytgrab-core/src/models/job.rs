use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    FetchQualities,
    Download,
}

impl JobKind {
    /// Subcommand understood by the extraction tool.
    pub fn subcommand(&self) -> &'static str {
        match self {
            JobKind::FetchQualities => "fetch",
            JobKind::Download => "download",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    AudioOnly,
    #[default]
    AudioPlusVideo,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobSpec {
    pub kind: JobKind,
    pub source_url: String,
    pub target_dir: PathBuf,
    pub output_mode: OutputMode,
    /// Format id from a previously fetched quality list; `None` means best available.
    pub format_selector: Option<String>,
    /// Only meaningful for video downloads with an explicit format selector.
    pub with_audio: bool,
}

impl JobSpec {
    pub fn fetch_qualities(url: impl Into<String>) -> Self {
        Self {
            kind: JobKind::FetchQualities,
            source_url: url.into(),
            target_dir: PathBuf::new(),
            output_mode: OutputMode::AudioPlusVideo,
            format_selector: None,
            with_audio: true,
        }
    }

    pub fn download(url: impl Into<String>, target_dir: impl Into<PathBuf>) -> Self {
        Self {
            kind: JobKind::Download,
            source_url: url.into(),
            target_dir: target_dir.into(),
            output_mode: OutputMode::AudioPlusVideo,
            format_selector: None,
            with_audio: true,
        }
    }

    pub fn with_output_mode(mut self, mode: OutputMode) -> Self {
        self.output_mode = mode;
        self
    }

    pub fn with_format(mut self, format_id: Option<String>) -> Self {
        self.format_selector = format_id.filter(|f| !f.trim().is_empty());
        self
    }

    pub fn with_audio(mut self, with_audio: bool) -> Self {
        self.with_audio = with_audio;
        self
    }

    pub fn is_audio_only(&self) -> bool {
        self.output_mode == OutputMode::AudioOnly
    }
}

/// Download request as sent by the presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRequest {
    pub url: String,
    #[serde(default)]
    pub is_audio: bool,
    #[serde(default)]
    pub quality: Option<String>,
    /// Unset means the configured default.
    #[serde(default)]
    pub with_audio: Option<bool>,
    #[serde(default)]
    pub save_path: Option<PathBuf>,
}

impl DownloadRequest {
    pub fn into_job(self, default_dir: &Path, default_with_audio: bool) -> JobSpec {
        let dir = resolve_target_dir(self.save_path.as_deref().unwrap_or(Path::new("")), default_dir);
        let mode = if self.is_audio {
            OutputMode::AudioOnly
        } else {
            OutputMode::AudioPlusVideo
        };
        JobSpec::download(self.url, dir)
            .with_output_mode(mode)
            .with_format(self.quality)
            .with_audio(self.with_audio.unwrap_or(default_with_audio))
    }
}

/// Relative directories are taken relative to `base`; absolute ones are kept.
pub fn resolve_target_dir(dir: &Path, base: &Path) -> PathBuf {
    if dir.as_os_str().is_empty() {
        return base.to_path_buf();
    }
    if dir.is_absolute() {
        return dir.to_path_buf();
    }
    base.join(dir)
}
