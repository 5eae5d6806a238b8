use serde::{Deserialize, Serialize};

/// Codec tag the extraction tool uses for a stream that is not present.
pub const CODEC_ABSENT: &str = "none";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QualityDescriptor {
    pub format_id: String,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub fps: Option<f64>,
    #[serde(rename = "filesize", default)]
    pub file_size_bytes: Option<u64>,
    #[serde(rename = "vcodec", default)]
    pub video_codec: Option<String>,
    #[serde(rename = "acodec", default)]
    pub audio_codec: Option<String>,
    #[serde(rename = "ext", default)]
    pub extension: Option<String>,
    #[serde(default)]
    pub format_note: Option<String>,
}

impl QualityDescriptor {
    pub fn has_video(&self) -> bool {
        self.video_codec.as_deref() != Some(CODEC_ABSENT)
    }

    pub fn has_audio(&self) -> bool {
        self.audio_codec.as_deref() != Some(CODEC_ABSENT)
    }

    /// Formats a front-end can offer as a single playable mp4 stream.
    pub fn is_playable_combined(&self) -> bool {
        self.height.is_some_and(|h| h > 0)
            && self.has_video()
            && self.has_audio()
            && self.extension.as_deref() == Some("mp4")
    }

    /// Human-readable option label, e.g. `1080p 60fps (12.5 MB)`.
    pub fn label(&self) -> String {
        let mut label = match self.height.filter(|h| *h > 0) {
            Some(h) => {
                let mut s = format!("{}p", h);
                if let Some(fps) = self.fps.filter(|f| *f > 30.0) {
                    s.push_str(&format!(" {}fps", trim_float(fps)));
                }
                s
            }
            None => self
                .format_note
                .clone()
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| "Unknown".to_string()),
        };
        if let Some(size) = self.file_size_bytes.filter(|s| *s > 0) {
            label.push_str(&format!(" ({})", format_file_size(size)));
        }
        label
    }
}

/// Complete response of a quality fetch: `{"formats": [...]}` plus optional metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QualityList {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    pub formats: Vec<QualityDescriptor>,
}

/// Filtering view over a raw quality list; the list itself is left untouched.
pub fn playable_combined(formats: &[QualityDescriptor]) -> Vec<&QualityDescriptor> {
    let mut view: Vec<&QualityDescriptor> =
        formats.iter().filter(|f| f.is_playable_combined()).collect();
    view.sort_by(|a, b| b.height.cmp(&a.height));
    view
}

pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = (value * 100.0).round() / 100.0;
    format!("{} {}", trim_float(rounded), UNITS[unit])
}

fn trim_float(v: f64) -> String {
    if v.fract() == 0.0 {
        format!("{}", v as i64)
    } else {
        format!("{}", v)
    }
}
