use std::path::{Path, PathBuf};

use anyhow::Context;
use ytgrab_core::fs_paths::{AppPaths, DesktopPaths};
use ytgrab_core::models::settings::AppSettings;

const SETTINGS_FILE: &str = "settings.json";

pub fn default_settings_path() -> PathBuf {
    DesktopPaths.config_dir().join(SETTINGS_FILE)
}

/// Missing or unreadable settings fall back to defaults.
pub fn load_settings(path: &Path) -> AppSettings {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("cannot read settings {}: {}", path.display(), e);
            }
            return AppSettings::default();
        }
    };

    match serde_json::from_str::<AppSettings>(&raw) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::warn!("ignoring corrupt settings {}: {}", path.display(), e);
            AppSettings::default()
        }
    }
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(settings)?;
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
