use ytgrab_core::models::settings::AppSettings;

use crate::storage::config;
use crate::AppState;

pub async fn get_settings(state: &AppState) -> AppSettings {
    state.settings.lock().await.clone()
}

/// Merges `partial` into the stored settings. The concurrency ceiling of the
/// running orchestrator is not changed; it applies from the next start.
pub async fn update_settings(state: &AppState, partial: serde_json::Value) -> Result<AppSettings, String> {
    let mut current = state.settings.lock().await;
    let mut current_val = serde_json::to_value(&*current).map_err(|e| format!("Serialize: {}", e))?;
    merge_json(&mut current_val, &partial);
    let updated: AppSettings =
        serde_json::from_value(current_val).map_err(|e| format!("Deserialize: {}", e))?;
    config::save_settings(&state.settings_path, &updated).map_err(|e| format!("Save: {}", e))?;
    *current = updated.clone();
    Ok(updated)
}

pub async fn reset_settings(state: &AppState) -> Result<AppSettings, String> {
    let defaults = AppSettings::default();
    config::save_settings(&state.settings_path, &defaults).map_err(|e| format!("Save: {}", e))?;
    *state.settings.lock().await = defaults.clone();
    Ok(defaults)
}

fn merge_json(base: &mut serde_json::Value, patch: &serde_json::Value) {
    if let (Some(base_obj), Some(patch_obj)) = (base.as_object_mut(), patch.as_object()) {
        for (key, value) in patch_obj {
            match base_obj.get_mut(key) {
                Some(existing) if existing.is_object() && value.is_object() => merge_json(existing, value),
                _ => {
                    base_obj.insert(key.clone(), value.clone());
                }
            }
        }
    }
}
