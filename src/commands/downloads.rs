use serde::Serialize;
use ytgrab_core::core::url_parser;
use ytgrab_core::models::job::DownloadRequest;
use ytgrab_core::models::session::{Session, SessionId, SessionStatus};

use crate::AppState;

#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStarted {
    pub session_id: SessionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
}

#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub id: SessionId,
    pub kind: &'static str,
    pub url: String,
    pub status: SessionStatus,
    pub progress: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Session> for SessionInfo {
    fn from(s: Session) -> Self {
        Self {
            id: s.id,
            kind: s.job.kind.subcommand(),
            url: s.job.source_url,
            status: s.status,
            progress: s.progress_percent,
            speed: s.speed,
            eta: s.eta,
            error: s.last_error,
        }
    }
}

pub async fn fetch_qualities(state: &AppState, url: String) -> Result<SessionStarted, String> {
    let session_id = state
        .orchestrator
        .fetch_qualities(&url)
        .await
        .map_err(|e| e.to_string())?;
    Ok(SessionStarted {
        session_id,
        video_id: url_parser::extract_video_id(url.trim()),
    })
}

pub async fn start_download(state: &AppState, request: DownloadRequest) -> Result<SessionStarted, String> {
    let video_id = url_parser::extract_video_id(request.url.trim());
    let session_id = state
        .orchestrator
        .start_download(request)
        .await
        .map_err(|e| e.to_string())?;
    Ok(SessionStarted {
        session_id,
        video_id,
    })
}

pub async fn cancel_download(state: &AppState, id: &str) -> Result<bool, String> {
    let id: SessionId = id.parse().map_err(|_| format!("invalid session id: {}", id))?;
    Ok(state.orchestrator.cancel(id).await)
}

pub async fn remove_download(state: &AppState, id: &str) -> Result<bool, String> {
    let id: SessionId = id.parse().map_err(|_| format!("invalid session id: {}", id))?;
    Ok(state.orchestrator.remove(id).await)
}

pub async fn list_sessions(state: &AppState) -> Vec<SessionInfo> {
    state
        .orchestrator
        .sessions()
        .await
        .into_iter()
        .map(SessionInfo::from)
        .collect()
}

pub async fn clear_finished_downloads(state: &AppState) -> usize {
    state.orchestrator.clear_finished().await
}
