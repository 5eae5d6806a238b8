use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use ytgrab_core::models::job::DownloadRequest;

use crate::commands::{downloads, settings};
use crate::core::events::JsonLines;
use crate::AppState;

/// One line of input from the front-end.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    #[serde(default)]
    request_id: Option<Value>,
    #[serde(flatten)]
    request: Request,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
enum Request {
    FetchQualities { url: String },
    StartDownload(DownloadRequest),
    Cancel { id: String },
    Remove { id: String },
    Sessions,
    ClearFinished,
    GetSettings,
    UpdateSettings { partial: Value },
    ResetSettings,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Ack {
    request_id: Option<Value>,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "kebab-case")]
enum Reply {
    Ack(Ack),
}

impl Ack {
    fn from_result<T: Serialize>(request_id: Option<Value>, result: Result<T, String>) -> Self {
        match result.and_then(|v| serde_json::to_value(v).map_err(|e| e.to_string())) {
            Ok(value) => Self {
                request_id,
                ok: true,
                result: Some(value),
                error: None,
            },
            Err(error) => Self {
                request_id,
                ok: false,
                result: None,
                error: Some(error),
            },
        }
    }
}

async fn handle(state: &AppState, line: &str) -> Ack {
    let envelope: Envelope = match serde_json::from_str(line) {
        Ok(env) => env,
        Err(e) => {
            tracing::warn!("unreadable request: {}", e);
            let request_id = serde_json::from_str::<Value>(line)
                .ok()
                .and_then(|v| v.get("requestId").cloned());
            return Ack::from_result::<()>(request_id, Err(format!("invalid request: {}", e)));
        }
    };
    let id = envelope.request_id;
    tracing::debug!("request {:?}", envelope.request);

    match envelope.request {
        Request::FetchQualities { url } => Ack::from_result(id, downloads::fetch_qualities(state, url).await),
        Request::StartDownload(req) => Ack::from_result(id, downloads::start_download(state, req).await),
        Request::Cancel { id: session } => Ack::from_result(id, downloads::cancel_download(state, &session).await),
        Request::Remove { id: session } => Ack::from_result(id, downloads::remove_download(state, &session).await),
        Request::Sessions => Ack::from_result(id, Ok(downloads::list_sessions(state).await)),
        Request::ClearFinished => Ack::from_result(id, Ok(downloads::clear_finished_downloads(state).await)),
        Request::GetSettings => Ack::from_result(id, Ok(settings::get_settings(state).await)),
        Request::UpdateSettings { partial } => Ack::from_result(id, settings::update_settings(state, partial).await),
        Request::ResetSettings => Ack::from_result(id, settings::reset_settings(state).await),
    }
}

/// Sidecar loop: one JSON request per input line, one ack per request, events
/// interleaved on the same output. Closing the input cancels whatever is still
/// queued or running.
pub async fn serve<R>(state: &AppState, input: R, out: JsonLines) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let ack = handle(state, line).await;
        out.write(&Reply::Ack(ack));
    }

    tracing::info!("input closed, stopping remaining sessions");
    // Newest first, so a freed slot never admits a session about to be cancelled.
    for session in state.orchestrator.sessions().await.into_iter().rev() {
        if !session.status.is_terminal() {
            state.orchestrator.cancel(session.id).await;
        }
    }
    state.orchestrator.wait_idle().await;
    Ok(())
}
