#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use ytgrab_core::core::error::ErrorKind;
use ytgrab_core::core::events::{ChannelEmitter, EventBus, SessionEvent};
use ytgrab_core::core::launcher::ProcessLauncher;
use ytgrab_core::core::orchestrator::{Orchestrator, OrchestratorConfig};
use ytgrab_core::models::job::DownloadRequest;
use ytgrab_core::models::session::SessionStatus;
use ytgrab_core::models::settings::ToolArgStyle;

const FAKE_TOOL: &str = r#"#!/bin/sh
case "$1" in
  fetch)
    case "$2" in
      *broken*) echo '{"formats": [' ;;
      *private*) echo '{"error": "Private video"}'; exit 1 ;;
      *) echo '{"title":"Clip","duration":12.5,"formats":[{"format_id":"18","height":360,"vcodec":"avc1","acodec":"mp4a","ext":"mp4"},{"format_id":"140","vcodec":"none","acodec":"mp4a","ext":"m4a"}]}' ;;
    esac
    ;;
  download)
    case "$2" in
      *missing*) echo "ERROR: Video unavailable" >&2; exit 1 ;;
    esac
    echo '[youtube] Extracting URL'
    echo '{"progress": "25.0%", "speed": "2.00MiB/s", "eta": "00:03"}'
    echo 'downloading 50.0% of 10MiB'
    echo "WARNING: nothing serious" >&2
    echo "$4 $5 $6" > "$3/args.txt"
    echo '{"progress": 100}'
    ;;
esac
"#;

/// Takes its arguments the way download.py does: url first, then either
/// `--get-qualities` or `<dir> <is_audio> <quality> <with_audio>`.
const SCRIPT_TOOL: &str = r#"#!/bin/sh
if [ "$2" = "--get-qualities" ]; then
  echo "{\"title\":\"$1\",\"formats\":[{\"format_id\":\"22\",\"height\":720,\"vcodec\":\"avc1\",\"acodec\":\"mp4a\",\"ext\":null}]}"
  exit 0
fi
echo '{"progress": 100}'
echo "$1|$3|$4|$5" > "$2/args.txt"
"#;

/// Run through `sh` so the script never has to be executed directly.
fn install_tool(dir: &Path) -> ProcessLauncher {
    let path = dir.join("fake-tool.sh");
    std::fs::write(&path, FAKE_TOOL).unwrap();
    ProcessLauncher::new("/bin/sh").with_prefix_args(vec![path.to_string_lossy().into_owned()])
}

fn orchestrator(dir: &Path) -> (Orchestrator, tokio::sync::mpsc::UnboundedReceiver<SessionEvent>) {
    orchestrator_with(dir, install_tool(dir))
}

fn orchestrator_with(
    dir: &Path,
    launcher: ProcessLauncher,
) -> (Orchestrator, tokio::sync::mpsc::UnboundedReceiver<SessionEvent>) {
    let bus = EventBus::new();
    let (emitter, rx) = ChannelEmitter::channel();
    bus.subscribe("test", Arc::new(emitter));
    let config = OrchestratorConfig {
        max_concurrent: 3,
        default_output_dir: dir.join("downloads"),
        default_with_audio: true,
        progress_interval: Duration::ZERO,
    };
    (Orchestrator::new(Arc::new(launcher), bus, config), rx)
}

async fn drain(
    orch: &Orchestrator,
    rx: &mut tokio::sync::mpsc::UnboundedReceiver<SessionEvent>,
) -> Vec<SessionEvent> {
    tokio::time::timeout(Duration::from_secs(20), orch.wait_idle())
        .await
        .expect("sessions did not settle");
    let mut events = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        events.push(ev);
    }
    events
}

#[tokio::test]
async fn fetches_qualities_from_a_real_process() {
    let tmp = tempfile::tempdir().unwrap();
    let (orch, mut rx) = orchestrator(tmp.path());

    let id = orch.fetch_qualities("https://youtu.be/abc").await.unwrap();
    let events = drain(&orch, &mut rx).await;

    assert_eq!(events.len(), 1);
    match &events[0] {
        SessionEvent::QualitiesFetched(q) => {
            assert_eq!(q.id, id);
            assert_eq!(q.title.as_deref(), Some("Clip"));
            assert_eq!(q.formats.len(), 2);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(orch.session(id).await.unwrap().status, SessionStatus::Complete);
}

#[tokio::test]
async fn reports_tool_failures() {
    let tmp = tempfile::tempdir().unwrap();
    let (orch, mut rx) = orchestrator(tmp.path());

    let broken = orch.fetch_qualities("https://youtu.be/broken").await.unwrap();
    let private = orch.fetch_qualities("https://youtu.be/private").await.unwrap();
    let missing = orch
        .start_download(DownloadRequest {
            url: "https://youtu.be/missing".into(),
            is_audio: false,
            quality: None,
            with_audio: Some(true),
            save_path: None,
        })
        .await
        .unwrap();
    let events = drain(&orch, &mut rx).await;

    let error_for = |id| {
        events
            .iter()
            .find_map(|e| match e {
                SessionEvent::DownloadError(err) if err.id == id => Some(err.clone()),
                _ => None,
            })
            .expect("error event")
    };
    assert_eq!(error_for(broken).kind, ErrorKind::MalformedOutput);
    assert_eq!(error_for(private).error, "Private video");
    assert_eq!(error_for(missing).error, "ERROR: Video unavailable");
    assert_eq!(events.len(), 3);
}

#[tokio::test]
async fn downloads_report_progress_then_complete() {
    let tmp = tempfile::tempdir().unwrap();
    let (orch, mut rx) = orchestrator(tmp.path());

    let id = orch
        .start_download(DownloadRequest {
            url: "https://www.youtube.com/watch?v=abc".into(),
            is_audio: true,
            quality: Some("140".into()),
            with_audio: Some(false),
            save_path: Some(PathBuf::from("music")),
        })
        .await
        .unwrap();
    let events = drain(&orch, &mut rx).await;

    let progress: Vec<f64> = events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::DownloadProgress(p) => Some(p.progress),
            _ => None,
        })
        .collect();
    assert_eq!(progress, vec![25.0, 50.0, 100.0]);
    assert!(matches!(events.last(), Some(SessionEvent::DownloadComplete(c)) if c.id == id));

    let target = tmp.path().join("downloads").join("music");
    let args = std::fs::read_to_string(target.join("args.txt")).unwrap();
    assert_eq!(args.trim(), "true 140 false");

    let session = orch.session(id).await.unwrap();
    assert_eq!(session.speed.as_deref(), Some("2.00MiB/s"));
}

#[tokio::test]
async fn script_tool_gets_positional_arguments() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("download.sh");
    std::fs::write(&path, SCRIPT_TOOL).unwrap();
    let launcher = ProcessLauncher::new("/bin/sh")
        .with_prefix_args(vec![path.to_string_lossy().into_owned()])
        .with_arg_style(ToolArgStyle::Script);
    let (orch, mut rx) = orchestrator_with(tmp.path(), launcher);

    let url = "https://youtu.be/abc";
    let fetch = orch.fetch_qualities(url).await.unwrap();
    let download = orch
        .start_download(DownloadRequest {
            url: url.into(),
            is_audio: false,
            quality: Some("22".into()),
            with_audio: None,
            save_path: Some(PathBuf::from("video")),
        })
        .await
        .unwrap();
    let events = drain(&orch, &mut rx).await;

    let fetched = events
        .iter()
        .find_map(|e| match e {
            SessionEvent::QualitiesFetched(q) if q.id == fetch => Some(q.clone()),
            _ => None,
        })
        .expect("qualities event");
    assert_eq!(fetched.title.as_deref(), Some(url));
    assert_eq!(fetched.formats.len(), 1);
    assert!(fetched.formats[0].extension.is_none());
    assert!(events
        .iter()
        .any(|e| matches!(e, SessionEvent::DownloadComplete(c) if c.id == download)));

    let target = tmp.path().join("downloads").join("video");
    let args = std::fs::read_to_string(target.join("args.txt")).unwrap();
    assert_eq!(args.trim(), format!("{}|false|22|true", url));
}
