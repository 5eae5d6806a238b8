use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;

use crate::core::admission::{Admission, AdmissionController};
use crate::core::error::{SessionError, SubmitError};
use crate::core::events::{
    DownloadComplete, DownloadError, DownloadProgress, EventBus, EventEmitter, QualitiesFetched,
};
use crate::core::launcher::{ByteStream, Launcher, ProcessLauncher, ToolProcess};
use crate::core::parser::{tool_error_message, OutputParser, ParsedEvent};
use crate::core::registry::SessionRegistry;
use crate::core::url_parser::validate_source_url;
use crate::models::job::{DownloadRequest, JobKind, JobSpec};
use crate::models::quality::QualityList;
use crate::models::session::{Session, SessionId, SessionStatus, SessionUpdate};
use crate::models::settings::AppSettings;

const READ_CHUNK: usize = 8 * 1024;
const MAX_STDERR_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub max_concurrent: usize,
    pub default_output_dir: PathBuf,
    /// Used when a download request leaves `withAudio` unset.
    pub default_with_audio: bool,
    /// Minimum spacing between progress events of one session.
    pub progress_interval: Duration,
}

impl OrchestratorConfig {
    pub fn from_settings(settings: &AppSettings) -> Self {
        Self {
            max_concurrent: settings.advanced.concurrency_ceiling(),
            default_output_dir: settings.download.default_output_dir.clone(),
            default_with_audio: settings.download.with_audio,
            progress_interval: Duration::from_millis(150),
        }
    }
}

pub struct ProgressThrottle {
    last_emit: Option<Instant>,
    min_interval: Duration,
}

impl ProgressThrottle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            last_emit: None,
            min_interval,
        }
    }

    pub fn should_emit(&mut self, percent: f64) -> bool {
        let now = Instant::now();
        let due = match self.last_emit {
            Some(last) => now.duration_since(last) >= self.min_interval,
            None => true,
        };
        if due || percent >= 100.0 {
            self.last_emit = Some(now);
            true
        } else {
            false
        }
    }
}

struct State {
    registry: SessionRegistry,
    admission: AdmissionController,
    cancel_tokens: HashMap<SessionId, CancellationToken>,
    /// Format ids seen in quality lists, per source URL.
    known_formats: HashMap<String, HashSet<String>>,
}

/// Work produced while holding the state lock, carried out after releasing it.
enum Dispatch {
    Supervise {
        id: SessionId,
        job: JobSpec,
        process: ToolProcess,
        cancel: CancellationToken,
    },
    LaunchFailed {
        id: SessionId,
        error: SessionError,
    },
}

/// Owns every session from submission to its terminal event. Cloning is cheap
/// and yields a handle onto the same sessions.
#[derive(Clone)]
pub struct Orchestrator {
    state: Arc<Mutex<State>>,
    launcher: Arc<dyn Launcher>,
    events: EventBus,
    idle: Arc<Notify>,
    config: Arc<OrchestratorConfig>,
}

impl Orchestrator {
    pub fn new(launcher: Arc<dyn Launcher>, events: EventBus, config: OrchestratorConfig) -> Self {
        let state = State {
            registry: SessionRegistry::new(),
            admission: AdmissionController::new(config.max_concurrent),
            cancel_tokens: HashMap::new(),
            known_formats: HashMap::new(),
        };
        Self {
            state: Arc::new(Mutex::new(state)),
            launcher,
            events,
            idle: Arc::new(Notify::new()),
            config: Arc::new(config),
        }
    }

    pub fn from_settings(settings: &AppSettings, events: EventBus) -> Self {
        let launcher = ProcessLauncher::from_settings(&settings.tool);
        Self::new(
            Arc::new(launcher),
            events,
            OrchestratorConfig::from_settings(settings),
        )
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub async fn fetch_qualities(&self, url: &str) -> Result<SessionId, SubmitError> {
        let url = validate_source_url(url)?;
        Ok(self.submit(JobSpec::fetch_qualities(url)).await)
    }

    pub async fn start_download(&self, request: DownloadRequest) -> Result<SessionId, SubmitError> {
        let url = validate_source_url(&request.url)?;
        let job = DownloadRequest { url, ..request }.into_job(&self.config.default_output_dir, self.config.default_with_audio);

        if let Some(format_id) = &job.format_selector {
            let st = self.state.lock().await;
            let known = st
                .known_formats
                .get(&job.source_url)
                .is_some_and(|ids| ids.contains(format_id));
            if !known {
                tracing::warn!(
                    "format '{}' was not offered for {}; the tool will decide",
                    format_id,
                    job.source_url
                );
            }
        }

        Ok(self.submit(job).await)
    }

    /// Registers a session and either starts it or queues it behind the
    /// running ones. Returns once the session is Running, Queued, or Failed.
    pub async fn submit(&self, job: JobSpec) -> SessionId {
        let (id, dispatch) = {
            let mut st = self.state.lock().await;
            let id = st.registry.create(job.clone());
            tracing::info!("session {} submitted: {:?} {}", id, job.kind, job.source_url);
            let dispatch = match st.admission.submit(id) {
                Admission::Run => self.start_locked(&mut st, id),
                Admission::Queued { position } => {
                    tracing::info!("session {} queued at position {}", id, position);
                    Vec::new()
                }
            };
            (id, dispatch)
        };
        self.dispatch(dispatch).await;
        id
    }

    /// Launches `first` and, if launches fail, keeps handing the freed slot to
    /// the next queued session.
    fn start_locked(&self, st: &mut State, first: SessionId) -> Vec<Dispatch> {
        let mut out = Vec::new();
        let mut next = Some(first);
        while let Some(id) = next.take() {
            let Some(job) = st.registry.get(id).map(|s| s.job.clone()) else {
                next = st.admission.release(id);
                continue;
            };
            match self.launcher.launch(&job) {
                Ok(process) => {
                    st.registry.mark_running(id);
                    let cancel = CancellationToken::new();
                    st.cancel_tokens.insert(id, cancel.clone());
                    tracing::info!("session {} running (pid {:?})", id, process.pid);
                    out.push(Dispatch::Supervise {
                        id,
                        job,
                        process,
                        cancel,
                    });
                }
                Err(error) => {
                    tracing::error!("session {} could not start: {}", id, error);
                    st.registry.mark_failed(id, error.to_string());
                    next = st.admission.release(id);
                    out.push(Dispatch::LaunchFailed { id, error });
                }
            }
        }
        out
    }

    async fn dispatch(&self, items: Vec<Dispatch>) {
        let mut any_failed = false;
        for item in items {
            match item {
                Dispatch::Supervise {
                    id,
                    job,
                    process,
                    cancel,
                } => {
                    tokio::spawn(self.clone().supervise(id, job, process, cancel));
                }
                Dispatch::LaunchFailed { id, error } => {
                    any_failed = true;
                    self.emit_failure(id, &error);
                }
            }
        }
        if any_failed {
            self.notify_if_idle().await;
        }
    }

    /// Boxed because `finish` spawns supervisors in turn.
    fn supervise(
        self,
        id: SessionId,
        job: JobSpec,
        process: ToolProcess,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let outcome = tokio::select! {
                r = self.drive(id, &job, process) => r,
                _ = cancel.cancelled() => {
                    tracing::info!("session {} cancelled, stopping tool", id);
                    Err(SessionError::Cancelled)
                }
            };
            self.finish(id, &job, outcome).await;
        })
    }

    /// Consumes both output streams, then resolves the outcome from the exit code.
    /// A fetch yields its quality list, published by `finish`.
    async fn drive(
        &self,
        id: SessionId,
        job: &JobSpec,
        process: ToolProcess,
    ) -> Result<Option<QualityList>, SessionError> {
        let ToolProcess {
            stdout,
            stderr,
            exit,
            ..
        } = process;
        let parser = OutputParser::new(job.kind.into());

        let (parser, stderr_text) = tokio::join!(
            self.pump_stdout(id, parser, stdout),
            collect_stderr(id, stderr)
        );

        let code = exit.await.map_err(|e| SessionError::ToolReportedError {
            code: -1,
            diagnostic: format!("lost track of extraction tool: {}", e),
        })?;

        if code != 0 {
            let from_stdout = match &parser {
                OutputParser::Quality(q) => tool_error_message(q.buffered()),
                OutputParser::Progress(_) => None,
            };
            let diagnostic = Some(stderr_text.trim().to_string())
                .filter(|s| !s.is_empty())
                .or(from_stdout)
                .unwrap_or_else(|| format!("extraction tool exited with code {}", code));
            tracing::warn!("session {} tool exited with code {}", id, code);
            return Err(SessionError::ToolReportedError { code, diagnostic });
        }

        let mut throttle = ProgressThrottle::new(Duration::ZERO);
        let mut qualities = None;
        for event in parser.finish() {
            match event {
                ParsedEvent::Progress(update) => self.apply_progress(id, &update, &mut throttle).await,
                ParsedEvent::Qualities(list) => qualities = Some(list),
                ParsedEvent::Malformed(msg) => return Err(SessionError::MalformedOutput(msg)),
            }
        }
        Ok(qualities)
    }

    async fn pump_stdout(&self, id: SessionId, mut parser: OutputParser, mut stdout: ByteStream) -> OutputParser {
        let mut throttle = ProgressThrottle::new(self.config.progress_interval);
        let mut buf = vec![0u8; READ_CHUNK];
        loop {
            let n = match stdout.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    tracing::warn!("session {} stdout read failed: {}", id, e);
                    break;
                }
            };
            for event in parser.feed(&buf[..n]) {
                if let ParsedEvent::Progress(update) = event {
                    self.apply_progress(id, &update, &mut throttle).await;
                }
            }
        }
        parser
    }

    async fn apply_progress(&self, id: SessionId, update: &SessionUpdate, throttle: &mut ProgressThrottle) {
        let event = {
            let mut st = self.state.lock().await;
            if !st.registry.update(id, update) {
                return;
            }
            let Some(s) = st.registry.get(id) else {
                return;
            };
            DownloadProgress {
                id,
                progress: s.progress_percent,
                speed: s.speed.clone(),
                eta: s.eta.clone(),
            }
        };
        if throttle.should_emit(event.progress) {
            self.events.emit_progress(&event);
        }
    }

    /// Terminal transition, slot release, and admission of the next queued
    /// session, all under one lock acquisition. A cancel that got in before
    /// this point wins over whatever the tool produced.
    async fn finish(&self, id: SessionId, job: &JobSpec, outcome: Result<Option<QualityList>, SessionError>) {
        let (outcome, transitioned, dispatch) = {
            let mut st = self.state.lock().await;
            let cancelled = st.cancel_tokens.remove(&id).is_some_and(|t| t.is_cancelled());
            let outcome = if cancelled && outcome.is_ok() {
                tracing::info!("session {} cancelled after the tool finished", id);
                Err(SessionError::Cancelled)
            } else {
                outcome
            };
            let transitioned = match &outcome {
                Ok(_) => st.registry.mark_complete(id),
                Err(e) => st.registry.mark_failed(id, e.to_string()),
            };
            if let (true, Ok(Some(list))) = (transitioned, &outcome) {
                let ids = st.known_formats.entry(job.source_url.clone()).or_default();
                ids.extend(list.formats.iter().map(|f| f.format_id.clone()));
            }
            let dispatch = match st.admission.release(id) {
                Some(next) => {
                    tracing::info!("session {} admitted after {} finished", next, id);
                    self.start_locked(&mut st, next)
                }
                None => Vec::new(),
            };
            (outcome, transitioned, dispatch)
        };

        if transitioned {
            match outcome {
                Ok(Some(list)) => {
                    tracing::info!("session {} fetched {} formats", id, list.formats.len());
                    self.events.emit_qualities(&QualitiesFetched {
                        id,
                        url: job.source_url.clone(),
                        title: list.title,
                        duration: list.duration,
                        formats: list.formats,
                    });
                }
                Ok(None) => {
                    tracing::info!("session {} complete", id);
                    if job.kind == JobKind::Download {
                        self.events.emit_complete(&DownloadComplete { id });
                    }
                }
                Err(e) => {
                    tracing::warn!("session {} failed: {}", id, e);
                    self.emit_failure(id, &e);
                }
            }
        }

        self.dispatch(dispatch).await;
        self.notify_if_idle().await;
    }

    fn emit_failure(&self, id: SessionId, error: &SessionError) {
        self.events.emit_error(&DownloadError {
            id,
            kind: error.kind(),
            error: error.to_string(),
        });
    }

    /// Queued sessions fail immediately; running ones have their process killed.
    /// Returns true only when the session will end as cancelled.
    pub async fn cancel(&self, id: SessionId) -> bool {
        let mut st = self.state.lock().await;
        match st.registry.status(id) {
            Some(SessionStatus::Queued) => {
                st.admission.cancel_queued(id);
                st.registry.mark_failed(id, SessionError::Cancelled.to_string());
                drop(st);
                tracing::info!("queued session {} cancelled", id);
                self.emit_failure(id, &SessionError::Cancelled);
                self.notify_if_idle().await;
                true
            }
            Some(SessionStatus::Running) => match st.cancel_tokens.get(&id) {
                Some(token) => {
                    token.cancel();
                    true
                }
                None => false,
            },
            _ => false,
        }
    }

    pub async fn session(&self, id: SessionId) -> Option<Session> {
        self.state.lock().await.registry.get(id).cloned()
    }

    pub async fn sessions(&self) -> Vec<Session> {
        self.state.lock().await.registry.list()
    }

    /// Applies a progress delta from outside the parser; no-op for finished sessions.
    pub async fn update(&self, id: SessionId, delta: &SessionUpdate) -> bool {
        self.state.lock().await.registry.update(id, delta)
    }

    pub async fn remove(&self, id: SessionId) -> bool {
        self.state.lock().await.registry.remove(id).is_some()
    }

    pub async fn clear_finished(&self) -> usize {
        self.state.lock().await.registry.clear_finished()
    }

    pub async fn running_count(&self) -> usize {
        self.state.lock().await.admission.running_count()
    }

    pub async fn queued(&self) -> Vec<SessionId> {
        self.state.lock().await.admission.queued()
    }

    /// Resolves once no session is queued or running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if !self.state.lock().await.registry.has_unfinished() {
                return;
            }
            notified.await;
        }
    }

    async fn notify_if_idle(&self) {
        if !self.state.lock().await.registry.has_unfinished() {
            self.idle.notify_waiters();
        }
    }
}

/// Reads stderr to the end, logging each line. Keeps the tail if the tool is chatty.
async fn collect_stderr(id: SessionId, stderr: ByteStream) -> String {
    let mut reader = BufReader::new(stderr);
    let mut collected: Vec<u8> = Vec::new();
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&line);
                if !text.trim().is_empty() {
                    tracing::warn!("session {} tool: {}", id, text.trim_end());
                }
                collected.extend_from_slice(&line);
                if collected.len() > MAX_STDERR_BYTES {
                    let excess = collected.len() - MAX_STDERR_BYTES;
                    collected.drain(..excess);
                }
            }
            Err(e) => {
                tracing::warn!("session {} stderr read failed: {}", id, e);
                break;
            }
        }
    }
    String::from_utf8_lossy(&collected).into_owned()
}
