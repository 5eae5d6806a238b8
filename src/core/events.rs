use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use ytgrab_core::core::events::{
    DownloadComplete, DownloadError, DownloadProgress, EventEmitter, QualitiesFetched, SessionEvent,
};

/// Newline-delimited JSON writer shared by the event emitter and request acks,
/// so that lines from different sources never interleave.
#[derive(Clone)]
pub struct JsonLines {
    out: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl JsonLines {
    pub fn new(out: impl Write + Send + 'static) -> Self {
        Self {
            out: Arc::new(Mutex::new(Box::new(out))),
        }
    }

    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }

    pub fn write<T: Serialize>(&self, value: &T) {
        let line = match serde_json::to_string(value) {
            Ok(line) => line,
            Err(e) => {
                tracing::error!("cannot serialize output line: {}", e);
                return;
            }
        };
        let mut out = self.out.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = writeln!(out, "{}", line).and_then(|_| out.flush()) {
            tracing::warn!("output closed: {}", e);
        }
    }
}

#[derive(Clone)]
pub struct JsonLinesEmitter {
    sink: JsonLines,
}

impl JsonLinesEmitter {
    pub fn new(sink: JsonLines) -> Self {
        Self { sink }
    }
}

impl EventEmitter for JsonLinesEmitter {
    fn emit_qualities(&self, event: &QualitiesFetched) {
        self.sink.write(&SessionEvent::QualitiesFetched(event.clone()));
    }

    fn emit_progress(&self, event: &DownloadProgress) {
        self.sink.write(&SessionEvent::DownloadProgress(event.clone()));
    }

    fn emit_error(&self, event: &DownloadError) {
        self.sink.write(&SessionEvent::DownloadError(event.clone()));
    }

    fn emit_complete(&self, event: &DownloadComplete) {
        self.sink.write(&SessionEvent::DownloadComplete(event.clone()));
    }
}

/// Counts failed sessions for the one-shot CLI exit status.
#[derive(Clone, Default)]
pub struct FailureCounter {
    failed: Arc<AtomicUsize>,
}

impl FailureCounter {
    pub fn count(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }
}

impl EventEmitter for FailureCounter {
    fn emit_qualities(&self, _event: &QualitiesFetched) {}

    fn emit_progress(&self, _event: &DownloadProgress) {}

    fn emit_error(&self, _event: &DownloadError) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    fn emit_complete(&self, _event: &DownloadComplete) {}
}
