use std::sync::{Arc, RwLock};

use serde::Serialize;
use tokio::sync::mpsc;

use crate::core::error::ErrorKind;
use crate::models::quality::QualityDescriptor;
use crate::models::session::SessionId;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QualitiesFetched {
    pub id: SessionId,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    pub formats: Vec<QualityDescriptor>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DownloadProgress {
    pub id: SessionId,
    pub progress: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DownloadError {
    pub id: SessionId,
    pub kind: ErrorKind,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DownloadComplete {
    pub id: SessionId,
}

/// Everything that crosses from the orchestrator into the presentation layer.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", content = "payload", rename_all = "kebab-case")]
pub enum SessionEvent {
    QualitiesFetched(QualitiesFetched),
    DownloadProgress(DownloadProgress),
    DownloadError(DownloadError),
    DownloadComplete(DownloadComplete),
}

pub trait EventEmitter: Send + Sync + 'static {
    fn emit_qualities(&self, event: &QualitiesFetched);
    fn emit_progress(&self, event: &DownloadProgress);
    fn emit_error(&self, event: &DownloadError);
    fn emit_complete(&self, event: &DownloadComplete);
}

/// Fan-out to named subscribers. Subscribing twice under one name replaces the
/// earlier subscriber instead of delivering every event twice.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<RwLock<Vec<(String, Arc<dyn EventEmitter>)>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when an existing subscriber with the same name was replaced.
    pub fn subscribe(&self, name: impl Into<String>, emitter: Arc<dyn EventEmitter>) -> bool {
        let name = name.into();
        let mut subs = self.subscribers.write().unwrap_or_else(|e| e.into_inner());
        if let Some(slot) = subs.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = emitter;
            return true;
        }
        subs.push((name, emitter));
        false
    }

    pub fn unsubscribe(&self, name: &str) -> bool {
        let mut subs = self.subscribers.write().unwrap_or_else(|e| e.into_inner());
        let before = subs.len();
        subs.retain(|(n, _)| n != name);
        subs.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn snapshot(&self) -> Vec<Arc<dyn EventEmitter>> {
        self.subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, e)| e.clone())
            .collect()
    }

    pub fn emit(&self, event: &SessionEvent) {
        for sub in self.snapshot() {
            match event {
                SessionEvent::QualitiesFetched(e) => sub.emit_qualities(e),
                SessionEvent::DownloadProgress(e) => sub.emit_progress(e),
                SessionEvent::DownloadError(e) => sub.emit_error(e),
                SessionEvent::DownloadComplete(e) => sub.emit_complete(e),
            }
        }
    }
}

impl EventEmitter for EventBus {
    fn emit_qualities(&self, event: &QualitiesFetched) {
        self.emit(&SessionEvent::QualitiesFetched(event.clone()));
    }

    fn emit_progress(&self, event: &DownloadProgress) {
        self.emit(&SessionEvent::DownloadProgress(event.clone()));
    }

    fn emit_error(&self, event: &DownloadError) {
        self.emit(&SessionEvent::DownloadError(event.clone()));
    }

    fn emit_complete(&self, event: &DownloadComplete) {
        self.emit(&SessionEvent::DownloadComplete(event.clone()));
    }
}

/// Forwards events into an unbounded channel, preserving emission order.
#[derive(Clone)]
pub struct ChannelEmitter {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl ChannelEmitter {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: SessionEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("event receiver dropped");
        }
    }
}

impl EventEmitter for ChannelEmitter {
    fn emit_qualities(&self, event: &QualitiesFetched) {
        self.send(SessionEvent::QualitiesFetched(event.clone()));
    }

    fn emit_progress(&self, event: &DownloadProgress) {
        self.send(SessionEvent::DownloadProgress(event.clone()));
    }

    fn emit_error(&self, event: &DownloadError) {
        self.send(SessionEvent::DownloadError(event.clone()));
    }

    fn emit_complete(&self, event: &DownloadComplete) {
        self.send(SessionEvent::DownloadComplete(event.clone()));
    }
}
