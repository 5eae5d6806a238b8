use std::collections::HashMap;

use chrono::Utc;

use crate::models::job::JobSpec;
use crate::models::session::{Session, SessionId, SessionStatus, SessionUpdate};

/// Authoritative table of sessions. Not synchronised itself; the orchestrator
/// keeps it behind the same lock as the admission controller.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<SessionId, Session>,
    next_seq: u64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, job: JobSpec) -> SessionId {
        let id = SessionId::new();
        let seq = self.next_seq;
        self.next_seq += 1;
        self.sessions.insert(id, Session::new(id, seq, job));
        id
    }

    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn status(&self, id: SessionId) -> Option<SessionStatus> {
        self.sessions.get(&id).map(|s| s.status)
    }

    /// Applies a progress tick to a running session. Unknown, queued, and
    /// finished sessions are left untouched; late ticks are expected.
    pub fn update(&mut self, id: SessionId, delta: &SessionUpdate) -> bool {
        let Some(session) = self.sessions.get_mut(&id) else {
            return false;
        };
        if session.status != SessionStatus::Running || delta.is_empty() {
            return false;
        }
        if let Some(p) = delta.progress.filter(|p| p.is_finite() && *p >= 0.0) {
            session.progress_percent = p.min(100.0);
        }
        if let Some(speed) = &delta.speed {
            session.speed = Some(speed.clone());
        }
        if let Some(eta) = &delta.eta {
            session.eta = Some(eta.clone());
        }
        session.updated_at = Utc::now();
        true
    }

    pub fn mark_running(&mut self, id: SessionId) -> bool {
        self.transition(id, SessionStatus::Running, None)
    }

    pub fn mark_complete(&mut self, id: SessionId) -> bool {
        self.transition(id, SessionStatus::Complete, None)
    }

    pub fn mark_failed(&mut self, id: SessionId, error: impl Into<String>) -> bool {
        self.transition(id, SessionStatus::Failed, Some(error.into()))
    }

    fn transition(&mut self, id: SessionId, to: SessionStatus, error: Option<String>) -> bool {
        let Some(session) = self.sessions.get_mut(&id) else {
            return false;
        };
        let allowed = matches!(
            (session.status, to),
            (SessionStatus::Queued, SessionStatus::Running)
                | (SessionStatus::Queued, SessionStatus::Failed)
                | (SessionStatus::Running, SessionStatus::Complete)
                | (SessionStatus::Running, SessionStatus::Failed)
        );
        if !allowed {
            tracing::debug!("ignoring transition {:?} -> {:?} for {}", session.status, to, id);
            return false;
        }
        session.status = to;
        match to {
            SessionStatus::Complete => {
                session.progress_percent = 100.0;
                session.eta = None;
            }
            SessionStatus::Failed => {
                session.last_error = error;
                session.eta = None;
            }
            _ => {}
        }
        session.updated_at = Utc::now();
        true
    }

    /// Only finished sessions can be removed.
    pub fn remove(&mut self, id: SessionId) -> Option<Session> {
        if self.sessions.get(&id)?.status.is_terminal() {
            self.sessions.remove(&id)
        } else {
            None
        }
    }

    pub fn clear_finished(&mut self) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, s| !s.status.is_terminal());
        before - self.sessions.len()
    }

    pub fn has_unfinished(&self) -> bool {
        self.sessions.values().any(|s| !s.status.is_terminal())
    }

    /// Snapshot in submission order.
    pub fn list(&self) -> Vec<Session> {
        let mut all: Vec<Session> = self.sessions.values().cloned().collect();
        all.sort_by_key(|s| s.seq);
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> JobSpec {
        JobSpec::download("https://www.youtube.com/watch?v=dQw4w9WgXcQ", "/tmp/dl")
    }

    fn tick(progress: Option<f64>, speed: Option<&str>, eta: Option<&str>) -> SessionUpdate {
        SessionUpdate {
            progress,
            speed: speed.map(String::from),
            eta: eta.map(String::from),
        }
    }

    #[test]
    fn create_assigns_submission_order() {
        let mut reg = SessionRegistry::new();
        let a = reg.create(job());
        let b = reg.create(job());
        assert_ne!(a, b);
        let list = reg.list();
        assert_eq!(list[0].id, a);
        assert_eq!(list[1].id, b);
        assert_eq!(reg.status(a), Some(SessionStatus::Queued));
    }

    #[test]
    fn speed_and_eta_keep_last_known_value() {
        let mut reg = SessionRegistry::new();
        let id = reg.create(job());
        reg.mark_running(id);

        assert!(reg.update(id, &tick(Some(10.0), Some("1MB/s"), Some("00:30"))));
        assert!(reg.update(id, &tick(Some(20.0), None, None)));

        let s = reg.get(id).unwrap();
        assert_eq!(s.progress_percent, 20.0);
        assert_eq!(s.speed.as_deref(), Some("1MB/s"));
        assert_eq!(s.eta.as_deref(), Some("00:30"));
    }

    #[test]
    fn negative_progress_is_ignored() {
        let mut reg = SessionRegistry::new();
        let id = reg.create(job());
        reg.mark_running(id);
        reg.update(id, &tick(Some(40.0), None, None));
        reg.update(id, &tick(Some(-1.0), Some("2MB/s"), None));
        let s = reg.get(id).unwrap();
        assert_eq!(s.progress_percent, 40.0);
        assert_eq!(s.speed.as_deref(), Some("2MB/s"));
    }

    #[test]
    fn late_updates_are_silent_no_ops() {
        let mut reg = SessionRegistry::new();
        let done = reg.create(job());
        reg.mark_running(done);
        reg.mark_complete(done);
        let failed = reg.create(job());
        reg.mark_running(failed);
        reg.mark_failed(failed, "boom");

        let before_done = reg.get(done).unwrap().clone();
        let before_failed = reg.get(failed).unwrap().clone();

        assert!(!reg.update(done, &tick(Some(5.0), Some("x"), Some("y"))));
        assert!(!reg.update(failed, &tick(Some(5.0), None, None)));
        assert!(!reg.update(SessionId::new(), &tick(Some(5.0), None, None)));

        let after_done = reg.get(done).unwrap();
        assert_eq!(after_done.progress_percent, before_done.progress_percent);
        assert_eq!(after_done.speed, before_done.speed);
        assert_eq!(after_done.updated_at, before_done.updated_at);
        let after_failed = reg.get(failed).unwrap();
        assert_eq!(after_failed.progress_percent, before_failed.progress_percent);
        assert_eq!(after_failed.last_error.as_deref(), Some("boom"));
    }

    #[test]
    fn terminal_states_are_final() {
        let mut reg = SessionRegistry::new();
        let id = reg.create(job());
        assert!(!reg.mark_complete(id));
        assert!(reg.mark_running(id));
        assert!(!reg.mark_running(id));
        assert!(reg.mark_complete(id));
        assert!(!reg.mark_failed(id, "late"));
        assert!(!reg.mark_running(id));

        let s = reg.get(id).unwrap();
        assert_eq!(s.status, SessionStatus::Complete);
        assert_eq!(s.progress_percent, 100.0);
        assert!(s.last_error.is_none());
    }

    #[test]
    fn queued_session_can_fail_without_running() {
        let mut reg = SessionRegistry::new();
        let id = reg.create(job());
        assert!(reg.mark_failed(id, "spawn failed"));
        assert_eq!(reg.status(id), Some(SessionStatus::Failed));
    }

    #[test]
    fn remove_only_finished_sessions() {
        let mut reg = SessionRegistry::new();
        let running = reg.create(job());
        reg.mark_running(running);
        let failed = reg.create(job());
        reg.mark_failed(failed, "x");

        assert!(reg.remove(running).is_none());
        assert!(reg.remove(failed).is_some());
        assert!(reg.remove(failed).is_none());
        assert!(reg.has_unfinished());

        reg.mark_complete(running);
        assert_eq!(reg.clear_finished(), 1);
        assert!(reg.list().is_empty());
    }
}
