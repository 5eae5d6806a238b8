use std::collections::{HashSet, VecDeque};

use crate::models::session::SessionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Run,
    Queued { position: usize },
}

/// Caps the number of running sessions and admits queued ones strictly in
/// submission order. Slot release and the next admission happen in one call.
#[derive(Debug)]
pub struct AdmissionController {
    ceiling: usize,
    running: HashSet<SessionId>,
    queue: VecDeque<SessionId>,
}

impl AdmissionController {
    pub fn new(ceiling: usize) -> Self {
        Self {
            ceiling: ceiling.max(1),
            running: HashSet::new(),
            queue: VecDeque::new(),
        }
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    pub fn submit(&mut self, id: SessionId) -> Admission {
        if self.running.contains(&id) || self.queue.contains(&id) {
            tracing::warn!("session {} submitted twice", id);
            return match self.queue.iter().position(|q| *q == id) {
                Some(position) => Admission::Queued { position },
                None => Admission::Run,
            };
        }
        if self.running.len() < self.ceiling && self.queue.is_empty() {
            self.running.insert(id);
            Admission::Run
        } else {
            self.queue.push_back(id);
            Admission::Queued {
                position: self.queue.len() - 1,
            }
        }
    }

    /// Frees the slot held by `id` and hands it to the earliest queued session,
    /// which is returned already counted as running. Releasing a session that
    /// holds no slot admits nothing.
    pub fn release(&mut self, id: SessionId) -> Option<SessionId> {
        if !self.running.remove(&id) {
            return None;
        }
        let next = self.queue.pop_front()?;
        self.running.insert(next);
        Some(next)
    }

    pub fn cancel_queued(&mut self, id: SessionId) -> bool {
        match self.queue.iter().position(|q| *q == id) {
            Some(pos) => {
                self.queue.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn running_count(&self) -> usize {
        self.running.len()
    }

    pub fn queued_count(&self) -> usize {
        self.queue.len()
    }

    pub fn queued(&self) -> Vec<SessionId> {
        self.queue.iter().copied().collect()
    }
}
