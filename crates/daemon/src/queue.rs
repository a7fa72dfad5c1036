//! Job queue: stable files waiting for a free slot.

use crate::scan::CandidateFile;
use std::collections::HashSet;

/// Files confirmed stable by the last poll, in discovery order.
///
/// `pop` hands out the most recently discovered file first. A path is
/// queued at most once.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct JobQueue {
    files: Vec<CandidateFile>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a queue from one poll's stable files, dropping repeated paths.
    pub fn from_stable(stable: Vec<CandidateFile>) -> Self {
        let mut seen = HashSet::new();
        let files = stable
            .into_iter()
            .filter(|file| seen.insert(file.path.clone()))
            .collect();
        Self { files }
    }

    pub fn pop(&mut self) -> Option<CandidateFile> {
        self.files.pop()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
