// Bounded, append-only archive of concluded polls.

use std::collections::VecDeque;

use livepoll_common::types::HistoryRecord;

/// Keeps the final aggregate of the most recent concluded polls.
///
/// Append-only from the caller's perspective; once the configured cap is
/// reached the oldest record is evicted first. Listing returns insertion
/// order (newest last), which keeps pagination and tests deterministic.
#[derive(Debug)]
pub struct HistoryArchive {
    cap: usize,
    records: VecDeque<HistoryRecord>,
}

impl HistoryArchive {
    pub fn new(cap: usize) -> Self {
        Self { cap: cap.max(1), records: VecDeque::new() }
    }

    pub fn record(&mut self, record: HistoryRecord) {
        self.records.push_back(record);
        while self.records.len() > self.cap {
            self.records.pop_front();
        }
    }

    /// The most recent `limit` records, newest last.
    pub fn list(&self, limit: usize) -> Vec<HistoryRecord> {
        let skip = self.records.len().saturating_sub(limit);
        self.records.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}
