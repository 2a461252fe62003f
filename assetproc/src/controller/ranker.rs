//! Priority ranking of pending jobs.
//!
//! Pending jobs are ordered by criticality, then escalation (highest first),
//! then submission order. Critical and escalated work therefore always sits
//! ahead of regular work, which is what lets a dispatch pass stop at the
//! first job that does not fit the budget.
//!
//! [`QueueRanker::next_pending`] also gates jobs that cannot run yet:
//! - a job whose declared dependencies are still pending or processing
//! - a job whose key still has a (cancelled) run in flight
//! - a job with a missing source dependency while anything is in flight
//!
//! When nothing is runnable and nothing is in flight, the first gated job is
//! returned anyway so the queue can never stall.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use tracing::trace;

use super::index::JobIndex;
use super::job::{JobRecord, JobRunKey, JobState};

/// Ordering key of a queued job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RankEntry {
    critical: bool,
    escalation: i32,
    sequence: u64,
    run_key: JobRunKey,
}

impl Ord for RankEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Critical first, then higher escalation, then FIFO.
        other
            .critical
            .cmp(&self.critical)
            .then_with(|| other.escalation.cmp(&self.escalation))
            .then_with(|| self.sequence.cmp(&other.sequence))
            .then_with(|| self.run_key.cmp(&other.run_key))
    }
}

impl PartialOrd for RankEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Ranked view over the pending jobs of a [`JobIndex`].
#[derive(Debug, Default)]
pub struct QueueRanker {
    queue: BTreeSet<RankEntry>,
    entries: HashMap<JobRunKey, RankEntry>,
}

impl QueueRanker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a job to the ranking.
    pub fn push(&mut self, record: &JobRecord) {
        let entry = RankEntry {
            critical: record.is_critical(),
            escalation: record.escalation(),
            sequence: record.sequence(),
            run_key: record.run_key(),
        };
        if let Some(old) = self.entries.insert(entry.run_key, entry) {
            self.queue.remove(&old);
        }
        self.queue.insert(entry);
    }

    /// Drops a job from the ranking. Returns false if it was not ranked.
    pub fn remove(&mut self, run_key: JobRunKey) -> bool {
        match self.entries.remove(&run_key) {
            Some(entry) => {
                self.queue.remove(&entry);
                true
            }
            None => false,
        }
    }

    /// Re-ranks a job after its escalation changed. Escalation never goes
    /// down; a lower value is ignored.
    pub fn escalate(&mut self, run_key: JobRunKey, escalation: i32) -> bool {
        let Some(entry) = self.entries.get_mut(&run_key) else {
            return false;
        };
        if escalation <= entry.escalation {
            return false;
        }

        self.queue.remove(&*entry);
        entry.escalation = escalation;
        self.queue.insert(*entry);
        trace!(run_key = %run_key, escalation, "Re-ranked escalated job");
        true
    }

    /// Applies a list of escalations. Returns how many jobs moved.
    pub fn escalate_all(&mut self, escalations: &[(JobRunKey, i32)]) -> usize {
        escalations
            .iter()
            .filter(|(run_key, escalation)| self.escalate(*run_key, *escalation))
            .count()
    }

    /// Returns the highest ranked pending job that may start now.
    pub fn next_pending(&self, index: &JobIndex) -> Option<JobRunKey> {
        let in_flight = index.in_flight_count();
        let mut first_blocked = None;

        for entry in &self.queue {
            let Some(record) = index.get(entry.run_key) else {
                continue;
            };
            if record.state() != JobState::Pending {
                continue;
            }
            if record.is_auto_fail() {
                return Some(entry.run_key);
            }

            let blocked = index.is_running(record.key())
                || record.dependencies().iter().any(|dep| index.is_active(dep))
                || (record.has_missing_source_dependency() && in_flight > 0);

            if !blocked {
                return Some(entry.run_key);
            }
            first_blocked.get_or_insert(entry.run_key);
        }

        if in_flight == 0 {
            first_blocked
        } else {
            None
        }
    }

    /// Ranked run keys, highest priority first.
    pub fn ranked(&self) -> impl Iterator<Item = JobRunKey> + '_ {
        self.queue.iter().map(|e| e.run_key)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
