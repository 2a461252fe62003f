//! Job index - the single source of truth for job existence and state.
//!
//! Records live in one registry keyed by [`JobRunKey`]. Pending and
//! processing jobs are additionally indexed by [`JobKey`], which is how the
//! at-most-one-active invariant is enforced: `insert` refuses a second
//! pending record and `mark_processing` refuses a second processing one.
//!
//! A processing job that gets superseded is marked cancelled and leaves the
//! key partitions immediately, but stays in the registry (and in flight)
//! until its builder reports back. That keeps the slot accounted for while
//! letting the replacement be inserted.
//!
//! ```text
//!   insert ──► pending ──mark_processing──► processing ──take──► mark_completed
//!                │                              │                    │
//!                └─────────take─────────────────┘           history (+ catalog hold)
//! ```

use std::collections::{HashMap, VecDeque};

use tracing::{debug, trace};
use uuid::Uuid;

use super::error::IndexError;
use super::job::{JobKey, JobRecord, JobRunKey, JobState};
use super::search::{self, MatchTier, SearchMode, SearchResults};

/// Default number of finished records kept for inspection.
pub const DEFAULT_COMPLETED_HISTORY: usize = 256;

/// Registry of all live jobs plus a bounded history of finished ones.
#[derive(Debug)]
pub struct JobIndex {
    /// Live records: pending, processing, or cancelled but still running.
    records: HashMap<JobRunKey, JobRecord>,

    /// Pending partition.
    pending: HashMap<JobKey, JobRunKey>,

    /// Processing partition.
    processing: HashMap<JobKey, JobRunKey>,

    /// Started jobs whose builder has not reported back yet.
    in_flight: HashMap<JobRunKey, JobKey>,

    /// Completed jobs still holding a slot until the catalog picks them up.
    awaiting_catalog: Vec<JobKey>,

    /// Most recent finished records, oldest first.
    completed: VecDeque<JobRecord>,

    completed_capacity: usize,
}

impl JobIndex {
    /// Creates an empty index keeping up to `completed_capacity` finished
    /// records.
    pub fn new(completed_capacity: usize) -> Self {
        Self {
            records: HashMap::new(),
            pending: HashMap::new(),
            processing: HashMap::new(),
            in_flight: HashMap::new(),
            awaiting_catalog: Vec::new(),
            completed: VecDeque::with_capacity(completed_capacity.min(1024)),
            completed_capacity,
        }
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Returns true if a record for `key` exists in `state`.
    pub fn exists(&self, key: &JobKey, state: JobState) -> bool {
        self.find_by_state(key, state).is_some()
    }

    /// Finds the record for `key` in `state`.
    ///
    /// Pending and processing lookups hit the key partitions. Terminal states
    /// look at live cancelled records first, then the completed history
    /// (newest first).
    pub fn find_by_state(&self, key: &JobKey, state: JobState) -> Option<&JobRecord> {
        match state {
            JobState::Pending => self.pending.get(key).and_then(|rk| self.records.get(rk)),
            JobState::Processing => self
                .processing
                .get(key)
                .and_then(|rk| self.records.get(rk)),
            terminal => self
                .records
                .values()
                .find(|r| r.key() == key && r.state() == terminal)
                .or_else(|| {
                    self.completed
                        .iter()
                        .rev()
                        .find(|r| r.key() == key && r.state() == terminal)
                }),
        }
    }

    /// Returns the live record with this run key.
    pub fn get(&self, run_key: JobRunKey) -> Option<&JobRecord> {
        self.records.get(&run_key)
    }

    /// Returns true if `key` has a pending or processing record.
    pub fn is_active(&self, key: &JobKey) -> bool {
        self.pending.contains_key(key) || self.processing.contains_key(key)
    }

    /// Returns true if a started job for `key` has not reported back yet,
    /// including one that was cancelled.
    pub fn is_running(&self, key: &JobKey) -> bool {
        self.in_flight.values().any(|k| k == key)
    }

    /// Returns true if the run key was started and has not been taken yet.
    pub fn is_in_flight(&self, run_key: JobRunKey) -> bool {
        self.in_flight.contains_key(&run_key)
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Adds a new pending record.
    ///
    /// Callers must cancel an existing pending record for the same key first.
    pub fn insert(&mut self, record: JobRecord) -> Result<(), IndexError> {
        if self.pending.contains_key(record.key()) {
            return Err(IndexError::DuplicatePending(record.key().clone()));
        }
        if self.records.contains_key(&record.run_key()) {
            return Err(IndexError::DuplicateRunKey(record.run_key()));
        }

        trace!(job = %record.key(), run_key = %record.run_key(), "Indexed pending job");
        self.pending.insert(record.key().clone(), record.run_key());
        self.records.insert(record.run_key(), record);
        Ok(())
    }

    /// Moves a pending record to the processing partition and counts it as
    /// in flight.
    pub fn mark_processing(&mut self, run_key: JobRunKey) -> Result<(), IndexError> {
        let record = self
            .records
            .get_mut(&run_key)
            .ok_or(IndexError::UnknownRunKey(run_key))?;

        if record.state() != JobState::Pending {
            return Err(IndexError::InvalidState {
                run_key,
                expected: JobState::Pending,
                actual: record.state(),
            });
        }

        let key = record.key().clone();
        if let Some(existing) = self.processing.get(&key) {
            return Err(IndexError::InvalidState {
                run_key: *existing,
                expected: JobState::Pending,
                actual: JobState::Processing,
            });
        }

        record.set_state(JobState::Processing);
        self.pending.remove(&key);
        self.processing.insert(key.clone(), run_key);
        self.in_flight.insert(run_key, key);
        Ok(())
    }

    /// Marks a live record as cancelled and removes it from the key
    /// partitions. Returns the state it had before.
    ///
    /// A cancelled processing record stays in flight until it is taken.
    pub fn mark_cancelled(&mut self, run_key: JobRunKey) -> Option<JobState> {
        let record = self.records.get_mut(&run_key)?;
        let previous = record.state();
        if previous.is_terminal() {
            return Some(previous);
        }

        record.set_state(JobState::Cancelled);
        let key = record.key().clone();
        Self::unlink(&mut self.pending, &key, run_key);
        Self::unlink(&mut self.processing, &key, run_key);
        debug!(job = %key, run_key = %run_key, was = %previous, "Job marked cancelled");
        Some(previous)
    }

    /// Removes a live record from every partition and hands it to the caller
    /// for finalisation.
    pub fn take(&mut self, run_key: JobRunKey) -> Option<JobRecord> {
        let record = self.records.remove(&run_key)?;
        Self::unlink(&mut self.pending, record.key(), run_key);
        Self::unlink(&mut self.processing, record.key(), run_key);
        self.in_flight.remove(&run_key);
        Some(record)
    }

    /// Moves a taken record into the completed history in its final state.
    ///
    /// With `hold_for_catalog` a successfully completed job keeps counting as
    /// in flight until [`mark_cataloged`](Self::mark_cataloged) is called for
    /// its key.
    pub fn mark_completed(&mut self, mut record: JobRecord, state: JobState, hold_for_catalog: bool) {
        record.set_state(state);

        if hold_for_catalog && state == JobState::Completed {
            self.awaiting_catalog.push(record.key().clone());
        }

        if self.completed_capacity == 0 {
            return;
        }
        while self.completed.len() >= self.completed_capacity {
            self.completed.pop_front();
        }
        self.completed.push_back(record);
    }

    /// Releases the catalog hold of one completed job for `key`.
    ///
    /// Returns false if nothing was waiting for that key.
    pub fn mark_cataloged(&mut self, key: &JobKey) -> bool {
        match self.awaiting_catalog.iter().position(|k| k == key) {
            Some(pos) => {
                self.awaiting_catalog.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Drops every catalog hold. Returns how many were released.
    pub fn clear_catalog_holds(&mut self) -> usize {
        let released = self.awaiting_catalog.len();
        self.awaiting_catalog.clear();
        released
    }

    /// Removes every pending job whose source is `source`, on any platform,
    /// and returns them so the caller can finish them.
    ///
    /// Processing jobs are left alone and finish through their builder.
    pub fn erase_by_source(&mut self, source: &str) -> Vec<JobRecord> {
        let mut matching: Vec<JobRecord> = Vec::new();
        let run_keys: Vec<JobRunKey> = self
            .pending
            .iter()
            .filter(|(key, _)| key.source() == source)
            .map(|(_, rk)| *rk)
            .collect();

        for run_key in run_keys {
            if let Some(record) = self.take(run_key) {
                matching.push(record);
            }
        }

        matching.sort_by_key(|r| r.sequence());
        matching
    }

    /// Applies an escalation to a pending or processing record.
    ///
    /// Escalation never goes down. Returns the new value when it was raised.
    pub fn escalate(&mut self, run_key: JobRunKey, escalation: i32) -> Option<i32> {
        let record = self.records.get_mut(&run_key)?;
        if !record.state().is_active() || escalation <= record.escalation() {
            return None;
        }
        record.set_escalation(escalation);
        Some(escalation)
    }

    // =========================================================================
    // Search
    // =========================================================================

    /// Finds the active jobs on `platform` whose source has the given UUID.
    pub fn search_by_uuid(&self, uuid: Uuid, platform: &str, escalation: i32) -> SearchResults {
        let mut results = SearchResults::default();
        for record in self.active_on(platform) {
            if record.source_uuid() == Some(uuid) {
                results.push(record.key().clone(), record.run_key(), escalation);
            }
        }

        debug!(%uuid, platform, matches = results.len(), "Searched jobs by source UUID");
        results
    }

    /// Finds the active jobs on `platform` whose source matches a normalised
    /// search term.
    ///
    /// In [`SearchMode::Default`] the narrowest matching tier wins.
    pub fn search_by_path(
        &self,
        term: &str,
        platform: &str,
        mode: SearchMode,
        escalation: i32,
    ) -> SearchResults {
        let term = term.to_lowercase();
        let tiers: &[MatchTier] = match mode {
            SearchMode::Exact => &[MatchTier::Suffix],
            SearchMode::Default => &MatchTier::ALL,
        };

        let mut results = SearchResults::default();
        for tier in tiers {
            for record in self.active_on(platform) {
                if search::matches(record.key().source(), &term, mode, *tier) {
                    results.push(record.key().clone(), record.run_key(), escalation);
                }
            }
            if !results.is_empty() {
                debug!(term = %term, platform, ?tier, matches = results.len(), "Searched jobs by path");
                break;
            }
        }

        results
    }

    fn active_on<'a>(&'a self, platform: &'a str) -> impl Iterator<Item = &'a JobRecord> + 'a {
        self.pending
            .values()
            .chain(self.processing.values())
            .filter_map(move |rk| self.records.get(rk))
            .filter(move |r| r.key().platform() == platform)
    }

    // =========================================================================
    // Counts
    // =========================================================================

    /// Jobs occupying a slot: started and not reported back, plus completed
    /// jobs held for the catalog.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len() + self.awaiting_catalog.len()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Number of live records, including cancelled ones still running.
    pub fn live_count(&self) -> usize {
        self.records.len()
    }

    /// Run keys of all pending jobs, oldest submission first.
    pub fn pending_run_keys(&self) -> Vec<JobRunKey> {
        let mut keys: Vec<&JobRecord> = self
            .pending
            .values()
            .filter_map(|rk| self.records.get(rk))
            .collect();
        keys.sort_by_key(|r| r.sequence());
        keys.into_iter().map(|r| r.run_key()).collect()
    }

    /// Finished records, oldest first.
    pub fn recent_completed(&self) -> impl Iterator<Item = &JobRecord> {
        self.completed.iter()
    }

    fn unlink(partition: &mut HashMap<JobKey, JobRunKey>, key: &JobKey, run_key: JobRunKey) {
        if partition.get(key) == Some(&run_key) {
            partition.remove(key);
        }
    }
}

impl Default for JobIndex {
    fn default() -> Self {
        Self::new(DEFAULT_COMPLETED_HISTORY)
    }
}
