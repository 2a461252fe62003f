//! Compile groups.
//!
//! A compile group is a caller-visible set of jobs tracked as one logical
//! completion. It finishes as [`AssetStatus::Compiled`] once every member
//! completed successfully, and as [`AssetStatus::Failed`] on the first member
//! that does not. Later completions of the remaining members are ignored for
//! that group.

use std::collections::HashSet;

use tracing::debug;

use super::events::{AssetStatus, RequestId};
use super::job::JobKey;

#[derive(Debug)]
struct CompileGroup {
    request_id: RequestId,
    members: HashSet<JobKey>,
}

/// Tracks active compile groups.
#[derive(Debug, Default)]
pub struct CompileGroupTracker {
    groups: Vec<CompileGroup>,
}

impl CompileGroupTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking `members` for `request_id`.
    ///
    /// Returns the status to report to the requester. An empty member set is
    /// answered with [`AssetStatus::Unknown`] and not tracked.
    pub fn create(&mut self, request_id: RequestId, members: HashSet<JobKey>) -> AssetStatus {
        if members.is_empty() {
            return AssetStatus::Unknown;
        }

        debug!(request = %request_id, members = members.len(), "Tracking compile group");
        self.groups.push(CompileGroup {
            request_id,
            members,
        });
        AssetStatus::Queued
    }

    /// Records the completion of `key` and returns the groups it finished.
    pub fn on_job_complete(&mut self, key: &JobKey, succeeded: bool) -> Vec<(RequestId, AssetStatus)> {
        let mut finished = Vec::new();

        // Walk backwards so removal does not skip a group.
        for idx in (0..self.groups.len()).rev() {
            let group = &mut self.groups[idx];
            if !group.members.remove(key) {
                continue;
            }

            if group.members.is_empty() || !succeeded {
                let status = if succeeded {
                    AssetStatus::Compiled
                } else {
                    AssetStatus::Failed
                };
                debug!(request = %group.request_id, status = %status, job = %key, "Compile group finished");
                finished.push((group.request_id, status));
                self.groups.remove(idx);
            }
        }

        finished
    }

    /// Number of groups still waiting.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
