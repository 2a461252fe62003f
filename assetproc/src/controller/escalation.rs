//! Escalation by search and compile groups.
//!
//! Searches are never pure reads: every match gets its escalation raised so
//! that work somebody is waiting for moves to the front of the queue. An
//! escalation can also move a job from the regular to the escalated budget,
//! so every search ends with a dispatch request.

use tracing::{debug, info, trace};
use uuid::Uuid;

use super::core::JobController;
use super::events::{AssetStatus, ControllerEvent, RequestId};
use super::job::{STATUS_REQUEST_ESCALATION, SYNC_REQUEST_ESCALATION};
use super::search::{normalize_search_term, SearchMode, SearchResults};

/// What a compile group request is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileTarget {
    /// Jobs of the source asset with this UUID.
    SourceUuid(Uuid),

    /// Jobs whose source matches a path search term.
    Path { term: String, mode: SearchMode },
}

impl CompileTarget {
    /// Path target with the default heuristic matching.
    pub fn path(term: impl Into<String>) -> Self {
        Self::Path {
            term: term.into(),
            mode: SearchMode::Default,
        }
    }
}

impl std::fmt::Display for CompileTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SourceUuid(uuid) => write!(f, "uuid {}", uuid),
            Self::Path { term, .. } => write!(f, "path {}", term),
        }
    }
}

impl JobController {
    /// Escalates the active jobs on `platform` whose source matches a search
    /// term. Returns the number of matched jobs.
    pub fn escalate_by_search_term(&mut self, platform: &str, term: &str) -> usize {
        let normalized = normalize_search_term(term);
        let results = self.index.search_by_path(
            &normalized,
            platform,
            SearchMode::Default,
            STATUS_REQUEST_ESCALATION,
        );
        let matched = self.apply_escalations(&results);

        self.request_dispatch();
        self.pump();
        matched
    }

    /// Escalates the active jobs on `platform` of the source with `uuid`.
    /// Returns the number of matched jobs.
    pub fn escalate_by_source_uuid(&mut self, platform: &str, uuid: Uuid) -> usize {
        let results = self
            .index
            .search_by_uuid(uuid, platform, STATUS_REQUEST_ESCALATION);
        for key in &results.found {
            debug!(%uuid, job = %key, "Escalating job by source UUID");
        }
        let matched = self.apply_escalations(&results);

        self.request_dispatch();
        self.pump();
        matched
    }

    /// Creates a compile group for the jobs matching `target` on `platform`.
    ///
    /// Matches are escalated (more for blocking requests than for status
    /// requests). Without matches the request is answered with
    /// [`AssetStatus::Unknown`] and nothing is tracked. The returned status
    /// is also emitted as [`ControllerEvent::CompileGroupCreated`].
    pub fn request_compile_group(
        &mut self,
        request_id: RequestId,
        platform: &str,
        target: CompileTarget,
        is_status_request: bool,
    ) -> AssetStatus {
        let escalation = if is_status_request {
            STATUS_REQUEST_ESCALATION
        } else {
            SYNC_REQUEST_ESCALATION
        };

        let results = match &target {
            CompileTarget::SourceUuid(uuid) => {
                self.index.search_by_uuid(*uuid, platform, escalation)
            }
            CompileTarget::Path { term, mode } => {
                let normalized = normalize_search_term(term);
                self.index
                    .search_by_path(&normalized, platform, *mode, escalation)
            }
        };

        if results.is_empty() {
            info!(request = %request_id, target = %target, platform, "Compile group requested, no matching jobs");
            self.events.emit(ControllerEvent::CompileGroupCreated {
                request_id,
                status: AssetStatus::Unknown,
            });
            return AssetStatus::Unknown;
        }

        info!(
            request = %request_id,
            target = %target,
            platform,
            matches = results.len(),
            "Compile group requested and queued"
        );

        self.apply_escalations(&results);
        let status = self.groups.create(request_id, results.found);
        self.events
            .emit(ControllerEvent::CompileGroupCreated { request_id, status });

        self.request_dispatch();
        self.pump();
        status
    }

    /// Raises escalations in the index and re-ranks the affected jobs.
    fn apply_escalations(&mut self, results: &SearchResults) -> usize {
        let raised: Vec<_> = results
            .escalations
            .iter()
            .filter_map(|&(run_key, escalation)| {
                self.index
                    .escalate(run_key, escalation)
                    .map(|value| (run_key, value))
            })
            .collect();
        let reranked = self.ranker.escalate_all(&raised);
        trace!(matched = results.len(), reranked, "Applied escalations");
        results.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::job::{JobDetails, JobKey, JobState};
    use crate::controller::test_support::harness;

    fn key(source: &str) -> JobKey {
        JobKey::new(source, "pc", "texture")
    }

    #[test]
    fn test_escalation_reorders_queue() {
        let mut h = harness(2, false);
        h.controller.submit(JobDetails::new(key("busy.png"), 1));
        h.controller
            .submit(JobDetails::new(key("textures/a.png"), 1));
        h.controller
            .submit(JobDetails::new(key("textures/b.png"), 1));
        assert_eq!(h.builder.started().len(), 1);

        assert_eq!(h.controller.escalate_by_search_term("pc", "b.png"), 1);
        // Escalated job may use the reserved slot.
        assert_eq!(h.builder.started().len(), 2);
        assert_eq!(h.builder.started()[1].key, key("textures/b.png"));
    }

    #[test]
    fn test_escalation_moves_matches_to_front_while_paused() {
        let mut h = harness(2, false);
        h.controller.set_dispatch_paused(true);
        let first = JobDetails::new(key("a.png"), 1);
        let second = JobDetails::new(key("b.png"), 1);
        let (first_rk, second_rk) = (first.run_key, second.run_key);
        h.controller.submit(first);
        h.controller.submit(second);

        assert_eq!(h.controller.escalate_by_search_term("pc", "b.png"), 1);
        let ranked: Vec<_> = h.controller.ranker.ranked().collect();
        assert_eq!(ranked, vec![second_rk, first_rk]);
    }

    #[test]
    fn test_escalation_with_no_match() {
        let mut h = harness(2, false);
        h.controller.submit(JobDetails::new(key("a.png"), 1));
        assert_eq!(h.controller.escalate_by_search_term("pc", "zzz.png"), 0);
        assert_eq!(h.controller.escalate_by_search_term("mac", "a.png"), 0);
    }

    #[test]
    fn test_escalate_by_source_uuid() {
        let uuid = Uuid::new_v4();
        let mut h = harness(2, false);
        h.controller.set_dispatch_paused(true);
        let details = JobDetails::new(key("a.png"), 1).with_source_uuid(uuid);
        let rk = details.run_key;
        h.controller.submit(details);

        assert_eq!(h.controller.escalate_by_source_uuid("pc", uuid), 1);
        let record = h.controller.index().get(rk).unwrap();
        assert_eq!(record.escalation(), STATUS_REQUEST_ESCALATION);
    }

    #[test]
    fn test_compile_group_unknown_when_nothing_matches() {
        let mut h = harness(2, false);
        h.events();

        let status = h.controller.request_compile_group(
            RequestId(10),
            "pc",
            CompileTarget::SourceUuid(Uuid::new_v4()),
            false,
        );

        assert_eq!(status, AssetStatus::Unknown);
        assert_eq!(
            h.events(),
            vec![ControllerEvent::CompileGroupCreated {
                request_id: RequestId(10),
                status: AssetStatus::Unknown
            }]
        );
        assert!(h.controller.groups.is_empty());
    }

    #[test]
    fn test_compile_group_sync_request_escalates_more() {
        let mut h = harness(2, false);
        h.controller.set_dispatch_paused(true);
        let details = JobDetails::new(key("a.png"), 1);
        let rk = details.run_key;
        h.controller.submit(details);

        h.controller.escalate_by_search_term("pc", "a.png");
        let status = h.controller.request_compile_group(
            RequestId(1),
            "pc",
            CompileTarget::path("a.png"),
            false,
        );

        assert_eq!(status, AssetStatus::Queued);
        assert_eq!(
            h.controller.index().get(rk).unwrap().escalation(),
            SYNC_REQUEST_ESCALATION
        );

        // A later status request never lowers it.
        h.controller.request_compile_group(
            RequestId(2),
            "pc",
            CompileTarget::path("a.png"),
            true,
        );
        assert_eq!(
            h.controller.index().get(rk).unwrap().escalation(),
            SYNC_REQUEST_ESCALATION
        );
    }

    #[test]
    fn test_compile_group_finishes_when_members_complete() {
        let mut h = harness(4, false);
        h.controller.submit(JobDetails::new(key("a.png"), 1));
        h.controller
            .submit(JobDetails::new(JobKey::new("a.png", "pc", "mesh"), 1));
        h.controller
            .submit(JobDetails::new(JobKey::new("b.png", "pc", "mesh"), 1));

        let status = h.controller.request_compile_group(
            RequestId(5),
            "pc",
            CompileTarget::path("a.png"),
            true,
        );
        assert_eq!(status, AssetStatus::Queued);
        h.events();

        let started = h.builder.started_run_keys();
        h.complete(started[0]);
        assert!(!h
            .events()
            .iter()
            .any(|e| matches!(e, ControllerEvent::CompileGroupFinished { .. })));

        h.complete(started[1]);
        assert!(h.events().contains(&ControllerEvent::CompileGroupFinished {
            request_id: RequestId(5),
            status: AssetStatus::Compiled
        }));
        assert!(h
            .controller
            .index()
            .exists(&JobKey::new("a.png", "pc", "mesh"), JobState::Completed));
    }
}
