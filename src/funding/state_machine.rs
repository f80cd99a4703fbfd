use hourglass_rs::SafeTimeProvider;
use std::sync::Arc;
use tracing::{info, warn};

use crate::amount::Credit;
use crate::errors::{FundingError, Result};
use crate::events::{Event, EventStore};
use crate::state::{ManagedIssue, ManagedIssueState};
use crate::store::ManagedIssueStore;
use crate::types::{GithubIssueId, UserId};

/// attempts before a conflicting concurrent update is reported as a store error
const MAX_UPDATE_ATTEMPTS: usize = 3;

/// lifecycle of funding requests, one record per github issue
pub struct ManagedIssueStateMachine {
    store: Arc<dyn ManagedIssueStore>,
    events: Arc<EventStore>,
}

impl ManagedIssueStateMachine {
    pub fn new(store: Arc<dyn ManagedIssueStore>, events: Arc<EventStore>) -> Self {
        Self { store, events }
    }

    pub fn current(&self, issue: &GithubIssueId) -> Result<Option<ManagedIssue>> {
        Ok(self.store.get(issue)?)
    }

    /// open a request for `issue`, or let its manager revise the amount
    ///
    /// The first requester becomes the manager. Later requests by anyone
    /// else fail with `ManagerConflict`; requests against a rejected or
    /// solved issue fail with `InvalidTransition`.
    pub fn request(
        &self,
        requester: UserId,
        issue: &GithubIssueId,
        requested: Credit,
        time_provider: &SafeTimeProvider,
    ) -> Result<ManagedIssue> {
        let now = time_provider.now();

        let existing = match self.store.get(issue)? {
            Some(existing) => existing,
            None => {
                let candidate = ManagedIssue::open(issue.clone(), requester, requested, now);
                let stored = self.store.create_if_absent(candidate.clone())?;
                if stored.id == candidate.id {
                    info!(issue = %issue, manager = %requester, requested = requested.units(), "funding request opened");
                    self.events.emit(Event::FundingRequested {
                        managed_issue_id: stored.id,
                        github_issue_id: issue.clone(),
                        manager_id: requester,
                        requested_amount: requested,
                        timestamp: now,
                    });
                    return Ok(stored);
                }
                // another request got there first
                stored
            }
        };

        self.apply(existing, |managed| {
            let old_amount = managed.requested_credit_amount;
            managed.update_request(requester, requested, now)?;
            Ok(Event::FundingRequestUpdated {
                managed_issue_id: managed.id,
                github_issue_id: issue.clone(),
                old_amount,
                new_amount: requested,
                timestamp: now,
            })
        })
    }

    /// OPEN -> REJECTED, decided outside this crate
    pub fn reject(&self, issue: &GithubIssueId, time_provider: &SafeTimeProvider) -> Result<ManagedIssue> {
        self.transition(issue, ManagedIssueState::Rejected, time_provider)
    }

    /// OPEN -> SOLVED, decided outside this crate
    pub fn solve(&self, issue: &GithubIssueId, time_provider: &SafeTimeProvider) -> Result<ManagedIssue> {
        self.transition(issue, ManagedIssueState::Solved, time_provider)
    }

    pub fn transition(
        &self,
        issue: &GithubIssueId,
        next: ManagedIssueState,
        time_provider: &SafeTimeProvider,
    ) -> Result<ManagedIssue> {
        let now = time_provider.now();
        let managed = self
            .store
            .get(issue)?
            .ok_or_else(|| FundingError::IssueNotFound { issue: issue.clone() })?;

        let updated = self.apply(managed, |managed| {
            let old_state = managed.state;
            managed.transition(next, now)?;
            Ok(Event::StateChanged {
                managed_issue_id: managed.id,
                github_issue_id: issue.clone(),
                old_state,
                new_state: next,
                timestamp: now,
            })
        })?;

        info!(issue = %issue, state = ?next, "managed issue transitioned");
        Ok(updated)
    }

    /// apply a change, retrying when a concurrent writer moved the record
    fn apply<F>(&self, mut managed: ManagedIssue, mut change: F) -> Result<ManagedIssue>
    where
        F: FnMut(&mut ManagedIssue) -> Result<Event>,
    {
        for _ in 0..MAX_UPDATE_ATTEMPTS {
            let expected = managed.state;
            let event = change(&mut managed)?;
            if self.store.update(&managed, expected)? {
                self.events.emit(event);
                return Ok(managed);
            }

            warn!(issue = %managed.github_issue_id, "managed issue changed concurrently, reloading");
            managed = self.store.get(&managed.github_issue_id)?.ok_or_else(|| {
                FundingError::IssueNotFound {
                    issue: managed.github_issue_id.clone(),
                }
            })?;
        }

        Err(crate::errors::StoreError::Backend {
            message: format!(
                "managed issue {} kept changing during update",
                managed.github_issue_id
            ),
        }
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::Fixture;

    fn machine(fx: &Fixture) -> ManagedIssueStateMachine {
        ManagedIssueStateMachine::new(fx.stores.managed_issues.clone(), fx.events.clone())
    }

    #[test]
    fn test_first_request_opens_issue() {
        let fx = Fixture::new();
        let sm = machine(&fx);
        let manager = fx.store.add_user();
        let issue = fx.issue(1);

        let managed = sm.request(manager, &issue, Credit::new(400), &fx.time).unwrap();
        assert_eq!(managed.state, ManagedIssueState::Open);
        assert_eq!(managed.manager_id, manager);
        assert_eq!(managed.requested_credit_amount, Some(Credit::new(400)));
        assert!(matches!(fx.events.take_events()[..], [Event::FundingRequested { .. }]));
    }

    #[test]
    fn test_manager_request_is_idempotent_update() {
        let fx = Fixture::new();
        let sm = machine(&fx);
        let manager = fx.store.add_user();
        let issue = fx.issue(2);

        let first = sm.request(manager, &issue, Credit::new(400), &fx.time).unwrap();
        let second = sm.request(manager, &issue, Credit::new(650), &fx.time).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.requested_credit_amount, Some(Credit::new(650)));
        assert_eq!(
            sm.current(&issue).unwrap().unwrap().requested_credit_amount,
            Some(Credit::new(650))
        );
    }

    #[test]
    fn test_other_requester_conflicts() {
        let fx = Fixture::new();
        let sm = machine(&fx);
        let issue = fx.issue(3);
        sm.request(fx.store.add_user(), &issue, Credit::new(100), &fx.time).unwrap();

        let result = sm.request(fx.store.add_user(), &issue, Credit::new(900), &fx.time);
        assert!(matches!(result, Err(FundingError::ManagerConflict { .. })));
        assert_eq!(
            sm.current(&issue).unwrap().unwrap().requested_credit_amount,
            Some(Credit::new(100))
        );
    }

    #[test]
    fn test_requests_blocked_after_terminal_state() {
        let fx = Fixture::new();
        let sm = machine(&fx);
        let manager = fx.store.add_user();
        let issue = fx.issue(4);
        sm.request(manager, &issue, Credit::new(100), &fx.time).unwrap();
        sm.solve(&issue, &fx.time).unwrap();

        assert!(matches!(
            sm.request(manager, &issue, Credit::new(200), &fx.time),
            Err(FundingError::InvalidTransition { from: ManagedIssueState::Solved, .. })
        ));
        assert!(matches!(
            sm.reject(&issue, &fx.time),
            Err(FundingError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_reject_records_event() {
        let fx = Fixture::new();
        let sm = machine(&fx);
        let issue = fx.issue(5);
        sm.request(fx.store.add_user(), &issue, Credit::new(100), &fx.time).unwrap();
        fx.events.clear();

        let rejected = sm.reject(&issue, &fx.time).unwrap();
        assert_eq!(rejected.state, ManagedIssueState::Rejected);
        assert!(matches!(
            fx.events.take_events()[..],
            [Event::StateChanged {
                old_state: ManagedIssueState::Open,
                new_state: ManagedIssueState::Rejected,
                ..
            }]
        ));
    }

    #[test]
    fn test_transition_of_unknown_issue() {
        let fx = Fixture::new();
        assert!(matches!(
            machine(&fx).reject(&fx.issue(6), &fx.time),
            Err(FundingError::IssueNotFound { .. })
        ));
    }
}
