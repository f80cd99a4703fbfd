use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::amount::Credit;
use crate::errors::{FundingError, Result};
use crate::types::{ContributorVisibility, GithubIssueId, UserId};

/// managed issue state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ManagedIssueState {
    /// accepting requests and funding
    Open,
    /// terminal, funding stops counting against balances
    Rejected,
    /// terminal, funding history preserved
    Solved,
}

impl ManagedIssueState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ManagedIssueState::Rejected | ManagedIssueState::Solved)
    }

    /// whether commitments against an issue in this state count towards balances
    pub fn counts_commitments(&self) -> bool {
        !matches!(self, ManagedIssueState::Rejected)
    }

    pub fn can_transition_to(&self, next: ManagedIssueState) -> bool {
        matches!(
            (self, next),
            (ManagedIssueState::Open, ManagedIssueState::Open)
                | (ManagedIssueState::Open, ManagedIssueState::Rejected)
                | (ManagedIssueState::Open, ManagedIssueState::Solved)
        )
    }
}

/// funding-request record for one github issue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagedIssue {
    pub id: Uuid,
    pub github_issue_id: GithubIssueId,
    pub requested_credit_amount: Option<Credit>,
    pub manager_id: UserId,
    pub contributor_visibility: ContributorVisibility,
    pub state: ManagedIssueState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ManagedIssue {
    /// open a new request managed by `manager_id`
    pub fn open(
        github_issue_id: GithubIssueId,
        manager_id: UserId,
        requested_credit_amount: Credit,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            github_issue_id,
            requested_credit_amount: Some(requested_credit_amount),
            manager_id,
            contributor_visibility: ContributorVisibility::default(),
            state: ManagedIssueState::Open,
            created_at: timestamp,
            updated_at: timestamp,
        }
    }

    /// check whether funding may be committed against this issue
    pub fn ensure_fundable(&self) -> Result<()> {
        match self.state {
            ManagedIssueState::Open => Ok(()),
            ManagedIssueState::Rejected => Err(FundingError::FundingRejected {
                issue: self.github_issue_id.clone(),
            }),
            ManagedIssueState::Solved => Err(self.invalid(ManagedIssueState::Open)),
        }
    }

    /// OPEN -> OPEN: the manager revises the requested amount
    pub fn update_request(
        &mut self,
        requester: UserId,
        requested_credit_amount: Credit,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        if !self.state.can_transition_to(ManagedIssueState::Open) {
            return Err(self.invalid(ManagedIssueState::Open));
        }
        if requester != self.manager_id {
            return Err(FundingError::ManagerConflict {
                issue: self.github_issue_id.clone(),
                manager: self.manager_id,
                requester,
            });
        }

        self.requested_credit_amount = Some(requested_credit_amount);
        self.updated_at = timestamp;
        Ok(())
    }

    /// move to a terminal state
    pub fn transition(&mut self, next: ManagedIssueState, timestamp: DateTime<Utc>) -> Result<()> {
        if !next.is_terminal() || !self.state.can_transition_to(next) {
            return Err(self.invalid(next));
        }

        self.state = next;
        self.updated_at = timestamp;
        Ok(())
    }

    fn invalid(&self, to: ManagedIssueState) -> FundingError {
        FundingError::InvalidTransition {
            issue: self.github_issue_id.clone(),
            from: self.state,
            to,
        }
    }
}
