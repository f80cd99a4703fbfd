use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::amount::Credit;
use crate::state::ManagedIssueState;
use crate::types::{CompanyId, GithubIssueId, Subject, UserId};

/// failures raised by persistence collaborators
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("storage backend failure: {message}")]
    Backend {
        message: String,
    },

    #[error("record not found: {entity}")]
    NotFound {
        entity: String,
    },

    #[error("lock poisoned: {resource}")]
    Poisoned {
        resource: String,
    },
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// how a subject's ledger failed to add up
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inconsistency {
    #[error("available credit is {available}")]
    NegativeBalance {
        available: Credit,
    },

    #[error("credit totals overflow")]
    Overflow,
}

#[derive(Error, Debug)]
pub enum FundingError {
    #[error("invalid amount: {amount}")]
    InvalidAmount {
        amount: i64,
    },

    #[error("subject not found: {subject}")]
    SubjectNotFound {
        subject: Subject,
    },

    #[error("issue {issue} is managed by {manager}, not {requester}")]
    ManagerConflict {
        issue: GithubIssueId,
        manager: UserId,
        requester: UserId,
    },

    #[error("invalid transition for issue {issue}: {from:?} -> {to:?}")]
    InvalidTransition {
        issue: GithubIssueId,
        from: ManagedIssueState,
        to: ManagedIssueState,
    },

    #[error("funding rejected for issue {issue}")]
    FundingRejected {
        issue: GithubIssueId,
    },

    #[error("issue {issue} closed at {closed_at}")]
    IssueClosed {
        issue: GithubIssueId,
        closed_at: DateTime<Utc>,
    },

    #[error("issue not found: {issue}")]
    IssueNotFound {
        issue: GithubIssueId,
    },

    #[error("insufficient credit: available {available}, requested {requested}")]
    InsufficientCredit {
        available: Credit,
        requested: Credit,
    },

    #[error("ledger inconsistent for {subject}: {kind}")]
    LedgerInconsistent {
        subject: Subject,
        kind: Inconsistency,
    },

    #[error("ledger unavailable: {source}")]
    LedgerUnavailable {
        #[from]
        source: StoreError,
    },

    #[error("user {user} is not a member of {company}")]
    NotCompanyMember {
        user: UserId,
        company: CompanyId,
    },

    #[error("user {acting} cannot act for {subject}")]
    SubjectMismatch {
        acting: UserId,
        subject: Subject,
    },

    #[error("invalid configuration: {message}")]
    InvalidConfiguration {
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, FundingError>;
