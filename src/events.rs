use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use uuid::Uuid;

use crate::amount::Credit;
use crate::state::ManagedIssueState;
use crate::types::{GithubIssueId, Subject, UserId};

/// all events emitted by the ledger and the funding services
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    // request lifecycle
    FundingRequested {
        managed_issue_id: Uuid,
        github_issue_id: GithubIssueId,
        manager_id: UserId,
        requested_amount: Credit,
        timestamp: DateTime<Utc>,
    },
    FundingRequestUpdated {
        managed_issue_id: Uuid,
        github_issue_id: GithubIssueId,
        old_amount: Option<Credit>,
        new_amount: Credit,
        timestamp: DateTime<Utc>,
    },
    StateChanged {
        managed_issue_id: Uuid,
        github_issue_id: GithubIssueId,
        old_state: ManagedIssueState,
        new_state: ManagedIssueState,
        timestamp: DateTime<Utc>,
    },

    // commitments
    IssueFunded {
        issue_funding_id: Uuid,
        github_issue_id: GithubIssueId,
        subject: Subject,
        user_id: UserId,
        amount: Credit,
        remaining_credit: Credit,
        timestamp: DateTime<Utc>,
    },

    // anomalies
    NegativeBalanceDetected {
        subject: Subject,
        available: Credit,
        paid: Credit,
        committed: Credit,
        timestamp: DateTime<Utc>,
    },
}

/// thread-safe event log shared between services
#[derive(Debug, Default)]
pub struct EventStore {
    events: Mutex<Vec<Event>>,
}

impl EventStore {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn emit(&self, event: Event) {
        // a poisoned log still accepts events
        let mut events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        events.push(event);
    }

    pub fn take_events(&self) -> Vec<Event> {
        let mut events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut *events)
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}
