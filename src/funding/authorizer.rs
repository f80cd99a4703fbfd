use hourglass_rs::{SafeTimeProvider, TimeSource};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::lock::SubjectLocks;
use super::state_machine::ManagedIssueStateMachine;
use crate::amount::Credit;
use crate::config::LedgerConfig;
use crate::errors::{FundingError, Inconsistency, Result, StoreError};
use crate::events::{Event, EventStore};
use crate::ledger::{CreditLedger, SubjectScope};
use crate::state::ManagedIssue;
use crate::store::{IssueFunding, Stores};
use crate::types::{GithubIssueId, Subject, UserId};

/// attempts before a subject whose company keeps changing is reported as a store error
const MAX_POOL_ATTEMPTS: usize = 3;

/// decides whether credit may be committed to an issue, and commits it
pub struct FundingAuthorizer {
    ledger: CreditLedger,
    state_machine: ManagedIssueStateMachine,
    stores: Stores,
    locks: SubjectLocks,
    events: Arc<EventStore>,
}

impl FundingAuthorizer {
    pub fn new(config: &LedgerConfig, stores: Stores, events: Arc<EventStore>) -> Self {
        Self {
            ledger: CreditLedger::new(stores.clone(), config.plan_credits.clone(), events.clone()),
            state_machine: ManagedIssueStateMachine::new(stores.managed_issues.clone(), events.clone()),
            stores,
            locks: SubjectLocks::new(),
            events,
        }
    }

    pub fn ledger(&self) -> &CreditLedger {
        &self.ledger
    }

    pub fn state_machine(&self) -> &ManagedIssueStateMachine {
        &self.state_machine
    }

    /// commit `credit_amount` of `subject`'s balance to `issue`
    ///
    /// The lock of the subject's pool is held from the balance read to the
    /// insert, so a company and its members see each other's commitments.
    pub fn fund_issue(
        &self,
        subject: Subject,
        acting_user: UserId,
        issue: &GithubIssueId,
        credit_amount: Credit,
        time_provider: &SafeTimeProvider,
    ) -> Result<IssueFunding> {
        if !credit_amount.is_positive() {
            return Err(FundingError::InvalidAmount {
                amount: credit_amount.units(),
            });
        }

        // 1-2: the issue must not be rejected or solved
        if let Some(managed) = self.state_machine.current(issue)? {
            if let Err(e) = managed.ensure_fundable() {
                warn!(issue = %issue, state = ?managed.state, user = %acting_user, "funding attempt on closed request");
                return Err(e);
            }
        }

        for _ in 0..MAX_POOL_ATTEMPTS {
            let pool = self.ledger.scope(&subject)?.pool;
            let funded = self.locks.with_lock(&pool, || -> Result<Option<IssueFunding>> {
                // membership may have moved the subject while we waited
                let scope = self.ledger.scope(&subject)?;
                if scope.pool != pool {
                    return Ok(None);
                }
                authorize_actor(&scope, acting_user)?;
                self.commit(&scope, acting_user, issue, credit_amount, time_provider)
                    .map(Some)
            })?;

            match funded {
                Some(funding) => return Ok(funding),
                None => warn!(subject = %subject, pool = %pool, "membership changed during funding, retrying"),
            }
        }

        Err(StoreError::Backend {
            message: format!("membership of {} kept changing during funding", subject),
        }
        .into())
    }

    /// 3-6: balance check and insert, with the pool locked
    fn commit(
        &self,
        scope: &SubjectScope,
        acting_user: UserId,
        issue: &GithubIssueId,
        credit_amount: Credit,
        time_provider: &SafeTimeProvider,
    ) -> Result<IssueFunding> {
        let subject = scope.subject;
        let now = time_provider.now();
        let balance = self.ledger.breakdown_in_scope(scope, now)?;
        if balance.available.is_negative() {
            error!(
                subject = %subject,
                available = balance.available.units(),
                "refusing to fund from an inconsistent ledger"
            );
            return Err(FundingError::LedgerInconsistent {
                subject,
                kind: Inconsistency::NegativeBalance {
                    available: balance.available,
                },
            });
        }
        if credit_amount > balance.available {
            return Err(FundingError::InsufficientCredit {
                available: balance.available,
                requested: credit_amount,
            });
        }

        let funding = IssueFunding {
            id: Uuid::new_v4(),
            github_issue_id: issue.clone(),
            user_id: acting_user,
            credit_amount,
            created_at: now,
        };
        self.stores.issue_fundings.insert(&funding)?;

        let remaining = balance.available - credit_amount;
        info!(
            issue = %issue,
            subject = %subject,
            pool = %scope.pool,
            user = %acting_user,
            amount = credit_amount.units(),
            remaining = remaining.units(),
            "issue funded"
        );
        self.events.emit(Event::IssueFunded {
            issue_funding_id: funding.id,
            github_issue_id: issue.clone(),
            subject,
            user_id: acting_user,
            amount: credit_amount,
            remaining_credit: remaining,
            timestamp: now,
        });

        Ok(funding)
    }

    /// fund using system time
    pub fn fund_issue_now(
        &self,
        subject: Subject,
        acting_user: UserId,
        issue: &GithubIssueId,
        credit_amount: Credit,
    ) -> Result<IssueFunding> {
        let time = SafeTimeProvider::new(TimeSource::System);
        self.fund_issue(subject, acting_user, issue, credit_amount, &time)
    }

    /// ask for `issue` to be funded up to `requested_amount`
    pub fn request_issue_funding(
        &self,
        subject: Subject,
        acting_user: UserId,
        issue: &GithubIssueId,
        requested_amount: Credit,
        time_provider: &SafeTimeProvider,
    ) -> Result<ManagedIssue> {
        if !requested_amount.is_positive() {
            return Err(FundingError::InvalidAmount {
                amount: requested_amount.units(),
            });
        }

        let scope = self.ledger.scope(&subject)?;
        authorize_actor(&scope, acting_user)?;

        let github_issue = self
            .stores
            .issues
            .get_issue(issue)?
            .ok_or_else(|| FundingError::IssueNotFound { issue: issue.clone() })?;
        if let Some(closed_at) = github_issue.closed_at {
            return Err(FundingError::IssueClosed {
                issue: issue.clone(),
                closed_at,
            });
        }

        self.state_machine
            .request(acting_user, issue, requested_amount, time_provider)
    }

    /// request using system time
    pub fn request_issue_funding_now(
        &self,
        subject: Subject,
        acting_user: UserId,
        issue: &GithubIssueId,
        requested_amount: Credit,
    ) -> Result<ManagedIssue> {
        let time = SafeTimeProvider::new(TimeSource::System);
        self.request_issue_funding(subject, acting_user, issue, requested_amount, &time)
    }
}

/// the acting user must be the subject, or a member of it
fn authorize_actor(scope: &SubjectScope, acting_user: UserId) -> Result<()> {
    match scope.subject {
        Subject::User(user) if user == acting_user => Ok(()),
        Subject::User(_) => Err(FundingError::SubjectMismatch {
            acting: acting_user,
            subject: scope.subject,
        }),
        Subject::Company(company) => {
            if scope.includes(&acting_user) {
                Ok(())
            } else {
                Err(FundingError::NotCompanyMember {
                    user: acting_user,
                    company,
                })
            }
        }
    }
}
