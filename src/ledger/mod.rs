//! Credit ledger.
//!
//! A subject's available credit is everything it has paid for (manual
//! invoices, credit purchases, plan allotments) minus what its users have
//! committed to issues that were not rejected. Nothing is cached: every
//! query recomputes from the append-only records.

pub mod plan;

use chrono::{DateTime, Utc};
use hourglass_rs::{SafeTimeProvider, TimeSource};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error};

use crate::amount::Credit;
use crate::config::PlanCreditTable;
use crate::errors::{FundingError, Inconsistency, Result};
use crate::events::{Event, EventStore};
use crate::state::ManagedIssueState;
use crate::store::{IssueFunding, Stores};
use crate::types::{CompanyId, GithubIssueId, Subject, UserId};

pub use plan::{select_current_plan, CurrentPlan};

/// the records a subject's balance is computed over
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectScope {
    pub subject: Subject,
    /// the balance the subject draws from: its company for a member, itself otherwise
    pub pool: Subject,
    /// owners whose paid sources count
    pub owners: Vec<Subject>,
    /// users whose commitments count
    pub spenders: Vec<UserId>,
}

impl SubjectScope {
    pub fn includes(&self, user: &UserId) -> bool {
        self.spenders.contains(user)
    }
}

/// balance components of a subject
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditBreakdown {
    pub subject: Subject,
    pub manual: Credit,
    pub stripe: Credit,
    pub committed: Credit,
    pub available: Credit,
}

impl CreditBreakdown {
    pub fn paid(&self) -> Credit {
        self.manual + self.stripe
    }
}

/// funding collected by one issue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueFundingSummary {
    pub github_issue_id: GithubIssueId,
    /// total of commitments that still count
    pub funded: Credit,
    pub contributions: usize,
    pub requested: Option<Credit>,
    pub state: Option<ManagedIssueState>,
}

pub struct CreditLedger {
    stores: Stores,
    plan_credits: PlanCreditTable,
    events: Arc<EventStore>,
}

impl CreditLedger {
    pub fn new(stores: Stores, plan_credits: PlanCreditTable, events: Arc<EventStore>) -> Self {
        Self {
            stores,
            plan_credits,
            events,
        }
    }

    /// resolve who a subject's balance covers
    ///
    /// A company pools its own sources with those of its current members
    /// and is charged for every member's commitments. A user who belongs
    /// to a company draws from that same pool, so every paid credit sits
    /// in exactly one balance.
    pub fn scope(&self, subject: &Subject) -> Result<SubjectScope> {
        match subject {
            Subject::User(user) => {
                if !self.stores.users.user_exists(user)? {
                    return Err(FundingError::SubjectNotFound { subject: *subject });
                }
                match self.stores.memberships.company_of(user)? {
                    Some(company) => self.company_scope(*subject, company),
                    None => Ok(SubjectScope {
                        subject: *subject,
                        pool: *subject,
                        owners: vec![*subject],
                        spenders: vec![*user],
                    }),
                }
            }
            Subject::Company(company) => self.company_scope(*subject, *company),
        }
    }

    fn company_scope(&self, subject: Subject, company: CompanyId) -> Result<SubjectScope> {
        let pool = Subject::Company(company);
        let mut members = self
            .stores
            .memberships
            .members_of(&company)?
            .ok_or(FundingError::SubjectNotFound { subject: pool })?;
        members.sort();
        members.dedup();

        let mut owners = Vec::with_capacity(members.len() + 1);
        owners.push(pool);
        owners.extend(members.iter().map(|m| Subject::User(*m)));

        Ok(SubjectScope {
            subject,
            pool,
            owners,
            spenders: members,
        })
    }

    /// paid sources minus counted commitments
    pub fn get_available_credit(
        &self,
        subject: &Subject,
        time_provider: &SafeTimeProvider,
    ) -> Result<Credit> {
        Ok(self.breakdown(subject, time_provider)?.available)
    }

    /// available credit using system time
    pub fn get_available_credit_now(&self, subject: &Subject) -> Result<Credit> {
        let time = SafeTimeProvider::new(TimeSource::System);
        self.get_available_credit(subject, &time)
    }

    pub fn breakdown(
        &self,
        subject: &Subject,
        time_provider: &SafeTimeProvider,
    ) -> Result<CreditBreakdown> {
        let scope = self.scope(subject)?;
        self.breakdown_in_scope(&scope, time_provider.now())
    }

    /// compute the balance of an already resolved scope
    pub(crate) fn breakdown_in_scope(
        &self,
        scope: &SubjectScope,
        observed_at: DateTime<Utc>,
    ) -> Result<CreditBreakdown> {
        let overflow = || {
            error!(subject = %scope.subject, "credit totals overflow");
            FundingError::LedgerInconsistent {
                subject: scope.subject,
                kind: Inconsistency::Overflow,
            }
        };

        let mut manual = Credit::ZERO;
        let mut stripe = Credit::ZERO;

        for owner in &scope.owners {
            let invoices = self.stores.funding_sources.get_paid_manual_invoices(owner)?;
            let owned = Credit::checked_sum(
                invoices
                    .iter()
                    .filter(|invoice| invoice.paid)
                    .map(|invoice| invoice.credit_amount),
            )
            .ok_or_else(&overflow)?;
            manual = manual.checked_add(owned).ok_or_else(&overflow)?;

            let mut owned = Credit::ZERO;
            for l in self.stores.funding_sources.get_paid_stripe_lines(owner)? {
                let credit = self
                    .plan_credits
                    .credit_equivalent(l.product_type, l.line.quantity)
                    .ok_or_else(&overflow)?;
                owned = owned.checked_add(credit).ok_or_else(&overflow)?;
            }
            stripe = stripe.checked_add(owned).ok_or_else(&overflow)?;
        }

        let mut fundings = Vec::new();
        for user in &scope.spenders {
            fundings.extend(self.stores.issue_fundings.get_by_user(user)?);
        }
        let committed = self.counted_total(&fundings)?.ok_or_else(&overflow)?;

        let available = manual
            .checked_add(stripe)
            .and_then(|paid| paid.checked_sub(committed))
            .ok_or_else(&overflow)?;

        let breakdown = CreditBreakdown {
            subject: scope.subject,
            manual,
            stripe,
            committed,
            available,
        };

        debug!(
            subject = %scope.subject,
            pool = %scope.pool,
            manual = manual.units(),
            stripe = stripe.units(),
            committed = committed.units(),
            available = available.units(),
            "computed available credit"
        );

        if available.is_negative() {
            error!(
                subject = %scope.subject,
                available = available.units(),
                paid = breakdown.paid().units(),
                committed = committed.units(),
                "negative available credit, commitments exceed paid sources"
            );
            self.events.emit(Event::NegativeBalanceDetected {
                subject: scope.subject,
                available,
                paid: breakdown.paid(),
                committed,
                timestamp: observed_at,
            });
        }

        Ok(breakdown)
    }

    /// sum commitments whose issue was not rejected, `None` on overflow
    fn counted_total(&self, fundings: &[IssueFunding]) -> Result<Option<Credit>> {
        let mut counts: HashMap<&GithubIssueId, bool> = HashMap::new();
        let mut counted_amounts = Vec::with_capacity(fundings.len());

        for funding in fundings {
            let counted = match counts.get(&funding.github_issue_id) {
                Some(counted) => *counted,
                None => {
                    let counted = self
                        .stores
                        .managed_issues
                        .get(&funding.github_issue_id)?
                        .map_or(true, |m| m.state.counts_commitments());
                    counts.insert(&funding.github_issue_id, counted);
                    counted
                }
            };
            if counted {
                counted_amounts.push(funding.credit_amount);
            }
        }

        Ok(Credit::checked_sum(counted_amounts))
    }

    /// the subject's current plan, if any
    pub fn get_plan(&self, subject: &Subject) -> Result<Option<CurrentPlan>> {
        let scope = self.scope(subject)?;

        let mut candidates = Vec::with_capacity(scope.owners.len());
        for owner in &scope.owners {
            if let Some(line) = self.stores.funding_sources.get_most_recent_plan_line(owner)? {
                candidates.push(line);
            }
        }

        let plan = select_current_plan(candidates);
        debug!(subject = %subject, plan = ?plan, "resolved current plan");
        Ok(plan)
    }

    /// what has been committed to and requested for one issue
    pub fn issue_funding_summary(&self, issue: &GithubIssueId) -> Result<IssueFundingSummary> {
        let managed = self.stores.managed_issues.get(issue)?;
        let fundings = self.stores.issue_fundings.get_by_issue(issue)?;
        let counted = managed
            .as_ref()
            .map_or(true, |m| m.state.counts_commitments());

        // reporting only, so this total saturates instead of failing
        let funded = if counted {
            fundings.iter().map(|f| f.credit_amount).sum()
        } else {
            Credit::ZERO
        };

        Ok(IssueFundingSummary {
            github_issue_id: issue.clone(),
            funded,
            contributions: fundings.len(),
            requested: managed.as_ref().and_then(|m| m.requested_credit_amount),
            state: managed.map(|m| m.state),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{t0, Fixture};
    use crate::types::{CompanyId, PlanPriceType, PlanProductType, PriceType, ProductType};
    use chrono::Duration;

    #[test]
    fn test_scenario_rejection_restores_commitments() {
        let fx = Fixture::new();
        let ledger = fx.ledger();
        let user = fx.store.add_user();
        let subject = Subject::User(user);
        let issue = fx.issue(1);

        fx.pay_manual(subject, 200);
        fx.manage(&issue, user, 100);
        fx.commit(user, &issue, 50);
        fx.commit(user, &issue, 20);
        assert_eq!(ledger.get_available_credit(&subject, &fx.time).unwrap(), Credit::new(130));

        fx.set_state(&issue, ManagedIssueState::Rejected);
        assert_eq!(ledger.get_available_credit(&subject, &fx.time).unwrap(), Credit::new(200));
    }

    #[test]
    fn test_commitments_without_managed_issue_count() {
        let fx = Fixture::new();
        let user = fx.store.add_user();
        let subject = Subject::User(user);
        fx.pay_manual(subject, 100);
        fx.commit(user, &fx.issue(2), 40);

        assert_eq!(fx.ledger().get_available_credit(&subject, &fx.time).unwrap(), Credit::new(60));
    }

    #[test]
    fn test_solved_issue_commitments_still_count() {
        let fx = Fixture::new();
        let user = fx.store.add_user();
        let subject = Subject::User(user);
        let issue = fx.issue(3);
        fx.pay_manual(subject, 100);
        fx.manage(&issue, user, 100);
        fx.commit(user, &issue, 30);
        fx.set_state(&issue, ManagedIssueState::Solved);

        assert_eq!(fx.ledger().get_available_credit(&subject, &fx.time).unwrap(), Credit::new(70));
    }

    #[test]
    fn test_manual_invoice_additivity() {
        let fx = Fixture::new();
        let ledger = fx.ledger();
        let subject = Subject::User(fx.store.add_user());

        fx.pay_manual(subject, 120);
        let before = ledger.get_available_credit(&subject, &fx.time).unwrap();
        fx.pay_manual(subject, 75);
        let after = ledger.get_available_credit(&subject, &fx.time).unwrap();
        assert_eq!(after - before, Credit::new(75));

        // unpaid invoices never count
        fx.store
            .add_manual_invoice(subject, Credit::new(1_000), false, fx.time.now());
        assert_eq!(ledger.get_available_credit(&subject, &fx.time).unwrap(), after);
    }

    #[test]
    fn test_stripe_credit_equivalents() {
        let fx = Fixture::new();
        let subject = Subject::User(fx.store.add_user());

        fx.buy(subject, ProductType::EnterprisePlan, PriceType::Monthly, 1, t0());
        let breakdown = fx.ledger().breakdown(&subject, &fx.time).unwrap();
        assert_eq!(breakdown.stripe, Credit::new(5_000));

        fx.buy(subject, ProductType::Credit, PriceType::OneTime, 42, t0());
        fx.buy(subject, ProductType::Donation, PriceType::OneTime, 9_999, t0());
        let breakdown = fx.ledger().breakdown(&subject, &fx.time).unwrap();
        assert_eq!(breakdown.stripe, Credit::new(5_042));
        assert_eq!(breakdown.manual, Credit::ZERO);
        assert_eq!(breakdown.available, Credit::new(5_042));
    }

    #[test]
    fn test_ledger_is_sum_of_sources_minus_commitments() {
        let fx = Fixture::new();
        let user = fx.store.add_user();
        let subject = Subject::User(user);
        let kept = fx.issue(10);
        let rejected = fx.issue(11);

        fx.pay_manual(subject, 300);
        fx.buy(subject, ProductType::IndividualPlan, PriceType::Annually, 1, t0());
        fx.buy(subject, ProductType::Credit, PriceType::OneTime, 25, t0());
        fx.manage(&rejected, user, 10);
        fx.commit(user, &kept, 100);
        fx.commit(user, &rejected, 60);
        fx.set_state(&rejected, ManagedIssueState::Rejected);

        let breakdown = fx.ledger().breakdown(&subject, &fx.time).unwrap();
        assert_eq!(breakdown.manual, Credit::new(300));
        assert_eq!(breakdown.stripe, Credit::new(525));
        assert_eq!(breakdown.committed, Credit::new(100));
        assert_eq!(breakdown.available, Credit::new(725));
    }

    #[test]
    fn test_company_pools_members() {
        let fx = Fixture::new();
        let alice = fx.store.add_user();
        let bob = fx.store.add_user();
        let outsider = fx.store.add_user();
        let company = fx.store.add_company(&[alice, bob]);
        let subject = Subject::Company(company);
        let issue = fx.issue(20);

        fx.pay_manual(subject, 1_000);
        fx.buy(Subject::User(alice), ProductType::Credit, PriceType::OneTime, 50, t0());
        fx.pay_manual(Subject::User(outsider), 777);
        fx.commit(alice, &issue, 100);
        fx.commit(bob, &issue, 200);
        fx.commit(outsider, &issue, 300);

        let breakdown = fx.ledger().breakdown(&subject, &fx.time).unwrap();
        assert_eq!(breakdown.manual, Credit::new(1_000));
        assert_eq!(breakdown.stripe, Credit::new(50));
        assert_eq!(breakdown.committed, Credit::new(300));
        assert_eq!(breakdown.available, Credit::new(750));
    }

    #[test]
    fn test_member_draws_from_company_pool() {
        let fx = Fixture::new();
        let ledger = fx.ledger();
        let alice = fx.store.add_user();
        let bob = fx.store.add_user();
        let company = fx.store.add_company(&[alice, bob]);
        let issue = fx.issue(21);

        fx.pay_manual(Subject::User(alice), 100);
        fx.commit(bob, &issue, 100);

        // the paid credit exists once, whichever subject asks
        for subject in [Subject::User(alice), Subject::User(bob), Subject::Company(company)] {
            assert_eq!(ledger.get_available_credit(&subject, &fx.time).unwrap(), Credit::ZERO);
        }
        let scope = ledger.scope(&Subject::User(alice)).unwrap();
        assert_eq!(scope.subject, Subject::User(alice));
        assert_eq!(scope.pool, Subject::Company(company));

        // leaving the company takes the user's own records along
        fx.store.remove_member(company, alice);
        assert_eq!(
            ledger.get_available_credit(&Subject::User(alice), &fx.time).unwrap(),
            Credit::new(100)
        );
        assert_eq!(
            ledger.get_available_credit(&Subject::Company(company), &fx.time).unwrap(),
            Credit::new(-100)
        );
    }

    #[test]
    fn test_overflowing_totals_are_inconsistent() {
        let fx = Fixture::new();
        let subject = Subject::User(fx.store.add_user());
        fx.pay_manual(subject, i64::MAX);
        fx.pay_manual(subject, 1);

        assert!(matches!(
            fx.ledger().get_available_credit(&subject, &fx.time),
            Err(FundingError::LedgerInconsistent { kind: Inconsistency::Overflow, .. })
        ));
    }

    #[test]
    fn test_unknown_subjects_are_errors() {
        let fx = Fixture::new();
        let ledger = fx.ledger();

        assert!(matches!(
            ledger.get_available_credit(&Subject::User(UserId::new()), &fx.time),
            Err(FundingError::SubjectNotFound { .. })
        ));
        assert!(matches!(
            ledger.get_available_credit(&Subject::Company(CompanyId::new()), &fx.time),
            Err(FundingError::SubjectNotFound { .. })
        ));
        assert!(matches!(
            ledger.get_plan(&Subject::User(UserId::new())),
            Err(FundingError::SubjectNotFound { .. })
        ));
    }

    #[test]
    fn test_storage_failure_propagates() {
        let fx = Fixture::new();
        let subject = Subject::User(fx.store.add_user());
        fx.store.simulate_outage("connection refused");

        assert!(matches!(
            fx.ledger().get_available_credit(&subject, &fx.time),
            Err(FundingError::LedgerUnavailable { .. })
        ));
    }

    #[test]
    fn test_negative_balance_is_reported_not_clamped() {
        let fx = Fixture::new();
        let user = fx.store.add_user();
        let subject = Subject::User(user);
        fx.pay_manual(subject, 10);
        fx.commit(user, &fx.issue(30), 25);

        let available = fx.ledger().get_available_credit(&subject, &fx.time).unwrap();
        assert_eq!(available, Credit::new(-15));

        let events = fx.events.take_events();
        assert!(events.iter().any(|e| matches!(
            e,
            Event::NegativeBalanceDetected { available, committed, timestamp, .. }
                if *available == Credit::new(-15)
                    && *committed == Credit::new(25)
                    && *timestamp == t0()
        )));
    }

    #[test]
    fn test_plan_recency() {
        let fx = Fixture::new();
        let subject = Subject::User(fx.store.add_user());

        fx.buy(subject, ProductType::StartUpPlan, PriceType::Monthly, 1, t0());
        fx.buy(subject, ProductType::ScaleUpPlan, PriceType::Annually, 1, t0() + Duration::days(30));
        // a later donation or credit purchase is never a plan
        fx.buy(subject, ProductType::Donation, PriceType::Monthly, 1, t0() + Duration::days(60));
        fx.buy(subject, ProductType::Credit, PriceType::OneTime, 10, t0() + Duration::days(61));

        let plan = fx.ledger().get_plan(&subject).unwrap().unwrap();
        assert_eq!(plan.product_type, PlanProductType::ScaleUp);
        assert_eq!(plan.price_type, PlanPriceType::Annually);
    }

    #[test]
    fn test_plan_ties_resolved_by_insertion() {
        let fx = Fixture::new();
        let subject = Subject::User(fx.store.add_user());

        fx.buy(subject, ProductType::EnterprisePlan, PriceType::Monthly, 1, t0());
        fx.buy(subject, ProductType::IndividualPlan, PriceType::Monthly, 1, t0());

        let plan = fx.ledger().get_plan(&subject).unwrap().unwrap();
        assert_eq!(plan.product_type, PlanProductType::Individual);
    }

    #[test]
    fn test_one_off_plan_purchase_keeps_recurring_plan() {
        let fx = Fixture::new();
        let subject = Subject::User(fx.store.add_user());

        fx.buy(subject, ProductType::StartUpPlan, PriceType::Monthly, 1, t0());
        fx.buy(subject, ProductType::EnterprisePlan, PriceType::OneTime, 1, t0() + Duration::days(1));

        let plan = fx.ledger().get_plan(&subject).unwrap().unwrap();
        assert_eq!(plan.product_type, PlanProductType::StartUp);
        assert_eq!(plan.price_type, PlanPriceType::Monthly);
    }

    #[test]
    fn test_company_plan_from_members() {
        let fx = Fixture::new();
        let alice = fx.store.add_user();
        let bob = fx.store.add_user();
        let company = Subject::Company(fx.store.add_company(&[alice, bob]));

        assert_eq!(fx.ledger().get_plan(&company).unwrap(), None);

        fx.buy(Subject::User(alice), ProductType::StartUpPlan, PriceType::Monthly, 1, t0());
        fx.buy(Subject::User(bob), ProductType::EnterprisePlan, PriceType::Annually, 1, t0() + Duration::days(1));

        let plan = fx.ledger().get_plan(&company).unwrap().unwrap();
        assert_eq!(plan.product_type, PlanProductType::Enterprise);
    }

    #[test]
    fn test_issue_funding_summary() {
        let fx = Fixture::new();
        let ledger = fx.ledger();
        let user = fx.store.add_user();
        let issue = fx.issue(40);

        let empty = ledger.issue_funding_summary(&issue).unwrap();
        assert_eq!(empty.funded, Credit::ZERO);
        assert_eq!(empty.state, None);

        fx.manage(&issue, user, 500);
        fx.commit(user, &issue, 120);
        fx.commit(fx.store.add_user(), &issue, 80);

        let summary = ledger.issue_funding_summary(&issue).unwrap();
        assert_eq!(summary.funded, Credit::new(200));
        assert_eq!(summary.contributions, 2);
        assert_eq!(summary.requested, Some(Credit::new(500)));
        assert_eq!(summary.state, Some(ManagedIssueState::Open));

        fx.set_state(&issue, ManagedIssueState::Rejected);
        assert_eq!(ledger.issue_funding_summary(&issue).unwrap().funded, Credit::ZERO);
    }
}
