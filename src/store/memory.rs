use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::{
    CompanyMembershipResolver, FundingSourceStore, GithubIssue, IssueFunding, IssueFundingStore,
    IssueLookup, ManagedIssueStore, ManualInvoice, PaidStripeLine, PlanLine, StripeInvoiceLine,
    UserDirectory,
};
use crate::amount::Credit;
use crate::errors::{StoreError, StoreResult};
use crate::state::{ManagedIssue, ManagedIssueState};
use crate::types::{
    CompanyId, GithubIssueId, PriceType, ProductType, StripeCustomerId, StripeInvoiceId,
    StripePriceId, StripeProductId, Subject, UserId,
};

#[derive(Debug, Clone)]
struct StripeInvoice {
    id: StripeInvoiceId,
    customer: StripeCustomerId,
    paid: bool,
    created_at: DateTime<Utc>,
    lines: Vec<(StripeInvoiceLine, u64)>,
}

#[derive(Debug, Default)]
struct Inner {
    users: HashSet<UserId>,
    companies: HashMap<CompanyId, Vec<UserId>>,
    customers: HashMap<StripeCustomerId, Subject>,
    products: HashMap<StripeProductId, ProductType>,
    prices: HashMap<StripePriceId, PriceType>,
    manual_invoices: Vec<ManualInvoice>,
    stripe_invoices: Vec<StripeInvoice>,
    managed_issues: HashMap<GithubIssueId, ManagedIssue>,
    issue_fundings: Vec<IssueFunding>,
    issues: HashMap<GithubIssueId, GithubIssue>,
    next_sequence: u64,
    outage: Option<String>,
}

/// in-memory implementation of every persistence collaborator
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl Inner {
    fn join(&mut self, company: CompanyId, user: UserId) {
        for (id, members) in self.companies.iter_mut() {
            if *id != company {
                members.retain(|m| *m != user);
            }
        }
        let members = self.companies.entry(company).or_default();
        if !members.contains(&user) {
            members.push(user);
        }
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Inner>> {
        let inner = self.inner.lock().map_err(|_| StoreError::Poisoned {
            resource: "in-memory store".to_string(),
        })?;
        if let Some(message) = &inner.outage {
            return Err(StoreError::Backend {
                message: message.clone(),
            });
        }
        Ok(inner)
    }

    fn seed(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// make every subsequent read and write fail until `recover`
    pub fn simulate_outage(&self, message: impl Into<String>) {
        self.seed().outage = Some(message.into());
    }

    pub fn recover(&self) {
        self.seed().outage = None;
    }

    pub fn add_user(&self) -> UserId {
        let user = UserId::new();
        self.seed().users.insert(user);
        user
    }

    pub fn add_company(&self, members: &[UserId]) -> CompanyId {
        let company = CompanyId::new();
        let mut inner = self.seed();
        inner.companies.insert(company, Vec::new());
        for member in members {
            inner.join(company, *member);
        }
        company
    }

    /// move `user` into `company`, leaving any previous company
    pub fn add_member(&self, company: CompanyId, user: UserId) {
        self.seed().join(company, user);
    }

    pub fn remove_member(&self, company: CompanyId, user: UserId) {
        if let Some(members) = self.seed().companies.get_mut(&company) {
            members.retain(|m| *m != user);
        }
    }

    /// record which subject owns a stripe customer
    pub fn link_customer(&self, customer: StripeCustomerId, owner: Subject) {
        self.seed().customers.insert(customer, owner);
    }

    pub fn add_product(&self, product: StripeProductId, product_type: ProductType) {
        self.seed().products.insert(product, product_type);
    }

    pub fn add_price(&self, price: StripePriceId, price_type: PriceType) {
        self.seed().prices.insert(price, price_type);
    }

    pub fn add_manual_invoice(
        &self,
        owner: Subject,
        credit_amount: Credit,
        paid: bool,
        created_at: DateTime<Utc>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        self.seed().manual_invoices.push(ManualInvoice {
            id,
            owner,
            paid,
            credit_amount,
            created_at,
        });
        id
    }

    /// add a stripe invoice; `lines` are `(product, price, quantity)`
    pub fn add_stripe_invoice(
        &self,
        id: StripeInvoiceId,
        customer: StripeCustomerId,
        paid: bool,
        created_at: DateTime<Utc>,
        lines: &[(StripeProductId, StripePriceId, u64)],
    ) {
        let mut inner = self.seed();
        let mut stored = Vec::with_capacity(lines.len());
        for (product_id, price_id, quantity) in lines {
            inner.next_sequence += 1;
            stored.push((
                StripeInvoiceLine {
                    stripe_invoice_id: id.clone(),
                    stripe_customer_id: customer.clone(),
                    product_id: product_id.clone(),
                    price_id: price_id.clone(),
                    quantity: *quantity,
                },
                inner.next_sequence,
            ));
        }
        inner.stripe_invoices.push(StripeInvoice {
            id,
            customer,
            paid,
            created_at,
            lines: stored,
        });
    }

    pub fn mark_invoice_paid(&self, id: &StripeInvoiceId) {
        if let Some(invoice) = self.seed().stripe_invoices.iter_mut().find(|i| &i.id == id) {
            invoice.paid = true;
        }
    }

    pub fn add_issue(&self, id: GithubIssueId, title: impl Into<String>) {
        let issue = GithubIssue {
            id: id.clone(),
            title: title.into(),
            closed_at: None,
        };
        self.seed().issues.insert(id, issue);
    }

    pub fn close_issue(&self, id: &GithubIssueId, closed_at: DateTime<Utc>) {
        if let Some(issue) = self.seed().issues.get_mut(id) {
            issue.closed_at = Some(closed_at);
        }
    }

    pub fn issue_funding_count(&self) -> usize {
        self.seed().issue_fundings.len()
    }
}

impl Inner {
    fn paid_lines(&self, subject: &Subject) -> StoreResult<Vec<PaidStripeLine>> {
        let mut lines = Vec::new();
        for invoice in self.stripe_invoices.iter().filter(|i| i.paid) {
            if self.customers.get(&invoice.customer) != Some(subject) {
                continue;
            }
            for (line, sequence) in &invoice.lines {
                let product_type = *self.products.get(&line.product_id).ok_or_else(|| {
                    StoreError::NotFound {
                        entity: format!("product {}", line.product_id),
                    }
                })?;
                let price_type = *self.prices.get(&line.price_id).ok_or_else(|| {
                    StoreError::NotFound {
                        entity: format!("price {}", line.price_id),
                    }
                })?;
                lines.push(PaidStripeLine {
                    line: line.clone(),
                    product_type,
                    price_type,
                    created_at: invoice.created_at,
                    sequence: *sequence,
                });
            }
        }
        Ok(lines)
    }
}

impl FundingSourceStore for InMemoryStore {
    fn get_paid_manual_invoices(&self, subject: &Subject) -> StoreResult<Vec<ManualInvoice>> {
        let inner = self.lock()?;
        Ok(inner
            .manual_invoices
            .iter()
            .filter(|i| i.paid && &i.owner == subject)
            .cloned()
            .collect())
    }

    fn get_paid_stripe_lines(&self, subject: &Subject) -> StoreResult<Vec<PaidStripeLine>> {
        self.lock()?.paid_lines(subject)
    }

    fn get_most_recent_plan_line(&self, subject: &Subject) -> StoreResult<Option<PlanLine>> {
        let lines = self.lock()?.paid_lines(subject)?;
        Ok(lines
            .iter()
            .filter(|l| l.product_type.is_plan() && l.price_type.plan().is_some())
            .max_by_key(|l| (l.created_at, l.sequence))
            .map(PlanLine::from))
    }
}

impl CompanyMembershipResolver for InMemoryStore {
    fn members_of(&self, company: &CompanyId) -> StoreResult<Option<Vec<UserId>>> {
        Ok(self.lock()?.companies.get(company).cloned())
    }

    fn company_of(&self, user: &UserId) -> StoreResult<Option<CompanyId>> {
        Ok(self
            .lock()?
            .companies
            .iter()
            .find(|(_, members)| members.contains(user))
            .map(|(company, _)| *company))
    }
}

impl UserDirectory for InMemoryStore {
    fn user_exists(&self, user: &UserId) -> StoreResult<bool> {
        Ok(self.lock()?.users.contains(user))
    }
}

impl ManagedIssueStore for InMemoryStore {
    fn get(&self, issue: &GithubIssueId) -> StoreResult<Option<ManagedIssue>> {
        Ok(self.lock()?.managed_issues.get(issue).cloned())
    }

    fn create_if_absent(&self, managed: ManagedIssue) -> StoreResult<ManagedIssue> {
        let mut inner = self.lock()?;
        Ok(inner
            .managed_issues
            .entry(managed.github_issue_id.clone())
            .or_insert(managed)
            .clone())
    }

    fn update(&self, managed: &ManagedIssue, expected: ManagedIssueState) -> StoreResult<bool> {
        let mut inner = self.lock()?;
        match inner.managed_issues.get_mut(&managed.github_issue_id) {
            Some(stored) if stored.id == managed.id && stored.state == expected => {
                *stored = managed.clone();
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(StoreError::NotFound {
                entity: format!("managed issue {}", managed.github_issue_id),
            }),
        }
    }
}

impl IssueFundingStore for InMemoryStore {
    fn insert(&self, funding: &IssueFunding) -> StoreResult<()> {
        self.lock()?.issue_fundings.push(funding.clone());
        Ok(())
    }

    fn get_by_user(&self, user: &UserId) -> StoreResult<Vec<IssueFunding>> {
        let inner = self.lock()?;
        Ok(inner
            .issue_fundings
            .iter()
            .filter(|f| &f.user_id == user)
            .cloned()
            .collect())
    }

    fn get_by_issue(&self, issue: &GithubIssueId) -> StoreResult<Vec<IssueFunding>> {
        let inner = self.lock()?;
        Ok(inner
            .issue_fundings
            .iter()
            .filter(|f| &f.github_issue_id == issue)
            .cloned()
            .collect())
    }
}

impl IssueLookup for InMemoryStore {
    fn get_issue(&self, issue: &GithubIssueId) -> StoreResult<Option<GithubIssue>> {
        Ok(self.lock()?.issues.get(issue).cloned())
    }
}
