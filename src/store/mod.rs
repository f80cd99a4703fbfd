//! Persistence collaborators.
//!
//! The ledger and the funding services only ever talk to storage through
//! these traits. They are composed once into [`Stores`] and handed to the
//! services; [`memory::InMemoryStore`] implements all of them.

pub mod memory;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::amount::Credit;
use crate::errors::StoreResult;
use crate::state::{ManagedIssue, ManagedIssueState};
use crate::types::{
    CompanyId, GithubIssueId, PriceType, ProductType, StripeCustomerId, StripeInvoiceId,
    StripePriceId, StripeProductId, Subject, UserId,
};

pub use memory::InMemoryStore;

/// manually entered invoice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualInvoice {
    pub id: Uuid,
    pub owner: Subject,
    pub paid: bool,
    /// signed, corrections may be negative
    pub credit_amount: Credit,
    pub created_at: DateTime<Utc>,
}

/// one line of a stripe invoice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StripeInvoiceLine {
    pub stripe_invoice_id: StripeInvoiceId,
    pub stripe_customer_id: StripeCustomerId,
    pub product_id: StripeProductId,
    pub price_id: StripePriceId,
    pub quantity: u64,
}

/// a line of a paid stripe invoice, annotated with its catalog types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaidStripeLine {
    pub line: StripeInvoiceLine,
    pub product_type: ProductType,
    pub price_type: PriceType,
    pub created_at: DateTime<Utc>,
    /// insertion order, breaks ties between equal timestamps
    pub sequence: u64,
}

/// the most recent paid plan line of a subject
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanLine {
    pub product_type: ProductType,
    pub price_type: PriceType,
    pub created_at: DateTime<Utc>,
    pub sequence: u64,
}

impl From<&PaidStripeLine> for PlanLine {
    fn from(line: &PaidStripeLine) -> Self {
        Self {
            product_type: line.product_type,
            price_type: line.price_type,
            created_at: line.created_at,
            sequence: line.sequence,
        }
    }
}

/// a commitment of credit to an issue, immutable once written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueFunding {
    pub id: Uuid,
    pub github_issue_id: GithubIssueId,
    /// the user who spent it, even when drawn from a company balance
    pub user_id: UserId,
    pub credit_amount: Credit,
    pub created_at: DateTime<Utc>,
}

/// github issue as seen by the sync collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GithubIssue {
    pub id: GithubIssueId,
    pub title: String,
    pub closed_at: Option<DateTime<Utc>>,
}

/// paid funding sources of a subject
pub trait FundingSourceStore: Send + Sync {
    /// paid manual invoices owned directly by `subject`
    fn get_paid_manual_invoices(&self, subject: &Subject) -> StoreResult<Vec<ManualInvoice>>;

    /// lines of paid stripe invoices whose customer belongs to `subject`
    fn get_paid_stripe_lines(&self, subject: &Subject) -> StoreResult<Vec<PaidStripeLine>>;

    /// latest paid recurring plan line, by `(created_at, sequence)`
    ///
    /// A line counts only when its product is a plan and its price is
    /// monthly or annual; one-off plan purchases are skipped here.
    fn get_most_recent_plan_line(&self, subject: &Subject) -> StoreResult<Option<PlanLine>>;
}

/// company membership
pub trait CompanyMembershipResolver: Send + Sync {
    /// current members, `None` if the company does not exist
    fn members_of(&self, company: &CompanyId) -> StoreResult<Option<Vec<UserId>>>;

    /// the company `user` currently belongs to; a user has at most one
    fn company_of(&self, user: &UserId) -> StoreResult<Option<CompanyId>>;
}

pub trait UserDirectory: Send + Sync {
    fn user_exists(&self, user: &UserId) -> StoreResult<bool>;
}

/// managed issues keyed by github issue
pub trait ManagedIssueStore: Send + Sync {
    fn get(&self, issue: &GithubIssueId) -> StoreResult<Option<ManagedIssue>>;

    /// insert unless a record already exists; returns whichever record is stored
    fn create_if_absent(&self, managed: ManagedIssue) -> StoreResult<ManagedIssue>;

    /// replace the record if its stored state is still `expected`
    fn update(&self, managed: &ManagedIssue, expected: ManagedIssueState) -> StoreResult<bool>;
}

/// append-only issue funding records
pub trait IssueFundingStore: Send + Sync {
    fn insert(&self, funding: &IssueFunding) -> StoreResult<()>;

    fn get_by_user(&self, user: &UserId) -> StoreResult<Vec<IssueFunding>>;

    fn get_by_issue(&self, issue: &GithubIssueId) -> StoreResult<Vec<IssueFunding>>;
}

pub trait IssueLookup: Send + Sync {
    fn get_issue(&self, issue: &GithubIssueId) -> StoreResult<Option<GithubIssue>>;
}

/// the collaborators, composed once and shared by every service
#[derive(Clone)]
pub struct Stores {
    pub funding_sources: Arc<dyn FundingSourceStore>,
    pub memberships: Arc<dyn CompanyMembershipResolver>,
    pub users: Arc<dyn UserDirectory>,
    pub managed_issues: Arc<dyn ManagedIssueStore>,
    pub issue_fundings: Arc<dyn IssueFundingStore>,
    pub issues: Arc<dyn IssueLookup>,
}

impl Stores {
    /// back every collaborator with the same in-memory store
    pub fn in_memory(store: Arc<InMemoryStore>) -> Self {
        Self {
            funding_sources: store.clone(),
            memberships: store.clone(),
            users: store.clone(),
            managed_issues: store.clone(),
            issue_fundings: store.clone(),
            issues: store,
        }
    }
}
