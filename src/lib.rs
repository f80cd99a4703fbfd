pub mod amount;
pub mod config;
pub mod currency;
pub mod errors;
pub mod events;
pub mod funding;
pub mod ledger;
pub mod pricing;
pub mod state;
pub mod store;
pub mod types;

#[cfg(test)]
pub(crate) mod fixtures;

// re-export key types
pub use amount::Credit;
pub use config::{ExchangeConfig, LedgerConfig, PlanCreditTable, PlanPriceTable};
pub use currency::{Currency, CurrencyConverter};
pub use errors::{FundingError, Inconsistency, Result, StoreError, StoreResult};
pub use events::{Event, EventStore};
pub use funding::{FundingAuthorizer, ManagedIssueStateMachine, SubjectLocks};
pub use ledger::{CreditBreakdown, CreditLedger, CurrentPlan, IssueFundingSummary, SubjectScope};
pub use pricing::{PriceCatalog, Quote};
pub use state::{ManagedIssue, ManagedIssueState};
pub use store::{
    CompanyMembershipResolver, FundingSourceStore, GithubIssue, InMemoryStore, IssueFunding,
    IssueFundingStore, IssueLookup, ManagedIssueStore, ManualInvoice, PaidStripeLine, PlanLine,
    StripeInvoiceLine, Stores, UserDirectory,
};
pub use types::{
    CompanyId, ContributorVisibility, GithubIssueId, PlanPriceType, PlanProductType, PriceType,
    ProductType, StripeCustomerId, StripeInvoiceId, StripePriceId, StripeProductId, Subject,
    UserId,
};

// re-export external dependencies that users will need
pub use chrono;
pub use hourglass_rs::{SafeTimeProvider, TimeSource};
pub use rust_decimal::Decimal;
pub use uuid::Uuid;
