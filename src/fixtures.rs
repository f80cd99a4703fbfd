//! shared test fixtures
use chrono::{DateTime, TimeZone, Utc};
use hourglass_rs::{SafeTimeProvider, TimeSource};
use std::sync::Arc;
use uuid::Uuid;

use crate::amount::Credit;
use crate::config::LedgerConfig;
use crate::events::EventStore;
use crate::funding::FundingAuthorizer;
use crate::ledger::CreditLedger;
use crate::state::{ManagedIssue, ManagedIssueState};
use crate::store::{InMemoryStore, IssueFunding, IssueFundingStore, ManagedIssueStore, Stores};
use crate::types::{
    GithubIssueId, PriceType, ProductType, StripeCustomerId, StripeInvoiceId, StripePriceId,
    StripeProductId, Subject, UserId,
};

pub(crate) fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

fn product_id(product_type: ProductType) -> StripeProductId {
    StripeProductId::new(format!("prod_{:?}", product_type).to_lowercase())
}

fn price_id(price_type: PriceType) -> StripePriceId {
    StripePriceId::new(format!("price_{:?}", price_type).to_lowercase())
}

pub(crate) struct Fixture {
    pub store: Arc<InMemoryStore>,
    pub stores: Stores,
    pub events: Arc<EventStore>,
    pub config: LedgerConfig,
    pub time: SafeTimeProvider,
}

impl Fixture {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        for product_type in ProductType::ALL {
            store.add_product(product_id(product_type), product_type);
        }
        for price_type in [PriceType::OneTime, PriceType::Monthly, PriceType::Annually] {
            store.add_price(price_id(price_type), price_type);
        }

        Self {
            stores: Stores::in_memory(store.clone()),
            store,
            events: Arc::new(EventStore::new()),
            config: LedgerConfig::default(),
            time: SafeTimeProvider::new(TimeSource::Test(t0())),
        }
    }

    pub fn ledger(&self) -> CreditLedger {
        CreditLedger::new(
            self.stores.clone(),
            self.config.plan_credits.clone(),
            self.events.clone(),
        )
    }

    pub fn authorizer(&self) -> FundingAuthorizer {
        FundingAuthorizer::new(&self.config, self.stores.clone(), self.events.clone())
    }

    pub fn pay_manual(&self, owner: Subject, amount: i64) {
        self.store
            .add_manual_invoice(owner, Credit::new(amount), true, self.time.now());
    }

    /// a paid stripe invoice with a single line, bought by a fresh customer of `owner`
    pub fn buy(
        &self,
        owner: Subject,
        product_type: ProductType,
        price_type: PriceType,
        quantity: u64,
        at: DateTime<Utc>,
    ) {
        let customer = StripeCustomerId::new(format!("cus_{}", Uuid::new_v4().simple()));
        self.store.link_customer(customer.clone(), owner);
        self.store.add_stripe_invoice(
            StripeInvoiceId::new(format!("in_{}", Uuid::new_v4().simple())),
            customer,
            true,
            at,
            &[(product_id(product_type), price_id(price_type), quantity)],
        );
    }

    /// a github issue known to the lookup, without a managed record
    pub fn issue(&self, number: u64) -> GithubIssueId {
        let id = GithubIssueId::new("acme", "widgets", number);
        self.store.add_issue(id.clone(), format!("issue {}", number));
        id
    }

    pub fn manage(&self, issue: &GithubIssueId, manager: UserId, requested: i64) -> ManagedIssue {
        self.store
            .create_if_absent(ManagedIssue::open(
                issue.clone(),
                manager,
                Credit::new(requested),
                self.time.now(),
            ))
            .unwrap()
    }

    pub fn set_state(&self, issue: &GithubIssueId, state: ManagedIssueState) {
        let mut managed = ManagedIssueStore::get(self.store.as_ref(), issue).unwrap().unwrap();
        let expected = managed.state;
        managed.transition(state, self.time.now()).unwrap();
        assert!(self.store.update(&managed, expected).unwrap());
    }

    /// write a commitment directly, bypassing authorization
    pub fn commit(&self, user: UserId, issue: &GithubIssueId, amount: i64) {
        self.store
            .insert(&IssueFunding {
                id: Uuid::new_v4(),
                github_issue_id: issue.clone(),
                user_id: user,
                credit_amount: Credit::new(amount),
                created_at: self.time.now(),
            })
            .unwrap();
    }
}
