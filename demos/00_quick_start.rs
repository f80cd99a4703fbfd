/// quick start - fund a github issue from a company balance
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use issue_funding_ledger::{
    Credit, Currency, EventStore, FundingAuthorizer, GithubIssueId, InMemoryStore, LedgerConfig,
    PlanPriceType, PlanProductType, PriceCatalog, SafeTimeProvider, Stores, Subject, TimeSource,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let time = SafeTimeProvider::new(TimeSource::Test(
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
    ));

    // collaborators are composed once and shared
    let store = Arc::new(InMemoryStore::new());
    let config = LedgerConfig::default();
    let events = Arc::new(EventStore::new());
    let authorizer = FundingAuthorizer::new(&config, Stores::in_memory(store.clone()), events.clone());

    let maintainer = store.add_user();
    let alice = store.add_user();
    let company = Subject::Company(store.add_company(&[alice]));
    store.add_manual_invoice(company, Credit::new(1_000), true, time.now());

    let issue = GithubIssueId::new("acme", "widgets", 42);
    store.add_issue(issue.clone(), "crash on empty input");

    authorizer.request_issue_funding(
        Subject::User(maintainer),
        maintainer,
        &issue,
        Credit::new(600),
        &time,
    )?;
    authorizer.fund_issue(company, alice, &issue, Credit::new(400), &time)?;

    let summary = authorizer.ledger().issue_funding_summary(&issue)?;
    println!("{}: funded {} of {:?}", issue, summary.funded, summary.requested);
    println!("company balance: {}", authorizer.ledger().get_available_credit(&company, &time)?);

    let catalog = PriceCatalog::from_config(&config)?;
    for currency in Currency::ALL {
        let quote = catalog.plan_price(PlanProductType::StartUp, PlanPriceType::Monthly, currency)?;
        println!("start-up plan, monthly: {} {}", quote.amount, quote.currency);
    }

    for event in events.take_events() {
        println!("{:?}", event);
    }

    Ok(())
}
