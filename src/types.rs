use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// unique identifier for a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new() -> Self {
        UserId(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "user:{}", self.0)
    }
}

/// unique identifier for a company
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompanyId(pub Uuid);

impl CompanyId {
    pub fn new() -> Self {
        CompanyId(Uuid::new_v4())
    }
}

impl Default for CompanyId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CompanyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "company:{}", self.0)
    }
}

/// the party a balance is computed for
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Subject {
    User(UserId),
    Company(CompanyId),
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::User(id) => id.fmt(f),
            Subject::Company(id) => id.fmt(f),
        }
    }
}

impl From<UserId> for Subject {
    fn from(id: UserId) -> Self {
        Subject::User(id)
    }
}

impl From<CompanyId> for Subject {
    fn from(id: CompanyId) -> Self {
        Subject::Company(id)
    }
}

/// github issue coordinates, unique per issue
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GithubIssueId {
    pub owner: String,
    pub repo: String,
    pub number: u64,
}

impl GithubIssueId {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>, number: u64) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            number,
        }
    }
}

impl fmt::Display for GithubIssueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.owner, self.repo, self.number)
    }
}

macro_rules! stripe_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

stripe_id!(
    /// stripe invoice id (`in_...`)
    StripeInvoiceId
);
stripe_id!(
    /// stripe customer id (`cus_...`)
    StripeCustomerId
);
stripe_id!(
    /// stripe product id (`prod_...`)
    StripeProductId
);
stripe_id!(
    /// stripe price id (`price_...`)
    StripePriceId
);

/// what a stripe product sells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductType {
    IndividualPlan,
    StartUpPlan,
    ScaleUpPlan,
    EnterprisePlan,
    /// one credit per unit of quantity
    Credit,
    /// never buys funding power
    Donation,
}

impl ProductType {
    pub const ALL: [ProductType; 6] = [
        ProductType::IndividualPlan,
        ProductType::StartUpPlan,
        ProductType::ScaleUpPlan,
        ProductType::EnterprisePlan,
        ProductType::Credit,
        ProductType::Donation,
    ];

    /// the plan this product represents, if it is a plan at all
    pub fn plan(&self) -> Option<PlanProductType> {
        match self {
            ProductType::IndividualPlan => Some(PlanProductType::Individual),
            ProductType::StartUpPlan => Some(PlanProductType::StartUp),
            ProductType::ScaleUpPlan => Some(PlanProductType::ScaleUp),
            ProductType::EnterprisePlan => Some(PlanProductType::Enterprise),
            ProductType::Credit | ProductType::Donation => None,
        }
    }

    pub fn is_plan(&self) -> bool {
        self.plan().is_some()
    }
}

/// recurring subscription products
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanProductType {
    Individual,
    StartUp,
    ScaleUp,
    Enterprise,
}

impl PlanProductType {
    pub const ALL: [PlanProductType; 4] = [
        PlanProductType::Individual,
        PlanProductType::StartUp,
        PlanProductType::ScaleUp,
        PlanProductType::Enterprise,
    ];
}

impl From<PlanProductType> for ProductType {
    fn from(plan: PlanProductType) -> Self {
        match plan {
            PlanProductType::Individual => ProductType::IndividualPlan,
            PlanProductType::StartUp => ProductType::StartUpPlan,
            PlanProductType::ScaleUp => ProductType::ScaleUpPlan,
            PlanProductType::Enterprise => ProductType::EnterprisePlan,
        }
    }
}

/// billing cadence of a stripe price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriceType {
    OneTime,
    Monthly,
    Annually,
}

impl PriceType {
    pub fn plan(&self) -> Option<PlanPriceType> {
        match self {
            PriceType::Monthly => Some(PlanPriceType::Monthly),
            PriceType::Annually => Some(PlanPriceType::Annually),
            PriceType::OneTime => None,
        }
    }
}

/// billing cadence of a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanPriceType {
    Monthly,
    Annually,
}

/// who can see the contributors of a managed issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContributorVisibility {
    #[default]
    Public,
    Private,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_plan_products_are_plans() {
        let plans: Vec<_> = ProductType::ALL.iter().filter(|p| p.is_plan()).collect();
        assert_eq!(plans.len(), 4);
        assert_eq!(ProductType::Credit.plan(), None);
        assert_eq!(ProductType::Donation.plan(), None);

        for plan in PlanProductType::ALL {
            assert_eq!(ProductType::from(plan).plan(), Some(plan));
        }
    }

    #[test]
    fn test_subject_serialization_is_tagged() {
        let user = UserId::new();
        let json = serde_json::to_value(Subject::User(user)).unwrap();
        assert_eq!(json["kind"], "user");
        assert_eq!(json["id"], user.0.to_string());
    }

    #[test]
    fn test_issue_id_display() {
        let issue = GithubIssueId::new("rust-lang", "rust", 1234);
        assert_eq!(issue.to_string(), "rust-lang/rust#1234");
    }
}
