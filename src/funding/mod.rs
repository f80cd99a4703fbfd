pub mod authorizer;
pub mod lock;
pub mod state_machine;

pub use authorizer::FundingAuthorizer;
pub use lock::SubjectLocks;
pub use state_machine::ManagedIssueStateMachine;
