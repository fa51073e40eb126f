pub mod fixtures;
pub mod repositories;

pub use fixtures::{SeedAction, SeedRecords, SeedRule, SEED_RULES};
pub use repositories::{InMemoryRuleStore, RuleStore, StoreError};
