//! Mockall-generated port mocks, re-exported for this crate's own tests and
//! for downstream crates built with the `testing` feature.

pub use crate::ports::ability::MockAbilityStore;
pub use crate::ports::catalogue::MockCatalogueView;
pub use crate::ports::rule_repository::MockRuleRepository;
pub use crate::ports::session_repository::{MockSessionRepository, MockSessionTransaction};
