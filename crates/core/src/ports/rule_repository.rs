//! Access to the active rule set.

use async_trait::async_trait;
use cat_domain::Rule;

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait RuleRepository: Send + Sync {
    /// All rules with `is_active = true`. Rules are global, not per-subject.
    async fn active_rules(&self) -> anyhow::Result<Vec<Rule>>;
}
