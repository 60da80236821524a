use async_trait::async_trait;

use crate::models::{ProviderId, ResolvedOffer};
use crate::utils::error::Result;

/// Fetches the current and upcoming lunch offers of exactly one provider.
///
/// Implementations may be slow and may fail; callers contain both.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LunchResolver: Send + Sync {
    /// The provider whose offers this resolver produces.
    fn provider(&self) -> &ProviderId;

    /// Short name of the resolution strategy, used in logs.
    fn kind(&self) -> &'static str;

    async fn resolve(&self) -> Result<Vec<ResolvedOffer>>;
}
