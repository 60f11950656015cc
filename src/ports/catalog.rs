use uuid::Uuid;

use crate::domain::{NewReward, RewardDefinition};

/// Reward catalog storage
#[mockall::automock]
#[async_trait::async_trait]
pub trait CatalogPort: Send + Sync {
    async fn insert_reward(&self, reward: NewReward) -> Result<RewardDefinition, Error>;
    async fn get_reward(&self, reward_id: Uuid) -> Result<RewardDefinition, Error>;
    async fn set_reward_active(
        &self,
        reward_id: Uuid,
        active: bool,
    ) -> Result<RewardDefinition, Error>;

    /// Rewards ordered by cost, then id
    ///
    /// When `after` is set, only rewards strictly after that `(cost, id)` position are returned.
    async fn list_rewards(
        &self,
        active_only: bool,
        after: Option<(u32, Uuid)>,
        limit: usize,
    ) -> Result<Vec<RewardDefinition>, Error>;
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("reward {0} does not exist")]
    RewardDoesNotExist(Uuid),

    /// Concrete adapter errors
    #[error("adapter error: {0:?}")]
    Adapter(Box<dyn std::error::Error + Send + Sync>),
}
