use std::task::{Context, Poll};

use futures::{
    stream::{self, BoxStream},
    StreamExt, TryStreamExt,
};
use tower::Service;
use tracing::info;
use uuid::Uuid;

use crate::{
    domain::{NewReward, RewardDefinition},
    ports::{catalog::CatalogPort, database::DatabasePort, session::SessionPort},
};

use super::{DomainLogic, Error, ServiceFuture};

#[derive(Clone, Debug)]
pub struct CreateRewardRequest {
    pub name: String,
    pub cost: u32,
}

#[derive(Clone, Debug)]
pub struct SetRewardActiveRequest {
    pub reward_id: Uuid,
    pub active: bool,
}

#[derive(Clone, Debug, Default)]
pub struct ListRewardsRequest {
    pub active_only: bool,
    pub after: Option<RewardCursor>,
    pub limit: Option<usize>,
}

/// Position after the last reward of a page
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RewardCursor {
    cost: u32,
    id: Uuid,
}

#[derive(Debug, PartialEq, Eq)]
pub struct RewardsPage {
    /// Cheapest first
    pub rewards: Vec<RewardDefinition>,
    pub next: Option<RewardCursor>,
}

impl<D, C, S> Service<CreateRewardRequest> for DomainLogic<D, C, S>
where
    D: DatabasePort + 'static,
    C: CatalogPort + 'static,
    S: SessionPort + 'static,
{
    type Response = RewardDefinition;
    type Error = Error;
    type Future = ServiceFuture<RewardDefinition>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: CreateRewardRequest) -> Self::Future {
        let logic = self.clone();
        Box::pin(async move {
            logic.authorize().await?;

            let name = req.name.trim();
            if name.is_empty() {
                return Err(Error::InvalidInput("reward name must not be empty".into()));
            }
            if req.cost == 0 {
                return Err(Error::InvalidInput("reward cost must be positive".into()));
            }

            let reward = logic
                .catalog
                .insert_reward(NewReward {
                    name: name.to_string(),
                    cost: req.cost,
                })
                .await?;
            info!(
                reward_id = %reward.id,
                "created reward {:?} for {} points",
                reward.name,
                reward.cost
            );

            Ok(reward)
        })
    }
}

impl<D, C, S> Service<SetRewardActiveRequest> for DomainLogic<D, C, S>
where
    D: DatabasePort + 'static,
    C: CatalogPort + 'static,
    S: SessionPort + 'static,
{
    type Response = RewardDefinition;
    type Error = Error;
    type Future = ServiceFuture<RewardDefinition>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: SetRewardActiveRequest) -> Self::Future {
        let logic = self.clone();
        Box::pin(async move {
            logic.authorize().await?;

            let reward = logic
                .catalog
                .set_reward_active(req.reward_id, req.active)
                .await?;
            info!(reward_id = %reward.id, active = reward.active, "updated reward");

            Ok(reward)
        })
    }
}

impl<D, C, S> Service<ListRewardsRequest> for DomainLogic<D, C, S>
where
    D: DatabasePort + 'static,
    C: CatalogPort + 'static,
    S: SessionPort + 'static,
{
    type Response = RewardsPage;
    type Error = Error;
    type Future = ServiceFuture<RewardsPage>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: ListRewardsRequest) -> Self::Future {
        let logic = self.clone();
        Box::pin(async move {
            logic.authorize().await?;
            let limit = logic.page_limit(req.limit)?;

            let mut rewards = logic
                .catalog
                .list_rewards(
                    req.active_only,
                    req.after.map(|cursor| (cursor.cost, cursor.id)),
                    limit + 1,
                )
                .await?;
            let next = if rewards.len() > limit {
                rewards.truncate(limit);
                rewards.last().map(|reward| RewardCursor {
                    cost: reward.cost,
                    id: reward.id,
                })
            } else {
                None
            };

            Ok(RewardsPage { rewards, next })
        })
    }
}

impl<D, C, S> DomainLogic<D, C, S>
where
    D: DatabasePort + 'static,
    C: CatalogPort + 'static,
    S: SessionPort + 'static,
{
    /// The whole catalog, cheapest first, fetched page by page
    pub fn rewards_stream(
        &self,
        active_only: bool,
    ) -> BoxStream<'static, Result<RewardDefinition, Error>> {
        let first_page = ListRewardsRequest {
            active_only,
            after: None,
            limit: Some(self.settings.page_size),
        };
        let logic = self.clone();

        stream::try_unfold(Some(first_page), move |state| {
            let mut logic = logic.clone();
            async move {
                let Some(request) = state else {
                    return Ok::<_, Error>(None);
                };
                let page = Service::<ListRewardsRequest>::call(&mut logic, request.clone()).await?;
                let next = page.next.map(|cursor| ListRewardsRequest {
                    after: Some(cursor),
                    ..request
                });
                Ok(Some((page.rewards, next)))
            }
        })
        .map_ok(|page| stream::iter(page.into_iter().map(Ok)))
        .try_flatten()
        .boxed()
    }
}
