use std::task::{Context, Poll};

use tower::Service;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    domain::{Member, NewTransaction, Reason, RewardDefinition, Source, Transaction},
    ports::{catalog::CatalogPort, database::DatabasePort, session::SessionPort},
};

use super::{DomainLogic, Error, ServiceFuture};

#[derive(Clone, Debug)]
pub struct RedeemRequest {
    pub member_id: Uuid,
    pub reward_id: Uuid,
    pub source: Source,
}

#[derive(Debug, PartialEq, Eq)]
pub struct RedeemResponse {
    pub member_id: Uuid,
    pub reward: RewardDefinition,
    /// Previous number of loyalty points
    pub old_points: u32,
    /// New number of loyalty points
    pub new_points: u32,
    pub transaction: Transaction,
}

impl<D, C, S> Service<RedeemRequest> for DomainLogic<D, C, S>
where
    D: DatabasePort + 'static,
    C: CatalogPort + 'static,
    S: SessionPort + 'static,
{
    type Response = RedeemResponse;
    type Error = Error;
    type Future = ServiceFuture<RedeemResponse>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: RedeemRequest) -> Self::Future {
        let logic = self.clone();
        Box::pin(async move {
            logic.authorize().await?;

            // The reward is read once the member is held, so a reward deactivated while
            // waiting for the lock is seen here
            let _guard = logic.locks.lock(req.member_id).await;
            let reward = logic.catalog.get_reward(req.reward_id).await?;
            if !reward.active {
                warn!(reward_id = %reward.id, "refusing to redeem inactive reward");
                return Err(Error::RewardInactive(reward.id));
            }

            let committed = logic
                .commit(req.member_id, |member| {
                    create_transaction(member, &reward, req.source)
                })
                .await
                .map_err(|err| {
                    if let Error::InsufficientPoints { points, cost, .. } = &err {
                        warn!(
                            member_id = %req.member_id,
                            reward_id = %reward.id,
                            "not enough points: {} < {}",
                            points,
                            cost
                        );
                    }
                    err
                })?;

            info!(
                member_id = %req.member_id,
                reward_id = %reward.id,
                "redeemed {:?} for {} points: {} -> {}",
                reward.name,
                reward.cost,
                committed.old_points,
                committed.member.points
            );

            Ok(RedeemResponse {
                member_id: req.member_id,
                old_points: committed.old_points,
                new_points: committed.member.points,
                transaction: committed.transaction,
                reward,
            })
        })
    }
}

/// Debit for `reward`, if `member` can afford it
fn create_transaction(
    member: &Member,
    reward: &RewardDefinition,
    source: Source,
) -> Result<NewTransaction, Error> {
    if member.points < reward.cost {
        return Err(Error::InsufficientPoints {
            member_id: member.id,
            points: member.points,
            cost: reward.cost,
        });
    }

    Ok(NewTransaction {
        points_delta: -i64::from(reward.cost),
        reason: Reason::RewardRedeem,
        source,
        reward_id: Some(reward.id),
    })
}
