use std::task::{Context, Poll};

use tower::Service;
use tracing::info;
use uuid::Uuid;

use crate::{
    domain::{NewTransaction, Reason, Source, Transaction},
    ports::{catalog::CatalogPort, database::DatabasePort, session::SessionPort},
};

use super::{DomainLogic, Error, ServiceFuture};

#[derive(Clone, Debug)]
pub struct AwardRequest {
    pub member_id: Uuid,
    /// Amount to add. Uses the configured policy amount when not set.
    pub points: Option<u32>,
    pub origin: AwardOrigin,
}

/// Where the points were given from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AwardOrigin {
    /// A member card was scanned at the counter
    Scan,
    /// Points added by hand from the member list
    Dashboard,
}

impl AwardOrigin {
    pub fn reason(&self) -> Reason {
        match self {
            AwardOrigin::Scan => Reason::ScanAdd,
            AwardOrigin::Dashboard => Reason::ManualAdd,
        }
    }

    pub fn source(&self) -> Source {
        match self {
            AwardOrigin::Scan => Source::Scan,
            AwardOrigin::Dashboard => Source::Dashboard,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct AwardResponse {
    pub member_id: Uuid,
    /// Previous number of loyalty points
    pub old_points: u32,
    /// New number of loyalty points
    pub new_points: u32,
    pub transaction: Transaction,
}

impl<D, C, S> Service<AwardRequest> for DomainLogic<D, C, S>
where
    D: DatabasePort + 'static,
    C: CatalogPort + 'static,
    S: SessionPort + 'static,
{
    type Response = AwardResponse;
    type Error = Error;
    type Future = ServiceFuture<AwardResponse>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: AwardRequest) -> Self::Future {
        let logic = self.clone();
        Box::pin(async move {
            logic.authorize().await?;

            let points = req.points.unwrap_or(logic.settings.award_points);
            validate_points(points, logic.settings.max_award_points)?;

            let _guard = logic.locks.lock(req.member_id).await;
            let committed = logic
                .commit(req.member_id, |_| Ok(create_transaction(points, req.origin)))
                .await?;

            info!(
                member_id = %req.member_id,
                reason = %committed.transaction.reason,
                "awarded {} points: {} -> {}",
                points,
                committed.old_points,
                committed.member.points
            );

            Ok(AwardResponse {
                member_id: req.member_id,
                old_points: committed.old_points,
                new_points: committed.member.points,
                transaction: committed.transaction,
            })
        })
    }
}

fn validate_points(points: u32, max_points: u32) -> Result<(), Error> {
    if points == 0 {
        return Err(Error::InvalidInput("awarded points must be positive".into()));
    }
    if points > max_points {
        return Err(Error::InvalidInput(
            format!("cannot award more than {max_points} points at once").into(),
        ));
    }

    Ok(())
}

fn create_transaction(points: u32, origin: AwardOrigin) -> NewTransaction {
    NewTransaction {
        points_delta: i64::from(points),
        reason: origin.reason(),
        source: origin.source(),
        reward_id: None,
    }
}
