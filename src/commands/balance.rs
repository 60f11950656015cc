use std::task::{Context, Poll};

use tower::Service;
use tracing::debug;
use uuid::Uuid;

use crate::ports::{catalog::CatalogPort, database::DatabasePort, session::SessionPort};

use super::{DomainLogic, Error, ServiceFuture};

#[derive(Clone, Debug)]
pub struct BalanceRequest {
    pub member_id: Uuid,
}

#[derive(Debug, PartialEq, Eq)]
pub struct BalanceResponse {
    pub member_id: Uuid,
    pub points: u32,
}

impl<D, C, S> Service<BalanceRequest> for DomainLogic<D, C, S>
where
    D: DatabasePort + 'static,
    C: CatalogPort + 'static,
    S: SessionPort + 'static,
{
    type Response = BalanceResponse;
    type Error = Error;
    type Future = ServiceFuture<BalanceResponse>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: BalanceRequest) -> Self::Future {
        let logic = self.clone();
        Box::pin(async move {
            logic.authorize().await?;

            // Reads do not wait for the member lock
            let member = logic.database.get_member(req.member_id).await?;
            debug!(member_id = %member.id, points = member.points, "read balance");

            Ok(BalanceResponse {
                member_id: member.id,
                points: member.points,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        adapters::database::memory::MemoryDatabase,
        commands::{
            award::{AwardOrigin, AwardRequest},
            test_support::{enroll, memory_logic},
        },
    };
    use speculoos::prelude::*;
    use tower::{BoxError, ServiceExt};

    #[tokio::test]
    async fn test_read_own_write() -> Result<(), BoxError> {
        let database = MemoryDatabase::default();
        let member = enroll(&database, "ana@example.com").await;
        let logic = memory_logic(&database);

        let before = logic
            .clone()
            .oneshot(BalanceRequest {
                member_id: member.id,
            })
            .await?;
        assert_that!(before.points).is_equal_to(0);

        logic
            .clone()
            .oneshot(AwardRequest {
                member_id: member.id,
                points: Some(10),
                origin: AwardOrigin::Scan,
            })
            .await?;

        // The write is visible right away
        let after = logic
            .oneshot(BalanceRequest {
                member_id: member.id,
            })
            .await?;
        assert_that!(after).is_equal_to(BalanceResponse {
            member_id: member.id,
            points: 10,
        });

        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_member() {
        let database = MemoryDatabase::default();

        let res = memory_logic(&database)
            .oneshot(BalanceRequest {
                member_id: Uuid::new_v4(),
            })
            .await;

        assert_that!(res)
            .is_err()
            .matches(|err| matches!(err, Error::MemberNotFound(_)));
    }
}
