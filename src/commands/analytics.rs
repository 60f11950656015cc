use std::task::{Context, Poll};

use chrono::{DateTime, Local, TimeZone, Utc};
use futures::TryStreamExt;
use tower::Service;

use crate::{
    domain::{Member, Reason},
    ports::{catalog::CatalogPort, database::DatabasePort, session::SessionPort},
};

use super::{history::HistoryRequest, DomainLogic, Error, ServiceFuture};

/// Daily figures for the dashboard
#[derive(Clone, Debug)]
pub struct AnalyticsRequest {
    /// Start of the reporting window, usually midnight
    pub since: DateTime<Utc>,
    /// Number of members to rank, defaults to the configured number
    pub top: Option<usize>,
}

impl AnalyticsRequest {
    /// Figures for the current local day
    pub fn today() -> Self {
        Self {
            since: start_of_day(&Local::now()),
            top: None,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct AnalyticsResponse {
    pub total_members: u64,
    /// Sum of all positive deltas in the window
    pub points_awarded: u64,
    /// Number of redemptions in the window
    pub redemptions: u64,
    /// Highest balances first
    pub top_members: Vec<Member>,
}

impl<D, C, S> Service<AnalyticsRequest> for DomainLogic<D, C, S>
where
    D: DatabasePort + 'static,
    C: CatalogPort + 'static,
    S: SessionPort + 'static,
{
    type Response = AnalyticsResponse;
    type Error = Error;
    type Future = ServiceFuture<AnalyticsResponse>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: AnalyticsRequest) -> Self::Future {
        let logic = self.clone();
        Box::pin(async move {
            logic.authorize().await?;

            let total_members = logic.database.count_members().await?;
            let top = req.top.unwrap_or(logic.settings.top_members);
            let top_members = logic.database.top_members(top).await?;

            let (points_awarded, redemptions) = logic
                .history_stream(HistoryRequest {
                    since: Some(req.since),
                    ..Default::default()
                })
                .try_fold((0u64, 0u64), |(awarded, redeemed), tx| async move {
                    let awarded = awarded + u64::try_from(tx.points_delta).unwrap_or(0);
                    let redeemed = redeemed + u64::from(tx.reason == Reason::RewardRedeem);
                    Ok((awarded, redeemed))
                })
                .await?;

            Ok(AnalyticsResponse {
                total_members,
                points_awarded,
                redemptions,
                top_members,
            })
        })
    }
}

/// Midnight of the day of `now`, in its own time zone
pub fn start_of_day<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .and_then(|midnight| now.timezone().from_local_datetime(&midnight).earliest())
        .map(|midnight| midnight.with_timezone(&Utc))
        // Midnight can be skipped by a DST change
        .unwrap_or_else(|| now.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        adapters::database::memory::MemoryDatabase,
        commands::{
            award::{AwardOrigin, AwardRequest},
            redeem::RedeemRequest,
            test_support::{enroll, memory_logic, reward},
        },
        domain::Source,
    };
    use chrono::{FixedOffset, NaiveDate};
    use speculoos::prelude::*;
    use std::time::Duration;
    use tower::{BoxError, ServiceExt};

    #[test]
    fn test_start_of_day() {
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let now = offset
            .from_local_datetime(
                &NaiveDate::from_ymd_opt(2024, 5, 17)
                    .unwrap()
                    .and_hms_opt(1, 30, 0)
                    .unwrap(),
            )
            .unwrap();

        let expected = Utc
            .from_local_datetime(
                &NaiveDate::from_ymd_opt(2024, 5, 16)
                    .unwrap()
                    .and_hms_opt(22, 0, 0)
                    .unwrap(),
            )
            .unwrap();
        assert_that!(start_of_day(&now)).is_equal_to(expected);
    }

    #[tokio::test]
    async fn test_analytics() -> Result<(), BoxError> {
        let database = MemoryDatabase::default();
        let ana = enroll(&database, "ana@example.com").await;
        let ben = enroll(&database, "ben@example.com").await;
        let cleo = enroll(&database, "cleo@example.com").await;
        let coffee = reward(&database, "Coffee", 20).await;
        let logic = memory_logic(&database);

        let award = |member_id, points| {
            logic.clone().oneshot(AwardRequest {
                member_id,
                points: Some(points),
                origin: AwardOrigin::Scan,
            })
        };
        // Before the reporting window
        award(ana.id, 100).await?;
        tokio::time::sleep(Duration::from_millis(2)).await;
        let since = Utc::now();
        tokio::time::sleep(Duration::from_millis(2)).await;
        award(ana.id, 10).await?;
        award(ben.id, 30).await?;
        award(cleo.id, 5).await?;
        logic
            .clone()
            .oneshot(RedeemRequest {
                member_id: ben.id,
                reward_id: coffee.id,
                source: Source::Scan,
            })
            .await?;

        let res = logic
            .oneshot(AnalyticsRequest {
                since,
                top: Some(2),
            })
            .await?;

        assert_that!(res.total_members).is_equal_to(3);
        assert_that!(res.points_awarded).is_equal_to(45);
        assert_that!(res.redemptions).is_equal_to(1);
        let top: Vec<_> = res
            .top_members
            .iter()
            .map(|member| (member.id, member.points))
            .collect();
        assert_that!(top).is_equal_to(vec![(ana.id, 110), (ben.id, 10)]);

        Ok(())
    }
}
