use std::task::{Context, Poll};

use futures::TryStreamExt;
use tower::Service;
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    domain::{replay, Transaction},
    ports::{catalog::CatalogPort, database::DatabasePort, session::SessionPort},
};

use super::{history::HistoryRequest, DomainLogic, Error, ServiceFuture};

/// Check a member's balance against its transaction log
#[derive(Clone, Debug)]
pub struct AuditRequest {
    pub member_id: Uuid,
}

#[derive(Debug, PartialEq, Eq)]
pub struct AuditReport {
    pub member_id: Uuid,
    /// Stored balance
    pub balance: u32,
    /// Sum of every transaction of the member
    pub replayed: i64,
    pub transactions: usize,
}

impl AuditReport {
    pub fn is_consistent(&self) -> bool {
        self.replayed == i64::from(self.balance)
    }
}

impl<D, C, S> Service<AuditRequest> for DomainLogic<D, C, S>
where
    D: DatabasePort + 'static,
    C: CatalogPort + 'static,
    S: SessionPort + 'static,
{
    type Response = AuditReport;
    type Error = Error;
    type Future = ServiceFuture<AuditReport>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: AuditRequest) -> Self::Future {
        let logic = self.clone();
        Box::pin(async move {
            logic.authorize().await?;

            // Hold the member still so the balance and the log are read at the same point
            let _guard = logic.locks.lock(req.member_id).await;
            let member = logic.database.get_member(req.member_id).await?;
            let log: Vec<Transaction> = logic
                .history_stream(HistoryRequest {
                    member_id: Some(member.id),
                    ..Default::default()
                })
                .try_collect()
                .await?;

            let report = AuditReport {
                member_id: member.id,
                balance: member.points,
                replayed: replay(&log),
                transactions: log.len(),
            };
            if report.is_consistent() {
                info!(
                    member_id = %member.id,
                    "ledger consistent over {} transactions",
                    report.transactions
                );
            } else {
                error!(
                    member_id = %member.id,
                    "balance {} does not match replayed log {}",
                    report.balance,
                    report.replayed
                );
            }

            Ok(report)
        })
    }
}
