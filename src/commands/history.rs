use std::task::{Context, Poll};

use chrono::{DateTime, Utc};
use futures::{
    stream::{self, BoxStream},
    StreamExt, TryStreamExt,
};
use tower::Service;
use tracing::debug;
use uuid::Uuid;

use crate::{
    domain::Transaction,
    ports::{
        catalog::CatalogPort,
        database::{DatabasePort, TransactionFilter},
        session::SessionPort,
    },
};

use super::{DomainLogic, Error, ServiceFuture};

/// Query for one page of the transaction log, newest first
#[derive(Clone, Debug, Default)]
pub struct HistoryRequest {
    pub member_id: Option<Uuid>,
    /// Only transactions written at or after this time
    pub since: Option<DateTime<Utc>>,
    /// Continue after a previous page
    pub before: Option<HistoryCursor>,
    /// Page size, defaults to the configured page size
    pub limit: Option<usize>,
}

/// Position after the last transaction of a page
///
/// Timestamps are unique per store, so the next page starts exactly after this one ends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HistoryCursor(DateTime<Utc>);

#[derive(Debug, PartialEq, Eq)]
pub struct HistoryPage {
    pub transactions: Vec<Transaction>,
    /// Set when there are more transactions after this page
    pub next: Option<HistoryCursor>,
}

impl<D, C, S> Service<HistoryRequest> for DomainLogic<D, C, S>
where
    D: DatabasePort + 'static,
    C: CatalogPort + 'static,
    S: SessionPort + 'static,
{
    type Response = HistoryPage;
    type Error = Error;
    type Future = ServiceFuture<HistoryPage>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: HistoryRequest) -> Self::Future {
        let logic = self.clone();
        Box::pin(async move {
            logic.authorize().await?;
            let limit = logic.page_limit(req.limit)?;

            // Fetch one extra row to know whether another page follows
            let filter = TransactionFilter {
                member_id: req.member_id,
                reason: None,
                since: req.since,
                before: req.before.map(|cursor| cursor.0),
                limit: Some(limit + 1),
            };
            let mut transactions = logic.database.list_transactions(&filter).await?;
            let next = if transactions.len() > limit {
                transactions.truncate(limit);
                transactions.last().map(|tx| HistoryCursor(tx.created_at))
            } else {
                None
            };
            debug!(
                member_id = ?req.member_id,
                "read {} transactions, more: {}",
                transactions.len(),
                next.is_some()
            );

            Ok(HistoryPage { transactions, next })
        })
    }
}

impl<D, C, S> DomainLogic<D, C, S>
where
    D: DatabasePort + 'static,
    C: CatalogPort + 'static,
    S: SessionPort + 'static,
{
    /// Every transaction matching `query`, newest first, fetched page by page
    ///
    /// Nothing is read until the stream is polled. `query.limit` caps the total number of
    /// transactions instead of the page size. Calling this again with the same query starts
    /// over from the newest transaction.
    pub fn history_stream(
        &self,
        query: HistoryRequest,
    ) -> BoxStream<'static, Result<Transaction, Error>> {
        let total = query.limit;
        let first_page = HistoryRequest {
            limit: Some(self.settings.page_size),
            ..query
        };
        let logic = self.clone();

        let pages = stream::try_unfold(Some(first_page), move |state| {
            let mut logic = logic.clone();
            async move {
                let Some(request) = state else {
                    return Ok::<_, Error>(None);
                };
                let page = Service::<HistoryRequest>::call(&mut logic, request.clone()).await?;
                let next = page.next.map(|cursor| HistoryRequest {
                    before: Some(cursor),
                    ..request
                });
                Ok(Some((page.transactions, next)))
            }
        });
        let transactions = pages
            .map_ok(|page| stream::iter(page.into_iter().map(Ok)))
            .try_flatten();

        match total {
            Some(total) => transactions.take(total).boxed(),
            None => transactions.boxed(),
        }
    }
}
