use std::{borrow::Cow, future::Future, pin::Pin, sync::Arc};

use tracing::warn;
use uuid::Uuid;

use crate::{
    config::LedgerSettings,
    domain::{LookupKey, Member, NewTransaction, Transaction},
    ports::{
        catalog::{self, CatalogPort},
        database::{self, DatabasePort},
        session::{self, Principal, SessionPort},
    },
};

pub mod analytics;
pub mod audit;
pub mod award;
pub mod balance;
pub mod history;
mod locks;
pub mod lookup;
pub mod members;
pub mod redeem;
pub mod retry;
pub mod rewards;

use locks::MemberLocks;

/// Future returned by every command service
pub type ServiceFuture<T> = Pin<Box<dyn Future<Output = Result<T, Error>> + Send>>;

/// Entry point for every ledger operation
///
/// Each operation is a [`tower::Service`] over its own request type. The storage and session
/// handles are injected, and clones share the same handles and per-member locks.
pub struct DomainLogic<D, C, S> {
    database: Arc<D>,
    catalog: Arc<C>,
    session: Arc<S>,
    settings: Arc<LedgerSettings>,
    locks: MemberLocks,
}

impl<D, C, S> Clone for DomainLogic<D, C, S> {
    fn clone(&self) -> Self {
        Self {
            database: self.database.clone(),
            catalog: self.catalog.clone(),
            session: self.session.clone(),
            settings: self.settings.clone(),
            locks: self.locks.clone(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("member {0} does not exist")]
    MemberNotFound(Uuid),
    #[error("a member with {0} already exists")]
    DuplicateMember(LookupKey),
    #[error("reward {0} does not exist")]
    RewardNotFound(Uuid),
    #[error("reward {0} is not active")]
    RewardInactive(Uuid),
    #[error("member {member_id} has {points} points, {cost} needed")]
    InsufficientPoints {
        member_id: Uuid,
        points: u32,
        cost: u32,
    },
    /// The balance kept changing while committing
    #[error("member {0} was modified concurrently")]
    ConcurrentModification(Uuid),
    #[error("storage unavailable: {0:?}")]
    StorageUnavailable(Box<dyn std::error::Error + Send + Sync>),

    #[error("no signed-in operator")]
    Unauthenticated,
    #[error("identity provider unavailable: {0:?}")]
    IdentityUnavailable(Box<dyn std::error::Error + Send + Sync>),

    #[error("invalid input: {0}")]
    InvalidInput(Cow<'static, str>),
}

impl Error {
    /// Whether the same request may succeed if sent again
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::StorageUnavailable(_) | Error::ConcurrentModification(_)
        )
    }
}

impl From<database::Error> for Error {
    fn from(err: database::Error) -> Self {
        match err {
            database::Error::MemberDoesNotExist(member_id) => Error::MemberNotFound(member_id),
            database::Error::DuplicateMember(key) => Error::DuplicateMember(key),
            database::Error::InvalidPointsTotal {
                current_points,
                delta_points,
            } => Error::InvalidInput(
                format!("cannot apply {delta_points} points to a balance of {current_points}")
                    .into(),
            ),
            database::Error::ConcurrentModification { member_id, .. } => {
                Error::ConcurrentModification(member_id)
            }
            database::Error::Adapter(err) => Error::StorageUnavailable(err),
        }
    }
}

impl From<catalog::Error> for Error {
    fn from(err: catalog::Error) -> Self {
        match err {
            catalog::Error::RewardDoesNotExist(reward_id) => Error::RewardNotFound(reward_id),
            catalog::Error::Adapter(err) => Error::StorageUnavailable(err),
        }
    }
}

impl From<session::Error> for Error {
    fn from(err: session::Error) -> Self {
        match err {
            session::Error::Adapter(err) => Error::IdentityUnavailable(err),
        }
    }
}

/// Result of a committed balance change
pub(crate) struct Committed {
    pub old_points: u32,
    pub member: Member,
    pub transaction: Transaction,
}

impl<D, C, S> DomainLogic<D, C, S>
where
    D: DatabasePort + 'static,
    C: CatalogPort + 'static,
    S: SessionPort + 'static,
{
    pub fn new(
        database: Arc<D>,
        catalog: Arc<C>,
        session: Arc<S>,
        settings: LedgerSettings,
    ) -> Self {
        Self {
            database,
            catalog,
            session,
            settings: Arc::new(settings),
            locks: MemberLocks::default(),
        }
    }

    async fn authorize(&self) -> Result<Principal, Error> {
        self.session.principal().await?.ok_or(Error::Unauthenticated)
    }

    /// Page size for a caller-provided limit
    fn page_limit(&self, limit: Option<usize>) -> Result<usize, Error> {
        match limit.unwrap_or(self.settings.page_size) {
            0 => Err(Error::InvalidInput("limit must be positive".into())),
            limit => Ok(limit.min(self.settings.max_page_size)),
        }
    }

    /// Read the member, build a transaction from it and commit it against that balance
    ///
    /// If the balance changed between the read and the commit, the member is read again and
    /// `build` runs again, so its checks always hold for the balance that gets committed.
    async fn commit<F>(&self, member_id: Uuid, build: F) -> Result<Committed, Error>
    where
        F: Fn(&Member) -> Result<NewTransaction, Error> + Send,
    {
        let mut attempt = 0;
        loop {
            let member = self.database.get_member(member_id).await?;
            let new_transaction = build(&member)?;

            match self
                .database
                .commit_transaction(member_id, member.points, new_transaction)
                .await
            {
                Ok((updated, transaction)) => {
                    return Ok(Committed {
                        old_points: member.points,
                        member: updated,
                        transaction,
                    })
                }
                Err(database::Error::ConcurrentModification { actual_points, .. })
                    if attempt < self.settings.max_conflict_retries =>
                {
                    attempt += 1;
                    warn!(
                        %member_id,
                        read = member.points,
                        actual_points,
                        "balance changed before commit, retrying ({}/{})",
                        attempt,
                        self.settings.max_conflict_retries
                    );
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}
