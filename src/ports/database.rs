use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{LookupKey, Member, NewMember, NewTransaction, Reason, Transaction};

/// Member directory and transaction log
#[mockall::automock]
#[async_trait::async_trait]
pub trait DatabasePort: Send + Sync {
    async fn get_member(&self, member_id: Uuid) -> Result<Member, Error>;
    async fn find_member(&self, key: &LookupKey) -> Result<Option<Member>, Error>;
    async fn insert_member(&self, member: NewMember) -> Result<Member, Error>;
    /// All members, ordered by last name then first name
    async fn list_members(&self) -> Result<Vec<Member>, Error>;
    async fn count_members(&self) -> Result<u64, Error>;
    /// Members with the highest balances first
    async fn top_members(&self, limit: usize) -> Result<Vec<Member>, Error>;

    /// Apply a transaction to a member's balance and append it to the log
    ///
    /// This is a compare-and-swap: it only succeeds if the member still has `expected_points`.
    /// The balance update and the append either both happen or neither does.
    async fn commit_transaction(
        &self,
        member_id: Uuid,
        expected_points: u32,
        transaction: NewTransaction,
    ) -> Result<(Member, Transaction), Error>;

    /// Transactions matching the filter, newest first
    async fn list_transactions(&self, filter: &TransactionFilter)
        -> Result<Vec<Transaction>, Error>;
}

/// Row filter for [`DatabasePort::list_transactions`]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransactionFilter {
    pub member_id: Option<Uuid>,
    pub reason: Option<Reason>,
    /// Inclusive lower bound on `created_at`
    pub since: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `created_at`
    pub before: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl TransactionFilter {
    pub fn matches(&self, transaction: &Transaction) -> bool {
        self.member_id.map_or(true, |id| transaction.member_id == id)
            && self.reason.map_or(true, |reason| transaction.reason == reason)
            && self.since.map_or(true, |since| transaction.created_at >= since)
            && self
                .before
                .map_or(true, |before| transaction.created_at < before)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Domain-level error when a member does not exist
    #[error("member {0} does not exist")]
    MemberDoesNotExist(Uuid),

    /// Email or external id already used by another member
    #[error("a member with {0} already exists")]
    DuplicateMember(LookupKey),

    /// Trying to remove too many loyalty points
    ///
    /// This would result in a negative number of loyalty points, which is not supported.
    #[error("trying to apply {delta_points} points to {current_points}")]
    InvalidPointsTotal {
        current_points: u32,
        delta_points: i64,
    },

    /// The balance changed since it was read
    ///
    /// Nothing was written. The caller should read the member again and re-check its
    /// preconditions before retrying.
    #[error("member {member_id} has {actual_points} points, expected {expected_points}")]
    ConcurrentModification {
        member_id: Uuid,
        expected_points: u32,
        actual_points: u32,
    },

    /// Concrete adapter errors
    ///
    /// This could represent any errors from a concrete adapter that is not part of the domain
    /// model, such as connectivity, configuration, or permission errors.
    #[error("adapter error: {0:?}")]
    Adapter(Box<dyn std::error::Error + Send + Sync>),
}
