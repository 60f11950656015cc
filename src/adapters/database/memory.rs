use crate::{
    domain::{
        LookupKey, Member, NewMember, NewReward, NewTransaction, RewardDefinition, Transaction,
    },
    ports::{
        catalog::{self, CatalogPort},
        database::{DatabasePort, Error, TransactionFilter},
    },
};
use chrono::{DateTime, Duration, Utc};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};
use tracing::debug;
use uuid::Uuid;

/// In-memory store for members, transactions and rewards
///
/// All operations take a single lock, so every read observes every committed write.
#[derive(Clone, Debug, Default)]
pub struct MemoryDatabase {
    state: Arc<Mutex<State>>,
}

#[derive(Debug, Default)]
struct State {
    members: HashMap<Uuid, Member>,
    /// Append-only, in `created_at` order
    transactions: Vec<Transaction>,
    rewards: HashMap<Uuid, RewardDefinition>,
    last_timestamp: Option<DateTime<Utc>>,
}

/// Current time, bumped past the previously assigned timestamp if the clock did not move
fn next_timestamp(last: &mut Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = Utc::now();
    let timestamp = match *last {
        Some(previous) if now <= previous => previous + Duration::microseconds(1),
        _ => now,
    };
    *last = Some(timestamp);
    timestamp
}

#[async_trait::async_trait]
impl DatabasePort for MemoryDatabase {
    async fn get_member(&self, member_id: Uuid) -> Result<Member, Error> {
        self.state
            .lock()?
            .members
            .get(&member_id)
            .cloned()
            .ok_or(Error::MemberDoesNotExist(member_id))
    }

    async fn find_member(&self, key: &LookupKey) -> Result<Option<Member>, Error> {
        let member = self
            .state
            .lock()?
            .members
            .values()
            .find(|member| member.matches(key))
            .cloned();

        Ok(member)
    }

    async fn insert_member(&self, new_member: NewMember) -> Result<Member, Error> {
        let mut guard = self.state.lock()?;
        let state = &mut *guard;

        let email_key = LookupKey::Email(new_member.email.clone());
        let external_key = new_member.external_id.clone().map(LookupKey::ExternalId);
        for key in std::iter::once(&email_key).chain(external_key.as_ref()) {
            if state.members.values().any(|member| member.matches(key)) {
                return Err(Error::DuplicateMember(key.clone()));
            }
        }

        let member = Member {
            id: Uuid::new_v4(),
            email: new_member.email,
            external_id: new_member.external_id,
            first_name: new_member.first_name,
            last_name: new_member.last_name,
            points: 0,
            created_at: next_timestamp(&mut state.last_timestamp),
        };
        state.members.insert(member.id, member.clone());

        Ok(member)
    }

    async fn list_members(&self) -> Result<Vec<Member>, Error> {
        let mut members: Vec<_> = self.state.lock()?.members.values().cloned().collect();
        members.sort_by(|a, b| {
            (&a.last_name, &a.first_name, a.id).cmp(&(&b.last_name, &b.first_name, b.id))
        });

        Ok(members)
    }

    async fn count_members(&self) -> Result<u64, Error> {
        Ok(self.state.lock()?.members.len() as u64)
    }

    async fn top_members(&self, limit: usize) -> Result<Vec<Member>, Error> {
        let mut members: Vec<_> = self.state.lock()?.members.values().cloned().collect();
        members.sort_by(|a, b| b.points.cmp(&a.points).then_with(|| a.id.cmp(&b.id)));
        members.truncate(limit);

        Ok(members)
    }

    async fn commit_transaction(
        &self,
        member_id: Uuid,
        expected_points: u32,
        new_transaction: NewTransaction,
    ) -> Result<(Member, Transaction), Error> {
        let mut guard = self.state.lock()?;
        let state = &mut *guard;

        let member = state
            .members
            .get_mut(&member_id)
            .ok_or(Error::MemberDoesNotExist(member_id))?;
        if member.points != expected_points {
            return Err(Error::ConcurrentModification {
                member_id,
                expected_points,
                actual_points: member.points,
            });
        }
        // Return an error if this would make the number of loyalty points negative
        let new_points =
            new_transaction
                .apply_to(member.points)
                .ok_or(Error::InvalidPointsTotal {
                    current_points: member.points,
                    delta_points: new_transaction.points_delta,
                })?;

        let transaction = Transaction {
            id: Uuid::new_v4(),
            member_id,
            points_delta: new_transaction.points_delta,
            reason: new_transaction.reason,
            source: new_transaction.source,
            reward_id: new_transaction.reward_id,
            created_at: next_timestamp(&mut state.last_timestamp),
        };
        member.points = new_points;
        let member = member.clone();
        state.transactions.push(transaction.clone());
        debug!(%member_id, points = new_points, "committed transaction {}", transaction.id);

        Ok((member, transaction))
    }

    async fn list_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> Result<Vec<Transaction>, Error> {
        let transactions = self
            .state
            .lock()?
            .transactions
            .iter()
            .rev()
            .filter(|transaction| filter.matches(transaction))
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();

        Ok(transactions)
    }
}

#[async_trait::async_trait]
impl CatalogPort for MemoryDatabase {
    async fn insert_reward(
        &self,
        new_reward: NewReward,
    ) -> Result<RewardDefinition, catalog::Error> {
        let mut guard = self.state.lock()?;
        let state = &mut *guard;

        let reward = RewardDefinition {
            id: Uuid::new_v4(),
            name: new_reward.name,
            cost: new_reward.cost,
            active: true,
            created_at: next_timestamp(&mut state.last_timestamp),
        };
        state.rewards.insert(reward.id, reward.clone());

        Ok(reward)
    }

    async fn get_reward(&self, reward_id: Uuid) -> Result<RewardDefinition, catalog::Error> {
        self.state
            .lock()?
            .rewards
            .get(&reward_id)
            .cloned()
            .ok_or(catalog::Error::RewardDoesNotExist(reward_id))
    }

    async fn set_reward_active(
        &self,
        reward_id: Uuid,
        active: bool,
    ) -> Result<RewardDefinition, catalog::Error> {
        let mut state = self.state.lock()?;
        let reward = state
            .rewards
            .get_mut(&reward_id)
            .ok_or(catalog::Error::RewardDoesNotExist(reward_id))?;
        reward.active = active;

        Ok(reward.clone())
    }

    async fn list_rewards(
        &self,
        active_only: bool,
        after: Option<(u32, Uuid)>,
        limit: usize,
    ) -> Result<Vec<RewardDefinition>, catalog::Error> {
        let mut rewards: Vec<_> = self
            .state
            .lock()?
            .rewards
            .values()
            .filter(|reward| !active_only || reward.active)
            .filter(|reward| after.map_or(true, |position| (reward.cost, reward.id) > position))
            .cloned()
            .collect();
        rewards.sort_by_key(|reward| (reward.cost, reward.id));
        rewards.truncate(limit);

        Ok(rewards)
    }
}

/// Erased [`PoisonError`]
///
/// `PoisonError` keeps the `MutexGuard` internally, which is not send. Thus we erase the error
/// and only keep the string representation instead.
#[derive(Debug, thiserror::Error)]
#[error("poison error: {0}")]
pub struct ErasedPoisonError(String);

/// We need to create custom `From` implementations here for an error that's specific to this
/// adapter.
impl<T> From<PoisonError<T>> for Error {
    fn from(err: PoisonError<T>) -> Self {
        Self::Adapter(Box::new(ErasedPoisonError(err.to_string())))
    }
}

impl<T> From<PoisonError<T>> for catalog::Error {
    fn from(err: PoisonError<T>) -> Self {
        Self::Adapter(Box::new(ErasedPoisonError(err.to_string())))
    }
}
