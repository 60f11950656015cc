use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

type LockTable = HashMap<Uuid, Arc<AsyncMutex<()>>>;

/// One async lock per member being mutated
///
/// Entries are removed once no task holds or waits for them.
#[derive(Clone, Debug, Default)]
pub(crate) struct MemberLocks {
    table: Arc<Mutex<LockTable>>,
}

impl MemberLocks {
    /// Wait until no other task is mutating this member
    pub async fn lock(&self, member_id: Uuid) -> MemberGuard {
        let lock = self.table().entry(member_id).or_default().clone();
        let guard = lock.lock_owned().await;

        MemberGuard {
            member_id,
            guard: Some(guard),
            locks: self.clone(),
        }
    }

    fn table(&self) -> MutexGuard<'_, LockTable> {
        // The table only holds `Arc`s, so it is still consistent after a panic
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.table().len()
    }
}

pub(crate) struct MemberGuard {
    member_id: Uuid,
    guard: Option<OwnedMutexGuard<()>>,
    locks: MemberLocks,
}

impl Drop for MemberGuard {
    fn drop(&mut self) {
        drop(self.guard.take());

        let mut table = self.locks.table();
        let unused = table
            .get(&self.member_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1);
        if unused {
            table.remove(&self.member_id);
        }
    }
}
