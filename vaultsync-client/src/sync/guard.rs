//! One sync round at a time per user.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Held for the duration of a sync round.
pub type SyncPermit = OwnedMutexGuard<()>;

#[derive(Default)]
pub struct UserSyncGuard {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl UserSyncGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other round for `user_id` is running, then claim it.
    pub async fn acquire(&self, user_id: &str) -> SyncPermit {
        let lock = {
            // never held across an await
            let mut locks = self
                .locks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            // an entry only the map references is idle
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks
                .entry(user_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        lock.lock_owned().await
    }

    /// Number of users with a lock entry; idle entries are dropped on the next acquire.
    pub fn tracked_users(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_user_waits() {
        let guard = UserSyncGuard::new();
        let permit = guard.acquire("u1").await;

        let blocked = tokio::time::timeout(Duration::from_millis(50), guard.acquire("u1")).await;
        assert!(blocked.is_err(), "Second round for the same user must wait");

        drop(permit);
        let again = tokio::time::timeout(Duration::from_millis(50), guard.acquire("u1")).await;
        assert!(again.is_ok(), "Lock should be free after the permit is dropped");
    }

    #[tokio::test]
    async fn test_different_users_do_not_block() {
        let guard = UserSyncGuard::new();
        let _u1 = guard.acquire("u1").await;
        let u2 = tokio::time::timeout(Duration::from_millis(50), guard.acquire("u2")).await;
        assert!(u2.is_ok());
    }

    #[tokio::test]
    async fn test_idle_entries_are_pruned() {
        let guard = UserSyncGuard::new();
        for i in 0..100 {
            let _permit = guard.acquire(&format!("user-{}", i)).await;
        }
        assert_eq!(guard.tracked_users(), 1);

        let held = guard.acquire("busy").await;
        let _other = guard.acquire("other").await;
        assert_eq!(guard.tracked_users(), 2, "Held locks must survive pruning");
        drop(held);
    }
}
