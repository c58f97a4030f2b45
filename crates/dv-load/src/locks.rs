//! Per-key exclusive locks.
//!
//! Satellite change detection is a read of the latest row followed by a
//! conditional append. Two batches doing that for the same parent at the
//! same time could both see the old row and both append. [`KeyLocks`] hands
//! out one async mutex per key so the read-then-append is serialised per
//! parent, without a lock over the whole vault.

use std::{
  collections::HashMap,
  sync::{Arc, Mutex, PoisonError},
};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Debug, Default)]
pub struct KeyLocks {
  slots: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

/// Holds the lock for one key until dropped. Unused slots are pruned on
/// release so the table only grows with contention, not with key count.
#[must_use = "the key is unlocked as soon as the guard is dropped"]
pub struct KeyGuard<'a> {
  locks: &'a KeyLocks,
  key:   String,
  guard: Option<OwnedMutexGuard<()>>,
}

impl KeyLocks {
  pub fn new() -> Self { Self::default() }

  /// Wait for exclusive access to `key`.
  ///
  /// Dropping the returned future mid-wait releases its claim on the slot
  /// and prunes it like a released guard.
  pub async fn lock(&self, key: impl Into<String>) -> KeyGuard<'_> {
    // Declared before the slot so it drops after the pending wait.
    let mut held = KeyGuard {
      locks: self,
      key:   key.into(),
      guard: None,
    };
    let slot = {
      let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
      Arc::clone(slots.entry(held.key.clone()).or_default())
    };
    held.guard = Some(slot.lock_owned().await);
    held
  }

  fn prune(&self, key: &str) {
    let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
    // Only the map holds the slot: no one else is waiting on it.
    if let Some(slot) = slots.get(key)
      && Arc::strong_count(slot) == 1
    {
      slots.remove(key);
    }
  }

  /// Number of keys currently locked or waited on.
  pub fn active(&self) -> usize {
    self
      .slots
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .len()
  }
}

impl Drop for KeyGuard<'_> {
  fn drop(&mut self) {
    self.guard.take();
    self.locks.prune(&self.key);
  }
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use super::*;

  #[tokio::test]
  async fn same_key_is_exclusive() {
    let locks = Arc::new(KeyLocks::new());
    let guard = locks.lock("a").await;

    let contender = {
      let locks = Arc::clone(&locks);
      tokio::spawn(async move {
        let _guard = locks.lock("a").await;
      })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!contender.is_finished());

    drop(guard);
    tokio::time::timeout(Duration::from_secs(1), contender)
      .await
      .expect("contender acquires after release")
      .unwrap();
  }

  #[tokio::test]
  async fn distinct_keys_do_not_block() {
    let locks = KeyLocks::new();
    let _a = locks.lock("a").await;
    let b = tokio::time::timeout(Duration::from_secs(1), locks.lock("b")).await;
    assert!(b.is_ok());
  }

  #[tokio::test]
  async fn released_slots_are_pruned() {
    let locks = KeyLocks::new();
    {
      let _a = locks.lock("a").await;
      let _b = locks.lock("b").await;
      assert_eq!(locks.active(), 2);
    }
    assert_eq!(locks.active(), 0);
  }

  #[tokio::test]
  async fn abandoned_wait_is_pruned() {
    let locks = KeyLocks::new();
    let held = locks.lock("a").await;

    let mut waiter = Box::pin(locks.lock("a"));
    let timed_out = tokio::time::timeout(Duration::from_millis(20), &mut waiter).await;
    assert!(timed_out.is_err());

    drop(held);
    assert_eq!(locks.active(), 1, "the waiter still claims the slot");
    drop(waiter);
    assert_eq!(locks.active(), 0);
  }
}
