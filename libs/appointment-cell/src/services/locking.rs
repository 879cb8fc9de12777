// libs/appointment-cell/src/services/locking.rs
//
// In-process scheduling locks. A reschedule holds the lock for every
// (tenant, provider, date) it touches from the conflict check until its writes
// (including any compensating delete) have finished.
//

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::NaiveDate;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;
use uuid::Uuid;

use crate::models::{CandidateSlot, ProviderRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotKey {
    pub tenant_id: Uuid,
    pub provider: ProviderRef,
    pub date: NaiveDate,
}

impl From<&CandidateSlot> for SlotKey {
    fn from(slot: &CandidateSlot) -> Self {
        Self {
            tenant_id: slot.tenant_id,
            provider: slot.provider,
            date: slot.date,
        }
    }
}

/// Held locks; released on drop.
pub struct SlotLockGuard {
    keys: Vec<SlotKey>,
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl SlotLockGuard {
    pub fn keys(&self) -> &[SlotKey] {
        &self.keys
    }
}

#[derive(Default)]
pub struct SlotLockRegistry {
    locks: Mutex<HashMap<SlotKey, Arc<AsyncMutex<()>>>>,
}

impl SlotLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire every key in sorted order so two requests touching the same
    /// pair of providers cannot deadlock.
    pub async fn acquire(&self, mut keys: Vec<SlotKey>) -> SlotLockGuard {
        keys.sort();
        keys.dedup();

        let mut guards = Vec::with_capacity(keys.len());
        for key in &keys {
            let lock = self.lock_for(key);
            guards.push(lock.lock_owned().await);
            debug!("Scheduling lock acquired: {} on {}", key.provider, key.date);
        }

        SlotLockGuard { keys, _guards: guards }
    }

    /// Number of keys currently tracked (held or awaited).
    pub fn tracked(&self) -> usize {
        let mut map = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        map.retain(|_, lock| Arc::strong_count(lock) > 1);
        map.len()
    }

    fn lock_for(&self, key: &SlotKey) -> Arc<AsyncMutex<()>> {
        let mut map = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Entries only referenced by the map are idle.
        map.retain(|_, lock| Arc::strong_count(lock) > 1);
        map.entry(*key).or_default().clone()
    }
}
