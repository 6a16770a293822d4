use std::{
    collections::HashMap,
    hash::Hash,
    sync::{Arc, Mutex, Weak},
};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// A pool of async mutexes, one per key.
///
/// The map only holds weak references; an entry lives as long as somebody
/// holds or waits on its guard and is pruned on the next `lock` call after
/// that.
pub struct KeyedLocks<K> {
    entries: Mutex<HashMap<K, Weak<AsyncMutex<()>>>>,
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<K> KeyedLocks<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: K) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut entries = self
                .entries
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            entries.retain(|_, entry| entry.strong_count() > 0);

            if let Some(mutex) = entries.get(&key).and_then(Weak::upgrade) {
                mutex
            } else {
                let mutex = Arc::new(AsyncMutex::new(()));
                entries.insert(key, Arc::downgrade(&mutex));
                mutex
            }
        };

        mutex.lock_owned().await
    }

    /// Number of keys currently locked or waited on.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .values()
            .filter(|entry| entry.strong_count() > 0)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn released_keys_are_evicted() {
        let locks = KeyedLocks::new();

        let a = locks.lock(1).await;
        let b = locks.lock(2).await;
        assert_eq!(locks.len(), 2);

        drop(a);
        drop(b);
        assert_eq!(locks.len(), 0);

        let _c = locks.lock(3).await;
        assert_eq!(locks.entries.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn same_key_is_serialized() {
        let locks = Arc::new(KeyedLocks::new());
        let guard = locks.lock("user").await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.lock("user").await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn different_keys_do_not_block() {
        let locks = KeyedLocks::new();
        let _a = locks.lock("a").await;
        tokio::time::timeout(Duration::from_secs(1), locks.lock("b"))
            .await
            .unwrap();
    }
}
