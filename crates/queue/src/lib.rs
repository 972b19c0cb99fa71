//! `queue` crate: per-card serialization of automation dispatches.
//!
//! Dispatches against different cards run freely in parallel. Dispatches
//! against the *same* card wait for each other, in arrival order, so stage
//! transitions and field writes from one dispatch are never interleaved with
//! another's.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

/// Holds the exclusive turn for one card. Dropping it lets the next
/// dispatch for that card proceed.
pub struct CardTurn {
    card_id: String,
    _guard: OwnedMutexGuard<()>,
}

impl CardTurn {
    pub fn card_id(&self) -> &str {
        &self.card_id
    }
}

/// Registry of one async mutex per card with an in-flight dispatch.
#[derive(Clone, Default)]
pub struct CardLocks {
    inner: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl CardLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the card's turn. tokio's mutex is FIFO, so waiters are
    /// served in arrival order.
    pub async fn acquire(&self, card_id: &str) -> CardTurn {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(|p| p.into_inner());
            // Drop entries nobody is holding or waiting on.
            map.retain(|_, l| Arc::strong_count(l) > 1);
            map.entry(card_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        let guard = lock.lock_owned().await;
        debug!(card_id, "acquired card dispatch turn");
        CardTurn {
            card_id: card_id.to_string(),
            _guard: guard,
        }
    }

    /// Number of cards currently tracked (held or waited on).
    pub fn tracked(&self) -> usize {
        let map = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        map.values().filter(|l| Arc::strong_count(l) > 1).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_card_dispatches_are_serialized() {
        let locks = CardLocks::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let first = locks.acquire("card-1").await;

        let waiter = {
            let locks = locks.clone();
            let log = log.clone();
            tokio::spawn(async move {
                let _turn = locks.acquire("card-1").await;
                log.lock().unwrap().push("second");
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        log.lock().unwrap().push("first");
        drop(first);

        waiter.await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn different_cards_do_not_block_each_other() {
        let locks = CardLocks::new();
        let _a = locks.acquire("a").await;
        let b = tokio::time::timeout(Duration::from_millis(50), locks.acquire("b")).await;
        assert!(b.is_ok());
        assert_eq!(locks.tracked(), 2);
    }

    #[tokio::test]
    async fn released_cards_are_forgotten() {
        let locks = CardLocks::new();
        {
            let turn = locks.acquire("a").await;
            assert_eq!(turn.card_id(), "a");
        }
        assert_eq!(locks.tracked(), 0);
    }
}
