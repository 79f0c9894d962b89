//! Generic round-robin pool.
//!
//! The concurrency primitive the rest of the fleet is built on: an ordered
//! container that cycles through its elements and suspends callers while it
//! is empty. Suspension is indefinite; the only way out is a concurrent
//! [`add`](RoundRobinPool::add).

use tokio::sync::{Mutex, Notify};

struct Inner<T> {
    items: Vec<T>,
    cursor: usize,
}

/// Ordered container cycling through its elements.
///
/// `next()` returns elements in insertion-cyclic order and never skips or
/// repeats an element within a stable cycle (no concurrent add/remove).
/// Cursor bookkeeping and collection mutation always happen under the same
/// lock acquisition, so a size check can never observe a cursor that has
/// outrun the collection.
pub struct RoundRobinPool<T> {
    inner: Mutex<Inner<T>>,
    added: Notify,
}

impl<T> RoundRobinPool<T>
where
    T: Clone,
{
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: Vec::new(),
                cursor: 0,
            }),
            added: Notify::new(),
        }
    }

    /// Creates a pool seeded with the given elements.
    pub fn from_items(items: Vec<T>) -> Self {
        Self {
            inner: Mutex::new(Inner { items, cursor: 0 }),
            added: Notify::new(),
        }
    }

    /// Appends an element and wakes every caller suspended in [`next`].
    ///
    /// [`next`]: RoundRobinPool::next
    pub async fn add(&self, item: T) {
        {
            let mut inner = self.inner.lock().await;
            inner.items.push(item);
        }
        // One new element un-blocks all waiters: next() does not consume.
        self.added.notify_waiters();
    }

    /// Returns the next element in insertion-cyclic order.
    ///
    /// If the pool is empty the caller suspends until an element is added.
    /// There is no timeout and no error path; unbounded waiting here is a
    /// deliberate contract, not a failure mode.
    pub async fn next(&self) -> T {
        loop {
            // Register interest before the emptiness check so an add that
            // lands between the check and the await still wakes us.
            let notified = self.added.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut inner = self.inner.lock().await;
                if !inner.items.is_empty() {
                    let item = inner.items[inner.cursor].clone();
                    inner.cursor = (inner.cursor + 1) % inner.items.len();
                    return item;
                }
            }

            notified.await;
        }
    }

    /// Returns the next element if the pool is non-empty, without waiting.
    pub async fn try_next(&self) -> Option<T> {
        let mut inner = self.inner.lock().await;
        if inner.items.is_empty() {
            return None;
        }
        let item = inner.items[inner.cursor].clone();
        inner.cursor = (inner.cursor + 1) % inner.items.len();
        Some(item)
    }

    /// Returns the current element count.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.items.len()
    }

    /// Returns true if the pool is currently empty.
    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.items.is_empty()
    }

    /// Atomically empties the pool and returns everything it held.
    ///
    /// Used at shutdown to take ownership of the remaining elements.
    pub async fn drain(&self) -> Vec<T> {
        let mut inner = self.inner.lock().await;
        inner.cursor = 0;
        std::mem::take(&mut inner.items)
    }
}

impl<T> RoundRobinPool<T>
where
    T: Clone + PartialEq,
{
    /// Removes an element if present; returns whether anything was removed.
    ///
    /// The cursor is reset to the front if it now exceeds the shrunk size.
    pub async fn remove(&self, item: &T) -> bool {
        let mut inner = self.inner.lock().await;
        let Some(pos) = inner.items.iter().position(|x| x == item) else {
            return false;
        };
        inner.items.remove(pos);
        if inner.cursor >= inner.items.len() {
            inner.cursor = 0;
        }
        true
    }
}

impl<T> Default for RoundRobinPool<T>
where
    T: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn cycles_in_insertion_order() {
        let pool = RoundRobinPool::from_items(vec!["a", "b", "c"]);

        let mut seen = Vec::new();
        for _ in 0..6 {
            seen.push(pool.next().await);
        }
        assert_eq!(seen, vec!["a", "b", "c", "a", "b", "c"]);
    }

    #[tokio::test]
    async fn visits_each_element_evenly() {
        // K elements, N draws: each element seen floor(N/K) or ceil(N/K) times.
        let pool = RoundRobinPool::from_items(vec![1u32, 2, 3]);
        let n = 100;

        let mut counts: HashMap<u32, usize> = HashMap::new();
        for _ in 0..n {
            *counts.entry(pool.next().await).or_insert(0) += 1;
        }

        for element in [1, 2, 3] {
            let count = counts[&element];
            assert!(count == n / 3 || count == n / 3 + 1, "uneven count {count}");
        }
    }

    #[tokio::test]
    async fn next_suspends_until_add() {
        let pool = Arc::new(RoundRobinPool::new());

        let waiter = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.next().await })
        };

        // The waiter must still be suspended on an empty pool.
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        pool.add("late").await;

        let got = timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake after add")
            .expect("waiter task should not panic");
        assert_eq!(got, "late");
    }

    #[tokio::test]
    async fn add_wakes_all_waiters() {
        let pool: Arc<RoundRobinPool<&str>> = Arc::new(RoundRobinPool::new());

        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let pool = Arc::clone(&pool);
                tokio::spawn(async move { pool.next().await })
            })
            .collect();

        tokio::task::yield_now().await;
        pool.add("x").await;

        for waiter in waiters {
            let got = timeout(Duration::from_secs(1), waiter)
                .await
                .expect("all waiters should wake on a single add")
                .expect("waiter task should not panic");
            assert_eq!(got, "x");
        }
    }

    #[tokio::test]
    async fn remove_resets_out_of_range_cursor() {
        let pool = RoundRobinPool::from_items(vec!["a", "b", "c"]);

        // Advance the cursor to the last slot.
        pool.next().await;
        pool.next().await;

        assert!(pool.remove(&"c").await);
        assert!(!pool.remove(&"c").await);
        assert_eq!(pool.len().await, 2);

        // Cursor pointed past the shrunk collection and was reset.
        assert_eq!(pool.next().await, "a");
        assert_eq!(pool.next().await, "b");
    }

    #[tokio::test]
    async fn drain_empties_and_returns_everything() {
        let pool = RoundRobinPool::from_items(vec![1, 2, 3]);

        let drained = pool.drain().await;
        assert_eq!(drained, vec![1, 2, 3]);
        assert!(pool.is_empty().await);
        assert_eq!(pool.try_next().await, None);
    }

    #[tokio::test]
    async fn try_next_does_not_wait() {
        let pool: RoundRobinPool<u8> = RoundRobinPool::new();
        assert_eq!(pool.try_next().await, None);

        pool.add(7).await;
        assert_eq!(pool.try_next().await, Some(7));
    }
}
