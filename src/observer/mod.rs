//! Single-slot observable values.
//!
//! A [`Property`] holds exactly one immutable value. One writer publishes new
//! values with [`Property::update`]; any number of readers take the current
//! value with [`Property::value`] without blocking. Each read returns a whole
//! published value, never a mix of an old and a new one.
//!
//! Readers that need to react to publications can hold a [`PropertyUpdates`]
//! handle, which reports a sequence number bumped on every update.
//!
//! # Example
//!
//! ```
//! use spire_trust::observer::Property;
//!
//! # async fn example() {
//! let property = Property::new(String::from("first"));
//! let mut updates = property.observe();
//!
//! property.update(String::from("second"));
//!
//! assert_eq!(updates.changed().await, Some(1));
//! assert_eq!(property.value().as_str(), "second");
//! # }
//! ```

use arc_swap::ArcSwap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// Holder of the latest published value of type `T`.
///
/// Updates are expected from a single writer. Reads are lock-free.
pub struct Property<T> {
    value: ArcSwap<T>,
    seq: watch::Sender<u64>,
}

impl<T: fmt::Debug> fmt::Debug for Property<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("value", &self.value.load_full())
            .field("seq", &*self.seq.borrow())
            .finish()
    }
}

impl<T> Property<T> {
    /// Creates a property holding `initial`. The sequence number starts at 0.
    pub fn new(initial: T) -> Self {
        Self::from_arc(Arc::new(initial))
    }

    /// Creates a property holding an already shared value.
    pub fn from_arc(initial: Arc<T>) -> Self {
        let (seq, _) = watch::channel(0);
        Self {
            value: ArcSwap::new(initial),
            seq,
        }
    }

    /// Replaces the held value and notifies observers.
    pub fn update(&self, value: T) {
        self.update_arc(Arc::new(value));
    }

    /// Replaces the held value with an already shared one and notifies
    /// observers.
    pub fn update_arc(&self, value: Arc<T>) {
        self.value.store(value);
        // Bumped after the store: an observer woken by the new number always
        // reads the value that produced it, or a newer one.
        self.seq.send_modify(|seq| *seq = seq.wrapping_add(1));
    }

    /// Returns the most recently published value.
    pub fn value(&self) -> Arc<T> {
        self.value.load_full()
    }

    /// Returns the number of updates published so far.
    pub fn sequence(&self) -> u64 {
        *self.seq.borrow()
    }

    /// Returns a handle for waiting on future updates.
    ///
    /// Only updates published after this call are reported by
    /// [`PropertyUpdates::changed`].
    pub fn observe(&self) -> PropertyUpdates {
        PropertyUpdates {
            rx: self.seq.subscribe(),
        }
    }
}

impl<T: Default> Default for Property<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// Notifications of updates to a [`Property`].
///
/// Notifications coalesce: a slow observer sees only the latest sequence
/// number, not one notification per update.
#[derive(Clone, Debug)]
pub struct PropertyUpdates {
    rx: watch::Receiver<u64>,
}

impl PropertyUpdates {
    /// Waits for the next update and returns its sequence number.
    ///
    /// Returns `None` once the property has been dropped.
    pub async fn changed(&mut self) -> Option<u64> {
        self.rx.changed().await.ok()?;
        Some(*self.rx.borrow_and_update())
    }

    /// Returns the last sequence number without waiting.
    pub fn last(&self) -> u64 {
        *self.rx.borrow()
    }

    /// Waits until the sequence number satisfies `f`.
    ///
    /// Returns immediately if the current sequence number already does.
    /// Returns `None` if the property is dropped first.
    pub async fn wait_for<F>(&mut self, mut f: F) -> Option<u64>
    where
        F: FnMut(&u64) -> bool,
    {
        let current = self.last();
        if f(&current) {
            return Some(current);
        }
        loop {
            let seq = self.changed().await?;
            if f(&seq) {
                return Some(seq);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[derive(Debug, Default)]
    struct Pair {
        left: u64,
        right: u64,
    }

    #[test]
    fn test_value_returns_latest_update() {
        let property = Property::new(1);
        assert_eq!(*property.value(), 1);

        property.update(2);
        property.update(3);

        assert_eq!(*property.value(), 3);
        assert_eq!(property.sequence(), 2);
    }

    #[test]
    fn test_earlier_snapshot_is_unaffected_by_update() {
        let property = Property::new(String::from("old"));
        let snapshot = property.value();

        property.update(String::from("new"));

        assert_eq!(snapshot.as_str(), "old");
        assert_eq!(property.value().as_str(), "new");
    }

    #[tokio::test]
    async fn test_changed_reports_sequence() {
        let property = Arc::new(Property::new(0u32));
        let mut updates = property.observe();
        assert_eq!(updates.last(), 0);

        let writer = Arc::clone(&property);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            writer.update(7);
        });

        let seq = tokio::time::timeout(Duration::from_secs(1), updates.changed())
            .await
            .expect("update within timeout");
        assert_eq!(seq, Some(1));
        assert_eq!(*property.value(), 7);
    }

    #[tokio::test]
    async fn test_changed_returns_none_after_drop() {
        let property = Property::new(0u8);
        let mut updates = property.observe();
        drop(property);

        assert_eq!(updates.changed().await, None);
    }

    #[tokio::test]
    async fn test_wait_for_immediate_satisfaction() {
        let property = Property::new(());
        property.update(());
        property.update(());
        let mut updates = property.observe();

        assert_eq!(updates.wait_for(|&seq| seq >= 2).await, Some(2));
    }

    #[tokio::test]
    async fn test_wait_for_skips_unsatisfying_updates() {
        let property = Arc::new(Property::new(0u64));
        let mut updates = property.observe();

        let writer = Arc::clone(&property);
        tokio::spawn(async move {
            for i in 1..=5 {
                writer.update(i);
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        });

        let seq = tokio::time::timeout(Duration::from_secs(1), updates.wait_for(|&seq| seq >= 5))
            .await
            .expect("wait_for within timeout");
        assert_eq!(seq, Some(5));
        assert_eq!(*property.value(), 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_readers_never_see_torn_values() {
        let property = Arc::new(Property::new(Pair::default()));

        let mut readers = Vec::new();
        for _ in 0..4 {
            let property = Arc::clone(&property);
            readers.push(tokio::spawn(async move {
                let mut last = 0;
                for _ in 0..10_000 {
                    let pair = property.value();
                    assert_eq!(pair.left, pair.right);
                    assert!(pair.left >= last, "values never go backwards");
                    last = pair.left;
                    tokio::task::yield_now().await;
                }
            }));
        }

        for i in 1..=1_000 {
            property.update(Pair { left: i, right: i });
        }

        for reader in readers {
            reader.await.unwrap();
        }
        assert_eq!(property.value().left, 1_000);
    }
}
