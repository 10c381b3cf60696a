//! Single-slot, latest-value-wins cell.
//!
//! A producer never waits: a new value replaces an unread one. A consumer can
//! poll or wait with a deadline.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::{timeout_at, Instant};

/// Overwrite-on-full slot shared between one producer and one consumer.
#[derive(Debug)]
pub struct LatestCell<T> {
    slot: Mutex<Option<T>>,
    notify: Notify,
}

impl<T> Default for LatestCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> LatestCell<T> {
    /// Empty cell.
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            notify: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<T>> {
        // A panicking holder cannot leave the Option half-written.
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Store `value`, returning the unread value it replaced.
    pub fn put(&self, value: T) -> Option<T> {
        let previous = self.lock().replace(value);
        self.notify.notify_one();
        previous
    }

    /// Modify the pending value in place, starting from `T::default()` when empty.
    pub fn update<F>(&self, f: F)
    where
        T: Default,
        F: FnOnce(&mut T),
    {
        f(self.lock().get_or_insert_with(T::default));
        self.notify.notify_one();
    }

    /// Take the pending value, if any.
    pub fn take(&self) -> Option<T> {
        self.lock().take()
    }

    /// Whether a value is pending.
    pub fn is_empty(&self) -> bool {
        self.lock().is_none()
    }

    /// Wait for a value until `deadline`.
    pub async fn recv_until(&self, deadline: Instant) -> Option<T> {
        loop {
            // Register before checking so a put in between is not missed.
            let notified = self.notify.notified();
            if let Some(value) = self.take() {
                return Some(value);
            }
            if timeout_at(deadline, notified).await.is_err() {
                return self.take();
            }
        }
    }

    /// Wait for a value for at most `timeout`.
    pub async fn recv_timeout(&self, timeout: Duration) -> Option<T> {
        self.recv_until(Instant::now() + timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn latest_value_wins() {
        let cell = LatestCell::new();
        assert_eq!(cell.put('A'), None);
        assert_eq!(cell.put('B'), Some('A'));
        assert_eq!(cell.take(), Some('B'));
        assert_eq!(cell.take(), None);
        assert!(cell.is_empty());
    }

    #[test]
    fn update_merges_into_pending() {
        let cell: LatestCell<Vec<u8>> = LatestCell::new();
        cell.update(|v| v.push(1));
        cell.update(|v| v.push(2));
        assert_eq!(cell.take(), Some(vec![1, 2]));
        cell.update(|v| v.push(3));
        assert_eq!(cell.take(), Some(vec![3]));
    }

    #[test]
    fn producer_never_blocks() {
        let cell = LatestCell::new();
        for i in 0..10_000u32 {
            cell.put(i);
        }
        assert_eq!(cell.take(), Some(9_999));
    }

    #[tokio::test(start_paused = true)]
    async fn recv_times_out_when_empty() {
        let cell: LatestCell<u8> = LatestCell::new();
        let start = Instant::now();
        assert_eq!(cell.recv_timeout(Duration::from_millis(100)).await, None);
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn recv_wakes_on_put() {
        let cell = Arc::new(LatestCell::new());
        let producer = Arc::clone(&cell);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            producer.put(1u8);
            producer.put(2u8);
        });
        assert_eq!(cell.recv_timeout(Duration::from_secs(1)).await, Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn stale_permit_does_not_fake_a_value() {
        let cell = LatestCell::new();
        cell.put(5u8);
        assert_eq!(cell.take(), Some(5));
        // the permit from the put above is still stored
        assert_eq!(cell.recv_timeout(Duration::from_millis(5)).await, None);
    }
}
