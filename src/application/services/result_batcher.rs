//! Coalescing of results produced on worker threads.

use std::collections::HashMap;
use std::hash::Hash;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::trace;

/// Collects results keyed by request and signals the consumer once per batch.
///
/// The first insert after a drain sends one `()` on the signal channel; later
/// inserts only update the map until the consumer drains it. A newer result
/// for a key replaces the older one.
pub struct ResultBatcher<K, V> {
    pending: Mutex<HashMap<K, V>>,
    signal: mpsc::UnboundedSender<()>,
}

impl<K: Eq + Hash, V> ResultBatcher<K, V> {
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<()>) {
        let (signal, rx) = mpsc::unbounded_channel();
        let batcher = Self {
            pending: Mutex::new(HashMap::new()),
            signal,
        };
        (batcher, rx)
    }

    pub fn insert(&self, key: K, value: V) {
        let first = {
            let mut pending = self.pending.lock();
            let first = pending.is_empty();
            pending.insert(key, value);
            first
        };
        if first && self.signal.send(()).is_err() {
            trace!("Batch signal receiver dropped");
        }
    }

    /// Takes every pending result.
    pub fn drain(&self) -> HashMap<K, V> {
        std::mem::take(&mut *self.pending.lock())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_one_signal_per_batch() {
        let (batcher, mut rx) = ResultBatcher::new();
        batcher.insert("a", 1);
        batcher.insert("b", 2);
        batcher.insert("c", 3);

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());

        assert_eq!(batcher.drain().len(), 3);
        batcher.insert("d", 4);
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_last_write_wins() {
        let (batcher, _rx) = ResultBatcher::new();
        batcher.insert("a", 1);
        batcher.insert("a", 2);
        assert_eq!(batcher.drain().get("a"), Some(&2));
        assert!(batcher.is_empty());
    }

    #[test]
    fn test_concurrent_inserts_signal_once() {
        let (batcher, mut rx) = ResultBatcher::new();
        let batcher = Arc::new(batcher);
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let batcher = batcher.clone();
                std::thread::spawn(move || {
                    for i in 0..25 {
                        batcher.insert(t * 100 + i, i);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(batcher.len(), 100);
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_insert_without_consumer_still_batches() {
        let (batcher, rx) = ResultBatcher::new();
        drop(rx);

        batcher.insert("a", 1);
        batcher.insert("b", 2);

        assert_eq!(batcher.drain().len(), 2);
    }
}
