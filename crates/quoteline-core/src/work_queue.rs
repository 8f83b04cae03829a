//! Lock-free work queue for distributing identifiers across parallel workers

use std::sync::atomic::{AtomicUsize, Ordering};

/// Lock-free work queue handing out items together with their input position.
///
/// Workers call [`next()`](WorkQueue::next) to atomically claim the next item.
pub struct WorkQueue<'a, S> {
    items: &'a [S],
    cursor: AtomicUsize,
}

impl<'a, S> WorkQueue<'a, S> {
    pub fn new(items: &'a [S]) -> Self {
        Self {
            items,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Claim the next item and its index in the input (lock-free)
    pub fn next(&self) -> Option<(usize, &'a S)> {
        let i = self.cursor.fetch_add(1, Ordering::Relaxed);
        self.items.get(i).map(|item| (i, item))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yields_items_with_index() {
        let items = ["a", "b", "c"];
        let q = WorkQueue::new(&items);
        assert_eq!(q.next(), Some((0, &"a")));
        assert_eq!(q.next(), Some((1, &"b")));
        assert_eq!(q.next(), Some((2, &"c")));
        assert_eq!(q.next(), None);
    }

    #[test]
    fn empty_queue() {
        let items: [i32; 0] = [];
        let q = WorkQueue::new(&items);
        assert_eq!(q.next(), None);
    }

    #[test]
    fn concurrent_claims_are_unique() {
        let items: Vec<usize> = (0..1000).collect();
        let q = WorkQueue::new(&items);
        let seen = std::sync::Mutex::new(Vec::new());
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    while let Some((i, _)) = q.next() {
                        seen.lock().unwrap().push(i);
                    }
                });
            }
        });
        let mut seen = seen.into_inner().unwrap();
        seen.sort_unstable();
        assert_eq!(seen, items);
    }
}
