//! Connection ids for logging and correlation.

use std::{
    fmt,
    sync::{
        Arc, OnceLock,
        atomic::{AtomicU32, Ordering},
    },
};

/// Identifier of one connection, unique among connections that share an
/// allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(u32);

impl ConnId {
    /// Raw id value.
    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Monotonic id counter shared by dialers and listeners.
///
/// Pass the same allocator to every [`crate::Dialer`] and
/// [`crate::Listener`] whose connections must have distinct ids.
/// [`ConnIdAllocator::process`] returns the instance used by the
/// convenience constructors.
#[derive(Debug, Default)]
pub struct ConnIdAllocator {
    last: AtomicU32,
}

impl ConnIdAllocator {
    /// Fresh allocator; the first id is 1.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide allocator.
    pub fn process() -> Arc<Self> {
        static PROCESS: OnceLock<Arc<ConnIdAllocator>> = OnceLock::new();
        Arc::clone(PROCESS.get_or_init(|| Arc::new(Self::new())))
    }

    /// Allocate the next id.
    pub fn next_id(&self) -> ConnId {
        ConnId(self.last.fetch_add(1, Ordering::Relaxed).wrapping_add(1))
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, thread};

    use super::*;

    #[test]
    fn ids_start_at_one_and_increase() {
        let ids = ConnIdAllocator::new();
        assert_eq!(ids.next_id().get(), 1);
        assert_eq!(ids.next_id().get(), 2);
        assert!(ids.next_id() > ConnId(2));
    }

    #[test]
    fn concurrent_allocation_never_repeats() {
        let ids = Arc::new(ConnIdAllocator::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ids = Arc::clone(&ids);
                thread::spawn(move || (0..1000).map(|_| ids.next_id()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "duplicate id {id}");
            }
        }
        assert_eq!(seen.len(), 4000);
    }

    #[test]
    fn process_allocator_is_shared() {
        let a = ConnIdAllocator::process();
        let b = ConnIdAllocator::process();
        assert!(Arc::ptr_eq(&a, &b));
        let first = a.next_id();
        assert!(b.next_id() > first);
    }
}
