use crate::error::RegistryError;
use crate::id::ReferenceId;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, trace};

/// Host-side table of objects handed out by reference.
///
/// Allocation is monotonic: an identifier that has been released is never
/// handed out again, which lets lookups tell "never existed" apart from
/// "already released" without keeping tombstones around.
///
/// The registry lives as long as its host. Once [`close`](Self::close) runs,
/// every operation fails with [`RegistryError::Closed`].
pub struct ReferenceRegistry<T> {
    inner: RwLock<RegistryState<T>>,
}

struct RegistryState<T> {
    next: u64,
    live: HashMap<ReferenceId, T>,
    closed: bool,
}

impl<T> RegistryState<T> {
    fn missing(&self, id: ReferenceId) -> RegistryError {
        if self.closed {
            RegistryError::Closed
        } else if id.0 != 0 && id.0 < self.next {
            RegistryError::Released(id)
        } else {
            RegistryError::NotFound(id)
        }
    }
}

impl<T> ReferenceRegistry<T> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryState {
                // 0 is ReferenceId::GLOBAL and never allocated.
                next: 1,
                live: HashMap::new(),
                closed: false,
            }),
        }
    }

    // Entries are plain values; a panicking writer cannot leave them half-updated.
    fn read(&self) -> RwLockReadGuard<'_, RegistryState<T>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState<T>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores `value` under a fresh identifier.
    pub fn track(&self, value: T) -> Result<ReferenceId, RegistryError> {
        let mut state = self.write();
        if state.closed {
            return Err(RegistryError::Closed);
        }
        let id = ReferenceId(state.next);
        state.next += 1;
        state.live.insert(id, value);
        trace!(%id, live = state.live.len(), "tracked reference");
        Ok(id)
    }

    /// Removes a live identifier, returning what it referred to.
    pub fn release(&self, id: ReferenceId) -> Result<T, RegistryError> {
        let mut state = self.write();
        if state.closed {
            return Err(RegistryError::Closed);
        }
        match state.live.remove(&id) {
            Some(value) => {
                trace!(%id, live = state.live.len(), "released reference");
                Ok(value)
            }
            None => Err(state.missing(id)),
        }
    }

    pub fn is_live(&self, id: ReferenceId) -> bool {
        let state = self.read();
        !state.closed && state.live.contains_key(&id)
    }

    pub fn live_count(&self) -> usize {
        self.read().live.len()
    }

    pub fn is_closed(&self) -> bool {
        self.read().closed
    }

    /// Tears the registry down and hands back everything still live.
    ///
    /// Calling this more than once is harmless; later calls return nothing.
    pub fn close(&self) -> Vec<T> {
        let mut state = self.write();
        if state.closed {
            return Vec::new();
        }
        state.closed = true;
        let drained: Vec<T> = state.live.drain().map(|(_, value)| value).collect();
        debug!(outstanding = drained.len(), "reference registry closed");
        drained
    }
}

impl<T: Clone> ReferenceRegistry<T> {
    /// Looks up a live identifier.
    pub fn get(&self, id: ReferenceId) -> Result<T, RegistryError> {
        let state = self.read();
        if state.closed {
            return Err(RegistryError::Closed);
        }
        state
            .live
            .get(&id)
            .cloned()
            .ok_or_else(|| state.missing(id))
    }
}

impl<T> Default for ReferenceRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_ids_are_monotonic_and_never_reused() {
        let registry = ReferenceRegistry::new();
        let first = registry.track("a").unwrap();
        let second = registry.track("b").unwrap();
        assert_eq!(first, ReferenceId(1));
        assert_eq!(second, ReferenceId(2));

        registry.release(first).unwrap();
        let third = registry.track("c").unwrap();
        assert_eq!(third, ReferenceId(3));
    }

    #[test]
    fn test_lookup_failures_are_deterministic() {
        let registry = ReferenceRegistry::new();
        let id = registry.track(10u32).unwrap();
        assert_eq!(registry.get(id), Ok(10));

        assert_eq!(registry.release(id), Ok(10));
        assert_eq!(registry.get(id), Err(RegistryError::Released(id)));
        assert_eq!(registry.release(id), Err(RegistryError::Released(id)));

        let unknown = ReferenceId(99);
        assert_eq!(registry.get(unknown), Err(RegistryError::NotFound(unknown)));
        assert_eq!(
            registry.get(ReferenceId::GLOBAL),
            Err(RegistryError::NotFound(ReferenceId::GLOBAL))
        );
    }

    #[test]
    fn test_close_invalidates_everything() {
        let registry = ReferenceRegistry::new();
        let a = registry.track(1u8).unwrap();
        let _b = registry.track(2u8).unwrap();

        let mut drained = registry.close();
        drained.sort();
        assert_eq!(drained, vec![1, 2]);
        assert!(registry.is_closed());
        assert!(!registry.is_live(a));
        assert_eq!(registry.live_count(), 0);

        assert_eq!(registry.get(a), Err(RegistryError::Closed));
        assert_eq!(registry.release(a), Err(RegistryError::Closed));
        assert_eq!(registry.track(3u8), Err(RegistryError::Closed));
        assert!(registry.close().is_empty());
    }

    #[test]
    fn test_concurrent_tracking_yields_unique_ids() {
        let registry = Arc::new(ReferenceRegistry::new());
        let threads: Vec<_> = (0..8)
            .map(|t| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    (0..100)
                        .map(|i| registry.track(t * 100 + i).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for thread in threads {
            for id in thread.join().unwrap() {
                assert!(seen.insert(id), "identifier {id} handed out twice");
            }
        }
        assert_eq!(registry.live_count(), 800);
    }
}
