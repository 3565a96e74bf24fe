use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle of a caller-side handle.
///
/// Transitions only go `Live -> Disposed`. There is no way back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Liveness {
    /// The handle may still be used to reach the remote object.
    Live = 0,
    /// The handle has been released. Invocations fail fast.
    Disposed = 1,
}

impl Liveness {
    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Liveness::Live,
            _ => Liveness::Disposed,
        }
    }
}

/// Write-once disposal state shared by every entry point of a handle.
///
/// A compare-and-set decides the single winner among concurrent disposers,
/// so no lock is involved.
#[derive(Debug)]
pub struct DisposeFlag {
    state: AtomicU8,
}

impl DisposeFlag {
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(Liveness::Live as u8),
        }
    }

    pub fn state(&self) -> Liveness {
        Liveness::from_raw(self.state.load(Ordering::Acquire))
    }

    pub fn is_disposed(&self) -> bool {
        self.state() == Liveness::Disposed
    }

    /// Attempts the `Live -> Disposed` transition.
    ///
    /// Returns `true` for exactly one caller over the lifetime of the flag.
    pub fn try_dispose(&self) -> bool {
        self.state
            .compare_exchange(
                Liveness::Live as u8,
                Liveness::Disposed as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

impl Default for DisposeFlag {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_starts_live() {
        let flag = DisposeFlag::new();
        assert_eq!(flag.state(), Liveness::Live);
        assert!(!flag.is_disposed());
    }

    #[test]
    fn test_transition_is_one_way() {
        let flag = DisposeFlag::new();
        assert!(flag.try_dispose());
        assert!(flag.is_disposed());
        assert!(!flag.try_dispose());
        assert_eq!(flag.state(), Liveness::Disposed);
    }

    #[test]
    fn test_single_winner_across_threads() {
        let flag = Arc::new(DisposeFlag::new());
        let winners = Arc::new(AtomicUsize::new(0));

        let threads: Vec<_> = (0..64)
            .map(|_| {
                let flag = Arc::clone(&flag);
                let winners = Arc::clone(&winners);
                std::thread::spawn(move || {
                    if flag.try_dispose() {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for thread in threads {
            thread.join().unwrap();
        }

        assert_eq!(winners.load(Ordering::SeqCst), 1);
        assert!(flag.is_disposed());
    }
}
