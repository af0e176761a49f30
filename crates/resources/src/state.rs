//! Shared/exclusive lock state of a single resource

use chords_errors::{AllocationError, Result};
use chords_types::Request;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_RESOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a resource state
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceId(u64);

impl ResourceId {
    fn next() -> Self {
        Self(NEXT_RESOURCE_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Default)]
struct LockState {
    shared: usize,
    exclusive: bool,
    /// Live acquisitions, one entry per hold
    holders: Vec<Request>,
}

/// Shared/exclusive state machine embedded in every resource.
///
/// Invariants: an exclusive hold means no shared holds and exactly one
/// holder; shared holds mean no exclusive hold. Every transition happens
/// under one mutex, so `acquire`/`release` are atomic for concurrent callers.
#[derive(Debug)]
pub struct ResourceState {
    id: ResourceId,
    lock: Mutex<LockState>,
}

impl ResourceState {
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: ResourceId::next(),
            lock: Mutex::new(LockState::default()),
        }
    }

    #[must_use]
    pub fn id(&self) -> ResourceId {
        self.id
    }

    #[must_use]
    pub fn is_exclusive(&self) -> bool {
        self.lock.lock().exclusive
    }

    #[must_use]
    pub fn is_shared(&self) -> bool {
        self.lock.lock().shared > 0
    }

    #[must_use]
    pub fn shared_count(&self) -> usize {
        self.lock.lock().shared
    }

    /// Neither shared nor exclusive
    #[must_use]
    pub fn is_idle(&self) -> bool {
        let state = self.lock.lock();
        !state.exclusive && state.shared == 0
    }

    /// Snapshot of the requests currently holding this resource
    #[must_use]
    pub fn holders(&self) -> Vec<Request> {
        self.lock.lock().holders.clone()
    }

    #[must_use]
    pub fn can_acquire(&self, request: &Request) -> bool {
        let state = self.lock.lock();
        if state.exclusive {
            return false;
        }
        if request.is_exclusive() {
            return state.shared == 0;
        }
        true
    }

    /// Record a hold for `request`.
    ///
    /// `describe` names the owning resource in error messages.
    ///
    /// # Errors
    ///
    /// Returns `AllocationError::Unavailable` if the resource is held
    /// exclusively, or if an exclusive hold is requested while shared holds
    /// exist.
    pub fn acquire(&self, request: &Request, describe: impl FnOnce() -> String) -> Result<()> {
        let mut state = self.lock.lock();
        if state.exclusive {
            return Err(AllocationError::Unavailable {
                resource: describe(),
                reason: "held exclusively".to_string(),
            }
            .into());
        }
        if request.is_exclusive() {
            if state.shared > 0 {
                return Err(AllocationError::Unavailable {
                    resource: describe(),
                    reason: format!("{} shared holds prevent exclusive access", state.shared),
                }
                .into());
            }
            state.exclusive = true;
        } else {
            state.shared += 1;
        }
        state.holders.push(request.clone());
        Ok(())
    }

    /// Drop one hold recorded for `request`.
    ///
    /// # Errors
    ///
    /// Returns `AllocationError::NotHeld` if the released mode does not match
    /// the current state, or if no hold was recorded for an equal request.
    /// The state is left untouched on error.
    pub fn release(&self, request: &Request, describe: impl FnOnce() -> String) -> Result<()> {
        let mut state = self.lock.lock();
        let mode_matches = if request.is_exclusive() {
            state.exclusive
        } else {
            state.shared > 0 && !state.exclusive
        };
        let position = state.holders.iter().position(|held| held == request);
        let (true, Some(position)) = (mode_matches, position) else {
            return Err(AllocationError::NotHeld {
                resource: describe(),
                mode: request.mode().to_string(),
            }
            .into());
        };

        if request.is_exclusive() {
            state.exclusive = false;
        } else {
            state.shared -= 1;
        }
        state.holders.remove(position);
        Ok(())
    }
}

impl Default for ResourceState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn name() -> String {
        "test#0".to_string()
    }

    #[test]
    fn test_exclusive_blocks_everything() {
        let state = ResourceState::new();
        let exclusive = Request::exclusive("int");
        state.acquire(&exclusive, name).unwrap();
        assert!(state.is_exclusive());
        assert!(!state.can_acquire(&Request::shared("int")));
        assert!(!state.can_acquire(&exclusive));
        assert!(state.acquire(&Request::shared("int"), name).is_err());
        assert_eq!(state.holders(), vec![exclusive]);
    }

    #[test]
    fn test_shared_blocks_exclusive_only() {
        let state = ResourceState::new();
        let shared = Request::shared("int");
        state.acquire(&shared, name).unwrap();
        state.acquire(&shared, name).unwrap();
        assert_eq!(state.shared_count(), 2);
        assert!(state.can_acquire(&shared));
        assert!(!state.can_acquire(&Request::exclusive("int")));
        assert!(state.acquire(&Request::exclusive("int"), name).is_err());
        assert_eq!(state.shared_count(), 2);
    }

    #[test]
    fn test_release_requires_recorded_hold() {
        let state = ResourceState::new();
        state
            .acquire(&Request::shared("int").with("max_value", 2), name)
            .unwrap();
        // Same mode, different attributes: not the request that acquired it
        assert!(state.release(&Request::shared("int"), name).is_err());
        assert_eq!(state.shared_count(), 1);
        state
            .release(&Request::shared("int").with("max_value", 2), name)
            .unwrap();
        assert!(state.is_idle());
    }

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(ResourceState::new().id(), ResourceState::new().id());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Acquire(bool),
        Release(bool),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![any::<bool>().prop_map(Op::Acquire), any::<bool>().prop_map(Op::Release)]
    }

    proptest! {
        #[test]
        fn state_machine_invariants_hold(ops in proptest::collection::vec(op(), 0..64)) {
            let state = ResourceState::new();
            for op in ops {
                let (exclusive, acquiring) = match op {
                    Op::Acquire(exclusive) => (exclusive, true),
                    Op::Release(exclusive) => (exclusive, false),
                };
                let request = if exclusive { Request::exclusive("int") } else { Request::shared("int") };
                let before_shared = state.shared_count();
                let before_exclusive = state.is_exclusive();
                let result = if acquiring {
                    let allowed = state.can_acquire(&request);
                    let result = state.acquire(&request, name);
                    prop_assert_eq!(allowed, result.is_ok());
                    result
                } else {
                    state.release(&request, name)
                };
                if result.is_err() {
                    prop_assert_eq!(state.shared_count(), before_shared);
                    prop_assert_eq!(state.is_exclusive(), before_exclusive);
                }
                let holders = state.holders();
                if state.is_exclusive() {
                    prop_assert_eq!(state.shared_count(), 0);
                    prop_assert_eq!(holders.len(), 1);
                } else {
                    prop_assert_eq!(holders.len(), state.shared_count());
                }
            }
        }
    }
}
