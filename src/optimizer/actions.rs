//! Hook-point action registry
//!
//! Actions are callbacks invoked at defined points of the optimizer loop:
//! before the active-error computation, and before/after each iteration.
//! Registration identity is the `Arc` itself (pointer equality), mirroring
//! the original set-of-pointers semantics: insertion returns true iff newly
//! inserted, removal returns true iff present.
//!
//! During dispatch the registry is moved out of the optimizer and every hook
//! receives `&SparseOptimizer`, so neither the registry nor the graph can be
//! mutated from inside a hook.

use std::collections::HashMap;
use std::sync::Arc;

use crate::optimizer::SparseOptimizer;

/// Hook kinds at which actions can be registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    /// Invoked at the start of `compute_active_errors`
    ComputeActiveError,
    /// Invoked before each iteration of the optimizer loop
    PreIteration,
    /// Invoked after each iteration of the optimizer loop
    PostIteration,
}

/// A callback invoked at a hook point.
pub trait GraphAction: Send + Sync {
    /// `iteration` is the current iteration index, `-1` outside the loop.
    fn perform(&self, optimizer: &SparseOptimizer, iteration: i32);
}

/// Actions registered per hook kind, invoked in registration order.
#[derive(Default)]
pub struct ActionRegistry {
    actions: HashMap<ActionKind, Vec<Arc<dyn GraphAction>>>,
}

impl ActionRegistry {
    /// Register an action; returns true iff it was newly inserted.
    pub fn add(&mut self, kind: ActionKind, action: Arc<dyn GraphAction>) -> bool {
        let entries = self.actions.entry(kind).or_default();
        if entries.iter().any(|a| Arc::ptr_eq(a, &action)) {
            return false;
        }
        entries.push(action);
        true
    }

    /// Unregister an action; returns true iff it was present.
    pub fn remove(&mut self, kind: ActionKind, action: &Arc<dyn GraphAction>) -> bool {
        let Some(entries) = self.actions.get_mut(&kind) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|a| !Arc::ptr_eq(a, action));
        entries.len() != before
    }

    pub fn len(&self, kind: ActionKind) -> usize {
        self.actions.get(&kind).map_or(0, |entries| entries.len())
    }

    pub fn is_empty(&self, kind: ActionKind) -> bool {
        self.len(kind) == 0
    }

    pub(crate) fn run(&self, kind: ActionKind, optimizer: &SparseOptimizer, iteration: i32) {
        if let Some(entries) = self.actions.get(&kind) {
            for action in entries {
                action.perform(optimizer, iteration);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingAction {
        calls: AtomicUsize,
    }

    impl GraphAction for CountingAction {
        fn perform(&self, _optimizer: &SparseOptimizer, _iteration: i32) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_add_remove_identity() {
        let mut registry = ActionRegistry::default();
        let action: Arc<dyn GraphAction> = Arc::new(CountingAction {
            calls: AtomicUsize::new(0),
        });

        assert!(registry.add(ActionKind::ComputeActiveError, action.clone()));
        assert!(!registry.add(ActionKind::ComputeActiveError, action.clone()));
        assert_eq!(registry.len(ActionKind::ComputeActiveError), 1);

        assert!(registry.remove(ActionKind::ComputeActiveError, &action));
        assert!(!registry.remove(ActionKind::ComputeActiveError, &action));
        assert!(registry.is_empty(ActionKind::ComputeActiveError));
    }

    #[test]
    fn test_same_action_under_two_kinds() {
        let mut registry = ActionRegistry::default();
        let action: Arc<dyn GraphAction> = Arc::new(CountingAction {
            calls: AtomicUsize::new(0),
        });
        assert!(registry.add(ActionKind::PreIteration, action.clone()));
        assert!(registry.add(ActionKind::PostIteration, action.clone()));
        assert!(registry.remove(ActionKind::PreIteration, &action));
        assert_eq!(registry.len(ActionKind::PostIteration), 1);
    }
}
