//! Store contract.
//!
//! The store itself is an external collaborator following the
//! unidirectional-dispatch pattern; the pipeline only needs its dispatch
//! entry point and a state snapshot to hand to policies and tasks.

use serde_json::Value;

use crate::action::Action;

/// External reducer store contract.
///
/// Every policy, request middleware, and task receives the store, so
/// cross-cutting behaviors can dispatch follow-up actions or branch on
/// current state.
pub trait Store: Send + Sync {
    /// Dispatch an action into the store.
    fn dispatch(&self, action: Action);

    /// Snapshot of the current state.
    fn state(&self) -> Value;
}
