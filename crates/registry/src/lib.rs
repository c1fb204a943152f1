// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! dynamo-registry: the persistent action queue (spec §4.1, component C3).
//!
//! The specification treats concrete SQL persistence backends as an
//! external collaborator (spec §1 Out of scope); what the core actually
//! needs is the *contract* — atomic, serializable claiming of the oldest
//! eligible `new` action, and unconditional status transitions driven by
//! the scheduler. [`InMemoryActionRegistry`] implements that contract with
//! a single mutex standing in for the table-level lock the original takes
//! with `LOCK TABLES`; a real deployment swaps in a SQL-backed
//! implementation of [`ActionRegistry`] without touching the scheduler.

use dynamo_core::{Action, ActionId, ActionStatus, DynamoError, Result};
use parking_lot::Mutex;
use std::collections::HashMap;

/// The persistent queue of submitted actions.
pub trait ActionRegistry: Send + Sync {
    /// Atomically select the oldest `new` action (`allow_write = false`
    /// additionally filters out `write_request = true` rows), transition it
    /// to `Run`, and return its full row. Returns `None` on no match.
    fn claim_next(&self, allow_write: bool) -> Result<Option<Action>>;

    /// Unconditional status transition; only the scheduler calls this.
    fn set_status(&self, id: ActionId, status: ActionStatus) -> Result<()>;

    /// Current status of an action, used by the reaper to detect external
    /// aborts (an operator flipping a row to `Killed`).
    fn query_status(&self, id: ActionId) -> Result<Option<ActionStatus>>;

    /// Register a new action in state `New`. Used by external submitters;
    /// exposed here so tests and the reference backend share one path.
    fn insert(&self, action: Action) -> Result<()>;
}

/// In-memory reference implementation of [`ActionRegistry`].
///
/// `claim_next` holds the mutex for the duration of the select-and-update,
/// mirroring the original's `LOCK TABLES ... ORDER BY timestamp LIMIT 1 ...
/// UPDATE ... UNLOCK TABLES` sequence without requiring a real database.
#[derive(Default)]
pub struct InMemoryActionRegistry {
    actions: Mutex<HashMap<ActionId, Action>>,
}

impl InMemoryActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ActionRegistry for InMemoryActionRegistry {
    fn claim_next(&self, allow_write: bool) -> Result<Option<Action>> {
        let mut actions = self.actions.lock();

        let next_id = actions
            .values()
            .filter(|a| a.status == ActionStatus::New)
            .filter(|a| allow_write || !a.write_request)
            .min_by_key(|a| (a.timestamp, a.id))
            .map(|a| a.id);

        let Some(id) = next_id else {
            return Ok(None);
        };

        let action = actions
            .get_mut(&id)
            .ok_or_else(|| DynamoError::Object(format!("action {id} vanished under lock")))?;
        action.status = ActionStatus::Run;
        Ok(Some(action.clone()))
    }

    fn set_status(&self, id: ActionId, status: ActionStatus) -> Result<()> {
        let mut actions = self.actions.lock();
        let action = actions
            .get_mut(&id)
            .ok_or_else(|| DynamoError::Object(format!("unknown action {id}")))?;
        action.status = status;
        Ok(())
    }

    fn query_status(&self, id: ActionId) -> Result<Option<ActionStatus>> {
        Ok(self.actions.lock().get(&id).map(|a| a.status))
    }

    fn insert(&self, action: Action) -> Result<()> {
        self.actions.lock().insert(action.id, action);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dynamo_core::ActionBuilder;

    fn action(id: ActionId, timestamp: i64, write_request: bool) -> Action {
        ActionBuilder::default()
            .id(id)
            .timestamp(timestamp)
            .write_request(write_request)
            .build()
    }

    #[test]
    fn claims_oldest_new_action_first() {
        let registry = InMemoryActionRegistry::new();
        registry.insert(action(2, 200, false)).unwrap();
        registry.insert(action(1, 100, false)).unwrap();

        let claimed = registry.claim_next(true).unwrap().unwrap();
        assert_eq!(claimed.id, 1);
        assert_eq!(registry.query_status(1).unwrap(), Some(ActionStatus::Run));
    }

    #[test]
    fn ties_broken_by_id_ascending() {
        let registry = InMemoryActionRegistry::new();
        registry.insert(action(2, 100, false)).unwrap();
        registry.insert(action(1, 100, false)).unwrap();

        let claimed = registry.claim_next(true).unwrap().unwrap();
        assert_eq!(claimed.id, 1);
    }

    #[test]
    fn allow_write_false_skips_write_requests() {
        let registry = InMemoryActionRegistry::new();
        registry.insert(action(1, 100, true)).unwrap();
        registry.insert(action(2, 200, false)).unwrap();

        let claimed = registry.claim_next(false).unwrap().unwrap();
        assert_eq!(claimed.id, 2);
    }

    #[test]
    fn no_eligible_action_returns_none() {
        let registry = InMemoryActionRegistry::new();
        registry.insert(action(1, 100, true)).unwrap();
        assert!(registry.claim_next(false).unwrap().is_none());
    }

    #[test]
    fn claimed_action_is_not_claimed_twice() {
        let registry = InMemoryActionRegistry::new();
        registry.insert(action(1, 100, false)).unwrap();
        assert!(registry.claim_next(true).unwrap().is_some());
        assert!(registry.claim_next(true).unwrap().is_none());
    }

    #[test]
    fn set_status_unconditional() {
        let registry = InMemoryActionRegistry::new();
        registry.insert(action(1, 100, false)).unwrap();
        registry.set_status(1, ActionStatus::Killed).unwrap();
        assert_eq!(
            registry.query_status(1).unwrap(),
            Some(ActionStatus::Killed)
        );
    }

    #[test]
    fn query_status_unknown_action_is_none() {
        let registry = InMemoryActionRegistry::new();
        assert_eq!(registry.query_status(42).unwrap(), None);
    }
}
