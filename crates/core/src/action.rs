// SPDX-License-Identifier: MIT

//! Queue row for a submitted action (spec §3, §4.1).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Monotonic identifier for an [`Action`] row.
pub type ActionId = i64;

/// Status of an action in the registry. Transitions are a prefix of
/// `New -> Run -> {Done, Failed, Killed}`; terminal states are never
/// mutated by the scheduler again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    New,
    Run,
    Done,
    Failed,
    Killed,
}

impl ActionStatus {
    /// Terminal statuses are never revisited by the scheduler.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ActionStatus::Done | ActionStatus::Failed | ActionStatus::Killed
        )
    }
}

crate::simple_display! {
    ActionStatus {
        New => "new",
        Run => "run",
        Done => "done",
        Failed => "failed",
        Killed => "killed",
    }
}

/// A user-submitted executable script registered in the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub id: ActionId,
    pub title: String,
    /// Directory containing the script (`<path>/exec`) and where `_stdout`
    /// / `_stderr` are written.
    pub path: PathBuf,
    pub args: String,
    pub user_id: i64,
    pub user_name: String,
    pub write_request: bool,
    /// Submission time; claim order is `(timestamp, id)` ascending.
    pub timestamp: i64,
    pub status: ActionStatus,
}

impl Action {
    /// Path to the action's executable, per the worker contract (spec §6).
    pub fn exec_path(&self) -> PathBuf {
        self.path.join("exec")
    }

    pub fn stdout_path(&self) -> PathBuf {
        self.path.join("_stdout")
    }

    pub fn stderr_path(&self) -> PathBuf {
        self.path.join("_stderr")
    }

    /// Split `args` the way a shell would split a single word list.
    pub fn split_args(&self) -> Vec<String> {
        self.args
            .split_whitespace()
            .map(str::to_string)
            .collect()
    }
}

#[cfg(any(test, feature = "test-support"))]
mod test_support {
    use super::*;

    crate::builder_impl!(ActionBuilder, Action, {
        id: ActionId = 0,
        title: String = "test-action".to_string(),
        path: PathBuf = PathBuf::from("/tmp/dynamo-test-action"),
        args: String = String::new(),
        user_id: i64 = 0,
        user_name: String = "tester".to_string(),
        write_request: bool = false,
        timestamp: i64 = 0,
        status: ActionStatus = ActionStatus::New,
    });
}

#[cfg(any(test, feature = "test-support"))]
pub use test_support::ActionBuilder;
