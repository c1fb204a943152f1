// SPDX-License-Identifier: MIT

//! In-memory test double for [`crate::ChildSpawner`] (spec §4.11 test
//! support). Spawns no real processes; outcomes are scripted.

use crate::spawner::{ChildSpawner, SpawnedProcess, WorkerSpec};
use dynamo_core::{ActionId, DynamoError, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fs::File;
use std::io::Write;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::sync::Arc;

/// A canned outcome for the next `spawn` call.
pub struct FakeOutcome {
    pub exit_code: i32,
    pub mutation_bytes: Vec<u8>,
}

impl FakeOutcome {
    pub fn success() -> Self {
        FakeOutcome {
            exit_code: 0,
            mutation_bytes: Vec::new(),
        }
    }

    pub fn failure(exit_code: i32) -> Self {
        FakeOutcome {
            exit_code,
            mutation_bytes: Vec::new(),
        }
    }

    pub fn with_mutation_bytes(mut self, bytes: Vec<u8>) -> Self {
        self.mutation_bytes = bytes;
        self
    }
}

/// Queues canned [`FakeOutcome`]s and hands them out in spawn order;
/// records every action it was asked to spawn and every action it was
/// asked to terminate, for assertions.
#[derive(Default)]
pub struct FakeChildSpawner {
    outcomes: Mutex<VecDeque<FakeOutcome>>,
    spawned: Mutex<Vec<(ActionId, bool)>>,
    terminated: Arc<Mutex<Vec<ActionId>>>,
}

impl FakeChildSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, outcome: FakeOutcome) {
        self.outcomes.lock().push_back(outcome);
    }

    pub fn spawned_actions(&self) -> Vec<(ActionId, bool)> {
        self.spawned.lock().clone()
    }

    pub fn terminated_actions(&self) -> Vec<ActionId> {
        self.terminated.lock().clone()
    }
}

impl ChildSpawner for FakeChildSpawner {
    fn spawn(&self, spec: WorkerSpec) -> Result<Box<dyn SpawnedProcess>> {
        self.spawned
            .lock()
            .push((spec.action_id, spec.write_enabled));
        let outcome = self
            .outcomes
            .lock()
            .pop_front()
            .unwrap_or_else(FakeOutcome::success);

        let mutation_reader = if spec.write_enabled {
            let (read_fd, write_fd) = nix::unistd::pipe().map_err(|e| {
                DynamoError::backend("create fake mutation pipe", std::io::Error::from(e))
            })?;
            let mut writer = File::from(write_fd);
            let _ = writer.write_all(&outcome.mutation_bytes);
            drop(writer);
            Some(File::from(read_fd))
        } else {
            None
        };

        Ok(Box::new(FakeSpawnedProcess {
            action_id: spec.action_id,
            status: ExitStatus::from_raw(outcome.exit_code << 8),
            mutation_reader,
            terminated: self.terminated.clone(),
        }))
    }
}

struct FakeSpawnedProcess {
    action_id: ActionId,
    status: ExitStatus,
    mutation_reader: Option<File>,
    terminated: Arc<Mutex<Vec<ActionId>>>,
}

impl SpawnedProcess for FakeSpawnedProcess {
    fn action_id(&self) -> ActionId {
        self.action_id
    }

    fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        Ok(Some(self.status))
    }

    fn terminate(&mut self) -> Result<()> {
        self.terminated.lock().push(self.action_id);
        Ok(())
    }

    fn take_mutation_reader(&mut self) -> Option<File> {
        self.mutation_reader.take()
    }
}
