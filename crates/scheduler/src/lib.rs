// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! dynamo-scheduler: the daemon main loop (spec §4.5, component C6).
//!
//! A single thread of control per tick: release, reap, sleep, claim, spawn.
//! Workers are independent OS processes; the only things crossing the
//! process boundary are the action table (via `ActionRegistry`) and the
//! mutation channel (via `dynamo_worker::channel`).

use dynamo_auth::AuthorizationTable;
use dynamo_core::{Action, ActionId, ActionStatus, Clock, DynamoError, Result};
use dynamo_inventory::{Inventory, InventoryStore, MutationJournal, MutationOp};
use dynamo_registry::ActionRegistry;
use dynamo_worker::{
    read_record_with_timeout, ChildSpawner, DrainError, SignalGuard, SpawnedProcess, WorkerSpec,
};
use dynamo_wire::MutationRecord;
use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;
use std::time::Duration;

/// Tunables that would otherwise be magic numbers scattered through the
/// tick procedure (spec §4.9 names these as daemon configuration).
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub idle_backoff: Duration,
    pub drain_timeout: Duration,
    pub termination_grace: Duration,
    pub registry_endpoint: String,
    pub inventory_endpoint: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            idle_backoff: Duration::from_millis(500),
            drain_timeout: Duration::from_secs(30),
            termination_grace: Duration::from_secs(5),
            registry_endpoint: String::new(),
            inventory_endpoint: String::new(),
        }
    }
}

struct LiveWorker {
    action_id: ActionId,
    write_enabled: bool,
    process: Box<dyn SpawnedProcess>,
    mutation_reader: Option<BufReader<File>>,
}

/// The daemon loop (spec §4.5). Generic over every boundary trait so tests
/// can substitute in-memory fakes for all of them (spec §4.11).
pub struct Scheduler<R, S, A, Sp, Cl>
where
    R: ActionRegistry,
    S: InventoryStore,
    A: AuthorizationTable,
    Sp: ChildSpawner,
    Cl: Clock,
{
    registry: Arc<R>,
    inventory: Arc<Inventory<S>>,
    auth: Arc<A>,
    spawner: Arc<Sp>,
    clock: Cl,
    config: SchedulerConfig,
    writing: bool,
    claimed_last_tick: bool,
    live_workers: Vec<LiveWorker>,
}

impl<R, S, A, Sp, Cl> Scheduler<R, S, A, Sp, Cl>
where
    R: ActionRegistry,
    S: InventoryStore,
    A: AuthorizationTable,
    Sp: ChildSpawner,
    Cl: Clock,
{
    pub fn new(
        registry: Arc<R>,
        inventory: Arc<Inventory<S>>,
        auth: Arc<A>,
        spawner: Arc<Sp>,
        clock: Cl,
        config: SchedulerConfig,
    ) -> Self {
        Scheduler {
            registry,
            inventory,
            auth,
            spawner,
            clock,
            config,
            writing: false,
            claimed_last_tick: false,
            live_workers: Vec::new(),
        }
    }

    pub fn is_writing(&self) -> bool {
        self.writing
    }

    pub fn live_worker_count(&self) -> usize {
        self.live_workers.len()
    }

    /// Run ticks until `should_stop` returns true, checked between ticks.
    /// On a structural error, performs shutdown (spec §4.5.2) and returns
    /// the triggering error.
    pub fn run(&mut self, mut should_stop: impl FnMut() -> bool) -> Result<()> {
        loop {
            if should_stop() {
                return self.shutdown();
            }
            if let Err(e) = self.tick() {
                self.shutdown()?;
                return Err(e);
            }
        }
    }

    /// One iteration of the per-tick procedure (spec §4.5 steps 1-9).
    pub fn tick(&mut self) -> Result<()> {
        // Step 1: release any held table lock. The reference registry takes
        // no cross-tick lock, so there is nothing to release defensively.

        // Step 2: reap.
        self.reap()?;

        // Step 3: sleep for the computed backoff.
        let backoff = if self.claimed_last_tick {
            Duration::ZERO
        } else {
            self.config.idle_backoff
        };
        if !backoff.is_zero() {
            self.clock.sleep(backoff);
        }

        // Steps 4-5: acquire lock (implicit in `claim_next`) and claim.
        let allow_write = !self.writing;
        let action = match self.registry.claim_next(allow_write)? {
            Some(action) => action,
            None => {
                self.claimed_last_tick = false;
                tracing::debug!("no eligible action, waiting");
                return Ok(());
            }
        };
        self.claimed_last_tick = true;

        // Step 7: verify the executable exists.
        if !action.exec_path().exists() {
            tracing::warn!(action_id = action.id, "exec not found, failing action");
            self.registry.set_status(action.id, ActionStatus::Failed)?;
            return Ok(());
        }

        // Step 8: authorize write requests.
        if action.write_request {
            let script = std::fs::read(action.exec_path())
                .map_err(|e| DynamoError::backend(format!("read exec for action {}", action.id), e))?;
            let authorized = self
                .auth
                .is_authorized(&action.title, &script, action.user_id)?;
            if !authorized {
                tracing::warn!(action_id = action.id, "write action not authorized");
                self.registry.set_status(action.id, ActionStatus::Failed)?;
                return Ok(());
            }
        }

        self.spawn_action(action)
    }

    fn spawn_action(&mut self, action: Action) -> Result<()> {
        let spec = WorkerSpec {
            action_id: action.id,
            exec_path: action.exec_path(),
            args: action.split_args(),
            stdout_path: action.stdout_path(),
            stderr_path: action.stderr_path(),
            write_enabled: action.write_request,
            registry_endpoint: self.config.registry_endpoint.clone(),
            inventory_endpoint: self.config.inventory_endpoint.clone(),
        };

        let mut process = self.spawner.spawn(spec)?;
        // Open Question (SPEC_FULL §9): `writing` is set strictly after
        // spawn succeeds, not inside the authorized branch before spawning.
        if action.write_request {
            self.writing = true;
        }
        let mutation_reader = process.take_mutation_reader().map(BufReader::new);

        self.registry.set_status(action.id, ActionStatus::Run)?;
        self.live_workers.push(LiveWorker {
            action_id: action.id,
            write_enabled: action.write_request,
            process,
            mutation_reader,
        });
        tracing::info!(action_id = action.id, "worker spawned");
        Ok(())
    }

    /// Reap subprocedure (spec §4.5.1).
    fn reap(&mut self) -> Result<()> {
        let mut still_live = Vec::with_capacity(self.live_workers.len());
        let workers = std::mem::take(&mut self.live_workers);

        for mut worker in workers {
            let external_status = self.registry.query_status(worker.action_id)?;
            if external_status != Some(ActionStatus::Run) {
                tracing::warn!(action_id = worker.action_id, "action externally aborted");
                worker.process.terminate()?;
                self.wait_with_grace(&mut worker);
                self.registry
                    .set_status(worker.action_id, ActionStatus::Killed)?;
                if worker.write_enabled {
                    self.writing = false;
                }
                continue;
            }

            let status = worker.process.try_wait()?;
            let Some(status) = status else {
                still_live.push(worker);
                continue;
            };

            let terminal = if status.success() {
                ActionStatus::Done
            } else {
                ActionStatus::Failed
            };
            self.registry.set_status(worker.action_id, terminal)?;
            tracing::info!(action_id = worker.action_id, status = %terminal, "worker reaped");

            if worker.write_enabled {
                if terminal == ActionStatus::Done {
                    self.drain_channel(worker.action_id, worker.mutation_reader)?;
                }
                self.writing = false;
            }
        }

        self.live_workers = still_live;
        Ok(())
    }

    fn wait_with_grace(&self, worker: &mut LiveWorker) {
        let deadline = self.clock.now() + self.config.termination_grace;
        while self.clock.now() < deadline {
            match worker.process.try_wait() {
                Ok(Some(_)) => return,
                _ => self.clock.sleep(Duration::from_millis(50)),
            }
        }
    }

    /// Drain a write-worker's mutation channel under a signal mask, applying
    /// each record with `write=true` until `EOM`, EOF, or a per-message
    /// timeout (spec §4.5.1, §4.6).
    fn drain_channel(&self, action_id: ActionId, reader: Option<BufReader<File>>) -> Result<()> {
        let Some(mut reader) = reader else {
            return Ok(());
        };
        let _guard = SignalGuard::block()?;
        let mut journal = MutationJournal::default();
        loop {
            match read_record_with_timeout(&mut reader, self.config.drain_timeout) {
                Ok(Some(MutationRecord::Update(object))) => {
                    journal.ops.push(MutationOp::Update(object))
                }
                Ok(Some(MutationRecord::Delete(object))) => {
                    journal.ops.push(MutationOp::Delete(object))
                }
                Ok(Some(MutationRecord::Eom)) => break,
                Ok(None) => break,
                Err(DrainError::Timeout) => {
                    tracing::warn!(action_id, "mutation channel drain timed out");
                    break;
                }
                Err(DrainError::Wire(_)) | Err(DrainError::Poll(_)) => {
                    return Err(DynamoError::ChannelTimeout { action_id });
                }
            }
        }
        self.inventory.commit(journal)
    }

    /// Shutdown (spec §4.5.2): terminate every live worker in order,
    /// 5s grace, mark killed.
    pub fn shutdown(&mut self) -> Result<()> {
        let workers = std::mem::take(&mut self.live_workers);
        for mut worker in workers {
            worker.process.terminate()?;
            self.wait_with_grace(&mut worker);
            self.registry
                .set_status(worker.action_id, ActionStatus::Killed)?;
            if worker.write_enabled {
                self.writing = false;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dynamo_auth::InMemoryAuthorizationTable;
    use dynamo_core::{ActionBuilder, BlockName, BlockRecord, DatasetRecord, FakeClock};
    use dynamo_inventory::InMemoryInventoryStore;
    use dynamo_registry::InMemoryActionRegistry;
    use dynamo_wire::InventoryObject;
    use dynamo_worker::{FakeChildSpawner, FakeOutcome};

    fn scheduler_with_config(
        config: SchedulerConfig,
    ) -> (
        Scheduler<
            InMemoryActionRegistry,
            InMemoryInventoryStore,
            InMemoryAuthorizationTable,
            FakeChildSpawner,
            FakeClock,
        >,
        Arc<InMemoryActionRegistry>,
        Arc<FakeChildSpawner>,
        Arc<InMemoryAuthorizationTable>,
        Arc<Inventory<InMemoryInventoryStore>>,
    ) {
        let registry = Arc::new(InMemoryActionRegistry::new());
        let store = Arc::new(InMemoryInventoryStore::new());
        store.persist_dataset(&DatasetRecord::new("Foo")).unwrap();
        let inventory = Arc::new(Inventory::new(store, 100));
        inventory.load().unwrap();
        let auth = Arc::new(InMemoryAuthorizationTable::new());
        let spawner = Arc::new(FakeChildSpawner::new());
        let clock = FakeClock::new();

        let scheduler = Scheduler::new(
            registry.clone(),
            inventory.clone(),
            auth.clone(),
            spawner.clone(),
            clock,
            config,
        );
        (scheduler, registry, spawner, auth, inventory)
    }

    fn scheduler() -> (
        Scheduler<
            InMemoryActionRegistry,
            InMemoryInventoryStore,
            InMemoryAuthorizationTable,
            FakeChildSpawner,
            FakeClock,
        >,
        Arc<InMemoryActionRegistry>,
        Arc<FakeChildSpawner>,
        Arc<InMemoryAuthorizationTable>,
        Arc<Inventory<InMemoryInventoryStore>>,
    ) {
        scheduler_with_config(SchedulerConfig::default())
    }

    // S1 - read-only action, success.
    #[test]
    fn read_only_action_completes_without_writing() {
        let (mut scheduler, registry, spawner, _auth, _inventory) = scheduler();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_path_buf();
        std::fs::write(path.join("exec"), b"#!/bin/sh\nexit 0\n").unwrap();
        spawner.push(FakeOutcome::success());
        registry
            .insert(
                ActionBuilder::default()
                    .id(1)
                    .path(path)
                    .timestamp(100)
                    .build(),
            )
            .unwrap();

        scheduler.tick().unwrap();
        scheduler.tick().unwrap();

        assert_eq!(registry.query_status(1).unwrap(), Some(ActionStatus::Done));
        assert!(!scheduler.is_writing());
    }

    // S2 - write action with mutation is applied after reap.
    #[test]
    fn write_action_mutation_is_committed() {
        let (mut scheduler, registry, spawner, auth, inventory) = scheduler();
        let block = InventoryObject::Block(BlockRecord {
            id: 1,
            name: BlockName::from_internal(42),
            dataset: "Foo".to_string(),
            size: 0,
            num_files: 0,
            is_open: true,
            last_update: 0,
        });
        let mut bytes = Vec::new();
        dynamo_wire::write_record(&mut bytes, &MutationRecord::Update(block.clone())).unwrap();
        dynamo_wire::write_record(&mut bytes, &MutationRecord::Eom).unwrap();
        spawner.push(FakeOutcome::success().with_mutation_bytes(bytes));

        auth.grant("W", dynamo_auth::checksum(b"#!/bin/sh\nexit 0\n"), 0);

        // exec_path() is checked for existence; point the action at a real
        // file so step 7 passes, and make its bytes match the auth grant.
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_path_buf();
        std::fs::write(path.join("exec"), b"#!/bin/sh\nexit 0\n").unwrap();
        registry
            .insert(
                ActionBuilder::default()
                    .id(2)
                    .title("W")
                    .path(path)
                    .timestamp(100)
                    .write_request(true)
                    .build(),
            )
            .unwrap();

        scheduler.tick().unwrap();
        scheduler.tick().unwrap();

        assert_eq!(registry.query_status(2).unwrap(), Some(ActionStatus::Done));
        assert!(inventory.block("Foo", BlockName::from_internal(42)).is_some());
        assert!(!scheduler.is_writing());
    }

    // S3 - unauthorized write fails without ever setting `writing`.
    #[test]
    fn unauthorized_write_fails_action() {
        let (mut scheduler, registry, _spawner, _auth, _inventory) = scheduler();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_path_buf();
        std::fs::write(path.join("exec"), b"exit 0\n").unwrap();
        registry
            .insert(
                ActionBuilder::default()
                    .id(3)
                    .title("W")
                    .path(path)
                    .timestamp(100)
                    .write_request(true)
                    .build(),
            )
            .unwrap();

        scheduler.tick().unwrap();

        assert_eq!(
            registry.query_status(3).unwrap(),
            Some(ActionStatus::Failed)
        );
        assert!(!scheduler.is_writing());
        assert_eq!(scheduler.live_worker_count(), 0);
    }

    // S4 - write exclusivity: second write action waits for the first.
    #[test]
    fn write_exclusivity_serializes_claims() {
        let (mut scheduler, registry, spawner, auth, _inventory) = scheduler();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_path_buf();
        std::fs::write(path.join("exec"), b"#!/bin/sh\nexit 0\n").unwrap();
        auth.grant("W", dynamo_auth::checksum(b"#!/bin/sh\nexit 0\n"), 0);

        registry
            .insert(
                ActionBuilder::default()
                    .id(3)
                    .title("W")
                    .path(path.clone())
                    .timestamp(200)
                    .write_request(true)
                    .build(),
            )
            .unwrap();
        registry
            .insert(
                ActionBuilder::default()
                    .id(4)
                    .title("W")
                    .path(path)
                    .timestamp(201)
                    .write_request(true)
                    .build(),
            )
            .unwrap();

        spawner.push(FakeOutcome::success());
        scheduler.tick().unwrap();
        assert_eq!(
            spawner.spawned_actions(),
            vec![(3, true)],
            "second write action must not be claimed while the first is writing"
        );
        assert!(scheduler.is_writing());

        spawner.push(FakeOutcome::success());
        scheduler.tick().unwrap(); // reaps 3, claims 4
        assert_eq!(
            spawner
                .spawned_actions()
                .into_iter()
                .map(|(id, _)| id)
                .collect::<Vec<_>>(),
            vec![3, 4]
        );
    }

    // S5 - external abort terminates the live worker within one tick.
    #[test]
    fn external_abort_terminates_worker() {
        let (mut scheduler, registry, spawner, _auth, _inventory) = scheduler();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_path_buf();
        std::fs::write(path.join("exec"), b"#!/bin/sh\nexit 0\n").unwrap();
        spawner.push(FakeOutcome::success());
        registry
            .insert(
                ActionBuilder::default()
                    .id(5)
                    .path(path)
                    .timestamp(100)
                    .build(),
            )
            .unwrap();
        scheduler.tick().unwrap(); // claim + spawn
        registry.set_status(5, ActionStatus::Killed).unwrap();

        scheduler.tick().unwrap(); // reap observes the external abort

        assert_eq!(spawner.terminated_actions(), vec![5]);
        assert_eq!(
            registry.query_status(5).unwrap(),
            Some(ActionStatus::Killed)
        );
    }

    // S6 - channel drain timeout: worker exits 0 without EOM.
    #[test]
    fn channel_drain_times_out_without_eom() {
        let mut config = SchedulerConfig::default();
        config.drain_timeout = Duration::from_millis(1);
        let (mut scheduler, registry, spawner, auth, _inventory) = scheduler_with_config(config);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_path_buf();
        std::fs::write(path.join("exec"), b"#!/bin/sh\nexit 0\n").unwrap();
        auth.grant("W", dynamo_auth::checksum(b"#!/bin/sh\nexit 0\n"), 0);

        let mut bytes = Vec::new();
        let block = InventoryObject::Block(BlockRecord {
            id: 1,
            name: BlockName::from_internal(1),
            dataset: "Foo".to_string(),
            size: 0,
            num_files: 0,
            is_open: true,
            last_update: 0,
        });
        dynamo_wire::write_record(&mut bytes, &MutationRecord::Update(block)).unwrap();
        // deliberately omit EOM
        spawner.push(FakeOutcome::success().with_mutation_bytes(bytes));

        registry
            .insert(
                ActionBuilder::default()
                    .id(6)
                    .title("W")
                    .path(path)
                    .timestamp(100)
                    .write_request(true)
                    .build(),
            )
            .unwrap();

        scheduler.tick().unwrap();
        scheduler.tick().unwrap();

        assert_eq!(registry.query_status(6).unwrap(), Some(ActionStatus::Done));
        assert!(!scheduler.is_writing());
    }
}
