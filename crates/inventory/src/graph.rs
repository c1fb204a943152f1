// SPDX-License-Identifier: MIT

//! In-memory inventory graph (spec §4.2, component C2).

use crate::cache::{FileSetCache, FileSetState};
use crate::store::InventoryStore;
use dynamo_core::{
    BlockName, BlockRecord, BlockReplica, DatasetRecord, DatasetReplica, DynamoError, File,
    Result, Site,
};
use dynamo_wire::InventoryObject;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Root aggregate over the inventory object graph (spec §3). Datasets and
/// sites are name-keyed maps with no circular object references (see
/// [`dynamo_core::dataset`]); block file access is lazy and cached per the
/// three-state model in [`crate::cache`].
pub struct Inventory<S: InventoryStore> {
    store: Arc<S>,
    state: Mutex<InventoryState>,
}

struct InventoryState {
    datasets: HashMap<String, DatasetRecord>,
    sites: HashMap<String, Site>,
    blocks: HashMap<(String, BlockName), BlockRecord>,
    file_states: HashMap<(String, BlockName), FileSetState>,
    dataset_replicas: Vec<DatasetReplica>,
    block_replicas: Vec<BlockReplica>,
    cache: FileSetCache,
}

/// One entry of a [`MutationJournal`], in the order the worker produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationOp {
    Update(InventoryObject),
    Delete(InventoryObject),
}

/// Mutation journal accumulated by a write-enabled worker (spec §4.2, §4.4
/// step 6). The scheduler drains the mutation channel into this shape and
/// hands it to [`Inventory::commit`], which applies it in the same order
/// the worker produced it (spec §5 "the parent applies UPDATE/DELETE
/// messages in the order produced by the child").
#[derive(Debug, Clone, Default)]
pub struct MutationJournal {
    pub ops: Vec<MutationOp>,
}

impl<S: InventoryStore> Inventory<S> {
    pub fn new(store: Arc<S>, cache_capacity: usize) -> Self {
        Inventory {
            store,
            state: Mutex::new(InventoryState {
                datasets: HashMap::new(),
                sites: HashMap::new(),
                blocks: HashMap::new(),
                file_states: HashMap::new(),
                dataset_replicas: Vec::new(),
                block_replicas: Vec::new(),
                cache: FileSetCache::new(cache_capacity),
            }),
        }
    }

    /// Bulk-populate from the store (spec §4.2 `load`). This reference
    /// implementation has no include/exclude filters; callers needing a
    /// partial load should layer that on top of the store.
    pub fn load(&self) -> Result<()> {
        let datasets = self.store.load_datasets()?;
        let sites = self.store.load_sites()?;
        let dataset_replicas = self.store.load_dataset_replicas()?;
        let block_replicas = self.store.load_block_replicas()?;

        let mut blocks = HashMap::new();
        for dataset in &datasets {
            for block in self.store.load_blocks(&dataset.name)? {
                blocks.insert((block.dataset.clone(), block.name), block);
            }
        }

        let mut state = self.state.lock();
        state.file_states = blocks
            .keys()
            .map(|k| (k.clone(), FileSetState::Unloaded))
            .collect();
        state.datasets = datasets.into_iter().map(|d| (d.name.clone(), d)).collect();
        state.sites = sites.into_iter().map(|s| (s.name.clone(), s)).collect();
        state.blocks = blocks;
        state.dataset_replicas = dataset_replicas;
        state.block_replicas = block_replicas;
        Ok(())
    }

    pub fn dataset(&self, name: &str) -> Option<DatasetRecord> {
        self.state.lock().datasets.get(name).cloned()
    }

    pub fn site(&self, name: &str) -> Option<Site> {
        self.state.lock().sites.get(name).cloned()
    }

    pub fn block(&self, dataset: &str, name: BlockName) -> Option<BlockRecord> {
        self.state
            .lock()
            .blocks
            .get(&(dataset.to_string(), name))
            .cloned()
    }

    pub fn block_replicas(&self, dataset: &str, block: BlockName) -> Vec<BlockReplica> {
        self.state
            .lock()
            .block_replicas
            .iter()
            .filter(|r| r.dataset == dataset && r.block == block)
            .cloned()
            .collect()
    }

    /// Materialized files for a block, loading from the store and warming
    /// the cache on a cold access (spec §3 file-set cache).
    pub fn files(&self, dataset: &str, block: BlockName) -> Result<Vec<File>> {
        let key = (dataset.to_string(), block);
        {
            let mut state = self.state.lock();
            if let Some(files) = Self::read_cached(&mut state, &key) {
                return Ok(files);
            }
        }
        let loaded = self.store.load_files(dataset, block)?;
        let mut state = self.state.lock();
        state.cache.insert(dataset, block, loaded.clone());
        state.file_states.insert(key, FileSetState::Cached);
        Ok(loaded)
    }

    /// Resolve a block's current file set against the bounded cache rather
    /// than trusting `file_states` on its own: a `Cached` entry whose row
    /// has since been evicted is treated as `Unloaded` (the cache, not this
    /// map, bounds residency). Downgrades `file_states` in that case so the
    /// next read does not repeat the miss.
    fn read_cached(state: &mut InventoryState, key: &(String, BlockName)) -> Option<Vec<File>> {
        match state.file_states.get(key) {
            Some(FileSetState::Owned(files)) => Some(files.clone()),
            Some(FileSetState::Cached) => match state.cache.get(&key.0, key.1) {
                Some(files) => Some(files.to_vec()),
                None => {
                    state.file_states.insert(key.clone(), FileSetState::Unloaded);
                    None
                }
            },
            _ => None,
        }
    }

    /// Apply an inbound object to the graph, persisting through the store
    /// when `write` is true (spec §4.2 `update`).
    pub fn update(&self, object: InventoryObject, write: bool) -> Result<()> {
        self.embed(&object)?;
        if write {
            self.persist(&object)?;
        }
        Ok(())
    }

    /// Remove an object from the graph, persisting the deletion when `write`
    /// is true (spec §4.2 `delete`). Unlinking a block cascades to its
    /// replicas and evicts its cache entry.
    pub fn delete(&self, object: InventoryObject, write: bool) -> Result<()> {
        match &object {
            InventoryObject::Block(record) => {
                let key = (record.dataset.clone(), record.name);
                let mut state = self.state.lock();
                state.blocks.remove(&key);
                state.file_states.remove(&key);
                state.cache.evict(&record.dataset, record.name);
                state
                    .block_replicas
                    .retain(|r| !(r.dataset == record.dataset && r.block == record.name));
                drop(state);
                if write {
                    self.store
                        .persist_delete_block(&record.dataset, record.name)?;
                }
            }
            InventoryObject::BlockReplica(replica) => {
                self.state.lock().block_replicas.retain(|r| r != replica);
                if write {
                    self.store.persist_delete_block_replica(replica)?;
                }
            }
            other => {
                return Err(DynamoError::Operational(format!(
                    "delete not supported for {other:?}"
                )))
            }
        }
        Ok(())
    }

    /// Find-or-create the canonical in-graph object matching `object`'s
    /// identity and reconcile its fields (spec §4.2 `embed`, §9 cross-process
    /// object transfer). The inbound object is always a detached snapshot;
    /// it is never adopted by reference.
    pub fn embed(&self, object: &InventoryObject) -> Result<()> {
        let mut state = self.state.lock();
        match object {
            InventoryObject::Dataset(dataset) => {
                state
                    .datasets
                    .insert(dataset.name.clone(), dataset.clone());
            }
            InventoryObject::Block(record) => {
                if !state.datasets.contains_key(&record.dataset) {
                    return Err(DynamoError::Object(format!(
                        "unknown dataset {} for block {}",
                        record.dataset, record.name
                    )));
                }
                let key = (record.dataset.clone(), record.name);
                state.blocks.insert(key.clone(), record.clone());
                state
                    .file_states
                    .entry(key)
                    .or_insert(FileSetState::Unloaded);
            }
            InventoryObject::File {
                dataset,
                block,
                file,
            } => {
                let key = (dataset.clone(), *block);
                let mut files = Self::read_cached(&mut state, &key).unwrap_or_default();
                match files.iter_mut().find(|f| f.lfn == file.lfn) {
                    Some(existing) => *existing = file.clone(),
                    None => files.push(file.clone()),
                }
                state.file_states.insert(key, FileSetState::Owned(files));
                state.cache.evict(dataset, *block);
            }
            InventoryObject::Site(site) => {
                state.sites.insert(site.name.clone(), site.clone());
            }
            InventoryObject::DatasetReplica(replica) => {
                if !state.dataset_replicas.contains(replica) {
                    state.dataset_replicas.push(replica.clone());
                }
            }
            InventoryObject::BlockReplica(replica) => {
                if !state.block_replicas.contains(replica) {
                    state.block_replicas.push(replica.clone());
                }
            }
        }
        Ok(())
    }

    fn persist(&self, object: &InventoryObject) -> Result<()> {
        match object {
            InventoryObject::Dataset(dataset) => self.store.persist_dataset(dataset),
            InventoryObject::Block(record) => {
                self.store.persist_block(record)?;
                let key = (record.dataset.clone(), record.name);
                let files = Self::read_cached(&mut self.state.lock(), &key);
                if let Some(files) = files {
                    self.validate_integrity(record, &files)?;
                }
                Ok(())
            }
            InventoryObject::File { dataset, block, .. } => {
                let key = (dataset.clone(), *block);
                let files = Self::read_cached(&mut self.state.lock(), &key).unwrap_or_default();
                self.store.persist_files(dataset, *block, &files)
            }
            InventoryObject::Site(site) => self.store.persist_site(site),
            InventoryObject::DatasetReplica(replica) => {
                self.store.persist_dataset_replica(replica)
            }
            InventoryObject::BlockReplica(replica) => self.store.persist_block_replica(replica),
        }
    }

    /// Verify spec §3 invariant 1 / §8 testable property 3: a materialized
    /// block's `num_files`/`size` match its loaded files.
    fn validate_integrity(&self, record: &BlockRecord, files: &[File]) -> Result<()> {
        let num_files = files.len() as u64;
        let size: u64 = files.iter().map(|f| f.size).sum();
        if record.num_files != num_files || record.size != size {
            return Err(DynamoError::Integrity(format!(
                "block {} reports num_files={} size={} but loaded files give {}/{}",
                record.full_name(),
                record.num_files,
                record.size,
                num_files,
                size
            )));
        }
        Ok(())
    }

    /// Apply a full mutation journal under write privileges (spec §4.5.1
    /// reap subprocedure, applied strictly in the order the child produced
    /// them).
    pub fn commit(&self, journal: MutationJournal) -> Result<()> {
        for op in journal.ops {
            match op {
                MutationOp::Update(object) => self.update(object, true)?,
                MutationOp::Delete(object) => self.delete(object, true)?,
            }
        }
        Ok(())
    }

    pub fn cache_len(&self) -> usize {
        self.state.lock().cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryInventoryStore;

    fn fixture() -> Inventory<InMemoryInventoryStore> {
        let store = Arc::new(InMemoryInventoryStore::new());
        store.persist_dataset(&DatasetRecord::new("Foo")).unwrap();
        let inventory = Inventory::new(store, 100);
        inventory.load().unwrap();
        inventory
    }

    #[test]
    fn embed_block_requires_known_dataset() {
        let inventory = Inventory::new(Arc::new(InMemoryInventoryStore::new()), 100);
        let block = InventoryObject::Block(BlockRecord {
            id: 1,
            name: BlockName::from_internal(1),
            dataset: "Missing".to_string(),
            size: 0,
            num_files: 0,
            is_open: true,
            last_update: 0,
        });
        assert!(inventory.update(block, false).is_err());
    }

    #[test]
    fn update_then_delete_block_round_trips() {
        let inventory = fixture();
        let name = BlockName::from_internal(7);
        let block = InventoryObject::Block(BlockRecord {
            id: 1,
            name,
            dataset: "Foo".to_string(),
            size: 0,
            num_files: 0,
            is_open: true,
            last_update: 0,
        });
        inventory.update(block.clone(), true).unwrap();
        assert!(inventory.block("Foo", name).is_some());
        inventory.delete(block, true).unwrap();
        assert!(inventory.block("Foo", name).is_none());
    }

    #[test]
    fn file_update_promotes_to_owned_and_validates_integrity() {
        let inventory = fixture();
        let name = BlockName::from_internal(9);
        let block = InventoryObject::Block(BlockRecord {
            id: 1,
            name,
            dataset: "Foo".to_string(),
            size: 10,
            num_files: 1,
            is_open: true,
            last_update: 0,
        });
        inventory
            .update(
                InventoryObject::File {
                    dataset: "Foo".to_string(),
                    block: name,
                    file: File::new("a", 10),
                },
                false,
            )
            .unwrap();
        inventory.update(block, true).unwrap();
        assert_eq!(inventory.files("Foo", name).unwrap().len(), 1);
    }

    #[test]
    fn mismatched_integrity_is_rejected_on_persist() {
        let inventory = fixture();
        let name = BlockName::from_internal(11);
        inventory
            .update(
                InventoryObject::File {
                    dataset: "Foo".to_string(),
                    block: name,
                    file: File::new("a", 5),
                },
                false,
            )
            .unwrap();
        let block = InventoryObject::Block(BlockRecord {
            id: 1,
            name,
            dataset: "Foo".to_string(),
            size: 999,
            num_files: 1,
            is_open: true,
            last_update: 0,
        });
        assert!(inventory.update(block, true).is_err());
    }

    #[test]
    fn evicted_cache_entry_forces_reload_instead_of_stale_file_states() {
        let store = Arc::new(InMemoryInventoryStore::new());
        store.persist_dataset(&DatasetRecord::new("Foo")).unwrap();
        let a = BlockName::from_internal(20);
        let b = BlockName::from_internal(21);
        store
            .persist_files("Foo", a, &[File::new("a", 1)])
            .unwrap();
        store
            .persist_files("Foo", b, &[File::new("b", 2)])
            .unwrap();

        // Capacity 1: loading b's files evicts a's cache row even though
        // a's file_states entry is still sitting at `Cached`.
        let inventory = Inventory::new(store.clone(), 1);
        inventory.load().unwrap();
        assert_eq!(inventory.files("Foo", a).unwrap(), vec![File::new("a", 1)]);
        assert_eq!(inventory.files("Foo", b).unwrap(), vec![File::new("b", 2)]);
        assert_eq!(inventory.cache_len(), 1);

        // A later write to the underlying store for `a` would be invisible
        // if the stale file_states copy were still trusted; reload happens
        // here instead via the store, proving the cache miss was honored.
        store
            .persist_files("Foo", a, &[File::new("a", 1), File::new("c", 3)])
            .unwrap();
        assert_eq!(
            inventory.files("Foo", a).unwrap(),
            vec![File::new("a", 1), File::new("c", 3)]
        );
    }

    #[test]
    fn commit_applies_ops_in_dequeue_order() {
        let inventory = fixture();
        let name = BlockName::from_internal(13);
        let block = BlockRecord {
            id: 1,
            name,
            dataset: "Foo".to_string(),
            size: 0,
            num_files: 0,
            is_open: true,
            last_update: 0,
        };
        let mut journal = MutationJournal::default();
        journal.ops.push(MutationOp::Update(InventoryObject::Block(block.clone())));
        journal.ops.push(MutationOp::Delete(InventoryObject::Block(block.clone())));
        inventory.commit(journal).unwrap();
        assert!(inventory.block("Foo", name).is_none());
    }

    #[test]
    fn commit_does_not_reorder_update_after_a_later_delete() {
        // A worker that deletes a block and then recreates it must see the
        // recreation survive, not have every update bucketed ahead of every
        // delete regardless of dequeue order (spec §5).
        let inventory = fixture();
        let name = BlockName::from_internal(14);
        let block = BlockRecord {
            id: 1,
            name,
            dataset: "Foo".to_string(),
            size: 0,
            num_files: 0,
            is_open: true,
            last_update: 0,
        };
        inventory
            .update(InventoryObject::Block(block.clone()), true)
            .unwrap();

        let mut journal = MutationJournal::default();
        journal.ops.push(MutationOp::Delete(InventoryObject::Block(block.clone())));
        journal.ops.push(MutationOp::Update(InventoryObject::Block(block)));
        inventory.commit(journal).unwrap();

        assert!(inventory.block("Foo", name).is_some());
    }
}
