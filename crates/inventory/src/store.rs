// SPDX-License-Identifier: MIT

//! dynamo-inventory store boundary (spec §4.2, component C1).

use dynamo_core::{
    BlockName, BlockRecord, BlockReplica, DatasetRecord, DatasetReplica, File, Result, Site,
};
use parking_lot::Mutex;
use std::collections::HashMap;

/// Persistent authoritative copy of the inventory. A real deployment backs
/// this with a SQL schema (spec §6, out of scope); [`InMemoryInventoryStore`]
/// is the reference implementation used by tests.
pub trait InventoryStore: Send + Sync {
    fn load_datasets(&self) -> Result<Vec<DatasetRecord>>;
    fn load_blocks(&self, dataset: &str) -> Result<Vec<BlockRecord>>;
    fn load_files(&self, dataset: &str, block: BlockName) -> Result<Vec<File>>;
    fn load_sites(&self) -> Result<Vec<Site>>;
    fn load_dataset_replicas(&self) -> Result<Vec<DatasetReplica>>;
    fn load_block_replicas(&self) -> Result<Vec<BlockReplica>>;

    fn persist_dataset(&self, dataset: &DatasetRecord) -> Result<()>;
    fn persist_block(&self, block: &BlockRecord) -> Result<()>;
    fn persist_files(&self, dataset: &str, block: BlockName, files: &[File]) -> Result<()>;
    fn persist_delete_block(&self, dataset: &str, block: BlockName) -> Result<()>;
    fn persist_site(&self, site: &Site) -> Result<()>;
    fn persist_dataset_replica(&self, replica: &DatasetReplica) -> Result<()>;
    fn persist_block_replica(&self, replica: &BlockReplica) -> Result<()>;
    fn persist_delete_block_replica(&self, replica: &BlockReplica) -> Result<()>;
}

#[derive(Default)]
struct StoreData {
    datasets: HashMap<String, DatasetRecord>,
    blocks: HashMap<(String, BlockName), BlockRecord>,
    files: HashMap<(String, BlockName), Vec<File>>,
    sites: HashMap<String, Site>,
    dataset_replicas: Vec<DatasetReplica>,
    block_replicas: Vec<BlockReplica>,
}

/// In-memory reference implementation of [`InventoryStore`].
#[derive(Default)]
pub struct InMemoryInventoryStore {
    data: Mutex<StoreData>,
}

impl InMemoryInventoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl InventoryStore for InMemoryInventoryStore {
    fn load_datasets(&self) -> Result<Vec<DatasetRecord>> {
        Ok(self.data.lock().datasets.values().cloned().collect())
    }

    fn load_blocks(&self, dataset: &str) -> Result<Vec<BlockRecord>> {
        Ok(self
            .data
            .lock()
            .blocks
            .values()
            .filter(|b| b.dataset == dataset)
            .cloned()
            .collect())
    }

    fn load_files(&self, dataset: &str, block: BlockName) -> Result<Vec<File>> {
        Ok(self
            .data
            .lock()
            .files
            .get(&(dataset.to_string(), block))
            .cloned()
            .unwrap_or_default())
    }

    fn load_sites(&self) -> Result<Vec<Site>> {
        Ok(self.data.lock().sites.values().cloned().collect())
    }

    fn load_dataset_replicas(&self) -> Result<Vec<DatasetReplica>> {
        Ok(self.data.lock().dataset_replicas.clone())
    }

    fn load_block_replicas(&self) -> Result<Vec<BlockReplica>> {
        Ok(self.data.lock().block_replicas.clone())
    }

    fn persist_dataset(&self, dataset: &DatasetRecord) -> Result<()> {
        self.data
            .lock()
            .datasets
            .insert(dataset.name.clone(), dataset.clone());
        Ok(())
    }

    fn persist_block(&self, block: &BlockRecord) -> Result<()> {
        self.data
            .lock()
            .blocks
            .insert((block.dataset.clone(), block.name), block.clone());
        Ok(())
    }

    fn persist_files(&self, dataset: &str, block: BlockName, files: &[File]) -> Result<()> {
        self.data
            .lock()
            .files
            .insert((dataset.to_string(), block), files.to_vec());
        Ok(())
    }

    fn persist_delete_block(&self, dataset: &str, block: BlockName) -> Result<()> {
        let mut data = self.data.lock();
        let key = (dataset.to_string(), block);
        data.blocks.remove(&key);
        data.files.remove(&key);
        data.block_replicas
            .retain(|r| !(r.dataset == dataset && r.block == block));
        Ok(())
    }

    fn persist_site(&self, site: &Site) -> Result<()> {
        self.data
            .lock()
            .sites
            .insert(site.name.clone(), site.clone());
        Ok(())
    }

    fn persist_dataset_replica(&self, replica: &DatasetReplica) -> Result<()> {
        let mut data = self.data.lock();
        if !data.dataset_replicas.contains(replica) {
            data.dataset_replicas.push(replica.clone());
        }
        Ok(())
    }

    fn persist_block_replica(&self, replica: &BlockReplica) -> Result<()> {
        let mut data = self.data.lock();
        if !data.block_replicas.contains(replica) {
            data.block_replicas.push(replica.clone());
        }
        Ok(())
    }

    fn persist_delete_block_replica(&self, replica: &BlockReplica) -> Result<()> {
        self.data.lock().block_replicas.retain(|r| r != replica);
        Ok(())
    }
}
