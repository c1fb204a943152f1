// SPDX-License-Identifier: MIT

//! Presence of a dataset/block at a site (spec §3).

use crate::block::BlockName;
use serde::{Deserialize, Serialize};

/// The presence of a dataset at a site.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetReplica {
    pub dataset: String,
    pub site: String,
}

/// The presence of a block at a site. Unlinking the owning block cascades
/// to remove this replica.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockReplica {
    pub dataset: String,
    pub block: BlockName,
    pub site: String,
}
