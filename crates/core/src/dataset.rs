// SPDX-License-Identifier: MIT

//! Named collection of blocks (spec §3).

use serde::{Deserialize, Serialize};

/// A dataset's scalar attributes. Block membership is tracked by the
/// inventory graph (keyed by dataset name), not inline here, so that a
/// detached `DatasetRecord` received over the mutation channel can be
/// reconciled against the canonical in-graph dataset by `embed` without
/// having to merge two block collections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetRecord {
    pub name: String,
}

impl DatasetRecord {
    pub fn new(name: impl Into<String>) -> Self {
        DatasetRecord { name: name.into() }
    }
}
