// SPDX-License-Identifier: MIT

//! A file: member of exactly one block (spec §3).

use serde::{Deserialize, Serialize};

/// A logical file belonging to a single [`crate::Block`].
///
/// Files are created when a block loads them and destroyed when the block
/// is unlinked; they carry no identity beyond `(lfn, size)` within a block.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct File {
    /// Logical file name.
    pub lfn: String,
    pub size: u64,
}

impl File {
    pub fn new(lfn: impl Into<String>, size: u64) -> Self {
        File {
            lfn: lfn.into(),
            size,
        }
    }
}
