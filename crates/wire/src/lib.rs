// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::unwrap_used))]

//! dynamo-wire: the mutation channel wire format (spec §4.4, §6, §9).
//!
//! A write-enabled worker streams a sequence of tagged records
//! `(tag, payload)` to its parent: `UPDATE`/`DELETE` carry a snapshot of a
//! dataset, block, file, site, or replica; `EOM` has no payload and marks
//! the end of the worker's mutation journal. Because an arbitrary child
//! process cannot share Rust's object graph with the parent, every payload
//! is a self-contained snapshot (a tree, never a back-reference into the
//! sender's graph) — cycles are excluded by construction. The receiving
//! side reconciles a snapshot against the canonical in-graph object via
//! `embed` (in `dynamo-inventory`), not by adopting the snapshot directly.
//!
//! Records are framed as newline-delimited JSON so they can be streamed
//! over a pipe or socket without a length prefix.

use dynamo_core::{BlockRecord, DatasetRecord, DatasetReplica, File, Site, BlockReplica};
use serde::{Deserialize, Serialize};
use std::io::{self, BufRead, Write};

/// Tag values for [`MutationRecord`], matching spec §6's
/// `UPDATE=0, DELETE=1, EOM=2`.
pub mod tag {
    pub const UPDATE: u8 = 0;
    pub const DELETE: u8 = 1;
    pub const EOM: u8 = 2;
}

/// A self-contained snapshot of one inventory object, as carried by
/// `UPDATE`/`DELETE` records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InventoryObject {
    Dataset(DatasetRecord),
    Block(BlockRecord),
    File {
        dataset: String,
        block: dynamo_core::BlockName,
        file: File,
    },
    Site(Site),
    DatasetReplica(DatasetReplica),
    BlockReplica(BlockReplica),
}

/// One record of the mutation channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tag", rename_all = "snake_case")]
pub enum MutationRecord {
    Update(InventoryObject),
    Delete(InventoryObject),
    Eom,
}

impl MutationRecord {
    pub fn tag(&self) -> u8 {
        match self {
            MutationRecord::Update(_) => tag::UPDATE,
            MutationRecord::Delete(_) => tag::DELETE,
            MutationRecord::Eom => tag::EOM,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed mutation record: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Write one record as a newline-delimited JSON line.
pub fn write_record<W: Write>(writer: &mut W, record: &MutationRecord) -> Result<(), WireError> {
    let line = serde_json::to_string(record)?;
    writer.write_all(line.as_bytes())?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

/// Read one record from a line, if present (an empty/EOF line yields `None`).
pub fn read_record<R: BufRead>(reader: &mut R) -> Result<Option<MutationRecord>, WireError> {
    let mut line = String::new();
    let n = reader.read_line(&mut line)?;
    if n == 0 {
        return Ok(None);
    }
    let trimmed = line.trim_end();
    if trimmed.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(trimmed)?))
}
