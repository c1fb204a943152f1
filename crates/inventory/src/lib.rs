// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::unwrap_used))]

//! dynamo-inventory: the in-memory inventory object graph and its
//! persistent store boundary (spec §4.2, components C1-C2).

pub mod cache;
pub mod graph;
pub mod store;

pub use cache::{FileSetCache, FileSetState};
pub use graph::{Inventory, MutationJournal, MutationOp};
pub use store::{InMemoryInventoryStore, InventoryStore};
