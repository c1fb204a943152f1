// SPDX-License-Identifier: MIT

//! Block identity and name conversions (spec §3, §6, §8 invariants 4-5).

use crate::error::{DynamoError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A block's 128-bit name, the smallest unit of data management's identity.
///
/// Has two textual/numeric representations that must round-trip losslessly:
/// an "internal" compact integer and a "real" hex-with-dashes string of the
/// canonical form `XXXXXXXX-XXXX-XXXX-XXXX-XXXXXXXXXXXX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockName(u128);

impl BlockName {
    /// Build from the already-parsed internal integer representation.
    pub fn from_internal(value: u128) -> Self {
        BlockName(value)
    }

    pub fn to_internal(self) -> u128 {
        self.0
    }

    /// Parse the canonical `8-4-4-4-12` hex-with-dashes textual form.
    pub fn from_real(s: &str) -> Result<Self> {
        let stripped: String = s.chars().filter(|c| *c != '-').collect();
        if stripped.len() != 32 || !stripped.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(DynamoError::Object(format!(
                "invalid block name: {s}"
            )));
        }
        let value = u128::from_str_radix(&stripped, 16)
            .map_err(|e| DynamoError::Object(format!("invalid block name {s}: {e}")))?;
        Ok(BlockName(value))
    }

    /// Render the canonical `8-4-4-4-12` hex-with-dashes textual form.
    pub fn to_real(self) -> String {
        let hex = format!("{:032x}", self.0);
        format!(
            "{}-{}-{}-{}-{}",
            &hex[0..8],
            &hex[8..12],
            &hex[12..16],
            &hex[16..20],
            &hex[20..32]
        )
    }

    /// Join a dataset name and this block's real name into the full-block
    /// identifier `<dataset-name>#<block-real-name>`.
    pub fn to_full(self, dataset_name: &str) -> String {
        format!("{}#{}", dataset_name, self.to_real())
    }

    /// Split a full-block identifier into its dataset name and internal
    /// block name. Rejects strings without `#`.
    pub fn from_full(full_name: &str) -> Result<(String, BlockName)> {
        let (dataset, real) = full_name
            .split_once('#')
            .ok_or_else(|| DynamoError::Object(format!("invalid block name {full_name}")))?;
        Ok((dataset.to_string(), BlockName::from_real(real)?))
    }
}

impl fmt::Display for BlockName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_real())
    }
}

/// A block's scalar attributes, independent of its (possibly unmaterialized)
/// file set. This is the shape persisted by [`crate::InventoryStore`] and
/// carried across the mutation channel; the richer `Block` graph node that
/// tracks lazily-loaded files lives in the inventory crate, which wraps one
/// of these records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRecord {
    pub id: i64,
    pub name: BlockName,
    pub dataset: String,
    pub size: u64,
    pub num_files: u64,
    pub is_open: bool,
    /// Unix seconds of last update.
    pub last_update: i64,
}

impl BlockRecord {
    pub fn full_name(&self) -> String {
        self.name.to_full(&self.dataset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[yare::parameterized(
        zero = { "00000000-0000-0000-0000-000000000000" },
        simple = { "deadbeef-0000-4000-8000-000000000001" },
        max = { "ffffffff-ffff-ffff-ffff-ffffffffffff" },
    )]
    fn round_trips_through_internal(name: &str) {
        let parsed = BlockName::from_real(name).unwrap();
        assert_eq!(parsed.to_real(), name);
    }

    #[test]
    fn full_name_round_trip() {
        let name = BlockName::from_real("deadbeef-0000-4000-8000-000000000001").unwrap();
        let full = name.to_full("MyDataset");
        let (dataset, parsed) = BlockName::from_full(&full).unwrap();
        assert_eq!(dataset, "MyDataset");
        assert_eq!(parsed, name);
    }

    #[test]
    fn from_full_rejects_missing_hash() {
        assert!(BlockName::from_full("MyDatasetNoHash").is_err());
    }

    proptest::proptest! {
        #[test]
        fn prop_round_trip(value: u128) {
            let name = BlockName::from_internal(value);
            let real = name.to_real();
            let parsed = BlockName::from_real(&real).unwrap();
            proptest::prop_assert_eq!(parsed.to_internal(), value);
        }
    }
}
