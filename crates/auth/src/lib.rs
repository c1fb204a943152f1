// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::unwrap_used))]

//! dynamo-auth: write-action authorization (spec §4.3, component C4).
//!
//! Authorization rows are operator-curated: `(title, checksum) -> user_id`,
//! where `user_id = 0` means "any user". The checksum is the MD5 of the
//! script's bytes, retained for wire compatibility with existing
//! authorization rows (spec §9) — it is not used as a security primitive.

use dynamo_core::Result;
use parking_lot::Mutex;
use std::collections::HashMap;

/// 16-byte MD5 checksum of a script's bytes.
pub type Checksum = [u8; 16];

pub fn checksum(script_bytes: &[u8]) -> Checksum {
    md5::compute(script_bytes).0
}

/// Mapping from `(title, checksum)` to the set of permitted user ids.
pub trait AuthorizationTable: Send + Sync {
    /// True if `user_id` may run the write-requesting action `title` whose
    /// script hashes to `checksum`.
    fn is_authorized(&self, title: &str, script_bytes: &[u8], user_id: i64) -> Result<bool>;
}

/// In-memory reference implementation; a real deployment backs this with
/// the `authorized_executables` table (spec §6), out of scope here.
#[derive(Default)]
pub struct InMemoryAuthorizationTable {
    // (title, checksum) -> allowed user ids (0 == any)
    rows: Mutex<HashMap<(String, Checksum), Vec<i64>>>,
}

impl InMemoryAuthorizationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Authorize `title`/`checksum` for `user_id` (0 == any user).
    pub fn grant(&self, title: impl Into<String>, checksum: Checksum, user_id: i64) {
        self.rows
            .lock()
            .entry((title.into(), checksum))
            .or_default()
            .push(user_id);
    }
}

impl AuthorizationTable for InMemoryAuthorizationTable {
    fn is_authorized(&self, title: &str, script_bytes: &[u8], user_id: i64) -> Result<bool> {
        let key = (title.to_string(), checksum(script_bytes));
        let rows = self.rows.lock();
        let Some(allowed) = rows.get(&key) else {
            return Ok(false);
        };
        Ok(allowed.iter().any(|&u| u == 0 || u == user_id))
    }
}
