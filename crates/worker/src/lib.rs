// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! dynamo-worker: child-process lifecycle and signal handling (spec §4.4,
//! §4.6, components C5/C7).

pub mod channel;
pub mod signal;
pub mod spawner;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;

pub use channel::{read_record_with_timeout, DrainError};
pub use signal::{CancellationConverter, SignalGuard};
pub use spawner::{ChildSpawner, SpawnedProcess, UnixChildSpawner, WorkerSpec, MUTATION_FD};

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeChildSpawner, FakeOutcome};
