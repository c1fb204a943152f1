// SPDX-License-Identifier: MIT

//! dynamo-sdk: the in-child half of the worker-facing handle contract
//! (spec §4.4 steps 5-8, §4.7).
//!
//! A Rust-implemented action script calls [`ScriptContext::from_env`] to
//! recover its action id, write privilege, and (if write-enabled) a handle
//! onto the inherited mutation pipe, then calls [`ScriptContext::update`]
//! and [`ScriptContext::delete`] as it goes and [`ScriptContext::finish`]
//! before exiting 0. Everything here runs inside the spawned child; the
//! scheduler-side spawn configuration lives in `dynamo-worker`.

use dynamo_core::ActionId;
use dynamo_wire::{MutationRecord, WireError};
use dynamo_worker::CancellationConverter;
use std::env::VarError;
use std::fs::File;
use std::os::fd::FromRawFd;

#[derive(Debug, thiserror::Error)]
pub enum SdkError {
    #[error("missing or invalid environment variable {0}")]
    Env(&'static str),
    #[error("action is not write-enabled")]
    NotWriteEnabled,
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error(transparent)]
    Signal(#[from] dynamo_core::DynamoError),
}

/// The handle a worker-facing script entry point receives in place of a
/// shared in-process object reference (spec §9 "Global state").
pub struct ScriptContext {
    pub action_id: ActionId,
    pub write_enabled: bool,
    pub registry_endpoint: String,
    pub inventory_endpoint: String,
    mutation_pipe: Option<File>,
    cancellation: CancellationConverter,
}

impl ScriptContext {
    /// Recover the contract the scheduler established at spawn time
    /// (spec §4.7), and install the termination-signal converter (spec
    /// §4.4 step 1, §4.6): the scheduler's spawn configuration already
    /// ignores the interrupt signal permanently before exec, so only the
    /// termination signal needs converting here, into a flag the running
    /// script can poll via [`ScriptContext::cancellation_requested`].
    pub fn from_env() -> Result<Self, SdkError> {
        let action_id = read_env("DYNAMO_ACTION_ID")?
            .parse()
            .map_err(|_| SdkError::Env("DYNAMO_ACTION_ID"))?;
        let write_enabled = match read_env("DYNAMO_WRITE_ENABLED")?.as_str() {
            "1" => true,
            "0" => false,
            _ => return Err(SdkError::Env("DYNAMO_WRITE_ENABLED")),
        };
        let registry_endpoint = read_env("DYNAMO_REGISTRY_ENDPOINT")?;
        let inventory_endpoint = read_env("DYNAMO_INVENTORY_ENDPOINT")?;
        let cancellation = CancellationConverter::install()?;

        let mutation_pipe = if write_enabled {
            let fd: i32 = read_env("DYNAMO_MUTATION_FD")?
                .parse()
                .map_err(|_| SdkError::Env("DYNAMO_MUTATION_FD"))?;
            // SAFETY: the scheduler dup2'd its mutation pipe write end onto
            // this fd before exec (spec §4.7); we own it for the process
            // lifetime and no other code in this binary should touch it.
            #[allow(unsafe_code)]
            Some(unsafe { File::from_raw_fd(fd) })
        } else {
            None
        };

        Ok(ScriptContext {
            action_id,
            write_enabled,
            registry_endpoint,
            inventory_endpoint,
            mutation_pipe,
            cancellation,
        })
    }

    /// Whether the termination signal has arrived since this context was
    /// created (spec §4.4 step 9: a script observing this should unwind
    /// without sending EOM).
    pub fn cancellation_requested(&self) -> bool {
        self.cancellation.cancellation_requested()
    }

    /// Send `(UPDATE, object)` (spec §4.4 step 8).
    pub fn update(&mut self, object: dynamo_wire::InventoryObject) -> Result<(), SdkError> {
        self.send(MutationRecord::Update(object))
    }

    /// Send `(DELETE, object)` (spec §4.4 step 8).
    pub fn delete(&mut self, object: dynamo_wire::InventoryObject) -> Result<(), SdkError> {
        self.send(MutationRecord::Delete(object))
    }

    /// Send the terminal `(EOM, nil)` record. Must be called before a
    /// write-enabled script exits 0 (spec §4.4 step 8); skipping it (e.g. on
    /// a structured cancellation) is how step 9's "no EOM" signal works.
    pub fn finish(mut self) -> Result<(), SdkError> {
        self.send(MutationRecord::Eom)
    }

    fn send(&mut self, record: MutationRecord) -> Result<(), SdkError> {
        let pipe = self.mutation_pipe.as_mut().ok_or(SdkError::NotWriteEnabled)?;
        dynamo_wire::write_record(pipe, &record)?;
        Ok(())
    }
}

fn read_env(name: &'static str) -> Result<String, SdkError> {
    match std::env::var(name) {
        Ok(value) => Ok(value),
        Err(VarError::NotPresent) | Err(VarError::NotUnicode(_)) => Err(SdkError::Env(name)),
    }
}
