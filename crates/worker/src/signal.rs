// SPDX-License-Identifier: MIT

//! SignalGuard (spec §4.6, component C7): mask/unmask of termination signals
//! around a critical section, so a Ctrl-C during commit does not leave the
//! inventory half-applied (spec §9 "signal-safe commit").

use dynamo_core::{DynamoError, Result};
use nix::sys::signal::{self, SigHandler, SigSet, Signal};
use std::sync::atomic::{AtomicBool, Ordering};

/// Blocks SIGINT and SIGTERM for the lifetime of the guard, restoring the
/// previous mask on drop. Signals arriving while blocked are delivered as
/// pending once the guard is released.
pub struct SignalGuard {
    previous: SigSet,
}

impl SignalGuard {
    /// Block SIGINT/SIGTERM. Call at the start of a section that must not
    /// be interrupted (e.g. the mutation-channel drain).
    pub fn block() -> Result<Self> {
        let previous = SigSet::thread_get_mask()
            .map_err(|e| DynamoError::backend("read signal mask", std::io::Error::from(e)))?;

        let mut to_block = SigSet::empty();
        to_block.add(Signal::SIGINT);
        to_block.add(Signal::SIGTERM);
        to_block
            .thread_block()
            .map_err(|e| DynamoError::backend("block signals", std::io::Error::from(e)))?;

        Ok(SignalGuard { previous })
    }
}

impl Drop for SignalGuard {
    fn drop(&mut self) {
        let _ = self.previous.thread_set_mask();
    }
}

static CANCELLATION_REQUESTED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_termination_signal(_: i32) {
    CANCELLATION_REQUESTED.store(true, Ordering::SeqCst);
}

/// Converts the termination signal into an observable structured
/// cancellation (spec §4.4 step 1, §4.6 "converter"). Installed once by a
/// worker's entry point (the script SDK's `ScriptContext::from_env`); the
/// interrupt signal itself is handled separately, and permanently, by the
/// scheduler's spawn configuration (`pre_exec` sets it to ignored before
/// exec, since a plain executable has no code path to call `install` on
/// its own).
pub struct CancellationConverter;

impl CancellationConverter {
    pub fn install() -> Result<Self> {
        let handler = SigHandler::Handler(on_termination_signal);
        #[allow(unsafe_code)]
        unsafe {
            signal::signal(Signal::SIGTERM, handler).map_err(|e| {
                DynamoError::backend("install SIGTERM converter", std::io::Error::from(e))
            })?;
        }
        Ok(CancellationConverter)
    }

    /// Whether the termination signal has arrived since `install`.
    pub fn cancellation_requested(&self) -> bool {
        CANCELLATION_REQUESTED.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_blocks_and_restores_mask() {
        let before = SigSet::thread_get_mask().unwrap();

        {
            let _guard = SignalGuard::block().unwrap();
            let during = SigSet::thread_get_mask().unwrap();
            assert!(during.contains(Signal::SIGINT));
            assert!(during.contains(Signal::SIGTERM));
        }

        let after = SigSet::thread_get_mask().unwrap();
        assert_eq!(
            after.contains(Signal::SIGINT),
            before.contains(Signal::SIGINT)
        );
    }

    #[test]
    fn converter_observes_termination_signal() {
        let converter = CancellationConverter::install().unwrap();
        assert!(!converter.cancellation_requested());
        signal::raise(Signal::SIGTERM).unwrap();
        assert!(converter.cancellation_requested());
    }
}
