// SPDX-License-Identifier: MIT

//! Top-level shutdown signal handling (spec §4.6). Distinct from
//! [`dynamo_worker::SignalGuard`], which blocks delivery during a critical
//! section; this converts SIGINT/SIGTERM into a flag the main loop polls
//! between ticks so shutdown can drain live workers before exiting.

use nix::sys::signal::{self, SigHandler, Signal};
use std::sync::atomic::{AtomicBool, Ordering};

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_shutdown_signal(_: i32) {
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
}

/// Install SIGINT/SIGTERM handlers that set the shutdown flag. Must be
/// called once, before the scheduler's poll loop starts.
pub fn install() -> Result<(), nix::Error> {
    let handler = SigHandler::Handler(on_shutdown_signal);
    #[allow(unsafe_code)]
    unsafe {
        signal::signal(Signal::SIGINT, handler)?;
        signal::signal(Signal::SIGTERM, handler)?;
    }
    Ok(())
}

pub fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::SeqCst)
}
