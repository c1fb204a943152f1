// SPDX-License-Identifier: MIT

//! Child-process spawning (spec §4.4 steps 1-4, §4.7).
//!
//! The scheduler fully controls how the child image is created: stdio
//! redirection, argv, signal disposition, and (for write-enabled actions)
//! a pre-opened pipe the child inherits as a fixed fd. What runs inside the
//! child afterward is opaque to this crate.

use dynamo_core::{ActionId, DynamoError, Result};
use nix::sys::signal::{self, SigHandler, Signal};
use nix::unistd::pipe;
use std::fs::{File, OpenOptions};
use std::os::fd::AsRawFd;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};

/// The fixed fd number a write-enabled child inherits its mutation pipe on.
/// Communicated to the child via `DYNAMO_MUTATION_FD` (spec §4.7) so the
/// script SDK does not need to hardcode it.
pub const MUTATION_FD: i32 = 3;

/// Everything the scheduler knows about an action at spawn time.
pub struct WorkerSpec {
    pub action_id: ActionId,
    pub exec_path: PathBuf,
    pub args: Vec<String>,
    pub stdout_path: PathBuf,
    pub stderr_path: PathBuf,
    pub write_enabled: bool,
    pub registry_endpoint: String,
    pub inventory_endpoint: String,
}

/// A live child process, parent-side.
pub trait SpawnedProcess: Send {
    fn action_id(&self) -> ActionId;

    /// Non-blocking poll of exit status.
    fn try_wait(&mut self) -> Result<Option<ExitStatus>>;

    /// Send the termination signal (spec §4.5.1 reap).
    fn terminate(&mut self) -> Result<()>;

    /// Take the pipe's read end, if this worker was write-enabled. Returns
    /// `None` on a second call.
    fn take_mutation_reader(&mut self) -> Option<File>;
}

/// Spawns real OS child processes (spec §4.4 steps 1-4).
pub trait ChildSpawner: Send + Sync {
    fn spawn(&self, spec: WorkerSpec) -> Result<Box<dyn SpawnedProcess>>;
}

/// Prepare a child's signal disposition before exec (spec §4.4 step 1).
/// Unblocks everything inherited from the parent (so it does not carry a
/// blocked-signal mask held during a commit critical section, spec §4.6),
/// then permanently ignores the interrupt signal: a plain executable has
/// no code path to install `CancellationConverter` itself, so this is the
/// only place the interrupt-ignoring half of step 1 can be realized for
/// it. `SIG_IGN` (unlike an installed handler) survives exec. The
/// termination signal is left at its default disposition so a worker that
/// never calls into the script SDK still dies on SIGTERM as expected; a
/// worker that does call `ScriptContext::from_env` overrides it with
/// `CancellationConverter` to get the structured-cancellation half instead.
#[allow(unsafe_code)]
fn reset_signals() -> std::io::Result<()> {
    unsafe {
        signal::sigprocmask(
            signal::SigmaskHow::SIG_SETMASK,
            Some(&nix::sys::signal::SigSet::empty()),
            None,
        )
        .map_err(std::io::Error::from)?;
        signal::signal(Signal::SIGINT, SigHandler::SigIgn).map_err(std::io::Error::from)?;
        signal::signal(Signal::SIGTERM, SigHandler::SigDfl).map_err(std::io::Error::from)?;
    }
    Ok(())
}

/// Real Unix implementation of [`ChildSpawner`].
#[derive(Default)]
pub struct UnixChildSpawner;

impl UnixChildSpawner {
    pub fn new() -> Self {
        UnixChildSpawner
    }
}

impl ChildSpawner for UnixChildSpawner {
    fn spawn(&self, spec: WorkerSpec) -> Result<Box<dyn SpawnedProcess>> {
        let stdout = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&spec.stdout_path)
            .map_err(|e| {
                DynamoError::backend(format!("open {}", spec.stdout_path.display()), e)
            })?;
        let stderr = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&spec.stderr_path)
            .map_err(|e| {
                DynamoError::backend(format!("open {}", spec.stderr_path.display()), e)
            })?;

        let mut command = Command::new(&spec.exec_path);
        command
            // New process group so a Ctrl-C delivered to the daemon's
            // controlling terminal targets only the daemon, not every live
            // worker (the original source's note above its own terminate()
            // call: SIGINT ignored in the child is not enough by itself if
            // the child is still in the terminal's foreground group).
            .process_group(0)
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .env("DYNAMO_ACTION_ID", spec.action_id.to_string())
            .env(
                "DYNAMO_WRITE_ENABLED",
                if spec.write_enabled { "1" } else { "0" },
            )
            .env("DYNAMO_REGISTRY_ENDPOINT", &spec.registry_endpoint)
            .env("DYNAMO_INVENTORY_ENDPOINT", &spec.inventory_endpoint);

        let mutation_pipe = if spec.write_enabled {
            let (read_fd, write_fd) = pipe().map_err(|e| {
                DynamoError::backend("create mutation pipe", std::io::Error::from(e))
            })?;
            command.env("DYNAMO_MUTATION_FD", MUTATION_FD.to_string());

            let read_raw = read_fd.as_raw_fd();
            let write_raw = write_fd.as_raw_fd();
            // SAFETY: runs after fork, before exec, in the child's address
            // space only; only async-signal-safe nix calls are used.
            #[allow(unsafe_code)]
            unsafe {
                command.pre_exec(move || {
                    reset_signals()?;
                    let _ = nix::unistd::close(read_raw);
                    if write_raw != MUTATION_FD {
                        nix::unistd::dup2(write_raw, MUTATION_FD)
                            .map_err(std::io::Error::from)?;
                        let _ = nix::unistd::close(write_raw);
                    }
                    Ok(())
                });
            }
            Some((read_fd, write_fd))
        } else {
            #[allow(unsafe_code)]
            unsafe {
                command.pre_exec(reset_signals);
            }
            None
        };

        let child = command.spawn().map_err(|e| {
            DynamoError::backend(format!("spawn {}", spec.exec_path.display()), e)
        })?;

        // The parent's copy of the write end must close so the pipe sees EOF
        // once the child (the sole remaining writer) exits.
        let mutation_reader = mutation_pipe.map(|(read_fd, write_fd)| {
            drop(write_fd);
            File::from(read_fd)
        });

        Ok(Box::new(UnixSpawnedProcess {
            action_id: spec.action_id,
            child,
            mutation_reader,
        }))
    }
}

struct UnixSpawnedProcess {
    action_id: ActionId,
    child: Child,
    mutation_reader: Option<File>,
}

impl SpawnedProcess for UnixSpawnedProcess {
    fn action_id(&self) -> ActionId {
        self.action_id
    }

    fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        self.child
            .try_wait()
            .map_err(|e| DynamoError::backend(format!("poll action {}", self.action_id), e))
    }

    fn terminate(&mut self) -> Result<()> {
        let pid = nix::unistd::Pid::from_raw(self.child.id() as i32);
        signal::kill(pid, Signal::SIGTERM).map_err(|e| {
            DynamoError::backend(
                format!("terminate action {}", self.action_id),
                std::io::Error::from(e),
            )
        })
    }

    fn take_mutation_reader(&mut self) -> Option<File> {
        self.mutation_reader.take()
    }
}
