// SPDX-License-Identifier: MIT

//! Bounded-wait draining of a write-worker's mutation channel (spec §4.5.1,
//! §5, §9: the original's "non-blocking get with a timeout argument" is
//! contradictory in most channel APIs; this reimplementation treats it as a
//! bounded wait per message, `recv_timeout`-style).

use dynamo_wire::{read_record, MutationRecord, WireError};
use nix::sys::select::{select, FdSet};
use nix::sys::time::{TimeVal, TimeValLike};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::os::fd::{AsFd, AsRawFd};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum DrainError {
    #[error("timed out waiting for a mutation record")]
    Timeout,
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error("poll error: {0}")]
    Poll(#[source] std::io::Error),
}

/// Read one record, waiting up to `timeout` for data to arrive if the
/// reader has no buffered bytes left. `Ok(None)` means a clean EOF (the
/// child closed its write end without sending EOM); [`DrainError::Timeout`]
/// means the wait itself expired.
pub fn read_record_with_timeout(
    reader: &mut BufReader<File>,
    timeout: Duration,
) -> Result<Option<MutationRecord>, DrainError> {
    if reader.buffer().is_empty() {
        let fd = reader.get_ref().as_fd();
        let mut read_fds = FdSet::new();
        read_fds.insert(fd);
        let mut tv = TimeVal::milliseconds(timeout.as_millis() as i64);
        let ready = select(
            fd.as_raw_fd() + 1,
            &mut read_fds,
            None,
            None,
            &mut tv,
        )
        .map_err(|e| DrainError::Poll(std::io::Error::from(e)))?;
        if ready == 0 {
            return Err(DrainError::Timeout);
        }
    }
    Ok(read_record(reader)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dynamo_wire::write_record;
    use std::io::Write as _;

    #[test]
    fn reads_buffered_record_without_waiting() {
        let (read_fd, write_fd) = nix::unistd::pipe().unwrap();
        let mut writer = File::from(write_fd);
        write_record(&mut writer, &MutationRecord::Eom).unwrap();
        writer.flush().unwrap();
        drop(writer);

        let mut reader = BufReader::new(File::from(read_fd));
        let record = read_record_with_timeout(&mut reader, Duration::from_millis(100))
            .unwrap()
            .unwrap();
        assert_eq!(record, MutationRecord::Eom);
    }

    #[test]
    fn times_out_when_no_data_arrives() {
        let (read_fd, write_fd) = nix::unistd::pipe().unwrap();
        // keep write_fd open so the read doesn't see EOF, just no data
        let reader_file = File::from(read_fd);
        let mut reader = BufReader::new(reader_file);
        let result = read_record_with_timeout(&mut reader, Duration::from_millis(50));
        assert!(matches!(result, Err(DrainError::Timeout)));
        drop(write_fd);
    }
}
