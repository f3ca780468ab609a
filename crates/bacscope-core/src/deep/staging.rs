//! Bounded-memory staging of decoder output.
//!
//! Decoder stdout is copied chunk by chunk into an anonymous temporary
//! file, so memory use does not grow with the number of matched frames.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::progress::CancellationToken;

use super::error::DeepDecodeError;

pub const STAGING_CHUNK_SIZE: usize = 64 * 1024;

/// Running totals of a spool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Spooled {
    pub bytes: u64,
    /// Complete lines staged so far, i.e. records the parser will see.
    pub lines: u64,
}

/// Copy `input` into `output` until end of stream.
///
/// Cancellation is checked before every chunk. `on_chunk` sees the running
/// totals after each chunk.
///
/// # Errors
/// `Cancelled` when the token fires, `ResourceExhausted` when the staging
/// storage is full, `Io` for anything else.
pub fn spool<R: Read, W: Write>(
    mut input: R,
    mut output: W,
    cancel: &CancellationToken,
    mut on_chunk: impl FnMut(&Spooled),
) -> Result<Spooled, DeepDecodeError> {
    let mut buf = vec![0u8; STAGING_CHUNK_SIZE];
    let mut spooled = Spooled::default();
    loop {
        if cancel.is_cancelled() {
            return Err(DeepDecodeError::Cancelled);
        }
        let read = match input.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(DeepDecodeError::Io(err)),
        };
        let chunk = &buf[..read];
        output
            .write_all(chunk)
            .map_err(|err| DeepDecodeError::from_io(err, spooled.lines))?;
        spooled.bytes += read as u64;
        spooled.lines += chunk.iter().filter(|b| **b == b'\n').count() as u64;
        on_chunk(&spooled);
    }
    output
        .flush()
        .map_err(|err| DeepDecodeError::from_io(err, spooled.lines))?;
    Ok(spooled)
}

/// Spool into a fresh temporary file and rewind it for reading.
pub fn spool_to_tempfile<R: Read>(
    input: R,
    cancel: &CancellationToken,
    on_chunk: impl FnMut(&Spooled),
) -> Result<(File, Spooled), DeepDecodeError> {
    let mut file = tempfile::tempfile().map_err(|err| DeepDecodeError::from_io(err, 0))?;
    let spooled = spool(input, &mut file, cancel, on_chunk)?;
    file.seek(SeekFrom::Start(0))?;
    Ok((file, spooled))
}
