//! Deep decode pass through an external dissector.
//!
//! The dissector reads the capture itself, keeps only frames matching the
//! display filter and prints one tab-separated line per frame. Its stdout
//! is staged to a temporary file (`staging`), then parsed lazily into
//! records (`parser`). Records carry the same frame numbers as the generic
//! pass and richer detail maps.

pub mod command;
pub mod error;
pub mod parser;
pub mod staging;

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Child, ExitStatus};
use std::thread::{self, JoinHandle};

use crate::config::DeepDecoderConfig;
use crate::decode::DecodeOptions;
use crate::knowledge::KnowledgeBase;
use crate::progress::{CancellationToken, Phase, ProgressSink, ProgressUpdate, percent_of};
use crate::record::PacketRecord;
use crate::warnings::WarningLog;

pub use command::{DEFAULT_DISPLAY_FILTER, DEFAULT_FIELDS, DEFAULT_TOOL, DecoderCommand};
pub use error::{DeepDecodeError, LineError};
pub use parser::{StagedRecords, parse_line};

/// Lines of decoder stderr kept for error reports.
const STDERR_TAIL_LINES: usize = 20;
/// Staged bytes between progress updates while the decoder runs.
const STAGING_PROGRESS_BYTES: u64 = 4 * 1024 * 1024;

/// Output of a finished decoder run, ready to be parsed.
pub struct DeepStream {
    pub records: StagedRecords<BufReader<File>>,
    pub status: ExitStatus,
    pub staged_bytes: u64,
    pub stderr_tail: String,
}

/// Result of a complete deep pass.
#[derive(Debug, Default)]
pub struct DeepDecoded {
    pub records: Vec<PacketRecord>,
    pub warnings: WarningLog,
}

pub struct DeepDecoder {
    config: DeepDecoderConfig,
    options: DecodeOptions,
}

impl DeepDecoder {
    pub fn new(config: DeepDecoderConfig, options: DecodeOptions) -> Self {
        Self { config, options }
    }

    pub fn config(&self) -> &DeepDecoderConfig {
        &self.config
    }

    /// Run the decoder over `capture` and stage its output.
    ///
    /// # Errors
    /// `ToolUnavailable` when the decoder cannot be started, `Cancelled`
    /// when the token fires while output is being staged (the decoder is
    /// killed), `ResourceExhausted` when staging storage runs out.
    pub fn stream(
        &self,
        capture: &Path,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<DeepStream, DeepDecodeError> {
        let command = DecoderCommand::new(&self.config, capture);
        tracing::debug!(tool = command.tool(), args = ?command.args(), "starting deep decoder");
        let mut child = command.spawn()?;
        let stderr = child.stderr.take().map(collect_stderr);

        let Some(stdout) = child.stdout.take() else {
            stop_child(&mut child);
            return Err(DeepDecodeError::Io(std::io::Error::other(
                "deep decoder stdout not captured",
            )));
        };

        let mut next_report = STAGING_PROGRESS_BYTES;
        let staged = staging::spool_to_tempfile(stdout, cancel, |spooled| {
            if spooled.bytes >= next_report {
                next_report = spooled.bytes + STAGING_PROGRESS_BYTES;
                progress.report(ProgressUpdate::new(
                    Phase::DeepDecoding,
                    format!(
                        "staged {} KiB ({} records)",
                        spooled.bytes / 1024,
                        spooled.lines
                    ),
                    0,
                ));
            }
        });
        let (file, spooled) = match staged {
            Ok(staged) => staged,
            Err(err) => {
                stop_child(&mut child);
                return Err(err);
            }
        };

        let status = child.wait()?;
        let stderr_tail = stderr
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();
        tracing::debug!(%status, bytes = spooled.bytes, lines = spooled.lines, "deep decoder exited");

        Ok(DeepStream {
            records: StagedRecords::new(BufReader::new(file), self.config.fields.clone()),
            status,
            staged_bytes: spooled.bytes,
            stderr_tail,
        })
    }

    /// Run the decoder and parse every record, feeding `knowledge`.
    ///
    /// A non-zero exit is fatal only when no record was produced; with
    /// records it is kept as a warning.
    pub fn decode(
        &self,
        capture: &Path,
        knowledge: &mut KnowledgeBase,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<DeepDecoded, DeepDecodeError> {
        let DeepStream {
            mut records,
            status,
            staged_bytes,
            stderr_tail,
        } = self.stream(capture, progress, cancel)?;

        let mut decoded: Vec<PacketRecord> = Vec::new();
        let mut produced = 0u64;
        while let Some(record) = records.next() {
            if decoded.try_reserve(1).is_err() {
                return Err(DeepDecodeError::ResourceExhausted { produced });
            }
            knowledge.observe(&record);
            decoded.push(record);
            produced += 1;

            if produced % self.options.cancel_check_interval == 0 && cancel.is_cancelled() {
                return Err(DeepDecodeError::Cancelled);
            }
            if produced % self.options.progress_interval == 0 {
                progress.report(ProgressUpdate::new(
                    Phase::DeepDecoding,
                    format!("parsed {produced} enriched records"),
                    percent_of(records.bytes_read(), staged_bytes),
                ));
            }
        }
        if let Some(err) = records.take_error() {
            return Err(DeepDecodeError::from_io(err, produced));
        }
        if cancel.is_cancelled() {
            return Err(DeepDecodeError::Cancelled);
        }

        let mut warnings = records.into_warnings();
        if !status.success() {
            if decoded.is_empty() {
                return Err(DeepDecodeError::Failed {
                    status: status.to_string(),
                    stderr: stderr_tail,
                });
            }
            warnings.push(
                "deep decoder",
                format!(
                    "exited with {status}; keeping {} records: {stderr_tail}",
                    decoded.len()
                ),
            );
        }

        progress.report(ProgressUpdate::new(
            Phase::DeepDecoding,
            format!("parsed {produced} enriched records"),
            100,
        ));
        tracing::info!(
            records = decoded.len(),
            warnings = warnings.len(),
            "deep decode finished"
        );
        Ok(DeepDecoded {
            records: decoded,
            warnings,
        })
    }
}

fn stop_child(child: &mut Child) {
    if let Err(err) = child.kill() {
        tracing::debug!(error = %err, "deep decoder already stopped");
    }
    if let Err(err) = child.wait() {
        tracing::debug!(error = %err, "deep decoder could not be reaped");
    }
}

/// Drain stderr on its own thread so a chatty decoder never blocks on a
/// full pipe. Lines go to the debug log; the last few are kept.
fn collect_stderr<R: Read + Send + 'static>(stderr: R) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
        for line in BufReader::new(stderr).lines() {
            let Ok(line) = line else { break };
            tracing::debug!(target: "bacscope::deep::stderr", "{line}");
            if tail.len() == STDERR_TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(line);
        }
        tail.into_iter().collect::<Vec<_>>().join("\n")
    })
}
