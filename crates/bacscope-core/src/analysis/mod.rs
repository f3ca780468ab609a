//! End-to-end analysis of one capture file.
//!
//! The generic pass and the optional deep pass run side by side, each with
//! its own [`KnowledgeBase`]. Once both are done the enriched records are
//! merged into the generic set, the two knowledge bases are combined and
//! statistics are computed over the merged records.

mod report;
pub mod stats;

use std::path::{Path, PathBuf};
use std::thread;

use thiserror::Error;

use crate::config::AnalysisConfig;
use crate::decode::{CaptureDecoder, DecodeError, DecodeOptions, DecodedCapture};
use crate::deep::{DeepDecodeError, DeepDecoded, DeepDecoder};
use crate::knowledge::KnowledgeBase;
use crate::merge::{MergeSummary, merge_packets};
use crate::progress::{CancellationToken, Phase, ProgressSink, ProgressUpdate};
use crate::record::PacketRecord;
use crate::warnings::WarningLog;

pub use report::{build_report, input_info};
pub use stats::{AggregateStatistics, StatisticsAggregator, bucket_start};

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Decode(DecodeError),
    #[error(transparent)]
    Deep(DeepDecodeError),
    #[error("analysis cancelled")]
    Cancelled,
}

impl From<DecodeError> for AnalysisError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::Cancelled => AnalysisError::Cancelled,
            other => AnalysisError::Decode(other),
        }
    }
}

impl From<DeepDecodeError> for AnalysisError {
    fn from(err: DeepDecodeError) -> Self {
        match err {
            DeepDecodeError::Cancelled => AnalysisError::Cancelled,
            other => AnalysisError::Deep(other),
        }
    }
}

/// Everything one analysis run produced.
#[derive(Debug)]
pub struct AnalysisOutcome {
    pub source: PathBuf,
    /// Merged record set, fragments included, in frame order.
    pub records: Vec<PacketRecord>,
    /// Frames read from the container, decoded or not.
    pub frames_read: u64,
    pub statistics: AggregateStatistics,
    pub knowledge: KnowledgeBase,
    /// Generic pass warnings first, then deep pass warnings.
    pub warnings: WarningLog,
    /// Present when the deep pass ran.
    pub merge: Option<MergeSummary>,
}

impl AnalysisOutcome {
    pub fn protocol_records(&self) -> impl Iterator<Item = &PacketRecord> {
        self.records.iter().filter(|r| r.is_protocol_of_interest())
    }
}

type PassResult<T, E> = Result<(T, KnowledgeBase), E>;

/// Analyse the capture at `path`.
///
/// # Errors
/// `Decode` when the capture cannot be opened, `Deep` when the deep pass
/// is enabled and fails fatally, `Cancelled` when `cancel` fires in any
/// phase. Per-frame problems never fail the run; they end up in
/// [`AnalysisOutcome::warnings`].
pub fn analyze_capture(
    path: &Path,
    config: &AnalysisConfig,
    progress: &dyn ProgressSink,
    cancel: &CancellationToken,
) -> Result<AnalysisOutcome, AnalysisError> {
    let config = config.clone().normalized();
    let options = DecodeOptions::from(&config);
    let decoder = CaptureDecoder::open(path, options)?;
    let deep = config
        .deep_decoder
        .enabled
        .then(|| DeepDecoder::new(config.deep_decoder.clone(), options));
    tracing::debug!(path = %path.display(), deep = deep.is_some(), "starting analysis");

    let deep_cancel = cancel.child();
    let (generic, deep_result) = thread::scope(|scope| {
        let deep_handle = deep.as_ref().map(|deep| {
            let deep_cancel = &deep_cancel;
            scope.spawn(move || -> PassResult<DeepDecoded, DeepDecodeError> {
                let mut knowledge = KnowledgeBase::new();
                let decoded = deep.decode(path, &mut knowledge, progress, deep_cancel)?;
                Ok((decoded, knowledge))
            })
        });

        let mut knowledge = KnowledgeBase::new();
        let generic: PassResult<DecodedCapture, DecodeError> = decoder
            .decode(&mut knowledge, progress, cancel)
            .map(|decoded| (decoded, knowledge));
        if generic.is_err() {
            deep_cancel.cancel();
        }

        let deep_result = deep_handle.map(|handle| {
            handle
                .join()
                .unwrap_or_else(|payload| std::panic::resume_unwind(payload))
        });
        (generic, deep_result)
    });

    let (decoded, mut knowledge) = generic?;
    let DecodedCapture {
        mut records,
        frames_read,
        mut warnings,
    } = decoded;
    let deep = deep_result.transpose()?;

    if cancel.is_cancelled() {
        return Err(AnalysisError::Cancelled);
    }

    let merge = match deep {
        Some((deep_decoded, deep_knowledge)) => {
            progress.report(ProgressUpdate::new(
                Phase::Merging,
                format!("merging {} enriched records", deep_decoded.records.len()),
                0,
            ));
            let summary = merge_packets(&mut records, &deep_decoded.records);
            knowledge = KnowledgeBase::merge(&knowledge, &deep_knowledge);
            warnings.append(deep_decoded.warnings);
            progress.report(ProgressUpdate::new(Phase::Merging, "merge finished", 100));
            tracing::info!(
                matched = summary.matched,
                unmatched = summary.unmatched,
                devices = knowledge.device_count(),
                "passes merged"
            );
            Some(summary)
        }
        None => None,
    };

    if cancel.is_cancelled() {
        return Err(AnalysisError::Cancelled);
    }

    progress.report(ProgressUpdate::new(
        Phase::Statistics,
        "computing statistics",
        0,
    ));
    let statistics = AggregateStatistics::from_records(&records, config.bucket_seconds);
    progress.report(ProgressUpdate::new(
        Phase::Statistics,
        "statistics ready",
        100,
    ));
    tracing::info!(
        packets = statistics.total_packets,
        fragments = statistics.fragments_excluded,
        devices = knowledge.device_count(),
        warnings = warnings.len(),
        "analysis finished"
    );

    Ok(AnalysisOutcome {
        source: path.to_path_buf(),
        records,
        frames_read,
        statistics,
        knowledge,
        warnings,
        merge,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use crate::source::SourceError;

    #[test]
    fn cancelled_variants_collapse_into_one_outcome() {
        assert!(matches!(
            AnalysisError::from(DecodeError::Cancelled),
            AnalysisError::Cancelled
        ));
        assert!(matches!(
            AnalysisError::from(DeepDecodeError::Cancelled),
            AnalysisError::Cancelled
        ));
        let failed = AnalysisError::from(DeepDecodeError::Failed {
            status: "exit status: 2".to_string(),
            stderr: String::new(),
        });
        assert!(matches!(failed, AnalysisError::Deep(_)));
    }

    #[test]
    fn missing_capture_is_a_setup_error() {
        let err = analyze_capture(
            Path::new("does/not/exist.pcapng"),
            &AnalysisConfig::default(),
            &NoProgress,
            &CancellationToken::new(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::Decode(DecodeError::CaptureOpen {
                source: SourceError::Io(_),
                ..
            })
        ));
    }
}
