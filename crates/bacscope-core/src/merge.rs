//! Reconcile the generic and enriched record sets by frame number.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::protocols::bacnet;
use crate::record::PacketRecord;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeSummary {
    /// Enriched records applied to a generic record.
    pub matched: u64,
    /// Enriched records whose frame number has no generic record.
    pub unmatched: u64,
}

/// Apply `enriched` onto `generic` in place.
///
/// Every generic record whose frame number appears in `enriched` is
/// labelled with the protocol of interest and has its detail map updated
/// key by key (enriched values win, other keys stay). Enriched records
/// without a generic counterpart are counted and dropped, never added.
pub fn merge_packets(generic: &mut [PacketRecord], enriched: &[PacketRecord]) -> MergeSummary {
    let index: HashMap<u64, usize> = generic
        .iter()
        .enumerate()
        .map(|(position, record)| (record.frame_number, position))
        .collect();

    let mut summary = MergeSummary::default();
    for record in enriched {
        let Some(&position) = index.get(&record.frame_number) else {
            summary.unmatched += 1;
            continue;
        };
        let target = &mut generic[position];
        target.app_protocol = Some(bacnet::PROTOCOL_NAME.to_string());
        target.details.update_from(&record.details);
        summary.matched += 1;
    }

    if summary.unmatched > 0 {
        tracing::debug!(unmatched = summary.unmatched, "enriched frames without generic record");
    }
    summary
}
