use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::protocols::bacnet;
use crate::record::PacketRecord;

const SECONDS_PER_DAY: i64 = 86_400;

/// Aggregates over the non-fragmented records of one capture.
///
/// The per-protocol maps each sum to the totals. Time buckets are keyed by
/// bucket start (Unix seconds) and aligned to multiples of the bucket width
/// counted from midnight UTC.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregateStatistics {
    pub total_packets: u64,
    pub total_bytes: u64,
    /// Fragment-flagged records left out of every aggregate.
    pub fragments_excluded: u64,
    pub first_timestamp: Option<f64>,
    pub last_timestamp: Option<f64>,
    pub protocol_counts: BTreeMap<String, u64>,
    pub protocol_bytes: BTreeMap<String, u64>,
    pub hierarchy_counts: BTreeMap<String, u64>,
    pub hierarchy_bytes: BTreeMap<String, u64>,
    pub source_counts: BTreeMap<String, u64>,
    pub destination_counts: BTreeMap<String, u64>,
    pub source_port_counts: BTreeMap<u16, u64>,
    pub destination_port_counts: BTreeMap<u16, u64>,
    /// BACnet frames per service name (APDU type when no service is known).
    pub service_counts: BTreeMap<String, u64>,
    pub bucket_seconds: u32,
    pub frames_per_bucket: BTreeMap<i64, u64>,
    pub bytes_per_bucket: BTreeMap<i64, u64>,
}

impl AggregateStatistics {
    pub fn from_records<'a>(
        records: impl IntoIterator<Item = &'a PacketRecord>,
        bucket_seconds: u32,
    ) -> Self {
        let mut aggregator = StatisticsAggregator::new(bucket_seconds);
        for record in records {
            aggregator.observe(record);
        }
        aggregator.finish()
    }

    /// Capture span in seconds; zero with fewer than two timestamps.
    pub fn duration(&self) -> f64 {
        match (self.first_timestamp, self.last_timestamp) {
            (Some(first), Some(last)) if last > first => last - first,
            _ => 0.0,
        }
    }

    pub fn top_sources(&self, n: usize) -> Vec<(String, u64)> {
        top_n(&self.source_counts, n)
    }

    pub fn top_destinations(&self, n: usize) -> Vec<(String, u64)> {
        top_n(&self.destination_counts, n)
    }

    /// Average frame rate per bucket.
    pub fn frames_per_second(&self) -> BTreeMap<i64, f64> {
        self.per_second(&self.frames_per_bucket)
    }

    /// Average byte rate per bucket.
    pub fn bytes_per_second(&self) -> BTreeMap<i64, f64> {
        self.per_second(&self.bytes_per_bucket)
    }

    fn per_second(&self, buckets: &BTreeMap<i64, u64>) -> BTreeMap<i64, f64> {
        let width = f64::from(self.bucket_seconds.max(1));
        buckets
            .iter()
            .map(|(start, value)| (*start, *value as f64 / width))
            .collect()
    }
}

fn top_n(counts: &BTreeMap<String, u64>, n: usize) -> Vec<(String, u64)> {
    let mut entries: Vec<(String, u64)> = counts.iter().map(|(k, v)| (k.clone(), *v)).collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    entries.truncate(n);
    entries
}

/// Start of the bucket containing `timestamp`.
pub fn bucket_start(timestamp: f64, bucket_seconds: u32) -> i64 {
    let width = i64::from(bucket_seconds.max(1));
    let seconds = timestamp.floor() as i64;
    let day_start = seconds.div_euclid(SECONDS_PER_DAY) * SECONDS_PER_DAY;
    let second_of_day = seconds - day_start;
    day_start + (second_of_day / width) * width
}

/// Single-pass builder for [`AggregateStatistics`].
#[derive(Debug)]
pub struct StatisticsAggregator {
    stats: AggregateStatistics,
}

impl StatisticsAggregator {
    pub fn new(bucket_seconds: u32) -> Self {
        Self {
            stats: AggregateStatistics {
                bucket_seconds: bucket_seconds.max(1),
                ..AggregateStatistics::default()
            },
        }
    }

    pub fn observe(&mut self, record: &PacketRecord) {
        let stats = &mut self.stats;
        if record.fragment {
            stats.fragments_excluded += 1;
            return;
        }
        let bytes = u64::from(record.length);
        stats.total_packets += 1;
        stats.total_bytes += bytes;

        let ts = record.timestamp;
        stats.first_timestamp = Some(stats.first_timestamp.map_or(ts, |first| first.min(ts)));
        stats.last_timestamp = Some(stats.last_timestamp.map_or(ts, |last| last.max(ts)));

        *stats.protocol_counts.entry(record.transport.clone()).or_default() += 1;
        *stats.protocol_bytes.entry(record.transport.clone()).or_default() += bytes;
        let key = record.hierarchy_key();
        *stats.hierarchy_counts.entry(key.clone()).or_default() += 1;
        *stats.hierarchy_bytes.entry(key).or_default() += bytes;

        if let Some(src) = &record.src_addr {
            *stats.source_counts.entry(src.clone()).or_default() += 1;
        }
        if let Some(dst) = &record.dst_addr {
            *stats.destination_counts.entry(dst.clone()).or_default() += 1;
        }
        if record.is_protocol_of_interest() {
            if let Some(service) = bacnet::service_label(&record.details) {
                *stats.service_counts.entry(service).or_default() += 1;
            }
        }
        if let Some(port) = record.src_port {
            *stats.source_port_counts.entry(port).or_default() += 1;
        }
        if let Some(port) = record.dst_port {
            *stats.destination_port_counts.entry(port).or_default() += 1;
        }

        let bucket = bucket_start(ts, stats.bucket_seconds);
        *stats.frames_per_bucket.entry(bucket).or_default() += 1;
        *stats.bytes_per_bucket.entry(bucket).or_default() += bytes;
    }

    pub fn finish(self) -> AggregateStatistics {
        self.stats
    }
}
