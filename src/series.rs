//! Series builder: turns raw chart records into plotting-ready series
//!
//! Records are partitioned by operation, parsed, stripped of invalid points
//! and, for wide time windows, reduced to the latest point per group per
//! calendar day. Each series is sorted by timestamp.

use chrono::{DateTime, FixedOffset, NaiveDate};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, trace};

use crate::data::{MetricKind, MetricTag, Operation, RawRecord, TimeRange};
use crate::error::{Error, Result};
use crate::format::parse_timestamp;

/// Composite key identifying one line on a chart
pub fn composite_key(group: &str, operation: Operation) -> String {
    format!("{} - {}", group, operation)
}

/// One plottable measurement
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesPoint {
    pub timestamp: DateTime<FixedOffset>,
    pub value: f64,
    pub group: String,
    pub operation: Operation,
    pub test_url: Option<String>,
}

impl SeriesPoint {
    pub fn key(&self) -> String {
        composite_key(&self.group, self.operation)
    }

    /// Calendar day in the timestamp's own offset
    pub fn day(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }
}

/// Points for one (group, operation) pair, ascending by timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub key: String,
    pub group: String,
    pub operation: Operation,
    pub points: Vec<SeriesPoint>,
}

impl Series {
    pub fn latest(&self) -> Option<&SeriesPoint> {
        self.points.last()
    }
}

/// Output of the builder: series by composite key plus facets
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeriesSet {
    pub series: BTreeMap<String, Series>,
    /// Distinct base groups, without operation suffix
    pub groups: BTreeSet<String>,
    /// Distinct composite keys
    pub keys: BTreeSet<String>,
}

impl SeriesSet {
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn point_count(&self) -> usize {
        self.series.values().map(|s| s.points.len()).sum()
    }

    pub fn points(&self) -> impl Iterator<Item = &SeriesPoint> {
        self.series.values().flat_map(|s| s.points.iter())
    }

    /// Minimum and maximum value over all points
    pub fn value_range(&self) -> Option<(f64, f64)> {
        self.points().fold(None, |acc, p| match acc {
            None => Some((p.value, p.value)),
            Some((lo, hi)) => Some((lo.min(p.value), hi.max(p.value))),
        })
    }

    /// Earliest and latest timestamp over all points
    pub fn time_range(&self) -> Option<(DateTime<FixedOffset>, DateTime<FixedOffset>)> {
        self.points().fold(None, |acc, p| match acc {
            None => Some((p.timestamp, p.timestamp)),
            Some((lo, hi)) => Some((lo.min(p.timestamp), hi.max(p.timestamp))),
        })
    }

    /// Operations present in the set
    pub fn operations(&self) -> BTreeSet<Operation> {
        self.series.values().map(|s| s.operation).collect()
    }
}

/// Build series for one metric family from a chart's raw records
pub fn build_series(records: &[RawRecord], range: TimeRange, kind: MetricKind) -> SeriesSet {
    let mut points = Vec::with_capacity(records.len());
    let mut dropped = 0usize;

    for record in records {
        let tag = MetricTag::parse(&record.metric);

        if matches!(tag.kind, Some(k) if k != kind) {
            continue;
        }

        let Some(operation) = tag.operation else {
            trace!("Skipping record with unpartitionable metric {:?}", record.metric);
            dropped += 1;
            continue;
        };

        match to_point(record, operation) {
            Ok(point) => points.push(point),
            Err(e) => {
                trace!("Dropping {}", e);
                dropped += 1;
            }
        }
    }

    if dropped > 0 {
        debug!("Dropped {} malformed {} records", dropped, kind);
    }

    if range.wants_downsampling() {
        let before = points.len();
        points = downsample_daily(points);
        debug!("Downsampled {} points to {} ({})", before, points.len(), range);
    }

    let mut set = SeriesSet::default();
    for point in points {
        let key = point.key();
        set.groups.insert(point.group.clone());
        set.keys.insert(key.clone());
        set.series
            .entry(key.clone())
            .or_insert_with(|| Series {
                key,
                group: point.group.clone(),
                operation: point.operation,
                points: Vec::new(),
            })
            .points
            .push(point);
    }

    for series in set.series.values_mut() {
        series.points.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    }

    set
}

fn to_point(record: &RawRecord, operation: Operation) -> Result<SeriesPoint> {
    if record.group.is_empty() {
        return Err(Error::MalformedRecord(format!("{} point without a group", operation)));
    }

    let timestamp = parse_timestamp(&record.timestamp).ok_or_else(|| {
        Error::MalformedRecord(format!(
            "{} point for {}: bad timestamp {:?}",
            operation, record.group, record.timestamp
        ))
    })?;

    let value = record.value.filter(|v| v.is_finite()).ok_or_else(|| {
        Error::MalformedRecord(format!(
            "{} point for {}: missing or non-finite value",
            operation, record.group
        ))
    })?;

    Ok(SeriesPoint {
        timestamp,
        value,
        group: record.group.clone(),
        operation,
        test_url: record.test_url.clone(),
    })
}

/// Keep only the latest point per composite key per calendar day
///
/// When two points of the same day share a timestamp, the one later in the
/// input wins. The output is ordered by key, then timestamp.
pub fn downsample_daily(points: Vec<SeriesPoint>) -> Vec<SeriesPoint> {
    let mut latest: BTreeMap<(String, NaiveDate), SeriesPoint> = BTreeMap::new();

    for point in points {
        let slot = (point.key(), point.day());
        match latest.get(&slot) {
            Some(kept) if kept.timestamp > point.timestamp => {}
            _ => {
                latest.insert(slot, point);
            }
        }
    }

    let mut out: Vec<SeriesPoint> = latest.into_values().collect();
    out.sort_by(|a, b| {
        (a.group.as_str(), a.operation)
            .cmp(&(b.group.as_str(), b.operation))
            .then(a.timestamp.cmp(&b.timestamp))
    });
    out
}
