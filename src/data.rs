//! Data structures for the precomputed results document and raw result files

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::error::{Error, Result};

/// Timestamp sentinel emitted by the aggregator when a run date is missing
pub const UNKNOWN_DATE: &str = "Unknown date";

/// Default aggregation window in days when none is requested
pub const DEFAULT_DAYS: u32 = 30;

/// Ranges of this many days or more are downsampled to one point per day
pub const DOWNSAMPLE_THRESHOLD_DAYS: u32 = 15;

/// Measured direction of an IO benchmark
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Read,
    Write,
}

impl Operation {
    pub const ALL: [Operation; 2] = [Operation::Read, Operation::Write];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Read => "read",
            Operation::Write => "write",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "read" => Ok(Operation::Read),
            "write" => Ok(Operation::Write),
            other => Err(Error::ConfigError(format!("Unknown operation: {}", other))),
        }
    }
}

/// Metric family plotted on a chart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Iops,
    Latency,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Iops => "iops",
            MetricKind::Latency => "latency",
        }
    }

    /// Default y-axis label for charts of this metric
    pub fn axis_label(&self) -> &'static str {
        match self {
            MetricKind::Iops => "IOPS",
            MetricKind::Latency => "Latency (ms)",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "iops" => Ok(MetricKind::Iops),
            "latency" => Ok(MetricKind::Latency),
            other => Err(Error::ConfigError(format!("Unknown metric kind: {}", other))),
        }
    }
}

/// A record's metric tag split into family and direction
///
/// Exact tags (`iops_read`, `latency_write`, ...) are matched first; anything
/// else falls back to substring matching so tags like `Read IOPS` still land
/// in the right partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricTag {
    pub kind: Option<MetricKind>,
    pub operation: Option<Operation>,
}

impl MetricTag {
    pub fn parse(tag: &str) -> Self {
        match tag {
            "iops_read" => return Self::exact(MetricKind::Iops, Operation::Read),
            "iops_write" => return Self::exact(MetricKind::Iops, Operation::Write),
            "latency_read" => return Self::exact(MetricKind::Latency, Operation::Read),
            "latency_write" => return Self::exact(MetricKind::Latency, Operation::Write),
            _ => {}
        }

        let lower = tag.to_ascii_lowercase();
        let kind = if lower.contains("iops") {
            Some(MetricKind::Iops)
        } else if lower.contains("latency") {
            Some(MetricKind::Latency)
        } else {
            None
        };
        let operation = if lower.contains("read") {
            Some(Operation::Read)
        } else if lower.contains("write") {
            Some(Operation::Write)
        } else {
            None
        };

        Self { kind, operation }
    }

    fn exact(kind: MetricKind, operation: Operation) -> Self {
        Self {
            kind: Some(kind),
            operation: Some(operation),
        }
    }

    pub fn tag(kind: MetricKind, operation: Operation) -> String {
        format!("{}_{}", kind, operation)
    }
}

/// Dimension a chart groups its series by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    Config,
    Branch,
}

impl Dimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Config => "config",
            Dimension::Branch => "branch",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Dimension::Config => "Configuration",
            Dimension::Branch => "Branch",
        }
    }
}

/// Key of a chart in the document, `<metric>_by_<config|branch>`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChartKey {
    pub metric: MetricKind,
    pub dimension: Dimension,
}

impl ChartKey {
    pub fn new(metric: MetricKind, dimension: Dimension) -> Self {
        Self { metric, dimension }
    }

    /// The four charts the aggregator produces
    pub fn all() -> [ChartKey; 4] {
        [
            ChartKey::new(MetricKind::Iops, Dimension::Config),
            ChartKey::new(MetricKind::Latency, Dimension::Config),
            ChartKey::new(MetricKind::Iops, Dimension::Branch),
            ChartKey::new(MetricKind::Latency, Dimension::Branch),
        ]
    }
}

impl fmt::Display for ChartKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_by_{}", self.metric, self.dimension.as_str())
    }
}

fn chart_key_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(iops|latency)_by_(config|branch)$").expect("chart key pattern is valid")
    })
}

impl FromStr for ChartKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let caps = chart_key_regex()
            .captures(s.trim())
            .ok_or_else(|| Error::ConfigError(format!("Invalid chart key: {}", s)))?;

        let metric = caps[1].parse()?;
        let dimension = match &caps[2] {
            "config" => Dimension::Config,
            _ => Dimension::Branch,
        };

        Ok(Self { metric, dimension })
    }
}

/// Aggregation window selected through the `days` URL parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeRange {
    Days(u32),
    All,
}

impl Default for TimeRange {
    fn default() -> Self {
        TimeRange::Days(DEFAULT_DAYS)
    }
}

impl TimeRange {
    /// Window length in days, `None` for the unbounded range
    pub fn days(&self) -> Option<u32> {
        match self {
            TimeRange::Days(d) => Some(*d),
            TimeRange::All => None,
        }
    }

    /// Wide windows get one point per group per day
    pub fn wants_downsampling(&self) -> bool {
        match self {
            TimeRange::Days(d) => *d >= DOWNSAMPLE_THRESHOLD_DAYS,
            TimeRange::All => true,
        }
    }

    /// Short windows use time-of-day ticks and always show markers
    pub fn is_short(&self) -> bool {
        !self.wants_downsampling()
    }

    /// Value to put in the `days` query parameter
    pub fn query_value(&self) -> String {
        match self {
            TimeRange::Days(d) => d.to_string(),
            TimeRange::All => "all".to_string(),
        }
    }

    /// Read the `days` parameter from a page URL, defaulting when absent or invalid
    pub fn from_url(page: &url::Url) -> Self {
        match page.query_pairs().find(|(k, _)| k == "days") {
            Some((_, value)) => value.parse::<TimeRange>().unwrap_or_else(|e| {
                tracing::warn!("Ignoring days parameter: {}", e);
                TimeRange::default()
            }),
            None => TimeRange::default(),
        }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeRange::Days(d) => write!(f, "last {} days", d),
            TimeRange::All => f.write_str("all time"),
        }
    }
}

impl FromStr for TimeRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            return Ok(TimeRange::All);
        }
        match s.parse::<u32>() {
            Ok(0) | Err(_) => Err(Error::ConfigError(format!("Invalid days value: {}", s))),
            Ok(d) => Ok(TimeRange::Days(d)),
        }
    }
}

/// One benchmark measurement as it appears in a chart array
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawRecord {
    /// ISO-8601 timestamp or the `Unknown date` sentinel; empty when absent
    #[serde(default, deserialize_with = "lenient_string")]
    pub timestamp: String,
    /// Measured value; `null` or any non-number deserializes to `None`
    #[serde(default, deserialize_with = "lenient_number")]
    pub value: Option<f64>,
    /// Configuration or branch name
    #[serde(default, deserialize_with = "lenient_string")]
    pub group: String,
    /// Metric tag, e.g. `iops_read`
    #[serde(default, deserialize_with = "lenient_string")]
    pub metric: String,
    /// Link to the full test report
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_url: Option<String>,
}

// A malformed record must not fail the whole document; the series builder
// drops it later.
fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(value.as_str().map(str::to_string).unwrap_or_default())
}

fn lenient_number<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(value.as_f64())
}

/// Document-level summary facets
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Summary {
    #[serde(default)]
    pub total_tests: u64,
    #[serde(default)]
    pub configurations: Vec<String>,
    #[serde(default)]
    pub branches: Vec<String>,
}

/// Time filter the aggregator applied
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct FilterInfo {
    #[serde(default)]
    pub applied: bool,
    #[serde(default)]
    pub days: Option<u32>,
}

/// The precomputed results document the dashboard loads
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Document {
    #[serde(default)]
    pub generated_at: Option<String>,
    #[serde(default)]
    pub summary: Summary,
    #[serde(default)]
    pub filter: FilterInfo,
    /// Chart arrays keyed by `<metric>_by_<config|branch>`
    #[serde(default)]
    pub charts: BTreeMap<String, Vec<RawRecord>>,
}

impl Document {
    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn records(&self, key: &ChartKey) -> &[RawRecord] {
        self.charts
            .get(&key.to_string())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Parsed generation time, if present and well formed
    pub fn generated_time(&self) -> Option<DateTime<Utc>> {
        self.generated_at
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// Per-commit raw result file, stored at `{config}/{commit}.json`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawResult {
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub branch: String,
    #[serde(default)]
    pub read_iops: Option<f64>,
    #[serde(default)]
    pub write_iops: Option<f64>,
    #[serde(default)]
    pub read_latency_ns: Option<f64>,
    #[serde(default)]
    pub write_latency_ns: Option<f64>,
}

impl RawResult {
    /// Value for a metric in dashboard units (latency in milliseconds)
    pub fn value(&self, kind: MetricKind, operation: Operation) -> Option<f64> {
        match (kind, operation) {
            (MetricKind::Iops, Operation::Read) => self.read_iops,
            (MetricKind::Iops, Operation::Write) => self.write_iops,
            (MetricKind::Latency, Operation::Read) => self.read_latency_ns.map(ns_to_ms),
            (MetricKind::Latency, Operation::Write) => self.write_latency_ns.map(ns_to_ms),
        }
    }
}

fn ns_to_ms(ns: f64) -> f64 {
    ns / 1_000_000.0
}

/// A raw result together with the path components that identify it
#[derive(Debug, Clone, PartialEq)]
pub struct RawResultEntry {
    pub config: String,
    pub commit: String,
    pub result: RawResult,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_tag_exact_and_substring() {
        let exact = MetricTag::parse("latency_write");
        assert_eq!(exact.kind, Some(MetricKind::Latency));
        assert_eq!(exact.operation, Some(Operation::Write));

        let loose = MetricTag::parse("Read IOPS");
        assert_eq!(loose.kind, Some(MetricKind::Iops));
        assert_eq!(loose.operation, Some(Operation::Read));

        let unknown = MetricTag::parse("throughput");
        assert_eq!(unknown.kind, None);
        assert_eq!(unknown.operation, None);
    }

    #[test]
    fn test_chart_key_round_trip() {
        let key: ChartKey = "latency_by_branch".parse().unwrap();
        assert_eq!(key.metric, MetricKind::Latency);
        assert_eq!(key.dimension, Dimension::Branch);
        assert_eq!(key.to_string(), "latency_by_branch");

        assert!("iops_by_commit".parse::<ChartKey>().is_err());
    }

    #[test]
    fn test_time_range_parsing() {
        assert_eq!("7".parse::<TimeRange>().unwrap(), TimeRange::Days(7));
        assert_eq!("ALL".parse::<TimeRange>().unwrap(), TimeRange::All);
        assert!("0".parse::<TimeRange>().is_err());
        assert!("soon".parse::<TimeRange>().is_err());

        assert!(TimeRange::Days(15).wants_downsampling());
        assert!(!TimeRange::Days(14).wants_downsampling());
        assert!(TimeRange::All.wants_downsampling());
    }

    #[test]
    fn test_time_range_from_url() {
        let page = url::Url::parse("https://bench.example/index.html?days=7").unwrap();
        assert_eq!(TimeRange::from_url(&page), TimeRange::Days(7));

        let page = url::Url::parse("https://bench.example/index.html").unwrap();
        assert_eq!(TimeRange::from_url(&page), TimeRange::Days(DEFAULT_DAYS));

        let page = url::Url::parse("https://bench.example/?days=bogus").unwrap();
        assert_eq!(TimeRange::from_url(&page), TimeRange::default());
    }

    #[test]
    fn test_document_defaults_and_null_values() {
        let json = r#"{
            "charts": {
                "iops_by_config": [
                    {"timestamp": "2024-01-01T00:00:00Z", "value": null, "group": "A", "metric": "iops_read"}
                ]
            }
        }"#;

        let doc = Document::from_json(json).unwrap();
        assert_eq!(doc.summary, Summary::default());
        assert!(!doc.filter.applied);

        let records = doc.records(&ChartKey::new(MetricKind::Iops, Dimension::Config));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].value, None);
        assert!(doc
            .records(&ChartKey::new(MetricKind::Latency, Dimension::Branch))
            .is_empty());
    }

    #[test]
    fn test_malformed_records_do_not_fail_the_document() {
        let json = r#"{
            "charts": {
                "iops_by_config": [
                    {"timestamp": null, "value": 10, "group": "A", "metric": "iops_read"},
                    {"timestamp": "2024-01-01T00:00:00Z", "value": "n/a", "group": "A", "metric": "iops_read"},
                    {"value": 5, "group": 7},
                    {"timestamp": "2024-01-02T00:00:00Z", "value": 20, "group": "A", "metric": "iops_read"}
                ]
            }
        }"#;

        let doc = Document::from_json(json).unwrap();
        let records = doc.records(&ChartKey::new(MetricKind::Iops, Dimension::Config));
        assert_eq!(records.len(), 4);
        assert_eq!(records[0].timestamp, "");
        assert_eq!(records[1].value, None);
        assert_eq!(records[2].group, "");
        assert_eq!(records[2].metric, "");
        assert_eq!(records[3].value, Some(20.0));
    }

    #[test]
    fn test_raw_result_latency_in_ms() {
        let raw = RawResult {
            date: None,
            branch: "main".to_string(),
            read_iops: Some(1000.0),
            write_iops: None,
            read_latency_ns: Some(250_000.0),
            write_latency_ns: Some(2_000_000.0),
        };

        assert_eq!(raw.value(MetricKind::Iops, Operation::Read), Some(1000.0));
        assert_eq!(raw.value(MetricKind::Iops, Operation::Write), None);
        assert_eq!(raw.value(MetricKind::Latency, Operation::Read), Some(0.25));
        assert_eq!(raw.value(MetricKind::Latency, Operation::Write), Some(2.0));
    }
}
