//! Builds the results document from per-commit raw result files

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeSet;
use tracing::debug;

use crate::data::{
    ChartKey, Dimension, Document, FilterInfo, MetricTag, Operation, RawRecord, RawResultEntry,
    Summary, TimeRange, UNKNOWN_DATE,
};
use crate::format::parse_timestamp;
use crate::visibility::FilterSelection;

/// Options for [`aggregate`]
#[derive(Debug, Clone)]
pub struct AggregateOptions {
    pub range: TimeRange,
    /// Reference time for the window and `generated_at`
    pub now: DateTime<Utc>,
    /// Report link with `{config}` and `{commit}` placeholders
    pub report_url_template: Option<String>,
    /// Restricts which config/branch/metric combinations are emitted
    pub filter: Option<FilterSelection>,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            range: TimeRange::default(),
            now: Utc::now(),
            report_url_template: None,
            filter: None,
        }
    }
}

pub fn report_url(template: &str, config: &str, commit: &str) -> String {
    template
        .replace("{config}", config)
        .replace("{commit}", commit)
}

/// Aggregate raw results into the four standard charts
///
/// Results with a known date older than the window are left out. Results
/// without a usable date are kept with the `Unknown date` sentinel.
pub fn aggregate(entries: &[RawResultEntry], options: &AggregateOptions) -> Document {
    let cutoff = options
        .range
        .days()
        .map(|d| options.now - Duration::days(i64::from(d)));

    let mut doc = Document {
        generated_at: Some(options.now.to_rfc3339()),
        filter: FilterInfo {
            applied: cutoff.is_some(),
            days: options.range.days(),
        },
        ..Default::default()
    };

    let mut configs = BTreeSet::new();
    let mut branches = BTreeSet::new();
    let mut total = 0u64;

    for entry in entries {
        let parsed = entry.result.date.as_deref().and_then(parse_timestamp);

        if let (Some(cutoff), Some(ts)) = (cutoff, parsed) {
            if ts < cutoff {
                debug!("Skipping {}/{}: outside window", entry.config, entry.commit);
                continue;
            }
        }

        if let Some(filter) = &options.filter {
            if !filter.matches_entry(entry) {
                continue;
            }
        }

        let timestamp = parsed
            .map(|ts| ts.to_rfc3339())
            .unwrap_or_else(|| UNKNOWN_DATE.to_string());
        let test_url = options
            .report_url_template
            .as_deref()
            .map(|t| report_url(t, &entry.config, &entry.commit));

        total += 1;
        configs.insert(entry.config.clone());
        branches.insert(entry.result.branch.clone());

        for key in ChartKey::all() {
            let group = match key.dimension {
                Dimension::Config => &entry.config,
                Dimension::Branch => &entry.result.branch,
            };

            for operation in Operation::ALL {
                let metric = MetricTag::tag(key.metric, operation);
                if let Some(filter) = &options.filter {
                    if !filter.matches(&entry.config, &entry.result.branch, &metric) {
                        continue;
                    }
                }

                let Some(value) = entry.result.value(key.metric, operation) else {
                    continue;
                };

                doc.charts.entry(key.to_string()).or_default().push(RawRecord {
                    timestamp: timestamp.clone(),
                    value: Some(value),
                    group: group.clone(),
                    metric,
                    test_url: test_url.clone(),
                });
            }
        }
    }

    doc.summary = Summary {
        total_tests: total,
        configurations: configs.into_iter().collect(),
        branches: branches.into_iter().collect(),
    };

    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{MetricKind, RawResult};
    use chrono::TimeZone;

    fn entry(config: &str, commit: &str, date: Option<&str>, branch: &str) -> RawResultEntry {
        RawResultEntry {
            config: config.to_string(),
            commit: commit.to_string(),
            result: RawResult {
                date: date.map(str::to_string),
                branch: branch.to_string(),
                read_iops: Some(1000.0),
                write_iops: Some(500.0),
                read_latency_ns: Some(200_000.0),
                write_latency_ns: None,
            },
        }
    }

    fn options(range: TimeRange) -> AggregateOptions {
        AggregateOptions {
            range,
            now: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
            report_url_template: Some("https://reports.example/{config}/{commit}.html".to_string()),
            filter: None,
        }
    }

    #[test]
    fn test_aggregate_builds_all_charts() {
        let entries = vec![
            entry("nvme", "abc123", Some("2024-02-28T12:00:00Z"), "main"),
            entry("ssd", "def456", Some("2024-02-29T12:00:00Z"), "dev"),
        ];

        let doc = aggregate(&entries, &options(TimeRange::Days(30)));

        assert_eq!(doc.summary.total_tests, 2);
        assert_eq!(doc.summary.configurations, vec!["nvme", "ssd"]);
        assert_eq!(doc.summary.branches, vec!["dev", "main"]);
        assert!(doc.filter.applied);
        assert_eq!(doc.filter.days, Some(30));

        let iops = doc.records(&ChartKey::new(MetricKind::Iops, Dimension::Config));
        assert_eq!(iops.len(), 4);
        assert_eq!(
            iops[0].test_url.as_deref(),
            Some("https://reports.example/nvme/abc123.html")
        );

        let latency = doc.records(&ChartKey::new(MetricKind::Latency, Dimension::Branch));
        // write latency missing on both entries
        assert_eq!(latency.len(), 2);
        assert!(latency.iter().all(|r| r.metric == "latency_read"));
        assert_eq!(latency[0].value, Some(0.2));
    }

    #[test]
    fn test_window_drops_old_results_but_keeps_unknown_dates() {
        let entries = vec![
            entry("nvme", "old", Some("2023-01-01T00:00:00Z"), "main"),
            entry("nvme", "new", Some("2024-02-28T00:00:00Z"), "main"),
            entry("nvme", "undated", None, "main"),
        ];

        let doc = aggregate(&entries, &options(TimeRange::Days(7)));
        assert_eq!(doc.summary.total_tests, 2);

        let all = aggregate(&entries, &options(TimeRange::All));
        assert_eq!(all.summary.total_tests, 3);
        assert!(!all.filter.applied);

        let iops = doc.records(&ChartKey::new(MetricKind::Iops, Dimension::Branch));
        assert!(iops.iter().any(|r| r.timestamp == UNKNOWN_DATE));
    }

    #[test]
    fn test_filter_selection_restricts_output() {
        let entries = vec![
            entry("nvme", "a", Some("2024-02-28T00:00:00Z"), "main"),
            entry("ssd", "b", Some("2024-02-28T00:00:00Z"), "main"),
        ];

        let mut filter = FilterSelection::all_of(&entries);
        filter.configs.remove("ssd");
        filter.metrics = BTreeSet::from(["iops_write".to_string()]);

        let mut opts = options(TimeRange::Days(30));
        opts.filter = Some(filter);
        let doc = aggregate(&entries, &opts);

        assert_eq!(doc.summary.configurations, vec!["nvme"]);
        let iops = doc.records(&ChartKey::new(MetricKind::Iops, Dimension::Config));
        assert_eq!(iops.len(), 1);
        assert_eq!(iops[0].metric, "iops_write");
        assert!(doc
            .records(&ChartKey::new(MetricKind::Latency, Dimension::Config))
            .is_empty());
    }
}
