//! Dashboard configuration: data location, page URL, time range and charts

use std::collections::BTreeSet;
use std::path::PathBuf;
use url::Url;

use crate::data::{ChartKey, MetricKind, Operation, TimeRange};
use crate::error::Result;

/// Choices offered by the time-range selector
pub const RANGE_CHOICES: [TimeRange; 6] = [
    TimeRange::Days(1),
    TimeRange::Days(7),
    TimeRange::Days(14),
    TimeRange::Days(30),
    TimeRange::Days(90),
    TimeRange::All,
];

/// One chart on the dashboard
#[derive(Debug, Clone, PartialEq)]
pub struct ChartSpec {
    pub key: ChartKey,
    pub title: String,
    pub y_axis_label: String,
    /// Operations visible before the user touches the legend; all when `None`
    pub default_visible_operations: Option<BTreeSet<Operation>>,
}

impl ChartSpec {
    /// Standard combined read/write chart, showing reads by default
    pub fn standard(key: ChartKey) -> Self {
        let metric = match key.metric {
            MetricKind::Iops => "IOPS",
            MetricKind::Latency => "Latency",
        };

        Self {
            key,
            title: format!("{} by {}", metric, key.dimension.title()),
            y_axis_label: key.metric.axis_label().to_string(),
            default_visible_operations: Some(BTreeSet::from([Operation::Read])),
        }
    }

    /// Element id of the chart container
    pub fn container_id(&self) -> String {
        format!("chart-{}", self.key).replace('_', "-")
    }

    /// Parse a comma-separated list of chart keys
    pub fn parse_list(list: &str) -> Result<Vec<ChartSpec>> {
        list.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<ChartKey>().map(ChartSpec::standard))
            .collect()
    }
}

/// Dashboard configuration
#[derive(Debug, Clone)]
pub struct DashboardConfig {
    /// Title for the dashboard
    pub title: String,
    /// Path or URL of the results document
    pub data_location: String,
    /// Public URL of the page, used for time-range navigation
    pub page_url: Option<Url>,
    /// Selected aggregation window
    pub time_range: TimeRange,
    /// Charts in display order
    pub charts: Vec<ChartSpec>,
    /// Path to output directory
    pub output_dir: PathBuf,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            title: "Storage Performance Dashboard".to_string(),
            data_location: "data.json".to_string(),
            page_url: None,
            time_range: TimeRange::default(),
            charts: ChartKey::all().into_iter().map(ChartSpec::standard).collect(),
            output_dir: PathBuf::from("dist"),
        }
    }
}

impl DashboardConfig {
    /// Take the time range from the page URL's `days` parameter
    pub fn with_page_url(mut self, page_url: Url) -> Self {
        self.time_range = TimeRange::from_url(&page_url);
        self.page_url = Some(page_url);
        self
    }

    /// Union of the charts' default operations
    pub fn default_operations(&self) -> BTreeSet<Operation> {
        let ops: BTreeSet<Operation> = self
            .charts
            .iter()
            .flat_map(|c| match &c.default_visible_operations {
                Some(ops) => ops.iter().copied().collect::<Vec<_>>(),
                None => Operation::ALL.to_vec(),
            })
            .collect();

        if ops.is_empty() {
            Operation::ALL.into_iter().collect()
        } else {
            ops
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Dimension;

    #[test]
    fn test_default_config() {
        let config = DashboardConfig::default();
        assert_eq!(config.charts.len(), 4);
        assert_eq!(config.time_range, TimeRange::Days(30));
        assert_eq!(config.charts[0].title, "IOPS by Configuration");
        assert_eq!(config.charts[0].container_id(), "chart-iops-by-config");
        assert_eq!(
            config.default_operations(),
            BTreeSet::from([Operation::Read])
        );
    }

    #[test]
    fn test_parse_chart_list() {
        let charts = ChartSpec::parse_list("latency_by_branch, iops_by_config").unwrap();
        assert_eq!(charts.len(), 2);
        assert_eq!(
            charts[0].key,
            ChartKey::new(MetricKind::Latency, Dimension::Branch)
        );
        assert_eq!(charts[0].y_axis_label, "Latency (ms)");

        assert!(ChartSpec::parse_list("iops_by_config,bogus").is_err());
    }

    #[test]
    fn test_page_url_sets_range() {
        let url = Url::parse("https://bench.example/perf/?days=all").unwrap();
        let config = DashboardConfig::default().with_page_url(url);
        assert_eq!(config.time_range, TimeRange::All);
    }

    #[test]
    fn test_default_operations_without_preferences() {
        let mut config = DashboardConfig::default();
        for chart in &mut config.charts {
            chart.default_visible_operations = None;
        }
        assert_eq!(config.default_operations().len(), 2);
    }
}
