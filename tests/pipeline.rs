use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

use iopsdash::aggregate::{aggregate, AggregateOptions};
use iopsdash::config::DashboardConfig;
use iopsdash::dashboard::{Dashboard, DashboardState};
use iopsdash::data::{Document, TimeRange};
use iopsdash::html;
use iopsdash::loader::{load_raw_results, FileSource};

fn write_result(root: &Path, config: &str, commit: &str, date: &str, branch: &str, read_iops: f64) {
    let dir = root.join(config);
    fs::create_dir_all(&dir).unwrap();
    let body = format!(
        r#"{{"date": "{}", "branch": "{}", "read_iops": {}, "write_iops": {}, "read_latency_ns": 250000, "write_latency_ns": 900000}}"#,
        date,
        branch,
        read_iops,
        read_iops / 2.0
    );
    fs::write(dir.join(format!("{}.json", commit)), body).unwrap();
}

fn raw_results() -> TempDir {
    let dir = TempDir::new().unwrap();
    write_result(dir.path(), "nvme", "abc", "2024-02-27T08:00:00Z", "main", 12000.0);
    write_result(dir.path(), "nvme", "def", "2024-02-28T08:00:00Z", "main", 12500.0);
    write_result(dir.path(), "ssd", "ghi", "2024-02-28T09:00:00Z", "dev", 4000.0);
    fs::write(dir.path().join("ssd").join("broken.json"), "{ not json").unwrap();
    fs::write(dir.path().join("README.txt"), "not a config directory").unwrap();
    dir
}

fn options() -> AggregateOptions {
    AggregateOptions {
        range: TimeRange::Days(30),
        now: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
        report_url_template: Some("https://reports.example/{config}/{commit}.html".to_string()),
        filter: None,
    }
}

#[test]
fn test_raw_results_to_rendered_page() {
    let raw = raw_results();
    let entries = load_raw_results(raw.path()).unwrap();
    let commits: Vec<&str> = entries.iter().map(|e| e.commit.as_str()).collect();
    assert_eq!(commits, vec!["abc", "def", "ghi"]);

    let document = aggregate(&entries, &options());
    assert_eq!(document.summary.total_tests, 3);
    assert_eq!(document.summary.configurations, vec!["nvme", "ssd"]);
    assert_eq!(document.summary.branches, vec!["dev", "main"]);

    let site = TempDir::new().unwrap();
    let data_path = site.path().join("data.json");
    fs::write(&data_path, serde_json::to_string_pretty(&document).unwrap()).unwrap();

    let config = DashboardConfig {
        data_location: data_path.display().to_string(),
        output_dir: site.path().join("dist"),
        ..Default::default()
    };
    let mut dashboard = Dashboard::new(config, FileSource);
    dashboard.init().unwrap();
    assert_eq!(dashboard.state(), DashboardState::Ready);
    assert!(dashboard.charts().iter().all(|c| c.handle().is_some()));

    let iops = dashboard.charts()[0].handle().unwrap();
    let visible: Vec<String> = iops.visible_keys().into_iter().collect();
    assert_eq!(visible, vec!["nvme - read".to_string(), "ssd - read".to_string()]);

    let markers = iops.markers("nvme - read");
    assert_eq!(markers.len(), 2);
    assert_eq!(
        markers[0].test_url.as_deref(),
        Some("https://reports.example/nvme/abc.html")
    );

    let output_dir = dashboard.config().output_dir.clone();
    let index = html::write_dashboard(&dashboard.view(), dashboard.document(), &output_dir).unwrap();
    let page = fs::read_to_string(&index).unwrap();
    assert!(page.contains("Storage Performance Dashboard"));
    assert!(page.contains("id=\"chart-latency-by-branch\""));
    assert!(page.contains("https://reports.example/ssd/ghi.html"));
    assert!(!page.contains("No data available"));

    let copied = Document::from_json(&fs::read_to_string(output_dir.join("data.json")).unwrap()).unwrap();
    assert_eq!(copied, document);
}

#[test]
fn test_missing_document_renders_error_page() {
    let site = TempDir::new().unwrap();
    let config = DashboardConfig {
        data_location: site.path().join("missing.json").display().to_string(),
        output_dir: site.path().join("dist"),
        ..Default::default()
    };

    let mut dashboard = Dashboard::new(config, FileSource);
    assert!(dashboard.init().is_err());
    assert_eq!(dashboard.state(), DashboardState::Error);

    let index = html::write_dashboard(&dashboard.view(), dashboard.document(), &site.path().join("dist")).unwrap();
    let page = fs::read_to_string(index).unwrap();
    assert!(page.contains("Failed to Load Data"));
    assert!(page.contains("missing.json"));
    assert!(!site.path().join("dist").join("data.json").exists());
}

#[test]
fn test_long_range_downsamples_to_one_point_per_day() {
    let raw = TempDir::new().unwrap();
    write_result(raw.path(), "nvme", "a1", "2024-02-28T08:00:00Z", "main", 100.0);
    write_result(raw.path(), "nvme", "a2", "2024-02-28T20:00:00Z", "main", 150.0);
    write_result(raw.path(), "nvme", "a3", "2024-02-29T08:00:00Z", "main", 120.0);

    let entries = load_raw_results(raw.path()).unwrap();
    let document = aggregate(&entries, &options());

    let site = TempDir::new().unwrap();
    let data_path = site.path().join("data.json");
    fs::write(&data_path, serde_json::to_string(&document).unwrap()).unwrap();

    let long = DashboardConfig {
        data_location: data_path.display().to_string(),
        ..Default::default()
    };
    let mut dashboard = Dashboard::new(long.clone(), FileSource);
    dashboard.init().unwrap();
    assert_eq!(dashboard.charts()[0].handle().unwrap().markers("nvme - read").len(), 2);

    let short = DashboardConfig {
        time_range: TimeRange::Days(7),
        ..long
    };
    let mut dashboard = Dashboard::new(short, FileSource);
    dashboard.init().unwrap();
    assert_eq!(dashboard.charts()[0].handle().unwrap().markers("nvme - read").len(), 3);
}
