//! Data loader for the results document and per-commit raw result files

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::data::{ChartKey, Document, FilterInfo, RawRecord, RawResult, RawResultEntry, Summary};
use crate::error::{Error, Result};

/// Something that can fetch the text of a document
pub trait DocumentSource {
    fn fetch(&self, location: &str) -> Result<String>;
}

/// Fetches documents over HTTP(S)
pub struct HttpSource {
    client: reqwest::blocking::Client,
}

impl HttpSource {
    pub fn new() -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static("iopsdash"));

        let client = reqwest::blocking::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self { client })
    }
}

impl DocumentSource for HttpSource {
    fn fetch(&self, location: &str) -> Result<String> {
        let url = url::Url::parse(location)?;
        let response = self.client.get(url).send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatusError {
                location: location.to_string(),
                status,
            });
        }

        Ok(response.text()?)
    }
}

/// Reads documents from the local filesystem
#[derive(Debug, Default, Clone, Copy)]
pub struct FileSource;

impl DocumentSource for FileSource {
    fn fetch(&self, location: &str) -> Result<String> {
        std::fs::read_to_string(location).map_err(|e| Error::FileReadError {
            path: location.to_string(),
            source: e,
        })
    }
}

/// Dispatches to HTTP for `http(s)://` locations and to the filesystem otherwise
pub struct AutoSource {
    http: Option<HttpSource>,
}

impl AutoSource {
    pub fn new() -> Self {
        let http = match HttpSource::new() {
            Ok(http) => Some(http),
            Err(e) => {
                warn!("HTTP client unavailable: {}", e);
                None
            }
        };
        Self { http }
    }
}

impl Default for AutoSource {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentSource for AutoSource {
    fn fetch(&self, location: &str) -> Result<String> {
        if is_remote(location) {
            match &self.http {
                Some(http) => http.fetch(location),
                None => Err(Error::ConfigError(format!(
                    "No HTTP client available to fetch {}",
                    location
                ))),
            }
        } else {
            FileSource.fetch(location)
        }
    }
}

pub fn is_remote(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

/// Loads the results document and caches the last good one
pub struct DataLoader<S> {
    source: S,
    document: Option<Document>,
}

impl<S: DocumentSource> DataLoader<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            document: None,
        }
    }

    /// Fetch and parse a document; on failure the previous cache is kept
    pub fn load(&mut self, location: &str) -> Result<&Document> {
        info!("Loading benchmark data from {}", location);
        let content = self.source.fetch(location)?;
        let document = Document::from_json(&content)?;

        debug!(
            "Loaded {} charts, {} records",
            document.charts.len(),
            document.charts.values().map(Vec::len).sum::<usize>()
        );

        Ok(self.document.insert(document))
    }

    pub fn document(&self) -> Option<&Document> {
        self.document.as_ref()
    }

    pub fn is_loaded(&self) -> bool {
        self.document.is_some()
    }

    pub fn series_for(&self, key: &ChartKey) -> &[RawRecord] {
        self.document
            .as_ref()
            .map(|d| d.records(key))
            .unwrap_or(&[])
    }

    pub fn summary(&self) -> Summary {
        self.document
            .as_ref()
            .map(|d| d.summary.clone())
            .unwrap_or_default()
    }

    pub fn filter(&self) -> FilterInfo {
        self.document
            .as_ref()
            .map(|d| d.filter.clone())
            .unwrap_or_default()
    }

    pub fn generated_time(&self) -> Option<DateTime<Utc>> {
        self.document.as_ref().and_then(Document::generated_time)
    }

    /// Configurations from the summary plus any group seen on a config chart
    pub fn unique_configs(&self) -> Vec<String> {
        self.unique_facet(|d| &d.summary.configurations, "_by_config")
    }

    /// Branches from the summary plus any group seen on a branch chart
    pub fn unique_branches(&self) -> Vec<String> {
        self.unique_facet(|d| &d.summary.branches, "_by_branch")
    }

    fn unique_facet(&self, listed: impl Fn(&Document) -> &Vec<String>, suffix: &str) -> Vec<String> {
        let Some(doc) = self.document.as_ref() else {
            return Vec::new();
        };

        let mut values: BTreeSet<String> = listed(doc).iter().cloned().collect();
        for (key, records) in &doc.charts {
            if key.ends_with(suffix) {
                values.extend(records.iter().map(|r| r.group.clone()));
            }
        }
        values.into_iter().collect()
    }
}

/// Read every `{config}/{commit}.json` under `root`
///
/// Individual files that cannot be read or parsed are skipped with a warning.
pub fn load_raw_results(root: &Path) -> Result<Vec<RawResultEntry>> {
    let read_dir = |path: &Path| {
        std::fs::read_dir(path).map_err(|e| Error::FileReadError {
            path: path.display().to_string(),
            source: e,
        })
    };

    let mut entries = Vec::new();

    for config_dir in read_dir(root)? {
        let config_dir = config_dir?;
        if !config_dir.file_type()?.is_dir() {
            continue;
        }
        let config = config_dir.file_name().to_string_lossy().to_string();

        for file in read_dir(&config_dir.path())? {
            let path = file?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(commit) = path.file_stem().map(|s| s.to_string_lossy().to_string()) else {
                continue;
            };

            let parsed = std::fs::read_to_string(&path)
                .map_err(Error::from)
                .and_then(|content| Ok(serde_json::from_str::<RawResult>(&content)?));

            match parsed {
                Ok(result) => entries.push(RawResultEntry {
                    config: config.clone(),
                    commit,
                    result,
                }),
                Err(e) => warn!("Skipping raw result {}: {}", path.display(), e),
            }
        }
    }

    entries.sort_by(|a, b| (&a.config, &a.commit).cmp(&(&b.config, &b.commit)));
    info!("Loaded {} raw results from {}", entries.len(), root.display());

    Ok(entries)
}
