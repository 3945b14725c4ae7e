//! Dashboard controller
//!
//! Drives load -> build -> render for every configured chart and owns the
//! visibility state shared by all chart handles.
//!
//! ```text
//! Loading --ok--> Ready --refresh--> Refreshing --ok--> Ready
//!    |                                   |
//!    +--err--> Error (page)              +--err--> Error (toast, charts kept)
//! ```

use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::chart::{self, ChartHandle, ChartOptions, ColorScheme, Palette};
use crate::config::{ChartSpec, DashboardConfig, RANGE_CHOICES};
use crate::data::{Document, Operation, TimeRange};
use crate::error::{Error, Result};
use crate::format::format_generated_time;
use crate::loader::{DataLoader, DocumentSource};
use crate::series::build_series;
use crate::visibility::{VisibilityKey, VisibilitySet};

/// Controller lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DashboardState {
    Loading,
    Ready,
    Refreshing,
    Error,
}

/// How a load failure is shown
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorView {
    /// Terminal full-page error after a failed initial load
    Page(String),
    /// Transient notification after a failed refresh; charts are stale
    Toast(String),
}

/// Issued per load; only the most recent one may complete
///
/// Loads take `&mut self`, so the borrow checker already serializes them.
/// The busy flag and token check are a safeguard should completion ever be
/// split from issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RequestToken(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoadKind {
    Initial,
    Refresh,
}

/// A chart slot: either a rendered chart or a placeholder
#[derive(Debug, Clone)]
pub enum ChartSlot {
    Rendered(ChartHandle),
    NoData,
}

#[derive(Debug, Clone)]
pub struct ChartView {
    pub spec: ChartSpec,
    pub slot: ChartSlot,
}

impl ChartView {
    pub fn handle(&self) -> Option<&ChartHandle> {
        match &self.slot {
            ChartSlot::Rendered(handle) => Some(handle),
            ChartSlot::NoData => None,
        }
    }
}

/// Legend button state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegendEntry {
    pub label: String,
    /// `group` or `operation`
    pub kind: &'static str,
    pub color: Option<String>,
    pub active: bool,
}

/// Asks the user to confirm a disruptive action
pub trait Confirm {
    fn confirm(&self, message: &str) -> bool;
}

impl<F: Fn(&str) -> bool> Confirm for F {
    fn confirm(&self, message: &str) -> bool {
        self(message)
    }
}

/// Full page navigation requested by a time-range change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigation {
    pub href: String,
}

/// Page link for a range: the page URL with `days` replaced, or a bare query
pub fn range_href(page_url: Option<&Url>, range: TimeRange) -> String {
    let Some(page) = page_url else {
        return format!("?days={}", range.query_value());
    };

    let kept: Vec<(String, String)> = page
        .query_pairs()
        .filter(|(k, _)| k != "days")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut url = page.clone();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair("days", &range.query_value());
    url.to_string()
}

pub struct Dashboard<S> {
    config: DashboardConfig,
    loader: DataLoader<S>,
    colors: Box<dyn ColorScheme>,
    state: DashboardState,
    error: Option<ErrorView>,
    charts: Vec<ChartView>,
    visibility: VisibilitySet,
    /// Every group seen so far; later sightings keep their toggle state
    known_groups: BTreeSet<String>,
    /// Groups present in the current load
    groups: BTreeSet<String>,
    legend: Vec<LegendEntry>,
    selected_range: TimeRange,
    next_token: u64,
    in_flight: Option<RequestToken>,
}

impl<S: DocumentSource> Dashboard<S> {
    pub fn new(config: DashboardConfig, source: S) -> Self {
        Self::with_colors(config, source, Box::new(Palette::default()))
    }

    pub fn with_colors(config: DashboardConfig, source: S, colors: Box<dyn ColorScheme>) -> Self {
        let selected_range = config.time_range;
        let visibility =
            VisibilitySet::new(std::iter::empty::<String>(), config.default_operations());
        Self {
            config,
            loader: DataLoader::new(source),
            colors,
            state: DashboardState::Loading,
            error: None,
            charts: Vec::new(),
            visibility,
            known_groups: BTreeSet::new(),
            groups: BTreeSet::new(),
            legend: Vec::new(),
            selected_range,
            next_token: 0,
            in_flight: None,
        }
    }

    /// Initial load; a failure leaves the dashboard in a terminal error view
    pub fn init(&mut self) -> Result<()> {
        let token = self.begin_load(LoadKind::Initial)?;
        let outcome = self.fetch();
        self.complete_load(token, LoadKind::Initial, outcome)
    }

    /// Reload and rebuild every chart; a failure keeps the stale charts
    pub fn refresh(&mut self) -> Result<()> {
        let token = self.begin_load(LoadKind::Refresh)?;
        let outcome = self.fetch();
        self.complete_load(token, LoadKind::Refresh, outcome)
    }

    fn fetch(&mut self) -> Result<()> {
        let location = self.config.data_location.clone();
        self.loader.load(&location).map(|_| ())
    }

    fn begin_load(&mut self, kind: LoadKind) -> Result<RequestToken> {
        if self.in_flight.is_some() {
            warn!("Ignoring {:?} load: another load is in progress", kind);
            return Err(Error::Busy);
        }

        self.next_token += 1;
        let token = RequestToken(self.next_token);
        self.in_flight = Some(token);
        self.state = match kind {
            LoadKind::Initial => DashboardState::Loading,
            LoadKind::Refresh => DashboardState::Refreshing,
        };
        debug!("Issued load token {:?}", token);
        Ok(token)
    }

    fn complete_load(&mut self, token: RequestToken, kind: LoadKind, outcome: Result<()>) -> Result<()> {
        if self.in_flight != Some(token) {
            debug!("Discarding stale load result {:?}", token);
            return Ok(());
        }
        self.in_flight = None;

        match outcome {
            Ok(()) => {
                self.rebuild();
                self.state = DashboardState::Ready;
                self.error = None;
                info!("Dashboard ready with {} charts", self.charts.len());
                Ok(())
            }
            Err(e) => {
                error!("Failed to load benchmark data: {}", e);
                self.state = DashboardState::Error;
                self.error = Some(match kind {
                    LoadKind::Initial => ErrorView::Page(e.to_string()),
                    LoadKind::Refresh => ErrorView::Toast(format!("Refresh failed: {}", e)),
                });
                Err(e)
            }
        }
    }

    /// Clear and rebuild every chart from the cached document
    fn rebuild(&mut self) {
        let range = self.selected_range;
        let mut charts = Vec::with_capacity(self.config.charts.len());
        let mut groups = BTreeSet::new();

        for spec in &self.config.charts {
            let records = self.loader.series_for(&spec.key);
            let set = build_series(records, range, spec.key.metric);
            groups.extend(set.groups.iter().cloned());

            let options = ChartOptions {
                title: spec.title.clone(),
                y_axis_label: spec.y_axis_label.clone(),
                metric_kind: spec.key.metric,
                time_range: range,
                default_visible_operations: spec.default_visible_operations.clone(),
            };

            let slot = match chart::render(&spec.container_id(), &set, &options, self.colors.as_ref()) {
                Some(handle) => ChartSlot::Rendered(handle),
                None => {
                    info!("{}", Error::NoData(spec.key.to_string()));
                    ChartSlot::NoData
                }
            };

            charts.push(ChartView {
                spec: spec.clone(),
                slot,
            });
        }

        // Groups first seen in this load start visible; earlier toggles stand
        let fresh: Vec<String> = groups.difference(&self.known_groups).cloned().collect();
        self.visibility.extend_groups(fresh);
        self.known_groups.extend(groups.iter().cloned());
        self.groups = groups;

        self.charts = charts;
        self.sync_visibility();
    }

    /// Flip a group's visibility on every chart
    pub fn toggle_group(&mut self, group: &str) -> bool {
        self.toggle(&VisibilityKey::group(group))
    }

    /// Flip an operation's visibility on every chart
    pub fn toggle_operation(&mut self, operation: Operation) -> bool {
        self.toggle(&VisibilityKey::Operation(operation))
    }

    /// Returns whether the key is visible afterwards
    pub fn toggle(&mut self, key: &VisibilityKey) -> bool {
        if let VisibilityKey::Group(group) = key {
            // Unseen groups start visible, so the first toggle hides them
            if self.known_groups.insert(group.clone()) {
                self.visibility.extend_groups([group.clone()]);
            }
        }
        let visible = self.visibility.toggle(key);
        debug!("Toggled {:?} -> {}", key, visible);
        self.sync_visibility();
        visible
    }

    fn sync_visibility(&mut self) {
        let visibility = &self.visibility;

        for view in &mut self.charts {
            if let ChartSlot::Rendered(handle) = &mut view.slot {
                handle.update_visibility(visibility);
            }
        }

        let mut legend: Vec<LegendEntry> = self
            .groups
            .iter()
            .cloned()
            .map(|group| LegendEntry {
                active: visibility.contains(&VisibilityKey::group(group.clone())),
                color: Some(self.colors.color_for(&group).0),
                label: group,
                kind: "group",
            })
            .collect();
        legend.extend(Operation::ALL.into_iter().map(|op| LegendEntry {
            label: op.to_string(),
            kind: "operation",
            color: None,
            active: visibility.contains(&VisibilityKey::Operation(op)),
        }));
        self.legend = legend;
    }

    /// Ask to switch the aggregation window; confirmed changes reload the page
    pub fn change_time_range(&mut self, range: TimeRange, confirm: &dyn Confirm) -> Option<Navigation> {
        if range == self.selected_range {
            return None;
        }

        let message = format!("Reload the dashboard with {}?", range);
        if !confirm.confirm(&message) {
            debug!("Time range change to {} declined", range);
            return None;
        }

        info!("Switching time range to {}", range);
        self.selected_range = range;
        Some(Navigation {
            href: range_href(self.config.page_url.as_ref(), range),
        })
    }

    pub fn state(&self) -> DashboardState {
        self.state
    }

    pub fn error(&self) -> Option<&ErrorView> {
        self.error.as_ref()
    }

    pub fn charts(&self) -> &[ChartView] {
        &self.charts
    }

    pub fn visibility(&self) -> &VisibilitySet {
        &self.visibility
    }

    pub fn legend(&self) -> &[LegendEntry] {
        &self.legend
    }

    pub fn selected_range(&self) -> TimeRange {
        self.selected_range
    }

    pub fn document(&self) -> Option<&Document> {
        self.loader.document()
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    /// Snapshot for the page template
    pub fn view(&self) -> DashboardView {
        let summary = self.loader.summary();

        let charts = self
            .charts
            .iter()
            .map(|c| ChartViewData {
                id: c.spec.container_id(),
                title: c.spec.title.clone(),
                svg: c.handle().map(ChartHandle::to_svg),
            })
            .collect();

        let ranges = RANGE_CHOICES
            .iter()
            .chain(std::iter::once(&self.selected_range))
            .fold(Vec::<TimeRange>::new(), |mut acc, r| {
                if !acc.contains(r) {
                    acc.push(*r);
                }
                acc
            })
            .into_iter()
            .map(|r| RangeOption {
                value: r.query_value(),
                label: r.to_string(),
                href: range_href(self.config.page_url.as_ref(), r),
                selected: r == self.selected_range,
            })
            .collect();

        let (page_error, toast) = match &self.error {
            Some(ErrorView::Page(msg)) => (Some(msg.clone()), None),
            Some(ErrorView::Toast(msg)) => (None, Some(msg.clone())),
            None => (None, None),
        };

        DashboardView {
            title: self.config.title.clone(),
            generated_at: self.loader.generated_time().map(|t| format_generated_time(&t)),
            total_tests: summary.total_tests,
            configurations: self.loader.unique_configs(),
            branches: self.loader.unique_branches(),
            range_label: self.selected_range.to_string(),
            ranges,
            charts,
            legend: self.legend.clone(),
            page_error,
            toast,
        }
    }
}

/// Serializable page model
#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    pub title: String,
    pub generated_at: Option<String>,
    pub total_tests: u64,
    pub configurations: Vec<String>,
    pub branches: Vec<String>,
    pub range_label: String,
    pub ranges: Vec<RangeOption>,
    pub charts: Vec<ChartViewData>,
    pub legend: Vec<LegendEntry>,
    pub page_error: Option<String>,
    pub toast: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChartViewData {
    pub id: String,
    pub title: String,
    /// Inline SVG; `None` renders the no-data placeholder
    pub svg: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RangeOption {
    pub value: String,
    pub label: String,
    pub href: String,
    pub selected: bool,
}
