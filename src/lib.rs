//! iopsdash - Storage benchmark IOPS and latency dashboard
//!
//! Loads a precomputed results document, turns it into per-group read/write
//! series and renders one SVG chart per configured view into a static HTML
//! page.
//!
//! # Features
//!
//! - Load the results document from a file or over HTTP
//! - Daily downsampling for long time ranges
//! - Shared legend that shows or hides groups and operations on every chart
//! - Aggregate per-commit raw result files into the results document
//!
//! # Example
//!
//! ```no_run
//! use iopsdash::config::DashboardConfig;
//! use iopsdash::dashboard::Dashboard;
//! use iopsdash::html;
//! use iopsdash::loader::FileSource;
//!
//! let mut dashboard = Dashboard::new(DashboardConfig::default(), FileSource);
//! dashboard.init().unwrap();
//! html::write_dashboard(&dashboard.view(), dashboard.document(), "dist".as_ref()).unwrap();
//! ```

pub mod aggregate;
pub mod chart;
pub mod config;
pub mod dashboard;
pub mod data;
pub mod error;
pub mod format;
pub mod html;
pub mod loader;
pub mod series;
pub mod visibility;

pub use error::{Error, Result};
