//! Short-term rental investment analysis.
//!
//! Loads per-city listing, comparable-sales and crime tables through a
//! declarative column mapping, prices every listing against a citywide
//! property value estimate, and ranks neighborhoods by ROI, price, demand
//! and competition.

pub mod aggregate;
pub mod cache;
pub mod config;
pub mod error;
pub mod loader;
pub mod metrics;
pub mod output;
pub mod reports;
pub mod schema;
pub mod session;
pub mod telemetry;
pub mod types;
pub mod util;

pub use aggregate::{aggregate_by_group, GroupKey, GroupMetric, GroupValue};
pub use cache::DatasetCache;
pub use config::{AnalysisConfig, CostModel};
pub use error::{AnalysisError, Result, ValidationError};
pub use metrics::{compute_property_value_baseline, derive_roi_fields, PropertyValueBaseline};
pub use schema::{CityRegistry, CitySchema};
pub use session::{AnalysisSession, FilteredView, NeighborhoodSelection};
