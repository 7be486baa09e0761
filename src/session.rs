//! An analysis session: one city's snapshot plus everything derived from it.
//!
//! ROI is computed once over the whole city when the session is built.
//! Neighborhood filters only select rows; the property value baseline stays
//! the citywide one.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::aggregate::{aggregate_rows, mean_metric, GroupKey, GroupMetric, GroupValue};
use crate::cache::DatasetCache;
use crate::config::CostModel;
use crate::error::Result;
use crate::loader::LoadReport;
use crate::metrics::{derive_roi_fields, PropertyValueBaseline};
use crate::schema::CitySchema;
use crate::types::{AugmentedListing, CityDataset};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum NeighborhoodSelection {
    /// No filter; listings without a neighborhood are kept too.
    #[default]
    All,
    Only(BTreeSet<String>),
}

impl NeighborhoodSelection {
    pub fn only<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Only(names.into_iter().map(Into::into).collect())
    }

    pub fn matches(&self, neighborhood: Option<&str>) -> bool {
        match self {
            Self::All => true,
            Self::Only(names) => neighborhood.is_some_and(|n| names.contains(n)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnalysisSession {
    dataset: Arc<CityDataset>,
    cost_model: CostModel,
    baseline: PropertyValueBaseline,
    rows: Vec<AugmentedListing>,
    active_days_threshold: i64,
}

impl AnalysisSession {
    pub fn new(
        dataset: Arc<CityDataset>,
        cost_model: CostModel,
        active_days_threshold: i64,
    ) -> Result<Self> {
        let baseline =
            PropertyValueBaseline::from_comparables(&dataset.comparable_prices(), &cost_model)?;
        let rows = derive_roi_fields(
            &dataset.listings,
            baseline.value,
            cost_model.fixed_operating_cost,
        )?;
        info!(
            city = %dataset.city,
            listings = rows.len(),
            property_value = baseline.value,
            baseline = %baseline.describe(),
            "derived ROI fields"
        );
        Ok(Self {
            dataset,
            cost_model,
            baseline,
            rows,
            active_days_threshold,
        })
    }

    /// Load (or reuse) the city's dataset and derive its metrics.
    pub fn open(
        cache: &mut DatasetCache,
        schema: &CitySchema,
        data_dir: &Path,
        cost_model: CostModel,
    ) -> Result<(Self, LoadReport)> {
        let (dataset, report) = cache.get_or_load(schema, data_dir)?;
        let session = Self::new(dataset, cost_model, schema.active_days_threshold)?;
        Ok((session, report))
    }

    pub fn city(&self) -> &str {
        &self.dataset.city
    }

    pub fn dataset(&self) -> &CityDataset {
        &self.dataset
    }

    pub fn cost_model(&self) -> &CostModel {
        &self.cost_model
    }

    pub fn baseline(&self) -> &PropertyValueBaseline {
        &self.baseline
    }

    pub fn rows(&self) -> &[AugmentedListing] {
        &self.rows
    }

    pub fn active_days_threshold(&self) -> i64 {
        self.active_days_threshold
    }

    /// Distinct neighborhood names, sorted.
    pub fn neighborhoods(&self) -> Vec<String> {
        self.rows
            .iter()
            .filter_map(|row| GroupKey::Neighborhood.key_of(&row.listing))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    pub fn select(&self, selection: &NeighborhoodSelection) -> FilteredView<'_> {
        let rows: Vec<&AugmentedListing> = self
            .rows
            .iter()
            .filter(|row| selection.matches(row.listing.neighborhood.as_deref()))
            .collect();
        if rows.is_empty() {
            warn!(city = %self.city(), "no listings for the selected neighborhoods");
        }
        FilteredView {
            session: self,
            rows,
        }
    }

    pub fn all(&self) -> FilteredView<'_> {
        self.select(&NeighborhoodSelection::All)
    }
}

/// Rows of a session matching a neighborhood selection.
#[derive(Debug, Clone)]
pub struct FilteredView<'a> {
    session: &'a AnalysisSession,
    rows: Vec<&'a AugmentedListing>,
}

impl<'a> FilteredView<'a> {
    pub fn session(&self) -> &'a AnalysisSession {
        self.session
    }

    pub fn rows(&self) -> &[&'a AugmentedListing] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn neighborhood_count(&self) -> usize {
        self.rows
            .iter()
            .filter_map(|row| GroupKey::Neighborhood.key_of(&row.listing))
            .collect::<BTreeSet<_>>()
            .len()
    }

    pub fn aggregate(&self, key: GroupKey, metric: GroupMetric, top_n: usize) -> Vec<GroupValue> {
        aggregate_rows(self.rows.iter().copied(), key, metric, top_n)
    }

    /// Neighborhood listing counts restricted to active listings.
    pub fn active_by_neighborhood(&self, top_n: usize) -> Vec<GroupValue> {
        let threshold = self.session.active_days_threshold;
        aggregate_rows(
            self.rows
                .iter()
                .copied()
                .filter(|row| row.listing.days_rented.is_some_and(|d| d > threshold)),
            GroupKey::Neighborhood,
            GroupMetric::Count,
            top_n,
        )
    }

    pub fn mean(&self, metric: GroupMetric) -> Option<f64> {
        mean_metric(self.rows.iter().copied(), metric)
    }

    pub fn mean_reported_net_roi(&self) -> Option<f64> {
        let values: Vec<f64> = self
            .rows
            .iter()
            .filter_map(|row| row.listing.reported_net_roi_pct)
            .collect();
        crate::util::average(&values)
    }
}
