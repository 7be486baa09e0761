use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tabled::Tabled;

/// One listing row after the per-city schema has been applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ListingRecord {
    pub id: String,
    pub neighborhood: Option<String>,
    pub nightly_price: Option<f64>,
    /// Nights occupied in the trailing 365 days.
    pub days_rented: Option<i64>,
    pub room_type: Option<String>,
    pub bedrooms: Option<f64>,
    pub bathrooms: Option<f64>,
    pub amenities: Option<String>,
    pub number_of_reviews: Option<u64>,
    pub last_review: Option<NaiveDate>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Precomputed ROI shipped by the source, normalized to percent.
    pub reported_gross_roi_pct: Option<f64>,
    pub reported_net_roi_pct: Option<f64>,
}

impl AsRef<ListingRecord> for ListingRecord {
    fn as_ref(&self) -> &ListingRecord {
        self
    }
}

/// Fields computed by the cost model. All four are `None` together when the
/// listing lacks a price or an occupancy figure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DerivedMetrics {
    pub annual_income: Option<f64>,
    pub gross_roi_pct: Option<f64>,
    pub net_annual_income: Option<f64>,
    pub net_roi_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AugmentedListing {
    #[serde(flatten)]
    pub listing: ListingRecord,
    #[serde(flatten)]
    pub metrics: DerivedMetrics,
}

impl AsRef<ListingRecord> for AugmentedListing {
    fn as_ref(&self) -> &ListingRecord {
        &self.listing
    }
}

/// One row of a comparable-sales reference.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparableSale {
    pub neighborhood: Option<String>,
    pub price_per_sqm: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CrimeRecord {
    pub category: String,
    pub year: i32,
    pub reported_cases: f64,
}

/// Everything read from disk for one city. Immutable once built.
#[derive(Debug, Clone)]
pub struct CityDataset {
    pub city: String,
    pub listings: Vec<ListingRecord>,
    pub comparables: Vec<ComparableSale>,
    pub crime: Vec<CrimeRecord>,
    pub loaded_at: DateTime<Utc>,
}

impl CityDataset {
    pub fn comparable_prices(&self) -> Vec<f64> {
        self.comparables.iter().map(|c| c.price_per_sqm).collect()
    }
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct NeighborhoodRankingRow {
    #[serde(rename = "Rank")]
    #[tabled(rename = "Rank")]
    pub rank: usize,
    #[serde(rename = "Neighborhood")]
    #[tabled(rename = "Neighborhood")]
    pub neighborhood: String,
    #[serde(rename = "Value")]
    #[tabled(rename = "Value")]
    pub value: String,
    #[serde(rename = "Listings")]
    #[tabled(rename = "Listings")]
    pub listings: usize,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct CitySummaryRow {
    #[serde(rename = "City")]
    #[tabled(rename = "City")]
    pub city: String,
    #[serde(rename = "Listings")]
    #[tabled(rename = "Listings")]
    pub listings: usize,
    #[serde(rename = "Neighborhoods")]
    #[tabled(rename = "Neighborhoods")]
    pub neighborhoods: usize,
    #[serde(rename = "PropertyValue")]
    #[tabled(rename = "PropertyValue")]
    pub property_value: String,
    #[serde(rename = "BaselineSource")]
    #[tabled(rename = "BaselineSource")]
    pub baseline_source: String,
    #[serde(rename = "AvgNightlyPrice")]
    #[tabled(rename = "AvgNightlyPrice")]
    pub avg_nightly_price: String,
    #[serde(rename = "AvgGrossRoiPct")]
    #[tabled(rename = "AvgGrossRoiPct")]
    pub avg_gross_roi: String,
    #[serde(rename = "AvgNetRoiPct")]
    #[tabled(rename = "AvgNetRoiPct")]
    pub avg_net_roi: String,
    #[serde(rename = "ReportedNetRoiPct")]
    #[tabled(rename = "ReportedNetRoiPct")]
    pub reported_net_roi: String,
}

/// `describe()`-style statistics of one per-listing metric.
#[derive(Debug, Serialize, Tabled, Clone)]
pub struct DistributionRow {
    #[serde(rename = "Metric")]
    #[tabled(rename = "Metric")]
    pub metric: String,
    #[serde(rename = "Count")]
    #[tabled(rename = "Count")]
    pub count: usize,
    #[serde(rename = "Mean")]
    #[tabled(rename = "Mean")]
    pub mean: String,
    #[serde(rename = "Std")]
    #[tabled(rename = "Std")]
    pub std: String,
    #[serde(rename = "Min")]
    #[tabled(rename = "Min")]
    pub min: String,
    #[serde(rename = "P25")]
    #[tabled(rename = "P25")]
    pub p25: String,
    #[serde(rename = "Median")]
    #[tabled(rename = "Median")]
    pub median: String,
    #[serde(rename = "P75")]
    #[tabled(rename = "P75")]
    pub p75: String,
    #[serde(rename = "Max")]
    #[tabled(rename = "Max")]
    pub max: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct PriceRoiRow {
    #[serde(rename = "Rank")]
    #[tabled(rename = "Rank")]
    pub rank: usize,
    #[serde(rename = "Neighborhood")]
    #[tabled(rename = "Neighborhood")]
    pub neighborhood: String,
    #[serde(rename = "AvgNetRoiPct")]
    #[tabled(rename = "AvgNetRoiPct")]
    pub avg_net_roi: String,
    #[serde(rename = "AvgNightlyPrice")]
    #[tabled(rename = "AvgNightlyPrice")]
    pub avg_nightly_price: String,
    #[serde(rename = "Listings")]
    #[tabled(rename = "Listings")]
    pub listings: usize,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct RoomsRow {
    #[serde(rename = "Rank")]
    #[tabled(rename = "Rank")]
    pub rank: usize,
    #[serde(rename = "Neighborhood")]
    #[tabled(rename = "Neighborhood")]
    pub neighborhood: String,
    #[serde(rename = "AvgBedrooms")]
    #[tabled(rename = "AvgBedrooms")]
    pub avg_bedrooms: String,
    #[serde(rename = "AvgBathrooms")]
    #[tabled(rename = "AvgBathrooms")]
    pub avg_bathrooms: String,
    #[serde(rename = "Listings")]
    #[tabled(rename = "Listings")]
    pub listings: usize,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct RoomTypeRow {
    #[serde(rename = "RoomType")]
    #[tabled(rename = "RoomType")]
    pub room_type: String,
    #[serde(rename = "Listings")]
    #[tabled(rename = "Listings")]
    pub listings: usize,
    #[serde(rename = "SharePct")]
    #[tabled(rename = "SharePct")]
    pub share_pct: String,
    #[serde(rename = "AvgNightlyPrice")]
    #[tabled(rename = "AvgNightlyPrice")]
    pub avg_nightly_price: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct ComparablePriceRow {
    #[serde(rename = "Rank")]
    #[tabled(rename = "Rank")]
    pub rank: usize,
    #[serde(rename = "Neighborhood")]
    #[tabled(rename = "Neighborhood")]
    pub neighborhood: String,
    #[serde(rename = "AvgPricePerSqm")]
    #[tabled(rename = "AvgPricePerSqm")]
    pub avg_price_per_sqm: String,
    #[serde(rename = "Samples")]
    #[tabled(rename = "Samples")]
    pub samples: usize,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct CrimeTrendRow {
    #[serde(rename = "Year")]
    #[tabled(rename = "Year")]
    pub year: i32,
    #[serde(rename = "Category")]
    #[tabled(rename = "Category")]
    pub category: String,
    #[serde(rename = "ReportedCases")]
    #[tabled(rename = "ReportedCases")]
    pub reported_cases: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct CityComparisonRow {
    #[serde(rename = "City")]
    #[tabled(rename = "City")]
    pub city: String,
    #[serde(rename = "Listings")]
    #[tabled(rename = "Listings")]
    pub listings: usize,
    #[serde(rename = "AvgGrossRoiPct")]
    #[tabled(rename = "AvgGrossRoiPct")]
    pub avg_gross_roi: String,
    #[serde(rename = "AvgNetRoiPct")]
    #[tabled(rename = "AvgNetRoiPct")]
    pub avg_net_roi: String,
}

#[derive(Debug, Serialize)]
pub struct SummaryStats {
    pub city: String,
    pub generated_at: DateTime<Utc>,
    pub dataset_loaded_at: DateTime<Utc>,
    pub total_listings: usize,
    pub selected_listings: usize,
    pub selected_neighborhoods: usize,
    pub property_value_baseline: f64,
    pub baseline_from_fallback: bool,
    pub assumed_unit_size_sqm: f64,
    pub fixed_operating_cost: f64,
    pub avg_gross_roi_pct: Option<f64>,
    pub avg_net_roi_pct: Option<f64>,
    pub top_net_roi_neighborhood: Option<String>,
}
