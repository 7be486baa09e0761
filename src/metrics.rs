//! Profitability model: property value baseline and per-listing ROI.
//!
//! Every listing of a city is priced against the same estimated property
//! value (citywide mean price per m² times an assumed unit size). Listing
//! floor area is not used.

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::CostModel;
use crate::error::ValidationError;
use crate::types::{AugmentedListing, DerivedMetrics, ListingRecord};

/// Nights in the trailing-year occupancy window.
pub const MAX_DAYS_RENTED: i64 = 365;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum BaselineSource {
    Comparables {
        samples: usize,
        mean_price_per_sqm: f64,
    },
    Fallback {
        price_per_sqm: f64,
    },
}

/// Estimated acquisition value shared by every listing of a city run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PropertyValueBaseline {
    pub value: f64,
    pub assumed_unit_size_sqm: f64,
    pub source: BaselineSource,
}

impl PropertyValueBaseline {
    pub fn from_comparables(
        comparable_prices: &[f64],
        cost_model: &CostModel,
    ) -> Result<Self, ValidationError> {
        Self::compute(
            comparable_prices,
            cost_model.assumed_unit_size_sqm,
            cost_model.fallback_price_per_sqm,
        )
    }

    pub fn compute(
        comparable_prices: &[f64],
        assumed_unit_size: f64,
        fallback_price_per_sqm: f64,
    ) -> Result<Self, ValidationError> {
        check_non_negative("cost_model", "assumed_unit_size_sqm", assumed_unit_size)?;
        for (idx, price) in comparable_prices.iter().enumerate() {
            check_non_negative(&format!("comparable #{}", idx + 1), "price_per_sqm", *price)?;
        }

        if comparable_prices.is_empty() {
            check_non_negative("cost_model", "fallback_price_per_sqm", fallback_price_per_sqm)?;
            warn!(
                fallback_price_per_sqm,
                "no comparable sales available, using fallback price per m2"
            );
            return Ok(Self {
                value: fallback_price_per_sqm * assumed_unit_size,
                assumed_unit_size_sqm: assumed_unit_size,
                source: BaselineSource::Fallback {
                    price_per_sqm: fallback_price_per_sqm,
                },
            });
        }

        let mean = comparable_prices.iter().sum::<f64>() / comparable_prices.len() as f64;
        debug!(
            samples = comparable_prices.len(),
            mean_price_per_sqm = mean,
            "property value baseline from comparables"
        );
        Ok(Self {
            value: mean * assumed_unit_size,
            assumed_unit_size_sqm: assumed_unit_size,
            source: BaselineSource::Comparables {
                samples: comparable_prices.len(),
                mean_price_per_sqm: mean,
            },
        })
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self.source, BaselineSource::Fallback { .. })
    }

    pub fn price_per_sqm(&self) -> f64 {
        match self.source {
            BaselineSource::Comparables {
                mean_price_per_sqm, ..
            } => mean_price_per_sqm,
            BaselineSource::Fallback { price_per_sqm } => price_per_sqm,
        }
    }

    pub fn describe(&self) -> String {
        match self.source {
            BaselineSource::Comparables { samples, .. } => format!("{samples} comparables"),
            BaselineSource::Fallback { .. } => "fallback price".to_string(),
        }
    }
}

/// Estimated property value: mean comparable price per m² times the
/// assumed unit size, or the fallback price when there are no comparables.
pub fn compute_property_value_baseline(
    comparable_prices: &[f64],
    assumed_unit_size: f64,
    fallback_price_per_sqm: f64,
) -> Result<f64, ValidationError> {
    PropertyValueBaseline::compute(comparable_prices, assumed_unit_size, fallback_price_per_sqm)
        .map(|baseline| baseline.value)
}

/// Compute income and ROI columns for every listing.
///
/// Accepts raw or already augmented listings; existing derived values are
/// ignored and recomputed. A listing without a price or an occupancy figure
/// gets no derived values at all. A zero baseline leaves both ROI figures
/// empty.
pub fn derive_roi_fields<L>(
    listings: &[L],
    property_value_baseline: f64,
    fixed_operating_cost: f64,
) -> Result<Vec<AugmentedListing>, ValidationError>
where
    L: AsRef<ListingRecord>,
{
    check_non_negative(
        "cost_model",
        "property_value_baseline",
        property_value_baseline,
    )?;
    if !fixed_operating_cost.is_finite() {
        return Err(ValidationError {
            record: "cost_model".into(),
            field: "fixed_operating_cost",
            value: fixed_operating_cost,
            reason: "must be a finite number",
        });
    }

    listings
        .iter()
        .map(|item| {
            let listing = item.as_ref();
            validate_listing(listing)?;
            Ok(AugmentedListing {
                listing: listing.clone(),
                metrics: derive_metrics(
                    listing.nightly_price,
                    listing.days_rented,
                    property_value_baseline,
                    fixed_operating_cost,
                ),
            })
        })
        .collect()
}

/// Reject numeric inputs the cost model cannot price.
pub fn validate_listing(listing: &ListingRecord) -> Result<(), ValidationError> {
    if let Some(price) = listing.nightly_price {
        check_non_negative(&listing.id, "nightly_price", price)?;
    }
    if let Some(days) = listing.days_rented {
        if days < 0 {
            return Err(ValidationError {
                record: listing.id.clone(),
                field: "days_rented",
                value: days as f64,
                reason: "must be >= 0",
            });
        }
        if days > MAX_DAYS_RENTED {
            return Err(ValidationError {
                record: listing.id.clone(),
                field: "days_rented",
                value: days as f64,
                reason: "must be <= 365",
            });
        }
    }
    Ok(())
}

fn derive_metrics(
    nightly_price: Option<f64>,
    days_rented: Option<i64>,
    baseline: f64,
    fixed_operating_cost: f64,
) -> DerivedMetrics {
    let (Some(price), Some(days)) = (nightly_price, days_rented) else {
        return DerivedMetrics::default();
    };

    let annual_income = price * days as f64;
    let net_annual_income = annual_income - fixed_operating_cost;
    let roi = |income: f64| (baseline > 0.0).then(|| income / baseline * 100.0);

    DerivedMetrics {
        annual_income: Some(annual_income),
        gross_roi_pct: roi(annual_income),
        net_annual_income: Some(net_annual_income),
        net_roi_pct: roi(net_annual_income),
    }
}

fn check_non_negative(record: &str, field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError {
            record: record.to_string(),
            field,
            value,
            reason: "must be a finite number",
        });
    }
    if value < 0.0 {
        return Err(ValidationError {
            record: record.to_string(),
            field,
            value,
            reason: "must be >= 0",
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(id: &str, nbhd: &str, price: Option<f64>, days: Option<i64>) -> ListingRecord {
        ListingRecord {
            id: id.to_string(),
            neighborhood: Some(nbhd.to_string()),
            nightly_price: price,
            days_rented: days,
            ..ListingRecord::default()
        }
    }

    fn close(actual: Option<f64>, expected: f64) {
        let actual = actual.expect("value present");
        assert!(
            (actual - expected).abs() < 1e-4,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn baseline_uses_fallback_for_empty_reference() {
        assert_eq!(compute_property_value_baseline(&[], 70.0, 2000.0), Ok(140000.0));
        let baseline = PropertyValueBaseline::from_comparables(&[], &CostModel::default())
            .expect("fallback is valid");
        assert!(baseline.is_fallback());
        assert_eq!(baseline.price_per_sqm(), 2000.0);
    }

    #[test]
    fn baseline_uses_mean_of_comparables() {
        assert_eq!(
            compute_property_value_baseline(&[1000.0, 3000.0], 70.0, 2000.0),
            Ok(140000.0)
        );
        let baseline =
            PropertyValueBaseline::compute(&[1500.0, 2500.0, 3500.0], 80.0, 2000.0).expect("valid");
        assert_eq!(baseline.value, 200000.0);
        assert_eq!(
            baseline.source,
            BaselineSource::Comparables {
                samples: 3,
                mean_price_per_sqm: 2500.0
            }
        );
    }

    #[test]
    fn negative_comparable_price_is_rejected() {
        let err = compute_property_value_baseline(&[2000.0, -5.0], 70.0, 2000.0)
            .expect_err("negative price");
        assert_eq!(err.record, "comparable #2");
        assert_eq!(err.field, "price_per_sqm");
    }

    #[test]
    fn two_listing_scenario() {
        let listings = vec![
            listing("a", "A", Some(100.0), Some(200)),
            listing("b", "B", Some(50.0), Some(100)),
        ];
        let baseline = compute_property_value_baseline(&[2000.0], 70.0, 2000.0).expect("valid");
        assert_eq!(baseline, 140000.0);

        let derived = derive_roi_fields(&listings, baseline, 3000.0).expect("valid listings");
        let a = &derived[0].metrics;
        assert_eq!(a.annual_income, Some(20000.0));
        close(a.gross_roi_pct, 14.2857);
        assert_eq!(a.net_annual_income, Some(17000.0));
        close(a.net_roi_pct, 12.142857);

        let b = &derived[1].metrics;
        assert_eq!(b.annual_income, Some(5000.0));
        close(b.gross_roi_pct, 3.5714);
        assert_eq!(b.net_annual_income, Some(2000.0));
        close(b.net_roi_pct, 1.42857);
    }

    #[test]
    fn annual_income_is_exact_product() {
        let listings = vec![listing("x", "A", Some(87.35), Some(143))];
        let derived = derive_roi_fields(&listings, 140000.0, 3000.0).expect("valid");
        assert_eq!(derived[0].metrics.annual_income, Some(87.35 * 143.0));
    }

    #[test]
    fn missing_inputs_null_every_derived_field() {
        let listings = vec![
            listing("no-price", "A", None, Some(120)),
            listing("no-days", "A", Some(80.0), None),
        ];
        let derived = derive_roi_fields(&listings, 140000.0, 3000.0).expect("valid");
        for row in &derived {
            assert_eq!(row.metrics, DerivedMetrics::default());
        }
    }

    #[test]
    fn zero_baseline_leaves_roi_undefined() {
        let baseline = compute_property_value_baseline(&[0.0, 0.0], 70.0, 0.0).expect("valid");
        assert_eq!(baseline, 0.0);
        let derived = derive_roi_fields(&[listing("z", "A", Some(60.0), Some(10))], baseline, 3000.0)
            .expect("valid");
        let m = derived[0].metrics;
        assert_eq!(m.annual_income, Some(600.0));
        assert_eq!(m.net_annual_income, Some(-2400.0));
        assert_eq!(m.gross_roi_pct, None);
        assert_eq!(m.net_roi_pct, None);
    }

    #[test]
    fn rederiving_augmented_rows_is_stable() {
        let listings = vec![
            listing("a", "A", Some(100.0), Some(200)),
            listing("b", "B", None, Some(20)),
        ];
        let once = derive_roi_fields(&listings, 140000.0, 3000.0).expect("valid");
        let twice = derive_roi_fields(&once, 140000.0, 3000.0).expect("valid");
        assert_eq!(once, twice);
    }

    #[test]
    fn malformed_listings_are_named_in_errors() {
        let err = derive_roi_fields(&[listing("neg", "A", Some(-1.0), Some(10))], 140000.0, 3000.0)
            .expect_err("negative price");
        assert_eq!((err.record.as_str(), err.field), ("neg", "nightly_price"));

        let err = derive_roi_fields(&[listing("long", "A", Some(10.0), Some(400))], 140000.0, 3000.0)
            .expect_err("more than a year");
        assert_eq!((err.record.as_str(), err.field), ("long", "days_rented"));

        let err = derive_roi_fields(&[listing("back", "A", Some(10.0), Some(-2))], 140000.0, 3000.0)
            .expect_err("negative days");
        assert_eq!(err.reason, "must be >= 0");
    }

    #[test]
    fn negative_baseline_is_rejected() {
        let listings: Vec<ListingRecord> = Vec::new();
        let err = derive_roi_fields(&listings, -1.0, 3000.0).expect_err("negative baseline");
        assert_eq!(err.field, "property_value_baseline");
    }
}
