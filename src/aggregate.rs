//! Group-by helpers behind every ranking view.

use serde::Serialize;
use std::collections::HashMap;

use crate::types::{AugmentedListing, ListingRecord};
use crate::util::count_amenities;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKey {
    Neighborhood,
    RoomType,
}

impl GroupKey {
    pub fn key_of<'a>(&self, listing: &'a ListingRecord) -> Option<&'a str> {
        let key = match self {
            Self::Neighborhood => listing.neighborhood.as_deref(),
            Self::RoomType => listing.room_type.as_deref(),
        }?;
        let key = key.trim();
        (!key.is_empty()).then_some(key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reducer {
    Mean,
    Sum,
    Count,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupMetric {
    GrossRoiPct,
    NetRoiPct,
    NightlyPrice,
    /// Nights occupied in the trailing year.
    DaysRented,
    Count,
    ReviewsTotal,
    Bedrooms,
    Bathrooms,
    AmenityCount,
}

impl GroupMetric {
    pub const fn reducer(self) -> Reducer {
        match self {
            Self::Count => Reducer::Count,
            Self::ReviewsTotal => Reducer::Sum,
            Self::GrossRoiPct
            | Self::NetRoiPct
            | Self::NightlyPrice
            | Self::DaysRented
            | Self::Bedrooms
            | Self::Bathrooms
            | Self::AmenityCount => Reducer::Mean,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::GrossRoiPct => "Gross ROI (%)",
            Self::NetRoiPct => "Net ROI (%)",
            Self::NightlyPrice => "Nightly price",
            Self::DaysRented => "Nights rented",
            Self::Count => "Listings",
            Self::ReviewsTotal => "Reviews",
            Self::Bedrooms => "Bedrooms",
            Self::Bathrooms => "Bathrooms",
            Self::AmenityCount => "Amenities",
        }
    }

    /// The per-listing input of this metric; `Count` counts every listing.
    pub fn value(self, row: &AugmentedListing) -> Option<f64> {
        let listing = &row.listing;
        match self {
            Self::GrossRoiPct => row.metrics.gross_roi_pct,
            Self::NetRoiPct => row.metrics.net_roi_pct,
            Self::NightlyPrice => listing.nightly_price,
            Self::DaysRented => listing.days_rented.map(|d| d as f64),
            Self::Count => Some(1.0),
            Self::ReviewsTotal => listing.number_of_reviews.map(|n| n as f64),
            Self::Bedrooms => listing.bedrooms,
            Self::Bathrooms => listing.bathrooms,
            Self::AmenityCount => listing
                .amenities
                .as_deref()
                .map(|raw| count_amenities(raw) as f64),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupValue {
    pub group: String,
    pub value: f64,
    /// Members of the group, including those without a value.
    pub listings: usize,
}

/// Rank groups by `metric`, highest first, keeping at most `top_n`.
pub fn aggregate_by_group(
    listings: &[AugmentedListing],
    group_key: GroupKey,
    metric: GroupMetric,
    top_n: usize,
) -> Vec<GroupValue> {
    aggregate_rows(listings, group_key, metric, top_n)
}

/// [`aggregate_by_group`] over any borrowed selection of rows.
pub fn aggregate_rows<'a, I>(
    rows: I,
    group_key: GroupKey,
    metric: GroupMetric,
    top_n: usize,
) -> Vec<GroupValue>
where
    I: IntoIterator<Item = &'a AugmentedListing>,
{
    rank_groups(
        rows.into_iter().filter_map(|row| {
            group_key
                .key_of(&row.listing)
                .map(|key| (key, metric.value(row)))
        }),
        metric.reducer(),
        top_n,
    )
}

/// Reduce `(group, value)` pairs and sort descending.
///
/// Groups keep first-seen order on ties. Groups with no value at all are
/// dropped rather than reported as zero.
pub fn rank_groups<'a, I>(items: I, reducer: Reducer, top_n: usize) -> Vec<GroupValue>
where
    I: IntoIterator<Item = (&'a str, Option<f64>)>,
{
    struct Acc<'a> {
        group: &'a str,
        sum: f64,
        values: usize,
        members: usize,
    }

    let mut order: Vec<Acc<'a>> = Vec::new();
    let mut index: HashMap<&'a str, usize> = HashMap::new();
    for (group, value) in items {
        let slot = *index.entry(group).or_insert_with(|| {
            order.push(Acc {
                group,
                sum: 0.0,
                values: 0,
                members: 0,
            });
            order.len() - 1
        });
        let acc = &mut order[slot];
        acc.members += 1;
        if let Some(v) = value {
            acc.sum += v;
            acc.values += 1;
        }
    }

    let mut ranked: Vec<GroupValue> = order
        .into_iter()
        .filter(|acc| acc.values > 0)
        .map(|acc| {
            let value = match reducer {
                Reducer::Mean => acc.sum / acc.values as f64,
                Reducer::Sum => acc.sum,
                Reducer::Count => acc.values as f64,
            };
            GroupValue {
                group: acc.group.to_string(),
                value,
                listings: acc.members,
            }
        })
        .collect();

    // `sort_by` is stable, which keeps first-seen order for equal values.
    ranked.sort_by(|a, b| b.value.total_cmp(&a.value));
    ranked.truncate(top_n);
    ranked
}

/// Mean of a metric over rows that have it.
pub fn mean_metric<'a, I>(rows: I, metric: GroupMetric) -> Option<f64>
where
    I: IntoIterator<Item = &'a AugmentedListing>,
{
    let (sum, n) = rows
        .into_iter()
        .filter_map(|row| metric.value(row))
        .fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}
