use chrono::Utc;
use std::collections::{BTreeMap, HashMap};

use crate::aggregate::{rank_groups, GroupKey, GroupMetric, GroupValue, Reducer};
use crate::session::{AnalysisSession, FilteredView};
use crate::types::{
    CityComparisonRow, CitySummaryRow, ComparablePriceRow, CrimeTrendRow, DistributionRow,
    NeighborhoodRankingRow, PriceRoiRow, RoomTypeRow, RoomsRow, SummaryStats,
};
use crate::util::{average, format_number, format_opt, quantile, std_dev};

fn ranking_rows(groups: Vec<GroupValue>, decimals: usize) -> Vec<NeighborhoodRankingRow> {
    groups
        .into_iter()
        .enumerate()
        .map(|(idx, g)| NeighborhoodRankingRow {
            rank: idx + 1,
            neighborhood: g.group,
            value: format_number(g.value, decimals),
            listings: g.listings,
        })
        .collect()
}

/// Top neighborhoods by `metric` within the current selection.
pub fn neighborhood_ranking(
    view: &FilteredView<'_>,
    metric: GroupMetric,
    top_n: usize,
) -> Vec<NeighborhoodRankingRow> {
    let decimals = match metric {
        GroupMetric::Count | GroupMetric::ReviewsTotal => 0,
        _ => 2,
    };
    ranking_rows(view.aggregate(GroupKey::Neighborhood, metric, top_n), decimals)
}

/// Neighborhoods with the most listings rented above the city's
/// activity threshold.
pub fn active_competition(view: &FilteredView<'_>, top_n: usize) -> Vec<NeighborhoodRankingRow> {
    ranking_rows(view.active_by_neighborhood(top_n), 0)
}

pub fn city_summary(view: &FilteredView<'_>) -> CitySummaryRow {
    let session = view.session();
    let baseline = session.baseline();
    CitySummaryRow {
        city: session.city().to_string(),
        listings: view.len(),
        neighborhoods: view.neighborhood_count(),
        property_value: format_number(baseline.value, 2),
        baseline_source: baseline.describe(),
        avg_nightly_price: format_opt(view.mean(GroupMetric::NightlyPrice), 2),
        avg_gross_roi: format_opt(view.mean(GroupMetric::GrossRoiPct), 2),
        avg_net_roi: format_opt(view.mean(GroupMetric::NetRoiPct), 2),
        reported_net_roi: format_opt(view.mean_reported_net_roi(), 2),
    }
}

/// `describe()`-style statistics of `metric` over the selected listings.
pub fn metric_distribution(view: &FilteredView<'_>, metric: GroupMetric) -> DistributionRow {
    let mut values: Vec<f64> = view.rows().iter().filter_map(|row| metric.value(row)).collect();
    values.sort_by(|a, b| a.total_cmp(b));

    DistributionRow {
        metric: metric.label().to_string(),
        count: values.len(),
        mean: format_opt(average(&values), 2),
        std: format_opt(std_dev(&values), 2),
        min: format_opt(values.first().copied(), 2),
        p25: format_opt(quantile(&values, 0.25), 2),
        median: format_opt(quantile(&values, 0.5), 2),
        p75: format_opt(quantile(&values, 0.75), 2),
        max: format_opt(values.last().copied(), 2),
    }
}

// Top neighborhoods by `primary`, each paired with its `secondary` mean.
fn paired_ranking(
    view: &FilteredView<'_>,
    primary: GroupMetric,
    secondary: GroupMetric,
    top_n: usize,
) -> Vec<(GroupValue, Option<f64>)> {
    let lookup: HashMap<String, f64> = view
        .aggregate(GroupKey::Neighborhood, secondary, usize::MAX)
        .into_iter()
        .map(|g| (g.group, g.value))
        .collect();
    view.aggregate(GroupKey::Neighborhood, primary, top_n)
        .into_iter()
        .map(|g| {
            let other = lookup.get(&g.group).copied();
            (g, other)
        })
        .collect()
}

/// Mean nightly price next to mean net ROI, best net ROI first.
pub fn price_vs_net_roi(view: &FilteredView<'_>, top_n: usize) -> Vec<PriceRoiRow> {
    paired_ranking(view, GroupMetric::NetRoiPct, GroupMetric::NightlyPrice, top_n)
        .into_iter()
        .enumerate()
        .map(|(idx, (g, price))| PriceRoiRow {
            rank: idx + 1,
            avg_net_roi: format_number(g.value, 2),
            avg_nightly_price: format_opt(price, 2),
            listings: g.listings,
            neighborhood: g.group,
        })
        .collect()
}

/// Mean bedrooms and bathrooms, largest homes (by bedrooms) first.
pub fn bedrooms_and_bathrooms(view: &FilteredView<'_>, top_n: usize) -> Vec<RoomsRow> {
    paired_ranking(view, GroupMetric::Bedrooms, GroupMetric::Bathrooms, top_n)
        .into_iter()
        .enumerate()
        .map(|(idx, (g, baths))| RoomsRow {
            rank: idx + 1,
            avg_bedrooms: format_number(g.value, 2),
            avg_bathrooms: format_opt(baths, 2),
            listings: g.listings,
            neighborhood: g.group,
        })
        .collect()
}

/// Listing count, share and mean nightly price per room type, most common
/// first.
pub fn room_type_breakdown(view: &FilteredView<'_>) -> Vec<RoomTypeRow> {
    let counts = view.aggregate(GroupKey::RoomType, GroupMetric::Count, usize::MAX);
    let prices: BTreeMap<String, f64> = view
        .aggregate(GroupKey::RoomType, GroupMetric::NightlyPrice, usize::MAX)
        .into_iter()
        .map(|g| (g.group, g.value))
        .collect();
    let total: f64 = counts.iter().map(|g| g.value).sum();

    counts
        .into_iter()
        .map(|g| RoomTypeRow {
            share_pct: format_number(g.value / total * 100.0, 2),
            avg_nightly_price: format_opt(prices.get(&g.group).copied(), 2),
            listings: g.value as usize,
            room_type: g.group,
        })
        .collect()
}

/// Most expensive neighborhoods by mean purchase price per m².
pub fn comparable_price_ranking(session: &AnalysisSession, top_n: usize) -> Vec<ComparablePriceRow> {
    let groups = rank_groups(
        session.dataset().comparables.iter().filter_map(|sale| {
            sale.neighborhood
                .as_deref()
                .map(|n| (n, Some(sale.price_per_sqm)))
        }),
        Reducer::Mean,
        top_n,
    );
    groups
        .into_iter()
        .enumerate()
        .map(|(idx, g)| ComparablePriceRow {
            rank: idx + 1,
            neighborhood: g.group,
            avg_price_per_sqm: format_number(g.value, 2),
            samples: g.listings,
        })
        .collect()
}

/// Reported cases summed per (year, category), oldest year first.
pub fn crime_trends(session: &AnalysisSession) -> Vec<CrimeTrendRow> {
    let mut totals: BTreeMap<(i32, &str), f64> = BTreeMap::new();
    for record in &session.dataset().crime {
        *totals
            .entry((record.year, record.category.as_str()))
            .or_insert(0.0) += record.reported_cases;
    }
    totals
        .into_iter()
        .map(|((year, category), cases)| CrimeTrendRow {
            year,
            category: category.to_string(),
            reported_cases: format_number(cases, 0),
        })
        .collect()
}

/// Mean ROI per loaded city, over each city's full dataset.
pub fn city_comparison(sessions: &[AnalysisSession]) -> Vec<CityComparisonRow> {
    sessions
        .iter()
        .map(|session| {
            let view = session.all();
            CityComparisonRow {
                city: session.city().to_string(),
                listings: view.len(),
                avg_gross_roi: format_opt(view.mean(GroupMetric::GrossRoiPct), 2),
                avg_net_roi: format_opt(view.mean(GroupMetric::NetRoiPct), 2),
            }
        })
        .collect()
}

pub fn generate_summary(view: &FilteredView<'_>) -> SummaryStats {
    let session = view.session();
    let top = view
        .aggregate(GroupKey::Neighborhood, GroupMetric::NetRoiPct, 1)
        .into_iter()
        .next()
        .map(|g| g.group);
    SummaryStats {
        city: session.city().to_string(),
        generated_at: Utc::now(),
        dataset_loaded_at: session.dataset().loaded_at,
        total_listings: session.rows().len(),
        selected_listings: view.len(),
        selected_neighborhoods: view.neighborhood_count(),
        property_value_baseline: session.baseline().value,
        baseline_from_fallback: session.baseline().is_fallback(),
        assumed_unit_size_sqm: session.cost_model().assumed_unit_size_sqm,
        fixed_operating_cost: session.cost_model().fixed_operating_cost,
        avg_gross_roi_pct: view.mean(GroupMetric::GrossRoiPct),
        avg_net_roi_pct: view.mean(GroupMetric::NetRoiPct),
        top_net_roi_neighborhood: top,
    }
}
