use chrono::Utc;
use csv::{ReaderBuilder, StringRecord, Trim};
use serde::Serialize;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::{AnalysisError, Result};
use crate::schema::{find_column, CitySchema, ComparableSource, CrimeSource, ListingColumns};
use crate::types::{CityDataset, ComparableSale, CrimeRecord, ListingRecord};
use crate::util::{non_empty, parse_date_safe, parse_f64_safe, parse_i64_safe, NumberFormat};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub total_rows: usize,
    pub parse_errors: usize,
    pub missing_price: usize,
    pub missing_days: usize,
    pub comparables: usize,
    pub crime_rows: usize,
}

/// Read every file a city schema points at under `data_dir`.
///
/// The listings file is mandatory. Comparable sales and crime statistics are
/// optional: a missing file is logged and treated as empty.
pub fn load_city(schema: &CitySchema, data_dir: &Path) -> Result<(CityDataset, LoadReport)> {
    let listings_path = data_dir.join(&schema.listings_file);
    let file = File::open(&listings_path).map_err(|e| AnalysisError::io(&listings_path, e))?;
    let (listings, mut comparables, mut report) = read_listings(file, schema)?;

    if let ComparableSource::File {
        file,
        price_column,
        neighborhood_column,
        number_format,
    } = &schema.comparables
    {
        let path = data_dir.join(file);
        if let Some(reader) = open_optional(&path)? {
            comparables = read_comparables(
                reader,
                b',',
                *number_format,
                price_column,
                neighborhood_column.as_deref(),
            )?;
        }
    }
    report.comparables = comparables.len();

    let crime = match &schema.crime {
        Some(source) => {
            let path = data_dir.join(&source.file);
            match open_optional(&path)? {
                Some(reader) => read_crime(reader, source)?,
                None => Vec::new(),
            }
        }
        None => Vec::new(),
    };
    report.crime_rows = crime.len();

    info!(
        city = %schema.name,
        rows = report.total_rows,
        listings = listings.len(),
        parse_errors = report.parse_errors,
        comparables = report.comparables,
        crime_rows = report.crime_rows,
        "loaded city dataset"
    );

    let dataset = CityDataset {
        city: schema.name.clone(),
        listings,
        comparables,
        crime,
        loaded_at: Utc::now(),
    };
    Ok((dataset, report))
}

/// Parse a listings table using the city's column mapping.
///
/// Returns the listings, any comparable prices carried on the same table,
/// and load diagnostics. Unreadable rows are counted and skipped; unparsable
/// cells become missing values.
pub fn read_listings<R: Read>(
    reader: R,
    schema: &CitySchema,
) -> Result<(Vec<ListingRecord>, Vec<ComparableSale>, LoadReport)> {
    let mut rdr = ReaderBuilder::new()
        .flexible(true)
        .trim(Trim::All)
        .from_reader(reader);
    let headers = rdr.headers()?.clone();
    let cols = ListingColumns::resolve(schema, &headers)?;
    let roi_unit = schema.columns.roi_unit;
    let format = schema.columns.number_format;

    let mut report = LoadReport::default();
    let mut listings = Vec::new();
    let mut comparables = Vec::new();

    for (row_no, result) in rdr.records().enumerate() {
        report.total_rows += 1;
        let record = match result {
            Ok(r) => r,
            Err(err) => {
                debug!(row = row_no + 1, error = %err, "skipping unreadable listing row");
                report.parse_errors += 1;
                continue;
            }
        };
        let cell = |idx: Option<usize>| idx.and_then(|i| record.get(i));
        let number = |idx: Option<usize>| parse_f64_safe(cell(idx), format);
        let whole = |idx: Option<usize>| parse_i64_safe(cell(idx), format);

        let neighborhood = non_empty(cell(Some(cols.neighborhood)));
        let nightly_price = number(Some(cols.nightly_price));
        let days_rented = whole(Some(cols.days_rented));
        if nightly_price.is_none() {
            report.missing_price += 1;
        }
        if days_rented.is_none() {
            report.missing_days += 1;
        }

        if let Some(price_per_sqm) = number(cols.comparable_price) {
            comparables.push(ComparableSale {
                neighborhood: neighborhood.clone(),
                price_per_sqm,
            });
        }

        listings.push(ListingRecord {
            id: non_empty(cell(cols.id)).unwrap_or_else(|| (row_no + 1).to_string()),
            neighborhood,
            nightly_price,
            days_rented,
            room_type: non_empty(cell(cols.room_type)),
            bedrooms: number(cols.bedrooms),
            bathrooms: number(cols.bathrooms),
            amenities: non_empty(cell(cols.amenities)),
            number_of_reviews: whole(cols.number_of_reviews)
                .and_then(|n| u64::try_from(n).ok()),
            last_review: parse_date_safe(cell(cols.last_review)),
            latitude: number(cols.latitude),
            longitude: number(cols.longitude),
            reported_gross_roi_pct: number(cols.gross_roi)
                .map(|v| roi_unit.to_percent(v)),
            reported_net_roi_pct: number(cols.net_roi)
                .map(|v| roi_unit.to_percent(v)),
        });
    }

    if report.missing_price > 0 || report.missing_days > 0 {
        debug!(
            city = %schema.name,
            missing_price = report.missing_price,
            missing_days = report.missing_days,
            "listings without price or occupancy will carry no ROI"
        );
    }

    Ok((listings, comparables, report))
}

/// Parse a comparable-sales table. A table without the price column yields
/// no comparables, so the fallback price applies.
pub fn read_comparables<R: Read>(
    reader: R,
    delimiter: u8,
    format: NumberFormat,
    price_column: &str,
    neighborhood_column: Option<&str>,
) -> Result<Vec<ComparableSale>> {
    let mut rdr = ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(reader);
    let headers = rdr.headers()?.clone();
    let Some(price_idx) = find_column(&headers, price_column) else {
        warn!(column = price_column, "comparable sales table has no price column");
        return Ok(Vec::new());
    };
    let nbhd_idx = neighborhood_column.and_then(|name| find_column(&headers, name));

    let mut sales = Vec::new();
    for result in rdr.records() {
        let Ok(record) = result else {
            continue;
        };
        if let Some(price_per_sqm) = parse_f64_safe(record.get(price_idx), format) {
            sales.push(ComparableSale {
                neighborhood: non_empty(nbhd_idx.and_then(|i| record.get(i))),
                price_per_sqm,
            });
        }
    }
    Ok(sales)
}

/// Parse a crime statistics table, dropping roll-up categories.
pub fn read_crime<R: Read>(reader: R, source: &CrimeSource) -> Result<Vec<CrimeRecord>> {
    let delimiter = u8::try_from(source.delimiter).unwrap_or(b';');
    let mut rdr = ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(reader);
    let headers: StringRecord = rdr.headers()?.clone();
    let (Some(cat_idx), Some(year_idx), Some(cases_idx)) = (
        find_column(&headers, &source.category_column),
        find_column(&headers, &source.year_column),
        find_column(&headers, &source.cases_column),
    ) else {
        warn!(file = %source.file, "crime table is missing expected columns, skipping");
        return Ok(Vec::new());
    };

    let mut records = Vec::new();
    for result in rdr.records() {
        let Ok(record) = result else {
            continue;
        };
        let Some(category) = non_empty(record.get(cat_idx)) else {
            continue;
        };
        if source
            .excluded_categories
            .iter()
            .any(|excluded| excluded.eq_ignore_ascii_case(&category))
        {
            continue;
        }
        let year = parse_i64_safe(record.get(year_idx), NumberFormat::DecimalPoint)
            .and_then(|y| i32::try_from(y).ok());
        let cases = parse_f64_safe(record.get(cases_idx), source.number_format);
        if let (Some(year), Some(reported_cases)) = (year, cases) {
            records.push(CrimeRecord {
                category,
                year,
                reported_cases,
            });
        }
    }
    Ok(records)
}

fn open_optional(path: &Path) -> Result<Option<File>> {
    match File::open(path) {
        Ok(file) => Ok(Some(file)),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            warn!(path = %path.display(), "optional data file not found");
            Ok(None)
        }
        Err(err) => Err(AnalysisError::io(path, err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::CityRegistry;

    fn schema(city: &str) -> CitySchema {
        CityRegistry::new(&[])
            .get(city)
            .expect("builtin city")
            .clone()
    }

    #[test]
    fn reads_valencia_listing_columns() {
        let csv = "id,neighbourhood,price,days_rented,room_type,number_of_reviews,last_review,amenities\n\
1,Ruzafa,100,200,Entire home/apt,12,2024-05-01,\"Wifi,Kitchen\"\n\
2,,N/A,100,Private room,,,\n\
3,El Carmen,80.5,oops,Private room,3,,\n";
        let (listings, comparables, report) =
            read_listings(csv.as_bytes(), &schema("valencia")).expect("parses");
        assert_eq!(report.total_rows, 3);
        assert_eq!(report.missing_price, 1);
        assert_eq!(report.missing_days, 1);
        assert!(comparables.is_empty());

        assert_eq!(listings[0].neighborhood.as_deref(), Some("Ruzafa"));
        assert_eq!(listings[0].nightly_price, Some(100.0));
        assert_eq!(listings[0].days_rented, Some(200));
        assert_eq!(listings[0].number_of_reviews, Some(12));
        assert_eq!(listings[0].amenities.as_deref(), Some("Wifi,Kitchen"));
        assert!(listings[0].last_review.is_some());

        assert_eq!(listings[1].neighborhood, None);
        assert_eq!(listings[1].nightly_price, None);
        assert_eq!(listings[2].days_rented, None);
    }

    #[test]
    fn malaga_carries_comparables_and_fraction_roi() {
        let csv = "neighbourhood,price,estimated_occupancy_l365d,price_per_m2,roi,net_roi\n\
Centro,120,180,3500,0.5,0.25\n\
Este,90,150,,0.07,0.05\n";
        let (listings, comparables, _) =
            read_listings(csv.as_bytes(), &schema("malaga")).expect("parses");
        assert_eq!(listings[0].id, "1");
        assert_eq!(listings[1].id, "2");
        assert_eq!(listings[0].days_rented, Some(180));
        assert_eq!(listings[0].reported_net_roi_pct, Some(25.0));
        assert_eq!(comparables.len(), 1);
        assert_eq!(comparables[0].price_per_sqm, 3500.0);
        assert_eq!(comparables[0].neighborhood.as_deref(), Some("Centro"));
    }

    #[test]
    fn missing_required_column_is_an_error() {
        let csv = "id,price,days_rented\n1,50,10\n";
        let err = read_listings(csv.as_bytes(), &schema("valencia")).expect_err("no neighborhood");
        assert!(matches!(
            err,
            AnalysisError::MissingColumn { field: "neighborhood", .. }
        ));
    }

    #[test]
    fn comparables_without_price_column_are_empty() {
        let csv = "neighbourhood,superficie\nRuzafa,70\n";
        let sales = read_comparables(csv.as_bytes(), b',', NumberFormat::DecimalPoint, "precio", None)
            .expect("parses");
        assert!(sales.is_empty());
    }

    #[test]
    fn crime_rows_skip_total_category() {
        let source = schema("valencia").crime.expect("valencia has crime data");
        let csv = "Parámetro;Año;Denuncias\n\
Hurtos;2022;1200\n\
Total;2022;5000\n\
Robos;2023;310\n\
Robos;sin dato;12\n";
        let records = read_crime(csv.as_bytes(), &source).expect("parses");
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].category, "Robos");
        assert_eq!(records[1].year, 2023);
        assert_eq!(records[1].reported_cases, 310.0);
    }

    #[test]
    fn decimal_comma_sources_keep_thousands() {
        let mut source = schema("valencia").crime.expect("valencia has crime data");
        source.number_format = NumberFormat::DecimalComma;
        let csv = "Parámetro;Año;Denuncias\nHurtos;2022;1.200\nEstafas;2022;7,5\n";
        let records = read_crime(csv.as_bytes(), &source).expect("parses");
        assert_eq!(records[0].reported_cases, 1200.0);
        assert_eq!(records[1].reported_cases, 7.5);

        let csv = "barrio;euros_m2\nRuzafa;2.450,50\nBenimaclet;2,5\n";
        let sales = read_comparables(
            csv.as_bytes(),
            b';',
            NumberFormat::DecimalComma,
            "euros_m2",
            Some("barrio"),
        )
        .expect("parses");
        assert_eq!(sales[0].price_per_sqm, 2450.5);
        assert_eq!(sales[1].price_per_sqm, 2.5);
    }

    #[test]
    fn ambiguous_prices_are_missing_not_rescaled() {
        let csv = "neighbourhood,price,days_rented\nRuzafa,\"2,5\",100\nCarmen,\"1,250\",100\n";
        let (listings, _, report) =
            read_listings(csv.as_bytes(), &schema("valencia")).expect("parses");
        assert_eq!(listings[0].nightly_price, None);
        assert_eq!(listings[1].nightly_price, Some(1250.0));
        assert_eq!(report.missing_price, 1);
    }
}
