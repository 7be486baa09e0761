//! Declarative per-city column mapping.
//!
//! Every city ships its data with different file names and column headers.
//! A [`CitySchema`] names them once; [`ListingColumns::resolve`] turns the
//! names into header indexes so the rest of the crate only deals with the
//! canonical [`ListingRecord`](crate::types::ListingRecord) fields.

use csv::StringRecord;
use once_cell::sync::Lazy;
use serde::Deserialize;

use crate::error::{AnalysisError, Result};
use crate::util::NumberFormat;

/// Unit of precomputed ROI columns shipped by some sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoiUnit {
    #[default]
    Percent,
    Fraction,
}

impl RoiUnit {
    pub fn to_percent(self, value: f64) -> f64 {
        match self {
            Self::Percent => value,
            Self::Fraction => value * 100.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ListingColumnNames {
    pub id: Option<String>,
    pub nightly_price: String,
    pub days_rented: String,
    pub neighborhood: String,
    pub room_type: Option<String>,
    pub bedrooms: Option<String>,
    pub bathrooms: Option<String>,
    pub amenities: Option<String>,
    pub number_of_reviews: Option<String>,
    pub last_review: Option<String>,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub gross_roi: Option<String>,
    pub net_roi: Option<String>,
    pub roi_unit: RoiUnit,
    pub number_format: NumberFormat,
}

impl Default for ListingColumnNames {
    fn default() -> Self {
        Self {
            id: Some("id".into()),
            nightly_price: "price".into(),
            days_rented: "days_rented".into(),
            neighborhood: "neighbourhood".into(),
            room_type: Some("room_type".into()),
            bedrooms: Some("bedrooms".into()),
            bathrooms: Some("bathrooms".into()),
            amenities: Some("amenities".into()),
            number_of_reviews: Some("number_of_reviews".into()),
            last_review: Some("last_review".into()),
            latitude: Some("latitude".into()),
            longitude: Some("longitude".into()),
            gross_roi: None,
            net_roi: None,
            roi_unit: RoiUnit::Percent,
            number_format: NumberFormat::DecimalPoint,
        }
    }
}

/// Where a city's purchase-price-per-m² reference comes from.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ComparableSource {
    /// No reference: the configured fallback price applies.
    #[default]
    None,
    /// A separate CSV of sales.
    File {
        file: String,
        price_column: String,
        #[serde(default)]
        neighborhood_column: Option<String>,
        #[serde(default)]
        number_format: NumberFormat,
    },
    /// A price-per-m² column carried on the listings table itself.
    ListingsColumn { price_column: String },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CrimeSource {
    pub file: String,
    #[serde(default = "default_crime_delimiter")]
    pub delimiter: char,
    pub category_column: String,
    pub year_column: String,
    pub cases_column: String,
    /// Roll-up categories (e.g. `Total`) that would double count.
    #[serde(default)]
    pub excluded_categories: Vec<String>,
    #[serde(default)]
    pub number_format: NumberFormat,
}

fn default_crime_delimiter() -> char {
    ';'
}

fn default_active_days() -> i64 {
    30
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CitySchema {
    pub name: String,
    pub listings_file: String,
    #[serde(default)]
    pub columns: ListingColumnNames,
    /// Listings rented strictly more nights than this count as active.
    #[serde(default = "default_active_days")]
    pub active_days_threshold: i64,
    #[serde(default)]
    pub comparables: ComparableSource,
    #[serde(default)]
    pub crime: Option<CrimeSource>,
}

impl CitySchema {
    /// Every file this schema reads, listings first. Optional sources may
    /// not exist on disk.
    pub fn source_files(&self) -> Vec<&str> {
        let mut files = vec![self.listings_file.as_str()];
        if let ComparableSource::File { file, .. } = &self.comparables {
            files.push(file);
        }
        if let Some(crime) = &self.crime {
            files.push(&crime.file);
        }
        files
    }
}

static BUILTIN_SCHEMAS: Lazy<Vec<CitySchema>> = Lazy::new(|| {
    vec![
        CitySchema {
            name: "valencia".into(),
            listings_file: "Valencia_limpio.csv".into(),
            columns: ListingColumnNames::default(),
            active_days_threshold: 30,
            comparables: ComparableSource::File {
                file: "valencia_vivienda_limpio.csv".into(),
                price_column: "precio".into(),
                neighborhood_column: Some("neighbourhood".into()),
                number_format: NumberFormat::DecimalPoint,
            },
            crime: Some(CrimeSource {
                file: "crimenValencia.csv".into(),
                delimiter: ';',
                category_column: "Parámetro".into(),
                year_column: "Año".into(),
                cases_column: "Denuncias".into(),
                excluded_categories: vec!["Total".into()],
                number_format: NumberFormat::DecimalPoint,
            }),
        },
        CitySchema {
            name: "malaga".into(),
            listings_file: "malaga_completed_clean.csv".into(),
            columns: ListingColumnNames {
                days_rented: "estimated_occupancy_l365d".into(),
                gross_roi: Some("roi".into()),
                net_roi: Some("net_roi".into()),
                roi_unit: RoiUnit::Fraction,
                ..ListingColumnNames::default()
            },
            active_days_threshold: 150,
            comparables: ComparableSource::ListingsColumn {
                price_column: "price_per_m2".into(),
            },
            crime: Some(CrimeSource {
                file: "malaga_crimen_clean.csv".into(),
                delimiter: ';',
                category_column: "crime_type".into(),
                year_column: "year".into(),
                cases_column: "reported_cases".into(),
                excluded_categories: vec!["Total".into()],
                number_format: NumberFormat::DecimalPoint,
            }),
        },
        CitySchema {
            name: "barcelona".into(),
            listings_file: "barcelona_limpio_completo.csv".into(),
            columns: ListingColumnNames {
                gross_roi: Some("ROI (%)".into()),
                net_roi: Some("Net ROI (%)".into()),
                ..ListingColumnNames::default()
            },
            active_days_threshold: 30,
            comparables: ComparableSource::File {
                file: "precio_vivienda_barriosBarcelona_mayo2025.csv".into(),
                price_column: "precio_m2".into(),
                neighborhood_column: Some("barrio".into()),
                number_format: NumberFormat::DecimalPoint,
            },
            crime: None,
        },
        CitySchema {
            name: "madrid".into(),
            listings_file: "madrid_limpio.csv".into(),
            columns: ListingColumnNames::default(),
            active_days_threshold: 30,
            comparables: ComparableSource::None,
            crime: None,
        },
    ]
});

/// The schemas shipped with the crate.
pub fn builtin_schemas() -> &'static [CitySchema] {
    &BUILTIN_SCHEMAS
}

/// Lookup table of city schemas, builtin presets first, config entries
/// replacing presets with the same name.
#[derive(Debug, Clone)]
pub struct CityRegistry {
    schemas: Vec<CitySchema>,
}

impl CityRegistry {
    pub fn new(overrides: &[CitySchema]) -> Self {
        let mut schemas: Vec<CitySchema> = builtin_schemas().to_vec();
        for schema in overrides {
            match schemas
                .iter_mut()
                .find(|s| s.name.eq_ignore_ascii_case(&schema.name))
            {
                Some(existing) => *existing = schema.clone(),
                None => schemas.push(schema.clone()),
            }
        }
        Self { schemas }
    }

    pub fn get(&self, city: &str) -> Result<&CitySchema> {
        let wanted = city.trim();
        self.schemas
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(wanted))
            .ok_or_else(|| AnalysisError::UnknownCity(wanted.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.schemas.iter().map(|s| s.name.as_str())
    }
}

/// Header indexes for one listings file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingColumns {
    pub id: Option<usize>,
    pub nightly_price: usize,
    pub days_rented: usize,
    pub neighborhood: usize,
    pub room_type: Option<usize>,
    pub bedrooms: Option<usize>,
    pub bathrooms: Option<usize>,
    pub amenities: Option<usize>,
    pub number_of_reviews: Option<usize>,
    pub last_review: Option<usize>,
    pub latitude: Option<usize>,
    pub longitude: Option<usize>,
    pub gross_roi: Option<usize>,
    pub net_roi: Option<usize>,
    pub comparable_price: Option<usize>,
}

impl ListingColumns {
    /// Resolve the schema against a header row.
    ///
    /// Price, occupancy and neighborhood are required; optional attributes
    /// that are absent from the file are simply left unmapped.
    pub fn resolve(schema: &CitySchema, headers: &StringRecord) -> Result<Self> {
        let names = &schema.columns;
        let required = |field: &'static str, column: &str| {
            find_column(headers, column).ok_or_else(|| AnalysisError::MissingColumn {
                city: schema.name.clone(),
                field,
                column: column.to_string(),
            })
        };
        let optional = |column: &Option<String>| {
            column
                .as_deref()
                .and_then(|name| find_column(headers, name))
        };

        let comparable_price = match &schema.comparables {
            ComparableSource::ListingsColumn { price_column } => {
                find_column(headers, price_column)
            }
            _ => None,
        };

        Ok(Self {
            id: optional(&names.id),
            nightly_price: required("nightly_price", &names.nightly_price)?,
            days_rented: required("days_rented", &names.days_rented)?,
            neighborhood: required("neighborhood", &names.neighborhood)?,
            room_type: optional(&names.room_type),
            bedrooms: optional(&names.bedrooms),
            bathrooms: optional(&names.bathrooms),
            amenities: optional(&names.amenities),
            number_of_reviews: optional(&names.number_of_reviews),
            last_review: optional(&names.last_review),
            latitude: optional(&names.latitude),
            longitude: optional(&names.longitude),
            gross_roi: optional(&names.gross_roi),
            net_roi: optional(&names.net_roi),
            comparable_price,
        })
    }
}

pub(crate) fn find_column(headers: &StringRecord, name: &str) -> Option<usize> {
    let wanted = name.trim();
    headers.iter().position(|h| h.trim() == wanted)
}
