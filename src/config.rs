//! Configuration loader: defaults, optional TOML file, then `ROI_*`
//! environment overrides (a `.env` file is honored).

use serde::Deserialize;
use std::collections::HashSet;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::schema::{CityRegistry, CitySchema, ComparableSource};

pub const DEFAULT_ASSUMED_UNIT_SIZE_SQM: f64 = 70.0;
pub const DEFAULT_FIXED_OPERATING_COST: f64 = 3000.0;
pub const DEFAULT_FALLBACK_PRICE_PER_SQM: f64 = 2000.0;
pub const DEFAULT_TOP_N: usize = 15;
pub const DEFAULT_CACHE_TTL_SECS: u64 = 3600;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("{key} must be {expected}, got '{value}'")]
    InvalidValue {
        key: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// Fixed assumptions of the profitability model.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct CostModel {
    /// Floor area of the "typical" unit used to price every listing.
    pub assumed_unit_size_sqm: f64,
    /// Yearly running cost subtracted from rental income.
    pub fixed_operating_cost: f64,
    /// Price per m² used when a city has no comparable sales.
    pub fallback_price_per_sqm: f64,
}

impl Default for CostModel {
    fn default() -> Self {
        Self {
            assumed_unit_size_sqm: DEFAULT_ASSUMED_UNIT_SIZE_SQM,
            fixed_operating_cost: DEFAULT_FIXED_OPERATING_COST,
            fallback_price_per_sqm: DEFAULT_FALLBACK_PRICE_PER_SQM,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    pub log_level: String,
    pub top_n: usize,
    pub cache_ttl_secs: u64,
    pub cost_model: CostModel,
    pub cities: Vec<CitySchema>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            output_dir: PathBuf::from("."),
            log_level: "info".to_string(),
            top_n: DEFAULT_TOP_N,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            cost_model: CostModel::default(),
            cities: Vec::new(),
        }
    }
}

impl AnalysisConfig {
    /// Load the effective configuration.
    ///
    /// `path` wins over `ROI_CONFIG`; without either, defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let path = path
            .map(Path::to_path_buf)
            .or_else(|| env::var("ROI_CONFIG").ok().map(PathBuf::from));
        let mut config = match path {
            Some(path) => Self::from_toml_file(&path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `ROI_*` overrides from `lookup` (the process environment in
    /// production, a map in tests).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("ROI_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("ROI_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(level) = lookup("ROI_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(raw) = lookup("ROI_ASSUMED_UNIT_SIZE") {
            self.cost_model.assumed_unit_size_sqm = parse_number("ROI_ASSUMED_UNIT_SIZE", &raw)?;
        }
        if let Some(raw) = lookup("ROI_OPERATING_COST") {
            self.cost_model.fixed_operating_cost = parse_number("ROI_OPERATING_COST", &raw)?;
        }
        if let Some(raw) = lookup("ROI_FALLBACK_PRICE_PER_SQM") {
            self.cost_model.fallback_price_per_sqm =
                parse_number("ROI_FALLBACK_PRICE_PER_SQM", &raw)?;
        }
        if let Some(raw) = lookup("ROI_TOP_N") {
            self.top_n = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: "ROI_TOP_N",
                value: raw.clone(),
                expected: "a positive integer",
            })?;
        }
        if let Some(raw) = lookup("ROI_CACHE_TTL_SECS") {
            self.cache_ttl_secs = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: "ROI_CACHE_TTL_SECS",
                value: raw.clone(),
                expected: "a whole number of seconds",
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut issues: Vec<String> = Vec::new();
        let cost = &self.cost_model;

        if !(cost.assumed_unit_size_sqm.is_finite() && cost.assumed_unit_size_sqm > 0.0) {
            issues.push("cost_model.assumed_unit_size_sqm must be > 0".into());
        }
        if !(cost.fixed_operating_cost.is_finite() && cost.fixed_operating_cost >= 0.0) {
            issues.push("cost_model.fixed_operating_cost must be >= 0".into());
        }
        if !(cost.fallback_price_per_sqm.is_finite() && cost.fallback_price_per_sqm >= 0.0) {
            issues.push("cost_model.fallback_price_per_sqm must be >= 0".into());
        }
        if self.top_n == 0 {
            issues.push("top_n must be >= 1".into());
        }

        let mut seen = HashSet::new();
        for city in &self.cities {
            let label = if city.name.trim().is_empty() {
                issues.push("cities[].name must not be empty".into());
                "<unnamed>".to_string()
            } else {
                city.name.to_ascii_lowercase()
            };
            if !seen.insert(label.clone()) {
                issues.push(format!("city '{label}' is defined more than once"));
            }
            if city.listings_file.trim().is_empty() {
                issues.push(format!("city '{label}': listings_file must not be empty"));
            }
            for (field, column) in [
                ("nightly_price", &city.columns.nightly_price),
                ("days_rented", &city.columns.days_rented),
                ("neighborhood", &city.columns.neighborhood),
            ] {
                if column.trim().is_empty() {
                    issues.push(format!("city '{label}': column for {field} must not be empty"));
                }
            }
            if let ComparableSource::File { file, .. } = &city.comparables {
                if file.trim().is_empty() {
                    issues.push(format!("city '{label}': comparables.file must not be empty"));
                }
            }
            if let Some(crime) = &city.crime {
                if !crime.delimiter.is_ascii() {
                    issues.push(format!("city '{label}': crime.delimiter must be ASCII"));
                }
            }
            if !(0..=365).contains(&city.active_days_threshold) {
                issues.push(format!(
                    "city '{label}': active_days_threshold must be within 0..=365"
                ));
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(issues))
        }
    }

    pub fn registry(&self) -> CityRegistry {
        CityRegistry::new(&self.cities)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

fn parse_number(key: &'static str, raw: &str) -> Result<f64, ConfigError> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ConfigError::InvalidValue {
            key,
            value: raw.to_string(),
            expected: "a number",
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_documented_cost_model() {
        let config = AnalysisConfig::default();
        assert_eq!(config.cost_model.assumed_unit_size_sqm, 70.0);
        assert_eq!(config.cost_model.fixed_operating_cost, 3000.0);
        assert_eq!(config.cost_model.fallback_price_per_sqm, 2000.0);
        assert_eq!(config.top_n, 15);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn toml_overrides_cost_model_and_adds_city() {
        let raw = r#"
            data_dir = "/srv/rentals"
            top_n = 10

            [cost_model]
            fixed_operating_cost = 4500.0

            [[cities]]
            name = "sevilla"
            listings_file = "sevilla.csv"
            active_days_threshold = 90

            [cities.columns]
            days_rented = "estimated_occupancy_l365d"

            [cities.comparables]
            kind = "file"
            file = "sevilla_vivienda.csv"
            price_column = "eur_m2"
        "#;
        let config: AnalysisConfig = toml::from_str(raw).expect("valid toml");
        assert_eq!(config.top_n, 10);
        assert_eq!(config.cost_model.fixed_operating_cost, 4500.0);
        assert_eq!(config.cost_model.assumed_unit_size_sqm, 70.0);
        assert!(config.validate().is_ok());

        let registry = config.registry();
        let sevilla = registry.get("sevilla").expect("custom city registered");
        assert_eq!(sevilla.columns.days_rented, "estimated_occupancy_l365d");
        assert_eq!(sevilla.columns.nightly_price, "price");
        assert!(matches!(
            &sevilla.comparables,
            ComparableSource::File { neighborhood_column: None, .. }
        ));
    }

    #[test]
    fn env_overrides_are_parsed() {
        let vars: HashMap<&str, &str> = [
            ("ROI_ASSUMED_UNIT_SIZE", "85"),
            ("ROI_OPERATING_COST", "2500.5"),
            ("ROI_TOP_N", "5"),
            ("ROI_DATA_DIR", "/tmp/rentals"),
        ]
        .into_iter()
        .collect();
        let mut config = AnalysisConfig::default();
        config
            .apply_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .expect("overrides apply");
        assert_eq!(config.cost_model.assumed_unit_size_sqm, 85.0);
        assert_eq!(config.cost_model.fixed_operating_cost, 2500.5);
        assert_eq!(config.top_n, 5);
        assert_eq!(config.data_dir, PathBuf::from("/tmp/rentals"));
    }

    #[test]
    fn bad_env_number_is_rejected() {
        let mut config = AnalysisConfig::default();
        let err = config
            .apply_overrides(|key| (key == "ROI_OPERATING_COST").then(|| "lots".to_string()))
            .expect_err("not a number");
        assert!(matches!(
            err,
            ConfigError::InvalidValue { key: "ROI_OPERATING_COST", .. }
        ));
    }

    #[test]
    fn validation_collects_every_issue() {
        let mut config = AnalysisConfig::default();
        config.cost_model.assumed_unit_size_sqm = 0.0;
        config.cost_model.fixed_operating_cost = -1.0;
        config.top_n = 0;
        match config.validate() {
            Err(ConfigError::Invalid(issues)) => assert_eq!(issues.len(), 3),
            other => panic!("expected invalid config, got {other:?}"),
        }
    }
}
