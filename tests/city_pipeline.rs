use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use roi_report::aggregate::{GroupKey, GroupMetric};
use roi_report::metrics::BaselineSource;
use roi_report::schema::{CitySchema, ComparableSource, ListingColumnNames};
use roi_report::{
    aggregate_by_group, AnalysisConfig, AnalysisError, AnalysisSession, CityRegistry, CostModel,
    DatasetCache, NeighborhoodSelection,
};

/// Per-test data directory, removed when the test finishes.
struct TempDataDir(PathBuf);

impl TempDataDir {
    fn new(test: &str) -> Self {
        let dir = std::env::temp_dir().join(format!("roi_report_{}_{}", test, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).expect("create temp data dir");
        Self(dir)
    }

    fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for TempDataDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.0);
    }
}

/// Log lines written by a scoped subscriber.
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn contents(&self) -> String {
        let bytes = self.0.lock().expect("log buffer").clone();
        String::from_utf8(bytes).expect("utf-8 logs")
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().expect("log buffer").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn with_captured_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .finish();
    let out = tracing::subscriber::with_default(subscriber, f);
    (out, logs.contents())
}

fn valencia() -> CitySchema {
    CityRegistry::new(&[])
        .get("valencia")
        .expect("builtin valencia")
        .clone()
}

const VALENCIA_LISTINGS: &str = "\
id,neighbourhood,price,days_rented,room_type,number_of_reviews
a,A,100,200,Entire home/apt,10
b,B,50,100,Private room,4
";

#[test]
fn scenario_end_to_end() {
    let data = TempDataDir::new("scenario");
    let dir = data.path();
    fs::write(dir.join("Valencia_limpio.csv"), VALENCIA_LISTINGS).expect("write listings");
    fs::write(
        dir.join("valencia_vivienda_limpio.csv"),
        "neighbourhood,precio\nA,2000\n",
    )
    .expect("write comparables");

    let mut cache = DatasetCache::new(Duration::from_secs(3600));
    let (session, report) =
        AnalysisSession::open(&mut cache, &valencia(), dir, CostModel::default())
            .expect("city loads");
    assert_eq!(report.total_rows, 2);
    assert_eq!(report.comparables, 1);
    assert_eq!(session.baseline().value, 140000.0);

    let a = &session.rows()[0].metrics;
    assert_eq!(a.annual_income, Some(20000.0));
    assert_eq!(a.net_annual_income, Some(17000.0));
    assert!((a.gross_roi_pct.expect("gross roi") - 14.285714).abs() < 1e-5);

    let ranked = aggregate_by_group(
        session.rows(),
        GroupKey::Neighborhood,
        GroupMetric::NetRoiPct,
        2,
    );
    assert_eq!(ranked[0].group, "A");
    assert!((ranked[0].value - 12.142857).abs() < 1e-5);
    assert_eq!(ranked[1].group, "B");
    assert!((ranked[1].value - 1.428571).abs() < 1e-5);
}

#[test]
fn missing_comparables_fall_back_to_configured_price() {
    let data = TempDataDir::new("fallback");
    let dir = data.path();
    fs::write(dir.join("Valencia_limpio.csv"), VALENCIA_LISTINGS).expect("write listings");

    let cost_model = CostModel {
        fallback_price_per_sqm: 2500.0,
        ..CostModel::default()
    };
    let mut cache = DatasetCache::new(Duration::from_secs(3600));
    let (opened, logs) =
        with_captured_logs(|| AnalysisSession::open(&mut cache, &valencia(), dir, cost_model));
    let (session, report) = opened.expect("city loads");
    assert!(logs.contains("optional data file not found"));
    assert!(logs.contains("no comparable sales available"));
    assert!(logs.contains("WARN"));
    assert_eq!(report.comparables, 0);
    assert_eq!(session.baseline().value, 2500.0 * 70.0);
    assert_eq!(
        session.baseline().source,
        BaselineSource::Fallback {
            price_per_sqm: 2500.0
        }
    );
}

#[test]
fn cache_reuses_snapshot_until_file_changes() {
    let data = TempDataDir::new("cache");
    let dir = data.path();
    let listings = dir.join("Valencia_limpio.csv");
    fs::write(&listings, VALENCIA_LISTINGS).expect("write listings");

    let mut cache = DatasetCache::new(Duration::from_secs(3600));
    let (first, _) = cache.get_or_load(&valencia(), dir).expect("first load");
    let (second, _) = cache.get_or_load(&valencia(), dir).expect("second load");
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(cache.stats().hits, 1);
    assert_eq!(cache.stats().misses, 1);

    // A different size changes the file identity.
    fs::write(
        &listings,
        format!("{VALENCIA_LISTINGS}c,C,70,30,Private room,1\n"),
    )
    .expect("rewrite listings");
    let (third, _) = cache.get_or_load(&valencia(), dir).expect("reload");
    assert!(!Arc::ptr_eq(&first, &third));
    assert_eq!(third.listings.len(), 3);
    assert_eq!(cache.len(), 1);
}

#[test]
fn edited_comparables_reload_baseline() {
    let data = TempDataDir::new("comparables_edit");
    let dir = data.path();
    fs::write(dir.join("Valencia_limpio.csv"), VALENCIA_LISTINGS).expect("write listings");
    let comparables = dir.join("valencia_vivienda_limpio.csv");
    fs::write(&comparables, "neighbourhood,precio\nA,2000\n").expect("write comparables");

    let mut cache = DatasetCache::new(Duration::from_secs(3600));
    let (before, _) = AnalysisSession::open(&mut cache, &valencia(), dir, CostModel::default())
        .expect("city loads");
    assert_eq!(before.baseline().value, 140000.0);

    fs::write(&comparables, "neighbourhood,precio\nA,4000\nB,4000\n")
        .expect("rewrite comparables");
    let (after, _) = AnalysisSession::open(&mut cache, &valencia(), dir, CostModel::default())
        .expect("city reloads");
    assert_eq!(after.baseline().value, 280000.0);
    assert_eq!(cache.stats().misses, 2);

    // Removing an optional table also counts as a change.
    fs::remove_file(&comparables).expect("remove comparables");
    let (fallback, _) = AnalysisSession::open(&mut cache, &valencia(), dir, CostModel::default())
        .expect("city reloads");
    assert!(fallback.baseline().is_fallback());
    assert_eq!(cache.stats().misses, 3);
    assert_eq!(cache.len(), 1);
}

#[test]
fn expired_entries_are_reloaded() {
    let data = TempDataDir::new("ttl");
    let dir = data.path();
    fs::write(dir.join("Valencia_limpio.csv"), VALENCIA_LISTINGS).expect("write listings");

    let mut cache = DatasetCache::new(Duration::ZERO);
    let (first, _) = cache.get_or_load(&valencia(), dir).expect("first load");
    let (second, _) = cache.get_or_load(&valencia(), dir).expect("second load");
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(cache.stats().misses, 2);

    cache.invalidate("VALENCIA");
    assert!(cache.is_empty());
}

#[test]
fn filtering_reuses_citywide_values() {
    let data = TempDataDir::new("filter");
    let dir = data.path();
    fs::write(dir.join("Valencia_limpio.csv"), VALENCIA_LISTINGS).expect("write listings");
    fs::write(
        dir.join("valencia_vivienda_limpio.csv"),
        "neighbourhood,precio\nA,4000\nB,1000\n",
    )
    .expect("write comparables");

    let mut cache = DatasetCache::new(Duration::from_secs(3600));
    let (session, _) = AnalysisSession::open(&mut cache, &valencia(), dir, CostModel::default())
        .expect("city loads");
    let citywide = session.rows()[1].metrics;

    let view = session.select(&NeighborhoodSelection::only(["B"]));
    assert_eq!(view.len(), 1);
    assert_eq!(view.rows()[0].metrics, citywide);
    assert_eq!(session.baseline().value, 2500.0 * 70.0);
}

#[test]
fn negative_price_fails_with_validation_error() {
    let data = TempDataDir::new("negative");
    let dir = data.path();
    fs::write(
        dir.join("Valencia_limpio.csv"),
        "id,neighbourhood,price,days_rented\nbad,A,-10,100\n",
    )
    .expect("write listings");

    let mut cache = DatasetCache::new(Duration::from_secs(3600));
    let err = AnalysisSession::open(&mut cache, &valencia(), dir, CostModel::default())
        .expect_err("negative price rejected");
    match err {
        AnalysisError::Validation(v) => {
            assert_eq!(v.record, "bad");
            assert_eq!(v.field, "nightly_price");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn missing_listings_file_is_an_io_error() {
    let data = TempDataDir::new("missing");
    let dir = data.path();
    let mut cache = DatasetCache::new(Duration::from_secs(3600));
    let err = cache
        .get_or_load(&valencia(), dir)
        .expect_err("no listings file");
    assert!(matches!(err, AnalysisError::Io { .. }));
}

#[test]
fn configured_city_with_renamed_columns() {
    let data = TempDataDir::new("custom_city");
    let dir = data.path();
    fs::write(
        dir.join("sevilla.csv"),
        "barrio,precio_noche,noches\nTriana,90,120\nSanta Cruz,110,200\n",
    )
    .expect("write listings");

    let raw = format!(
        r#"
            data_dir = "{}"

            [[cities]]
            name = "sevilla"
            listings_file = "sevilla.csv"

            [cities.columns]
            neighborhood = "barrio"
            nightly_price = "precio_noche"
            days_rented = "noches"
        "#,
        dir.display()
    );
    let config: AnalysisConfig = toml::from_str(&raw).expect("valid toml");
    config.validate().expect("valid config");

    let schema = config.registry().get("sevilla").expect("configured").clone();
    let mut cache = DatasetCache::new(config.cache_ttl());
    let (session, _) =
        AnalysisSession::open(&mut cache, &schema, &config.data_dir, config.cost_model)
            .expect("city loads");
    assert_eq!(session.neighborhoods(), ["Santa Cruz", "Triana"]);
    assert!(session.baseline().is_fallback());
    let top = aggregate_by_group(
        session.rows(),
        GroupKey::Neighborhood,
        GroupMetric::GrossRoiPct,
        1,
    );
    assert_eq!(top[0].group, "Santa Cruz");
}

#[test]
fn listings_column_comparables_feed_baseline() {
    let data = TempDataDir::new("listing_comparables");
    let dir = data.path();
    let schema = CitySchema {
        name: "malaga".into(),
        listings_file: "malaga.csv".into(),
        columns: ListingColumnNames {
            days_rented: "estimated_occupancy_l365d".into(),
            ..ListingColumnNames::default()
        },
        active_days_threshold: 150,
        comparables: ComparableSource::ListingsColumn {
            price_column: "price_per_m2".into(),
        },
        crime: None,
    };
    fs::write(
        dir.join("malaga.csv"),
        "neighbourhood,price,estimated_occupancy_l365d,price_per_m2\nCentro,120,180,3000\nEste,90,150,4000\n",
    )
    .expect("write listings");

    let mut cache = DatasetCache::new(Duration::from_secs(60));
    let (session, _) = AnalysisSession::open(&mut cache, &schema, dir, CostModel::default())
        .expect("city loads");
    assert_eq!(session.baseline().value, 3500.0 * 70.0);
    assert_eq!(session.all().active_by_neighborhood(15).len(), 1);
}
