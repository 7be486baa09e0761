// Entry point and high-level console flow.
//
// - Option [1] loads a city (reusing the cached snapshot when fresh).
// - Option [2] narrows the analysis to a set of neighborhoods.
// - Option [3] writes the report CSVs and a JSON summary and prints
//   Markdown previews.
// - Option [4] compares mean ROI across every city loaded so far.
use clap::Parser;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use roi_report::aggregate::GroupMetric;
use roi_report::output;
use roi_report::reports;
use roi_report::util::{format_int, format_number, format_opt};
use roi_report::{
    AnalysisConfig, AnalysisError, AnalysisSession, CityRegistry, DatasetCache,
    NeighborhoodSelection, Result,
};

#[derive(Parser)]
#[command(name = "roi_report", about = "Short-term rental ROI explorer")]
struct Cli {
    /// TOML file with cost model and city schema overrides.
    #[arg(long)]
    config: Option<PathBuf>,

    /// City to load on start-up.
    #[arg(long)]
    city: Option<String>,

    /// Directory for exported CSV/JSON reports.
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

// Everything the menu needs, passed around explicitly.
struct App {
    config: AnalysisConfig,
    registry: CityRegistry,
    cache: DatasetCache,
    sessions: Vec<AnalysisSession>,
    current: Option<usize>,
    selection: NeighborhoodSelection,
}

impl App {
    fn new(config: AnalysisConfig) -> Self {
        Self {
            registry: config.registry(),
            cache: DatasetCache::new(config.cache_ttl()),
            sessions: Vec::new(),
            current: None,
            selection: NeighborhoodSelection::All,
            config,
        }
    }

    fn current(&self) -> Option<&AnalysisSession> {
        self.current.and_then(|idx| self.sessions.get(idx))
    }
}

/// Print `label` and read one trimmed line from stdin.
fn prompt(label: &str) -> String {
    print!("{}", label);
    let _ = io::stdout().flush();
    let mut buf = String::new();
    io::stdin().read_line(&mut buf).ok();
    buf.trim().to_string()
}

/// Ask the user whether to go back to the menu after generating reports.
///
/// Returns `true` if the user chose `Y`, `false` if they chose `N`.
fn prompt_back_to_menu() -> bool {
    loop {
        match prompt("Back to Report Selection (Y/N): ").to_uppercase().as_str() {
            "Y" => return true,
            "N" => return false,
            _ => println!("Invalid choice. Please enter Y or N."),
        }
    }
}

/// Handle option [1]: load a city and derive its metrics.
fn handle_load(app: &mut App, city: Option<String>) -> Result<()> {
    let city = match city {
        Some(city) => city,
        None => {
            let names: Vec<&str> = app.registry.names().collect();
            println!("Available cities: {}", names.join(", "));
            prompt("City: ")
        }
    };
    let schema = app.registry.get(&city)?.clone();
    let (session, report) = AnalysisSession::open(
        &mut app.cache,
        &schema,
        &app.config.data_dir,
        app.config.cost_model,
    )?;

    println!(
        "Processing dataset... ({} rows read, {} unreadable)",
        format_int(report.total_rows),
        format_int(report.parse_errors)
    );
    if report.missing_price > 0 || report.missing_days > 0 {
        println!(
            "Note: {} listings lack a price and {} lack occupancy; they carry no ROI.",
            format_int(report.missing_price),
            format_int(report.missing_days)
        );
    }
    let baseline = session.baseline();
    println!(
        "Estimated property value: {} ({} x {} m2, from {})\n",
        format_number(baseline.value, 2),
        format_number(baseline.price_per_sqm(), 2),
        format_number(baseline.assumed_unit_size_sqm, 0),
        baseline.describe()
    );

    let idx = match app
        .sessions
        .iter()
        .position(|s| s.city() == session.city())
    {
        Some(idx) => {
            app.sessions[idx] = session;
            idx
        }
        None => {
            app.sessions.push(session);
            app.sessions.len() - 1
        }
    };
    app.current = Some(idx);
    app.selection = NeighborhoodSelection::All;
    Ok(())
}

/// Handle option [2]: pick neighborhoods by number (blank keeps all).
fn handle_filter(app: &mut App) {
    let Some(session) = app.current() else {
        println!("Error: No city loaded. Please load a city first (option 1).\n");
        return;
    };
    let names = session.neighborhoods();
    for (idx, name) in names.iter().enumerate() {
        println!("[{}] {}", idx + 1, name);
    }
    let raw = prompt("Neighborhoods (comma-separated numbers, blank for all): ");
    if raw.is_empty() || raw.eq_ignore_ascii_case("all") {
        app.selection = NeighborhoodSelection::All;
        println!("Showing all neighborhoods.\n");
        return;
    }

    let picked: Vec<String> = raw
        .split(',')
        .filter_map(|part| part.trim().parse::<usize>().ok())
        .filter_map(|n| n.checked_sub(1).and_then(|i| names.get(i)).cloned())
        .collect();
    if picked.is_empty() {
        println!("No valid neighborhoods selected; keeping the previous filter.\n");
        return;
    }
    println!("Selected {} neighborhoods.\n", picked.len());
    app.selection = NeighborhoodSelection::only(picked);
}

/// Handle option [3]: generate all reports and the JSON summary.
fn handle_generate_reports(app: &App) -> Result<()> {
    let Some(session) = app.current() else {
        println!("Error: No city loaded. Please load a city first (option 1).\n");
        return Ok(());
    };
    let view = session.select(&app.selection);
    if view.is_empty() {
        println!("No data for the selected neighborhoods.\n");
        return Ok(());
    }
    let top_n = app.config.top_n;
    let out_dir = &app.config.output_dir;
    std::fs::create_dir_all(out_dir).map_err(|e| AnalysisError::io(out_dir, e))?;
    let city = session.city();

    println!("Generating reports...\n");

    let summary_row = vec![reports::city_summary(&view)];
    let file = out_dir.join(format!("{city}_summary.csv"));
    output::write_csv(&file, &summary_row)?;
    output::preview_table("City Summary", None, &summary_row, 1);

    for (metric, stem) in [
        (GroupMetric::NetRoiPct, "net_roi_ranking"),
        (GroupMetric::GrossRoiPct, "gross_roi_ranking"),
    ] {
        let ranking = reports::neighborhood_ranking(&view, metric, top_n);
        let file = out_dir.join(format!("{city}_{stem}.csv"));
        output::write_csv(&file, &ranking)?;
        output::preview_table(
            &format!("Top {top_n} Neighborhoods by {}", metric.label()),
            Some(format!("Full table exported to {}", file.display()).as_str()),
            &ranking,
            5,
        );
    }

    let distributions: Vec<_> = [
        GroupMetric::NightlyPrice,
        GroupMetric::GrossRoiPct,
        GroupMetric::NetRoiPct,
    ]
    .into_iter()
    .map(|metric| reports::metric_distribution(&view, metric))
    .collect();
    output::write_csv(&out_dir.join(format!("{city}_distributions.csv")), &distributions)?;
    output::preview_table("Price and ROI Distribution", None, &distributions, 3);

    let price_roi = reports::price_vs_net_roi(&view, top_n);
    output::write_csv(&out_dir.join(format!("{city}_price_vs_net_roi.csv")), &price_roi)?;
    output::preview_table("Mean Nightly Price vs Net ROI", None, &price_roi, 5);

    let occupancy = reports::neighborhood_ranking(&view, GroupMetric::DaysRented, top_n);
    output::write_csv(&out_dir.join(format!("{city}_occupancy.csv")), &occupancy)?;
    output::preview_table(
        &format!("Top {top_n} Neighborhoods by {}", GroupMetric::DaysRented.label()),
        None,
        &occupancy,
        5,
    );

    let rooms = reports::room_type_breakdown(&view);
    output::write_csv(&out_dir.join(format!("{city}_room_types.csv")), &rooms)?;
    output::preview_table("Listings by Room Type", None, &rooms, 10);

    let competition = reports::neighborhood_ranking(&view, GroupMetric::Count, top_n);
    output::write_csv(&out_dir.join(format!("{city}_competition.csv")), &competition)?;
    output::preview_table("Most Competitive Neighborhoods (listings)", None, &competition, 5);

    let active = reports::active_competition(&view, top_n);
    output::write_csv(&out_dir.join(format!("{city}_active_listings.csv")), &active)?;
    output::preview_table(
        "Most Active Neighborhoods",
        Some(
            format!(
                "listings rented more than {} nights a year",
                session.active_days_threshold()
            )
            .as_str(),
        ),
        &active,
        5,
    );

    let reviews = reports::neighborhood_ranking(&view, GroupMetric::ReviewsTotal, top_n);
    output::write_csv(&out_dir.join(format!("{city}_reviews.csv")), &reviews)?;
    output::preview_table("Demand by Reviews", None, &reviews, 5);

    let amenities = reports::neighborhood_ranking(&view, GroupMetric::AmenityCount, top_n);
    output::write_csv(&out_dir.join(format!("{city}_amenities.csv")), &amenities)?;
    output::preview_table("Mean Amenities per Listing", None, &amenities, 5);

    let sizes = reports::bedrooms_and_bathrooms(&view, top_n);
    output::write_csv(&out_dir.join(format!("{city}_bedrooms_bathrooms.csv")), &sizes)?;
    output::preview_table("Mean Bedrooms and Bathrooms per Listing", None, &sizes, 5);

    let comparables = reports::comparable_price_ranking(session, top_n);
    output::write_csv(&out_dir.join(format!("{city}_purchase_prices.csv")), &comparables)?;
    output::preview_table("Most Expensive Neighborhoods (price per m2)", None, &comparables, 5);

    let crime = reports::crime_trends(session);
    output::write_csv(&out_dir.join(format!("{city}_crime.csv")), &crime)?;
    output::preview_table("Reported Crime by Year and Type", None, &crime, 10);

    let summary = reports::generate_summary(&view);
    let file = out_dir.join(format!("{city}_summary.json"));
    output::write_json(&file, &summary)?;
    println!("Summary Stats ({}):", file.display());
    println!(
        "{{\"avg_gross_roi_pct\": {}, \"avg_net_roi_pct\": {}}}\n",
        format_opt(summary.avg_gross_roi_pct, 2),
        format_opt(summary.avg_net_roi_pct, 2)
    );
    Ok(())
}

/// Handle option [4]: mean ROI of every loaded city.
fn handle_compare(app: &App) -> Result<()> {
    if app.sessions.is_empty() {
        println!("Error: No city loaded. Please load a city first (option 1).\n");
        return Ok(());
    }
    let rows = reports::city_comparison(&app.sessions);
    output::write_csv(&app.config.output_dir.join("city_comparison.csv"), &rows)?;
    output::preview_table("Mean ROI by City", None, &rows, rows.len());
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let mut config = match AnalysisConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(dir) = cli.output_dir {
        config.output_dir = dir;
    }
    if let Err(e) = roi_report::telemetry::init(&config.log_level) {
        eprintln!("{}", e);
        return ExitCode::FAILURE;
    }

    let mut app = App::new(config);
    if let Some(city) = cli.city {
        if let Err(e) = handle_load(&mut app, Some(city)) {
            eprintln!("Failed to load city: {}\n", e);
        }
    }

    loop {
        println!("Select an option:");
        println!("[1] Load a city");
        println!("[2] Filter neighborhoods");
        println!("[3] Generate reports");
        println!("[4] Compare loaded cities");
        println!("[5] Exit\n");
        match prompt("Enter choice: ").as_str() {
            "1" => {
                if let Err(e) = handle_load(&mut app, None) {
                    eprintln!("Failed to load city: {}\n", e);
                }
            }
            "2" => handle_filter(&mut app),
            "3" => {
                println!();
                if let Err(e) = handle_generate_reports(&app) {
                    eprintln!("Report error: {}\n", e);
                }
                if !prompt_back_to_menu() {
                    println!("Exiting the program.");
                    break;
                }
            }
            "4" => {
                if let Err(e) = handle_compare(&app) {
                    eprintln!("Report error: {}\n", e);
                }
            }
            "5" => {
                println!("Exiting the program.");
                break;
            }
            _ => println!("Invalid choice. Please enter a number from 1 to 5.\n"),
        }
    }
    ExitCode::SUCCESS
}
