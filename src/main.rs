// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{Context, Result};
use opsboard::dashboard::{format_money, format_percent};
use opsboard::logging::init_logging;
use opsboard::workbook::Workbook;
use opsboard::{
    build_dashboard, import_workbook, pl_report, seed_database, AppConfig, SeedOutcome,
    SqliteStore, RUNWAY_UNBOUNDED,
};
use std::env;
use std::path::Path;

const USAGE: &str = "Usage: opsboard [-v] [import <path> | seed | metrics | report]";

fn main() -> Result<()> {
    let mut args: Vec<String> = env::args().skip(1).collect();

    let verbose = args.iter().any(|a| a == "-v" || a == "--verbose");
    args.retain(|a| a != "-v" && a != "--verbose");
    init_logging("warn", verbose);

    let config = AppConfig::load()?;

    match args.first().map(String::as_str) {
        Some("import") => {
            let path = args.get(1).context(USAGE)?;
            run_import(&config, Path::new(path))?;
        }
        Some("seed") => run_seed(&config)?,
        Some("metrics") => run_metrics(&config)?,
        Some("report") => run_report(&config)?,
        Some("help") | Some("-h") | Some("--help") => println!("{}", USAGE),
        Some(other) => {
            eprintln!("❌ Unknown command: {}", other);
            eprintln!("   {}", USAGE);
            std::process::exit(2);
        }
        // UI mode (default)
        None => run_ui_mode(&config)?,
    }

    Ok(())
}

fn open_store(config: &AppConfig) -> Result<SqliteStore> {
    SqliteStore::open(&config.database_path)
}

fn run_import(config: &AppConfig, path: &Path) -> Result<()> {
    println!("📥 Importing workbook: {}", path.display());

    let workbook = Workbook::load(path)?;
    let mut store = open_store(config)?;

    match import_workbook(&workbook, &mut store, &config.import) {
        Ok(summary) => {
            println!("✓ {}", summary.message);
            println!("  Sheets: {}", summary.sheets.join(", "));
            for (category, count) in &summary.results {
                println!("  {:<10} {}", category, count);
            }
            Ok(())
        }
        Err(err) => {
            eprintln!("❌ {}", err);
            std::process::exit(1);
        }
    }
}

fn run_seed(config: &AppConfig) -> Result<()> {
    let mut store = open_store(config)?;

    match seed_database(&mut store)? {
        SeedOutcome::AlreadySeeded { periods } => {
            println!("Database already has data ({} periods), nothing seeded", periods);
        }
        SeedOutcome::Seeded {
            regions,
            periods,
            monthly_rows,
            settings,
        } => {
            println!("🌱 Seeded database at {}", config.database_path.display());
            println!("✓ Regions:      {}", regions);
            println!("✓ Periods:      {}", periods);
            println!("✓ Monthly rows: {}", monthly_rows);
            println!("✓ Settings:     {}", settings);
        }
    }

    Ok(())
}

fn run_metrics(config: &AppConfig) -> Result<()> {
    let store = open_store(config)?;

    let d = match build_dashboard(&store)? {
        Some(d) => d,
        None => {
            println!("No data yet. Run `opsboard seed` or `opsboard import <path>` first.");
            return Ok(());
        }
    };
    let m = &d.metrics;

    println!("📊 {}", d.period.name);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("MRR             {:>14}  ({} MoM)", format_money(d.revenue), format_percent(m.mom_growth_pct));
    println!("Expenses        {:>14}", format_money(d.total_expenses));
    println!("Profit          {:>14}  ({} margin)", format_money(d.profit), format_percent(d.margin_pct));
    println!("Active clients  {:>14}", d.active_clients);
    println!("New clients     {:>14}", d.new_clients);
    println!("Churn rate      {:>14}", format_percent(m.churn_rate_pct));
    println!("ARPU            {:>14}", format_money(m.arpu));
    println!("CAC             {:>14}", format_money(m.cac));
    println!("LTV             {:>14}", format_money(m.ltv));
    println!("LTV/CAC         {:>13.1}x", m.ltv_cac_ratio);
    println!("Cash            {:>14}", format_money(d.cash_balance));
    if m.runway_months >= RUNWAY_UNBOUNDED {
        println!("Runway          {:>14}", "unbounded");
    } else {
        println!("Runway          {:>7} months", m.runway_months);
    }

    println!("\nRevenue by region:");
    for region in &d.revenue_by_region {
        println!("  {:<4} {:<16} {:>12}", region.code, region.name, format_money(region.revenue));
    }

    Ok(())
}

fn run_report(config: &AppConfig) -> Result<()> {
    let store = open_store(config)?;
    let report = pl_report(&store)?;

    println!(
        "{:<16} {:>12} {:>12} {:>12} {:>8} {:>10} {:>12}",
        "Period", "Revenue", "Expenses", "EBITDA", "Margin", "Taxes", "Net"
    );
    for row in &report.rows {
        println!(
            "{:<16} {:>12} {:>12} {:>12} {:>8} {:>10} {:>12}",
            row.period.name,
            format_money(row.total_revenue),
            format_money(row.total_expenses),
            format_money(row.ebitda),
            format_percent(row.ebitda_margin_pct),
            format_money(row.total_taxes),
            format_money(row.net_profit),
        );
    }

    let ytd = &report.ytd;
    println!(
        "{:<16} {:>12} {:>12} {:>12} {:>8} {:>10} {:>12}",
        "YTD",
        format_money(ytd.total_revenue),
        format_money(ytd.total_expenses),
        format_money(ytd.ebitda),
        format_percent(ytd.ebitda_margin_pct),
        format_money(ytd.total_taxes),
        format_money(ytd.net_profit),
    );

    Ok(())
}

#[cfg(feature = "tui")]
fn run_ui_mode(config: &AppConfig) -> Result<()> {
    if !config.database_path.exists() {
        eprintln!("❌ Database not found: {}", config.database_path.display());
        eprintln!("   Run: opsboard seed   or   opsboard import <path>");
        std::process::exit(1);
    }

    let store = open_store(config)?;
    let mut app = ui::App::load(&store)?;
    ui::run_ui(&mut app)?;

    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_config: &AppConfig) -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or use a command: {}", USAGE);
    std::process::exit(1);
}
