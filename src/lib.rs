// Opsboard - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod config;
pub mod dashboard;
pub mod db;
pub mod entry;
pub mod excel;
pub mod importer;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod reports;
pub mod rules;
pub mod seed;
pub mod store;
pub mod workbook;

// Re-export commonly used types
pub use config::AppConfig;
pub use dashboard::{build_dashboard, cash_balance, DashboardSummary, PeriodTotals, RegionRevenue};
pub use db::SqliteStore;
pub use entry::{record_expenses, record_sales, EntryError, ExpenseEntry, SalesEntry};
pub use importer::{
    import_workbook, ImportConfig, ImportError, ImportSummary, PeriodColumn, RegionLabel,
};
pub use metrics::{
    average_revenue_per_user, churn_rate, customer_acquisition_cost, lifetime_value,
    ltv_cac_ratio, month_over_month_growth, payback_months, profit_margin, runway_months,
    DerivedMetrics, MetricInputs, FALLBACK_LIFETIME_MONTHS, RUNWAY_UNBOUNDED,
};
pub use models::{
    AggregateField, Event, MonthlyAggregate, MonthlyPatch, Period, Region, RegionSeed, Setting,
    YearMonth,
};
pub use reports::{
    cash_flow_report, pl_report, plan_fact_report, unit_economics, CashFlowReport, CashFlowRow,
    PlReport, PlRow, PlanFactReport, PlanFactRow, UnitEconomicsRow,
};
pub use rules::{KeywordRule, RuleEngine};
pub use seed::{seed_database, SeedOutcome};
pub use store::{MemoryStore, MonthlyStore};
pub use workbook::{parse_cell_number, CellValue, Sheet, Workbook, WorkbookSource};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
