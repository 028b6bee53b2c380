// 📊 Dashboard - KPIs for the latest period
// Totals are summed across regions, then run through the metrics calculator.

use crate::metrics::{profit_margin, DerivedMetrics, MetricInputs};
use crate::models::{MonthlyAggregate, Period, CASH_BALANCE_KEY};
use crate::store::MonthlyStore;
use crate::workbook::parse_numeric_text;
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Share of expenses assumed as burn when revenue covers costs
pub const FALLBACK_BURN_SHARE: f64 = 0.3;

/// Sums of one period's monthly rows
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeriodTotals {
    pub revenue: f64,
    pub active_clients: i64,
    pub new_clients: i64,
    pub churned_clients: i64,
    pub salary: f64,
    pub marketing: f64,
    pub office: f64,
    pub software: f64,
    pub other: f64,
}

impl PeriodTotals {
    pub fn from_rows(rows: &[MonthlyAggregate]) -> Self {
        rows.iter().fold(PeriodTotals::default(), |mut acc, row| {
            acc.revenue += row.revenue;
            acc.active_clients += row.active_clients;
            acc.new_clients += row.new_clients;
            acc.churned_clients += row.churned_clients;
            acc.salary += row.salary_expense;
            acc.marketing += row.marketing_expense;
            acc.office += row.office_expense;
            acc.software += row.software_expense;
            acc.other += row.other_expense;
            acc
        })
    }

    pub fn expenses(&self) -> f64 {
        self.salary + self.marketing + self.office + self.software + self.other
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionRevenue {
    pub code: String,
    pub name: String,
    pub color: String,
    pub revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub period: Period,
    pub previous_period: Option<Period>,
    pub revenue: f64,
    pub previous_revenue: f64,
    pub total_expenses: f64,
    pub profit: f64,
    pub margin_pct: f64,
    pub active_clients: i64,
    pub new_clients: i64,
    pub churned_clients: i64,
    pub cash_balance: f64,
    pub burn_rate: f64,
    pub metrics: DerivedMetrics,
    pub revenue_by_region: Vec<RegionRevenue>,
}

/// `cash_balance` setting as a number; missing or unparseable is 0
pub fn cash_balance(store: &dyn MonthlyStore) -> Result<f64> {
    Ok(store
        .read_setting(CASH_BALANCE_KEY)?
        .map(|setting| parse_numeric_text(&setting.value))
        .unwrap_or(0.0))
}

/// Dashboard for the latest period, `None` when no periods exist
pub fn build_dashboard(store: &dyn MonthlyStore) -> Result<Option<DashboardSummary>> {
    let mut periods = store.list_periods()?;
    let period = match periods.pop() {
        Some(period) => period,
        None => return Ok(None),
    };
    let previous_period = periods.pop();

    let rows = store.monthly_for_period(period.id)?;
    let current = PeriodTotals::from_rows(&rows);
    let previous = match &previous_period {
        Some(p) => PeriodTotals::from_rows(&store.monthly_for_period(p.id)?),
        None => PeriodTotals::default(),
    };

    let expenses = current.expenses();
    let profit = current.revenue - expenses;
    let cash = cash_balance(store)?;

    let burn_rate = expenses - current.revenue;
    let effective_burn = if burn_rate > 0.0 {
        burn_rate
    } else {
        expenses * FALLBACK_BURN_SHARE
    };

    let metrics = DerivedMetrics::compute(&MetricInputs {
        revenue: current.revenue,
        previous_revenue: previous.revenue,
        active_clients: current.active_clients,
        starting_clients: previous.active_clients,
        new_clients: current.new_clients,
        churned_clients: current.churned_clients,
        marketing_spend: current.marketing,
        cash_balance: cash,
        burn_rate: effective_burn,
    });

    let regions = store.list_regions()?;
    let mut revenue_by_region: Vec<RegionRevenue> = rows
        .iter()
        .filter_map(|row| {
            regions
                .iter()
                .find(|r| r.id == row.region_id)
                .map(|region| RegionRevenue {
                    code: region.code.clone(),
                    name: region.name.clone(),
                    color: region.color.clone(),
                    revenue: row.revenue,
                })
        })
        .collect();
    revenue_by_region.sort_by(|a, b| b.revenue.total_cmp(&a.revenue));

    Ok(Some(DashboardSummary {
        period,
        previous_period,
        revenue: current.revenue,
        previous_revenue: previous.revenue,
        total_expenses: expenses,
        profit,
        margin_pct: profit_margin(profit, current.revenue),
        active_clients: current.active_clients,
        new_clients: current.new_clients,
        churned_clients: current.churned_clients,
        cash_balance: cash,
        burn_rate,
        metrics,
        revenue_by_region,
    }))
}

/// Whole-dollar amount with thousands separators, e.g. `$28,098` or `-$3,500`
pub fn format_money(value: f64) -> String {
    let rounded = if value.is_finite() { value.round() } else { 0.0 };
    let digits = format!("{}", rounded.abs() as i64);

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    if rounded < 0.0 {
        format!("-${}", grouped)
    } else {
        format!("${}", grouped)
    }
}

pub fn format_percent(value: f64) -> String {
    format!("{:.1}%", value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::RUNWAY_UNBOUNDED;
    use crate::models::{AggregateField, MonthlyPatch, RegionSeed, YearMonth};
    use crate::store::MemoryStore;

    fn patch(revenue: f64, clients: f64, new: f64, churned: f64, salary: f64, marketing: f64) -> MonthlyPatch {
        MonthlyPatch::new()
            .with(AggregateField::Revenue, revenue)
            .with(AggregateField::ActiveClients, clients)
            .with(AggregateField::NewClients, new)
            .with(AggregateField::ChurnedClients, churned)
            .with(AggregateField::Salary, salary)
            .with(AggregateField::Marketing, marketing)
    }

    fn two_month_store() -> MemoryStore {
        let mut store = MemoryStore::new();
        let uz = store
            .upsert_region(&RegionSeed::new("uz", "Uzbekistan", "UZS", "#3B82F6"))
            .unwrap();
        let kz = store
            .upsert_region(&RegionSeed::new("kz", "Kazakhstan", "KZT", "#10B981"))
            .unwrap();
        let oct = store.upsert_period(YearMonth::new(2025, 10)).unwrap();
        let nov = store.upsert_period(YearMonth::new(2025, 11)).unwrap();

        store
            .upsert_monthly_aggregate(uz.id, oct.id, &patch(8_000.0, 80.0, 0.0, 0.0, 0.0, 0.0))
            .unwrap();
        store
            .upsert_monthly_aggregate(kz.id, oct.id, &patch(2_000.0, 15.0, 0.0, 0.0, 0.0, 0.0))
            .unwrap();
        store
            .upsert_monthly_aggregate(uz.id, nov.id, &patch(6_000.0, 60.0, 3.0, 5.0, 9_000.0, 1_200.0))
            .unwrap();
        store
            .upsert_monthly_aggregate(kz.id, nov.id, &patch(5_000.0, 40.0, 2.0, 0.0, 4_000.0, 300.0))
            .unwrap();
        store
    }

    #[test]
    fn test_empty_store_has_no_dashboard() {
        let store = MemoryStore::new();
        assert!(build_dashboard(&store).unwrap().is_none());
    }

    #[test]
    fn test_dashboard_totals_and_metrics() {
        let mut store = two_month_store();
        store.write_setting(CASH_BALANCE_KEY, "60000", None).unwrap();

        let summary = build_dashboard(&store).unwrap().unwrap();

        assert_eq!(summary.period.year_month(), YearMonth::new(2025, 11));
        assert_eq!(summary.revenue, 11_000.0);
        assert_eq!(summary.previous_revenue, 10_000.0);
        assert_eq!(summary.total_expenses, 14_500.0);
        assert_eq!(summary.profit, -3_500.0);
        assert_eq!(summary.burn_rate, 3_500.0);
        assert_eq!(summary.active_clients, 100);

        assert_eq!(summary.metrics.arpu, 110.0);
        assert_eq!(summary.metrics.cac, 300.0);
        // 5 churned of (95 previous + 5 new)
        assert_eq!(summary.metrics.churn_rate_pct, 5.0);
        assert!((summary.metrics.mom_growth_pct - 10.0).abs() < 1e-9);
        assert_eq!(summary.metrics.runway_months, 17);

        let codes: Vec<_> = summary.revenue_by_region.iter().map(|r| r.code.as_str()).collect();
        assert_eq!(codes, vec!["uz", "kz"]);
    }

    #[test]
    fn test_runway_falls_back_to_share_of_expenses() {
        let mut store = MemoryStore::new();
        let uz = store
            .upsert_region(&RegionSeed::new("uz", "Uzbekistan", "UZS", "#3B82F6"))
            .unwrap();
        let nov = store.upsert_period(YearMonth::new(2025, 11)).unwrap();
        store
            .upsert_monthly_aggregate(uz.id, nov.id, &patch(20_000.0, 100.0, 0.0, 0.0, 10_000.0, 0.0))
            .unwrap();
        store.write_setting(CASH_BALANCE_KEY, "365000", None).unwrap();

        let summary = build_dashboard(&store).unwrap().unwrap();

        // burn = 10_000 * 0.3
        assert_eq!(summary.metrics.runway_months, 121);
        assert!(summary.previous_period.is_none());
        assert_eq!(summary.metrics.mom_growth_pct, 0.0);
    }

    #[test]
    fn test_no_expenses_is_unbounded_runway() {
        let mut store = MemoryStore::new();
        store.upsert_period(YearMonth::new(2025, 11)).unwrap();

        let summary = build_dashboard(&store).unwrap().unwrap();
        assert_eq!(summary.metrics.runway_months, RUNWAY_UNBOUNDED);
        assert_eq!(summary.metrics.ltv, 0.0);
    }

    #[test]
    fn test_cash_balance_parsing() {
        let mut store = MemoryStore::new();
        assert_eq!(cash_balance(&store).unwrap(), 0.0);

        store.write_setting(CASH_BALANCE_KEY, "365,000", None).unwrap();
        assert_eq!(cash_balance(&store).unwrap(), 365_000.0);

        store.write_setting(CASH_BALANCE_KEY, "unknown", None).unwrap();
        assert_eq!(cash_balance(&store).unwrap(), 0.0);
    }

    #[test]
    fn test_format_money() {
        assert_eq!(format_money(28_098.0), "$28,098");
        assert_eq!(format_money(-3_500.4), "-$3,500");
        assert_eq!(format_money(999.0), "$999");
        assert_eq!(format_money(1_234_567.0), "$1,234,567");
        assert_eq!(format_money(f64::NAN), "$0");
        assert_eq!(format_percent(12.345), "12.3%");
    }
}
