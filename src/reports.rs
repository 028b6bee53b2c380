// 🧾 Reports - P&L, unit economics, cash flow and plan-fact

use crate::dashboard::PeriodTotals;
use crate::metrics::{
    average_revenue_per_user, churn_rate, customer_acquisition_cost, lifetime_value,
    ltv_cac_ratio, month_over_month_growth, payback_months, profit_margin,
};
use crate::models::{MonthlyAggregate, Period, Region};
use crate::workbook::parse_numeric_text;
use crate::store::MonthlyStore;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Turnover tax on positive EBITDA
pub const TURNOVER_TAX_RATE: f64 = 0.03;
/// IT-park residency fee on positive EBITDA
pub const IT_PARK_FEE_RATE: f64 = 0.01;
/// Social contribution on salary expense
pub const SOCIAL_CONTRIBUTION_RATE: f64 = 0.12;

// ============================================================================
// P&L
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpenseBreakdown {
    pub salary: f64,
    pub marketing: f64,
    pub office: f64,
    pub software: f64,
    pub other: f64,
}

impl ExpenseBreakdown {
    pub fn total(&self) -> f64 {
        self.salary + self.marketing + self.office + self.software + self.other
    }

    fn add(&mut self, other: &ExpenseBreakdown) {
        self.salary += other.salary;
        self.marketing += other.marketing;
        self.office += other.office;
        self.software += other.software;
        self.other += other.other;
    }
}

impl From<&PeriodTotals> for ExpenseBreakdown {
    fn from(totals: &PeriodTotals) -> Self {
        ExpenseBreakdown {
            salary: totals.salary,
            marketing: totals.marketing,
            office: totals.office,
            software: totals.software,
            other: totals.other,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TaxBreakdown {
    pub turnover: f64,
    pub it_park: f64,
    pub social: f64,
}

impl TaxBreakdown {
    pub fn assess(ebitda: f64, salary: f64) -> Self {
        let taxable = if ebitda > 0.0 { ebitda } else { 0.0 };
        TaxBreakdown {
            turnover: taxable * TURNOVER_TAX_RATE,
            it_park: taxable * IT_PARK_FEE_RATE,
            social: salary * SOCIAL_CONTRIBUTION_RATE,
        }
    }

    pub fn total(&self) -> f64 {
        self.turnover + self.it_park + self.social
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlRow {
    pub period: Period,
    pub revenue_by_region: BTreeMap<String, f64>,
    pub total_revenue: f64,
    pub expenses: ExpenseBreakdown,
    pub total_expenses: f64,
    pub expense_pct: f64,
    pub ebitda: f64,
    pub ebitda_margin_pct: f64,
    pub taxes: TaxBreakdown,
    pub total_taxes: f64,
    pub net_profit: f64,
    pub net_margin_pct: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlTotals {
    pub total_revenue: f64,
    pub expenses: ExpenseBreakdown,
    pub total_expenses: f64,
    pub ebitda: f64,
    pub ebitda_margin_pct: f64,
    pub taxes: TaxBreakdown,
    pub total_taxes: f64,
    pub net_profit: f64,
    pub net_margin_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlReport {
    pub rows: Vec<PlRow>,
    pub ytd: PlTotals,
}

fn revenue_by_region(
    rows: &[MonthlyAggregate],
    regions: &[Region],
) -> BTreeMap<String, f64> {
    let mut by_region = BTreeMap::new();
    for row in rows {
        if let Some(region) = regions.iter().find(|r| r.id == row.region_id) {
            *by_region.entry(region.code.clone()).or_insert(0.0) += row.revenue;
        }
    }
    by_region
}

fn pl_row(period: Period, store: &dyn MonthlyStore, regions: &[Region]) -> Result<PlRow> {
    let rows = store.monthly_for_period(period.id)?;
    let totals = PeriodTotals::from_rows(&rows);

    let expenses = ExpenseBreakdown::from(&totals);
    let total_expenses = expenses.total();
    let ebitda = totals.revenue - total_expenses;
    let taxes = TaxBreakdown::assess(ebitda, expenses.salary);
    let total_taxes = taxes.total();
    let net_profit = ebitda - total_taxes;

    Ok(PlRow {
        revenue_by_region: revenue_by_region(&rows, regions),
        total_revenue: totals.revenue,
        expenses,
        total_expenses,
        expense_pct: profit_margin(total_expenses, totals.revenue),
        ebitda,
        ebitda_margin_pct: profit_margin(ebitda, totals.revenue),
        taxes,
        total_taxes,
        net_profit,
        net_margin_pct: profit_margin(net_profit, totals.revenue),
        period,
    })
}

/// P&L per period in chronological order, with year-to-date totals
pub fn pl_report(store: &dyn MonthlyStore) -> Result<PlReport> {
    let regions = store.list_regions()?;
    let rows = store
        .list_periods()?
        .into_iter()
        .map(|period| pl_row(period, store, &regions))
        .collect::<Result<Vec<_>>>()?;

    let mut ytd = PlTotals::default();
    for row in &rows {
        ytd.total_revenue += row.total_revenue;
        ytd.expenses.add(&row.expenses);
        ytd.total_expenses += row.total_expenses;
        ytd.ebitda += row.ebitda;
        ytd.taxes.turnover += row.taxes.turnover;
        ytd.taxes.it_park += row.taxes.it_park;
        ytd.taxes.social += row.taxes.social;
        ytd.total_taxes += row.total_taxes;
        ytd.net_profit += row.net_profit;
    }
    ytd.ebitda_margin_pct = profit_margin(ytd.ebitda, ytd.total_revenue);
    ytd.net_margin_pct = profit_margin(ytd.net_profit, ytd.total_revenue);

    Ok(PlReport { rows, ytd })
}

// ============================================================================
// UNIT ECONOMICS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitEconomicsRow {
    pub period: Period,
    pub revenue: f64,
    pub active_clients: i64,
    pub new_clients: i64,
    pub churned_clients: i64,
    pub marketing: f64,
    pub arpu: f64,
    pub churn_rate_pct: f64,
    pub cac: f64,
    pub ltv: f64,
    pub ltv_cac_ratio: f64,
    pub payback_months: f64,
}

/// Unit economics per period; churn is measured against the period's active base
pub fn unit_economics(store: &dyn MonthlyStore) -> Result<Vec<UnitEconomicsRow>> {
    store
        .list_periods()?
        .into_iter()
        .map(|period| {
            let totals = PeriodTotals::from_rows(&store.monthly_for_period(period.id)?);

            let arpu = average_revenue_per_user(totals.revenue, totals.active_clients);
            let churn = churn_rate(totals.churned_clients, totals.active_clients, 0);
            let cac = customer_acquisition_cost(totals.marketing, totals.new_clients);
            let ltv = lifetime_value(arpu, churn);

            Ok(UnitEconomicsRow {
                period,
                revenue: totals.revenue,
                active_clients: totals.active_clients,
                new_clients: totals.new_clients,
                churned_clients: totals.churned_clients,
                marketing: totals.marketing,
                arpu,
                churn_rate_pct: churn,
                cac,
                ltv,
                ltv_cac_ratio: ltv_cac_ratio(ltv, cac),
                payback_months: payback_months(cac, arpu),
            })
        })
        .collect()
}

// ============================================================================
// CASH FLOW
// ============================================================================

/// Balance the cash-flow projection starts from
pub const CASH_FLOW_OPENING_BALANCE: f64 = 50_000.0;
/// Number of most recent periods in the cash-flow report
pub const CASH_FLOW_PERIODS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashFlowRow {
    pub period: Period,
    pub inflow: f64,
    pub outflow: f64,
    pub net_cash_flow: f64,
    /// Running balance at the end of the period
    pub balance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashFlowReport {
    pub opening_balance: f64,
    pub rows: Vec<CashFlowRow>,
    pub total_inflow: f64,
    pub total_outflow: f64,
    /// Latest period vs the one before it
    pub inflow_change_pct: f64,
    pub outflow_change_pct: f64,
}

/// Inflow (revenue) and outflow (expenses) of the last five periods with a
/// running balance from `CASH_FLOW_OPENING_BALANCE`
pub fn cash_flow_report(store: &dyn MonthlyStore) -> Result<CashFlowReport> {
    let periods = store.list_periods()?;
    let skip = periods.len().saturating_sub(CASH_FLOW_PERIODS);

    let mut balance = CASH_FLOW_OPENING_BALANCE;
    let mut rows = Vec::new();
    for period in periods.into_iter().skip(skip) {
        let totals = PeriodTotals::from_rows(&store.monthly_for_period(period.id)?);
        let inflow = totals.revenue;
        let outflow = totals.expenses();
        let net_cash_flow = inflow - outflow;
        balance += net_cash_flow;

        rows.push(CashFlowRow {
            period,
            inflow,
            outflow,
            net_cash_flow,
            balance,
        });
    }

    let (inflow_change_pct, outflow_change_pct) = match rows.as_slice() {
        [.., previous, current] => (
            month_over_month_growth(current.inflow, previous.inflow),
            month_over_month_growth(current.outflow, previous.outflow),
        ),
        _ => (0.0, 0.0),
    };

    Ok(CashFlowReport {
        opening_balance: CASH_FLOW_OPENING_BALANCE,
        total_inflow: rows.iter().map(|r| r.inflow).sum(),
        total_outflow: rows.iter().map(|r| r.outflow).sum(),
        rows,
        inflow_change_pct,
        outflow_change_pct,
    })
}

// ============================================================================
// PLAN-FACT
// ============================================================================

/// Default MRR plan as a multiple of the fact
pub const DEFAULT_PLAN_UPLIFT: f64 = 1.1;

/// Setting key holding a region's MRR plan, e.g. `plan_mrr.uz`
pub fn plan_mrr_key(region_code: &str) -> String {
    format!("plan_mrr.{}", region_code)
}

/// Setting key holding a region's client plan, e.g. `plan_clients.uz`
pub fn plan_clients_key(region_code: &str) -> String {
    format!("plan_clients.{}", region_code)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanFactRow {
    pub region: Region,
    pub plan_mrr: f64,
    pub fact_mrr: f64,
    pub mrr_completion_pct: f64,
    pub mrr_delta: f64,
    pub plan_clients: f64,
    pub fact_clients: f64,
    pub clients_completion_pct: f64,
    pub clients_delta: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanFactTotals {
    pub plan_mrr: f64,
    pub fact_mrr: f64,
    pub mrr_completion_pct: f64,
    pub plan_clients: f64,
    pub fact_clients: f64,
    pub clients_completion_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanFactReport {
    pub period: Option<Period>,
    pub rows: Vec<PlanFactRow>,
    pub totals: PlanFactTotals,
}

fn completion_pct(fact: f64, plan: f64) -> f64 {
    if plan > 0.0 {
        fact / plan * 100.0
    } else {
        0.0
    }
}

/// Stored plan for `key`; missing, unparseable or zero plans are `None`
fn stored_plan(store: &dyn MonthlyStore, key: &str) -> Result<Option<f64>> {
    Ok(store
        .read_setting(key)?
        .map(|setting| parse_numeric_text(&setting.value))
        .filter(|plan| *plan != 0.0))
}

/// Plan vs fact per region for the latest period. Without a stored plan the
/// MRR plan is fact x 1.1 and the client plan is the fact itself.
pub fn plan_fact_report(store: &dyn MonthlyStore) -> Result<PlanFactReport> {
    let period = match store.list_periods()?.pop() {
        Some(period) => period,
        None => {
            return Ok(PlanFactReport {
                period: None,
                rows: Vec::new(),
                totals: PlanFactTotals::default(),
            })
        }
    };

    let facts = store.monthly_for_period(period.id)?;
    let mut rows = Vec::new();
    for region in store.list_regions()? {
        let fact = facts.iter().find(|row| row.region_id == region.id);
        let fact_mrr = fact.map(|row| row.revenue).unwrap_or(0.0);
        let fact_clients = fact.map(|row| row.active_clients as f64).unwrap_or(0.0);

        let plan_mrr = stored_plan(store, &plan_mrr_key(&region.code))?
            .unwrap_or(fact_mrr * DEFAULT_PLAN_UPLIFT);
        let plan_clients =
            stored_plan(store, &plan_clients_key(&region.code))?.unwrap_or(fact_clients);

        rows.push(PlanFactRow {
            region,
            plan_mrr,
            fact_mrr,
            mrr_completion_pct: completion_pct(fact_mrr, plan_mrr),
            mrr_delta: fact_mrr - plan_mrr,
            plan_clients,
            fact_clients,
            clients_completion_pct: completion_pct(fact_clients, plan_clients),
            clients_delta: fact_clients - plan_clients,
        });
    }

    let mut totals = PlanFactTotals::default();
    for row in &rows {
        totals.plan_mrr += row.plan_mrr;
        totals.fact_mrr += row.fact_mrr;
        totals.plan_clients += row.plan_clients;
        totals.fact_clients += row.fact_clients;
    }
    totals.mrr_completion_pct = completion_pct(totals.fact_mrr, totals.plan_mrr);
    totals.clients_completion_pct = completion_pct(totals.fact_clients, totals.plan_clients);

    Ok(PlanFactReport {
        period: Some(period),
        rows,
        totals,
    })
}
