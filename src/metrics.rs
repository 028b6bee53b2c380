// 📈 Metrics Calculator - derived SaaS KPIs
// Pure functions over monthly totals. Every boundary degrades to a defined value.

use serde::{Deserialize, Serialize};

/// Assumed client lifetime (months) when churn is unmeasured
pub const FALLBACK_LIFETIME_MONTHS: f64 = 24.0;

/// Runway reported when there is no burn
pub const RUNWAY_UNBOUNDED: i64 = 999;

// ============================================================================
// CORE FORMULAS
// ============================================================================

/// Average revenue per user: `revenue / active_clients`, 0 without clients
pub fn average_revenue_per_user(revenue: f64, active_clients: i64) -> f64 {
    if active_clients <= 0 {
        return 0.0;
    }
    finite_or_zero(revenue / active_clients as f64)
}

/// Customer acquisition cost: `marketing_spend / new_clients`, 0 without new clients
pub fn customer_acquisition_cost(marketing_spend: f64, new_clients: i64) -> f64 {
    if new_clients <= 0 {
        return 0.0;
    }
    finite_or_zero(marketing_spend / new_clients as f64)
}

/// Churn rate in percent of the client base exposed to risk
/// (clients at period start plus clients acquired during it)
pub fn churn_rate(churned_clients: i64, starting_clients: i64, new_clients: i64) -> f64 {
    let exposed = starting_clients.saturating_add(new_clients);
    if exposed <= 0 {
        return 0.0;
    }
    finite_or_zero(churned_clients as f64 / exposed as f64 * 100.0)
}

/// Lifetime value from ARPU and monthly churn (percent)
///
/// Unmeasured churn falls back to a fixed 24-month lifetime.
pub fn lifetime_value(arpu: f64, churn_rate_pct: f64) -> f64 {
    if churn_rate_pct > 0.0 {
        finite_or_zero(arpu / (churn_rate_pct / 100.0))
    } else {
        finite_or_zero(arpu * FALLBACK_LIFETIME_MONTHS)
    }
}

/// Whole months of runway, or `RUNWAY_UNBOUNDED` when nothing is burning
pub fn runway_months(cash_balance: f64, burn_rate: f64) -> i64 {
    if burn_rate > 0.0 {
        let months = (cash_balance / burn_rate).floor();
        if months.is_finite() {
            return months as i64;
        }
        // Only reachable with infinite cash
        return if months > 0.0 { RUNWAY_UNBOUNDED } else { 0 };
    }
    RUNWAY_UNBOUNDED
}

/// Month-over-month growth in percent, 0 without a positive baseline
pub fn month_over_month_growth(current: f64, previous: f64) -> f64 {
    if previous <= 0.0 {
        return 0.0;
    }
    finite_or_zero((current - previous) / previous * 100.0)
}

pub fn ltv_cac_ratio(ltv: f64, cac: f64) -> f64 {
    if cac > 0.0 {
        finite_or_zero(ltv / cac)
    } else {
        0.0
    }
}

/// Months of ARPU needed to recover the acquisition cost
pub fn payback_months(cac: f64, arpu: f64) -> f64 {
    if arpu > 0.0 {
        finite_or_zero(cac / arpu)
    } else {
        0.0
    }
}

/// Profit as percent of revenue
pub fn profit_margin(profit: f64, revenue: f64) -> f64 {
    if revenue > 0.0 {
        finite_or_zero(profit / revenue * 100.0)
    } else {
        0.0
    }
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

// ============================================================================
// DERIVED METRICS BUNDLE
// ============================================================================

/// Raw totals a KPI set is derived from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricInputs {
    pub revenue: f64,
    pub previous_revenue: f64,
    pub active_clients: i64,
    pub starting_clients: i64,
    pub new_clients: i64,
    pub churned_clients: i64,
    pub marketing_spend: f64,
    pub cash_balance: f64,
    pub burn_rate: f64,
}

/// Transient KPI view, recomputed per request and never persisted
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DerivedMetrics {
    pub arpu: f64,
    pub cac: f64,
    pub ltv: f64,
    pub churn_rate_pct: f64,
    pub runway_months: i64,
    pub mom_growth_pct: f64,
    pub ltv_cac_ratio: f64,
}

impl DerivedMetrics {
    pub fn compute(inputs: &MetricInputs) -> Self {
        let arpu = average_revenue_per_user(inputs.revenue, inputs.active_clients);
        let cac = customer_acquisition_cost(inputs.marketing_spend, inputs.new_clients);
        let churn_rate_pct = churn_rate(
            inputs.churned_clients,
            inputs.starting_clients,
            inputs.new_clients,
        );
        let ltv = lifetime_value(arpu, churn_rate_pct);

        DerivedMetrics {
            arpu,
            cac,
            ltv,
            churn_rate_pct,
            runway_months: runway_months(inputs.cash_balance, inputs.burn_rate),
            mom_growth_pct: month_over_month_growth(inputs.revenue, inputs.previous_revenue),
            ltv_cac_ratio: ltv_cac_ratio(ltv, cac),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arpu_without_clients_is_zero() {
        for clients in [0, -1, -50] {
            assert_eq!(average_revenue_per_user(28_098.0, clients), 0.0);
        }
        assert_eq!(average_revenue_per_user(1_000.0, 4), 250.0);
    }

    #[test]
    fn test_cac_without_new_clients_is_zero() {
        for new_clients in [0, -3] {
            assert_eq!(customer_acquisition_cost(4_000.0, new_clients), 0.0);
        }
        assert_eq!(customer_acquisition_cost(4_000.0, 10), 400.0);
    }

    #[test]
    fn test_churn_rate() {
        assert_eq!(churn_rate(0, 0, 0), 0.0);
        assert_eq!(churn_rate(5, 95, 5), 5.0);
        assert_eq!(churn_rate(3, -10, 5), 0.0);
    }

    #[test]
    fn test_lifetime_value_fallback() {
        assert_eq!(lifetime_value(100.0, 0.0), 2_400.0);
        assert_eq!(lifetime_value(63.0, 0.0), 63.0 * 24.0);
        assert_eq!(lifetime_value(100.0, 5.0), 2_000.0);
    }

    #[test]
    fn test_runway_sentinel() {
        assert_eq!(runway_months(365_000.0, 0.0), RUNWAY_UNBOUNDED);
        assert_eq!(runway_months(365_000.0, -500.0), RUNWAY_UNBOUNDED);
        assert_eq!(runway_months(365_000.0, 30_000.0), 12);
        assert_eq!(runway_months(f64::INFINITY, 1.0), RUNWAY_UNBOUNDED);
    }

    #[test]
    fn test_month_over_month_growth() {
        assert_eq!(month_over_month_growth(110.0, 100.0), 10.0);
        assert_eq!(month_over_month_growth(500.0, 0.0), 0.0);
        assert_eq!(month_over_month_growth(90.0, 100.0), -10.0);
    }

    #[test]
    fn test_ratio_helpers() {
        assert_eq!(ltv_cac_ratio(1_200.0, 400.0), 3.0);
        assert_eq!(ltv_cac_ratio(1_200.0, 0.0), 0.0);
        assert_eq!(payback_months(400.0, 50.0), 8.0);
        assert_eq!(payback_months(400.0, 0.0), 0.0);
        assert_eq!(profit_margin(25.0, 100.0), 25.0);
        assert_eq!(profit_margin(25.0, 0.0), 0.0);
    }

    #[test]
    fn test_non_finite_inputs_never_leak() {
        assert_eq!(average_revenue_per_user(f64::NAN, 10), 0.0);
        assert_eq!(lifetime_value(f64::INFINITY, 0.0), 0.0);
        assert_eq!(month_over_month_growth(f64::NAN, 100.0), 0.0);
    }

    #[test]
    fn test_derived_metrics_compute() {
        let metrics = DerivedMetrics::compute(&MetricInputs {
            revenue: 11_000.0,
            previous_revenue: 10_000.0,
            active_clients: 100,
            starting_clients: 95,
            new_clients: 5,
            churned_clients: 5,
            marketing_spend: 1_000.0,
            cash_balance: 50_000.0,
            burn_rate: 4_000.0,
        });

        assert_eq!(metrics.arpu, 110.0);
        assert_eq!(metrics.cac, 200.0);
        assert_eq!(metrics.churn_rate_pct, 5.0);
        assert!((metrics.ltv - 2_200.0).abs() < 1e-9);
        assert!((metrics.ltv_cac_ratio - 11.0).abs() < 1e-9);
        assert_eq!(metrics.runway_months, 12);
        assert!((metrics.mom_growth_pct - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_derived_metrics_empty_inputs() {
        let metrics = DerivedMetrics::compute(&MetricInputs::default());
        assert_eq!(metrics.arpu, 0.0);
        assert_eq!(metrics.cac, 0.0);
        assert_eq!(metrics.ltv, 0.0);
        assert_eq!(metrics.churn_rate_pct, 0.0);
        assert_eq!(metrics.runway_months, RUNWAY_UNBOUNDED);
        assert_eq!(metrics.ltv_cac_ratio, 0.0);
    }
}
