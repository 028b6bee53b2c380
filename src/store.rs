// 🗄️ Persistence contract
// The importer, dashboard and entry forms only ever talk to a MonthlyStore.

use crate::models::{
    Event, MonthlyAggregate, MonthlyPatch, Period, Region, RegionSeed, Setting, YearMonth,
};
use anyhow::{anyhow, Result};
use std::collections::BTreeMap;

pub trait MonthlyStore {
    /// Insert or update a region by code (name, currency and color are overwritten)
    fn upsert_region(&mut self, seed: &RegionSeed) -> Result<Region>;

    /// Insert or update a calendar period by (year, month)
    fn upsert_period(&mut self, month: YearMonth) -> Result<Period>;

    fn find_region_by_code(&self, code: &str) -> Result<Option<Region>>;

    fn find_period_by_year_month(&self, month: YearMonth) -> Result<Option<Period>>;

    /// Create the (region, period) row if needed and overwrite only the patched fields
    fn upsert_monthly_aggregate(
        &mut self,
        region_id: i64,
        period_id: i64,
        patch: &MonthlyPatch,
    ) -> Result<MonthlyAggregate>;

    fn read_setting(&self, key: &str) -> Result<Option<Setting>>;

    /// Write a setting; a `None` description keeps the stored one
    fn write_setting(&mut self, key: &str, value: &str, description: Option<&str>)
        -> Result<Setting>;

    fn list_regions(&self) -> Result<Vec<Region>>;

    /// Periods in chronological order
    fn list_periods(&self) -> Result<Vec<Period>>;

    fn monthly_for_period(&self, period_id: i64) -> Result<Vec<MonthlyAggregate>>;

    fn record_event(&mut self, event: &Event) -> Result<()>;
}

/// Build the stored form of a period
pub(crate) fn period_bounds(month: YearMonth) -> Result<(String, chrono::NaiveDate, chrono::NaiveDate)> {
    let start = month
        .first_day()
        .ok_or_else(|| anyhow!("Invalid period {}-{:02}", month.year, month.month))?;
    let end = month
        .last_day()
        .ok_or_else(|| anyhow!("Invalid period {}-{:02}", month.year, month.month))?;
    Ok((month.display_name(), start, end))
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

/// Vec/BTreeMap-backed store used by tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryStore {
    regions: Vec<Region>,
    periods: Vec<Period>,
    monthly: BTreeMap<(i64, i64), MonthlyAggregate>,
    settings: BTreeMap<String, Setting>,
    pub events: Vec<Event>,
    upserts: usize,
    fail_after: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every monthly upsert after the first `count` fail
    pub fn fail_monthly_after(mut self, count: usize) -> Self {
        self.fail_after = Some(count);
        self
    }

    /// Number of successful monthly upserts so far
    pub fn monthly_upserts(&self) -> usize {
        self.upserts
    }

    pub fn monthly(&self, region_id: i64, period_id: i64) -> Option<&MonthlyAggregate> {
        self.monthly.get(&(region_id, period_id))
    }

    pub fn monthly_rows(&self) -> usize {
        self.monthly.len()
    }
}

impl MonthlyStore for MemoryStore {
    fn upsert_region(&mut self, seed: &RegionSeed) -> Result<Region> {
        if let Some(region) = self.regions.iter_mut().find(|r| r.code == seed.code) {
            region.name = seed.name.clone();
            region.currency = seed.currency.clone();
            region.color = seed.color.clone();
            return Ok(region.clone());
        }

        let region = Region {
            id: self.regions.len() as i64 + 1,
            code: seed.code.clone(),
            name: seed.name.clone(),
            currency: seed.currency.clone(),
            color: seed.color.clone(),
        };
        self.regions.push(region.clone());
        Ok(region)
    }

    fn upsert_period(&mut self, month: YearMonth) -> Result<Period> {
        let (name, start_date, end_date) = period_bounds(month)?;

        if let Some(period) = self
            .periods
            .iter_mut()
            .find(|p| p.year == month.year && p.month == month.month)
        {
            period.name = name;
            period.start_date = start_date;
            period.end_date = end_date;
            return Ok(period.clone());
        }

        let period = Period {
            id: self.periods.len() as i64 + 1,
            year: month.year,
            month: month.month,
            name,
            start_date,
            end_date,
        };
        self.periods.push(period.clone());
        Ok(period)
    }

    fn find_region_by_code(&self, code: &str) -> Result<Option<Region>> {
        Ok(self.regions.iter().find(|r| r.code == code).cloned())
    }

    fn find_period_by_year_month(&self, month: YearMonth) -> Result<Option<Period>> {
        Ok(self
            .periods
            .iter()
            .find(|p| p.year == month.year && p.month == month.month)
            .cloned())
    }

    fn upsert_monthly_aggregate(
        &mut self,
        region_id: i64,
        period_id: i64,
        patch: &MonthlyPatch,
    ) -> Result<MonthlyAggregate> {
        if let Some(limit) = self.fail_after {
            if self.upserts >= limit {
                return Err(anyhow!("store unavailable"));
            }
        }

        let row = self
            .monthly
            .entry((region_id, period_id))
            .or_insert_with(|| MonthlyAggregate::new(region_id, period_id));
        row.apply(patch);
        self.upserts += 1;
        Ok(row.clone())
    }

    fn read_setting(&self, key: &str) -> Result<Option<Setting>> {
        Ok(self.settings.get(key).cloned())
    }

    fn write_setting(
        &mut self,
        key: &str,
        value: &str,
        description: Option<&str>,
    ) -> Result<Setting> {
        let previous = self.settings.get(key).and_then(|s| s.description.clone());
        let setting = Setting {
            key: key.to_string(),
            value: value.to_string(),
            description: description.map(str::to_string).or(previous),
        };
        self.settings.insert(key.to_string(), setting.clone());
        Ok(setting)
    }

    fn list_regions(&self) -> Result<Vec<Region>> {
        Ok(self.regions.clone())
    }

    fn list_periods(&self) -> Result<Vec<Period>> {
        let mut periods = self.periods.clone();
        periods.sort_by_key(|p| (p.year, p.month));
        Ok(periods)
    }

    fn monthly_for_period(&self, period_id: i64) -> Result<Vec<MonthlyAggregate>> {
        Ok(self
            .monthly
            .values()
            .filter(|row| row.period_id == period_id)
            .cloned()
            .collect())
    }

    fn record_event(&mut self, event: &Event) -> Result<()> {
        self.events.push(event.clone());
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AggregateField;

    #[test]
    fn test_region_upsert_by_code() {
        let mut store = MemoryStore::new();
        let first = store
            .upsert_region(&RegionSeed::new("uz", "Uzbekistan", "UZS", "#3b82f6"))
            .unwrap();
        let second = store
            .upsert_region(&RegionSeed::new("uz", "Uzbekistan", "USD", "#000000"))
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(store.list_regions().unwrap().len(), 1);
        assert_eq!(store.find_region_by_code("uz").unwrap().unwrap().currency, "USD");
        assert!(store.find_region_by_code("kz").unwrap().is_none());
    }

    #[test]
    fn test_periods_listed_chronologically() {
        let mut store = MemoryStore::new();
        store.upsert_period(YearMonth::new(2026, 1)).unwrap();
        store.upsert_period(YearMonth::new(2025, 11)).unwrap();
        store.upsert_period(YearMonth::new(2025, 12)).unwrap();

        let months: Vec<_> = store
            .list_periods()
            .unwrap()
            .iter()
            .map(|p| p.year_month())
            .collect();
        assert_eq!(
            months,
            vec![
                YearMonth::new(2025, 11),
                YearMonth::new(2025, 12),
                YearMonth::new(2026, 1)
            ]
        );
        assert!(store.upsert_period(YearMonth::new(2025, 13)).is_err());
    }

    #[test]
    fn test_monthly_upsert_merges_fields() {
        let mut store = MemoryStore::new();
        store
            .upsert_monthly_aggregate(1, 1, &MonthlyPatch::single(AggregateField::Revenue, 500.0))
            .unwrap();
        let row = store
            .upsert_monthly_aggregate(1, 1, &MonthlyPatch::single(AggregateField::Salary, 80.0))
            .unwrap();

        assert_eq!(row.revenue, 500.0);
        assert_eq!(row.salary_expense, 80.0);
        assert_eq!(store.monthly_rows(), 1);
        assert_eq!(store.monthly_for_period(1).unwrap().len(), 1);
        assert!(store.monthly_for_period(2).unwrap().is_empty());
    }

    #[test]
    fn test_failure_injection() {
        let mut store = MemoryStore::new().fail_monthly_after(1);
        let patch = MonthlyPatch::single(AggregateField::Revenue, 1.0);

        assert!(store.upsert_monthly_aggregate(1, 1, &patch).is_ok());
        assert!(store.upsert_monthly_aggregate(1, 2, &patch).is_err());
        assert_eq!(store.monthly_upserts(), 1);
    }

    #[test]
    fn test_setting_keeps_description() {
        let mut store = MemoryStore::new();
        store
            .write_setting("cash_balance", "365000", Some("Current cash balance"))
            .unwrap();
        let updated = store.write_setting("cash_balance", "400000", None).unwrap();

        assert_eq!(updated.value, "400000");
        assert_eq!(updated.description.as_deref(), Some("Current cash balance"));
        assert!(store.read_setting("missing").unwrap().is_none());
    }
}
