// 🧱 Domain models - regions, periods, monthly aggregates
// Identity of a monthly aggregate is (region, period); its financial fields are mutable.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// REGION & PERIOD
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub currency: String,
    pub color: String,
}

/// Region as configured, before it has a database id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionSeed {
    pub code: String,
    pub name: String,
    pub currency: String,
    pub color: String,
}

impl RegionSeed {
    pub fn new(code: &str, name: &str, currency: &str, color: &str) -> Self {
        RegionSeed {
            code: code.to_string(),
            name: name.to_string(),
            currency: currency.to_string(),
            color: color.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Period {
    pub id: i64,
    pub year: i32,
    pub month: u32,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// Calendar month, before it has a database id
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Self {
        YearMonth { year, month }
    }

    pub fn first_day(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
    }

    pub fn last_day(&self) -> Option<NaiveDate> {
        let (year, month) = if self.month == 12 {
            (self.year + 1, 1)
        } else {
            (self.year, self.month + 1)
        };
        NaiveDate::from_ymd_opt(year, month, 1)?.pred_opt()
    }

    /// Display name such as "November 2025"
    pub fn display_name(&self) -> String {
        match self.first_day() {
            Some(date) => date.format("%B %Y").to_string(),
            None => format!("{:04}-{:02}", self.year, self.month),
        }
    }
}

impl From<NaiveDate> for YearMonth {
    fn from(date: NaiveDate) -> Self {
        YearMonth::new(date.year(), date.month())
    }
}

impl Period {
    pub fn year_month(&self) -> YearMonth {
        YearMonth::new(self.year, self.month)
    }
}

// ============================================================================
// MONTHLY AGGREGATE
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonthlyAggregate {
    pub region_id: i64,
    pub period_id: i64,
    pub revenue: f64,
    pub active_clients: i64,
    pub new_clients: i64,
    pub churned_clients: i64,
    pub salary_expense: f64,
    pub marketing_expense: f64,
    pub office_expense: f64,
    pub software_expense: f64,
    pub other_expense: f64,
}

impl MonthlyAggregate {
    pub fn new(region_id: i64, period_id: i64) -> Self {
        MonthlyAggregate {
            region_id,
            period_id,
            ..Default::default()
        }
    }

    pub fn total_expenses(&self) -> f64 {
        self.salary_expense
            + self.marketing_expense
            + self.office_expense
            + self.software_expense
            + self.other_expense
    }

    /// Overwrite only the fields present in `patch`
    pub fn apply(&mut self, patch: &MonthlyPatch) {
        for (field, value) in patch.iter() {
            match field {
                AggregateField::Revenue => self.revenue = value,
                AggregateField::ActiveClients => self.active_clients = round_count(value),
                AggregateField::NewClients => self.new_clients = round_count(value),
                AggregateField::ChurnedClients => self.churned_clients = round_count(value),
                AggregateField::Salary => self.salary_expense = value,
                AggregateField::Marketing => self.marketing_expense = value,
                AggregateField::Office => self.office_expense = value,
                AggregateField::Software => self.software_expense = value,
                AggregateField::Other => self.other_expense = value,
            }
        }
    }
}

/// Mutable fields of a monthly aggregate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateField {
    Revenue,
    ActiveClients,
    NewClients,
    ChurnedClients,
    Salary,
    Marketing,
    Office,
    Software,
    Other,
}

impl AggregateField {
    pub const ALL: [AggregateField; 9] = [
        AggregateField::Revenue,
        AggregateField::ActiveClients,
        AggregateField::NewClients,
        AggregateField::ChurnedClients,
        AggregateField::Salary,
        AggregateField::Marketing,
        AggregateField::Office,
        AggregateField::Software,
        AggregateField::Other,
    ];

    /// Column name in the `monthly_data` table
    pub fn column(&self) -> &'static str {
        match self {
            AggregateField::Revenue => "revenue",
            AggregateField::ActiveClients => "active_clients",
            AggregateField::NewClients => "new_clients",
            AggregateField::ChurnedClients => "churned_clients",
            AggregateField::Salary => "salary_expense",
            AggregateField::Marketing => "marketing_expense",
            AggregateField::Office => "office_expense",
            AggregateField::Software => "software_expense",
            AggregateField::Other => "other_expense",
        }
    }

    pub fn is_count(&self) -> bool {
        matches!(
            self,
            AggregateField::ActiveClients
                | AggregateField::NewClients
                | AggregateField::ChurnedClients
        )
    }
}

pub(crate) fn round_count(value: f64) -> i64 {
    if value.is_finite() {
        value.round() as i64
    } else {
        0
    }
}

/// Partial update of a monthly aggregate. Later `set` calls for the same
/// field replace earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonthlyPatch {
    fields: Vec<(AggregateField, f64)>,
}

impl MonthlyPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: AggregateField, value: f64) -> Self {
        MonthlyPatch::new().with(field, value)
    }

    pub fn with(mut self, field: AggregateField, value: f64) -> Self {
        self.set(field, value);
        self
    }

    pub fn set(&mut self, field: AggregateField, value: f64) {
        let value = if field.is_count() {
            round_count(value) as f64
        } else {
            value
        };

        match self.fields.iter_mut().find(|(f, _)| *f == field) {
            Some(entry) => entry.1 = value,
            None => self.fields.push((field, value)),
        }
    }

    pub fn get(&self, field: AggregateField) -> Option<f64> {
        self.fields
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, v)| *v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (AggregateField, f64)> + '_ {
        self.fields.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }
}

// ============================================================================
// SETTINGS & AUDIT EVENTS
// ============================================================================

pub const CASH_BALANCE_KEY: &str = "cash_balance";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Setting {
    pub key: String,
    pub value: String,
    pub description: Option<String>,
}

/// Audit trail entry, one per data-changing operation
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
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
    fn test_year_month_bounds() {
        let nov = YearMonth::new(2025, 11);
        assert_eq!(nov.first_day(), NaiveDate::from_ymd_opt(2025, 11, 1));
        assert_eq!(nov.last_day(), NaiveDate::from_ymd_opt(2025, 11, 30));

        let dec = YearMonth::new(2025, 12);
        assert_eq!(dec.last_day(), NaiveDate::from_ymd_opt(2025, 12, 31));

        let feb = YearMonth::new(2026, 2);
        assert_eq!(feb.last_day(), NaiveDate::from_ymd_opt(2026, 2, 28));
        assert_eq!(feb.display_name(), "February 2026");
    }

    #[test]
    fn test_patch_overwrites_same_field() {
        let patch = MonthlyPatch::new()
            .with(AggregateField::Revenue, 100.0)
            .with(AggregateField::Revenue, 250.0);
        assert_eq!(patch.len(), 1);
        assert_eq!(patch.get(AggregateField::Revenue), Some(250.0));
    }

    #[test]
    fn test_patch_rounds_client_counts() {
        let patch = MonthlyPatch::single(AggregateField::ActiveClients, 445.6);
        assert_eq!(patch.get(AggregateField::ActiveClients), Some(446.0));
    }

    #[test]
    fn test_apply_only_touches_patched_fields() {
        let mut row = MonthlyAggregate::new(1, 2);
        row.salary_expense = 8_000.0;
        row.apply(&MonthlyPatch::single(AggregateField::Revenue, 28_098.0));

        assert_eq!(row.revenue, 28_098.0);
        assert_eq!(row.salary_expense, 8_000.0);
        assert_eq!(row.total_expenses(), 8_000.0);
    }
}
