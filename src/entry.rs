// ✍️ Data entry - sales and expense form submissions
// Each submission overwrites one field group of a (region, period) row.

use crate::models::{AggregateField, Event, MonthlyAggregate, MonthlyPatch};
use crate::store::MonthlyStore;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum EntryError {
    #[error("Missing required fields: period_id and region_id")]
    MissingIds,

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Sales form; missing figures are stored as 0
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SalesEntry {
    pub period_id: Option<i64>,
    pub region_id: Option<i64>,
    pub revenue: Option<f64>,
    pub active_clients: Option<f64>,
    pub new_clients: Option<f64>,
    pub churned_clients: Option<f64>,
}

/// Expense form; missing figures are stored as 0
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpenseEntry {
    pub period_id: Option<i64>,
    pub region_id: Option<i64>,
    pub salary: Option<f64>,
    pub marketing: Option<f64>,
    pub office: Option<f64>,
    pub software: Option<f64>,
    pub other: Option<f64>,
}

fn required_ids(period_id: Option<i64>, region_id: Option<i64>) -> Result<(i64, i64), EntryError> {
    match (period_id, region_id) {
        (Some(period), Some(region)) if period > 0 && region > 0 => Ok((period, region)),
        _ => Err(EntryError::MissingIds),
    }
}

fn record(
    store: &mut dyn MonthlyStore,
    region_id: i64,
    period_id: i64,
    patch: MonthlyPatch,
    event_type: &str,
) -> Result<MonthlyAggregate, EntryError> {
    let row = store.upsert_monthly_aggregate(region_id, period_id, &patch)?;

    let data: serde_json::Map<String, serde_json::Value> = patch
        .iter()
        .map(|(field, value)| (field.column().to_string(), serde_json::json!(value)))
        .collect();
    store.record_event(&Event::new(
        event_type,
        "monthly_data",
        &format!("{}:{}", region_id, period_id),
        serde_json::Value::Object(data),
        "data_entry",
    ))?;

    info!(region_id, period_id, event_type, "monthly data recorded");
    Ok(row)
}

pub fn record_sales(
    store: &mut dyn MonthlyStore,
    entry: &SalesEntry,
) -> Result<MonthlyAggregate, EntryError> {
    let (period_id, region_id) = required_ids(entry.period_id, entry.region_id)?;

    let patch = MonthlyPatch::new()
        .with(AggregateField::Revenue, entry.revenue.unwrap_or(0.0))
        .with(AggregateField::ActiveClients, entry.active_clients.unwrap_or(0.0))
        .with(AggregateField::NewClients, entry.new_clients.unwrap_or(0.0))
        .with(AggregateField::ChurnedClients, entry.churned_clients.unwrap_or(0.0));

    record(store, region_id, period_id, patch, "sales_recorded")
}

pub fn record_expenses(
    store: &mut dyn MonthlyStore,
    entry: &ExpenseEntry,
) -> Result<MonthlyAggregate, EntryError> {
    let (period_id, region_id) = required_ids(entry.period_id, entry.region_id)?;

    let patch = MonthlyPatch::new()
        .with(AggregateField::Salary, entry.salary.unwrap_or(0.0))
        .with(AggregateField::Marketing, entry.marketing.unwrap_or(0.0))
        .with(AggregateField::Office, entry.office.unwrap_or(0.0))
        .with(AggregateField::Software, entry.software.unwrap_or(0.0))
        .with(AggregateField::Other, entry.other.unwrap_or(0.0));

    record(store, region_id, period_id, patch, "expenses_recorded")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_sales_then_expenses_share_a_row() {
        let mut store = MemoryStore::new();

        record_sales(
            &mut store,
            &SalesEntry {
                period_id: Some(1),
                region_id: Some(2),
                revenue: Some(28_098.0),
                active_clients: Some(446.0),
                ..Default::default()
            },
        )
        .unwrap();

        let row = record_expenses(
            &mut store,
            &ExpenseEntry {
                period_id: Some(1),
                region_id: Some(2),
                salary: Some(8_000.0),
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(row.revenue, 28_098.0);
        assert_eq!(row.active_clients, 446);
        assert_eq!(row.new_clients, 0);
        assert_eq!(row.salary_expense, 8_000.0);
        assert_eq!(store.events.len(), 2);
        assert_eq!(store.events[1].event_type, "expenses_recorded");
        assert_eq!(store.events[1].entity_id, "2:1");
    }

    #[test]
    fn test_resubmitting_sales_zeroes_missing_figures() {
        let mut store = MemoryStore::new();
        let mut entry = SalesEntry {
            period_id: Some(1),
            region_id: Some(1),
            revenue: Some(500.0),
            new_clients: Some(4.0),
            ..Default::default()
        };
        record_sales(&mut store, &entry).unwrap();

        entry.new_clients = None;
        let row = record_sales(&mut store, &entry).unwrap();
        assert_eq!(row.new_clients, 0);
        assert_eq!(row.revenue, 500.0);
    }

    #[test]
    fn test_missing_ids_rejected() {
        let mut store = MemoryStore::new();

        let err = record_sales(&mut store, &SalesEntry::default()).unwrap_err();
        assert!(matches!(err, EntryError::MissingIds));

        let entry = ExpenseEntry {
            period_id: Some(0),
            region_id: Some(1),
            ..Default::default()
        };
        assert!(matches!(
            record_expenses(&mut store, &entry),
            Err(EntryError::MissingIds)
        ));
        assert_eq!(store.monthly_rows(), 0);
    }

    #[test]
    fn test_entry_from_json() {
        let entry: SalesEntry =
            serde_json::from_str(r#"{"period_id": 3, "region_id": 1, "revenue": 100}"#).unwrap();
        assert_eq!(entry.revenue, Some(100.0));
        assert_eq!(entry.churned_clients, None);
    }
}
