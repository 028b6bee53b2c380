// 💾 SQLite store
// rusqlite-backed MonthlyStore with an append-only event log

use crate::models::{
    AggregateField, Event, MonthlyAggregate, MonthlyPatch, Period, Region, RegionSeed, Setting,
    YearMonth,
};
use crate::store::{period_bounds, MonthlyStore};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::path::Path;
use tracing::debug;

const DATE_FORMAT: &str = "%Y-%m-%d";

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) a database file with WAL journaling
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        // Enable WAL mode for crash recovery
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!(path = %path.display(), journal_mode = %mode, "database opened");

        let store = SqliteStore { conn };
        store.setup()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let store = SqliteStore {
            conn: Connection::open_in_memory().context("Failed to open in-memory database")?,
        };
        store.setup()?;
        Ok(store)
    }

    pub fn setup(&self) -> Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS regions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                code TEXT UNIQUE NOT NULL,
                name TEXT NOT NULL,
                currency TEXT NOT NULL,
                color TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE TABLE IF NOT EXISTS periods (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                year INTEGER NOT NULL,
                month INTEGER NOT NULL,
                name TEXT NOT NULL,
                start_date TEXT NOT NULL,
                end_date TEXT NOT NULL,
                UNIQUE(year, month)
            );

            CREATE TABLE IF NOT EXISTS monthly_data (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                region_id INTEGER NOT NULL REFERENCES regions(id),
                period_id INTEGER NOT NULL REFERENCES periods(id),
                revenue REAL NOT NULL DEFAULT 0,
                active_clients INTEGER NOT NULL DEFAULT 0,
                new_clients INTEGER NOT NULL DEFAULT 0,
                churned_clients INTEGER NOT NULL DEFAULT 0,
                salary_expense REAL NOT NULL DEFAULT 0,
                marketing_expense REAL NOT NULL DEFAULT 0,
                office_expense REAL NOT NULL DEFAULT 0,
                software_expense REAL NOT NULL DEFAULT 0,
                other_expense REAL NOT NULL DEFAULT 0,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(region_id, period_id)
            );

            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                description TEXT,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            -- Audit trail
            CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                event_id TEXT UNIQUE NOT NULL,
                timestamp TEXT NOT NULL,
                event_type TEXT NOT NULL,
                entity_type TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                data TEXT NOT NULL,
                actor TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_monthly_period ON monthly_data(period_id);
            CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id);
            CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp);",
        )
        .context("Failed to create schema")?;

        Ok(())
    }

    /// Events for one entity, newest first
    pub fn events_for_entity(&self, entity_type: &str, entity_id: &str) -> Result<Vec<Event>> {
        let mut stmt = self.conn.prepare(
            "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
             FROM events
             WHERE entity_type = ?1 AND entity_id = ?2
             ORDER BY id DESC",
        )?;

        let events = stmt
            .query_map(params![entity_type, entity_id], event_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(events)
    }

    /// Events of one type, newest first
    pub fn events_of_type(&self, event_type: &str) -> Result<Vec<Event>> {
        let mut stmt = self.conn.prepare(
            "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
             FROM events
             WHERE event_type = ?1
             ORDER BY id DESC",
        )?;

        let events = stmt
            .query_map(params![event_type], event_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(events)
    }

    fn monthly_row(&self, region_id: i64, period_id: i64) -> Result<MonthlyAggregate> {
        self.conn
            .query_row(
                &format!("{} WHERE region_id = ?1 AND period_id = ?2", MONTHLY_SELECT),
                params![region_id, period_id],
                monthly_from_row,
            )
            .context("Failed to read monthly data")
    }
}

// ============================================================================
// ROW MAPPING
// ============================================================================

const MONTHLY_SELECT: &str = "SELECT region_id, period_id, revenue, active_clients, new_clients,
        churned_clients, salary_expense, marketing_expense, office_expense,
        software_expense, other_expense
     FROM monthly_data";

fn region_from_row(row: &Row) -> rusqlite::Result<Region> {
    Ok(Region {
        id: row.get(0)?,
        code: row.get(1)?,
        name: row.get(2)?,
        currency: row.get(3)?,
        color: row.get(4)?,
    })
}

fn date_at(row: &Row, idx: usize) -> rusqlite::Result<NaiveDate> {
    let text: String = row.get(idx)?;
    NaiveDate::parse_from_str(&text, DATE_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn period_from_row(row: &Row) -> rusqlite::Result<Period> {
    Ok(Period {
        id: row.get(0)?,
        year: row.get(1)?,
        month: row.get(2)?,
        name: row.get(3)?,
        start_date: date_at(row, 4)?,
        end_date: date_at(row, 5)?,
    })
}

fn monthly_from_row(row: &Row) -> rusqlite::Result<MonthlyAggregate> {
    Ok(MonthlyAggregate {
        region_id: row.get(0)?,
        period_id: row.get(1)?,
        revenue: row.get(2)?,
        active_clients: row.get(3)?,
        new_clients: row.get(4)?,
        churned_clients: row.get(5)?,
        salary_expense: row.get(6)?,
        marketing_expense: row.get(7)?,
        office_expense: row.get(8)?,
        software_expense: row.get(9)?,
        other_expense: row.get(10)?,
    })
}

fn event_from_row(row: &Row) -> rusqlite::Result<Event> {
    let timestamp_str: String = row.get(1)?;
    let data_json: String = row.get(5)?;

    Ok(Event {
        event_id: row.get(0)?,
        timestamp: DateTime::parse_from_rfc3339(&timestamp_str)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?
            .with_timezone(&Utc),
        event_type: row.get(2)?,
        entity_type: row.get(3)?,
        entity_id: row.get(4)?,
        data: serde_json::from_str(&data_json)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?,
        actor: row.get(6)?,
    })
}

fn patch_value(field: AggregateField, value: f64) -> Value {
    if field.is_count() {
        Value::Integer(crate::models::round_count(value))
    } else {
        Value::Real(value)
    }
}

// ============================================================================
// STORE IMPLEMENTATION
// ============================================================================

impl MonthlyStore for SqliteStore {
    fn upsert_region(&mut self, seed: &RegionSeed) -> Result<Region> {
        self.conn.execute(
            "INSERT INTO regions (code, name, currency, color) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(code) DO UPDATE SET
                name = excluded.name,
                currency = excluded.currency,
                color = excluded.color",
            params![seed.code, seed.name, seed.currency, seed.color],
        )?;

        self.find_region_by_code(&seed.code)?
            .ok_or_else(|| anyhow!("Region {} vanished after upsert", seed.code))
    }

    fn upsert_period(&mut self, month: YearMonth) -> Result<Period> {
        let (name, start_date, end_date) = period_bounds(month)?;

        self.conn.execute(
            "INSERT INTO periods (year, month, name, start_date, end_date)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(year, month) DO UPDATE SET
                name = excluded.name,
                start_date = excluded.start_date,
                end_date = excluded.end_date",
            params![
                month.year,
                month.month,
                name,
                start_date.format(DATE_FORMAT).to_string(),
                end_date.format(DATE_FORMAT).to_string(),
            ],
        )?;

        self.find_period_by_year_month(month)?
            .ok_or_else(|| anyhow!("Period {}-{:02} vanished after upsert", month.year, month.month))
    }

    fn find_region_by_code(&self, code: &str) -> Result<Option<Region>> {
        let region = self
            .conn
            .query_row(
                "SELECT id, code, name, currency, color FROM regions WHERE code = ?1",
                params![code],
                region_from_row,
            )
            .optional()?;
        Ok(region)
    }

    fn find_period_by_year_month(&self, month: YearMonth) -> Result<Option<Period>> {
        let period = self
            .conn
            .query_row(
                "SELECT id, year, month, name, start_date, end_date
                 FROM periods WHERE year = ?1 AND month = ?2",
                params![month.year, month.month],
                period_from_row,
            )
            .optional()?;
        Ok(period)
    }

    fn upsert_monthly_aggregate(
        &mut self,
        region_id: i64,
        period_id: i64,
        patch: &MonthlyPatch,
    ) -> Result<MonthlyAggregate> {
        let mut columns = vec!["region_id", "period_id"];
        let mut values = vec![Value::Integer(region_id), Value::Integer(period_id)];
        for (field, value) in patch.iter() {
            columns.push(field.column());
            values.push(patch_value(field, value));
        }

        let placeholders: Vec<String> = (1..=values.len()).map(|i| format!("?{}", i)).collect();

        // Only the patched columns are overwritten on conflict
        let on_conflict = if patch.is_empty() {
            "DO NOTHING".to_string()
        } else {
            let updates: Vec<String> = patch
                .iter()
                .map(|(field, _)| format!("{col} = excluded.{col}", col = field.column()))
                .collect();
            format!(
                "DO UPDATE SET {}, updated_at = CURRENT_TIMESTAMP",
                updates.join(", ")
            )
        };

        let sql = format!(
            "INSERT INTO monthly_data ({}) VALUES ({}) ON CONFLICT(region_id, period_id) {}",
            columns.join(", "),
            placeholders.join(", "),
            on_conflict
        );

        self.conn
            .execute(&sql, params_from_iter(values))
            .with_context(|| {
                format!("Failed to upsert monthly data (region {}, period {})", region_id, period_id)
            })?;

        self.monthly_row(region_id, period_id)
    }

    fn read_setting(&self, key: &str) -> Result<Option<Setting>> {
        let setting = self
            .conn
            .query_row(
                "SELECT key, value, description FROM settings WHERE key = ?1",
                params![key],
                |row| {
                    Ok(Setting {
                        key: row.get(0)?,
                        value: row.get(1)?,
                        description: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(setting)
    }

    fn write_setting(
        &mut self,
        key: &str,
        value: &str,
        description: Option<&str>,
    ) -> Result<Setting> {
        self.conn.execute(
            "INSERT INTO settings (key, value, description) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                description = COALESCE(excluded.description, settings.description),
                updated_at = CURRENT_TIMESTAMP",
            params![key, value, description],
        )?;

        self.read_setting(key)?
            .ok_or_else(|| anyhow!("Setting {} vanished after write", key))
    }

    fn list_regions(&self) -> Result<Vec<Region>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, code, name, currency, color FROM regions ORDER BY id")?;
        let regions = stmt
            .query_map([], region_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(regions)
    }

    fn list_periods(&self) -> Result<Vec<Period>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, year, month, name, start_date, end_date
             FROM periods ORDER BY year, month",
        )?;
        let periods = stmt
            .query_map([], period_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(periods)
    }

    fn monthly_for_period(&self, period_id: i64) -> Result<Vec<MonthlyAggregate>> {
        let mut stmt = self.conn.prepare(&format!(
            "{} WHERE period_id = ?1 ORDER BY region_id",
            MONTHLY_SELECT
        ))?;
        let rows = stmt
            .query_map(params![period_id], monthly_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn record_event(&mut self, event: &Event) -> Result<()> {
        let data_json = serde_json::to_string(&event.data)?;

        self.conn.execute(
            "INSERT INTO events (
                event_id, timestamp, event_type, entity_type, entity_id, data, actor
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                event.event_id,
                event.timestamp.to_rfc3339(),
                event.event_type,
                event.entity_type,
                event.entity_id,
                data_json,
                event.actor,
            ],
        )?;

        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> (SqliteStore, Region, Period) {
        let mut store = SqliteStore::in_memory().unwrap();
        let region = store
            .upsert_region(&RegionSeed::new("uz", "Uzbekistan", "UZS", "#3b82f6"))
            .unwrap();
        let period = store.upsert_period(YearMonth::new(2025, 11)).unwrap();
        (store, region, period)
    }

    #[test]
    fn test_single_field_upsert_leaves_other_fields() {
        let (mut store, region, period) = seeded();

        store
            .upsert_monthly_aggregate(
                region.id,
                period.id,
                &MonthlyPatch::new()
                    .with(AggregateField::Revenue, 28_098.0)
                    .with(AggregateField::ActiveClients, 446.0)
                    .with(AggregateField::Salary, 8_000.0),
            )
            .unwrap();

        let row = store
            .upsert_monthly_aggregate(
                region.id,
                period.id,
                &MonthlyPatch::single(AggregateField::Revenue, 29_358.0),
            )
            .unwrap();

        assert_eq!(row.revenue, 29_358.0);
        assert_eq!(row.active_clients, 446);
        assert_eq!(row.salary_expense, 8_000.0);
        assert_eq!(store.monthly_for_period(period.id).unwrap().len(), 1);
    }

    #[test]
    fn test_region_and_period_upserts_are_idempotent() {
        let (mut store, region, period) = seeded();

        let again = store
            .upsert_region(&RegionSeed::new("uz", "Uzbekistan", "USD", "#111111"))
            .unwrap();
        let period_again = store.upsert_period(YearMonth::new(2025, 11)).unwrap();

        assert_eq!(again.id, region.id);
        assert_eq!(again.currency, "USD");
        assert_eq!(period_again.id, period.id);
        assert_eq!(period_again.name, "November 2025");
        assert_eq!(period_again.end_date, NaiveDate::from_ymd_opt(2025, 11, 30).unwrap());
        assert_eq!(store.list_regions().unwrap().len(), 1);
    }

    #[test]
    fn test_list_periods_chronological() {
        let mut store = SqliteStore::in_memory().unwrap();
        store.upsert_period(YearMonth::new(2026, 1)).unwrap();
        store.upsert_period(YearMonth::new(2025, 8)).unwrap();

        let periods = store.list_periods().unwrap();
        assert_eq!(periods[0].year_month(), YearMonth::new(2025, 8));
        assert_eq!(periods[1].year_month(), YearMonth::new(2026, 1));
    }

    #[test]
    fn test_settings_roundtrip() {
        let mut store = SqliteStore::in_memory().unwrap();
        assert!(store.read_setting("cash_balance").unwrap().is_none());

        store
            .write_setting("cash_balance", "365000", Some("Current cash balance"))
            .unwrap();
        let updated = store.write_setting("cash_balance", "300000", None).unwrap();

        assert_eq!(updated.value, "300000");
        assert_eq!(updated.description.as_deref(), Some("Current cash balance"));
    }

    #[test]
    fn test_event_log() {
        let mut store = SqliteStore::in_memory().unwrap();

        let event = Event::new(
            "sales_recorded",
            "monthly_data",
            "1:1",
            serde_json::json!({"revenue": 100.0}),
            "test_actor",
        );
        store.record_event(&event).unwrap();

        let events = store.events_for_entity("monthly_data", "1:1").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "sales_recorded");
        assert_eq!(events[0].data["revenue"], 100.0);
        assert_eq!(store.events_of_type("sales_recorded").unwrap().len(), 1);
    }

    #[test]
    fn test_file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("opsboard.db");

        {
            let mut store = SqliteStore::open(&path).unwrap();
            store
                .upsert_region(&RegionSeed::new("kz", "Kazakhstan", "KZT", "#10b981"))
                .unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert!(store.find_region_by_code("kz").unwrap().is_some());
    }
}
