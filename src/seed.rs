// 🌱 Seed - sample regions, periods, monthly data and settings
// Bundled as data/seed.json; only applied to an empty database.

use crate::models::{AggregateField, Event, MonthlyPatch, RegionSeed, YearMonth};
use crate::store::MonthlyStore;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

const BUNDLED_SEED: &str = include_str!("../data/seed.json");

/// One region's figures for one period
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonthlySeed {
    pub revenue: f64,
    pub clients: f64,
    pub new_clients: f64,
    pub churn: f64,
    pub salary: f64,
    pub marketing: f64,
    pub office: f64,
    pub software: f64,
    pub other: f64,
}

impl MonthlySeed {
    fn patch(&self) -> MonthlyPatch {
        MonthlyPatch::new()
            .with(AggregateField::Revenue, self.revenue)
            .with(AggregateField::ActiveClients, self.clients)
            .with(AggregateField::NewClients, self.new_clients)
            .with(AggregateField::ChurnedClients, self.churn)
            .with(AggregateField::Salary, self.salary)
            .with(AggregateField::Marketing, self.marketing)
            .with(AggregateField::Office, self.office)
            .with(AggregateField::Software, self.software)
            .with(AggregateField::Other, self.other)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingSeed {
    pub key: String,
    pub value: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedData {
    pub regions: Vec<RegionSeed>,
    pub periods: Vec<YearMonth>,
    /// Region code -> figures, indexed like `periods`
    pub monthly: BTreeMap<String, Vec<MonthlySeed>>,
    pub settings: Vec<SettingSeed>,
}

impl SeedData {
    pub fn bundled() -> Result<Self> {
        serde_json::from_str(BUNDLED_SEED).context("Failed to parse bundled seed data")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SeedOutcome {
    AlreadySeeded {
        periods: usize,
    },
    Seeded {
        regions: usize,
        periods: usize,
        monthly_rows: usize,
        settings: usize,
    },
}

/// Seed the bundled sample data unless periods already exist
pub fn seed_database(store: &mut dyn MonthlyStore) -> Result<SeedOutcome> {
    seed_with(store, &SeedData::bundled()?)
}

pub fn seed_with(store: &mut dyn MonthlyStore, data: &SeedData) -> Result<SeedOutcome> {
    let existing = store.list_periods()?.len();
    if existing > 0 {
        info!(periods = existing, "database already has data, seed skipped");
        return Ok(SeedOutcome::AlreadySeeded { periods: existing });
    }

    let mut regions = Vec::with_capacity(data.regions.len());
    for seed in &data.regions {
        regions.push(store.upsert_region(seed)?);
    }

    let mut periods = Vec::with_capacity(data.periods.len());
    for month in &data.periods {
        periods.push(store.upsert_period(*month)?);
    }

    let mut monthly_rows = 0;
    for (code, figures) in &data.monthly {
        let region = match regions.iter().find(|r| &r.code == code) {
            Some(region) => region,
            None => {
                warn!(code = %code, "seed figures for unknown region skipped");
                continue;
            }
        };

        for (period, seed) in periods.iter().zip(figures) {
            store.upsert_monthly_aggregate(region.id, period.id, &seed.patch())?;
            monthly_rows += 1;
        }
    }

    for setting in &data.settings {
        store.write_setting(&setting.key, &setting.value, setting.description.as_deref())?;
    }

    let outcome = SeedOutcome::Seeded {
        regions: regions.len(),
        periods: periods.len(),
        monthly_rows,
        settings: data.settings.len(),
    };

    store.record_event(&Event::new(
        "database_seeded",
        "database",
        "seed",
        serde_json::to_value(&outcome)?,
        "seeder",
    ))?;

    info!(?outcome, "database seeded");
    Ok(outcome)
}
