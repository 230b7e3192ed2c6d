//! Curated table files shared between pipeline stages.
//!
//! Row tables are CSV, nested documents are JSON. A file that does not exist reads back
//! as `None` so callers can tell an absent table from an empty one.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::models::{
    Alert, CompanyStat, DailyAggregates, DailyCount, Forecast, MomentumIndex, SkillFrequencyTable,
};

pub const AGGREGATES_CATEGORY: &str = "aggregates_category.csv";
pub const AGGREGATES_LOCATION: &str = "aggregates_location.csv";
pub const AGGREGATES_OVERALL: &str = "aggregates_overall.csv";
pub const COMPANY_STATS: &str = "company_stats.csv";
pub const FORECASTS: &str = "forecasts.csv";
pub const SKILL_FREQUENCY: &str = "skill_frequency.json";
pub const ALERTS: &str = "alerts.json";
pub const MOMENTUM_INDEX: &str = "momentum_index.json";
pub const PIPELINE_STATUS: &str = "pipeline_status.json";

#[derive(Debug, Clone)]
pub struct CuratedStore {
    dir: PathBuf,
}

impl CuratedStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    pub fn write_aggregates(&self, aggregates: &DailyAggregates) -> anyhow::Result<()> {
        self.write_csv(AGGREGATES_CATEGORY, &aggregates.by_category)?;
        self.write_csv(AGGREGATES_LOCATION, &aggregates.by_location)?;
        self.write_csv(AGGREGATES_OVERALL, &aggregates.overall)
    }

    pub fn read_daily(&self, name: &str) -> anyhow::Result<Option<Vec<DailyCount>>> {
        self.read_csv(name)
    }

    pub fn write_company_stats(&self, stats: &[CompanyStat]) -> anyhow::Result<()> {
        self.write_csv(COMPANY_STATS, stats)
    }

    pub fn read_company_stats(&self) -> anyhow::Result<Option<Vec<CompanyStat>>> {
        self.read_csv(COMPANY_STATS)
    }

    pub fn write_forecasts(&self, forecasts: &[Forecast]) -> anyhow::Result<()> {
        self.write_csv(FORECASTS, forecasts)
    }

    pub fn read_forecasts(&self) -> anyhow::Result<Option<Vec<Forecast>>> {
        self.read_csv(FORECASTS)
    }

    pub fn write_skill_frequency(&self, table: &SkillFrequencyTable) -> anyhow::Result<()> {
        self.write_json(SKILL_FREQUENCY, table)
    }

    pub fn read_skill_frequency(&self) -> anyhow::Result<Option<SkillFrequencyTable>> {
        self.read_json(SKILL_FREQUENCY)
    }

    pub fn write_alerts(&self, alerts: &[Alert]) -> anyhow::Result<()> {
        self.write_json(ALERTS, &alerts)
    }

    pub fn read_alerts(&self) -> anyhow::Result<Option<Vec<Alert>>> {
        self.read_json(ALERTS)
    }

    pub fn write_momentum(&self, index: &MomentumIndex) -> anyhow::Result<()> {
        self.write_json(MOMENTUM_INDEX, index)
    }

    pub fn read_momentum(&self) -> anyhow::Result<Option<MomentumIndex>> {
        self.read_json(MOMENTUM_INDEX)
    }

    pub fn write_csv<T: Serialize>(&self, name: &str, rows: &[T]) -> anyhow::Result<()> {
        self.ensure_dir()?;
        let path = self.path(name);
        let mut writer = csv::Writer::from_path(&path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        for row in rows {
            writer
                .serialize(row)
                .with_context(|| format!("failed to write row to {}", path.display()))?;
        }
        writer.flush()?;
        log::debug!("wrote {} rows to {}", rows.len(), path.display());
        Ok(())
    }

    pub fn read_csv<T: DeserializeOwned>(&self, name: &str) -> anyhow::Result<Option<Vec<T>>> {
        let path = self.path(name);
        if !path.exists() {
            return Ok(None);
        }

        let mut reader = csv::Reader::from_path(&path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        let mut rows = Vec::new();
        for result in reader.deserialize::<T>() {
            rows.push(result.with_context(|| format!("malformed row in {}", path.display()))?);
        }
        Ok(Some(rows))
    }

    pub fn write_json<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> anyhow::Result<()> {
        self.ensure_dir()?;
        let path = self.path(name);
        let body = serde_json::to_string_pretty(value)?;
        std::fs::write(&path, body).with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }

    pub fn read_json<T: DeserializeOwned>(&self, name: &str) -> anyhow::Result<Option<T>> {
        let path = self.path(name);
        if !path.exists() {
            return Ok(None);
        }

        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let value = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(Some(value))
    }

    fn ensure_dir(&self) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AlertKind, Severity, OVERALL_GROUP};
    use chrono::{NaiveDate, TimeZone, Utc};

    #[test]
    fn missing_tables_read_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = CuratedStore::new(dir.path().join("curated"));
        assert!(store.read_daily(AGGREGATES_OVERALL).unwrap().is_none());
        assert!(store.read_skill_frequency().unwrap().is_none());
        assert!(store.read_alerts().unwrap().is_none());
        assert!(store.read_company_stats().unwrap().is_none());
    }

    #[test]
    fn empty_table_is_present_but_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = CuratedStore::new(dir.path());
        store.write_forecasts(&[]).unwrap();
        store.write_alerts(&[]).unwrap();
        assert_eq!(store.read_alerts().unwrap(), Some(vec![]));
        assert!(store.path(FORECASTS).exists());
    }

    #[test]
    fn tables_survive_a_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = CuratedStore::new(dir.path());
        let date = NaiveDate::from_ymd_opt(2026, 2, 3).unwrap();

        let overall = vec![DailyCount {
            date,
            group: OVERALL_GROUP.to_string(),
            job_count: 12,
            rolling_7d: 11.5,
            rolling_30d: 10.25,
        }];
        store
            .write_aggregates(&DailyAggregates {
                overall: overall.clone(),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(store.read_daily(AGGREGATES_OVERALL).unwrap(), Some(overall));
        assert_eq!(store.read_daily(AGGREGATES_CATEGORY).unwrap(), Some(vec![]));

        let companies = vec![CompanyStat {
            company_name: "Acme".to_string(),
            job_count: 4,
            avg_salary_min: None,
            avg_salary_max: Some(150000.0),
            primary_location: "Austin".to_string(),
            primary_category: "Data".to_string(),
            first_posted: date,
            last_posted: date,
        }];
        store.write_company_stats(&companies).unwrap();
        assert_eq!(store.read_company_stats().unwrap(), Some(companies));

        let alerts = vec![Alert {
            id: "drop_Data_1".to_string(),
            generated_at: Utc.with_ymd_and_hms(2026, 2, 4, 6, 0, 0).unwrap(),
            severity: Severity::Medium,
            message: "Drop detected".to_string(),
            kind: AlertKind::Drop {
                category: "Data".to_string(),
                date,
                job_count: 3,
                expected_count: 6.5,
                pct_change: -53.8,
            },
        }];
        store.write_alerts(&alerts).unwrap();
        assert_eq!(store.read_alerts().unwrap(), Some(alerts));
    }
}
