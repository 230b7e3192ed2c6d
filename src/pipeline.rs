use std::collections::BTreeMap;
use std::time::Instant;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregate;
use crate::anomaly::AnomalyDetector;
use crate::config::AppConfig;
use crate::forecast::{ForecastScorer, Forecaster, RollingMeanForecaster};
use crate::ingest;
use crate::models::{
    Alert, CompanyStat, DailyAggregates, Forecast, MomentumIndex, SkillFrequencyTable,
};
use crate::momentum::{MomentumComposer, MomentumInputs};
use crate::skills;
use crate::store::{self, CuratedStore};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageStatus {
    pub success: bool,
    pub duration_secs: f64,
    pub records: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStatus {
    pub started_at: DateTime<Utc>,
    pub stages: BTreeMap<String, StageStatus>,
    pub success: bool,
    pub total_duration_secs: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub momentum_score: Option<f64>,
    #[serde(skip)]
    running: Option<(String, Instant)>,
}

impl PipelineStatus {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            stages: BTreeMap::new(),
            success: false,
            total_duration_secs: 0.0,
            error: None,
            momentum_score: None,
            running: None,
        }
    }

    fn begin(&mut self, stage: &str) -> Instant {
        let started = Instant::now();
        self.running = Some((stage.to_string(), started));
        started
    }

    fn record(&mut self, stage: &str, started: Instant, records: usize, note: Option<String>) {
        self.running = None;
        let duration_secs = started.elapsed().as_secs_f64();
        log::info!("[{stage}] {records} records in {duration_secs:.2}s");
        self.stages.insert(
            stage.to_string(),
            StageStatus {
                success: true,
                duration_secs,
                records,
                note,
            },
        );
    }

    /// Marks the stage that was in progress when the run failed.
    fn fail(&mut self, err: &anyhow::Error) {
        self.error = Some(format!("{err:#}"));
        if let Some((stage, started)) = self.running.take() {
            self.stages.insert(
                stage,
                StageStatus {
                    success: false,
                    duration_secs: started.elapsed().as_secs_f64(),
                    records: 0,
                    note: Some(format!("{err:#}")),
                },
            );
        }
    }
}

#[derive(Debug)]
pub struct PipelineOutput {
    pub aggregates: DailyAggregates,
    pub skills: SkillFrequencyTable,
    pub companies: Vec<CompanyStat>,
    pub forecasts: Vec<Forecast>,
    pub alerts: Vec<Alert>,
    pub momentum: MomentumIndex,
    pub status: PipelineStatus,
}

/// Full run: aggregate, index skills, forecast, detect, compose, then persist every
/// curated table plus the run status.
pub fn run(config: &AppConfig, now: DateTime<Utc>) -> anyhow::Result<PipelineOutput> {
    let store = CuratedStore::new(&config.curated_dir);
    let mut status = PipelineStatus::new(now);
    let run_started = Instant::now();

    match execute(config, &store, now, &mut status) {
        Ok(mut output) => {
            status.success = true;
            status.total_duration_secs = run_started.elapsed().as_secs_f64();
            status.momentum_score = Some(output.momentum.overall_score);
            store.write_json(store::PIPELINE_STATUS, &status)?;
            log::info!(
                "pipeline finished in {:.2}s",
                status.total_duration_secs
            );
            output.status = status;
            Ok(output)
        }
        Err(err) => {
            status.fail(&err);
            status.total_duration_secs = run_started.elapsed().as_secs_f64();
            log::error!("pipeline failed: {err:#}");
            if let Err(write_err) = store.write_json(store::PIPELINE_STATUS, &status) {
                log::error!("could not record pipeline status: {write_err:#}");
            }
            Err(err)
        }
    }
}

fn execute(
    config: &AppConfig,
    store: &CuratedStore,
    now: DateTime<Utc>,
    status: &mut PipelineStatus,
) -> anyhow::Result<PipelineOutput> {
    let started = status.begin("load");
    let ingested = ingest::load_jobs(&config.jobs_path)
        .with_context(|| format!("job records unavailable at {}", config.jobs_path.display()))?;
    let note = (ingested.dropped > 0).then(|| format!("{} rows without a valid date", ingested.dropped));
    status.record("load", started, ingested.jobs.len(), note);
    let jobs = ingested.jobs;

    let started = status.begin("aggregate");
    let aggregates = aggregate::aggregate(&jobs);
    let companies = aggregate::company_stats(&jobs);
    store.write_aggregates(&aggregates)?;
    store.write_company_stats(&companies)?;
    status.record("aggregate", started, aggregates.overall.len(), None);

    let started = status.begin("skills");
    let skill_table = skills::index_skills(&jobs);
    store.write_skill_frequency(&skill_table)?;
    status.record("skills", started, skill_table.overall.len(), None);

    let started = status.begin("forecast");
    let (forecasts, source) = load_or_build_forecasts(config, &aggregates)?;
    store.write_forecasts(&forecasts)?;
    status.record("forecast", started, forecasts.len(), Some(source));

    let started = status.begin("alerts");
    let detector = AnomalyDetector::new(config.thresholds);
    let alerts = detector.generate_alerts(&aggregates.by_category, Some(&skill_table), now);
    store.write_alerts(&alerts)?;
    status.record("alerts", started, alerts.len(), Some(alert_mix(&alerts)));

    let started = status.begin("momentum");
    let composer = MomentumComposer::new(
        ForecastScorer::with_defaults(),
        config.thresholds.skill_growth_pct,
    );
    let inputs = MomentumInputs {
        overall: Some(aggregates.overall.as_slice()),
        skills: Some(&skill_table),
        forecasts: Some(forecasts.as_slice()),
        alerts: Some(alerts.as_slice()),
        companies: Some(companies.as_slice()),
    };
    let momentum = composer.compose(&inputs, now);
    store.write_momentum(&momentum)?;
    status.record("momentum", started, 1, momentum.warning.clone());

    Ok(PipelineOutput {
        aggregates,
        skills: skill_table,
        companies,
        forecasts,
        alerts,
        momentum,
        status: PipelineStatus::new(now),
    })
}

fn load_or_build_forecasts(
    config: &AppConfig,
    aggregates: &DailyAggregates,
) -> anyhow::Result<(Vec<Forecast>, String)> {
    if let Some(path) = &config.forecasts_path {
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("failed to open forecasts {}", path.display()))?;
        let mut forecasts = Vec::new();
        for result in reader.deserialize::<Forecast>() {
            let mut row = result.with_context(|| format!("malformed forecast in {}", path.display()))?;
            row.forecast = row.forecast.max(0.0);
            row.forecast_lower = row.forecast_lower.max(0.0);
            row.forecast_upper = row.forecast_upper.max(0.0);
            forecasts.push(row);
        }
        return Ok((forecasts, format!("external: {}", path.display())));
    }

    let forecaster = RollingMeanForecaster::with_defaults();
    let mut forecasts = forecaster.forecast_groups(&aggregates.by_category);
    forecasts.extend(forecaster.forecast_groups(&aggregates.overall));
    if forecasts.is_empty() {
        log::warn!("no forecasts generated, every series is too short");
    }
    Ok((forecasts, forecaster.name().to_string()))
}

fn alert_mix(alerts: &[Alert]) -> String {
    let spikes = alerts.iter().filter(|a| a.is_spike()).count();
    let drops = alerts.iter().filter(|a| a.is_drop()).count();
    let trends = alerts.iter().filter(|a| a.is_skill_trend()).count();
    format!("{spikes} spikes, {drops} drops, {trends} skill trends")
}

/// Re-runs aggregation and skill indexing only.
pub fn aggregate_only(config: &AppConfig) -> anyhow::Result<(DailyAggregates, SkillFrequencyTable)> {
    let store = CuratedStore::new(&config.curated_dir);
    let jobs = ingest::load_jobs(&config.jobs_path)?.jobs;

    let aggregates = aggregate::aggregate(&jobs);
    let skill_table = skills::index_skills(&jobs);
    store.write_aggregates(&aggregates)?;
    store.write_company_stats(&aggregate::company_stats(&jobs))?;
    store.write_skill_frequency(&skill_table)?;
    Ok((aggregates, skill_table))
}

/// Regenerates alerts from the curated category counts and skill table.
pub fn alerts_from_store(config: &AppConfig, now: DateTime<Utc>) -> anyhow::Result<Vec<Alert>> {
    let store = CuratedStore::new(&config.curated_dir);
    let by_category = store
        .read_daily(store::AGGREGATES_CATEGORY)?
        .with_context(|| {
            format!(
                "category aggregates not found in {}; run the aggregate step first",
                store.dir().display()
            )
        })?;
    let skill_table = store.read_skill_frequency()?;
    if skill_table.is_none() {
        log::warn!("skill frequency table missing, skipping skill trend detection");
    }

    let detector = AnomalyDetector::new(config.thresholds);
    let alerts = detector.generate_alerts(&by_category, skill_table.as_ref(), now);
    store.write_alerts(&alerts)?;
    log::info!("generated {} alerts ({})", alerts.len(), alert_mix(&alerts));
    Ok(alerts)
}

/// Composes the index from whatever curated tables exist. Never fails on missing
/// tables; those produce the default index.
pub fn momentum_from_store(config: &AppConfig, now: DateTime<Utc>) -> anyhow::Result<MomentumIndex> {
    let store = CuratedStore::new(&config.curated_dir);
    let overall = store.read_daily(store::AGGREGATES_OVERALL)?;
    let skill_table = store.read_skill_frequency()?;
    let forecasts = store.read_forecasts()?;
    let alerts = store.read_alerts()?;
    let companies = store.read_company_stats()?;

    let inputs = MomentumInputs {
        overall: overall.as_deref(),
        skills: skill_table.as_ref(),
        forecasts: forecasts.as_deref(),
        alerts: alerts.as_deref(),
        companies: companies.as_deref(),
    };
    let composer = MomentumComposer::new(
        ForecastScorer::with_defaults(),
        config.thresholds.skill_growth_pct,
    );
    let index = composer.compose(&inputs, now);
    store.write_momentum(&index)?;
    Ok(index)
}
