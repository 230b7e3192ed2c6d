use std::collections::BTreeMap;

use chrono::Duration;

use crate::aggregate::{rolling_std, SHORT_WINDOW};
use crate::models::{
    ComponentMetrics, ComponentScore, ComponentStatus, DailyCount, Forecast, OVERALL_GROUP,
};

pub const FORECAST_DAYS: i64 = 30;
pub const NEUTRAL_SCORE: f64 = 50.0;

/// Produces point forecasts with confidence bounds for one daily series.
pub trait Forecaster {
    fn name(&self) -> &'static str;

    /// `series` holds one group's rows in date order.
    fn forecast_series(&self, series: &[DailyCount]) -> Vec<Forecast>;

    fn forecast_groups(&self, rows: &[DailyCount]) -> Vec<Forecast> {
        let mut groups: BTreeMap<&str, Vec<DailyCount>> = BTreeMap::new();
        for row in rows {
            groups.entry(row.group.as_str()).or_default().push(row.clone());
        }

        let mut forecasts = Vec::new();
        for (group, mut series) in groups {
            series.sort_by_key(|r| r.date);
            let produced = self.forecast_series(&series);
            if produced.is_empty() {
                log::warn!(
                    "{}: no forecast for {group} ({} observations)",
                    self.name(),
                    series.len()
                );
            }
            forecasts.extend(produced);
        }
        forecasts
    }
}

/// Flat baseline: the mean of the last week projected forward, with a normal band
/// from the spread of the last two weeks.
pub struct RollingMeanForecaster {
    pub min_history: usize,
    pub horizon_days: i64,
    pub z: f64,
}

impl RollingMeanForecaster {
    pub fn with_defaults() -> Self {
        Self {
            min_history: 10,
            horizon_days: FORECAST_DAYS,
            z: 1.96,
        }
    }
}

impl Forecaster for RollingMeanForecaster {
    fn name(&self) -> &'static str {
        "rolling_mean"
    }

    fn forecast_series(&self, series: &[DailyCount]) -> Vec<Forecast> {
        let Some(last) = series.last() else {
            return Vec::new();
        };
        let total: u64 = series.iter().map(|r| r.job_count as u64).sum();
        if series.len() < self.min_history || total == 0 {
            return Vec::new();
        }

        let values: Vec<f64> = series.iter().map(|r| r.job_count as f64).collect();
        let recent = &values[values.len().saturating_sub(SHORT_WINDOW)..];
        let point = recent.iter().sum::<f64>() / recent.len() as f64;
        let spread = rolling_std(&values, SHORT_WINDOW * 2)
            .last()
            .copied()
            .flatten()
            .unwrap_or(0.0);
        let margin = self.z * spread;

        (1..=self.horizon_days)
            .map(|offset| Forecast {
                date: last.date + Duration::days(offset),
                category: last.group.clone(),
                forecast: point.max(0.0),
                forecast_lower: (point - margin).max(0.0),
                forecast_upper: (point + margin).max(0.0),
            })
            .collect()
    }
}

/// Scores the most recent forecast point against the latest observed overall count.
pub struct ForecastScorer {
    min_history: usize,
}

impl ForecastScorer {
    pub fn new(min_history: usize) -> Self {
        Self { min_history }
    }

    pub fn with_defaults() -> Self {
        Self::new(SHORT_WINDOW)
    }

    pub fn score(&self, overall: &[DailyCount], forecasts: &[Forecast]) -> ComponentScore {
        if forecasts.is_empty() || overall.len() < self.min_history {
            return neutral(ComponentStatus::InsufficientData, "Not enough history to score forecasts");
        }

        let Some(latest_date) = forecasts.iter().map(|f| f.date).max() else {
            return neutral(ComponentStatus::InsufficientData, "Not enough history to score forecasts");
        };

        let actual = overall
            .iter()
            .filter(|r| r.date <= latest_date)
            .max_by_key(|r| r.date)
            .map(|r| r.job_count)
            .unwrap_or(0);
        if actual == 0 {
            return neutral(ComponentStatus::NoActualData, "No observed postings to compare against");
        }

        let at_latest: Vec<&Forecast> = forecasts.iter().filter(|f| f.date == latest_date).collect();
        let Some(row) = at_latest
            .iter()
            .find(|f| f.category == OVERALL_GROUP)
            .or_else(|| at_latest.first())
        else {
            return neutral(ComponentStatus::NoForecastMatch, "No forecast matches the latest date");
        };

        if !row.forecast.is_finite() {
            log::warn!("forecast for {} on {} is not finite", row.category, row.date);
            return neutral(ComponentStatus::Error, "Forecast value could not be evaluated");
        }

        let actual_f = actual as f64;
        let mape = (actual_f - row.forecast).abs() / actual_f * 100.0;
        let score = (100.0 - mape * 2.5).max(0.0);
        let status = if mape < 15.0 {
            ComponentStatus::Predictable
        } else if mape < 30.0 {
            ComponentStatus::Moderate
        } else {
            ComponentStatus::Volatile
        };

        ComponentScore {
            score: round1(score),
            status,
            description: format!(
                "Market forecast accuracy: {:.1}% (MAPE: {:.1}%)",
                100.0 - mape,
                mape
            ),
            metrics: Some(ComponentMetrics::ForecastAccuracy {
                mape: round1(mape),
                forecast: row.forecast.round(),
                actual,
            }),
        }
    }
}

pub fn neutral(status: ComponentStatus, description: &str) -> ComponentScore {
    ComponentScore {
        score: NEUTRAL_SCORE,
        status,
        description: description.to_string(),
        metrics: None,
    }
}

pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
