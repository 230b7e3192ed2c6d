use std::path::PathBuf;

use anyhow::Context;

use crate::anomaly::DetectionThresholds;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub jobs_path: PathBuf,
    pub curated_dir: PathBuf,
    /// Forecast table from an external model. The built-in baseline is used when unset.
    pub forecasts_path: Option<PathBuf>,
    pub database_url: Option<String>,
    pub thresholds: DetectionThresholds,
}

impl AppConfig {
    /// Reads `JOBS_PATH`, `CURATED_DIR`, `FORECASTS_PATH`, `DATABASE_URL` and the
    /// detection threshold overrides. Call after `dotenv` has loaded any `.env` file.
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = DetectionThresholds::default();
        let thresholds = DetectionThresholds {
            spike_sigma: env_f64("SPIKE_THRESHOLD_SIGMA", defaults.spike_sigma)?,
            drop_pct: env_f64("DROP_THRESHOLD_PERCENT", defaults.drop_pct)?,
            skill_growth_pct: env_f64("SKILL_GROWTH_THRESHOLD", defaults.skill_growth_pct)?,
            ..defaults
        };

        Ok(Self {
            jobs_path: std::env::var("JOBS_PATH")
                .unwrap_or_else(|_| "data/curated/jobs_clean.csv".to_string())
                .into(),
            curated_dir: std::env::var("CURATED_DIR")
                .unwrap_or_else(|_| "data/curated".to_string())
                .into(),
            forecasts_path: std::env::var("FORECASTS_PATH").ok().map(PathBuf::from),
            database_url: std::env::var("DATABASE_URL").ok(),
            thresholds,
        })
    }

    pub fn with_overrides(
        mut self,
        jobs_path: Option<PathBuf>,
        curated_dir: Option<PathBuf>,
        forecasts_path: Option<PathBuf>,
    ) -> Self {
        if let Some(path) = jobs_path {
            self.jobs_path = path;
        }
        if let Some(dir) = curated_dir {
            self.curated_dir = dir;
        }
        if forecasts_path.is_some() {
            self.forecasts_path = forecasts_path;
        }
        self
    }

    pub fn require_database_url(&self) -> anyhow::Result<&str> {
        self.database_url
            .as_deref()
            .context("DATABASE_URL must be set to a production Postgres instance")
    }
}

fn env_f64(key: &str, default: f64) -> anyhow::Result<f64> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<f64>()
            .with_context(|| format!("{key} must be a number, got {raw:?}")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AppConfig {
        AppConfig {
            jobs_path: "jobs.csv".into(),
            curated_dir: "curated".into(),
            forecasts_path: None,
            database_url: None,
            thresholds: DetectionThresholds::default(),
        }
    }

    #[test]
    fn overrides_replace_only_given_values() {
        let config = sample().with_overrides(None, Some("out".into()), Some("f.csv".into()));
        assert_eq!(config.jobs_path, PathBuf::from("jobs.csv"));
        assert_eq!(config.curated_dir, PathBuf::from("out"));
        assert_eq!(config.forecasts_path, Some(PathBuf::from("f.csv")));
    }

    #[test]
    fn database_url_is_required_for_postgres_commands() {
        assert!(sample().require_database_url().is_err());
        let mut config = sample();
        config.database_url = Some("postgres://localhost/momentum".to_string());
        assert_eq!(config.require_database_url().unwrap(), "postgres://localhost/momentum");
    }

    #[test]
    fn default_thresholds_match_detection_contract() {
        let t = DetectionThresholds::default();
        assert_eq!(t.min_history, 14);
        assert_eq!(t.spike_sigma, 2.0);
        assert_eq!(t.drop_pct, 30.0);
        assert_eq!(t.skill_growth_pct, 50.0);
    }
}
