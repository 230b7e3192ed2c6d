//! Spike, drop and skill-trend detection over curated tables.

use chrono::{DateTime, Utc};

use crate::aggregate::{rolling_mean, rolling_std};
use crate::models::{Alert, AlertKind, DailyCount, Severity, SkillFrequencyTable};
use crate::skills::compare_recent_weeks;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionThresholds {
    /// Observations a category needs before it is scanned at all.
    pub min_history: usize,
    pub window: usize,
    pub spike_sigma: f64,
    pub spike_high_sigma: f64,
    pub drop_pct: f64,
    pub drop_high_pct: f64,
    pub skill_growth_pct: f64,
    pub epsilon: f64,
}

impl Default for DetectionThresholds {
    fn default() -> Self {
        Self {
            min_history: 14,
            window: 7,
            spike_sigma: 2.0,
            spike_high_sigma: 3.0,
            drop_pct: 30.0,
            drop_high_pct: 50.0,
            skill_growth_pct: 50.0,
            epsilon: 1e-6,
        }
    }
}

pub struct AnomalyDetector {
    thresholds: DetectionThresholds,
}

impl AnomalyDetector {
    pub fn new(thresholds: DetectionThresholds) -> Self {
        Self { thresholds }
    }

    /// Runs every detector. All alerts share `now` as their generation time.
    pub fn generate_alerts(
        &self,
        by_category: &[DailyCount],
        skills: Option<&SkillFrequencyTable>,
        now: DateTime<Utc>,
    ) -> Vec<Alert> {
        let mut alerts = self.detect_spikes(by_category, now);
        alerts.extend(self.detect_drops(by_category, now));
        if let Some(table) = skills {
            alerts.extend(self.detect_skill_trends(table, now));
        }
        alerts
    }

    /// Flags days whose z-score against the trailing window exceeds `spike_sigma`.
    pub fn detect_spikes(&self, rows: &[DailyCount], now: DateTime<Utc>) -> Vec<Alert> {
        let t = &self.thresholds;
        let mut alerts = Vec::new();

        for (category, series) in self.eligible_series(rows) {
            let values: Vec<f64> = series.iter().map(|r| r.job_count as f64).collect();
            let means = rolling_mean(&values, t.window);
            let stds = rolling_std(&values, t.window);

            for (i, row) in series.iter().enumerate() {
                // A one-value window has no spread, so it cannot be a spike.
                let Some(std) = stds[i] else { continue };
                let z_score = (values[i] - means[i]) / (std + t.epsilon);
                if z_score <= t.spike_sigma {
                    continue;
                }

                let severity = if z_score > t.spike_high_sigma {
                    Severity::High
                } else {
                    Severity::Medium
                };
                let kind = AlertKind::Spike {
                    category: category.to_string(),
                    date: row.date,
                    job_count: row.job_count,
                    expected_count: means[i],
                    z_score,
                };
                let message = format!(
                    "Spike detected: {} jobs (expected ~{})",
                    row.job_count,
                    means[i] as i64
                );
                alerts.push(build_alert(kind, severity, message, now));
            }
        }

        alerts
    }

    /// Flags days more than `drop_pct` percent below the trailing mean.
    pub fn detect_drops(&self, rows: &[DailyCount], now: DateTime<Utc>) -> Vec<Alert> {
        let t = &self.thresholds;
        let mut alerts = Vec::new();

        for (category, series) in self.eligible_series(rows) {
            let values: Vec<f64> = series.iter().map(|r| r.job_count as f64).collect();
            let means = rolling_mean(&values, t.window);

            for (i, row) in series.iter().enumerate() {
                let pct_change = (values[i] - means[i]) / (means[i] + t.epsilon) * 100.0;
                if pct_change >= -t.drop_pct {
                    continue;
                }

                let severity = if pct_change.abs() > t.drop_high_pct {
                    Severity::High
                } else {
                    Severity::Medium
                };
                let kind = AlertKind::Drop {
                    category: category.to_string(),
                    date: row.date,
                    job_count: row.job_count,
                    expected_count: means[i],
                    pct_change,
                };
                let message = format!(
                    "Drop detected: {} jobs ({:.1}% decrease)",
                    row.job_count, pct_change
                );
                alerts.push(build_alert(kind, severity, message, now));
            }
        }

        alerts
    }

    pub fn detect_skill_trends(&self, table: &SkillFrequencyTable, now: DateTime<Utc>) -> Vec<Alert> {
        let Some(growth) = compare_recent_weeks(table, self.thresholds.window) else {
            return Vec::new();
        };

        growth
            .into_iter()
            .filter(|g| g.growth_pct > self.thresholds.skill_growth_pct)
            .map(|g| {
                let message = format!(
                    "Emerging skill trend: {} (+{:.1}% growth)",
                    g.skill, g.growth_pct
                );
                let kind = AlertKind::SkillTrend {
                    skill: g.skill,
                    recent_count: g.recent_count,
                    previous_count: g.previous_count,
                    growth_rate: g.growth_pct,
                };
                build_alert(kind, Severity::Medium, message, now)
            })
            .collect()
    }

    /// Per-category series in date order, in order of first appearance, dropping
    /// categories with too little history.
    fn eligible_series<'a>(&self, rows: &'a [DailyCount]) -> Vec<(&'a str, Vec<&'a DailyCount>)> {
        let mut groups: Vec<(&'a str, Vec<&'a DailyCount>)> = Vec::new();
        for row in rows {
            match groups.iter_mut().find(|(name, _)| *name == row.group) {
                Some((_, series)) => series.push(row),
                None => groups.push((row.group.as_str(), vec![row])),
            }
        }

        groups
            .into_iter()
            .filter(|(category, series)| {
                let eligible = series.len() >= self.thresholds.min_history;
                if !eligible {
                    log::debug!(
                        "skipping {category}: {} observations, need {}",
                        series.len(),
                        self.thresholds.min_history
                    );
                }
                eligible
            })
            .map(|(category, mut series)| {
                series.sort_by_key(|r| r.date);
                (category, series)
            })
            .collect()
    }
}

fn build_alert(kind: AlertKind, severity: Severity, message: String, now: DateTime<Utc>) -> Alert {
    Alert {
        id: format!("{}_{}_{}", kind.type_name(), kind.subject(), now.timestamp_micros()),
        generated_at: now,
        severity,
        message,
        kind,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SkillCount;
    use chrono::{Duration, NaiveDate, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 6, 0, 0).unwrap()
    }

    fn series(category: &str, counts: &[u32]) -> Vec<DailyCount> {
        let start = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        counts
            .iter()
            .enumerate()
            .map(|(i, &job_count)| DailyCount {
                date: start + Duration::days(i as i64),
                group: category.to_string(),
                job_count,
                rolling_7d: 0.0,
                rolling_30d: 0.0,
            })
            .collect()
    }

    fn skill_table(days: usize, per_day: impl Fn(usize) -> Vec<(&'static str, u64)>) -> SkillFrequencyTable {
        let start = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let mut table = SkillFrequencyTable::default();
        for d in 0..days {
            let key = (start + Duration::days(d as i64)).to_string();
            let counts = per_day(d)
                .into_iter()
                .map(|(skill, count)| SkillCount { skill: skill.to_string(), count })
                .collect();
            table.by_date.insert(key, counts);
        }
        table
    }

    #[test]
    fn short_history_never_alerts() {
        let detector = AnomalyDetector::new(DetectionThresholds::default());
        let rows = series("Data", &[5, 5, 5, 5, 5, 5, 5, 20]);
        assert!(detector.detect_spikes(&rows, now()).is_empty());
        assert!(detector.detect_drops(&rows, now()).is_empty());
    }

    #[test]
    fn thirteen_days_is_one_short() {
        let detector = AnomalyDetector::new(DetectionThresholds::default());
        let mut counts = vec![10; 12];
        counts.push(60);
        let rows = series("Data", &counts);
        assert!(detector.generate_alerts(&rows, None, now()).is_empty());

        counts.insert(0, 10);
        let rows = series("Data", &counts);
        assert_eq!(detector.detect_spikes(&rows, now()).len(), 1);
    }

    #[test]
    fn isolated_jump_is_a_spike() {
        let detector = AnomalyDetector::new(DetectionThresholds::default());
        let mut counts = vec![10; 20];
        counts[17] = 35;
        let rows = series("ML", &counts);

        let spikes = detector.detect_spikes(&rows, now());
        assert_eq!(spikes.len(), 1);
        let spike = &spikes[0];
        match &spike.kind {
            AlertKind::Spike { category, date, job_count, z_score, .. } => {
                assert_eq!(category, "ML");
                assert_eq!(*date, NaiveDate::from_ymd_opt(2026, 1, 18).unwrap());
                assert_eq!(*job_count, 35);
                assert!(*z_score > 2.0 && *z_score < 3.0);
            }
            other => panic!("unexpected alert {other:?}"),
        }
        assert_eq!(spike.severity, Severity::Medium);
        assert_eq!(spike.generated_at, now());
        assert!(spike.id.starts_with("spike_ML_"));
        assert!(detector.detect_drops(&rows, now()).is_empty());
    }

    #[test]
    fn flat_series_never_spikes() {
        let detector = AnomalyDetector::new(DetectionThresholds::default());
        let rows = series("Ops", &[8; 21]);
        assert!(detector.generate_alerts(&rows, None, now()).is_empty());
    }

    #[test]
    fn deep_drop_is_high_severity() {
        let detector = AnomalyDetector::new(DetectionThresholds::default());
        let mut counts = vec![20; 16];
        counts[15] = 2;
        let rows = series("Data", &counts);

        let drops = detector.detect_drops(&rows, now());
        assert_eq!(drops.len(), 1);
        assert_eq!(drops[0].severity, Severity::High);
        match &drops[0].kind {
            AlertKind::Drop { pct_change, expected_count, .. } => {
                // mean of six 20s and one 2 is 17.43
                assert!((*expected_count - 122.0 / 7.0).abs() < 1e-9);
                assert!(*pct_change < -50.0);
            }
            other => panic!("unexpected alert {other:?}"),
        }
    }

    #[test]
    fn moderate_drop_is_medium_severity() {
        let detector = AnomalyDetector::new(DetectionThresholds::default());
        let mut counts = vec![20; 16];
        counts[15] = 11;
        let rows = series("Data", &counts);

        let drops = detector.detect_drops(&rows, now());
        assert_eq!(drops.len(), 1);
        assert_eq!(drops[0].severity, Severity::Medium);
    }

    #[test]
    fn categories_are_scanned_independently() {
        let detector = AnomalyDetector::new(DetectionThresholds::default());
        let mut ml = vec![10; 20];
        ml[17] = 35;
        let mut rows = series("ML", &ml);
        rows.extend(series("Data", &[5, 5, 5, 5, 5, 5, 5, 20]));

        let alerts = detector.generate_alerts(&rows, None, now());
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind.subject(), "ML");
    }

    #[test]
    fn skill_trend_requires_prior_occurrences() {
        let detector = AnomalyDetector::new(DetectionThresholds::default());
        let table = skill_table(14, |d| {
            if d < 7 {
                vec![("python", 2)]
            } else {
                vec![("python", 4), ("rust", 9)]
            }
        });

        let alerts = detector.detect_skill_trends(&table, now());
        assert_eq!(alerts.len(), 1);
        match &alerts[0].kind {
            AlertKind::SkillTrend { skill, recent_count, previous_count, growth_rate } => {
                assert_eq!(skill, "python");
                assert_eq!(*recent_count, 28);
                assert_eq!(*previous_count, 14);
                assert!((*growth_rate - 100.0).abs() < 1e-9);
            }
            other => panic!("unexpected alert {other:?}"),
        }
        assert_eq!(alerts[0].severity, Severity::Medium);
    }

    #[test]
    fn modest_skill_growth_is_ignored() {
        let detector = AnomalyDetector::new(DetectionThresholds::default());
        let table = skill_table(14, |d| if d < 7 { vec![("sql", 10)] } else { vec![("sql", 15)] });
        assert!(detector.detect_skill_trends(&table, now()).is_empty());
    }

    #[test]
    fn skill_trends_need_two_weeks_of_dates() {
        let detector = AnomalyDetector::new(DetectionThresholds::default());
        let table = skill_table(13, |d| vec![("python", 1 + d as u64 * 10)]);
        assert!(detector.detect_skill_trends(&table, now()).is_empty());
    }
}
