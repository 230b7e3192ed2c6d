use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub const UNKNOWN_LABEL: &str = "Unknown";
pub const OVERALL_GROUP: &str = "All";

/// Normalized skill list for one posting.
///
/// Upstream extractors emit skills as a missing field, a single string, a list, or a
/// delimited string in flat files. Everything is folded into this type at ingestion so
/// consumers only ever see a slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkillSet {
    Missing,
    Listed(Vec<String>),
}

impl SkillSet {
    pub fn from_list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let skills = items
            .into_iter()
            .map(|s| s.as_ref().trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        SkillSet::Listed(skills)
    }

    pub fn from_delimited(raw: &str) -> Self {
        if raw.trim().is_empty() {
            return SkillSet::Missing;
        }
        SkillSet::from_list(raw.split(|c| c == ';' || c == '|' || c == ','))
    }

    pub fn as_slice(&self) -> &[String] {
        match self {
            SkillSet::Missing => &[],
            SkillSet::Listed(skills) => skills,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct JobRecord {
    pub category: String,
    pub location: String,
    pub company: String,
    pub posted_date: NaiveDate,
    pub skills: SkillSet,
    pub salary_min: Option<f64>,
    pub salary_max: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyCount {
    pub date: NaiveDate,
    pub group: String,
    pub job_count: u32,
    pub rolling_7d: f64,
    pub rolling_30d: f64,
}

#[derive(Debug, Clone, Default)]
pub struct DailyAggregates {
    pub by_category: Vec<DailyCount>,
    pub by_location: Vec<DailyCount>,
    pub overall: Vec<DailyCount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillCount {
    pub skill: String,
    pub count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SkillFrequencyTable {
    pub overall: Vec<SkillCount>,
    pub by_category: BTreeMap<String, Vec<SkillCount>>,
    pub by_date: BTreeMap<String, Vec<SkillCount>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillGrowth {
    pub skill: String,
    pub recent_count: u64,
    pub previous_count: u64,
    pub growth_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyStat {
    pub company_name: String,
    pub job_count: u32,
    pub avg_salary_min: Option<f64>,
    pub avg_salary_max: Option<f64>,
    pub primary_location: String,
    pub primary_category: String,
    pub first_posted: NaiveDate,
    pub last_posted: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub date: NaiveDate,
    pub category: String,
    pub forecast: f64,
    pub forecast_lower: f64,
    pub forecast_upper: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AlertKind {
    Spike {
        category: String,
        date: NaiveDate,
        job_count: u32,
        expected_count: f64,
        z_score: f64,
    },
    Drop {
        category: String,
        date: NaiveDate,
        job_count: u32,
        expected_count: f64,
        pct_change: f64,
    },
    SkillTrend {
        skill: String,
        recent_count: u64,
        previous_count: u64,
        growth_rate: f64,
    },
}

impl AlertKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            AlertKind::Spike { .. } => "spike",
            AlertKind::Drop { .. } => "drop",
            AlertKind::SkillTrend { .. } => "skill_trend",
        }
    }

    /// Category for count alerts, skill name for trend alerts.
    pub fn subject(&self) -> &str {
        match self {
            AlertKind::Spike { category, .. } | AlertKind::Drop { category, .. } => category,
            AlertKind::SkillTrend { skill, .. } => skill,
        }
    }

    pub fn date(&self) -> Option<NaiveDate> {
        match self {
            AlertKind::Spike { date, .. } | AlertKind::Drop { date, .. } => Some(*date),
            AlertKind::SkillTrend { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub generated_at: DateTime<Utc>,
    pub severity: Severity,
    pub message: String,
    #[serde(flatten)]
    pub kind: AlertKind,
}

impl Alert {
    pub fn is_spike(&self) -> bool {
        matches!(self.kind, AlertKind::Spike { .. })
    }

    pub fn is_drop(&self) -> bool {
        matches!(self.kind, AlertKind::Drop { .. })
    }

    pub fn is_skill_trend(&self) -> bool {
        matches!(self.kind, AlertKind::SkillTrend { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentStatus {
    InsufficientData,
    Error,
    NoActualData,
    NoForecastMatch,
    Growing,
    Declining,
    Stable,
    HighMomentum,
    Moderate,
    Low,
    Predictable,
    Volatile,
    Active,
    Quiet,
    Diverse,
    Concentrated,
}

impl ComponentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentStatus::InsufficientData => "insufficient_data",
            ComponentStatus::Error => "error",
            ComponentStatus::NoActualData => "no_actual_data",
            ComponentStatus::NoForecastMatch => "no_forecast_match",
            ComponentStatus::Growing => "growing",
            ComponentStatus::Declining => "declining",
            ComponentStatus::Stable => "stable",
            ComponentStatus::HighMomentum => "high_momentum",
            ComponentStatus::Moderate => "moderate",
            ComponentStatus::Low => "low",
            ComponentStatus::Predictable => "predictable",
            ComponentStatus::Volatile => "volatile",
            ComponentStatus::Active => "active",
            ComponentStatus::Quiet => "quiet",
            ComponentStatus::Diverse => "diverse",
            ComponentStatus::Concentrated => "concentrated",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopCompany {
    pub company_name: String,
    pub job_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "component", rename_all = "snake_case")]
pub enum ComponentMetrics {
    PostingVelocity {
        change_pct: f64,
        recent_count: u32,
        previous_count: u32,
    },
    SkillVelocity {
        trending_skills_count: usize,
        trending_skills: Vec<SkillGrowth>,
    },
    ForecastAccuracy {
        mape: f64,
        forecast: f64,
        actual: u32,
    },
    MarketActivity {
        total_alerts: usize,
        spikes: usize,
        drops: usize,
        skill_trends: usize,
    },
    CompanyDiversity {
        unique_companies: usize,
        top_companies: Vec<TopCompany>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentScore {
    pub score: f64,
    pub status: ComponentStatus,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<ComponentMetrics>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MomentumComponents {
    pub posting_velocity: ComponentScore,
    pub skill_velocity: ComponentScore,
    pub forecast_accuracy: ComponentScore,
    pub market_activity: ComponentScore,
    pub company_diversity: ComponentScore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketBand {
    Hot,
    Growing,
    Stable,
    Cooling,
    Cold,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interpretation {
    pub band: MarketBand,
    pub label: String,
    pub description: String,
    pub for_job_seekers: String,
    pub for_recruiters: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComponentWeights {
    pub posting_velocity: f64,
    pub skill_velocity: f64,
    pub forecast_accuracy: f64,
    pub market_activity: f64,
    pub company_diversity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Methodology {
    pub weights: ComponentWeights,
    pub scale: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MomentumIndex {
    pub overall_score: f64,
    pub components: MomentumComponents,
    pub interpretation: Interpretation,
    pub recommendation: String,
    pub calculated_at: DateTime<Utc>,
    pub methodology: Methodology,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AlertSummary {
    pub alert_type: String,
    pub count: usize,
    pub high_count: usize,
}

#[derive(Debug, Clone)]
pub struct MomentumSnapshot {
    pub run_id: uuid::Uuid,
    pub overall_score: f64,
    pub band: String,
    pub alert_count: i64,
    pub calculated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delimited_skills_drop_blank_entries() {
        let skills = SkillSet::from_delimited("python; sql;; rust ");
        assert_eq!(skills.as_slice(), ["python", "sql", "rust"]);
    }

    #[test]
    fn blank_field_is_missing_not_empty_list() {
        assert_eq!(SkillSet::from_delimited("   "), SkillSet::Missing);
        assert_eq!(SkillSet::from_list(Vec::<String>::new()), SkillSet::Listed(vec![]));
        assert!(SkillSet::Missing.is_empty());
    }

    #[test]
    fn alert_serializes_with_flat_type_tag() {
        let alert = Alert {
            id: "spike_ML_1".to_string(),
            generated_at: DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            severity: Severity::High,
            message: "Spike detected".to_string(),
            kind: AlertKind::Spike {
                category: "ML".to_string(),
                date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
                job_count: 35,
                expected_count: 13.5,
                z_score: 3.2,
            },
        };

        let value = serde_json::to_value(&alert).unwrap();
        assert_eq!(value["type"], "spike");
        assert_eq!(value["severity"], "high");
        assert_eq!(value["category"], "ML");

        let parsed: Alert = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, alert);
    }
}
