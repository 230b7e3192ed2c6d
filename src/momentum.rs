//! Job market momentum index: five sub-scores folded into one 0-100 reading.
//!
//! Every component degrades to a neutral 50.0 on short or broken input instead of
//! failing, and a missing input table short-circuits to [`default_index`].

use chrono::{DateTime, Duration, Utc};

use crate::forecast::{neutral, round1, ForecastScorer, NEUTRAL_SCORE};
use crate::models::{
    Alert, CompanyStat, ComponentMetrics, ComponentScore, ComponentStatus, ComponentWeights,
    DailyCount, Forecast, Interpretation, MarketBand, Methodology, MomentumComponents,
    MomentumIndex, SkillFrequencyTable, SkillGrowth, TopCompany,
};
use crate::skills::{compare_recent_weeks, TREND_WINDOW_DATES};

pub const MOMENTUM_WEIGHTS: ComponentWeights = ComponentWeights {
    posting_velocity: 0.30,
    skill_velocity: 0.25,
    forecast_accuracy: 0.20,
    market_activity: 0.15,
    company_diversity: 0.10,
};

pub const SCALE_NOTE: &str = "0-100 (higher = stronger momentum)";
pub const DEFAULT_RECOMMENDATION: &str =
    "Insufficient data for an accurate momentum reading. Run the full pipeline to collect more data.";

const VELOCITY_MIN_HISTORY: usize = 14;
const MAX_TRENDING_SKILLS: usize = 10;
const DISPLAYED_TRENDING_SKILLS: usize = 5;
const DISPLAYED_COMPANIES: usize = 5;
const DIVERSITY_SATURATION: f64 = 50.0;

impl ComponentWeights {
    /// Weighted sum of the component scores, each clamped to [0, 100] first.
    pub fn combine(&self, components: &MomentumComponents) -> f64 {
        let c = |score: &ComponentScore| score.score.clamp(0.0, 100.0);
        c(&components.posting_velocity) * self.posting_velocity
            + c(&components.skill_velocity) * self.skill_velocity
            + c(&components.forecast_accuracy) * self.forecast_accuracy
            + c(&components.market_activity) * self.market_activity
            + c(&components.company_diversity) * self.company_diversity
    }
}

/// Curated tables feeding the index. `None` means the table was not produced at all,
/// which is different from a table with no rows.
#[derive(Debug, Clone, Copy, Default)]
pub struct MomentumInputs<'a> {
    pub overall: Option<&'a [DailyCount]>,
    pub skills: Option<&'a SkillFrequencyTable>,
    pub forecasts: Option<&'a [Forecast]>,
    pub alerts: Option<&'a [Alert]>,
    pub companies: Option<&'a [CompanyStat]>,
}

impl MomentumInputs<'_> {
    pub fn missing_tables(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.overall.is_none() {
            missing.push("overall_counts");
        }
        if self.skills.is_none() {
            missing.push("skill_frequency");
        }
        if self.forecasts.is_none() {
            missing.push("forecasts");
        }
        if self.alerts.is_none() {
            missing.push("alerts");
        }
        if self.companies.is_none() {
            missing.push("company_stats");
        }
        missing
    }
}

pub struct MomentumComposer {
    forecast_scorer: ForecastScorer,
    skill_growth_pct: f64,
}

impl MomentumComposer {
    pub fn new(forecast_scorer: ForecastScorer, skill_growth_pct: f64) -> Self {
        Self {
            forecast_scorer,
            skill_growth_pct,
        }
    }

    pub fn compose(&self, inputs: &MomentumInputs<'_>, now: DateTime<Utc>) -> MomentumIndex {
        let (Some(overall), Some(skills), Some(forecasts), Some(alerts), Some(companies)) = (
            inputs.overall,
            inputs.skills,
            inputs.forecasts,
            inputs.alerts,
            inputs.companies,
        ) else {
            let missing = inputs.missing_tables();
            log::warn!("missing tables for momentum index: {}", missing.join(", "));
            return default_index(now, &missing);
        };

        let components = MomentumComponents {
            posting_velocity: checked("posting_velocity", posting_velocity(overall)),
            skill_velocity: checked("skill_velocity", self.skill_velocity(skills)),
            forecast_accuracy: checked(
                "forecast_accuracy",
                self.forecast_scorer.score(overall, forecasts),
            ),
            market_activity: checked("market_activity", market_activity(alerts, now)),
            company_diversity: checked("company_diversity", company_diversity(companies)),
        };

        // Band and recommendation come from the unrounded sum; only the reported score is rounded.
        let raw_score = MOMENTUM_WEIGHTS.combine(&components).clamp(0.0, 100.0);
        let overall_score = round1(raw_score);
        let interpretation = interpret(raw_score);
        let recommendation = recommend(
            interpretation.band,
            &components.posting_velocity,
            &components.skill_velocity,
        );

        log::info!(
            "momentum index {:.1}/100 ({})",
            overall_score,
            interpretation.label
        );

        MomentumIndex {
            overall_score,
            components,
            interpretation,
            recommendation,
            calculated_at: now,
            methodology: methodology(),
            warning: None,
        }
    }

    pub fn skill_velocity(&self, skills: &SkillFrequencyTable) -> ComponentScore {
        let Some(growth) = compare_recent_weeks(skills, TREND_WINDOW_DATES) else {
            return neutral(
                ComponentStatus::InsufficientData,
                "Fewer than 14 days of skill data",
            );
        };

        let mut trending: Vec<SkillGrowth> = growth
            .into_iter()
            .filter(|g| g.growth_pct > self.skill_growth_pct)
            .collect();
        trending.sort_by(|a, b| {
            b.growth_pct
                .partial_cmp(&a.growth_pct)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        trending.truncate(MAX_TRENDING_SKILLS);
        for skill in trending.iter_mut() {
            skill.growth_pct = round1(skill.growth_pct);
        }

        let count = trending.len();
        let score = (30.0 + 7.0 * count as f64).clamp(0.0, 100.0);
        let status = if count >= 5 {
            ComponentStatus::HighMomentum
        } else if count >= 2 {
            ComponentStatus::Moderate
        } else {
            ComponentStatus::Low
        };

        trending.truncate(DISPLAYED_TRENDING_SKILLS);
        ComponentScore {
            score: round1(score),
            status,
            description: format!(
                "Found {count} skills with >{:.0}% growth in the last week",
                self.skill_growth_pct
            ),
            metrics: Some(ComponentMetrics::SkillVelocity {
                trending_skills_count: count,
                trending_skills: trending,
            }),
        }
    }
}

/// Last seven observations of the overall series against the seven before them.
pub fn posting_velocity(overall: &[DailyCount]) -> ComponentScore {
    if overall.len() < VELOCITY_MIN_HISTORY {
        return neutral(
            ComponentStatus::InsufficientData,
            "Fewer than 14 days of posting history",
        );
    }

    let mut counts: Vec<&DailyCount> = overall.iter().collect();
    counts.sort_by_key(|r| r.date);
    let n = counts.len();
    let recent: u32 = counts[n - 7..].iter().map(|r| r.job_count).sum();
    let previous: u32 = counts[n - 14..n - 7].iter().map(|r| r.job_count).sum();

    let change_pct = if previous == 0 {
        0.0
    } else {
        (recent as f64 - previous as f64) / previous as f64 * 100.0
    };
    let score = (50.0 + change_pct).clamp(0.0, 100.0);
    let status = if change_pct > 10.0 {
        ComponentStatus::Growing
    } else if change_pct < -10.0 {
        ComponentStatus::Declining
    } else {
        ComponentStatus::Stable
    };

    ComponentScore {
        score: round1(score),
        status,
        description: format!(
            "Job postings {} by {:.1}% over the last 7 days",
            if change_pct > 0.0 { "increased" } else { "decreased" },
            change_pct.abs()
        ),
        metrics: Some(ComponentMetrics::PostingVelocity {
            change_pct: round1(change_pct),
            recent_count: recent,
            previous_count: previous,
        }),
    }
}

/// Spikes and drops among alerts generated in the seven days up to `now`.
pub fn market_activity(alerts: &[Alert], now: DateTime<Utc>) -> ComponentScore {
    let cutoff = now - Duration::days(7);
    let recent: Vec<&Alert> = alerts.iter().filter(|a| a.generated_at >= cutoff).collect();

    let spikes = recent.iter().filter(|a| a.is_spike()).count();
    let drops = recent.iter().filter(|a| a.is_drop()).count();
    let skill_trends = recent.iter().filter(|a| a.is_skill_trend()).count();

    let score = (30.0 + 14.0 * spikes as f64 - 10.0 * drops as f64).clamp(0.0, 100.0);
    let status = if spikes >= 3 {
        ComponentStatus::Active
    } else if spikes >= 1 {
        ComponentStatus::Moderate
    } else {
        ComponentStatus::Quiet
    };

    ComponentScore {
        score: round1(score),
        status,
        description: format!(
            "Market activity: {spikes} spikes, {drops} drops in the last week"
        ),
        metrics: Some(ComponentMetrics::MarketActivity {
            total_alerts: recent.len(),
            spikes,
            drops,
            skill_trends,
        }),
    }
}

/// Counts every company in the table, with no recency window.
pub fn company_diversity(companies: &[CompanyStat]) -> ComponentScore {
    let unique_companies = companies.len();
    let score = (unique_companies as f64 / DIVERSITY_SATURATION * 100.0).clamp(0.0, 100.0);
    let status = if unique_companies >= 30 {
        ComponentStatus::Diverse
    } else if unique_companies >= 15 {
        ComponentStatus::Moderate
    } else {
        ComponentStatus::Concentrated
    };

    let mut ranked: Vec<&CompanyStat> = companies.iter().collect();
    ranked.sort_by(|a, b| b.job_count.cmp(&a.job_count));
    let top_companies = ranked
        .into_iter()
        .take(DISPLAYED_COMPANIES)
        .map(|c| TopCompany {
            company_name: c.company_name.clone(),
            job_count: c.job_count,
        })
        .collect();

    ComponentScore {
        score: round1(score),
        status,
        description: format!("{unique_companies} unique companies actively hiring"),
        metrics: Some(ComponentMetrics::CompanyDiversity {
            unique_companies,
            top_companies,
        }),
    }
}

fn checked(name: &str, component: ComponentScore) -> ComponentScore {
    if component.score.is_finite() {
        return component;
    }
    log::warn!("{name} produced a non-finite score, using neutral value");
    neutral(ComponentStatus::Error, "Score could not be computed")
}

pub fn band_for(score: f64) -> MarketBand {
    if score >= 80.0 {
        MarketBand::Hot
    } else if score >= 60.0 {
        MarketBand::Growing
    } else if score >= 40.0 {
        MarketBand::Stable
    } else if score >= 20.0 {
        MarketBand::Cooling
    } else {
        MarketBand::Cold
    }
}

pub fn interpret(score: f64) -> Interpretation {
    let band = band_for(score);
    let (label, description, for_job_seekers, for_recruiters) = match band {
        MarketBand::Hot => (
            "Hot Market",
            "Strong momentum with high growth, emerging skills, and active hiring",
            "Excellent time to negotiate salary and benefits. Leverage demand.",
            "Expect competitive hiring. Move fast on top candidates.",
        ),
        MarketBand::Growing => (
            "Growing Market",
            "Positive trends with steady expansion and new opportunities",
            "Good time to explore opportunities. Market favors candidates.",
            "Normal hiring cycles. Focus on employer brand.",
        ),
        MarketBand::Stable => (
            "Stable Market",
            "Moderate activity with predictable patterns",
            "Standard job search timeline. Focus on fit over timing.",
            "Balanced market. Emphasize culture and growth opportunities.",
        ),
        MarketBand::Cooling => (
            "Cooling Market",
            "Slowing growth with fewer new opportunities",
            "Longer search timelines expected. Network actively.",
            "Candidate pool expanding. Take time with decisions.",
        ),
        MarketBand::Cold => (
            "Cold Market",
            "Low momentum with declining opportunities",
            "Focus on upskilling and wait for market rebound.",
            "Hiring freeze or highly selective. Focus on retention.",
        ),
    };

    Interpretation {
        band,
        label: label.to_string(),
        description: description.to_string(),
        for_job_seekers: for_job_seekers.to_string(),
        for_recruiters: for_recruiters.to_string(),
    }
}

pub fn recommend(
    band: MarketBand,
    posting_velocity: &ComponentScore,
    skill_velocity: &ComponentScore,
) -> String {
    match band {
        MarketBand::Hot => {
            let top_skill = match &skill_velocity.metrics {
                Some(ComponentMetrics::SkillVelocity { trending_skills, .. }) => trending_skills
                    .first()
                    .map(|g| g.skill.as_str())
                    .unwrap_or("high-demand skills"),
                _ => "high-demand skills",
            };
            let change_pct = match &posting_velocity.metrics {
                Some(ComponentMetrics::PostingVelocity { change_pct, .. }) => *change_pct,
                _ => 0.0,
            };
            format!(
                "Market is hot! Consider learning {top_skill} to capitalize on {change_pct:.0}% growth in postings."
            )
        }
        MarketBand::Growing => {
            "Market is growing steadily. Good time to explore new opportunities or negotiate raises."
                .to_string()
        }
        MarketBand::Stable => {
            "Market is stable. Focus on differentiation through skills and networking.".to_string()
        }
        MarketBand::Cooling => {
            "Market is cooling. Prioritize upskilling in emerging technologies to stay competitive."
                .to_string()
        }
        MarketBand::Cold => {
            "Market is cold. Focus on retention, networking, and building expertise in resilient skills."
                .to_string()
        }
    }
}

pub fn methodology() -> Methodology {
    Methodology {
        weights: MOMENTUM_WEIGHTS,
        scale: SCALE_NOTE.to_string(),
    }
}

/// Index reported when upstream tables are absent: every component neutral.
pub fn default_index(now: DateTime<Utc>, missing: &[&str]) -> MomentumIndex {
    let placeholder = || neutral(ComponentStatus::InsufficientData, "Input table not available");
    let warning = if missing.is_empty() {
        "Insufficient data for full momentum calculation".to_string()
    } else {
        format!(
            "Insufficient data for full momentum calculation; missing: {}",
            missing.join(", ")
        )
    };

    MomentumIndex {
        overall_score: NEUTRAL_SCORE,
        components: MomentumComponents {
            posting_velocity: placeholder(),
            skill_velocity: placeholder(),
            forecast_accuracy: placeholder(),
            market_activity: placeholder(),
            company_diversity: placeholder(),
        },
        interpretation: interpret(NEUTRAL_SCORE),
        recommendation: DEFAULT_RECOMMENDATION.to_string(),
        calculated_at: now,
        methodology: methodology(),
        warning: Some(warning),
    }
}
