use std::fmt::Write;

use crate::models::{
    Alert, AlertSummary, CompanyStat, ComponentScore, MomentumIndex, Severity, SkillFrequencyTable,
};

pub fn summarize_alerts(alerts: &[Alert]) -> Vec<AlertSummary> {
    let mut map: std::collections::HashMap<&'static str, (usize, usize)> =
        std::collections::HashMap::new();

    for alert in alerts {
        let entry = map.entry(alert.kind.type_name()).or_insert((0, 0));
        entry.0 += 1;
        if alert.severity == Severity::High {
            entry.1 += 1;
        }
    }

    let mut summaries: Vec<AlertSummary> = map
        .into_iter()
        .map(|(alert_type, (count, high_count))| AlertSummary {
            alert_type: alert_type.to_string(),
            count,
            high_count,
        })
        .collect();

    summaries.sort_by(|a, b| b.count.cmp(&a.count).then(a.alert_type.cmp(&b.alert_type)));
    summaries
}

fn component_line(output: &mut String, name: &str, component: &ComponentScore) {
    let _ = writeln!(
        output,
        "- {}: {:.1} ({}) - {}",
        name,
        component.score,
        component.status.as_str(),
        component.description
    );
}

pub fn build_report(
    index: &MomentumIndex,
    alerts: &[Alert],
    skills: Option<&SkillFrequencyTable>,
    companies: Option<&[CompanyStat]>,
) -> String {
    let summaries = summarize_alerts(alerts);
    let mut output = String::new();

    let _ = writeln!(output, "# Job Market Momentum Report");
    let _ = writeln!(
        output,
        "Calculated at {} UTC",
        index.calculated_at.format("%Y-%m-%d %H:%M")
    );
    let _ = writeln!(output);
    let _ = writeln!(
        output,
        "**Momentum index: {:.1}/100 ({})**",
        index.overall_score, index.interpretation.label
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "{}", index.interpretation.description);
    let _ = writeln!(output);
    let _ = writeln!(output, "- Job seekers: {}", index.interpretation.for_job_seekers);
    let _ = writeln!(output, "- Recruiters: {}", index.interpretation.for_recruiters);
    let _ = writeln!(output);
    let _ = writeln!(output, "Recommendation: {}", index.recommendation);

    if let Some(warning) = &index.warning {
        let _ = writeln!(output);
        let _ = writeln!(output, "> Warning: {warning}");
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Components");
    let components = &index.components;
    let weights = &index.methodology.weights;
    component_line(
        &mut output,
        &format!("Posting velocity (x{:.2})", weights.posting_velocity),
        &components.posting_velocity,
    );
    component_line(
        &mut output,
        &format!("Skill velocity (x{:.2})", weights.skill_velocity),
        &components.skill_velocity,
    );
    component_line(
        &mut output,
        &format!("Forecast accuracy (x{:.2})", weights.forecast_accuracy),
        &components.forecast_accuracy,
    );
    component_line(
        &mut output,
        &format!("Market activity (x{:.2})", weights.market_activity),
        &components.market_activity,
    );
    component_line(
        &mut output,
        &format!("Company diversity (x{:.2})", weights.company_diversity),
        &components.company_diversity,
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Alert Mix");

    if summaries.is_empty() {
        let _ = writeln!(output, "No alerts generated for this run.");
    } else {
        for summary in summaries.iter() {
            let _ = writeln!(
                output,
                "- {}: {} alerts ({} high severity)",
                summary.alert_type, summary.count, summary.high_count
            );
        }
    }

    let mut recent_alerts: Vec<&Alert> = alerts.iter().collect();
    recent_alerts.sort_by(|a, b| b.kind.date().cmp(&a.kind.date()));
    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Alerts");

    if recent_alerts.is_empty() {
        let _ = writeln!(output, "No alerts generated for this run.");
    } else {
        for alert in recent_alerts.iter().take(10) {
            let when = alert
                .kind
                .date()
                .map(|d| d.to_string())
                .unwrap_or_else(|| "last 7 days".to_string());
            let _ = writeln!(
                output,
                "- [{}] {} on {}: {}",
                alert.severity.as_str(),
                alert.kind.subject(),
                when,
                alert.message
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Top Skills");

    match skills.filter(|t| !t.overall.is_empty()) {
        None => {
            let _ = writeln!(output, "No skill data available.");
        }
        Some(table) => {
            for entry in table.overall.iter().take(10) {
                let _ = writeln!(output, "- {} ({} postings)", entry.skill, entry.count);
            }
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Top Hiring Companies");

    match companies.filter(|c| !c.is_empty()) {
        None => {
            let _ = writeln!(output, "No company data available.");
        }
        Some(companies) => {
            for company in companies.iter().take(10) {
                let salary = match (company.avg_salary_min, company.avg_salary_max) {
                    (Some(min), Some(max)) => format!(", avg salary {min:.0}-{max:.0}"),
                    _ => String::new(),
                };
                let _ = writeln!(
                    output,
                    "- {}: {} jobs ({}, {}){}",
                    company.company_name,
                    company.job_count,
                    company.primary_category,
                    company.primary_location,
                    salary
                );
            }
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AlertKind, SkillCount};
    use crate::momentum::default_index;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn drop_alert(category: &str, severity: Severity, day: u32) -> Alert {
        Alert {
            id: format!("drop_{category}"),
            generated_at: Utc.with_ymd_and_hms(2026, 3, 1, 6, 0, 0).unwrap(),
            severity,
            message: "Drop detected: 3 jobs (-60.0% decrease)".to_string(),
            kind: AlertKind::Drop {
                category: category.to_string(),
                date: NaiveDate::from_ymd_opt(2026, 2, day).unwrap(),
                job_count: 3,
                expected_count: 7.5,
                pct_change: -60.0,
            },
        }
    }

    fn trend_alert(skill: &str) -> Alert {
        Alert {
            id: format!("skill_trend_{skill}"),
            generated_at: Utc.with_ymd_and_hms(2026, 3, 1, 6, 0, 0).unwrap(),
            severity: Severity::Medium,
            message: format!("Emerging skill trend: {skill} (+80.0% growth)"),
            kind: AlertKind::SkillTrend {
                skill: skill.to_string(),
                recent_count: 18,
                previous_count: 10,
                growth_rate: 80.0,
            },
        }
    }

    #[test]
    fn summaries_count_by_type_and_severity() {
        let alerts = vec![
            drop_alert("Data", Severity::High, 3),
            drop_alert("ML", Severity::Medium, 4),
            trend_alert("rust"),
        ];

        let summaries = summarize_alerts(&alerts);
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].alert_type, "drop");
        assert_eq!(summaries[0].count, 2);
        assert_eq!(summaries[0].high_count, 1);
        assert_eq!(summaries[1].alert_type, "skill_trend");
    }

    #[test]
    fn report_includes_index_and_sections() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 6, 0, 0).unwrap();
        let index = default_index(now, &["alerts"]);
        let skills = SkillFrequencyTable {
            overall: vec![SkillCount { skill: "python".to_string(), count: 42 }],
            ..Default::default()
        };
        let alerts = vec![drop_alert("Data", Severity::High, 3), trend_alert("rust")];

        let report = build_report(&index, &alerts, Some(&skills), None);
        assert!(report.contains("**Momentum index: 50.0/100 (Stable Market)**"));
        assert!(report.contains("> Warning: "));
        assert!(report.contains("- drop: 1 alerts (1 high severity)"));
        assert!(report.contains("- [high] Data on 2026-02-03"));
        assert!(report.contains("- [medium] rust on last 7 days"));
        assert!(report.contains("- python (42 postings)"));
        assert!(report.contains("No company data available."));
    }
}
