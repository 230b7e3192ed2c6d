use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, NaiveDate};
use serde::Deserialize;

use crate::aggregate::group_label;
use crate::models::{JobRecord, SkillSet};

#[derive(Debug, Default)]
pub struct IngestOutcome {
    pub jobs: Vec<JobRecord>,
    /// Rows dropped for a missing or unparseable posted date.
    pub dropped: usize,
}

/// Skills as cleaned-job files carry them: a list, or a single string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawSkills {
    List(Vec<String>),
    One(String),
}

#[derive(Debug, Deserialize)]
struct JsonRow {
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    company: Option<String>,
    #[serde(default)]
    posted_date: Option<String>,
    #[serde(default)]
    skills: Option<RawSkills>,
    #[serde(default)]
    salary_min: Option<f64>,
    #[serde(default)]
    salary_max: Option<f64>,
}

impl RawSkills {
    /// A scalar is one skill name; delimiters only carry meaning in flat files.
    fn into_skill_set(self) -> SkillSet {
        match self {
            RawSkills::List(items) => SkillSet::from_list(items),
            RawSkills::One(raw) => SkillSet::from_list([raw]),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    company: Option<String>,
    #[serde(default)]
    posted_date: Option<String>,
    #[serde(default)]
    skills: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    salary_min: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    salary_max: Option<f64>,
}

/// A row from any input format with its skills already normalized.
struct RawJob {
    category: Option<String>,
    location: Option<String>,
    company: Option<String>,
    posted_date: Option<String>,
    skills: SkillSet,
    salary_min: Option<f64>,
    salary_max: Option<f64>,
}

impl From<JsonRow> for RawJob {
    fn from(row: JsonRow) -> Self {
        Self {
            category: row.category,
            location: row.location,
            company: row.company,
            posted_date: row.posted_date,
            skills: row
                .skills
                .map(RawSkills::into_skill_set)
                .unwrap_or(SkillSet::Missing),
            salary_min: row.salary_min,
            salary_max: row.salary_max,
        }
    }
}

/// Loads cleaned job records from `.csv`, `.json` (array) or `.jsonl`.
pub fn load_jobs(path: &Path) -> anyhow::Result<IngestOutcome> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let rows: Vec<RawJob> = match extension.as_str() {
        "csv" => read_csv_rows(path)?,
        "json" => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let rows: Vec<JsonRow> = serde_json::from_str(&raw)
                .with_context(|| format!("failed to parse job array in {}", path.display()))?;
            rows.into_iter().map(RawJob::from).collect()
        }
        "jsonl" | "ndjson" => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let mut rows = Vec::new();
            for (line_no, line) in raw.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                let row: JsonRow = serde_json::from_str(line).with_context(|| {
                    format!("failed to parse line {} of {}", line_no + 1, path.display())
                })?;
                rows.push(RawJob::from(row));
            }
            rows
        }
        other => anyhow::bail!(
            "unsupported job file extension {other:?} for {}",
            path.display()
        ),
    };

    let outcome = normalize(rows);
    if outcome.dropped > 0 {
        log::warn!(
            "dropped {} job records without a valid posted date",
            outcome.dropped
        );
    }
    log::info!("loaded {} jobs from {}", outcome.jobs.len(), path.display());
    Ok(outcome)
}

fn read_csv_rows(path: &Path) -> anyhow::Result<Vec<RawJob>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mut rows = Vec::new();

    for result in reader.deserialize::<CsvRow>() {
        let row = result.with_context(|| format!("malformed row in {}", path.display()))?;
        rows.push(RawJob {
            category: row.category,
            location: row.location,
            company: row.company,
            posted_date: row.posted_date,
            // flat files keep skills delimited in one column
            skills: row
                .skills
                .as_deref()
                .map(SkillSet::from_delimited)
                .unwrap_or(SkillSet::Missing),
            salary_min: row.salary_min,
            salary_max: row.salary_max,
        });
    }

    Ok(rows)
}

fn normalize(rows: Vec<RawJob>) -> IngestOutcome {
    let mut outcome = IngestOutcome::default();

    for row in rows {
        let Some(posted_date) = row.posted_date.as_deref().and_then(parse_posted_date) else {
            outcome.dropped += 1;
            continue;
        };

        outcome.jobs.push(JobRecord {
            category: group_label(row.category.as_deref().unwrap_or_default()),
            location: group_label(row.location.as_deref().unwrap_or_default()),
            company: group_label(row.company.as_deref().unwrap_or_default()),
            posted_date,
            skills: row.skills,
            salary_min: row.salary_min.filter(|v| v.is_finite()),
            salary_max: row.salary_max.filter(|v| v.is_finite()),
        });
    }

    outcome
}

/// Accepts RFC 3339 timestamps or anything starting with a `YYYY-MM-DD` date.
pub fn parse_posted_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(raw) {
        return Some(timestamp.date_naive());
    }
    let prefix = raw.get(..10)?;
    NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok()
}
