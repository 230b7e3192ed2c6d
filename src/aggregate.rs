use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;

use crate::models::{
    CompanyStat, DailyAggregates, DailyCount, JobRecord, OVERALL_GROUP, UNKNOWN_LABEL,
};

pub const SHORT_WINDOW: usize = 7;
pub const LONG_WINDOW: usize = 30;

/// Daily posting counts by category, by location and overall.
///
/// Days without postings are absent rather than zero-filled, so rolling windows span
/// the last N observations of a group, not the last N calendar days.
pub fn aggregate(jobs: &[JobRecord]) -> DailyAggregates {
    DailyAggregates {
        by_category: count_by(jobs, |job| job.category.as_str()),
        by_location: count_by(jobs, |job| job.location.as_str()),
        overall: count_by(jobs, |_| OVERALL_GROUP),
    }
}

fn count_by<F>(jobs: &[JobRecord], key: F) -> Vec<DailyCount>
where
    F: Fn(&JobRecord) -> &str,
{
    let mut counts: BTreeMap<(NaiveDate, String), u32> = BTreeMap::new();

    for job in jobs {
        let entry = counts
            .entry((job.posted_date, group_label(key(job))))
            .or_insert(0);
        *entry += 1;
    }

    let mut rows: Vec<DailyCount> = counts
        .into_iter()
        .map(|((date, group), job_count)| DailyCount {
            date,
            group,
            job_count,
            rolling_7d: 0.0,
            rolling_30d: 0.0,
        })
        .collect();

    add_rolling_averages(&mut rows);
    rows
}

pub fn group_label(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        UNKNOWN_LABEL.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Fills `rolling_7d` and `rolling_30d` per group. Rows must already be in date order.
pub fn add_rolling_averages(rows: &mut [DailyCount]) {
    let mut groups: HashMap<String, Vec<usize>> = HashMap::new();
    for (idx, row) in rows.iter().enumerate() {
        groups.entry(row.group.clone()).or_default().push(idx);
    }

    for indices in groups.values() {
        let values: Vec<f64> = indices.iter().map(|&i| rows[i].job_count as f64).collect();
        let short = rolling_mean(&values, SHORT_WINDOW);
        let long = rolling_mean(&values, LONG_WINDOW);

        for (pos, &i) in indices.iter().enumerate() {
            rows[i].rolling_7d = short[pos];
            rows[i].rolling_30d = long[pos];
        }
    }
}

/// Trailing mean, clipped at the start of the series.
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);
    (0..values.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(window);
            let slice = &values[start..=i];
            slice.iter().sum::<f64>() / slice.len() as f64
        })
        .collect()
}

/// Trailing sample standard deviation. `None` while the window holds a single value.
pub fn rolling_std(values: &[f64], window: usize) -> Vec<Option<f64>> {
    let window = window.max(1);
    (0..values.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(window);
            let slice = &values[start..=i];
            if slice.len() < 2 {
                return None;
            }
            let mean = slice.iter().sum::<f64>() / slice.len() as f64;
            let variance = slice.iter().map(|v| (v - mean).powi(2)).sum::<f64>()
                / (slice.len() - 1) as f64;
            Some(variance.sqrt())
        })
        .collect()
}

#[derive(Debug)]
struct CompanyAccumulator {
    name: String,
    job_count: u32,
    salary_min_total: f64,
    salary_min_count: u32,
    salary_max_total: f64,
    salary_max_count: u32,
    locations: Vec<(String, u32)>,
    categories: Vec<(String, u32)>,
    first_posted: NaiveDate,
    last_posted: NaiveDate,
}

impl CompanyAccumulator {
    fn new(name: String, date: NaiveDate) -> Self {
        Self {
            name,
            job_count: 0,
            salary_min_total: 0.0,
            salary_min_count: 0,
            salary_max_total: 0.0,
            salary_max_count: 0,
            locations: Vec::new(),
            categories: Vec::new(),
            first_posted: date,
            last_posted: date,
        }
    }

    fn add(&mut self, job: &JobRecord) {
        self.job_count += 1;
        if let Some(value) = job.salary_min.filter(|v| v.is_finite()) {
            self.salary_min_total += value;
            self.salary_min_count += 1;
        }
        if let Some(value) = job.salary_max.filter(|v| v.is_finite()) {
            self.salary_max_total += value;
            self.salary_max_count += 1;
        }
        tally(&mut self.locations, group_label(&job.location));
        tally(&mut self.categories, group_label(&job.category));
        self.first_posted = self.first_posted.min(job.posted_date);
        self.last_posted = self.last_posted.max(job.posted_date);
    }

    fn finish(self) -> CompanyStat {
        CompanyStat {
            company_name: self.name,
            job_count: self.job_count,
            avg_salary_min: mean_of(self.salary_min_total, self.salary_min_count),
            avg_salary_max: mean_of(self.salary_max_total, self.salary_max_count),
            primary_location: mode_of(&self.locations),
            primary_category: mode_of(&self.categories),
            first_posted: self.first_posted,
            last_posted: self.last_posted,
        }
    }
}

fn tally(values: &mut Vec<(String, u32)>, value: String) {
    match values.iter_mut().find(|(v, _)| *v == value) {
        Some((_, count)) => *count += 1,
        None => values.push((value, 1)),
    }
}

// First value wins on ties, since `values` is kept in first-seen order.
fn mode_of(values: &[(String, u32)]) -> String {
    let mut best: Option<&(String, u32)> = None;
    for entry in values {
        if best.map_or(true, |b| entry.1 > b.1) {
            best = Some(entry);
        }
    }
    best.map(|(v, _)| v.clone())
        .unwrap_or_else(|| UNKNOWN_LABEL.to_string())
}

fn mean_of(total: f64, count: u32) -> Option<f64> {
    if count == 0 {
        None
    } else {
        Some(total / count as f64)
    }
}

/// Per-company hiring statistics, busiest companies first.
pub fn company_stats(jobs: &[JobRecord]) -> Vec<CompanyStat> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut companies: Vec<CompanyAccumulator> = Vec::new();

    for job in jobs {
        let name = group_label(&job.company);
        let slot = match index.get(&name) {
            Some(&slot) => slot,
            None => {
                companies.push(CompanyAccumulator::new(name.clone(), job.posted_date));
                index.insert(name, companies.len() - 1);
                companies.len() - 1
            }
        };
        companies[slot].add(job);
    }

    let mut stats: Vec<CompanyStat> = companies
        .into_iter()
        .map(CompanyAccumulator::finish)
        .collect();
    stats.sort_by(|a, b| b.job_count.cmp(&a.job_count));
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SkillSet;

    fn job(category: &str, location: &str, company: &str, day: u32) -> JobRecord {
        JobRecord {
            category: category.to_string(),
            location: location.to_string(),
            company: company.to_string(),
            posted_date: NaiveDate::from_ymd_opt(2026, 3, day).unwrap(),
            skills: SkillSet::Missing,
            salary_min: None,
            salary_max: None,
        }
    }

    #[test]
    fn empty_input_yields_empty_tables() {
        let aggregates = aggregate(&[]);
        assert!(aggregates.by_category.is_empty());
        assert!(aggregates.by_location.is_empty());
        assert!(aggregates.overall.is_empty());
        assert!(company_stats(&[]).is_empty());
    }

    #[test]
    fn counts_are_unique_per_date_and_group() {
        let jobs = vec![
            job("Data", "Austin", "Acme", 1),
            job("Data", "Austin", "Acme", 1),
            job("ML", "Boston", "Globex", 1),
            job("Data", "Boston", "Acme", 2),
        ];

        let aggregates = aggregate(&jobs);
        let keys: Vec<(NaiveDate, &str, u32)> = aggregates
            .by_category
            .iter()
            .map(|r| (r.date, r.group.as_str(), r.job_count))
            .collect();
        assert_eq!(
            keys,
            vec![
                (NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(), "Data", 2),
                (NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(), "ML", 1),
                (NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(), "Data", 1),
            ]
        );

        assert_eq!(aggregates.overall.len(), 2);
        assert!(aggregates.overall.iter().all(|r| r.group == OVERALL_GROUP));
        assert_eq!(aggregates.overall[0].job_count, 3);
        assert_eq!(aggregates.by_location.len(), 3);
    }

    #[test]
    fn blank_labels_map_to_unknown() {
        let jobs = vec![job("  ", "", "Acme", 1)];
        let aggregates = aggregate(&jobs);
        assert_eq!(aggregates.by_category[0].group, UNKNOWN_LABEL);
        assert_eq!(aggregates.by_location[0].group, UNKNOWN_LABEL);
    }

    #[test]
    fn rolling_seven_day_uses_trailing_observations() {
        let mut jobs = Vec::new();
        for day in 1..=10u32 {
            for _ in 0..day {
                jobs.push(job("Data", "Austin", "Acme", day));
            }
        }

        let rows = aggregate(&jobs).by_category;
        for (i, row) in rows.iter().enumerate() {
            let start = (i + 1).saturating_sub(7);
            let window: Vec<f64> = rows[start..=i].iter().map(|r| r.job_count as f64).collect();
            let expected = window.iter().sum::<f64>() / window.len() as f64;
            assert!((row.rolling_7d - expected).abs() < 1e-9);
        }
        // Day 3 only has three observations behind it.
        assert!((rows[2].rolling_7d - 2.0).abs() < 1e-9);
        assert!((rows[9].rolling_30d - 5.5).abs() < 1e-9);
    }

    #[test]
    fn rolling_thirty_day_clips_to_last_thirty_observations() {
        let start = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        // every other calendar day, so the window counts rows, not days
        let mut rows: Vec<DailyCount> = (0..40u32)
            .map(|i| DailyCount {
                date: start + chrono::Duration::days(2 * i as i64),
                group: "Data".to_string(),
                job_count: i + 1,
                rolling_7d: 0.0,
                rolling_30d: 0.0,
            })
            .collect();
        add_rolling_averages(&mut rows);

        assert!((rows[29].rolling_30d - 15.5).abs() < 1e-9);
        assert!((rows[30].rolling_30d - 16.5).abs() < 1e-9);
        assert!((rows[39].rolling_30d - 25.5).abs() < 1e-9);
        assert!((rows[39].rolling_7d - 37.0).abs() < 1e-9);
    }

    #[test]
    fn rolling_averages_are_computed_per_group() {
        let jobs = vec![
            job("Data", "Austin", "Acme", 1),
            job("ML", "Austin", "Acme", 1),
            job("ML", "Austin", "Acme", 1),
            job("ML", "Austin", "Acme", 1),
            job("Data", "Austin", "Acme", 2),
        ];

        let rows = aggregate(&jobs).by_category;
        let data_day_two = rows
            .iter()
            .find(|r| r.group == "Data" && r.date.format("%d").to_string() == "02")
            .unwrap();
        assert!((data_day_two.rolling_7d - 1.0).abs() < 1e-9);
    }

    #[test]
    fn rolling_std_is_undefined_for_single_value() {
        let std = rolling_std(&[10.0, 10.0, 16.0], 7);
        assert_eq!(std[0], None);
        assert_eq!(std[1], Some(0.0));
        let expected = (12.0f64).sqrt();
        assert!((std[2].unwrap() - expected).abs() < 1e-9);
    }

    #[test]
    fn company_stats_use_first_seen_mode_and_sort_by_volume() {
        let mut jobs = vec![
            job("Data", "Austin", "Acme", 3),
            job("ML", "Boston", "Acme", 1),
            job("ML", "Denver", "Globex", 2),
            job("Data", "Boston", "Acme", 5),
        ];
        jobs[0].salary_min = Some(100_000.0);
        jobs[1].salary_min = Some(120_000.0);
        jobs[3].salary_max = Some(150_000.0);

        let stats = company_stats(&jobs);
        assert_eq!(stats.len(), 2);

        let acme = &stats[0];
        assert_eq!(acme.company_name, "Acme");
        assert_eq!(acme.job_count, 3);
        assert_eq!(acme.avg_salary_min, Some(110_000.0));
        assert_eq!(acme.avg_salary_max, Some(150_000.0));
        assert_eq!(acme.primary_location, "Boston");
        assert_eq!(acme.primary_category, "Data");
        assert_eq!(acme.first_posted, NaiveDate::from_ymd_opt(2026, 3, 1).unwrap());
        assert_eq!(acme.last_posted, NaiveDate::from_ymd_opt(2026, 3, 5).unwrap());

        assert_eq!(stats[1].company_name, "Globex");
        assert_eq!(stats[1].avg_salary_min, None);
    }

    #[test]
    fn mode_tie_goes_to_first_value_seen() {
        let jobs = vec![
            job("ML", "Denver", "Acme", 1),
            job("Data", "Austin", "Acme", 2),
        ];
        let stats = company_stats(&jobs);
        assert_eq!(stats[0].primary_location, "Denver");
        assert_eq!(stats[0].primary_category, "ML");
    }
}
