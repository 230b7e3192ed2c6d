use std::collections::{BTreeMap, HashMap};

use crate::aggregate::group_label;
use crate::models::{JobRecord, SkillCount, SkillFrequencyTable, SkillGrowth};

pub const TOP_OVERALL: usize = 100;
pub const TOP_PER_CATEGORY: usize = 20;
pub const TOP_PER_DATE: usize = 10;
pub const RECENT_DATES: usize = 30;
pub const TREND_WINDOW_DATES: usize = 7;

/// Multiset that remembers first-occurrence order, so ranking ties stay stable.
#[derive(Debug, Default)]
struct OrderedCounter {
    index: HashMap<String, usize>,
    entries: Vec<(String, u64)>,
}

impl OrderedCounter {
    fn add(&mut self, skill: &str, count: u64) {
        match self.index.get(skill) {
            Some(&slot) => self.entries[slot].1 += count,
            None => {
                self.index.insert(skill.to_string(), self.entries.len());
                self.entries.push((skill.to_string(), count));
            }
        }
    }

    fn get(&self, skill: &str) -> u64 {
        self.index
            .get(skill)
            .map(|&slot| self.entries[slot].1)
            .unwrap_or(0)
    }

    fn most_common(mut self, limit: usize) -> Vec<SkillCount> {
        // sort_by is stable, keeping first-seen order among equal counts
        self.entries.sort_by(|a, b| b.1.cmp(&a.1));
        self.entries
            .into_iter()
            .take(limit)
            .map(|(skill, count)| SkillCount { skill, count })
            .collect()
    }
}

pub fn index_skills(jobs: &[JobRecord]) -> SkillFrequencyTable {
    let mut overall = OrderedCounter::default();
    let mut by_category: BTreeMap<String, OrderedCounter> = BTreeMap::new();
    let mut by_date: BTreeMap<String, OrderedCounter> = BTreeMap::new();

    for job in jobs {
        if job.skills.is_empty() {
            continue;
        }
        let skills = job.skills.as_slice();

        let category = by_category.entry(group_label(&job.category)).or_default();
        let date_key: String = job.posted_date.to_string().chars().take(10).collect();
        let day = by_date.entry(date_key).or_default();

        for skill in skills {
            overall.add(skill, 1);
            category.add(skill, 1);
            day.add(skill, 1);
        }
    }

    let keep_from = by_date.len().saturating_sub(RECENT_DATES);
    let by_date = by_date
        .into_iter()
        .skip(keep_from)
        .map(|(date, counter)| (date, counter.most_common(TOP_PER_DATE)))
        .collect();

    SkillFrequencyTable {
        overall: overall.most_common(TOP_OVERALL),
        by_category: by_category
            .into_iter()
            .map(|(category, counter)| (category, counter.most_common(TOP_PER_CATEGORY)))
            .collect(),
        by_date,
    }
}

/// Week-over-week skill growth across the most recent `window` dates of `by_date`
/// against the `window` dates before them.
///
/// Returns `None` when fewer than `2 * window` dates are indexed. Skills with no
/// occurrences in the earlier window are left out because no growth rate exists.
pub fn compare_recent_weeks(table: &SkillFrequencyTable, window: usize) -> Option<Vec<SkillGrowth>> {
    let dates: Vec<&String> = table.by_date.keys().collect();
    if window == 0 || dates.len() < window * 2 {
        return None;
    }

    let split = dates.len() - window;
    let mut recent = OrderedCounter::default();
    let mut previous = OrderedCounter::default();

    for date in &dates[split..] {
        for entry in &table.by_date[*date] {
            recent.add(&entry.skill, entry.count);
        }
    }
    for date in &dates[split - window..split] {
        for entry in &table.by_date[*date] {
            previous.add(&entry.skill, entry.count);
        }
    }

    let growth = recent
        .entries
        .iter()
        .filter_map(|(skill, recent_count)| {
            let previous_count = previous.get(skill);
            if previous_count == 0 {
                return None;
            }
            let growth_pct =
                (*recent_count as f64 - previous_count as f64) / previous_count as f64 * 100.0;
            Some(SkillGrowth {
                skill: skill.clone(),
                recent_count: *recent_count,
                previous_count,
                growth_pct,
            })
        })
        .collect();

    Some(growth)
}
