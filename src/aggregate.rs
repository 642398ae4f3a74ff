//! Derived weekly totals. Nothing here is stored; callers rebuild the
//! aggregate from the current entry set on every read.

use serde::Serialize;
use std::collections::BTreeMap;
use time::Date;
use uuid::Uuid;

use crate::dates::{self, DateRange};
use crate::model::TimeEntry;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayTotal {
    pub date: Date,
    pub minutes: i64,
    pub entries: Vec<TimeEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectTotal {
    pub project_id: Uuid,
    pub minutes: i64,
    pub entry_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeekAggregate {
    pub week_start: Date,
    pub week_end: Date,
    pub total_minutes: i64,
    pub total_hours: f64,
    pub days: Vec<DayTotal>,
    pub projects: Vec<ProjectTotal>,
}

impl WeekAggregate {
    /// Sum `entries` dated inside the week beginning at `week_start`
    pub fn from_entries(week_start: Date, entries: &[TimeEntry]) -> Self {
        let range = DateRange::week_of(week_start);

        let mut days: Vec<DayTotal> = dates::week_days(range.start)
            .into_iter()
            .map(|date| DayTotal {
                date,
                minutes: 0,
                entries: Vec::new(),
            })
            .collect();
        let mut projects: BTreeMap<Uuid, ProjectTotal> = BTreeMap::new();
        let mut total_minutes = 0i64;

        for entry in entries.iter().filter(|e| range.contains(e.date)) {
            let minutes = entry.minutes as i64;
            total_minutes += minutes;

            let index = (entry.date - range.start).whole_days() as usize;
            let day = &mut days[index];
            day.minutes += minutes;
            day.entries.push(entry.clone());

            let project = projects.entry(entry.project_id).or_insert(ProjectTotal {
                project_id: entry.project_id,
                minutes: 0,
                entry_count: 0,
            });
            project.minutes += minutes;
            project.entry_count += 1;
        }

        Self {
            week_start: range.start,
            week_end: range.end,
            total_minutes,
            total_hours: dates::minutes_to_hours(total_minutes),
            days,
            projects: projects.into_values().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total_minutes == 0 && self.days.iter().all(|d| d.entries.is_empty())
    }
}

/// Total minutes across `entries`, used for rollups that skip the per-day view
pub fn total_minutes(entries: &[TimeEntry]) -> i64 {
    entries.iter().map(|e| e.minutes as i64).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EntrySource;
    use time::OffsetDateTime;
    use time::macros::date;

    fn entry(project_id: Uuid, date: Date, minutes: i32) -> TimeEntry {
        let now = OffsetDateTime::now_utc();
        TimeEntry {
            id: Uuid::new_v4(),
            org_id: Uuid::nil(),
            user_id: Uuid::nil(),
            project_id,
            date,
            minutes,
            description: None,
            deliverable_url: None,
            timesheet_id: None,
            source: EntrySource::Manual,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_empty_week_is_not_an_error() {
        let aggregate = WeekAggregate::from_entries(date!(2024 - 01 - 01), &[]);
        assert!(aggregate.is_empty());
        assert_eq!(aggregate.days.len(), 7);
        assert!(aggregate.projects.is_empty());
        assert_eq!(aggregate.total_hours, 0.0);
    }

    #[test]
    fn test_totals_group_by_day_and_project() {
        let p1 = Uuid::new_v4();
        let p2 = Uuid::new_v4();
        let entries = vec![
            entry(p1, date!(2024 - 01 - 01), 120),
            entry(p1, date!(2024 - 01 - 01), 90),
            entry(p2, date!(2024 - 01 - 07), 45),
        ];

        let aggregate = WeekAggregate::from_entries(date!(2024 - 01 - 03), &entries);

        assert_eq!(aggregate.week_start, date!(2024 - 01 - 01));
        assert_eq!(aggregate.total_minutes, 255);
        assert_eq!(aggregate.total_minutes, total_minutes(&entries));
        assert_eq!(aggregate.days[0].minutes, 210);
        assert_eq!(aggregate.days[0].entries.len(), 2);
        assert_eq!(aggregate.days[6].minutes, 45);
        let p1_total = aggregate.projects.iter().find(|p| p.project_id == p1).unwrap();
        assert_eq!(p1_total.minutes, 210);
        assert_eq!(p1_total.entry_count, 2);
    }

    #[test]
    fn test_entries_outside_week_are_ignored() {
        let p = Uuid::new_v4();
        let entries = vec![
            entry(p, date!(2023 - 12 - 31), 60),
            entry(p, date!(2024 - 01 - 02), 30),
            entry(p, date!(2024 - 01 - 08), 60),
        ];
        let aggregate = WeekAggregate::from_entries(date!(2024 - 01 - 01), &entries);
        assert_eq!(aggregate.total_minutes, 30);
    }

    #[test]
    fn test_recompute_reflects_removed_entry() {
        let p = Uuid::new_v4();
        let mut entries = vec![
            entry(p, date!(2024 - 01 - 01), 60),
            entry(p, date!(2024 - 01 - 02), 30),
        ];
        let before = WeekAggregate::from_entries(date!(2024 - 01 - 01), &entries);
        entries.pop();
        let after = WeekAggregate::from_entries(date!(2024 - 01 - 01), &entries);
        assert_eq!(before.total_minutes, 90);
        assert_eq!(after.total_minutes, 60);
    }
}
