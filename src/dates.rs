//! Week arithmetic and duration rendering shared by the services.

use serde::{Deserialize, Serialize};
use time::{Date, Duration, format_description::FormatItem, macros::format_description};

const DISPLAY_FORMAT: &[FormatItem<'static>] =
    format_description!("[month repr:short] [day padding:none], [year]");

/// Inclusive date range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Date,
    pub end: Date,
}

impl DateRange {
    pub fn new(start: Date, end: Date) -> Self {
        Self { start, end }
    }

    /// Monday through Sunday of the week containing `date`
    pub fn week_of(date: Date) -> Self {
        let start = week_start(date);
        Self {
            start,
            end: week_end(start),
        }
    }

    pub fn contains(&self, date: Date) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Monday of the ISO week containing `date`
pub fn week_start(date: Date) -> Date {
    let offset = date.weekday().number_days_from_monday() as i64;
    date - Duration::days(offset)
}

/// Sunday of the ISO week containing `date`
pub fn week_end(date: Date) -> Date {
    week_start(date) + Duration::days(6)
}

pub fn week_days(week_start: Date) -> Vec<Date> {
    (0..7).map(|i| week_start + Duration::days(i)).collect()
}

pub fn hours_to_minutes(hours: f64) -> i32 {
    (hours * 60.0).round() as i32
}

/// Fractional hours, for totals and rollups
pub fn minutes_to_hours(minutes: i64) -> f64 {
    minutes as f64 / 60.0
}

/// Hours rounded to one decimal, as shown on the dashboard
pub fn rounded_hours(minutes: i64) -> f64 {
    (minutes_to_hours(minutes) * 10.0).round() / 10.0
}

/// `90` → `1h 30m`, `120` → `2h`
pub fn format_duration(minutes: i32) -> String {
    let hours = minutes / 60;
    let mins = minutes % 60;
    if mins == 0 {
        format!("{}h", hours)
    } else {
        format!("{}h {}m", hours, mins)
    }
}

/// `Jan 5, 2024`
pub fn format_date(date: Date) -> String {
    date.format(DISPLAY_FORMAT)
        .unwrap_or_else(|_| date.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn test_week_start_is_monday() {
        // 2024-01-03 is a Wednesday
        assert_eq!(week_start(date!(2024 - 01 - 03)), date!(2024 - 01 - 01));
        assert_eq!(week_start(date!(2024 - 01 - 01)), date!(2024 - 01 - 01));
        // Sunday belongs to the week that started six days earlier
        assert_eq!(week_start(date!(2024 - 01 - 07)), date!(2024 - 01 - 01));
        assert_eq!(week_end(date!(2024 - 01 - 03)), date!(2024 - 01 - 07));
    }

    #[test]
    fn test_week_crosses_year_boundary() {
        let range = DateRange::week_of(date!(2025 - 01 - 01));
        assert_eq!(range.start, date!(2024 - 12 - 30));
        assert_eq!(range.end, date!(2025 - 01 - 05));
        assert!(range.contains(date!(2024 - 12 - 31)));
        assert!(!range.contains(date!(2025 - 01 - 06)));
    }

    #[test]
    fn test_week_days() {
        let days = week_days(date!(2024 - 01 - 01));
        assert_eq!(days.len(), 7);
        assert_eq!(days[6], date!(2024 - 01 - 07));
    }

    #[test]
    fn test_hours_minutes_round_trip() {
        assert_eq!(hours_to_minutes(1.5), 90);
        assert_eq!(minutes_to_hours(90), 1.5);
        for minutes in [1, 45, 90, 120, 1440] {
            assert_eq!(hours_to_minutes(minutes_to_hours(minutes as i64)), minutes);
        }
        assert_eq!(hours_to_minutes(0.01), 1);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(90), "1h 30m");
        assert_eq!(format_duration(120), "2h");
        assert_eq!(format_duration(45), "0h 45m");
    }

    #[test]
    fn test_rounded_hours() {
        assert_eq!(rounded_hours(255), 4.3);
        assert_eq!(rounded_hours(0), 0.0);
    }

    #[test]
    fn test_format_date() {
        assert_eq!(format_date(date!(2024 - 01 - 05)), "Jan 5, 2024");
    }
}
