use crate::collections::MAX_GOAL_VALUE;
use crate::models::{
    DayPoint, Goal, GoalProgress, ParameterSummary, ParameterValue, ProgressBand,
    TrackedParameter, Trend, TrendDirection,
};
use chrono::{Datelike, Duration, Local, NaiveDate};

const WEEK_DAYS: i64 = 7;
const STABLE_THRESHOLD_PERCENT: f64 = 5.0;

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// One point per day for `today - 6 ..= today`; days without a value are 0.
pub fn week_window_at(today: NaiveDate, values: &[ParameterValue]) -> Vec<DayPoint> {
    let mut points = Vec::with_capacity(WEEK_DAYS as usize);
    for offset in (0..WEEK_DAYS).rev() {
        let date = today - Duration::days(offset);
        let key = date_key(date);
        let value = values
            .iter()
            .find(|v| v.date == key)
            .map(ParameterValue::numeric)
            .unwrap_or(0.0);
        points.push(DayPoint { date, value });
    }
    points
}

fn recorded(points: &[DayPoint]) -> Vec<f64> {
    points.iter().map(|p| p.value).filter(|v| *v > 0.0).collect()
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Mean over days that have a positive reading only.
pub fn week_average(points: &[DayPoint]) -> f64 {
    mean(&recorded(points))
}

/// Compares the mean of the later half of the recorded days with the
/// earlier half. Changes under 5% are reported as stable.
pub fn trend(points: &[DayPoint]) -> Trend {
    let values = recorded(points);
    if values.len() < 2 {
        return Trend::STABLE;
    }

    let (first, second) = values.split_at(values.len() / 2);
    let first_avg = mean(first);
    let second_avg = mean(second);
    let percentage = (second_avg - first_avg) / first_avg * 100.0;

    if !percentage.is_finite() || percentage.abs() < STABLE_THRESHOLD_PERCENT {
        return Trend::STABLE;
    }

    Trend {
        direction: if percentage > 0.0 {
            TrendDirection::Up
        } else {
            TrendDirection::Down
        },
        percentage: percentage.abs(),
    }
}

pub fn summarize_parameter_at(
    today: NaiveDate,
    parameter: TrackedParameter,
    values: Vec<ParameterValue>,
) -> ParameterSummary {
    let week = week_window_at(today, &values);
    ParameterSummary {
        week_average: week_average(&week),
        trend: trend(&week),
        parameter,
        values,
        week,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueRange {
    Week,
    Month,
    Season,
    Year,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Season {
    Winter,
    Spring,
    Summer,
    Autumn,
}

pub fn season_of(date: NaiveDate) -> Season {
    match date.month() {
        3..=5 => Season::Spring,
        6..=8 => Season::Summer,
        9..=11 => Season::Autumn,
        _ => Season::Winter,
    }
}

fn first_of_month(year: i32, month: u32) -> NaiveDate {
    // Month arithmetic below always yields 1..=12.
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(NaiveDate::MIN)
}

fn add_months(year: i32, month: u32, months: u32) -> NaiveDate {
    let zero_based = month - 1 + months;
    first_of_month(year + (zero_based / 12) as i32, zero_based % 12 + 1)
}

/// Half-open `[start, end)` range containing `today`.
pub fn range_bounds(range: ValueRange, today: NaiveDate) -> (NaiveDate, NaiveDate) {
    match range {
        ValueRange::Week => {
            let start = today - Duration::days(today.weekday().num_days_from_sunday() as i64);
            (start, start + Duration::days(WEEK_DAYS))
        }
        ValueRange::Month => (
            first_of_month(today.year(), today.month()),
            add_months(today.year(), today.month(), 1),
        ),
        ValueRange::Season => {
            let year = today.year();
            let start = match season_of(today) {
                Season::Spring => first_of_month(year, 3),
                Season::Summer => first_of_month(year, 6),
                Season::Autumn => first_of_month(year, 9),
                Season::Winter if today.month() == 12 => first_of_month(year, 12),
                Season::Winter => first_of_month(year - 1, 12),
            };
            (start, add_months(start.year(), start.month(), 3))
        }
        ValueRange::Year => (
            first_of_month(today.year(), 1),
            first_of_month(today.year() + 1, 1),
        ),
    }
}

/// Values dated inside `range`, newest first. Undated values are skipped.
pub fn values_in_range_at(
    today: NaiveDate,
    range: ValueRange,
    values: &[ParameterValue],
) -> Vec<ParameterValue> {
    let (start, end) = range_bounds(range, today);
    let mut selected: Vec<ParameterValue> = values
        .iter()
        .filter(|v| {
            v.parsed_date()
                .map(|date| date >= start && date < end)
                .unwrap_or(false)
        })
        .cloned()
        .collect();
    selected.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| b.time.cmp(&a.time)));
    selected
}

/// Progress of a goal from its latest 1–7 rating. Unrated is 0%.
pub fn goal_progress(goal: Goal, rating: Option<u8>) -> GoalProgress {
    let Some(value) = rating.filter(|v| *v > 0) else {
        return GoalProgress {
            goal,
            rating: None,
            percentage: 0.0,
            band: ProgressBand::Unrated,
            status_text: "not rated".to_string(),
        };
    };

    let band = match value {
        6.. => ProgressBand::High,
        4..=5 => ProgressBand::Medium,
        _ => ProgressBand::Low,
    };
    GoalProgress {
        goal,
        rating: Some(value),
        percentage: f64::from(value) / f64::from(MAX_GOAL_VALUE) * 100.0,
        band,
        status_text: format!("rated {value}/{MAX_GOAL_VALUE}"),
    }
}

fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GoalStatus;

    fn value_on(date: NaiveDate, value: &str) -> ParameterValue {
        ParameterValue {
            id: date.num_days_from_ce() as i64,
            value: value.to_string(),
            date: date_key(date),
            time: "09:00".to_string(),
            notes: None,
        }
    }

    fn points(values: &[f64]) -> Vec<DayPoint> {
        let start = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, v)| DayPoint {
                date: start + Duration::days(i as i64),
                value: *v,
            })
            .collect()
    }

    #[test]
    fn week_average_ignores_empty_days() {
        let today = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        let values = vec![
            value_on(today - Duration::days(2), "10"),
            value_on(today, "20"),
        ];

        let week = week_window_at(today, &values);
        assert_eq!(week.len(), 7);
        assert_eq!(week[0].date, today - Duration::days(6));
        assert_eq!(week[6].date, today);
        assert_eq!(week_average(&week), 15.0);
    }

    #[test]
    fn unparsable_values_count_as_zero() {
        let today = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        let values = vec![value_on(today, "lots"), value_on(today - Duration::days(1), "4")];
        let week = week_window_at(today, &values);
        assert_eq!(week[6].value, 0.0);
        assert_eq!(week_average(&week), 4.0);
    }

    #[test]
    fn trend_needs_two_readings() {
        assert_eq!(trend(&points(&[0.0, 5.0, 0.0])), Trend::STABLE);
    }

    #[test]
    fn trend_splits_recorded_days_in_half() {
        let up = trend(&points(&[10.0, 0.0, 20.0]));
        assert_eq!(up.direction, TrendDirection::Up);
        assert_eq!(up.percentage, 100.0);

        // First half [10], second half [9, 8] -> -15%.
        let down = trend(&points(&[10.0, 9.0, 8.0]));
        assert_eq!(down.direction, TrendDirection::Down);
        assert!((down.percentage - 15.0).abs() < 1e-9);
    }

    #[test]
    fn small_changes_are_stable() {
        assert_eq!(trend(&points(&[100.0, 104.0])), Trend::STABLE);
    }

    #[test]
    fn week_range_starts_on_sunday() {
        // 2026-01-07 is a Wednesday.
        let today = NaiveDate::from_ymd_opt(2026, 1, 7).unwrap();
        let (start, end) = range_bounds(ValueRange::Week, today);
        assert_eq!(start, NaiveDate::from_ymd_opt(2026, 1, 4).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2026, 1, 11).unwrap());
    }

    #[test]
    fn month_and_year_ranges() {
        let today = NaiveDate::from_ymd_opt(2026, 12, 15).unwrap();
        assert_eq!(
            range_bounds(ValueRange::Month, today),
            (
                NaiveDate::from_ymd_opt(2026, 12, 1).unwrap(),
                NaiveDate::from_ymd_opt(2027, 1, 1).unwrap()
            )
        );
        assert_eq!(
            range_bounds(ValueRange::Year, today),
            (
                NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2027, 1, 1).unwrap()
            )
        );
    }

    #[test]
    fn winter_spans_the_new_year() {
        let january = NaiveDate::from_ymd_opt(2026, 1, 20).unwrap();
        assert_eq!(
            range_bounds(ValueRange::Season, january),
            (
                NaiveDate::from_ymd_opt(2025, 12, 1).unwrap(),
                NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()
            )
        );

        let december = NaiveDate::from_ymd_opt(2026, 12, 20).unwrap();
        assert_eq!(
            range_bounds(ValueRange::Season, december),
            (
                NaiveDate::from_ymd_opt(2026, 12, 1).unwrap(),
                NaiveDate::from_ymd_opt(2027, 3, 1).unwrap()
            )
        );

        let july = NaiveDate::from_ymd_opt(2026, 7, 4).unwrap();
        assert_eq!(season_of(july), Season::Summer);
        assert_eq!(
            range_bounds(ValueRange::Season, july),
            (
                NaiveDate::from_ymd_opt(2026, 6, 1).unwrap(),
                NaiveDate::from_ymd_opt(2026, 9, 1).unwrap()
            )
        );
    }

    #[test]
    fn range_filter_sorts_newest_first() {
        let today = NaiveDate::from_ymd_opt(2026, 5, 20).unwrap();
        let values = vec![
            value_on(NaiveDate::from_ymd_opt(2026, 5, 2).unwrap(), "1"),
            value_on(NaiveDate::from_ymd_opt(2026, 4, 30).unwrap(), "2"),
            value_on(NaiveDate::from_ymd_opt(2026, 5, 18).unwrap(), "3"),
        ];
        let month = values_in_range_at(today, ValueRange::Month, &values);
        let dates: Vec<&str> = month.iter().map(|v| v.date.as_str()).collect();
        assert_eq!(dates, vec!["2026-05-18", "2026-05-02"]);
        assert_eq!(values_in_range_at(today, ValueRange::Season, &values).len(), 3);
    }

    #[test]
    fn unrated_goal_has_zero_progress() {
        let goal = Goal {
            id: 1,
            title: "Sleep".to_string(),
            status: GoalStatus::Active,
            is_custom: true,
            user_id: "user_1".to_string(),
        };
        let progress = goal_progress(goal.clone(), None);
        assert_eq!(progress.percentage, 0.0);
        assert_eq!(progress.band, ProgressBand::Unrated);
        assert_eq!(progress.status_text, "not rated");

        let rated = goal_progress(goal, Some(7));
        assert_eq!(rated.percentage, 100.0);
        assert_eq!(rated.band, ProgressBand::High);
    }
}
