//! Derived views recomputed by subscribers.

use crate::collections::Records;
use crate::keys::{self, KeyFilter};
use crate::models::{
    Article, GoalProgress, ParameterSummary, ParameterValue, ResolvedMetric, TrackedParameter,
};
use crate::stats::{self, ValueRange};
use crate::subscriber::View;
use chrono::NaiveDate;

fn resolve_today(pinned: Option<NaiveDate>) -> NaiveDate {
    pinned.unwrap_or_else(stats::today)
}

/// Every tracked parameter with its week window, average and trend.
#[derive(Debug, Clone, Default)]
pub struct ParameterWidgets {
    pub today: Option<NaiveDate>,
}

impl View for ParameterWidgets {
    type Output = Vec<ParameterSummary>;

    fn name(&self) -> &'static str {
        "parameter_widgets"
    }

    fn filter(&self) -> KeyFilter {
        KeyFilter::Any(vec![
            KeyFilter::exact(keys::TRACKED_PARAMETERS),
            KeyFilter::prefix(keys::PARAMETER_VALUES_PREFIX),
        ])
    }

    fn load(&self, records: &Records) -> Self::Output {
        let today = resolve_today(self.today);
        records
            .tracked_parameters()
            .into_iter()
            .map(|parameter| {
                let values = records.parameter_values(parameter.id);
                stats::summarize_parameter_at(today, parameter, values)
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterDetailSnapshot {
    pub summary: ParameterSummary,
    /// Values inside the selected range, newest first.
    pub in_range: Vec<ParameterValue>,
    pub article: Option<Article>,
}

/// One parameter's history. `None` output means the id does not resolve.
#[derive(Debug, Clone)]
pub struct ParameterDetail {
    pub parameter_id: i64,
    pub range: ValueRange,
    pub today: Option<NaiveDate>,
}

impl ParameterDetail {
    pub fn new(parameter_id: i64, range: ValueRange) -> Self {
        Self {
            parameter_id,
            range,
            today: None,
        }
    }
}

impl View for ParameterDetail {
    type Output = Option<ParameterDetailSnapshot>;

    fn name(&self) -> &'static str {
        "parameter_detail"
    }

    fn filter(&self) -> KeyFilter {
        KeyFilter::Any(vec![
            KeyFilter::exact(keys::TRACKED_PARAMETERS),
            KeyFilter::exact(keys::parameter_values(self.parameter_id)),
            KeyFilter::exact(keys::parameter_article(self.parameter_id)),
        ])
    }

    fn load(&self, records: &Records) -> Self::Output {
        let parameter = records.tracked_parameter(self.parameter_id)?;
        let today = resolve_today(self.today);
        let values = records.parameter_values(self.parameter_id);
        let in_range = stats::values_in_range_at(today, self.range, &values);
        Some(ParameterDetailSnapshot {
            summary: stats::summarize_parameter_at(today, parameter, values),
            in_range,
            article: records.parameter_article(self.parameter_id),
        })
    }
}

/// Every goal with its latest rating.
#[derive(Debug, Clone, Default)]
pub struct GoalsStatus;

impl View for GoalsStatus {
    type Output = Vec<GoalProgress>;

    fn name(&self) -> &'static str {
        "goals_status"
    }

    fn filter(&self) -> KeyFilter {
        KeyFilter::Any(vec![
            KeyFilter::exact(keys::GOALS),
            KeyFilter::prefix(keys::GOAL_VALUE_PREFIX),
        ])
    }

    fn load(&self, records: &Records) -> Self::Output {
        records
            .goals()
            .into_iter()
            .map(|goal| {
                let rating = records.goal_value(goal.id);
                stats::goal_progress(goal, rating)
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GoalDetailSnapshot {
    pub progress: GoalProgress,
    pub metrics: Vec<ResolvedMetric>,
    pub article: Option<Article>,
}

#[derive(Debug, Clone)]
pub struct GoalDetail {
    pub goal_id: i64,
}

impl View for GoalDetail {
    type Output = Option<GoalDetailSnapshot>;

    fn name(&self) -> &'static str {
        "goal_detail"
    }

    fn filter(&self) -> KeyFilter {
        KeyFilter::Any(vec![
            KeyFilter::exact(keys::GOALS),
            KeyFilter::exact(keys::TRACKED_PARAMETERS),
            KeyFilter::exact(keys::goal_metrics(self.goal_id)),
            KeyFilter::exact(keys::goal_value(self.goal_id)),
            KeyFilter::exact(keys::goal_article(self.goal_id)),
        ])
    }

    fn load(&self, records: &Records) -> Self::Output {
        let goal = records.goal(self.goal_id)?;
        Some(GoalDetailSnapshot {
            progress: stats::goal_progress(goal, records.goal_value(self.goal_id)),
            metrics: records.resolved_goal_metrics(self.goal_id),
            article: records.goal_article(self.goal_id),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricHistory {
    pub metric: ResolvedMetric,
    pub values: Vec<ParameterValue>,
}

/// Values of a goal's selected metrics inside one range.
#[derive(Debug, Clone)]
pub struct GoalMetricsHistory {
    pub goal_id: i64,
    pub range: ValueRange,
    pub today: Option<NaiveDate>,
}

impl View for GoalMetricsHistory {
    type Output = Vec<MetricHistory>;

    fn name(&self) -> &'static str {
        "goal_metrics_history"
    }

    fn filter(&self) -> KeyFilter {
        KeyFilter::Any(vec![
            KeyFilter::exact(keys::TRACKED_PARAMETERS),
            KeyFilter::exact(keys::goal_metrics(self.goal_id)),
            KeyFilter::prefix(keys::PARAMETER_VALUES_PREFIX),
        ])
    }

    fn load(&self, records: &Records) -> Self::Output {
        let today = resolve_today(self.today);
        records
            .resolved_goal_metrics(self.goal_id)
            .into_iter()
            .map(|metric| {
                let values = records.parameter_values(metric.snapshot.id);
                MetricHistory {
                    values: stats::values_in_range_at(today, self.range, &values),
                    metric,
                }
            })
            .collect()
    }
}

/// Parameters not yet selected for a goal, in collection order.
pub fn selectable_metrics(records: &Records, goal_id: i64) -> Vec<TrackedParameter> {
    let selected = records.goal_metrics(goal_id);
    records
        .tracked_parameters()
        .into_iter()
        .filter(|p| !selected.iter().any(|s| s.id == p.id))
        .collect()
}
