//! Storage key schema.

pub const TRACKED_PARAMETERS: &str = "tracked_parameters";
pub const GOALS: &str = "goals";

pub const PARAMETER_VALUES_PREFIX: &str = "parameter_values_";
pub const PARAMETER_ARTICLE_PREFIX: &str = "parameter_article_";
pub const GOAL_METRICS_PREFIX: &str = "goal_metrics_";
pub const GOAL_ARTICLE_PREFIX: &str = "goal_article_";
pub const GOAL_VALUE_PREFIX: &str = "goal_value_";
pub const GOAL_ACTIVITIES_PREFIX: &str = "goal_activities_";

pub fn parameter_values(parameter_id: i64) -> String {
    format!("{PARAMETER_VALUES_PREFIX}{parameter_id}")
}

pub fn parameter_article(parameter_id: i64) -> String {
    format!("{PARAMETER_ARTICLE_PREFIX}{parameter_id}")
}

pub fn goal_metrics(goal_id: i64) -> String {
    format!("{GOAL_METRICS_PREFIX}{goal_id}")
}

pub fn goal_article(goal_id: i64) -> String {
    format!("{GOAL_ARTICLE_PREFIX}{goal_id}")
}

pub fn goal_value(goal_id: i64) -> String {
    format!("{GOAL_VALUE_PREFIX}{goal_id}")
}

pub fn goal_activities(goal_id: i64) -> String {
    format!("{GOAL_ACTIVITIES_PREFIX}{goal_id}")
}

/// Every per-goal key removed when the goal is deleted.
pub fn goal_ancillary(goal_id: i64) -> [String; 4] {
    [
        goal_metrics(goal_id),
        goal_article(goal_id),
        goal_value(goal_id),
        goal_activities(goal_id),
    ]
}

/// Which storage keys a listener cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyFilter {
    Exact(String),
    Prefix(String),
    Any(Vec<KeyFilter>),
}

impl KeyFilter {
    pub fn exact(key: impl Into<String>) -> Self {
        Self::Exact(key.into())
    }

    pub fn prefix(prefix: impl Into<String>) -> Self {
        Self::Prefix(prefix.into())
    }

    /// `None` stands for "the whole store changed" and matches every filter.
    pub fn matches(&self, key: Option<&str>) -> bool {
        let Some(key) = key else {
            return true;
        };
        match self {
            Self::Exact(expected) => expected == key,
            Self::Prefix(prefix) => key.starts_with(prefix.as_str()),
            Self::Any(filters) => filters.iter().any(|f| f.matches(Some(key))),
        }
    }
}
