use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const DEFAULT_USER_ID: &str = "user_1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedParameter {
    pub id: i64,
    pub name: String,
    pub unit: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterValue {
    pub id: i64,
    pub value: String,
    /// `YYYY-MM-DD`
    pub date: String,
    /// `HH:MM`
    pub time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl ParameterValue {
    pub fn parsed_date(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(&self.date, "%Y-%m-%d").ok()
    }

    /// Numeric reading; anything unparsable counts as zero.
    pub fn numeric(&self) -> f64 {
        self.value
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .unwrap_or(0.0)
    }
}

#[derive(Debug, Clone)]
pub struct NewParameterValue {
    pub value: String,
    pub date: NaiveDate,
    pub time: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoalStatus {
    Active,
    Completed,
    Paused,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    pub id: i64,
    pub title: String,
    pub status: GoalStatus,
    pub is_custom: bool,
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: i64,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, rename = "publishedAt", skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_created: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Article {
    pub fn published(&self) -> Option<&str> {
        self.published_at.as_deref().or(self.date_created.as_deref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleEnvelope {
    pub data: Vec<Article>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DayPoint {
    pub date: NaiveDate,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendDirection {
    Up,
    Down,
    Stable,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trend {
    pub direction: TrendDirection,
    pub percentage: f64,
}

impl Trend {
    pub const STABLE: Trend = Trend {
        direction: TrendDirection::Stable,
        percentage: 0.0,
    };
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSummary {
    pub parameter: TrackedParameter,
    pub values: Vec<ParameterValue>,
    pub week: Vec<DayPoint>,
    pub week_average: f64,
    pub trend: Trend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressBand {
    Unrated,
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GoalProgress {
    pub goal: Goal,
    pub rating: Option<u8>,
    pub percentage: f64,
    pub band: ProgressBand,
    pub status_text: String,
}

/// A goal's metric snapshot joined against the live parameter collection.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMetric {
    pub snapshot: TrackedParameter,
    /// `None` when the parameter has since been deleted.
    pub live: Option<TrackedParameter>,
}

impl ResolvedMetric {
    pub fn is_orphaned(&self) -> bool {
        self.live.is_none()
    }

    pub fn is_stale(&self) -> bool {
        match &self.live {
            Some(live) => live.name != self.snapshot.name || live.unit != self.snapshot.unit,
            None => false,
        }
    }

    /// Live record when available, snapshot otherwise.
    pub fn current(&self) -> &TrackedParameter {
        self.live.as_ref().unwrap_or(&self.snapshot)
    }
}
