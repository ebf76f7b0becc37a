//! Record collections over the key/value store.
//!
//! Reads never fail: a missing key is an empty collection, a malformed one
//! is logged and treated as empty. Every mutation is a read-modify-write of
//! the whole serialized collection through [`Context::commit`], so it
//! publishes exactly once and only when something was written.

use crate::errors::{AppError, ErrorKind};
use crate::keys;
use crate::models::{
    Article, DEFAULT_USER_ID, Goal, GoalStatus, NewParameterValue, ParameterValue,
    ResolvedMetric, TrackedParameter,
};
use crate::notifier::Context;
use crate::store::{KeyValueStore, Write};
use chrono::Local;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::{info, warn};

pub const MIN_GOAL_VALUE: u8 = 1;
pub const MAX_GOAL_VALUE: u8 = 7;

static LAST_ID: AtomicI64 = AtomicI64::new(0);

/// Millisecond timestamp id, bumped past the previous one when two records
/// are created within the same millisecond.
pub fn next_id() -> i64 {
    let now = Local::now().timestamp_millis();
    let mut last = LAST_ID.load(Ordering::Relaxed);
    loop {
        let candidate = now.max(last + 1);
        match LAST_ID.compare_exchange_weak(last, candidate, Ordering::SeqCst, Ordering::Relaxed)
        {
            Ok(_) => return candidate,
            Err(actual) => last = actual,
        }
    }
}

pub fn parse_json<T: DeserializeOwned>(key: &str, raw: Option<&str>) -> Option<T> {
    let raw = raw?;
    match serde_json::from_str(raw) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(key, "malformed record, using default: {err}");
            None
        }
    }
}

pub fn read_json<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Option<T> {
    parse_json(key, store.get(key).as_deref())
}

pub fn read_collection<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Vec<T> {
    read_json(store, key).unwrap_or_default()
}

fn required(value: &str, field: &str) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}

/// Typed access to every collection, bound to the context that publishes
/// the resulting changes.
#[derive(Clone)]
pub struct Records {
    context: Context,
}

impl Records {
    pub fn new(context: Context) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    fn store(&self) -> &dyn KeyValueStore {
        self.context.store().as_ref()
    }

    /// Applies `f` to the collection under `key`. Errors from `f` leave the
    /// store untouched; an unchanged collection is not rewritten.
    fn mutate<T, R>(
        &self,
        key: &str,
        mut f: impl FnMut(&mut Vec<T>) -> Result<R, AppError>,
    ) -> Result<R, AppError>
    where
        T: Serialize + DeserializeOwned + Clone + PartialEq,
    {
        let mut outcome: Option<Result<R, AppError>> = None;
        self.context.commit(key, |current| {
            let before: Vec<T> = parse_json(key, current).unwrap_or_default();
            let mut items = before.clone();
            match f(&mut items) {
                Ok(result) if items == before => {
                    outcome = Some(Ok(result));
                    Write::Keep
                }
                Ok(result) => match serde_json::to_string(&items) {
                    Ok(json) => {
                        outcome = Some(Ok(result));
                        Write::Set(json)
                    }
                    Err(err) => {
                        outcome = Some(Err(err.into()));
                        Write::Keep
                    }
                },
                Err(err) => {
                    outcome = Some(Err(err));
                    Write::Keep
                }
            }
        });
        outcome.unwrap_or_else(|| {
            Err(AppError::new(
                ErrorKind::Internal,
                format!("store skipped update of `{key}`"),
            ))
        })
    }

    fn write_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), AppError> {
        let json = serde_json::to_string(value)?;
        self.context.set(key, json);
        Ok(())
    }

    // Tracked parameters

    pub fn tracked_parameters(&self) -> Vec<TrackedParameter> {
        read_collection(self.store(), keys::TRACKED_PARAMETERS)
    }

    pub fn tracked_parameter(&self, id: i64) -> Option<TrackedParameter> {
        self.tracked_parameters().into_iter().find(|p| p.id == id)
    }

    pub fn create_tracked_parameter(
        &self,
        name: &str,
        unit: &str,
    ) -> Result<TrackedParameter, AppError> {
        let parameter = TrackedParameter {
            id: next_id(),
            name: required(name, "parameter name")?,
            unit: required(unit, "parameter unit")?,
            user_id: DEFAULT_USER_ID.to_string(),
            current_value: None,
            last_updated: None,
        };
        self.mutate(keys::TRACKED_PARAMETERS, |items| {
            items.push(parameter.clone());
            Ok(())
        })?;
        info!(parameter_id = parameter.id, "tracked parameter created");
        Ok(parameter)
    }

    pub fn rename_tracked_parameter(
        &self,
        id: i64,
        name: &str,
    ) -> Result<TrackedParameter, AppError> {
        let name = required(name, "parameter name")?;
        self.mutate(keys::TRACKED_PARAMETERS, |items: &mut Vec<TrackedParameter>| {
            let parameter = items
                .iter_mut()
                .find(|p| p.id == id)
                .ok_or_else(|| AppError::not_found(format!("parameter {id} not found")))?;
            parameter.name = name.clone();
            Ok(parameter.clone())
        })
    }

    /// Removes the parameter together with its values and article.
    pub fn delete_tracked_parameter(&self, id: i64) -> Result<(), AppError> {
        self.mutate(keys::TRACKED_PARAMETERS, |items: &mut Vec<TrackedParameter>| {
            let before = items.len();
            items.retain(|p| p.id != id);
            if items.len() == before {
                return Err(AppError::not_found(format!("parameter {id} not found")));
            }
            Ok(())
        })?;
        self.context.remove(&keys::parameter_values(id));
        self.context.remove(&keys::parameter_article(id));
        info!(parameter_id = id, "tracked parameter deleted");
        Ok(())
    }

    // Parameter values

    pub fn parameter_values(&self, parameter_id: i64) -> Vec<ParameterValue> {
        read_collection(self.store(), &keys::parameter_values(parameter_id))
    }

    /// Rejects a second value for the same date; the collection is left as is.
    pub fn add_parameter_value(
        &self,
        parameter_id: i64,
        new_value: NewParameterValue,
    ) -> Result<ParameterValue, AppError> {
        if self.tracked_parameter(parameter_id).is_none() {
            return Err(AppError::not_found(format!(
                "parameter {parameter_id} not found"
            )));
        }
        let value = ParameterValue {
            id: next_id(),
            value: required(&new_value.value, "value")?,
            date: new_value.date.format("%Y-%m-%d").to_string(),
            time: required(&new_value.time, "time")?,
            notes: new_value
                .notes
                .map(|notes| notes.trim().to_string())
                .filter(|notes| !notes.is_empty()),
        };
        self.mutate(
            &keys::parameter_values(parameter_id),
            |items: &mut Vec<ParameterValue>| {
                if items.iter().any(|v| v.date == value.date) {
                    return Err(AppError::validation(format!(
                        "a value for {} already exists",
                        value.date
                    )));
                }
                items.push(value.clone());
                Ok(())
            },
        )?;
        Ok(value)
    }

    pub fn delete_parameter_value(&self, parameter_id: i64, value_id: i64) -> Result<(), AppError> {
        self.mutate(
            &keys::parameter_values(parameter_id),
            |items: &mut Vec<ParameterValue>| {
                let before = items.len();
                items.retain(|v| v.id != value_id);
                if items.len() == before {
                    return Err(AppError::not_found(format!("value {value_id} not found")));
                }
                Ok(())
            },
        )
    }

    // Goals

    pub fn goals(&self) -> Vec<Goal> {
        read_collection(self.store(), keys::GOALS)
    }

    pub fn goal(&self, id: i64) -> Option<Goal> {
        self.goals().into_iter().find(|g| g.id == id)
    }

    pub fn create_goal(
        &self,
        title: &str,
        status: GoalStatus,
        is_custom: bool,
    ) -> Result<Goal, AppError> {
        let goal = Goal {
            id: next_id(),
            title: required(title, "goal title")?,
            status,
            is_custom,
            user_id: DEFAULT_USER_ID.to_string(),
        };
        self.mutate(keys::GOALS, |items| {
            items.push(goal.clone());
            Ok(())
        })?;
        info!(goal_id = goal.id, "goal created");
        Ok(goal)
    }

    pub fn rename_goal(&self, id: i64, title: &str) -> Result<Goal, AppError> {
        let title = required(title, "goal title")?;
        self.update_goal(id, |goal| goal.title = title.clone())
    }

    /// Any status may follow any other.
    pub fn set_goal_status(&self, id: i64, status: GoalStatus) -> Result<Goal, AppError> {
        self.update_goal(id, |goal| goal.status = status)
    }

    fn update_goal(&self, id: i64, mut apply: impl FnMut(&mut Goal)) -> Result<Goal, AppError> {
        self.mutate(keys::GOALS, |items: &mut Vec<Goal>| {
            let goal = items
                .iter_mut()
                .find(|g| g.id == id)
                .ok_or_else(|| AppError::not_found(format!("goal {id} not found")))?;
            apply(goal);
            Ok(goal.clone())
        })
    }

    /// Removes the goal and every per-goal key.
    pub fn delete_goal(&self, id: i64) -> Result<(), AppError> {
        self.mutate(keys::GOALS, |items: &mut Vec<Goal>| {
            let before = items.len();
            items.retain(|g| g.id != id);
            if items.len() == before {
                return Err(AppError::not_found(format!("goal {id} not found")));
            }
            Ok(())
        })?;
        for key in keys::goal_ancillary(id) {
            self.context.remove(&key);
        }
        info!(goal_id = id, "goal deleted");
        Ok(())
    }

    // Goal rating

    pub fn goal_value(&self, goal_id: i64) -> Option<u8> {
        let key = keys::goal_value(goal_id);
        let raw = self.store().get(&key)?;
        match raw.trim().parse::<u8>() {
            Ok(value) if (MIN_GOAL_VALUE..=MAX_GOAL_VALUE).contains(&value) => Some(value),
            _ => {
                warn!(key = %key, raw = %raw, "ignoring invalid goal value");
                None
            }
        }
    }

    /// Overwrites the previous rating.
    pub fn set_goal_value(&self, goal_id: i64, value: u8) -> Result<(), AppError> {
        if !(MIN_GOAL_VALUE..=MAX_GOAL_VALUE).contains(&value) {
            return Err(AppError::validation(format!(
                "goal value must be between {MIN_GOAL_VALUE} and {MAX_GOAL_VALUE}"
            )));
        }
        if self.goal(goal_id).is_none() {
            return Err(AppError::not_found(format!("goal {goal_id} not found")));
        }
        self.context.set(&keys::goal_value(goal_id), value.to_string());
        Ok(())
    }

    pub fn clear_goal_value(&self, goal_id: i64) -> bool {
        self.context.remove(&keys::goal_value(goal_id))
    }

    // Goal metric selection

    pub fn goal_metrics(&self, goal_id: i64) -> Vec<TrackedParameter> {
        read_collection(self.store(), &keys::goal_metrics(goal_id))
    }

    /// Replaces the selection, keeping the first occurrence of each parameter.
    pub fn set_goal_metrics(
        &self,
        goal_id: i64,
        metrics: Vec<TrackedParameter>,
    ) -> Result<Vec<TrackedParameter>, AppError> {
        let mut seen = HashSet::new();
        let unique: Vec<TrackedParameter> =
            metrics.into_iter().filter(|m| seen.insert(m.id)).collect();
        self.mutate(&keys::goal_metrics(goal_id), |items| {
            *items = unique.clone();
            Ok(())
        })?;
        Ok(unique)
    }

    /// Appends a snapshot of `parameter`; returns `false` if already selected.
    pub fn add_goal_metric(
        &self,
        goal_id: i64,
        parameter: &TrackedParameter,
    ) -> Result<bool, AppError> {
        self.mutate(&keys::goal_metrics(goal_id), |items: &mut Vec<TrackedParameter>| {
            if items.iter().any(|m| m.id == parameter.id) {
                return Ok(false);
            }
            items.push(parameter.clone());
            Ok(true)
        })
    }

    pub fn remove_goal_metric(&self, goal_id: i64, parameter_id: i64) -> Result<bool, AppError> {
        self.mutate(&keys::goal_metrics(goal_id), |items: &mut Vec<TrackedParameter>| {
            let before = items.len();
            items.retain(|m| m.id != parameter_id);
            Ok(items.len() != before)
        })
    }

    /// Joins the stored snapshots against the live parameter collection.
    pub fn resolved_goal_metrics(&self, goal_id: i64) -> Vec<ResolvedMetric> {
        let live = self.tracked_parameters();
        self.goal_metrics(goal_id)
            .into_iter()
            .map(|snapshot| ResolvedMetric {
                live: live.iter().find(|p| p.id == snapshot.id).cloned(),
                snapshot,
            })
            .collect()
    }

    /// Rewrites the snapshots from the live parameters and drops the ones
    /// whose parameter is gone. Returns the number of entries kept.
    pub fn refresh_goal_metrics(&self, goal_id: i64) -> Result<usize, AppError> {
        let live = self.tracked_parameters();
        self.mutate(&keys::goal_metrics(goal_id), |items: &mut Vec<TrackedParameter>| {
            *items = items
                .iter()
                .filter_map(|snapshot| live.iter().find(|p| p.id == snapshot.id).cloned())
                .collect();
            Ok(items.len())
        })
    }

    // Article associations

    pub fn goal_article(&self, goal_id: i64) -> Option<Article> {
        read_json(self.store(), &keys::goal_article(goal_id))
    }

    pub fn set_goal_article(&self, goal_id: i64, article: Option<&Article>) -> Result<(), AppError> {
        let key = keys::goal_article(goal_id);
        match article {
            Some(article) => self.write_json(&key, article),
            None => {
                self.context.remove(&key);
                Ok(())
            }
        }
    }

    pub fn parameter_article(&self, parameter_id: i64) -> Option<Article> {
        read_json(self.store(), &keys::parameter_article(parameter_id))
    }

    pub fn set_parameter_article(
        &self,
        parameter_id: i64,
        article: Option<&Article>,
    ) -> Result<(), AppError> {
        let key = keys::parameter_article(parameter_id);
        match article {
            Some(article) => self.write_json(&key, article),
            None => {
                self.context.remove(&key);
                Ok(())
            }
        }
    }
}
