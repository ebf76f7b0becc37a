use chrono::{Duration as Days, Local};
use std::time::{Duration, Instant};
use tokio::time::{sleep, timeout};
use wellness_sync::keys;
use wellness_sync::models::{GoalStatus, NewParameterValue, ProgressBand};
use wellness_sync::views::{GoalsStatus, ParameterWidgets};
use wellness_sync::{AppConfig, AppState, KeyValueStore, Records, Subscriber, SubscriberState};

fn unique_data_path() -> std::path::PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let mut path = std::env::temp_dir();
    path.push(format!("wellness_sync_{}_{}.json", std::process::id(), nanos));
    path
}

fn reading(value: &str, days_ago: i64) -> NewParameterValue {
    NewParameterValue {
        value: value.to_string(),
        date: Local::now().date_naive() - Days::days(days_ago),
        time: "08:00".to_string(),
        notes: None,
    }
}

#[test]
fn appended_goal_is_read_back_exactly_once() {
    let state = AppState::ephemeral(AppConfig::default());
    let records = state.records();
    records.create_goal("Drink water", GoalStatus::Active, false).unwrap();
    let goal = records.create_goal("Walk 10k steps", GoalStatus::Active, true).unwrap();

    let goals = records.goals();
    assert_eq!(goals.len(), 2);
    assert_eq!(goals.iter().filter(|g| **g == goal).count(), 1);
}

#[test]
fn second_value_for_same_date_is_rejected() {
    let state = AppState::ephemeral(AppConfig::default());
    let records = state.records();
    let weight = records.create_tracked_parameter("Weight", "kg").unwrap();

    records.add_parameter_value(weight.id, reading("80.1", 0)).unwrap();
    let before = records.parameter_values(weight.id);
    let err = records
        .add_parameter_value(weight.id, reading("79.9", 0))
        .unwrap_err();

    assert!(err.is_validation());
    assert_eq!(records.parameter_values(weight.id), before);
}

#[test]
fn deleting_goal_removes_every_ancillary_key() {
    let state = AppState::ephemeral(AppConfig::default());
    let records = state.records();
    let goal = records.create_goal("Meditate", GoalStatus::Active, true).unwrap();
    let mood = records.create_tracked_parameter("Mood", "points").unwrap();
    records.add_goal_metric(goal.id, &mood).unwrap();
    records.set_goal_value(goal.id, 5).unwrap();
    records
        .context()
        .set(&keys::goal_activities(goal.id), "[]".to_string());
    let client = state.article_client();
    let article = client.fallback_articles().unwrap().remove(0);
    records.set_goal_article(goal.id, Some(&article)).unwrap();

    records.delete_goal(goal.id).unwrap();

    assert!(records.goal(goal.id).is_none());
    let store = records.context().store();
    for key in keys::goal_ancillary(goal.id) {
        assert_eq!(store.get(&key), None, "{key} survived");
    }
    assert!(records.goal_metrics(goal.id).is_empty());
    assert_eq!(records.goal_value(goal.id), None);
    assert!(records.goal_article(goal.id).is_none());
    // The parameter itself is not owned by the goal.
    assert!(records.tracked_parameter(mood.id).is_some());
}

#[tokio::test]
async fn goal_written_in_one_tab_reaches_another() {
    let state = AppState::ephemeral(AppConfig::default());
    let tab_a = state.open_context();
    let tab_b = state.open_context();
    assert!(tab_b.spawn_pump());

    let widget = Subscriber::new(&tab_b, GoalsStatus).mount();
    let mut changes = widget.watch();
    assert!(widget.current().is_empty());

    Records::new(tab_a.clone())
        .create_goal("Sleep 8 hours", GoalStatus::Active, true)
        .unwrap();

    timeout(Duration::from_secs(2), changes.changed())
        .await
        .expect("no notification reached the other tab")
        .unwrap();
    let goals = widget.current();
    assert_eq!(goals.len(), 1);
    assert_eq!(goals[0].goal.title, "Sleep 8 hours");
}

#[test]
fn sibling_in_same_tab_updates_synchronously() {
    let state = AppState::ephemeral(AppConfig::default());
    let tab = state.open_context();
    let widget = Subscriber::new(&tab, GoalsStatus).mount();
    let records = Records::new(tab.clone());

    let goal = records.create_goal("Stretch", GoalStatus::Active, true).unwrap();
    assert_eq!(widget.current().len(), 1);
    assert_eq!(widget.state(), SubscriberState::Ready);

    records.set_goal_value(goal.id, 4).unwrap();
    let progress = &widget.current()[0];
    assert_eq!(progress.rating, Some(4));
    assert_eq!(progress.band, ProgressBand::Medium);

    records.set_goal_status(goal.id, GoalStatus::Cancelled).unwrap();
    records.set_goal_status(goal.id, GoalStatus::Active).unwrap();
    assert_eq!(widget.current()[0].goal.status, GoalStatus::Active);
}

#[test]
fn other_tab_sees_nothing_until_delivery() {
    let state = AppState::ephemeral(AppConfig::default());
    let tab_a = state.open_context();
    let tab_b = state.open_context();
    let widget = Subscriber::new(&tab_b, GoalsStatus).mount();

    Records::new(tab_a).create_goal("Read", GoalStatus::Active, true).unwrap();
    assert!(widget.current().is_empty());

    assert_eq!(tab_b.drain_remote(), 1);
    assert_eq!(widget.current().len(), 1);
}

#[test]
fn week_average_counts_only_recorded_days() {
    let state = AppState::ephemeral(AppConfig::default());
    let records = state.records();
    let water = records.create_tracked_parameter("Water", "l").unwrap();
    records.add_parameter_value(water.id, reading("10", 2)).unwrap();
    records.add_parameter_value(water.id, reading("20", 0)).unwrap();

    let widget = Subscriber::new(records.context(), ParameterWidgets::default()).mount();
    let summaries = widget.current();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].week.len(), 7);
    assert_eq!(summaries[0].week_average, 15.0);
}

#[test]
fn unrated_goal_shows_zero_progress() {
    let state = AppState::ephemeral(AppConfig::default());
    let records = state.records();
    records.create_goal("Journal", GoalStatus::Paused, true).unwrap();

    let widget = Subscriber::new(records.context(), GoalsStatus).mount();
    let progress = &widget.current()[0];
    assert_eq!(progress.rating, None);
    assert_eq!(progress.percentage, 0.0);
    assert!(!progress.percentage.is_nan());
    assert_eq!(progress.status_text, "not rated");
}

#[test]
fn corrupt_parameter_collection_reads_empty() {
    let state = AppState::ephemeral(AppConfig::default());
    let records = state.records();
    records
        .context()
        .store()
        .set(keys::TRACKED_PARAMETERS, "<<not json>>".to_string());

    assert!(records.tracked_parameters().is_empty());
    let widget = Subscriber::new(records.context(), ParameterWidgets::default()).mount();
    assert_eq!(widget.state(), SubscriberState::Ready);
    assert!(widget.current().is_empty());
}

#[test]
fn concurrent_appends_from_two_tabs_are_not_lost() {
    let state = AppState::ephemeral(AppConfig::default());
    let tab_a = state.open_context();
    let tab_b = state.open_context();

    std::thread::scope(|scope| {
        for (tab, label) in [(&tab_a, "a"), (&tab_b, "b")] {
            scope.spawn(move || {
                let records = Records::new(tab.clone());
                for i in 0..50 {
                    records
                        .create_goal(&format!("{label}-{i}"), GoalStatus::Active, true)
                        .unwrap();
                }
            });
        }
    });

    assert_eq!(state.records().goals().len(), 100);
}

#[tokio::test]
async fn changes_are_persisted_and_reloaded() {
    wellness_sync::telemetry::init_tracing();
    let path = unique_data_path();
    let config = AppConfig {
        data_path: path.clone(),
        ..AppConfig::default()
    };

    let state = AppState::open(config.clone()).await;
    let goal = state
        .records()
        .create_goal("Cycle to work", GoalStatus::Active, true)
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(3);
    loop {
        if let Ok(raw) = tokio::fs::read_to_string(&path).await {
            if raw.contains("Cycle to work") {
                break;
            }
        }
        if Instant::now() > deadline {
            panic!("snapshot was not written");
        }
        sleep(Duration::from_millis(20)).await;
    }
    state.close().await.unwrap();

    let reopened = AppState::open(config).await;
    assert_eq!(reopened.records().goal(goal.id), Some(goal));
    drop(reopened);
    let _ = tokio::fs::remove_file(&path).await;
}

#[tokio::test]
async fn write_right_before_drop_is_not_lost() {
    let path = unique_data_path();
    let config = AppConfig {
        data_path: path.clone(),
        ..AppConfig::default()
    };

    let state = AppState::open(config.clone()).await;
    let goal = state
        .records()
        .create_goal("Persist me", GoalStatus::Active, true)
        .unwrap();
    drop(state);

    let reopened = AppState::open(config.clone()).await;
    assert_eq!(reopened.records().goal(goal.id), Some(goal.clone()));

    let rating = reopened.records();
    rating.set_goal_value(goal.id, 6).unwrap();
    reopened.close().await.unwrap();

    let again = AppState::open(config).await;
    assert_eq!(again.records().goal_value(goal.id), Some(6));
    drop(again);
    let _ = tokio::fs::remove_file(&path).await;
}
