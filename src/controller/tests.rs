//! Behavior tests for the controller state machine, driven through the
//! in-memory store and the scripted broker.

use chrono::TimeZone;
use chrono::Utc;
use serde_json::{json, Value};

use crate::error::ControllerError;
use crate::model::{ResourceStatus, Task, TaskStat, TaskStatus};
use crate::rpc::protocol::ErrorObject;
use crate::testutil::{harness, Harness, NOTIFY_HOST, PQ_HOST, TT_HOST};

fn run_at() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2017, 1, 1, 12, 0, 0).unwrap()
}

/// Admits a priority task through the full add path.
async fn admit(h: &Harness, key: &str, priority: f64) -> Task {
    let mut task = Task::new(key, Some(json!({})), priority, None);
    h.ctrl.add_task(&mut task).await.unwrap();
    task
}

/// Last notify call's meta payload.
fn last_event_meta(h: &Harness) -> Value {
    let calls = h.broker.calls_for("notify");
    calls.last().expect("a notification")["meta"].clone()
}

mod admission {
    use super::*;

    #[tokio::test]
    async fn add_resource_registers_and_persists() {
        let h = harness();
        h.ctrl.add_resource("worker").await.unwrap();

        assert_eq!(h.resources.len(), 1);
        assert_eq!(
            h.resources.raw("worker").unwrap()["status"],
            json!("free")
        );
    }

    #[tokio::test]
    async fn add_resource_twice_fails_and_keeps_one_entry() {
        let h = harness();
        h.ctrl.add_resource("worker").await.unwrap();
        let err = h.ctrl.add_resource("worker").await.unwrap_err();

        assert!(matches!(err, ControllerError::ResourceExists));
        assert_eq!(h.resources.len(), 1);
        assert_eq!(h.ctrl.resources.len(), 1);
    }

    #[tokio::test]
    async fn add_task_without_run_at_is_queued() {
        let h = harness();
        let task = admit(&h, "worker", 2.1).await;

        let pushes = h.broker.calls_for("push");
        assert_eq!(pushes.len(), 1);
        assert_eq!(
            pushes[0],
            json!({"key": "worker", "id": task.id, "priority": 2.1})
        );
        assert_eq!(h.broker.calls()[0].host, PQ_HOST);

        assert_eq!(task.status, TaskStatus::Queued);
        assert_eq!(h.tasks.raw(&task.id).unwrap()["status"], json!("queued"));

        let meta = last_event_meta(&h);
        assert_eq!(meta["_status"], json!("queued"));
        assert_eq!(meta["_id"], json!(task.id));
    }

    #[tokio::test]
    async fn add_task_with_run_at_is_scheduled() {
        let h = harness();
        let mut task = Task::new("worker", Some(json!({})), 0.0, Some(run_at()));
        h.ctrl.add_task(&mut task).await.unwrap();

        let inserts = h.broker.calls_for("insert");
        assert_eq!(inserts.len(), 1);
        assert_eq!(inserts[0]["runAt"], json!("2017-01-01T12:00:00Z"));
        assert_eq!(h.broker.calls()[0].host, TT_HOST);

        assert_eq!(task.status, TaskStatus::Scheduled);
        assert_eq!(
            h.tasks.raw(&task.id).unwrap()["status"],
            json!("scheduled")
        );
    }

    #[tokio::test]
    async fn run_at_wins_over_priority() {
        let h = harness();
        let mut task = Task::new("worker", None, 5.0, Some(run_at()));
        h.ctrl.add_task(&mut task).await.unwrap();

        assert!(h.broker.calls_for("push").is_empty());
        assert_eq!(task.status, TaskStatus::Scheduled);
    }

    #[tokio::test]
    async fn remote_rejection_surfaces_before_any_persist() {
        let h = harness();
        h.broker.script("push", Ok(json!(1)));

        let mut task = Task::new("worker", None, 1.0, None);
        let err = h.ctrl.add_task(&mut task).await.unwrap_err();

        assert!(matches!(err, ControllerError::TaskAddFailed));
        assert!(h.tasks.is_empty());
        assert!(h.broker.calls_for("notify").is_empty());
    }

    #[tokio::test]
    async fn broker_failure_propagates_its_message() {
        let h = harness();
        h.broker
            .script("push", Err(ErrorObject::new(-32100, "Server error")));

        let mut task = Task::new("worker", None, 1.0, None);
        let err = h.ctrl.add_task(&mut task).await.unwrap_err();

        assert_eq!(err.to_string(), "Server error");
        assert!(h.tasks.is_empty());
    }

    #[tokio::test]
    async fn notify_failure_does_not_fail_add_task() {
        let h = harness();
        h.broker.script("notify", Ok(json!(1)));

        let task = admit(&h, "worker", 1.0).await;
        assert_eq!(h.tasks.raw(&task.id).unwrap()["status"], json!("queued"));
    }
}

mod staging {
    use super::*;

    #[tokio::test]
    async fn stage_task_transitions_and_notifies_with_key() {
        let h = harness();
        let mut task = admit(&h, "worker", 1.0).await;
        task.status = TaskStatus::Queued;

        h.ctrl.stage_task(task.clone(), true).await.unwrap();

        assert_eq!(h.tasks.raw(&task.id).unwrap()["status"], json!("pending"));
        let meta = last_event_meta(&h);
        assert_eq!(meta["_status"], json!("pending"));
        assert_eq!(meta["_key"], json!("worker"));
    }

    #[tokio::test]
    async fn stage_task_is_idempotent_per_key() {
        let h = harness();
        let first = admit(&h, "worker", 1.0).await;
        let second = admit(&h, "worker", 2.0).await;

        h.ctrl.stage_task(first.clone(), true).await.unwrap();
        let notified = h.broker.calls_for("notify").len();
        h.ctrl.stage_task(second.clone(), true).await.unwrap();

        // the second offer was dropped entirely: no transition, no event
        assert_eq!(h.broker.calls_for("notify").len(), notified);
        assert_eq!(h.tasks.raw(&second.id).unwrap()["status"], json!("queued"));
    }

    #[tokio::test]
    async fn restore_reloads_resources_and_restages_pending() {
        let h = harness();
        h.ctrl.add_resource("worker").await.unwrap();
        let mut task = admit(&h, "worker", 1.0).await;
        task.change_status(h.tasks.as_ref(), TaskStatus::Pending)
            .await
            .unwrap();

        // a fresh controller over the same collections, as after a restart
        let rebooted = harness_over(&h);
        rebooted.ctrl.restore().await.unwrap();

        assert_eq!(rebooted.ctrl.resources.len(), 1);
        let meta = last_event_meta(&rebooted);
        assert_eq!(meta["_status"], json!("pending"));

        // restaged without re-transitioning, and startable
        assert_eq!(h.tasks.raw(&task.id).unwrap()["status"], json!("pending"));
        rebooted.ctrl.start_task("worker").await.unwrap();
    }

    /// A second harness sharing the first one's collections.
    fn harness_over(h: &Harness) -> Harness {
        use crate::config::ServiceHosts;
        use crate::controller::Controller;
        use crate::testutil::MockBroker;

        let broker = MockBroker::new();
        Harness {
            ctrl: Controller::new(
                ServiceHosts {
                    priority_queue: PQ_HOST.to_string(),
                    timetable: TT_HOST.to_string(),
                    notifier: NOTIFY_HOST.to_string(),
                },
                broker.clone(),
                h.tasks.clone(),
                h.resources.clone(),
                h.stats.clone(),
            ),
            broker,
            tasks: h.tasks.clone(),
            resources: h.resources.clone(),
            stats: h.stats.clone(),
        }
    }
}

mod starting {
    use super::*;

    async fn staged(h: &Harness, key: &str) -> Task {
        h.ctrl.add_resource(key).await.unwrap();
        let task = admit(h, key, 1.0).await;
        h.ctrl.stage_task(task.clone(), true).await.unwrap();
        task
    }

    #[tokio::test]
    async fn start_without_stage_fails() {
        let h = harness();
        h.ctrl.add_resource("worker").await.unwrap();
        let err = h.ctrl.start_task("worker").await.unwrap_err();
        assert!(matches!(err, ControllerError::NoStagedTask));
    }

    #[tokio::test]
    async fn start_locks_resource_and_persists_both() {
        let h = harness();
        let task = staged(&h, "worker").await;

        h.ctrl.start_task("worker").await.unwrap();

        assert_eq!(h.tasks.raw(&task.id).unwrap()["status"], json!("started"));
        assert_eq!(h.resources.raw("worker").unwrap()["status"], json!("locked"));
        assert_eq!(
            h.ctrl.resources.get("worker").unwrap().status,
            ResourceStatus::Locked
        );
        let meta = last_event_meta(&h);
        assert_eq!(meta["_status"], json!("started"));
        assert_eq!(meta["_id"], json!(task.id));
    }

    #[tokio::test]
    async fn start_on_locked_resource_restores_the_slot() {
        let h = harness();
        let first = staged(&h, "worker").await;
        h.ctrl.start_task("worker").await.unwrap();

        // a second task staged while the resource is locked
        let second = admit(&h, "worker", 2.0).await;
        h.ctrl.stage_task(second.clone(), true).await.unwrap();

        let err = h.ctrl.start_task("worker").await.unwrap_err();
        assert!(matches!(err, ControllerError::ResourceUnavailable));

        // after completion the restored slot starts cleanly
        h.ctrl
            .complete_task(&first.id, TaskStatus::Complete)
            .await
            .unwrap();
        h.ctrl.start_task("worker").await.unwrap();
        assert_eq!(h.tasks.raw(&second.id).unwrap()["status"], json!("started"));
    }

    #[tokio::test]
    async fn start_twice_consumes_once() {
        let h = harness();
        staged(&h, "worker").await;

        h.ctrl.start_task("worker").await.unwrap();
        let err = h.ctrl.start_task("worker").await.unwrap_err();
        assert!(matches!(err, ControllerError::NoStagedTask));
    }

    #[tokio::test]
    async fn start_rejects_already_started_task() {
        let h = harness();
        h.ctrl.add_resource("worker").await.unwrap();
        let mut task = admit(&h, "worker", 1.0).await;
        task.status = TaskStatus::Started;

        // re-stage a started task without touching its status
        h.ctrl.stage_task(task, false).await.unwrap();

        let err = h.ctrl.start_task("worker").await.unwrap_err();
        assert!(matches!(err, ControllerError::TaskAlreadyStarted));
    }

    #[tokio::test]
    async fn racing_starters_get_exactly_one_success() {
        let h = harness();
        staged(&h, "worker").await;

        let a = {
            let ctrl = h.ctrl.clone();
            tokio::spawn(async move { ctrl.start_task("worker").await })
        };
        let b = {
            let ctrl = h.ctrl.clone();
            tokio::spawn(async move { ctrl.start_task("worker").await })
        };
        let outcomes = [a.await.unwrap(), b.await.unwrap()];

        let wins = outcomes.iter().filter(|r| r.is_ok()).count();
        assert_eq!(wins, 1);
        for outcome in outcomes {
            if let Err(err) = outcome {
                assert!(matches!(
                    err,
                    ControllerError::NoStagedTask | ControllerError::ResourceUnavailable
                ));
            }
        }
        assert_eq!(
            h.ctrl.resources.get("worker").unwrap().status,
            ResourceStatus::Locked
        );
    }
}

mod completion {
    use super::*;

    async fn started(h: &Harness, key: &str) -> Task {
        h.ctrl.add_resource(key).await.unwrap();
        let task = admit(h, key, 1.0).await;
        h.ctrl.stage_task(task.clone(), true).await.unwrap();
        h.ctrl.start_task(key).await.unwrap();
        task
    }

    #[tokio::test]
    async fn complete_frees_resource_and_marks_terminal() {
        let h = harness();
        let task = started(&h, "worker").await;

        h.ctrl
            .complete_task(&task.id, TaskStatus::Complete)
            .await
            .unwrap();

        assert_eq!(h.tasks.raw(&task.id).unwrap()["status"], json!("complete"));
        assert_eq!(h.resources.raw("worker").unwrap()["status"], json!("free"));
        assert_eq!(
            h.ctrl.resources.get("worker").unwrap().status,
            ResourceStatus::Free
        );
        assert_eq!(last_event_meta(&h)["_status"], json!("complete"));
    }

    #[tokio::test]
    async fn complete_twice_fails_with_not_started() {
        let h = harness();
        let task = started(&h, "worker").await;

        h.ctrl
            .complete_task(&task.id, TaskStatus::Complete)
            .await
            .unwrap();
        let err = h
            .ctrl
            .complete_task(&task.id, TaskStatus::Complete)
            .await
            .unwrap_err();
        assert!(matches!(err, ControllerError::TaskNotStarted));
    }

    #[tokio::test]
    async fn complete_unknown_task_fails() {
        let h = harness();
        let err = h
            .ctrl
            .complete_task("missing", TaskStatus::Complete)
            .await
            .unwrap_err();
        assert!(matches!(err, ControllerError::TaskNotFound));
    }

    #[tokio::test]
    async fn cancelled_and_error_are_valid_terminals() {
        let h = harness();
        let task = started(&h, "worker").await;
        h.ctrl
            .complete_task(&task.id, TaskStatus::Error)
            .await
            .unwrap();
        assert_eq!(h.tasks.raw(&task.id).unwrap()["status"], json!("error"));
        assert_eq!(h.resources.raw("worker").unwrap()["status"], json!("free"));
    }
}

mod removal {
    use super::*;

    #[tokio::test]
    async fn remove_queued_dequeues_and_deletes() {
        let h = harness();
        let task = admit(&h, "worker", 1.0).await;

        h.ctrl.remove_task(&task.id).await.unwrap();

        let removes = h.broker.calls_for("remove");
        assert_eq!(removes, vec![json!({"key": "worker", "id": task.id})]);
        assert!(h.tasks.is_empty());
        assert_eq!(last_event_meta(&h)["_status"], json!("cancelled"));

        let err = h.ctrl.remove_task(&task.id).await.unwrap_err();
        assert!(matches!(err, ControllerError::TaskNotFound));
    }

    #[tokio::test]
    async fn remove_scheduled_goes_to_the_timetable() {
        let h = harness();
        let mut task = Task::new("worker", None, 0.0, Some(super::run_at()));
        h.ctrl.add_task(&mut task).await.unwrap();

        h.ctrl.remove_task(&task.id).await.unwrap();

        let remove_hosts: Vec<String> = h
            .broker
            .calls()
            .into_iter()
            .filter(|c| c.method == "remove")
            .map(|c| c.host)
            .collect();
        assert_eq!(remove_hosts, vec![TT_HOST.to_string()]);
    }

    #[tokio::test]
    async fn remove_pending_needs_no_external_call() {
        let h = harness();
        let mut task = admit(&h, "worker", 1.0).await;
        task.change_status(h.tasks.as_ref(), TaskStatus::Pending)
            .await
            .unwrap();

        h.ctrl.remove_task(&task.id).await.unwrap();

        assert!(h.broker.calls_for("remove").is_empty());
        assert!(h.tasks.is_empty());
    }

    #[tokio::test]
    async fn remove_started_task_fails() {
        let h = harness();
        h.ctrl.add_resource("worker").await.unwrap();
        let task = admit(&h, "worker", 1.0).await;
        h.ctrl.stage_task(task.clone(), true).await.unwrap();
        h.ctrl.start_task("worker").await.unwrap();

        let err = h.ctrl.remove_task(&task.id).await.unwrap_err();
        assert!(matches!(err, ControllerError::TaskRemoveFailed));
        assert!(!h.tasks.is_empty());
    }

    #[tokio::test]
    async fn remote_rejection_keeps_the_document() {
        let h = harness();
        let task = admit(&h, "worker", 1.0).await;
        h.broker.script("remove", Ok(json!(1)));

        let err = h.ctrl.remove_task(&task.id).await.unwrap_err();
        assert!(matches!(err, ControllerError::TaskRemoveFailed));
        assert!(!h.tasks.is_empty());
    }
}

mod reads {
    use super::*;

    #[tokio::test]
    async fn get_task_round_trips() {
        let h = harness();
        let task = admit(&h, "worker", 1.0).await;
        let fetched = h.ctrl.get_task(&task.id).await.unwrap();
        assert_eq!(fetched, task);

        let err = h.ctrl.get_task("missing").await.unwrap_err();
        assert!(matches!(err, ControllerError::TaskNotFound));
    }

    #[tokio::test]
    async fn list_priority_queue_proxies_the_payload() {
        let h = harness();
        let payload = json!({"worker": [{"_key": "a", "priority": 1.0}]});
        h.broker.script("get", Ok(payload.clone()));

        let listed = h.ctrl.list_priority_queue("worker").await.unwrap();
        assert_eq!(listed, payload);
    }

    #[tokio::test]
    async fn list_errors_normalize_to_lowercase() {
        let h = harness();
        h.broker
            .script("get", Err(ErrorObject::new(-32000, "Queue Not Found")));
        let err = h.ctrl.list_priority_queue("worker").await.unwrap_err();
        assert_eq!(err.to_string(), "queue not found");

        h.broker
            .script("get", Err(ErrorObject::new(-32000, "Timetable Not Found")));
        let err = h.ctrl.list_timetable("worker").await.unwrap_err();
        assert_eq!(err.to_string(), "timetable not found");
    }
}

mod run_times {
    use super::*;
    use crate::store::Collection;

    fn stat(key: &str, runtime: f64, minute: u32) -> TaskStat {
        TaskStat {
            created: Utc.with_ymd_and_hms(2017, 1, 1, 0, minute, 0).unwrap(),
            key: key.to_string(),
            runtime,
        }
    }

    #[tokio::test]
    async fn no_stats_average_to_zero() {
        let h = harness();
        assert_eq!(h.ctrl.average_run_time("worker").await.unwrap(), 0.0);
    }

    #[tokio::test]
    async fn average_rounds_to_nearest_twentieth() {
        let h = harness();
        h.stats.save(&stat("worker", 1.0, 0)).await.unwrap();
        h.stats.save(&stat("worker", 1.06, 1)).await.unwrap();
        // mean 1.03 → 1.05
        assert_eq!(h.ctrl.average_run_time("worker").await.unwrap(), 1.05);
    }

    #[tokio::test]
    async fn only_the_ten_most_recent_count() {
        let h = harness();
        // two old outliers that must fall outside the window
        h.stats.save(&stat("worker", 100.0, 0)).await.unwrap();
        h.stats.save(&stat("worker", 100.0, 1)).await.unwrap();
        for minute in 2..12 {
            h.stats.save(&stat("worker", 2.0, minute)).await.unwrap();
        }
        assert_eq!(h.ctrl.average_run_time("worker").await.unwrap(), 2.0);
    }

    #[tokio::test]
    async fn other_keys_are_ignored() {
        let h = harness();
        h.stats.save(&stat("worker", 4.0, 0)).await.unwrap();
        h.stats.save(&stat("other", 90.0, 1)).await.unwrap();
        assert_eq!(h.ctrl.average_run_time("worker").await.unwrap(), 4.0);
    }

    #[tokio::test]
    async fn record_run_time_appends() {
        let h = harness();
        h.ctrl.record_run_time("worker", 3.0).await.unwrap();
        h.ctrl.record_run_time("worker", 5.0).await.unwrap();
        assert_eq!(h.ctrl.average_run_time("worker").await.unwrap(), 4.0);
    }
}

mod stage_loop {
    use super::*;

    #[tokio::test]
    async fn tick_stages_from_the_priority_queue() {
        let h = harness();
        h.ctrl.add_resource("worker").await.unwrap();
        let task = admit(&h, "worker", 2.1).await;

        h.broker.script("next", Ok(Value::Null));
        h.broker.script(
            "pop",
            Ok(json!({"_key": task.id, "key": "worker", "priority": 2.1})),
        );

        h.ctrl.stage_tick().await;

        assert_eq!(h.tasks.raw(&task.id).unwrap()["status"], json!("pending"));
        h.ctrl.start_task("worker").await.unwrap();
    }

    #[tokio::test]
    async fn timetable_wins_over_the_queue() {
        let h = harness();
        h.ctrl.add_resource("worker").await.unwrap();
        let mut task = Task::new("worker", None, 0.0, Some(super::run_at()));
        h.ctrl.add_task(&mut task).await.unwrap();

        h.broker.script(
            "next",
            Ok(json!({"_key": task.id, "key": "worker", "runAt": "2017-01-01T12:00:00Z"})),
        );

        h.ctrl.stage_tick().await;

        assert!(h.broker.calls_for("pop").is_empty());
        assert_eq!(h.tasks.raw(&task.id).unwrap()["status"], json!("pending"));
    }

    #[tokio::test]
    async fn occupied_slots_are_not_polled() {
        let h = harness();
        h.ctrl.add_resource("worker").await.unwrap();
        let task = admit(&h, "worker", 1.0).await;
        h.ctrl.stage_task(task, true).await.unwrap();

        h.ctrl.stage_tick().await;

        assert!(h.broker.calls_for("next").is_empty());
        assert!(h.broker.calls_for("pop").is_empty());
    }

    #[tokio::test]
    async fn unknown_popped_id_is_skipped() {
        let h = harness();
        h.ctrl.add_resource("worker").await.unwrap();
        h.broker.script("next", Ok(Value::Null));
        h.broker
            .script("pop", Ok(json!({"_key": "vanished", "key": "worker"})));

        h.ctrl.stage_tick().await;

        let err = h.ctrl.start_task("worker").await.unwrap_err();
        assert!(matches!(err, ControllerError::NoStagedTask));
    }

    #[tokio::test]
    async fn broker_failure_aborts_only_that_key() {
        let h = harness();
        h.ctrl.add_resource("broken").await.unwrap();
        h.ctrl.add_resource("worker").await.unwrap();
        let task = admit(&h, "worker", 1.0).await;

        // both keys are polled each tick; order over the map is not fixed
        for _ in 0..2 {
            h.broker
                .script("next", Err(ErrorObject::new(-32100, "Server error")));
        }
        h.broker.script(
            "pop",
            Ok(json!({"_key": task.id, "key": "worker"})),
        );

        h.ctrl.stage_tick().await;
        h.ctrl.stage_tick().await;

        assert_eq!(h.tasks.raw(&task.id).unwrap()["status"], json!("pending"));
    }
}
