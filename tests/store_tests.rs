//! Integration tests for InMemoryTaskStateStore.
//!
//! Tests cover creation and retrieval, partial updates, filtered queries,
//! pagination, ownership re-attribution, versioning, and concurrent claims.
//! Organized into module blocks per concern.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use engine_tasks::store::memory::InMemoryTaskStateStore;
use engine_tasks::store::{StoreConfig, TaskQuery, TaskStateStorage};
use engine_tasks::{
    Configuration, EngineId, TaskError, TaskErrorKind, TaskId, TaskSchedule, TaskState,
    TaskStatus,
};
use serde_json::json;

fn config() -> Configuration {
    let mut config = Configuration::new();
    config.insert("keyspace".to_string(), json!("grakn"));
    config.insert("batch".to_string(), json!({ "size": 50, "tags": ["a", "b"] }));
    config
}

fn state(task_class: &str, creator: &str) -> TaskState {
    TaskState::new(task_class, creator, TaskSchedule::now(), config())
}

fn scheduled(task_class: &str) -> TaskState {
    state(task_class, "scheduler").with_status(TaskStatus::Scheduled)
}

// ─── Create / Get Tests ─────────────────────────────────────────────────────

mod create_get_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_round_trip_reproduces_every_field() {
        let store = InMemoryTaskStateStore::new();
        let schedule =
            TaskSchedule::recurring(Utc.timestamp_opt(1_700_000_000, 0).unwrap(), Duration::from_secs(90));
        let original = TaskState::new("analytics", "alice", schedule, config())
            .with_running(EngineId::from("engine-1"))
            .with_checkpoint("vertex-42")
            .with_status_changed_by("scheduler");

        let id = store.new_state(original.clone()).await.unwrap();
        let fetched = store.get_state(&id).await.unwrap();

        let mut expected = original;
        expected.id = Some(id);
        assert_eq!(fetched, expected);
    }

    #[tokio::test]
    async fn test_configuration_floats_round_trip_exactly() {
        let store = InMemoryTaskStateStore::new();
        let floats = [
            1.0715660391465826e-75,
            0.1,
            1.0 / 3.0,
            f64::MAX,
            f64::MIN_POSITIVE,
            5e-324,
            -2.2250738585072014e-308,
            123_456_789.123_456_78,
        ];
        let mut configuration = Configuration::new();
        configuration.insert("weights".to_string(), json!(floats));
        configuration.insert("nested".to_string(), json!({ "alpha": { "beta": [0.3, 1e300] } }));

        let original = TaskState::new("analytics", "alice", TaskSchedule::now(), configuration);
        let id = store.new_state(original.clone()).await.unwrap();
        let fetched = store.get_state(&id).await.unwrap();

        assert_eq!(fetched.configuration, original.configuration);
        let weights: Vec<f64> = fetched.configuration["weights"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_f64().unwrap())
            .collect();
        assert_eq!(
            weights.iter().map(|f| f.to_bits()).collect::<Vec<_>>(),
            floats.iter().map(|f| f.to_bits()).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn test_ids_are_unique_uuid_v4() {
        let store = InMemoryTaskStateStore::new();
        let a = store.new_state(state("c", "x")).await.unwrap();
        let b = store.new_state(state("c", "x")).await.unwrap();
        assert_ne!(a, b);
        let parsed = uuid::Uuid::parse_str(a.as_str()).unwrap();
        assert_eq!(parsed.get_version_num(), 4);
    }

    #[tokio::test]
    async fn test_configuration_key_order_is_irrelevant() {
        let store = InMemoryTaskStateStore::new();
        let id = store.new_state(state("c", "x")).await.unwrap();

        let mut reordered = Configuration::new();
        reordered.insert("batch".to_string(), json!({ "tags": ["a", "b"], "size": 50 }));
        reordered.insert("keyspace".to_string(), json!("grakn"));
        assert_eq!(store.get_state(&id).await.unwrap().configuration, reordered);
    }

    #[tokio::test]
    async fn test_malformed_schedule_is_rejected() {
        let store = InMemoryTaskStateStore::new();
        let mut bad = state("c", "x");
        bad.schedule.recurring = true;

        let err = store.new_state(bad).await.unwrap_err();
        assert_eq!(err.kind(), TaskErrorKind::Validation);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_empty_class_or_creator_is_rejected() {
        let store = InMemoryTaskStateStore::new();
        assert!(matches!(
            store.new_state(state("", "x")).await,
            Err(TaskError::Validation { .. })
        ));
        assert!(matches!(
            store.new_state(state("c", "")).await,
            Err(TaskError::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn test_get_unknown_id_is_not_found() {
        let store = InMemoryTaskStateStore::new();
        let err = store.get_state(&TaskId::from("never-issued")).await.unwrap_err();
        match err {
            TaskError::NotFound { task_id } => assert_eq!(task_id, "never-issued"),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }
}

// ─── Update Tests ───────────────────────────────────────────────────────────

mod update_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_partial_update_leaves_definition_alone() {
        let store = InMemoryTaskStateStore::new();
        let id = store.new_state(state("consolidate", "bob")).await.unwrap();
        let before = store.get_state(&id).await.unwrap();

        let running = before
            .clone()
            .with_running(EngineId::from("e1"))
            .with_checkpoint("step-1");
        store.update_state(running).await.unwrap();
        let failed = store
            .get_state(&id)
            .await
            .unwrap()
            .with_failure("disk full");
        store.update_state(failed).await.unwrap();

        let after = store.get_state(&id).await.unwrap();
        assert_eq!(after.task_class, before.task_class);
        assert_eq!(after.creator, before.creator);
        assert_eq!(after.schedule, before.schedule);
        assert_eq!(after.configuration, before.configuration);
        assert_eq!(after.status, TaskStatus::Failed);
        assert_eq!(after.exception.as_deref(), Some("disk full"));
        assert_eq!(after.checkpoint.as_deref(), Some("step-1"));
        assert_eq!(after.engine_id, None);
    }

    #[tokio::test]
    async fn test_update_unknown_id_is_not_found_and_creates_nothing() {
        let store = InMemoryTaskStateStore::new();
        let mut ghost = state("c", "x");
        ghost.id = Some(TaskId::from("ghost"));

        let err = store.update_state(ghost).await.unwrap_err();
        assert_eq!(err.kind(), TaskErrorKind::NotFound);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_update_without_id_is_validation_error() {
        let store = InMemoryTaskStateStore::new();
        let err = store.update_state(state("c", "x")).await.unwrap_err();
        assert_eq!(err.kind(), TaskErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_immutable_fields_cannot_change() {
        let store = InMemoryTaskStateStore::new();
        let id = store.new_state(state("c", "x")).await.unwrap();

        let mut renamed = store.get_state(&id).await.unwrap();
        renamed.task_class = "other".to_string();
        assert!(matches!(
            store.update_state(renamed).await,
            Err(TaskError::Validation { .. })
        ));

        let mut reconfigured = store.get_state(&id).await.unwrap();
        reconfigured
            .configuration
            .insert("extra".to_string(), json!(true));
        assert!(matches!(
            store.update_state(reconfigured).await,
            Err(TaskError::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn test_invariant_violations_are_rejected_on_update() {
        let store = InMemoryTaskStateStore::new();
        let id = store.new_state(state("c", "x")).await.unwrap();

        let mut owned_while_created = store.get_state(&id).await.unwrap();
        owned_while_created.engine_id = Some(EngineId::from("e1"));
        assert!(matches!(
            store.update_state(owned_while_created).await,
            Err(TaskError::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn test_last_writer_wins_by_default() {
        let store = InMemoryTaskStateStore::new();
        let id = store.new_state(state("c", "x")).await.unwrap();
        let stale = store.get_state(&id).await.unwrap();

        store
            .update_state(stale.clone().with_checkpoint("fresh"))
            .await
            .unwrap();
        store
            .update_state(stale.with_status(TaskStatus::Scheduled))
            .await
            .unwrap();

        let stored = store.get_state(&id).await.unwrap();
        assert_eq!(stored.status, TaskStatus::Scheduled);
        assert_eq!(stored.checkpoint, None);
    }

    #[tokio::test]
    async fn test_versioned_store_rejects_stale_update() {
        let store = InMemoryTaskStateStore::new().with_config(StoreConfig {
            optimistic_versioning: true,
            ..StoreConfig::default()
        });
        let id = store.new_state(state("c", "x")).await.unwrap();
        let stale = store.get_state(&id).await.unwrap();

        store
            .update_state(stale.clone().with_checkpoint("fresh"))
            .await
            .unwrap();
        let err = store
            .update_state(stale.with_status(TaskStatus::Scheduled))
            .await
            .unwrap_err();

        match err {
            TaskError::Conflict {
                expected_version,
                actual_version,
                ..
            } => {
                assert_eq!(expected_version, 1);
                assert_eq!(actual_version, 2);
            },
            other => panic!("expected Conflict, got {other:?}"),
        }
        assert_eq!(
            store.get_state(&id).await.unwrap().checkpoint.as_deref(),
            Some("fresh")
        );
    }

    #[tokio::test]
    async fn test_update_if_current_returns_new_version() {
        let store = InMemoryTaskStateStore::new();
        let id = store.new_state(state("c", "x")).await.unwrap();
        let current = store.get_state(&id).await.unwrap();

        let updated = store
            .update_state_if_current(current.with_status(TaskStatus::Scheduled))
            .await
            .unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(store.get_state(&id).await.unwrap().version, 2);
    }
}

// ─── Query Tests ────────────────────────────────────────────────────────────

mod query_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    async fn seeded() -> InMemoryTaskStateStore {
        let store = InMemoryTaskStateStore::new();
        for (class, creator, status) in [
            ("pp", "alice", TaskStatus::Created),
            ("pp", "bob", TaskStatus::Scheduled),
            ("analytics", "alice", TaskStatus::Scheduled),
            ("analytics", "bob", TaskStatus::Completed),
            ("pp", "alice", TaskStatus::Scheduled),
        ] {
            store
                .new_state(state(class, creator).with_status(status))
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_status_filter_is_exact() {
        let store = seeded().await;
        let hits = store
            .get_tasks(&TaskQuery::new().status(TaskStatus::Scheduled))
            .await
            .unwrap();
        assert_eq!(hits.len(), 3);
        assert!(hits.iter().all(|s| s.status == TaskStatus::Scheduled));
    }

    #[tokio::test]
    async fn test_conjunctive_filters() {
        let store = seeded().await;
        let hits = store
            .get_tasks(
                &TaskQuery::new()
                    .status(TaskStatus::Scheduled)
                    .task_class("pp")
                    .creator("alice"),
            )
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].creator, "alice");
        assert_eq!(hits[0].task_class, "pp");
    }

    #[tokio::test]
    async fn test_no_match_is_empty_not_error() {
        let store = seeded().await;
        let hits = store
            .get_tasks(&TaskQuery::new().creator("carol"))
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_status_change_moves_task_between_filters() {
        let store = seeded().await;
        let created = store
            .get_tasks(&TaskQuery::new().status(TaskStatus::Created))
            .await
            .unwrap();
        let task = created.into_iter().next().unwrap();
        store
            .update_state(task.with_status(TaskStatus::Scheduled))
            .await
            .unwrap();

        assert!(store
            .get_tasks(&TaskQuery::new().status(TaskStatus::Created))
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            store
                .get_tasks(&TaskQuery::new().status(TaskStatus::Scheduled))
                .await
                .unwrap()
                .len(),
            4
        );
    }

    #[tokio::test]
    async fn test_ownership_reattribution() {
        let store = InMemoryTaskStateStore::new();
        let id = store.new_state(state("c", "x")).await.unwrap();
        let (e1, e2) = (EngineId::from("engine-1"), EngineId::from("engine-2"));

        let s = store.get_state(&id).await.unwrap();
        store.update_state(s.with_running(e1.clone())).await.unwrap();
        let s = store.get_state(&id).await.unwrap();
        store.update_state(s.with_running(e2.clone())).await.unwrap();

        let by_e1 = store
            .get_tasks(&TaskQuery::new().engine_id(e1))
            .await
            .unwrap();
        let by_e2 = store
            .get_tasks(&TaskQuery::new().engine_id(e2))
            .await
            .unwrap();
        assert!(by_e1.is_empty());
        assert_eq!(by_e2.len(), 1);
        assert_eq!(by_e2[0].id.as_ref(), Some(&id));
    }

    #[tokio::test]
    async fn test_results_follow_creation_order() {
        let store = InMemoryTaskStateStore::new();
        let mut ids = Vec::new();
        for i in 0..5 {
            ids.push(store.new_state(state("c", &format!("u{i}"))).await.unwrap());
        }
        let listed: Vec<TaskId> = store
            .get_tasks(&TaskQuery::new())
            .await
            .unwrap()
            .into_iter()
            .filter_map(|s| s.id)
            .collect();
        assert_eq!(listed, ids);
    }
}

// ─── Pagination Tests ───────────────────────────────────────────────────────

mod pagination_tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;

    async fn store_with(n: usize) -> InMemoryTaskStateStore {
        let store = InMemoryTaskStateStore::new();
        for i in 0..n {
            store
                .new_state(state("c", &format!("creator-{i}")))
                .await
                .unwrap();
        }
        store
    }

    fn ids(states: &[TaskState]) -> HashSet<TaskId> {
        states.iter().filter_map(|s| s.id.clone()).collect()
    }

    #[tokio::test]
    async fn test_disjoint_windows() {
        let store = store_with(12).await;
        let first = store
            .get_tasks(&TaskQuery::new().limit(5).offset(0))
            .await
            .unwrap();
        let second = store
            .get_tasks(&TaskQuery::new().limit(5).offset(5))
            .await
            .unwrap();

        assert_eq!(first.len(), 5);
        assert_eq!(second.len(), 5);
        assert!(ids(&first).is_disjoint(&ids(&second)));
    }

    #[tokio::test]
    async fn test_windows_union_to_full_set_in_order() {
        let store = store_with(11).await;
        let all = store.get_tasks(&TaskQuery::new()).await.unwrap();

        let mut paged = Vec::new();
        let mut offset = 0;
        loop {
            let page = store
                .get_tasks(&TaskQuery::new().limit(4).offset(offset))
                .await
                .unwrap();
            if page.is_empty() {
                break;
            }
            offset += page.len();
            paged.extend(page);
        }
        assert_eq!(paged, all);
    }

    #[tokio::test]
    async fn test_zero_limit_is_unbounded() {
        let store = store_with(15).await;
        assert_eq!(store.get_tasks(&TaskQuery::new()).await.unwrap().len(), 15);
    }

    #[tokio::test]
    async fn test_offset_past_end_is_empty() {
        let store = store_with(3).await;
        let page = store
            .get_tasks(&TaskQuery::new().limit(5).offset(10))
            .await
            .unwrap();
        assert!(page.is_empty());
    }

    #[tokio::test]
    async fn test_clamp_caps_unbounded_queries() {
        let store = InMemoryTaskStateStore::new().with_config(StoreConfig {
            clamp_unbounded: true,
            max_page_size: 4,
            ..StoreConfig::default()
        });
        for i in 0..6 {
            store
                .new_state(state("c", &format!("u{i}")))
                .await
                .unwrap();
        }
        assert_eq!(store.get_tasks(&TaskQuery::new()).await.unwrap().len(), 4);
        assert_eq!(
            store
                .get_tasks(&TaskQuery::new().limit(100))
                .await
                .unwrap()
                .len(),
            4
        );
    }
}

// ─── Claim Tests ────────────────────────────────────────────────────────────

mod claim_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_claim_sets_running_and_owner() {
        let store = InMemoryTaskStateStore::new();
        let id = store.new_state(scheduled("c")).await.unwrap();
        let engine = EngineId::from("engine-1");

        let claimed = store.claim(&id, &engine, "engine-1").await.unwrap();
        assert_eq!(claimed.status, TaskStatus::Running);
        assert_eq!(claimed.engine_id, Some(engine.clone()));
        assert_eq!(claimed.status_changed_by.as_deref(), Some("engine-1"));
        assert_eq!(store.get_state(&id).await.unwrap(), claimed);
    }

    #[tokio::test]
    async fn test_claim_of_running_task_is_invalid_transition() {
        let store = InMemoryTaskStateStore::new();
        let id = store.new_state(scheduled("c")).await.unwrap();
        store
            .claim(&id, &EngineId::from("engine-1"), "engine-1")
            .await
            .unwrap();

        let err = store
            .claim(&id, &EngineId::from("engine-2"), "engine-2")
            .await
            .unwrap_err();
        match err {
            TaskError::InvalidTransition { from, to, .. } => {
                assert_eq!(from, TaskStatus::Running);
                assert_eq!(to, TaskStatus::Running);
            },
            other => panic!("expected InvalidTransition, got {other:?}"),
        }
        assert_eq!(
            store.get_state(&id).await.unwrap().engine_id,
            Some(EngineId::from("engine-1"))
        );
    }

    #[tokio::test]
    async fn test_claim_of_created_task_is_rejected() {
        let store = InMemoryTaskStateStore::new();
        let id = store.new_state(state("c", "x")).await.unwrap();
        let err = store
            .claim(&id, &EngineId::from("e"), "e")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), TaskErrorKind::InvalidTransition);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_claims_have_one_winner() {
        let store = Arc::new(InMemoryTaskStateStore::new());
        let id = store.new_state(scheduled("c")).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..16 {
            let store = Arc::clone(&store);
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                let engine = EngineId::from(format!("engine-{i}"));
                store.claim(&id, &engine, engine.as_str()).await
            }));
        }

        let mut winners = Vec::new();
        for handle in handles {
            match handle.await.unwrap() {
                Ok(state) => winners.push(state),
                Err(err) => assert!(
                    matches!(
                        err.kind(),
                        TaskErrorKind::Conflict | TaskErrorKind::InvalidTransition
                    ),
                    "unexpected claim error: {err:?}"
                ),
            }
        }
        assert_eq!(winners.len(), 1);
        assert_eq!(store.get_state(&id).await.unwrap().engine_id, winners[0].engine_id);
    }

    #[tokio::test]
    async fn test_concurrent_creates_get_distinct_ids() {
        let store = InMemoryTaskStateStore::new();
        let created = futures::future::join_all(
            (0..32).map(|i| store.new_state(state("c", &format!("user-{i}")))),
        )
        .await;

        let ids: std::collections::HashSet<TaskId> =
            created.into_iter().map(Result::unwrap).collect();
        assert_eq!(ids.len(), 32);
        assert_eq!(store.len(), 32);
        assert_eq!(store.get_tasks(&TaskQuery::new()).await.unwrap().len(), 32);
    }
}
