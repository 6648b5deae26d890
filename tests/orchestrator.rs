// ABOUTME: Integration tests for event intake, dispatch, cancellation, and rollback.
// ABOUTME: Uses an in-memory store and a scripted runner; no processes are spawned.

mod support;

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use support::{FakeRunner, Script, app, harness, harness_with, push_trigger, release_trigger};
use wharf::approval::{Actor, TokenDigester};
use wharf::config::{EventKind, StrategyKind};
use wharf::deploy::{
    DeployErrorKind, DeploymentAction, DeploymentRecord, DeploymentSource, DeploymentStatus,
    DispatcherConfig, ManualDeployment, Orchestrator, RollbackTarget, TIMEOUT_EXIT_CODE,
    TriggerOutcome,
};
use wharf::hooks::{Observers, TransitionObserver};
use wharf::registry::{AppRegistry, SourceEvent};
use wharf::store::{DeploymentFilter, DeploymentStore, MemoryStore, ReleaseStore};
use wharf::strategy::{NewRelease, StrategyRegistry};
use wharf::types::{AppKey, DeploymentId, ReleaseName};

fn shop() -> wharf::config::AppConfig {
    app(
        "shop",
        StrategyKind::Simple,
        std::path::Path::new("/srv/shop"),
        vec![
            push_trigger("staging", "main"),
            push_trigger("preview", "main"),
            release_trigger("production", r"^v\d+\.\d+\.\d+$", Some(Duration::from_secs(7200))),
        ],
    )
}

fn push(delivery: &str) -> SourceEvent {
    SourceEvent::new(EventKind::Push, "refs/heads/main", "abc1234def", "dana")
        .repository("git@github.com:acme/shop.git")
        .delivery(delivery)
}

fn created(outcomes: Vec<TriggerOutcome>) -> Vec<DeploymentRecord> {
    outcomes
        .into_iter()
        .filter_map(|o| match o {
            TriggerOutcome::Created(c) => Some(c.record),
            _ => None,
        })
        .collect()
}

async fn wait_for_status(store: &MemoryStore, record: &DeploymentRecord, status: DeploymentStatus) {
    for _ in 0..200 {
        let current = store.get(record.id).await.unwrap().unwrap();
        if current.status == status {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("deployment {} never reached {status}", record.id);
}

mod intake {
    use super::*;

    /// Test: A push selects every matching trigger and queues a record for each.
    #[tokio::test]
    async fn push_creates_one_queued_record_per_trigger() {
        let h = harness(vec![shop()]);

        let records = created(h.orchestrator.handle_event(push("d-1")).await.unwrap());

        assert_eq!(records.len(), 2);
        let triggers: Vec<_> = records.iter().map(|r| r.trigger_name.as_str()).collect();
        assert_eq!(triggers, vec!["staging", "preview"]);
        for record in &records {
            assert_eq!(record.status, DeploymentStatus::Queued);
            assert_eq!(record.repository.as_deref(), Some("acme/shop"));
            assert_eq!(record.source, DeploymentSource::Webhook);
            assert!(record.execution.queued_at.is_some());
        }
    }

    /// Test: Replaying a delivery id never creates a second record.
    #[tokio::test]
    async fn repeated_delivery_returns_existing_records() {
        let h = harness(vec![shop()]);
        let first = created(h.orchestrator.handle_event(push("d-1")).await.unwrap());

        let replay = h.orchestrator.handle_event(push("d-1")).await.unwrap();

        assert_eq!(replay.len(), 2);
        for outcome in &replay {
            match outcome {
                TriggerOutcome::Duplicate(record) => {
                    assert!(first.iter().any(|r| r.id == record.id));
                }
                other => panic!("expected duplicate, got {other:?}"),
            }
        }
        let all = h
            .orchestrator
            .list(&DeploymentFilter::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
    }

    /// Test: Concurrent deliveries of one event still yield one record per trigger.
    #[tokio::test]
    async fn concurrent_replays_create_records_once() {
        let h = harness(vec![shop()]);

        let results =
            futures::future::join_all((0..8).map(|_| h.orchestrator.handle_event(push("d-1"))))
                .await;

        for result in results {
            assert!(result.is_ok());
        }
        let all = h
            .orchestrator
            .list(&DeploymentFilter::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
    }

    /// Test: Events from another repository select nothing.
    #[tokio::test]
    async fn foreign_repository_matches_nothing() {
        let h = harness(vec![shop()]);
        let event = SourceEvent::new(EventKind::Push, "main", "abc1234", "dana")
            .repository("https://github.com/acme/shop-fork");

        let outcomes = h.orchestrator.handle_event(event).await.unwrap();

        assert!(outcomes.is_empty());
    }

    /// Test: A repository that normalizes to nothing selects no app.
    #[tokio::test]
    async fn blank_repository_matches_nothing() {
        let h = harness(vec![shop()]);
        for repo in [".git", "/", "   "] {
            let event = SourceEvent::new(EventKind::Push, "main", "abc1234", "dana").repository(repo);

            let outcomes = h.orchestrator.handle_event(event).await.unwrap();

            assert!(outcomes.is_empty(), "{repo:?} should match nothing");
        }
    }

    /// Test: An active record for one app leaves the same trigger of another app free.
    #[tokio::test]
    async fn same_trigger_of_another_app_is_independent() {
        let api = app(
            "api",
            StrategyKind::Simple,
            std::path::Path::new("/srv/api"),
            vec![push_trigger("staging", "main")],
        );
        let h = harness(vec![shop(), api]);
        let actor = Actor::principal("ops");
        let manual = || ManualDeployment {
            git_ref: "main".into(),
            ..ManualDeployment::default()
        };
        let shop_staging = h
            .orchestrator
            .create_deployment("shop", "staging", manual(), &actor)
            .await
            .unwrap();

        let api_staging = h
            .orchestrator
            .create_deployment("api", "staging", manual(), &actor)
            .await
            .unwrap();
        let again = h
            .orchestrator
            .create_deployment("shop", "staging", manual(), &actor)
            .await
            .unwrap_err();

        assert_eq!(api_staging.record.status, DeploymentStatus::Queued);
        assert_eq!(again.conflicting_deployment(), Some(shop_staging.record.id));
        let done = h.orchestrator.dispatch(api_staging.record.id).await.unwrap();
        assert_eq!(done.status, DeploymentStatus::Success);
        let untouched = h.store.get(shop_staging.record.id).await.unwrap().unwrap();
        assert_eq!(untouched.status, DeploymentStatus::Queued);
    }

    /// Test: Two processes sharing a state file and lock directory create one record per pair.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn pair_is_exclusive_across_store_handles() {
        support::init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("state.json");
        let locks = dir.path().join("locks");
        let orchestrators: Vec<Arc<Orchestrator>> = (0..2)
            .map(|_| {
                let store = Arc::new(MemoryStore::open(&state).unwrap());
                let strategies = StrategyRegistry::standard(FakeRunner::new(), store.clone());
                let orchestrator = Orchestrator::builder(
                    Arc::new(AppRegistry::new(vec![shop()])),
                    store.clone(),
                    store,
                    strategies,
                )
                .lock_dir(&locks)
                .build();
                Arc::new(orchestrator)
            })
            .collect();

        let handles: Vec<_> = orchestrators
            .iter()
            .cycle()
            .take(6)
            .cloned()
            .map(|orchestrator| {
                tokio::spawn(async move {
                    let manual = ManualDeployment {
                        git_ref: "main".into(),
                        ..ManualDeployment::default()
                    };
                    orchestrator
                        .create_deployment("shop", "staging", manual, &Actor::principal("ops"))
                        .await
                })
            })
            .collect();
        let mut created = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => created += 1,
                Err(e) => assert_eq!(e.kind(), DeployErrorKind::Conflict),
            }
        }

        assert_eq!(created, 1);
        let reopened = MemoryStore::open(&state).unwrap();
        let all = reopened.list(&DeploymentFilter::default()).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(std::fs::read_dir(&locks).unwrap().count(), 0);
    }

    /// Test: A second event while the pair is active is refused with the active id.
    #[tokio::test]
    async fn active_pair_refuses_new_record() {
        let h = harness(vec![shop()]);
        let first = created(h.orchestrator.handle_event(push("d-1")).await.unwrap());

        let outcomes = h.orchestrator.handle_event(push("d-2")).await.unwrap();

        assert_eq!(outcomes.len(), 2);
        for outcome in outcomes {
            match outcome {
                TriggerOutcome::Refused { trigger, error, .. } => {
                    assert_eq!(error.kind(), DeployErrorKind::Conflict);
                    let holder = first.iter().find(|r| r.trigger_name == trigger).unwrap();
                    assert_eq!(error.conflicting_deployment(), Some(holder.id));
                }
                other => panic!("expected refusal, got {other:?}"),
            }
        }
    }

    /// Test: Once the active record finishes the pair accepts new work.
    #[tokio::test]
    async fn finished_pair_accepts_new_record() {
        let h = harness(vec![shop()]);
        for record in created(h.orchestrator.handle_event(push("d-1")).await.unwrap()) {
            h.orchestrator.dispatch(record.id).await.unwrap();
        }

        let second = created(h.orchestrator.handle_event(push("d-2")).await.unwrap());

        assert_eq!(second.len(), 2);
    }

    /// Test: Operator deploys record the actor and follow the trigger's approval policy.
    #[tokio::test]
    async fn manual_deployment_uses_trigger_policy() {
        let h = harness(vec![shop()]);
        let actor = Actor::principal("ops");

        let staged = h
            .orchestrator
            .create_deployment(
                "shop",
                "staging",
                ManualDeployment {
                    git_ref: "main".into(),
                    ..ManualDeployment::default()
                },
                &actor,
            )
            .await
            .unwrap();
        let production = h
            .orchestrator
            .create_deployment(
                "shop",
                "production",
                ManualDeployment {
                    git_ref: "v1.0.0".into(),
                    commit_sha: Some("feedbee".into()),
                    commit_message: None,
                },
                &actor,
            )
            .await
            .unwrap();

        assert_eq!(staged.record.status, DeploymentStatus::Queued);
        assert!(staged.approval.is_none());
        assert_eq!(staged.record.author, "ops");
        assert_eq!(staged.record.source, DeploymentSource::Operator);
        assert_eq!(production.record.status, DeploymentStatus::PendingApproval);
        assert!(production.approval.is_some());
    }

    /// Test: Unknown apps and triggers are configuration errors.
    #[tokio::test]
    async fn unknown_app_or_trigger_is_rejected() {
        let h = harness(vec![shop()]);
        let actor = Actor::principal("ops");

        let app_err = h
            .orchestrator
            .create_deployment("nope", "staging", ManualDeployment::default(), &actor)
            .await
            .unwrap_err();
        let trigger_err = h
            .orchestrator
            .create_deployment("shop", "nope", ManualDeployment::default(), &actor)
            .await
            .unwrap_err();

        assert_eq!(app_err.kind(), DeployErrorKind::Configuration);
        assert_eq!(trigger_err.kind(), DeployErrorKind::Configuration);
    }

    /// Test: Status never exposes the token digest.
    #[tokio::test]
    async fn status_redacts_token_digest() {
        let h = harness(vec![shop()]);
        let event = SourceEvent::new(EventKind::Release, "v1.2.3", "abc1234", "dana");
        let record = created(h.orchestrator.handle_event(event).await.unwrap())
            .pop()
            .unwrap();

        let stored = h.store.get(record.id).await.unwrap().unwrap();
        let shown = h.orchestrator.status(record.id).await.unwrap();

        assert!(stored.approval.token_hash.is_some());
        assert!(shown.approval.token_hash.is_none());
        assert!(record.approval.token_hash.is_none());
    }
}

mod dispatch {
    use super::*;

    /// Test: A successful story moves the record through running to success.
    #[tokio::test]
    async fn successful_story_completes_record() {
        let h = harness(vec![shop()]);
        h.runner.script("deploy", Script::stdout("deployed main\n"));
        let record = created(h.orchestrator.handle_event(push("d-1")).await.unwrap())
            .remove(0);

        let done = h.orchestrator.dispatch(record.id).await.unwrap();

        assert_eq!(done.status, DeploymentStatus::Success);
        assert_eq!(done.execution.exit_code, Some(0));
        assert_eq!(done.execution.output.as_deref(), Some("deployed main\n"));
        assert!(done.execution.started_at.is_some());
        assert!(done.execution.completed_at.is_some());
        assert!(done.execution.duration_ms.is_some());
        assert!(done.execution.worker.is_some());

        let call = &h.runner.calls()[0];
        assert_eq!(call.story, "deploy");
        assert_eq!(call.params.get("ref").map(String::as_str), Some("refs/heads/main"));
        assert_eq!(call.params.get("app").map(String::as_str), Some("shop"));
        assert_eq!(
            call.working_dir.as_deref(),
            Some(std::path::Path::new("/srv/shop"))
        );
    }

    /// Test: A non-zero exit fails the record with the real code.
    #[tokio::test]
    async fn failing_story_fails_record() {
        let h = harness(vec![shop()]);
        h.runner.script(
            "deploy",
            Script {
                exit_code: 3,
                stderr: "composer install failed".into(),
                ..Script::default()
            },
        );
        let record = created(h.orchestrator.handle_event(push("d-1")).await.unwrap())
            .remove(0);

        let done = h.orchestrator.dispatch(record.id).await.unwrap();

        assert_eq!(done.status, DeploymentStatus::Failed);
        assert_eq!(done.execution.exit_code, Some(3));
        assert!(
            done.execution
                .output
                .as_deref()
                .unwrap()
                .contains("composer install failed")
        );
    }

    /// Test: A story that cannot be started fails with exit code 1.
    #[tokio::test]
    async fn unstartable_story_fails_with_exit_one() {
        let h = harness(vec![shop()]);
        h.runner.script("deploy", Script::missing());
        let record = created(h.orchestrator.handle_event(push("d-1")).await.unwrap())
            .remove(0);

        let done = h.orchestrator.dispatch(record.id).await.unwrap();

        assert_eq!(done.status, DeploymentStatus::Failed);
        assert_eq!(done.execution.exit_code, Some(1));
        assert!(done.execution.output.as_deref().unwrap().contains("not found"));
    }

    /// Test: A story exceeding the timeout fails with exit code 124.
    #[tokio::test]
    async fn timeout_fails_with_synthetic_output() {
        let h = harness_with(
            vec![shop()],
            DispatcherConfig {
                timeout: Duration::from_millis(50),
                worker: "test:1".into(),
            },
        );
        h.runner.script("deploy", Script::slow(Duration::from_secs(30)));
        let record = created(h.orchestrator.handle_event(push("d-1")).await.unwrap())
            .remove(0);

        let done = h.orchestrator.dispatch(record.id).await.unwrap();

        assert_eq!(done.status, DeploymentStatus::Failed);
        assert_eq!(done.execution.exit_code, Some(TIMEOUT_EXIT_CODE));
        assert!(done.execution.output.as_deref().unwrap().contains("timed out"));
        assert_eq!(done.execution.worker.as_deref(), Some("test:1"));
        assert!(h.runner.completed().is_empty());
    }

    /// Test: Dispatching a record twice is a state error; there is no retry.
    #[tokio::test]
    async fn second_dispatch_is_refused() {
        let h = harness(vec![shop()]);
        let record = created(h.orchestrator.handle_event(push("d-1")).await.unwrap())
            .remove(0);
        h.orchestrator.dispatch(record.id).await.unwrap();

        let err = h.orchestrator.dispatch(record.id).await.unwrap_err();

        assert_eq!(err.kind(), DeployErrorKind::State);
        assert_eq!(h.runner.calls().len(), 1);
    }

    /// Test: Racing dispatches of one record run the story once.
    #[tokio::test]
    async fn concurrent_dispatch_claims_once() {
        let h = harness(vec![shop()]);
        h.runner.script("deploy", Script::slow(Duration::from_millis(20)));
        let record = created(h.orchestrator.handle_event(push("d-1")).await.unwrap())
            .remove(0);

        let (first, second) = futures::future::join(
            h.orchestrator.dispatch(record.id),
            h.orchestrator.dispatch(record.id),
        )
        .await;

        let outcomes = [first, second];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        let refused = outcomes.iter().find_map(|r| r.as_ref().err()).unwrap();
        assert_eq!(refused.kind(), DeployErrorKind::State);
        assert_eq!(h.runner.calls().len(), 1);
    }

    /// Test: Background dispatch reaches a terminal state without the caller awaiting it.
    #[tokio::test]
    async fn spawned_dispatch_runs_to_completion() {
        let h = harness(vec![shop()]);
        let record = created(h.orchestrator.handle_event(push("d-1")).await.unwrap())
            .remove(0);

        h.orchestrator.spawn_dispatch(record.id).await.unwrap();

        let stored = h.store.get(record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DeploymentStatus::Success);
    }
}

mod cancel {
    use super::*;

    /// Test: Cancelling a queued record fails it and blocks dispatch.
    #[tokio::test]
    async fn cancel_queued_record() {
        let h = harness(vec![shop()]);
        let record = created(h.orchestrator.handle_event(push("d-1")).await.unwrap())
            .remove(0);

        let cancelled = h
            .orchestrator
            .cancel(record.id, &Actor::principal("ops"), "wrong branch")
            .await
            .unwrap();

        assert_eq!(cancelled.status, DeploymentStatus::Failed);
        assert_eq!(
            cancelled.execution.output.as_deref(),
            Some("Cancelled by ops: wrong branch")
        );
        let err = h.orchestrator.dispatch(record.id).await.unwrap_err();
        assert_eq!(err.kind(), DeployErrorKind::State);
        assert!(h.runner.calls().is_empty());
    }

    /// Test: Cancelling a running record stops the story before it finishes.
    #[tokio::test]
    async fn cancel_running_record_drops_story() {
        let h = harness(vec![shop()]);
        h.runner.script("deploy", Script::slow(Duration::from_secs(30)));
        let record = created(h.orchestrator.handle_event(push("d-1")).await.unwrap())
            .remove(0);

        let handle = h.orchestrator.spawn_dispatch(record.id);
        wait_for_status(&h.store, &record, DeploymentStatus::Running).await;
        h.orchestrator
            .cancel(record.id, &Actor::principal("ops"), "stuck")
            .await
            .unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("dispatch should stop after cancel")
            .unwrap();

        let stored = h.store.get(record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DeploymentStatus::Failed);
        assert!(stored.execution.output.as_deref().unwrap().contains("stuck"));
        assert!(h.runner.completed().is_empty());
    }

    /// Test: Terminal records cannot be cancelled.
    #[tokio::test]
    async fn cancel_terminal_record_is_refused() {
        let h = harness(vec![shop()]);
        let record = created(h.orchestrator.handle_event(push("d-1")).await.unwrap())
            .remove(0);
        h.orchestrator.dispatch(record.id).await.unwrap();

        let err = h
            .orchestrator
            .cancel(record.id, &Actor::principal("ops"), "late")
            .await
            .unwrap_err();

        assert_eq!(err.kind(), DeployErrorKind::State);
        let stored = h.store.get(record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DeploymentStatus::Success);
    }
}

mod rollback {
    use super::*;

    /// Test: Simple rollback runs the rollback story with a relative ref.
    #[tokio::test]
    async fn simple_rollback_runs_rollback_story() {
        let h = harness(vec![shop()]);
        let actor = Actor::principal("ops");

        let created = h
            .orchestrator
            .rollback("shop", RollbackTarget::Steps(2), &actor)
            .await
            .unwrap();
        assert!(created.approval.is_none());
        assert!(created.record.is_rollback());
        assert_eq!(
            created.record.action,
            DeploymentAction::Rollback {
                target: RollbackTarget::Steps(2)
            }
        );

        let done = h.orchestrator.dispatch(created.record.id).await.unwrap();

        assert_eq!(done.status, DeploymentStatus::Success);
        let call = &h.runner.calls()[0];
        assert_eq!(call.story, "rollback");
        assert_eq!(call.params.get("target_ref").map(String::as_str), Some("HEAD~2"));
    }

    /// Test: Advanced rollback without an earlier release is refused up front.
    #[tokio::test]
    async fn advanced_rollback_needs_previous_release() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(vec![app(
            "api",
            StrategyKind::Advanced,
            dir.path(),
            vec![push_trigger("staging", "main")],
        )]);

        let err = h
            .orchestrator
            .rollback("api", RollbackTarget::default(), &Actor::principal("ops"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), DeployErrorKind::Release);
        let all = h
            .orchestrator
            .list(&DeploymentFilter::default())
            .await
            .unwrap();
        assert!(all.is_empty());
    }
}

mod rollback_exclusion {
    use super::*;

    fn advanced_api(dir: &std::path::Path) -> wharf::config::AppConfig {
        app(
            "api",
            StrategyKind::Advanced,
            dir,
            vec![push_trigger("staging", "main"), push_trigger("preview", "main")],
        )
    }

    async fn seed_releases(store: &MemoryStore) {
        for name in ["20240101000000_aaaaaaa_0001", "20240102000000_bbbbbbb_0002"] {
            store
                .insert_release(NewRelease {
                    app_key: AppKey::new("api").unwrap(),
                    name: ReleaseName::new(name).unwrap(),
                    path: std::path::PathBuf::from("/srv/api/releases").join(name),
                    commit_sha: "abc1234".into(),
                    deployment_id: DeploymentId::generate(),
                    size_bytes: None,
                    created_at: chrono::Utc::now(),
                })
                .await
                .unwrap();
        }
    }

    fn manual() -> ManualDeployment {
        ManualDeployment {
            git_ref: "main".into(),
            ..ManualDeployment::default()
        }
    }

    /// Test: A queued deploy of an advanced app blocks a rollback of that app.
    #[tokio::test]
    async fn active_deploy_refuses_rollback() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(vec![advanced_api(dir.path())]);
        seed_releases(&h.store).await;
        let actor = Actor::principal("ops");
        let deploy = h
            .orchestrator
            .create_deployment("api", "preview", manual(), &actor)
            .await
            .unwrap();

        let err = h
            .orchestrator
            .rollback("api", RollbackTarget::default(), &actor)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), DeployErrorKind::Conflict);
        assert_eq!(err.conflicting_deployment(), Some(deploy.record.id));
    }

    /// Test: A queued rollback of an advanced app blocks every deploy trigger of that app.
    #[tokio::test]
    async fn active_rollback_refuses_deploys() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(vec![advanced_api(dir.path())]);
        seed_releases(&h.store).await;
        let actor = Actor::principal("ops");
        let rollback = h
            .orchestrator
            .rollback("api", RollbackTarget::default(), &actor)
            .await
            .unwrap();

        for trigger in ["staging", "preview"] {
            let err = h
                .orchestrator
                .create_deployment("api", trigger, manual(), &actor)
                .await
                .unwrap_err();
            assert_eq!(err.conflicting_deployment(), Some(rollback.record.id));
        }
    }

    /// Test: Deploy triggers of one advanced app stay independent of each other.
    #[tokio::test]
    async fn deploy_triggers_do_not_block_each_other() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(vec![advanced_api(dir.path())]);
        let actor = Actor::principal("ops");

        h.orchestrator
            .create_deployment("api", "staging", manual(), &actor)
            .await
            .unwrap();
        let preview = h
            .orchestrator
            .create_deployment("api", "preview", manual(), &actor)
            .await;

        assert!(preview.is_ok());
    }
}

mod observers {
    use super::*;

    #[derive(Default)]
    struct Recording {
        seen: Mutex<Vec<(Option<DeploymentStatus>, DeploymentStatus)>>,
    }

    impl TransitionObserver for Recording {
        fn on_transition(&self, record: &DeploymentRecord, from: Option<DeploymentStatus>) {
            self.seen.lock().push((from, record.status));
        }
    }

    /// Test: Observers see creation and every persisted transition in order.
    #[tokio::test]
    async fn observers_see_each_transition() {
        let recording = Arc::new(Recording::default());
        let apps = Arc::new(AppRegistry::new(vec![shop()]));
        let store = Arc::new(MemoryStore::new());
        let runner = FakeRunner::new();
        let orchestrator = Orchestrator::builder(
            apps,
            store.clone(),
            store.clone(),
            StrategyRegistry::standard(runner, store),
        )
        .digester(TokenDigester::new(support::SECRET).unwrap())
        .observers(Observers::new().with(recording.clone()))
        .build();

        let record = created(orchestrator.handle_event(push("d-1")).await.unwrap()).remove(0);
        recording.seen.lock().clear();
        let event = SourceEvent::new(EventKind::Release, "v1.0.0", "abc1234", "dana");
        let pending = created(orchestrator.handle_event(event).await.unwrap()).remove(0);
        orchestrator.dispatch(record.id).await.unwrap();

        let seen = recording.seen.lock().clone();
        assert_eq!(
            seen,
            vec![
                (None, DeploymentStatus::PendingApproval),
                (Some(DeploymentStatus::Queued), DeploymentStatus::Running),
                (Some(DeploymentStatus::Running), DeploymentStatus::Success),
            ]
        );
        assert_eq!(pending.status, DeploymentStatus::PendingApproval);
    }
}
