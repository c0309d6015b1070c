//! End-to-end cycles of the practice loop against a real on-disk store,
//! with collaborators replaced by scripted doubles.

use std::sync::Arc;

use tempfile::{tempdir, TempDir};
use tokio::sync::watch;

use kata_store::JsonStore;

use kata_core::collab::fakes::{failing_outcome, ScriptedExecutor, ScriptedGenerator, ScriptedReflector};
use kata_core::collab::{CodeGenerator, Reflector, SandboxExecutor};
use kata_core::domain::{
    BuilderProfile, DifficultyState, EventKind, ScoreEntry, SkillMap, SystemEvent, TaskResult,
    TaskStatus,
};
use kata_core::{keys, ControlLoop, LoopConfig, RecordOutcome, TaskQueue};

struct Harness {
    control: ControlLoop,
    store: Arc<JsonStore>,
    executor: Arc<ScriptedExecutor>,
    reflector: Arc<ScriptedReflector>,
    config: LoopConfig,
    _dir: TempDir,
}

fn harness() -> Harness {
    let dir = tempdir().expect("tempdir");
    let store = Arc::new(JsonStore::open(dir.path()).expect("store"));
    let generator = Arc::new(ScriptedGenerator::new());
    let executor = Arc::new(ScriptedExecutor::new());
    let reflector = Arc::new(ScriptedReflector::new());

    let mut config = LoopConfig::default();
    config.loop_interval_secs = 0;
    config.error_cooldown_secs = 0;
    config.generation_timeout_secs = 5;
    config.execution_timeout_secs = 5;

    let control = ControlLoop::new(
        Arc::clone(&store),
        config.clone(),
        generator as Arc<dyn CodeGenerator>,
        executor.clone() as Arc<dyn SandboxExecutor>,
        reflector.clone() as Arc<dyn Reflector>,
    )
    .expect("control loop");

    Harness {
        control,
        store,
        executor,
        reflector,
        config,
        _dir: dir,
    }
}

fn queue(fx: &Harness) -> TaskQueue {
    TaskQueue::new(Arc::clone(&fx.store), &fx.config)
}

// ============================================================
// Full session
// ============================================================

#[tokio::test]
async fn five_cycles_build_a_profile() {
    let mut fx = harness();
    for _ in 0..5 {
        let report = fx.control.run_once().await.expect("cycle");
        assert_eq!(report.outcome, RecordOutcome::Completed);
    }

    let profile: BuilderProfile = fx
        .store
        .load(keys::BUILDER_PROFILE)
        .await
        .expect("load")
        .expect("present");
    assert_eq!(profile.task_count, 5);
    assert!(profile.average_score > 0.0);

    let skills: SkillMap = fx
        .store
        .load(keys::SKILL_MAP)
        .await
        .expect("load")
        .expect("present");
    assert!(!skills.skills.is_empty());

    let log: Vec<ScoreEntry> = fx
        .store
        .load(keys::SCORE_LOG)
        .await
        .expect("load")
        .expect("present");
    assert_eq!(log.len(), 5);

    // One difficulty decision per scored attempt, holds included, and the
    // recorded successes anchor regression protection.
    let state: DifficultyState = fx
        .store
        .load(keys::DIFFICULTY_STATE)
        .await
        .expect("load")
        .expect("present");
    assert_eq!(state.history.len(), 5);
    assert!(state.last_success_difficulty.is_some());
    assert!((state.replay() - state.current).abs() < 1e-9);

    let events: Vec<SystemEvent> = fx
        .store
        .load(keys::SYSTEM_EVENTS)
        .await
        .expect("load")
        .expect("present");
    assert!(events.iter().any(|e| e.kind == EventKind::TaskStarted));
    assert!(events.iter().any(|e| e.kind == EventKind::TaskCompleted));
}

// ============================================================
// Retry flow
// ============================================================

#[tokio::test]
async fn failed_attempts_retry_until_success() {
    let mut fx = harness();
    let queue = queue(&fx);
    let id = queue
        .submit_task("write a CSV parser", 0.4, Vec::new(), Vec::new(), 1)
        .await
        .expect("submit");

    fx.executor.enqueue(Ok(failing_outcome(1, "Traceback")));
    fx.executor.enqueue(Ok(failing_outcome(1, "Traceback again")));
    // Third attempt: fallback success.

    assert_eq!(
        fx.control.run_once().await.expect("cycle").outcome,
        RecordOutcome::Retried { attempts: 1 }
    );
    assert_eq!(
        fx.control.run_once().await.expect("cycle").outcome,
        RecordOutcome::Retried { attempts: 2 }
    );
    let report = fx.control.run_once().await.expect("cycle");
    assert_eq!(report.task_id, id);
    assert_eq!(report.outcome, RecordOutcome::Completed);

    let task = queue.get_task(id).await.expect("get").expect("record");
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.attempts, 2);

    // Every attempt was scored, but reflection ran once, on the terminal
    // outcome.
    let log: Vec<ScoreEntry> = fx
        .store
        .load(keys::SCORE_LOG)
        .await
        .expect("load")
        .expect("present");
    assert_eq!(log.len(), 3);
    assert!(log.iter().all(|entry| entry.task_id == id));
    assert_eq!(fx.reflector.calls(), vec![id]);
}

#[tokio::test]
async fn budget_exhaustion_fails_the_task_and_reflects_once() {
    let mut fx = harness();
    let queue = queue(&fx);
    let id = queue
        .submit_task("impossible ask", 0.6, Vec::new(), Vec::new(), 1)
        .await
        .expect("submit");

    for _ in 0..3 {
        fx.executor.enqueue(Ok(failing_outcome(1, "no way")));
    }

    assert_eq!(
        fx.control.run_once().await.expect("cycle").outcome,
        RecordOutcome::Retried { attempts: 1 }
    );
    assert_eq!(
        fx.control.run_once().await.expect("cycle").outcome,
        RecordOutcome::Retried { attempts: 2 }
    );
    assert_eq!(
        fx.control.run_once().await.expect("cycle").outcome,
        RecordOutcome::Exhausted { attempts: 3 }
    );

    let task = queue.get_task(id).await.expect("get").expect("record");
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.attempts, 3);
    assert_eq!(fx.reflector.calls(), vec![id]);

    // One score entry per attempt, exhaustion included.
    let log: Vec<ScoreEntry> = fx
        .store
        .load(keys::SCORE_LOG)
        .await
        .expect("load")
        .expect("present");
    assert_eq!(log.len(), 3);

    let events: Vec<SystemEvent> = fx
        .store
        .load(keys::SYSTEM_EVENTS)
        .await
        .expect("load")
        .expect("present");
    assert!(events.iter().any(|e| e.kind == EventKind::TaskFailed));
}

// ============================================================
// Re-entrancy
// ============================================================

#[tokio::test]
async fn replaying_a_result_changes_nothing() {
    let mut fx = harness();
    let report = fx.control.run_once().await.expect("cycle");
    assert_eq!(report.outcome, RecordOutcome::Completed);

    let queue = queue(&fx);
    let replay = queue
        .record_result(
            report.task_id,
            TaskResult {
                success: false,
                score: 1.0,
                execution_time: 0.1,
                output: String::new(),
                error: Some("late duplicate".to_string()),
            },
        )
        .await
        .expect("record");
    assert_eq!(replay, RecordOutcome::AlreadyTerminal);

    let task = queue
        .get_task(report.task_id)
        .await
        .expect("get")
        .expect("record");
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.attempts, 0);

    let log: Vec<ScoreEntry> = fx
        .store
        .load(keys::SCORE_LOG)
        .await
        .expect("load")
        .expect("present");
    assert_eq!(log.len(), 1);
}

// ============================================================
// Ordering
// ============================================================

#[tokio::test]
async fn score_log_order_matches_completion_order() {
    let mut fx = harness();
    let mut completed = Vec::new();
    for _ in 0..3 {
        completed.push(fx.control.run_once().await.expect("cycle").task_id);
    }

    let log: Vec<ScoreEntry> = fx
        .store
        .load(keys::SCORE_LOG)
        .await
        .expect("load")
        .expect("present");
    let logged: Vec<_> = log.iter().map(|entry| entry.task_id).collect();
    assert_eq!(logged, completed);
}

// ============================================================
// Lifecycle
// ============================================================

#[tokio::test]
async fn shutdown_signal_stops_the_run_loop() {
    let fx = harness();
    let mut control = fx.control;
    let store = Arc::clone(&fx.store);
    let (tx, rx) = watch::channel(false);

    let handle = tokio::spawn(async move { control.run(rx).await });
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    tx.send(true).expect("send shutdown");

    let joined = tokio::time::timeout(std::time::Duration::from_secs(5), handle)
        .await
        .expect("loop must stop promptly")
        .expect("join");
    assert!(joined.is_ok());

    let events: Vec<SystemEvent> = store
        .load(keys::SYSTEM_EVENTS)
        .await
        .expect("load")
        .expect("present");
    assert!(events.iter().any(|e| e.kind == EventKind::LoopStarted));
    assert!(events.iter().any(|e| e.kind == EventKind::LoopHalted));
}

#[tokio::test]
async fn corrupt_score_log_halts_the_run_loop() {
    let fx = harness();
    let path = fx.store.root().join("core/score_log.json");
    std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    std::fs::write(&path, b"{ definitely not json").expect("write");

    let mut control = fx.control;
    let (_tx, rx) = watch::channel(false);
    let result = tokio::time::timeout(std::time::Duration::from_secs(10), control.run(rx))
        .await
        .expect("halt must be prompt");
    let err = result.expect_err("corruption must halt the loop");
    assert!(err.is_fatal());
}
