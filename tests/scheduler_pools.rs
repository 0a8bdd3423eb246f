mod common;
use crate::common::{init_tracing, mock_library, new_book, with_timeout, TestResult};

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, oneshot};

use bookflow::book::{SharedBook, Status};
use bookflow::errors::BookflowError;
use bookflow::scheduler::{meta_task, Scheduler, SchedulerEvent, WorkerPool};
use bookflow::task::{Answer, InputPrompt, StepOutcome, Task, TaskId, TaskInfo, TaskState};
use bookflow::types::Level;

type Log = Arc<Mutex<Vec<String>>>;

fn one_pool(size: usize, levels: &[Level]) -> Scheduler {
    Scheduler::new(vec![WorkerPool::new("test", size, levels.to_vec())]).expect("valid pools")
}

fn logging_task(name: &str, level: Level, log: &Log) -> Task {
    let log = log.clone();
    let entry = name.to_string();
    Task::builder(name)
        .level(level)
        .atomic("log", move |_ctx| {
            log.lock().unwrap().push(entry.clone());
            Ok(StepOutcome::Continue)
        })
        .build()
}

/// A task that signals once it is running and then blocks until released.
fn gate_task(
    name: &str,
    level: Level,
    book: Option<SharedBook>,
    log: &Log,
) -> (Task, oneshot::Receiver<()>, mpsc::Sender<()>) {
    let (started_tx, started_rx) = oneshot::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let mut started_tx = Some(started_tx);
    let log = log.clone();
    let entry = name.to_string();

    let mut builder = Task::builder(name).level(level);
    if let Some(book) = book {
        builder = builder.book(book);
    }
    let task = builder
        .atomic("wait", move |_ctx| {
            if let Some(tx) = started_tx.take() {
                let _ = tx.send(());
            }
            release_rx.recv().ok();
            log.lock().unwrap().push(entry.clone());
            Ok(StepOutcome::Continue)
        })
        .build();
    (task, started_rx, release_tx)
}

/// Wait for the `TaskRemoved` event of `id`.
async fn removed(events: &mut broadcast::Receiver<SchedulerEvent>, id: TaskId) -> TaskInfo {
    loop {
        match events.recv().await {
            Ok(SchedulerEvent::TaskRemoved(info)) if info.id == id => return info,
            Ok(_) => continue,
            Err(e) => panic!("event stream ended: {e}"),
        }
    }
}

#[tokio::test]
async fn test_task_runs_to_done_and_is_forgotten() -> TestResult {
    init_tracing();
    let log: Log = Arc::default();
    let scheduler = one_pool(1, &[Level::Medium]);
    let mut events = scheduler.subscribe();
    scheduler.start();

    let id = scheduler.schedule(logging_task("hello", Level::Medium, &log))?;
    let info = with_timeout(removed(&mut events, id)).await;

    assert_eq!(info.state, TaskState::Done);
    assert_eq!(*log.lock().unwrap(), vec!["hello"]);
    assert!(scheduler.task(id).is_none());
    assert!(scheduler.get_all_tasks().is_empty());

    scheduler.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_failed_task_does_not_stall_its_worker() -> TestResult {
    init_tracing();
    let log: Log = Arc::default();
    let scheduler = one_pool(1, &[Level::Medium]);
    let mut events = scheduler.subscribe();
    scheduler.start();

    let panicking = Task::builder("panics")
        .level(Level::Medium)
        .atomic("boom", |_ctx| -> bookflow::errors::Result<StepOutcome> {
            panic!("scanner firmware fault")
        })
        .build();
    let failing = Task::builder("fails")
        .level(Level::Medium)
        .atomic("bad scandata", |_ctx| {
            Err(BookflowError::Integrity("leaf 3 missing".to_string()))
        })
        .build();

    let panic_id = scheduler.schedule(panicking)?;
    let fail_id = scheduler.schedule(failing)?;
    let after_id = scheduler.schedule(logging_task("after", Level::Medium, &log))?;

    let info = with_timeout(removed(&mut events, panic_id)).await;
    assert_eq!(info.state, TaskState::Error);
    assert!(info.error.is_some_and(|e| e.contains("scanner firmware fault")));

    let info = with_timeout(removed(&mut events, fail_id)).await;
    assert_eq!(info.state, TaskState::Error);
    assert!(info.error.is_some_and(|e| e.contains("leaf 3 missing")));

    let info = with_timeout(removed(&mut events, after_id)).await;
    assert_eq!(info.state, TaskState::Done);
    assert_eq!(*log.lock().unwrap(), vec!["after"]);

    scheduler.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_higher_level_is_served_first() -> TestResult {
    let log: Log = Arc::default();
    let scheduler = one_pool(1, &[Level::High, Level::Low]);
    scheduler.start();

    let (gate, started, release) = gate_task("gate", Level::Low, None, &log);
    scheduler.schedule(gate)?;
    with_timeout(started).await?;

    scheduler.schedule(logging_task("low-1", Level::Low, &log))?;
    scheduler.schedule(logging_task("low-2", Level::Low, &log))?;
    scheduler.schedule(logging_task("high", Level::High, &log))?;
    release.send(())?;

    with_timeout(scheduler.wait_idle()).await;
    assert_eq!(*log.lock().unwrap(), vec!["gate", "high", "low-1", "low-2"]);

    scheduler.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_pools_isolate_levels() -> TestResult {
    let log: Log = Arc::default();
    let scheduler = Scheduler::new(vec![
        WorkerPool::new("upload", 1, vec![Level::High]),
        WorkerPool::new("background", 1, vec![Level::Low]),
    ])?;
    scheduler.start();

    // A stuck high task does not hold up the low pool.
    let (gate, started, release) = gate_task("stuck", Level::High, None, &log);
    scheduler.schedule(gate)?;
    with_timeout(started).await?;

    let mut events = scheduler.subscribe();
    let id = scheduler.schedule(logging_task("background", Level::Low, &log))?;
    with_timeout(removed(&mut events, id)).await;
    assert_eq!(*log.lock().unwrap(), vec!["background"]);

    let workers = scheduler.get_all_workers();
    assert_eq!(workers.len(), 2);
    assert!(workers.iter().any(|w| w.pool == "upload" && w.is_busy()));

    release.send(())?;
    with_timeout(scheduler.wait_idle()).await;
    scheduler.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_book_lock_keeps_second_task_off() -> TestResult {
    let (_fs, library) = mock_library();
    let book = new_book(library.as_ref(), Status::PackagingStarted, &[]);
    let log: Log = Arc::default();
    let scheduler = one_pool(2, &[Level::Medium]);
    let mut events = scheduler.subscribe();
    scheduler.start();

    let (first, first_started, first_release) =
        gate_task("first", Level::Medium, Some(book.clone()), &log);
    let first_id = scheduler.schedule(first)?;
    with_timeout(first_started).await?;

    let second = Task::builder("second")
        .book(book.clone())
        .atomic("never", |_ctx| Ok(StepOutcome::Continue))
        .build();
    let second_id = scheduler.schedule(second)?;

    let info = with_timeout(removed(&mut events, second_id)).await;
    assert_eq!(info.state, TaskState::Error);
    assert!(info.error.unwrap_or_default().contains("locked"));

    first_release.send(())?;
    let info = with_timeout(removed(&mut events, first_id)).await;
    assert_eq!(info.state, TaskState::Done);
    assert!(!book.lock().is_locked());

    scheduler.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_periodic_task_reruns_until_stopped() -> TestResult {
    let runs = Arc::new(AtomicU32::new(0));
    let counter = runs.clone();
    let scheduler = one_pool(1, &[Level::Low]);
    let mut events = scheduler.subscribe();
    scheduler.start();

    let task = Task::builder("tick")
        .level(Level::Low)
        .interval(Duration::from_millis(10))
        .atomic("count", move |_ctx| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(StepOutcome::Continue)
        })
        .build();
    let id = scheduler.schedule(task)?;

    with_timeout(async {
        while runs.load(Ordering::SeqCst) < 3 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(scheduler.task(id).is_some_and(|info| info.periodic));

    scheduler.stop().await;
    let info = with_timeout(removed(&mut events, id)).await;
    assert!(
        matches!(info.state, TaskState::Cancelled | TaskState::Done),
        "{:?}",
        info.state
    );
    assert!(scheduler.task(id).is_none());
    Ok(())
}

#[tokio::test]
async fn test_paused_task_resumes_with_answer() -> TestResult {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let scheduler = one_pool(1, &[Level::Medium]);
    let mut events = scheduler.subscribe();
    scheduler.start();

    let task = Task::builder("confirm")
        .atomic("ask", move |ctx| {
            counter.fetch_add(1, Ordering::SeqCst);
            match ctx.answer("ok") {
                Some(Answer::YesNo(true)) => Ok(StepOutcome::Continue),
                _ => Ok(StepOutcome::Pause(InputPrompt::yes_no("ok", "Proceed", "Proceed?"))),
            }
        })
        .build();
    let id = scheduler.schedule(task)?;

    with_timeout(scheduler.wait_idle()).await;
    let info = scheduler.task(id).ok_or("paused task should stay registered")?;
    assert_eq!(info.state, TaskState::Paused);
    assert_eq!(info.prompt.map(|p| p.id), Some("ok".to_string()));

    let err = scheduler.resume(id, Answer::Number(1.0)).unwrap_err();
    assert!(matches!(err, BookflowError::Precondition(_)));
    assert_eq!(scheduler.task(id).map(|i| i.state), Some(TaskState::Paused));

    scheduler.resume(id, Answer::YesNo(true))?;
    let info = with_timeout(removed(&mut events, id)).await;
    assert_eq!(info.state, TaskState::Done);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    assert!(matches!(
        scheduler.resume(id, Answer::YesNo(true)),
        Err(BookflowError::TaskNotFound(_))
    ));
    scheduler.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_cancel_queued_task() -> TestResult {
    let log: Log = Arc::default();
    // Not started: everything stays queued.
    let scheduler = one_pool(1, &[Level::Medium]);

    let id = scheduler.schedule(logging_task("queued", Level::Medium, &log))?;
    assert_eq!(scheduler.task(id).map(|i| i.state), Some(TaskState::Pending));

    assert_eq!(scheduler.cancel(id)?, TaskState::Cancelled);
    assert!(scheduler.task(id).is_none());
    assert!(matches!(scheduler.cancel(id), Err(BookflowError::TaskNotFound(_))));
    assert!(log.lock().unwrap().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_cancel_running_task_stops_at_step_boundary() -> TestResult {
    let log: Log = Arc::default();
    let scheduler = one_pool(1, &[Level::Medium]);
    let mut events = scheduler.subscribe();
    scheduler.start();

    let (started_tx, started_rx) = oneshot::channel::<()>();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let mut started_tx = Some(started_tx);
    let after = log.clone();
    let task = Task::builder("two steps")
        .atomic("first", move |_ctx| {
            if let Some(tx) = started_tx.take() {
                let _ = tx.send(());
            }
            release_rx.recv().ok();
            Ok(StepOutcome::Continue)
        })
        .atomic("second", move |_ctx| {
            after.lock().unwrap().push("second".to_string());
            Ok(StepOutcome::Continue)
        })
        .build();
    let id = scheduler.schedule(task)?;
    with_timeout(started_rx).await?;

    assert_eq!(scheduler.cancel(id)?, TaskState::Running);
    release_tx.send(())?;

    let info = with_timeout(removed(&mut events, id)).await;
    assert_eq!(info.state, TaskState::Cancelled);
    assert!(log.lock().unwrap().is_empty());
    scheduler.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_stop_cancels_waiting_tasks() -> TestResult {
    let log: Log = Arc::default();
    let scheduler = one_pool(1, &[Level::Medium]);
    let mut events = scheduler.subscribe();

    let first = scheduler.schedule(logging_task("a", Level::Medium, &log))?;
    let second = scheduler.schedule(logging_task("b", Level::Medium, &log))?;
    let submitter = scheduler.submitter();

    scheduler.stop().await;

    assert_eq!(removed(&mut events, first).await.state, TaskState::Cancelled);
    assert_eq!(removed(&mut events, second).await.state, TaskState::Cancelled);
    assert!(log.lock().unwrap().is_empty());

    let late = logging_task("late", Level::Medium, &log);
    assert!(matches!(submitter.submit(late), Err(BookflowError::Cancelled)));
    Ok(())
}

#[tokio::test]
async fn test_level_without_pool_is_rejected() {
    let log: Log = Arc::default();
    let scheduler = one_pool(1, &[Level::High]);

    let result = scheduler.schedule(logging_task("orphan", Level::Low, &log));
    assert!(matches!(result, Err(BookflowError::ConfigError(_))));

    assert!(matches!(
        Scheduler::new(vec![WorkerPool::new("empty", 0, vec![Level::High])]),
        Err(BookflowError::ConfigError(_))
    ));
}

#[tokio::test]
async fn test_submitter_outliving_scheduler_cancels() {
    let log: Log = Arc::default();
    let submitter = one_pool(1, &[Level::Medium]).submitter();

    let result = submitter.submit(logging_task("late", Level::Medium, &log));
    assert!(matches!(result, Err(BookflowError::Cancelled)));
}

#[tokio::test]
async fn test_meta_task_queues_children_at_their_level() -> TestResult {
    let log: Log = Arc::default();
    let scheduler = Scheduler::new(vec![
        WorkerPool::new("high", 1, vec![Level::High]),
        WorkerPool::new("low", 1, vec![Level::Low]),
    ])?;
    let mut events = scheduler.subscribe();
    scheduler.start();

    let children_log = log.clone();
    let meta = meta_task("fan out", Level::High, scheduler.submitter(), move |_ctx| {
        Ok((0..3)
            .map(|i| logging_task(&format!("child-{i}"), Level::Low, &children_log))
            .collect())
    })
    .build();
    let meta_id = scheduler.schedule(meta)?;

    let info = with_timeout(removed(&mut events, meta_id)).await;
    assert_eq!(info.progress.as_deref(), Some("queued 3 of 3 tasks"));

    with_timeout(scheduler.wait_idle()).await;
    let mut ran = log.lock().unwrap().clone();
    ran.sort();
    assert_eq!(ran, vec!["child-0", "child-1", "child-2"]);

    scheduler.stop().await;
    Ok(())
}
