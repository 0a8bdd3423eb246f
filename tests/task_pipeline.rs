mod common;
use crate::common::{init_tracing, mock_library, new_book, run, TestResult};

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use bookflow::book::Status;
use bookflow::errors::BookflowError;
use bookflow::task::{
    Answer, InputPrompt, RetryPolicy, Step, StepOutcome, Task, TaskReport, TaskState,
};

type Log = Arc<Mutex<Vec<String>>>;

fn log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// Step that appends `name` to `log` and continues.
fn logging_step(name: &'static str, log: &Log) -> Step {
    let log = log.clone();
    Step::atomic(name, move |_ctx| {
        log.lock().unwrap().push(name.to_string());
        Ok(StepOutcome::Continue)
    })
}

fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        backoff: Duration::from_millis(1),
    }
}

/// Records the state of every report passed to it.
fn record_reports(sink: &Arc<Mutex<Vec<TaskState>>>) -> impl FnMut(&TaskReport) + Send + 'static {
    let sink = sink.clone();
    move |report| sink.lock().unwrap().push(report.state)
}

#[test]
fn test_steps_run_in_order() {
    init_tracing();
    let log = log();
    let mut task = Task::builder("ordered")
        .step(logging_step("a", &log))
        .step(logging_step("b", &log))
        .step(logging_step("c", &log))
        .build();

    assert_eq!(task.state(), TaskState::Pending);
    assert_eq!(run(&mut task), TaskState::Done);
    assert_eq!(entries(&log), vec!["a", "b", "c"]);

    // Running a finished task is a no-op.
    assert_eq!(run(&mut task), TaskState::Done);
    assert_eq!(entries(&log).len(), 3);
}

#[test]
fn test_pause_resumes_on_the_same_step() -> TestResult {
    let log = log();
    let confirms = Arc::new(AtomicU32::new(0));
    let counter = confirms.clone();

    let mut task = Task::builder("confirming")
        .step(logging_step("prepare", &log))
        .atomic("confirm", move |ctx| {
            counter.fetch_add(1, Ordering::SeqCst);
            match ctx.answer("go_ahead") {
                Some(Answer::YesNo(true)) => Ok(StepOutcome::Continue),
                _ => Ok(StepOutcome::Pause(InputPrompt::yes_no(
                    "go_ahead",
                    "Continue?",
                    "Confirm to continue",
                ))),
            }
        })
        .step(logging_step("finish", &log))
        .build();

    assert_eq!(run(&mut task), TaskState::Paused);
    let info = task.info();
    assert_eq!(info.step, 1);
    assert_eq!(info.prompt.map(|p| p.id), Some("go_ahead".to_string()));

    let wrong = task.supply_answer(Answer::Text("sure".to_string()));
    assert!(matches!(wrong, Err(BookflowError::Precondition(_))));

    task.supply_answer(Answer::YesNo(true))?;
    assert_eq!(run(&mut task), TaskState::Done);

    assert_eq!(confirms.load(Ordering::SeqCst), 2);
    assert_eq!(entries(&log), vec!["prepare", "finish"]);
    assert_eq!(task.info().prompt, None);
    Ok(())
}

#[test]
fn test_answer_without_prompt_is_rejected() {
    let mut task = Task::builder("idle").build();
    let result = task.supply_answer(Answer::YesNo(true));
    assert!(matches!(result, Err(BookflowError::Precondition(_))));
}

#[test]
fn test_cancel_before_start_runs_nothing() {
    let log = log();
    let ends = Arc::new(Mutex::new(Vec::new()));
    let mut task = Task::builder("doomed")
        .step(logging_step("a", &log))
        .on_end(record_reports(&ends))
        .build();

    task.handle().request_cancel();

    assert_eq!(run(&mut task), TaskState::Cancelled);
    assert!(entries(&log).is_empty());
    assert_eq!(*ends.lock().unwrap(), vec![TaskState::Cancelled]);
}

#[test]
fn test_cancel_while_paused_releases_lock() {
    let (_fs, library) = mock_library();
    let book = new_book(library.as_ref(), Status::PackagingStarted, &[]);

    let mut task = Task::builder("paused")
        .book(book.clone())
        .atomic("ask", |_ctx| {
            Ok(StepOutcome::Pause(InputPrompt::yes_no("q", "Question", "?")))
        })
        .build();

    assert_eq!(run(&mut task), TaskState::Paused);
    assert!(book.lock().is_locked(), "paused task keeps its lock");

    assert_eq!(task.cancel_idle(), TaskState::Cancelled);
    assert!(!book.lock().is_locked());
}

#[test]
fn test_cancel_mid_step_is_cancelled_with_error() {
    let log = log();
    let compensations = Arc::new(Mutex::new(Vec::new()));
    let ends = Arc::new(Mutex::new(Vec::new()));
    let (started_tx, started_rx) = mpsc::channel();
    let (go_tx, go_rx) = mpsc::channel::<()>();

    let mut task = Task::builder("interrupted")
        .atomic("long", move |ctx| {
            started_tx.send(()).ok();
            go_rx.recv().ok();
            ctx.check_cancelled()?;
            Ok(StepOutcome::Continue)
        })
        .step(logging_step("after", &log))
        .on_cancelled_with_error(record_reports(&compensations))
        .on_end(record_reports(&ends))
        .build();
    let handle = task.handle().clone();

    let runner = thread::spawn(move || {
        let state = task.run();
        (state, task)
    });
    started_rx.recv().unwrap();
    handle.request_cancel();
    go_tx.send(()).unwrap();
    let (state, task) = runner.join().unwrap();

    assert_eq!(state, TaskState::CancelledWithError);
    assert!(matches!(
        task.error().map(|e| &**e),
        Some(BookflowError::Cancelled)
    ));
    assert!(entries(&log).is_empty());
    assert_eq!(*compensations.lock().unwrap(), vec![TaskState::CancelledWithError]);
    assert_eq!(*ends.lock().unwrap(), vec![TaskState::CancelledWithError]);
}

#[test]
fn test_transient_failure_is_retried() {
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = attempts.clone();
    let mut task = Task::builder("flaky")
        .step(Step::retrying("remote call", fast_retry(3), move |_ctx| {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(BookflowError::Transient("timeout".to_string()))
            } else {
                Ok(StepOutcome::Continue)
            }
        }))
        .build();

    assert_eq!(run(&mut task), TaskState::Done);
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[test]
fn test_retries_are_bounded() {
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = attempts.clone();
    let mut task = Task::builder("down")
        .step(Step::retrying("remote call", fast_retry(2), move |_ctx| {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(BookflowError::Transient("still down".to_string()))
        }))
        .build();

    assert_eq!(run(&mut task), TaskState::Error);
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert!(matches!(
        task.error().map(|e| &**e),
        Some(BookflowError::Transient(_))
    ));
    assert_eq!(task.info().error.as_deref(), Some("Transient error: still down"));
}

#[test]
fn test_precondition_failure_is_not_retried() {
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = attempts.clone();
    let mut task = Task::builder("refused")
        .step(Step::retrying("check", fast_retry(5), move |_ctx| {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(BookflowError::Precondition("nothing to upload".to_string()))
        }))
        .build();

    assert_eq!(run(&mut task), TaskState::Error);
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

#[test]
fn test_panicking_step_becomes_error() {
    let mut task = Task::builder("buggy")
        .atomic("explode", |_ctx| -> bookflow::errors::Result<StepOutcome> {
            panic!("index out of range")
        })
        .build();

    assert_eq!(run(&mut task), TaskState::Error);
    let message = task.error().map(|e| e.to_string()).unwrap_or_default();
    assert!(message.contains("panicked"), "{message}");
    assert!(message.contains("index out of range"), "{message}");
}

#[test]
fn test_context_carries_values_between_steps() {
    let seen = Arc::new(Mutex::new(None));
    let sink = seen.clone();
    let mut task = Task::builder("context")
        .atomic("produce", |ctx| {
            ctx.insert(vec![3u32, 4, 5]);
            Ok(StepOutcome::Continue)
        })
        .atomic("consume", move |ctx| {
            *sink.lock().unwrap() = ctx.get::<Vec<u32>>().cloned();
            Ok(StepOutcome::Continue)
        })
        .build();

    assert_eq!(run(&mut task), TaskState::Done);
    assert_eq!(*seen.lock().unwrap(), Some(vec![3, 4, 5]));
}

#[test]
fn test_sub_pipeline_pause_and_answer_route_to_inner_task() -> TestResult {
    let log = log();
    let inner_log = log.clone();
    let inner = Task::builder("inner")
        .atomic("inner confirm", move |ctx| match ctx.answer("inner_ok") {
            Some(Answer::YesNo(true)) => {
                inner_log.lock().unwrap().push("inner".to_string());
                Ok(StepOutcome::Continue)
            }
            _ => Ok(StepOutcome::Pause(InputPrompt::yes_no("inner_ok", "Inner", "ok?"))),
        })
        .build();

    let mut outer = Task::builder("outer")
        .step(logging_step("before", &log))
        .step(Step::sub(inner))
        .step(logging_step("after", &log))
        .build();

    assert_eq!(run(&mut outer), TaskState::Paused);
    assert_eq!(
        outer.info().prompt.map(|p| p.id),
        Some("inner_ok".to_string())
    );

    outer.supply_answer(Answer::YesNo(true))?;
    assert_eq!(run(&mut outer), TaskState::Done);
    assert_eq!(entries(&log), vec!["before", "inner", "after"]);
    Ok(())
}

#[test]
fn test_failed_sub_pipeline_fails_outer() {
    let log = log();
    let inner = Task::builder("inner")
        .atomic("break", |_ctx| Err(BookflowError::Integrity("corrupt".to_string())))
        .build();
    let mut outer = Task::builder("outer")
        .step(Step::sub(inner))
        .step(logging_step("after", &log))
        .build();

    assert_eq!(run(&mut outer), TaskState::Error);
    let message = outer.error().map(|e| e.to_string()).unwrap_or_default();
    assert!(message.contains("sub-pipeline 'inner'"), "{message}");
    assert!(message.contains("corrupt"), "{message}");
    assert!(entries(&log).is_empty());
}

#[test]
fn test_lock_held_through_on_end_then_released() {
    let (_fs, library) = mock_library();
    let book = new_book(library.as_ref(), Status::PackagingStarted, &[]);
    let locked_at_end = Arc::new(Mutex::new(None));

    let probe = book.clone();
    let sink = locked_at_end.clone();
    let mut task = Task::builder("locked")
        .book(book.clone())
        .atomic("work", |_ctx| Ok(StepOutcome::Continue))
        .on_end(move |_report| {
            *sink.lock().unwrap() = Some(probe.lock().is_locked());
        })
        .build();
    let holder = task.id().to_string();
    assert!(!task.holds_lock());

    assert_eq!(run(&mut task), TaskState::Done);

    assert_eq!(*locked_at_end.lock().unwrap(), Some(true));
    assert!(!task.holds_lock());
    assert!(!book.lock().is_locked());
    assert!(holder.starts_with("task-"));
}

#[test]
fn test_task_on_locked_book_fails_without_running() {
    let (_fs, library) = mock_library();
    let book = new_book(library.as_ref(), Status::PackagingStarted, &[]);
    book.lock().set_lock("operator").unwrap();
    let log = log();

    let mut task = Task::builder("blocked")
        .book(book.clone())
        .step(logging_step("a", &log))
        .build();

    assert_eq!(run(&mut task), TaskState::Error);
    assert!(matches!(
        task.error().map(|e| &**e),
        Some(BookflowError::Locked { .. })
    ));
    assert!(entries(&log).is_empty());
    assert_eq!(book.lock().lock_holder(), Some("operator"));
}

#[test]
fn test_retry_backoff_doubles() {
    let policy = RetryPolicy {
        max_attempts: 5,
        backoff: Duration::from_millis(100),
    };

    assert_eq!(policy.delay_before(2), Duration::from_millis(100));
    assert_eq!(policy.delay_before(3), Duration::from_millis(200));
    assert_eq!(policy.delay_before(4), Duration::from_millis(400));
    assert_eq!(RetryPolicy::none().max_attempts, 1);
}
