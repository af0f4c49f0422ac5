//! End-to-end breaker behaviour under Tokio's paused clock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use retry_breaker::resilience::{BreakerError, TripState};
use retry_breaker::{GuardPolicy, OperationId};

mod common;

use common::{breaker_with, fallback, invoke, millis, secs, FlakyOp, RecordingAlert, FALLBACK};

#[tokio::test(start_paused = true)]
async fn test_trip_fallback_replay_and_recover() {
    let alert = Arc::new(RecordingAlert::default());
    let breaker = breaker_with(alert.clone());
    let policy = GuardPolicy::new(0.5, secs(5)).with_retry(3, secs(1));
    let guard = breaker.register(OperationId::new("inventory.reserve"), policy).unwrap();
    let op = FlakyOp::new(true);

    for _ in 0..2 {
        assert!(breaker.call(&guard, invoke(&op), fallback()).await.is_ok());
    }
    op.set_healthy(false);
    // 1/3 and 2/4 are within tolerance
    for _ in 0..2 {
        assert!(breaker.call(&guard, invoke(&op), fallback()).await.is_err());
        assert!(!breaker.is_open(guard.id()));
    }
    // 3/5 is not
    assert!(breaker.call(&guard, invoke(&op), fallback()).await.is_err());
    assert!(breaker.is_open(guard.id()));
    assert_eq!(breaker.pending_replays(), 1);

    let calls = op.calls();
    assert_eq!(breaker.call(&guard, invoke(&op), fallback()).await, Ok(FALLBACK));
    assert_eq!(op.calls(), calls, "open guard must not reach the operation");

    op.set_healthy(true);
    tokio::time::sleep(millis(1100)).await;
    assert_eq!(op.calls(), calls + 1, "exactly one replay");
    assert!(!breaker.is_open(guard.id()));
    assert_eq!(breaker.pending_replays(), 0);

    let result = breaker.call(&guard, invoke(&op), fallback()).await.unwrap();
    assert_ne!(result, FALLBACK);
    assert!(alert.summaries().is_empty());

    breaker.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_guard_alerts_once_and_stays_open() {
    let alert = Arc::new(RecordingAlert::default());
    let breaker = breaker_with(alert.clone());
    let policy = GuardPolicy::new(0.0, secs(5))
        .with_retry(3, secs(1))
        .with_fallback("cached");
    let guard = breaker.register(OperationId::new("payments.charge"), policy).unwrap();
    let op = FlakyOp::new(false);

    assert!(breaker.call(&guard, invoke(&op), fallback()).await.is_err());
    assert!(breaker.is_open(guard.id()));
    assert!(matches!(
        breaker.reset(guard.id()),
        Err(BreakerError::ReplayPending(_))
    ));

    tokio::time::sleep(secs(10)).await;
    assert_eq!(op.calls(), 4, "one call plus three replays");
    assert_eq!(breaker.pending_replays(), 0);

    let summaries = alert.summaries();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].operation, *guard.id());
    assert_eq!(summaries[0].retries, 3);
    assert_eq!(summaries[0].fallback.as_deref(), Some("cached"));
    assert_eq!(summaries[0].last_error.as_deref(), Some("replay failed: call 4 failed"));

    let state = breaker.trip_state(guard.id()).unwrap();
    assert_eq!(state.state, TripState::Exhausted);
    assert_eq!(breaker.call(&guard, invoke(&op), fallback()).await, Ok(FALLBACK));

    tokio::time::sleep(secs(30)).await;
    assert_eq!(op.calls(), 4);
    assert_eq!(alert.summaries().len(), 1);

    let entry = breaker.reset(guard.id()).unwrap();
    assert_eq!(entry.episode, state.episode);
    assert!(!breaker.is_open(guard.id()));
    assert!(matches!(
        breaker.reset(guard.id()),
        Err(BreakerError::NotTripped(_))
    ));

    op.set_healthy(true);
    assert_eq!(breaker.call(&guard, invoke(&op), fallback()).await, Ok(5));

    breaker.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_replays_run_in_eligibility_order() {
    let breaker = breaker_with(Arc::new(RecordingAlert::default()));
    let order = Arc::new(Mutex::new(Vec::new()));

    for (name, interval) in [("slow", 3), ("fast", 1), ("medium", 2)] {
        let policy = GuardPolicy::new(0.0, secs(60)).with_retry(3, secs(interval));
        let guard = breaker.register(OperationId::new(name), policy).unwrap();

        let first = Arc::new(AtomicBool::new(true));
        let order = order.clone();
        let invoke = move || {
            let first = first.clone();
            let order = order.clone();
            async move {
                if first.swap(false, Ordering::SeqCst) {
                    Err("down".to_string())
                } else {
                    order.lock().unwrap().push(name);
                    Ok(())
                }
            }
        };
        let result = breaker.call(&guard, invoke, || async { Ok(()) }).await;
        assert!(result.is_err());
    }
    assert_eq!(breaker.pending_replays(), 3);

    tokio::time::sleep(millis(3500)).await;
    assert_eq!(*order.lock().unwrap(), vec!["fast", "medium", "slow"]);
    assert!(breaker.open_guards().is_empty());

    breaker.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_window_rollover_discards_old_outcomes() {
    let breaker = breaker_with(Arc::new(RecordingAlert::default()));
    let policy = GuardPolicy::new(0.5, secs(1)).with_retry(3, secs(60));
    let guard = breaker.register(OperationId::new("search.query"), policy).unwrap();
    let op = FlakyOp::new(true);

    for _ in 0..3 {
        breaker.call(&guard, invoke(&op), fallback()).await.unwrap();
    }
    op.set_healthy(false);
    assert!(breaker.call(&guard, invoke(&op), fallback()).await.is_err());
    assert!(!breaker.is_open(guard.id()));

    tokio::time::sleep(millis(1100)).await;
    assert!(breaker.call(&guard, invoke(&op), fallback()).await.is_err());
    assert!(breaker.is_open(guard.id()), "a fresh window holds only the failure");
    assert_eq!(guard.arbiter().snapshot().failures, 1);
    assert_eq!(guard.arbiter().snapshot().successes, 0);

    breaker.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_errors_pass_through_untransformed() {
    let breaker = breaker_with(Arc::new(RecordingAlert::default()));
    let policy = GuardPolicy::new(0.0, secs(5)).with_retry(3, secs(60));
    let guard = breaker.register(OperationId::new("ledger.post"), policy).unwrap();
    let op = FlakyOp::new(false);

    let err = breaker.call(&guard, invoke(&op), fallback()).await.unwrap_err();
    assert_eq!(err, "call 1 failed");

    let err = breaker
        .call(&guard, invoke(&op), || async { Err::<u32, _>("fallback down".to_string()) })
        .await
        .unwrap_err();
    assert_eq!(err, "fallback down");

    breaker.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_guards_are_independent() {
    let breaker = breaker_with(Arc::new(RecordingAlert::default()));
    let policy = GuardPolicy::new(0.0, secs(5)).with_retry(3, secs(60));
    let failing = breaker.register(OperationId::new("a"), policy.clone()).unwrap();
    let healthy = breaker.register(OperationId::new("b"), policy).unwrap();

    let bad = FlakyOp::new(false);
    let good = FlakyOp::new(true);
    assert!(breaker.call(&failing, invoke(&bad), fallback()).await.is_err());

    assert!(breaker.is_open(failing.id()));
    assert_eq!(breaker.call(&healthy, invoke(&good), fallback()).await, Ok(1));
    assert!(!breaker.is_open(healthy.id()));

    breaker.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_panicking_operation_counts_as_failure() {
    let breaker = Arc::new(breaker_with(Arc::new(RecordingAlert::default())));
    let policy = GuardPolicy::new(0.0, secs(5)).with_retry(3, secs(60));
    let guard = breaker.register(OperationId::new("reports.render"), policy).unwrap();

    let task = {
        let breaker = breaker.clone();
        let guard = guard.clone();
        tokio::spawn(async move {
            let invoke = || async {
                if true {
                    panic!("render blew up");
                }
                Ok::<u32, String>(0)
            };
            breaker.call(&guard, invoke, fallback()).await
        })
    };
    let err = task.await.unwrap_err();
    assert!(err.is_panic(), "the panic reaches the caller");

    assert_eq!(guard.arbiter().snapshot().failures, 1);
    assert!(breaker.is_open(guard.id()));
    assert_eq!(breaker.pending_replays(), 1);
    assert_eq!(breaker.call(&guard, invoke(&FlakyOp::new(true)), fallback()).await, Ok(FALLBACK));

    breaker.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_trip_after_shutdown_leaves_guard_closed() {
    let breaker = breaker_with(Arc::new(RecordingAlert::default()));
    let policy = GuardPolicy::new(0.0, secs(5)).with_retry(3, secs(1));
    let guard = breaker.register(OperationId::new("late"), policy).unwrap();
    let op = FlakyOp::new(false);
    breaker.shutdown().await;

    assert!(breaker.call(&guard, invoke(&op), fallback()).await.is_err());
    assert!(!breaker.is_open(guard.id()));
    assert_eq!(breaker.pending_replays(), 0);
    assert!(matches!(
        breaker.reset(guard.id()),
        Err(BreakerError::NotTripped(_))
    ));

    op.set_healthy(true);
    tokio::time::sleep(secs(3600)).await;
    assert_eq!(breaker.call(&guard, invoke(&op), fallback()).await, Ok(2));
}
