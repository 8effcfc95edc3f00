use ripcord::{
    Backoff, Breaker, BreakerError, BreakerState, ConsecutiveResume, RateResume, RateTrip,
    SingleRetry, ThresholdRetry, ThresholdTrip,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_threshold_trip_and_single_probe_recovery() {
    let opened = Arc::new(AtomicUsize::new(0));
    let closed = Arc::new(AtomicUsize::new(0));
    let (o, c) = (opened.clone(), closed.clone());

    let breaker = Breaker::builder("inventory")
        .trip(ThresholdTrip::new(3))
        .resume(ConsecutiveResume::new(1))
        .retry(SingleRetry::new(Backoff::new(
            Duration::from_millis(100),
            Duration::from_secs(1),
        )))
        .on_open(move |_| {
            o.fetch_add(1, Ordering::SeqCst);
        })
        .on_close(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        })
        .build();

    for _ in 0..3 {
        assert!(breaker.ready());
        breaker.fail();
    }
    assert_eq!(breaker.state(), BreakerState::Open);
    assert_eq!(opened.load(Ordering::SeqCst), 1);

    // Backoff not yet elapsed
    assert!(!breaker.ready());

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(breaker.ready());
    // Only one probe at a time
    assert!(!breaker.ready());

    breaker.success();
    assert_eq!(breaker.state(), BreakerState::Closed);
    assert_eq!(closed.load(Ordering::SeqCst), 1);
    assert!(breaker.ready());
}

#[tokio::test(start_paused = true)]
async fn test_failed_probe_keeps_breaker_open() {
    let breaker = Breaker::builder("search")
        .trip(ThresholdTrip::new(1))
        .resume(ConsecutiveResume::new(1))
        .retry(SingleRetry::new(Backoff::new(
            Duration::from_millis(100),
            Duration::from_secs(2),
        )))
        .build();

    breaker.fail();
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(breaker.ready());
    breaker.fail();

    // The failed probe restarts the backoff
    assert!(breaker.is_tripped());
    assert!(!breaker.ready());
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(breaker.ready());
}

#[tokio::test(start_paused = true)]
async fn test_rate_trip_over_window() {
    let breaker = Breaker::builder("billing")
        .trip(RateTrip::new(0.5, 10))
        .resume(RateResume::new(0.4, 10))
        .retry(ThresholdRetry::new(2, Backoff::default()))
        .window_slide_interval(Duration::from_millis(100))
        .window_bucket_count(10)
        .build();

    for _ in 0..5 {
        breaker.success();
    }
    for _ in 0..4 {
        breaker.fail();
    }
    // Nine samples are below the minimum
    assert_eq!(breaker.state(), BreakerState::Closed);

    breaker.fail();
    assert_eq!(breaker.state(), BreakerState::Open);
    assert_eq!(breaker.error_rate(), 0.5);

    // The window decays to empty after a full rotation
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(breaker.window_snapshot().count, 0);
    assert_eq!(breaker.error_rate(), 0.0);
}

#[tokio::test(start_paused = true)]
async fn test_call_through_breaker() {
    let breaker = Breaker::builder("ledger")
        .trip(ThresholdTrip::new(2))
        .build();

    let ok = breaker
        .call(|| async { Ok::<_, String>(7) }, Duration::from_secs(1))
        .await;
    assert_eq!(ok.unwrap(), 7);

    let timed_out = breaker
        .call(
            || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, String>(0)
            },
            Duration::from_millis(50),
        )
        .await;
    assert!(matches!(timed_out, Err(BreakerError::Timeout { .. })));

    let failed = breaker
        .call(|| async { Err::<i32, _>("boom".to_string()) }, Duration::ZERO)
        .await;
    assert!(matches!(failed, Err(BreakerError::Execution(ref e)) if e == "boom"));
    assert!(breaker.is_tripped());

    let rejected = breaker
        .call(|| async { Ok::<_, String>(1) }, Duration::ZERO)
        .await;
    assert!(matches!(rejected, Err(BreakerError::Open { ref breaker }) if breaker == "ledger"));
}

#[tokio::test]
async fn test_concurrent_outcomes_are_all_counted() {
    let breaker = Arc::new(
        Breaker::builder("fanout")
            .trip(ThresholdTrip::new(u64::MAX))
            .window_slide_interval(Duration::from_secs(60))
            .build(),
    );

    let mut handles = Vec::new();
    for i in 0..8 {
        let breaker = breaker.clone();
        handles.push(tokio::spawn(async move {
            for _ in 0..50 {
                if i % 2 == 0 {
                    breaker.success();
                } else {
                    breaker.fail();
                }
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(breaker.success_count(), 200);
    assert_eq!(breaker.failure_count(), 200);
    assert_eq!(breaker.error_rate(), 0.5);
}
