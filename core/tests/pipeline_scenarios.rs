use ripcord::{Pipeline, Rule, RuleKind, ShapingError};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn test_qps_reject_recovers_after_window() {
    let pipeline = Pipeline::new(vec![Rule::reject(RuleKind::Qps, 10.0)]).unwrap();

    let mut passed = 0;
    let mut rejected = 0;
    for i in 0..20 {
        match pipeline.run(|| async move { i }).await {
            Ok(_) => passed += 1,
            Err(ShapingError::Rejected { kind, limit }) => {
                assert_eq!(kind, RuleKind::Qps);
                assert_eq!(limit, 10.0);
                rejected += 1;
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(passed, 10);
    assert_eq!(rejected, 10);

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(pipeline.qps(), 0);
    assert!(pipeline.run(|| async {}).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_qps_waiting_spaces_concurrent_callers() {
    let pipeline = Arc::new(Pipeline::new(vec![Rule::waiting(2.0, Duration::from_secs(3))]).unwrap());
    let start = Instant::now();

    let mut handles = Vec::new();
    for _ in 0..5 {
        let pipeline = pipeline.clone();
        handles.push(tokio::spawn(async move {
            pipeline.run(|| async { Instant::now() }).await
        }));
    }

    let mut passes = Vec::new();
    for handle in handles {
        passes.push(handle.await.unwrap().unwrap());
    }
    passes.sort();

    for pair in passes.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_millis(499));
    }
    let total = passes[4] - start;
    assert!(total >= Duration::from_millis(1999) && total < Duration::from_millis(2500));
}

/// A 3s horizon at 2 QPS admits the immediate pass plus six queued slots
#[tokio::test(start_paused = true)]
async fn test_waiting_burst_beyond_horizon_is_rejected() {
    let pipeline = Arc::new(Pipeline::new(vec![Rule::waiting(2.0, Duration::from_secs(3))]).unwrap());

    let mut handles = Vec::new();
    for _ in 0..10 {
        let pipeline = pipeline.clone();
        handles.push(tokio::spawn(async move { pipeline.run(|| async {}).await }));
    }

    let (mut ok, mut rejected) = (0, 0);
    for handle in handles {
        match handle.await.unwrap() {
            Ok(()) => ok += 1,
            Err(ShapingError::Rejected { kind, .. }) => {
                assert_eq!(kind, RuleKind::Qps);
                rejected += 1;
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(ok, 7);
    assert_eq!(rejected, 3);
}

#[tokio::test(start_paused = true)]
async fn test_waiting_rejects_when_queue_is_too_long() {
    let pipeline = Arc::new(Pipeline::new(vec![Rule::waiting(1.0, Duration::from_millis(2500))]).unwrap());

    let mut handles = Vec::new();
    for _ in 0..5 {
        let pipeline = pipeline.clone();
        handles.push(tokio::spawn(async move { pipeline.run(|| async {}).await }));
    }

    let mut ok = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            ok += 1;
        }
    }
    // Immediate pass plus slots at 1s and 2s
    assert_eq!(ok, 3);
}

#[tokio::test]
async fn test_concurrency_limit_holds_under_load() {
    let pipeline = Arc::new(Pipeline::new(vec![Rule::reject(RuleKind::Concurrency, 3.0)]).unwrap());
    let running = Arc::new(AtomicI64::new(0));
    let peak = Arc::new(AtomicI64::new(0));

    let mut handles = Vec::new();
    for _ in 0..64 {
        let (pipeline, running, peak) = (pipeline.clone(), running.clone(), peak.clone());
        handles.push(tokio::spawn(async move {
            pipeline
                .run(|| async {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                })
                .await
        }));
    }
    for handle in handles {
        let _ = handle.await.unwrap();
    }

    assert!(peak.load(Ordering::SeqCst) <= 3);
    assert_eq!(pipeline.concurrent_count(), 0);
}

#[test]
fn test_rules_from_toml() {
    #[derive(serde::Deserialize)]
    struct Rules {
        rules: Vec<Rule>,
    }

    let parsed: Rules = toml::from_str(
        r#"
        [[rules]]
        type = "qps"
        behavior = "waiting"
        limit = 50.0
        max_wait_ms = 200

        [[rules]]
        type = "concurrency"
        behavior = "reject"
        limit = 16.0
        "#,
    )
    .unwrap();

    let pipeline = Pipeline::new(parsed.rules).unwrap();
    assert_eq!(pipeline.rules().len(), 2);
    assert_eq!(pipeline.rules()[0].max_wait(), Duration::from_millis(200));
}
