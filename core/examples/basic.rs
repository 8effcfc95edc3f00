//! Basic breaker and pipeline usage example

use ripcord::{
    Backoff, Breaker, ConsecutiveResume, Pipeline, Rule, RuleKind, SingleRetry, ThresholdTrip,
};
use std::time::Duration;

#[tokio::main]
async fn main() {
    println!("=== Circuit Breaker Basic Example ===\n");

    let breaker = Breaker::builder("payment_api")
        .trip(ThresholdTrip::new(3))
        .resume(ConsecutiveResume::new(1))
        .retry(SingleRetry::new(Backoff::new(
            Duration::from_millis(200),
            Duration::from_millis(500),
        )))
        .on_open(|name| println!("🔴 Breaker '{}' opened!", name))
        .on_close(|name| println!("🟢 Breaker '{}' closed!", name))
        .build();

    println!("Initial state: {}\n", breaker.state());

    println!("--- Successful calls ---");
    for i in 1..=2 {
        let result = breaker
            .call(move || async move { Ok::<_, String>(format!("Payment {}", i)) }, Duration::ZERO)
            .await;
        match result {
            Ok(result) => println!("✓ {}", result),
            Err(e) => println!("✗ Error: {}", e),
        }
    }
    println!("State: {}\n", breaker.state());

    println!("--- Triggering failures ---");
    for i in 1..=3 {
        let result = breaker
            .call(
                move || async move { Err::<String, _>(format!("Payment failed {}", i)) },
                Duration::from_millis(500),
            )
            .await;
        match result {
            Ok(_) => println!("✓ Success"),
            Err(e) => println!("✗ {}", e),
        }
    }
    println!("State: {} (error rate {:.2})\n", breaker.state(), breaker.error_rate());

    println!("--- Attempting call while open ---");
    match breaker
        .call(|| async { Ok::<_, String>("Should be rejected") }, Duration::ZERO)
        .await
    {
        Ok(_) => println!("✓ Success"),
        Err(e) => println!("✗ {}", e),
    }
    println!();

    println!("--- Probing after backoff ---");
    tokio::time::sleep(Duration::from_millis(600)).await;
    match breaker
        .call(|| async { Ok::<_, String>("Payment successful") }, Duration::ZERO)
        .await
    {
        Ok(result) => println!("✓ {}", result),
        Err(e) => println!("✗ {}", e),
    }
    println!("State: {}\n", breaker.state());

    println!("=== Pipeline Example ===\n");

    let pipeline = match Pipeline::new(vec![
        Rule::reject(RuleKind::Concurrency, 2.0),
        Rule::waiting(5.0, Duration::from_secs(1)),
    ]) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            println!("✗ {}", e);
            return;
        }
    };

    for i in 1..=5 {
        match pipeline.run(|| async move { i * 10 }).await {
            Ok(value) => println!("✓ request {} -> {} (qps {})", i, value, pipeline.qps()),
            Err(e) => println!("✗ request {}: {}", i, e),
        }
    }
}
