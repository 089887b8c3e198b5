//! Batching engine metrics regression tests

use super::helpers::*;
use serial_test::serial;
use tower_batching::{BatchOutcome, Engine, Request, ResolverExt, resolver_fn};

struct Echo(u64);

impl Request for Echo {
    type Key = u64;
    type Value = u64;
    type Error = String;

    fn key(&self) -> u64 {
        self.0
    }
}

fn echo(batch: Vec<Echo>) -> BatchOutcome<Echo> {
    Ok(batch.into_iter().map(|Echo(n)| Ok(n)).collect())
}

#[tokio::test]
#[serial]
async fn batching_request_metrics_exist() {
    init_recorder();

    let engine = Engine::builder().name("metrics_engine").build();
    let loader = engine
        .loader_builder(resolver_fn("echo", |batch: Vec<Echo>| {
            let outcome = echo(batch);
            async move { outcome }
        }).cached())
        .name("metrics_loader")
        .build();

    // Leader and waiter in one window, then a cache hit.
    let _ = futures::join!(loader.issue(Echo(1)), loader.issue(Echo(1)));
    let _ = loader.issue(Echo(1)).await;

    assert_counter_exists("batching_requests_total");
    assert_metric_has_label("batching_requests_total", "loader", "metrics_loader");
    assert_metric_has_label("batching_requests_total", "role", "leader");
    assert_metric_has_label("batching_requests_total", "role", "waiter");
    assert_metric_has_label("batching_requests_total", "role", "cached");
}

#[tokio::test]
#[serial]
async fn batching_batch_metrics_exist() {
    init_recorder();

    let engine = Engine::builder().name("batch_engine").build();
    let loader = engine
        .loader_builder(resolver_fn("echo", |batch: Vec<Echo>| {
            let outcome = echo(batch);
            async move { outcome }
        }))
        .name("batch_loader")
        .build();

    let _ = loader.issue_all((0..4).map(Echo)).await;

    assert_counter_exists("batching_batches_total");
    assert_metric_has_label("batching_batches_total", "loader", "batch_loader");

    assert_histogram_exists("batching_batch_size");
    assert_metric_has_label("batching_batch_size", "loader", "batch_loader");

    assert_counter_exists("batching_windows_total");
    assert_metric_has_label("batching_windows_total", "engine", "batch_engine");
}
