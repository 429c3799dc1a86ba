use std::sync::Arc;
use std::time::Duration;

use profile_agent::{AgentBuilder, AgentError, ProfileType};
use tests::{MockCollector, StaticProducer, CPU_PAYLOAD, HEAP_PAYLOAD};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

fn builder(collector: &MockCollector) -> AgentBuilder {
    AgentBuilder::new(collector.url(), "integration")
        .with_producer(Arc::new(StaticProducer))
        .with_cpu_duration(Duration::from_millis(100))
        .with_label("region", "eu")
        .with_label("host", "ci")
}

#[tokio::test]
async fn uploads_one_profile_over_http() {
    let mut collector = MockCollector::start([]).await.unwrap();
    let mut agent = builder(&collector).with_heap_profile().build().unwrap();

    agent.collect_once(ProfileType::Heap).await.unwrap();

    let upload = collector.uploads.recv().await.unwrap();
    assert_eq!(&upload.body[..], HEAP_PAYLOAD);
    assert_eq!(upload.params["service"], "integration");
    assert_eq!(upload.params["labels"], "region=eu,host=ci");
    assert_eq!(upload.params["type"], "heap");
    assert!(!upload.params.contains_key("created_at"));
}

#[tokio::test]
async fn named_profiles_are_uploaded_as_written() {
    let mut collector = MockCollector::start([]).await.unwrap();
    let mut agent = builder(&collector).build().unwrap();

    agent.collect_once(ProfileType::Goroutine).await.unwrap();

    let upload = collector.uploads.recv().await.unwrap();
    assert_eq!(upload.params["type"], "goroutine");
    assert!(upload.body.starts_with(b"goroutine"));
}

#[tokio::test]
async fn rejected_upload_is_reported() {
    let collector = MockCollector::start([400]).await.unwrap();
    let mut agent = builder(&collector).build().unwrap();

    let err = agent.collect_once(ProfileType::Cpu).await.unwrap_err();
    assert!(matches!(err, AgentError::Collect(_)));
    assert!(
        err.to_string().contains("bad request: collector responded with 400"),
        "{err}"
    );
}

#[tokio::test]
async fn unreachable_collector_fails_to_start() {
    let mut agent = AgentBuilder::new("not a url", "integration")
        .with_producer(Arc::new(StaticProducer))
        .build()
        .unwrap();
    let err = agent.start(&CancellationToken::new()).unwrap_err();
    assert!(matches!(err, AgentError::InvalidCollectorAddr { .. }));
}

#[tokio::test]
async fn loop_rotates_cpu_then_heap() {
    let mut collector = MockCollector::start([]).await.unwrap();
    let shutdown = CancellationToken::new();
    let mut agent = builder(&collector)
        .with_heap_profile()
        .with_seed(1)
        .start(&shutdown)
        .unwrap();

    let first = timeout(Duration::from_secs(30), collector.uploads.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.params["type"], "cpu");
    assert_eq!(&first.body[..], CPU_PAYLOAD);

    let second = timeout(Duration::from_secs(30), collector.uploads.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.params["type"], "heap");
    assert_eq!(&second.body[..], HEAP_PAYLOAD);

    shutdown.cancel();
    agent.stop().await.unwrap();
    assert!(!agent.is_running());
}

#[tokio::test]
async fn stop_interrupts_a_stalled_response_body() {
    let mut collector = MockCollector::start_stalling(503).await.unwrap();
    let mut agent = builder(&collector)
        .with_seed(1)
        .start(&CancellationToken::new())
        .unwrap();

    let upload = timeout(Duration::from_secs(30), collector.uploads.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(upload.status.as_u16(), 503);
    tokio::time::sleep(Duration::from_millis(200)).await;

    // the collector sent headers only; stop must not wait for the body
    timeout(Duration::from_secs(5), agent.stop())
        .await
        .expect("stop hung on the response body")
        .unwrap();
    assert!(!agent.is_running());
}
