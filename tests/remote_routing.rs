//! Routing of large jobs to the remote queue: progress clamping, failures,
//! timeouts, cancellation and the local fallback.

mod common;

use std::sync::Arc;
use std::time::Duration;

use codepulse::core::pipeline::{
    InMemorySource, JobEvent, JobFailure, JobState, Orchestrator, RoutingDecision,
};
use codepulse::FileRecord;

use common::{collect_events, python_modules, repo, test_config, QueueBehavior, ScriptedQueue};

#[tokio::test]
async fn six_hundred_files_are_routed_to_the_remote_queue() {
    let queue = ScriptedQueue::new(QueueBehavior::Analyze {
        progress: vec![10, 5, 60],
    });
    let orchestrator = Orchestrator::builder(test_config())
        .remote_queue(queue.clone())
        .build()
        .unwrap();

    let mut files = python_modules(599);
    files.push(FileRecord::new("package.json", "{\"name\": \"widgets\"}"));
    let mut handle = orchestrator.analyze(repo(), "c0ffee", InMemorySource::shared(files));
    let events = collect_events(&mut handle).await;
    let completed = handle.outcome().await.unwrap();

    assert_eq!(completed.routing, RoutingDecision::Remote);
    assert_eq!(completed.result.routing, RoutingDecision::Remote);
    assert_eq!(completed.result.summary.files_submitted, 600);
    assert_eq!(completed.result.summary.files_analyzed, 599);
    assert_eq!(completed.result.summary.files_skipped, 1);
    assert_eq!(queue.enqueued(), 1);
    assert_eq!(orchestrator.pool().submissions(), 0);

    assert!(events.iter().any(|event| matches!(
        event,
        JobEvent::StateChanged {
            to: JobState::RemoteDispatch,
            ..
        }
    )));
    let percents: Vec<u8> = events
        .iter()
        .filter_map(|event| match event {
            JobEvent::Progress { percent, .. } => Some(*percent),
            _ => None,
        })
        .collect();
    assert_eq!(&percents[..2], &[10, 60]);
    assert!(percents.windows(2).all(|pair| pair[0] <= pair[1]));
}

#[tokio::test]
async fn remote_result_is_cached_like_a_local_one() {
    let mut config = test_config();
    config.orchestrator.max_local_files = 3;
    let queue = ScriptedQueue::new(QueueBehavior::Analyze { progress: vec![] });
    let orchestrator = Orchestrator::builder(config)
        .remote_queue(queue.clone())
        .build()
        .unwrap();
    let source = InMemorySource::shared(python_modules(4));

    orchestrator
        .analyze(repo(), "c0ffee", Arc::clone(&source))
        .outcome()
        .await
        .unwrap();
    let cached = orchestrator
        .analyze(repo(), "c0ffee", source)
        .outcome()
        .await
        .unwrap();

    assert!(cached.from_cache);
    assert_eq!(queue.enqueued(), 1);
}

#[tokio::test]
async fn remote_failure_event_fails_the_job() {
    let mut config = test_config();
    config.orchestrator.max_local_files = 2;
    let queue = ScriptedQueue::new(QueueBehavior::Fail("worker crashed".to_string()));
    let orchestrator = Orchestrator::builder(config)
        .remote_queue(queue)
        .build()
        .unwrap();

    let failure = orchestrator
        .analyze(repo(), "c0ffee", InMemorySource::shared(python_modules(3)))
        .outcome()
        .await
        .unwrap_err();

    assert_eq!(failure.reason(), "remote_queue_failure");
    assert!(failure.to_string().contains("worker crashed"));
}

#[tokio::test]
async fn silent_remote_queue_times_out_with_the_computed_bound() {
    let mut config = test_config();
    config.orchestrator.max_local_files = 2;
    config.orchestrator.timeout_base_ms = 100;
    config.orchestrator.timeout_per_file_ms = 10;
    let queue = ScriptedQueue::new(QueueBehavior::Silent);
    let orchestrator = Orchestrator::builder(config)
        .remote_queue(queue.clone())
        .build()
        .unwrap();

    let handle = orchestrator.analyze(repo(), "c0ffee", InMemorySource::shared(python_modules(4)));
    let job_id = handle.job_id();
    let failure = tokio::time::timeout(Duration::from_secs(5), handle.outcome())
        .await
        .expect("job must finish within its own timeout")
        .unwrap_err();

    assert_eq!(failure, JobFailure::Timeout { after_ms: 140 });
    assert_eq!(queue.cancelled(), vec![job_id]);
}

#[tokio::test]
async fn cancelling_a_remote_job_releases_the_subscription() {
    let mut config = test_config();
    config.orchestrator.max_local_files = 2;
    let queue = ScriptedQueue::new(QueueBehavior::Silent);
    let orchestrator = Orchestrator::builder(config)
        .remote_queue(queue.clone())
        .build()
        .unwrap();

    let mut handle =
        orchestrator.analyze(repo(), "c0ffee", InMemorySource::shared(python_modules(4)));
    let job_id = handle.job_id();
    while let Some(event) = handle.next_event().await {
        if matches!(
            event,
            JobEvent::StateChanged {
                to: JobState::RemoteDispatch,
                ..
            }
        ) {
            break;
        }
    }
    assert!(orchestrator.active_jobs().contains(&job_id));
    assert!(orchestrator.cancel(job_id));

    let failure = handle.outcome().await.unwrap_err();
    assert_eq!(failure, JobFailure::Cancelled);
    assert_eq!(queue.cancelled(), vec![job_id]);
    assert!(!orchestrator.cancel(job_id));
}

#[tokio::test]
async fn remote_routing_without_a_queue_falls_back_to_the_local_pool() {
    let mut config = test_config();
    config.orchestrator.max_local_files = 3;
    let orchestrator = Orchestrator::builder(config).build().unwrap();

    let mut handle =
        orchestrator.analyze(repo(), "c0ffee", InMemorySource::shared(python_modules(5)));
    let events = collect_events(&mut handle).await;
    let completed = handle.outcome().await.unwrap();

    assert_eq!(completed.routing, RoutingDecision::Remote);
    assert_eq!(completed.result.routing, RoutingDecision::Remote);
    assert_eq!(completed.result.summary.files_analyzed, 5);
    assert_eq!(orchestrator.pool().submissions(), 1);
    assert!(events.iter().any(|event| matches!(
        event,
        JobEvent::StateChanged {
            to: JobState::LocalDispatch,
            ..
        }
    )));
}
