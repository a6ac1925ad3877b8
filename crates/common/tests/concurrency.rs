//! Integration tests for concurrent requests against one pod

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::Method;

use ::common::deadline::Deadline;
use ::common::events::EventKind;
use ::common::ldp::{LdpError, Outcome};

use common::{alice, path, setup_fs_env, setup_test_env, TestPod};

async fn identical_slugs(pod: Arc<TestPod>) {
    pod.seed("/inbox/", "", "").await;

    let mut handles = Vec::new();
    for i in 0..16 {
        let pod = pod.clone();
        handles.push(tokio::spawn(async move {
            let request = pod
                .request(Method::POST, "/inbox/", alice())
                .with_body(format!("message {}", i), "text/plain")
                .with_slug("msg");
            pod.run(request).await
        }));
    }

    let mut locations = HashSet::new();
    for handle in handles {
        match handle.await.unwrap() {
            Ok(Outcome::Created { location }) => {
                assert!(locations.insert(location.to_string()), "duplicate {}", location);
            }
            other => panic!("expected Created, got {:?}", other),
        }
    }
    assert_eq!(locations.len(), 16);
    assert!(locations.contains("/inbox/msg"));

    let children = pod.store.list_container(&path("/inbox/")).await.unwrap();
    assert_eq!(children.len(), 16);

    let created = pod.recorder.wait_for(16).await;
    assert_eq!(created.len(), 16);
    assert!(created.iter().all(|(kind, _)| *kind == EventKind::ResourceCreated));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_identical_slugs_in_memory() {
    identical_slugs(Arc::new(setup_test_env().await)).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_identical_slugs_on_disk() {
    identical_slugs(Arc::new(setup_fs_env().await)).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_writes_to_one_path_are_ordered() {
    let pod = Arc::new(setup_test_env().await);
    pod.seed("/counter.txt", "0", "text/plain").await;

    let mut handles = Vec::new();
    for i in 1..=20 {
        let pod = pod.clone();
        handles.push(tokio::spawn(async move {
            pod.run(
                pod.request(Method::PUT, "/counter.txt", alice())
                    .with_body(i.to_string(), "text/plain"),
            )
            .await
        }));
    }
    let readers: Vec<_> = (0..20)
        .map(|_| {
            let pod = pod.clone();
            tokio::spawn(async move {
                let outcome = pod
                    .run(pod.request(Method::GET, "/counter.txt", alice()))
                    .await
                    .unwrap();
                let Outcome::Read(representation) = outcome else {
                    panic!("expected a representation");
                };
                let value: u32 = std::str::from_utf8(&representation.data)
                    .unwrap()
                    .parse()
                    .unwrap();
                assert!(value <= 20);
            })
        })
        .collect();

    for handle in handles {
        assert!(matches!(handle.await.unwrap(), Ok(Outcome::Updated)));
    }
    for reader in readers {
        reader.await.unwrap();
    }

    let events = pod.recorder.wait_for(20).await;
    assert_eq!(events.len(), 20);
    assert!(events
        .iter()
        .all(|(kind, p)| *kind == EventKind::ResourceUpdated && p == "/counter.txt"));
}

#[tokio::test]
async fn test_lock_wait_honors_deadline() {
    let pod = setup_test_env().await;
    pod.seed("/busy.txt", "x", "text/plain").await;

    let _held = pod
        .locks
        .write(&path("/busy.txt"), &Deadline::none())
        .await
        .unwrap();

    let result = pod
        .engine
        .handle(
            pod.request(Method::PUT, "/busy.txt", alice())
                .with_body("y", "text/plain"),
            &Deadline::after(Duration::from_millis(20)),
        )
        .await;
    assert!(matches!(result, Err(LdpError::TimedOut(_))));
    assert_eq!(
        pod.body("/busy.txt").await.map(|(data, _)| data),
        Some(Bytes::from_static(b"x"))
    );
    assert!(pod.recorder.settle().await.is_empty());
}
