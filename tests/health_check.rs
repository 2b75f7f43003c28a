// ABOUTME: Integration tests for HTTP health probing.
// ABOUTME: Probes a local HTTP server and waits on consecutive-threshold health.

use std::sync::Arc;
use std::time::Duration;

use cutover::health::{
    HealthCheckPolicy, HealthError, HttpProbe, StatusMatcher, TargetProbe, wait_until_healthy,
};
use cutover::types::Endpoint;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Serves `status` to every request and remembers the request lines it saw.
async fn serve(status: u16) -> (Endpoint, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let log = Arc::clone(&seen);
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            let log = Arc::clone(&log);
            tokio::spawn(async move {
                let mut buf = vec![0u8; 4096];
                let mut read = 0;
                while !buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut buf[read..]).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => read += n,
                    }
                }
                let request = String::from_utf8_lossy(&buf[..read]);
                if let Some(line) = request.lines().next() {
                    log.lock().push(line.to_string());
                }
                let response = format!(
                    "HTTP/1.1 {status} Status\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                );
                let _ = stream.write_all(response.as_bytes()).await;
            });
        }
    });

    (Endpoint::new("127.0.0.1", port), seen)
}

fn fast_policy() -> HealthCheckPolicy {
    HealthCheckPolicy {
        path: "/healthz".to_string(),
        interval: Duration::from_millis(20),
        timeout: Duration::from_secs(2),
        ..HealthCheckPolicy::default()
    }
}

#[tokio::test]
async fn probe_passes_on_a_matching_status() {
    let (target, seen) = serve(200).await;

    let result = HttpProbe::new().probe(&target, &fast_policy()).await;

    assert!(result.is_healthy(), "got {result:?}");
    assert_eq!(seen.lock().as_slice(), ["GET /healthz HTTP/1.1"]);
}

#[tokio::test]
async fn probe_fails_on_a_status_outside_the_matcher() {
    let (target, _) = serve(503).await;

    let result = HttpProbe::new().probe(&target, &fast_policy()).await;

    assert!(!result.is_healthy());
}

#[tokio::test]
async fn custom_matcher_accepts_redirects() {
    let (target, _) = serve(302).await;
    let policy = HealthCheckPolicy {
        matcher: StatusMatcher::range(200, 399).unwrap(),
        ..fast_policy()
    };

    assert!(HttpProbe::new().probe(&target, &policy).await.is_healthy());
}

#[tokio::test]
async fn probe_fails_when_nothing_listens() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let result = HttpProbe::new()
        .probe(&Endpoint::new("127.0.0.1", port), &fast_policy())
        .await;

    assert!(!result.is_healthy());
}

#[tokio::test]
async fn healthy_targets_cross_the_threshold() {
    let (a, _) = serve(200).await;
    let (b, seen) = serve(200).await;

    let report = wait_until_healthy(
        &HttpProbe::new(),
        &[a, b],
        &fast_policy(),
        Duration::from_secs(5),
    )
    .await
    .unwrap();

    assert_eq!(report.healthy_count(), 2);
    assert_eq!(seen.lock().len(), 2);
}

#[tokio::test]
async fn one_failing_target_keeps_the_group_unhealthy() {
    let (good, _) = serve(200).await;
    let (bad, _) = serve(500).await;

    let err = wait_until_healthy(
        &HttpProbe::new(),
        &[good, bad.clone()],
        &fast_policy(),
        Duration::from_millis(200),
    )
    .await
    .unwrap_err();

    let HealthError::Timeout { report, .. } = err else {
        panic!("expected a timeout, got {err:?}");
    };
    let (failed, _) = report.first_failure().expect("a failing target");
    assert_eq!(failed, &bad);
}
