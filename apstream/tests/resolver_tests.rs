//! Resolver tests against a minimal local HTTP server.

use std::net::SocketAddr;
use std::time::Duration;

use apstream::{AccessPointResolver, ApStreamError, SessionConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::time::timeout;

/// Serve exactly one HTTP response with `status` and `body`.
async fn one_shot_server(status: &'static str, body: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut chunk = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                return;
            }
            request.extend_from_slice(&chunk[..n]);
        }
        assert!(request.starts_with(b"GET / "));
        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(response.as_bytes()).await.unwrap();
        stream.shutdown().await.unwrap();
    });
    addr
}

fn resolver_for(addr: SocketAddr) -> AccessPointResolver {
    AccessPointResolver::new(format!("http://{addr}/"), Duration::from_secs(2))
}

#[tokio::test]
async fn first_listed_access_point_wins() {
    let addr = one_shot_server(
        "200 OK",
        r#"{"ap_list":["ap1.example.com:4070","ap2.example.com:4070"]}"#,
    )
    .await;
    let endpoint = resolver_for(addr).resolve_endpoint().await.unwrap();
    assert_eq!(endpoint.as_str(), "ap1.example.com:4070");
}

#[tokio::test]
async fn malformed_bodies_are_resolution_errors() {
    for body in [
        r#"{"ap_list":[]}"#,
        r#"{"aps":["ap1.example.com:4070"]}"#,
        r#"{"ap_list":"ap1.example.com:4070"}"#,
        "<html>busy</html>",
    ] {
        let addr = one_shot_server("200 OK", body).await;
        let err = resolver_for(addr).resolve_endpoint().await.unwrap_err();
        assert!(matches!(err, ApStreamError::Resolution(_)), "{body}: {err:?}");
        assert!(err.is_retryable());
    }
}

#[tokio::test]
async fn http_error_status_is_resolution_error() {
    let addr = one_shot_server("503 Service Unavailable", "{}").await;
    assert!(matches!(
        resolver_for(addr).resolve_endpoint().await,
        Err(ApStreamError::Resolution(_))
    ));
}

#[tokio::test]
async fn unreachable_service_is_resolution_error() {
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    assert!(matches!(
        resolver_for(addr).resolve_endpoint().await,
        Err(ApStreamError::Resolution(_))
    ));
}

#[tokio::test]
async fn silent_service_hits_timeout() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let _hold = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        drop(stream);
    });

    let resolver = AccessPointResolver::new(format!("http://{addr}/"), Duration::from_millis(200));
    let result = timeout(Duration::from_secs(5), resolver.resolve_endpoint())
        .await
        .expect("resolver must honour its own timeout");
    assert!(matches!(result, Err(ApStreamError::Resolution(_))));
}

#[tokio::test]
async fn override_makes_no_network_call() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let config = SessionConfig {
        ap_override: Some("10.0.0.5:4070".into()),
        resolver_url: format!("http://{addr}/"),
        ..SessionConfig::default()
    };
    let resolver = AccessPointResolver::from_config(&config);
    for _ in 0..3 {
        let endpoint = resolver.resolve_endpoint().await.unwrap();
        assert_eq!(endpoint.as_str(), "10.0.0.5:4070");
    }

    assert!(
        timeout(Duration::from_millis(100), listener.accept())
            .await
            .is_err(),
        "resolver contacted the service despite an override"
    );
}
