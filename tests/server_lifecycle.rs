//! Start/stop lifecycle tests.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};

use thinking_proxy::http::ServerError;
use thinking_proxy::net::ListenerError;
use thinking_proxy::{ProxyServer, ServerStatus};

mod common;

async fn wait_for_connections(server: &ProxyServer, expected: u64) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while server.active_connections() != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("connection count never reached expected value");
}

#[tokio::test]
async fn test_start_is_idempotent() {
    let backend = common::unused_addr().await;
    let server = ProxyServer::new(common::proxy_config(backend));
    assert_eq!(server.status(), ServerStatus::Stopped);
    assert_eq!(server.local_addr().await, None);

    let first = server.start().await.unwrap();
    let second = server.start().await.unwrap();

    assert_eq!(first, second);
    assert!(server.is_running());
    assert_eq!(server.local_addr().await, Some(first));

    server.stop().await;
}

#[tokio::test]
async fn test_concurrent_start_binds_once() {
    let backend = common::unused_addr().await;
    let server = Arc::new(ProxyServer::new(common::proxy_config(backend)));

    let a = tokio::spawn({
        let server = server.clone();
        async move { server.start().await.unwrap() }
    });
    let b = tokio::spawn({
        let server = server.clone();
        async move { server.start().await.unwrap() }
    });

    assert_eq!(a.await.unwrap(), b.await.unwrap());
    server.stop().await;
}

#[tokio::test]
async fn test_stop_releases_port() {
    let backend = common::unused_addr().await;
    let server = ProxyServer::new(common::proxy_config(backend));
    let addr = server.start().await.unwrap();

    server.stop().await;
    assert_eq!(server.status(), ServerStatus::Stopped);
    assert_eq!(server.local_addr().await, None);

    assert!(TcpStream::connect(addr).await.is_err());
    let rebound = TcpListener::bind(addr).await;
    assert!(rebound.is_ok(), "port still held after stop");
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let backend = common::unused_addr().await;
    let server = ProxyServer::new(common::proxy_config(backend));

    // Stop before start is a no-op.
    server.stop().await;
    assert_eq!(server.status(), ServerStatus::Stopped);

    server.start().await.unwrap();
    server.stop().await;
    server.stop().await;
    assert_eq!(server.status(), ServerStatus::Stopped);
}

#[tokio::test]
async fn test_status_transitions_are_published() {
    let backend = common::unused_addr().await;
    let server = ProxyServer::new(common::proxy_config(backend));
    let mut status = server.subscribe();
    assert_eq!(*status.borrow(), ServerStatus::Stopped);

    server.start().await.unwrap();
    status.changed().await.unwrap();
    assert_eq!(*status.borrow_and_update(), ServerStatus::Running);

    server.stop().await;
    status.changed().await.unwrap();
    assert_eq!(*status.borrow_and_update(), ServerStatus::Stopped);
}

#[tokio::test]
async fn test_bind_failure_leaves_server_stopped() {
    let occupied = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let backend = common::unused_addr().await;

    let mut config = common::proxy_config(backend);
    config.listener.bind_address = occupied.local_addr().unwrap().to_string();
    let server = ProxyServer::new(config);

    let err = server.start().await.unwrap_err();
    assert!(matches!(
        err,
        ServerError::Listener(ListenerError::Bind { .. })
    ));
    assert_eq!(server.status(), ServerStatus::Stopped);
    assert_eq!(server.local_addr().await, None);
}

#[tokio::test]
async fn test_invalid_backend_address_rejected() {
    let mut config = common::proxy_config(common::unused_addr().await);
    config.backend.address = "not-an-address".to_string();
    let server = ProxyServer::new(config);

    let err = server.start().await.unwrap_err();
    assert!(matches!(err, ServerError::InvalidBackendAddress(_)));
    assert!(!server.is_running());
}

#[tokio::test]
async fn test_non_loopback_listener_refused() {
    let mut config = common::proxy_config(common::unused_addr().await);
    config.listener.bind_address = "0.0.0.0:0".to_string();
    let server = ProxyServer::new(config);

    let err = server.start().await.unwrap_err();
    assert!(matches!(
        err,
        ServerError::Listener(ListenerError::NotLoopback(_))
    ));
    assert_eq!(server.status(), ServerStatus::Stopped);
    assert_eq!(server.local_addr().await, None);
}

#[tokio::test]
async fn test_non_loopback_backend_refused() {
    let mut config = common::proxy_config(common::unused_addr().await);
    config.backend.address = "192.0.2.10:8318".to_string();
    let server = ProxyServer::new(config);

    let err = server.start().await.unwrap_err();
    assert!(matches!(err, ServerError::BackendNotLoopback(_)));
    assert!(!server.is_running());
}

#[tokio::test]
async fn test_stop_closes_idle_connections() {
    let backend = common::unused_addr().await;
    let server = ProxyServer::new(common::proxy_config(backend));
    let addr = server.start().await.unwrap();

    let mut idle = TcpStream::connect(addr).await.unwrap();
    wait_for_connections(&server, 1).await;

    tokio::time::timeout(Duration::from_secs(3), server.stop())
        .await
        .expect("stop did not finish");
    assert_eq!(server.active_connections(), 0);
    assert_eq!(server.accepted_connections(), 1);

    let mut buf = [0u8; 16];
    let read = tokio::time::timeout(Duration::from_secs(2), idle.read(&mut buf))
        .await
        .expect("idle connection was not closed");
    assert!(matches!(read, Ok(0) | Err(_)));
}

#[tokio::test]
async fn test_restart_after_stop() {
    let (backend, _captured) = common::start_mock_backend("{}").await;
    let server = ProxyServer::new(common::proxy_config(backend));

    server.start().await.unwrap();
    server.stop().await;

    let addr = server.start().await.unwrap();
    assert!(server.is_running());

    let response = common::send_raw(addr, &common::post("/v1/messages", "{}")).await;
    assert!(response.starts_with(b"HTTP/1.1 200 OK\r\n"));

    server.stop().await;
}

#[tokio::test]
async fn test_drop_shuts_down_listener() {
    let backend = common::unused_addr().await;
    let server = ProxyServer::new(common::proxy_config(backend));
    let addr = server.start().await.unwrap();

    drop(server);

    tokio::time::timeout(Duration::from_secs(2), async {
        while TcpStream::connect(addr).await.is_ok() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("listener still accepting after drop");
}
