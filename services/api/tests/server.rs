mod common;

use common::{config, spawn_app_with};
use item_service::server;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn serves_then_drains_background_work_on_shutdown() {
    let app = spawn_app_with(config(&[]));
    let state = app.state.clone();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    let server = tokio::spawn(server::run(listener, state.clone(), shutdown.clone()));

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /v1/healthcheck HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    assert!(response.contains("\"status\": \"available\""));

    let finished = Arc::new(AtomicBool::new(false));
    let flag = finished.clone();
    state.background(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        flag.store(true, Ordering::SeqCst);
    });

    shutdown.cancel();
    server.await.unwrap().unwrap();
    assert!(finished.load(Ordering::SeqCst));
}

#[tokio::test]
async fn signal_listener_stops_with_the_server() {
    let shutdown = CancellationToken::new();
    let listener = tokio::spawn(server::shutdown_on_signal(shutdown.clone()));

    shutdown.cancel();
    listener.await.unwrap().unwrap();
}
