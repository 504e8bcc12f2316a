use std::{net::SocketAddr, path::PathBuf, time::Duration};

use futures_util::SinkExt;
use metrics_exporter_prometheus::PrometheusBuilder;
use qr_share::config::ServerConfig;
use qr_share_core::{LifecycleConfig, ShutdownReason};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    task::JoinHandle,
    time::Instant,
};
use tokio_tungstenite::{connect_async, tungstenite::Message};

const GRACE: Duration = Duration::from_millis(300);

fn config(file: PathBuf) -> ServerConfig {
    ServerConfig {
        file,
        listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        advertise_host: Some("127.0.0.1".to_string()),
        lifecycle: LifecycleConfig::default(),
        shutdown_grace: GRACE,
        open_browser: false,
    }
}

async fn start(file: PathBuf) -> (SocketAddr, JoinHandle<anyhow::Result<ShutdownReason>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let metrics = PrometheusBuilder::new().build_recorder().handle();
    let server = tokio::spawn(qr_share::serve(listener, config(file), metrics));
    (addr, server)
}

#[test_timeout::tokio_timeout_test]
async fn explicit_close_makes_serve_return() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.txt");
    std::fs::write(&path, b"hello").unwrap();
    let (addr, server) = start(path).await;

    let (mut ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    ws.send(Message::text("heartbeat")).await.unwrap();
    ws.send(Message::text("close")).await.unwrap();

    let started = Instant::now();
    let reason = server.await.unwrap().unwrap();
    assert_eq!(reason, ShutdownReason::ExplicitClose);
    assert!(started.elapsed() < GRACE, "returned only after {:?}", started.elapsed());

    // Nothing is listening any more.
    assert!(connect_async(format!("ws://{addr}/ws")).await.is_err());
}

#[test_timeout::tokio_timeout_test]
async fn stalled_download_does_not_outlive_shutdown_grace() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("big.bin");
    std::fs::write(&path, vec![0u8; 64 * 1024 * 1024]).unwrap();
    let (addr, server) = start(path).await;

    // Start a download and stop reading once the response has begun.
    let mut download = TcpStream::connect(addr).await.unwrap();
    download
        .write_all(b"GET /big.bin HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await
        .unwrap();
    let mut head = [0u8; 64];
    let read = download.read(&mut head).await.unwrap();
    assert!(head[..read].starts_with(b"HTTP/1.1 200"));

    let (mut ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    let closed_at = Instant::now();
    ws.send(Message::text("close")).await.unwrap();

    let reason = server.await.unwrap().unwrap();
    assert_eq!(reason, ShutdownReason::ExplicitClose);
    assert!(
        closed_at.elapsed() >= GRACE,
        "returned before the grace period: {:?}",
        closed_at.elapsed()
    );
    drop(download);
}
