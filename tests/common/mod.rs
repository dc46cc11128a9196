//! Shared utilities for integration testing.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tamper_proxy::config::ProxyConfig;
use tamper_proxy::http::MessageParser;
use tamper_proxy::net::Listener;
use tamper_proxy::{Shutdown, TamperServer};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

/// Read one full request from `socket`, returning its raw bytes.
pub async fn read_request(socket: &mut TcpStream) -> Vec<u8> {
    let mut parser = MessageParser::request();
    let mut raw = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = socket.read(&mut buf).await.unwrap();
        if n == 0 {
            return raw;
        }
        raw.extend_from_slice(&buf[..n]);
        parser.add_data(&buf[..n]);
        if parser.is_complete().unwrap() {
            return raw;
        }
    }
}

/// Start a mock upstream that answers every request with `response` and closes.
/// Each raw request received is sent on the returned channel.
pub async fn start_mock_backend(
    response: &'static [u8],
) -> (SocketAddr, mpsc::UnboundedReceiver<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        let request = read_request(&mut socket).await;
                        let _ = tx.send(request);
                        let _ = socket.write_all(response).await;
                        let _ = socket.shutdown().await;
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    (addr, rx)
}

/// An address nothing is listening on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// A running proxy in front of `upstream`.
pub struct RunningProxy {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub task: tokio::task::JoinHandle<()>,
}

/// Start a proxy on an ephemeral port, adjusting the default config with `tweak`.
pub async fn start_proxy(upstream: SocketAddr, tweak: impl FnOnce(&mut ProxyConfig)) -> RunningProxy {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.upstream.host = upstream.ip().to_string();
    config.upstream.port = upstream.port();
    config.timeouts.request_secs = 5;
    tweak(&mut config);

    let server = TamperServer::new(&config).unwrap();
    let listener = Listener::bind(&config.listener).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    let task = tokio::spawn(async move {
        server.run(listener, server_shutdown).await.unwrap();
    });

    RunningProxy { addr, shutdown, task }
}

/// Send `request` through the proxy and read everything it sends back.
///
/// A proxy that gives up before reading the request closes a socket with
/// unread data, which the peer sees as a reset. That counts as a close here.
pub async fn send(proxy: SocketAddr, request: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(proxy).await.unwrap();
    if let Err(e) = stream.write_all(request).await {
        assert!(is_disconnect(&e), "write failed: {e}");
        return Vec::new();
    }

    let mut response = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let read = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buf))
            .await
            .expect("proxy did not close the connection");
        match read {
            Ok(0) => return response,
            Ok(n) => response.extend_from_slice(&buf[..n]),
            Err(e) if is_disconnect(&e) => return response,
            Err(e) => panic!("read failed: {e}"),
        }
    }
}

fn is_disconnect(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset | io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionAborted
    )
}
