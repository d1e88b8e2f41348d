//! Helpers shared by the integration tests

#![allow(dead_code)]

use std::{env, path::PathBuf};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
    task::JoinHandle,
};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A path under the temp directory that nothing else is using
pub fn unique_temp_path(label: &str) -> PathBuf {
    env::temp_dir().join(format!(
        "minibox-test-{}-{}-{}",
        label,
        std::process::id(),
        rand::random::<u64>()
    ))
}

/// One canned HTTP response
pub struct Reply {
    pub status: u16,
    pub body: &'static str,
}

/// Serve each reply in order, one connection per request
///
/// Returns the base URL and a task that resolves to the raw text of every
/// request received.
pub async fn serve(replies: Vec<Reply>) -> (String, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let task = tokio::spawn(async move {
        let mut requests = Vec::new();
        for reply in replies {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let len = stream.read(&mut buf).await.unwrap();
                if len == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..len]);
            }
            requests.push(String::from_utf8_lossy(&request).into_owned());
            let response = format!(
                "HTTP/1.1 {} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                reply.status,
                reply.body.len(),
                reply.body
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.unwrap();
        }
        requests
    });
    (base, task)
}

/// A local URL where nothing is listening
pub async fn closed_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);
    base
}
