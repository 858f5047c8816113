//! Shared helpers for egress integration tests

#![allow(dead_code)]

use std::time::Duration;
use studybot_core::{StreamError, StreamHandler};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
};

pub const EXAMPLE_BODY: &str = "event: message\ndata: {\"reply\":\"Hi\"}\n\n\
                                event: message\ndata: {\"reply\":\" there\"}\n\n\
                                event: message\ndata: {\"reply\":\"\"}\n\n";

/// Handler that records every callback
#[derive(Debug, Default)]
pub struct Recorder {
    pub chunks: Vec<String>,
    pub done: usize,
    pub errors: Vec<StreamError>,
}

impl Recorder {
    pub fn text(&self) -> String {
        self.chunks.concat()
    }

    pub fn terminal_count(&self) -> usize {
        self.done + self.errors.len()
    }
}

impl StreamHandler for Recorder {
    fn on_chunk(&mut self, text: &str) {
        self.chunks.push(text.to_string());
    }

    fn on_done(&mut self) {
        self.done += 1;
    }

    fn on_error(&mut self, error: StreamError) {
        self.errors.push(error);
    }
}

/// One-shot HTTP/1.1 server writing the body in separate TCP writes
///
/// The response has no content length; the body ends when the connection
/// closes. Each chunk is written after its delay so the client observes it as
/// a separate read.
pub async fn serve_chunks(status: u16, chunks: Vec<(Vec<u8>, Duration)>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };

        read_request(&mut socket).await;

        let head = format!(
            "HTTP/1.1 {} Test\r\nContent-Type: text/event-stream\r\nConnection: close\r\n\r\n",
            status
        );
        if socket.write_all(head.as_bytes()).await.is_err() {
            return;
        }
        let _ = socket.flush().await;

        for (bytes, delay) in chunks {
            tokio::time::sleep(delay).await;
            if socket.write_all(&bytes).await.is_err() {
                return;
            }
            let _ = socket.flush().await;
        }

        let _ = socket.shutdown().await;
    });

    format!("http://{}", addr)
}

/// Base URL of a local port with nothing listening on it
///
/// The port is reserved by binding and then released, so connecting to it is
/// refused.
pub fn refused_base_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

/// Convenience wrapper for text chunks with a fixed delay between writes
pub async fn serve_text_chunks(chunks: &[&str], delay: Duration) -> String {
    let chunks = chunks
        .iter()
        .map(|chunk| (chunk.as_bytes().to_vec(), delay))
        .collect();
    serve_chunks(200, chunks).await
}

/// Consume the request head and its content-length body
async fn read_request(socket: &mut tokio::net::TcpStream) {
    let mut received = Vec::new();
    let mut buf = [0u8; 4096];

    loop {
        let Ok(n) = socket.read(&mut buf).await else {
            return;
        };
        if n == 0 {
            return;
        }
        received.extend_from_slice(&buf[..n]);

        let Some(head_end) = find(&received, b"\r\n\r\n") else {
            continue;
        };

        let head = String::from_utf8_lossy(&received[..head_end]).to_ascii_lowercase();
        let content_length = head
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|value| value.trim().parse::<usize>().ok())
            .unwrap_or(0);

        if received.len() >= head_end + 4 + content_length {
            return;
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
