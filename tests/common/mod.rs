//! Shared helpers for integration tests

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use aiorg::chat::{ChatEvents, Message};
use aiorg::error::ErrorKind;

/// One step of a scripted chunked response
#[allow(dead_code)]
pub enum Part {
    /// Write these bytes as a single HTTP chunk
    Bytes(Vec<u8>),
    /// Pause before the next step
    Pause(Duration),
}

#[allow(dead_code)]
impl Part {
    pub fn text(text: &str) -> Self {
        Self::Bytes(text.as_bytes().to_vec())
    }
}

/// Builds one NDJSON record, newline included
#[allow(dead_code)]
pub fn ndjson(content: &str, done: bool) -> String {
    let mut line = json!({
        "model": "llama3.2:latest",
        "created_at": "2024-05-01T10:00:00Z",
        "message": {"role": "assistant", "content": content},
        "done": done
    })
    .to_string();
    line.push('\n');
    line
}

/// Serves a single request with a chunked body written piece by piece
///
/// When `close` is false the connection stays open after the last part, so
/// the client sees a stalled stream. Returns the base URL.
#[allow(dead_code)]
pub async fn chunked_server(parts: Vec<Part>, close: bool) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        read_request(&mut stream).await;

        stream
            .write_all(
                b"HTTP/1.1 200 OK\r\n\
                  Content-Type: application/x-ndjson\r\n\
                  Transfer-Encoding: chunked\r\n\r\n",
            )
            .await
            .unwrap();

        for part in parts {
            match part {
                Part::Bytes(bytes) => {
                    let mut chunk = format!("{:x}\r\n", bytes.len()).into_bytes();
                    chunk.extend_from_slice(&bytes);
                    chunk.extend_from_slice(b"\r\n");
                    if stream.write_all(&chunk).await.is_err() {
                        return;
                    }
                    let _ = stream.flush().await;
                }
                Part::Pause(duration) => tokio::time::sleep(duration).await,
            }
        }

        if close {
            let _ = stream.write_all(b"0\r\n\r\n").await;
            let _ = stream.flush().await;
        } else {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
    });

    format!("http://{}", addr)
}

/// Reads request headers and the body announced by `Content-Length`
async fn read_request(stream: &mut tokio::net::TcpStream) {
    let mut received = Vec::new();
    let mut buf = [0u8; 4096];

    loop {
        let n = stream.read(&mut buf).await.unwrap();
        if n == 0 {
            return;
        }
        received.extend_from_slice(&buf[..n]);

        let Some(header_end) = received.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let headers = String::from_utf8_lossy(&received[..header_end]).to_lowercase();
        let length = headers
            .lines()
            .find_map(|l| l.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        if received.len() >= header_end + 4 + length {
            return;
        }
    }
}

/// Base URL of a port nothing listens on
#[allow(dead_code)]
pub async fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(dead_code)]
pub enum Event {
    Chunk(String),
    Complete(String),
    Error(ErrorKind, String),
    Cancelled,
}

/// Records session events for assertions
#[derive(Clone, Default)]
#[allow(dead_code)]
pub struct Recorder(Arc<Mutex<Vec<Event>>>);

#[allow(dead_code)]
impl Recorder {
    pub fn events(&self) -> Vec<Event> {
        self.0.lock().unwrap().clone()
    }

    pub fn chunks(&self) -> String {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Chunk(delta) => Some(delta),
                _ => None,
            })
            .collect()
    }
}

impl ChatEvents for Recorder {
    fn on_chunk(&mut self, delta: &str) {
        self.0.lock().unwrap().push(Event::Chunk(delta.to_string()));
    }

    fn on_complete(&mut self, message: &Message) {
        self.0
            .lock()
            .unwrap()
            .push(Event::Complete(message.content.clone()));
    }

    fn on_error(&mut self, kind: ErrorKind, message: &str) {
        self.0
            .lock()
            .unwrap()
            .push(Event::Error(kind, message.to_string()));
    }

    fn on_cancelled(&mut self) {
        self.0.lock().unwrap().push(Event::Cancelled);
    }
}
