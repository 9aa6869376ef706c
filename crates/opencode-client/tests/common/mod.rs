//! Minimal SSE server for exercising the event stream over real sockets.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// What the server does with one accepted connection
#[derive(Debug, Clone)]
pub enum Script {
    /// Answer 200 and send each payload as one `data:` event; then either
    /// close or hold the connection until the client goes away
    Serve { events: Vec<String>, keep_open: bool },
    /// Answer with an error status and close
    Reject(u16),
}

impl Script {
    pub fn open(events: Vec<String>) -> Self {
        Self::Serve {
            events,
            keep_open: true,
        }
    }

    pub fn closing(events: Vec<String>) -> Self {
        Self::Serve {
            events,
            keep_open: false,
        }
    }
}

pub struct SseServer {
    addr: SocketAddr,
    live: Arc<AtomicUsize>,
    accepted: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

impl SseServer {
    /// Connection `n` follows `scripts[n]`; later ones repeat the last script
    pub async fn start(scripts: Vec<Script>) -> Self {
        assert!(!scripts.is_empty());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let live = Arc::new(AtomicUsize::new(0));
        let accepted = Arc::new(AtomicUsize::new(0));

        let handle = {
            let live = Arc::clone(&live);
            let accepted = Arc::clone(&accepted);
            tokio::spawn(async move {
                loop {
                    let Ok((socket, _)) = listener.accept().await else {
                        return;
                    };
                    let n = accepted.fetch_add(1, Ordering::SeqCst);
                    let script = scripts[n.min(scripts.len() - 1)].clone();
                    tokio::spawn(serve(socket, script, Arc::clone(&live)));
                }
            })
        };

        Self {
            addr,
            live,
            accepted,
            handle,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Streams currently held open by a client
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }
}

impl Drop for SseServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve(mut socket: TcpStream, script: Script, live: Arc<AtomicUsize>) {
    let mut request = Vec::new();
    let mut chunk = [0u8; 1024];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => request.extend_from_slice(&chunk[..n]),
        }
    }

    match script {
        Script::Reject(status) => {
            let head = format!(
                "HTTP/1.1 {} Error\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                status
            );
            let _ = socket.write_all(head.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
        Script::Serve { events, keep_open } => {
            live.fetch_add(1, Ordering::SeqCst);

            let head = "HTTP/1.1 200 OK\r\n\
                        Content-Type: text/event-stream\r\n\
                        Cache-Control: no-cache\r\n\
                        Connection: close\r\n\r\n";
            let mut ok = socket.write_all(head.as_bytes()).await.is_ok();
            for event in events {
                if !ok {
                    break;
                }
                ok = socket
                    .write_all(format!("data: {}\n\n", event).as_bytes())
                    .await
                    .is_ok();
                let _ = socket.flush().await;
            }

            if keep_open && ok {
                // Held until the client hangs up
                loop {
                    match socket.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(_) => continue,
                    }
                }
            } else {
                let _ = socket.shutdown().await;
            }

            live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// Poll `condition` until it holds or `timeout` passes
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

pub fn delta(session_id: &str, message_id: &str, delta: &str) -> String {
    serde_json::json!({
        "type": "message.part.delta",
        "properties": {"sessionID": session_id, "messageID": message_id, "delta": delta}
    })
    .to_string()
}

pub fn idle(session_id: &str) -> String {
    serde_json::json!({"type": "session.idle", "properties": {"sessionID": session_id}})
        .to_string()
}

pub fn error_without_message(session_id: &str) -> String {
    serde_json::json!({"type": "session.error", "properties": {"sessionID": session_id}})
        .to_string()
}
