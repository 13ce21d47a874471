//! Shared fixtures for the integration tests
//!
//! [`FileServer`] is a minimal HTTP/1.1 file host on a raw socket. Unlike a
//! mock server it can honour or ignore `Range` headers and cut a response off
//! mid-body, which is what the resume paths need.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use hb_fetcher::app::{DownloadConfig, DownloadEngine, HashPolicy, HashStore, RetryPolicy};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use url::Url;

#[derive(Default)]
struct ServerState {
    files: Mutex<HashMap<String, Vec<u8>>>,
    ignore_range: AtomicBool,
    cut_at: Mutex<Option<usize>>,
    stall_at: Mutex<Option<usize>>,
    stalled: AtomicUsize,
    gets: AtomicUsize,
    ranges: Mutex<Vec<Option<u64>>>,
}

/// Test file host
pub struct FileServer {
    addr: SocketAddr,
    state: Arc<ServerState>,
    handle: JoinHandle<()>,
}

impl FileServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(ServerState::default());

        let handle = {
            let state = Arc::clone(&state);
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let state = Arc::clone(&state);
                    tokio::spawn(async move {
                        let _ = serve(stream, &state).await;
                    });
                }
            })
        };

        Self {
            addr,
            state,
            handle,
        }
    }

    /// Serve `body` at `path`
    pub fn add_file(&self, path: &str, body: Vec<u8>) {
        self.state
            .files
            .lock()
            .unwrap()
            .insert(path.to_string(), body);
    }

    pub fn url(&self, path: &str) -> Url {
        Url::parse(&format!("http://{}{}", self.addr, path)).unwrap()
    }

    /// Answer range requests with the whole file
    pub fn set_ignore_range(&self, ignore: bool) {
        self.state.ignore_range.store(ignore, Ordering::SeqCst);
    }

    /// Close every response once the body reaches byte `cut`
    pub fn set_cut_at(&self, cut: Option<usize>) {
        *self.state.cut_at.lock().unwrap() = cut;
    }

    /// Hold every response open, without sending more, once the body reaches byte `stall`
    pub fn set_stall_at(&self, stall: Option<usize>) {
        *self.state.stall_at.lock().unwrap() = stall;
    }

    /// Wait until a response has stalled
    pub async fn wait_for_stall(&self) {
        while self.state.stalled.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// GET requests received so far
    pub fn gets(&self) -> usize {
        self.state.gets.load(Ordering::SeqCst)
    }

    /// Range start of each request, `None` for a plain GET
    pub fn ranges(&self) -> Vec<Option<u64>> {
        self.state.ranges.lock().unwrap().clone()
    }
}

impl Drop for FileServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve(mut stream: TcpStream, state: &ServerState) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let request = String::from_utf8_lossy(&buf).to_string();
    let mut lines = request.lines();
    let path = lines
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/")
        .to_string();
    let range = lines
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("range"))
        .and_then(|(_, value)| {
            value
                .trim()
                .strip_prefix("bytes=")?
                .trim_end_matches('-')
                .parse::<u64>()
                .ok()
        });

    state.gets.fetch_add(1, Ordering::SeqCst);
    state.ranges.lock().unwrap().push(range);

    let body = state.files.lock().unwrap().get(&path).cloned();
    let Some(body) = body else {
        stream
            .write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
            .await?;
        return stream.shutdown().await;
    };

    let len = body.len();
    let start = match range {
        Some(start) if !state.ignore_range.load(Ordering::SeqCst) => start as usize,
        _ => 0,
    };

    if start >= len && start > 0 {
        let head = format!(
            "HTTP/1.1 416 Range Not Satisfiable\r\nContent-Range: bytes */{}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            len
        );
        stream.write_all(head.as_bytes()).await?;
        return stream.shutdown().await;
    }

    let head = if start > 0 {
        format!(
            "HTTP/1.1 206 Partial Content\r\nContent-Range: bytes {}-{}/{}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            start,
            len - 1,
            len,
            len - start
        )
    } else {
        format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nAccept-Ranges: bytes\r\nConnection: close\r\n\r\n",
            len
        )
    };
    stream.write_all(head.as_bytes()).await?;

    let stall = *state.stall_at.lock().unwrap();
    if let Some(stall) = stall {
        stream.write_all(&body[start..stall.clamp(start, len)]).await?;
        stream.flush().await?;
        state.stalled.fetch_add(1, Ordering::SeqCst);
        std::future::pending::<()>().await;
    }

    let cut = *state.cut_at.lock().unwrap();
    let end = cut.map(|c| c.clamp(start, len)).unwrap_or(len);
    stream.write_all(&body[start..end]).await?;
    stream.flush().await?;
    stream.shutdown().await
}

/// Canned response for [`ScriptedServer`]
#[derive(Debug, Clone)]
pub struct Canned {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Canned {
    pub fn status(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn ok(body: Vec<u8>) -> Self {
        Self {
            body,
            ..Self::status(200)
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

/// Answers requests with a fixed sequence of responses; the last one repeats
pub struct ScriptedServer {
    addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

impl ScriptedServer {
    pub async fn start(script: Vec<Canned>) -> Self {
        assert!(!script.is_empty());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));

        let handle = {
            let hits = Arc::clone(&hits);
            tokio::spawn(async move {
                while let Ok((mut stream, _)) = listener.accept().await {
                    let index = hits.fetch_add(1, Ordering::SeqCst).min(script.len() - 1);
                    let canned = script[index].clone();
                    tokio::spawn(async move {
                        let _ = respond(&mut stream, &canned).await;
                    });
                }
            })
        };

        Self { addr, hits, handle }
    }

    pub fn url(&self, path: &str) -> Url {
        Url::parse(&format!("http://{}{}", self.addr, path)).unwrap()
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

impl Drop for ScriptedServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn respond(stream: &mut TcpStream, canned: &Canned) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let mut head = format!(
        "HTTP/1.1 {} Scripted\r\nContent-Length: {}\r\nConnection: close\r\n",
        canned.status,
        canned.body.len()
    );
    for (name, value) in &canned.headers {
        head.push_str(&format!("{}: {}\r\n", name, value));
    }
    head.push_str("\r\n");

    stream.write_all(head.as_bytes()).await?;
    stream.write_all(&canned.body).await?;
    stream.flush().await?;
    stream.shutdown().await
}

/// Deterministic pseudo-random content
pub fn content(len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i * 31 + 7) % 251) as u8).collect()
}

/// Retry policy with delays short enough for tests
pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::default()
        .with_max_attempts(max_attempts)
        .with_base_delay(Duration::from_millis(10))
}

pub fn download_config(policy: HashPolicy) -> DownloadConfig {
    DownloadConfig::default()
        .with_chunk_size(128)
        .with_retry(fast_retry(3))
        .with_hash_policy(policy)
        .with_read_timeout(Duration::from_secs(5))
}

/// Engine over `root` with its hash index in the default place
pub async fn engine(root: &std::path::Path, config: DownloadConfig) -> DownloadEngine {
    let store = HashStore::open(HashStore::default_index_path(root))
        .await
        .unwrap();
    DownloadEngine::new(reqwest::Client::new(), Arc::new(store), root, config)
}
