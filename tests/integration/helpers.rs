//! Shared helpers for integration tests.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mica::{App, Catalog, ChatEvent, MicaConfig, ModelCategory, ModelDescriptor, Orchestrator, ScriptedEngine};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

/// Descriptor for a model served at `base_url/{id}.gguf`.
pub(crate) fn descriptor(base_url: &str, id: &str) -> ModelDescriptor {
    ModelDescriptor {
        id: id.to_owned(),
        display_name: id.to_owned(),
        category: ModelCategory::Fast,
        url: format!("{base_url}/{id}.gguf"),
        file_name: format!("{id}.gguf"),
        size_mb: 1,
        context_length: 4096,
        ram_mb: 64,
        sha256: None,
    }
}

/// Config rooted at `dir` with short debounce and no throttle.
pub(crate) fn test_config(dir: &Path) -> MicaConfig {
    let mut config = MicaConfig::with_data_dir(dir);
    config.chat.save_debounce_ms = 50;
    config.chat.min_generation_interval_ms = 0;
    config
}

/// App whose single model `tiny` is already on disk and active.
pub(crate) fn local_app(config: MicaConfig) -> App {
    let models = config.storage.models_dir();
    std::fs::create_dir_all(&models).expect("create models dir");
    std::fs::write(models.join("tiny.gguf"), b"weights").expect("write model file");

    let catalog = Catalog::new(vec![descriptor("http://127.0.0.1:9", "tiny")]);
    let app = App::with_catalog(config, catalog).expect("open app");
    app.active_model()
        .set(Some("tiny".into()))
        .expect("set active model");
    app
}

/// Orchestrator over a fresh scripted engine with the active model loaded.
pub(crate) async fn ready_chat(app: &App, engine: ScriptedEngine) -> (Orchestrator, Arc<ScriptedEngine>) {
    let engine = Arc::new(engine);
    let mut chat = app.orchestrator(engine.clone());
    chat.sync_active_model().await.expect("load active model");
    (chat, engine)
}

/// Drain all pending events from the broadcast receiver into a Vec.
pub(crate) fn drain_events(rx: &mut broadcast::Receiver<ChatEvent>) -> Vec<ChatEvent> {
    let mut events = Vec::new();
    while let Ok(evt) = rx.try_recv() {
        events.push(evt);
    }
    events
}

/// HTTP server that stalls the first full response after `stall_after`
/// bytes and answers range requests with `206 Partial Content`.
///
/// Every request head is recorded (lowercased) so tests can inspect the
/// `Range` and `If-Range` headers.
pub(crate) struct StallingServer {
    pub(crate) base_url: String,
    pub(crate) requests: Arc<Mutex<Vec<String>>>,
}

pub(crate) const ETAG: &str = "\"v1\"";

pub(crate) async fn stalling_server(body: &'static [u8], stall_after: usize) -> StallingServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let requests = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&requests);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let log = Arc::clone(&log);
            tokio::spawn(async move {
                let head = read_head(&mut socket).await;
                log.lock().unwrap().push(head.clone());

                match range_start(&head) {
                    Some(start) => {
                        let rest = &body[start..];
                        let response = format!(
                            "HTTP/1.1 206 Partial Content\r\nContent-Length: {}\r\n\
                             Content-Range: bytes {start}-{}/{}\r\nETag: {ETAG}\r\n\
                             Connection: close\r\n\r\n",
                            rest.len(),
                            body.len() - 1,
                            body.len()
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.write_all(rest).await;
                        let _ = socket.shutdown().await;
                    }
                    None => {
                        let response = format!(
                            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nETag: {ETAG}\r\n\
                             Accept-Ranges: bytes\r\n\r\n",
                            body.len()
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.write_all(&body[..stall_after]).await;
                        let _ = socket.flush().await;
                        tokio::time::sleep(Duration::from_secs(30)).await;
                    }
                }
            });
        }
    });

    StallingServer {
        base_url: format!("http://{addr}"),
        requests,
    }
}

async fn read_head(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0_u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
    String::from_utf8_lossy(&buf).to_lowercase()
}

fn range_start(head: &str) -> Option<usize> {
    let line = head.lines().find(|l| l.starts_with("range:"))?;
    let range = line.split("bytes=").nth(1)?;
    range.trim().trim_end_matches('-').parse().ok()
}
