//! Companion capture server
//!
//! The test binary connects to `127.0.0.1:<port>` and sends one JSON request
//! per line. Capture payloads are opaque: they are compared with the stored
//! baseline by SHA-256 and never decoded.
//!
//! ```text
//! -> {"method":"ping","id":1}
//! <- {"id":1,"ok":true}
//! -> {"method":"match_snapshot","id":2,"path":"css/a.html","index":"0","data":"<base64>"}
//! <- {"id":2,"ok":true,"matched":true}
//! ```

use std::future::Future;
use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::{JoinError, JoinSet};
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use tracing::{debug, info, warn};

use crate::error::{E2eError, E2eResult};

/// Upper bound for one request line (base64 payloads are large)
pub const MAX_LINE_BYTES: usize = 64 * 1024 * 1024;

/// How long open connections may keep working after shutdown is requested
pub const CONNECTION_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Window for accepting connections already queued at shutdown
const LATE_ACCEPT_WINDOW: Duration = Duration::from_millis(100);

/// A request from the test binary
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum CaptureRequest {
    Ping {
        id: u64,
    },
    MatchSnapshot {
        id: u64,
        path: String,
        #[serde(default)]
        index: Option<String>,
        /// Base64 capture payload
        data: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureResponse {
    pub id: Option<u64>,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub matched: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

impl CaptureResponse {
    fn ok(id: u64) -> Self {
        Self {
            id: Some(id),
            ok: true,
            matched: None,
            error: None,
        }
    }

    fn matched(id: u64, matched: bool) -> Self {
        Self {
            matched: Some(matched),
            ..Self::ok(id)
        }
    }

    fn error(id: Option<u64>, error: impl Into<String>) -> Self {
        Self {
            id,
            ok: false,
            matched: None,
            error: Some(error.into()),
        }
    }
}

/// What happened to one capture
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotOutcome {
    /// No baseline existed; the capture became the baseline
    Created(PathBuf),
    Matched(PathBuf),
    /// Differed, and the baseline was overwritten
    Updated(PathBuf),
    /// Differed; the capture was written next to the baseline
    Mismatched { baseline: PathBuf, actual: PathBuf },
}

impl SnapshotOutcome {
    pub fn is_match(&self) -> bool {
        !matches!(self, SnapshotOutcome::Mismatched { .. })
    }
}

/// Baseline storage under the snapshot directory
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
    update_baselines: bool,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>, update_baselines: bool) -> Self {
        Self {
            dir: dir.into(),
            update_baselines,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<dir>/<path>[.<index>].png`; `None` if `path` would escape the directory
    pub fn baseline_path(&self, path: &str, index: Option<&str>) -> Option<PathBuf> {
        let relative = Path::new(path);
        let contained = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if path.is_empty() || !contained {
            return None;
        }
        if index.is_some_and(|i| i.contains(['/', '\\'])) {
            return None;
        }
        let file = match index {
            Some(index) => format!("{path}.{index}.png"),
            None => format!("{path}.png"),
        };
        Some(self.dir.join(file))
    }

    /// Compare one payload with its baseline
    pub async fn check(&self, path: &str, index: Option<&str>, payload: &[u8]) -> E2eResult<SnapshotOutcome> {
        let baseline = self
            .baseline_path(path, index)
            .ok_or_else(|| E2eError::CaptureServer(format!("invalid snapshot path '{path}'")))?;
        if let Some(parent) = baseline.parent() {
            fs::create_dir_all(parent).await?;
        }

        let existing = match fs::read(&baseline).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                fs::write(&baseline, payload).await?;
                info!("Created baseline {}", baseline.display());
                return Ok(SnapshotOutcome::Created(baseline));
            }
            Err(e) => return Err(e.into()),
        };

        if digest(&existing) == digest(payload) {
            debug!("Snapshot matches {}", baseline.display());
            return Ok(SnapshotOutcome::Matched(baseline));
        }

        if self.update_baselines {
            fs::write(&baseline, payload).await?;
            info!("Updated baseline {}", baseline.display());
            return Ok(SnapshotOutcome::Updated(baseline));
        }

        let actual = baseline.with_extension("current.png");
        fs::write(&actual, payload).await?;
        warn!("Snapshot mismatch: {} (actual at {})", baseline.display(), actual.display());
        Ok(SnapshotOutcome::Mismatched { baseline, actual })
    }
}

fn digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Counters for one session
#[derive(Debug, Default)]
pub struct CaptureStats {
    received: AtomicUsize,
    matched: AtomicUsize,
    mismatched: AtomicUsize,
    created: AtomicUsize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CaptureSummary {
    pub received: usize,
    pub matched: usize,
    pub mismatched: usize,
    pub created: usize,
}

impl CaptureStats {
    fn record(&self, outcome: &SnapshotOutcome) {
        self.received.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            SnapshotOutcome::Created(_) => &self.created,
            SnapshotOutcome::Matched(_) | SnapshotOutcome::Updated(_) => &self.matched,
            SnapshotOutcome::Mismatched { .. } => &self.mismatched,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn summary(&self) -> CaptureSummary {
        CaptureSummary {
            received: self.received.load(Ordering::Relaxed),
            matched: self.matched.load(Ordering::Relaxed),
            mismatched: self.mismatched.load(Ordering::Relaxed),
            created: self.created.load(Ordering::Relaxed),
        }
    }
}

/// Bound capture server, not yet accepting
pub struct CaptureServer {
    listener: TcpListener,
    store: Arc<SnapshotStore>,
    stats: Arc<CaptureStats>,
}

impl CaptureServer {
    pub fn new(listener: TcpListener, store: SnapshotStore) -> Self {
        Self {
            listener,
            store: Arc::new(store),
            stats: Arc::new(CaptureStats::default()),
        }
    }

    pub async fn bind(addr: SocketAddr, store: SnapshotStore) -> std::io::Result<Self> {
        Ok(Self::new(TcpListener::bind(addr).await?, store))
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn stats(&self) -> Arc<CaptureStats> {
        Arc::clone(&self.stats)
    }

    /// Accept loop that runs until an accept failure
    pub async fn serve(self) -> E2eResult<()> {
        self.serve_until(std::future::pending()).await
    }

    /// Accept loop; each connection gets its own task.
    ///
    /// Once `shutdown` resolves, connections already queued are still
    /// accepted and every open connection is drained (bounded by
    /// [`CONNECTION_DRAIN_TIMEOUT`]) before returning, so all payloads the
    /// test binary sent are on disk and counted.
    pub async fn serve_until<F>(self, shutdown: F) -> E2eResult<()>
    where
        F: Future<Output = ()>,
    {
        info!("Capture server listening on {}", self.listener.local_addr()?);
        let mut connections = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;
                accepted = self.listener.accept() => {
                    let (stream, peer) =
                        accepted.map_err(|e| E2eError::CaptureServer(format!("accept failed: {e}")))?;
                    self.spawn_connection(&mut connections, stream, peer);
                }
                Some(joined) = connections.join_next() => log_join(joined),
                _ = &mut shutdown => break,
            }
        }

        while let Ok(Ok((stream, peer))) = tokio::time::timeout(LATE_ACCEPT_WINDOW, self.listener.accept()).await {
            self.spawn_connection(&mut connections, stream, peer);
        }

        if !connections.is_empty() {
            debug!("Draining {} capture connection(s)", connections.len());
        }
        let drain = async {
            while let Some(joined) = connections.join_next().await {
                log_join(joined);
            }
        };
        if tokio::time::timeout(CONNECTION_DRAIN_TIMEOUT, drain).await.is_err() {
            warn!("Capture connections still open after {:?}, dropping them", CONNECTION_DRAIN_TIMEOUT);
            connections.shutdown().await;
        }
        Ok(())
    }

    fn spawn_connection(&self, connections: &mut JoinSet<()>, stream: TcpStream, peer: SocketAddr) {
        debug!("Capture connection from {}", peer);
        let store = Arc::clone(&self.store);
        let stats = Arc::clone(&self.stats);
        connections.spawn(async move {
            if let Err(e) = handle_connection(stream, &store, &stats).await {
                warn!("Capture connection {} closed with error: {}", peer, e);
            }
        });
    }
}

fn log_join(joined: Result<(), JoinError>) {
    if let Err(e) = joined {
        warn!("Capture connection task failed: {}", e);
    }
}

async fn handle_connection(stream: TcpStream, store: &SnapshotStore, stats: &CaptureStats) -> E2eResult<()> {
    let mut framed = Framed::new(stream, LinesCodec::new_with_max_length(MAX_LINE_BYTES));

    while let Some(line) = framed.next().await {
        let response = match line {
            Ok(line) if line.trim().is_empty() => continue,
            Ok(line) => handle_line(&line, store, stats).await,
            Err(LinesCodecError::MaxLineLengthExceeded) => {
                CaptureResponse::error(None, format!("request exceeds {MAX_LINE_BYTES} bytes"))
            }
            Err(LinesCodecError::Io(e)) => return Err(e.into()),
        };
        let encoded = serde_json::to_string(&response)?;
        framed
            .send(encoded)
            .await
            .map_err(|e| E2eError::CaptureServer(e.to_string()))?;
    }
    Ok(())
}

async fn handle_line(line: &str, store: &SnapshotStore, stats: &CaptureStats) -> CaptureResponse {
    let request: CaptureRequest = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => {
            let id = serde_json::from_str::<serde_json::Value>(line)
                .ok()
                .and_then(|v| v.get("id").and_then(|id| id.as_u64()));
            return CaptureResponse::error(id, format!("bad request: {e}"));
        }
    };

    match request {
        CaptureRequest::Ping { id } => CaptureResponse::ok(id),
        CaptureRequest::MatchSnapshot { id, path, index, data } => {
            let payload = match base64::engine::general_purpose::STANDARD.decode(data.trim()) {
                Ok(payload) => payload,
                Err(e) => return CaptureResponse::error(Some(id), format!("bad payload: {e}")),
            };
            match store.check(&path, index.as_deref(), &payload).await {
                Ok(outcome) => {
                    stats.record(&outcome);
                    CaptureResponse::matched(id, outcome.is_match())
                }
                Err(e) => CaptureResponse::error(Some(id), e.to_string()),
            }
        }
    }
}
