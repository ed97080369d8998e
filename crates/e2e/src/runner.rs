//! Orchestration session: build, launch, supervise
//!
//! ```text
//! Idle ──▶ Building ──▶ Launching ──▶ Running ──▶ Terminated
//!  │ platform   │ bundler     │ native build  │ child + capture server
//!  │ detection  │             │ port + spawn  │ select! over exit/failure/ctrl-c
//! ```
//!
//! The capture server is bound before the child is spawned, so the port the
//! child is told about is always live.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use rand::Rng;
use specrig_common::{env, HarnessConfig};
use tokio::net::TcpListener;
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::build::{run_native_build, BundlerStep};
use crate::capture::{CaptureServer, CaptureSummary, SnapshotStore};
use crate::error::{E2eError, E2eResult};
use crate::platform::Platform;

/// Exit code for every failure that is not the child's own exit code
pub const FAILURE_EXIT_CODE: i32 = 1;

/// How long stream copies may lag behind child exit
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Grace period between SIGTERM and a hard kill
const TERMINATE_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Building,
    Launching,
    Running,
    Terminated,
}

/// Per-invocation options from the command line
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Fixture paths narrowing the bundle
    pub filter_files: Vec<String>,
    /// Test name filter for the test binary
    pub name_filter: Option<String>,
    pub enable_feature_x: bool,
    pub skip_build: bool,
    pub watch: bool,
}

/// One build-and-run session
pub struct Orchestrator {
    config: HarnessConfig,
    state: SessionState,
    port: Option<u16>,
    captures: Option<CaptureSummary>,
}

impl Orchestrator {
    pub fn new(config: HarnessConfig) -> Self {
        Self {
            config,
            state: SessionState::Idle,
            port: None,
            captures: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Port shared by the child and the capture server, once allocated
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Capture counters of the finished session
    pub fn captures(&self) -> Option<CaptureSummary> {
        self.captures
    }

    fn transition(&mut self, next: SessionState) {
        info!("Session {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Run the session and map every failure to exit code 1
    pub async fn execute(&mut self, options: RunOptions) -> i32 {
        match self.run(options).await {
            Ok(code) => code,
            Err(e) => {
                error!("{}", e);
                if self.state != SessionState::Terminated {
                    self.transition(SessionState::Terminated);
                }
                FAILURE_EXIT_CODE
            }
        }
    }

    /// Run the session; `Ok` carries the process exit code
    pub async fn run(&mut self, options: RunOptions) -> E2eResult<i32> {
        let platform = Platform::detect()?;
        debug!("Detected platform {}", platform);

        self.transition(SessionState::Building);
        BundlerStep::new(&self.config, &options.filter_files, options.enable_feature_x)
            .run()
            .await?;

        self.transition(SessionState::Launching);
        if options.skip_build {
            info!("Skipping native build");
        } else {
            run_native_build(&self.config, platform).await?;
        }

        let binary = self.binary_path(platform);
        let server = self.bind_capture_server().await?;
        let port = server.local_addr()?.port();
        self.port = Some(port);
        let stats = server.stats();

        let mut child = self.spawn_child(&binary, platform, port, &options)?;
        let drains = forward_output(&mut child);

        self.transition(SessionState::Running);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let mut server_task: JoinHandle<E2eResult<()>> = tokio::spawn(server.serve_until(async {
            let _ = shutdown_rx.await;
        }));
        let mut server_stopped = false;

        let code = tokio::select! {
            status = child.wait() => exit_code(status?),
            joined = &mut server_task => {
                server_stopped = true;
                let reason = match joined {
                    Ok(Ok(())) => "capture server stopped".to_string(),
                    Ok(Err(e)) => e.to_string(),
                    Err(e) => e.to_string(),
                };
                error!("Capture server failed, stopping test binary: {}", reason);
                terminate(&mut child).await;
                FAILURE_EXIT_CODE
            }
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted");
                if options.watch {
                    terminate(&mut child).await;
                }
                FAILURE_EXIT_CODE
            }
        };

        for drain in drains {
            if tokio::time::timeout(DRAIN_TIMEOUT, drain).await.is_err() {
                debug!("Output stream still open after child exit");
            }
        }

        // Let in-flight captures land before counting them
        if !server_stopped {
            let _ = shutdown_tx.send(());
            match server_task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Capture server ended with error: {}", e),
                Err(e) => warn!("Capture server task failed: {}", e),
            }
        }

        let summary = stats.summary();
        self.captures = Some(summary);
        info!(
            "Captures: {} received, {} matched, {} mismatched, {} new",
            summary.received, summary.matched, summary.mismatched, summary.created
        );
        self.transition(SessionState::Terminated);
        info!("Exit code {}", code);
        Ok(code)
    }

    fn binary_path(&self, platform: Platform) -> PathBuf {
        let root = &self.config.paths.workspace_root;
        match &self.config.native.binary_override {
            Some(path) => root.join(path),
            None => platform.binary_path(&root.join(&self.config.native.build_dir), &self.config.native.app_name),
        }
    }

    /// Bind on a random port in the configured range, redrawing on collision
    async fn bind_capture_server(&self) -> E2eResult<CaptureServer> {
        let server = &self.config.server;
        let host: std::net::IpAddr = server
            .host
            .parse()
            .map_err(|e| E2eError::CaptureServer(format!("invalid host '{}': {}", server.host, e)))?;
        let store = SnapshotStore::new(&self.config.paths.snapshot_dir, server.update_baselines);

        for attempt in 1..=server.bind_attempts {
            let port = allocate_port(server.port_min, server.port_max);
            match TcpListener::bind(SocketAddr::new(host, port)).await {
                Ok(listener) => {
                    debug!("Bound capture port {} on attempt {}", port, attempt);
                    return Ok(CaptureServer::new(listener, store));
                }
                Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
                    warn!("Port {} in use (attempt {}/{})", port, attempt, server.bind_attempts);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(E2eError::PortUnavailable {
            attempts: server.bind_attempts,
            min: server.port_min,
            max: server.port_max,
        })
    }

    fn spawn_child(&self, binary: &Path, platform: Platform, port: u16, options: &RunOptions) -> E2eResult<Child> {
        info!("Launching {} (capture port {})", binary.display(), port);

        let mut cmd = Command::new(binary);
        cmd.args(&self.config.native.launch_args)
            .current_dir(&self.config.paths.workspace_root)
            .env(env::TEST_MODE, "true")
            .env(env::CAPTURE_PORT, port.to_string())
            .env(env::TEST_ROOT, &self.config.paths.test_root)
            .envs(platform.pick(&self.config.native.backend_hints))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(name) = &options.name_filter {
            cmd.env(env::NAME_FILTER, name);
        }
        if options.enable_feature_x {
            cmd.env(env::ENABLE_FEATURE_X, "true");
        }

        cmd.spawn().map_err(|source| E2eError::Spawn {
            program: binary.to_path_buf(),
            source,
        })
    }
}

/// Uniform draw from the inclusive range
pub fn allocate_port(min: u16, max: u16) -> u16 {
    rand::thread_rng().gen_range(min..=max)
}

/// Child exit status to process exit code; a signal death is a failure
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(raw) = status.signal() {
            match nix::sys::signal::Signal::try_from(raw) {
                Ok(signal) => warn!("Test binary terminated by {}", signal),
                Err(_) => warn!("Test binary terminated by signal {}", raw),
            }
        }
    }

    FAILURE_EXIT_CODE
}

/// Copy child stdout/stderr byte-for-byte to ours
fn forward_output(child: &mut Child) -> Vec<JoinHandle<()>> {
    let mut tasks = Vec::new();
    if let Some(mut stdout) = child.stdout.take() {
        tasks.push(tokio::spawn(async move {
            let mut out = tokio::io::stdout();
            if let Err(e) = tokio::io::copy(&mut stdout, &mut out).await {
                debug!("stdout forwarding ended: {}", e);
            }
        }));
    }
    if let Some(mut stderr) = child.stderr.take() {
        tasks.push(tokio::spawn(async move {
            let mut err = tokio::io::stderr();
            if let Err(e) = tokio::io::copy(&mut stderr, &mut err).await {
                debug!("stderr forwarding ended: {}", e);
            }
        }));
    }
    tasks
}

/// SIGTERM first, then a hard kill if the child lingers
async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = child.id() {
            info!("Stopping test binary (pid: {})", pid);
            if kill(Pid::from_raw(pid as i32), Signal::SIGTERM).is_ok()
                && tokio::time::timeout(TERMINATE_GRACE, child.wait()).await.is_ok()
            {
                return;
            }
        }
    }

    if let Err(e) = child.kill().await {
        debug!("Kill failed: {}", e);
    }
}
