//! Specrig orchestrator
//!
//! Drives one build-and-run session of the conformance suite:
//! - Runs the bundler with the derived fixture filter
//! - Builds and launches the native host test application
//! - Serves capture requests from the test binary on a per-session port
//! - Propagates the test binary's exit code
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Orchestrator (Rust)                       │
//! ├──────────────────────────────────────────────────────────────┤
//! │  BundlerStep::run()        SPECRIG_FILTER=a.ts|b.ts          │
//! │  run_native_build()        per-platform build command        │
//! │  bind_capture_server()     random port, redraw on collision  │
//! │  spawn_child()             SPECRIG_CAPTURE_PORT=<port>       │
//! │    ├── stdout/stderr ──▶ forwarded verbatim                  │
//! │    └── TCP lines ──▶ CaptureServer ──▶ SnapshotStore          │
//! │  select! { child exit | server failure | ctrl-c }            │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod build;
pub mod capture;
pub mod error;
pub mod platform;
pub mod runner;

pub use capture::{CaptureRequest, CaptureResponse, CaptureServer, CaptureSummary, SnapshotStore};
pub use error::{E2eError, E2eResult};
pub use platform::Platform;
pub use runner::{Orchestrator, RunOptions, SessionState, FAILURE_EXIT_CODE};
