//! The rebuild loop.
//!
//! # Lifecycle
//!
//! ```text
//! InitialCompile ──► (keep_running = false) ──────────────────────► Stopped
//!       │
//!       ▼
//!  start preview, start watchers
//!       │
//!       ▼
//!   Watching ◄──────────── compile returns ─────────── Recompiling
//!       │                                                   ▲
//!       ├─ manual trigger ──────────────────────────────────┤
//!       ├─ sketch batch ────────────────────────────────────┤
//!       ├─ owned server dead ──► Stopped (error)            │
//!       └─ library batch ──► arm; next manual trigger ──────┘
//! ```
//!
//! Cancellation is checked at the top of every iteration and raced against
//! the trigger poll and the compile call. Every exit path runs the same
//! teardown: watchers, then the preview server, then an owned backend.

use std::sync::Arc;
use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};
use tokio_util::sync::CancellationToken;

use fl_core::{CompileResult, Config, LiveConfig, PreviewPort, WatchConfig};
use fl_probe::ConnectionProber;
use fl_watcher::{
    ChangeBatch, ChangeSource, DebouncedBatcher, ExcludeComponentsFilter, WatcherProcess,
};

use crate::backend::{CompileBackend, PreviewHandle, StaticFileServer, TriggerSource};
use crate::deploy::{DeployOutcome, Deployer};
use crate::error::LiveError;
use crate::resolve::{ResolvedBackend, compile_host};
use crate::trigger::NeverTrigger;

/// Where the loop is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Building once before watching starts.
    #[default]
    InitialCompile,
    /// Waiting for a trigger.
    Watching,
    /// A compile is in flight.
    Recompiling,
    /// Torn down.
    Stopped,
}

/// What caused a compile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reason {
    Initial,
    Manual,
    SketchChanged,
}

impl Reason {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Manual => "manual",
            Self::SketchChanged => "sketch changed",
        }
    }
}

/// Why [`RebuildOrchestrator::run`] returned normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The cancellation token fired.
    Cancelled,
    /// `keep_running` was off; the loop stopped after the initial compile.
    SingleCompile {
        /// Whether that compile succeeded.
        success: bool,
    },
}

/// Summary of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    /// Why the loop stopped.
    pub stop_reason: StopReason,
    /// Compiles issued, the initial one included.
    pub compiles: usize,
    /// Results unpacked into the serving directory.
    pub deployed: usize,
    /// Successful results withheld because the output hash was unchanged.
    pub skipped: usize,
    /// Failed compiles.
    pub failed: usize,
}

impl RunReport {
    const fn new() -> Self {
        Self {
            stop_reason: StopReason::Cancelled,
            compiles: 0,
            deployed: 0,
            skipped: 0,
            failed: 0,
        }
    }

    /// Returns `true` unless this was a one-shot run whose compile failed.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        !matches!(self.stop_reason, StopReason::SingleCompile { success: false })
    }
}

/// Watches a sketch and rebuilds it against a compile backend.
///
/// ```no_run
/// use std::sync::Arc;
/// use fl_core::Config;
/// use fl_live::{CommandBackend, RebuildOrchestrator, StdinTrigger, resolve_backend};
/// use fl_probe::ConnectionProber;
///
/// # async fn example() -> Result<(), fl_live::LiveError> {
/// let config = Config::default();
/// let prober = Arc::new(ConnectionProber::http(&config.probe)?);
/// let resolved = resolve_backend(&prober, "localhost", None).await;
/// let backend = Arc::new(CommandBackend::new("make wasm", "build"));
///
/// let mut orchestrator =
///     RebuildOrchestrator::new("./sketch".into(), &config, backend, prober, resolved)?
///         .with_trigger(Box::new(StdinTrigger::spawn()?));
/// let report = orchestrator.run().await?;
/// println!("{} compiles", report.compiles);
/// # Ok(())
/// # }
/// ```
pub struct RebuildOrchestrator {
    sketch_dir: Utf8PathBuf,
    watch: WatchConfig,
    live: LiveConfig,
    backend: Arc<dyn CompileBackend>,
    prober: Arc<ConnectionProber>,
    resolved: ResolvedBackend,
    trigger: Box<dyn TriggerSource>,
    cancellation_token: CancellationToken,
    sketch_source: Option<Box<dyn ChangeSource>>,
    library_dir: Option<Utf8PathBuf>,
    library_source: Option<Box<dyn ChangeSource>>,
    preview_server: Option<Box<dyn StaticFileServer>>,
    preview: Option<Box<dyn PreviewHandle>>,
    deployer: Deployer,
    phase: Phase,
    library_pending: bool,
    report: RunReport,
}

impl std::fmt::Debug for RebuildOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RebuildOrchestrator")
            .field("sketch_dir", &self.sketch_dir)
            .field("resolved", &self.resolved)
            .field("phase", &self.phase)
            .field("library_pending", &self.library_pending)
            .field("report", &self.report)
            .finish_non_exhaustive()
    }
}

impl RebuildOrchestrator {
    /// Creates a loop for `sketch_dir`.
    ///
    /// Without further configuration there is no manual trigger, no preview
    /// server, and the sketch watcher is created from `config.watch` once
    /// the initial compile is done.
    ///
    /// # Errors
    ///
    /// Returns [`LiveError::Config`] if `config.live.serving_dir` is not a
    /// single plain directory name.
    pub fn new(
        sketch_dir: Utf8PathBuf,
        config: &Config,
        backend: Arc<dyn CompileBackend>,
        prober: Arc<ConnectionProber>,
        resolved: ResolvedBackend,
    ) -> Result<Self, LiveError> {
        let deployer = Deployer::new(&sketch_dir, &config.live.serving_dir)?;
        Ok(Self {
            sketch_dir,
            watch: config.watch.clone(),
            live: config.live.clone(),
            backend,
            prober,
            resolved,
            trigger: Box::new(NeverTrigger),
            cancellation_token: CancellationToken::new(),
            sketch_source: None,
            library_dir: None,
            library_source: None,
            preview_server: None,
            preview: None,
            deployer,
            phase: Phase::InitialCompile,
            library_pending: false,
            report: RunReport::new(),
        })
    }

    /// Sets the manual trigger.
    #[must_use]
    pub fn with_trigger(mut self, trigger: Box<dyn TriggerSource>) -> Self {
        self.trigger = trigger;
        self
    }

    /// Shares a cancellation token with the caller.
    #[must_use]
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    /// Replaces the default sketch watcher.
    #[must_use]
    pub fn with_sketch_source(mut self, source: Box<dyn ChangeSource>) -> Self {
        self.sketch_source = Some(source);
        self
    }

    /// Also watches a library directory. Its changes only rebuild after a
    /// manual trigger.
    #[must_use]
    pub fn with_library_dir(mut self, dir: Utf8PathBuf) -> Self {
        self.library_dir = Some(dir);
        self
    }

    /// Replaces the default library watcher.
    #[must_use]
    pub fn with_library_source(mut self, source: Box<dyn ChangeSource>) -> Self {
        self.library_source = Some(source);
        self
    }

    /// Serves the published output once the initial compile is done.
    #[must_use]
    pub fn with_preview(mut self, server: Box<dyn StaticFileServer>) -> Self {
        self.preview_server = Some(server);
        self
    }

    /// Returns a handle that stops the loop when cancelled.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Returns the current phase.
    #[inline]
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Returns the serving directory.
    #[must_use]
    pub fn serving_dir(&self) -> &Utf8Path {
        self.deployer.serving_dir()
    }

    /// Runs until cancelled, until the owned backend dies, or, with
    /// `keep_running` off, until the initial compile is published.
    ///
    /// # Errors
    ///
    /// Returns [`LiveError::ServerDied`] when an owned backend stops, the
    /// watcher error if the sketch cannot be watched, or a fatal error
    /// reported by the compile backend. Teardown has run by then.
    pub async fn run(&mut self) -> Result<RunReport, LiveError> {
        let result = self.run_inner().await;
        self.teardown().await;
        result.map(|stop_reason| RunReport {
            stop_reason,
            ..self.report
        })
    }

    async fn run_inner(&mut self) -> Result<StopReason, LiveError> {
        let token = self.cancellation_token.clone();

        self.set_phase(Phase::InitialCompile);
        let Some(success) = self.rebuild(Reason::Initial).await? else {
            return Ok(StopReason::Cancelled);
        };
        if !self.live.keep_running {
            return Ok(StopReason::SingleCompile { success });
        }

        self.start_preview().await;
        self.start_sources().await?;
        self.set_phase(Phase::Watching);
        tracing::info!("Watching for changes; press Enter to rebuild, Ctrl+C to stop");

        let poll_interval = self.live.poll_interval();
        loop {
            if token.is_cancelled() {
                return Ok(StopReason::Cancelled);
            }

            let pressed = tokio::select! {
                () = token.cancelled() => return Ok(StopReason::Cancelled),
                pressed = self.trigger.triggered(poll_interval) => pressed,
            };
            if pressed {
                self.library_pending = false;
                if self.rebuild(Reason::Manual).await?.is_none() {
                    return Ok(StopReason::Cancelled);
                }
                self.trigger.drain();
                continue;
            }

            let changed = poll(self.sketch_source.as_mut()).await;
            if !changed.is_empty() {
                tracing::info!(files = %join_paths(&changed), "Sketch changed");
                if self.rebuild(Reason::SketchChanged).await?.is_none() {
                    return Ok(StopReason::Cancelled);
                }
                continue;
            }

            if let ResolvedBackend::Owned(server) = &mut self.resolved {
                if !server.is_alive().await {
                    let url = server.url();
                    tracing::error!(url = %url, "Compile server is no longer running");
                    return Err(LiveError::ServerDied { url });
                }
            }

            let library = poll(self.library_source.as_mut()).await;
            if !library.is_empty() {
                tracing::info!(files = %join_paths(&library), "Library changed");
                if !self.library_pending {
                    tracing::info!("Press Enter to rebuild with the library changes");
                }
                self.library_pending = true;
            }
        }
    }

    /// Compiles and publishes once. Returns `None` if cancelled mid-compile,
    /// otherwise whether the compile succeeded. Recoverable backend errors
    /// count as failed compiles; fatal ones end the session.
    async fn rebuild(&mut self, reason: Reason) -> Result<Option<bool>, LiveError> {
        if self.phase != Phase::InitialCompile {
            self.set_phase(Phase::Recompiling);
        }

        let token = self.cancellation_token.clone();
        let host = tokio::select! {
            () = token.cancelled() => return Ok(None),
            host = compile_host(&self.prober, &self.resolved) => host,
        };

        tracing::info!(
            reason = reason.as_str(),
            host = %host,
            mode = %self.live.build_mode,
            "Compiling sketch"
        );
        let started = Instant::now();
        let compiled = tokio::select! {
            () = token.cancelled() => return Ok(None),
            compiled = self.backend.compile(
                &self.sketch_dir,
                &host,
                self.live.build_mode,
                self.live.profile,
            ) => compiled,
        };
        let result = match compiled {
            Ok(result) => result,
            Err(error) if error.is_fatal() => {
                tracing::error!(error = %error, "Compile backend cannot continue");
                return Err(error);
            }
            Err(error) => {
                tracing::warn!(error = %error, "Compile backend failed");
                CompileResult::failure(error.to_string())
            }
        };

        self.report.compiles += 1;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        if result.success {
            tracing::info!(elapsed_ms, bytes = result.archive_len(), "Compile succeeded");
            if !result.stdout.trim().is_empty() {
                tracing::debug!(output = %result.stdout.trim_end(), "Compiler output");
            }
        } else {
            self.report.failed += 1;
            tracing::error!(elapsed_ms, "Compile failed:\n{}", result.stdout.trim_end());
        }

        match self.deployer.publish(&result) {
            Ok(DeployOutcome::Deployed { files }) => {
                self.report.deployed += 1;
                tracing::info!(files, dir = %self.deployer.serving_dir(), "Published build output");
            }
            Ok(DeployOutcome::Skipped) => {
                self.report.skipped += 1;
                tracing::info!("No significant changes; keeping published output");
            }
            Ok(DeployOutcome::Failed) => {
                tracing::debug!(dir = %self.deployer.serving_dir(), "Wrote error page");
            }
            Err(error) => {
                tracing::warn!(error = %error, "Failed to publish build output");
            }
        }

        if self.phase != Phase::InitialCompile {
            self.set_phase(Phase::Watching);
        }
        Ok(Some(result.success))
    }

    async fn start_preview(&mut self) {
        let port = match self.live.preview_port() {
            PreviewPort::Disabled => return,
            PreviewPort::Auto => None,
            PreviewPort::Fixed(port) => Some(port),
        };
        let Some(server) = &self.preview_server else {
            return;
        };

        let dir = self.deployer.serving_dir().to_owned();
        if let Err(error) = std::fs::create_dir_all(&dir) {
            tracing::warn!(error = %error, dir = %dir, "Cannot create serving directory");
            return;
        }
        match server.spawn(&dir, port, self.live.open_browser).await {
            Ok(handle) => {
                tracing::info!(url = %handle.url(), "Preview available");
                self.preview = Some(handle);
            }
            Err(error) => tracing::warn!(error = %error, "Preview server not started"),
        }
    }

    async fn start_sources(&mut self) -> Result<(), LiveError> {
        if self.sketch_source.is_none() {
            let filter = ExcludeComponentsFilter::new(self.watch.excluded.iter().cloned())
                .exclude(self.live.serving_dir.clone());
            let process = WatcherProcess::new(&self.sketch_dir, &self.watch, filter).await?;
            tracing::info!(path = %self.sketch_dir, "Watching sketch");
            self.sketch_source = Some(Box::new(DebouncedBatcher::new(
                process,
                self.watch.debounce(),
            )));
        }

        if self.library_source.is_none() {
            if let Some(dir) = &self.library_dir {
                let filter = ExcludeComponentsFilter::new(self.watch.excluded.iter().cloned());
                let process = WatcherProcess::new(dir, &self.watch, filter).await?;
                tracing::info!(path = %dir, "Watching library");
                self.library_source = Some(Box::new(DebouncedBatcher::new(
                    process,
                    self.watch.debounce(),
                )));
            }
        }
        Ok(())
    }

    async fn teardown(&mut self) {
        if let Some(mut source) = self.sketch_source.take() {
            source.stop().await;
        }
        if let Some(mut source) = self.library_source.take() {
            source.stop().await;
        }
        if let Some(mut preview) = self.preview.take() {
            preview.kill().await;
        }
        if let ResolvedBackend::Owned(server) = &mut self.resolved {
            server.stop().await;
        }
        self.set_phase(Phase::Stopped);
    }

    fn set_phase(&mut self, phase: Phase) {
        if self.phase != phase {
            tracing::debug!(from = ?self.phase, to = ?phase, "Phase change");
            self.phase = phase;
        }
    }
}

async fn poll(source: Option<&mut Box<dyn ChangeSource>>) -> ChangeBatch {
    match source {
        Some(source) => source.poll_changes().await,
        None => ChangeBatch::new(),
    }
}

fn join_paths(batch: &ChangeBatch) -> String {
    batch
        .iter()
        .map(|path| path.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io::{Cursor, Write};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use fl_core::{BuildMode, ContentHash, ProbeConfig};
    use fl_probe::{HealthCheck, ProbeError};
    use parking_lot::Mutex;
    use tempfile::TempDir;

    const SKETCH: &str = "main.ino";

    /// Compiles by echoing `main.ino` into `index.html`; the hash is the
    /// file content's hash. `FAIL` as content fails the compile,
    /// `NO_OUTPUT` and `SERVER_GONE` make the backend itself error.
    #[derive(Debug, Default)]
    struct EchoBackend {
        seen: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl CompileBackend for EchoBackend {
        async fn compile(
            &self,
            sketch_dir: &Utf8Path,
            _host: &str,
            _build_mode: BuildMode,
            _profile: bool,
        ) -> Result<CompileResult, LiveError> {
            let source = std::fs::read_to_string(sketch_dir.join(SKETCH))?;
            self.seen.lock().push(source.clone());
            match source.as_str() {
                "FAIL" => return Ok(CompileResult::failure("main.ino:1: error: FAIL")),
                "NO_OUTPUT" => return Err(LiveError::MissingDirectory(sketch_dir.join("build"))),
                "SERVER_GONE" => {
                    return Err(LiveError::ServerDied {
                        url: "http://localhost:9021".to_owned(),
                    });
                }
                _ => {}
            }

            let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
            zip.start_file("index.html", zip::write::SimpleFileOptions::default())?;
            zip.write_all(source.as_bytes())?;
            let archive = zip.finish()?.into_inner();
            Ok(CompileResult::success(
                "ok",
                Some(ContentHash::of_bytes(source.as_bytes())),
                archive,
            ))
        }
    }

    #[derive(Debug)]
    struct AllHealthy;

    #[async_trait]
    impl HealthCheck for AllHealthy {
        async fn check(&self, _url: &str, _ipv4: bool) -> Result<bool, ProbeError> {
            Ok(true)
        }
    }

    /// Hands out scripted batches, one per poll, then empty ones.
    #[derive(Debug, Default)]
    struct ScriptedSource {
        batches: VecDeque<ChangeBatch>,
        stopped: Arc<AtomicBool>,
    }

    impl ScriptedSource {
        fn new(batches: Vec<Vec<&str>>, stopped: &Arc<AtomicBool>) -> Box<Self> {
            Box::new(Self {
                batches: batches
                    .into_iter()
                    .map(|paths| paths.into_iter().map(Utf8PathBuf::from).collect())
                    .collect(),
                stopped: Arc::clone(stopped),
            })
        }
    }

    #[async_trait]
    impl ChangeSource for ScriptedSource {
        async fn poll_changes(&mut self) -> ChangeBatch {
            self.batches.pop_front().unwrap_or_default()
        }

        async fn stop(&mut self) {
            self.stopped.store(true, Ordering::SeqCst);
        }
    }

    /// Presses in the scripted order; every poll still waits out the
    /// timeout when there is no press.
    #[derive(Debug, Default)]
    struct ScriptedTrigger {
        presses: VecDeque<bool>,
        drained: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl TriggerSource for ScriptedTrigger {
        async fn triggered(&mut self, timeout: Duration) -> bool {
            if self.presses.pop_front().unwrap_or(false) {
                return true;
            }
            tokio::time::sleep(timeout).await;
            false
        }

        fn drain(&mut self) {
            self.drained.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Debug)]
    struct FakeServer {
        alive: Arc<AtomicBool>,
        stopped: Arc<AtomicBool>,
    }

    #[async_trait]
    impl crate::backend::LocalServer for FakeServer {
        async fn start(&mut self) -> Result<(), LiveError> {
            Ok(())
        }

        async fn stop(&mut self) {
            self.stopped.store(true, Ordering::SeqCst);
        }

        async fn is_alive(&mut self) -> bool {
            self.alive.load(Ordering::SeqCst)
        }

        fn url(&self) -> String {
            "http://localhost:9021".to_owned()
        }
    }

    #[derive(Debug, Default)]
    struct FakePreview {
        spawned: Arc<AtomicBool>,
        killed: Arc<AtomicBool>,
    }

    #[derive(Debug)]
    struct FakePreviewHandle {
        killed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl PreviewHandle for FakePreviewHandle {
        fn url(&self) -> &str {
            "http://localhost:8089"
        }

        async fn kill(&mut self) {
            self.killed.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl StaticFileServer for FakePreview {
        async fn spawn(
            &self,
            _directory: &Utf8Path,
            _port: Option<u16>,
            _open_browser: bool,
        ) -> Result<Box<dyn PreviewHandle>, LiveError> {
            self.spawned.store(true, Ordering::SeqCst);
            Ok(Box::new(FakePreviewHandle {
                killed: Arc::clone(&self.killed),
            }))
        }
    }

    struct Fixture {
        _dir: TempDir,
        sketch: Utf8PathBuf,
        config: Config,
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl Fixture {
        fn new(source: &str) -> Self {
            let dir = TempDir::new().expect("temp dir");
            let sketch = Utf8Path::from_path(dir.path()).expect("UTF-8").to_owned();
            std::fs::write(sketch.join(SKETCH), source).expect("write sketch");

            let mut config = Config::default();
            config.live.poll_interval_ms = 10;
            config.live.preview_port = Some(-1);
            config.live.open_browser = false;

            Self {
                _dir: dir,
                sketch,
                config,
                seen: Arc::default(),
            }
        }

        fn try_orchestrator(
            &self,
            resolved: ResolvedBackend,
        ) -> Result<RebuildOrchestrator, LiveError> {
            let prober = ConnectionProber::new(Arc::new(AllHealthy), &ProbeConfig::default());
            let backend = EchoBackend {
                seen: Arc::clone(&self.seen),
            };
            RebuildOrchestrator::new(
                self.sketch.clone(),
                &self.config,
                Arc::new(backend),
                Arc::new(prober),
                resolved,
            )
        }

        fn orchestrator(&self, resolved: ResolvedBackend) -> RebuildOrchestrator {
            self.try_orchestrator(resolved).expect("valid config")
        }

        fn host(&self) -> ResolvedBackend {
            ResolvedBackend::Host("http://localhost:9021".to_owned())
        }

        fn seen(&self) -> Vec<String> {
            self.seen.lock().clone()
        }

        fn published(&self) -> String {
            std::fs::read_to_string(self.sketch.join("fastled_js").join("index.html"))
                .expect("published output")
        }
    }

    fn cancel_after(token: CancellationToken, after: Duration) {
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            token.cancel();
        });
    }

    #[tokio::test]
    async fn test_single_compile_stops_after_initial_build() {
        let mut fixture = Fixture::new("A");
        fixture.config.live.keep_running = false;
        let mut orchestrator = fixture.orchestrator(fixture.host());

        let report = orchestrator.run().await.expect("run");
        assert_eq!(report.stop_reason, StopReason::SingleCompile { success: true });
        assert_eq!(report.compiles, 1);
        assert_eq!(report.deployed, 1);
        assert!(report.is_success());
        assert_eq!(fixture.published(), "A");
        assert_eq!(orchestrator.phase(), Phase::Stopped);
    }

    #[tokio::test]
    async fn test_failed_single_compile_reports_failure() {
        let mut fixture = Fixture::new("FAIL");
        fixture.config.live.keep_running = false;
        let mut orchestrator = fixture.orchestrator(fixture.host());

        let report = orchestrator.run().await.expect("run");
        assert_eq!(report.stop_reason, StopReason::SingleCompile { success: false });
        assert!(!report.is_success());
        assert_eq!(report.failed, 1);
        assert!(fixture.published().contains("main.ino:1: error: FAIL"));
    }

    #[tokio::test]
    async fn test_recoverable_backend_error_is_a_failed_compile() {
        let mut fixture = Fixture::new("NO_OUTPUT");
        fixture.config.live.keep_running = false;
        let mut orchestrator = fixture.orchestrator(fixture.host());

        let report = orchestrator.run().await.expect("run");
        assert_eq!(report.stop_reason, StopReason::SingleCompile { success: false });
        assert_eq!(report.failed, 1);
        assert!(fixture.published().contains("directory does not exist"));
    }

    #[tokio::test]
    async fn test_fatal_backend_error_ends_session_with_teardown() {
        let fixture = Fixture::new("SERVER_GONE");
        let stopped = Arc::new(AtomicBool::new(false));
        let mut orchestrator = fixture
            .orchestrator(fixture.host())
            .with_sketch_source(ScriptedSource::new(Vec::new(), &stopped));

        let err = orchestrator.run().await.expect_err("fatal backend error");
        assert!(matches!(err, LiveError::ServerDied { .. }));
        assert!(stopped.load(Ordering::SeqCst));
        assert_eq!(orchestrator.phase(), Phase::Stopped);
        assert!(!fixture.sketch.join("fastled_js").join("index.html").exists());
    }

    #[test]
    fn test_serving_dir_outside_sketch_is_refused() {
        for name in [".", ".."] {
            let mut fixture = Fixture::new("A");
            fixture.config.live.serving_dir = name.to_owned();
            let result = fixture.try_orchestrator(fixture.host());
            assert!(matches!(result, Err(LiveError::Config(_))), "{name} accepted");
            assert!(fixture.sketch.join(SKETCH).exists());
        }
    }

    #[tokio::test]
    async fn test_manual_trigger_with_unchanged_output_is_skipped() {
        let fixture = Fixture::new("A");
        let drained = Arc::new(AtomicUsize::new(0));
        let trigger = ScriptedTrigger {
            presses: VecDeque::from([true]),
            drained: Arc::clone(&drained),
        };
        let stopped = Arc::new(AtomicBool::new(false));
        let mut orchestrator = fixture
            .orchestrator(fixture.host())
            .with_trigger(Box::new(trigger))
            .with_sketch_source(ScriptedSource::new(Vec::new(), &stopped));
        cancel_after(orchestrator.cancellation_token(), Duration::from_millis(300));

        let report = orchestrator.run().await.expect("run");
        assert_eq!(report.stop_reason, StopReason::Cancelled);
        assert_eq!(report.compiles, 2);
        assert_eq!(report.deployed, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(drained.load(Ordering::SeqCst), 1);
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_sketch_batch_rebuilds_and_library_waits_for_trigger() {
        let fixture = Fixture::new("A");
        let trigger = ScriptedTrigger {
            presses: VecDeque::from([false, false, false, true]),
            ..ScriptedTrigger::default()
        };
        let stopped = Arc::new(AtomicBool::new(false));
        let sketch = ScriptedSource::new(vec![vec!["main.ino"]], &stopped);
        let library = ScriptedSource::new(vec![vec!["src/FastLED.h"]], &stopped);

        let mut orchestrator = fixture
            .orchestrator(fixture.host())
            .with_trigger(Box::new(trigger))
            .with_sketch_source(sketch)
            .with_library_source(library);
        cancel_after(orchestrator.cancellation_token(), Duration::from_millis(400));

        let report = orchestrator.run().await.expect("run");
        // Initial, sketch batch, then the manual press that picks up the
        // library change. The library batch alone never compiles.
        assert_eq!(report.compiles, 3);
        assert_eq!(fixture.seen(), vec!["A", "A", "A"]);
        assert!(!orchestrator.library_pending);
    }

    #[tokio::test]
    async fn test_library_batch_alone_does_not_rebuild() {
        let fixture = Fixture::new("A");
        let stopped = Arc::new(AtomicBool::new(false));
        let library = ScriptedSource::new(vec![vec!["src/FastLED.h"]], &stopped);

        let mut orchestrator = fixture
            .orchestrator(fixture.host())
            .with_sketch_source(ScriptedSource::new(Vec::new(), &stopped))
            .with_library_source(library);
        cancel_after(orchestrator.cancellation_token(), Duration::from_millis(200));

        let report = orchestrator.run().await.expect("run");
        assert_eq!(report.compiles, 1);
        assert!(orchestrator.library_pending);
    }

    #[tokio::test]
    async fn test_dead_owned_server_ends_session_with_teardown() {
        let mut fixture = Fixture::new("A");
        fixture.config.live.preview_port = None;
        let alive = Arc::new(AtomicBool::new(true));
        let server_stopped = Arc::new(AtomicBool::new(false));
        let server = FakeServer {
            alive: Arc::clone(&alive),
            stopped: Arc::clone(&server_stopped),
        };
        let sources_stopped = Arc::new(AtomicBool::new(false));
        let preview = FakePreview::default();
        let killed = Arc::clone(&preview.killed);

        let mut orchestrator = fixture
            .orchestrator(ResolvedBackend::Owned(Box::new(server)))
            .with_sketch_source(ScriptedSource::new(Vec::new(), &sources_stopped))
            .with_preview(Box::new(preview));

        let flag = Arc::clone(&alive);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            flag.store(false, Ordering::SeqCst);
        });

        let err = orchestrator.run().await.expect_err("server died");
        assert!(matches!(err, LiveError::ServerDied { .. }));
        assert!(sources_stopped.load(Ordering::SeqCst));
        assert!(killed.load(Ordering::SeqCst));
        assert!(server_stopped.load(Ordering::SeqCst));
        assert_eq!(orchestrator.phase(), Phase::Stopped);
    }

    #[tokio::test]
    async fn test_cancel_tears_down_preview() {
        let mut fixture = Fixture::new("A");
        fixture.config.live.preview_port = None;
        let preview = FakePreview::default();
        let spawned = Arc::clone(&preview.spawned);
        let killed = Arc::clone(&preview.killed);
        let stopped = Arc::new(AtomicBool::new(false));

        let mut orchestrator = fixture
            .orchestrator(fixture.host())
            .with_sketch_source(ScriptedSource::new(Vec::new(), &stopped))
            .with_preview(Box::new(preview));
        cancel_after(orchestrator.cancellation_token(), Duration::from_millis(100));

        let report = orchestrator.run().await.expect("run");
        assert_eq!(report.stop_reason, StopReason::Cancelled);
        assert!(spawned.load(Ordering::SeqCst));
        assert!(killed.load(Ordering::SeqCst));
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_disabled_preview_is_never_spawned() {
        let fixture = Fixture::new("A");
        let preview = FakePreview::default();
        let spawned = Arc::clone(&preview.spawned);
        let stopped = Arc::new(AtomicBool::new(false));

        let mut orchestrator = fixture
            .orchestrator(fixture.host())
            .with_sketch_source(ScriptedSource::new(Vec::new(), &stopped))
            .with_preview(Box::new(preview));
        cancel_after(orchestrator.cancellation_token(), Duration::from_millis(50));

        orchestrator.run().await.expect("run");
        assert!(!spawned.load(Ordering::SeqCst));
    }

    async fn wait_for_compiles(seen: &Arc<Mutex<Vec<String>>>, count: usize) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while seen.lock().len() < count {
            assert!(Instant::now() < deadline, "timed out waiting for compile {count}");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_edit_and_revert_coalesce_into_one_rebuild() {
        let mut fixture = Fixture::new("A");
        fixture.config.watch.debounce_ms = 500;
        fixture.config.watch.path_debounce_ms = 50;
        fixture.config.live.poll_interval_ms = 50;

        let mut orchestrator = fixture.orchestrator(fixture.host());
        let token = orchestrator.cancellation_token();
        let run = tokio::spawn(async move { orchestrator.run().await });

        wait_for_compiles(&fixture.seen, 1).await;
        // Let the watcher come up after the initial compile.
        tokio::time::sleep(Duration::from_millis(500)).await;

        std::fs::write(fixture.sketch.join(SKETCH), "B").expect("write B");
        wait_for_compiles(&fixture.seen, 2).await;
        assert_eq!(fixture.published(), "B");

        std::fs::write(fixture.sketch.join(SKETCH), "C").expect("write C");
        tokio::time::sleep(Duration::from_millis(100)).await;
        std::fs::write(fixture.sketch.join(SKETCH), "A").expect("write A");
        wait_for_compiles(&fixture.seen, 3).await;
        tokio::time::sleep(Duration::from_millis(1200)).await;

        assert_eq!(fixture.seen(), vec!["A", "B", "A"]);
        assert_eq!(fixture.published(), "A");

        token.cancel();
        let report = run.await.expect("join").expect("run");
        assert_eq!(report.stop_reason, StopReason::Cancelled);
        assert_eq!(report.compiles, 3);
    }
}
