//! CLI entry point for the fled rebuild loop.
//!
//! # Usage
//!
//! ```bash
//! fled [OPTIONS] <COMMAND>
//!
//! # Compile once, then rebuild on every change
//! fled watch ./sketch --compile-cmd "make wasm" --output-dir build
//!
//! # Start a local compile server when none is running
//! fled watch ./sketch --compile-cmd "make wasm" --server-cmd "fled-server --port 9021"
//!
//! # Compile once and exit with the compile status
//! fled watch ./sketch --compile-cmd "make wasm" --just-compile
//!
//! # Find the first healthy backend
//! fled probe localhost https://fastled.onrender.com
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{WrapErr, eyre};
use fl_core::{BuildMode, Config};
use fl_live::{
    CommandBackend, LiveError, PreviewServer, ProcessServer, RebuildOrchestrator, StdinTrigger,
    resolve_backend,
};
use fl_probe::{ConnectionProber, HttpHealthCheck};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// CLI ARGUMENT TYPES
// =============================================================================

/// Watch a sketch and rebuild it on every change.
#[derive(Parser)]
#[command(name = "fled", version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Command to execute.
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Compile a sketch, then recompile whenever it changes.
    Watch(WatchArgs),

    /// Probe hosts and print the first healthy one.
    Probe {
        /// Hosts to try, in any order.
        #[arg(required = true)]
        hosts: Vec<String>,

        /// Only probe over IPv4.
        #[arg(long)]
        no_ipv6: bool,

        /// Accept the first answer even if it failed its health check.
        #[arg(long)]
        keep_bad: bool,

        /// Configuration file (JSON).
        #[arg(long, env = "FLED_CONFIG")]
        config: Option<Utf8PathBuf>,
    },
}

/// Arguments for `fled watch`.
#[derive(clap::Args)]
struct WatchArgs {
    /// Sketch directory.
    directory: Utf8PathBuf,

    /// Compile backend host.
    #[arg(long, env = "FLED_HOST", default_value = "localhost")]
    host: String,

    /// Command that compiles the sketch; runs in the sketch directory.
    #[arg(long, env = "FLED_COMPILE_CMD")]
    compile_cmd: String,

    /// Directory the compile command writes its output to, relative to the
    /// sketch directory.
    #[arg(long, env = "FLED_OUTPUT_DIR", default_value = "build")]
    output_dir: Utf8PathBuf,

    /// Command that starts a local compile server when none answers.
    #[arg(long, env = "FLED_SERVER_CMD")]
    server_cmd: Option<String>,

    /// Library directory whose changes rebuild after pressing Enter.
    #[arg(long)]
    library: Option<Utf8PathBuf>,

    /// Build mode: debug, quick or release.
    #[arg(long)]
    build_mode: Option<BuildMode>,

    /// Ask the backend for profiling output.
    #[arg(long)]
    profile: bool,

    /// Do not open a browser tab.
    #[arg(long)]
    no_browser: bool,

    /// Compile once and exit.
    #[arg(long)]
    just_compile: bool,

    /// Preview server port; negative disables the preview server.
    #[arg(long, allow_hyphen_values = true)]
    port: Option<i32>,

    /// Configuration file (JSON).
    #[arg(long, env = "FLED_CONFIG")]
    config: Option<Utf8PathBuf>,
}

// =============================================================================
// INITIALIZATION FUNCTIONS
// =============================================================================

/// Initializes the tracing subscriber for logging.
///
/// Respects the `RUST_LOG` environment variable if set. Otherwise, uses
/// `debug` level if `--verbose` is set, or `info` level by default.
/// Noisy crates like `hyper` and `reqwest` are filtered to `warn` level.
fn init_tracing(verbose: bool, no_color: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if verbose { "debug" } else { "info" };
        EnvFilter::new(format!(
            "{level},hyper=warn,hyper_util=warn,reqwest=warn,mio=warn,notify=warn"
        ))
    });

    // Check if colors should be disabled (flag or NO_COLOR env var)
    let use_ansi = !no_color && std::env::var("NO_COLOR").is_err();

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_ansi(use_ansi))
        .with(filter)
        .init();
}

/// Loads the configuration file, or the defaults when none is given.
fn load_config(path: Option<&Utf8Path>) -> color_eyre::Result<Config> {
    match path {
        Some(path) => Config::load(path).wrap_err_with(|| format!("loading {path}")),
        None => Ok(Config::default()),
    }
}

/// Applies `fled watch` flags on top of the loaded configuration.
fn build_config(args: &WatchArgs) -> color_eyre::Result<Config> {
    if !args.directory.is_dir() {
        return Err(eyre!("Sketch directory does not exist: {}", args.directory));
    }

    let mut config = load_config(args.config.as_deref())?;
    if let Some(mode) = args.build_mode {
        config.live.build_mode = mode;
    }
    config.live.profile |= args.profile;
    if args.no_browser {
        config.live.open_browser = false;
    }
    if args.just_compile {
        config.live.keep_running = false;
    }
    if args.port.is_some() {
        config.live.preview_port = args.port;
    }

    // Compile output inside the sketch must not trigger another compile.
    if args.output_dir.is_relative() {
        let first = args.output_dir.components().find_map(|c| match c {
            Utf8Component::Normal(name) => Some(name.to_owned()),
            _ => None,
        });
        if let Some(name) = first {
            if !config.watch.excluded.contains(&name) {
                config.watch.excluded.push(name);
            }
        }
    }

    config.validate()?;
    Ok(config)
}

/// Cancels `token` on Ctrl+C or, on Unix, SIGTERM.
fn spawn_signal_handler(token: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};

            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => info!("Received Ctrl+C, shutting down"),
                        _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Cannot listen for SIGTERM");
                    if tokio::signal::ctrl_c().await.is_ok() {
                        info!("Received Ctrl+C, shutting down");
                    }
                }
            }
        }

        #[cfg(not(unix))]
        {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received Ctrl+C, shutting down");
            }
        }

        token.cancel();
    });
}

// =============================================================================
// COMMAND IMPLEMENTATIONS
// =============================================================================

/// Runs the rebuild loop for one sketch.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the sketch cannot be
/// watched. A dead compile server and a failed one-shot compile are reported
/// through the exit code instead.
async fn run_watch(args: WatchArgs) -> color_eyre::Result<ExitCode> {
    let config = build_config(&args)?;
    info!(
        sketch = %args.directory,
        host = %args.host,
        mode = %config.live.build_mode,
        "Starting fled"
    );

    let prober = Arc::new(ConnectionProber::http(&config.probe)?);

    let local_server = match &args.server_cmd {
        Some(command) => {
            let health = HttpHealthCheck::new(config.probe.timeout())?;
            let url = format!("localhost:{}", config.probe.fallback_port);
            let server: Box<dyn fl_live::LocalServer> =
                Box::new(ProcessServer::new(command.clone(), &url, Arc::new(health)));
            Some(server)
        }
        None => None,
    };
    let resolved = resolve_backend(&prober, &args.host, local_server).await;

    let backend = Arc::new(CommandBackend::new(
        args.compile_cmd.clone(),
        args.output_dir.clone(),
    ));
    let token = CancellationToken::new();
    spawn_signal_handler(token.clone());

    let mut orchestrator =
        RebuildOrchestrator::new(args.directory.clone(), &config, backend, prober, resolved)?
            .with_cancellation_token(token)
            .with_preview(Box::new(PreviewServer::new()));
    if config.live.keep_running {
        orchestrator = orchestrator.with_trigger(Box::new(StdinTrigger::spawn()?));
    }
    if let Some(library) = args.library {
        orchestrator = orchestrator.with_library_dir(library);
    }

    match orchestrator.run().await {
        Ok(report) => {
            info!(
                compiles = report.compiles,
                deployed = report.deployed,
                skipped = report.skipped,
                failed = report.failed,
                "Stopped"
            );
            Ok(if report.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Err(e @ LiveError::ServerDied { .. }) => {
            error!(error = %e, "Exiting");
            Ok(ExitCode::FAILURE)
        }
        Err(e) => Err(e.into()),
    }
}

/// Probes `hosts` and prints the winner.
///
/// # Errors
///
/// Returns an error if the configuration or the HTTP client is invalid, or
/// stdout cannot be written.
async fn run_probe(
    hosts: &[String],
    no_ipv6: bool,
    keep_bad: bool,
    config: Option<&Utf8Path>,
) -> color_eyre::Result<ExitCode> {
    let config = load_config(config)?;
    let prober = ConnectionProber::http(&config.probe)?;
    let found = prober.probe(hosts, !keep_bad, !no_ipv6).await;

    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    match found {
        Some(result) => {
            writeln!(handle, "{result}")?;
            Ok(if result.success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        None => {
            writeln!(handle, "No backend answered")?;
            Ok(ExitCode::FAILURE)
        }
    }
}

// =============================================================================
// MAIN
// =============================================================================

#[tokio::main]
async fn main() -> color_eyre::Result<ExitCode> {
    // 1. Install color-eyre FIRST (before any potential panics)
    color_eyre::install()?;

    // 2. Parse CLI arguments
    let cli = Cli::parse();

    // 3. Initialize tracing (handles --no-color for log output)
    init_tracing(cli.verbose, cli.no_color);

    // 4. Route to appropriate command
    match cli.command {
        Commands::Watch(args) => run_watch(args).await,
        Commands::Probe {
            hosts,
            no_ipv6,
            keep_bad,
            config,
        } => run_probe(&hosts, no_ipv6, keep_bad, config.as_deref()).await,
    }
}
