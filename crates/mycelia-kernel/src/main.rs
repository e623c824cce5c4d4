//! Mycelia CLI
//!
//! - `mycelia bench`   : run the benchmark suite and print/write the report
//! - `mycelia serve`   : run the kernel behind the HTTP API
//! - `mycelia compare` : diff two saved reports and flag regressions

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use mycelia_core::error::{MyceliaError, Result};
use mycelia_core::report::{compare, format_value, BenchReport, Regression};
use mycelia_kernel::bench::BenchSuite;
use mycelia_kernel::{app_state, config, router};

const DEFAULT_CONFIG: &str = "mycelia.yaml";

#[derive(Debug, Parser)]
#[command(name = "mycelia", version, about = "Mycelia Kernel message router and benchmark harness")]
struct Cli {
    /// Config file (defaults to ./mycelia.yaml when present).
    #[arg(long, short, global = true, env = "MYCELIA_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the benchmark suite.
    Bench {
        /// Write the report here instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
        /// Compare against a saved report; exit non-zero on regressions.
        #[arg(long)]
        baseline: Option<PathBuf>,
        /// Allowed change in percent before a metric counts as regressed.
        #[arg(long, default_value_t = 5.0)]
        tolerance: f64,
    },
    /// Serve the kernel over HTTP.
    Serve,
    /// Compare two saved reports.
    Compare {
        baseline: PathBuf,
        current: PathBuf,
        #[arg(long, default_value_t = 5.0)]
        tolerance: f64,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let cfg = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Bench { out, baseline, tolerance } => {
            let report = BenchSuite::new(&cfg).run().await?;
            let text = report.render();
            match out {
                Some(path) => {
                    fs::write(&path, &text).map_err(|e| {
                        MyceliaError::Internal(format!("write {} failed: {e}", path.display()))
                    })?;
                    tracing::info!(path = %path.display(), "report written");
                }
                None => print!("{text}"),
            }
            match baseline {
                Some(path) => {
                    let base = read_report(&path)?;
                    Ok(report_regressions(&compare(&base, &report, tolerance)))
                }
                None => Ok(ExitCode::SUCCESS),
            }
        }
        Command::Serve => serve(cfg).await.map(|()| ExitCode::SUCCESS),
        Command::Compare { baseline, current, tolerance } => {
            let base = read_report(&baseline)?;
            let cur = read_report(&current)?;
            Ok(report_regressions(&compare(&base, &cur, tolerance)))
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<config::MyceliaConfig> {
    match path {
        Some(p) => config::load_from_file(p),
        None if Path::new(DEFAULT_CONFIG).exists() => config::load_from_file(DEFAULT_CONFIG),
        None => {
            tracing::info!("no config file; using defaults");
            Ok(config::MyceliaConfig::default())
        }
    }
}

fn read_report(path: &Path) -> Result<BenchReport> {
    let text = fs::read_to_string(path)
        .map_err(|e| MyceliaError::Internal(format!("read {} failed: {e}", path.display())))?;
    BenchReport::parse(&text)
}

fn report_regressions(regs: &[Regression]) -> ExitCode {
    if regs.is_empty() {
        eprintln!("no regressions");
        return ExitCode::SUCCESS;
    }
    for r in regs {
        eprintln!(
            "REGRESSION {} / {}: {} -> {} {} ({:+.1}%)",
            r.section,
            r.label,
            format_value(r.baseline, 2),
            format_value(r.current, 2),
            r.unit,
            r.change_pct
        );
    }
    ExitCode::FAILURE
}

async fn serve(cfg: config::MyceliaConfig) -> Result<()> {
    let listen: SocketAddr = cfg
        .ops
        .listen
        .parse()
        .map_err(|e| MyceliaError::BadRequest(format!("ops.listen must be a valid SocketAddr: {e}")))?;

    let state = app_state::AppState::new(cfg)?;
    let app = router::build_router(state.clone());

    tracing::info!(%listen, "mycelia starting");
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .map_err(|e| MyceliaError::Internal(format!("bind {listen} failed: {e}")))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            state.drain();
        })
        .await
        .map_err(|e| MyceliaError::Internal(format!("server failed: {e}")))
}
