//! Kata daemon - the unattended practice loop.
//!
//! `katad` claims a memory root and repeats the practice cycle until
//! interrupted: fetch or synthesize a task, generate code, run it in a
//! sandboxed subprocess, score the outcome, reflect on it, and adapt
//! difficulty and strategy for the next round. The `kata` CLI operates on
//! the same memory root while the daemon runs.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::watch;
use tracing::{info, Level};

use kata_core::collab::process::ProcessExecutor;
use kata_core::collab::shims::{HeuristicReflector, TemplateGenerator};
use kata_core::collab::{CodeGenerator, Reflector, SandboxExecutor};
use kata_core::{init_tracing, ControlLoop, LoopConfig};
use kata_store::{InstanceLock, JsonStore};

#[derive(Parser)]
#[command(name = "katad")]
#[command(author = "Kata Maintainers")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Unattended practice loop daemon", long_about = None)]
struct Cli {
    /// Memory root the loop trains against
    #[arg(long, env = "KATA_MEMORY_DIR", default_value = ".kata/memory")]
    memory_dir: PathBuf,

    /// Seconds to pause between cycles, overriding the stored config
    #[arg(long)]
    interval: Option<u64>,

    /// Run a single practice cycle and exit
    #[arg(long)]
    once: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    let store = Arc::new(
        JsonStore::open(&cli.memory_dir)
            .with_context(|| format!("Failed to open memory root {:?}", cli.memory_dir))?,
    );

    // One daemon per memory root. Held for the lifetime of the process.
    let _lock = InstanceLock::acquire(&cli.memory_dir).with_context(|| {
        format!(
            "Another katad appears to hold {:?} (remove the pidfile if it is stale)",
            cli.memory_dir
        )
    })?;

    let mut config = LoopConfig::load_or_init(&store)
        .await
        .context("Failed to load loop configuration")?;
    if let Some(secs) = cli.interval {
        config.loop_interval_secs = secs;
    }

    let generator = Arc::new(TemplateGenerator::new()) as Arc<dyn CodeGenerator>;
    let executor = Arc::new(ProcessExecutor::new()) as Arc<dyn SandboxExecutor>;
    let reflector = Arc::new(HeuristicReflector::new()) as Arc<dyn Reflector>;

    let mut control = ControlLoop::new(Arc::clone(&store), config, generator, executor, reflector)
        .context("Failed to build the control loop")?;

    if cli.once {
        let report = control.run_once().await?;
        info!(
            task_id = %report.task_id,
            score = report.score,
            "single cycle finished"
        );
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, finishing the current cycle");
            let _ = shutdown_tx.send(true);
        }
    });

    info!(memory = %cli.memory_dir.display(), "katad started");
    control
        .run(shutdown_rx)
        .await
        .context("Practice loop halted")?;
    info!("katad stopped");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn interval_and_once_flags_parse() {
        let cli = Cli::parse_from(["katad", "--interval", "0", "--once"]);
        assert_eq!(cli.interval, Some(0));
        assert!(cli.once);
        assert!(!cli.json);
    }
}
