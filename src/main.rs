//! bsky-authorfeed — watch a Bluesky author feed and emit new posts.
//!
//! ## Architecture overview
//!
//! ```text
//! ┌──────────┐  PollMsg   ┌──────────┐  JSON lines  ┌────────┐
//! │ poll.rs  │ ─────────► │ main.rs  │ ───────────► │ stdout │
//! │ (tasks)  │  (channel) │ (health) │              └────────┘
//! └──────────┘            └──────────┘
//!      │ run_cycle()
//!      ▼
//! ┌──────────┐   ┌──────────┐   ┌──────────┐
//! │ bsky/    │ ► │ diff.rs  │ ► │ store.rs │
//! │ (XRPC)   │   │ (fresh?) │   │ (state)  │
//! └──────────┘   └──────────┘   └──────────┘
//! ```
//!
//! * **`bsky/`** — handle resolution, session creation, author feed fetch,
//!   and the raw JSON feed types.
//! * **`diff`** — decides which fetched items have not been seen before.
//! * **`store`** — keeps the last fetched page per target.
//! * **`cycle`** — one resolve → login → fetch → diff → emit → store pass.
//! * **`poll`** — one background task per target, ticking on a timer.
//! * **`emit`** — writes events out.
//! * **`health`** — per-target liveness, saved next to the snapshots.
//! * **`main`** — parses args, loads config, sets up logging, and either
//!   runs one pass (`--once` / `--dry-run`) or drains the pollers forever.

mod bsky;
mod config;
mod cycle;
mod diff;
mod emit;
mod health;
mod poll;
mod store;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing_subscriber::EnvFilter;

use bsky::XrpcClient;
use config::{Config, Target};
use cycle::CycleReport;
use emit::{EventEmitter, JsonLinesEmitter};
use health::HealthBook;
use poll::PollMsg;
use store::{DryRunStore, FileStore, SnapshotStore};

struct Args {
    config: PathBuf,
    once: bool,
    dry_run: bool,
}

fn parse_args() -> Args {
    let mut args = Args {
        config: PathBuf::from(config::DEFAULT_CONFIG_PATH),
        once: false,
        dry_run: false,
    };
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--once" => args.once = true,
            "--dry-run" => {
                args.dry_run = true;
                args.once = true;
            }
            path => args.config = PathBuf::from(path),
        }
    }
    args
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("bsky_authorfeed=info"));
    // Events go to stdout, so logs must not.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let args = parse_args();

    let config = Config::load(&args.config)?;
    let targets = config.resolve_targets()?;
    tracing::info!(
        targets = targets.len(),
        service = %config.service_url,
        state_dir = %config.state_dir.display(),
        "configuration loaded"
    );

    let files = FileStore::new(&config.state_dir);
    let timeout = config.request_timeout();
    if args.once {
        return if args.dry_run {
            let mut health = HealthBook::open(None, &targets);
            let store = DryRunStore::new(files);
            run_once(&targets, &config.service_url, timeout, &store, &mut health).await
        } else {
            let mut health = HealthBook::open(Some(config.state_dir.as_path()), &targets);
            run_once(&targets, &config.service_url, timeout, &files, &mut health).await
        };
    }

    let health = HealthBook::open(Some(config.state_dir.as_path()), &targets);
    let rx = poll::spawn(targets, &config.service_url, timeout, Arc::new(files))?;
    run_forever(health, rx).await
}

/// Log the outcome of a finished cycle and persist the target's health.
fn finish_cycle(health: &mut HealthBook, user: &str, report: CycleReport) {
    let now = Utc::now();
    let working = match health.finish_cycle(user, now) {
        Ok(working) => working,
        Err(e) => {
            tracing::error!(user, error = %e, "failed to save health");
            return;
        }
    };
    tracing::info!(
        user,
        emitted = report.emitted,
        replaced = report.replaced,
        working,
        "cycle complete"
    );
    if !working {
        tracing::warn!(
            user,
            last_event_at = ?health.get(user).and_then(|h| h.last_event_at),
            "target is not working"
        );
    }
}

fn cycle_failed(health: &mut HealthBook, user: &str, error: &str) {
    tracing::error!(user, error, "cycle failed");
    if let Err(e) = health.record_error(user, Utc::now()) {
        tracing::error!(user, error = %e, "failed to save health");
    }
}

/// One cycle per target, sequentially, events straight to stdout.
async fn run_once(
    targets: &[Target],
    service_url: &str,
    timeout: Duration,
    store: &dyn SnapshotStore,
    health: &mut HealthBook,
) -> Result<()> {
    let mut emitter = JsonLinesEmitter::new(io::stdout());
    let mut failed = 0;

    for target in targets {
        let client = XrpcClient::new(service_url, target.debug, timeout)?;
        match cycle::run_cycle(target, &client, store, &mut emitter).await {
            Ok(report) => {
                if report.emitted > 0 {
                    health.record_event(target.key(), Utc::now());
                }
                finish_cycle(health, target.key(), report);
            }
            Err(e) => {
                failed += 1;
                cycle_failed(health, target.key(), &e.to_string());
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} target(s) failed", targets.len());
    }
    Ok(())
}

/// Drain poller messages until Ctrl-C.
async fn run_forever(
    mut health: HealthBook,
    mut rx: tokio::sync::mpsc::UnboundedReceiver<PollMsg>,
) -> Result<()> {
    let mut stdout = JsonLinesEmitter::new(io::stdout());

    loop {
        let msg = tokio::select! {
            msg = rx.recv() => match msg {
                Some(msg) => msg,
                None => anyhow::bail!("all pollers stopped"),
            },
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for Ctrl-C")?;
                tracing::info!("shutting down");
                return Ok(());
            }
        };

        match msg {
            PollMsg::Event { user, item } => {
                stdout
                    .emit(&item)
                    .context("failed to write event to stdout")?;
                health.record_event(&user, Utc::now());
            }
            PollMsg::CycleDone { user, report } => finish_cycle(&mut health, &user, report),
            PollMsg::Error { user, error } => cycle_failed(&mut health, &user, &error),
        }
    }
}
