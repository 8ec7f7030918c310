//! director CLI: classify, replay, and serve change-feed notifications.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use broadcast_director::config::{Config, DirectorConfig};
use broadcast_director::engine::{self, Director};
use broadcast_director::event::DirectorEvent;
use broadcast_director::model::DirectorState;
use broadcast_director::normalize::{ChangeNotification, classify, classify_now};
use broadcast_director::telemetry::{TelemetryConfig, init_telemetry};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt as _, BufReader};
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "director", about = "Narration director for the outage broadcast")]
struct Cli {
    /// TOML file with a [director] table (overrides DIRECTOR_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the normalized event for each narratable notification
    Classify {
        /// NDJSON file of change notifications (stdin when omitted)
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Run timed notifications through a director on a virtual clock
    Replay {
        /// NDJSON file; each line may carry an `at_ms` offset
        #[arg(long)]
        input: PathBuf,
        /// Wall-clock time of offset zero, RFC 3339 (default: Unix epoch)
        #[arg(long)]
        epoch: Option<DateTime<Utc>>,
    },
    /// Read notifications from stdin live and print every state change
    Serve,
}

/// One replay line: a notification plus when it arrives.
#[derive(Deserialize)]
struct TimedNotification {
    #[serde(default)]
    at_ms: u64,
    #[serde(flatten)]
    notification: ChangeNotification,
}

#[derive(Serialize)]
struct ReplayLine<'a> {
    t_ms: u64,
    #[serde(flatten)]
    event: &'a DirectorEvent,
    state: &'a DirectorState,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = Config::from_env()?;
    if let Some(path) = &cli.config {
        config.director = DirectorConfig::from_toml_file(path)?;
    }

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "director".to_string(),
        log_level: config.log_level.clone(),
    })?;

    match cli.command {
        Command::Classify { input } => cmd_classify(input.as_deref()).await,
        Command::Replay { input, epoch } => {
            cmd_replay(config.director, &input, epoch.unwrap_or(DateTime::<Utc>::UNIX_EPOCH))
        }
        Command::Serve => cmd_serve(config.director).await,
    }
}

async fn cmd_classify(input: Option<&Path>) -> anyhow::Result<()> {
    let content = match input {
        Some(path) => tokio::fs::read_to_string(path).await?,
        None => {
            let mut buf = String::new();
            tokio::io::AsyncReadExt::read_to_string(&mut tokio::io::stdin(), &mut buf).await?;
            buf
        }
    };

    let mut stdout = std::io::stdout().lock();
    let mut narratable = 0usize;
    for (n, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let notification = match ChangeNotification::from_json(line) {
            Ok(notification) => notification,
            Err(e) => {
                warn!(line = n + 1, error = %e, "skipping malformed notification");
                continue;
            }
        };
        if let Some(event) = classify_now(&notification) {
            narratable += 1;
            writeln!(stdout, "{}", serde_json::to_string(&event)?)?;
        }
    }

    info!(narratable, "classification finished");
    Ok(())
}

fn cmd_replay(config: DirectorConfig, input: &Path, epoch: DateTime<Utc>) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(input)?;

    let mut timeline = Vec::new();
    for (n, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<TimedNotification>(line) {
            Ok(timed) => timeline.push(timed),
            Err(e) => warn!(line = n + 1, error = %e, "skipping malformed notification"),
        }
    }
    // Stable: lines sharing an offset keep file order.
    timeline.sort_by_key(|t| t.at_ms);

    let origin = Instant::now();
    let mut director = Director::anchored(config, origin, epoch);
    let mut stdout = std::io::stdout().lock();

    for timed in timeline {
        let arrival = origin + Duration::from_millis(timed.at_ms);
        run_timers_until(&mut director, origin, Some(arrival), &mut stdout)?;

        let classified_at = epoch + chrono::Duration::milliseconds(timed.at_ms as i64);
        if let Some(event) = classify(&timed.notification, classified_at) {
            director.enqueue(event, arrival);
        }
        emit(&mut director, origin, arrival, &mut stdout)?;
    }
    run_timers_until(&mut director, origin, None, &mut stdout)?;

    Ok(())
}

/// Step through pending timers one deadline at a time, stopping short of
/// `until`. Timers due exactly at an arrival fire after it, as in `serve`.
fn run_timers_until(
    director: &mut Director,
    origin: Instant,
    until: Option<Instant>,
    out: &mut impl std::io::Write,
) -> anyhow::Result<()> {
    while let Some(deadline) = director.next_deadline() {
        if until.is_some_and(|limit| deadline >= limit) {
            break;
        }
        director.poll(deadline);
        emit(director, origin, deadline, &mut *out)?;
    }
    Ok(())
}

fn emit(
    director: &mut Director,
    origin: Instant,
    at: Instant,
    out: &mut impl std::io::Write,
) -> anyhow::Result<()> {
    let t_ms = at.saturating_duration_since(origin).as_millis() as u64;
    for event in director.drain_events() {
        let line = ReplayLine {
            t_ms,
            event: &event,
            state: director.state(),
        };
        writeln!(out, "{}", serde_json::to_string(&line)?)?;
    }
    Ok(())
}

async fn cmd_serve(config: DirectorConfig) -> anyhow::Result<()> {
    let (director, task) = engine::spawn(config);
    info!(session = %director.session(), "serving narration from stdin");

    let ctrl = director.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        ctrl.shutdown();
    });

    // Feed stdin into the director; once it ends, stop after the last
    // narration has played out.
    let feeder = director.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => {
                    let notification = match ChangeNotification::from_json(&line) {
                        Ok(notification) => notification,
                        Err(e) => {
                            warn!(error = %e, "skipping malformed notification");
                            continue;
                        }
                    };
                    if let Some(event) = classify_now(&notification) {
                        if feeder.enqueue(event).is_err() {
                            return;
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "stdin read failed");
                    break;
                }
            }
        }
        info!("feed ended, waiting for the queue to drain");
        if feeder.idle().await.is_ok() {
            feeder.shutdown();
        }
    });

    let mut states = director.subscribe();
    drop(director);
    while states.changed().await.is_ok() {
        let state = states.borrow_and_update().clone();
        println!("{}", serde_json::to_string(&state)?);
    }

    task.await?;
    Ok(())
}
