//! Invite runner
//!
//! Single-binary service that:
//! 1. Loads config, the bearer credential, and the record files from earlier runs
//! 2. Keeps a bounded pool of submissions busy with fresh, unclaimed tokens
//! 3. Records accepted and rejected tokens as it goes
//! 4. Stops on SIGINT/SIGTERM or when the credential is rejected, then prints a summary

mod config;
mod metrics;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use common::Token;
use invite_client::HttpSubmitter;
use invite_pool::{
    ClaimStore, Generate, Ledger, RandomGenerator, RetryPolicy, Scheduler, SchedulerConfig,
};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

/// Exit status when the run ended because the credential was rejected.
const EXIT_AUTH_REJECTED: u8 = 2;

#[derive(Debug, Parser)]
#[command(name = "invite-runner", version, about = "Concurrent invite token submission")]
struct Cli {
    /// Config file (falls back to CONFIG_PATH, then ./invite-runner.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Print N generated tokens and exit
    #[arg(long, value_name = "N")]
    sample: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let cli = Cli::parse();

    if let Some(count) = cli.sample {
        print_sample(count)?;
        return Ok(ExitCode::SUCCESS);
    }

    let run_id = uuid::Uuid::new_v4();
    run(cli).instrument(info_span!("run", %run_id)).await
}

async fn run(cli: Cli) -> Result<ExitCode> {
    info!("starting invite-runner");

    let config_path = Config::resolve_path(cli.config.as_deref());
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        endpoint = %config.client.endpoint,
        max_workers = config.pool.max_workers,
        max_retries = config.pool.max_retries,
        headers = config.client.headers.len(),
        "configuration loaded"
    );

    if let Some(addr) = config.metrics.listen_addr {
        metrics::install_exporter(addr)?;
        info!(listen_addr = %addr, "Prometheus exporter listening");
    }

    let credential = common::load_bearer(&config.client.auth_file)
        .context("failed to load bearer credential")?;
    let submitter = HttpSubmitter::new(config.submitter_config(credential))
        .context("failed to build HTTP client")?;

    let ledger = Ledger::new(config.record_paths());
    let (used, invalid) = ledger
        .load_history()
        .await
        .context("failed to read record files")?;
    let claims = Arc::new(ClaimStore::with_history(used, invalid));

    let retry = RetryPolicy::new(config.pool.max_retries, config.pool.retry_delay())
        .context("invalid retry settings")?;
    let scheduler = Scheduler::new(
        SchedulerConfig {
            width: config.pool.max_workers,
            delay: config.pool.delay(),
            retry,
            max_claim_attempts: config.pool.max_claim_attempts,
        },
        claims,
        ledger,
        Arc::new(submitter),
        Box::new(RandomGenerator),
    )
    .context("invalid pool settings")?;

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        trigger.cancel();
    });

    let summary = scheduler.run(shutdown).await;
    println!("{summary}");

    if summary.halted_on_auth {
        error!("run halted: credential rejected, update the auth token and restart");
        return Ok(ExitCode::from(EXIT_AUTH_REJECTED));
    }
    info!("shutdown complete");
    Ok(ExitCode::SUCCESS)
}

/// Print `count` generated tokens, checking each against the token format.
fn print_sample(count: usize) -> Result<()> {
    let mut generator = RandomGenerator;
    for _ in 0..count {
        let token = generator.generate();
        Token::parse(token.as_str())
            .with_context(|| format!("generator produced a malformed token: {token}"))?;
        println!("{token}");
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_config_and_sample() {
        let cli = Cli::try_parse_from(["invite-runner", "--config", "/etc/runner.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/runner.toml")));
        assert_eq!(cli.sample, None);

        let cli = Cli::try_parse_from(["invite-runner", "--sample", "5"]).unwrap();
        assert_eq!(cli.sample, Some(5));
        assert!(cli.config.is_none());
    }

    #[test]
    fn cli_rejects_non_numeric_sample() {
        assert!(Cli::try_parse_from(["invite-runner", "--sample", "many"]).is_err());
    }

    #[test]
    fn print_sample_succeeds() {
        print_sample(20).unwrap();
    }

    /// Mock endpoint: rejects the first `rejections` codes with 403, then
    /// answers 401. Captures (authorization, invite_code) per request.
    async fn start_mock_endpoint(
        rejections: usize,
    ) -> (String, Arc<std::sync::Mutex<Vec<(String, String)>>>) {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let captured = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = captured.clone();
        let seen = Arc::new(AtomicUsize::new(0));

        let app = axum::Router::new().route(
            "/invite/accept",
            axum::routing::post(
                move |headers: axum::http::HeaderMap,
                      axum::Json(body): axum::Json<serde_json::Value>| {
                    let sink = sink.clone();
                    let seen = seen.clone();
                    async move {
                        let auth = headers
                            .get("authorization")
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or_default()
                            .to_string();
                        let code = body["invite_code"].as_str().unwrap_or_default().to_string();
                        sink.lock().unwrap().push((auth, code));
                        if seen.fetch_add(1, Ordering::SeqCst) < rejections {
                            axum::http::StatusCode::FORBIDDEN
                        } else {
                            axum::http::StatusCode::UNAUTHORIZED
                        }
                    }
                },
            ),
        );
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{addr}/invite/accept"), captured)
    }

    #[tokio::test]
    async fn run_records_rejections_and_halts_on_auth_error() {
        let (endpoint, captured) = start_mock_endpoint(3).await;
        let dir = tempfile::tempdir().unwrap();
        let auth_file = dir.path().join("auth.txt");
        std::fs::write(&auth_file, "Bearer e2e-bearer\n").unwrap();
        let invalid = dir.path().join("invalid_codes.txt");
        let success = dir.path().join("success.txt");

        let config_path = dir.path().join("invite-runner.toml");
        std::fs::write(
            &config_path,
            format!(
                r#"
[pool]
max_workers = 1
delay_secs = 0.0
max_retries = 2
retry_delay_secs = 0.1

[client]
endpoint = "{endpoint}"
device_id = "device-e2e"
user_agent = "invite-runner-test/1.0"
auth_file = "{auth}"

[files]
used = "{used}"
success = "{success}"
invalid = "{invalid}"
"#,
                auth = auth_file.display(),
                used = dir.path().join("used_codes.txt").display(),
                success = success.display(),
                invalid = invalid.display(),
            ),
        )
        .unwrap();

        let cli = Cli {
            config: Some(config_path),
            sample: None,
        };
        let code = run(cli).await.unwrap();
        assert_eq!(code, ExitCode::from(EXIT_AUTH_REJECTED));

        // Every 403 is recorded even though the run halted mid-flight
        let rejected = std::fs::read_to_string(&invalid).unwrap();
        let rejected: Vec<&str> = rejected.lines().collect();
        assert_eq!(rejected.len(), 3, "got: {rejected:?}");
        for line in &rejected {
            assert!(Token::parse(line).is_ok(), "bad record {line:?}");
        }
        assert!(!success.exists());

        let requests = captured.lock().unwrap().clone();
        assert!(requests.len() >= 4);
        for (auth, code) in requests {
            assert_eq!(auth, "Bearer e2e-bearer");
            assert!(Token::parse(&code).is_ok(), "bad invite_code {code:?}");
        }
    }
}
