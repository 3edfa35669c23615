//! Netcheck Runner
//!
//! Runs declarative network connectivity test plans against live Kubernetes
//! pods using ephemeral probe containers, or a single check from one pod
//! (`check`) or between two pods (`check-pod`).
//!
//! Exit codes:
//! - 0: every check passed
//! - 1: at least one check failed or errored
//! - 2: configuration error (bad plan, bad settings, no cluster access)

use clap::{Parser, Subcommand};
use common::exit_code;
use common::types::ProbeKind;
use netcheck_runner::adhoc::{
    run_adhoc_check, run_pod_to_pod_check, AdHocCheck, PodToPodCheck,
};
use netcheck_runner::cluster::KubeClusterClient;
use netcheck_runner::config::Config;
use netcheck_runner::engine::{CheckOutcome, EngineSettings, TestEngine};
use netcheck_runner::errors::RunnerError;
use netcheck_runner::launcher::ProbeLauncher;
use netcheck_runner::plan::{load_test_plan, Test};
use netcheck_runner::report::Reporter;
use std::io;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(
    name = "netcheck-runner",
    about = "Network connectivity tests for Kubernetes pods"
)]
struct Cli {
    /// Kubeconfig context to use (defaults to in-cluster, then the current context).
    #[arg(long, short = 'c', global = true)]
    context: Option<String>,

    /// Probe image for checks without a probeImage override.
    #[arg(long, global = true)]
    default_probe_image: Option<String>,

    /// Pods exercised in parallel per target.
    #[arg(long, global = true)]
    concurrency: Option<NonZeroUsize>,

    /// Interval between probe status fetches (e.g. 500ms, 2s).
    #[arg(long, global = true, value_parser = humantime::parse_duration)]
    poll_interval: Option<Duration>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run every check of a test plan.
    ExecuteTest {
        /// Test plan file.
        #[arg(long, short = 'f')]
        file: PathBuf,
    },

    /// Run a single check from the first ready pod whose name matches a pattern.
    Check {
        /// Namespace of the source pod.
        #[arg(long, short = 'n')]
        namespace: String,

        /// Regular expression matched against pod names.
        #[arg(long)]
        pod_pattern: String,

        /// URL (HTTP), host:port (TCP) or host name (DNS).
        #[arg(long)]
        endpoint: String,

        /// Type of check: http, tcp or dns.
        #[arg(long = "type", default_value = "http")]
        kind: ProbeKind,

        /// Expected HTTP status code (0 expects a connection failure).
        #[arg(long, default_value_t = 200)]
        expected_status: u16,

        /// Pass when the check fails.
        #[arg(long)]
        expect_fail: bool,

        /// Probe timeout (e.g. 5s, 1m).
        #[arg(long, value_parser = humantime::parse_duration)]
        timeout: Option<Duration>,

        /// Probe image for this check.
        #[arg(long)]
        probe_image: Option<String>,
    },

    /// Run a TCP check from one pod to a port on another pod's IP address.
    CheckPod {
        /// Namespace of the source pod.
        #[arg(long, short = 'n')]
        namespace: String,

        /// Regular expression matched against source pod names.
        #[arg(long)]
        pod_pattern: String,

        /// Namespace of the destination pod.
        #[arg(long)]
        to_namespace: String,

        /// Regular expression matched against destination pod names.
        #[arg(long)]
        to_pod_pattern: String,

        /// Destination port.
        #[arg(long)]
        port: u16,

        /// Pass when the connection fails.
        #[arg(long)]
        expect_fail: bool,

        /// Probe timeout (e.g. 5s, 1m).
        #[arg(long, value_parser = humantime::parse_duration)]
        timeout: Option<Duration>,

        /// Probe image for this check.
        #[arg(long)]
        probe_image: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = Config::from_env();
    init_tracing(config.as_ref().is_ok_and(|c| c.log_json));

    let mut config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return exit_with(exit_code::CONFIG_ERROR);
        }
    };
    apply_overrides(&mut config, &cli);

    info!(
        probe_image = %config.probe_image,
        poll_interval_ms = config.poll_interval.as_millis() as u64,
        poll_timeout_seconds = config.poll_timeout.as_secs(),
        concurrency = config.concurrency,
        "Configuration loaded successfully"
    );

    match cli.command {
        Command::ExecuteTest { file } => {
            // A bad plan is reported before any cluster access.
            let plan = match load_test_plan(&file) {
                Ok(plan) => plan,
                Err(e) => {
                    error!(code = e.code(), "Failed to load test plan: {}", e);
                    return exit_with(if e.is_fatal() {
                        exit_code::CONFIG_ERROR
                    } else {
                        exit_code::FAILURE
                    });
                }
            };

            let Some(engine) = build_engine(&config).await else {
                return exit_with(exit_code::CONFIG_ERROR);
            };
            let outcome = engine.execute_test(&plan, &mut Reporter::stdout()).await;

            if outcome.passed() {
                exit_with(exit_code::SUCCESS)
            } else {
                exit_with(exit_code::FAILURE)
            }
        }
        Command::Check {
            namespace,
            pod_pattern,
            endpoint,
            kind,
            expected_status,
            expect_fail,
            timeout,
            probe_image,
        } => {
            let check = AdHocCheck {
                namespace,
                pod_pattern,
                test: Test {
                    name: "ad-hoc".to_string(),
                    endpoint,
                    status_code: expected_status,
                    kind,
                    expect_fail,
                    timeout,
                    probe_image,
                },
            };

            let Some(engine) = build_engine(&config).await else {
                return exit_with(exit_code::CONFIG_ERROR);
            };

            single_check_exit(run_adhoc_check(&engine, &check, &mut Reporter::stdout()).await)
        }
        Command::CheckPod {
            namespace,
            pod_pattern,
            to_namespace,
            to_pod_pattern,
            port,
            expect_fail,
            timeout,
            probe_image,
        } => {
            let check = PodToPodCheck {
                namespace,
                pod_pattern,
                to_namespace,
                to_pod_pattern,
                port,
                expect_fail,
                timeout,
                probe_image,
            };

            let Some(engine) = build_engine(&config).await else {
                return exit_with(exit_code::CONFIG_ERROR);
            };

            single_check_exit(
                run_pod_to_pod_check(&engine, &check, &mut Reporter::stdout()).await,
            )
        }
    }
}

fn single_check_exit(result: Result<CheckOutcome, RunnerError>) -> ExitCode {
    match result {
        Ok(outcome) => exit_with(outcome.verdict.exit_code()),
        Err(e @ RunnerError::InvalidPodPattern(_)) => {
            error!(code = e.code(), "{}", e);
            exit_with(exit_code::CONFIG_ERROR)
        }
        Err(e) => {
            error!(code = e.code(), "Check could not run: {}", e);
            exit_with(exit_code::FAILURE)
        }
    }
}

/// Connect to the cluster and wire up the engine. Cancellation follows
/// SIGINT and SIGTERM.
async fn build_engine(config: &Config) -> Option<TestEngine> {
    let client = match KubeClusterClient::connect(config.kube_context.as_deref()).await {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to create Kubernetes client: {}", e);
            return None;
        }
    };

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_shutdown(cancel.clone()));

    Some(TestEngine::new(
        Arc::new(client),
        ProbeLauncher::new(config.probe_image.clone(), config.probe_command.clone()),
        EngineSettings::from(config),
        cancel,
    ))
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "netcheck_runner=info,netcheck=info".into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
            .init();
    }
}

fn apply_overrides(config: &mut Config, cli: &Cli) {
    if let Some(context) = cli.context.as_deref().filter(|c| !c.is_empty()) {
        config.kube_context = Some(context.to_string());
    }
    if let Some(image) = cli.default_probe_image.as_deref().filter(|i| !i.is_empty()) {
        config.probe_image = image.to_string();
    }
    if let Some(concurrency) = cli.concurrency {
        config.concurrency = concurrency.get();
    }
    if let Some(interval) = cli.poll_interval.filter(|i| !i.is_zero()) {
        config.poll_interval = interval;
    }
}

/// Cancels `token` on SIGINT or SIGTERM. In-flight checks end with a
/// cancelled error and the run reports what it has.
async fn cancel_on_shutdown(token: CancellationToken) {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, cancelling remaining checks..."),
            Err(e) => {
                error!("Failed to listen for SIGINT: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, cancelling remaining checks...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    token.cancel();
}

fn exit_with(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}
