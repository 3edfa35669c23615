//! Netcheck probe
//!
//! Runs one DNS, TCP or HTTP check and exits with a code describing the
//! outcome:
//! - 0: check passed
//! - 1: connection failed
//! - 2: invalid flags
//! - 3: assertion failed (unexpected success or status mismatch)

use clap::Parser;
use common::exit_code;
use netcheck_probe::build_probe;
use netcheck_probe::cli::{parse_error_exit_code, Args};
use std::process::ExitCode;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "netcheck_probe=info,netcheck=info".into()),
        )
        .with_target(false)
        .init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return exit_with(parse_error_exit_code(&e));
        }
    };

    let settings = match args.into_settings() {
        Ok(settings) => settings,
        Err(e) => {
            error!("{}", e);
            return exit_with(e.exit_code());
        }
    };

    info!(
        kind = %settings.kind,
        target = %settings.target,
        timeout = %humantime::format_duration(settings.timeout),
        expected_status = settings.expected_status,
        expect_fail = settings.expect_fail,
        "Running probe"
    );

    match build_probe(&settings).run().await {
        Ok(()) => {
            info!("Probe succeeded");
            exit_with(exit_code::SUCCESS)
        }
        Err(e) => {
            error!(error = %e, "Probe failed");
            exit_with(e.exit_code())
        }
    }
}

fn exit_with(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}
