//! Probe command line.

use crate::errors::ProbeError;
use crate::probe::ProbeSettings;
use clap::Parser;
use common::exit_code;
use common::probe_flags::{
    ARG_ENDPOINT, ARG_EXPECTED_STATUS, ARG_EXPECT_FAIL, ARG_TIMEOUT, ARG_TYPE, ARG_URL,
};
use common::types::ProbeKind;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "netcheck-probe", about = "Single-shot network connectivity probe")]
pub struct Args {
    /// URL (HTTP), host:port (TCP) or host name (DNS) to check.
    #[arg(long = ARG_URL, visible_alias = ARG_ENDPOINT, default_value = "")]
    pub url: String,

    /// Timeout for the check (e.g. 5s, 1m).
    #[arg(long = ARG_TIMEOUT, default_value = "5s", value_parser = humantime::parse_duration)]
    pub timeout: Duration,

    /// Expected HTTP status code (0 expects a connection failure).
    #[arg(long = ARG_EXPECTED_STATUS, default_value_t = 200)]
    pub expected_status: u16,

    /// Type of check: http, tcp or dns.
    #[arg(long = ARG_TYPE, default_value = "http")]
    pub kind: ProbeKind,

    /// Pass when the connection fails (TCP and DNS only).
    #[arg(long = ARG_EXPECT_FAIL)]
    pub expect_fail: bool,
}

impl Args {
    /// Validate parsed flags into probe settings.
    ///
    /// # Errors
    ///
    /// - `ProbeError::InvalidFlags` - no URL was given
    pub fn into_settings(self) -> Result<ProbeSettings, ProbeError> {
        if self.url.trim().is_empty() {
            return Err(ProbeError::InvalidFlags(format!(
                "URL must be specified with --{ARG_URL}"
            )));
        }

        Ok(ProbeSettings {
            kind: self.kind,
            target: self.url,
            timeout: self.timeout,
            expected_status: self.expected_status,
            expect_fail: self.expect_fail,
        })
    }
}

/// Exit code for a command line clap rejected. Help and version output exit 0.
pub fn parse_error_exit_code(error: &clap::Error) -> i32 {
    if error.use_stderr() {
        exit_code::CONFIG_ERROR
    } else {
        exit_code::SUCCESS
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_from(std::iter::once("netcheck-probe").chain(args.iter().copied()))
    }

    #[test]
    fn test_defaults() {
        let settings = parse(&["--url", "http://web.shop.svc/health"])
            .unwrap()
            .into_settings()
            .unwrap();

        assert_eq!(
            settings,
            ProbeSettings {
                kind: ProbeKind::Http,
                target: "http://web.shop.svc/health".to_string(),
                timeout: Duration::from_secs(5),
                expected_status: 200,
                expect_fail: false,
            }
        );
    }

    #[test]
    fn test_endpoint_alias_and_all_flags() {
        let settings = parse(&[
            "--endpoint",
            "db.data.svc:5432",
            "--type",
            "TCP",
            "--timeout",
            "1m 30s",
            "--expected-status",
            "0",
            "--expect-fail",
        ])
        .unwrap()
        .into_settings()
        .unwrap();

        assert_eq!(settings.target, "db.data.svc:5432");
        assert_eq!(settings.kind, ProbeKind::Tcp);
        assert_eq!(settings.timeout, Duration::from_secs(90));
        assert_eq!(settings.expected_status, 0);
        assert!(settings.expect_fail);
    }

    #[test]
    fn test_missing_url_is_config_error() {
        let cases: [&[&str]; 3] = [&[], &["--url", ""], &["--url", "  "]];
        for args in cases {
            let err = parse(args).unwrap().into_settings().unwrap_err();
            assert!(matches!(err, ProbeError::InvalidFlags(_)));
            assert_eq!(err.exit_code(), exit_code::CONFIG_ERROR);
        }
    }

    #[test]
    fn test_rejected_flags_are_config_errors() {
        for args in [
            &["--url", "x", "--type", "icmp"][..],
            &["--url", "x", "--timeout", "soon"][..],
            &["--url", "x", "--expected-status", "abc"][..],
            &["--url", "x", "--bogus"][..],
        ] {
            let err = parse(args).unwrap_err();
            assert_eq!(parse_error_exit_code(&err), exit_code::CONFIG_ERROR, "{args:?}");
        }
    }

    #[test]
    fn test_help_exits_cleanly() {
        let err = parse(&["--help"]).unwrap_err();
        assert_eq!(parse_error_exit_code(&err), exit_code::SUCCESS);
    }
}
