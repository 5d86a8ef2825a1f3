use crate::pattern::DEFAULT_PATTERN;
use crate::reload::ReloadSignal;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// Retrieve keys from a JWKS URL and save as PEM encoded files
#[derive(Debug, Parser)]
#[command(name = "jwks-to-pem", version, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch the key set once, write changed keys and trigger a reload
    Run(SyncArgs),
    /// Repeat `run` on a cron schedule until interrupted
    Cron(CronArgs),
}

impl Command {
    pub fn sync_args(&self) -> &SyncArgs {
        match self {
            Command::Run(args) => args,
            Command::Cron(args) => &args.sync,
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct SyncArgs {
    /// URL for JSON Web Key Set (JWKS)
    #[arg(short, long, env = "JWKS_URL")]
    pub url: String,

    /// Output directory; keys are printed to stdout when omitted
    #[arg(short, long, env = "JWKS_OUT")]
    pub out: Option<PathBuf>,

    /// Output file name pattern
    #[arg(short, long, env = "JWKS_PATTERN", default_value = DEFAULT_PATTERN)]
    pub pattern: String,

    /// Timeout to retrieve the JWKS and to call the reload URL
    #[arg(long, env = "JWKS_TIMEOUT", default_value = "5s", value_parser = humantime::parse_duration)]
    pub timeout: Duration,

    /// Enable debug logging
    #[arg(long, env = "JWKS_DEBUG")]
    pub debug: bool,

    /// URL to use for reloads
    #[arg(
        long = "reload.url",
        env = "JWKS_RELOAD_URL",
        conflicts_with_all = ["reload_pid", "reload_pidfile", "reload_socket"]
    )]
    pub reload_url: Option<String>,

    /// Method to use for the reload URL
    #[arg(long = "reload.method", env = "JWKS_RELOAD_METHOD", default_value = "POST")]
    pub reload_method: String,

    /// Payload sent with URL and socket reloads
    #[arg(long = "reload.payload", env = "JWKS_RELOAD_PAYLOAD")]
    pub reload_payload: Option<String>,

    /// Process ID to signal for reloads
    #[arg(
        long = "reload.pid",
        env = "JWKS_RELOAD_PID",
        conflicts_with_all = ["reload_pidfile", "reload_socket"]
    )]
    pub reload_pid: Option<i32>,

    /// File to look up the process ID to signal for reloads
    #[arg(
        long = "reload.pidfile",
        env = "JWKS_RELOAD_PIDFILE",
        conflicts_with = "reload_socket"
    )]
    pub reload_pidfile: Option<PathBuf>,

    /// Signal to send for process reloads (HUP, KILL, USR1, USR2)
    #[arg(long = "reload.signal", env = "JWKS_RELOAD_SIGNAL", default_value = "HUP")]
    pub reload_signal: ReloadSignal,

    /// Unix domain socket to write the payload to for reloads
    #[arg(long = "reload.socket", env = "JWKS_RELOAD_SOCKET")]
    pub reload_socket: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
pub struct CronArgs {
    /// Cron pattern for scheduling checks of the JWKS
    #[arg(long, env = "JWKS_SCHEDULE")]
    pub schedule: String,

    #[command(flatten)]
    pub sync: SyncArgs,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_uses_defaults() {
        let cli = Cli::try_parse_from(["jwks-to-pem", "run", "--url", "https://example.com/jwks"])
            .unwrap();
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };

        assert_eq!(args.pattern, DEFAULT_PATTERN);
        assert_eq!(args.timeout, Duration::from_secs(5));
        assert_eq!(args.reload_method, "POST");
        assert_eq!(args.reload_signal, ReloadSignal::Hup);
        assert!(args.out.is_none());
    }

    #[test]
    fn cron_takes_schedule_and_sync_flags() {
        let cli = Cli::try_parse_from([
            "jwks-to-pem",
            "cron",
            "--schedule",
            "*/5 * * * *",
            "-u",
            "https://example.com/jwks",
            "-o",
            "/tmp/keys",
            "--timeout",
            "1m 30s",
            "--reload.pidfile",
            "/run/app.pid",
            "--reload.signal",
            "usr1",
        ])
        .unwrap();

        let Command::Cron(args) = &cli.command else {
            panic!("expected cron");
        };
        assert_eq!(args.schedule, "*/5 * * * *");
        assert_eq!(cli.command.sync_args().timeout, Duration::from_secs(90));
        assert_eq!(args.sync.reload_signal, ReloadSignal::Usr1);
        assert_eq!(args.sync.reload_pidfile, Some(PathBuf::from("/run/app.pid")));
    }

    #[test]
    fn reload_targets_are_exclusive() {
        for extra in [
            ["--reload.pid", "1", "--reload.pidfile", "/run/app.pid"],
            ["--reload.url", "http://localhost", "--reload.pid", "1"],
            ["--reload.url", "http://localhost", "--reload.socket", "/run/app.sock"],
            ["--reload.pidfile", "/run/app.pid", "--reload.socket", "/run/app.sock"],
        ] {
            let mut args = vec!["jwks-to-pem", "run", "--url", "https://example.com/jwks"];
            args.extend(extra);
            assert!(Cli::try_parse_from(args).is_err(), "{extra:?}");
        }
    }

    #[test]
    fn url_is_required() {
        assert!(Cli::try_parse_from(["jwks-to-pem", "run"]).is_err());
    }

    #[test]
    fn unknown_signal_is_rejected() {
        assert!(Cli::try_parse_from([
            "jwks-to-pem",
            "run",
            "--url",
            "https://example.com/jwks",
            "--reload.signal",
            "TERM",
        ])
        .is_err());
    }
}
