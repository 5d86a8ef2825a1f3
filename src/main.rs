use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use jwks_to_pem::cli::{Cli, Command};
use jwks_to_pem::config::JwksConfig;
use jwks_to_pem::job::Job;
use jwks_to_pem::schedule::{self, Schedule};
use log::{debug, error, LevelFilter};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.command.sync_args().debug);

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(debug: bool) {
    let default_level = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let mut builder =
        env_logger::Builder::from_env(Env::default().default_filter_or(default_level.as_str()));
    builder.format_timestamp_millis();
    builder.init();
}

async fn run(command: Command) -> Result<()> {
    let args = command.sync_args();
    debug!(
        "command line flags: url={} out={:?} pattern={} timeout={:?}",
        args.url, args.out, args.pattern, args.timeout
    );
    let config = JwksConfig::from_args(args).context("invalid configuration")?;

    match command {
        Command::Run(_) => {
            Job::new(config).run().await?;
        }
        Command::Cron(args) => {
            let schedule = Schedule::parse(&args.schedule)?;
            schedule::run_schedule(schedule, Job::new(config)).await?;
        }
    }
    Ok(())
}
