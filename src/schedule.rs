use crate::job::Job;
use chrono::{DateTime, Local, TimeZone};
use croner::errors::CronError;
use croner::Cron;
use log::{debug, error, info};
use std::future::Future;
use thiserror::Error;
use tokio::signal;

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("invalid cron schedule '{pattern}': {source}")]
    Parse {
        pattern: String,
        #[source]
        source: CronError,
    },
    #[error("no upcoming run for schedule '{pattern}': {source}")]
    NoUpcomingRun {
        pattern: String,
        #[source]
        source: CronError,
    },
}

/// A cron expression in the usual five-field form, optionally preceded by a
/// seconds field.
#[derive(Debug)]
pub struct Schedule {
    pattern: String,
    cron: Cron,
}

impl Schedule {
    pub fn parse(pattern: &str) -> Result<Self, ScheduleError> {
        let cron = Cron::new(pattern)
            .with_seconds_optional()
            .parse()
            .map_err(|source| ScheduleError::Parse {
                pattern: pattern.to_string(),
                source,
            })?;
        Ok(Schedule {
            pattern: pattern.to_string(),
            cron,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// First fire time strictly after `now`.
    pub fn next_after<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Result<DateTime<Tz>, ScheduleError> {
        self.cron
            .find_next_occurrence(now, false)
            .map_err(|source| ScheduleError::NoUpcomingRun {
                pattern: self.pattern.clone(),
                source,
            })
    }
}

/// Runs `job` on every tick of `schedule` until SIGINT or SIGTERM.
///
/// Runs never overlap: the next tick is computed once the previous run has
/// finished. A failing run is logged and the schedule carries on.
pub async fn run_schedule(schedule: Schedule, job: Job) -> Result<(), ScheduleError> {
    run_until(schedule, job, shutdown_signal()).await
}

pub async fn run_until<F>(schedule: Schedule, mut job: Job, shutdown: F) -> Result<(), ScheduleError>
where
    F: Future<Output = ()>,
{
    info!("starting cron process, schedule: {}", schedule.pattern());
    tokio::pin!(shutdown);

    loop {
        let now = Local::now();
        let next = schedule.next_after(&now)?;
        let wait = (next - now).to_std().unwrap_or_default();
        debug!("next run at {} (in {:?})", next, wait);

        tokio::select! {
            _ = tokio::time::sleep(wait) => {
                match job.run().await {
                    Ok(outcome) => debug!("run finished: {:?}", outcome),
                    Err(e) => error!("{}", e),
                }
            }
            _ = &mut shutdown => {
                info!("stopping cron process");
                return Ok(());
            }
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, shutting down..."),
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
                info!("Received SIGTERM, shutting down...");
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
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
