use crate::config::JwksConfig;
use crate::keys::{self, FetchError};
use crate::reload::ReloadError;
use crate::writer::{self, WriteError};
use log::{error, info, warn};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("problem fetching JWKS: {0}")]
    Fetch(#[from] FetchError),
    #[error("reload error: {0}")]
    Reload(#[from] ReloadError),
    #[error("problem processing {} key(s): {}", .0.len(), join_errors(.0))]
    Keys(Vec<WriteError>),
}

fn join_errors(errors: &[WriteError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct JobOutcome {
    pub changed: bool,
    pub reloaded: bool,
    pub written: Vec<PathBuf>,
}

/// Fetch, write and reload for one configured key set.
///
/// A reload that failed is retried on the next run even if no key changed
/// in between, since the files on disk are already up to date by then.
#[derive(Debug)]
pub struct Job {
    config: JwksConfig,
    pending_reload: bool,
}

impl Job {
    pub fn new(config: JwksConfig) -> Self {
        Job {
            config,
            pending_reload: false,
        }
    }

    pub async fn run(&mut self) -> Result<JobOutcome, JobError> {
        let mut keys = keys::fetch_jwks(&self.config.jwks_url, self.config.timeout).await?;
        info!("fetched {} key(s) from {}", keys.len(), self.config.jwks_url);

        let report = writer::write_keys(
            &mut keys,
            &self.config.pattern,
            self.config.out_dir.as_deref(),
        );
        for err in &report.errors {
            error!("{}", err);
        }

        let mut outcome = JobOutcome {
            changed: report.changed,
            reloaded: false,
            written: report.written,
        };

        if !outcome.changed {
            info!("no changes to keys");
        }

        if outcome.changed || self.pending_reload {
            if let Some(reloader) = &self.config.reloader {
                if self.pending_reload && !outcome.changed {
                    warn!("retrying reload that failed on a previous run");
                }
                if let Err(e) = reloader.reload().await {
                    self.pending_reload = true;
                    return Err(e.into());
                }
                self.pending_reload = false;
                outcome.reloaded = true;
                info!("reload of process completed: {}", reloader);
            }
        }

        if !report.errors.is_empty() {
            return Err(JobError::Keys(report.errors));
        }
        Ok(outcome)
    }
}
