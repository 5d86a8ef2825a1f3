use crate::cli::SyncArgs;
use crate::pattern::{Pattern, PatternError};
use crate::reload::{HttpReloader, ProcessReloader, Reloader, UnixSocketReloader};
use log::warn;
use reqwest::Method;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("problem parsing pattern: {0}")]
    Pattern(#[from] PatternError),
    #[error("invalid reload method '{0}'")]
    InvalidMethod(String),
}

/// Validated settings for one sync of a key set.
#[derive(Debug, Clone)]
pub struct JwksConfig {
    pub jwks_url: String,
    pub out_dir: Option<PathBuf>,
    pub pattern: Pattern,
    pub timeout: Duration,
    pub reloader: Option<Reloader>,
}

impl JwksConfig {
    pub fn new(jwks_url: impl Into<String>) -> Self {
        JwksConfig {
            jwks_url: jwks_url.into(),
            out_dir: None,
            pattern: Pattern::default(),
            timeout: Duration::from_secs(5),
            reloader: None,
        }
    }

    pub fn from_args(args: &SyncArgs) -> Result<Self, ConfigError> {
        let pattern = Pattern::parse(&args.pattern)?;
        let payload = args.reload_payload.clone().map(String::into_bytes);

        let reloader = if let Some(url) = &args.reload_url {
            let method = Method::from_bytes(args.reload_method.to_ascii_uppercase().as_bytes())
                .map_err(|_| ConfigError::InvalidMethod(args.reload_method.clone()))?;
            Some(Reloader::Http(HttpReloader::new(
                url.clone(),
                method,
                payload,
                args.timeout,
            )))
        } else if let Some(socket) = &args.reload_socket {
            Some(Reloader::UnixSocket(UnixSocketReloader::new(
                socket,
                payload.unwrap_or_default(),
            )))
        } else {
            if payload.is_some() {
                warn!("--reload.payload is only used with --reload.url or --reload.socket");
            }
            if let Some(pidfile) = &args.reload_pidfile {
                Some(Reloader::Process(ProcessReloader::from_pidfile(
                    pidfile,
                    args.reload_signal,
                )))
            } else {
                args.reload_pid
                    .map(|pid| Reloader::Process(ProcessReloader::new(pid, args.reload_signal)))
            }
        };

        Ok(JwksConfig {
            jwks_url: args.url.clone(),
            out_dir: args.out.clone(),
            pattern,
            timeout: args.timeout,
            reloader,
        })
    }
}
