//! Reload triggers for the process consuming the key files.

use crate::keys::http_client;
use log::debug;
use reqwest::{Method, StatusCode};
use std::fmt;
use std::io;
use std::num::ParseIntError;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReloadError {
    #[error("could not open pid file {}: {source}", .path.display())]
    PidfileRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid pid from pidfile {}: {source}", .path.display())]
    InvalidPid {
        path: PathBuf,
        #[source]
        source: ParseIntError,
    },
    #[error("{0} is not a valid process id")]
    NonPositivePid(i32),
    #[error("could not signal process {pid}: {source}")]
    Signal {
        pid: i32,
        #[source]
        source: io::Error,
    },
    #[error("error during request: {0}")]
    Request(#[from] reqwest::Error),
    #[error("bad response code: {0}")]
    BadStatus(StatusCode),
    #[error("could not connect to {}: {source}", .path.display())]
    Connect {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("error writing to {}: {source}", .path.display())]
    SocketWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{0} reloads are not supported on this platform")]
    Unsupported(&'static str),
}

#[derive(Debug, Error)]
#[error("unsupported signal: {0}")]
pub struct UnknownSignal(String);

/// Signals accepted for process reloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReloadSignal {
    #[default]
    Hup,
    Kill,
    Usr1,
    Usr2,
}

#[cfg(unix)]
impl From<ReloadSignal> for nix::sys::signal::Signal {
    fn from(signal: ReloadSignal) -> Self {
        use nix::sys::signal::Signal;

        match signal {
            ReloadSignal::Hup => Signal::SIGHUP,
            ReloadSignal::Kill => Signal::SIGKILL,
            ReloadSignal::Usr1 => Signal::SIGUSR1,
            ReloadSignal::Usr2 => Signal::SIGUSR2,
        }
    }
}

impl FromStr for ReloadSignal {
    type Err = UnknownSignal;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        match upper.strip_prefix("SIG").unwrap_or(&upper) {
            "HUP" => Ok(ReloadSignal::Hup),
            "KILL" => Ok(ReloadSignal::Kill),
            "USR1" => Ok(ReloadSignal::Usr1),
            "USR2" => Ok(ReloadSignal::Usr2),
            _ => Err(UnknownSignal(s.to_string())),
        }
    }
}

impl fmt::Display for ReloadSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReloadSignal::Hup => "SIGHUP",
            ReloadSignal::Kill => "SIGKILL",
            ReloadSignal::Usr1 => "SIGUSR1",
            ReloadSignal::Usr2 => "SIGUSR2",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PidSource {
    Pid(i32),
    Pidfile(PathBuf),
}

/// Signals a process, either by PID or via a pidfile that is read again on
/// every reload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessReloader {
    source: PidSource,
    signal: ReloadSignal,
}

impl ProcessReloader {
    pub fn new(pid: i32, signal: ReloadSignal) -> Self {
        ProcessReloader {
            source: PidSource::Pid(pid),
            signal,
        }
    }

    pub fn from_pidfile(pidfile: impl Into<PathBuf>, signal: ReloadSignal) -> Self {
        ProcessReloader {
            source: PidSource::Pidfile(pidfile.into()),
            signal,
        }
    }

    pub fn pid(&self) -> Result<i32, ReloadError> {
        let pid = match &self.source {
            PidSource::Pid(pid) => *pid,
            PidSource::Pidfile(path) => read_pidfile(path)?,
        };
        // kill(2) treats 0 and negative values as process groups
        if pid <= 0 {
            return Err(ReloadError::NonPositivePid(pid));
        }
        Ok(pid)
    }

    pub fn reload(&self) -> Result<(), ReloadError> {
        let pid = self.pid()?;
        debug!("Sending {} to process {}", self.signal, pid);
        send_signal(pid, self.signal)
    }
}

fn read_pidfile(path: &Path) -> Result<i32, ReloadError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ReloadError::PidfileRead {
        path: path.to_path_buf(),
        source,
    })?;
    contents
        .trim()
        .parse()
        .map_err(|source| ReloadError::InvalidPid {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(unix)]
fn send_signal(pid: i32, signal: ReloadSignal) -> Result<(), ReloadError> {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    kill(Pid::from_raw(pid), Some(signal.into())).map_err(|errno| ReloadError::Signal {
        pid,
        source: io::Error::from(errno),
    })
}

#[cfg(not(unix))]
fn send_signal(_pid: i32, _signal: ReloadSignal) -> Result<(), ReloadError> {
    Err(ReloadError::Unsupported("signal"))
}

/// Calls a webhook; only `200 OK` counts as success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReloader {
    url: String,
    method: Method,
    payload: Option<Vec<u8>>,
    timeout: Duration,
}

impl HttpReloader {
    pub fn new(url: String, method: Method, payload: Option<Vec<u8>>, timeout: Duration) -> Self {
        HttpReloader {
            url,
            method,
            payload,
            timeout,
        }
    }

    pub async fn reload(&self) -> Result<(), ReloadError> {
        let mut request = http_client()
            .request(self.method.clone(), &self.url)
            .timeout(self.timeout);
        if let Some(payload) = &self.payload {
            request = request.body(payload.clone());
        }

        debug!("Sending {} {}", self.method, self.url);
        let res = request.send().await?;
        if res.status() != StatusCode::OK {
            return Err(ReloadError::BadStatus(res.status()));
        }
        Ok(())
    }
}

/// Writes a payload to a Unix domain socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnixSocketReloader {
    path: PathBuf,
    payload: Vec<u8>,
}

impl UnixSocketReloader {
    pub fn new(path: impl Into<PathBuf>, payload: Vec<u8>) -> Self {
        UnixSocketReloader {
            path: path.into(),
            payload,
        }
    }

    #[cfg(unix)]
    pub async fn reload(&self) -> Result<(), ReloadError> {
        use tokio::io::AsyncWriteExt;
        use tokio::net::UnixStream;

        let mut stream = UnixStream::connect(&self.path)
            .await
            .map_err(|source| ReloadError::Connect {
                path: self.path.clone(),
                source,
            })?;

        debug!(
            "Writing {} byte(s) to {}",
            self.payload.len(),
            self.path.display()
        );
        let write_err = |source: io::Error| ReloadError::SocketWrite {
            path: self.path.clone(),
            source,
        };
        stream.write_all(&self.payload).await.map_err(write_err)?;
        stream.shutdown().await.map_err(write_err)?;
        Ok(())
    }

    #[cfg(not(unix))]
    pub async fn reload(&self) -> Result<(), ReloadError> {
        Err(ReloadError::Unsupported("unix socket"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reloader {
    Process(ProcessReloader),
    Http(HttpReloader),
    UnixSocket(UnixSocketReloader),
}

impl Reloader {
    pub async fn reload(&self) -> Result<(), ReloadError> {
        match self {
            Reloader::Process(reloader) => reloader.reload(),
            Reloader::Http(reloader) => reloader.reload().await,
            Reloader::UnixSocket(reloader) => reloader.reload().await,
        }
    }
}

impl fmt::Display for Reloader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reloader::Process(reloader) => match &reloader.source {
                PidSource::Pid(pid) => write!(f, "{} to pid {}", reloader.signal, pid),
                PidSource::Pidfile(path) => {
                    write!(f, "{} to pid from {}", reloader.signal, path.display())
                }
            },
            Reloader::Http(reloader) => write!(f, "{} {}", reloader.method, reloader.url),
            Reloader::UnixSocket(reloader) => write!(f, "socket {}", reloader.path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn signal_names_parse() {
        for (input, expected) in [
            ("HUP", ReloadSignal::Hup),
            ("sighup", ReloadSignal::Hup),
            ("KILL", ReloadSignal::Kill),
            ("SIGUSR1", ReloadSignal::Usr1),
            ("usr2", ReloadSignal::Usr2),
        ] {
            assert_eq!(input.parse::<ReloadSignal>().unwrap(), expected, "{input}");
        }
        assert!("TERM".parse::<ReloadSignal>().is_err());
        assert_eq!(ReloadSignal::Usr1.to_string(), "SIGUSR1");
    }

    #[test]
    fn pidfile_is_read_on_each_lookup() {
        let dir = TempDir::new().unwrap();
        let pidfile = dir.path().join("app.pid");
        fs::write(&pidfile, "1234\n").unwrap();
        let reloader = ProcessReloader::from_pidfile(&pidfile, ReloadSignal::Hup);

        assert_eq!(reloader.pid().unwrap(), 1234);

        fs::write(&pidfile, " 5678 ").unwrap();
        assert_eq!(reloader.pid().unwrap(), 5678);
    }

    #[test]
    fn bad_pidfiles_are_reported() {
        let dir = TempDir::new().unwrap();
        let pidfile = dir.path().join("app.pid");

        let reloader = ProcessReloader::from_pidfile(&pidfile, ReloadSignal::Hup);
        assert!(matches!(reloader.pid(), Err(ReloadError::PidfileRead { .. })));

        fs::write(&pidfile, "not-a-pid").unwrap();
        assert!(matches!(reloader.pid(), Err(ReloadError::InvalidPid { .. })));

        fs::write(&pidfile, "0").unwrap();
        assert!(matches!(reloader.pid(), Err(ReloadError::NonPositivePid(0))));
    }

    #[test]
    fn negative_pid_is_never_signalled() {
        let reloader = ProcessReloader::new(-1, ReloadSignal::Hup);

        assert!(matches!(
            reloader.reload(),
            Err(ReloadError::NonPositivePid(-1))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn signalling_a_missing_process_fails() {
        // pid_max on Linux is at most 2^22
        let reloader = ProcessReloader::new(i32::MAX, ReloadSignal::Usr1);

        assert!(matches!(
            reloader.reload(),
            Err(ReloadError::Signal { pid: i32::MAX, .. })
        ));
    }

    #[test]
    fn display_describes_target() {
        let reloader = Reloader::Process(ProcessReloader::new(42, ReloadSignal::Usr2));
        assert_eq!(reloader.to_string(), "SIGUSR2 to pid 42");

        let reloader = Reloader::Http(HttpReloader::new(
            "http://localhost/reload".to_string(),
            Method::PUT,
            None,
            Duration::from_secs(1),
        ));
        assert_eq!(reloader.to_string(), "PUT http://localhost/reload");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unix_socket_receives_payload() {
        use tokio::io::AsyncReadExt;
        use tokio::net::UnixListener;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("reload.sock");
        let listener = UnixListener::bind(&path).unwrap();
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            stream.read_to_end(&mut received).await.unwrap();
            received
        });

        UnixSocketReloader::new(&path, b"reload\n".to_vec())
            .reload()
            .await
            .unwrap();

        assert_eq!(server.await.unwrap(), b"reload\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn missing_socket_fails_to_connect() {
        let dir = TempDir::new().unwrap();
        let reloader = UnixSocketReloader::new(dir.path().join("absent.sock"), Vec::new());

        assert!(matches!(
            reloader.reload().await,
            Err(ReloadError::Connect { .. })
        ));
    }
}
