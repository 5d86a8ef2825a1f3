//! Signals this test process through a pidfile. Kept in its own test binary
//! so the installed handler cannot interfere with other tests.
#![cfg(unix)]

mod common;

use common::{jwks_server, jwks_url, rsa_jwk};
use jwks_to_pem::config::JwksConfig;
use jwks_to_pem::job::Job;
use jwks_to_pem::reload::{ProcessReloader, ReloadSignal, Reloader};
use std::fs;
use std::time::Duration;
use tempfile::TempDir;
use tokio::signal::unix::{signal, SignalKind};

#[tokio::test]
async fn changed_keys_signal_pid_from_pidfile() {
    let mut usr1 = signal(SignalKind::user_defined1()).unwrap();
    let server = jwks_server(vec![rsa_jwk("one")]).await;
    let dir = TempDir::new().unwrap();
    let keys = dir.path().join("keys");
    fs::create_dir(&keys).unwrap();
    let pidfile = dir.path().join("app.pid");
    fs::write(&pidfile, format!("{}\n", std::process::id())).unwrap();

    let mut config = JwksConfig::new(jwks_url(&server));
    config.out_dir = Some(keys);
    config.reloader = Some(Reloader::Process(ProcessReloader::from_pidfile(
        &pidfile,
        ReloadSignal::Usr1,
    )));

    let outcome = Job::new(config).run().await.unwrap();

    assert!(outcome.reloaded);
    tokio::time::timeout(Duration::from_secs(5), usr1.recv())
        .await
        .expect("SIGUSR1 was not delivered");
}
