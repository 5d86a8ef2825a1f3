use crate::keys_utils::{self, KeyError};
use lazy_static::lazy_static;
use log::{debug, error};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

lazy_static! {
    static ref HTTP_CLIENT: Client = Client::new();
}

/// Shared client for the JWKS fetch and HTTP reloads.
pub(crate) fn http_client() -> &'static Client {
    &HTTP_CLIENT
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Failed to get JWKS: {0}")]
    GetJwksFailure(reqwest::Error),
    #[error("JWKS endpoint answered with {0}")]
    BadStatus(StatusCode),
    #[error("Failed to read JWKS body: {0}")]
    ReadJwksFailure(reqwest::Error),
    #[error("JWKS is not valid JSON: {0}")]
    ParseJwksFailure(serde_json::Error),
    #[error("JWKS document has no 'keys' array")]
    MissingKeys,
}

/// One entry of a fetched key set.
#[derive(Debug, Clone)]
pub struct Jwk {
    index: usize,
    raw: Value,
    pem: Option<Vec<u8>>,
}

impl Jwk {
    pub fn new(index: usize, raw: Value) -> Self {
        Jwk {
            index,
            raw,
            pem: None,
        }
    }

    /// Position of the key within the `keys` array.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn kid(&self) -> &str {
        self.raw["kid"].as_str().unwrap_or_default()
    }

    pub fn alg(&self) -> &str {
        self.raw["alg"].as_str().unwrap_or_default()
    }

    pub fn kty(&self) -> &str {
        self.raw["kty"].as_str().unwrap_or_default()
    }

    /// PEM encoding of the key, converted on first use.
    pub fn pem(&mut self) -> Result<&[u8], KeyError> {
        let pem = match self.pem.take() {
            Some(pem) => pem,
            None => keys_utils::key_to_pem(&self.raw)?,
        };
        Ok(self.pem.insert(pem).as_slice())
    }
}

pub async fn fetch_jwks(jwks_url: &str, timeout: Duration) -> Result<Vec<Jwk>, FetchError> {
    debug!("Fetching JWKS from {} (timeout {:?})", jwks_url, timeout);

    let res = http_client()
        .get(jwks_url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| {
            error!("Error fetching JWKS: {}", e);
            FetchError::GetJwksFailure(e)
        })?;

    let status = res.status();
    if !status.is_success() {
        error!("JWKS endpoint {} answered with {}", jwks_url, status);
        return Err(FetchError::BadStatus(status));
    }

    let body = res.text().await.map_err(FetchError::ReadJwksFailure)?;
    parse_jwks(&body)
}

/// Splits a JWKS document into its keys. Individual keys are not validated
/// here so that one bad entry does not hide the others.
pub fn parse_jwks(body: &str) -> Result<Vec<Jwk>, FetchError> {
    let json: Value = serde_json::from_str(body).map_err(FetchError::ParseJwksFailure)?;
    let keys = json["keys"].as_array().ok_or(FetchError::MissingKeys)?;

    let keys: Vec<Jwk> = keys
        .iter()
        .enumerate()
        .map(|(index, key)| {
            let jwk = Jwk::new(index, key.clone());
            debug!("Found key {} (kid '{}', kty '{}')", index, jwk.kid(), jwk.kty());
            jwk
        })
        .collect();

    Ok(keys)
}
