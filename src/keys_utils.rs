use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use log::debug;
use openssl::bn::BigNum;
use openssl::ec::{EcGroup, EcKey};
use openssl::error::ErrorStack;
use openssl::nid::Nid;
use openssl::pkey::{Id, PKey, Public};
use openssl::rsa::Rsa;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("'{0}' field not found in JWK")]
    MissingField(&'static str),
    #[error("failed to decode '{field}' from base64url: {source}")]
    Base64 {
        field: &'static str,
        #[source]
        source: base64::DecodeError,
    },
    #[error("unsupported key type '{0}'")]
    UnsupportedKeyType(String),
    #[error("unsupported curve '{crv}' for key type {kty}")]
    UnsupportedCurve { kty: &'static str, crv: String },
    #[error("algorithm {alg} cannot be used with a {kty} key")]
    AlgorithmMismatch { alg: String, kty: String },
    #[error("failed to build public key: {0}")]
    OpenSsl(#[from] ErrorStack),
}

const RSA_ALGORITHMS: [&str; 6] = ["RS256", "RS384", "RS512", "PS256", "PS384", "PS512"];

/// Converts a single JWK into a PEM encoded SubjectPublicKeyInfo
/// (`-----BEGIN PUBLIC KEY-----`).
///
/// The key type decides the conversion; when the JWK also names an `alg`
/// it has to be one that key type can actually be used with.
pub(crate) fn key_to_pem(key: &Value) -> Result<Vec<u8>, KeyError> {
    let kty = str_field(key, "kty")?;
    let alg = key["alg"].as_str();

    let public_key = match kty {
        "RSA" => rsa_public_key(key, alg)?,
        "EC" => ec_public_key(key, alg)?,
        "OKP" => okp_public_key(key, alg)?,
        other => {
            debug!("Unsupported key type '{}' in JWK.", other);
            return Err(KeyError::UnsupportedKeyType(other.to_string()));
        }
    };

    debug!("Converting {} public key to PEM format.", kty);
    let pem = public_key.public_key_to_pem().map_err(|e| {
        debug!("Failed to convert {} public key to PEM: {:?}", kty, e);
        KeyError::OpenSsl(e)
    })?;

    debug!("JWK converted to PEM successfully.");
    Ok(pem)
}

fn rsa_public_key(key: &Value, alg: Option<&str>) -> Result<PKey<Public>, KeyError> {
    if let Some(alg) = alg {
        if !RSA_ALGORITHMS.contains(&alg) {
            return Err(mismatch(alg, "RSA"));
        }
    }

    let n = decode_field(key, "n")?;
    let e = decode_field(key, "e")?;

    let rsa_public_key = Rsa::from_public_components(
        BigNum::from_slice(&n).map_err(|e| {
            debug!("Failed to create BigNum from 'n': {:?}", e);
            KeyError::OpenSsl(e)
        })?,
        BigNum::from_slice(&e).map_err(|e| {
            debug!("Failed to create BigNum from 'e': {:?}", e);
            KeyError::OpenSsl(e)
        })?,
    )
    .map_err(|e| {
        debug!("Failed to create RSA public key: {:?}", e);
        KeyError::OpenSsl(e)
    })?;

    Ok(PKey::from_rsa(rsa_public_key)?)
}

fn ec_public_key(key: &Value, alg: Option<&str>) -> Result<PKey<Public>, KeyError> {
    let crv = str_field(key, "crv")?;
    let (nid, expected_alg) = match crv {
        "P-256" => (Nid::X9_62_PRIME256V1, "ES256"),
        "P-384" => (Nid::SECP384R1, "ES384"),
        "P-521" => (Nid::SECP521R1, "ES512"),
        other => {
            return Err(KeyError::UnsupportedCurve {
                kty: "EC",
                crv: other.to_string(),
            })
        }
    };
    if let Some(alg) = alg {
        if alg != expected_alg {
            return Err(mismatch(alg, &format!("EC {crv}")));
        }
    }

    let x = BigNum::from_slice(&decode_field(key, "x")?)?;
    let y = BigNum::from_slice(&decode_field(key, "y")?)?;

    let group = EcGroup::from_curve_name(nid)?;
    let ec_key = EcKey::from_public_key_affine_coordinates(&group, &x, &y).map_err(|e| {
        debug!("Failed to create EC public key on {}: {:?}", crv, e);
        KeyError::OpenSsl(e)
    })?;
    ec_key.check_key()?;

    Ok(PKey::from_ec_key(ec_key)?)
}

fn okp_public_key(key: &Value, alg: Option<&str>) -> Result<PKey<Public>, KeyError> {
    let crv = str_field(key, "crv")?;
    if crv != "Ed25519" {
        return Err(KeyError::UnsupportedCurve {
            kty: "OKP",
            crv: crv.to_string(),
        });
    }
    if let Some(alg) = alg {
        if alg != "EdDSA" {
            return Err(mismatch(alg, "OKP Ed25519"));
        }
    }

    let x = decode_field(key, "x")?;
    Ok(PKey::public_key_from_raw_bytes(&x, Id::ED25519)?)
}

fn str_field<'a>(key: &'a Value, field: &'static str) -> Result<&'a str, KeyError> {
    key[field].as_str().ok_or_else(|| {
        debug!("'{}' field not found in JWK.", field);
        KeyError::MissingField(field)
    })
}

/// Base64url decodes a JWK member. Some issuers pad their values, so any
/// trailing `=` is stripped first.
fn decode_field(key: &Value, field: &'static str) -> Result<Vec<u8>, KeyError> {
    let value = str_field(key, field)?;
    URL_SAFE_NO_PAD
        .decode(value.trim_end_matches('='))
        .map_err(|source| {
            debug!("Failed to decode '{}' from base64url.", field);
            KeyError::Base64 { field, source }
        })
}

fn mismatch(alg: &str, kty: &str) -> KeyError {
    KeyError::AlgorithmMismatch {
        alg: alg.to_string(),
        kty: kty.to_string(),
    }
}
