use crate::keys::Jwk;
use crate::keys_utils::KeyError;
use crate::pattern::{Pattern, PatternError};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::{debug, info};
use openssl::sha::sha256;
use std::collections::HashSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("invalid key (KID: {kid}): {source}")]
    InvalidKey {
        kid: String,
        #[source]
        source: KeyError,
    },
    #[error("template execution failed (KID: {kid}): {source}")]
    Template {
        kid: String,
        #[source]
        source: PatternError,
    },
    #[error("error comparing keys (KID: {kid}): {source}")]
    Compare {
        kid: String,
        #[source]
        source: io::Error,
    },
    #[error("writing key failed (KID: {kid}): {source}")]
    Write {
        kid: String,
        #[source]
        source: io::Error,
    },
    #[error("{} is already used by another key (KID: {kid})", .path.display())]
    DuplicateName { kid: String, path: PathBuf },
    #[error("could not write key to stdout: {0}")]
    Stdout(#[source] io::Error),
}

/// Result of writing a key set. Errors are per key; keys that could be
/// written were written regardless of failures elsewhere in the set.
#[derive(Debug, Default)]
pub struct WriteReport {
    pub changed: bool,
    pub written: Vec<PathBuf>,
    pub errors: Vec<WriteError>,
}

impl WriteReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Writes every key as `out_dir/<pattern>`, skipping files whose content
/// is already up to date. Without an output directory the PEMs are printed
/// to stdout and nothing counts as changed.
pub fn write_keys(keys: &mut [Jwk], pattern: &Pattern, out_dir: Option<&Path>) -> WriteReport {
    let stdout = io::stdout();
    let mut stdout = stdout.lock();
    write_keys_to(keys, pattern, out_dir, &mut stdout)
}

fn write_keys_to<W: Write>(
    keys: &mut [Jwk],
    pattern: &Pattern,
    out_dir: Option<&Path>,
    stdout: &mut W,
) -> WriteReport {
    let mut report = WriteReport::default();
    let mut seen = HashSet::new();

    for jwk in keys.iter_mut() {
        let kid = jwk.kid().to_string();

        let Some(out_dir) = out_dir else {
            match jwk.pem() {
                Ok(pem) => {
                    if let Err(e) = stdout.write_all(pem) {
                        report.errors.push(WriteError::Stdout(e));
                    }
                }
                Err(source) => report.errors.push(WriteError::InvalidKey { kid, source }),
            }
            continue;
        };

        let name = match pattern.render(jwk) {
            Ok(name) => name,
            Err(source) => {
                report.errors.push(WriteError::Template { kid, source });
                continue;
            }
        };
        let path = out_dir.join(name);

        let pem = match jwk.pem() {
            Ok(pem) => pem,
            Err(source) => {
                report.errors.push(WriteError::InvalidKey { kid, source });
                continue;
            }
        };

        // only keys that can be written claim a name
        if !seen.insert(path.clone()) {
            report.errors.push(WriteError::DuplicateName { kid, path });
            continue;
        }

        match key_changed(&path, pem) {
            Ok(true) => {}
            Ok(false) => {
                debug!("Key {} unchanged at {}", kid, path.display());
                continue;
            }
            Err(source) => {
                debug!("error comparing keys: {}", source);
                report.errors.push(WriteError::Compare { kid, source });
                continue;
            }
        }

        if let Err(source) = write_atomic(&path, pem) {
            report.errors.push(WriteError::Write { kid, source });
            continue;
        }

        info!("wrote key {} to {}", kid, path.display());
        report.changed = true;
        report.written.push(path);
    }

    report
}

/// Compares the SHA-256 of the file at `current` with that of `data`.
/// A missing file always counts as changed.
pub(crate) fn key_changed(current: &Path, data: &[u8]) -> io::Result<bool> {
    let existing = match fs::read(current) {
        Ok(existing) => existing,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("{} does not exist yet", current.display());
            return Ok(true);
        }
        Err(e) => return Err(e),
    };

    let (new_hash, current_hash) = (sha256(data), sha256(&existing));
    debug!(
        "comparison results for {}: new-hash={} current-hash={}",
        current.display(),
        STANDARD.encode(new_hash),
        STANDARD.encode(current_hash)
    );

    Ok(new_hash != current_hash)
}

/// Writes through a temporary file in the target directory and renames it
/// into place, so readers never observe a partial key.
fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    let mut file = tempfile::Builder::new()
        .prefix(".key")
        .tempfile_in(dir)?;
    file.write_all(data)?;
    file.as_file().sync_all()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.as_file()
            .set_permissions(fs::Permissions::from_mode(0o644))?;
    }

    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}
