//! Persisted identity keys with a mandatory startup self-test.
//!
//! The daemon cannot operate without a valid long-term identity key, so
//! everything here fails closed: I/O errors, parse errors, and self-test
//! failures are all fatal to startup. A missing file is the one recoverable
//! case; a fresh key is generated and persisted before use.

use crate::material::KeyMaterial;
use crate::provider::KeyAlgorithm;
use crate::{digest, CryptoError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;
use zeroize::Zeroize;

/// Probe string signed during the key self-test.
const SELF_TEST_PROBE: &[u8] = b"Everyone gets Friday off.";

/// Errors from loading or creating a persisted key.
#[derive(Debug, Error)]
pub enum KeyfileError {
    #[error("key file I/O on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("key file {path} is not a valid key envelope: {detail}")]
    Parse { path: String, detail: String },

    #[error("key file {path} names unknown algorithm {name}")]
    UnknownAlgorithm { path: String, name: String },

    #[error("key self-test failed: {0}")]
    SelfTest(&'static str),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// On-disk envelope for a signing key seed.
#[derive(Serialize, Deserialize)]
struct KeyEnvelope {
    algorithm: String,
    seed: String,
}

impl Drop for KeyEnvelope {
    fn drop(&mut self) {
        self.seed.zeroize();
    }
}

/// Loads the key at `path`, or generates and persists one if the file does
/// not exist. The returned key has passed the self-test.
pub fn load_or_create(path: &Path, algorithm: KeyAlgorithm) -> Result<KeyMaterial, KeyfileError> {
    let key = if path.exists() {
        load(path)?
    } else {
        tracing::warn!(path = %path.display(), "identity key file missing, generating");
        create(path, algorithm)?
    };

    self_test(&key)?;
    tracing::info!(
        algorithm = key.algorithm().name(),
        id = %key.global_id().short(),
        "identity key initialized"
    );
    Ok(key)
}

fn load(path: &Path) -> Result<KeyMaterial, KeyfileError> {
    let io_err = |source| KeyfileError::Io {
        path: path.display().to_string(),
        source,
    };
    let raw = fs::read(path).map_err(io_err)?;
    let envelope: KeyEnvelope =
        serde_json::from_slice(&raw).map_err(|e| KeyfileError::Parse {
            path: path.display().to_string(),
            detail: e.to_string(),
        })?;

    let algorithm = match envelope.algorithm.as_str() {
        "ed25519" => KeyAlgorithm::Ed25519,
        "ecdsa-p256" => KeyAlgorithm::EcdsaP256,
        other => {
            return Err(KeyfileError::UnknownAlgorithm {
                path: path.display().to_string(),
                name: other.to_string(),
            })
        }
    };

    let mut seed = hex::decode(&envelope.seed).map_err(|e| KeyfileError::Parse {
        path: path.display().to_string(),
        detail: e.to_string(),
    })?;
    let key = KeyMaterial::from_seed(algorithm, &seed);
    seed.zeroize();
    Ok(key?)
}

fn create(path: &Path, algorithm: KeyAlgorithm) -> Result<KeyMaterial, KeyfileError> {
    let io_err = |source| KeyfileError::Io {
        path: path.display().to_string(),
        source,
    };

    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir).map_err(io_err)?;
        }
    }

    let key = crate::material::generate(algorithm);
    let mut seed = key.seed();
    let envelope = KeyEnvelope {
        algorithm: algorithm.name().to_string(),
        seed: hex::encode(&seed),
    };
    seed.zeroize();

    let json = serde_json::to_vec_pretty(&envelope).map_err(|e| KeyfileError::Parse {
        path: path.display().to_string(),
        detail: e.to_string(),
    })?;
    fs::write(path, json).map_err(io_err)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(io_err)?;
    }

    Ok(key)
}

/// Validates a loaded key before the daemon trusts it: the persisted seed
/// must re-derive the same public key, and a sign over a fixed probe must
/// verify.
fn self_test(key: &KeyMaterial) -> Result<(), KeyfileError> {
    let rebuilt = KeyMaterial::from_seed(key.algorithm(), &key.seed())
        .map_err(|_| KeyfileError::SelfTest("seed does not rebuild a key"))?;
    if rebuilt.raw_public() != key.raw_public() {
        return Err(KeyfileError::SelfTest("seed/public key mismatch"));
    }

    let d = digest(SELF_TEST_PROBE);
    let sig = key.sign(&d);
    if !key.public_key().verify(&d, &sig) {
        return Err(KeyfileError::SelfTest("sign/verify probe failed"));
    }
    Ok(())
}
