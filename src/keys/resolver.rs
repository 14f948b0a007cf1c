//! Cached key derivation through an external oracle.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tracing::debug;

use crate::error::{MirrornetError, Result};
use crate::keys::procedural::{seed_for, Authority, KeyRef};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct KeyPair {
    pub public_key: String,
    pub private_key: String,
}

/// Deterministic key derivation. Treated as a black box.
pub trait KeyOracle {
    /// Derive the key pair(s) for `seed` under `secret`.
    fn derive(&mut self, secret: &str, seed: &str) -> Result<Vec<KeyPair>>;
}

/// Runs the `get_dev_key` tool: `get_dev_key <secret> <seed>`.
///
/// The tool hashes `secret + seed`, so the secret acts as a namespace.
#[derive(Debug, Clone)]
pub struct DevKeyOracle {
    exe: PathBuf,
}

impl DevKeyOracle {
    pub fn new(exe: impl Into<PathBuf>) -> Self {
        Self { exe: exe.into() }
    }
}

impl KeyOracle for DevKeyOracle {
    fn derive(&mut self, secret: &str, seed: &str) -> Result<Vec<KeyPair>> {
        let output = Command::new(&self.exe)
            .arg(secret)
            .arg(seed)
            .stdin(Stdio::null())
            .stderr(Stdio::inherit())
            .output()
            .map_err(|e| MirrornetError::KeyOracle(format!("failed to run {}: {}", self.exe.display(), e)))?;

        if !output.status.success() {
            return Err(MirrornetError::KeyOracle(format!(
                "{} exited with {}",
                self.exe.display(),
                output.status
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        serde_json::from_str(stdout.trim())
            .map_err(|e| MirrornetError::KeyOracle(format!("unexpected output from {}: {}", self.exe.display(), e)))
    }
}

/// Resolves seeds to key pairs, asking the oracle at most once per seed.
///
/// The cache is keyed on the seed alone. Set the secret before the first
/// lookup of any seed that should use it; entries derived under an earlier
/// secret are kept as they are.
pub struct KeyResolver<O: KeyOracle> {
    oracle: O,
    secret: String,
    seed2pair: HashMap<String, KeyPair>,
}

impl<O: KeyOracle> KeyResolver<O> {
    pub fn new(oracle: O) -> Self {
        Self::with_secret(oracle, "")
    }

    pub fn with_secret(oracle: O, secret: &str) -> Self {
        Self {
            oracle,
            secret: secret.to_string(),
            seed2pair: HashMap::new(),
        }
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn set_secret(&mut self, secret: &str) {
        self.secret = secret.to_string();
    }

    pub fn cached(&self) -> usize {
        self.seed2pair.len()
    }

    pub fn resolve(&mut self, seed: &str) -> Result<&KeyPair> {
        if !self.seed2pair.contains_key(seed) {
            debug!("Deriving key for seed {}", seed);
            let pair = self
                .oracle
                .derive(&self.secret, seed)?
                .into_iter()
                .next()
                .ok_or_else(|| MirrornetError::KeyOracle(format!("no key returned for seed {}", seed)))?;
            self.seed2pair.insert(seed.to_string(), pair);
        }
        self.seed2pair
            .get(seed)
            .ok_or_else(|| MirrornetError::KeyOracle(format!("no key cached for seed {}", seed)))
    }

    pub fn pubkey(&mut self, seed: &str) -> Result<String> {
        Ok(self.resolve(seed)?.public_key.clone())
    }

    pub fn privkey(&mut self, seed: &str) -> Result<String> {
        Ok(self.resolve(seed)?.private_key.clone())
    }

    /// Single-key, full-weight authority for `name` acting as `role`.
    pub fn authority(&mut self, name: &str, role: &str) -> Result<Authority> {
        let pubkey = self.pubkey(&seed_for(name, role))?;
        Ok(Authority::single_key(KeyRef::Literal(pubkey)))
    }
}
