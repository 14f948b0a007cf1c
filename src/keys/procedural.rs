//! Procedural key placeholders.
//!
//! Every synthetic testnet key is identified by a seed `<role>-<account>`.
//! Generators only ever see placeholders for those keys; the real key
//! material is substituted later by [`crate::keys::substitute`].

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Role used when the caller does not name one.
pub const DEFAULT_ROLE: &str = "active";

/// A key as it appears inside an operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyRef {
    /// Real key material, e.g. copied from a snapshot.
    Literal(String),
    /// Public key of a seed, resolved later.
    Public(String),
    /// Private key of a seed, resolved later.
    Private(String),
}

impl KeyRef {
    pub fn is_placeholder(&self) -> bool {
        !matches!(self, KeyRef::Literal(_))
    }

    /// Placeholder text with the given delimiter, or the literal itself.
    pub fn render(&self, esc: &str) -> String {
        match self {
            KeyRef::Literal(key) => key.clone(),
            KeyRef::Public(seed) => format!("{esc}publickey:{seed}{esc}"),
            KeyRef::Private(seed) => format!("{esc}privatekey:{seed}{esc}"),
        }
    }
}

/// Placeholders serialize undelimited; the action serializer adds the
/// escape delimiter at the JSON paths reported by `placeholders`.
impl Serialize for KeyRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.render(""))
    }
}

impl<'de> Deserialize<'de> for KeyRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(KeyRef::Literal)
    }
}

/// Weighted signing authority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Authority {
    pub account_auths: Vec<(String, u32)>,
    pub key_auths: Vec<(KeyRef, u32)>,
    pub weight_threshold: u32,
}

impl Authority {
    /// One key, full weight.
    pub fn single_key(key: KeyRef) -> Self {
        Self {
            account_auths: Vec::new(),
            key_auths: vec![(key, 1)],
            weight_threshold: 1,
        }
    }

    /// JSON pointers, below `base`, of the placeholder keys.
    pub fn placeholders<'a>(&'a self, base: &str, out: &mut Vec<(String, &'a KeyRef)>) {
        for (i, (key, _)) in self.key_auths.iter().enumerate() {
            if key.is_placeholder() {
                out.push((format!("{}/key_auths/{}/0", base, i), key));
            }
        }
    }

    /// One account, full weight.
    pub fn single_account(account: &str) -> Self {
        Self {
            account_auths: vec![(account.to_string(), 1)],
            key_auths: Vec::new(),
            weight_threshold: 1,
        }
    }
}

pub fn seed_for(name: &str, role: &str) -> String {
    format!("{}-{}", role, name)
}

/// Hands out placeholder keys for generated transactions.
#[derive(Debug, Default, Clone)]
pub struct ProceduralKeyDatabase;

impl ProceduralKeyDatabase {
    pub fn new() -> Self {
        Self
    }

    pub fn pubkey(&self, name: &str, role: &str) -> KeyRef {
        KeyRef::Public(seed_for(name, role))
    }

    pub fn privkey(&self, name: &str, role: &str) -> KeyRef {
        KeyRef::Private(seed_for(name, role))
    }

    /// Private key for the account's `active` role.
    pub fn active_privkey(&self, name: &str) -> KeyRef {
        self.privkey(name, DEFAULT_ROLE)
    }

    pub fn authority(&self, name: &str, role: &str) -> Authority {
        Authority::single_key(self.pubkey(name, role))
    }
}

/// Replace the address prefix of a mainnet key, e.g. `STM...` to `TST...`.
pub fn rekey(key: &str, prefix: &str) -> String {
    match key.get(3..) {
        Some(rest) => format!("{}{}", prefix, rest),
        None => prefix.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_placeholder_seeds() {
        let db = ProceduralKeyDatabase::new();
        assert_eq!(db.pubkey("init-0", "owner"), KeyRef::Public("owner-init-0".to_string()));
        assert_eq!(db.active_privkey("porter"), KeyRef::Private("active-porter".to_string()));
    }

    #[test]
    fn test_authority_serialization() {
        let db = ProceduralKeyDatabase::new();
        let value = serde_json::to_value(db.authority("alice", "posting")).unwrap();
        assert_eq!(
            value,
            json!({
                "account_auths": [],
                "key_auths": [["publickey:posting-alice", 1]],
                "weight_threshold": 1,
            })
        );
    }

    #[test]
    fn test_authority_placeholder_paths() {
        let db = ProceduralKeyDatabase::new();
        let mut auth = db.authority("alice", "owner");
        auth.key_auths.insert(0, (KeyRef::Literal("TST5abc".to_string()), 1));

        let mut paths = Vec::new();
        auth.placeholders("/1/owner", &mut paths);
        assert_eq!(paths, vec![("/1/owner/key_auths/1/0".to_string(), &db.pubkey("alice", "owner"))]);
    }

    #[test]
    fn test_snapshot_authority_parses_as_literal() {
        let auth: Authority = serde_json::from_value(json!({
            "account_auths": [["bob", 1]],
            "key_auths": [["STM5abc", 1]],
            "weight_threshold": 1,
        }))
        .unwrap();
        assert_eq!(auth.key_auths[0].0, KeyRef::Literal("STM5abc".to_string()));
        assert!(!auth.key_auths[0].0.is_placeholder());
    }

    #[test]
    fn test_rekey() {
        assert_eq!(rekey("STM6LLegbAgLAy28", "TST"), "TST6LLegbAgLAy28");
        assert_eq!(rekey("ST", "TST"), "TST");
    }
}
