use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::error::{MirrornetError, Result};
use crate::operation::Amount;

/// Retry and request-id settings for the RPC backend. Times are in seconds.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct BackendConfig {
    pub min_timeout: f64,
    pub timeout_backoff: f64,
    pub max_timeout: f64,
    /// -1 retries forever
    pub max_retries: i64,
    pub req_id: u64,
    pub req_id_increment: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            min_timeout: 2.0,
            timeout_backoff: 1.0,
            max_timeout: 30.0,
            max_retries: -1,
            req_id: 0,
            req_id_increment: 1,
        }
    }
}

impl BackendConfig {
    /// `(min_timeout, timeout_backoff, max_timeout)` as durations.
    pub fn timeouts(&self) -> Result<(Duration, Duration, Duration)> {
        Ok((
            seconds("min_timeout", self.min_timeout)?,
            seconds("timeout_backoff", self.timeout_backoff)?,
            seconds("max_timeout", self.max_timeout)?,
        ))
    }
}

fn seconds(field: &str, value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value)
        .map_err(|e| MirrornetError::Config(format!("{} = {}: {}", field, value, e)))
}

/// One family of system accounts, e.g. `init-0 .. init-20`.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AccountTemplate {
    /// Name pattern; `{index}` is replaced by the account's index.
    pub name: String,
    #[serde(default = "default_count")]
    pub count: u32,
    #[serde(default)]
    pub creator: Option<String>,
    #[serde(default)]
    pub vesting: Option<Amount>,
    #[serde(default)]
    pub randseed: Option<u64>,
    #[serde(default)]
    pub round_robin_votes_per_elector: Option<u32>,
    #[serde(default)]
    pub random_votes_per_elector: Option<u32>,
}

fn default_count() -> u32 {
    1
}

impl AccountTemplate {
    pub fn account_name(&self, index: u32) -> String {
        self.name.replace("{index}", &index.to_string())
    }

    pub fn account_names(&self) -> impl Iterator<Item = String> + '_ {
        (0..self.count).map(move |i| self.account_name(i))
    }
}

/// Configuration for the setup generator (`txgen`).
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TxgenConfig {
    /// Testnet start, `%Y-%m-%dT%H:%M:%S` in UTC.
    pub start_time: String,
    pub transactions_per_block: usize,
    pub snapshot_file: String,
    pub min_vesting_per_account: Amount,
    pub total_port_balance: Amount,
    pub accounts: BTreeMap<String, AccountTemplate>,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    #[serde(default = "default_initminer_wif")]
    pub initminer_wif: String,
}

fn default_key_prefix() -> String {
    "TST".to_string()
}

/// Well-known private key of the testnet `initminer` account.
fn default_initminer_wif() -> String {
    "5JNHfZYKGaomSFvd4NUdQ9qMcEAC43kujbfjueTHpVapX1Kzq2n".to_string()
}

impl TxgenConfig {
    pub fn load(path: &str) -> Result<Self> {
        load_file(path)
    }

    pub fn template(&self, role: &str) -> Result<&AccountTemplate> {
        self.accounts
            .get(role)
            .ok_or_else(|| MirrornetError::Config(format!("missing account template '{}'", role)))
    }

    /// Every account name any template can produce.
    pub fn system_account_names(&self) -> impl Iterator<Item = String> + '_ {
        self.accounts.values().flat_map(|t| t.account_names())
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TransactionSource {
    pub node: String,
    #[serde(deserialize_with = "flexible_bool")]
    pub appbase: bool,
}

/// Configuration for live operation porting (`port`).
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PortConfig {
    pub transaction_source: TransactionSource,
    #[serde(deserialize_with = "flexible_u64")]
    pub min_block_number: u64,
    /// Zero means follow the head forever.
    #[serde(deserialize_with = "flexible_u64")]
    pub max_block_number: u64,
    pub ported_operations: Vec<String>,
    pub transaction_signer: String,
    pub transactions_per_block: usize,
    #[serde(default)]
    pub rpc: BackendConfig,
}

impl PortConfig {
    pub fn load(path: &str) -> Result<Self> {
        load_file(path)
    }
}

/// Reads JSON, or TOML when the file has a `.toml` extension.
pub fn load_file<T: for<'de> Deserialize<'de>>(path: &str) -> Result<T> {
    if !Path::new(path).exists() {
        return Err(MirrornetError::Config(format!("config file not found: {}", path)));
    }
    let content = std::fs::read_to_string(path)?;
    let is_toml = Path::new(path).extension().is_some_and(|ext| ext == "toml");
    if is_toml {
        Ok(toml::from_str(&content)?)
    } else {
        Ok(serde_json::from_str(&content)?)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BoolOrString {
    Bool(bool),
    Text(String),
}

fn flexible_bool<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<bool, D::Error> {
    match BoolOrString::deserialize(deserializer)? {
        BoolOrString::Bool(b) => Ok(b),
        BoolOrString::Text(s) => match s.to_lowercase().as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(serde::de::Error::custom(format!("expected true or false, got '{}'", s))),
        },
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum U64OrString {
    Number(u64),
    Text(String),
}

fn flexible_u64<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<u64, D::Error> {
    match U64OrString::deserialize(deserializer)? {
        U64OrString::Number(n) => Ok(n),
        U64OrString::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}
