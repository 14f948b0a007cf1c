use thiserror::Error;

#[derive(Error, Debug)]
pub enum MirrornetError {
    /// The remote node answered with an `error` payload.
    #[error("RPC error: {0}")]
    Rpc(serde_json::Value),
    #[error("HTTP error from {url}: {message}")]
    Http { url: String, message: String },
    #[error("Network error talking to {url}: {message}")]
    Network { url: String, message: String },
    /// Caller misuse of the RPC API, never retried.
    #[error("Illegal argument: {0}")]
    IllegalArgument(String),
    #[error("Malformed RPC response: {0}")]
    Decode(String),
    #[error("Key oracle failed: {0}")]
    KeyOracle(String),
    #[error("Escape format error: {0}")]
    EscapeFormat(String),
    #[error("Unknown key tag: {0}")]
    UnknownKeyTag(String),
    #[error("Insufficient port balance: {total_port_balance} cannot cover {num_accounts} accounts at {min_vesting_per_account} minimum vesting; increase total_port_balance or decrease min_vesting_per_account")]
    InsufficientPortBalance {
        total_port_balance: u128,
        min_vesting_per_account: u128,
        num_accounts: u128,
    },
    #[error("Configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, MirrornetError>;
