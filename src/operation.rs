//! Steem operations in the legacy `[name, {fields}]` wire form.

use serde::ser::SerializeTuple;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{MirrornetError, Result};
use crate::keys::procedural::{Authority, KeyRef};

pub const STEEM_SYMBOL: &str = "@@000000021";
pub const STEEM_PRECISION: u8 = 3;

/// Asset amount in satoshis, serialized as `["1000", 3, "@@000000021"]`.
///
/// Also reads the appbase object form `{"amount", "precision", "nai"}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "AmountRepr")]
pub struct Amount {
    pub amount: String,
    pub precision: u8,
    pub nai: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AmountRepr {
    Legacy(String, u8, String),
    Object { amount: String, precision: u8, nai: String },
}

impl From<AmountRepr> for Amount {
    fn from(repr: AmountRepr) -> Self {
        match repr {
            AmountRepr::Legacy(amount, precision, nai) | AmountRepr::Object { amount, precision, nai } => {
                Amount { amount, precision, nai }
            }
        }
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(3)?;
        tuple.serialize_element(&self.amount)?;
        tuple.serialize_element(&self.precision)?;
        tuple.serialize_element(&self.nai)?;
        tuple.end()
    }
}

impl Amount {
    pub fn steem(satoshis: u128) -> Self {
        Self {
            amount: satoshis.to_string(),
            precision: STEEM_PRECISION,
            nai: STEEM_SYMBOL.to_string(),
        }
    }

    pub fn satoshis(&self) -> Result<u128> {
        self.amount
            .parse()
            .map_err(|e| MirrornetError::Config(format!("invalid amount '{}': {}", self.amount, e)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountCreateOperation {
    pub fee: Amount,
    pub creator: String,
    pub new_account_name: String,
    pub owner: Authority,
    pub active: Authority,
    pub posting: Authority,
    pub memo_key: KeyRef,
    pub json_metadata: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountUpdateOperation {
    pub account: String,
    pub owner: Authority,
    pub active: Authority,
    pub posting: Authority,
    pub memo_key: KeyRef,
    pub json_metadata: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferOperation {
    pub from: String,
    pub to: String,
    pub amount: Amount,
    pub memo: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferToVestingOperation {
    pub from: String,
    pub to: String,
    pub amount: Amount,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountWitnessVoteOperation {
    pub account: String,
    pub witness: String,
    pub approve: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WitnessUpdateOperation {
    pub owner: String,
    pub url: String,
    pub block_signing_key: KeyRef,
    pub props: Map<String, Value>,
    pub fee: Amount,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    AccountCreate(AccountCreateOperation),
    AccountUpdate(AccountUpdateOperation),
    Transfer(TransferOperation),
    TransferToVesting(TransferToVestingOperation),
    AccountWitnessVote(AccountWitnessVoteOperation),
    WitnessUpdate(WitnessUpdateOperation),
    /// An operation copied verbatim from a source chain.
    Raw { kind: String, value: Value },
}

impl Operation {
    pub fn name(&self) -> &str {
        match self {
            Operation::AccountCreate(_) => "account_create",
            Operation::AccountUpdate(_) => "account_update",
            Operation::Transfer(_) => "transfer",
            Operation::TransferToVesting(_) => "transfer_to_vesting",
            Operation::AccountWitnessVote(_) => "account_witness_vote",
            Operation::WitnessUpdate(_) => "witness_update",
            Operation::Raw { kind, .. } => kind,
        }
    }

    /// Placeholder keys as JSON pointers into the `[name, {fields}]` form.
    ///
    /// Raw operations never report any: their text is source data.
    pub fn placeholders(&self) -> Vec<(String, &KeyRef)> {
        let mut out = Vec::new();
        match self {
            Operation::AccountCreate(AccountCreateOperation { owner, active, posting, memo_key, .. })
            | Operation::AccountUpdate(AccountUpdateOperation { owner, active, posting, memo_key, .. }) => {
                owner.placeholders("/1/owner", &mut out);
                active.placeholders("/1/active", &mut out);
                posting.placeholders("/1/posting", &mut out);
                if memo_key.is_placeholder() {
                    out.push(("/1/memo_key".to_string(), memo_key));
                }
            }
            Operation::WitnessUpdate(op) if op.block_signing_key.is_placeholder() => {
                out.push(("/1/block_signing_key".to_string(), &op.block_signing_key));
            }
            _ => {}
        }
        out
    }
}

impl Serialize for Operation {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(2)?;
        tuple.serialize_element(self.name())?;
        match self {
            Operation::AccountCreate(op) => tuple.serialize_element(op)?,
            Operation::AccountUpdate(op) => tuple.serialize_element(op)?,
            Operation::Transfer(op) => tuple.serialize_element(op)?,
            Operation::TransferToVesting(op) => tuple.serialize_element(op)?,
            Operation::AccountWitnessVote(op) => tuple.serialize_element(op)?,
            Operation::WitnessUpdate(op) => tuple.serialize_element(op)?,
            Operation::Raw { value, .. } => tuple.serialize_element(value)?,
        }
        tuple.end()
    }
}

/// Operations plus the private keys that sign them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transaction {
    pub operations: Vec<Operation>,
    pub wif_sigs: Vec<KeyRef>,
}

impl Transaction {
    pub fn new(operations: Vec<Operation>, signer: KeyRef) -> Self {
        Self { operations, wif_sigs: vec![signer] }
    }

    /// Every placeholder key of the transaction as a JSON pointer.
    pub fn placeholders(&self) -> Vec<(String, &KeyRef)> {
        let mut out: Vec<(String, &KeyRef)> = self
            .wif_sigs
            .iter()
            .enumerate()
            .filter(|(_, key)| key.is_placeholder())
            .map(|(i, key)| (format!("/wif_sigs/{}", i), key))
            .collect();
        for (i, op) in self.operations.iter().enumerate() {
            out.extend(
                op.placeholders()
                    .into_iter()
                    .map(|(path, key)| (format!("/operations/{}{}", i, path), key)),
            );
        }
        out
    }
}
