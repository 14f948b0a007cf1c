//! Replay-script records and their canonical one-line encoding.

use serde::Serialize;
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use std::io::Write;
use tracing::info;

use crate::error::{MirrornetError, Result};
use crate::operation::Transaction;

const ESC_CHARS: &str = "ZYXWVUTSRQPONMLKJIHGFEDCBA";

/// One step for the downstream executor.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    WaitBlocks { count: u64, miss_blocks: Option<u64> },
    SubmitTransaction { tx: Transaction },
    SetSecret { secret: String },
}

impl Action {
    pub fn wait(count: u64) -> Self {
        Action::WaitBlocks { count, miss_blocks: None }
    }

    pub fn submit(tx: Transaction) -> Self {
        Action::SubmitTransaction { tx }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Action::WaitBlocks { .. } => "wait_blocks",
            Action::SubmitTransaction { .. } => "submit_transaction",
            Action::SetSecret { .. } => "set_secret",
        }
    }

    fn params(&self) -> Result<Value> {
        Ok(match self {
            Action::WaitBlocks { count, miss_blocks: None } => json!({ "count": count }),
            Action::WaitBlocks { count, miss_blocks: Some(miss) } => json!({ "count": count, "miss_blocks": miss }),
            Action::SubmitTransaction { tx } => json!({ "tx": serde_json::to_value(tx)? }),
            Action::SetSecret { secret } => json!({ "secret": secret }),
        })
    }

    /// Compact, sorted-key `[kind, {params}]`.
    ///
    /// Records holding key placeholders get an `esc` delimiter that occurs
    /// nowhere in their literal text. Only the placeholder slots are
    /// delimited; strings carried from source data are written as they are.
    pub fn to_line(&self) -> Result<String> {
        let mut params = self.params()?;
        let plain_text = serde_json::to_string(&json!([self.kind(), params]))?;
        let placeholders = match self {
            Action::SubmitTransaction { tx } => tx.placeholders(),
            _ => Vec::new(),
        };
        if placeholders.is_empty() {
            return Ok(plain_text);
        }

        let esc = find_non_substr(&plain_text)?;
        for (path, key) in placeholders {
            let slot = params
                .pointer_mut(&format!("/tx{}", path))
                .ok_or_else(|| MirrornetError::EscapeFormat(format!("no key placeholder at {}", path)))?;
            *slot = Value::String(key.render(&esc));
        }
        if let Value::Object(obj) = &mut params {
            obj.insert("esc".to_string(), Value::String(esc));
        }
        Ok(serde_json::to_string(&json!([self.kind(), params]))?)
    }
}

impl Serialize for Action {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let params = self.params().map_err(serde::ser::Error::custom)?;
        (self.kind(), params).serialize(serializer)
    }
}

/// Shortest delimiter built from `Z..A` that does not occur in `text`.
fn find_non_substr(text: &str) -> Result<String> {
    for c in ESC_CHARS.chars() {
        if !text.contains(c) {
            return Ok(c.to_string());
        }
    }
    for a in ESC_CHARS.chars() {
        for b in ESC_CHARS.chars() {
            let candidate: String = [a, b].iter().collect();
            if !text.contains(&candidate) {
                return Ok(candidate);
            }
        }
    }
    Err(MirrornetError::EscapeFormat("no usable escape delimiter".to_string()))
}

/// Writes records one per line and fingerprints the stream.
pub struct ActionWriter<W: Write> {
    out: W,
    hasher: Sha256,
    count: u64,
}

impl<W: Write> ActionWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out, hasher: Sha256::new(), count: 0 }
    }

    pub fn write(&mut self, action: &Action) -> Result<()> {
        let mut line = action.to_line()?;
        line.push('\n');
        self.out.write_all(line.as_bytes())?;
        self.hasher.update(line.as_bytes());
        self.count += 1;
        Ok(())
    }

    pub fn write_all<I: IntoIterator<Item = Result<Action>>>(&mut self, actions: I) -> Result<()> {
        for action in actions {
            self.write(&action?)?;
        }
        Ok(())
    }

    /// Flush and return the hex SHA-256 of everything written.
    pub fn finish(mut self) -> Result<String> {
        self.out.flush()?;
        let digest = hex::encode(self.hasher.finalize());
        info!("Wrote {} actions, stream sha256 {}", self.count, digest);
        Ok(digest)
    }
}

/// Parameters map of a serialized record, for callers inspecting lines.
pub fn parse_line(line: &str) -> Result<(String, Map<String, Value>)> {
    let (kind, params): (String, Map<String, Value>) = serde_json::from_str(line)?;
    Ok((kind, params))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::procedural::{KeyRef, ProceduralKeyDatabase};
    use crate::keys::resolver::tests::FakeOracle;
    use crate::keys::{KeyResolver, KeySubstituter};
    use crate::operation::{Amount, Operation, TransferOperation};

    fn transfer_tx(memo: &str) -> Transaction {
        let db = ProceduralKeyDatabase::new();
        Transaction::new(
            vec![Operation::Transfer(TransferOperation {
                from: "porter".to_string(),
                to: "alice".to_string(),
                amount: Amount::steem(5),
                memo: memo.to_string(),
            })],
            db.active_privkey("porter"),
        )
    }

    #[test]
    fn test_wait_blocks_line() {
        assert_eq!(Action::wait(1).to_line().unwrap(), r#"["wait_blocks",{"count":1}]"#);
        let first = Action::WaitBlocks { count: 1, miss_blocks: Some(7) };
        assert_eq!(first.to_line().unwrap(), r#"["wait_blocks",{"count":1,"miss_blocks":7}]"#);
    }

    #[test]
    fn test_placeholder_gets_escape() {
        let line = Action::submit(transfer_tx("Ported balance")).to_line().unwrap();
        assert_eq!(
            line,
            r#"["submit_transaction",{"esc":"Z","tx":{"operations":[["transfer",{"amount":["5",3,"@@000000021"],"from":"porter","memo":"Ported balance","to":"alice"}]],"wif_sigs":["Zprivatekey:active-porterZ"]}}]"#
        );
    }

    #[test]
    fn test_escape_avoids_existing_text() {
        let line = Action::submit(transfer_tx("ZZ top")).to_line().unwrap();
        let (_, params) = parse_line(&line).unwrap();
        assert_eq!(params["esc"], "Y");
        assert!(line.contains("Yprivatekey:active-porterY"));
    }

    #[test]
    fn test_source_text_is_never_a_key_slot() {
        let memo = "\u{0}privatekey:active-porter\u{0} Zprivatekey:active-porterZ";
        let raw = || Operation::Raw {
            kind: "transfer".to_string(),
            value: json!({"from": "alice", "to": "bob", "memo": memo}),
        };
        let db = ProceduralKeyDatabase::new();
        let oracle = FakeOracle::default();
        let mut sub = KeySubstituter::new(KeyResolver::new(oracle.clone()));

        let signed = Action::submit(Transaction::new(vec![raw()], db.active_privkey("tnman"))).to_line().unwrap();
        let (_, params) = parse_line(&signed).unwrap();
        assert_eq!(params["esc"], "Y");
        let out = sub.process_line(&signed).unwrap().unwrap();
        let (_, params) = parse_line(&out).unwrap();
        assert_eq!(params["tx"]["operations"][0][1]["memo"], memo);
        assert_eq!(params["tx"]["wif_sigs"][0], "PRIV(active-tnman)");
        assert_eq!(*oracle.calls.borrow(), vec![(String::new(), "active-tnman".to_string())]);

        let literal = Action::submit(Transaction::new(vec![raw()], KeyRef::Literal("5Jabc".to_string())))
            .to_line()
            .unwrap();
        assert!(!literal.contains("\"esc\""));
        let out = sub.process_line(&literal).unwrap().unwrap();
        let (_, params) = parse_line(&out).unwrap();
        assert_eq!(params["tx"]["operations"][0][1]["memo"], memo);
        assert_eq!(params["tx"]["wif_sigs"][0], "5Jabc");
    }

    #[test]
    fn test_literal_keys_need_no_escape() {
        let tx = Transaction::new(vec![], KeyRef::Literal("5Jabc".to_string()));
        let line = Action::submit(tx).to_line().unwrap();
        assert_eq!(line, r#"["submit_transaction",{"tx":{"operations":[],"wif_sigs":["5Jabc"]}}]"#);
    }

    #[test]
    fn test_two_letter_delimiter() {
        assert_eq!(find_non_substr(ESC_CHARS).unwrap(), "ZZ");
    }

    #[test]
    fn test_writer_digest_is_stable() {
        let actions = vec![Action::wait(1), Action::submit(transfer_tx("x")), Action::wait(50)];

        let mut a = Vec::new();
        let mut writer = ActionWriter::new(&mut a);
        writer.write_all(actions.iter().cloned().map(Ok)).unwrap();
        let digest_a = writer.finish().unwrap();

        let mut b = Vec::new();
        let mut writer = ActionWriter::new(&mut b);
        writer.write_all(actions.into_iter().map(Ok)).unwrap();
        let digest_b = writer.finish().unwrap();

        assert_eq!(a, b);
        assert_eq!(digest_a, digest_b);
        assert_eq!(digest_a.len(), 64);
        assert_eq!(std::str::from_utf8(&a).unwrap().lines().count(), 3);
    }
}
