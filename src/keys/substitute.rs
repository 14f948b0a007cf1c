//! Second pass over an action stream: swap key placeholders for real keys.
//!
//! Records carry an `esc` delimiter when they contain placeholders such as
//! `Zpublickey:owner-init-0Z`. A `set_secret` record changes the secret for
//! every record after it and is dropped from the output.

use serde_json::Value;
use std::io::{BufRead, Write};
use tracing::{debug, info};

use crate::error::{MirrornetError, Result};
use crate::keys::resolver::{KeyOracle, KeyResolver};

/// Split `s` into `(span, is_escaped)` pieces delimited by `esc`.
pub fn tag_escape_sequences<'a>(s: &'a str, esc: &str) -> Result<Vec<(&'a str, bool)>> {
    if esc.is_empty() {
        return Ok(vec![(s, false)]);
    }

    let mut spans = Vec::new();
    let mut rest = s;
    while let Some(start) = rest.find(esc) {
        spans.push((&rest[..start], false));
        let inner = &rest[start + esc.len()..];
        let end = inner.find(esc).ok_or_else(|| {
            MirrornetError::EscapeFormat(format!("unterminated escape sequence starting at '{}'", &rest[start..]))
        })?;
        spans.push((&inner[..end], true));
        rest = &inner[end + esc.len()..];
    }
    spans.push((rest, false));
    Ok(spans)
}

/// Replace every escaped `publickey:<seed>` / `privatekey:<seed>` span.
pub fn process_esc<O: KeyOracle>(s: &str, esc: &str, resolver: &mut KeyResolver<O>) -> Result<String> {
    let mut result = String::with_capacity(s.len());
    for (span, is_escaped) in tag_escape_sequences(s, esc)? {
        if !is_escaped {
            result.push_str(span);
            continue;
        }
        let (ktype, seed) = span
            .split_once(':')
            .ok_or_else(|| MirrornetError::EscapeFormat(format!("escaped span without key tag: '{}'", span)))?;
        let key = match ktype {
            "publickey" => resolver.pubkey(seed)?,
            "privatekey" => resolver.privkey(seed)?,
            other => return Err(MirrornetError::UnknownKeyTag(other.to_string())),
        };
        result.push_str(&json_string_body(&key)?);
    }
    Ok(result)
}

/// `key` as it appears between the quotes of a JSON string.
fn json_string_body(key: &str) -> Result<String> {
    let quoted = serde_json::to_string(key)?;
    Ok(quoted[1..quoted.len() - 1].to_string())
}

pub struct KeySubstituter<O: KeyOracle> {
    resolver: KeyResolver<O>,
}

impl<O: KeyOracle> KeySubstituter<O> {
    pub fn new(resolver: KeyResolver<O>) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &KeyResolver<O> {
        &self.resolver
    }

    /// Rewrite one record. `None` means the record is not forwarded.
    pub fn process_line(&mut self, line: &str) -> Result<Option<String>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let record: Value = serde_json::from_str(line)?;
        let (kind, mut args) = match record {
            Value::Array(mut pair) if pair.len() == 2 => {
                let args = pair.pop().unwrap_or(Value::Null);
                let kind = pair.pop().unwrap_or(Value::Null);
                (kind, args)
            }
            _ => return Err(MirrornetError::EscapeFormat(format!("not an action record: {}", line))),
        };

        if kind == "set_secret" {
            let secret = args
                .get("secret")
                .and_then(Value::as_str)
                .ok_or_else(|| MirrornetError::EscapeFormat("set_secret without secret".to_string()))?;
            debug!("Switching key secret");
            self.resolver.set_secret(secret);
            return Ok(None);
        }

        let esc = match args.get("esc").and_then(Value::as_str) {
            Some(esc) if !esc.is_empty() => esc.to_string(),
            _ => return Ok(Some(line.to_string())),
        };
        if let Value::Object(obj) = &mut args {
            obj.remove("esc");
        }
        let stripped = serde_json::to_string(&Value::Array(vec![kind, args]))?;
        process_esc(&stripped, &esc, &mut self.resolver).map(Some)
    }

    /// Process a whole stream, flushing after each record.
    pub fn run<R: BufRead, W: Write>(&mut self, input: R, mut output: W) -> Result<usize> {
        let mut written = 0;
        for line in input.lines() {
            if let Some(out) = self.process_line(&line?)? {
                output.write_all(out.as_bytes())?;
                output.write_all(b"\n")?;
                output.flush()?;
                written += 1;
            }
        }
        info!("Resolved {} records, {} keys derived", written, self.resolver.cached());
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::resolver::tests::FakeOracle;

    fn substituter(oracle: &FakeOracle) -> KeySubstituter<FakeOracle> {
        KeySubstituter::new(KeyResolver::new(oracle.clone()))
    }

    #[test]
    fn test_escape_round_trip() {
        let mut resolver = KeyResolver::new(FakeOracle::default());
        let out = process_esc("@publickey:seed1@,plain,@privatekey:seed2@", "@", &mut resolver).unwrap();
        assert_eq!(out, "PUB(seed1),plain,PRIV(seed2)");
    }

    #[test]
    fn test_unterminated_escape() {
        let mut resolver = KeyResolver::new(FakeOracle::default());
        let err = process_esc("a@publickey:seed1", "@", &mut resolver).unwrap_err();
        assert!(matches!(err, MirrornetError::EscapeFormat(_)));
    }

    #[test]
    fn test_bad_tags() {
        let mut resolver = KeyResolver::new(FakeOracle::default());
        assert!(matches!(
            process_esc("@sharedkey:x@", "@", &mut resolver),
            Err(MirrornetError::UnknownKeyTag(tag)) if tag == "sharedkey"
        ));
        assert!(matches!(
            process_esc("@nocolon@", "@", &mut resolver),
            Err(MirrornetError::EscapeFormat(_))
        ));
    }

    #[test]
    fn test_spans() {
        let spans = tag_escape_sequences("aZbZcZdZ", "Z").unwrap();
        assert_eq!(spans, vec![("a", false), ("b", true), ("c", false), ("d", true), ("", false)]);
        assert_eq!(tag_escape_sequences("plain", "").unwrap(), vec![("plain", false)]);
    }

    #[test]
    fn test_record_rewrite() {
        let oracle = FakeOracle::default();
        let mut sub = substituter(&oracle);
        let line = r#"["submit_transaction",{"esc":"Z","tx":{"operations":[],"wif_sigs":["Zprivatekey:active-porterZ"]}}]"#;
        let out = sub.process_line(line).unwrap().unwrap();
        assert_eq!(
            out,
            r#"["submit_transaction",{"tx":{"operations":[],"wif_sigs":["PRIV(active-porter)"]}}]"#
        );
    }

    #[test]
    fn test_plain_record_needs_no_oracle() {
        let oracle = FakeOracle::default();
        let mut sub = substituter(&oracle);
        let line = r#"["wait_blocks",{"count":1}]"#;
        assert_eq!(sub.process_line(line).unwrap().unwrap(), line);
        assert!(oracle.calls.borrow().is_empty());
    }

    #[test]
    fn test_set_secret_ordering() {
        let oracle = FakeOracle::default();
        let mut sub = substituter(&oracle);
        let input = [
            r#"["submit_transaction",{"esc":"Z","tx":{"operations":[],"wif_sigs":["Zprivatekey:active-aZ"]}}]"#,
            r#"["set_secret",{"secret":"xyz-"}]"#,
            r#"["submit_transaction",{"esc":"Z","tx":{"operations":[],"wif_sigs":["Zprivatekey:active-aZ"]}}]"#,
            r#"["submit_transaction",{"esc":"Y","tx":{"operations":[],"wif_sigs":["Yprivatekey:active-bY"]}}]"#,
        ]
        .join("\n");

        let mut out = Vec::new();
        let written = sub.run(input.as_bytes(), &mut out).unwrap();
        assert_eq!(written, 3);

        let lines: Vec<&str> = std::str::from_utf8(&out).unwrap().lines().collect();
        assert!(lines[0].contains("PRIV(active-a)"));
        // already resolved before the secret changed
        assert!(lines[1].contains("PRIV(active-a)"));
        assert!(lines[2].contains("PRIV(xyz-active-b)"));
        assert!(lines.iter().all(|l| !l.contains("set_secret")));
        assert_eq!(sub.resolver().secret(), "xyz-");
    }

    #[test]
    fn test_secret_before_first_use() {
        let oracle = FakeOracle::default();
        let mut sub = substituter(&oracle);
        sub.process_line(r#"["set_secret",{"secret":"s-"}]"#).unwrap();
        let out = sub
            .process_line(r#"["submit_transaction",{"esc":"Q","tx":{"operations":[],"wif_sigs":["Qprivatekey:active-aQ"]}}]"#)
            .unwrap()
            .unwrap();
        assert!(out.contains("PRIV(s-active-a)"));
    }
}
