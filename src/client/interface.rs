// Name-based access to node APIs: interface.api("database_api").method("get_block")
use serde_json::{json, Map, Value};

use crate::client::rpc_client::{CallingConvention, RemoteBackend};
use crate::error::{MirrornetError, Result};

/// Binds arbitrary `api.method` names to a backend.
///
/// Names are not checked against any catalog; a bad name only fails once
/// the node rejects the call.
pub struct ChainInterface {
    backend: RemoteBackend,
}

impl ChainInterface {
    pub fn new(backend: RemoteBackend) -> Self {
        Self { backend }
    }

    pub fn convention(&self) -> CallingConvention {
        self.backend.convention()
    }

    pub fn api<'a>(&'a mut self, name: &str) -> Api<'a> {
        Api { interface: self, name: name.to_string() }
    }

    pub fn call(
        &mut self,
        api: &str,
        method: &str,
        args: Option<Vec<Value>>,
        kwargs: Option<Map<String, Value>>,
    ) -> Result<Value> {
        self.backend.call(api, method, args, kwargs)
    }

    pub fn get_dynamic_global_properties(&mut self) -> Result<Value> {
        self.api("database_api").method("get_dynamic_global_properties").invoke()
    }

    pub fn head_block_number(&mut self) -> Result<u64> {
        let dgpo = self.get_dynamic_global_properties()?;
        dgpo.get("head_block_number")
            .and_then(Value::as_u64)
            .ok_or_else(|| MirrornetError::Decode("dynamic global properties without head_block_number".to_string()))
    }

    /// Fetch one block using whichever API the node speaks.
    pub fn get_block(&mut self, block_num: u64) -> Result<Value> {
        match self.convention() {
            CallingConvention::Named => {
                let result = self.api("block_api").method("get_block").kwarg("block_num", json!(block_num)).invoke()?;
                match result {
                    Value::Object(mut obj) => obj
                        .remove("block")
                        .ok_or_else(|| MirrornetError::Decode(format!("block {} not available", block_num))),
                    other => Err(MirrornetError::Decode(format!("unexpected get_block result: {}", other))),
                }
            }
            CallingConvention::Positional => {
                let block = self.api("database_api").method("get_block").arg(json!(block_num)).invoke()?;
                if block.is_null() {
                    return Err(MirrornetError::Decode(format!("block {} not available", block_num)));
                }
                Ok(block)
            }
        }
    }

    pub fn list_accounts(&mut self, start: &str, limit: u32) -> Result<Value> {
        self.api("database_api")
            .method("list_accounts")
            .kwarg("start", json!(start))
            .kwarg("limit", json!(limit))
            .kwarg("order", json!("by_name"))
            .invoke()
    }

    pub fn list_witnesses(&mut self, start: &str, limit: u32) -> Result<Value> {
        self.api("database_api")
            .method("list_witnesses")
            .kwarg("start", json!(start))
            .kwarg("limit", json!(limit))
            .kwarg("order", json!("by_name"))
            .invoke()
    }
}

pub struct Api<'a> {
    interface: &'a mut ChainInterface,
    name: String,
}

impl<'a> Api<'a> {
    pub fn method(self, name: &str) -> MethodCall<'a> {
        MethodCall {
            interface: self.interface,
            api: self.name,
            method: name.to_string(),
            args: None,
            kwargs: None,
        }
    }
}

/// A pending call. Positional and named arguments are collected separately
/// and handed to the backend untouched.
pub struct MethodCall<'a> {
    interface: &'a mut ChainInterface,
    api: String,
    method: String,
    args: Option<Vec<Value>>,
    kwargs: Option<Map<String, Value>>,
}

impl MethodCall<'_> {
    pub fn arg(mut self, value: Value) -> Self {
        self.args.get_or_insert_with(Vec::new).push(value);
        self
    }

    pub fn kwarg(mut self, key: &str, value: Value) -> Self {
        self.kwargs.get_or_insert_with(Map::new).insert(key.to_string(), value);
        self
    }

    pub fn invoke(self) -> Result<Value> {
        self.interface.backend.call(&self.api, &self.method, self.args, self.kwargs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::rpc_client::tests::ScriptedTransport;

    fn interface(transport: &ScriptedTransport, convention: CallingConvention) -> ChainInterface {
        let backend = RemoteBackend::new(vec!["http://node".to_string()], convention)
            .with_transport(transport.clone())
            .with_sleep(|_| {});
        ChainInterface::new(backend)
    }

    #[test]
    fn test_any_name_resolves_to_a_call() {
        let transport = ScriptedTransport::default();
        transport.push_result(json!({"ok": true}));
        let mut steemd = interface(&transport, CallingConvention::Named);

        let result = steemd.api("follow_api").method("get_followers").kwarg("account", json!("alice")).invoke().unwrap();
        assert_eq!(result, json!({"ok": true}));
        assert_eq!(
            transport.requests.borrow()[0].1["params"],
            json!(["follow_api", "get_followers", {"account": "alice"}])
        );
    }

    #[test]
    fn test_mixing_is_rejected_by_backend() {
        let transport = ScriptedTransport::default();
        let mut steemd = interface(&transport, CallingConvention::Named);
        let err = steemd
            .api("database_api")
            .method("get_block")
            .arg(json!(1))
            .kwarg("block_num", json!(1))
            .invoke()
            .unwrap_err();
        assert!(matches!(err, MirrornetError::IllegalArgument(_)));
    }

    #[test]
    fn test_get_block_conventions() {
        let transport = ScriptedTransport::default();
        transport.push_result(json!({"block": {"transactions": []}}));
        let mut appbase = interface(&transport, CallingConvention::Named);
        assert_eq!(appbase.get_block(5).unwrap(), json!({"transactions": []}));
        assert_eq!(
            transport.requests.borrow()[0].1["params"],
            json!(["block_api", "get_block", {"block_num": 5}])
        );

        let transport = ScriptedTransport::default();
        transport.push_result(json!({"transactions": []}));
        transport.push_result(Value::Null);
        let mut legacy = interface(&transport, CallingConvention::Positional);
        assert_eq!(legacy.get_block(6).unwrap(), json!({"transactions": []}));
        assert_eq!(transport.requests.borrow()[0].1["params"], json!(["database_api", "get_block", [6]]));
        assert!(matches!(legacy.get_block(7), Err(MirrornetError::Decode(_))));
    }

    #[test]
    fn test_missing_appbase_block() {
        let transport = ScriptedTransport::default();
        transport.push_result(json!({}));
        let mut appbase = interface(&transport, CallingConvention::Named);
        assert!(matches!(appbase.get_block(9), Err(MirrornetError::Decode(_))));
    }

    #[test]
    fn test_head_block_number() {
        let transport = ScriptedTransport::default();
        transport.push_result(json!({"head_block_number": 1234, "time": "2018-01-24T12:00:00"}));
        let mut steemd = interface(&transport, CallingConvention::Positional);
        assert_eq!(steemd.head_block_number().unwrap(), 1234);
    }
}
