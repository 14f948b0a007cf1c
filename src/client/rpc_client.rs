// JSON-RPC backend for talking to steem-style nodes
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, error};

use crate::config::BackendConfig;
use crate::error::{MirrornetError, Result};

/// How method arguments are passed inside `params: [api, method, args]`.
///
/// Legacy nodes take a positional array, appbase nodes take a named object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallingConvention {
    #[default]
    Positional,
    Named,
}

impl CallingConvention {
    pub fn from_appbase(appbase: bool) -> Self {
        if appbase {
            CallingConvention::Named
        } else {
            CallingConvention::Positional
        }
    }

    pub fn is_appbase(&self) -> bool {
        *self == CallingConvention::Named
    }
}

/// A failed delivery, before any response body was read.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportFailure {
    /// The server answered with a non-success HTTP status.
    Http(String),
    /// Connection refused, DNS failure, timeout and friends.
    Network(String),
}

impl TransportFailure {
    fn into_error(self, url: &str) -> MirrornetError {
        match self {
            TransportFailure::Http(message) => MirrornetError::Http { url: url.to_string(), message },
            TransportFailure::Network(message) => MirrornetError::Network { url: url.to_string(), message },
        }
    }
}

/// Delivers one request body and returns the raw response body.
pub trait Transport {
    fn post(&mut self, url: &str, body: Vec<u8>, timeout: Duration) -> std::result::Result<Vec<u8>, TransportFailure>;
}

/// HTTP POST transport backed by `reqwest::blocking`.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self { client: Client::new() }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for HttpTransport {
    fn post(&mut self, url: &str, body: Vec<u8>, timeout: Duration) -> std::result::Result<Vec<u8>, TransportFailure> {
        let response = self.client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .timeout(timeout)
            .send()
            .map_err(|e| {
                if e.is_status() {
                    TransportFailure::Http(e.to_string())
                } else {
                    TransportFailure::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportFailure::Http(format!("server returned {}", status)));
        }

        response
            .bytes()
            .map(|b| b.to_vec())
            .map_err(|e| TransportFailure::Network(format!("failed to read response: {}", e)))
    }
}

pub type SleepFn = Box<dyn FnMut(Duration)>;

/// Issues `call` requests against a list of nodes, retrying transport
/// failures with linear backoff.
///
/// Calls are strictly sequential: the response read after a request is the
/// response to that request, the `id` field is never matched.
pub struct RemoteBackend {
    nodes: Vec<String>,
    current_node: usize,
    transport: Box<dyn Transport>,
    sleep: SleepFn,
    min_timeout: Duration,
    timeout_backoff: Duration,
    max_timeout: Duration,
    /// Negative means retry forever.
    max_retries: i64,
    req_id: u64,
    req_id_increment: u64,
    convention: CallingConvention,
}

impl RemoteBackend {
    pub fn new(nodes: Vec<String>, convention: CallingConvention) -> Self {
        Self {
            nodes,
            current_node: 0,
            transport: Box::new(HttpTransport::new()),
            sleep: Box::new(std::thread::sleep),
            min_timeout: Duration::from_secs(2),
            timeout_backoff: Duration::from_secs(1),
            max_timeout: Duration::from_secs(30),
            max_retries: -1,
            req_id: 0,
            req_id_increment: 1,
            convention,
        }
    }

    pub fn from_config(config: &BackendConfig, nodes: Vec<String>, convention: CallingConvention) -> Result<Self> {
        let mut backend = Self::new(nodes, convention);
        let (min_timeout, timeout_backoff, max_timeout) = config.timeouts()?;
        backend.min_timeout = min_timeout;
        backend.timeout_backoff = timeout_backoff;
        backend.max_timeout = max_timeout;
        backend.max_retries = config.max_retries;
        backend.req_id = config.req_id;
        backend.req_id_increment = config.req_id_increment;
        Ok(backend)
    }

    pub fn with_transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Box::new(transport);
        self
    }

    pub fn with_sleep(mut self, sleep: impl FnMut(Duration) + 'static) -> Self {
        self.sleep = Box::new(sleep);
        self
    }

    pub fn convention(&self) -> CallingConvention {
        self.convention
    }

    pub fn current_node(&self) -> Option<&str> {
        self.nodes.get(self.current_node).map(String::as_str)
    }

    fn next_id(&mut self) -> u64 {
        let id = self.req_id;
        self.req_id = id.wrapping_add(self.req_id_increment);
        id
    }

    fn build_args(&self, args: Option<Vec<Value>>, kwargs: Option<Map<String, Value>>) -> Result<Value> {
        match (args, kwargs, self.convention) {
            (Some(_), Some(_), _) => Err(MirrornetError::IllegalArgument(
                "Attempt to mix positional and keyword arguments".to_string(),
            )),
            (Some(_), None, CallingConvention::Named) => Err(MirrornetError::IllegalArgument(
                "Appbase calls cannot specify positional arguments".to_string(),
            )),
            (None, Some(_), CallingConvention::Positional) => Err(MirrornetError::IllegalArgument(
                "Legacy calls cannot specify keyword arguments".to_string(),
            )),
            (None, kwargs, CallingConvention::Named) => Ok(Value::Object(kwargs.unwrap_or_default())),
            (args, None, CallingConvention::Positional) => Ok(Value::Array(args.unwrap_or_default())),
        }
    }

    /// Execute `api.method` and return only the `result` payload.
    pub fn call(
        &mut self,
        api: &str,
        method: &str,
        args: Option<Vec<Value>>,
        kwargs: Option<Map<String, Value>>,
    ) -> Result<Value> {
        let args = self.build_args(args, kwargs)?;

        if self.nodes.is_empty() {
            return Err(MirrornetError::IllegalArgument("Must specify at least one node".to_string()));
        }

        let mut timeout = self.min_timeout;
        let mut retry_count: i64 = 0;
        loop {
            let id = self.next_id();
            let request = json!({
                "jsonrpc": "2.0",
                "id": id,
                "method": "call",
                "params": [api, method, args],
            });
            let body = serde_json::to_vec(&request)?;
            debug!("req: {}", String::from_utf8_lossy(&body));

            let url = self.nodes[self.current_node].clone();
            match self.transport.post(&url, body, timeout) {
                Ok(bytes) => {
                    debug!("resp: {}", String::from_utf8_lossy(&bytes));
                    return decode_response(&bytes);
                }
                Err(failure) => {
                    error!("Request {} to {} failed: {:?}", id, url, failure);
                    retry_count += 1;
                    if self.max_retries < 0 || retry_count <= self.max_retries {
                        (self.sleep)(timeout);
                        timeout = (timeout + self.timeout_backoff).min(self.max_timeout);
                        self.current_node = (self.current_node + 1) % self.nodes.len();
                        continue;
                    }
                    return Err(failure.into_error(&url));
                }
            }
        }
    }
}

fn decode_response(bytes: &[u8]) -> Result<Value> {
    let response: Value = serde_json::from_slice(bytes)
        .map_err(|e| MirrornetError::Decode(format!("invalid JSON: {}", e)))?;

    if let Some(error) = response.get("error") {
        return Err(MirrornetError::Rpc(error.clone()));
    }

    match response {
        Value::Object(mut obj) => obj
            .remove("result")
            .ok_or_else(|| MirrornetError::Decode("response has neither result nor error".to_string())),
        other => Err(MirrornetError::Decode(format!("expected object, got {}", other))),
    }
}
