//! Streams operations out of a source chain, block by block.

use serde_json::Value;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::client::ChainInterface;
use crate::error::{MirrornetError, Result};
use crate::operation::Operation;

/// Stops a tailing reader at its next head poll.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// `transfer_operation` and `transfer` name the same thing.
pub fn normalize_kind(kind: &str) -> &str {
    kind.strip_suffix("_operation").unwrap_or(kind)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChainOperation {
    pub block_num: u64,
    pub kind: String,
    pub value: Value,
}

impl ChainOperation {
    /// Accepts appbase `{"type", "value"}` and legacy `[name, value]` forms.
    pub fn parse(block_num: u64, op: &Value) -> Result<Self> {
        let (kind, value) = match op {
            Value::Array(pair) if pair.len() == 2 => (pair[0].as_str(), pair[1].clone()),
            Value::Object(obj) => (
                obj.get("type").and_then(Value::as_str),
                obj.get("value").cloned().unwrap_or(Value::Null),
            ),
            _ => (None, Value::Null),
        };
        let kind = kind.ok_or_else(|| MirrornetError::Decode(format!("unrecognized operation in block {}: {}", block_num, op)))?;
        Ok(Self {
            block_num,
            kind: normalize_kind(kind).to_string(),
            value,
        })
    }

    pub fn into_operation(self) -> Operation {
        Operation::Raw { kind: self.kind, value: self.value }
    }
}

/// Lazy, filtered operation stream.
///
/// A range reader covers `[min_block, max_block)` and can be recreated to
/// replay the same sequence. A tail reader follows the head forever,
/// sleeping between polls, until its [`StopHandle`] fires.
pub struct ChainReader<'a> {
    steemd: &'a mut ChainInterface,
    kinds: HashSet<String>,
    cursor: u64,
    watermark: u64,
    tail: bool,
    pending: VecDeque<ChainOperation>,
    poll_interval: Duration,
    sleep: Box<dyn FnMut(Duration) + 'a>,
    stop: StopHandle,
    failed: bool,
}

impl<'a> ChainReader<'a> {
    fn new<S: AsRef<str>>(steemd: &'a mut ChainInterface, kinds: &[S], start: u64, watermark: u64, tail: bool) -> Self {
        Self {
            steemd,
            kinds: kinds.iter().map(|k| normalize_kind(k.as_ref()).to_string()).collect(),
            cursor: start,
            watermark,
            tail,
            pending: VecDeque::new(),
            poll_interval: Duration::from_secs(1),
            sleep: Box::new(std::thread::sleep),
            stop: StopHandle::default(),
            failed: false,
        }
    }

    pub fn range<S: AsRef<str>>(steemd: &'a mut ChainInterface, kinds: &[S], min_block: u64, max_block: u64) -> Self {
        Self::new(steemd, kinds, min_block, max_block, false)
    }

    pub fn tail<S: AsRef<str>>(steemd: &'a mut ChainInterface, kinds: &[S], from_block: u64) -> Self {
        Self::new(steemd, kinds, from_block, from_block, true)
    }

    pub fn with_sleep(mut self, sleep: impl FnMut(Duration) + 'a) -> Self {
        self.sleep = Box::new(sleep);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_stop_handle(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Queue the block's matching operations and return how many there were.
    fn load_block(&mut self, block_num: u64) -> Result<usize> {
        let block = self.steemd.get_block(block_num)?;
        let transactions = block
            .get("transactions")
            .and_then(Value::as_array)
            .ok_or_else(|| MirrornetError::Decode(format!("block {} has no transactions list", block_num)))?;

        let mut matched = 0;
        for tx in transactions {
            let Some(ops) = tx.get("operations").and_then(Value::as_array) else {
                continue;
            };
            for op in ops {
                let op = ChainOperation::parse(block_num, op)?;
                if self.kinds.contains(&op.kind) {
                    self.pending.push_back(op);
                    matched += 1;
                }
            }
        }
        debug!("Block {}: {} matching operations", block_num, matched);
        Ok(matched)
    }

    /// Block until the head moves past the cursor. `Ok(false)` when stopped.
    fn wait_for_head(&mut self) -> Result<bool> {
        loop {
            if self.stop.is_stopped() {
                info!("Chain reader stopped at block {}", self.cursor);
                return Ok(false);
            }
            let head = self.steemd.head_block_number()?;
            if head > self.cursor {
                self.watermark = head;
                return Ok(true);
            }
            (self.sleep)(self.poll_interval);
        }
    }
}

impl Iterator for ChainReader<'_> {
    type Item = Result<ChainOperation>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(op) = self.pending.pop_front() {
                return Some(Ok(op));
            }
            if self.failed {
                return None;
            }

            if self.cursor < self.watermark {
                let block_num = self.cursor;
                if let Err(e) = self.load_block(block_num) {
                    self.failed = true;
                    return Some(Err(e));
                }
                self.cursor += 1;
                continue;
            }

            if !self.tail {
                return None;
            }
            match self.wait_for_head() {
                Ok(true) => continue,
                Ok(false) => return None,
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
