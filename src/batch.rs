//! Block-aligned batching of generated transactions.

use std::collections::VecDeque;

use crate::action::Action;
use crate::error::Result;
use crate::operation::Transaction;

/// Wait long enough for the replay script to stay open after setup.
pub const FINAL_WAIT_BLOCKS: u64 = 1_000_000_000;

/// Emits `wait_blocks{count: 1}` followed by up to `per_block` submits,
/// chunk after chunk.
///
/// An error from the source is passed through as soon as it is pulled and
/// ends the stream.
pub struct BlockBatches<I> {
    source: I,
    per_block: usize,
    pending: VecDeque<Action>,
    done: bool,
}

impl<I: Iterator<Item = Result<Transaction>>> BlockBatches<I> {
    pub fn new(source: I, per_block: usize) -> Self {
        Self {
            source,
            per_block: per_block.max(1),
            pending: VecDeque::new(),
            done: false,
        }
    }
}

impl<I: Iterator<Item = Result<Transaction>>> Iterator for BlockBatches<I> {
    type Item = Result<Action>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(action) = self.pending.pop_front() {
            return Some(Ok(action));
        }
        if self.done {
            return None;
        }

        let mut chunk = Vec::with_capacity(self.per_block);
        while chunk.len() < self.per_block {
            match self.source.next() {
                Some(Ok(tx)) => chunk.push(Action::submit(tx)),
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                None => {
                    self.done = true;
                    break;
                }
            }
        }
        if chunk.is_empty() {
            return None;
        }
        self.pending.extend(chunk);
        Some(Ok(Action::wait(1)))
    }
}

pub fn batch_transactions<I>(source: I, per_block: usize) -> BlockBatches<I::IntoIter>
where
    I: IntoIterator<Item = Result<Transaction>>,
{
    BlockBatches::new(source.into_iter(), per_block)
}
