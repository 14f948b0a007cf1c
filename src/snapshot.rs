use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashSet, VecDeque};
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::Path;
use tracing::info;

use crate::client::ChainInterface;
use crate::error::{MirrornetError, Result};
use crate::keys::procedural::Authority;
use crate::operation::Amount;

/// Page size of `database_api.list_*` queries.
pub const LIST_QUERY_LIMIT: u32 = 1000;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DynamicGlobalProperties {
    pub total_vesting_fund_steem: Amount,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SnapshotAccount {
    pub name: String,
    pub balance: Amount,
    pub vesting_shares: Amount,
    pub posting: Authority,
    pub memo_key: String,
    #[serde(default)]
    pub json_metadata: String,
}

/// Source-chain state as written by [`write_snapshot`].
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Snapshot {
    pub dynamic_global_properties: DynamicGlobalProperties,
    pub accounts: Vec<SnapshotAccount>,
    #[serde(default)]
    pub witnesses: Vec<String>,
}

impl Snapshot {
    pub fn load(path: &str) -> Result<Self> {
        if !Path::new(path).exists() {
            return Err(MirrornetError::Config(format!("snapshot file not found: {}", path)));
        }
        let snapshot: Snapshot = serde_json::from_reader(BufReader::new(File::open(path)?))?;
        info!("Loaded snapshot {} with {} accounts", path, snapshot.accounts.len());
        Ok(snapshot)
    }

    pub fn account_names(&self) -> HashSet<&str> {
        self.accounts.iter().map(|a| a.name.as_str()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Listing {
    Accounts,
    Witnesses,
}

impl Listing {
    fn field(self) -> &'static str {
        match self {
            Listing::Accounts => "accounts",
            Listing::Witnesses => "witnesses",
        }
    }

    fn key(self) -> &'static str {
        match self {
            Listing::Accounts => "name",
            Listing::Witnesses => "owner",
        }
    }

    fn fetch(self, steemd: &mut ChainInterface, start: &str) -> Result<Value> {
        match self {
            Listing::Accounts => steemd.list_accounts(start, LIST_QUERY_LIMIT),
            Listing::Witnesses => steemd.list_witnesses(start, LIST_QUERY_LIMIT),
        }
    }
}

/// Walks a `by_name` listing page by page.
///
/// Each page starts at the last name seen, so only entries sorting strictly
/// after it are new. A page without new entries ends the walk.
pub struct ListAll<'a> {
    steemd: &'a mut ChainInterface,
    listing: Listing,
    last: String,
    page: VecDeque<Value>,
    done: bool,
}

impl<'a> ListAll<'a> {
    fn new(steemd: &'a mut ChainInterface, listing: Listing) -> Self {
        Self {
            steemd,
            listing,
            last: String::new(),
            page: VecDeque::new(),
            done: false,
        }
    }

    fn next_page(&mut self) -> Result<()> {
        let result = self.listing.fetch(self.steemd, &self.last)?;
        let entries = result
            .get(self.listing.field())
            .and_then(Value::as_array)
            .ok_or_else(|| MirrornetError::Decode(format!("list_{} result without entries", self.listing.field())))?;

        let mut progressed = false;
        for entry in entries {
            let key = entry
                .get(self.listing.key())
                .and_then(Value::as_str)
                .ok_or_else(|| MirrornetError::Decode(format!("{} entry without {}", self.listing.field(), self.listing.key())))?;
            if key > self.last.as_str() {
                self.last = key.to_string();
                progressed = true;
                self.page.push_back(match self.listing {
                    Listing::Accounts => entry.clone(),
                    Listing::Witnesses => Value::String(key.to_string()),
                });
            }
        }
        if !progressed {
            self.done = true;
        }
        Ok(())
    }
}

impl Iterator for ListAll<'_> {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entry) = self.page.pop_front() {
                return Some(Ok(entry));
            }
            if self.done {
                return None;
            }
            if let Err(e) = self.next_page() {
                self.done = true;
                return Some(Err(e));
            }
        }
    }
}

/// Every account object, in name order.
pub fn list_all_accounts(steemd: &mut ChainInterface) -> ListAll<'_> {
    ListAll::new(steemd, Listing::Accounts)
}

/// Every witness owner name, in name order.
pub fn list_all_witnesses(steemd: &mut ChainInterface) -> ListAll<'_> {
    ListAll::new(steemd, Listing::Witnesses)
}

fn write_collection<W: Write>(out: &mut W, entries: ListAll<'_>) -> Result<usize> {
    out.write_all(b"[\n")?;
    let mut count = 0;
    for entry in entries {
        if count > 0 {
            out.write_all(b",\n")?;
        }
        serde_json::to_writer(&mut *out, &entry?)?;
        count += 1;
    }
    out.write_all(b"\n]")?;
    Ok(count)
}

/// Dump dynamic global properties, accounts and witnesses of a live node.
///
/// Returns the number of accounts and witnesses written.
pub fn write_snapshot<W: Write>(steemd: &mut ChainInterface, mut out: W) -> Result<(usize, usize)> {
    let dgpo = steemd.get_dynamic_global_properties()?;
    out.write_all(b"{\n\"dynamic_global_properties\":")?;
    serde_json::to_writer(&mut out, &dgpo)?;

    out.write_all(b",\n\"accounts\":")?;
    let accounts = write_collection(&mut out, list_all_accounts(steemd))?;
    info!("Dumped {} accounts", accounts);

    out.write_all(b",\n\"witnesses\":")?;
    let witnesses = write_collection(&mut out, list_all_witnesses(steemd))?;
    info!("Dumped {} witnesses", witnesses);

    out.write_all(b"\n}\n")?;
    out.flush()?;
    Ok((accounts, witnesses))
}
