//! Testnet setup: the action stream that bootstraps a fresh chain.

use chrono::NaiveDateTime;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Map;
use std::collections::BTreeSet;
use std::iter;
use tracing::info;

use crate::action::Action;
use crate::batch::{batch_transactions, FINAL_WAIT_BLOCKS};
use crate::config::{AccountTemplate, TxgenConfig};
use crate::error::{MirrornetError, Result};
use crate::keys::procedural::{KeyRef, ProceduralKeyDatabase};
use crate::operation::{
    AccountCreateOperation, AccountUpdateOperation, AccountWitnessVoteOperation, Amount, Operation, Transaction,
    TransferToVestingOperation, WitnessUpdateOperation,
};
use crate::porter::SnapshotPorter;
use crate::snapshot::Snapshot;

pub const STEEM_GENESIS_TIMESTAMP: i64 = 1451606400;
pub const STEEM_BLOCK_INTERVAL: i64 = 3;

const START_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
const WITNESS_URL: &str = "https://steemit.com/";
const WITNESS_SIGNING_KEY: &str = "TST6LLegbAgLAy28EHrffBVuANFWcFgmqRMW13wBmTExqFE9SCkg4";

/// Templates created during setup, in creation order.
const CREATED_ROLES: [&str; 4] = ["init", "elector", "manager", "porter"];

/// Blocks the testnet skips so its head time lines up with `start_time`.
pub fn miss_blocks(start_time: &str) -> Result<u64> {
    let start = NaiveDateTime::parse_from_str(start_time, START_TIME_FORMAT)
        .map_err(|e| MirrornetError::Config(format!("invalid start_time '{}': {}", start_time, e)))?;
    let elapsed = start.and_utc().timestamp() - STEEM_GENESIS_TIMESTAMP;
    Ok((elapsed / STEEM_BLOCK_INTERVAL - 1).max(0) as u64)
}

fn required<'t, T>(template: &'t AccountTemplate, field: &str, value: &'t Option<T>) -> Result<&'t T> {
    value
        .as_ref()
        .ok_or_else(|| MirrornetError::Config(format!("account template '{}' needs '{}'", template.name, field)))
}

/// Builds every setup transaction for one configuration and snapshot.
pub struct SetupGenerator<'a> {
    conf: &'a TxgenConfig,
    keydb: ProceduralKeyDatabase,
    porter: SnapshotPorter<'a>,
}

impl<'a> SetupGenerator<'a> {
    pub fn new(conf: &'a TxgenConfig, snapshot: &'a Snapshot) -> Result<Self> {
        if conf.transactions_per_block == 0 {
            return Err(MirrornetError::Config("transactions_per_block must be positive".to_string()));
        }
        Ok(Self {
            conf,
            keydb: ProceduralKeyDatabase::new(),
            porter: SnapshotPorter::new(conf, snapshot)?,
        })
    }

    /// initminer takes procedural keys, vests its stake and votes for itself.
    pub fn initminer_transaction(&self) -> Result<Transaction> {
        let template = self.conf.template("initminer")?;
        let vesting = required(template, "vesting", &template.vesting)?.clone();
        let name = "initminer";
        Ok(Transaction::new(
            vec![
                Operation::AccountUpdate(AccountUpdateOperation {
                    account: name.to_string(),
                    owner: self.keydb.authority(name, "owner"),
                    active: self.keydb.authority(name, "active"),
                    posting: self.keydb.authority(name, "posting"),
                    memo_key: self.keydb.pubkey(name, "memo"),
                    json_metadata: String::new(),
                }),
                Operation::TransferToVesting(TransferToVestingOperation {
                    from: name.to_string(),
                    to: name.to_string(),
                    amount: vesting,
                }),
                Operation::AccountWitnessVote(AccountWitnessVoteOperation {
                    account: name.to_string(),
                    witness: name.to_string(),
                    approve: true,
                }),
            ],
            KeyRef::Literal(self.conf.initminer_wif.clone()),
        ))
    }

    pub fn create_accounts(&self, role: &str) -> Result<impl Iterator<Item = Transaction> + '_> {
        let template = self.conf.template(role)?;
        let creator = required(template, "creator", &template.creator)?;
        let fee = required(template, "vesting", &template.vesting)?;
        let keydb = &self.keydb;

        Ok(template.account_names().map(move |name| {
            Transaction::new(
                vec![Operation::AccountCreate(AccountCreateOperation {
                    fee: fee.clone(),
                    creator: creator.clone(),
                    owner: keydb.authority(&name, "owner"),
                    active: keydb.authority(&name, "active"),
                    posting: keydb.authority(&name, "posting"),
                    memo_key: keydb.pubkey(&name, "memo"),
                    json_metadata: String::new(),
                    new_account_name: name,
                })],
                keydb.active_privkey(creator),
            )
        }))
    }

    pub fn update_witnesses(&self, role: &str) -> Result<impl Iterator<Item = Transaction> + '_> {
        let template = self.conf.template(role)?;
        let keydb = &self.keydb;
        Ok(template.account_names().map(move |name| {
            let signer = keydb.active_privkey(&name);
            Transaction::new(
                vec![Operation::WitnessUpdate(WitnessUpdateOperation {
                    owner: name,
                    url: WITNESS_URL.to_string(),
                    block_signing_key: KeyRef::Literal(WITNESS_SIGNING_KEY.to_string()),
                    props: Map::new(),
                    fee: Amount::steem(0),
                })],
                signer,
            )
        }))
    }

    /// One transaction per elector holding its witness votes.
    ///
    /// Round-robin picks continue across electors; random picks come from a
    /// generator seeded with the elector template's `randseed`.
    pub fn vote_accounts(&self, elector: &str, elected: &str) -> Result<Vec<Transaction>> {
        let electors = self.conf.template(elector)?;
        let candidates = self.conf.template(elected)?;
        let round_robin = electors.round_robin_votes_per_elector.unwrap_or(0);
        let random = electors.random_votes_per_elector.unwrap_or(0);
        if candidates.count == 0 && (round_robin > 0 || random > 0) {
            return Err(MirrornetError::Config(format!("no '{}' accounts to vote for", elected)));
        }

        let mut cycle = (0..candidates.count).cycle();
        let mut rng = StdRng::seed_from_u64(electors.randseed.unwrap_or(0));

        let mut txs = Vec::with_capacity(electors.count as usize);
        for voter in electors.account_names() {
            let mut votes = BTreeSet::new();
            votes.extend(cycle.by_ref().take(round_robin as usize));
            for _ in 0..random {
                votes.insert(rng.gen_range(0..candidates.count));
            }

            let operations = votes
                .into_iter()
                .map(|index| {
                    Operation::AccountWitnessVote(AccountWitnessVoteOperation {
                        account: voter.clone(),
                        witness: candidates.account_name(index),
                        approve: true,
                    })
                })
                .collect();
            txs.push(Transaction::new(operations, self.keydb.active_privkey(&voter)));
        }
        Ok(txs)
    }

    /// Everything after the initminer bootstrap, in submission order.
    pub fn setup_transactions(&self) -> Result<impl Iterator<Item = Result<Transaction>> + '_> {
        let mut created: Box<dyn Iterator<Item = Transaction> + '_> = Box::new(iter::empty());
        for role in CREATED_ROLES {
            created = Box::new(created.chain(self.create_accounts(role)?));
        }
        let witnesses = self.update_witnesses("init")?;
        let votes = self.vote_accounts("elector", "init")?;

        Ok(created
            .map(Ok)
            .chain(self.porter.transactions(&self.keydb))
            .chain(witnesses.chain(votes).map(Ok)))
    }

    /// The complete setup action stream.
    pub fn actions(&self) -> Result<impl Iterator<Item = Result<Action>> + '_> {
        let miss = miss_blocks(&self.conf.start_time)?;
        info!("Testnet starts {} blocks after genesis", miss);

        let bootstrap = [
            Action::WaitBlocks { count: 1, miss_blocks: Some(miss) },
            Action::submit(self.initminer_transaction()?),
        ];
        let batched = batch_transactions(self.setup_transactions()?, self.conf.transactions_per_block);

        Ok(bootstrap
            .into_iter()
            .map(Ok)
            .chain(batched)
            .chain(iter::once(Ok(Action::wait(FINAL_WAIT_BLOCKS)))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionWriter;
    use crate::porter::tests::{sample_snapshot, txgen_config};

    #[test]
    fn test_miss_blocks() {
        assert_eq!(miss_blocks("2016-01-01T00:00:06").unwrap(), 1);
        assert_eq!(miss_blocks("2016-01-01T00:00:00").unwrap(), 0);
        assert_eq!(miss_blocks("2015-06-01T00:00:00").unwrap(), 0);
        assert_eq!(miss_blocks("2016-01-02T00:00:00").unwrap(), 86_400 / 3 - 1);
        assert!(matches!(miss_blocks("yesterday"), Err(MirrornetError::Config(_))));
    }

    #[test]
    fn test_initminer_transaction() {
        let conf = txgen_config(100_000, 1000);
        let snapshot = sample_snapshot();
        let generator = SetupGenerator::new(&conf, &snapshot).unwrap();

        let tx = generator.initminer_transaction().unwrap();
        let names: Vec<&str> = tx.operations.iter().map(Operation::name).collect();
        assert_eq!(names, vec!["account_update", "transfer_to_vesting", "account_witness_vote"]);
        assert_eq!(tx.wif_sigs, vec![KeyRef::Literal("5Jinitminer".to_string())]);
    }

    #[test]
    fn test_create_accounts_use_creator_key() {
        let conf = txgen_config(100_000, 1000);
        let snapshot = sample_snapshot();
        let generator = SetupGenerator::new(&conf, &snapshot).unwrap();

        let txs: Vec<Transaction> = generator.create_accounts("init").unwrap().collect();
        assert_eq!(txs.len(), 3);
        match &txs[2].operations[0] {
            Operation::AccountCreate(op) => {
                assert_eq!(op.new_account_name, "init-2");
                assert_eq!(op.creator, "initminer");
                assert_eq!(op.memo_key, KeyRef::Public("memo-init-2".to_string()));
            }
            other => panic!("unexpected operation {:?}", other),
        }
        assert_eq!(txs[2].wif_sigs, vec![KeyRef::Private("active-initminer".to_string())]);
    }

    #[test]
    fn test_votes_are_sorted_and_reproducible() {
        let conf = txgen_config(100_000, 1000);
        let snapshot = sample_snapshot();
        let generator = SetupGenerator::new(&conf, &snapshot).unwrap();

        let first = generator.vote_accounts("elector", "init").unwrap();
        let second = generator.vote_accounts("elector", "init").unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);

        let witnesses = |tx: &Transaction| -> Vec<String> {
            tx.operations
                .iter()
                .map(|op| match op {
                    Operation::AccountWitnessVote(vote) => vote.witness.clone(),
                    other => panic!("unexpected operation {:?}", other),
                })
                .collect()
        };
        let elector0 = witnesses(&first[0]);
        let elector1 = witnesses(&first[1]);
        // round robin hands out 0,1 then 2,0
        assert!(elector0.contains(&"init-0".to_string()) && elector0.contains(&"init-1".to_string()));
        assert!(elector1.contains(&"init-2".to_string()) && elector1.contains(&"init-0".to_string()));
        let mut sorted = elector0.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(elector0, sorted);
        assert_eq!(first[1].wif_sigs, vec![KeyRef::Private("active-elector-1".to_string())]);
    }

    #[test]
    fn test_full_action_stream() {
        let conf = txgen_config(100_000, 1000);
        let snapshot = sample_snapshot();
        let generator = SetupGenerator::new(&conf, &snapshot).unwrap();
        let actions: Vec<Action> = generator.actions().unwrap().collect::<Result<_>>().unwrap();

        assert_eq!(actions[0], Action::WaitBlocks { count: 1, miss_blocks: Some(1) });
        assert_eq!(actions[1].kind(), "submit_transaction");
        assert_eq!(actions[2], Action::wait(1));
        assert_eq!(actions.last(), Some(&Action::wait(FINAL_WAIT_BLOCKS)));

        // 3 init + 2 elector + manager + porter, 5 porting, 3 witnesses, 2 voters
        let submits = actions.iter().filter(|a| a.kind() == "submit_transaction").count();
        assert_eq!(submits, 1 + 7 + 5 + 3 + 2);
        let waits = actions.iter().filter(|a| **a == Action::wait(1)).count();
        assert_eq!(waits, 1);
    }

    #[test]
    fn test_small_batches() {
        let mut conf = txgen_config(100_000, 1000);
        conf.transactions_per_block = 5;
        let snapshot = sample_snapshot();
        let generator = SetupGenerator::new(&conf, &snapshot).unwrap();
        let actions: Vec<Action> = generator.actions().unwrap().collect::<Result<_>>().unwrap();
        // 17 setup transactions in blocks of 5
        assert_eq!(actions.iter().filter(|a| **a == Action::wait(1)).count(), 4);
    }

    #[test]
    fn test_stream_is_deterministic() {
        let conf = txgen_config(100_000, 1000);
        let snapshot = sample_snapshot();

        let render = || {
            let generator = SetupGenerator::new(&conf, &snapshot).unwrap();
            let mut out = Vec::new();
            let mut writer = ActionWriter::new(&mut out);
            writer.write_all(generator.actions().unwrap()).unwrap();
            let digest = writer.finish().unwrap();
            (out, digest)
        };
        assert_eq!(render(), render());
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let mut conf = txgen_config(100_000, 1000);
        conf.transactions_per_block = 0;
        let snapshot = sample_snapshot();
        assert!(matches!(SetupGenerator::new(&conf, &snapshot), Err(MirrornetError::Config(_))));
    }

    #[test]
    fn test_missing_template() {
        let mut conf = txgen_config(100_000, 1000);
        conf.accounts.remove("elector");
        let snapshot = sample_snapshot();
        let generator = SetupGenerator::new(&conf, &snapshot).unwrap();
        assert!(matches!(generator.setup_transactions(), Err(MirrornetError::Config(_))));
    }
}
