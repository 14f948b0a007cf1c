//! Mainnet snapshot to testnet account porting.
//!
//! A fixed `total_port_balance` is handed out so that the testnet keeps the
//! mainnet vesting:liquid ratio, each account keeps its relative share, and
//! nobody ends up below `min_vesting_per_account`. All arithmetic is integer
//! with a `10^12` fixed-point scale so replays match bit for bit.

use std::collections::HashSet;
use tracing::{debug, info};

use crate::config::TxgenConfig;
use crate::error::{MirrornetError, Result};
use crate::keys::procedural::{rekey, Authority, KeyRef, ProceduralKeyDatabase};
use crate::operation::{AccountCreateOperation, AccountUpdateOperation, Amount, Operation, Transaction, TransferOperation};
use crate::snapshot::{Snapshot, SnapshotAccount};

pub const CONVERSION_SCALE: u128 = 1_000_000_000_000;

const FUNDING_MEMO: &str = "Fund porting balances";
const PORTED_MEMO: &str = "Ported balance";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionFactors {
    pub num_accounts: u128,
    pub total_vests: u128,
    pub total_liquid: u128,
    pub total_vesting_fund: u128,
    /// What is left after every account got its floor.
    pub avail: u128,
    pub total_port_vesting: u128,
    pub total_port_liquid: u128,
    pub vest_factor: u128,
    pub liquid_factor: u128,
}

fn overflow(what: &str) -> MirrornetError {
    MirrornetError::Config(format!("{} overflows the fixed-point range", what))
}

fn scaled_factor(portion: u128, source_total: u128) -> Result<u128> {
    if source_total == 0 {
        return Ok(0);
    }
    let scaled = CONVERSION_SCALE.checked_mul(portion).ok_or_else(|| overflow("conversion factor"))?;
    Ok(scaled / source_total)
}

fn split(avail: u128, part: u128, whole: u128) -> Result<u128> {
    if whole == 0 {
        return Ok(0);
    }
    let product = avail.checked_mul(part).ok_or_else(|| overflow("balance split"))?;
    Ok(product / whole)
}

impl ConversionFactors {
    /// `balances` holds `(vesting_shares, balance)` in satoshis per user account.
    pub fn compute(
        balances: &[(u128, u128)],
        total_vesting_fund: u128,
        total_port_balance: u128,
        min_vesting_per_account: u128,
    ) -> Result<Self> {
        let num_accounts = balances.len() as u128;
        let (total_vests, total_liquid) = balances
            .iter()
            .try_fold((0u128, 0u128), |(vests, liquid), (v, l)| Some((vests.checked_add(*v)?, liquid.checked_add(*l)?)))
            .ok_or_else(|| overflow("snapshot balance total"))?;

        let reserved = min_vesting_per_account
            .checked_mul(num_accounts)
            .ok_or_else(|| overflow("min_vesting_per_account reservation"))?;
        let avail = total_port_balance
            .checked_sub(reserved)
            .ok_or(MirrornetError::InsufficientPortBalance {
                total_port_balance,
                min_vesting_per_account,
                num_accounts,
            })?;

        let whole = total_liquid
            .checked_add(total_vesting_fund)
            .ok_or_else(|| overflow("snapshot supply"))?;
        let total_port_vesting = split(avail, total_vesting_fund, whole)?;
        let total_port_liquid = split(avail, total_liquid, whole)?;

        Ok(Self {
            num_accounts,
            total_vests,
            total_liquid,
            total_vesting_fund,
            avail,
            total_port_vesting,
            total_port_liquid,
            vest_factor: scaled_factor(total_port_vesting, total_vests)?,
            liquid_factor: scaled_factor(total_port_liquid, total_liquid)?,
        })
    }

    pub fn port_vesting(&self, vests: u128) -> u128 {
        vests * self.vest_factor / CONVERSION_SCALE
    }

    pub fn port_liquid(&self, balance: u128) -> u128 {
        balance * self.liquid_factor / CONVERSION_SCALE
    }
}

struct PortedAccount<'a> {
    account: &'a SnapshotAccount,
    vesting: u128,
    liquid: u128,
}

/// Turns a loaded snapshot into the porter's transactions.
pub struct SnapshotPorter<'a> {
    known_accounts: HashSet<&'a str>,
    system_accounts: HashSet<String>,
    accounts: Vec<PortedAccount<'a>>,
    factors: ConversionFactors,
    total_port_balance: Amount,
    min_vesting_per_account: u128,
    porter: String,
    manager: String,
    key_prefix: String,
}

impl<'a> SnapshotPorter<'a> {
    pub fn new(conf: &TxgenConfig, snapshot: &'a Snapshot) -> Result<Self> {
        let system_accounts: HashSet<String> = conf.system_account_names().collect();
        let user_accounts: Vec<&SnapshotAccount> = snapshot
            .accounts
            .iter()
            .filter(|a| !system_accounts.contains(&a.name))
            .collect();

        let balances = user_accounts
            .iter()
            .map(|a| Ok((a.vesting_shares.satoshis()?, a.balance.satoshis()?)))
            .collect::<Result<Vec<(u128, u128)>>>()?;

        let min_vesting_per_account = conf.min_vesting_per_account.satoshis()?;
        let factors = ConversionFactors::compute(
            &balances,
            snapshot.dynamic_global_properties.total_vesting_fund_steem.satoshis()?,
            conf.total_port_balance.satoshis()?,
            min_vesting_per_account,
        )?;
        info!(
            "Porting {} accounts: {} vesting / {} liquid available, factors {} / {}",
            factors.num_accounts,
            factors.total_port_vesting,
            factors.total_port_liquid,
            factors.vest_factor,
            factors.liquid_factor
        );

        let accounts = user_accounts
            .into_iter()
            .zip(balances)
            .map(|(account, (vests, balance))| PortedAccount {
                account,
                vesting: factors.port_vesting(vests),
                liquid: factors.port_liquid(balance),
            })
            .collect();

        Ok(Self {
            known_accounts: snapshot.account_names(),
            system_accounts,
            accounts,
            factors,
            total_port_balance: conf.total_port_balance.clone(),
            min_vesting_per_account,
            porter: conf.template("porter")?.account_name(0),
            manager: conf.template("manager")?.account_name(0),
            key_prefix: conf.key_prefix.clone(),
        })
    }

    pub fn factors(&self) -> &ConversionFactors {
        &self.factors
    }

    /// initminer hands the whole porting budget to the porter.
    pub fn funding_transaction(&self, keydb: &ProceduralKeyDatabase) -> Transaction {
        Transaction::new(
            vec![Operation::Transfer(TransferOperation {
                from: "initminer".to_string(),
                to: self.porter.clone(),
                amount: self.total_port_balance.clone(),
                memo: FUNDING_MEMO.to_string(),
            })],
            keydb.active_privkey("initminer"),
        )
    }

    fn create_transaction(&self, ported: &PortedAccount<'_>, keydb: &ProceduralKeyDatabase) -> Transaction {
        let account = ported.account;
        let create_auth = Authority::single_account(&self.porter);
        let mut operations = vec![Operation::AccountCreate(AccountCreateOperation {
            fee: Amount::steem(ported.vesting.max(self.min_vesting_per_account)),
            creator: self.porter.clone(),
            new_account_name: account.name.clone(),
            owner: create_auth.clone(),
            active: create_auth.clone(),
            posting: create_auth,
            memo_key: KeyRef::Literal(rekey(&account.memo_key, &self.key_prefix)),
            json_metadata: String::new(),
        })];
        if ported.liquid > 0 {
            operations.push(Operation::Transfer(TransferOperation {
                from: self.porter.clone(),
                to: account.name.clone(),
                amount: Amount::steem(ported.liquid),
                memo: PORTED_MEMO.to_string(),
            }));
        }
        debug!("Port {}: vesting {} liquid {}", account.name, ported.vesting, ported.liquid);
        Transaction::new(operations, keydb.active_privkey(&self.porter))
    }

    /// Testnet authority derived from the mainnet posting authority.
    ///
    /// Account references survive only for ported user accounts, the manager
    /// is added with enough weight to act alone, and keys move to the
    /// testnet prefix.
    pub fn ported_authority(&self, account: &SnapshotAccount) -> Authority {
        let mut auth = account.posting.clone();
        auth.account_auths
            .retain(|(name, _)| self.known_accounts.contains(name.as_str()) && !self.system_accounts.contains(name));
        auth.account_auths.push((self.manager.clone(), auth.weight_threshold));
        auth.key_auths = auth
            .key_auths
            .into_iter()
            .map(|(key, weight)| match key {
                KeyRef::Literal(k) => (KeyRef::Literal(rekey(&k, &self.key_prefix)), weight),
                placeholder => (placeholder, weight),
            })
            .collect();
        auth
    }

    fn update_transaction(&self, account: &SnapshotAccount, keydb: &ProceduralKeyDatabase) -> Transaction {
        let auth = self.ported_authority(account);
        Transaction::new(
            vec![Operation::AccountUpdate(AccountUpdateOperation {
                account: account.name.clone(),
                owner: auth.clone(),
                active: auth.clone(),
                posting: auth,
                memo_key: KeyRef::Literal(rekey(&account.memo_key, &self.key_prefix)),
                json_metadata: account.json_metadata.clone(),
            })],
            keydb.active_privkey(&self.porter),
        )
    }

    /// Funding, then one create per account, then one update per account.
    pub fn transactions<'s>(&'s self, keydb: &'s ProceduralKeyDatabase) -> impl Iterator<Item = Result<Transaction>> + 's {
        std::iter::once(self.funding_transaction(keydb))
            .chain(self.accounts.iter().map(move |p| self.create_transaction(p, keydb)))
            .chain(self.accounts.iter().map(move |p| self.update_transaction(p.account, keydb)))
            .map(Ok)
    }
}
