use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::clock::Clock;
use crate::error::ReferralError;
use crate::program::ReferralProgram;
use crate::rates::{RateConfig, RateTable};
use crate::registry::{is_null_account, Account, AccountId, AccountRegistry};

/// Persisted form of a program: the rate table and the account table.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProgramSnapshot {
    pub rates: RateConfig,
    pub accounts: BTreeMap<AccountId, Account>,
    /// Hex SHA-256 root over `accounts`.
    pub state_root: String,
}

impl<C: Clock> ReferralProgram<C> {
    pub fn snapshot(&self) -> ProgramSnapshot {
        let accounts = self.registry().accounts().clone();
        ProgramSnapshot {
            rates: self.rates().config().clone(),
            state_root: hex::encode(compute_state_root(&accounts)),
            accounts,
        }
    }

    /// Rebuild a program from a snapshot. Pending events are not part of a
    /// snapshot; the restored program starts with an empty buffer.
    pub fn restore(snapshot: ProgramSnapshot, clock: C) -> Result<Self, ReferralError> {
        let rates = RateTable::new(snapshot.rates)?;
        let computed = hex::encode(compute_state_root(&snapshot.accounts));
        if !computed.eq_ignore_ascii_case(&snapshot.state_root) {
            return Err(ReferralError::SnapshotRootMismatch {
                expected: snapshot.state_root,
                computed,
            });
        }
        check_forest(&snapshot.accounts)?;
        info!(
            accounts = snapshot.accounts.len(),
            state_root = %computed,
            "restored referral program"
        );
        Ok(Self::from_parts(
            rates,
            AccountRegistry::from_accounts(snapshot.accounts),
            clock,
        ))
    }
}

fn check_forest(accounts: &BTreeMap<AccountId, Account>) -> Result<(), ReferralError> {
    let mut counts: BTreeMap<&str, u32> = BTreeMap::new();
    for (id, account) in accounts {
        if is_null_account(id) {
            return Err(ReferralError::CorruptSnapshot("null account record".into()));
        }
        if let Some(referrer) = &account.referrer {
            if referrer == id || !accounts.contains_key(referrer) {
                return Err(ReferralError::CorruptSnapshot(format!(
                    "account {id} has invalid referrer {referrer}"
                )));
            }
            *counts.entry(referrer.as_str()).or_default() += 1;
        }
    }
    for (id, account) in accounts {
        let linked = counts.get(id.as_str()).copied().unwrap_or(0);
        if linked != account.referee_count {
            return Err(ReferralError::CorruptSnapshot(format!(
                "account {id} records {} referees, {linked} linked",
                account.referee_count
            )));
        }
    }
    let registry = AccountRegistry::from_accounts(accounts.clone());
    for id in accounts.keys() {
        if registry.ancestors(id, accounts.len()).len() >= accounts.len() {
            return Err(ReferralError::CorruptSnapshot(format!(
                "referral cycle through {id}"
            )));
        }
    }
    Ok(())
}

/// Binary SHA-256 hash tree over the account records in key order. An odd
/// node at the end of a level is paired with itself.
pub fn compute_state_root(accounts: &BTreeMap<AccountId, Account>) -> [u8; 32] {
    let mut level: Vec<[u8; 32]> = accounts
        .iter()
        .map(|(id, account)| account_leaf(id, account))
        .collect();
    if level.is_empty() {
        return Sha256::digest(b"referral-ledger-empty").into();
    }
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| {
                Sha256::new()
                    .chain_update(b"node")
                    .chain_update(pair[0])
                    .chain_update(pair[pair.len() - 1])
                    .finalize()
                    .into()
            })
            .collect();
    }
    level[0]
}

fn account_leaf(id: &str, account: &Account) -> [u8; 32] {
    let mut hasher = Sha256::new()
        .chain_update(b"acct")
        .chain_update((id.len() as u64).to_le_bytes())
        .chain_update(id.as_bytes());
    hasher = match &account.referrer {
        Some(referrer) => hasher
            .chain_update([1u8])
            .chain_update((referrer.len() as u64).to_le_bytes())
            .chain_update(referrer.as_bytes()),
        None => hasher.chain_update([0u8]),
    };
    hasher = hasher
        .chain_update(account.referee_count.to_le_bytes())
        .chain_update(account.reward.to_le_bytes());
    hasher = match account.last_active_time {
        Some(ts) => hasher.chain_update([1u8]).chain_update(ts.to_le_bytes()),
        None => hasher.chain_update([0u8]),
    };
    hasher.finalize().into()
}
