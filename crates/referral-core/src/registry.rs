use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub type AccountId = String;
pub type Amount = u64;

/// True for identities that can never take part in a referral link: the
/// empty string and the all-zero `0x` address.
pub fn is_null_account(id: &str) -> bool {
    let id = id.trim();
    if id.is_empty() {
        return true;
    }
    match id.strip_prefix("0x").or_else(|| id.strip_prefix("0X")) {
        Some(digits) => digits.chars().all(|c| c == '0'),
        None => false,
    }
}

/// Referral state of a single account.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Account {
    /// Upline, set at most once.
    pub referrer: Option<AccountId>,
    /// Number of direct referees.
    pub referee_count: u32,
    /// Everything ever paid to this account as referral bonus.
    pub reward: Amount,
    pub last_active_time: Option<u64>,
}

impl Account {
    pub fn has_referrer(&self) -> bool {
        self.referrer.is_some()
    }

    /// Whether the account counts as active at `now`.
    pub fn is_active(&self, now: u64, seconds_until_inactive: u64) -> bool {
        match self.last_active_time {
            Some(last) => now.saturating_sub(last) <= seconds_until_inactive,
            None => false,
        }
    }
}

/// Arena of account records keyed by identity. Each record only points at
/// its parent.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AccountRegistry {
    accounts: BTreeMap<AccountId, Account>,
}

impl AccountRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_accounts(accounts: BTreeMap<AccountId, Account>) -> Self {
        Self { accounts }
    }

    pub fn get(&self, account: &str) -> Option<&Account> {
        self.accounts.get(account)
    }

    /// Record for `account`, or an empty one if it was never touched.
    pub fn account_or_default(&self, account: &str) -> Account {
        self.accounts.get(account).cloned().unwrap_or_default()
    }

    pub fn entry(&mut self, account: &AccountId) -> &mut Account {
        self.accounts
            .entry(account.clone())
            .or_insert_with(Account::default)
    }

    pub fn referrer_of(&self, account: &str) -> Option<&AccountId> {
        self.accounts.get(account).and_then(|a| a.referrer.as_ref())
    }

    pub fn has_referrer(&self, account: &str) -> bool {
        self.referrer_of(account).is_some()
    }

    /// Up to `limit` uplines of `account`, nearest first.
    pub fn ancestors(&self, account: &str, limit: usize) -> Vec<AccountId> {
        let mut chain = Vec::new();
        let mut node = account;
        while chain.len() < limit {
            match self.referrer_of(node) {
                Some(parent) => {
                    chain.push(parent.clone());
                    node = parent.as_str();
                }
                None => break,
            }
        }
        chain
    }

    /// Whether `candidate` sits anywhere on the upline chain of `account`
    /// (or is `account` itself).
    pub fn is_upline_or_self(&self, account: &str, candidate: &str) -> bool {
        let mut node = account;
        // A walk longer than the account count can only mean a cycle slipped in.
        for _ in 0..=self.accounts.len() {
            if node == candidate {
                return true;
            }
            match self.referrer_of(node) {
                Some(parent) => node = parent.as_str(),
                None => return false,
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AccountId, &Account)> {
        self.accounts.iter()
    }

    pub(crate) fn accounts(&self) -> &BTreeMap<AccountId, Account> {
        &self.accounts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(registry: &mut AccountRegistry, referee: &str, referrer: &str) {
        registry.entry(&referee.to_string()).referrer = Some(referrer.to_string());
        registry.entry(&referrer.to_string()).referee_count += 1;
    }

    #[test]
    fn null_identities() {
        assert!(is_null_account(""));
        assert!(is_null_account("  "));
        assert!(is_null_account("0x0000000000000000000000000000000000000000"));
        assert!(is_null_account("0x"));
        assert!(!is_null_account("0x01"));
        assert!(!is_null_account("alice"));
        assert!(!is_null_account("0"));
    }

    #[test]
    fn unknown_accounts_read_as_default() {
        let registry = AccountRegistry::new();
        assert_eq!(registry.account_or_default("ghost"), Account::default());
        assert!(!registry.has_referrer("ghost"));
        assert!(registry.is_empty());
    }

    #[test]
    fn ancestors_are_nearest_first_and_bounded() {
        let mut registry = AccountRegistry::new();
        link(&mut registry, "alice", "root");
        link(&mut registry, "bob", "alice");
        link(&mut registry, "carol", "bob");
        assert_eq!(registry.ancestors("carol", 2), vec!["bob", "alice"]);
        assert_eq!(registry.ancestors("carol", 10), vec!["bob", "alice", "root"]);
        assert!(registry.ancestors("root", 3).is_empty());
    }

    #[test]
    fn upline_detection_walks_whole_chain() {
        let mut registry = AccountRegistry::new();
        link(&mut registry, "b", "a");
        link(&mut registry, "c", "b");
        link(&mut registry, "d", "c");
        link(&mut registry, "e", "d");
        assert!(registry.is_upline_or_self("e", "a"));
        assert!(registry.is_upline_or_self("e", "e"));
        assert!(!registry.is_upline_or_self("a", "e"));
    }

    #[test]
    fn activity_window_is_inclusive() {
        let mut account = Account::default();
        assert!(!account.is_active(100, 86_400));
        account.last_active_time = Some(1_000);
        assert!(account.is_active(1_000 + 86_400, 86_400));
        assert!(!account.is_active(1_000 + 86_401, 86_400));
        // clock behind the last update counts as active
        assert!(account.is_active(500, 86_400));
    }
}
