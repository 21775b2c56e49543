//! In-memory balance ledger.
//!
//! [`RewardLedger`] holds plain balances and pays referral bonuses out of a
//! single treasury account, which makes it a [`FundsTransfer`] for
//! `referral_core` payouts.

use std::collections::BTreeMap;

use referral_core::{AccountId, Amount, FundsTransfer, TransferError};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("insufficient funds in account {account} (available {available}, requested {requested})")]
    InsufficientFunds {
        account: AccountId,
        available: Amount,
        requested: Amount,
    },
    #[error("unknown account {account}")]
    UnknownAccount { account: AccountId },
    #[error("account {account} does not accept transfers")]
    Frozen { account: AccountId },
    #[error("balance overflow in account {account}")]
    Overflow { account: AccountId },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    Deposit {
        to: AccountId,
        amount: Amount,
    },
    Transfer {
        from: AccountId,
        to: AccountId,
        amount: Amount,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RewardLedger {
    treasury: AccountId,
    balances: BTreeMap<AccountId, Amount>,
    #[serde(default)]
    frozen: Vec<AccountId>,
    #[serde(default)]
    events: Vec<LedgerEvent>,
}

impl RewardLedger {
    pub fn new(treasury: impl Into<AccountId>) -> Self {
        Self {
            treasury: treasury.into(),
            balances: BTreeMap::new(),
            frozen: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn treasury(&self) -> &AccountId {
        &self.treasury
    }

    pub fn balance(&self, account: &str) -> Amount {
        self.balances.get(account).copied().unwrap_or(0)
    }

    pub fn balances(&self) -> &BTreeMap<AccountId, Amount> {
        &self.balances
    }

    pub fn events(&self) -> &[LedgerEvent] {
        &self.events
    }

    /// Mint `amount` into `account`.
    pub fn deposit(&mut self, account: &AccountId, amount: Amount) -> Result<(), LedgerError> {
        self.credit(account, amount)?;
        self.events.push(LedgerEvent::Deposit {
            to: account.clone(),
            amount,
        });
        Ok(())
    }

    /// Refuse every incoming transfer to `account` from now on.
    pub fn freeze(&mut self, account: &AccountId) {
        if !self.frozen.contains(account) {
            self.frozen.push(account.clone());
        }
    }

    pub fn move_funds(
        &mut self,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        if self.frozen.contains(to) {
            return Err(LedgerError::Frozen {
                account: to.clone(),
            });
        }
        self.debit(from, amount)?;
        if let Err(err) = self.credit(to, amount) {
            // put the debit back before reporting
            self.credit(from, amount)?;
            return Err(err);
        }
        self.events.push(LedgerEvent::Transfer {
            from: from.clone(),
            to: to.clone(),
            amount,
        });
        debug!(%from, %to, amount, "ledger transfer");
        Ok(())
    }

    fn credit(&mut self, account: &AccountId, amount: Amount) -> Result<(), LedgerError> {
        let balance = self.balances.entry(account.clone()).or_insert(0);
        *balance = balance
            .checked_add(amount)
            .ok_or_else(|| LedgerError::Overflow {
                account: account.clone(),
            })?;
        Ok(())
    }

    fn debit(&mut self, account: &AccountId, amount: Amount) -> Result<(), LedgerError> {
        let balance = self
            .balances
            .get_mut(account)
            .ok_or_else(|| LedgerError::UnknownAccount {
                account: account.clone(),
            })?;
        if *balance < amount {
            return Err(LedgerError::InsufficientFunds {
                account: account.clone(),
                available: *balance,
                requested: amount,
            });
        }
        *balance -= amount;
        Ok(())
    }
}

impl FundsTransfer for RewardLedger {
    fn transfer(&mut self, to: &AccountId, amount: Amount) -> Result<(), TransferError> {
        let treasury = self.treasury.clone();
        self.move_funds(&treasury, to, amount)
            .map_err(|err| TransferError::new(to, amount, err.to_string()))
    }

    fn reclaim(&mut self, from: &AccountId, amount: Amount) -> Result<(), TransferError> {
        let treasury = self.treasury.clone();
        self.move_funds(from, &treasury, amount)
            .map_err(|err| TransferError::new(from, amount, err.to_string()))
    }
}
