//! Upline payouts.
//!
//! A payout is computed as a plan first ([`PayoutEngine::plan`]) and only
//! then settled against the caller's [`FundsTransfer`]. Settlement either
//! moves every planned share or reclaims what it already moved.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::TransferError;
use crate::rates::RateTable;
use crate::registry::{AccountId, AccountRegistry, Amount};

/// Moves referral bonuses out of the paying side's funds.
pub trait FundsTransfer {
    /// Send `amount` to `to`.
    fn transfer(&mut self, to: &AccountId, amount: Amount) -> Result<(), TransferError>;

    /// Undo an earlier successful [`FundsTransfer::transfer`] of `amount` to
    /// `from`.
    fn reclaim(&mut self, from: &AccountId, amount: Amount) -> Result<(), TransferError>;
}

impl<T: FundsTransfer + ?Sized> FundsTransfer for &mut T {
    fn transfer(&mut self, to: &AccountId, amount: Amount) -> Result<(), TransferError> {
        (**self).transfer(to, amount)
    }

    fn reclaim(&mut self, from: &AccountId, amount: Amount) -> Result<(), TransferError> {
        (**self).reclaim(from, amount)
    }
}

/// One level of a payout plan.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LevelShare {
    pub recipient: AccountId,
    pub amount: Amount,
    /// 1 = direct referrer.
    pub level: u32,
}

pub struct PayoutEngine<'a> {
    rates: &'a RateTable,
    registry: &'a AccountRegistry,
}

impl<'a> PayoutEngine<'a> {
    pub fn new(rates: &'a RateTable, registry: &'a AccountRegistry) -> Self {
        Self { rates, registry }
    }

    /// Shares owed to the uplines of `payer` for a play of `value` at `now`.
    ///
    /// Inactive uplines are left out when the table only rewards active
    /// referrers; the walk still continues past them.
    pub fn plan(&self, payer: &str, value: Amount, now: u64) -> Vec<LevelShare> {
        let pool = self.rates.pool(value);
        let chain = self.registry.ancestors(payer, self.rates.max_depth());
        let mut shares = Vec::with_capacity(chain.len());
        for (idx, upline) in chain.into_iter().enumerate() {
            let level = idx + 1;
            let account = self.registry.account_or_default(&upline);
            if self.rates.only_reward_active_referrers()
                && !account.is_active(now, self.rates.seconds_until_inactive())
            {
                warn!(
                    payer,
                    referrer = %upline,
                    level,
                    last_active = ?account.last_active_time,
                    "skipping inactive referrer"
                );
                continue;
            }
            let amount = match self.rates.level_share(pool, level, account.referee_count) {
                Some(amount) => amount,
                None => break,
            };
            debug!(
                payer,
                referrer = %upline,
                level,
                pool,
                referee_count = account.referee_count,
                amount,
                "computed level share"
            );
            shares.push(LevelShare {
                recipient: upline,
                amount,
                level: level as u32,
            });
        }
        shares
    }
}

/// Move every share in `plan`, in order. On the first failed transfer the
/// already moved shares are reclaimed newest first and the failure is
/// returned.
pub fn settle<F: FundsTransfer + ?Sized>(
    plan: &[LevelShare],
    funds: &mut F,
) -> Result<Amount, TransferError> {
    let mut total: Amount = 0;
    for (idx, share) in plan.iter().enumerate() {
        if share.amount == 0 {
            continue;
        }
        if let Err(err) = funds.transfer(&share.recipient, share.amount) {
            warn!(
                recipient = %share.recipient,
                amount = share.amount,
                level = share.level,
                error = %err,
                "referral transfer failed, reclaiming earlier levels"
            );
            for done in plan[..idx].iter().rev().filter(|s| s.amount > 0) {
                if let Err(reclaim_err) = funds.reclaim(&done.recipient, done.amount) {
                    warn!(
                        recipient = %done.recipient,
                        amount = done.amount,
                        error = %reclaim_err,
                        "failed to reclaim referral transfer"
                    );
                }
            }
            return Err(err);
        }
        total = total.saturating_add(share.amount);
    }
    Ok(total)
}
