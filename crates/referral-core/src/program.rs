use tracing::{info, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::{ConfigError, ReferralError};
use crate::events::ReferralEvent;
use crate::graph::{self, RegistrationOutcome, RegistrationPolicy};
use crate::payout::{self, FundsTransfer, LevelShare, PayoutEngine};
use crate::rates::{RateConfig, RateTable};
use crate::registry::{is_null_account, Account, AccountId, AccountRegistry, Amount};

/// The referral ledger: rate table, account registry, clock and the events
/// emitted so far.
///
/// Every operation either completes or returns an error with no effect on
/// the registry or the event buffer.
pub struct ReferralProgram<C = SystemClock> {
    rates: RateTable,
    registry: AccountRegistry,
    clock: C,
    events: Vec<ReferralEvent>,
}

impl ReferralProgram<SystemClock> {
    pub fn with_system_clock(config: RateConfig) -> Result<Self, ConfigError> {
        Self::new(config, SystemClock)
    }
}

impl<C: Clock> ReferralProgram<C> {
    pub fn new(config: RateConfig, clock: C) -> Result<Self, ConfigError> {
        let rates = RateTable::new(config)?;
        info!(
            levels = ?rates.level_rates(),
            referral_bonus_rate = rates.referral_bonus_rate(),
            decimals = rates.decimals(),
            only_active = rates.only_reward_active_referrers(),
            policy = ?rates.registration_policy(),
            "referral program initialized"
        );
        Ok(Self::from_parts(rates, AccountRegistry::new(), clock))
    }

    pub(crate) fn from_parts(rates: RateTable, registry: AccountRegistry, clock: C) -> Self {
        Self {
            rates,
            registry,
            clock,
            events: Vec::new(),
        }
    }

    pub fn rates(&self) -> &RateTable {
        &self.rates
    }

    pub fn registry(&self) -> &AccountRegistry {
        &self.registry
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Register `referrer` as the upline of `referee`.
    ///
    /// A refused registration is reported according to the configured
    /// [`RegistrationPolicy`].
    pub fn add_upline(
        &mut self,
        referee: &AccountId,
        referrer: &AccountId,
    ) -> Result<RegistrationOutcome, ReferralError> {
        match graph::link(&mut self.registry, referee, referrer) {
            Ok(()) => {
                info!(%referee, %referrer, "registered referrer");
                self.events.push(ReferralEvent::RegisteredReferrer {
                    referee: referee.clone(),
                    referrer: referrer.clone(),
                });
                Ok(RegistrationOutcome::Success)
            }
            Err(reason) => {
                warn!(%referee, %referrer, code = reason.code(), %reason, "registration rejected");
                match self.rates.registration_policy() {
                    RegistrationPolicy::SoftFail => {
                        self.events
                            .push(ReferralEvent::registration_failed(referee, referrer, reason));
                        Ok(RegistrationOutcome::Rejected(reason))
                    }
                    RegistrationPolicy::Abort => Err(ReferralError::Registration(reason)),
                }
            }
        }
    }

    /// Shares `distribute` would pay right now, without moving anything.
    pub fn payout_plan(&self, payer: &str, value: Amount) -> Vec<LevelShare> {
        PayoutEngine::new(&self.rates, &self.registry).plan(payer, value, self.clock.now())
    }

    /// Pay the uplines of `payer` their share of `value` through `funds`.
    /// Returns the total paid, which the caller deducts from its own payout.
    pub fn distribute<F: FundsTransfer + ?Sized>(
        &mut self,
        payer: &AccountId,
        value: Amount,
        funds: &mut F,
    ) -> Result<Amount, ReferralError> {
        if is_null_account(payer) {
            return Err(ReferralError::NullAccount);
        }
        let plan = self.payout_plan(payer, value);
        if plan.is_empty() {
            return Ok(0);
        }
        let total = payout::settle(&plan, funds)?;
        for share in plan {
            let account = self.registry.entry(&share.recipient);
            account.reward = account.reward.saturating_add(share.amount);
            self.events.push(ReferralEvent::PaidReferral {
                from: payer.clone(),
                to: share.recipient,
                amount: share.amount,
                level: share.level,
            });
        }
        info!(%payer, value, total, "paid referral bonuses");
        Ok(total)
    }

    /// A paying play: distribute the referral share of `value`, then mark
    /// the payer active.
    pub fn play<F: FundsTransfer + ?Sized>(
        &mut self,
        payer: &AccountId,
        value: Amount,
        funds: &mut F,
    ) -> Result<Amount, ReferralError> {
        let total = self.distribute(payer, value, funds)?;
        self.touch_activity(payer)?;
        Ok(total)
    }

    /// Mark `account` active now. Returns the stored timestamp.
    pub fn touch_activity(&mut self, account: &AccountId) -> Result<u64, ReferralError> {
        if is_null_account(account) {
            return Err(ReferralError::NullAccount);
        }
        let now = self.clock.now();
        self.registry.entry(account).last_active_time = Some(now);
        self.events.push(ReferralEvent::ActivityUpdated {
            account: account.clone(),
            timestamp: now,
        });
        Ok(now)
    }

    pub fn has_referrer(&self, account: &str) -> bool {
        self.registry.has_referrer(account)
    }

    /// Referral state of `account`; an empty record for unknown accounts.
    pub fn get_account(&self, account: &str) -> Account {
        self.registry.account_or_default(account)
    }

    pub fn events(&self) -> &[ReferralEvent] {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<ReferralEvent> {
        std::mem::take(&mut self.events)
    }
}
