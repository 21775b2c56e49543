use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::graph::RegistrationPolicy;
use crate::registry::Amount;
use crate::{MAX_REFEREE_BONUS_LEVEL, MAX_REFER_DEPTH};

pub const DEFAULT_DECIMALS: u64 = 10_000; // 10000 = 100.00%

/// Bonus multiplier applied to a referrer owning at least `threshold`
/// direct referees.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RefereeBonusTier {
    pub threshold: u32,
    pub rate: u64,
}

/// Raw construction parameters, as loaded from configuration.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RateConfig {
    /// Fixed-point denominator shared by every rate.
    #[serde(default = "default_decimals")]
    pub decimals: u64,

    /// Share of each play value set aside as the referral pool.
    #[serde(default = "default_referral_bonus_rate")]
    pub referral_bonus_rate: u64,

    #[serde(default = "default_seconds_until_inactive")]
    pub seconds_until_inactive: u64,

    #[serde(default)]
    pub only_reward_active_referrers: bool,

    /// Share of the pool per upline level, nearest level first.
    #[serde(default = "default_level_rates")]
    pub level_rates: Vec<u64>,

    #[serde(default)]
    pub registration_policy: RegistrationPolicy,

    /// Ascending by threshold; empty means a single full-rate tier.
    #[serde(default)]
    pub referee_bonus_tiers: Vec<RefereeBonusTier>,
}

fn default_decimals() -> u64 {
    DEFAULT_DECIMALS
}
fn default_referral_bonus_rate() -> u64 {
    500
}
fn default_seconds_until_inactive() -> u64 {
    24 * 60 * 60
}
fn default_level_rates() -> Vec<u64> {
    vec![8_000, 2_000]
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            decimals: default_decimals(),
            referral_bonus_rate: default_referral_bonus_rate(),
            seconds_until_inactive: default_seconds_until_inactive(),
            only_reward_active_referrers: false,
            level_rates: default_level_rates(),
            registration_policy: RegistrationPolicy::default(),
            referee_bonus_tiers: vec![RefereeBonusTier {
                threshold: 1,
                rate: DEFAULT_DECIMALS,
            }],
        }
    }
}

/// Validated rate configuration. Immutable once built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RateTable {
    config: RateConfig,
}

impl RateTable {
    pub fn new(mut config: RateConfig) -> Result<Self, ConfigError> {
        let decimals = config.decimals;
        if decimals == 0 {
            return Err(ConfigError::ZeroDecimals);
        }
        if config.level_rates.is_empty() {
            return Err(ConfigError::MissLevelRate);
        }
        if config.level_rates.len() > MAX_REFER_DEPTH {
            return Err(ConfigError::ExceedMaxLevelDepth {
                actual: config.level_rates.len(),
                max: MAX_REFER_DEPTH,
            });
        }
        let total: u128 = config.level_rates.iter().map(|r| *r as u128).sum();
        if total > decimals as u128 {
            return Err(ConfigError::TotalLevelRateOverflow {
                total: u64::try_from(total).unwrap_or(u64::MAX),
                decimals,
            });
        }
        if config.referral_bonus_rate > decimals {
            return Err(ConfigError::ReferralRateOverflow {
                rate: config.referral_bonus_rate,
                decimals,
            });
        }
        if config.referee_bonus_tiers.len() > MAX_REFEREE_BONUS_LEVEL {
            return Err(ConfigError::ExceedMaxRefereeLevelDepth {
                actual: config.referee_bonus_tiers.len(),
                max: MAX_REFEREE_BONUS_LEVEL,
            });
        }
        let mut previous: Option<u32> = None;
        for tier in &config.referee_bonus_tiers {
            if tier.rate > decimals {
                return Err(ConfigError::RefereeRateOverflow {
                    threshold: tier.threshold,
                    rate: tier.rate,
                    decimals,
                });
            }
            if previous.map_or(false, |p| tier.threshold <= p) {
                return Err(ConfigError::UnorderedRefereeTiers {
                    threshold: tier.threshold,
                });
            }
            previous = Some(tier.threshold);
        }
        if config.referee_bonus_tiers.is_empty() {
            config.referee_bonus_tiers.push(RefereeBonusTier {
                threshold: 1,
                rate: decimals,
            });
        }
        Ok(Self { config })
    }

    pub fn decimals(&self) -> u64 {
        self.config.decimals
    }

    pub fn referral_bonus_rate(&self) -> u64 {
        self.config.referral_bonus_rate
    }

    pub fn level_rates(&self) -> &[u64] {
        &self.config.level_rates
    }

    pub fn referee_bonus_tiers(&self) -> &[RefereeBonusTier] {
        &self.config.referee_bonus_tiers
    }

    pub fn seconds_until_inactive(&self) -> u64 {
        self.config.seconds_until_inactive
    }

    pub fn only_reward_active_referrers(&self) -> bool {
        self.config.only_reward_active_referrers
    }

    pub fn registration_policy(&self) -> RegistrationPolicy {
        self.config.registration_policy
    }

    /// Number of levels a payout walks.
    pub fn max_depth(&self) -> usize {
        self.config.level_rates.len().min(MAX_REFER_DEPTH)
    }

    /// The normalized configuration this table was built from.
    pub fn config(&self) -> &RateConfig {
        &self.config
    }

    /// Bonus multiplier for a referrer with `referee_count` direct referees.
    ///
    /// Takes the rate of the highest tier whose threshold does not exceed the
    /// count; counts below the first threshold still get the first tier.
    pub fn referee_bonus_rate(&self, referee_count: u32) -> u64 {
        let tiers = &self.config.referee_bonus_tiers;
        let mut rate = tiers.first().map_or(self.config.decimals, |t| t.rate);
        for tier in tiers.iter().skip(1) {
            if referee_count < tier.threshold {
                break;
            }
            rate = tier.rate;
        }
        rate
    }

    /// Referral pool carved out of a play value.
    pub fn pool(&self, value: Amount) -> Amount {
        apply_rate(value, self.config.referral_bonus_rate, self.config.decimals)
    }

    /// Share of `pool` owed at `level` (1-based) to a referrer with
    /// `referee_count` direct referees. `None` past the last level.
    pub fn level_share(&self, pool: Amount, level: usize, referee_count: u32) -> Option<Amount> {
        let level_rate = *self.config.level_rates.get(level.checked_sub(1)?)?;
        let decimals = self.config.decimals;
        let amount = apply_rate(pool, level_rate, decimals);
        Some(apply_rate(
            amount,
            self.referee_bonus_rate(referee_count),
            decimals,
        ))
    }
}

/// `floor(amount * rate / decimals)`, multiplying first.
///
/// Saturates at `u64::MAX` when `rate > decimals` pushes the result out of
/// range; validated tables never do that.
pub fn apply_rate(amount: Amount, rate: u64, decimals: u64) -> Amount {
    if decimals == 0 {
        return 0;
    }
    let scaled = (amount as u128 * rate as u128) / decimals as u128;
    u64::try_from(scaled).unwrap_or(u64::MAX)
}
