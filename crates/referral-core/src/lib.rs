//! Referral reward ledger.
//!
//! The crate keeps a forest of referrer links between accounts and, on every
//! paying event, splits a share of the wagered value between the payer's
//! uplines:
//!
//! * [`rates`] — validated, immutable level and referee bonus rates.
//! * [`registry`] — per-account referral state keyed by identity.
//! * [`graph`] — referrer registration with acyclicity and uniqueness checks.
//! * [`payout`] — level-bounded upline payouts through a [`FundsTransfer`].
//! * [`program`] — the facade that ties the pieces to a [`Clock`] and an
//!   event buffer.
//!
//! Funds never move inside this crate; the caller supplies the transfer
//! collaborator for each payout.

pub mod clock;
pub mod events;
pub mod graph;
pub mod payout;
pub mod program;
pub mod rates;
pub mod registry;
pub mod shared;
pub mod snapshot;

mod error;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ConfigError, GraphViolation, ReferralError, TransferError};
pub use events::ReferralEvent;
pub use graph::{RegistrationOutcome, RegistrationPolicy};
pub use payout::{FundsTransfer, LevelShare};
pub use program::ReferralProgram;
pub use rates::{apply_rate, RateConfig, RateTable, RefereeBonusTier};
pub use registry::{is_null_account, Account, AccountId, AccountRegistry, Amount};
pub use shared::SharedReferralProgram;
pub use snapshot::ProgramSnapshot;

/// Maximum number of upline levels a payout may reach.
pub const MAX_REFER_DEPTH: usize = 3;

/// Maximum number of referee bonus tiers.
pub const MAX_REFEREE_BONUS_LEVEL: usize = 3;
