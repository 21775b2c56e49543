use std::sync::Arc;

use parking_lot::Mutex;

use crate::clock::{Clock, SystemClock};
use crate::error::ReferralError;
use crate::events::ReferralEvent;
use crate::graph::RegistrationOutcome;
use crate::payout::FundsTransfer;
use crate::program::ReferralProgram;
use crate::registry::{Account, AccountId, Amount};

/// Process-wide handle to one [`ReferralProgram`].
///
/// Each call holds the lock for the whole operation, so registrations,
/// payouts and activity updates never interleave.
pub struct SharedReferralProgram<C = SystemClock> {
    inner: Arc<Mutex<ReferralProgram<C>>>,
}

impl<C> Clone for SharedReferralProgram<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Clock> SharedReferralProgram<C> {
    pub fn new(program: ReferralProgram<C>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(program)),
        }
    }

    pub fn add_upline(
        &self,
        referee: &AccountId,
        referrer: &AccountId,
    ) -> Result<RegistrationOutcome, ReferralError> {
        self.inner.lock().add_upline(referee, referrer)
    }

    pub fn distribute<F: FundsTransfer + ?Sized>(
        &self,
        payer: &AccountId,
        value: Amount,
        funds: &mut F,
    ) -> Result<Amount, ReferralError> {
        self.inner.lock().distribute(payer, value, funds)
    }

    pub fn play<F: FundsTransfer + ?Sized>(
        &self,
        payer: &AccountId,
        value: Amount,
        funds: &mut F,
    ) -> Result<Amount, ReferralError> {
        self.inner.lock().play(payer, value, funds)
    }

    pub fn touch_activity(&self, account: &AccountId) -> Result<u64, ReferralError> {
        self.inner.lock().touch_activity(account)
    }

    pub fn has_referrer(&self, account: &str) -> bool {
        self.inner.lock().has_referrer(account)
    }

    pub fn get_account(&self, account: &str) -> Account {
        self.inner.lock().get_account(account)
    }

    pub fn drain_events(&self) -> Vec<ReferralEvent> {
        self.inner.lock().drain_events()
    }

    /// Run several steps under one lock.
    pub fn with<R>(&self, f: impl FnOnce(&mut ReferralProgram<C>) -> R) -> R {
        let mut guard = self.inner.lock();
        f(&mut *guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::thread;

    use crate::clock::ManualClock;
    use crate::payout::tests::RecordingFunds;
    use crate::rates::RateConfig;

    #[test]
    fn concurrent_registrations_count_every_referee() {
        let program = ReferralProgram::new(RateConfig::default(), ManualClock::new(1)).unwrap();
        let shared = SharedReferralProgram::new(program);
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let shared = shared.clone();
                thread::spawn(move || {
                    for i in 0..25 {
                        let referee = format!("t{t}-{i}");
                        shared.add_upline(&referee, &"root".to_string()).unwrap();
                        // second attempt always loses
                        let again = shared.add_upline(&referee, &"other".to_string()).unwrap();
                        assert!(!again.is_success());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(shared.get_account("root").referee_count, 200);
        assert_eq!(shared.get_account("other").referee_count, 0);
        assert_eq!(shared.drain_events().len(), 400);
    }

    #[test]
    fn payouts_through_shared_handle() {
        let program = ReferralProgram::new(RateConfig::default(), ManualClock::new(1)).unwrap();
        let shared = SharedReferralProgram::new(program);
        shared
            .add_upline(&"bob".to_string(), &"alice".to_string())
            .unwrap();
        let mut funds = RecordingFunds::default();
        let paid = shared
            .play(&"bob".to_string(), 1_000_000, &mut funds)
            .unwrap();
        // 1_000_000 * 5% * 80% * 100%
        assert_eq!(paid, 40_000);
        assert_eq!(shared.get_account("alice").reward, 40_000);
        assert!(shared.with(|p| p.get_account("bob").last_active_time.is_some()));
        assert!(shared.has_referrer("bob"));
    }
}
