//! Referrer registration.
//!
//! Links are only ever added, never moved or removed, and every insertion is
//! checked against the full upline chain of the proposed referrer. The graph
//! therefore stays a forest without any check at traversal time.

use serde::{Deserialize, Serialize};

use crate::error::{GraphViolation, ReferralError};
use crate::registry::{is_null_account, AccountId, AccountRegistry};

/// How a refused registration is reported.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationPolicy {
    /// Return [`RegistrationOutcome::Rejected`] and record a
    /// `RegistrationFailed` event.
    #[default]
    SoftFail,
    /// Return [`ReferralError::Registration`]; nothing is recorded.
    Abort,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegistrationOutcome {
    Success,
    Rejected(GraphViolation),
}

impl RegistrationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RegistrationOutcome::Success)
    }

    /// Treat a soft rejection as fatal.
    pub fn into_result(self) -> Result<(), ReferralError> {
        match self {
            RegistrationOutcome::Success => Ok(()),
            RegistrationOutcome::Rejected(reason) => Err(ReferralError::Registration(reason)),
        }
    }
}

/// Check whether `referrer` may become the upline of `referee`.
pub fn validate_link(
    registry: &AccountRegistry,
    referee: &str,
    referrer: &str,
) -> Result<(), GraphViolation> {
    if is_null_account(referee) {
        return Err(GraphViolation::NullReferee);
    }
    if is_null_account(referrer) {
        return Err(GraphViolation::NullReferrer);
    }
    if referee == referrer {
        return Err(GraphViolation::SelfReferral);
    }
    if registry.is_upline_or_self(referrer, referee) {
        return Err(GraphViolation::CircularReference);
    }
    if registry.has_referrer(referee) {
        return Err(GraphViolation::DoubleRegisterReferrer);
    }
    Ok(())
}

/// Validate and insert the `referee -> referrer` edge. Leaves the registry
/// untouched on error.
pub fn link(
    registry: &mut AccountRegistry,
    referee: &AccountId,
    referrer: &AccountId,
) -> Result<(), GraphViolation> {
    validate_link(registry, referee, referrer)?;
    registry.entry(referee).referrer = Some(referrer.clone());
    let upline = registry.entry(referrer);
    upline.referee_count = upline.referee_count.saturating_add(1);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn id(s: &str) -> AccountId {
        s.to_string()
    }

    #[test]
    fn links_and_counts_referees() {
        let mut registry = AccountRegistry::new();
        link(&mut registry, &id("bob"), &id("alice")).unwrap();
        link(&mut registry, &id("carol"), &id("alice")).unwrap();
        assert_eq!(registry.referrer_of("bob").map(String::as_str), Some("alice"));
        assert_eq!(registry.account_or_default("alice").referee_count, 2);
        assert!(!registry.has_referrer("alice"));
    }

    #[test]
    fn rejects_null_and_self_referrers() {
        let mut registry = AccountRegistry::new();
        assert_eq!(
            link(&mut registry, &id("bob"), &id("")),
            Err(GraphViolation::NullReferrer)
        );
        assert_eq!(
            link(&mut registry, &id("bob"), &id("0x0000")),
            Err(GraphViolation::NullReferrer)
        );
        assert_eq!(
            link(&mut registry, &id(""), &id("bob")),
            Err(GraphViolation::NullReferee)
        );
        assert_eq!(
            link(&mut registry, &id("bob"), &id("bob")),
            Err(GraphViolation::SelfReferral)
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn rejects_second_registration_and_keeps_first() {
        let mut registry = AccountRegistry::new();
        link(&mut registry, &id("bob"), &id("alice")).unwrap();
        assert_eq!(
            link(&mut registry, &id("bob"), &id("dave")),
            Err(GraphViolation::DoubleRegisterReferrer)
        );
        assert_eq!(registry.referrer_of("bob").map(String::as_str), Some("alice"));
        assert_eq!(registry.account_or_default("dave").referee_count, 0);
        assert!(registry.get("dave").is_none());
    }

    #[test]
    fn rejects_descendant_as_referrer() {
        // a <- b <- c
        let mut registry = AccountRegistry::new();
        link(&mut registry, &id("b"), &id("a")).unwrap();
        link(&mut registry, &id("c"), &id("b")).unwrap();
        assert_eq!(
            link(&mut registry, &id("a"), &id("c")),
            Err(GraphViolation::CircularReference)
        );
        assert!(!registry.has_referrer("a"));
    }

    #[test]
    fn rejects_cycles_deeper_than_payout_levels() {
        let mut registry = AccountRegistry::new();
        let names: Vec<AccountId> = (0..8).map(|i| format!("n{i}")).collect();
        for pair in names.windows(2) {
            link(&mut registry, &pair[1], &pair[0]).unwrap();
        }
        assert_eq!(
            link(&mut registry, &names[0], &names[7]),
            Err(GraphViolation::CircularReference)
        );
    }

    #[test]
    fn random_registrations_never_form_cycles() {
        let mut rng = StdRng::seed_from_u64(0x5eed_0001);
        let mut registry = AccountRegistry::new();
        let names: Vec<AccountId> = (0..24).map(|i| format!("acct-{i}")).collect();
        for _ in 0..400 {
            let referee = &names[rng.gen_range(0..names.len())];
            let referrer = &names[rng.gen_range(0..names.len())];
            let _ = link(&mut registry, referee, referrer);
        }
        for name in &names {
            let chain = registry.ancestors(name, names.len() + 1);
            assert!(chain.len() < names.len());
            assert!(!chain.contains(name));
        }
        let linked = names.iter().filter(|n| registry.has_referrer(n)).count() as u32;
        let counted: u32 = registry.iter().map(|(_, a)| a.referee_count).sum();
        assert_eq!(linked, counted);
    }

    #[test]
    fn outcome_into_result() {
        assert!(RegistrationOutcome::Success.into_result().is_ok());
        let err = RegistrationOutcome::Rejected(GraphViolation::SelfReferral)
            .into_result()
            .unwrap_err();
        assert!(matches!(
            err,
            ReferralError::Registration(GraphViolation::SelfReferral)
        ));
    }
}
