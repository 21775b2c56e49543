use serde::{Deserialize, Serialize};

use crate::error::GraphViolation;
use crate::registry::{AccountId, Amount};

/// Observable outcome of a program operation, in emission order.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReferralEvent {
    RegisteredReferrer {
        referee: AccountId,
        referrer: AccountId,
    },
    RegistrationFailed {
        referee: AccountId,
        referrer: AccountId,
        reason: GraphViolation,
        code: String,
    },
    PaidReferral {
        from: AccountId,
        to: AccountId,
        amount: Amount,
        level: u32,
    },
    ActivityUpdated {
        account: AccountId,
        timestamp: u64,
    },
}

impl ReferralEvent {
    pub(crate) fn registration_failed(
        referee: &AccountId,
        referrer: &AccountId,
        reason: GraphViolation,
    ) -> Self {
        ReferralEvent::RegistrationFailed {
            referee: referee.clone(),
            referrer: referrer.clone(),
            reason,
            code: reason.code().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_type_tag() {
        let event = ReferralEvent::registration_failed(
            &"bob".to_string(),
            &"bob".to_string(),
            GraphViolation::SelfReferral,
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "registration_failed");
        assert_eq!(json["reason"], "self_referral");
        assert_eq!(json["code"], "InvalidReferrer");

        let paid = ReferralEvent::PaidReferral {
            from: "carol".into(),
            to: "bob".into(),
            amount: 5,
            level: 1,
        };
        let back: ReferralEvent =
            serde_json::from_str(&serde_json::to_string(&paid).unwrap()).unwrap();
        assert_eq!(back, paid);
    }
}
