use serde::{Deserialize, Serialize};

/// Terminal classification of an onboarding request.
///
/// `OpsnProconnect`, `OpsnZero` and `NotEligible` have views but are never produced by
/// [`determine_onboarding_case`](super::determine_onboarding_case).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OnboardingCase {
    Error,
    ActiveInRegie,
    OpsnChoice,
    OpsnProconnect,
    ContactUs,
    UniqueCodeRequest,
    ComingSoon,
    OpsnZero,
    NotEligible,
}

impl OnboardingCase {
    pub const ALL: [OnboardingCase; 9] = [
        OnboardingCase::Error,
        OnboardingCase::ActiveInRegie,
        OnboardingCase::OpsnChoice,
        OnboardingCase::OpsnProconnect,
        OnboardingCase::ContactUs,
        OnboardingCase::UniqueCodeRequest,
        OnboardingCase::ComingSoon,
        OnboardingCase::OpsnZero,
        OnboardingCase::NotEligible,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            OnboardingCase::Error => "ERROR",
            OnboardingCase::ActiveInRegie => "ACTIVE_IN_REGIE",
            OnboardingCase::OpsnChoice => "OPSN_CHOICE",
            OnboardingCase::OpsnProconnect => "OPSN_PROCONNECT",
            OnboardingCase::ContactUs => "CONTACT_US",
            OnboardingCase::UniqueCodeRequest => "UNIQUE_CODE_REQUEST",
            OnboardingCase::ComingSoon => "COMING_SOON",
            OnboardingCase::OpsnZero => "OPSN_ZERO",
            OnboardingCase::NotEligible => "NOT_ELIGIBLE",
        }
    }

    /// View component rendering this case.
    pub const fn view(self) -> &'static str {
        match self {
            OnboardingCase::Error => "error",
            OnboardingCase::ActiveInRegie => "active-in-regie",
            OnboardingCase::OpsnChoice => "opsn-choice",
            OnboardingCase::OpsnProconnect => "opsn-proconnect",
            OnboardingCase::ContactUs => "contact-us",
            OnboardingCase::UniqueCodeRequest => "unique-code-request",
            OnboardingCase::ComingSoon => "coming-soon",
            OnboardingCase::OpsnZero => "opsn-zero",
            OnboardingCase::NotEligible => "not-eligible",
        }
    }
}
