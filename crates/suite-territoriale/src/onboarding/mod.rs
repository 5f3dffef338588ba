//! Onboarding case resolution: classifies a commune into the registration path it should
//! follow and prepares what the welcome page renders.

mod case;
mod page;
mod resolver;


pub use case::OnboardingCase;
pub use page::{onboarding_page, OnboardingPage, OnboardingQuery, INVALID_SIRET_ERROR};
pub use resolver::{
    determine_onboarding_case, OnboardingOptions, OnboardingOutcome, DEFAULT_ERROR,
    UNKNOWN_STRUCTURE_ERROR,
};
